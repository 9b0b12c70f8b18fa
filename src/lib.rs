pub mod config;
pub mod core;
pub mod logging;
pub mod remote;

pub use config::{AdbConfig, AppConfig, EngineConfig};
pub use crate::core::{
    SyncController, SyncError, SyncEvent, SyncRequest, SyncResult, SyncSession, SyncTask,
};
pub use remote::{AdbShell, RemoteShell, ShellError};
