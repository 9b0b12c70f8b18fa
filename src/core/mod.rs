pub mod controller;
pub mod engine;
pub mod listing;
pub mod planner;
pub mod scanner;
pub mod timestamp;
pub mod transfer;

pub use controller::{SyncController, SyncTask};
pub use engine::{
    ConfigError, FailedItem, SyncDirection, SyncError, SyncEvent, SyncRequest, SyncResult,
    SyncSession,
};
pub use listing::{parse_listing, EntryKind, ListingParser, RemoteEntry};
pub use planner::{plan_pull, plan_push, ActionKind, SyncAction};
pub use scanner::{FileScanner, LocalEntry, LocalInventory};
pub use transfer::{FailureReason, TransferExecutor};
