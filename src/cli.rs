//! 命令行参数定义

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Synchronize a local directory with a directory on an Android device over adb.
#[derive(Parser, Debug)]
#[command(name = "adbsync")]
#[command(version)]
pub struct Cli {
    /// Device serial passed to `adb -s`.
    #[arg(short, long, global = true, env = "ANDROID_SERIAL", default_value = "")]
    pub device: String,

    /// Directory holding config.json and the log file.
    #[arg(long, global = true)]
    pub config_dir: Option<PathBuf>,

    /// Path to the adb executable (overrides config.json).
    #[arg(long, global = true)]
    pub adb: Option<String>,

    /// Pause between remote steps in milliseconds (overrides config.json).
    #[arg(long, global = true)]
    pub delay_ms: Option<u64>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Copy new files from the device into a local directory.
    Pull(DirArgs),

    /// Copy new files from a local directory onto the device.
    Push(DirArgs),

    /// Push individual files or directories into a remote directory.
    PushFiles(PushFilesArgs),
}

#[derive(Args, Debug)]
pub struct DirArgs {
    /// Local directory.
    #[arg(short, long)]
    pub local: PathBuf,

    /// Remote directory on the device.
    #[arg(short, long)]
    pub remote: String,

    /// Only top-level entries, skip subfolders.
    #[arg(long)]
    pub no_recursive: bool,
}

#[derive(Args, Debug)]
pub struct PushFilesArgs {
    /// Remote directory on the device.
    #[arg(short, long)]
    pub remote: String,

    /// Only top-level files of dropped directories.
    #[arg(long)]
    pub no_recursive: bool,

    /// Files or directories to push.
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,
}
