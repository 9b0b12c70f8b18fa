pub mod adb;

use async_trait::async_trait;
use std::fmt;
use std::path::Path;
use thiserror::Error;

pub use adb::AdbShell;

// ============ 公共常量 ============

/// 远程命令超时（秒）
pub const COMMAND_TIMEOUT_SECS: u64 = 300;

/// 探测命令输出中表示"不存在"的标记
pub const MISSING_MARKER: &str = "No such file";

/// 远程通道错误
#[derive(Debug, Error)]
pub enum ShellError {
    #[error("failed to launch {program}: {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("command timed out after {0}s")]
    Timeout(u64),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// 远程 shell 通道抽象
///
/// 通道本身没有并发控制，调用方需保证同一设备上一次只有一条命令在执行。
#[async_trait]
pub trait RemoteShell: Send + Sync {
    /// 执行命令并返回标准输出
    async fn run_captured(&self, device: &str, command_line: &str) -> Result<String, ShellError>;

    /// 执行命令，忽略输出
    async fn run(&self, device: &str, command_line: &str) -> Result<(), ShellError> {
        self.run_captured(device, command_line).await.map(|_| ())
    }

    /// 通道名称（用于失败原因，例如 "ADB returned no output"）
    fn name(&self) -> &str;
}

/// 设备端 shell 路径转义：仅将空格转为 `\ `
pub fn escape_for_shell(path: &str) -> String {
    path.replace(' ', "\\ ")
}

/// 远程命令
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCommand<'a> {
    /// 长格式目录列表
    List { dir: &'a str, recursive: bool },
    /// 设备 -> 本地
    Pull { remote: &'a str, local: &'a Path },
    /// 本地 -> 设备
    Push { local: &'a Path, remote: &'a str },
    /// mkdir -p
    MakeDir { path: &'a str },
    /// 存在性探测
    Probe { path: &'a str },
    /// 设置修改时间
    Touch { stamp: &'a str, path: &'a str },
}

impl fmt::Display for RemoteCommand<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoteCommand::List { dir, recursive } => {
                let flags = if *recursive { "-lR" } else { "-l" };
                write!(f, "shell ls {} \"{}\"", flags, dir)
            }
            RemoteCommand::Pull { remote, local } => {
                write!(f, "pull \"{}\" \"{}\"", remote, local.display())
            }
            RemoteCommand::Push { local, remote } => {
                write!(f, "push \"{}\" \"{}\"", local.display(), remote)
            }
            RemoteCommand::MakeDir { path } => {
                write!(f, "shell mkdir -p \"{}\"", escape_for_shell(path))
            }
            RemoteCommand::Probe { path } => write!(f, "shell ls \"{}\"", escape_for_shell(path)),
            RemoteCommand::Touch { stamp, path } => {
                write!(f, "shell touch -t {} \"{}\"", stamp, escape_for_shell(path))
            }
        }
    }
}

/// 探测输出是否表示远程路径存在
pub fn probe_says_exists(output: &str) -> bool {
    !output.trim().is_empty() && !output.contains(MISSING_MARKER)
}
