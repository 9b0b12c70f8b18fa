#![allow(dead_code)]

use adbsync_lib::config::EngineConfig;
use adbsync_lib::remote::adb::split_command_line;
use adbsync_lib::remote::{RemoteShell, ShellError};
use adbsync_lib::{SyncEvent, SyncRequest};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub const DEVICE: &str = "emulator-5554";
pub const REMOTE_ROOT: &str = "/sdcard/Music";

pub fn setup_temp_dir() -> TempDir {
    TempDir::new().expect("Failed to create temp directory")
}

/// 测试用引擎配置：无停顿
pub fn fast_config() -> EngineConfig {
    EngineConfig {
        step_delay_ms: 0,
        recursive: true,
    }
}

pub fn request(local: &Path, recursive: bool) -> SyncRequest {
    SyncRequest {
        device: DEVICE.to_string(),
        local_root: local.to_path_buf(),
        remote_root: REMOTE_ROOT.to_string(),
        recursive,
    }
}

/// `ls -l` 风格的文件行
pub fn file_line(name: &str, date: &str, time: &str) -> String {
    format!("-rw-rw---- 1 u0_a123 sdcard_rw 4096 {} {} {}\n", date, time, name)
}

/// `ls -l` 风格的目录行
pub fn dir_line(name: &str, date: &str, time: &str) -> String {
    format!("drwxrwx--x 2 root sdcard_rw 4096 {} {} {}\n", date, time, name)
}

pub fn event_channel() -> (mpsc::Sender<SyncEvent>, mpsc::Receiver<SyncEvent>) {
    mpsc::channel(1024)
}

/// 收集通道中全部状态行（发送端关闭后返回）
pub async fn collect_status(mut rx: mpsc::Receiver<SyncEvent>) -> Vec<String> {
    let mut lines = Vec::new();
    while let Some(event) = rx.recv().await {
        if let SyncEvent::Status(line) = event {
            lines.push(line);
        }
    }
    lines
}

#[derive(Default)]
struct DeviceState {
    commands: Vec<String>,
    listing: String,
    files: HashSet<String>,
    dirs: HashSet<String>,
    touches: Vec<(String, String)>,
    pull_replies: HashMap<String, String>,
    push_replies: HashMap<String, String>,
    cancel_after_pulls: Option<(usize, CancellationToken)>,
    pulls: usize,
    delay: Duration,
}

/// 内存中的模拟设备
///
/// 记录每条命令；列表命令返回预设文本，pull 写出本地文件，
/// push 在设备上登记文件，ls 探测、mkdir、touch 均按真实输出格式模拟。
#[derive(Default)]
pub struct FakeDevice {
    state: Mutex<DeviceState>,
}

impl FakeDevice {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn state(&self) -> std::sync::MutexGuard<'_, DeviceState> {
        self.state.lock().expect("device state poisoned")
    }

    pub fn set_listing(&self, text: impl Into<String>) {
        self.state().listing = text.into();
    }

    pub fn add_remote_file(&self, path: &str) {
        self.state().files.insert(path.to_string());
    }

    /// pull 该路径时只返回给定输出，不生成本地文件
    pub fn fail_pull(&self, remote: &str, output: &str) {
        self.state()
            .pull_replies
            .insert(remote.to_string(), output.to_string());
    }

    /// push 该路径时只返回给定输出，设备上不出现文件
    pub fn fail_push(&self, remote: &str, output: &str) {
        self.state()
            .push_replies
            .insert(remote.to_string(), output.to_string());
    }

    /// 第 n 次 pull 完成后触发取消
    pub fn cancel_after_pulls(&self, n: usize, token: CancellationToken) {
        self.state().cancel_after_pulls = Some((n, token));
    }

    /// 每条命令的模拟耗时
    pub fn set_delay(&self, delay: Duration) {
        self.state().delay = delay;
    }

    pub fn commands(&self) -> Vec<String> {
        self.state().commands.clone()
    }

    pub fn touches(&self) -> Vec<(String, String)> {
        self.state().touches.clone()
    }

    pub fn has_file(&self, path: &str) -> bool {
        self.state().files.contains(path)
    }

    pub fn has_dir(&self, path: &str) -> bool {
        self.state().dirs.contains(path)
    }

    fn handle(&self, args: &[String]) -> String {
        let arg = |i: usize| args.get(i).map(String::as_str).unwrap_or_default();
        let mut state = self.state();

        match arg(0) {
            "pull" => {
                let (remote, local) = (arg(1), arg(2));
                if let Some(reply) = state.pull_replies.get(remote) {
                    return reply.clone();
                }
                std::fs::write(local, format!("content of {}", remote))
                    .expect("write pulled file");
                state.pulls += 1;
                if let Some((n, token)) = &state.cancel_after_pulls {
                    if state.pulls == *n {
                        token.cancel();
                    }
                }
                format!("{}: 1 file pulled, 0 skipped.\n", remote)
            }
            "push" => {
                let remote = arg(2);
                if let Some(reply) = state.push_replies.get(remote) {
                    return reply.clone();
                }
                state.files.insert(remote.to_string());
                format!("{}: 1 file pushed, 0 skipped.\n", arg(1))
            }
            "shell" => match arg(1) {
                "ls" if arg(2).starts_with('-') => state.listing.clone(),
                "ls" => {
                    let path = unescape(arg(2));
                    if state.files.contains(&path) || state.dirs.contains(&path) {
                        format!("{}\n", path)
                    } else {
                        format!("ls: {}: No such file or directory\n", path)
                    }
                }
                "mkdir" => {
                    state.dirs.insert(unescape(arg(3)));
                    String::new()
                }
                "touch" => {
                    let touch = (arg(3).to_string(), unescape(arg(4)));
                    state.touches.push(touch);
                    String::new()
                }
                _ => String::new(),
            },
            _ => String::new(),
        }
    }
}

/// 设备端 shell 会把 `\ ` 还原为空格
fn unescape(path: &str) -> String {
    path.replace("\\ ", " ")
}

#[async_trait]
impl RemoteShell for FakeDevice {
    async fn run_captured(&self, device: &str, command_line: &str) -> Result<String, ShellError> {
        assert_eq!(device, DEVICE, "commands must target the selected device");
        let delay = {
            let mut state = self.state();
            state.commands.push(command_line.to_string());
            state.delay
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        Ok(self.handle(&split_command_line(command_line)))
    }

    fn name(&self) -> &str {
        "ADB"
    }
}
