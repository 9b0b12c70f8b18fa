//! 传输执行器 - 通过远程通道执行单个同步动作并校验结果

use super::engine::SyncDirection;
use super::planner::SyncAction;
use super::timestamp::{from_system_time, to_device_stamp, to_file_time};
use crate::remote::{probe_says_exists, RemoteCommand, RemoteShell};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// 单个文件失败原因（Display 即展示给用户的文本）
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FailureReason {
    #[error("Canceled by user")]
    Cancelled,
    #[error("{0} returned no output")]
    NoOutput(String),
    #[error("{0} pull failed")]
    PullFailed(String),
    #[error("{0} push failed")]
    PushFailed(String),
    #[error("File not found after pull")]
    MissingAfterPull,
}

/// 拉取失败分类，按优先级依次判断
pub fn classify_pull_failure(cancelled: bool, output: &str, channel: &str) -> FailureReason {
    if cancelled {
        FailureReason::Cancelled
    } else if output.trim().is_empty() {
        FailureReason::NoOutput(channel.to_string())
    } else if output.to_lowercase().contains("failed") {
        FailureReason::PullFailed(channel.to_string())
    } else {
        FailureReason::MissingAfterPull
    }
}

/// 推送失败分类（仅在校验失败时调用）
pub fn classify_push_failure(output: &str, channel: &str) -> FailureReason {
    if output.trim().is_empty() {
        FailureReason::NoOutput(channel.to_string())
    } else {
        FailureReason::PushFailed(channel.to_string())
    }
}

/// 传输执行器
pub struct TransferExecutor {
    shell: Arc<dyn RemoteShell>,
    device: String,
    step_delay: Duration,
    token: CancellationToken,
}

impl TransferExecutor {
    pub fn new(
        shell: Arc<dyn RemoteShell>,
        device: impl Into<String>,
        step_delay: Duration,
        token: CancellationToken,
    ) -> Self {
        Self {
            shell,
            device: device.into(),
            step_delay,
            token,
        }
    }

    /// 通道名称
    pub fn channel(&self) -> &str {
        self.shell.name()
    }

    /// 执行远程命令并返回输出
    ///
    /// 通道错误按空输出处理，后续分类与"无输出"一致。
    async fn capture(&self, command: RemoteCommand<'_>) -> String {
        let line = command.to_string();
        match self.shell.run_captured(&self.device, &line).await {
            Ok(output) => output,
            Err(e) => {
                warn!("{} 命令失败 ({}): {}", self.shell.name(), line, e);
                String::new()
            }
        }
    }

    /// 执行远程命令，不关心输出
    async fn execute(&self, command: RemoteCommand<'_>) {
        let line = command.to_string();
        if let Err(e) = self.shell.run(&self.device, &line).await {
            warn!("{} 命令失败 ({}): {}", self.shell.name(), line, e);
        }
    }

    /// 步骤间停顿，取消时提前返回
    pub async fn pace(&self) {
        if self.step_delay.is_zero() {
            return;
        }
        tokio::select! {
            _ = tokio::time::sleep(self.step_delay) => {}
            _ = self.token.cancelled() => {}
        }
    }

    /// 获取远程目录列表文本
    pub async fn list(&self, dir: &str, recursive: bool) -> String {
        self.capture(RemoteCommand::List { dir, recursive }).await
    }

    /// 远程 mkdir -p
    pub async fn ensure_remote_dir(&self, path: &str) {
        self.execute(RemoteCommand::MakeDir { path }).await;
    }

    /// 远程路径是否存在
    pub async fn remote_exists(&self, path: &str) -> bool {
        probe_says_exists(&self.capture(RemoteCommand::Probe { path }).await)
    }

    /// 设备 -> 本地，成功后把本地修改时间设为远程时间
    pub async fn pull_file(&self, action: &SyncAction) -> Result<(), FailureReason> {
        if let Some(parent) = action.local_path.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                warn!("创建本地目录失败 {:?}: {}", parent, e);
            }
        }

        let output = self
            .capture(RemoteCommand::Pull {
                remote: &action.remote_path,
                local: &action.local_path,
            })
            .await;

        let pulled = tokio::fs::metadata(&action.local_path)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false);
        if !pulled {
            return Err(classify_pull_failure(
                self.token.is_cancelled(),
                &output,
                self.channel(),
            ));
        }

        set_local_mtime(&action.local_path, action).await;
        Ok(())
    }

    /// 推送前准备：创建远程父目录并探测目标是否已存在
    pub async fn prepare_push(&self, action: &SyncAction) -> bool {
        if let Some((parent, _)) = action.remote_path.rsplit_once('/') {
            if !parent.is_empty() {
                self.ensure_remote_dir(parent).await;
            }
        }
        self.remote_exists(&action.remote_path).await
    }

    /// 本地 -> 设备：推送、校验，成功后 touch 远程文件
    pub async fn push_file(&self, action: &SyncAction) -> Result<(), FailureReason> {
        let output = self
            .capture(RemoteCommand::Push {
                local: &action.local_path,
                remote: &action.remote_path,
            })
            .await;

        if !self.remote_exists(&action.remote_path).await {
            return Err(classify_push_failure(&output, self.channel()));
        }

        // 取推送时的本地 mtime，读取失败时退回到扫描时记录的时间
        let modified = tokio::fs::metadata(&action.local_path)
            .await
            .and_then(|m| m.modified())
            .map(from_system_time)
            .unwrap_or(action.source_modified_at);
        self.touch_remote(&to_device_stamp(&modified), &action.remote_path)
            .await;
        Ok(())
    }

    /// 创建目录（错误只记录日志）
    pub async fn create_dir(&self, direction: SyncDirection, action: &SyncAction) {
        match direction {
            SyncDirection::ToLocal => {
                if let Err(e) = tokio::fs::create_dir_all(&action.local_path).await {
                    warn!("创建本地目录失败 {:?}: {}", action.local_path, e);
                    return;
                }
                set_local_mtime(&action.local_path, action).await;
            }
            SyncDirection::ToRemote => self.ensure_remote_dir(&action.remote_path).await,
        }
    }

    /// 重新设置目录时间
    pub async fn stamp_dir(&self, direction: SyncDirection, action: &SyncAction) {
        match direction {
            SyncDirection::ToLocal => set_local_mtime(&action.local_path, action).await,
            SyncDirection::ToRemote => {
                let modified = tokio::fs::metadata(&action.local_path)
                    .await
                    .and_then(|m| m.modified())
                    .map(from_system_time)
                    .unwrap_or(action.source_modified_at);
                self.ensure_remote_dir(&action.remote_path).await;
                self.touch_remote(&to_device_stamp(&modified), &action.remote_path)
                    .await;
            }
        }
    }

    async fn touch_remote(&self, stamp: &str, path: &str) {
        self.execute(RemoteCommand::Touch { stamp, path }).await;
    }
}

async fn set_local_mtime(path: &Path, action: &SyncAction) {
    let path = path.to_path_buf();
    let mtime = to_file_time(&action.source_modified_at);
    let result = tokio::task::spawn_blocking(move || filetime::set_file_mtime(&path, mtime)).await;
    match result {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!("设置修改时间失败 {}: {}", action.relative_path, e),
        Err(e) => debug!("设置修改时间任务异常: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::planner::ActionKind;
    use crate::remote::ShellError;
    use async_trait::async_trait;
    use chrono::{Local, TimeZone};
    use std::path::PathBuf;
    use std::sync::Mutex;
    use tempfile::tempdir;

    /// 按顺序返回预设输出的通道
    ///
    /// 忽略输出的命令（mkdir、touch）不消耗预设输出，单独记录。
    struct ScriptedShell {
        replies: Mutex<Vec<Result<String, ShellError>>>,
        seen: Mutex<Vec<String>>,
        fired: Mutex<Vec<String>>,
        fail_runs: bool,
    }

    impl ScriptedShell {
        fn new(replies: Vec<Result<String, ShellError>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies),
                seen: Mutex::new(Vec::new()),
                fired: Mutex::new(Vec::new()),
                fail_runs: false,
            })
        }

        fn failing_runs() -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(Vec::new()),
                seen: Mutex::new(Vec::new()),
                fired: Mutex::new(Vec::new()),
                fail_runs: true,
            })
        }

        fn seen(&self) -> Vec<String> {
            self.seen.lock().unwrap().clone()
        }

        fn fired(&self) -> Vec<String> {
            self.fired.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl RemoteShell for ScriptedShell {
        async fn run_captured(&self, _device: &str, line: &str) -> Result<String, ShellError> {
            self.seen.lock().unwrap().push(line.to_string());
            let mut replies = self.replies.lock().unwrap();
            if replies.is_empty() {
                Ok(String::new())
            } else {
                replies.remove(0)
            }
        }

        async fn run(&self, _device: &str, line: &str) -> Result<(), ShellError> {
            self.seen.lock().unwrap().push(line.to_string());
            self.fired.lock().unwrap().push(line.to_string());
            if self.fail_runs {
                return Err(ShellError::Timeout(30));
            }
            Ok(())
        }

        fn name(&self) -> &str {
            "ADB"
        }
    }

    fn action(local: PathBuf, remote: &str) -> SyncAction {
        SyncAction {
            kind: ActionKind::CopyToLocal,
            relative_path: "a.mp3".to_string(),
            local_path: local,
            remote_path: remote.to_string(),
            source_modified_at: Local.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).earliest().unwrap(),
        }
    }

    fn executor(shell: Arc<ScriptedShell>, token: CancellationToken) -> TransferExecutor {
        TransferExecutor::new(shell, "dev", Duration::ZERO, token)
    }

    #[test]
    fn pull_failure_priority() {
        assert_eq!(classify_pull_failure(true, "", "ADB"), FailureReason::Cancelled);
        assert_eq!(
            classify_pull_failure(false, "  \n", "ADB").to_string(),
            "ADB returned no output"
        );
        assert_eq!(
            classify_pull_failure(false, "adb: error: remote object does not exist: FAILED", "ADB")
                .to_string(),
            "ADB pull failed"
        );
        assert_eq!(
            classify_pull_failure(false, "1 file pulled", "ADB").to_string(),
            "File not found after pull"
        );
    }

    #[test]
    fn push_failure_depends_on_output() {
        assert_eq!(classify_push_failure("", "ADB").to_string(), "ADB returned no output");
        assert_eq!(classify_push_failure("error", "ADB").to_string(), "ADB push failed");
    }

    #[tokio::test]
    async fn transport_error_counts_as_no_output() {
        let dir = tempdir().unwrap();
        let shell = ScriptedShell::new(vec![Err(ShellError::Timeout(300))]);
        let exec = executor(shell.clone(), CancellationToken::new());

        let err = exec
            .pull_file(&action(dir.path().join("a.mp3"), "/sdcard/a.mp3"))
            .await
            .unwrap_err();
        assert_eq!(err, FailureReason::NoOutput("ADB".to_string()));
        assert_eq!(shell.seen(), vec![format!(
            "pull \"/sdcard/a.mp3\" \"{}\"",
            dir.path().join("a.mp3").display()
        )]);
    }

    #[tokio::test]
    async fn cancelled_pull_reports_cancellation() {
        let dir = tempdir().unwrap();
        let token = CancellationToken::new();
        token.cancel();
        let exec = executor(ScriptedShell::new(vec![Ok("failed".into())]), token);

        let err = exec
            .pull_file(&action(dir.path().join("a.mp3"), "/sdcard/a.mp3"))
            .await
            .unwrap_err();
        assert_eq!(err, FailureReason::Cancelled);
    }

    #[tokio::test]
    async fn push_verifies_then_touches() {
        let dir = tempdir().unwrap();
        let local = dir.path().join("a b.mp3");
        std::fs::write(&local, b"x").unwrap();
        let shell = ScriptedShell::new(vec![
            Ok("1 file pushed".into()),
            Ok("/sdcard/a b.mp3\n".into()),
        ]);
        let exec = executor(shell.clone(), CancellationToken::new());

        exec.push_file(&action(local, "/sdcard/a b.mp3")).await.unwrap();

        let seen = shell.seen();
        assert_eq!(seen.len(), 3);
        assert_eq!(seen[1], "shell ls \"/sdcard/a\\ b.mp3\"");
        assert!(seen[2].starts_with("shell touch -t "));
        assert!(seen[2].ends_with(" \"/sdcard/a\\ b.mp3\""));
        assert_eq!(shell.fired(), vec![seen[2].clone()]);
    }

    #[tokio::test]
    async fn push_without_remote_file_fails() {
        let dir = tempdir().unwrap();
        let local = dir.path().join("a.mp3");
        std::fs::write(&local, b"x").unwrap();
        let shell = ScriptedShell::new(vec![
            Ok("adb: error: failed to copy".into()),
            Ok("ls: /sdcard/a.mp3: No such file or directory".into()),
        ]);
        let exec = executor(shell.clone(), CancellationToken::new());

        let err = exec.push_file(&action(local, "/sdcard/a.mp3")).await.unwrap_err();
        assert_eq!(err, FailureReason::PushFailed("ADB".to_string()));
        assert_eq!(shell.seen().len(), 2);
    }

    #[tokio::test]
    async fn prepare_push_creates_parent_and_probes() {
        let shell = ScriptedShell::new(vec![Ok("/sdcard/M/a.mp3".into())]);
        let exec = executor(shell.clone(), CancellationToken::new());

        let exists = exec
            .prepare_push(&action(PathBuf::from("a.mp3"), "/sdcard/M/a.mp3"))
            .await;
        assert!(exists);
        assert_eq!(
            shell.seen(),
            vec!["shell mkdir -p \"/sdcard/M\"", "shell ls \"/sdcard/M/a.mp3\""]
        );
        assert_eq!(shell.fired(), vec!["shell mkdir -p \"/sdcard/M\""]);
    }

    #[tokio::test]
    async fn remote_stamp_errors_are_only_logged() {
        let dir = tempdir().unwrap();
        let shell = ScriptedShell::failing_runs();
        let exec = executor(shell.clone(), CancellationToken::new());
        let mut stamp = action(dir.path().join("Album"), "/sdcard/Album");
        stamp.kind = ActionKind::StampDir;

        exec.stamp_dir(SyncDirection::ToRemote, &stamp).await;

        let fired = shell.fired();
        assert_eq!(fired.len(), 2);
        assert_eq!(fired[0], "shell mkdir -p \"/sdcard/Album\"");
        assert!(fired[1].starts_with("shell touch -t "));
    }

    #[tokio::test]
    async fn local_dir_creation_sets_mtime() {
        let dir = tempdir().unwrap();
        let exec = executor(ScriptedShell::new(vec![]), CancellationToken::new());
        let mut create = action(dir.path().join("Album"), "/sdcard/Album");
        create.kind = ActionKind::CreateDir;

        exec.create_dir(SyncDirection::ToLocal, &create).await;

        let modified = std::fs::metadata(&create.local_path).unwrap().modified().unwrap();
        assert_eq!(from_system_time(modified), create.source_modified_at);
    }

    #[tokio::test]
    async fn pace_returns_early_on_cancel() {
        let token = CancellationToken::new();
        let exec = TransferExecutor::new(
            ScriptedShell::new(vec![]),
            "dev",
            Duration::from_secs(30),
            token.clone(),
        );
        token.cancel();
        tokio::time::timeout(Duration::from_secs(1), exec.pace())
            .await
            .expect("pace should not wait once cancelled");
    }
}
