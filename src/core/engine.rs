use super::listing::parse_listing;
use super::planner::{plan_pull, plan_push, plan_push_files, ActionKind, SyncAction};
use super::scanner::{FileScanner, LocalEntry};
use super::timestamp::from_system_time;
use super::transfer::{FailureReason, TransferExecutor};
use crate::config::EngineConfig;
use crate::remote::RemoteShell;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// 同步方向
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncDirection {
    /// 设备 -> 本地
    ToLocal,
    /// 本地 -> 设备
    ToRemote,
}

/// 运行前的参数错误
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("No device selected.")]
    NoDevice,
    #[error("Please select both local and remote directories.")]
    MissingDirectories,
    #[error("Please select a remote directory.")]
    MissingRemoteDirectory,
    #[error("Local directory does not exist: {0}")]
    LocalRootMissing(PathBuf),
}

/// 同步错误
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// 用户取消，携带已完成部分的结果
    #[error("Sync canceled by user.")]
    Cancelled(SyncResult),
}

/// 失败条目
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedItem {
    pub relative_path: String,
    pub reason: FailureReason,
}

impl fmt::Display for FailedItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.relative_path, self.reason)
    }
}

/// 一次同步的结果
#[derive(Debug, Clone, Default)]
pub struct SyncResult {
    pub status_log: Vec<String>,
    pub succeeded: Vec<String>,
    pub failed: Vec<FailedItem>,
}

impl SyncResult {
    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty()
    }
}

/// 进度事件
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    Status(String),
    Succeeded(String),
    Failed(FailedItem),
}

/// 同步请求
#[derive(Debug, Clone)]
pub struct SyncRequest {
    pub device: String,
    pub local_root: PathBuf,
    pub remote_root: String,
    pub recursive: bool,
}

/// 一次同步会话（每次运行一个，运行时消耗自身）
pub struct SyncSession {
    request: SyncRequest,
    token: CancellationToken,
    executor: TransferExecutor,
    events: Option<mpsc::Sender<SyncEvent>>,
    result: SyncResult,
}

impl SyncSession {
    pub fn new(shell: Arc<dyn RemoteShell>, request: SyncRequest, config: &EngineConfig) -> Self {
        Self::with_token(shell, request, config.step_delay(), CancellationToken::new())
    }

    fn with_token(
        shell: Arc<dyn RemoteShell>,
        request: SyncRequest,
        step_delay: Duration,
        token: CancellationToken,
    ) -> Self {
        let executor = TransferExecutor::new(shell, request.device.clone(), step_delay, token.clone());
        Self {
            request,
            token,
            executor,
            events: None,
            result: SyncResult::default(),
        }
    }

    /// 设置进度事件通道
    pub fn with_events(mut self, events: Option<mpsc::Sender<SyncEvent>>) -> Self {
        self.events = events;
        self
    }

    /// 取消令牌（克隆后可在其他任务中取消）
    pub fn cancel_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// 设备 -> 本地
    pub async fn sync_to_local(mut self) -> Result<SyncResult, SyncError> {
        self.require_device()?;
        self.require_both_roots()?;

        let remote_root = self.request.remote_root.trim().to_string();
        let local_root = self.request.local_root.clone();
        let recursive = self.request.recursive;
        info!("开始从设备同步: {} -> {:?} (递归: {})", remote_root, local_root, recursive);

        tokio::fs::create_dir_all(&local_root).await?;

        self.status("Getting file list...".to_string()).await;
        if self.token.is_cancelled() {
            return Err(self.cancelled().await);
        }

        let listing = self.executor.list(&remote_root, recursive).await;
        let entries = parse_listing(&listing, &remote_root);
        debug!("远程条目: {}", entries.len());

        let actions = plan_pull(&entries, &remote_root, &local_root, recursive, |p| p.exists());
        self.run_actions(&actions, SyncDirection::ToLocal).await?;

        self.status("Done syncing from device.".to_string()).await;
        Ok(self.finish())
    }

    /// 本地 -> 设备
    pub async fn sync_to_remote(mut self) -> Result<SyncResult, SyncError> {
        self.require_device()?;
        self.require_both_roots()?;
        if !self.request.local_root.is_dir() {
            return Err(ConfigError::LocalRootMissing(self.request.local_root.clone()).into());
        }

        let remote_root = self.request.remote_root.trim().to_string();
        let local_root = self.request.local_root.clone();
        let recursive = self.request.recursive;
        info!("开始同步到设备: {:?} -> {} (递归: {})", local_root, remote_root, recursive);

        self.status("Getting local file list...".to_string()).await;
        let inventory = FileScanner::new(recursive).scan(&local_root).await?;
        if self.token.is_cancelled() {
            return Err(self.cancelled().await);
        }

        self.executor.ensure_remote_dir(&remote_root).await;

        let actions = plan_push(&inventory, &local_root, &remote_root, recursive);
        self.run_actions(&actions, SyncDirection::ToRemote).await?;

        self.status("Done syncing to device.".to_string()).await;
        Ok(self.finish())
    }

    /// 推送任意文件或目录
    ///
    /// 目录以自身为相对路径基准（内容直接放到远程根目录下），
    /// 文件以所在目录为基准。不存在的路径被忽略。
    pub async fn push_paths(mut self, paths: &[PathBuf]) -> Result<SyncResult, SyncError> {
        self.require_device()?;
        if self.request.remote_root.trim().is_empty() {
            return Err(ConfigError::MissingRemoteDirectory.into());
        }

        let remote_root = self.request.remote_root.trim().to_string();
        let recursive = self.request.recursive;
        info!("推送 {} 个拖放路径到 {}", paths.len(), remote_root);

        self.executor.ensure_remote_dir(&remote_root).await;

        let scanner = FileScanner::new(recursive);
        let mut actions = Vec::new();
        for path in paths {
            if path.is_dir() {
                let inventory = scanner.scan(path).await?;
                actions.extend(plan_push_files(path, &inventory.files, &remote_root));
            } else if path.is_file() {
                let Some(entry) = dropped_file_entry(path).await else {
                    continue;
                };
                let base = path.parent().unwrap_or_else(|| Path::new(""));
                actions.extend(plan_push_files(base, &[entry], &remote_root));
            } else {
                warn!("忽略不存在的路径: {:?}", path);
            }
        }

        self.run_actions(&actions, SyncDirection::ToRemote).await?;

        self.status("Done pushing dropped files.".to_string()).await;
        Ok(self.finish())
    }

    /// 按计划顺序逐个执行
    async fn run_actions(
        &mut self,
        actions: &[SyncAction],
        direction: SyncDirection,
    ) -> Result<(), SyncError> {
        let total = actions.iter().filter(|a| a.is_counted()).count();
        let mut index = 0;

        for action in actions {
            if self.token.is_cancelled() {
                return Err(self.cancelled().await);
            }

            if action.kind == ActionKind::StampDir {
                self.executor.stamp_dir(direction, action).await;
                continue;
            }

            index += 1;
            let rel = action.relative_path.as_str();
            match action.kind {
                ActionKind::SkipFiltered => {
                    self.status(format!("Skipping subfolder file {}/{}: {}", index, total, rel))
                        .await;
                }
                ActionKind::SkipExisting => {
                    self.status(format!("Skipping existing file {}/{}: {}", index, total, rel))
                        .await;
                    self.executor.pace().await;
                }
                ActionKind::CreateDir => {
                    self.executor.create_dir(direction, action).await;
                    self.status(format!("Created folder {}/{}: {}", index, total, rel))
                        .await;
                }
                ActionKind::CopyToLocal => {
                    self.status(format!("Pulling {}/{}: {}...", index, total, rel))
                        .await;
                    self.executor.pace().await;
                    if self.token.is_cancelled() {
                        return Err(self.cancelled().await);
                    }
                    let outcome = self.executor.pull_file(action).await;
                    self.record("pulled", "pull", index, total, rel, outcome).await;
                    self.executor.pace().await;
                }
                ActionKind::CopyToRemote => {
                    let exists = self.executor.prepare_push(action).await;
                    if self.token.is_cancelled() {
                        return Err(self.cancelled().await);
                    }
                    if exists {
                        self.status(format!("Skipping existing file {}/{}: {}", index, total, rel))
                            .await;
                        self.executor.pace().await;
                        continue;
                    }
                    self.status(format!("Pushing {}/{}: {}...", index, total, rel))
                        .await;
                    self.executor.pace().await;
                    // 停顿期间取消则不再开始传输
                    if self.token.is_cancelled() {
                        return Err(self.cancelled().await);
                    }
                    let outcome = self.executor.push_file(action).await;
                    self.record("pushed", "push", index, total, rel, outcome).await;
                    self.executor.pace().await;
                }
                ActionKind::StampDir => {}
            }
        }

        Ok(())
    }

    async fn record(
        &mut self,
        done: &str,
        verb: &str,
        index: usize,
        total: usize,
        rel: &str,
        outcome: Result<(), FailureReason>,
    ) {
        match outcome {
            Ok(()) => {
                debug!("传输成功: {}", rel);
                self.result.succeeded.push(rel.to_string());
                self.emit(SyncEvent::Succeeded(rel.to_string())).await;
                self.status(format!("Successfully {} {}/{}: {}", done, index, total, rel))
                    .await;
            }
            Err(reason) => {
                warn!("传输失败: {} ({})", rel, reason);
                let item = FailedItem {
                    relative_path: rel.to_string(),
                    reason: reason.clone(),
                };
                self.result.failed.push(item.clone());
                self.emit(SyncEvent::Failed(item)).await;
                self.status(format!(
                    "Failed to {} {}/{}: {} ({})",
                    verb, index, total, rel, reason
                ))
                .await;
            }
        }
    }

    fn require_device(&self) -> Result<(), ConfigError> {
        if self.request.device.trim().is_empty() {
            return Err(ConfigError::NoDevice);
        }
        Ok(())
    }

    fn require_both_roots(&self) -> Result<(), ConfigError> {
        if self.request.remote_root.trim().is_empty()
            || self.request.local_root.as_os_str().is_empty()
        {
            return Err(ConfigError::MissingDirectories);
        }
        Ok(())
    }

    async fn status(&mut self, line: String) {
        self.result.status_log.push(line.clone());
        self.emit(SyncEvent::Status(line)).await;
    }

    async fn emit(&self, event: SyncEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event).await;
        }
    }

    async fn cancelled(&mut self) -> SyncError {
        info!("同步已取消");
        self.status("Sync canceled by user.".to_string()).await;
        SyncError::Cancelled(std::mem::take(&mut self.result))
    }

    fn finish(self) -> SyncResult {
        info!(
            "同步完成: 成功 {}, 失败 {}",
            self.result.succeeded.len(),
            self.result.failed.len()
        );
        self.result
    }
}

/// 控制器使用外部令牌创建会话
pub(crate) fn session_with_token(
    shell: Arc<dyn RemoteShell>,
    request: SyncRequest,
    config: &EngineConfig,
    token: CancellationToken,
) -> SyncSession {
    SyncSession::with_token(shell, request, config.step_delay(), token)
}

async fn dropped_file_entry(path: &Path) -> Option<LocalEntry> {
    let name = path.file_name()?.to_string_lossy().into_owned();
    let modified = tokio::fs::metadata(path).await.and_then(|m| m.modified());
    match modified {
        Ok(modified) => Some(LocalEntry {
            relative_path: name,
            modified_at: from_system_time(modified),
            is_dir: false,
        }),
        Err(e) => {
            warn!("无法读取文件信息 {:?}: {}", path, e);
            None
        }
    }
}
