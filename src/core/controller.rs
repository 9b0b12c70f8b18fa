//! 会话控制器 - 同一时间只保留一个活动会话

use super::engine::{session_with_token, SyncError, SyncEvent, SyncRequest, SyncResult};
use crate::config::EngineConfig;
use crate::remote::RemoteShell;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

/// 会话要执行的任务
#[derive(Debug, Clone)]
pub enum SyncTask {
    Pull,
    Push,
    PushPaths(Vec<PathBuf>),
}

type SessionOutcome = Result<SyncResult, SyncError>;
type OutcomeSlot = Arc<Mutex<Option<SessionOutcome>>>;

struct ActiveSession {
    id: Uuid,
    token: CancellationToken,
    /// 会话任务结束后置为 true
    finished: watch::Receiver<bool>,
    /// 结果由 wait() 或 close() 取走
    outcome: OutcomeSlot,
}

/// 会话控制器
pub struct SyncController {
    shell: Arc<dyn RemoteShell>,
    config: EngineConfig,
    active: Mutex<Option<ActiveSession>>,
}

impl SyncController {
    pub fn new(shell: Arc<dyn RemoteShell>, config: EngineConfig) -> Self {
        Self {
            shell,
            config,
            active: Mutex::new(None),
        }
    }

    /// 启动新会话，先取消并等待旧会话结束
    ///
    /// 旧会话的结果留给仍在 wait() 的调用方。
    pub async fn start(
        &self,
        request: SyncRequest,
        task: SyncTask,
        events: Option<mpsc::Sender<SyncEvent>>,
    ) -> Uuid {
        let mut active = self.active.lock().await;
        if let Some(previous) = active.take() {
            info!("取消上一个会话: {}", previous.id);
            previous.token.cancel();
            until_finished(previous.finished).await;
            debug!("会话 {} 已结束", previous.id);
        }

        let id = Uuid::new_v4();
        let token = CancellationToken::new();
        let session = session_with_token(self.shell.clone(), request, &self.config, token.clone())
            .with_events(events);

        debug!("启动会话 {}: {:?}", id, task);
        let (done_tx, finished) = watch::channel(false);
        let outcome: OutcomeSlot = Arc::new(Mutex::new(None));
        let slot = outcome.clone();
        tokio::spawn(async move {
            let handle = tokio::spawn(async move {
                match task {
                    SyncTask::Pull => session.sync_to_local().await,
                    SyncTask::Push => session.sync_to_remote().await,
                    SyncTask::PushPaths(paths) => session.push_paths(&paths).await,
                }
            });
            let result = join(handle).await;
            *slot.lock().await = Some(result);
            let _ = done_tx.send(true);
        });

        *active = Some(ActiveSession {
            id,
            token,
            finished,
            outcome,
        });
        id
    }

    /// 发出取消信号，不等待
    pub async fn cancel(&self) -> bool {
        match self.active.lock().await.as_ref() {
            Some(session) => {
                session.token.cancel();
                true
            }
            None => false,
        }
    }

    /// 取消并等待当前会话结束
    pub async fn close(&self) -> Option<SessionOutcome> {
        let session = self.active.lock().await.take()?;
        session.token.cancel();
        until_finished(session.finished).await;
        debug!("会话 {} 已结束", session.id);
        let outcome = session.outcome.lock().await.take();
        outcome
    }

    /// 等待当前会话自然结束
    ///
    /// 等待期间不持有锁，cancel()、start()、close() 仍然可用。
    /// 结果已被 close() 取走时返回 None。
    pub async fn wait(&self) -> Option<SessionOutcome> {
        let (id, finished, outcome) = {
            let active = self.active.lock().await;
            let session = active.as_ref()?;
            (session.id, session.finished.clone(), session.outcome.clone())
        };

        until_finished(finished).await;
        let result = outcome.lock().await.take();

        let mut active = self.active.lock().await;
        if active.as_ref().is_some_and(|s| s.id == id) {
            *active = None;
        }
        result
    }

    /// 当前会话 ID
    pub async fn active_id(&self) -> Option<Uuid> {
        self.active.lock().await.as_ref().map(|s| s.id)
    }
}

async fn until_finished(mut finished: watch::Receiver<bool>) {
    // 发送端被丢弃同样视为结束
    let _ = finished.wait_for(|done| *done).await;
}

async fn join(handle: JoinHandle<SessionOutcome>) -> SessionOutcome {
    handle.await.unwrap_or_else(|e| Err(SyncError::Io(io::Error::other(e))))
}
