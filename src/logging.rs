//! 日志模块 - 文件日志（按大小轮转）与 tracing 订阅器初始化

use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// 日志文件名
pub const LOG_FILE: &str = "adbsync.log";

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogConfig {
    /// 是否启用文件日志
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// 最大日志文件大小（MB）
    #[serde(default = "default_max_size_mb")]
    pub max_size_mb: u32,
    /// 日志级别: "error", "warn", "info", "debug", "trace"
    #[serde(default = "default_level")]
    pub level: String,
}

fn default_enabled() -> bool {
    true
}

fn default_max_size_mb() -> u32 {
    5
}

fn default_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            max_size_mb: default_max_size_mb(),
            level: default_level(),
        }
    }
}

impl LogConfig {
    /// 从 config.json 的 log 小节加载
    pub fn load(config_dir: &Path) -> Self {
        crate::config::section(&crate::config::read_config_json(config_dir), "log")
    }

    /// 将配置的日志级别转换为 tracing Level
    pub fn tracing_level(&self) -> tracing::Level {
        match self.level.to_lowercase().as_str() {
            "error" => tracing::Level::ERROR,
            "warn" => tracing::Level::WARN,
            "debug" => tracing::Level::DEBUG,
            "trace" => tracing::Level::TRACE,
            _ => tracing::Level::INFO,
        }
    }
}

struct RotatingFile {
    path: PathBuf,
    max_size: u64,
    writer: Option<BufWriter<File>>,
}

impl RotatingFile {
    fn open(path: &Path) -> io::Result<BufWriter<File>> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(BufWriter::new(file))
    }

    /// 超过大小限制时把当前文件改名为 .old 并重新打开
    fn rotate_if_needed(&mut self) -> io::Result<()> {
        let size = fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0);
        if size <= self.max_size {
            return Ok(());
        }

        if let Some(mut w) = self.writer.take() {
            let _ = w.flush();
        }

        let backup = self.path.with_extension("log.old");
        if backup.exists() {
            fs::remove_file(&backup)?;
        }
        fs::rename(&self.path, &backup)?;
        self.writer = Some(Self::open(&self.path)?);
        Ok(())
    }
}

/// 带大小限制的日志写入器
#[derive(Clone)]
pub struct SizeRotatingWriter {
    inner: Arc<Mutex<RotatingFile>>,
}

impl SizeRotatingWriter {
    pub fn new(log_dir: &Path, max_size_mb: u32) -> io::Result<Self> {
        fs::create_dir_all(log_dir)?;
        let path = log_dir.join(LOG_FILE);
        let mut file = RotatingFile {
            writer: Some(RotatingFile::open(&path)?),
            path,
            max_size: u64::from(max_size_mb.max(1)) * 1024 * 1024,
        };
        file.rotate_if_needed()?;
        Ok(Self {
            inner: Arc::new(Mutex::new(file)),
        })
    }

    fn lock(&self) -> MutexGuard<'_, RotatingFile> {
        // 写日志时 panic 不应让后续日志全部丢失
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// 单次写入句柄
pub struct LogWriter {
    owner: SizeRotatingWriter,
}

impl Write for LogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut file = self.owner.lock();
        let written = match file.writer.as_mut() {
            Some(w) => {
                let n = w.write(buf)?;
                w.flush()?;
                n
            }
            None => return Err(io::Error::new(io::ErrorKind::Other, "Writer not available")),
        };
        let _ = file.rotate_if_needed();
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.owner.lock().writer.as_mut() {
            Some(w) => w.flush(),
            None => Ok(()),
        }
    }
}

impl<'a> MakeWriter<'a> for SizeRotatingWriter {
    type Writer = LogWriter;

    fn make_writer(&'a self) -> Self::Writer {
        LogWriter {
            owner: self.clone(),
        }
    }
}

/// 初始化 tracing 订阅器
///
/// 文件日志始终写入 `log_dir`；debug 构建额外输出到控制台。
/// 文件无法创建时退回到控制台输出。
pub fn init_logging(log_dir: &Path, config: &LogConfig) {
    if !config.enabled {
        let _ = tracing::subscriber::set_global_default(tracing_subscriber::registry());
        return;
    }

    let env_filter = EnvFilter::from_default_env().add_directive(config.tracing_level().into());

    match SizeRotatingWriter::new(log_dir, config.max_size_mb) {
        Ok(file_writer) => {
            let file_layer = tracing_subscriber::fmt::layer()
                .with_writer(file_writer)
                .with_ansi(false)
                .with_target(false);

            let console_layer = cfg!(debug_assertions).then(|| {
                tracing_subscriber::fmt::layer()
                    .with_writer(io::stderr)
                    .with_target(false)
            });

            let subscriber = tracing_subscriber::registry()
                .with(env_filter)
                .with(file_layer)
                .with(console_layer);
            let _ = tracing::subscriber::set_global_default(subscriber);
        }
        Err(e) => {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_writer(io::stderr)
                .try_init();
            tracing::warn!("无法创建日志文件 {:?}: {}", log_dir, e);
        }
    }
}
