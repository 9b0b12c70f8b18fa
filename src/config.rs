//! 应用配置模块

use crate::logging::LogConfig;
use crate::remote::COMMAND_TIMEOUT_SECS;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// 配置文件名
pub const CONFIG_FILE: &str = "config.json";

/// adb 通道配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdbConfig {
    /// adb 可执行文件路径
    #[serde(default = "default_adb_path")]
    pub path: String,
    /// 单条命令超时（秒）
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,
}

fn default_adb_path() -> String {
    "adb".to_string()
}

fn default_command_timeout() -> u64 {
    COMMAND_TIMEOUT_SECS
}

impl Default for AdbConfig {
    fn default() -> Self {
        Self {
            path: default_adb_path(),
            command_timeout_secs: default_command_timeout(),
        }
    }
}

/// 同步引擎配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    /// 每次远程命令后的停顿（毫秒）
    #[serde(default = "default_step_delay_ms")]
    pub step_delay_ms: u64,
    /// 是否递归同步子目录
    #[serde(default = "default_recursive")]
    pub recursive: bool,
}

fn default_step_delay_ms() -> u64 {
    50
}

fn default_recursive() -> bool {
    true
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            step_delay_ms: default_step_delay_ms(),
            recursive: default_recursive(),
        }
    }
}

impl EngineConfig {
    pub fn step_delay(&self) -> Duration {
        Duration::from_millis(self.step_delay_ms)
    }
}

/// 完整应用配置（config.json 中的各个小节）
#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    pub adb: AdbConfig,
    pub sync: EngineConfig,
    pub log: LogConfig,
}

impl AppConfig {
    /// 从配置目录加载，缺失或损坏的小节使用默认值
    pub fn load(config_dir: &Path) -> Self {
        let root = read_config_json(config_dir);
        Self {
            adb: section(&root, "adb"),
            sync: section(&root, "sync"),
            log: section(&root, "log"),
        }
    }
}

/// 读取 config.json，失败时返回空对象
pub(crate) fn read_config_json(config_dir: &Path) -> serde_json::Value {
    fs::read_to_string(config_dir.join(CONFIG_FILE))
        .ok()
        .and_then(|content| serde_json::from_str::<serde_json::Value>(&content).ok())
        .unwrap_or_else(|| serde_json::json!({}))
}

pub(crate) fn section<T: DeserializeOwned + Default>(root: &serde_json::Value, key: &str) -> T {
    root.get(key)
        .and_then(|value| serde_json::from_value::<T>(value.clone()).ok())
        .unwrap_or_default()
}

/// 平台默认数据目录
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .map(|p| p.join("adbsync"))
        .unwrap_or_else(|| PathBuf::from(".adbsync"))
}

/// 解析应用数据目录（支持 config.json 中的 data_path 自定义）
pub fn resolve_config_dir() -> PathBuf {
    resolve_data_path(default_config_dir())
}

fn resolve_data_path(default_dir: PathBuf) -> PathBuf {
    read_config_json(&default_dir)
        .get("data_path")
        .and_then(|v| v.as_str())
        .map(PathBuf::from)
        .filter(|p| p.is_dir())
        .unwrap_or(default_dir)
}
