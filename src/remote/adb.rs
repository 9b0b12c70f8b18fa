use super::{RemoteShell, ShellError, COMMAND_TIMEOUT_SECS};
use crate::config::AdbConfig;
use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

/// 基于 adb 可执行文件的远程通道
pub struct AdbShell {
    program: String,
    timeout: Duration,
}

impl AdbShell {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            timeout: Duration::from_secs(COMMAND_TIMEOUT_SECS),
        }
    }

    pub fn with_config(config: &AdbConfig) -> Self {
        Self {
            program: config.path.clone(),
            timeout: Duration::from_secs(config.command_timeout_secs.max(1)),
        }
    }

    fn build_args(device: &str, command_line: &str) -> Vec<String> {
        let mut args = Vec::new();
        if !device.is_empty() {
            args.push("-s".to_string());
            args.push(device.to_string());
        }
        args.extend(split_command_line(command_line));
        args
    }
}

#[async_trait]
impl RemoteShell for AdbShell {
    async fn run_captured(&self, device: &str, command_line: &str) -> Result<String, ShellError> {
        let args = Self::build_args(device, command_line);
        debug!("adb {}", args.join(" "));

        let child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ShellError::Launch {
                program: self.program.clone(),
                source,
            })?;

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result?,
            Err(_) => {
                warn!("adb 命令超时: {}", command_line);
                return Err(ShellError::Timeout(self.timeout.as_secs()));
            }
        };

        if !output.status.success() {
            debug!(
                "adb 退出码 {:?}: {}",
                output.status.code(),
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn name(&self) -> &str {
        "ADB"
    }
}

/// 将命令行拆分为参数
///
/// 双引号用于分组，`\"` 表示字面引号；其余反斜杠保持原样，
/// 这样 `\ ` 转义能原样传到设备端 shell。
pub fn split_command_line(line: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut has_token = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\\' if chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
                has_token = true;
            }
            '"' => {
                in_quotes = !in_quotes;
                has_token = true;
            }
            c if c.is_whitespace() && !in_quotes => {
                if has_token {
                    args.push(std::mem::take(&mut current));
                    has_token = false;
                }
            }
            c => {
                current.push(c);
                has_token = true;
            }
        }
    }

    if has_token {
        args.push(current);
    }

    args
}
