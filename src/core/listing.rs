//! 远程目录列表解析
//!
//! `ls -lR` 先输出目录头（`/sdcard/Music/Album:`），再输出该目录下的条目，
//! 条目本身不带完整路径。解析器用一个"当前目录"寄存器加逐行分类来还原路径。
//! 无法识别的行（空行、`total N`、错误信息）直接丢弃，不中断解析。

use super::timestamp::parse_listing_time;
use chrono::{DateTime, Local};
use regex::Regex;
use std::sync::LazyLock;
use tracing::debug;

static ENTRY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?<type>[-d])[rwx-]{9}\s+\d+\s+\S+\s+\S+\s+\d+\s+(?<date>\d{4}-\d{2}-\d{2})\s+(?<time>\d{2}:\d{2})\s+(?<name>.+)$",
    )
    .expect("listing entry pattern is valid")
});

/// 远程条目类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
}

/// 远程列表中的一条记录（已解析为绝对路径）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntry {
    pub path: String,
    pub kind: EntryKind,
    /// 无法解析时为解析时刻的当前时间
    pub modified_at: DateTime<Local>,
}

impl RemoteEntry {
    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }
}

/// 单行分类结果
#[derive(Debug, PartialEq, Eq)]
pub enum LineKind<'a> {
    /// 目录头，值为去掉冒号后的目录
    Header(&'a str),
    Entry {
        kind: EntryKind,
        date: &'a str,
        time: &'a str,
        name: &'a str,
    },
    Ignored,
}

/// 对单行进行分类（目录头优先于条目）
pub fn classify_line(line: &str) -> LineKind<'_> {
    if line.ends_with(':') {
        return LineKind::Header(line.trim_end_matches(':').trim());
    }

    let Some(caps) = ENTRY_RE.captures(line) else {
        return LineKind::Ignored;
    };

    // 正则已保证各分组存在
    let group = |name: &str| caps.name(name).map(|m| m.as_str()).unwrap_or_default();
    let kind = if group("type") == "d" {
        EntryKind::Directory
    } else {
        EntryKind::File
    };

    LineKind::Entry {
        kind,
        date: group("date"),
        time: group("time"),
        name: group("name").trim(),
    }
}

/// 去掉末尾的 `/`，根目录保持为 `/`
pub fn normalize_remote_dir(dir: &str) -> &str {
    let trimmed = dir.trim_end_matches('/');
    if trimmed.is_empty() && dir.starts_with('/') {
        "/"
    } else {
        trimmed
    }
}

/// `path` 是否位于 `root` 之下（含 root 本身）
pub fn is_under_root(root: &str, path: &str) -> bool {
    let root = normalize_remote_dir(root);
    let path = normalize_remote_dir(path);
    if root == "/" {
        return path.starts_with('/');
    }
    path == root || path.strip_prefix(root).is_some_and(|rest| rest.starts_with('/'))
}

/// 远程绝对路径 -> 相对于 root 的路径（`/` 分隔，无首尾斜杠）
pub fn relative_remote_path(root: &str, path: &str) -> Option<String> {
    if !is_under_root(root, path) {
        return None;
    }
    let root = normalize_remote_dir(root);
    let rest = if root == "/" { path } else { &path[root.len()..] };
    let parts: Vec<&str> = rest.split('/').filter(|p| !p.is_empty() && *p != ".").collect();
    Some(parts.join("/"))
}

/// 列表解析器（状态机）
pub struct ListingParser<'r> {
    root: &'r str,
    /// 当前目录；为 None 表示当前目录头不在 root 之下，其条目被丢弃
    current_dir: Option<String>,
    entries: Vec<RemoteEntry>,
    dropped: usize,
}

impl<'r> ListingParser<'r> {
    pub fn new(root: &'r str) -> Self {
        Self {
            root,
            current_dir: Some(normalize_remote_dir(root).to_string()),
            entries: Vec::new(),
            dropped: 0,
        }
    }

    /// 处理一行
    pub fn feed(&mut self, line: &str) {
        match classify_line(line) {
            LineKind::Header(dir) => {
                if is_under_root(self.root, dir) {
                    self.current_dir = Some(normalize_remote_dir(dir).to_string());
                } else {
                    debug!("忽略 root 之外的目录头: {}", dir);
                    self.current_dir = None;
                }
            }
            LineKind::Entry {
                kind,
                date,
                time,
                name,
            } => {
                let Some(dir) = self.current_dir.as_deref() else {
                    self.dropped += 1;
                    return;
                };
                if name.is_empty() || name == "." || name == ".." {
                    self.dropped += 1;
                    return;
                }
                let path = if dir == "/" {
                    format!("/{}", name)
                } else {
                    format!("{}/{}", dir, name)
                };
                self.entries.push(RemoteEntry {
                    path,
                    kind,
                    modified_at: parse_listing_time(date, time),
                });
            }
            LineKind::Ignored => {
                if !line.trim().is_empty() {
                    self.dropped += 1;
                }
            }
        }
    }

    /// 当前目录寄存器
    pub fn current_dir(&self) -> Option<&str> {
        self.current_dir.as_deref()
    }

    pub fn finish(self) -> Vec<RemoteEntry> {
        debug!(
            "列表解析完成: {} 个条目, {} 行被丢弃",
            self.entries.len(),
            self.dropped
        );
        self.entries
    }
}

/// 解析完整的列表输出
pub fn parse_listing(text: &str, root: &str) -> Vec<RemoteEntry> {
    let mut parser = ListingParser::new(root);
    for line in text.split(['\r', '\n']).filter(|l| !l.is_empty()) {
        parser.feed(line);
    }
    parser.finish()
}
