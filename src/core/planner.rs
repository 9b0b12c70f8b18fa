//! 同步计划：源清单 + 目标存在性 -> 有序动作列表
//!
//! 只按路径判断，不比较内容或时间：目标已存在即跳过，从不覆盖。

use super::listing::{normalize_remote_dir, relative_remote_path, RemoteEntry};
use super::scanner::{local_path_for, LocalEntry, LocalInventory};
use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};

/// 动作类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    /// 创建目录（本地或远程）
    CreateDir,
    /// 设备 -> 本地
    CopyToLocal,
    /// 本地 -> 设备
    CopyToRemote,
    /// 目标已存在
    SkipExisting,
    /// 非递归模式下的子目录内容
    SkipFiltered,
    /// 文件就位后重新设置目录时间
    StampDir,
}

/// 同步动作
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncAction {
    pub kind: ActionKind,
    /// 相对路径，`/` 分隔
    pub relative_path: String,
    pub local_path: PathBuf,
    pub remote_path: String,
    /// 源端修改时间
    pub source_modified_at: DateTime<Local>,
}

impl SyncAction {
    /// 是否计入进度（StampDir 不产生状态行）
    pub fn is_counted(&self) -> bool {
        self.kind != ActionKind::StampDir
    }
}

/// 远程根目录 + 相对路径
pub fn remote_path_for(remote_root: &str, relative_path: &str) -> String {
    let root = normalize_remote_dir(remote_root);
    if root == "/" {
        format!("/{}", relative_path)
    } else {
        format!("{}/{}", root, relative_path)
    }
}

/// 设备 -> 本地
///
/// `exists` 判断本地目标是否已存在。本次创建的目录在末尾追加 StampDir，
/// 按路径长度从短到长排列。
pub fn plan_pull<F>(
    entries: &[RemoteEntry],
    remote_root: &str,
    local_root: &Path,
    recursive: bool,
    exists: F,
) -> Vec<SyncAction>
where
    F: Fn(&Path) -> bool,
{
    let mut actions = Vec::with_capacity(entries.len());
    let mut created = Vec::new();

    for entry in entries {
        let Some(relative_path) = relative_remote_path(remote_root, &entry.path) else {
            continue;
        };
        if relative_path.is_empty() {
            continue;
        }

        let local_path = local_path_for(local_root, &relative_path);
        let kind = if !recursive && (relative_path.contains('/') || entry.is_dir()) {
            ActionKind::SkipFiltered
        } else if exists(&local_path) {
            ActionKind::SkipExisting
        } else if entry.is_dir() {
            ActionKind::CreateDir
        } else {
            ActionKind::CopyToLocal
        };

        let action = SyncAction {
            kind,
            relative_path,
            local_path,
            remote_path: entry.path.clone(),
            source_modified_at: entry.modified_at,
        };
        if kind == ActionKind::CreateDir {
            created.push(action.clone());
        }
        actions.push(action);
    }

    actions.extend(stamp_actions(created));
    actions
}

/// 本地 -> 设备
///
/// 递归时先创建全部目录（父目录在前），再逐个推送文件，最后补目录时间。
/// 远程是否已存在由执行器在推送前探测。
pub fn plan_push(
    inventory: &LocalInventory,
    local_root: &Path,
    remote_root: &str,
    recursive: bool,
) -> Vec<SyncAction> {
    let mut actions = Vec::new();

    if recursive {
        for dir in &inventory.dirs {
            actions.push(push_action(ActionKind::CreateDir, dir, local_root, remote_root));
        }
    }

    for file in &inventory.files {
        let kind = if !recursive && file.relative_path.contains('/') {
            ActionKind::SkipFiltered
        } else {
            ActionKind::CopyToRemote
        };
        actions.push(push_action(kind, file, local_root, remote_root));
    }

    if recursive {
        let dirs = inventory
            .dirs
            .iter()
            .map(|dir| push_action(ActionKind::CreateDir, dir, local_root, remote_root))
            .collect();
        actions.extend(stamp_actions(dirs));
    }

    actions
}

/// 拖放推送：`base` 为相对路径的基准目录
pub fn plan_push_files(base: &Path, files: &[LocalEntry], remote_root: &str) -> Vec<SyncAction> {
    files
        .iter()
        .filter(|f| !f.is_dir)
        .map(|f| push_action(ActionKind::CopyToRemote, f, base, remote_root))
        .collect()
}

fn push_action(kind: ActionKind, entry: &LocalEntry, local_root: &Path, remote_root: &str) -> SyncAction {
    SyncAction {
        kind,
        relative_path: entry.relative_path.clone(),
        local_path: local_path_for(local_root, &entry.relative_path),
        remote_path: remote_path_for(remote_root, &entry.relative_path),
        source_modified_at: entry.modified_at,
    }
}

fn stamp_actions(mut dirs: Vec<SyncAction>) -> Vec<SyncAction> {
    dirs.sort_by_key(|a| a.relative_path.len());
    dirs.into_iter()
        .map(|mut a| {
            a.kind = ActionKind::StampDir;
            a
        })
        .collect()
}
