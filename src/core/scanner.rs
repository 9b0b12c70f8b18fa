use super::timestamp::from_system_time;
use chrono::{DateTime, Local};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

/// 本地文件或目录
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalEntry {
    /// 相对于扫描根目录的路径，统一使用 `/`
    pub relative_path: String,
    pub modified_at: DateTime<Local>,
    pub is_dir: bool,
}

/// 本地扫描结果
#[derive(Debug, Clone, Default)]
pub struct LocalInventory {
    /// 文件（遍历顺序）
    pub files: Vec<LocalEntry>,
    /// 目录（遍历顺序，父目录先于子目录）
    pub dirs: Vec<LocalEntry>,
}

/// 本地目录扫描器
pub struct FileScanner {
    recursive: bool,
}

impl FileScanner {
    pub fn new(recursive: bool) -> Self {
        Self { recursive }
    }

    /// 扫描目录，返回文件和子目录（不含根目录本身，不跟随符号链接）
    pub async fn scan(&self, root: &Path) -> io::Result<LocalInventory> {
        info!("开始扫描本地目录: {:?} (递归: {})", root, self.recursive);

        let root = root.to_path_buf();
        let recursive = self.recursive;
        // 使用 spawn_blocking 避免阻塞 async runtime
        let inventory = tokio::task::spawn_blocking(move || walk(&root, recursive))
            .await
            .map_err(io::Error::other)??;

        info!(
            "扫描完成: {} 个文件, {} 个目录",
            inventory.files.len(),
            inventory.dirs.len()
        );
        Ok(inventory)
    }
}

impl Default for FileScanner {
    fn default() -> Self {
        Self::new(true)
    }
}

fn walk(root: &Path, recursive: bool) -> io::Result<LocalInventory> {
    if !root.is_dir() {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("local directory does not exist: {}", root.display()),
        ));
    }

    let mut walker = WalkDir::new(root)
        .follow_links(false)
        .min_depth(1)
        .sort_by_file_name();
    if !recursive {
        walker = walker.max_depth(1);
    }

    let mut inventory = LocalInventory::default();
    for entry in walker.into_iter() {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                debug!("跳过无法访问的路径: {}", e);
                continue;
            }
        };

        let file_type = entry.file_type();
        if file_type.is_symlink() {
            debug!("跳过符号链接: {:?}", entry.path());
            continue;
        }

        let Some(relative_path) = relative_path(root, entry.path()) else {
            continue;
        };
        let Some(modified) = entry.metadata().ok().and_then(|m| m.modified().ok()) else {
            debug!("无法读取修改时间: {:?}", entry.path());
            continue;
        };

        let local = LocalEntry {
            relative_path,
            modified_at: from_system_time(modified),
            is_dir: file_type.is_dir(),
        };
        if local.is_dir {
            inventory.dirs.push(local);
        } else {
            inventory.files.push(local);
        }
    }

    Ok(inventory)
}

/// 计算相对路径并规范化为 `/` 分隔
pub fn relative_path(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    if parts.is_empty() {
        return None;
    }
    Some(parts.join("/"))
}

/// 相对路径（`/` 分隔）-> 本地路径
pub fn local_path_for(root: &Path, relative_path: &str) -> PathBuf {
    relative_path
        .split('/')
        .filter(|p| !p.is_empty())
        .fold(root.to_path_buf(), |acc, part| acc.join(part))
}
