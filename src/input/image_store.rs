// 该文件是 Lajiao（辣椒）项目的一部分。
// src/input/image_store.rs - 上传图像存储与保留策略
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::{Uuid, Version};

pub const UPLOAD_EXTENSION: &str = "jpg";
pub const ANNOTATED_SUFFIX: &str = "_det";

#[derive(Error, Debug)]
pub enum StoreError {
  #[error("无法创建存储目录 {path}: {source}")]
  CreateDir {
    path: PathBuf,
    source: std::io::Error,
  },
  #[error("I/O 错误 ({path}): {source}")]
  Io {
    path: PathBuf,
    source: std::io::Error,
  },
}

impl StoreError {
  fn io(path: &Path, source: std::io::Error) -> Self {
    StoreError::Io {
      path: path.to_path_buf(),
      source,
    }
  }
}

/// 上传图像目录
///
/// 文件名为 UUIDv7，按名字排序即为保存顺序；标注图 `<uuid>_det.jpg` 紧随原图。
pub struct ImageStore {
  directory: PathBuf,
  retention: Mutex<()>,
}

impl ImageStore {
  pub fn open(directory: impl Into<PathBuf>) -> Result<Self, StoreError> {
    let directory = directory.into();
    if !directory.exists() {
      std::fs::create_dir_all(&directory).map_err(|source| StoreError::CreateDir {
        path: directory.clone(),
        source,
      })?;
    }
    info!("图像存储目录: {}", directory.display());

    Ok(Self {
      directory,
      retention: Mutex::new(()),
    })
  }

  pub async fn store(&self, bytes: &[u8]) -> Result<PathBuf, StoreError> {
    let path = self
      .directory
      .join(format!("{}.{}", Uuid::now_v7(), UPLOAD_EXTENSION));
    tokio::fs::write(&path, bytes)
      .await
      .map_err(|e| StoreError::io(&path, e))?;
    debug!("保存上传图像: {} ({} 字节)", path.display(), bytes.len());
    Ok(path)
  }

  /// 检测结果标注图的路径：`<stem>_det.jpg`，与原图同目录
  pub fn annotated_path(source: &Path) -> PathBuf {
    let stem = source
      .file_stem()
      .map(|s| s.to_string_lossy().into_owned())
      .unwrap_or_default();
    source.with_file_name(format!("{}{}.{}", stem, ANNOTATED_SUFFIX, UPLOAD_EXTENSION))
  }

  /// 只保留最新的 `max_files` 个文件，返回被删除的路径
  ///
  /// 按保存顺序从旧到新排列：本存储生成的文件取文件名中的 UUIDv7，
  /// 其他文件退回到修改时间。`keep` 中的路径永不删除，同一时刻只允许一次清理。
  pub async fn enforce_retention(
    &self,
    max_files: usize,
    keep: &[PathBuf],
  ) -> Result<Vec<PathBuf>, StoreError> {
    let _guard = self.retention.lock().await;

    let mut files: Vec<(SystemTime, Uuid, PathBuf)> = Vec::new();
    let mut entries = tokio::fs::read_dir(&self.directory)
      .await
      .map_err(|e| StoreError::io(&self.directory, e))?;
    while let Some(entry) = entries
      .next_entry()
      .await
      .map_err(|e| StoreError::io(&self.directory, e))?
    {
      let path = entry.path();
      let metadata = match entry.metadata().await {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == ErrorKind::NotFound => continue,
        Err(e) => return Err(StoreError::io(&path, e)),
      };
      if !metadata.is_file() {
        continue;
      }
      let (time, id) = match stored_id(&path) {
        Some(found) => found,
        None => (
          metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
          Uuid::nil(),
        ),
      };
      files.push((time, id, path));
    }

    if files.len() <= max_files {
      return Ok(Vec::new());
    }

    files.sort();
    let excess = files.len() - max_files;
    let mut removed = Vec::with_capacity(excess);
    for (_, _, path) in files.into_iter().take(excess) {
      if keep.contains(&path) {
        debug!("跳过正在使用的文件: {}", path.display());
        continue;
      }
      match tokio::fs::remove_file(&path).await {
        Ok(()) => removed.push(path),
        Err(e) if e.kind() == ErrorKind::NotFound => {
          warn!("文件已被删除: {}", path.display());
        }
        Err(e) => return Err(StoreError::io(&path, e)),
      }
    }

    info!("清理旧图像 {} 个", removed.len());
    Ok(removed)
  }
}

/// 从 `<uuid>.jpg` 或 `<uuid>_det.jpg` 中取出 UUIDv7 及其时间戳
fn stored_id(path: &Path) -> Option<(SystemTime, Uuid)> {
  let stem = path.file_stem()?.to_str()?;
  let stem = stem.strip_suffix(ANNOTATED_SUFFIX).unwrap_or(stem);
  let id = Uuid::parse_str(stem).ok()?;
  if id.get_version() != Some(Version::SortRand) {
    return None;
  }
  let (secs, nanos) = id.get_timestamp()?.to_unix();
  Some((SystemTime::UNIX_EPOCH + Duration::new(secs, nanos), id))
}
