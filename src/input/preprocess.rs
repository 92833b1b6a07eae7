// 该文件是 Lajiao（辣椒）项目的一部分。
// src/input/preprocess.rs - 图像预处理
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::{Path, PathBuf};

use image::{DynamicImage, ImageFormat, ImageReader};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum PreprocessError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像解码错误: {0}")]
  Decode(image::ImageError),
  #[error("图像保存错误: {0}")]
  Encode(image::ImageError),
  #[error("预处理任务异常终止: {0}")]
  Join(#[from] tokio::task::JoinError),
}

/// 摄像头安装方向固定，顺时针旋转 90° 后原地覆盖保存为 JPEG
///
/// 返回旋转后的 (宽, 高)。
pub fn rotate_in_place(path: &Path) -> Result<(u32, u32), PreprocessError> {
  let image = ImageReader::open(path)?
    .with_guessed_format()?
    .decode()
    .map_err(PreprocessError::Decode)?;

  let rotated = DynamicImage::ImageRgb8(image.rotate90().into_rgb8());
  rotated
    .save_with_format(path, ImageFormat::Jpeg)
    .map_err(PreprocessError::Encode)?;

  debug!(
    "旋转图像 {}: {}x{} -> {}x{}",
    path.display(),
    image.width(),
    image.height(),
    rotated.width(),
    rotated.height()
  );
  Ok((rotated.width(), rotated.height()))
}

pub async fn rotate(path: PathBuf) -> Result<(u32, u32), PreprocessError> {
  tokio::task::spawn_blocking(move || rotate_in_place(&path)).await?
}
