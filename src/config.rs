// 该文件是 Lajiao（辣椒）项目的一部分。
// src/config.rs - 流水线配置
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use std::path::PathBuf;
use std::time::Duration;

use crate::state::DEFAULT_LOG_CAPACITY;

pub const DEFAULT_MAX_FILES: usize = 100;
pub const DEFAULT_DETECT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct PipelineConfig {
  /// 上传图像目录
  pub upload_dir: PathBuf,
  /// 目录中最多保留的文件数
  pub max_files: usize,
  pub detect_timeout: Duration,
  pub log_capacity: usize,
  /// 是否生成 `<stem>_det.jpg` 标注图
  pub annotate: bool,
  /// 标注文字所用字体，缺省时只画框
  pub font: Option<PathBuf>,
}

impl Default for PipelineConfig {
  fn default() -> Self {
    Self {
      upload_dir: PathBuf::from("chili_uploads"),
      max_files: DEFAULT_MAX_FILES,
      detect_timeout: DEFAULT_DETECT_TIMEOUT,
      log_capacity: DEFAULT_LOG_CAPACITY,
      annotate: cfg!(feature = "annotate"),
      font: None,
    }
  }
}

impl PipelineConfig {
  pub fn with_upload_dir(upload_dir: impl Into<PathBuf>) -> Self {
    Self {
      upload_dir: upload_dir.into(),
      ..Self::default()
    }
  }
}
