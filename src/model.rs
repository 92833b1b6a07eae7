// 该文件是 Lajiao（辣椒）项目的一部分。
// src/model.rs - 检测模型接口
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::FromUrl;

/// 检测器：输入图像路径，输出检测框集合
#[async_trait]
pub trait Detector: Send + Sync {
  async fn detect(&self, image: &Path) -> Result<DetectResult<RipenessLabel>, DetectError>;
}

#[derive(Debug, Clone)]
pub struct DetectItem<T> {
  pub kind: T,
  pub score: f32,
  pub bbox: Option<[f32; 4]>, // 归一化 [x_min, y_min, x_max, y_max]
}

#[derive(Debug, Clone)]
pub struct DetectResult<T> {
  pub items: Box<[DetectItem<T>]>,
}

impl<T> DetectResult<T> {
  pub fn empty() -> Self {
    Self {
      items: Box::new([]),
    }
  }

  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  pub fn len(&self) -> usize {
    self.items.len()
  }
}

impl<T> From<Vec<DetectItem<T>>> for DetectResult<T> {
  fn from(items: Vec<DetectItem<T>>) -> Self {
    Self {
      items: items.into_boxed_slice(),
    }
  }
}

pub trait WithLabel: Sized + std::fmt::Debug {
  fn to_label_str(&self) -> String;
  fn label_id(&self) -> u32;
  fn from_label_id(id: u32) -> Option<Self>;
}

/// 辣椒成熟度类别，编号与训练时的类别表一致
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RipenessLabel {
  Ripe,
  Unripe,
}

impl WithLabel for RipenessLabel {
  fn to_label_str(&self) -> String {
    match self {
      RipenessLabel::Ripe => "ripe".to_string(),
      RipenessLabel::Unripe => "unripe".to_string(),
    }
  }

  fn label_id(&self) -> u32 {
    match self {
      RipenessLabel::Ripe => 0,
      RipenessLabel::Unripe => 1,
    }
  }

  fn from_label_id(id: u32) -> Option<Self> {
    match id {
      0 => Some(RipenessLabel::Ripe),
      1 => Some(RipenessLabel::Unripe),
      _ => None,
    }
  }
}

#[derive(Error, Debug)]
pub enum DetectError {
  #[error("无法启动检测程序 {program}: {source}")]
  Spawn {
    program: String,
    source: std::io::Error,
  },
  #[error("检测程序异常退出 ({status}): {stderr}")]
  ExitStatus {
    status: std::process::ExitStatus,
    stderr: String,
  },
  #[error("检测结果解析失败: {0}")]
  Decode(#[from] serde_json::Error),
  #[error("未知类别编号: {0}")]
  UnknownClass(u32),
  #[error("I/O 错误: {0}")]
  Io(#[from] std::io::Error),
  #[cfg(feature = "http_detector")]
  #[error("远程检测服务错误: {0}")]
  Remote(#[from] reqwest::Error),
  #[error("检测器地址无效: {0}")]
  InvalidUrl(String),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

/// 检测器输出的 JSON 格式，子进程与远程服务共用
#[derive(Debug, Deserialize)]
struct WireReply {
  detections: Vec<WireDetection>,
}

#[derive(Debug, Deserialize)]
struct WireDetection {
  class: u32,
  confidence: f32,
  #[serde(default)]
  bbox: Option<[f32; 4]>,
}

pub(crate) fn parse_reply(bytes: &[u8]) -> Result<DetectResult<RipenessLabel>, DetectError> {
  let reply: WireReply = serde_json::from_slice(bytes)?;
  let items = reply
    .detections
    .into_iter()
    .map(|det| {
      let kind = RipenessLabel::from_label_id(det.class).ok_or(DetectError::UnknownClass(det.class))?;
      Ok(DetectItem {
        kind,
        score: det.confidence,
        bbox: det.bbox,
      })
    })
    .collect::<Result<Vec<_>, DetectError>>()?;
  Ok(DetectResult::from(items))
}

mod exec;
pub use self::exec::ExecDetector;

#[cfg(feature = "http_detector")]
mod remote;
#[cfg(feature = "http_detector")]
pub use self::remote::HttpDetector;

pub enum DetectorWrapper {
  Exec(ExecDetector),
  #[cfg(feature = "http_detector")]
  Http(HttpDetector),
}

impl FromUrl for DetectorWrapper {
  type Error = DetectError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    #[cfg(feature = "http_detector")]
    if matches!(url.scheme(), "http" | "https") {
      return Ok(DetectorWrapper::Http(HttpDetector::from_url(url)?));
    }
    if url.scheme() == <ExecDetector as crate::FromUrlWithScheme>::SCHEME {
      return Ok(DetectorWrapper::Exec(ExecDetector::from_url(url)?));
    }
    Err(DetectError::SchemeMismatch(url.scheme().to_string()))
  }
}

#[async_trait]
impl Detector for DetectorWrapper {
  async fn detect(&self, image: &Path) -> Result<DetectResult<RipenessLabel>, DetectError> {
    match self {
      DetectorWrapper::Exec(detector) => detector.detect(image).await,
      #[cfg(feature = "http_detector")]
      DetectorWrapper::Http(detector) => detector.detect(image).await,
    }
  }
}
