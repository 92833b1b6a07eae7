// 该文件是 Lajiao（辣椒）项目的一部分。
// tests/common/mod.rs - 测试用检测器与图像
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

#![allow(dead_code)]

use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use image::{ImageFormat, Rgb, RgbImage};

use lajiao::config::PipelineConfig;
use lajiao::ledger::Ledger;
use lajiao::model::{DetectError, DetectItem, DetectResult, Detector, RipenessLabel};
use lajiao::pipeline::ChiliPipeline;

pub enum Behavior {
  Reply(Vec<(RipenessLabel, f32, Option<[f32; 4]>)>),
  Fail(&'static str),
  Hang,
}

/// 固定返回结果的检测器，并记录每次收到的图像尺寸
pub struct StubDetector {
  behavior: Mutex<Behavior>,
  pub seen: Mutex<Vec<(PathBuf, u32, u32)>>,
}

impl StubDetector {
  pub fn new(behavior: Behavior) -> Arc<Self> {
    Arc::new(Self {
      behavior: Mutex::new(behavior),
      seen: Mutex::new(Vec::new()),
    })
  }

  pub fn empty() -> Arc<Self> {
    Self::new(Behavior::Reply(Vec::new()))
  }

  pub fn set(&self, behavior: Behavior) {
    *self.behavior.lock().unwrap() = behavior;
  }
}

#[async_trait]
impl Detector for StubDetector {
  async fn detect(&self, image: &Path) -> Result<DetectResult<RipenessLabel>, DetectError> {
    let (w, h) = image::image_dimensions(image).map_err(|e| DetectError::Io(std::io::Error::other(e)))?;
    self.seen.lock().unwrap().push((image.to_path_buf(), w, h));

    let outcome = match &*self.behavior.lock().unwrap() {
      Behavior::Reply(items) => Behavior::Reply(items.clone()),
      Behavior::Fail(message) => Behavior::Fail(*message),
      Behavior::Hang => Behavior::Hang,
    };

    match outcome {
      Behavior::Reply(items) => Ok(
        items
          .into_iter()
          .map(|(kind, score, bbox)| DetectItem { kind, score, bbox })
          .collect::<Vec<_>>()
          .into(),
      ),
      Behavior::Fail(message) => Err(DetectError::Io(std::io::Error::other(message))),
      Behavior::Hang => {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(DetectResult::empty())
      }
    }
  }
}

pub fn jpeg(width: u32, height: u32) -> Vec<u8> {
  let image = RgbImage::from_pixel(width, height, Rgb([180, 40, 30]));
  let mut buffer = Cursor::new(Vec::new());
  image.write_to(&mut buffer, ImageFormat::Jpeg).unwrap();
  buffer.into_inner()
}

pub fn config(root: &Path) -> PipelineConfig {
  let mut config = PipelineConfig::with_upload_dir(root.join("uploads"));
  config.annotate = false;
  config
}

pub fn pipeline(config: PipelineConfig, detector: Arc<StubDetector>) -> ChiliPipeline {
  ChiliPipeline::new(config, detector, Ledger::open_in_memory().unwrap()).unwrap()
}

/// 检测记录写入文件，便于从外部破坏表结构
pub fn pipeline_on_disk(config: PipelineConfig, detector: Arc<StubDetector>, db: &Path) -> ChiliPipeline {
  ChiliPipeline::new(config, detector, Ledger::open(db).unwrap()).unwrap()
}

pub fn drop_ledger_table(db: &Path) {
  rusqlite::Connection::open(db)
    .unwrap()
    .execute_batch("DROP TABLE pot_detection;")
    .unwrap();
}

pub fn files_in(dir: &Path) -> Vec<PathBuf> {
  let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
    .unwrap()
    .map(|entry| entry.unwrap().path())
    .collect();
  files.sort();
  files
}
