// 该文件是 Lajiao（辣椒）项目的一部分。
// src/pipeline.rs - 上传处理流水线
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

//! 每次上传依次经过：保存 → 清理旧文件 → 旋转 → 推理 → 汇总 →
//! 更新实时状态 → 按当前花盆累计并写入检测记录。
//!
//! 任何一步失败都会中止本次上传，之前的步骤不回滚。

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Local;
use thiserror::Error;
use tracing::{debug, warn};

use crate::analyzer::{RipenessSummary, summarize};
use crate::config::PipelineConfig;
use crate::input::{ImageStore, PreprocessError, StoreError, preprocess};
use crate::ledger::{Ledger, LedgerEntry, LedgerError};
use crate::model::{DetectError, Detector};
#[cfg(feature = "annotate")]
use crate::output::{AnnotateError, Draw};
use crate::state::{EventLog, LiveStatus, LiveStatusStore, PotAggregator, PotId, PotTotals, Recorded};

#[derive(Error, Debug)]
pub enum PipelineError {
  #[error("图像存储错误: {0}")]
  Store(#[from] StoreError),
  #[error("图像预处理错误: {0}")]
  Preprocess(#[from] PreprocessError),
  #[error("{0}")]
  Inference(#[from] DetectError),
  #[error("推理超时 ({0:?})")]
  InferenceTimeout(Duration),
  #[error("检测记录错误: {0}")]
  Ledger(#[from] LedgerError),
  #[cfg(feature = "annotate")]
  #[error("标注配置错误: {0}")]
  Annotate(#[from] AnnotateError),
}

/// 一次上传的处理结果
#[derive(Debug, Clone)]
pub struct UploadOutcome {
  pub summary: RipenessSummary,
  /// 完成时选中的花盆
  pub pot: Option<PotId>,
  /// 实时状态引用的图像（标注图或预处理后的原图）
  pub image: PathBuf,
  pub recorded: Option<Recorded>,
}

pub struct ChiliPipeline {
  config: PipelineConfig,
  store: ImageStore,
  detector: Arc<dyn Detector>,
  live: LiveStatusStore,
  pots: PotAggregator,
  events: EventLog,
  #[cfg(feature = "annotate")]
  draw: Option<Draw>,
}

impl ChiliPipeline {
  pub fn new(
    config: PipelineConfig,
    detector: Arc<dyn Detector>,
    ledger: Ledger,
  ) -> Result<Self, PipelineError> {
    let store = ImageStore::open(&config.upload_dir)?;

    #[cfg(feature = "annotate")]
    let draw = match (config.annotate, &config.font) {
      (false, _) => None,
      (true, Some(font)) => Some(Draw::from_font_file(font)?),
      (true, None) => Some(Draw::default()),
    };

    Ok(Self {
      store,
      detector,
      live: LiveStatusStore::default(),
      pots: PotAggregator::new(ledger),
      events: EventLog::new(config.log_capacity),
      #[cfg(feature = "annotate")]
      draw,
      config,
    })
  }

  pub fn events(&self) -> &EventLog {
    &self.events
  }

  pub fn select_pot(&self, pot: PotId) {
    self.pots.select_pot(pot);
    self.events.append(format!("Scanning POT ({})", pot));
  }

  pub fn current_pot(&self) -> Option<PotId> {
    self.pots.current_pot()
  }

  pub fn live_status(&self) -> Option<LiveStatus> {
    self.live.snapshot()
  }

  pub async fn aggregate_snapshot(&self) -> BTreeMap<PotId, PotTotals> {
    self.pots.aggregate_snapshot().await
  }

  pub async fn ledger_dump(&self) -> Result<Vec<LedgerEntry>, PipelineError> {
    Ok(self.pots.ledger_dump().await?)
  }

  pub async fn ledger_reset(&self) -> Result<usize, PipelineError> {
    let removed = self.pots.ledger_reset().await?;
    self
      .events
      .append(format!("Ledger cleared ({} rows)", removed));
    Ok(removed)
  }

  /// 以检测记录为准重建内存中的花盆累计
  pub async fn reconcile(&self) -> Result<BTreeMap<PotId, PotTotals>, PipelineError> {
    let totals = self.pots.reconcile().await?;
    self
      .events
      .append(format!("Reconciled {} pots from ledger", totals.len()));
    Ok(totals)
  }

  pub async fn upload(&self, bytes: &[u8]) -> Result<UploadOutcome, PipelineError> {
    self.events.append("Upload received");
    if let Some(pot) = self.pots.current_pot() {
      self.events.append(format!("Processing POT {}", pot));
    }
    self.events.append("Processing");

    let now = Instant::now();
    let path = self.store.store(bytes).await?;

    let mut keep = vec![path.clone()];
    keep.extend(self.live.image_path());
    self
      .store
      .enforce_retention(self.config.max_files, &keep)
      .await?;
    debug!("保存完成，耗时: {:.2?}", now.elapsed());

    let now = Instant::now();
    preprocess::rotate(path.clone()).await?;
    debug!("预处理完成，耗时: {:.2?}", now.elapsed());

    let now = Instant::now();
    let detections = match tokio::time::timeout(self.config.detect_timeout, self.detector.detect(&path)).await {
      Ok(Ok(detections)) => detections,
      Ok(Err(e)) => {
        self.events.append(format!("Inference error: {}", e));
        return Err(PipelineError::Inference(e));
      }
      Err(_) => {
        let timeout = self.config.detect_timeout;
        self
          .events
          .append(format!("Inference error: timed out after {:?}", timeout));
        return Err(PipelineError::InferenceTimeout(timeout));
      }
    };
    debug!("推理完成，耗时: {:.2?}", now.elapsed());

    let summary = summarize(&detections);

    #[cfg(feature = "annotate")]
    let image = match &self.draw {
      Some(draw) => {
        let now = Instant::now();
        let target = ImageStore::annotated_path(&path);
        match draw.annotate(path.clone(), target, detections).await {
          Ok(target) => {
            debug!("标注完成，耗时: {:.2?}", now.elapsed());
            target
          }
          Err(e) => {
            warn!("标注失败，使用原图: {}", e);
            path.clone()
          }
        }
      }
      None => path.clone(),
    };
    #[cfg(not(feature = "annotate"))]
    let image = {
      drop(detections);
      path.clone()
    };

    self.live.publish(LiveStatus {
      summary,
      image: image.clone(),
      updated_at: Local::now(),
    });

    let pot = self.pots.current_pot();
    let recorded = self
      .pots
      .record(pot, summary.ripe, summary.unripe, summary.total)
      .await
      .inspect_err(|e| self.events.append(format!("Ledger error: {}", e)))?;

    match (&recorded, pot) {
      (Some(recorded), Some(pot)) => self.events.append(format!(
        "POT {} → ripe={} unripe={}",
        pot, recorded.totals.ripe, recorded.totals.unripe
      )),
      _ => debug!("未选择花盆，结果只更新实时状态"),
    }

    Ok(UploadOutcome {
      summary,
      pot,
      image,
      recorded,
    })
  }
}
