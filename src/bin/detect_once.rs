// 该文件是 Lajiao（辣椒）项目的一部分。
// src/bin/detect_once.rs - 单张图像检测
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use url::Url;

use lajiao::{
  FromUrl,
  analyzer::summarize,
  input::preprocess,
  model::{Detector, DetectorWrapper, WithLabel},
};

/// 对单张图像运行检测器并输出成熟度判定，用于验证检测器配置
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 检测器地址
  #[arg(long, value_name = "DETECTOR")]
  pub detector: Url,
  /// 输入图像
  #[arg(long, value_name = "FILE")]
  pub input: PathBuf,
  /// 先顺时针旋转 90°（写入 `<stem>_rot.jpg`，不修改原图）
  #[arg(long)]
  pub rotate: bool,
  /// 推理超时（秒）
  #[arg(long, default_value = "30", value_name = "SECONDS")]
  pub timeout: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("检测器: {}", args.detector);
  info!("输入图像: {}", args.input.display());

  let detector = DetectorWrapper::from_url(&args.detector)?;

  let image = if args.rotate {
    let stem = args
      .input
      .file_stem()
      .map(|s| s.to_string_lossy().into_owned())
      .unwrap_or_default();
    let rotated = args.input.with_file_name(format!("{}_rot.jpg", stem));
    std::fs::copy(&args.input, &rotated)
      .with_context(|| format!("无法复制 {}", args.input.display()))?;
    let (w, h) = preprocess::rotate(rotated.clone()).await?;
    info!("旋转后尺寸: {}x{}", w, h);
    rotated
  } else {
    args.input.clone()
  };

  info!("开始推理...");
  let now = Instant::now();
  let result = tokio::time::timeout(Duration::from_secs(args.timeout), detector.detect(&image))
    .await
    .context("推理超时")??;
  info!("推理完成，耗时: {:.2?}", now.elapsed());

  for item in result.items.iter() {
    match item.bbox {
      Some([x0, y0, x1, y1]) => info!(
        "  - {}: {:.2}% at ({:.3}, {:.3}, {:.3}, {:.3})",
        item.kind.to_label_str(),
        item.score * 100.0,
        x0,
        y0,
        x1,
        y1
      ),
      None => info!("  - {}: {:.2}%", item.kind.to_label_str(), item.score * 100.0),
    }
  }

  let summary = summarize(&result);
  println!("{}", serde_json::to_string_pretty(&summary)?);
  Ok(())
}
