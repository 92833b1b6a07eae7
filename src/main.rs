// 该文件是 Lajiao（辣椒）项目的一部分。
// src/main.rs - 项目主程序
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

mod args;

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};

use lajiao::{
  FromUrl,
  ledger::Ledger,
  model::DetectorWrapper,
  pipeline::ChiliPipeline,
  server::{AppState, create_router},
};

#[tokio::main]
async fn main() -> Result<()> {
  let args = args::Args::parse();
  tracing_subscriber::fmt().with_max_level(args.log_level).init();

  info!("Lajiao 辣椒成熟度检测服务");
  info!("检测器: {}", args.detector);
  info!("上传目录: {}", args.upload_dir.display());
  info!("数据库: {}", args.database.display());

  let detector = DetectorWrapper::from_url(&args.detector)?;
  let ledger = Ledger::open(&args.database)?;
  let pipeline = Arc::new(ChiliPipeline::new(
    args.pipeline_config(),
    Arc::new(detector),
    ledger,
  )?);

  if args.restore_from_ledger {
    let totals = pipeline.reconcile().await?;
    info!("已从检测记录恢复 {} 个花盆的累计", totals.len());
  }

  let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<()>();
  ctrlc::set_handler(move || {
    info!("收到中断信号，准备退出...");
    let _ = tx.send(());
    thread::spawn(|| {
      thread::sleep(Duration::from_secs(30));
      warn!("强制退出程序");
      std::process::exit(1);
    });
  })?;

  let app = create_router(AppState::new(pipeline));
  let listener = tokio::net::TcpListener::bind(args.listen).await?;
  info!("开始监听: {}", listener.local_addr()?);

  axum::serve(listener, app)
    .with_graceful_shutdown(async move {
      rx.recv().await;
    })
    .await?;

  info!("服务已停止");
  Ok(())
}
