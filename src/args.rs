// 该文件是 Lajiao（辣椒）项目的一部分。
// src/args.rs - 项目参数配置
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use url::Url;

use lajiao::config::PipelineConfig;

/// 辣椒成熟度检测服务
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 监听地址
  #[arg(long, default_value = "0.0.0.0:8000", value_name = "ADDR")]
  pub listen: SocketAddr,

  /// 上传图像保存目录
  #[arg(long, default_value = "chili_uploads", value_name = "DIR")]
  pub upload_dir: PathBuf,

  /// 检测记录数据库文件
  #[arg(long, default_value = "chili.db", value_name = "FILE")]
  pub database: PathBuf,

  /// 检测器地址
  /// 支持格式:
  /// - 子进程: exec:///path/to/detector?arg=--weights&arg=best.pt
  /// - 远程服务: http://host:port/detect
  #[arg(long, value_name = "DETECTOR")]
  pub detector: Url,

  /// 上传目录最多保留的文件数
  #[arg(long, default_value = "100", value_name = "COUNT")]
  pub max_files: usize,

  /// 单次推理超时（秒）
  #[arg(long, default_value = "30", value_name = "SECONDS")]
  pub detect_timeout: u64,

  /// 运行日志保留条数
  #[arg(long, default_value = "200", value_name = "COUNT")]
  pub log_capacity: usize,

  /// 标注文字字体（TTF/OTF），不指定时只画框
  #[arg(long, value_name = "FILE")]
  pub font: Option<PathBuf>,

  /// 不生成标注图
  #[arg(long)]
  pub no_annotate: bool,

  /// 启动时用检测记录重建花盆累计
  #[arg(long)]
  pub restore_from_ledger: bool,

  /// 日志级别
  #[arg(long, default_value = "info", value_name = "LEVEL")]
  pub log_level: tracing::Level,
}

impl Args {
  pub fn pipeline_config(&self) -> PipelineConfig {
    PipelineConfig {
      upload_dir: self.upload_dir.clone(),
      max_files: self.max_files,
      detect_timeout: Duration::from_secs(self.detect_timeout),
      log_capacity: self.log_capacity,
      annotate: cfg!(feature = "annotate") && !self.no_annotate,
      font: self.font.clone(),
    }
  }
}
