// 该文件是 Lajiao（辣椒）项目的一部分。
// src/state/live.rs - 最近一次检测结果
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
use std::sync::RwLock;

use chrono::{DateTime, Local};
use serde::Serialize;

use super::recover;
use crate::analyzer::RipenessSummary;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LiveStatus {
  pub summary: RipenessSummary,
  pub image: PathBuf,
  pub updated_at: DateTime<Local>,
}

#[derive(Debug, Default)]
pub struct LiveStatusStore {
  current: RwLock<Option<LiveStatus>>,
}

impl LiveStatusStore {
  pub fn publish(&self, status: LiveStatus) {
    *recover(self.current.write()) = Some(status);
  }

  pub fn snapshot(&self) -> Option<LiveStatus> {
    recover(self.current.read()).clone()
  }

  pub fn image_path(&self) -> Option<PathBuf> {
    recover(self.current.read())
      .as_ref()
      .map(|status| status.image.clone())
  }
}
