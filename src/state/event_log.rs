// 该文件是 Lajiao（辣椒）项目的一部分。
// src/state/event_log.rs - 运行事件日志
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

use std::collections::VecDeque;
use std::sync::Mutex;

use chrono::{DateTime, Local};
use serde::Serialize;
use tracing::info;

use super::recover;

pub const DEFAULT_LOG_CAPACITY: usize = 200;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogLine {
  pub time: DateTime<Local>,
  pub message: String,
}

/// 定长先进先出日志，满后丢弃最早的一条；快照按时间从旧到新
pub struct EventLog {
  capacity: usize,
  lines: Mutex<VecDeque<LogLine>>,
}

impl Default for EventLog {
  fn default() -> Self {
    Self::new(DEFAULT_LOG_CAPACITY)
  }
}

impl EventLog {
  pub fn new(capacity: usize) -> Self {
    let capacity = capacity.max(1);
    Self {
      capacity,
      lines: Mutex::new(VecDeque::with_capacity(capacity)),
    }
  }

  pub fn capacity(&self) -> usize {
    self.capacity
  }

  pub fn append(&self, message: impl Into<String>) {
    let message = message.into();
    info!("{}", message);

    let mut lines = recover(self.lines.lock());
    while lines.len() >= self.capacity {
      lines.pop_front();
    }
    lines.push_back(LogLine {
      time: Local::now(),
      message,
    });
  }

  pub fn snapshot(&self) -> Vec<LogLine> {
    recover(self.lines.lock()).iter().cloned().collect()
  }

  pub fn len(&self) -> usize {
    recover(self.lines.lock()).len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}
