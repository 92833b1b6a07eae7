// 该文件是 Lajiao（辣椒）项目的一部分。
// src/analyzer.rs - 检测框汇总
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

use serde::{Serialize, Serializer};

use crate::model::{DetectItem, DetectResult, RipenessLabel};

/// 单张图像的成熟度判定，对外编码为 0=成熟, 1=未成熟, -1=未检测到
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ripeness {
  Ripe,
  Unripe,
  None,
}

impl Ripeness {
  pub fn code(self) -> i8 {
    match self {
      Ripeness::Ripe => 0,
      Ripeness::Unripe => 1,
      Ripeness::None => -1,
    }
  }
}

impl From<RipenessLabel> for Ripeness {
  fn from(label: RipenessLabel) -> Self {
    match label {
      RipenessLabel::Ripe => Ripeness::Ripe,
      RipenessLabel::Unripe => Ripeness::Unripe,
    }
  }
}

impl Serialize for Ripeness {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_i8(self.code())
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RipenessSummary {
  pub classification: Ripeness,
  pub total: u32,
  pub ripe: u32,
  pub unripe: u32,
}

impl RipenessSummary {
  pub const NONE: RipenessSummary = RipenessSummary {
    classification: Ripeness::None,
    total: 0,
    ripe: 0,
    unripe: 0,
  };
}

/// 把检测结果归约为成熟度汇总
///
/// 判定取置信度最高的单个检测框的类别，而不是多数类别；
/// 置信度相同时取输入中最先出现的那个。
pub fn summarize(result: &DetectResult<RipenessLabel>) -> RipenessSummary {
  let mut best: Option<&DetectItem<RipenessLabel>> = None;
  let (mut ripe, mut unripe) = (0u32, 0u32);

  for item in result.items.iter() {
    match item.kind {
      RipenessLabel::Ripe => ripe += 1,
      RipenessLabel::Unripe => unripe += 1,
    }
    if best.is_none_or(|b| item.score > b.score) {
      best = Some(item);
    }
  }

  match best {
    None => RipenessSummary::NONE,
    Some(best) => RipenessSummary {
      classification: best.kind.into(),
      total: ripe + unripe,
      ripe,
      unripe,
    },
  }
}
