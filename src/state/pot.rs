// 该文件是 Lajiao（辣椒）项目的一部分。
// src/state/pot.rs - 花盆累计统计
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

use std::collections::BTreeMap;
use std::sync::Mutex;

use serde::Serialize;
use tracing::debug;

use super::recover;
use crate::ledger::{Ledger, LedgerEntry, LedgerError};

/// 操作员指定的花盆编号
pub type PotId = i64;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PotTotals {
  pub ripe: u64,
  pub unripe: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recorded {
  pub entry: LedgerEntry,
  pub totals: PotTotals,
}

/// 花盆累计：内存中的累计值 + 持久化的检测记录
///
/// 先写入检测记录，成功后再累加内存值，两步在同一把锁内完成，
/// 因此写入失败时两边都保持不变。
pub struct PotAggregator {
  current: Mutex<Option<PotId>>,
  totals: tokio::sync::Mutex<BTreeMap<PotId, PotTotals>>,
  ledger: Ledger,
}

impl PotAggregator {
  pub fn new(ledger: Ledger) -> Self {
    Self {
      current: Mutex::new(None),
      totals: tokio::sync::Mutex::new(BTreeMap::new()),
      ledger,
    }
  }

  pub fn select_pot(&self, pot: PotId) {
    *recover(self.current.lock()) = Some(pot);
  }

  pub fn current_pot(&self) -> Option<PotId> {
    *recover(self.current.lock())
  }

  /// 未选择花盆时不累计也不写记录，返回 `None`
  pub async fn record(
    &self,
    pot: Option<PotId>,
    ripe: u32,
    unripe: u32,
    total: u32,
  ) -> Result<Option<Recorded>, LedgerError> {
    let Some(pot) = pot else {
      debug!("未选择花盆，跳过累计");
      return Ok(None);
    };

    let mut totals = self.totals.lock().await;
    let entry = self.ledger.append(pot, ripe, unripe, total).await?;
    let slot = totals.entry(pot).or_default();
    slot.ripe += u64::from(ripe);
    slot.unripe += u64::from(unripe);

    Ok(Some(Recorded {
      entry,
      totals: *slot,
    }))
  }

  pub async fn aggregate_snapshot(&self) -> BTreeMap<PotId, PotTotals> {
    self.totals.lock().await.clone()
  }

  pub async fn ledger_dump(&self) -> Result<Vec<LedgerEntry>, LedgerError> {
    self.ledger.dump().await
  }

  /// 清空检测记录，不影响内存累计值
  pub async fn ledger_reset(&self) -> Result<usize, LedgerError> {
    self.ledger.reset().await
  }

  /// 用检测记录重建内存累计值
  pub async fn reconcile(&self) -> Result<BTreeMap<PotId, PotTotals>, LedgerError> {
    let mut totals = self.totals.lock().await;
    let rebuilt = self.ledger.totals_by_pot().await?;
    *totals = rebuilt.clone();
    Ok(rebuilt)
  }
}
