// 该文件是 Lajiao（辣椒）项目的一部分。
// src/ledger.rs - 花盆检测记录（SQLite）
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
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, mpsc};
use std::thread::{self, JoinHandle};

use chrono::Local;
use rusqlite::{Connection, Row, params};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{debug, error, info};

use crate::state::{PotId, PotTotals};

const CURRENT_SCHEMA_VERSION: i32 = 1;

#[derive(Error, Debug)]
pub enum LedgerError {
  #[error("SQLite 错误: {0}")]
  Sqlite(#[from] rusqlite::Error),
  #[error("无法创建数据库目录 {path}: {source}")]
  CreateDir {
    path: PathBuf,
    source: std::io::Error,
  },
  #[error("数据库版本 ({found}) 高于支持的版本 ({supported})")]
  SchemaTooNew { found: i32, supported: i32 },
  #[error("无法启动数据库线程: {0}")]
  Spawn(std::io::Error),
  #[error("数据库线程已退出")]
  WorkerGone,
  #[error("{field} 数值超出范围: {value}")]
  OutOfRange { field: &'static str, value: i64 },
}

/// 一次花盆检测的持久化记录，写入后不再修改
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerEntry {
  pub id: i64,
  pub pot: PotId,
  pub ripe: u32,
  pub unripe: u32,
  pub total: u32,
  pub timestamp: String,
}

fn row_to_entry(row: &Row) -> Result<LedgerEntry, rusqlite::Error> {
  Ok(LedgerEntry {
    id: row.get("id")?,
    pot: row.get("pot")?,
    ripe: row.get("ripe")?,
    unripe: row.get("unripe")?,
    total: row.get("total")?,
    timestamp: row.get("timestamp")?,
  })
}

fn to_u64(value: i64, field: &'static str) -> Result<u64, LedgerError> {
  u64::try_from(value).map_err(|_| LedgerError::OutOfRange { field, value })
}

fn run_migrations(conn: &mut Connection) -> Result<(), LedgerError> {
  let version: i32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;

  if version > CURRENT_SCHEMA_VERSION {
    return Err(LedgerError::SchemaTooNew {
      found: version,
      supported: CURRENT_SCHEMA_VERSION,
    });
  }
  if version == CURRENT_SCHEMA_VERSION {
    return Ok(());
  }

  let tx = conn.transaction()?;
  tx.execute_batch(include_str!("ledger/schema_v1.sql"))?;
  tx.pragma_update(None, "user_version", CURRENT_SCHEMA_VERSION)?;
  tx.commit()?;
  info!("检测记录表迁移到版本 {}", CURRENT_SCHEMA_VERSION);
  Ok(())
}

type DbTask = Box<dyn FnOnce(&mut Connection) + Send + 'static>;

enum DbCommand {
  Execute(DbTask),
  Shutdown,
}

struct LedgerInner {
  sender: mpsc::Sender<DbCommand>,
  worker: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for LedgerInner {
  fn drop(&mut self) {
    let mut guard = match self.worker.lock() {
      Ok(guard) => guard,
      Err(poisoned) => poisoned.into_inner(),
    };

    if let Some(handle) = guard.take() {
      if self.sender.send(DbCommand::Shutdown).is_err() {
        error!("无法通知数据库线程退出");
      }
      if handle.join().is_err() {
        error!("数据库线程异常退出");
      }
    }
  }
}

/// 检测记录表，所有 SQL 都在一个专用线程上串行执行
#[derive(Clone)]
pub struct Ledger {
  inner: Arc<LedgerInner>,
}

impl Ledger {
  pub fn open(path: impl AsRef<Path>) -> Result<Self, LedgerError> {
    let path = path.as_ref().to_path_buf();
    if let Some(parent) = path.parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent).map_err(|source| LedgerError::CreateDir {
        path: parent.to_path_buf(),
        source,
      })?;
    }

    info!("打开检测记录数据库: {}", path.display());
    Self::spawn(move || {
      let conn = Connection::open(&path)?;
      conn.pragma_update(None, "journal_mode", "WAL")?;
      Ok(conn)
    })
  }

  pub fn open_in_memory() -> Result<Self, LedgerError> {
    Self::spawn(|| Ok(Connection::open_in_memory()?))
  }

  fn spawn<F>(opener: F) -> Result<Self, LedgerError>
  where
    F: FnOnce() -> Result<Connection, LedgerError> + Send + 'static,
  {
    let (command_tx, command_rx) = mpsc::channel::<DbCommand>();
    let (ready_tx, ready_rx) = mpsc::channel::<Result<(), LedgerError>>();

    let worker = thread::Builder::new()
      .name("lajiao-ledger".into())
      .spawn(move || {
        let mut conn = match opener() {
          Ok(conn) => conn,
          Err(e) => {
            let _ = ready_tx.send(Err(e));
            return;
          }
        };

        let init = run_migrations(&mut conn);
        let failed = init.is_err();
        if ready_tx.send(init).is_err() || failed {
          return;
        }

        while let Ok(command) = command_rx.recv() {
          match command {
            DbCommand::Execute(task) => task(&mut conn),
            DbCommand::Shutdown => break,
          }
        }
        debug!("数据库线程退出");
      })
      .map_err(LedgerError::Spawn)?;

    ready_rx.recv().map_err(|_| LedgerError::WorkerGone)??;

    Ok(Self {
      inner: Arc::new(LedgerInner {
        sender: command_tx,
        worker: Mutex::new(Some(worker)),
      }),
    })
  }

  async fn execute<F, T>(&self, task: F) -> Result<T, LedgerError>
  where
    F: FnOnce(&mut Connection) -> Result<T, LedgerError> + Send + 'static,
    T: Send + 'static,
  {
    let (reply_tx, reply_rx) = oneshot::channel();
    let command = DbCommand::Execute(Box::new(move |conn| {
      if reply_tx.send(task(conn)).is_err() {
        error!("数据库调用方已放弃等待结果");
      }
    }));

    self
      .inner
      .sender
      .send(command)
      .map_err(|_| LedgerError::WorkerGone)?;
    reply_rx.await.map_err(|_| LedgerError::WorkerGone)?
  }

  pub async fn append(
    &self,
    pot: PotId,
    ripe: u32,
    unripe: u32,
    total: u32,
  ) -> Result<LedgerEntry, LedgerError> {
    let timestamp = Local::now()
      .naive_local()
      .format("%Y-%m-%dT%H:%M:%S%.6f")
      .to_string();

    self
      .execute(move |conn| {
        conn.execute(
          "INSERT INTO pot_detection (pot, ripe, unripe, total, timestamp)
           VALUES (?1, ?2, ?3, ?4, ?5)",
          params![pot, ripe, unripe, total, timestamp],
        )?;
        Ok(LedgerEntry {
          id: conn.last_insert_rowid(),
          pot,
          ripe,
          unripe,
          total,
          timestamp,
        })
      })
      .await
  }

  /// 全部记录，最新的在前
  pub async fn dump(&self) -> Result<Vec<LedgerEntry>, LedgerError> {
    self
      .execute(|conn| {
        let mut stmt = conn.prepare(
          "SELECT id, pot, ripe, unripe, total, timestamp FROM pot_detection ORDER BY id DESC",
        )?;
        let rows = stmt
          .query_map([], row_to_entry)?
          .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
      })
      .await
  }

  /// 删除全部记录，返回删除的行数
  pub async fn reset(&self) -> Result<usize, LedgerError> {
    self
      .execute(|conn| Ok(conn.execute("DELETE FROM pot_detection", [])?))
      .await
  }

  pub async fn totals_by_pot(&self) -> Result<BTreeMap<PotId, PotTotals>, LedgerError> {
    self
      .execute(|conn| {
        let mut stmt = conn.prepare(
          "SELECT pot, COALESCE(SUM(ripe), 0), COALESCE(SUM(unripe), 0)
           FROM pot_detection WHERE pot IS NOT NULL GROUP BY pot",
        )?;
        let rows = stmt
          .query_map([], |row| {
            Ok((
              row.get::<_, PotId>(0)?,
              row.get::<_, i64>(1)?,
              row.get::<_, i64>(2)?,
            ))
          })?
          .collect::<Result<Vec<_>, _>>()?;

        let mut totals = BTreeMap::new();
        for (pot, ripe, unripe) in rows {
          totals.insert(
            pot,
            PotTotals {
              ripe: to_u64(ripe, "ripe")?,
              unripe: to_u64(unripe, "unripe")?,
            },
          );
        }
        Ok(totals)
      })
      .await
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn dump_is_most_recent_first() {
    let ledger = Ledger::open_in_memory().unwrap();
    let first = ledger.append(1, 2, 1, 3).await.unwrap();
    let second = ledger.append(2, 0, 4, 4).await.unwrap();
    assert!(second.id > first.id);

    let rows = ledger.dump().await.unwrap();
    assert_eq!(rows, vec![second, first]);
  }

  #[tokio::test]
  async fn timestamp_is_iso_8601() {
    let ledger = Ledger::open_in_memory().unwrap();
    let entry = ledger.append(1, 1, 0, 1).await.unwrap();
    assert!(chrono::NaiveDateTime::parse_from_str(&entry.timestamp, "%Y-%m-%dT%H:%M:%S%.f").is_ok());
  }

  #[tokio::test]
  async fn reset_clears_all_rows() {
    let ledger = Ledger::open_in_memory().unwrap();
    for pot in 0..3 {
      ledger.append(pot, 1, 1, 2).await.unwrap();
    }
    assert_eq!(ledger.reset().await.unwrap(), 3);
    assert!(ledger.dump().await.unwrap().is_empty());

    // 自增编号在清空后继续增长
    let entry = ledger.append(0, 0, 0, 0).await.unwrap();
    assert_eq!(entry.id, 4);
  }

  #[tokio::test]
  async fn totals_group_by_pot() {
    let ledger = Ledger::open_in_memory().unwrap();
    ledger.append(7, 2, 1, 3).await.unwrap();
    ledger.append(7, 1, 0, 1).await.unwrap();
    ledger.append(8, 0, 5, 5).await.unwrap();

    let totals = ledger.totals_by_pot().await.unwrap();
    assert_eq!(totals[&7], PotTotals { ripe: 3, unripe: 1 });
    assert_eq!(totals[&8], PotTotals { ripe: 0, unripe: 5 });
  }

  #[tokio::test]
  async fn rows_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("db").join("chili.db");
    {
      let ledger = Ledger::open(&path).unwrap();
      ledger.append(3, 1, 2, 3).await.unwrap();
    }
    let ledger = Ledger::open(&path).unwrap();
    let rows = ledger.dump().await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].pot, 3);
    assert_eq!(rows[0].total, 3);
  }

  #[tokio::test]
  async fn adopts_existing_table() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("chili.db");
    {
      let conn = Connection::open(&path).unwrap();
      conn
        .execute_batch(
          "CREATE TABLE pot_detection (
             id INTEGER PRIMARY KEY AUTOINCREMENT,
             pot INTEGER, ripe INTEGER, unripe INTEGER, total INTEGER, timestamp TEXT);
           INSERT INTO pot_detection (pot, ripe, unripe, total, timestamp)
           VALUES (1, 4, 2, 6, '2025-11-02T10:00:00.000000');",
        )
        .unwrap();
    }
    let ledger = Ledger::open(&path).unwrap();
    assert_eq!(ledger.dump().await.unwrap()[0].ripe, 4);
  }

  #[test]
  fn rejects_newer_schema() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("chili.db");
    {
      let conn = Connection::open(&path).unwrap();
      conn.pragma_update(None, "user_version", 99).unwrap();
    }
    assert!(matches!(
      Ledger::open(&path),
      Err(LedgerError::SchemaTooNew { found: 99, .. })
    ));
  }
}
