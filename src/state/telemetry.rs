// 该文件是 Lajiao（辣椒）项目的一部分。
// src/state/telemetry.rs - 设备遥测透传
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

use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::recover;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceTime {
  pub device: String,
  pub datetime: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DhtReading {
  pub device: String,
  pub temperature: f64,
  pub humidity: f64,
}

#[derive(Error, Debug, PartialEq)]
pub enum TelemetryError {
  #[error("{field} 不是有限数值")]
  NotFinite { field: &'static str },
}

impl DhtReading {
  pub fn validate(&self) -> Result<(), TelemetryError> {
    if !self.temperature.is_finite() {
      return Err(TelemetryError::NotFinite {
        field: "temperature",
      });
    }
    if !self.humidity.is_finite() {
      return Err(TelemetryError::NotFinite { field: "humidity" });
    }
    Ok(())
  }
}

/// 各保存最近一次上报，后写覆盖先写
#[derive(Debug, Default)]
pub struct Telemetry {
  time: RwLock<Option<DeviceTime>>,
  dht: RwLock<Option<DhtReading>>,
}

impl Telemetry {
  pub fn set_time(&self, time: DeviceTime) {
    *recover(self.time.write()) = Some(time);
  }

  pub fn time(&self) -> Option<DeviceTime> {
    recover(self.time.read()).clone()
  }

  pub fn set_dht(&self, reading: DhtReading) -> Result<(), TelemetryError> {
    reading.validate()?;
    *recover(self.dht.write()) = Some(reading);
    Ok(())
  }

  pub fn dht(&self) -> Option<DhtReading> {
    recover(self.dht.read()).clone()
  }
}
