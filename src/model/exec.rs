// 该文件是 Lajiao（辣椒）项目的一部分。
// src/model/exec.rs - 子进程检测器
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  model::{DetectError, DetectResult, Detector, RipenessLabel, parse_reply},
};

/// 以子进程方式调用外部检测程序
///
/// 地址形如 `exec:///usr/local/bin/chili-detect?arg=--weights&arg=best.pt`，
/// 图像路径作为最后一个参数追加，检测结果从标准输出读取。
#[derive(Debug, Clone)]
pub struct ExecDetector {
  program: PathBuf,
  args: Vec<String>,
}

impl FromUrlWithScheme for ExecDetector {
  const SCHEME: &'static str = "exec";
}

impl FromUrl for ExecDetector {
  type Error = DetectError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(DetectError::SchemeMismatch(url.scheme().to_string()));
    }

    let program = urlencoding::decode(url.path())
      .map_err(|e| DetectError::InvalidUrl(format!("{}: {}", url, e)))?
      .into_owned();
    if program.is_empty() {
      return Err(DetectError::InvalidUrl(format!("{} 未指定检测程序", url)));
    }

    let args = url
      .query_pairs()
      .filter(|(k, _)| k == "arg")
      .map(|(_, v)| v.into_owned())
      .collect();

    Ok(ExecDetector {
      program: PathBuf::from(program),
      args,
    })
  }
}

impl ExecDetector {
  pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
    Self {
      program: program.into(),
      args,
    }
  }
}

#[async_trait]
impl Detector for ExecDetector {
  async fn detect(&self, image: &Path) -> Result<DetectResult<RipenessLabel>, DetectError> {
    debug!("调用检测程序: {} {:?} {}", self.program.display(), self.args, image.display());
    let output = Command::new(&self.program)
      .args(&self.args)
      .arg(image)
      .stdin(Stdio::null())
      .kill_on_drop(true)
      .output()
      .await
      .map_err(|source| DetectError::Spawn {
        program: self.program.display().to_string(),
        source,
      })?;

    if !output.status.success() {
      return Err(DetectError::ExitStatus {
        status: output.status,
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
      });
    }

    let result = parse_reply(&output.stdout)?;
    info!("检测到 {} 个物体", result.len());
    Ok(result)
  }
}
