// 该文件是 Lajiao（辣椒）项目的一部分。
// src/model/remote.rs - 远程推理服务检测器
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::Path;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use tracing::{debug, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  model::{DetectError, DetectResult, Detector, RipenessLabel, parse_reply},
};

/// 把图像原始字节 POST 到推理服务，响应体为检测结果 JSON
pub struct HttpDetector {
  endpoint: Url,
  client: reqwest::Client,
}

impl FromUrlWithScheme for HttpDetector {
  const SCHEME: &'static str = "http";
}

impl FromUrl for HttpDetector {
  type Error = DetectError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if !matches!(url.scheme(), "http" | "https") {
      return Err(DetectError::SchemeMismatch(url.scheme().to_string()));
    }

    let client = reqwest::Client::builder().build()?;
    Ok(HttpDetector {
      endpoint: url.clone(),
      client,
    })
  }
}

#[async_trait]
impl Detector for HttpDetector {
  async fn detect(&self, image: &Path) -> Result<DetectResult<RipenessLabel>, DetectError> {
    let bytes = tokio::fs::read(image).await?;
    debug!("发送图像到 {}: {} 字节", self.endpoint, bytes.len());

    let response = self
      .client
      .post(self.endpoint.clone())
      .header(CONTENT_TYPE, "image/jpeg")
      .body(bytes)
      .send()
      .await?
      .error_for_status()?;
    let body = response.bytes().await?;

    let result = parse_reply(&body)?;
    info!("检测到 {} 个物体", result.len());
    Ok(result)
  }
}
