// 该文件是 Lajiao（辣椒）项目的一部分。
// src/server.rs - HTTP 接口
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
use std::io::ErrorKind;
use std::sync::Arc;

use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::{StatusCode, header};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tower_http::cors::CorsLayer;
use tracing::{error, warn};

use crate::analyzer::Ripeness;
use crate::input::PreprocessError;
use crate::ledger::LedgerEntry;
use crate::pipeline::{ChiliPipeline, PipelineError};
use crate::state::{DeviceTime, DhtReading, LogLine, PotId, PotTotals, Telemetry, TelemetryError};

pub const MAX_UPLOAD_BYTES: usize = 16 * 1024 * 1024;
const NOTE: &str = "0=ripe, 1=unripe, -1=no chili";
const VIEWER_HTML: &str = include_str!("../assets/viewer.html");

#[derive(Clone)]
pub struct AppState {
  pub pipeline: Arc<ChiliPipeline>,
  pub telemetry: Arc<Telemetry>,
}

impl AppState {
  pub fn new(pipeline: Arc<ChiliPipeline>) -> Self {
    Self {
      pipeline,
      telemetry: Arc::new(Telemetry::default()),
    }
  }
}

#[derive(Error, Debug)]
pub enum ApiError {
  #[error(transparent)]
  Pipeline(#[from] PipelineError),
  #[error("No image yet")]
  NoImage,
  #[error("{0}")]
  BadRequest(String),
  #[error(transparent)]
  Telemetry(#[from] TelemetryError),
  #[error("I/O 错误: {0}")]
  Io(#[from] std::io::Error),
}

impl ApiError {
  fn status_and_detail(&self) -> (StatusCode, String) {
    match self {
      ApiError::Pipeline(PipelineError::Inference(e)) => {
        (StatusCode::INTERNAL_SERVER_ERROR, format!("Inference error: {}", e))
      }
      ApiError::Pipeline(PipelineError::InferenceTimeout(timeout)) => (
        StatusCode::GATEWAY_TIMEOUT,
        format!("Inference error: timed out after {:?}", timeout),
      ),
      ApiError::Pipeline(PipelineError::Preprocess(PreprocessError::Decode(e))) => {
        (StatusCode::UNPROCESSABLE_ENTITY, format!("Invalid image: {}", e))
      }
      ApiError::Pipeline(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
      ApiError::NoImage => (StatusCode::NOT_FOUND, self.to_string()),
      ApiError::BadRequest(detail) => (StatusCode::BAD_REQUEST, detail.clone()),
      ApiError::Telemetry(e) => (StatusCode::UNPROCESSABLE_ENTITY, e.to_string()),
      ApiError::Io(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let (status, detail) = self.status_and_detail();
    if status.is_server_error() {
      error!("请求失败 ({}): {}", status, detail);
    } else {
      warn!("请求被拒绝 ({}): {}", status, detail);
    }
    (status, Json(json!({ "detail": detail }))).into_response()
  }
}

pub fn create_router(state: AppState) -> Router {
  Router::new()
    .route("/", get(viewer))
    .route("/chili/view", get(viewer))
    .route("/chili/upload", post(upload))
    .route("/chili/status", get(status))
    .route("/chili/image", get(image))
    .route("/pot", post(select_pot))
    .route("/pot/result", get(pot_result))
    .route("/pot/reconcile", post(reconcile))
    .route("/pot/db", get(ledger_dump))
    .route("/pot/db/reset", delete(ledger_reset))
    .route("/log", get(event_log))
    .route("/device/time", get(device_time).post(set_device_time))
    .route("/sensor/dht", get(sensor_dht).post(set_sensor_dht))
    .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
    .layer(CorsLayer::permissive())
    .with_state(state)
}

async fn viewer() -> Html<&'static str> {
  Html(VIEWER_HTML)
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
  pub status: &'static str,
  pub ripeness: Ripeness,
  pub total_detected: u32,
  pub ripe: u32,
  pub unripe: u32,
  pub pot: Option<PotId>,
  pub note: &'static str,
}

async fn upload(
  State(state): State<AppState>,
  mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
  let mut image = None;
  while let Some(field) = multipart
    .next_field()
    .await
    .map_err(|e| ApiError::BadRequest(format!("Multipart error: {e}")))?
  {
    if field.name() == Some("file") {
      let data = field
        .bytes()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Failed to read file: {e}")))?;
      image = Some(data);
      break;
    }
  }
  let image = image.ok_or_else(|| ApiError::BadRequest("No file field in request".to_string()))?;

  let outcome = state.pipeline.upload(&image).await?;
  Ok(Json(UploadResponse {
    status: "ok",
    ripeness: outcome.summary.classification,
    total_detected: outcome.summary.total,
    ripe: outcome.summary.ripe,
    unripe: outcome.summary.unripe,
    pot: outcome.pot,
    note: NOTE,
  }))
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
  pub last_pred: Option<Ripeness>,
  pub total_detected: u32,
  pub ripe: u32,
  pub unripe: u32,
  pub note: &'static str,
  pub image: Option<String>,
  pub updated_at: Option<DateTime<Local>>,
}

async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
  let response = match state.pipeline.live_status() {
    Some(live) => StatusResponse {
      last_pred: Some(live.summary.classification),
      total_detected: live.summary.total,
      ripe: live.summary.ripe,
      unripe: live.summary.unripe,
      note: NOTE,
      image: live
        .image
        .file_name()
        .map(|name| name.to_string_lossy().into_owned()),
      updated_at: Some(live.updated_at),
    },
    None => StatusResponse {
      last_pred: None,
      total_detected: 0,
      ripe: 0,
      unripe: 0,
      note: NOTE,
      image: None,
      updated_at: None,
    },
  };
  Json(response)
}

async fn image(State(state): State<AppState>) -> Result<Response, ApiError> {
  let path = state
    .pipeline
    .live_status()
    .map(|live| live.image)
    .ok_or(ApiError::NoImage)?;

  let bytes = match tokio::fs::read(&path).await {
    Ok(bytes) => bytes,
    // 文件可能刚被清理
    Err(e) if e.kind() == ErrorKind::NotFound => return Err(ApiError::NoImage),
    Err(e) => return Err(e.into()),
  };
  Ok(([(header::CONTENT_TYPE, "image/jpeg")], bytes).into_response())
}

#[derive(Debug, Deserialize)]
pub struct PotRequest {
  pub pot: PotId,
}

async fn select_pot(
  State(state): State<AppState>,
  Json(request): Json<PotRequest>,
) -> Json<serde_json::Value> {
  state.pipeline.select_pot(request.pot);
  Json(json!({ "status": "ok", "pot": request.pot }))
}

async fn pot_result(State(state): State<AppState>) -> Json<BTreeMap<PotId, PotTotals>> {
  Json(state.pipeline.aggregate_snapshot().await)
}

async fn reconcile(State(state): State<AppState>) -> Result<Json<BTreeMap<PotId, PotTotals>>, ApiError> {
  Ok(Json(state.pipeline.reconcile().await?))
}

async fn ledger_dump(State(state): State<AppState>) -> Result<Json<Vec<LedgerEntry>>, ApiError> {
  Ok(Json(state.pipeline.ledger_dump().await?))
}

async fn ledger_reset(State(state): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
  let removed = state.pipeline.ledger_reset().await?;
  Ok(Json(json!({ "status": "cleared", "removed": removed })))
}

async fn event_log(State(state): State<AppState>) -> Json<Vec<LogLine>> {
  Json(state.pipeline.events().snapshot())
}

async fn set_device_time(
  State(state): State<AppState>,
  Json(time): Json<DeviceTime>,
) -> Json<serde_json::Value> {
  state.telemetry.set_time(time.clone());
  Json(json!({ "status": "ok", "device": time.device, "datetime": time.datetime }))
}

async fn device_time(State(state): State<AppState>) -> Json<serde_json::Value> {
  let time = state.telemetry.time();
  Json(json!({
    "last_device": time.as_ref().map(|t| t.device.clone()),
    "last_datetime": time.map(|t| t.datetime),
  }))
}

async fn set_sensor_dht(
  State(state): State<AppState>,
  Json(reading): Json<DhtReading>,
) -> Result<Json<serde_json::Value>, ApiError> {
  state.telemetry.set_dht(reading.clone())?;
  Ok(Json(json!({
    "status": "ok",
    "device": reading.device,
    "temperature": reading.temperature,
    "humidity": reading.humidity,
  })))
}

async fn sensor_dht(State(state): State<AppState>) -> Json<serde_json::Value> {
  let reading = state.telemetry.dht();
  Json(json!({
    "device": reading.as_ref().map(|r| r.device.clone()),
    "temperature": reading.as_ref().map(|r| r.temperature),
    "humidity": reading.map(|r| r.humidity),
  }))
}
