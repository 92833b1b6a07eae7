// 该文件是 Lajiao（辣椒）项目的一部分。
// tests/pipeline_tests.rs - 上传流水线测试
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

mod common;

use std::time::Duration;

use common::{Behavior, StubDetector, config, drop_ledger_table, files_in, jpeg, pipeline, pipeline_on_disk};
use lajiao::analyzer::Ripeness;
use lajiao::model::RipenessLabel::{Ripe, Unripe};
use lajiao::pipeline::PipelineError;
use lajiao::state::PotTotals;

#[tokio::test]
async fn zero_detections_without_pot() {
  let dir = tempfile::tempdir().unwrap();
  let pipeline = pipeline(config(dir.path()), StubDetector::empty());

  let outcome = pipeline.upload(&jpeg(64, 48)).await.unwrap();
  assert_eq!(outcome.summary.classification, Ripeness::None);
  assert_eq!(outcome.summary.total, 0);
  assert_eq!(outcome.pot, None);
  assert!(outcome.recorded.is_none());

  let live = pipeline.live_status().unwrap();
  assert_eq!(live.summary, outcome.summary);
  assert_eq!(live.image, outcome.image);
  assert!(pipeline.ledger_dump().await.unwrap().is_empty());
  assert!(pipeline.aggregate_snapshot().await.is_empty());
}

#[tokio::test]
async fn uploads_accumulate_for_selected_pot() {
  let dir = tempfile::tempdir().unwrap();
  let detector = StubDetector::new(Behavior::Reply(vec![(Ripe, 0.9, None), (Unripe, 0.4, None)]));
  let pipeline = pipeline(config(dir.path()), detector.clone());

  pipeline.select_pot(3);
  pipeline.upload(&jpeg(32, 32)).await.unwrap();
  detector.set(Behavior::Reply(vec![(Unripe, 0.8, None), (Unripe, 0.7, None), (Ripe, 0.2, None)]));
  let outcome = pipeline.upload(&jpeg(32, 32)).await.unwrap();

  assert_eq!(outcome.pot, Some(3));
  assert_eq!(outcome.summary.classification, Ripeness::Unripe);
  assert_eq!(outcome.recorded.unwrap().totals, PotTotals { ripe: 2, unripe: 3 });
  assert_eq!(pipeline.aggregate_snapshot().await[&3], PotTotals { ripe: 2, unripe: 3 });

  let rows = pipeline.ledger_dump().await.unwrap();
  assert_eq!(rows.len(), 2);
  assert_eq!((rows[0].ripe, rows[0].unripe, rows[0].total), (1, 2, 3));
  assert_eq!((rows[1].ripe, rows[1].unripe, rows[1].total), (1, 1, 2));

  let messages: Vec<String> = pipeline.events().snapshot().into_iter().map(|l| l.message).collect();
  assert!(messages.contains(&"Scanning POT (3)".to_string()));
  assert!(messages.contains(&"Processing POT 3".to_string()));
  assert!(messages.contains(&"POT 3 → ripe=2 unripe=3".to_string()));
}

#[tokio::test]
async fn minority_class_with_best_box_wins() {
  let dir = tempfile::tempdir().unwrap();
  let detector = StubDetector::new(Behavior::Reply(vec![
    (Unripe, 0.5, None),
    (Ripe, 0.97, None),
    (Unripe, 0.6, None),
  ]));
  let pipeline = pipeline(config(dir.path()), detector);

  let outcome = pipeline.upload(&jpeg(16, 16)).await.unwrap();
  assert_eq!(outcome.summary.classification, Ripeness::Ripe);
  assert_eq!((outcome.summary.ripe, outcome.summary.unripe), (1, 2));
}

#[tokio::test]
async fn inference_failure_keeps_file_and_previous_status() {
  let dir = tempfile::tempdir().unwrap();
  let detector = StubDetector::new(Behavior::Reply(vec![(Ripe, 0.9, None)]));
  let pipeline = pipeline(config(dir.path()), detector.clone());
  pipeline.select_pot(1);

  let first = pipeline.upload(&jpeg(16, 16)).await.unwrap();
  detector.set(Behavior::Fail("model not loaded"));
  let err = pipeline.upload(&jpeg(16, 16)).await.unwrap_err();

  assert!(matches!(err, PipelineError::Inference(_)));
  assert!(err.to_string().contains("model not loaded"));
  assert_eq!(files_in(&dir.path().join("uploads")).len(), 2);
  assert_eq!(pipeline.live_status().unwrap().image, first.image);
  assert_eq!(pipeline.ledger_dump().await.unwrap().len(), 1);
  assert_eq!(pipeline.aggregate_snapshot().await[&1], PotTotals { ripe: 1, unripe: 0 });

  let log = pipeline.events().snapshot();
  assert!(log.last().unwrap().message.starts_with("Inference error:"));
}

#[tokio::test]
async fn slow_detector_times_out() {
  let dir = tempfile::tempdir().unwrap();
  let mut config = config(dir.path());
  config.detect_timeout = Duration::from_millis(50);
  let pipeline = pipeline(config, StubDetector::new(Behavior::Hang));

  let err = pipeline.upload(&jpeg(16, 16)).await.unwrap_err();
  assert!(matches!(err, PipelineError::InferenceTimeout(t) if t == Duration::from_millis(50)));
  assert!(pipeline.live_status().is_none());
}

#[tokio::test]
async fn detector_sees_rotated_image() {
  let dir = tempfile::tempdir().unwrap();
  let detector = StubDetector::empty();
  let pipeline = pipeline(config(dir.path()), detector.clone());

  pipeline.upload(&jpeg(80, 40)).await.unwrap();
  let seen = detector.seen.lock().unwrap();
  assert_eq!(seen.len(), 1);
  assert_eq!((seen[0].1, seen[0].2), (40, 80));
}

#[tokio::test]
async fn undecodable_upload_is_rejected_before_inference() {
  let dir = tempfile::tempdir().unwrap();
  let detector = StubDetector::empty();
  let pipeline = pipeline(config(dir.path()), detector.clone());

  let err = pipeline.upload(b"definitely not an image").await.unwrap_err();
  assert!(matches!(err, PipelineError::Preprocess(_)));
  assert!(detector.seen.lock().unwrap().is_empty());
  assert!(pipeline.live_status().is_none());
}

#[tokio::test]
async fn retention_never_evicts_live_image() {
  let dir = tempfile::tempdir().unwrap();
  let mut config = config(dir.path());
  config.max_files = 1;
  let pipeline = pipeline(config, StubDetector::empty());

  for _ in 0..4 {
    pipeline.upload(&jpeg(16, 16)).await.unwrap();
  }

  let live = pipeline.live_status().unwrap();
  assert!(live.image.exists());
  assert_eq!(files_in(&dir.path().join("uploads")).len(), 2);
}

#[tokio::test]
async fn ledger_failure_fails_upload_after_live_status() {
  let dir = tempfile::tempdir().unwrap();
  let db = dir.path().join("chili.db");
  let detector = StubDetector::new(Behavior::Reply(vec![(Ripe, 0.9, None)]));
  let pipeline = pipeline_on_disk(config(dir.path()), detector, &db);

  pipeline.select_pot(1);
  let first = pipeline.upload(&jpeg(16, 16)).await.unwrap();
  drop_ledger_table(&db);

  let err = pipeline.upload(&jpeg(16, 16)).await.unwrap_err();
  assert!(matches!(err, PipelineError::Ledger(_)));
  assert!(err.to_string().contains("pot_detection"));

  let live = pipeline.live_status().unwrap();
  assert_ne!(live.image, first.image);
  assert_eq!(live.summary.ripe, 1);
  assert_eq!(pipeline.aggregate_snapshot().await[&1], PotTotals { ripe: 1, unripe: 0 });

  let log = pipeline.events().snapshot();
  assert!(log.last().unwrap().message.starts_with("Ledger error:"));
}

#[cfg(feature = "annotate")]
#[tokio::test]
async fn annotated_copy_becomes_live_image() {
  let dir = tempfile::tempdir().unwrap();
  let mut config = config(dir.path());
  config.annotate = true;
  let detector = StubDetector::new(Behavior::Reply(vec![(Ripe, 0.9, Some([0.1, 0.1, 0.6, 0.6]))]));
  let pipeline = pipeline(config, detector.clone());

  let outcome = pipeline.upload(&jpeg(40, 60)).await.unwrap();
  let name = outcome.image.file_name().unwrap().to_string_lossy().into_owned();
  assert!(name.ends_with("_det.jpg"));
  assert!(outcome.image.exists());

  let source = detector.seen.lock().unwrap()[0].0.clone();
  assert_ne!(source, outcome.image);
  assert_eq!(files_in(&dir.path().join("uploads")).len(), 2);
  assert_eq!(image::image_dimensions(&outcome.image).unwrap(), (60, 40));
}

#[tokio::test]
async fn reset_then_reconcile_clears_aggregate() {
  let dir = tempfile::tempdir().unwrap();
  let detector = StubDetector::new(Behavior::Reply(vec![(Ripe, 0.9, None), (Ripe, 0.8, None)]));
  let pipeline = pipeline(config(dir.path()), detector);

  pipeline.select_pot(7);
  pipeline.upload(&jpeg(16, 16)).await.unwrap();
  pipeline.select_pot(8);
  pipeline.upload(&jpeg(16, 16)).await.unwrap();

  let rebuilt = pipeline.reconcile().await.unwrap();
  assert_eq!(rebuilt, pipeline.aggregate_snapshot().await);
  assert_eq!(rebuilt[&7], PotTotals { ripe: 2, unripe: 0 });

  assert_eq!(pipeline.ledger_reset().await.unwrap(), 2);
  assert_eq!(pipeline.aggregate_snapshot().await.len(), 2);
  assert!(pipeline.reconcile().await.unwrap().is_empty());
}
