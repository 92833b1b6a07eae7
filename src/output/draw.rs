// 该文件是 Lajiao（辣椒）项目的一部分。
// src/output/draw.rs - 检测结果可视化
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::{Path, PathBuf};

use ab_glyph::{FontArc, PxScale};
use image::{ImageFormat, Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;
use thiserror::Error;
use tracing::debug;

use crate::model::{DetectItem, DetectResult, WithLabel};

// 文本渲染常量
const LABEL_FONT_SIZE: f32 = 20.0;
const LABEL_TEXT_HEIGHT: i32 = 24;
const LABEL_CHAR_WIDTH: f32 = 11.0; // 每字符平均宽度（粗略估计）
const LABEL_TEXT_VERTICAL_PADDING: i32 = 2;
const BOX_THICKNESS: i32 = 2;

// 按类别编号取色：0 成熟为红色，1 未成熟为绿色
const PALETTE: [[u8; 3]; 2] = [[230, 30, 30], [30, 200, 60]];

#[derive(Error, Debug)]
pub enum AnnotateError {
  #[error("图像处理错误: {0}")]
  Image(#[from] image::ImageError),
  #[error("I/O 错误: {0}")]
  Io(#[from] std::io::Error),
  #[error("字体文件无效: {0}")]
  InvalidFont(String),
  #[error("标注任务异常终止: {0}")]
  Join(#[from] tokio::task::JoinError),
}

#[derive(Clone)]
pub struct Draw {
  font_size: f32,
  label_text_height: i32,
  label_char_width: f32,
  label_text_vertical_padding: i32,
  font: Option<FontArc>,
}

impl Default for Draw {
  fn default() -> Self {
    Self {
      font_size: LABEL_FONT_SIZE,
      label_text_height: LABEL_TEXT_HEIGHT,
      label_char_width: LABEL_CHAR_WIDTH,
      label_text_vertical_padding: LABEL_TEXT_VERTICAL_PADDING,
      font: None,
    }
  }
}

impl Draw {
  /// 不带字体时只画框，不写标签文字
  pub fn new(font: Option<FontArc>) -> Self {
    Self {
      font,
      ..Self::default()
    }
  }

  pub fn from_font_file(path: impl AsRef<Path>) -> Result<Self, AnnotateError> {
    let path = path.as_ref();
    let data = std::fs::read(path)?;
    let font = FontArc::try_from_vec(data)
      .map_err(|e| AnnotateError::InvalidFont(format!("{}: {}", path.display(), e)))?;
    Ok(Self::new(Some(font)))
  }

  // bbox 为归一化坐标 [x_min, y_min, x_max, y_max]
  fn draw_bbox_with_label<T: WithLabel>(&self, image: &mut RgbImage, bbox: &[f32; 4], kind: &T, score: f32) {
    let (w, h) = (image.width() as i32, image.height() as i32);
    if w == 0 || h == 0 {
      return;
    }

    let x_min = ((bbox[0] * w as f32).floor() as i32).clamp(0, w - 1);
    let y_min = ((bbox[1] * h as f32).floor() as i32).clamp(0, h - 1);
    let x_max = ((bbox[2] * w as f32).ceil() as i32).clamp(0, w - 1);
    let y_max = ((bbox[3] * h as f32).ceil() as i32).clamp(0, h - 1);

    if x_min >= x_max || y_min >= y_max {
      return;
    }

    let color = Rgb(PALETTE[kind.label_id() as usize % PALETTE.len()]);

    for t in 0..BOX_THICKNESS {
      let width = (x_max - x_min + 1 - 2 * t).max(1) as u32;
      let height = (y_max - y_min + 1 - 2 * t).max(1) as u32;
      draw_hollow_rect_mut(image, Rect::at(x_min + t, y_min + t).of_size(width, height), color);
    }

    let Some(font) = &self.font else {
      return;
    };

    let label = format!("{} {:.2}", kind.to_label_str(), score);
    let text_width = (label.len() as f32 * self.label_char_width) as i32;
    let label_x = x_min;
    let label_y = (y_min - self.label_text_height).max(0);
    let label_width = text_width.min(w - label_x).max(0) as u32;

    if label_width > 0 {
      let rect = Rect::at(label_x, label_y).of_size(label_width, self.label_text_height as u32);
      draw_filled_rect_mut(image, rect, color);
      draw_text_mut(
        image,
        Rgb([255u8, 255u8, 255u8]),
        label_x,
        label_y + self.label_text_vertical_padding,
        PxScale::from(self.font_size),
        font,
        &label,
      );
    }
  }

  /// 读取 `source`，画上检测框后以 JPEG 写入 `target`
  pub fn annotate_file<T: WithLabel>(
    &self,
    source: &Path,
    target: &Path,
    result: &DetectResult<T>,
  ) -> Result<(), AnnotateError> {
    let mut image = image::open(source)?.into_rgb8();
    self.draw_detections_on_image(&mut image, result);
    image.save_with_format(target, ImageFormat::Jpeg)?;
    debug!("标注图像已保存: {}", target.display());
    Ok(())
  }

  pub async fn annotate<T>(
    &self,
    source: PathBuf,
    target: PathBuf,
    result: DetectResult<T>,
  ) -> Result<PathBuf, AnnotateError>
  where
    T: WithLabel + Send + 'static,
  {
    let draw = self.clone();
    tokio::task::spawn_blocking(move || {
      draw.annotate_file(&source, &target, &result)?;
      Ok(target)
    })
    .await?
  }
}

pub trait DrawDetectionOnImage<T: WithLabel> {
  fn draw_detections_on_image(&self, image: &mut RgbImage, result: &DetectResult<T>);
}

impl<T: WithLabel> DrawDetectionOnImage<T> for Draw {
  fn draw_detections_on_image(&self, image: &mut RgbImage, result: &DetectResult<T>) {
    for DetectItem { kind, score, bbox } in result.items.iter() {
      // 没有坐标的检测只参与计数
      if let Some(bbox) = bbox {
        self.draw_bbox_with_label(image, bbox, kind, *score);
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::RipenessLabel;

  fn item(kind: RipenessLabel, bbox: Option<[f32; 4]>) -> DetectItem<RipenessLabel> {
    DetectItem {
      kind,
      score: 0.9,
      bbox,
    }
  }

  #[test]
  fn boxes_use_class_colors() {
    let mut image = RgbImage::new(100, 100);
    let result = DetectResult::from(vec![
      item(RipenessLabel::Ripe, Some([0.1, 0.1, 0.4, 0.4])),
      item(RipenessLabel::Unripe, Some([0.6, 0.6, 0.9, 0.9])),
    ]);
    Draw::default().draw_detections_on_image(&mut image, &result);

    assert_eq!(image.get_pixel(10, 20), &Rgb(PALETTE[0]));
    assert_eq!(image.get_pixel(60, 70), &Rgb(PALETTE[1]));
    // 框内部保持原样
    assert_eq!(image.get_pixel(25, 25), &Rgb([0, 0, 0]));
  }

  #[test]
  fn skips_items_without_bbox_and_degenerate_boxes() {
    let mut image = RgbImage::new(32, 32);
    let result = DetectResult::from(vec![
      item(RipenessLabel::Ripe, None),
      item(RipenessLabel::Ripe, Some([0.5, 0.5, 0.5, 0.5])),
    ]);
    Draw::default().draw_detections_on_image(&mut image, &result);
    assert!(image.pixels().all(|p| *p == Rgb([0, 0, 0])));
  }

  #[test]
  fn clamps_out_of_range_boxes() {
    let mut image = RgbImage::new(40, 30);
    let result = DetectResult::from(vec![item(RipenessLabel::Unripe, Some([-0.5, -0.5, 1.5, 1.5]))]);
    Draw::default().draw_detections_on_image(&mut image, &result);
    assert_eq!(image.get_pixel(0, 0), &Rgb(PALETTE[1]));
    assert_eq!(image.get_pixel(39, 29), &Rgb(PALETTE[1]));
  }

  #[test]
  fn annotate_file_writes_jpeg() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("a.jpg");
    let target = dir.path().join("a_det.jpg");
    RgbImage::from_pixel(48, 48, Rgb([200, 200, 200]))
      .save(&source)
      .unwrap();

    let result = DetectResult::from(vec![item(RipenessLabel::Ripe, Some([0.2, 0.2, 0.8, 0.8]))]);
    Draw::default().annotate_file(&source, &target, &result).unwrap();

    let written = image::open(&target).unwrap();
    assert_eq!((written.width(), written.height()), (48, 48));
  }

  #[test]
  fn rejects_invalid_font_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.ttf");
    std::fs::write(&path, b"not a font").unwrap();
    assert!(matches!(
      Draw::from_font_file(&path),
      Err(AnnotateError::InvalidFont(_))
    ));
  }
}
