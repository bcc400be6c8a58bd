// 该文件是 Shanan （山南西风） 项目的一部分。
// src/output/draw.rs - 目标检测结果可视化
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::Path;

use ab_glyph::{FontArc, FontVec, PxScale};
use image::{Rgb, RgbImage};
use imageproc::{
  drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size},
  rect::Rect,
};
use thiserror::Error;
use tracing::debug;

use crate::{
  labels::{ClassNames, ClassNamesError},
  model::{DetectItem, DetectResult},
};

// 文本渲染常量
const LABEL_FONT_SIZE: f32 = 20.0;
const LABEL_TEXT_HEIGHT: i32 = 24;
const LABEL_TEXT_VERTICAL_PADDING: i32 = 2;
const BOX_THICKNESS: i32 = 2;
const BOX_COLOR: [u8; 3] = [0, 0, 255]; // 蓝色
const TEXT_COLOR: [u8; 3] = [255, 255, 255]; // 白色

/// 默认字体 DejaVu Sans
const EMBEDDED_FONT: &[u8] = include_bytes!("../../assets/DejaVuSans.ttf");

#[derive(Error, Debug)]
pub enum FontError {
  #[error("无法读取字体文件 {0}: {1}")]
  IoError(String, std::io::Error),
  #[error("字体文件无效: {0}")]
  InvalidFont(String),
}

/// 读取字体；未指定路径时使用内置字体
pub fn load_font(path: Option<&Path>) -> Result<FontArc, FontError> {
  let Some(path) = path else {
    return FontArc::try_from_slice(EMBEDDED_FONT)
      .map_err(|_| FontError::InvalidFont("DejaVuSans.ttf".to_string()));
  };

  let data = std::fs::read(path).map_err(|e| FontError::IoError(path.display().to_string(), e))?;
  let font =
    FontVec::try_from_vec(data).map_err(|_| FontError::InvalidFont(path.display().to_string()))?;
  debug!("使用字体: {}", path.display());
  Ok(FontArc::new(font))
}

pub struct Draw {
  font_size: f32,
  label_text_height: i32,
  label_text_vertical_padding: i32,
  box_thickness: i32,
  box_color: [u8; 3],
  text_color: [u8; 3],
  font: FontArc,
}

impl Draw {
  pub fn new(font: FontArc) -> Self {
    Self {
      font_size: LABEL_FONT_SIZE,
      label_text_height: LABEL_TEXT_HEIGHT,
      label_text_vertical_padding: LABEL_TEXT_VERTICAL_PADDING,
      box_thickness: BOX_THICKNESS,
      box_color: BOX_COLOR,
      text_color: TEXT_COLOR,
      font,
    }
  }

  fn label_width(&self, label: &str) -> i32 {
    text_size(PxScale::from(self.font_size), &self.font, label).0 as i32
  }

  // 在图像上绘制一个矩形边框，bbox 为归一化坐标 [x_min, y_min, x_max, y_max]
  fn draw_bbox_with_label(&self, image: &mut RgbImage, bbox: &[f32; 4], label: &str) {
    let (w, h) = (image.width() as f32, image.height() as f32);

    let x_min = ((bbox[0] * w) as i32).clamp(0, w as i32 - 1);
    let y_min = ((bbox[1] * h) as i32).clamp(0, h as i32 - 1);
    let x_max = ((bbox[2] * w) as i32).clamp(0, w as i32 - 1);
    let y_max = ((bbox[3] * h) as i32).clamp(0, h as i32 - 1);

    if x_min >= x_max || y_min >= y_max {
      return;
    }

    // 逐层向内收缩绘制加粗边框
    for t in 0..self.box_thickness {
      let width = x_max - x_min - 2 * t + 1;
      let height = y_max - y_min - 2 * t + 1;
      if width <= 0 || height <= 0 {
        break;
      }
      let rect = Rect::at(x_min + t, y_min + t).of_size(width as u32, height as u32);
      draw_hollow_rect_mut(image, rect, Rgb(self.box_color));
    }

    // 标签位于边框上方，超出顶部时贴边
    let label_x = x_min;
    let label_y = (y_min - self.label_text_height).max(0);
    let max_width = (w as i32 - label_x).max(0);
    let label_width = self.label_width(label).min(max_width);

    if label_width <= 0 {
      return;
    }

    let rect =
      Rect::at(label_x, label_y).of_size(label_width as u32, self.label_text_height as u32);
    draw_filled_rect_mut(image, rect, Rgb(self.box_color));

    draw_text_mut(
      image,
      Rgb(self.text_color),
      label_x,
      label_y + self.label_text_vertical_padding,
      PxScale::from(self.font_size),
      &self.font,
      label,
    );
  }

  /// 绘制全部有效检测，类别编号越界时报错
  pub fn draw_detections_on_image(
    &self,
    image: &mut RgbImage,
    result: &DetectResult,
    names: &ClassNames,
  ) -> Result<(), ClassNamesError> {
    for DetectItem {
      class_id,
      score,
      bbox,
    } in result.items()
    {
      let label = format!("{} {:.4}", names.name(class_id)?, score);
      self.draw_bbox_with_label(image, &bbox, &label);
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn one_detection(class_id: u32) -> DetectResult {
    DetectResult::from_items(
      vec![DetectItem {
        class_id,
        score: 0.9,
        bbox: [0.25, 0.5, 0.75, 0.9],
      }],
      10,
    )
  }

  #[test]
  fn draws_box_edges() {
    let mut image = RgbImage::from_pixel(100, 100, Rgb([0, 0, 0]));
    let names = ClassNames::parse("person\n");
    let draw = Draw::new(load_font(None).unwrap());

    draw
      .draw_detections_on_image(&mut image, &one_detection(0), &names)
      .unwrap();

    assert_eq!(image.get_pixel(25, 70), &Rgb(BOX_COLOR));
    assert_eq!(image.get_pixel(26, 70), &Rgb(BOX_COLOR));
    assert_eq!(image.get_pixel(75, 70), &Rgb(BOX_COLOR));
    assert_eq!(image.get_pixel(50, 90), &Rgb(BOX_COLOR));
    // 框内部保持不变
    assert_eq!(image.get_pixel(50, 70), &Rgb([0, 0, 0]));
  }

  #[test]
  fn draws_label_background_above_box() {
    let mut image = RgbImage::from_pixel(100, 100, Rgb([0, 0, 0]));
    let names = ClassNames::parse("person\n");
    Draw::new(load_font(None).unwrap())
      .draw_detections_on_image(&mut image, &one_detection(0), &names)
      .unwrap();

    // 文字上方的留白保持背景色
    assert_eq!(image.get_pixel(30, 26), &Rgb(BOX_COLOR));
  }

  #[test]
  fn label_text_is_rendered_without_system_fonts() {
    let mut image = RgbImage::from_pixel(100, 100, Rgb([0, 0, 0]));
    let names = ClassNames::parse("person\n");
    Draw::new(load_font(None).unwrap())
      .draw_detections_on_image(&mut image, &one_detection(0), &names)
      .unwrap();

    // 背景为纯蓝色，出现红色分量说明绘制了白色文字
    let text_pixels = (25..100)
      .flat_map(|x| (28..50).map(move |y| (x, y)))
      .filter(|&(x, y)| image.get_pixel(x, y)[0] > 0)
      .count();
    assert!(text_pixels > 0);
  }

  #[test]
  fn unknown_class_fails_instead_of_mislabelling() {
    let mut image = RgbImage::new(32, 32);
    let names = ClassNames::parse("person\n");
    let err = Draw::new(load_font(None).unwrap())
      .draw_detections_on_image(&mut image, &one_detection(5), &names)
      .unwrap_err();
    assert!(matches!(err, ClassNamesError::UnknownClass { class_id: 5, .. }));
  }

  #[test]
  fn padding_entries_are_not_drawn() {
    let mut image = RgbImage::from_pixel(64, 64, Rgb([0, 0, 0]));
    let names = ClassNames::parse("person\n");
    Draw::new(load_font(None).unwrap())
      .draw_detections_on_image(&mut image, &DetectResult::empty(100), &names)
      .unwrap();
    assert!(image.pixels().all(|p| *p == Rgb([0, 0, 0])));
  }

  #[test]
  fn explicit_missing_font_is_an_error() {
    let err = load_font(Some(Path::new("/nonexistent/font.ttf"))).err().unwrap();
    assert!(matches!(err, FontError::IoError(..)));
  }

  #[test]
  fn explicit_garbage_font_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("font.ttf");
    std::fs::write(&path, b"not a font").unwrap();

    let err = load_font(Some(&path)).err().unwrap();
    assert!(matches!(err, FontError::InvalidFont(_)));
  }
}
