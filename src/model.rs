// 该文件是 Shanan （山南西风） 项目的一部分。
// src/model.rs - 模型
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

pub trait Model {
  type Input;
  type Output;
  type Error;

  fn infer(&mut self, input: &Self::Input) -> Result<Self::Output, Self::Error>;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectItem {
  pub class_id: u32,
  pub score: f32,
  pub bbox: [f32; 4], // [x_min, y_min, x_max, y_max]，归一化坐标
}

/// 单张图像的检测结果
///
/// 三个序列按下标对齐，长度均为模型的最大检测数量，
/// 只有前 `nums` 项有效，其余为零填充。
#[derive(Debug, Clone, PartialEq)]
pub struct DetectResult {
  pub boxes: Box<[[f32; 4]]>,
  pub scores: Box<[f32]>,
  pub classes: Box<[u32]>,
  pub nums: usize,
}

impl DetectResult {
  pub fn empty(max_boxes: usize) -> Self {
    Self::from_items(Vec::new(), max_boxes)
  }

  /// 由有效检测项构造，并填充到 `max_boxes`
  pub fn from_items(items: Vec<DetectItem>, max_boxes: usize) -> Self {
    let nums = items.len().min(max_boxes);
    let mut boxes = vec![[0.0f32; 4]; max_boxes];
    let mut scores = vec![0.0f32; max_boxes];
    let mut classes = vec![0u32; max_boxes];

    for (i, item) in items.into_iter().take(nums).enumerate() {
      boxes[i] = item.bbox;
      scores[i] = item.score;
      classes[i] = item.class_id;
    }

    DetectResult {
      boxes: boxes.into_boxed_slice(),
      scores: scores.into_boxed_slice(),
      classes: classes.into_boxed_slice(),
      nums,
    }
  }

  pub fn max_boxes(&self) -> usize {
    self.boxes.len()
  }

  pub fn is_empty(&self) -> bool {
    self.nums == 0
  }

  /// 仅遍历前 `nums` 个有效检测，保持模型输出顺序
  pub fn items(&self) -> impl Iterator<Item = DetectItem> + '_ {
    (0..self.nums).map(move |i| DetectItem {
      class_id: self.classes[i],
      score: self.scores[i],
      bbox: self.boxes[i],
    })
  }
}

mod nms;
mod yolov3;

pub use self::nms::{Candidate, NmsConfig, combined_non_max_suppression, iou};
pub use self::yolov3::{
  HeadOutput, ModelVariant, YoloV3, YoloV3Builder, YoloV3Error, create_yolo, decode_head,
  postprocess, validate_io,
};
