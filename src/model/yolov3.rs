// 该文件是 Shanan （山南西风） 项目的一部分。
// src/model/yolov3.rs - YOLOv3 / YOLOv3-tiny 模型定义
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::{
  fmt::Display,
  path::{Path, PathBuf},
};

use ndarray::CowArray;
use ort::{
  session::{Session, builder::GraphOptimizationLevel},
  value::TensorRef,
};
use thiserror::Error;
use tracing::{debug, error, info};

use crate::{
  frame::RgbNhwcFrame,
  model::{Candidate, DetectResult, Model, NmsConfig, combined_non_max_suppression},
};

const YOLOV3_NUM_INPUTS: usize = 1;
const YOLOV3_INPUT_CHANNELS: i64 = 3;
/// 每个检测头输出的 x, y, w, h, objectness
const YOLOV3_BOX_ATTRS: usize = 5;
/// 锚框以 416 输入尺寸标定
const YOLOV3_ANCHOR_BASE: f32 = 416.0;
const YOLOV3_DEFAULT_INPUT_SIZE: u32 = 416;

const YOLOV3_ANCHORS: [[f32; 2]; 9] = [
  [10.0, 13.0],
  [16.0, 30.0],
  [33.0, 23.0],
  [30.0, 61.0],
  [62.0, 45.0],
  [59.0, 119.0],
  [116.0, 90.0],
  [156.0, 198.0],
  [373.0, 326.0],
];
const YOLOV3_ANCHOR_MASKS: [[usize; 3]; 3] = [[6, 7, 8], [3, 4, 5], [0, 1, 2]];

const YOLOV3_TINY_ANCHORS: [[f32; 2]; 6] = [
  [10.0, 14.0],
  [23.0, 27.0],
  [37.0, 58.0],
  [81.0, 82.0],
  [135.0, 169.0],
  [344.0, 319.0],
];
const YOLOV3_TINY_ANCHOR_MASKS: [[usize; 3]; 2] = [[3, 4, 5], [0, 1, 2]];

#[derive(Error, Debug)]
pub enum YoloV3Error {
  #[error("权重文件不存在: {0}")]
  WeightsNotFound(PathBuf),
  #[error("模型加载错误: {0}")]
  ModelLoadError(String),
  #[error("模型无效: {0}")]
  ModelInvalid(String),
  #[error("类别数量不匹配: 期望 {expected}, 权重实际为 {found}")]
  ClassMismatch { expected: usize, found: usize },
  #[error("ONNX Runtime 错误: {0}")]
  RuntimeError(String),
  #[error("输出形状错误: {0}")]
  OutputShapeError(String),
}

impl YoloV3Error {
  fn load(e: impl Display) -> Self {
    YoloV3Error::ModelLoadError(e.to_string())
  }

  fn runtime(e: impl Display) -> Self {
    YoloV3Error::RuntimeError(e.to_string())
  }

  fn invalid(msg: String) -> Self {
    error!("{}", msg);
    YoloV3Error::ModelInvalid(msg)
  }
}

/// 模型结构变体
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelVariant {
  YoloV3,
  YoloV3Tiny,
}

impl ModelVariant {
  pub fn from_tiny(tiny: bool) -> Self {
    if tiny {
      ModelVariant::YoloV3Tiny
    } else {
      ModelVariant::YoloV3
    }
  }

  pub fn name(&self) -> &'static str {
    match self {
      ModelVariant::YoloV3 => "yolov3",
      ModelVariant::YoloV3Tiny => "yolov3-tiny",
    }
  }

  fn raw_anchors(&self) -> &'static [[f32; 2]] {
    match self {
      ModelVariant::YoloV3 => &YOLOV3_ANCHORS,
      ModelVariant::YoloV3Tiny => &YOLOV3_TINY_ANCHORS,
    }
  }

  /// 从最粗到最细的检测头，各自使用的锚框下标
  pub fn anchor_masks(&self) -> &'static [[usize; 3]] {
    match self {
      ModelVariant::YoloV3 => &YOLOV3_ANCHOR_MASKS,
      ModelVariant::YoloV3Tiny => &YOLOV3_TINY_ANCHOR_MASKS,
    }
  }

  pub fn num_heads(&self) -> usize {
    self.anchor_masks().len()
  }

  pub fn anchors_per_head(&self) -> usize {
    3
  }

  /// 第 `head` 个检测头的归一化锚框 (w, h)
  pub fn head_anchors(&self, head: usize) -> [[f32; 2]; 3] {
    let anchors = self.raw_anchors();
    self.anchor_masks()[head].map(|i| {
      [
        anchors[i][0] / YOLOV3_ANCHOR_BASE,
        anchors[i][1] / YOLOV3_ANCHOR_BASE,
      ]
    })
  }
}

/// 按变体构造模型，尚未加载权重
pub fn create_yolo(tiny: bool, num_classes: usize) -> YoloV3Builder {
  YoloV3Builder::new(ModelVariant::from_tiny(tiny), num_classes)
}

#[derive(Debug, Clone)]
pub struct YoloV3Builder {
  variant: ModelVariant,
  num_classes: usize,
  input_size: u32,
  nms: NmsConfig,
}

impl YoloV3Builder {
  pub fn new(variant: ModelVariant, num_classes: usize) -> Self {
    Self {
      variant,
      num_classes,
      input_size: YOLOV3_DEFAULT_INPUT_SIZE,
      nms: NmsConfig::default(),
    }
  }

  /// 计算图输入尺寸为动态时，加载校验所用的边长
  pub fn input_size(mut self, size: u32) -> Self {
    self.input_size = size;
    self
  }

  pub fn max_boxes(mut self, max_boxes: usize) -> Self {
    self.nms.max_output_per_class = max_boxes;
    self.nms.max_total = max_boxes;
    self
  }

  pub fn iou_threshold(mut self, threshold: f32) -> Self {
    self.nms.iou_threshold = threshold;
    self
  }

  pub fn score_threshold(mut self, threshold: f32) -> Self {
    self.nms.score_threshold = threshold;
    self
  }

  pub fn variant(&self) -> ModelVariant {
    self.variant
  }

  pub fn num_classes(&self) -> usize {
    self.num_classes
  }

  pub fn nms_config(&self) -> &NmsConfig {
    &self.nms
  }

  /// 加载 ONNX 权重并校验其结构与当前变体一致
  pub fn load_weights<P: AsRef<Path>>(self, path: P) -> Result<YoloV3, YoloV3Error> {
    let path = path.as_ref();
    info!("加载 {} 权重文件: {}", self.variant.name(), path.display());
    if !path.is_file() {
      return Err(YoloV3Error::WeightsNotFound(path.to_path_buf()));
    }

    let session = Session::builder()
      .map_err(YoloV3Error::load)?
      .with_optimization_level(GraphOptimizationLevel::Level3)
      .map_err(YoloV3Error::load)?
      .commit_from_file(path)
      .map_err(YoloV3Error::load)?;

    let inputs: Vec<Vec<i64>> = session
      .inputs
      .iter()
      .map(|input| {
        input
          .input_type
          .tensor_shape()
          .map(|shape| shape.iter().copied().collect())
          .unwrap_or_default()
      })
      .collect();
    let outputs: Vec<Vec<i64>> = session
      .outputs
      .iter()
      .map(|output| {
        output
          .output_type
          .tensor_shape()
          .map(|shape| shape.iter().copied().collect())
          .unwrap_or_default()
      })
      .collect();
    debug!("模型输入形状: {:?}", inputs);
    debug!("模型输出形状: {:?}", outputs);

    validate_io(self.variant, self.num_classes, &inputs, &outputs)?;

    let mut model = YoloV3 {
      session,
      variant: self.variant,
      num_classes: self.num_classes,
      nms: self.nms,
    };

    // 输出深度未写入计算图时，试跑一次确认类别数量
    if outputs.iter().any(|shape| shape.get(4).is_some_and(|&d| d < 0)) {
      let side = known(inputs[0][1]).unwrap_or(self.input_size as usize);
      model.check_output_depth(side)?;
    }

    info!("weights loaded");
    Ok(model)
  }
}

fn known(dim: i64) -> Option<usize> {
  (dim >= 0).then_some(dim as usize)
}

/// 校验计算图的输入输出与变体、类别数是否一致
///
/// 维度为 -1（动态）时跳过，留到推理时再检查。
pub fn validate_io(
  variant: ModelVariant,
  num_classes: usize,
  inputs: &[Vec<i64>],
  outputs: &[Vec<i64>],
) -> Result<(), YoloV3Error> {
  if inputs.len() != YOLOV3_NUM_INPUTS {
    return Err(YoloV3Error::invalid(format!(
      "预期模型输入数量为 {}, 实际为 {}",
      YOLOV3_NUM_INPUTS,
      inputs.len()
    )));
  }
  let input = &inputs[0];
  if input.len() != 4 || (input[3] >= 0 && input[3] != YOLOV3_INPUT_CHANNELS) {
    return Err(YoloV3Error::invalid(format!(
      "预期模型输入为 NHWC 三通道, 实际形状为 {:?}",
      input
    )));
  }

  if outputs.len() != variant.num_heads() {
    return Err(YoloV3Error::invalid(format!(
      "{} 预期模型输出数量为 {}, 实际为 {}",
      variant.name(),
      variant.num_heads(),
      outputs.len()
    )));
  }

  for (idx, shape) in outputs.iter().enumerate() {
    if shape.len() != 5 {
      return Err(YoloV3Error::invalid(format!(
        "检测头 {} 预期为 5 维输出, 实际形状为 {:?}",
        idx, shape
      )));
    }
    if let Some(anchors) = known(shape[3])
      && anchors != variant.anchors_per_head()
    {
      return Err(YoloV3Error::invalid(format!(
        "检测头 {} 预期 {} 个锚框, 实际为 {}",
        idx,
        variant.anchors_per_head(),
        anchors
      )));
    }
    if let Some(depth) = known(shape[4]) {
      check_depth(depth, num_classes)?;
    }
  }

  Ok(())
}

fn check_depth(depth: usize, num_classes: usize) -> Result<(), YoloV3Error> {
  if depth != num_classes + YOLOV3_BOX_ATTRS {
    error!(
      "类别数量不匹配: 期望 {}, 权重实际为 {}",
      num_classes,
      depth.saturating_sub(YOLOV3_BOX_ATTRS)
    );
    return Err(YoloV3Error::ClassMismatch {
      expected: num_classes,
      found: depth.saturating_sub(YOLOV3_BOX_ATTRS),
    });
  }
  Ok(())
}

/// 单个检测头的原始输出 `[batch, grid_h, grid_w, anchors, 5 + classes]`
#[derive(Debug, Clone)]
pub struct HeadOutput {
  pub shape: Vec<i64>,
  pub data: Vec<f32>,
}

impl HeadOutput {
  fn dims(&self) -> Result<[usize; 5], YoloV3Error> {
    let dims: Vec<usize> = self
      .shape
      .iter()
      .map(|&d| known(d))
      .collect::<Option<_>>()
      .ok_or_else(|| YoloV3Error::OutputShapeError(format!("动态维度 {:?}", self.shape)))?;
    let dims: [usize; 5] = dims
      .try_into()
      .map_err(|_| YoloV3Error::OutputShapeError(format!("预期 5 维, 实际为 {:?}", self.shape)))?;

    if dims.iter().product::<usize>() != self.data.len() {
      return Err(YoloV3Error::OutputShapeError(format!(
        "形状 {:?} 与数据长度 {} 不符",
        self.shape,
        self.data.len()
      )));
    }
    Ok(dims)
  }

  fn grid_height(&self) -> i64 {
    self.shape.get(1).copied().unwrap_or(0)
  }
}

fn sigmoid(x: f32) -> f32 {
  1.0 / (1.0 + (-x).exp())
}

/// 将检测头输出解码为归一化角点坐标与各类别得分
pub fn decode_head(
  head: &HeadOutput,
  anchors: &[[f32; 2]],
  num_classes: usize,
) -> Result<Vec<Candidate>, YoloV3Error> {
  let [batch, grid_h, grid_w, num_anchors, depth] = head.dims()?;
  check_depth(depth, num_classes)?;
  if batch != 1 {
    return Err(YoloV3Error::OutputShapeError(format!(
      "预期批大小为 1, 实际为 {}",
      batch
    )));
  }
  if num_anchors != anchors.len() {
    return Err(YoloV3Error::OutputShapeError(format!(
      "预期 {} 个锚框, 实际为 {}",
      anchors.len(),
      num_anchors
    )));
  }

  let mut candidates = Vec::with_capacity(grid_h * grid_w * num_anchors);
  for y in 0..grid_h {
    for x in 0..grid_w {
      for (a, anchor) in anchors.iter().enumerate() {
        let base = ((y * grid_w + x) * num_anchors + a) * depth;
        let pred = &head.data[base..base + depth];

        let cx = (sigmoid(pred[0]) + x as f32) / grid_w as f32;
        let cy = (sigmoid(pred[1]) + y as f32) / grid_h as f32;
        let w = pred[2].exp() * anchor[0];
        let h = pred[3].exp() * anchor[1];
        let objectness = sigmoid(pred[4]);

        let scores = pred[YOLOV3_BOX_ATTRS..]
          .iter()
          .map(|&logit| objectness * sigmoid(logit))
          .collect();

        candidates.push(Candidate {
          bbox: [cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0],
          scores,
        });
      }
    }
  }

  Ok(candidates)
}

pub struct YoloV3 {
  session: Session,
  variant: ModelVariant,
  num_classes: usize,
  nms: NmsConfig,
}

impl YoloV3 {
  fn run_session(&mut self, input: &RgbNhwcFrame) -> Result<Vec<HeadOutput>, YoloV3Error> {
    debug!("设置模型输入");
    let input_array = CowArray::from(input.as_nhwc()).into_dyn();
    let tensor = TensorRef::from_array_view(&input_array).map_err(YoloV3Error::runtime)?;

    debug!("执行模型推理");
    let outputs = self
      .session
      .run(ort::inputs![tensor])
      .map_err(YoloV3Error::runtime)?;

    debug!("获取模型输出");
    let mut heads = Vec::with_capacity(self.variant.num_heads());
    for idx in 0..self.variant.num_heads() {
      let (shape, data) = outputs[idx]
        .try_extract_tensor::<f32>()
        .map_err(YoloV3Error::runtime)?;
      heads.push(HeadOutput {
        shape: shape.iter().copied().collect(),
        data: data.to_vec(),
      });
    }
    Ok(heads)
  }

  fn check_output_depth(&mut self, size: usize) -> Result<(), YoloV3Error> {
    debug!("输出深度为动态维度, 以 {}x{} 空白帧试跑", size, size);
    for head in self.run_session(&RgbNhwcFrame::zeros(size))? {
      let [_, _, _, _, depth] = head.dims()?;
      check_depth(depth, self.num_classes)?;
    }
    Ok(())
  }

  pub fn postprocess(&self, heads: Vec<HeadOutput>) -> Result<DetectResult, YoloV3Error> {
    postprocess(self.variant, self.num_classes, &self.nms, heads)
  }
}

/// 解码全部检测头并做联合 NMS
pub fn postprocess(
  variant: ModelVariant,
  num_classes: usize,
  nms: &NmsConfig,
  mut heads: Vec<HeadOutput>,
) -> Result<DetectResult, YoloV3Error> {
  debug!("后处理模型输出");
  if heads.len() != variant.num_heads() {
    return Err(YoloV3Error::OutputShapeError(format!(
      "{} 预期 {} 个检测头, 实际为 {}",
      variant.name(),
      variant.num_heads(),
      heads.len()
    )));
  }
  // 网格从粗到细，与锚框掩码顺序一致
  heads.sort_by_key(HeadOutput::grid_height);

  let mut candidates = Vec::new();
  for (idx, head) in heads.iter().enumerate() {
    let anchors = variant.head_anchors(idx);
    candidates.extend(decode_head(head, &anchors, num_classes)?);
  }
  debug!("候选框数量: {}", candidates.len());

  let result = combined_non_max_suppression(&candidates, num_classes, nms);
  debug!("检测到 {}/{} 个物体", result.nums, result.max_boxes());
  Ok(result)
}

impl Model for YoloV3 {
  type Input = RgbNhwcFrame;
  type Output = DetectResult;
  type Error = YoloV3Error;

  fn infer(&mut self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    let heads = self.run_session(input)?;
    self.postprocess(heads)
  }
}
