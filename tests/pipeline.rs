// 该文件是 Shanan （山南西风） 项目的一部分。
// tests/pipeline.rs - 检测流程集成测试
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::Path;

use image::{Rgb, RgbImage};
use shanan::{
  args::DetectConfig,
  frame::RgbNhwcFrame,
  model::{DetectItem, DetectResult, Model},
  output::DetectionRecord,
  task::OneShotTask,
};

/// 返回固定结果的模型，同时检查输入形状
struct FixedModel {
  items: Vec<DetectItem>,
  size: usize,
}

impl Model for FixedModel {
  type Input = RgbNhwcFrame;
  type Output = DetectResult;
  type Error = std::io::Error;

  fn infer(&mut self, input: &RgbNhwcFrame) -> Result<DetectResult, std::io::Error> {
    assert_eq!(input.as_nhwc().shape(), &[1, self.size, self.size, 3]);
    Ok(DetectResult::from_items(self.items.clone(), 100))
  }
}

fn config(dir: &Path) -> DetectConfig {
  let image = dir.join("girl.png");
  RgbImage::from_pixel(120, 80, Rgb([200, 200, 200]))
    .save(&image)
    .unwrap();
  let classes = dir.join("coco.names");
  std::fs::write(&classes, "person\nbicycle\ncar\n").unwrap();

  DetectConfig {
    classes,
    weights: dir.join("yolov3.onnx"),
    tiny: false,
    size: 64,
    image,
    output: dir.join("out").join("output.jpg"),
    num_classes: 3,
    max_boxes: 100,
    iou_threshold: 0.5,
    score_threshold: 0.5,
    font: None,
    record: Some(dir.join("detections.json")),
  }
}

#[test]
fn one_shot_task_reports_draws_and_records() {
  let dir = tempfile::tempdir().unwrap();
  let config = config(dir.path());
  let mut model = FixedModel {
    items: vec![
      DetectItem {
        class_id: 2,
        score: 0.9,
        bbox: [0.1, 0.2, 0.5, 0.8],
      },
      DetectItem {
        class_id: 0,
        score: 0.6,
        bbox: [0.5, 0.5, 0.9, 0.9],
      },
    ],
    size: 64,
  };

  let summary = OneShotTask::new(config.clone()).run_task(&mut model).unwrap();

  assert_eq!(summary.nums, 2);
  assert_eq!(
    summary.lines,
    vec![
      "car, 0.9000, [0.1000 0.2000 0.5000 0.8000]",
      "person, 0.6000, [0.5000 0.5000 0.9000 0.9000]",
    ]
  );

  let saved = image::open(&summary.output).unwrap().to_rgb8();
  assert_eq!(saved.dimensions(), (120, 80));

  let records: Vec<DetectionRecord> =
    serde_json::from_slice(&std::fs::read(config.record.unwrap()).unwrap()).unwrap();
  assert_eq!(records.len(), 2);
  assert_eq!(records[0].class_name, "car");
}

#[test]
fn empty_result_still_saves_image() {
  let dir = tempfile::tempdir().unwrap();
  let mut model = FixedModel {
    items: Vec::new(),
    size: 64,
  };

  let summary = OneShotTask::new(config(dir.path()))
    .run_task(&mut model)
    .unwrap();

  assert_eq!(summary.nums, 0);
  assert!(summary.lines.is_empty());
  assert!(summary.output.is_file());
}

#[test]
fn class_outside_table_fails() {
  let dir = tempfile::tempdir().unwrap();
  let config = config(dir.path());
  let mut model = FixedModel {
    items: vec![DetectItem {
      class_id: 7,
      score: 0.9,
      bbox: [0.1, 0.1, 0.2, 0.2],
    }],
    size: 64,
  };

  assert!(OneShotTask::new(config.clone()).run_task(&mut model).is_err());
  assert!(!config.output.exists());
}

#[test]
fn missing_image_fails_before_inference() {
  let dir = tempfile::tempdir().unwrap();
  let mut config = config(dir.path());
  config.image = dir.path().join("missing.png");
  let mut model = FixedModel {
    items: Vec::new(),
    size: 64,
  };

  let err = OneShotTask::new(config).run_task(&mut model).unwrap_err();
  assert!(err.to_string().contains("missing.png"));
}

#[test]
fn missing_classes_file_fails() {
  let dir = tempfile::tempdir().unwrap();
  let mut config = config(dir.path());
  config.classes = dir.path().join("nothing.names");
  let mut model = FixedModel {
    items: Vec::new(),
    size: 64,
  };

  assert!(OneShotTask::new(config).run_task(&mut model).is_err());
}
