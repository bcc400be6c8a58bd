// 该文件是 Shanan （山南西风） 项目的一部分。
// src/args.rs - 项目参数配置
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::PathBuf;

use clap::Parser;
use thiserror::Error;

/// YOLOv3 单图检测参数
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 类别名称文件路径（每行一个类别）
  #[arg(long, default_value = "./data/coco.names", value_name = "FILE")]
  pub classes: PathBuf,

  /// 预训练权重文件路径（ONNX 计算图）
  #[arg(long, default_value = "./checkpoints/yolov3.tf", value_name = "FILE")]
  pub weights: PathBuf,

  /// 使用 yolov3-tiny 而非 yolov3
  #[arg(long)]
  pub tiny: bool,

  /// 输入图像缩放尺寸（正方形）
  #[arg(long, default_value_t = 416, value_name = "PIXELS")]
  pub size: u32,

  /// 输入图像路径
  #[arg(long, default_value = "./data/girl.png", value_name = "FILE")]
  pub image: PathBuf,

  /// 输出图像路径
  #[arg(long, default_value = "./output.jpg", value_name = "FILE")]
  pub output: PathBuf,

  /// 模型训练时的类别数量
  #[arg(
    long = "num_classes",
    alias = "num-classes",
    default_value_t = 80,
    value_name = "COUNT"
  )]
  pub num_classes: usize,

  /// 每张图像的最大检测数量
  #[arg(
    long = "yolo_max_boxes",
    alias = "yolo-max-boxes",
    default_value_t = 100,
    value_name = "COUNT"
  )]
  pub yolo_max_boxes: usize,

  /// NMS IOU 阈值 (0.0 - 1.0)
  #[arg(
    long = "yolo_iou_threshold",
    alias = "yolo-iou-threshold",
    default_value_t = 0.5,
    value_name = "THRESHOLD"
  )]
  pub yolo_iou_threshold: f32,

  /// 置信度阈值 (0.0 - 1.0)
  #[arg(
    long = "yolo_score_threshold",
    alias = "yolo-score-threshold",
    default_value_t = 0.5,
    value_name = "THRESHOLD"
  )]
  pub yolo_score_threshold: f32,

  /// 标签字体文件（TTF/OTF），缺省时使用内置字体
  #[arg(long, value_name = "FILE")]
  pub font: Option<PathBuf>,

  /// 将检测结果另存为 JSON 文件
  #[arg(long, value_name = "FILE")]
  pub record: Option<PathBuf>,
}

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
  #[error("输入尺寸必须是 32 的正整数倍, 实际为 {0}")]
  InvalidSize(u32),
  #[error("类别数量必须大于 0")]
  NoClasses,
  #[error("最大检测数量必须大于 0")]
  NoBoxes,
  #[error("{name} 必须位于 [0, 1] 区间, 实际为 {value}")]
  ThresholdOutOfRange { name: &'static str, value: f32 },
}

/// 启动后不可变的运行配置
#[derive(Debug, Clone, PartialEq)]
pub struct DetectConfig {
  pub classes: PathBuf,
  pub weights: PathBuf,
  pub tiny: bool,
  pub size: u32,
  pub image: PathBuf,
  pub output: PathBuf,
  pub num_classes: usize,
  pub max_boxes: usize,
  pub iou_threshold: f32,
  pub score_threshold: f32,
  pub font: Option<PathBuf>,
  pub record: Option<PathBuf>,
}

fn check_threshold(name: &'static str, value: f32) -> Result<f32, ConfigError> {
  if (0.0..=1.0).contains(&value) {
    Ok(value)
  } else {
    Err(ConfigError::ThresholdOutOfRange { name, value })
  }
}

impl TryFrom<Args> for DetectConfig {
  type Error = ConfigError;

  fn try_from(args: Args) -> Result<Self, Self::Error> {
    // 骨干网络共下采样 32 倍
    if args.size == 0 || args.size % 32 != 0 {
      return Err(ConfigError::InvalidSize(args.size));
    }
    if args.num_classes == 0 {
      return Err(ConfigError::NoClasses);
    }
    if args.yolo_max_boxes == 0 {
      return Err(ConfigError::NoBoxes);
    }

    Ok(DetectConfig {
      iou_threshold: check_threshold("yolo_iou_threshold", args.yolo_iou_threshold)?,
      score_threshold: check_threshold("yolo_score_threshold", args.yolo_score_threshold)?,
      classes: args.classes,
      weights: args.weights,
      tiny: args.tiny,
      size: args.size,
      image: args.image,
      output: args.output,
      num_classes: args.num_classes,
      max_boxes: args.yolo_max_boxes,
      font: args.font,
      record: args.record,
    })
  }
}
