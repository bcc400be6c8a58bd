// 该文件是 Shanan （山南西风） 项目的一部分。
// src/task.rs - 单张图像检测流程
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

use std::{
  ffi::OsString,
  path::PathBuf,
  time::{Duration, Instant},
};

use anyhow::Context;
use clap::{Parser, error::ErrorKind};
use tracing::info;

use crate::{
  args::{Args, DetectConfig},
  device::init_environment,
  frame::RgbNhwcFrame,
  input::{ImageFileInput, prepare_image},
  labels::ClassNames,
  model::{DetectResult, Model, YoloV3, create_yolo},
  output::{
    Record, Render, SaveImageFileOutput,
    draw::{Draw, load_font},
    log_detections,
  },
};

/// 一次运行的结果
#[derive(Debug)]
pub enum Outcome {
  Completed(Summary),
  /// 请求了帮助或版本信息，未执行检测
  EarlyExit,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
  pub nums: usize,
  pub elapsed: Duration,
  pub lines: Vec<String>,
  pub output: PathBuf,
}

/// 解析命令行并执行检测
pub fn launch<I, T>(argv: I) -> anyhow::Result<Outcome>
where
  I: IntoIterator<Item = T>,
  T: Into<OsString> + Clone,
{
  let args = match Args::try_parse_from(argv) {
    Ok(args) => args,
    Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
      e.print()?;
      return Ok(Outcome::EarlyExit);
    }
    Err(e) => return Err(e.into()),
  };
  let config = DetectConfig::try_from(args).context("命令行参数无效")?;

  OneShotTask::new(config)
    .run(std::env::consts::OS)
    .map(Outcome::Completed)
}

/// 构建模型并加载权重
pub fn prepare_yolo(config: &DetectConfig) -> anyhow::Result<YoloV3> {
  let model = create_yolo(config.tiny, config.num_classes)
    .input_size(config.size)
    .max_boxes(config.max_boxes)
    .iou_threshold(config.iou_threshold)
    .score_threshold(config.score_threshold)
    .load_weights(&config.weights)
    .with_context(|| format!("无法加载权重: {}", config.weights.display()))?;
  Ok(model)
}

/// 执行一次前向推理并记录耗时
pub fn evaluate_image<M: Model>(
  model: &mut M,
  frame: &M::Input,
) -> Result<(M::Output, Duration), M::Error> {
  let now = Instant::now();
  let result = model.infer(frame)?;
  let elapsed = now.elapsed();
  info!("time: {:.2?}", elapsed);
  Ok((result, elapsed))
}

/// 单张图像检测：推理一次，随后输出日志、标注图像与可选的记录
pub struct OneShotTask {
  config: DetectConfig,
}

impl OneShotTask {
  pub fn new(config: DetectConfig) -> Self {
    Self { config }
  }

  /// 初始化推理环境并加载模型后执行任务
  pub fn run(self, platform: &str) -> anyhow::Result<Summary> {
    let environment = init_environment(platform)?;
    info!("推理设备: {:?}", environment.accelerator);

    let mut model = prepare_yolo(&self.config)?;
    self.run_task(&mut model)
  }

  pub fn run_task<M>(self, model: &mut M) -> anyhow::Result<Summary>
  where
    M: Model<Input = RgbNhwcFrame, Output = DetectResult>,
    M::Error: std::error::Error + Send + Sync + 'static,
  {
    let config = self.config;

    let frame = prepare_image(&config.image, config.size)
      .with_context(|| format!("无法读取图像: {}", config.image.display()))?;
    let (result, elapsed) = evaluate_image(model, &frame).context("推理失败")?;

    let lines = output_results(&config, &result)?;

    Ok(Summary {
      nums: result.nums,
      elapsed,
      lines,
      output: config.output,
    })
  }
}

/// 加载类别名称，输出检测日志、标注图像与 JSON 记录
pub fn output_results(config: &DetectConfig, result: &DetectResult) -> anyhow::Result<Vec<String>> {
  let names = ClassNames::load(&config.classes)?;
  let lines = log_detections(&names, result)?;

  if let Some(path) = &config.record {
    Record::new(path).record(&names, result)?;
  }

  let canvas = ImageFileInput::open(&config.image)
    .with_context(|| format!("无法读取图像: {}", config.image.display()))?
    .into_rgb_image();
  let font = load_font(config.font.as_deref())?;
  let output = SaveImageFileOutput::new(&config.output, Draw::new(font), names);
  output
    .render_result(&canvas, result)
    .with_context(|| format!("无法保存图像: {}", output.path().display()))?;

  Ok(lines)
}

#[cfg(test)]
mod tests {
  use super::*;

  struct CountingModel {
    calls: usize,
  }

  impl Model for CountingModel {
    type Input = u32;
    type Output = u32;
    type Error = std::io::Error;

    fn infer(&mut self, input: &u32) -> Result<u32, std::io::Error> {
      self.calls += 1;
      Ok(input * 2)
    }
  }

  #[test]
  fn evaluate_runs_model_once() {
    let mut model = CountingModel { calls: 0 };
    let (result, _) = evaluate_image(&mut model, &21).unwrap();
    assert_eq!(result, 42);
    assert_eq!(model.calls, 1);
  }

  #[test]
  fn help_is_an_early_exit() {
    let outcome = launch(["shanan-detect", "--help"]).unwrap();
    assert!(matches!(outcome, Outcome::EarlyExit));
  }

  #[test]
  fn version_is_an_early_exit() {
    let outcome = launch(["shanan-detect", "--version"]).unwrap();
    assert!(matches!(outcome, Outcome::EarlyExit));
  }

  #[test]
  fn invalid_flags_are_errors() {
    assert!(launch(["shanan-detect", "--size", "abc"]).is_err());
    assert!(launch(["shanan-detect", "--size", "100"]).is_err());
    assert!(launch(["shanan-detect", "--no-such-flag"]).is_err());
  }
}
