// 该文件是 Shanan （山南西风） 项目的一部分。
// src/frame.rs - NHWC 推理张量定义
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

use image::{RgbImage, imageops::FilterType};
use ndarray::{Array4, ArrayView4};

const RGB_CHANNELS: usize = 3;
const BATCH_SIZE: usize = 1;

/// 批大小为 1 的 NHWC 浮点帧，像素值位于 [0, 1]
#[derive(Debug, Clone)]
pub struct RgbNhwcFrame {
  data: Array4<f32>,
}

impl RgbNhwcFrame {
  /// 双线性缩放到 `size x size` 并归一化
  pub fn from_rgb_image(image: &RgbImage, size: u32) -> Self {
    let resized = image::imageops::resize(image, size, size, FilterType::Triangle);
    let side = size as usize;

    let mut data = Array4::<f32>::zeros((BATCH_SIZE, side, side, RGB_CHANNELS));
    for (x, y, pixel) in resized.enumerate_pixels() {
      for c in 0..RGB_CHANNELS {
        data[[0, y as usize, x as usize, c]] = pixel[c] as f32 / 255.0;
      }
    }

    Self { data }
  }

  /// 全零帧，用于加载时试跑模型
  pub fn zeros(size: usize) -> Self {
    Self {
      data: Array4::<f32>::zeros((BATCH_SIZE, size, size, RGB_CHANNELS)),
    }
  }

  pub fn as_nhwc(&self) -> ArrayView4<'_, f32> {
    self.data.view()
  }
}
