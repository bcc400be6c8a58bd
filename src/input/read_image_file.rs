// 该文件是 Shanan （山南西风） 项目的一部分。
// src/input/read_image_file.rs - 图像文件输入
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::Path;

use image::RgbImage;
use thiserror::Error;
use tracing::debug;

use crate::frame::RgbNhwcFrame;

#[derive(Error, Debug)]
pub enum ImageFileInputError {
  #[error("I/O error: {0}")]
  IoError(#[from] std::io::Error),
  #[error("Image loading error: {0}")]
  ImageLoadError(#[from] image::ImageError),
}

/// 已解码的输入图像（三通道 RGB）
pub struct ImageFileInput {
  image: RgbImage,
}

impl ImageFileInput {
  /// 读取文件字节并按内容解码，不依赖扩展名
  pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, ImageFileInputError> {
    let bytes = std::fs::read(path.as_ref())?;
    Self::from_bytes(&bytes)
  }

  pub fn from_bytes(bytes: &[u8]) -> Result<Self, ImageFileInputError> {
    let image = image::load_from_memory(bytes)?.to_rgb8();
    debug!("解码图像: {}x{}", image.width(), image.height());
    Ok(ImageFileInput { image })
  }

  /// 原始尺寸的 RGB 图像，用于绘制输出
  pub fn into_rgb_image(self) -> RgbImage {
    self.image
  }

  pub fn into_nhwc(self, size: u32) -> RgbNhwcFrame {
    RgbNhwcFrame::from_rgb_image(&self.image, size)
  }
}

/// 读取图像并转换为模型输入张量 `[1, size, size, 3]`
pub fn prepare_image<P: AsRef<Path>>(path: P, size: u32) -> Result<RgbNhwcFrame, ImageFileInputError> {
  Ok(ImageFileInput::open(path)?.into_nhwc(size))
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::{ImageFormat, Rgb};
  use std::io::Cursor;

  #[test]
  fn decodes_png_bytes() {
    let mut bytes = Vec::new();
    RgbImage::from_pixel(20, 10, Rgb([1, 2, 3]))
      .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
      .unwrap();

    let frame = ImageFileInput::from_bytes(&bytes).unwrap().into_nhwc(32);
    assert_eq!(frame.as_nhwc().shape(), &[1, 32, 32, 3]);

    let canvas = ImageFileInput::from_bytes(&bytes).unwrap().into_rgb_image();
    assert_eq!(canvas.dimensions(), (20, 10));
  }

  #[test]
  fn rejects_garbage_bytes() {
    let err = ImageFileInput::from_bytes(b"definitely not an image").err().unwrap();
    assert!(matches!(err, ImageFileInputError::ImageLoadError(_)));
  }

  #[test]
  fn missing_file_is_io_error() {
    let err = prepare_image("/nonexistent/shanan/girl.png", 416).err().unwrap();
    assert!(matches!(err, ImageFileInputError::IoError(_)));
  }
}
