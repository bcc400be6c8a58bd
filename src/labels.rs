// 该文件是 Shanan （山南西风） 项目的一部分。
// src/labels.rs - 类别名称表
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

use std::path::Path;

use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum ClassNamesError {
  #[error("无法读取类别文件 {path}: {source}")]
  IoError {
    path: String,
    source: std::io::Error,
  },
  #[error("类别编号 {class_id} 超出类别表范围 (共 {len} 个类别)")]
  UnknownClass { class_id: u32, len: usize },
}

/// 与模型输出类别编号对齐的名称表
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassNames {
  names: Vec<String>,
}

impl ClassNames {
  /// 每行一个类别，去除首尾空白
  pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ClassNamesError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| ClassNamesError::IoError {
      path: path.display().to_string(),
      source,
    })?;
    let names = Self::parse(&content);
    info!("classes loaded");
    Ok(names)
  }

  pub fn parse(content: &str) -> Self {
    ClassNames {
      names: content.lines().map(|line| line.trim().to_string()).collect(),
    }
  }

  pub fn len(&self) -> usize {
    self.names.len()
  }

  pub fn is_empty(&self) -> bool {
    self.names.is_empty()
  }

  /// 越界编号返回错误，不回退为默认名称
  pub fn name(&self, class_id: u32) -> Result<&str, ClassNamesError> {
    self
      .names
      .get(class_id as usize)
      .map(String::as_str)
      .ok_or(ClassNamesError::UnknownClass {
        class_id,
        len: self.names.len(),
      })
  }
}
