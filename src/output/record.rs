// 该文件是 Shanan （山南西风） 项目的一部分。
// src/output/record.rs - 检测结果记录
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::{
  fs::File,
  io::BufWriter,
  path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::{
  labels::{ClassNames, ClassNamesError},
  model::DetectResult,
};

#[derive(Error, Debug)]
pub enum RecordError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("JSON 序列化错误: {0}")]
  JsonError(#[from] serde_json::Error),
  #[error("类别错误: {0}")]
  LabelError(#[from] ClassNamesError),
}

/// 按模型输出顺序生成 `<name>, <score>, <box>` 文本
pub fn detection_lines(
  names: &ClassNames,
  result: &DetectResult,
) -> Result<Vec<String>, ClassNamesError> {
  result
    .items()
    .map(|item| {
      Ok(format!(
        "{}, {:.4}, [{:.4} {:.4} {:.4} {:.4}]",
        names.name(item.class_id)?,
        item.score,
        item.bbox[0],
        item.bbox[1],
        item.bbox[2],
        item.bbox[3]
      ))
    })
    .collect()
}

/// 逐行输出检测日志，返回写出的行
pub fn log_detections(
  names: &ClassNames,
  result: &DetectResult,
) -> Result<Vec<String>, ClassNamesError> {
  let lines = detection_lines(names, result)?;
  info!("detections:");
  for line in &lines {
    info!("\t{}", line);
  }
  Ok(lines)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionRecord {
  pub class_id: u32,
  pub class_name: String,
  pub score: f32,
  /// [x_min, y_min, x_max, y_max]，归一化坐标
  pub bbox: [f32; 4],
}

/// 将检测结果写为 JSON 文件
pub struct Record {
  path: PathBuf,
}

impl Record {
  pub fn new<P: AsRef<Path>>(path: P) -> Self {
    Self {
      path: path.as_ref().to_path_buf(),
    }
  }

  pub fn records(
    names: &ClassNames,
    result: &DetectResult,
  ) -> Result<Vec<DetectionRecord>, ClassNamesError> {
    result
      .items()
      .map(|item| {
        Ok(DetectionRecord {
          class_id: item.class_id,
          class_name: names.name(item.class_id)?.to_string(),
          score: item.score,
          bbox: item.bbox,
        })
      })
      .collect()
  }

  pub fn record(&self, names: &ClassNames, result: &DetectResult) -> Result<(), RecordError> {
    let records = Self::records(names, result)?;
    if let Some(parent) = self.path.parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent)?;
    }
    let writer = BufWriter::new(File::create(&self.path)?);
    serde_json::to_writer_pretty(writer, &records)?;
    info!("检测记录已保存: {}", self.path.display());
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::DetectItem;

  fn sample() -> DetectResult {
    DetectResult::from_items(
      vec![
        DetectItem {
          class_id: 1,
          score: 0.87654,
          bbox: [0.1, 0.2, 0.3, 0.4],
        },
        DetectItem {
          class_id: 0,
          score: 0.5123,
          bbox: [0.5, 0.5, 1.0, 1.0],
        },
      ],
      100,
    )
  }

  #[test]
  fn one_line_per_valid_detection_in_model_order() {
    let names = ClassNames::parse("person\nbicycle\n");
    let lines = detection_lines(&names, &sample()).unwrap();
    assert_eq!(
      lines,
      vec![
        "bicycle, 0.8765, [0.1000 0.2000 0.3000 0.4000]",
        "person, 0.5123, [0.5000 0.5000 1.0000 1.0000]",
      ]
    );
  }

  #[test]
  fn short_class_table_fails_deterministically() {
    let names = ClassNames::parse("person\n");
    for _ in 0..3 {
      let err = detection_lines(&names, &sample()).unwrap_err();
      assert!(matches!(err, ClassNamesError::UnknownClass { class_id: 1, len: 1 }));
    }
  }

  #[test]
  fn writes_json_records() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("detections.json");
    let names = ClassNames::parse("person\nbicycle\n");

    Record::new(&path).record(&names, &sample()).unwrap();

    let records: Vec<DetectionRecord> =
      serde_json::from_reader(File::open(&path).unwrap()).unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].class_name, "bicycle");
    assert_eq!(records[1].bbox, [0.5, 0.5, 1.0, 1.0]);
  }
}
