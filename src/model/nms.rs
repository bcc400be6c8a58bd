// 该文件是 Shanan （山南西风） 项目的一部分。
// src/model/nms.rs - 多类别联合非极大值抑制
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::cmp::Ordering;

use tracing::debug;

use crate::model::{DetectItem, DetectResult};

/// 解码后的候选框，各类别共享同一个边框
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
  /// [x_min, y_min, x_max, y_max]，归一化坐标
  pub bbox: [f32; 4],
  /// 每个类别的得分：objectness * class_prob
  pub scores: Box<[f32]>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NmsConfig {
  /// 每个类别最多保留的检测数量
  pub max_output_per_class: usize,
  /// 全部类别合计最多保留的检测数量
  pub max_total: usize,
  pub iou_threshold: f32,
  pub score_threshold: f32,
}

impl Default for NmsConfig {
  fn default() -> Self {
    Self {
      max_output_per_class: 100,
      max_total: 100,
      iou_threshold: 0.5,
      score_threshold: 0.5,
    }
  }
}

/// 计算两个边界框的 IoU，坐标顺序不做假设
pub fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
  let (ay1, ay2) = (a[1].min(a[3]), a[1].max(a[3]));
  let (ax1, ax2) = (a[0].min(a[2]), a[0].max(a[2]));
  let (by1, by2) = (b[1].min(b[3]), b[1].max(b[3]));
  let (bx1, bx2) = (b[0].min(b[2]), b[0].max(b[2]));

  let area_a = (ay2 - ay1) * (ax2 - ax1);
  let area_b = (by2 - by1) * (bx2 - bx1);
  if area_a <= 0.0 || area_b <= 0.0 {
    return 0.0;
  }

  let inter_w = (ax2.min(bx2) - ax1.max(bx1)).max(0.0);
  let inter_h = (ay2.min(by2) - ay1.max(by1)).max(0.0);
  let intersection = inter_w * inter_h;

  intersection / (area_a + area_b - intersection)
}

fn by_score_desc(a: f32, b: f32) -> Ordering {
  b.partial_cmp(&a).unwrap_or(Ordering::Equal)
}

/// 单个类别内的贪心 NMS，返回入选候选框的下标
fn suppress_class(candidates: &[Candidate], class_id: usize, config: &NmsConfig) -> Vec<usize> {
  let mut order: Vec<usize> = candidates
    .iter()
    .enumerate()
    .filter(|(_, c)| c.scores[class_id] > config.score_threshold)
    .map(|(i, _)| i)
    .collect();
  // 稳定排序，同分时保持解码顺序
  order.sort_by(|&a, &b| by_score_desc(candidates[a].scores[class_id], candidates[b].scores[class_id]));

  let mut selected: Vec<usize> = Vec::new();
  for idx in order {
    if selected.len() >= config.max_output_per_class {
      break;
    }
    let bbox = &candidates[idx].bbox;
    if selected
      .iter()
      .all(|&kept| iou(&candidates[kept].bbox, bbox) <= config.iou_threshold)
    {
      selected.push(idx);
    }
  }
  selected
}

/// 对所有类别分别做 NMS，再按得分合并截断
///
/// 输出按得分降序排列，边框裁剪到 [0, 1]，并填充到 `max_total`。
pub fn combined_non_max_suppression(
  candidates: &[Candidate],
  num_classes: usize,
  config: &NmsConfig,
) -> DetectResult {
  let mut items = Vec::new();

  for class_id in 0..num_classes {
    for idx in suppress_class(candidates, class_id, config) {
      let candidate = &candidates[idx];
      items.push(DetectItem {
        class_id: class_id as u32,
        score: candidate.scores[class_id],
        bbox: candidate.bbox.map(|v| v.clamp(0.0, 1.0)),
      });
    }
  }

  items.sort_by(|a, b| by_score_desc(a.score, b.score));
  items.truncate(config.max_total);
  debug!("NMS 后保留 {} 个检测", items.len());

  DetectResult::from_items(items, config.max_total)
}
