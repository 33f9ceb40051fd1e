// 该文件是 Detect Contract （检测契约） 项目的一部分。
// src/model/nms.rs - 非极大值抑制
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

use super::DetectItem;

/// 按类别做非极大值抑制，结果按置信度降序
pub fn nms(mut items: Vec<DetectItem>, threshold: f32) -> Vec<DetectItem> {
  // 按置信度降序排序
  items.sort_by(|a, b| b.score.total_cmp(&a.score));

  let mut result: Vec<DetectItem> = Vec::new();
  for item in items {
    let suppressed = result
      .iter()
      .any(|kept| kept.class_id == item.class_id && iou(&kept.bbox, &item.bbox) >= threshold);
    if !suppressed {
      result.push(item);
    }
  }
  result
}

/// 计算两个 [x_min, y_min, x_max, y_max] 边界框的 IoU
pub fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
  let x1 = a[0].max(b[0]);
  let y1 = a[1].max(b[1]);
  let x2 = a[2].min(b[2]);
  let y2 = a[3].min(b[3]);

  let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
  let area_a = (a[2] - a[0]).max(0.0) * (a[3] - a[1]).max(0.0);
  let area_b = (b[2] - b[0]).max(0.0) * (b[3] - b[1]).max(0.0);
  let union = area_a + area_b - intersection;

  if union > 0.0 {
    intersection / union
  } else {
    0.0
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn item(class_id: u32, score: f32, bbox: [f32; 4]) -> DetectItem {
    DetectItem {
      class_id,
      score,
      bbox,
    }
  }

  #[test]
  fn iou_values() {
    let a = [0.0, 0.0, 2.0, 2.0];
    assert_eq!(iou(&a, &a), 1.0);
    assert_eq!(iou(&a, &[3.0, 3.0, 4.0, 4.0]), 0.0);
    assert!((iou(&a, &[1.0, 0.0, 3.0, 2.0]) - 1.0 / 3.0).abs() < 1e-6);
    assert_eq!(iou(&[0.0; 4], &[0.0; 4]), 0.0);
  }

  #[test]
  fn keeps_best_of_overlapping() {
    let items = vec![
      item(0, 0.6, [0.0, 0.0, 1.0, 1.0]),
      item(0, 0.9, [0.05, 0.0, 1.05, 1.0]),
      item(0, 0.7, [5.0, 5.0, 6.0, 6.0]),
    ];
    let kept = nms(items, 0.5);
    let scores: Vec<_> = kept.iter().map(|i| i.score).collect();
    assert_eq!(scores, vec![0.9, 0.7]);
  }
}
