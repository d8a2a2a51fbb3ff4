// 该文件是 RkPost （山南后处理） 项目的一部分。
// src/nms.rs - 非极大值抑制
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

use std::collections::BTreeMap;

use crate::geometry::Rect;

/// 计算两个边界框的 IoU
///
/// 按像素闭区间计算，宽高各加 1。
pub fn iou(b1: &Rect, b2: &Rect) -> f32 {
  let w = (b1.x2().min(b2.x2()) - b1.x.max(b2.x) + 1.0).max(0.0);
  let h = (b1.y2().min(b2.y2()) - b1.y.max(b2.y) + 1.0).max(0.0);
  let i = w * h;
  let u = (b1.width + 1.0) * (b1.height + 1.0) + (b2.width + 1.0) * (b2.height + 1.0) - i;

  if u <= 0.0 { 0.0 } else { i / u }
}

/// 单类别贪心 NMS，返回保留的下标（按分数降序）
///
/// 分数相同时保持原有先后顺序。
pub fn nms(boxes: &[Rect], scores: &[f32], threshold: f32) -> Vec<usize> {
  debug_assert_eq!(boxes.len(), scores.len());
  let indices: Vec<usize> = (0..boxes.len()).collect();
  nms_indices(boxes, scores, indices, threshold)
}

fn nms_indices(boxes: &[Rect], scores: &[f32], mut indices: Vec<usize>, threshold: f32) -> Vec<usize> {
  // 按分数降序排序
  indices.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));

  let mut suppressed = vec![false; indices.len()];
  let mut keep = Vec::with_capacity(indices.len());
  for i in 0..indices.len() {
    if suppressed[i] {
      continue;
    }
    keep.push(indices[i]);

    // 比对 IoU，超过阈值的不要
    for j in (i + 1)..indices.len() {
      if suppressed[j] {
        continue;
      }
      if iou(&boxes[indices[i]], &boxes[indices[j]]) > threshold {
        suppressed[j] = true;
      }
    }
  }
  keep
}

/// 逐类别 NMS，类别按升序输出
pub fn nms_per_class(boxes: &[Rect], scores: &[f32], classes: &[u32], threshold: f32) -> Vec<usize> {
  debug_assert_eq!(boxes.len(), scores.len());
  debug_assert_eq!(boxes.len(), classes.len());

  let mut partitions: BTreeMap<u32, Vec<usize>> = BTreeMap::new();
  for (i, &class_id) in classes.iter().enumerate() {
    partitions.entry(class_id).or_default().push(i);
  }

  partitions
    .into_values()
    .flat_map(|indices| nms_indices(boxes, scores, indices, threshold))
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn iou_identical_is_one() {
    let b = Rect::new(0.0, 0.0, 10.0, 10.0);
    assert_eq!(iou(&b, &b), 1.0);
  }

  #[test]
  fn iou_disjoint_is_zero() {
    let a = Rect::new(0.0, 0.0, 10.0, 10.0);
    let b = Rect::new(20.0, 20.0, 10.0, 10.0);
    assert_eq!(iou(&a, &b), 0.0);
    assert_eq!(iou(&b, &a), 0.0);
  }

  #[test]
  fn iou_uses_inclusive_pixels() {
    // 11x11 与 11x11, 重叠 6x11
    let a = Rect::new(0.0, 0.0, 10.0, 10.0);
    let b = Rect::new(5.0, 0.0, 10.0, 10.0);
    let expected = 66.0 / (121.0 + 121.0 - 66.0);
    assert!((iou(&a, &b) - expected).abs() < 1e-6);
  }

  #[test]
  fn iou_degenerate_union_is_zero() {
    let a = Rect::new(0.0, 0.0, -1.0, -1.0);
    assert_eq!(iou(&a, &a), 0.0);
  }

  #[test]
  fn suppresses_lower_score() {
    let boxes = [
      Rect::new(0.0, 0.0, 10.0, 10.0),
      Rect::new(1.0, 1.0, 10.0, 10.0),
      Rect::new(50.0, 50.0, 10.0, 10.0),
    ];
    let scores = [0.6, 0.9, 0.3];
    assert_eq!(nms(&boxes, &scores, 0.5), vec![1, 2]);
  }

  #[test]
  fn equal_scores_keep_first() {
    let b = Rect::new(0.0, 0.0, 10.0, 10.0);
    assert_eq!(nms(&[b, b, b], &[0.5, 0.5, 0.5], 0.5), vec![0]);
  }

  #[test]
  fn threshold_is_strict() {
    let b = Rect::new(0.0, 0.0, 10.0, 10.0);
    // IoU == 1.0 不大于阈值 1.0
    assert_eq!(nms(&[b, b], &[0.9, 0.8], 1.0), vec![0, 1]);
  }

  #[test]
  fn classes_are_isolated() {
    let b = Rect::new(0.0, 0.0, 10.0, 10.0);
    let keep = nms_per_class(&[b, b], &[0.9, 0.8], &[0, 1], 0.5);
    assert_eq!(keep, vec![0, 1]);

    let keep = nms_per_class(&[b, b], &[0.8, 0.9], &[3, 3], 0.5);
    assert_eq!(keep, vec![1]);
  }

  #[test]
  fn classes_are_ascending() {
    let boxes = [
      Rect::new(0.0, 0.0, 4.0, 4.0),
      Rect::new(10.0, 0.0, 4.0, 4.0),
      Rect::new(20.0, 0.0, 4.0, 4.0),
      Rect::new(30.0, 0.0, 4.0, 4.0),
    ];
    let keep = nms_per_class(&boxes, &[0.1, 0.2, 0.3, 0.4], &[7, 2, 7, 2], 0.5);
    assert_eq!(keep, vec![3, 1, 2, 0]);
  }

  #[test]
  fn idempotent() {
    let boxes = [
      Rect::new(0.0, 0.0, 20.0, 20.0),
      Rect::new(2.0, 2.0, 20.0, 20.0),
      Rect::new(15.0, 15.0, 20.0, 20.0),
      Rect::new(40.0, 0.0, 10.0, 10.0),
      Rect::new(41.0, 1.0, 10.0, 10.0),
    ];
    let scores = [0.9, 0.8, 0.7, 0.6, 0.95];
    let classes = [0, 0, 0, 1, 1];

    let first = nms_per_class(&boxes, &scores, &classes, 0.45);
    let b2: Vec<Rect> = first.iter().map(|&i| boxes[i]).collect();
    let s2: Vec<f32> = first.iter().map(|&i| scores[i]).collect();
    let c2: Vec<u32> = first.iter().map(|&i| classes[i]).collect();
    let second = nms_per_class(&b2, &s2, &c2, 0.45);

    assert_eq!(second, (0..first.len()).collect::<Vec<_>>());
  }

  #[test]
  fn empty_input() {
    assert!(nms_per_class(&[], &[], &[], 0.5).is_empty());
  }
}
