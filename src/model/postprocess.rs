// 该文件是 Jizhu （脊柱） 项目的一部分。
// src/model/postprocess.rs - YOLO 输出解码与非极大值抑制
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

//! YOLOv8 导出的检测头输出为 `[1, C, N]`，按通道优先展平：
//! 第 `c` 个通道、第 `i` 个锚点的值位于 `c * N + i`。

use tracing::debug;

use crate::model::{DetectItem, KEYPOINT_COUNT, Keypoint, PoseItem};

/// 框回归通道数 (cx, cy, w, h)
const BOX_CHANNELS: usize = 4;
/// 姿态头：框 + 置信度 + 17 * (x, y, v)
pub const POSE_CHANNELS: usize = BOX_CHANNELS + 1 + KEYPOINT_COUNT * 3;

/// 输出张量的视图
#[derive(Debug, Clone, Copy)]
pub struct HeadOutput<'a> {
  data: &'a [f32],
  channels: usize,
  anchors: usize,
}

impl<'a> HeadOutput<'a> {
  /// 检查张量尺寸，尺寸不符返回 None
  pub fn new(data: &'a [f32], channels: usize, anchors: usize) -> Option<Self> {
    if channels == 0 || anchors == 0 || data.len() != channels * anchors {
      return None;
    }
    Some(Self {
      data,
      channels,
      anchors,
    })
  }

  #[inline]
  fn at(&self, channel: usize, anchor: usize) -> f32 {
    self.data[channel * self.anchors + anchor]
  }

  fn bbox(&self, anchor: usize, scale: (f32, f32)) -> [f32; 4] {
    let cx = self.at(0, anchor);
    let cy = self.at(1, anchor);
    let w = self.at(2, anchor);
    let h = self.at(3, anchor);
    [
      (cx - w / 2.0) * scale.0,
      (cy - h / 2.0) * scale.1,
      (cx + w / 2.0) * scale.0,
      (cy + h / 2.0) * scale.1,
    ]
  }
}

/// 解码检测头：分数取各类别最大值
pub fn decode_boxes(output: &HeadOutput, confidence: f32, scale: (f32, f32)) -> Vec<DetectItem> {
  let num_classes = output.channels.saturating_sub(BOX_CHANNELS);
  if num_classes == 0 {
    return Vec::new();
  }

  let mut items = Vec::new();
  for anchor in 0..output.anchors {
    let (class_id, score) = (0..num_classes)
      .map(|c| (c as u32, output.at(BOX_CHANNELS + c, anchor)))
      .fold((0u32, f32::MIN), |best, cur| {
        if cur.1 > best.1 { cur } else { best }
      });

    if score < confidence {
      continue;
    }

    items.push(DetectItem {
      class_id,
      score,
      bbox: output.bbox(anchor, scale),
    });
  }

  debug!("置信度过滤后剩余 {} 个候选框", items.len());
  items
}

/// 解码姿态头
pub fn decode_poses(output: &HeadOutput, confidence: f32, scale: (f32, f32)) -> Vec<PoseItem> {
  if output.channels != POSE_CHANNELS {
    return Vec::new();
  }

  let mut items = Vec::new();
  for anchor in 0..output.anchors {
    let score = output.at(BOX_CHANNELS, anchor);
    if score < confidence {
      continue;
    }

    let mut keypoints = [Keypoint::default(); KEYPOINT_COUNT];
    for (k, kp) in keypoints.iter_mut().enumerate() {
      let base = BOX_CHANNELS + 1 + k * 3;
      *kp = Keypoint {
        x: output.at(base, anchor) * scale.0,
        y: output.at(base + 1, anchor) * scale.1,
        visibility: output.at(base + 2, anchor),
      };
    }

    items.push(PoseItem {
      score,
      bbox: output.bbox(anchor, scale),
      keypoints,
    });
  }
  items
}

pub fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
  let x_a = a[0].max(b[0]);
  let y_a = a[1].max(b[1]);
  let x_b = a[2].min(b[2]);
  let y_b = a[3].min(b[3]);

  let inter = (x_b - x_a).max(0.0) * (y_b - y_a).max(0.0);
  let area_a = (a[2] - a[0]).max(0.0) * (a[3] - a[1]).max(0.0);
  let area_b = (b[2] - b[0]).max(0.0) * (b[3] - b[1]).max(0.0);
  let union = area_a + area_b - inter;
  if union <= 0.0 { 0.0 } else { inter / union }
}

/// 与类别无关的 NMS，结果按分数降序
pub fn non_max_suppression<T, F>(mut items: Vec<T>, iou_threshold: f32, key: F) -> Vec<T>
where
  F: Fn(&T) -> (f32, [f32; 4]),
{
  items.sort_by(|a, b| key(b).0.total_cmp(&key(a).0));

  let mut selected: Vec<T> = Vec::with_capacity(items.len());
  for item in items {
    let (_, bbox) = key(&item);
    if selected.iter().all(|s| iou(&key(s).1, &bbox) <= iou_threshold) {
      selected.push(item);
    }
  }
  selected
}

pub fn nms_boxes(items: Vec<DetectItem>, iou_threshold: f32) -> Vec<DetectItem> {
  non_max_suppression(items, iou_threshold, |d| (d.score, d.bbox))
}

pub fn nms_poses(items: Vec<PoseItem>, iou_threshold: f32) -> Vec<PoseItem> {
  non_max_suppression(items, iou_threshold, |p| (p.score, p.bbox))
}

#[cfg(test)]
mod tests {
  use super::*;

  /// 按锚点给出 [cx, cy, w, h, s0, s1, ...]，转成通道优先布局
  fn channel_major(rows: &[Vec<f32>]) -> Vec<f32> {
    let channels = rows[0].len();
    let mut out = vec![0.0; channels * rows.len()];
    for (i, row) in rows.iter().enumerate() {
      for (c, v) in row.iter().enumerate() {
        out[c * rows.len() + i] = *v;
      }
    }
    out
  }

  #[test]
  fn head_rejects_wrong_size() {
    assert!(HeadOutput::new(&[0.0; 10], 5, 3).is_none());
    assert!(HeadOutput::new(&[0.0; 15], 5, 3).is_some());
  }

  #[test]
  fn decode_boxes_filters_and_scales() {
    let data = channel_major(&[
      vec![100.0, 100.0, 20.0, 10.0, 0.9, 0.1],
      vec![200.0, 200.0, 20.0, 10.0, 0.1, 0.2],
      vec![300.0, 50.0, 40.0, 20.0, 0.05, 0.6],
    ]);
    let head = HeadOutput::new(&data, 6, 3).unwrap();
    let items = decode_boxes(&head, 0.25, (2.0, 0.5));

    assert_eq!(items.len(), 2);
    assert_eq!(items[0].class_id, 0);
    assert_eq!(items[0].bbox, [180.0, 47.5, 220.0, 52.5]);
    assert_eq!(items[1].class_id, 1);
    assert_eq!(items[1].score, 0.6);
  }

  #[test]
  fn decode_poses_reads_keypoint_triplets() {
    let mut row = vec![50.0, 60.0, 10.0, 20.0, 0.8];
    for k in 0..KEYPOINT_COUNT {
      row.extend_from_slice(&[k as f32, 100.0 + k as f32, 0.5]);
    }
    let low = {
      let mut r = row.clone();
      r[4] = 0.3;
      r
    };
    let data = channel_major(&[row, low]);
    let head = HeadOutput::new(&data, POSE_CHANNELS, 2).unwrap();
    let poses = decode_poses(&head, 0.5, (1.0, 1.0));

    assert_eq!(poses.len(), 1);
    assert_eq!(poses[0].score, 0.8);
    assert_eq!(poses[0].keypoints[12].x, 12.0);
    assert_eq!(poses[0].keypoints[12].y, 112.0);
    assert_eq!(poses[0].bbox, [45.0, 50.0, 55.0, 70.0]);
  }

  #[test]
  fn iou_of_disjoint_and_identical_boxes() {
    let a = [0.0, 0.0, 10.0, 10.0];
    assert_eq!(iou(&a, &a), 1.0);
    assert_eq!(iou(&a, &[20.0, 20.0, 30.0, 30.0]), 0.0);
    let half = iou(&a, &[5.0, 0.0, 15.0, 10.0]);
    assert!((half - 1.0 / 3.0).abs() < 1e-6);
  }

  #[test]
  fn nms_keeps_best_of_overlapping() {
    let make = |score, x: f32| DetectItem {
      class_id: 0,
      score,
      bbox: [x, 0.0, x + 10.0, 10.0],
    };
    let kept = nms_boxes(
      vec![make(0.5, 0.0), make(0.9, 1.0), make(0.7, 50.0)],
      0.45,
    );
    let scores: Vec<f32> = kept.iter().map(|d| d.score).collect();
    assert_eq!(scores, vec![0.9, 0.7]);
  }
}
