// 该文件是 Jizhu （脊柱） 项目的一部分。
// src/analysis/geometry.rs - 脊柱几何计算
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

use serde::Serialize;

use crate::model::DetectItem;

/// 计算 Cobb 角所需的最少中心点数
pub const MIN_COBB_POINTS: usize = 5;
/// 两端各忽略的点数（生理弯曲）
const COBB_TRIM: usize = 2;
const SMOOTH_WINDOW: usize = 3;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Point {
  pub x: f32,
  pub y: f32,
}

impl Point {
  pub fn new(x: f32, y: f32) -> Self {
    Self { x, y }
  }

  pub fn midpoint(a: Point, b: Point) -> Point {
    Point::new((a.x + b.x) / 2.0, (a.y + b.y) / 2.0)
  }
}

/// 图像视图类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ImageType {
  /// 正位（前后位）片
  #[serde(rename = "AP")]
  Ap,
  /// 侧位片
  #[serde(rename = "LATERAL")]
  Lateral,
}

impl ImageType {
  pub fn as_str(&self) -> &'static str {
    match self {
      ImageType::Ap => "AP",
      ImageType::Lateral => "LATERAL",
    }
  }
}

impl std::fmt::Display for ImageType {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

/// 正位片中椎骨显得更宽：平均宽高比大于阈值即为正位
pub fn classify_view(boxes: &[DetectItem], ap_aspect_ratio: f32) -> ImageType {
  let ratios: Vec<f32> = boxes
    .iter()
    .filter(|b| b.height() > 0.0)
    .map(|b| b.width() / b.height())
    .collect();

  if ratios.is_empty() {
    return ImageType::Lateral;
  }

  let mean = ratios.iter().sum::<f32>() / ratios.len() as f32;
  if mean > ap_aspect_ratio {
    ImageType::Ap
  } else {
    ImageType::Lateral
  }
}

/// 三点滑动平均，端点只与存在的邻点平均
pub fn smooth_points(points: &[Point]) -> Vec<Point> {
  if points.len() < SMOOTH_WINDOW {
    return points.to_vec();
  }

  (0..points.len())
    .map(|i| {
      let start = i.saturating_sub(1);
      let end = (i + 2).min(points.len());
      let window = &points[start..end];
      let n = window.len() as f32;
      Point::new(
        window.iter().map(|p| p.x).sum::<f32>() / n,
        window.iter().map(|p| p.y).sum::<f32>() / n,
      )
    })
    .collect()
}

/// 端椎：切线角度取极值的位置
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LimitVertebra {
  pub index: usize,
  pub point: Point,
  /// 相对竖直方向的角度（度）
  pub angle: f32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CobbMeasurement {
  pub angle: f32,
  pub smoothed: Vec<Point>,
  pub upper: Option<LimitVertebra>,
  pub lower: Option<LimitVertebra>,
}

/// 相邻两点连线相对竖直方向的角度（度）
fn tangent_angle(prev: Point, next: Point) -> f32 {
  let dx = next.x - prev.x;
  let mut dy = next.y - prev.y;
  if dy == 0.0 {
    dy = 0.001;
  }
  (dx / dy).atan().to_degrees()
}

/// 近似 Cobb 角：平滑后的中心线上，内部切线角度的最大值减最小值
pub fn cobb_angle(centers: &[Point]) -> CobbMeasurement {
  if centers.len() < MIN_COBB_POINTS {
    return CobbMeasurement::default();
  }

  // MIN_COBB_POINTS > 2 * COBB_TRIM，内部区间非空
  let smoothed = smooth_points(centers);
  let (start, end) = (COBB_TRIM, smoothed.len() - COBB_TRIM);

  let mut max: Option<LimitVertebra> = None;
  let mut min: Option<LimitVertebra> = None;
  for i in start..end {
    let angle = tangent_angle(smoothed[i - 1], smoothed[i + 1]);
    let candidate = LimitVertebra {
      index: i,
      point: smoothed[i],
      angle,
    };
    if max.is_none_or(|m| angle > m.angle) {
      max = Some(candidate);
    }
    if min.is_none_or(|m| angle < m.angle) {
      min = Some(candidate);
    }
  }

  let angle = match (max, min) {
    (Some(max), Some(min)) => (max.angle - min.angle).abs(),
    _ => 0.0,
  };

  CobbMeasurement {
    angle,
    smoothed,
    upper: max,
    lower: min,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn points(coords: &[(f32, f32)]) -> Vec<Point> {
    coords.iter().map(|&(x, y)| Point::new(x, y)).collect()
  }

  fn boxed(w: f32, h: f32) -> DetectItem {
    DetectItem {
      class_id: 0,
      score: 1.0,
      bbox: [0.0, 0.0, w, h],
    }
  }

  #[test]
  fn straight_vertical_spine_has_zero_angle() {
    let centers = points(&[(100.0, 0.0), (100.0, 50.0), (100.0, 100.0), (100.0, 150.0), (100.0, 200.0)]);
    let m = cobb_angle(&centers);
    assert_eq!(m.angle, 0.0);
    assert_eq!(m.smoothed.len(), 5);
  }

  #[test]
  fn colinear_tilted_points_have_zero_angle() {
    let centers = points(&[(0.0, 0.0), (10.0, 40.0), (20.0, 80.0), (30.0, 120.0), (40.0, 160.0), (50.0, 200.0)]);
    let m = cobb_angle(&centers);
    assert!(m.angle.abs() < 1e-4, "angle = {}", m.angle);
  }

  #[test]
  fn too_few_points_give_zero() {
    let centers = points(&[(0.0, 0.0), (50.0, 40.0), (0.0, 80.0), (50.0, 120.0)]);
    let m = cobb_angle(&centers);
    assert_eq!(m.angle, 0.0);
    assert!(m.smoothed.is_empty());
    assert!(m.upper.is_none());
  }

  #[test]
  fn s_curve_reports_spread_and_limits() {
    let centers = points(&[
      (100.0, 0.0),
      (100.0, 50.0),
      (120.0, 100.0),
      (140.0, 150.0),
      (140.0, 200.0),
      (120.0, 250.0),
      (100.0, 300.0),
      (100.0, 350.0),
    ]);
    let m = cobb_angle(&centers);
    let upper = m.upper.unwrap();
    let lower = m.lower.unwrap();

    assert!(m.angle > 10.0, "angle = {}", m.angle);
    assert!(upper.angle > 0.0 && lower.angle < 0.0);
    assert!((m.angle - (upper.angle - lower.angle)).abs() < 1e-4);
    assert!(upper.index < lower.index);
    assert!((2..6).contains(&upper.index) && (2..6).contains(&lower.index));
  }

  #[test]
  fn horizontal_step_uses_epsilon_dy() {
    let a = tangent_angle(Point::new(0.0, 10.0), Point::new(5.0, 10.0));
    assert!((a - 90.0).abs() < 0.05);
  }

  #[test]
  fn smoothing_averages_with_existing_neighbours() {
    let s = smooth_points(&points(&[(0.0, 0.0), (3.0, 3.0), (6.0, 0.0)]));
    assert_eq!(s[0], Point::new(1.5, 1.5));
    assert_eq!(s[1], Point::new(3.0, 1.0));
    assert_eq!(s[2], Point::new(4.5, 1.5));

    let short = points(&[(1.0, 1.0), (2.0, 2.0)]);
    assert_eq!(smooth_points(&short), short);
  }

  #[test]
  fn wide_boxes_are_frontal_view() {
    let wide = [boxed(70.0, 40.0), boxed(60.0, 40.0)];
    let tall = [boxed(40.0, 40.0), boxed(45.0, 40.0)];
    assert_eq!(classify_view(&wide, 1.35), ImageType::Ap);
    assert_eq!(classify_view(&tall, 1.35), ImageType::Lateral);
  }
}
