// 该文件是 Jizhu （脊柱） 项目的一部分。
// src/output/draw.rs - 分析结果可视化
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

use std::path::{Path, PathBuf};

use ab_glyph::{FontVec, PxScale};
use image::{Rgb, RgbImage};
use imageproc::{
  drawing::{
    draw_filled_circle_mut, draw_filled_rect_mut, draw_hollow_rect_mut, draw_line_segment_mut,
    draw_text_mut, text_size,
  },
  rect::Rect,
};
use thiserror::Error;
use tracing::{debug, warn};

use crate::analysis::{
  PostureAnalysis, SpineAnalysis,
  geometry::{ImageType, LimitVertebra, Point},
  posture::StatusColor,
  spine::{Curvature, Findings},
};

// 椎骨标记
const LISTHESIS_COLOR: Rgb<u8> = Rgb([255, 165, 0]);
const FRACTURE_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const HERNIATION_COLOR: Rgb<u8> = Rgb([255, 0, 255]);
const HEALTHY_COLOR: Rgb<u8> = Rgb([0, 255, 255]);
const SPINE_LINE_COLOR: Rgb<u8> = Rgb([255, 255, 0]);
const TANGENT_COLOR: Rgb<u8> = Rgb([220, 220, 220]);
const BOX_THICKNESS: u32 = 3;
const HERNIATION_THICKNESS: u32 = 4;
const SPINE_LINE_THICKNESS: u32 = 2;
const HEALTHY_DOT_RADIUS: i32 = 3;
const TANGENT_LENGTH: f32 = 250.0;
const TANGENT_DOT_RADIUS: i32 = 6;

// 报告面板
const PANEL_BACKGROUND: Rgb<u8> = Rgb([30, 30, 30]);
const TITLE_COLOR: Rgb<u8> = Rgb([255, 255, 0]);
const WHITE: Rgb<u8> = Rgb([255, 255, 255]);
const ID_COLOR: Rgb<u8> = Rgb([200, 200, 200]);
const DIM_DOT_COLOR: Rgb<u8> = Rgb([80, 80, 80]);
const DIM_TEXT_COLOR: Rgb<u8> = Rgb([120, 120, 120]);
const GOOD_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const PATHOLOGY_BOX_COLOR: Rgb<u8> = Rgb([200, 0, 0]);
const NORMAL_BOX_COLOR: Rgb<u8> = Rgb([0, 180, 0]);
const PANEL_MARGIN: u32 = 20;
const PANEL_TOP: f32 = 50.0;
const ID_MAX_CHARS: usize = 18;

// 姿态标记
const SKELETON_COLOR: Rgb<u8> = Rgb([255, 0, 255]);
const REFERENCE_COLOR: Rgb<u8> = Rgb([200, 200, 200]);
const HIP_COLOR: Rgb<u8> = Rgb([0, 0, 255]);
const ORANGE: Rgb<u8> = Rgb([255, 165, 0]);
const RED: Rgb<u8> = Rgb([255, 0, 0]);
const BLACK: Rgb<u8> = Rgb([0, 0, 0]);
const SKELETON_THICKNESS: u32 = 3;
const LANDMARK_RADIUS: i32 = 8;
const REFERENCE_OVERSHOOT: f32 = 50.0;
const POSTURE_BOX: (u32, u32) = (700, 160);

/// 字号单位：1.0 对应的像素高度
const TEXT_UNIT_PX: f32 = 30.0;
/// 无字体时估算的字符宽度（相对像素高度）
const CHAR_WIDTH_RATIO: f32 = 0.55;

const SYSTEM_FONTS: [&str; 6] = [
  "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
  "/usr/share/fonts/TTF/DejaVuSans.ttf",
  "/usr/share/fonts/dejavu/DejaVuSans.ttf",
  "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
  "/System/Library/Fonts/Supplemental/Arial.ttf",
  "C:\\Windows\\Fonts\\arial.ttf",
];

#[derive(Error, Debug)]
pub enum DrawError {
  #[error("I/O error: {0}")]
  IoError(#[from] std::io::Error),
  #[error("Invalid font file: {0}")]
  InvalidFont(PathBuf),
}

#[derive(Default)]
pub struct Draw {
  font: Option<FontVec>,
}

impl Draw {
  pub fn new(font: FontVec) -> Self {
    Self { font: Some(font) }
  }

  pub fn with_font_file(path: &Path) -> Result<Self, DrawError> {
    let data = std::fs::read(path)?;
    let font =
      FontVec::try_from_vec(data).map_err(|_| DrawError::InvalidFont(path.to_path_buf()))?;
    debug!("加载字体: {}", path.display());
    Ok(Self::new(font))
  }

  /// 依次尝试常见的系统字体，都不可用时只绘制几何图形
  pub fn with_system_font() -> Self {
    for candidate in SYSTEM_FONTS.iter().map(Path::new) {
      if candidate.is_file()
        && let Ok(draw) = Self::with_font_file(candidate)
      {
        return draw;
      }
    }
    warn!("未找到可用字体，标注图中将不包含文字");
    Self::default()
  }

  fn text_width(&self, text: &str, px: f32) -> u32 {
    match &self.font {
      Some(font) => text_size(PxScale::from(px), font, text).0,
      None => (text.chars().count() as f32 * px * CHAR_WIDTH_RATIO) as u32,
    }
  }

  /// 以基线位置绘制文字
  fn text(&self, image: &mut RgbImage, x: f32, baseline: f32, px: f32, color: Rgb<u8>, text: &str) {
    if let Some(font) = &self.font {
      let top = baseline - px * 0.75;
      draw_text_mut(
        image,
        color,
        x as i32,
        top as i32,
        PxScale::from(px),
        font,
        text,
      );
    }
  }
}

fn thick_line(image: &mut RgbImage, from: Point, to: Point, color: Rgb<u8>, thickness: u32) {
  let (dx, dy) = (to.x - from.x, to.y - from.y);
  let len = (dx * dx + dy * dy).sqrt();
  if len == 0.0 {
    return;
  }
  let (nx, ny) = (-dy / len, dx / len);

  // 沿法线方向以半像素步长平铺
  let steps = thickness.max(1) * 2 - 1;
  let half = (thickness.max(1) - 1) as f32 / 2.0;
  for k in 0..steps {
    let offset = k as f32 / 2.0 - half;
    draw_line_segment_mut(
      image,
      (from.x + nx * offset, from.y + ny * offset),
      (to.x + nx * offset, to.y + ny * offset),
      color,
    );
  }
}

fn thick_rect(image: &mut RgbImage, bbox: &[f32; 4], color: Rgb<u8>, thickness: u32) {
  let (x1, y1) = (bbox[0].round() as i32, bbox[1].round() as i32);
  let (x2, y2) = (bbox[2].round() as i32, bbox[3].round() as i32);
  for t in 0..thickness as i32 {
    let (w, h) = (x2 - x1 - 2 * t, y2 - y1 - 2 * t);
    if w <= 0 || h <= 0 {
      break;
    }
    draw_hollow_rect_mut(
      image,
      Rect::at(x1 + t, y1 + t).of_size(w as u32, h as u32),
      color,
    );
  }
}

fn dot(image: &mut RgbImage, center: Point, radius: i32, color: Rgb<u8>) {
  draw_filled_circle_mut(
    image,
    (center.x.round() as i32, center.y.round() as i32),
    radius,
    color,
  );
}

/// 过端椎画切线，角度为相对竖直方向的偏角
fn tangent_line(image: &mut RgbImage, limit: &LimitVertebra) {
  let rad = limit.angle.to_radians();
  let (dx, dy) = (TANGENT_LENGTH * rad.cos(), TANGENT_LENGTH * rad.sin());
  let c = limit.point;
  thick_line(
    image,
    Point::new(c.x - dx, c.y + dy),
    Point::new(c.x + dx, c.y - dy),
    TANGENT_COLOR,
    2,
  );
  dot(image, c, TANGENT_DOT_RADIUS, TANGENT_COLOR);
}

fn status_color(color: StatusColor) -> Rgb<u8> {
  match color {
    StatusColor::Green => GOOD_COLOR,
    StatusColor::Orange => ORANGE,
    StatusColor::Red => RED,
  }
}

fn curvature_color(curvature: Curvature) -> Rgb<u8> {
  match curvature {
    Curvature::Normal => GOOD_COLOR,
    Curvature::Scoliosis | Curvature::Hypolordosis => RED,
    Curvature::Hyperlordosis => ORANGE,
  }
}

impl Draw {
  /// 在原图上标注椎骨，并在右侧拼接报告面板
  pub fn draw_spine(&self, image: &RgbImage, name: &str, analysis: &SpineAnalysis) -> RgbImage {
    let mut marked = image.clone();

    for v in analysis.vertebrae.iter() {
      if v.flags.listhesis {
        thick_rect(&mut marked, &v.bbox, LISTHESIS_COLOR, BOX_THICKNESS);
      }
      if v.flags.compression_fracture {
        thick_rect(&mut marked, &v.bbox, FRACTURE_COLOR, BOX_THICKNESS);
      }
      if let Some(gap) = &v.narrowed_gap {
        thick_line(
          &mut marked,
          Point::new(gap.x_start, gap.y),
          Point::new(gap.x_end, gap.y),
          HERNIATION_COLOR,
          HERNIATION_THICKNESS,
        );
      }
      if !v.flags.listhesis && !v.flags.compression_fracture {
        dot(&mut marked, v.center, HEALTHY_DOT_RADIUS, HEALTHY_COLOR);
      }
    }

    for pair in analysis.cobb.smoothed.windows(2) {
      thick_line(&mut marked, pair[0], pair[1], SPINE_LINE_COLOR, SPINE_LINE_THICKNESS);
    }
    for limit in [analysis.cobb.upper, analysis.cobb.lower].iter().flatten() {
      tangent_line(&mut marked, limit);
    }

    self.spine_panel(&marked, name, analysis)
  }

  fn spine_panel(&self, image: &RgbImage, name: &str, analysis: &SpineAnalysis) -> RgbImage {
    let (w, h) = image.dimensions();
    let scale = (h as f32 / 1100.0).max(0.6);
    let px = scale * TEXT_UNIT_PX;
    let line_h = 45.0 * scale;

    let id: String = name.chars().take(ID_MAX_CHARS).collect();
    let id_line = format!("ID: {}", id);
    let widest = ["AI RADIOLOGY REPORT", "RETROLISTHESIS: 10", id_line.as_str()]
      .iter()
      .map(|t| self.text_width(t, px))
      .max()
      .unwrap_or(0);
    let panel_w = widest + 4 * PANEL_MARGIN;

    let mut canvas = RgbImage::from_pixel(w + panel_w, h, PANEL_BACKGROUND);
    image::imageops::replace(&mut canvas, image, 0, 0);

    let x = (w + PANEL_MARGIN) as f32;
    let mut y = PANEL_TOP;

    self.text(&mut canvas, x, y, px * 1.1, TITLE_COLOR, "AI RADIOLOGY");
    y += line_h * 1.5;
    self.text(&mut canvas, x, y, px * 0.7, ID_COLOR, &id_line);
    y += line_h * 1.5;

    let heading = match analysis.image_type {
      ImageType::Ap => "SCOLIOSIS (Cobb):",
      ImageType::Lateral => "LORDOSIS / KYPHOSIS:",
    };
    self.text(&mut canvas, x, y, px, WHITE, heading);
    y += line_h;

    let angle_color = curvature_color(analysis.curvature);
    let degrees = format!("{:.1} Degrees", analysis.cobb_angle());
    self.text(&mut canvas, x, y, px * 1.4, angle_color, &degrees);
    y += line_h;
    if let Some(label) = analysis.curvature.label() {
      self.text(&mut canvas, x, y, px * 0.8, angle_color, label);
      y += line_h;
    }
    y += line_h * 0.5;

    self.text(&mut canvas, x, y, px, WHITE, "FINDINGS:");
    y += line_h;
    let rows = finding_rows(&analysis.findings);
    for (label, count, color) in rows {
      let (dot_color, text_color, text) = if count > 0 {
        (color, WHITE, format!("{}: {}", label, count))
      } else {
        (DIM_DOT_COLOR, DIM_TEXT_COLOR, format!("{}: NONE", label))
      };
      dot(
        &mut canvas,
        Point::new(x + 15.0, y - 8.0),
        (6.0 * scale) as i32,
        dot_color,
      );
      self.text(&mut canvas, x + 35.0, y, px * 0.75, text_color, &text);
      y += line_h;
    }

    y += 30.0;
    let (box_color, verdict) = if analysis.has_pathology() {
      (PATHOLOGY_BOX_COLOR, "PATHOLOGY DETECTED")
    } else {
      (NORMAL_BOX_COLOR, "NORMAL")
    };
    let box_h = (line_h * 1.8) as u32;
    let box_w = panel_w.saturating_sub(2 * PANEL_MARGIN).max(1);
    if (y as u32) < h {
      draw_filled_rect_mut(
        &mut canvas,
        Rect::at(x as i32, y as i32).of_size(box_w, box_h.max(1)),
        box_color,
      );
      let text_w = self.text_width(verdict, px);
      let tx = x + (box_w.saturating_sub(text_w) / 2) as f32;
      let ty = y + (box_h as f32 + px * 0.75) / 2.0;
      self.text(&mut canvas, tx, ty, px, WHITE, verdict);
    }

    canvas
  }

  /// 在原图上标注颈、背连线与判定结果
  pub fn draw_posture(&self, image: &RgbImage, analysis: &PostureAnalysis) -> RgbImage {
    let mut canvas = image.clone();
    let lm = &analysis.landmarks;
    let head_color = status_color(analysis.head.status.color());
    let back_color = status_color(analysis.back.status.color());

    thick_line(&mut canvas, lm.ear, lm.shoulder, SKELETON_COLOR, SKELETON_THICKNESS);
    thick_line(&mut canvas, lm.shoulder, lm.hip, SKELETON_COLOR, SKELETON_THICKNESS);
    draw_line_segment_mut(
      &mut canvas,
      (lm.hip.x, lm.hip.y),
      (lm.hip.x, lm.shoulder.y - REFERENCE_OVERSHOOT),
      REFERENCE_COLOR,
    );

    dot(&mut canvas, lm.ear, LANDMARK_RADIUS, head_color);
    dot(&mut canvas, lm.shoulder, LANDMARK_RADIUS, back_color);
    dot(&mut canvas, lm.hip, LANDMARK_RADIUS, HIP_COLOR);

    let (box_w, box_h) = POSTURE_BOX;
    let (cw, ch) = canvas.dimensions();
    draw_filled_rect_mut(
      &mut canvas,
      Rect::at(0, 0).of_size(box_w.min(cw), box_h.min(ch)),
      BLACK,
    );

    let px = TEXT_UNIT_PX;
    self.text(
      &mut canvas,
      10.0,
      30.0,
      px * 0.6,
      WHITE,
      &format!("DIRECTION: {}", analysis.direction.as_str()),
    );
    self.text(
      &mut canvas,
      10.0,
      70.0,
      px * 0.7,
      head_color,
      &format!("NECK: {}", analysis.head.status.as_str()),
    );
    self.text(
      &mut canvas,
      450.0,
      70.0,
      px * 0.5,
      WHITE,
      &format!("Deviation: {:.1} cm (Ref)", analysis.head.deviation_cm),
    );
    self.text(
      &mut canvas,
      10.0,
      110.0,
      px * 0.7,
      back_color,
      &format!("BACK:  {}", analysis.back.status.as_str()),
    );
    self.text(
      &mut canvas,
      450.0,
      110.0,
      px * 0.5,
      WHITE,
      &format!("Tilt: {:.1} cm (Ref)", analysis.back.deviation_cm),
    );

    let (verdict_color, verdict) = if analysis.has_issue() {
      (ORANGE, "RESULT: CONSULT A DOCTOR")
    } else {
      (GOOD_COLOR, "RESULT: HEALTHY POSTURE")
    };
    self.text(&mut canvas, 10.0, 145.0, px * 0.7, verdict_color, verdict);

    canvas
  }
}

fn finding_rows(findings: &Findings) -> [(&'static str, u32, Rgb<u8>); 3] {
  [
    (
      "Compression Frac.",
      findings.compression_fracture,
      FRACTURE_COLOR,
    ),
    ("Disc Herniation", findings.herniated_disc, HERNIATION_COLOR),
    ("Spondylolisthesis", findings.listhesis, LISTHESIS_COLOR),
  ]
}
