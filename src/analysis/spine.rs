// 该文件是 Jizhu （脊柱） 项目的一部分。
// src/analysis/spine.rs - 脊柱 X 光片分析
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
use tracing::{debug, info, warn};

use crate::{
  analysis::{
    AnalysisError, Analyze, Severity,
    geometry::{CobbMeasurement, ImageType, Point, classify_view, cobb_angle},
    thresholds::SpineThresholds,
  },
  model::{DetectItem, DetectResult},
};

const FRACTURE_PENALTY: u32 = 30;
const HERNIATION_PENALTY: u32 = 20;
const LISTHESIS_PENALTY: u32 = 15;
/// 椎间隙标记线两端各内缩的像素
const GAP_LINE_INSET: f32 = 5.0;

/// 单个椎骨的异常标记
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct VertebraFlags {
  pub compression_fracture: bool,
  pub herniated_disc: bool,
  pub listhesis: bool,
}

impl VertebraFlags {
  pub fn is_healthy(&self) -> bool {
    !(self.compression_fracture || self.herniated_disc || self.listhesis)
  }
}

/// 过窄的椎间隙，位于当前椎骨与下一椎骨之间
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DiscGap {
  /// 间隙中线
  pub y: f32,
  pub x_start: f32,
  pub x_end: f32,
  pub height: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Vertebra {
  pub bbox: [f32; 4],
  pub score: f32,
  pub center: Point,
  pub width: f32,
  pub height: f32,
  pub flags: VertebraFlags,
  pub narrowed_gap: Option<DiscGap>,
}

impl From<&DetectItem> for Vertebra {
  fn from(item: &DetectItem) -> Self {
    let (cx, cy) = item.center();
    Self {
      bbox: item.bbox,
      score: item.score,
      center: Point::new(cx, cy),
      width: item.width(),
      height: item.height(),
      flags: VertebraFlags::default(),
      narrowed_gap: None,
    }
  }
}

/// 各类异常的椎骨计数
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Findings {
  pub compression_fracture: u32,
  pub herniated_disc: u32,
  pub listhesis: u32,
}

impl Findings {
  pub fn total(&self) -> u32 {
    self.compression_fracture + self.herniated_disc + self.listhesis
  }
}

/// 整体曲度判定
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Curvature {
  Normal,
  /// 正位片侧弯
  Scoliosis,
  /// 侧位片前凸变平
  Hypolordosis,
  /// 侧位片前凸过度
  Hyperlordosis,
}

impl Curvature {
  pub fn is_normal(&self) -> bool {
    matches!(self, Curvature::Normal)
  }

  /// 报告面板上的角度解读
  pub fn label(&self) -> Option<&'static str> {
    match self {
      Curvature::Normal => None,
      Curvature::Scoliosis => Some("SCOLIOSIS (+)"),
      Curvature::Hypolordosis => Some("HYPOLORDOSIS (Flat)"),
      Curvature::Hyperlordosis => Some("HYPERLORDOSIS"),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
  Low,
  Medium,
  High,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpineAnalysis {
  pub image_type: ImageType,
  /// 自上而下排列
  pub vertebrae: Vec<Vertebra>,
  pub cobb: CobbMeasurement,
  pub findings: Findings,
  pub curvature: Curvature,
  pub severity: Severity,
  pub consult_doctor: bool,
  pub recommendations: Vec<String>,
  pub score: u32,
  pub risk_level: RiskLevel,
}

impl SpineAnalysis {
  pub fn cobb_angle(&self) -> f32 {
    self.cobb.angle
  }

  pub fn has_pathology(&self) -> bool {
    self.findings.total() > 0 || !self.curvature.is_normal()
  }
}

#[derive(Debug, Clone, Default)]
pub struct SpineAnalyzer {
  thresholds: SpineThresholds,
}

impl SpineAnalyzer {
  pub fn new(thresholds: SpineThresholds) -> Self {
    Self { thresholds }
  }

  pub fn thresholds(&self) -> &SpineThresholds {
    &self.thresholds
  }

  /// 逐椎骨判定滑脱、压缩性骨折与椎间盘突出
  fn mark_vertebrae(&self, vertebrae: &mut [Vertebra], image_type: ImageType) -> Findings {
    let t = &self.thresholds;
    let n = vertebrae.len();
    let mean_height = vertebrae.iter().map(|v| v.height).sum::<f32>() / n as f32;
    let tolerance = t.listhesis_tolerance.get(image_type);
    let limit = t.herniation_limit.get(image_type);

    let mut findings = Findings::default();
    for i in 0..n {
      let interior = i > 0 && i + 1 < n;
      let v = &vertebrae[i];
      let mut flags = VertebraFlags::default();
      let mut narrowed_gap = None;

      if interior {
        let expected_x = (vertebrae[i - 1].center.x + vertebrae[i + 1].center.x) / 2.0;
        if (v.center.x - expected_x).abs() > v.width * tolerance {
          flags.listhesis = true;
        }
      }

      let reference = if interior {
        Some((vertebrae[i - 1].height + vertebrae[i + 1].height) / 2.0)
      } else if t.fracture_check_ends {
        Some(mean_height)
      } else {
        None
      };
      if reference.is_some_and(|r| v.height < r * t.fracture_ratio) {
        flags.compression_fracture = true;
      }

      if let Some(next) = vertebrae.get(i + 1) {
        let gap = next.bbox[1] - v.bbox[3];
        let ref_height = (v.height + next.height) / 2.0;
        if gap > 0.0 && gap < ref_height * limit {
          flags.herniated_disc = true;
          narrowed_gap = Some(DiscGap {
            y: v.bbox[3] + gap / 2.0,
            x_start: v.bbox[0] + GAP_LINE_INSET,
            x_end: v.bbox[2] - GAP_LINE_INSET,
            height: gap,
          });
        }
      }

      if !flags.is_healthy() {
        debug!("第 {} 节椎骨异常: {:?}", i, flags);
      }
      findings.compression_fracture += flags.compression_fracture as u32;
      findings.herniated_disc += flags.herniated_disc as u32;
      findings.listhesis += flags.listhesis as u32;

      let v = &mut vertebrae[i];
      v.flags = flags;
      v.narrowed_gap = narrowed_gap;
    }
    findings
  }

  fn classify_curvature(&self, image_type: ImageType, angle: f32) -> Curvature {
    let t = &self.thresholds;
    match image_type {
      ImageType::Ap if angle > t.scoliosis_angle => Curvature::Scoliosis,
      ImageType::Lateral if angle < t.hypolordosis_angle => Curvature::Hypolordosis,
      ImageType::Lateral if angle > t.hyperlordosis_angle => Curvature::Hyperlordosis,
      _ => Curvature::Normal,
    }
  }

  fn risk_level(&self, angle: f32, findings: &Findings) -> RiskLevel {
    let t = &self.thresholds;
    if angle > t.high_risk_angle || findings.total() > t.high_risk_findings {
      RiskLevel::High
    } else if angle > t.scoliosis_angle || findings.total() > 0 {
      RiskLevel::Medium
    } else {
      RiskLevel::Low
    }
  }
}

fn recommendations(findings: &Findings, curvature: Curvature, angle: f32) -> Vec<String> {
  let mut out = Vec::new();
  if findings.compression_fracture > 0 {
    out.push(format!(
      "⚠️ URGENT: Compression fracture detected ({} location(s))! Emergency orthopedic consultation required.",
      findings.compression_fracture
    ));
  }
  if findings.herniated_disc > 0 {
    out.push(format!(
      "⚠️ Disc herniation detected ({} region(s)). Medical examination required.",
      findings.herniated_disc
    ));
  }
  if findings.listhesis > 0 {
    out.push(format!(
      "⚠️ Vertebral slip (listhesis) detected ({} region(s)). Doctor consultation recommended.",
      findings.listhesis
    ));
  }
  match curvature {
    Curvature::Scoliosis => out.push(format!(
      "⚠️ Scoliosis detected (Cobb angle: {:.1}°). Consult an orthopedic specialist.",
      angle
    )),
    Curvature::Hypolordosis => out.push(format!(
      "⚠️ Lordosis flattening detected (Angle: {:.1}°). Medical examination recommended.",
      angle
    )),
    Curvature::Hyperlordosis => out.push(format!(
      "⚠️ Excessive lordosis detected (Angle: {:.1}°). Doctor consultation required.",
      angle
    )),
    Curvature::Normal => {}
  }
  if out.is_empty() {
    out.push("✅ Normal spine anatomy detected. Routine check-ups recommended.".to_string());
  }
  out
}

impl Analyze<DetectResult> for SpineAnalyzer {
  type Report = SpineAnalysis;

  fn analyze(&self, detections: &DetectResult) -> Result<Self::Report, AnalysisError> {
    if detections.len() < self.thresholds.min_vertebrae {
      warn!("仅检测到 {} 个椎骨，无法分析", detections.len());
      return Err(AnalysisError::InsufficientVertebrae(detections.len()));
    }

    // 自上而下
    let mut boxes = detections.items.to_vec();
    boxes.sort_by(|a, b| a.center().1.total_cmp(&b.center().1));

    let image_type = classify_view(&boxes, self.thresholds.ap_aspect_ratio);
    let mut vertebrae: Vec<Vertebra> = boxes.iter().map(Vertebra::from).collect();
    let findings = self.mark_vertebrae(&mut vertebrae, image_type);

    let centers: Vec<Point> = vertebrae.iter().map(|v| v.center).collect();
    let cobb = cobb_angle(&centers);
    let curvature = self.classify_curvature(image_type, cobb.angle);

    let severity = if findings.compression_fracture > 0 {
      Severity::Critical
    } else if findings.total() > 0 || !curvature.is_normal() {
      Severity::Moderate
    } else {
      Severity::Normal
    };

    let penalty = findings.compression_fracture * FRACTURE_PENALTY
      + findings.herniated_disc * HERNIATION_PENALTY
      + findings.listhesis * LISTHESIS_PENALTY;
    let score = 100u32.saturating_sub(penalty);
    let risk_level = self.risk_level(cobb.angle, &findings);

    info!(
      "{} 视图，{} 个椎骨，角度 {:.1}°，严重程度 {:?}",
      image_type,
      vertebrae.len(),
      cobb.angle,
      severity
    );

    Ok(SpineAnalysis {
      image_type,
      recommendations: recommendations(&findings, curvature, cobb.angle),
      vertebrae,
      cobb,
      findings,
      curvature,
      consult_doctor: severity != Severity::Normal,
      severity,
      score,
      risk_level,
    })
  }
}
