// 该文件是 Jizhu （脊柱） 项目的一部分。
// src/report.rs - JSON 报告
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

//! 报告字段名与前端约定一致（camelCase），姿态分项沿用 `deviation_cm`。

use serde::Serialize;

use crate::analysis::{
  PostureAnalysis, Severity, SpineAnalysis,
  geometry::{ImageType, Point},
  posture::{Assessment, BackStatus, BodyAngles, Direction, HeadStatus, StatusColor},
  spine::{Findings, RiskLevel},
};

fn round_to(value: f32, digits: i32) -> f32 {
  let factor = 10f32.powi(digits);
  (value * factor).round() / factor
}

fn timestamp() -> String {
  chrono::Local::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, false)
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpineReport {
  pub success: bool,
  pub image: String,
  pub image_type: ImageType,
  pub cobb_angle: f32,
  pub vertebrae_count: usize,
  pub findings: Findings,
  pub severity: Severity,
  pub consult_doctor: bool,
  pub recommendations: Vec<String>,
  pub score: u32,
  pub risk_level: RiskLevel,
  pub analyzed_at: String,
}

impl SpineReport {
  pub fn new(image: impl Into<String>, analysis: &SpineAnalysis) -> Self {
    Self {
      success: true,
      image: image.into(),
      image_type: analysis.image_type,
      cobb_angle: round_to(analysis.cobb_angle(), 2),
      vertebrae_count: analysis.vertebrae.len(),
      findings: analysis.findings,
      severity: analysis.severity,
      consult_doctor: analysis.consult_doctor,
      recommendations: analysis.recommendations.clone(),
      score: analysis.score,
      risk_level: analysis.risk_level,
      analyzed_at: timestamp(),
    }
  }
}

#[derive(Debug, Clone, Serialize)]
pub struct PostureSection {
  pub status: &'static str,
  pub severity: Severity,
  pub deviation_cm: f32,
  pub color: StatusColor,
}

impl From<&Assessment<HeadStatus>> for PostureSection {
  fn from(a: &Assessment<HeadStatus>) -> Self {
    Self {
      status: a.status.as_str(),
      severity: a.status.severity(),
      deviation_cm: a.deviation_cm,
      color: a.status.color(),
    }
  }
}

impl From<&Assessment<BackStatus>> for PostureSection {
  fn from(a: &Assessment<BackStatus>) -> Self {
    Self {
      status: a.status.as_str(),
      severity: a.status.severity(),
      deviation_cm: a.deviation_cm,
      color: a.status.color(),
    }
  }
}

#[derive(Debug, Clone, Serialize)]
pub struct KeypointSummary {
  pub ear: Point,
  pub shoulder: Point,
  pub hip: Point,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostureReport {
  pub success: bool,
  pub image: String,
  pub direction: Direction,
  pub head_posture: PostureSection,
  pub back_posture: PostureSection,
  pub overall_status: &'static str,
  pub overall_severity: Severity,
  pub consult_doctor: bool,
  pub recommendations: Vec<String>,
  pub score: u32,
  pub keypoints: KeypointSummary,
  pub angles: BodyAngles,
  pub analyzed_at: String,
}

impl PostureReport {
  pub fn new(image: impl Into<String>, analysis: &PostureAnalysis) -> Self {
    Self {
      success: true,
      image: image.into(),
      direction: analysis.direction,
      head_posture: PostureSection::from(&analysis.head),
      back_posture: PostureSection::from(&analysis.back),
      overall_status: analysis.overall_status(),
      overall_severity: analysis.severity,
      consult_doctor: analysis.consult_doctor,
      recommendations: analysis.recommendations.clone(),
      score: analysis.score,
      keypoints: KeypointSummary {
        ear: analysis.landmarks.ear,
        shoulder: analysis.landmarks.shoulder,
        hip: analysis.landmarks.hip,
      },
      angles: BodyAngles {
        neck_angle: round_to(analysis.angles.neck_angle, 2),
        torso_angle: round_to(analysis.angles.torso_angle, 2),
      },
      analyzed_at: timestamp(),
    }
  }
}

/// 任何失败都以该形式输出
#[derive(Debug, Clone, Serialize)]
pub struct ErrorReport {
  pub success: bool,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub image: Option<String>,
  pub error: String,
}

impl ErrorReport {
  pub fn new(error: impl std::fmt::Display) -> Self {
    Self {
      success: false,
      image: None,
      error: error.to_string(),
    }
  }

  pub fn with_image(mut self, image: Option<String>) -> Self {
    self.image = image;
    self
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    analysis::{Analyze, PostureAnalyzer, SpineAnalyzer},
    model::{CocoKeypoint, DetectItem, DetectResult, KEYPOINT_COUNT, Keypoint, PoseItem, PoseResult},
  };
  use serde_json::{Value, json};

  fn spine_report() -> Value {
    let items = (0..6)
      .map(|i| {
        let y = i as f32 * 50.0;
        DetectItem {
          class_id: 0,
          score: 0.8,
          bbox: [100.0, y, 150.0, y + 40.0],
        }
      })
      .collect::<Vec<_>>();
    let analysis = SpineAnalyzer::default()
      .analyze(&DetectResult::from(items))
      .unwrap();
    serde_json::to_value(SpineReport::new("Omurga 1.jpeg", &analysis)).unwrap()
  }

  #[test]
  fn spine_report_uses_frontend_keys() {
    let v = spine_report();
    assert_eq!(v["success"], json!(true));
    assert_eq!(v["image"], json!("Omurga 1.jpeg"));
    assert_eq!(v["imageType"], json!("LATERAL"));
    assert_eq!(v["cobbAngle"], json!(0.0));
    assert_eq!(v["vertebraeCount"], json!(6));
    assert_eq!(
      v["findings"],
      json!({"compression_fracture": 0, "herniated_disc": 0, "listhesis": 0})
    );
    assert_eq!(v["severity"], json!("moderate"));
    assert_eq!(v["consultDoctor"], json!(true));
    assert_eq!(v["score"], json!(100));
    assert_eq!(v["riskLevel"], json!("LOW"));
    assert!(v["analyzedAt"].is_string());
  }

  #[test]
  fn posture_report_sections() {
    let mut keypoints = [Keypoint::default(); KEYPOINT_COUNT];
    let mut set = |k: CocoKeypoint, x: f32, y: f32| {
      keypoints[k as usize] = Keypoint {
        x,
        y,
        visibility: 1.0,
      };
    };
    set(CocoKeypoint::Nose, 380.0, 100.0);
    set(CocoKeypoint::LeftEar, 370.0, 110.0);
    set(CocoKeypoint::RightEar, 370.0, 110.0);
    set(CocoKeypoint::LeftShoulder, 300.0, 200.0);
    set(CocoKeypoint::RightShoulder, 300.0, 200.0);
    set(CocoKeypoint::LeftHip, 300.0, 400.0);
    set(CocoKeypoint::RightHip, 300.0, 400.0);
    let poses = PoseResult::from(vec![PoseItem {
      score: 0.95,
      bbox: [0.0, 0.0, 600.0, 800.0],
      keypoints,
    }]);
    let analysis = PostureAnalyzer::default().analyze(&poses).unwrap();
    let v = serde_json::to_value(PostureReport::new("side.png", &analysis)).unwrap();

    assert_eq!(v["direction"], json!("RIGHT"));
    assert_eq!(v["headPosture"]["status"], json!("FORWARD HEAD POSTURE"));
    assert_eq!(v["headPosture"]["severity"], json!("moderate"));
    assert_eq!(v["headPosture"]["color"], json!("red"));
    assert_eq!(v["headPosture"]["deviation_cm"], json!(17.5));
    assert_eq!(v["backPosture"]["status"], json!("BACK ALIGNED"));
    assert_eq!(v["overallStatus"], json!("POSTURE ISSUES DETECTED"));
    assert_eq!(v["overallSeverity"], json!("moderate"));
    assert_eq!(v["score"], json!(75));
    assert_eq!(v["keypoints"]["shoulder"], json!({"x": 300.0, "y": 200.0}));
    assert!(v["angles"]["neckAngle"].as_f64().unwrap() > 30.0);
    assert_eq!(v["angles"]["torsoAngle"], json!(0.0));
  }

  #[test]
  fn error_report_shape() {
    let v = serde_json::to_value(ErrorReport::new("Image file not found: /x.png")).unwrap();
    assert_eq!(
      v,
      json!({"success": false, "error": "Image file not found: /x.png"})
    );

    let v = serde_json::to_value(ErrorReport::new("boom").with_image(Some("a.png".into()))).unwrap();
    assert_eq!(v["image"], json!("a.png"));
  }

  #[test]
  fn rounding() {
    assert_eq!(round_to(12.3456, 2), 12.35);
    assert_eq!(round_to(-0.04, 1), -0.0);
  }
}
