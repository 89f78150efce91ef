// 该文件是 Jizhu （脊柱） 项目的一部分。
// src/analysis/posture.rs - 侧面站姿分析
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
use tracing::{info, warn};

use crate::{
  analysis::{AnalysisError, Analyze, Severity, geometry::Point, thresholds::PostureThresholds},
  model::{CocoKeypoint, PoseItem, PoseResult},
};

const ANGLE_EPSILON: f32 = 1e-6;

/// 左右关键点取平均后的体表标志点
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Landmarks {
  pub nose: Point,
  pub ear: Point,
  pub shoulder: Point,
  pub hip: Point,
}

impl Landmarks {
  pub fn from_pose(pose: &PoseItem) -> Self {
    let point = |k: CocoKeypoint| {
      let kp = pose.keypoint(k);
      Point::new(kp.x, kp.y)
    };
    Self {
      nose: point(CocoKeypoint::Nose),
      ear: Point::midpoint(point(CocoKeypoint::LeftEar), point(CocoKeypoint::RightEar)),
      shoulder: Point::midpoint(
        point(CocoKeypoint::LeftShoulder),
        point(CocoKeypoint::RightShoulder),
      ),
      hip: Point::midpoint(point(CocoKeypoint::LeftHip), point(CocoKeypoint::RightHip)),
    }
  }

  /// 躯干高度，作为缩放无关的参考长度
  pub fn torso_height(&self) -> f32 {
    let torso = (self.hip.y - self.shoulder.y).abs();
    if torso == 0.0 { 1.0 } else { torso }
  }
}

/// 人物朝向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
  Right,
  Left,
}

impl Direction {
  fn of(landmarks: &Landmarks) -> Self {
    if landmarks.nose.x > landmarks.shoulder.x {
      Direction::Right
    } else {
      Direction::Left
    }
  }

  /// 把 x 方向的偏移换算为“向前为正”
  pub fn coefficient(&self) -> f32 {
    match self {
      Direction::Right => 1.0,
      Direction::Left => -1.0,
    }
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      Direction::Right => "RIGHT",
      Direction::Left => "LEFT",
    }
  }
}

/// 标记颜色，报告与绘制共用
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusColor {
  Green,
  Orange,
  Red,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeadStatus {
  Normal,
  Forward,
  Backward,
}

impl HeadStatus {
  pub fn as_str(&self) -> &'static str {
    match self {
      HeadStatus::Normal => "NORMAL",
      HeadStatus::Forward => "FORWARD HEAD POSTURE",
      HeadStatus::Backward => "BACKWARD HEAD POSTURE",
    }
  }

  pub fn severity(&self) -> Severity {
    match self {
      HeadStatus::Normal => Severity::Normal,
      HeadStatus::Forward => Severity::Moderate,
      HeadStatus::Backward => Severity::Mild,
    }
  }

  pub fn color(&self) -> StatusColor {
    match self {
      HeadStatus::Normal => StatusColor::Green,
      HeadStatus::Forward => StatusColor::Red,
      HeadStatus::Backward => StatusColor::Orange,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackStatus {
  Aligned,
  Kyphosis,
}

impl BackStatus {
  pub fn as_str(&self) -> &'static str {
    match self {
      BackStatus::Aligned => "BACK ALIGNED",
      BackStatus::Kyphosis => "KYPHOSIS (SLOUCHING)",
    }
  }

  pub fn severity(&self) -> Severity {
    match self {
      BackStatus::Aligned => Severity::Normal,
      BackStatus::Kyphosis => Severity::Moderate,
    }
  }

  pub fn color(&self) -> StatusColor {
    match self {
      BackStatus::Aligned => StatusColor::Green,
      BackStatus::Kyphosis => StatusColor::Red,
    }
  }
}

/// 一项判定及其偏移
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Assessment<S> {
  pub status: S,
  /// 向前为正的像素偏移
  pub deviation: f32,
  /// 以平均躯干长度换算的参考厘米，保留一位小数
  pub deviation_cm: f32,
}

/// 相对竖直方向的角度（度）
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BodyAngles {
  /// 耳-肩连线
  pub neck_angle: f32,
  /// 肩-髋连线
  pub torso_angle: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PostureAnalysis {
  pub direction: Direction,
  pub landmarks: Landmarks,
  pub head: Assessment<HeadStatus>,
  pub back: Assessment<BackStatus>,
  pub angles: BodyAngles,
  pub severity: Severity,
  pub consult_doctor: bool,
  pub recommendations: Vec<String>,
  pub score: u32,
}

impl PostureAnalysis {
  pub fn has_issue(&self) -> bool {
    self.consult_doctor
  }

  pub fn overall_status(&self) -> &'static str {
    if self.has_issue() {
      "POSTURE ISSUES DETECTED"
    } else {
      "HEALTHY POSTURE"
    }
  }
}

/// 向量与竖直向上方向 (0, -1) 的夹角
fn angle_from_vertical(from: Point, to: Point) -> f32 {
  let (dx, dy) = (to.x - from.x, to.y - from.y);
  let norm = (dx * dx + dy * dy).sqrt();
  let cos = (-dy / (norm + ANGLE_EPSILON)).clamp(-1.0, 1.0);
  cos.acos().to_degrees()
}

fn round_tenth(v: f32) -> f32 {
  (v * 10.0).round() / 10.0
}

#[derive(Debug, Clone, Default)]
pub struct PostureAnalyzer {
  thresholds: PostureThresholds,
}

impl PostureAnalyzer {
  pub fn new(thresholds: PostureThresholds) -> Self {
    Self { thresholds }
  }

  fn to_cm(&self, deviation: f32, torso: f32) -> f32 {
    round_tenth(deviation / torso * self.thresholds.reference_torso_cm)
  }

  pub fn assess(&self, pose: &PoseItem) -> PostureAnalysis {
    let t = &self.thresholds;
    let landmarks = Landmarks::from_pose(pose);
    let direction = Direction::of(&landmarks);
    let coef = direction.coefficient();
    let torso = landmarks.torso_height();

    let head_deviation = (landmarks.ear.x - landmarks.shoulder.x) * coef;
    let head_status = if head_deviation > torso * t.forward_head_ratio {
      HeadStatus::Forward
    } else if head_deviation < -(torso * t.backward_head_ratio) {
      HeadStatus::Backward
    } else {
      HeadStatus::Normal
    };

    let back_deviation = (landmarks.shoulder.x - landmarks.hip.x) * coef;
    let back_status = if back_deviation > torso * t.kyphosis_ratio {
      BackStatus::Kyphosis
    } else {
      BackStatus::Aligned
    };

    let angles = BodyAngles {
      neck_angle: angle_from_vertical(landmarks.shoulder, landmarks.ear),
      torso_angle: angle_from_vertical(landmarks.hip, landmarks.shoulder),
    };

    let head_issue = head_status != HeadStatus::Normal;
    let back_issue = back_status == BackStatus::Kyphosis;
    let consult_doctor = head_issue || back_issue;

    let mut recommendations: Vec<String> = Vec::new();
    if consult_doctor {
      if head_status == HeadStatus::Forward {
        recommendations
          .push("⚠️ Forward head posture detected. Consider neck strengthening exercises.".into());
        recommendations.push("💡 Adjust screen height to eye level.".into());
      }
      if back_issue {
        recommendations
          .push("⚠️ Slouching detected. Focus on back strengthening and stretching.".into());
        recommendations.push("💡 Practice proper sitting posture with back support.".into());
      }
      recommendations.push("🏥 Consult a physical therapist for personalized treatment.".into());
    } else {
      recommendations
        .push("✅ Healthy posture detected. Keep maintaining good posture habits!".into());
    }

    let mut penalty = 0;
    if head_issue {
      penalty += t.head_penalty;
    }
    if back_issue {
      penalty += t.back_penalty;
    }

    info!(
      "朝向 {}，头部 {}，背部 {}",
      direction.as_str(),
      head_status.as_str(),
      back_status.as_str()
    );

    PostureAnalysis {
      direction,
      landmarks,
      head: Assessment {
        status: head_status,
        deviation: head_deviation,
        deviation_cm: self.to_cm(head_deviation, torso),
      },
      back: Assessment {
        status: back_status,
        deviation: back_deviation,
        deviation_cm: self.to_cm(back_deviation, torso),
      },
      angles,
      severity: if consult_doctor {
        Severity::Moderate
      } else {
        Severity::Normal
      },
      consult_doctor,
      recommendations,
      score: 100u32.saturating_sub(penalty),
    }
  }
}

impl Analyze<PoseResult> for PostureAnalyzer {
  type Report = PostureAnalysis;

  fn analyze(&self, detections: &PoseResult) -> Result<Self::Report, AnalysisError> {
    let pose = detections.best().ok_or_else(|| {
      warn!("图像中没有检测到人");
      AnalysisError::NoPerson
    })?;
    Ok(self.assess(pose))
  }
}
