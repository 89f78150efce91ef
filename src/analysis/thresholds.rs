// 该文件是 Jizhu （脊柱） 项目的一部分。
// src/analysis/thresholds.rs - 判定阈值
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

use clap::ValueEnum;

use crate::analysis::geometry::ImageType;

/// 阈值档位
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum Profile {
  /// 严格：只标记明显异常，适合给终端用户的 JSON 报告
  #[default]
  Strict,
  /// 敏感：更早标记可疑椎骨，适合医生复核的批量报告
  Sensitive,
}

/// 按视图区分的一对阈值
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PerView {
  pub ap: f32,
  pub lateral: f32,
}

impl PerView {
  pub fn get(&self, view: ImageType) -> f32 {
    match view {
      ImageType::Ap => self.ap,
      ImageType::Lateral => self.lateral,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpineThresholds {
  /// 少于该数量的椎骨不做分析
  pub min_vertebrae: usize,
  /// 宽高比均值超过该值判定为正位片
  pub ap_aspect_ratio: f32,
  /// 高度低于参考高度的该比例判定为压缩性骨折
  pub fracture_ratio: f32,
  /// 首末椎骨是否以全体平均高度为参考参与骨折判定
  pub fracture_check_ends: bool,
  /// 中心偏离相邻椎骨中点超过宽度的该比例判定为滑脱
  pub listhesis_tolerance: PerView,
  /// 椎间隙小于相邻平均高度的该比例判定为椎间盘突出
  pub herniation_limit: PerView,
  /// 正位片 Cobb 角超过该值判定为侧弯
  pub scoliosis_angle: f32,
  /// 侧位片角度低于该值判定为前凸变平
  pub hypolordosis_angle: f32,
  /// 侧位片角度高于该值判定为前凸过度
  pub hyperlordosis_angle: f32,
  /// 风险等级：高风险角度
  pub high_risk_angle: f32,
  /// 风险等级：高风险所需的异常数量（严格大于）
  pub high_risk_findings: u32,
}

impl SpineThresholds {
  pub fn for_profile(profile: Profile) -> Self {
    match profile {
      Profile::Strict => Self::strict(),
      Profile::Sensitive => Self::sensitive(),
    }
  }

  pub fn strict() -> Self {
    Self {
      min_vertebrae: 3,
      ap_aspect_ratio: 1.35,
      fracture_ratio: 0.60,
      fracture_check_ends: false,
      listhesis_tolerance: PerView {
        ap: 0.35,
        lateral: 0.40,
      },
      herniation_limit: PerView {
        ap: 0.06,
        lateral: 0.08,
      },
      scoliosis_angle: 10.0,
      hypolordosis_angle: 20.0,
      hyperlordosis_angle: 60.0,
      high_risk_angle: 25.0,
      high_risk_findings: 2,
    }
  }

  pub fn sensitive() -> Self {
    Self {
      fracture_ratio: 0.70,
      fracture_check_ends: true,
      listhesis_tolerance: PerView {
        ap: 0.25,
        lateral: 0.30,
      },
      herniation_limit: PerView {
        ap: 0.09,
        lateral: 0.13,
      },
      ..Self::strict()
    }
  }
}

impl Default for SpineThresholds {
  fn default() -> Self {
    Self::strict()
  }
}

/// 姿态阈值均以躯干高度为单位
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PostureThresholds {
  pub forward_head_ratio: f32,
  pub backward_head_ratio: f32,
  pub kyphosis_ratio: f32,
  /// 假定的平均躯干长度（厘米），用于把偏移换算成参考厘米
  pub reference_torso_cm: f32,
  pub head_penalty: u32,
  pub back_penalty: u32,
}

impl Default for PostureThresholds {
  fn default() -> Self {
    Self {
      forward_head_ratio: 0.15,
      backward_head_ratio: 0.10,
      kyphosis_ratio: 0.12,
      reference_torso_cm: 50.0,
      head_penalty: 25,
      back_penalty: 30,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn sensitive_profile_is_looser_everywhere() {
    let strict = SpineThresholds::for_profile(Profile::Strict);
    let sensitive = SpineThresholds::for_profile(Profile::Sensitive);

    assert!(sensitive.fracture_ratio > strict.fracture_ratio);
    assert!(sensitive.listhesis_tolerance.ap < strict.listhesis_tolerance.ap);
    assert!(sensitive.herniation_limit.lateral > strict.herniation_limit.lateral);
    assert!(sensitive.fracture_check_ends && !strict.fracture_check_ends);
    assert_eq!(sensitive.scoliosis_angle, strict.scoliosis_angle);
  }

  #[test]
  fn per_view_lookup() {
    let limit = SpineThresholds::strict().herniation_limit;
    assert_eq!(limit.get(ImageType::Ap), 0.06);
    assert_eq!(limit.get(ImageType::Lateral), 0.08);
  }
}
