// 该文件是 Jizhu （脊柱） 项目的一部分。
// src/analysis.rs - 几何分析
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
use thiserror::Error;
use tracing::debug;

use crate::{
  frame::ImageFrame,
  model::{Model, ModelError},
};

pub mod geometry;
pub mod posture;
pub mod spine;
pub mod thresholds;

pub use self::posture::{PostureAnalysis, PostureAnalyzer};
pub use self::spine::{SpineAnalysis, SpineAnalyzer};
pub use self::thresholds::{PostureThresholds, Profile, SpineThresholds};

#[derive(Error, Debug, PartialEq)]
pub enum AnalysisError {
  #[error(
    "⚠️ Insufficient vertebrae detected. This appears to be a POSTURE PHOTO. Please use 'Posture Photo Analysis' instead of 'Spine X-Ray Analysis'."
  )]
  InsufficientVertebrae(usize),
  #[error("No person detected in the image")]
  NoPerson,
}

/// 严重程度，脊柱与姿态报告共用
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
  Normal,
  Mild,
  Moderate,
  Critical,
}

/// 对检测结果做几何规则判定
pub trait Analyze<D> {
  type Report;

  fn analyze(&self, detections: &D) -> Result<Self::Report, AnalysisError>;
}

/// 检测结果与其分析
#[derive(Debug, Clone)]
pub struct Analyzed<D, R> {
  pub detections: D,
  pub analysis: R,
}

#[derive(Error, Debug)]
pub enum PipelineError {
  #[error("{0}")]
  ModelError(#[from] ModelError),
  #[error("{0}")]
  AnalysisError(#[from] AnalysisError),
}

/// 检测模型 + 分析器，整体作为一个模型交给任务执行
pub struct AnalysisPipeline<M, A> {
  model: M,
  analyzer: A,
}

impl<M, A> AnalysisPipeline<M, A> {
  pub fn new(model: M, analyzer: A) -> Self {
    Self { model, analyzer }
  }
}

impl<M, A> Model for AnalysisPipeline<M, A>
where
  M: Model<Input = ImageFrame, Error = ModelError>,
  A: Analyze<M::Output>,
{
  type Input = ImageFrame;
  type Output = Analyzed<M::Output, A::Report>;
  type Error = PipelineError;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    let detections = self.model.infer(input)?;
    debug!("检测完成，开始几何分析: {}", input.name());
    let analysis = self.analyzer.analyze(&detections)?;
    Ok(Analyzed {
      detections,
      analysis,
    })
  }
}
