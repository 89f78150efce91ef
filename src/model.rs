// 该文件是 Jizhu （脊柱） 项目的一部分。
// src/model.rs - 模型
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

use std::path::PathBuf;

use thiserror::Error;
use tracing::warn;
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, frame::ImageFrame};
#[cfg(not(feature = "model_onnx"))]
use crate::{YOLO_POSE_SCHEME, YOLO_SCHEME, url_path};

pub trait Model {
  type Input;
  type Output;
  type Error;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error>;
}

/// 椎骨检测的默认置信度阈值
pub const VERTEBRA_CONFIDENCE: f32 = 0.25;
/// 人体姿态检测的默认置信度阈值
pub const PERSON_CONFIDENCE: f32 = 0.5;
/// NMS 默认 IoU 阈值
pub const NMS_IOU_THRESHOLD: f32 = 0.45;

/// COCO 人体关键点数量
pub const KEYPOINT_COUNT: usize = 17;

#[derive(Debug, Clone, PartialEq)]
pub struct DetectItem {
  pub class_id: u32,
  pub score: f32,
  pub bbox: [f32; 4], // [x_min, y_min, x_max, y_max]，原图像素坐标
}

impl DetectItem {
  pub fn width(&self) -> f32 {
    self.bbox[2] - self.bbox[0]
  }

  pub fn height(&self) -> f32 {
    self.bbox[3] - self.bbox[1]
  }

  pub fn center(&self) -> (f32, f32) {
    (
      (self.bbox[0] + self.bbox[2]) / 2.0,
      (self.bbox[1] + self.bbox[3]) / 2.0,
    )
  }

  pub fn area(&self) -> f32 {
    self.width().max(0.0) * self.height().max(0.0)
  }
}

#[derive(Debug, Clone, Default)]
pub struct DetectResult {
  pub items: Box<[DetectItem]>,
}

impl DetectResult {
  pub fn len(&self) -> usize {
    self.items.len()
  }

  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }
}

impl From<Vec<DetectItem>> for DetectResult {
  fn from(items: Vec<DetectItem>) -> Self {
    Self {
      items: items.into_boxed_slice(),
    }
  }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Keypoint {
  pub x: f32,
  pub y: f32,
  pub visibility: f32,
}

/// COCO 关键点索引
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub enum CocoKeypoint {
  Nose = 0,
  LeftEye = 1,
  RightEye = 2,
  LeftEar = 3,
  RightEar = 4,
  LeftShoulder = 5,
  RightShoulder = 6,
  LeftElbow = 7,
  RightElbow = 8,
  LeftWrist = 9,
  RightWrist = 10,
  LeftHip = 11,
  RightHip = 12,
  LeftKnee = 13,
  RightKnee = 14,
  LeftAnkle = 15,
  RightAnkle = 16,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PoseItem {
  pub score: f32,
  pub bbox: [f32; 4],
  pub keypoints: [Keypoint; KEYPOINT_COUNT],
}

impl PoseItem {
  pub fn keypoint(&self, index: CocoKeypoint) -> Keypoint {
    self.keypoints[index as usize]
  }
}

#[derive(Debug, Clone, Default)]
pub struct PoseResult {
  pub items: Box<[PoseItem]>,
}

impl PoseResult {
  /// 置信度最高的人
  pub fn best(&self) -> Option<&PoseItem> {
    self
      .items
      .iter()
      .max_by(|a, b| a.score.total_cmp(&b.score))
  }

  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }
}

impl From<Vec<PoseItem>> for PoseResult {
  fn from(items: Vec<PoseItem>) -> Self {
    Self {
      items: items.into_boxed_slice(),
    }
  }
}

pub mod postprocess;

mod record;
pub use self::record::{RecordModel, RecordModelError, Recordable, write_record};

#[cfg(feature = "model_onnx")]
mod yolo;
#[cfg(feature = "model_onnx")]
pub use self::yolo::{OnnxModelError, YoloBuilder, YoloDetect, YoloPose};

/// 检测参数，来自命令行
#[derive(Debug, Clone, Copy)]
pub struct DetectOptions {
  pub confidence: f32,
  pub iou_threshold: f32,
}

#[derive(Error, Debug)]
pub enum ModelError {
  #[error("{0}")]
  RecordModelError(#[from] RecordModelError),
  #[cfg(feature = "model_onnx")]
  #[error("{0}")]
  OnnxModelError(#[from] OnnxModelError),
  #[error("Unsupported model scheme: {0}")]
  SchemeMismatch(String),
  #[error("Model file not found: {0}")]
  NotFound(PathBuf),
  #[error("ONNX model support is not enabled in this build (feature 'model_onnx'): {0}")]
  OnnxDisabled(PathBuf),
}

/// 未启用 ONNX 时仍然先检查模型文件是否存在
#[cfg(not(feature = "model_onnx"))]
fn onnx_unavailable(url: &Url) -> ModelError {
  let path = url_path(url);
  if path.is_file() {
    ModelError::OnnxDisabled(path)
  } else {
    ModelError::NotFound(path)
  }
}

/// 按 URI 方案选择椎骨检测模型
pub enum DetectModelWrapper {
  Record(RecordModel<DetectResult>),
  #[cfg(feature = "model_onnx")]
  Yolo(YoloDetect),
}

impl DetectModelWrapper {
  pub fn from_url(url: &Url, options: DetectOptions) -> Result<Self, ModelError> {
    match url.scheme() {
      RecordModel::<DetectResult>::SCHEME => Ok(DetectModelWrapper::Record(
        RecordModel::from_url(url)?.with_confidence(options.confidence),
      )),
      #[cfg(feature = "model_onnx")]
      YoloDetect::SCHEME => Ok(DetectModelWrapper::Yolo(
        YoloBuilder::from_url(url)?.options(options).build_detect()?,
      )),
      #[cfg(not(feature = "model_onnx"))]
      YOLO_SCHEME | YOLO_POSE_SCHEME => Err(onnx_unavailable(url)),
      other => Err(ModelError::SchemeMismatch(other.to_string())),
    }
  }
}

impl Model for DetectModelWrapper {
  type Input = ImageFrame;
  type Output = DetectResult;
  type Error = ModelError;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    let result = match self {
      DetectModelWrapper::Record(model) => model.infer(input)?,
      #[cfg(feature = "model_onnx")]
      DetectModelWrapper::Yolo(model) => model.infer(input)?,
    };
    if result.is_empty() {
      warn!("{} 中没有检测到椎骨", input.name());
    }
    Ok(result)
  }
}

/// 按 URI 方案选择姿态模型
pub enum PoseModelWrapper {
  Record(RecordModel<PoseResult>),
  #[cfg(feature = "model_onnx")]
  Yolo(YoloPose),
}

impl PoseModelWrapper {
  pub fn from_url(url: &Url, options: DetectOptions) -> Result<Self, ModelError> {
    match url.scheme() {
      RecordModel::<PoseResult>::SCHEME => Ok(PoseModelWrapper::Record(
        RecordModel::from_url(url)?.with_confidence(options.confidence),
      )),
      #[cfg(feature = "model_onnx")]
      YoloPose::SCHEME => Ok(PoseModelWrapper::Yolo(
        YoloBuilder::from_url(url)?.options(options).build_pose()?,
      )),
      #[cfg(not(feature = "model_onnx"))]
      YOLO_SCHEME | YOLO_POSE_SCHEME => Err(onnx_unavailable(url)),
      other => Err(ModelError::SchemeMismatch(other.to_string())),
    }
  }
}

impl Model for PoseModelWrapper {
  type Input = ImageFrame;
  type Output = PoseResult;
  type Error = ModelError;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    let result = match self {
      PoseModelWrapper::Record(model) => model.infer(input)?,
      #[cfg(feature = "model_onnx")]
      PoseModelWrapper::Yolo(model) => model.infer(input)?,
    };
    if result.is_empty() {
      warn!("{} 中没有检测到人", input.name());
    }
    Ok(result)
  }
}
