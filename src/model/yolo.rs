// 该文件是 Jizhu （脊柱） 项目的一部分。
// src/model/yolo.rs - ONNX Runtime 上的 YOLO 检测/姿态模型
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

use std::{path::PathBuf, sync::Mutex};

use ndarray::Array4;
use ort::{
  session::{Session, builder::GraphOptimizationLevel},
  value::Tensor,
};
use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme, YOLO_POSE_SCHEME, YOLO_SCHEME,
  frame::{ImageFrame, RgbNchwFrame},
  model::{
    DetectOptions, DetectResult, Model, NMS_IOU_THRESHOLD, PoseResult, VERTEBRA_CONFIDENCE,
    postprocess::{HeadOutput, POSE_CHANNELS, decode_boxes, decode_poses, nms_boxes, nms_poses},
  },
  url_path,
};

const YOLO_INPUT_W: u32 = 640;
const YOLO_INPUT_H: u32 = 640;

type YoloInput = RgbNchwFrame<YOLO_INPUT_W, YOLO_INPUT_H>;

#[derive(Error, Debug)]
pub enum OnnxModelError {
  #[error("Model file not found: {0}")]
  NotFound(PathBuf),
  #[error("Model path must use the 'yolo' or 'yolo-pose' scheme, found '{0}'")]
  SchemeMismatch(String),
  #[error("ONNX Runtime error: {0}")]
  Ort(String),
  #[error("Unexpected model output shape: {0:?}")]
  OutputShape(Vec<usize>),
  #[error("Model session lock poisoned")]
  Poisoned,
}

fn ort_error(e: impl std::fmt::Display) -> OnnxModelError {
  OnnxModelError::Ort(e.to_string())
}

pub struct YoloBuilder {
  model_path: PathBuf,
  options: DetectOptions,
}

impl FromUrl for YoloBuilder {
  type Error = OnnxModelError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != YOLO_SCHEME && url.scheme() != YOLO_POSE_SCHEME {
      return Err(OnnxModelError::SchemeMismatch(url.scheme().to_string()));
    }

    let model_path = url_path(url);
    if !model_path.is_file() {
      return Err(OnnxModelError::NotFound(model_path));
    }

    Ok(YoloBuilder {
      model_path,
      options: DetectOptions {
        confidence: VERTEBRA_CONFIDENCE,
        iou_threshold: NMS_IOU_THRESHOLD,
      },
    })
  }
}

impl YoloBuilder {
  pub fn options(mut self, options: DetectOptions) -> Self {
    self.options = options;
    self
  }

  fn build_session(&self) -> Result<YoloSession, OnnxModelError> {
    info!("加载模型文件: {}", self.model_path.display());
    let session = Session::builder()
      .map_err(ort_error)?
      .with_optimization_level(GraphOptimizationLevel::Level3)
      .map_err(ort_error)?
      .commit_from_file(&self.model_path)
      .map_err(ort_error)?;

    for input in session.inputs.iter() {
      debug!("模型输入: {}", input.name);
    }
    for output in session.outputs.iter() {
      debug!("模型输出: {}", output.name);
    }
    info!("模型加载完成");

    Ok(YoloSession {
      session: Mutex::new(session),
      options: self.options,
    })
  }

  pub fn build_detect(self) -> Result<YoloDetect, OnnxModelError> {
    Ok(YoloDetect {
      inner: self.build_session()?,
    })
  }

  pub fn build_pose(self) -> Result<YoloPose, OnnxModelError> {
    Ok(YoloPose {
      inner: self.build_session()?,
    })
  }
}

struct YoloSession {
  session: Mutex<Session>,
  options: DetectOptions,
}

/// 推理得到的原始输出，已整理为通道优先
struct RawHead {
  data: Vec<f32>,
  channels: usize,
  anchors: usize,
  scale: (f32, f32),
}

impl YoloSession {
  fn run(&self, frame: &ImageFrame) -> Result<RawHead, OnnxModelError> {
    let input = YoloInput::from(frame);
    let scale = YoloInput::scale_from(frame);
    let [n, c, h, w] = input.shape();
    let array = Array4::from_shape_vec((n, c, h, w), input.into_vec()).map_err(ort_error)?;
    let tensor = Tensor::from_array(array).map_err(ort_error)?;

    debug!("执行模型推理");
    let mut session = self.session.lock().map_err(|_| OnnxModelError::Poisoned)?;
    let outputs = session.run(ort::inputs![tensor]).map_err(ort_error)?;
    let output = outputs[0].try_extract_array::<f32>().map_err(ort_error)?;

    let shape = output.shape().to_vec();
    if shape.len() != 3 || shape[0] != 1 {
      error!("模型输出形状异常: {:?}", shape);
      return Err(OnnxModelError::OutputShape(shape));
    }

    let flat: Vec<f32> = output.iter().copied().collect();
    // 导出格式可能是 [1, C, N] 或 [1, N, C]，锚点数总是远大于通道数
    let (channels, anchors, data) = if shape[1] <= shape[2] {
      (shape[1], shape[2], flat)
    } else {
      (shape[2], shape[1], transpose(&flat, shape[1], shape[2]))
    };
    debug!("模型输出: {} 通道 x {} 锚点", channels, anchors);

    Ok(RawHead {
      data,
      channels,
      anchors,
      scale,
    })
  }
}

fn transpose(data: &[f32], rows: usize, cols: usize) -> Vec<f32> {
  let mut out = vec![0.0; data.len()];
  for r in 0..rows {
    for c in 0..cols {
      out[c * rows + r] = data[r * cols + c];
    }
  }
  out
}

/// 椎骨检测模型
pub struct YoloDetect {
  inner: YoloSession,
}

impl FromUrlWithScheme for YoloDetect {
  const SCHEME: &'static str = YOLO_SCHEME;
}

impl FromUrl for YoloDetect {
  type Error = OnnxModelError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    YoloBuilder::from_url(url)?.build_detect()
  }
}

impl Model for YoloDetect {
  type Input = ImageFrame;
  type Output = DetectResult;
  type Error = OnnxModelError;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    let raw = self.inner.run(input)?;
    let head = HeadOutput::new(&raw.data, raw.channels, raw.anchors)
      .ok_or_else(|| OnnxModelError::OutputShape(vec![1, raw.channels, raw.anchors]))?;

    let options = self.inner.options;
    let items = decode_boxes(&head, options.confidence, raw.scale);
    let items = nms_boxes(items, options.iou_threshold);
    info!("检测到 {} 个椎骨", items.len());
    Ok(DetectResult::from(items))
  }
}

/// 人体姿态模型
pub struct YoloPose {
  inner: YoloSession,
}

impl FromUrlWithScheme for YoloPose {
  const SCHEME: &'static str = YOLO_POSE_SCHEME;
}

impl FromUrl for YoloPose {
  type Error = OnnxModelError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    YoloBuilder::from_url(url)?.build_pose()
  }
}

impl Model for YoloPose {
  type Input = ImageFrame;
  type Output = PoseResult;
  type Error = OnnxModelError;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    let raw = self.inner.run(input)?;
    if raw.channels != POSE_CHANNELS {
      return Err(OnnxModelError::OutputShape(vec![1, raw.channels, raw.anchors]));
    }
    let head = HeadOutput::new(&raw.data, raw.channels, raw.anchors)
      .ok_or_else(|| OnnxModelError::OutputShape(vec![1, raw.channels, raw.anchors]))?;

    let options = self.inner.options;
    let items = decode_poses(&head, options.confidence, raw.scale);
    let items = nms_poses(items, options.iou_threshold);
    info!("检测到 {} 个人", items.len());
    Ok(PoseResult::from(items))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn transpose_swaps_axes() {
    // 2 个锚点 x 3 个通道
    let data = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
    assert_eq!(transpose(&data, 2, 3), vec![1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);
  }

  #[test]
  fn missing_model_file() {
    let url = Url::parse("yolo:///no/such/best.onnx").unwrap();
    assert!(matches!(
      YoloBuilder::from_url(&url),
      Err(OnnxModelError::NotFound(_))
    ));
  }
}
