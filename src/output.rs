// 该文件是 Jizhu （脊柱） 项目的一部分。
// src/output.rs - 输出定义
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

use std::path::Path;

use serde::Serialize;
use thiserror::Error;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  analysis::{Analyzed, PostureAnalysis, SpineAnalysis},
  frame::ImageFrame,
  model::{DetectResult, PoseResult, Recordable},
  report::{ErrorReport, PostureReport, SpineReport},
};

pub trait Render<Frame, Output>: Sized {
  type Error;
  fn render_result(&self, frame: &Frame, result: &Output) -> Result<(), Self::Error>;

  /// 记录一张图像的失败，只有保存 JSON 报告的输出需要
  fn render_error(&self, _report: &ErrorReport) -> Result<(), Self::Error> {
    Ok(())
  }
}

/// 可以输出的分析结果：JSON 报告、检测记录与标注图
pub trait Renderable {
  type Report: Serialize;
  type Detections: Recordable;

  fn report(&self, image: &str) -> Self::Report;
  fn detections(&self) -> &Self::Detections;
  #[cfg(feature = "save_image_file")]
  fn annotate(&self, draw: &draw::Draw, frame: &ImageFrame) -> image::RgbImage;
}

impl Renderable for Analyzed<DetectResult, SpineAnalysis> {
  type Report = SpineReport;
  type Detections = DetectResult;

  fn report(&self, image: &str) -> Self::Report {
    SpineReport::new(image, &self.analysis)
  }

  fn detections(&self) -> &Self::Detections {
    &self.detections
  }

  #[cfg(feature = "save_image_file")]
  fn annotate(&self, draw: &draw::Draw, frame: &ImageFrame) -> image::RgbImage {
    draw.draw_spine(frame.image(), &frame.name(), &self.analysis)
  }
}

impl Renderable for Analyzed<PoseResult, PostureAnalysis> {
  type Report = PostureReport;
  type Detections = PoseResult;

  fn report(&self, image: &str) -> Self::Report {
    PostureReport::new(image, &self.analysis)
  }

  fn detections(&self) -> &Self::Detections {
    &self.detections
  }

  #[cfg(feature = "save_image_file")]
  fn annotate(&self, draw: &draw::Draw, frame: &ImageFrame) -> image::RgbImage {
    draw.draw_posture(frame.image(), &self.analysis)
  }
}

/// 创建输出文件所在的目录
fn ensure_parent(path: &Path) -> Result<(), std::io::Error> {
  if let Some(parent) = path.parent()
    && !parent.as_os_str().is_empty()
  {
    std::fs::create_dir_all(parent)?;
  }
  Ok(())
}

#[cfg(feature = "save_image_file")]
pub mod draw;

#[cfg(feature = "save_image_file")]
mod save_image_file;
#[cfg(feature = "save_image_file")]
pub use self::save_image_file::{SaveImageFileError, SaveImageFileOutput};

#[cfg(feature = "save_image_file")]
mod directory;
#[cfg(feature = "save_image_file")]
pub use self::directory::{DirectoryOutput, DirectoryOutputError};

mod json_file;
pub use self::json_file::{JsonFileOutput, JsonFileOutputError};

#[derive(Error, Debug)]
pub enum OutputError {
  #[cfg(feature = "save_image_file")]
  #[error("{0}")]
  SaveImageFileError(#[from] SaveImageFileError),
  #[cfg(feature = "save_image_file")]
  #[error("{0}")]
  DirectoryOutputError(#[from] DirectoryOutputError),
  #[error("{0}")]
  JsonFileOutputError(#[from] JsonFileOutputError),
  #[cfg(feature = "save_image_file")]
  #[error("{0}")]
  DrawError(#[from] draw::DrawError),
  #[error("Unsupported output scheme: {0}")]
  SchemeMismatch(String),
}

pub enum OutputWrapper {
  #[cfg(feature = "save_image_file")]
  SaveImageFileOutput(SaveImageFileOutput),
  #[cfg(feature = "save_image_file")]
  DirectoryOutput(DirectoryOutput),
  JsonFileOutput(JsonFileOutput),
}

impl FromUrl for OutputWrapper {
  type Error = OutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      #[cfg(feature = "save_image_file")]
      SaveImageFileOutput::SCHEME => {
        let output = SaveImageFileOutput::from_url(url)?;
        Ok(OutputWrapper::SaveImageFileOutput(output))
      }
      #[cfg(feature = "save_image_file")]
      DirectoryOutput::SCHEME => {
        let output = DirectoryOutput::from_url(url)?;
        Ok(OutputWrapper::DirectoryOutput(output))
      }
      JsonFileOutput::SCHEME => {
        let output = JsonFileOutput::from_url(url)?;
        Ok(OutputWrapper::JsonFileOutput(output))
      }
      other => Err(OutputError::SchemeMismatch(other.to_string())),
    }
  }
}

impl OutputWrapper {
  /// 使用指定字体绘制标注文字；未指定时使用系统字体
  #[cfg(feature = "save_image_file")]
  pub fn with_font(self, font: Option<&Path>) -> Result<Self, OutputError> {
    let Some(font) = font else {
      return Ok(self);
    };
    let draw = draw::Draw::with_font_file(font)?;
    Ok(match self {
      OutputWrapper::SaveImageFileOutput(output) => {
        OutputWrapper::SaveImageFileOutput(output.with_draw(draw))
      }
      OutputWrapper::DirectoryOutput(output) => {
        OutputWrapper::DirectoryOutput(output.with_draw(draw))
      }
      other => other,
    })
  }

  #[cfg(not(feature = "save_image_file"))]
  pub fn with_font(self, _font: Option<&Path>) -> Result<Self, OutputError> {
    Ok(self)
  }
}

impl<R: Renderable> Render<ImageFrame, R> for OutputWrapper {
  type Error = OutputError;

  fn render_result(&self, frame: &ImageFrame, result: &R) -> Result<(), Self::Error> {
    match self {
      #[cfg(feature = "save_image_file")]
      OutputWrapper::SaveImageFileOutput(output) => output
        .render_result(frame, result)
        .map_err(OutputError::from),
      #[cfg(feature = "save_image_file")]
      OutputWrapper::DirectoryOutput(output) => output
        .render_result(frame, result)
        .map_err(OutputError::from),
      OutputWrapper::JsonFileOutput(output) => output
        .render_result(frame, result)
        .map_err(OutputError::from),
    }
  }

  fn render_error(&self, report: &ErrorReport) -> Result<(), Self::Error> {
    match self {
      #[cfg(feature = "save_image_file")]
      OutputWrapper::SaveImageFileOutput(_) => Ok(()),
      #[cfg(feature = "save_image_file")]
      OutputWrapper::DirectoryOutput(output) => {
        Render::<ImageFrame, R>::render_error(output, report).map_err(OutputError::from)
      }
      OutputWrapper::JsonFileOutput(output) => {
        Render::<ImageFrame, R>::render_error(output, report).map_err(OutputError::from)
      }
    }
  }
}

/// 未指定输出时什么也不做
impl<F, D, O: Render<F, D>> Render<F, D> for Option<O> {
  type Error = O::Error;

  fn render_result(&self, frame: &F, result: &D) -> Result<(), Self::Error> {
    match self {
      Some(output) => output.render_result(frame, result),
      None => Ok(()),
    }
  }

  fn render_error(&self, report: &ErrorReport) -> Result<(), Self::Error> {
    match self {
      Some(output) => Render::<F, D>::render_error(output, report),
      None => Ok(()),
    }
  }
}
