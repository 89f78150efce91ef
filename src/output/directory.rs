// 该文件是 Jizhu （脊柱） 项目的一部分。
// src/output/directory.rs - 目录输出
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

//! `folder://<dir>?prefix=Analysis_&record&json`
//!
//! * 标注图保存为 `<dir>/<prefix><name>`；
//! * `record`：检测记录写为 `<dir>/<stem>.txt`，可直接用 `record://<dir>` 回放；
//! * `json`：报告写为 `<dir>/<prefix><stem>.json`。

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use crate::{
  FOLDER_SCHEME, FromUrl, FromUrlWithScheme,
  frame::ImageFrame,
  model::write_record,
  output::{Render, Renderable, draw::Draw},
  report::ErrorReport,
  url_path,
};

const DEFAULT_PREFIX: &str = "Analysis_";

#[derive(Error, Debug)]
pub enum DirectoryOutputError {
  #[error("Unexpected URI scheme: {0}")]
  SchemeMismatch(String),
  #[error("Image error: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("I/O error: {0}")]
  IoError(#[from] std::io::Error),
  #[error("JSON error: {0}")]
  JsonError(#[from] serde_json::Error),
}

pub struct DirectoryOutput {
  directory: PathBuf,
  prefix: String,
  record: bool,
  json: bool,
  draw: Draw,
}

impl FromUrlWithScheme for DirectoryOutput {
  const SCHEME: &'static str = FOLDER_SCHEME;
}

impl FromUrl for DirectoryOutput {
  type Error = DirectoryOutputError;

  fn from_url(uri: &Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(DirectoryOutputError::SchemeMismatch(
        uri.scheme().to_string(),
      ));
    }

    let prefix = uri
      .query_pairs()
      .find(|(k, _)| k == "prefix")
      .map(|(_, v)| v.into_owned())
      .unwrap_or_else(|| DEFAULT_PREFIX.to_string());
    let record = uri.query_pairs().any(|(k, _)| k == "record");
    let json = uri.query_pairs().any(|(k, _)| k == "json");

    let directory = url_path(uri);
    std::fs::create_dir_all(&directory)?;
    info!(
      "输出目录: {} (prefix = {:?}, record = {}, json = {})",
      directory.display(),
      prefix,
      record,
      json
    );

    Ok(DirectoryOutput {
      directory,
      prefix,
      record,
      json,
      draw: Draw::with_system_font(),
    })
  }
}

impl DirectoryOutput {
  pub fn with_draw(self, draw: Draw) -> Self {
    Self { draw, ..self }
  }

  fn image_path(&self, frame: &ImageFrame) -> PathBuf {
    self
      .directory
      .join(format!("{}{}", self.prefix, frame.name()))
  }

  fn report_path(&self, image: &str) -> PathBuf {
    let stem = Path::new(image)
      .file_stem()
      .map(|s| s.to_string_lossy().into_owned())
      .unwrap_or_else(|| "frame".to_string());
    self
      .directory
      .join(format!("{}{}.json", self.prefix, stem))
  }
}

impl<R: Renderable> Render<ImageFrame, R> for DirectoryOutput {
  type Error = DirectoryOutputError;

  fn render_result(&self, frame: &ImageFrame, result: &R) -> Result<(), Self::Error> {
    let path = self.image_path(frame);
    result.annotate(&self.draw, frame).save(&path)?;
    debug!("保存标注图像: {}", path.display());

    if self.record {
      write_record(result.detections(), &self.directory.join(frame.name()))?;
    }

    if self.json {
      let report = serde_json::to_string_pretty(&result.report(&frame.name()))?;
      std::fs::write(self.report_path(&frame.name()), report)?;
    }

    Ok(())
  }

  /// 失败的图像没有标注图，只在开启 json 时写出错误报告
  fn render_error(&self, report: &ErrorReport) -> Result<(), Self::Error> {
    let Some(image) = report.image.as_deref().filter(|_| self.json) else {
      return Ok(());
    };
    let path = self.report_path(image);
    std::fs::write(&path, serde_json::to_string_pretty(report)?)?;
    debug!("保存错误报告: {}", path.display());
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    analysis::{Analyze, Analyzed, PostureAnalyzer},
    model::{CocoKeypoint, KEYPOINT_COUNT, Keypoint, PoseItem, PoseResult},
    path_url,
  };
  use image::RgbImage;

  fn posture_result() -> Analyzed<PoseResult, crate::analysis::PostureAnalysis> {
    let mut keypoints = [Keypoint::default(); KEYPOINT_COUNT];
    for (k, x, y) in [
      (CocoKeypoint::Nose, 130.0, 40.0),
      (CocoKeypoint::LeftEar, 110.0, 50.0),
      (CocoKeypoint::RightEar, 110.0, 50.0),
      (CocoKeypoint::LeftShoulder, 100.0, 100.0),
      (CocoKeypoint::RightShoulder, 100.0, 100.0),
      (CocoKeypoint::LeftHip, 100.0, 200.0),
      (CocoKeypoint::RightHip, 100.0, 200.0),
    ] {
      keypoints[k as usize] = Keypoint {
        x,
        y,
        visibility: 1.0,
      };
    }
    let detections = PoseResult::from(vec![PoseItem {
      score: 0.9,
      bbox: [50.0, 20.0, 200.0, 280.0],
      keypoints,
    }]);
    let analysis = PostureAnalyzer::default().analyze(&detections).unwrap();
    Analyzed {
      detections,
      analysis,
    }
  }

  #[test]
  fn query_options_are_parsed() {
    let dir = tempfile::tempdir().unwrap();
    let mut url = path_url("folder", &dir.path().join("out")).unwrap();
    url.set_query(Some("prefix=P_&record"));
    let output = DirectoryOutput::from_url(&url).unwrap();

    assert_eq!(output.prefix, "P_");
    assert!(output.record);
    assert!(!output.json);
    assert!(dir.path().join("out").is_dir());
  }

  #[test]
  fn writes_image_record_and_report() {
    let dir = tempfile::tempdir().unwrap();
    let mut url = path_url("folder", dir.path()).unwrap();
    url.set_query(Some("record&json"));
    let output = DirectoryOutput::from_url(&url)
      .unwrap()
      .with_draw(Draw::default());

    let frame = ImageFrame::new("/photos/side.png", RgbImage::new(800, 300));
    output.render_result(&frame, &posture_result()).unwrap();

    assert!(dir.path().join("Analysis_side.png").is_file());
    let record = std::fs::read_to_string(dir.path().join("side.txt")).unwrap();
    assert!(record.starts_with("person, 0.9000"));
    let report: serde_json::Value = serde_json::from_str(
      &std::fs::read_to_string(dir.path().join("Analysis_side.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(report["image"], serde_json::json!("side.png"));
    assert_eq!(report["success"], serde_json::json!(true));
  }

  #[test]
  fn failed_image_gets_error_report() {
    let dir = tempfile::tempdir().unwrap();
    let mut url = path_url("folder", dir.path()).unwrap();
    url.set_query(Some("json"));
    let output = DirectoryOutput::from_url(&url)
      .unwrap()
      .with_draw(Draw::default());

    let failure = ErrorReport::new("No person detected in the image").with_image(Some("empty.png".into()));
    Render::<ImageFrame, Analyzed<PoseResult, crate::analysis::PostureAnalysis>>::render_error(
      &output, &failure,
    )
    .unwrap();
    // 没有文件名时无处可写
    Render::<ImageFrame, Analyzed<PoseResult, crate::analysis::PostureAnalysis>>::render_error(
      &output,
      &ErrorReport::new("unreadable"),
    )
    .unwrap();

    let report: serde_json::Value = serde_json::from_str(
      &std::fs::read_to_string(dir.path().join("Analysis_empty.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(report["success"], serde_json::json!(false));
    assert_eq!(report["error"], serde_json::json!("No person detected in the image"));
    assert!(!dir.path().join("Analysis_empty.png").exists());
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
  }
}
