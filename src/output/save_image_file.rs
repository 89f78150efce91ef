// 该文件是 Jizhu （脊柱） 项目的一部分。
// src/output/save_image_file.rs - 保存标注图像
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
use tracing::info;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme, IMAGE_SCHEME,
  frame::ImageFrame,
  output::{Render, Renderable, draw::Draw, ensure_parent},
  url_path,
};

pub struct SaveImageFileOutput {
  path: PathBuf,
  draw: Draw,
}

#[derive(Error, Debug)]
pub enum SaveImageFileError {
  #[error("I/O error: {0}")]
  IoError(#[from] std::io::Error),
  #[error("Image error: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("Unexpected URI scheme: {0}")]
  SchemeMismatch(String),
}

impl FromUrlWithScheme for SaveImageFileOutput {
  const SCHEME: &'static str = IMAGE_SCHEME;
}

impl FromUrl for SaveImageFileOutput {
  type Error = SaveImageFileError;

  fn from_url(uri: &Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(SaveImageFileError::SchemeMismatch(format!(
        "expected '{}', got '{}'",
        Self::SCHEME,
        uri.scheme()
      )));
    }

    Ok(SaveImageFileOutput {
      path: url_path(uri),
      draw: Draw::with_system_font(),
    })
  }
}

impl SaveImageFileOutput {
  pub fn with_draw(self, draw: Draw) -> Self {
    Self { draw, ..self }
  }

  fn save_image(&self, image: image::RgbImage) -> Result<(), SaveImageFileError> {
    ensure_parent(&self.path)?;
    image.save(&self.path)?;
    info!("保存标注图像到文件: {}", self.path.display());
    Ok(())
  }
}

impl<R: Renderable> Render<ImageFrame, R> for SaveImageFileOutput {
  type Error = SaveImageFileError;

  fn render_result(&self, frame: &ImageFrame, result: &R) -> Result<(), Self::Error> {
    let image = result.annotate(&self.draw, frame);
    self.save_image(image)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    analysis::{Analyze, Analyzed, SpineAnalyzer},
    model::{DetectItem, DetectResult},
    path_url,
  };
  use image::RgbImage;

  #[test]
  fn saves_annotated_image_into_new_directory() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("nested").join("out.png");
    let output = SaveImageFileOutput::from_url(&path_url("image", &target).unwrap())
      .unwrap()
      .with_draw(Draw::default());

    let detections = DetectResult::from(
      (0..4)
        .map(|i| {
          let y = 20.0 + i as f32 * 50.0;
          DetectItem {
            class_id: 0,
            score: 0.9,
            bbox: [100.0, y, 150.0, y + 40.0],
          }
        })
        .collect::<Vec<_>>(),
    );
    let analysis = SpineAnalyzer::default().analyze(&detections).unwrap();
    let result = Analyzed {
      detections,
      analysis,
    };
    let frame = ImageFrame::new("xray.png", RgbImage::new(300, 260));

    output.render_result(&frame, &result).unwrap();

    let saved = image::open(&target).unwrap();
    // 右侧追加了报告面板
    assert!(saved.width() > 300);
    assert_eq!(saved.height(), 260);
  }

  #[test]
  fn rejects_other_scheme() {
    let url = Url::parse("folder:///tmp/out").unwrap();
    assert!(matches!(
      SaveImageFileOutput::from_url(&url),
      Err(SaveImageFileError::SchemeMismatch(_))
    ));
  }
}
