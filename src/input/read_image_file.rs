// 该文件是 Jizhu （脊柱） 项目的一部分。
// src/input/read_image_file.rs - 图像文件输入
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

use std::path::{Path, PathBuf};

use image::ImageReader;
use thiserror::Error;
use tracing::{debug, error};
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, IMAGE_SCHEME, frame::ImageFrame, url_path};

#[derive(Error, Debug)]
pub enum ImageFileInputError {
  #[error("URI schema mismatch: expected 'image', found '{0}'")]
  SchemaMismatch(String),
  #[error("Image file not found: {0}")]
  NotFound(PathBuf),
  #[error("I/O error: {0}")]
  IoError(#[from] std::io::Error),
  #[error("Image loading error: {0}")]
  ImageLoadError(#[from] image::ImageError),
}

/// 读取并解码一张图像
pub fn load_image_frame(path: &Path) -> Result<ImageFrame, ImageFileInputError> {
  if !path.exists() {
    return Err(ImageFileInputError::NotFound(path.to_path_buf()));
  }

  let image = ImageReader::open(path)?.with_guessed_format()?.decode()?;
  debug!(
    "已解码图像 {}: {}x{}",
    path.display(),
    image.width(),
    image.height()
  );
  Ok(ImageFrame::new(path, image.into_rgb8()))
}

/// 单张图像输入，迭代一次后耗尽
pub struct ImageFileInput {
  path: PathBuf,
  done: bool,
}

impl FromUrlWithScheme for ImageFileInput {
  const SCHEME: &'static str = IMAGE_SCHEME;
}

impl FromUrl for ImageFileInput {
  type Error = ImageFileInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(ImageFileInputError::SchemaMismatch(url.scheme().to_string()));
    }

    let path = url_path(url);
    if !path.is_file() {
      return Err(ImageFileInputError::NotFound(path));
    }

    Ok(ImageFileInput { path, done: false })
  }
}

impl ImageFileInput {
  pub fn path(&self) -> &Path {
    &self.path
  }
}

impl Iterator for ImageFileInput {
  type Item = Result<ImageFrame, ImageFileInputError>;

  fn next(&mut self) -> Option<Self::Item> {
    if self.done {
      return None;
    }
    self.done = true;
    Some(load_image_frame(&self.path))
  }
}
