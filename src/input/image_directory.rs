// 该文件是 Jizhu （脊柱） 项目的一部分。
// src/input/image_directory.rs - 目录批量图像输入
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

use std::{collections::VecDeque, path::PathBuf};

use thiserror::Error;
use tracing::info;
use url::Url;

use super::read_image_file::{ImageFileInputError, load_image_frame};
use crate::{FOLDER_SCHEME, FromUrl, FromUrlWithScheme, frame::ImageFrame, url_path};

const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

#[derive(Error, Debug)]
pub enum ImageDirectoryInputError {
  #[error("URI schema mismatch: expected 'folder', found '{0}'")]
  SchemaMismatch(String),
  #[error("Input directory not found: {0}")]
  NotFound(PathBuf),
  #[error("No images found in {0}")]
  Empty(PathBuf),
  #[error("I/O error: {0}")]
  IoError(#[from] std::io::Error),
  #[error("{0}")]
  ImageFileInputError(#[from] ImageFileInputError),
}

/// 目录输入：按文件名顺序逐张读取 jpg/jpeg/png
pub struct ImageDirectoryInput {
  pending: VecDeque<PathBuf>,
}

impl FromUrlWithScheme for ImageDirectoryInput {
  const SCHEME: &'static str = FOLDER_SCHEME;
}

impl FromUrl for ImageDirectoryInput {
  type Error = ImageDirectoryInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(ImageDirectoryInputError::SchemaMismatch(
        url.scheme().to_string(),
      ));
    }

    let directory = url_path(url);
    if !directory.is_dir() {
      return Err(ImageDirectoryInputError::NotFound(directory));
    }

    let mut files = Vec::new();
    for entry in std::fs::read_dir(&directory)? {
      let path = entry?.path();
      if path.is_file() && is_image_file(&path) {
        files.push(path);
      }
    }
    files.sort();
    if files.is_empty() {
      return Err(ImageDirectoryInputError::Empty(directory));
    }

    info!("目录 {} 中共有 {} 张图像", directory.display(), files.len());

    Ok(ImageDirectoryInput {
      pending: files.into(),
    })
  }
}

impl ImageDirectoryInput {
  pub fn remaining(&self) -> usize {
    self.pending.len()
  }
}

fn is_image_file(path: &std::path::Path) -> bool {
  path
    .extension()
    .and_then(|e| e.to_str())
    .map(|e| {
      let e = e.to_ascii_lowercase();
      IMAGE_EXTENSIONS.contains(&e.as_str())
    })
    .unwrap_or(false)
}

impl Iterator for ImageDirectoryInput {
  type Item = Result<ImageFrame, ImageDirectoryInputError>;

  fn next(&mut self) -> Option<Self::Item> {
    let path = self.pending.pop_front()?;
    Some(load_image_frame(&path).map_err(ImageDirectoryInputError::from))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::path_url;
  use image::RgbImage;

  #[test]
  fn lists_only_images_in_name_order() {
    let dir = tempfile::tempdir().unwrap();
    RgbImage::new(4, 4).save(dir.path().join("b.PNG")).unwrap();
    RgbImage::new(4, 4).save(dir.path().join("a.png")).unwrap();
    std::fs::write(dir.path().join("notes.txt"), "not an image").unwrap();

    let url = path_url(FOLDER_SCHEME, dir.path()).unwrap();
    let input = ImageDirectoryInput::from_url(&url).unwrap();
    assert_eq!(input.remaining(), 2);

    let names: Vec<String> = input.map(|f| f.unwrap().name()).collect();
    assert_eq!(names, vec!["a.png".to_string(), "b.PNG".to_string()]);
  }

  #[test]
  fn directory_without_images_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("a.txt"), "0, 0.9, 1, 2, 3, 4").unwrap();

    let url = path_url(FOLDER_SCHEME, dir.path()).unwrap();
    let err = ImageDirectoryInput::from_url(&url).err().unwrap();
    assert!(matches!(err, ImageDirectoryInputError::Empty(_)));
    assert_eq!(
      err.to_string(),
      format!("No images found in {}", dir.path().display())
    );
  }

  #[test]
  fn broken_image_fails_only_its_own_item() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("0-broken.jpg"), b"garbage").unwrap();
    RgbImage::new(4, 4).save(dir.path().join("1-ok.png")).unwrap();

    let url = path_url(FOLDER_SCHEME, dir.path()).unwrap();
    let results: Vec<_> = ImageDirectoryInput::from_url(&url).unwrap().collect();
    assert_eq!(results.len(), 2);
    assert!(results[0].is_err());
    assert!(results[1].is_ok());
  }
}
