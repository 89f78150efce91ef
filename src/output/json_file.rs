// 该文件是 Jizhu （脊柱） 项目的一部分。
// src/output/json_file.rs - 保存 JSON 报告
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

use std::{fs::OpenOptions, io::Write, path::PathBuf};

use serde::Serialize;
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::ImageFrame,
  output::{Render, Renderable, ensure_parent},
  report::ErrorReport,
  url_path,
};

#[derive(Error, Debug)]
pub enum JsonFileOutputError {
  #[error("Unexpected URI scheme: {0}")]
  SchemeMismatch(String),
  #[error("I/O error: {0}")]
  IoError(#[from] std::io::Error),
  #[error("JSON error: {0}")]
  JsonError(#[from] serde_json::Error),
}

/// 每帧一行报告（JSON Lines），打开时清空已有文件
pub struct JsonFileOutput {
  path: PathBuf,
}

impl FromUrlWithScheme for JsonFileOutput {
  const SCHEME: &'static str = "json";
}

impl FromUrl for JsonFileOutput {
  type Error = JsonFileOutputError;

  fn from_url(uri: &Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(JsonFileOutputError::SchemeMismatch(uri.scheme().to_string()));
    }

    let path = url_path(uri);
    ensure_parent(&path)?;
    std::fs::File::create(&path)?;

    Ok(JsonFileOutput { path })
  }
}

impl JsonFileOutput {
  fn append<T: Serialize>(&self, value: &T) -> Result<(), JsonFileOutputError> {
    let mut line = serde_json::to_string(value)?;
    line.push('\n');

    let mut file = OpenOptions::new().append(true).open(&self.path)?;
    file.write_all(line.as_bytes())?;
    debug!("追加报告到 {}", self.path.display());
    Ok(())
  }
}

impl<R: Renderable> Render<ImageFrame, R> for JsonFileOutput {
  type Error = JsonFileOutputError;

  fn render_result(&self, frame: &ImageFrame, result: &R) -> Result<(), Self::Error> {
    self.append(&result.report(&frame.name()))
  }

  fn render_error(&self, report: &ErrorReport) -> Result<(), Self::Error> {
    self.append(report)
  }
}
