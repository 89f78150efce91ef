// 该文件是 Jizhu （脊柱） 项目的一部分。
// src/lib.rs - 库主文件
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

use url::Url;

pub mod analysis;
pub mod cli;
pub mod frame;
pub mod input;
pub mod model;
pub mod output;
pub mod report;
pub mod task;

pub trait FromUrl {
  type Error;
  fn from_url(url: &url::Url) -> Result<Self, Self::Error>
  where
    Self: Sized;
}

pub trait FromUrlWithScheme: FromUrl {
  const SCHEME: &'static str;
}

/// 目录来源/输出使用的 URI 方案
pub const FOLDER_SCHEME: &str = "folder";
/// 单张图像来源/输出使用的 URI 方案
pub const IMAGE_SCHEME: &str = "image";
/// 检测记录回放
pub const RECORD_SCHEME: &str = "record";
/// ONNX 检测模型
pub const YOLO_SCHEME: &str = "yolo";
/// ONNX 姿态模型
pub const YOLO_POSE_SCHEME: &str = "yolo-pose";

/// 解析命令行中的来源参数
///
/// 带方案的字符串（如 `image:///data/1.jpeg`）原样解析；
/// 普通路径根据是否为目录映射到 `folder://` 或 `image://`。
pub fn source_url(value: &str) -> Result<Url, String> {
  if let Ok(url) = Url::parse(value)
    && url.scheme().len() > 1
  {
    return Ok(url);
  }

  let path = Path::new(value);
  let scheme = if path.is_dir() {
    FOLDER_SCHEME
  } else {
    IMAGE_SCHEME
  };
  path_url(scheme, path)
}

/// 解析命令行中的模型参数
///
/// 带方案的字符串原样解析；目录视为检测记录（`record://`），
/// 其他路径视为 ONNX 模型文件，使用 `onnx_scheme`。
pub fn model_url(value: &str, onnx_scheme: &str) -> Result<Url, String> {
  if let Ok(url) = Url::parse(value)
    && url.scheme().len() > 1
  {
    return Ok(url);
  }

  let path = Path::new(value);
  let scheme = if path.is_dir() {
    RECORD_SCHEME
  } else {
    onnx_scheme
  };
  path_url(scheme, path)
}

/// 以给定方案包装一个本地路径
pub fn path_url(scheme: &str, path: &Path) -> Result<Url, String> {
  let absolute = if path.is_absolute() {
    path.to_path_buf()
  } else {
    std::env::current_dir()
      .map_err(|e| format!("Cannot read the current directory: {}", e))?
      .join(path)
  };

  // file 是特殊方案，不能直接 set_scheme 到自定义方案
  let file_url = Url::from_file_path(&absolute)
    .map_err(|_| format!("Cannot convert path: {}", absolute.display()))?;
  let rest = &file_url.as_str()["file".len()..];
  Url::parse(&format!("{}{}", scheme, rest)).map_err(|e| format!("Invalid URI: {}", e))
}

/// 取出 URI 中的本地路径（解码百分号转义）
pub fn url_path(url: &Url) -> PathBuf {
  let raw = url.path();
  let decoded = urlencoding::decode(raw)
    .map(|s| s.into_owned())
    .unwrap_or_else(|_| raw.to_string());
  PathBuf::from(decoded)
}
