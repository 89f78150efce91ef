// 该文件是 Jizhu （脊柱） 项目的一部分。
// src/model/record.rs - 检测记录回放
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

//! 记录文件与图像同名、扩展名为 `.txt`，每行一个目标：
//!
//! ```text
//! label, score, x_min, y_min, x_max, y_max[, kx, ky, kv ...]
//! ```
//!
//! 坐标为原图像素坐标；姿态记录在框之后追加 17 组关键点。

use std::{
  marker::PhantomData,
  path::{Path, PathBuf},
};

use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme, RECORD_SCHEME,
  frame::ImageFrame,
  model::{DetectItem, DetectResult, KEYPOINT_COUNT, Keypoint, Model, PoseItem, PoseResult},
  url_path,
};

const BOX_FIELDS: usize = 6;
const POSE_FIELDS: usize = BOX_FIELDS + KEYPOINT_COUNT * 3;

#[derive(Error, Debug)]
pub enum RecordModelError {
  #[error("URI schema mismatch: expected 'record', found '{0}'")]
  SchemaMismatch(String),
  #[error("Model file not found: {0}")]
  NotFound(PathBuf),
  #[error("I/O error: {0}")]
  IoError(#[from] std::io::Error),
  #[error("Malformed record {path}:{line}: {reason}")]
  Malformed {
    path: PathBuf,
    line: usize,
    reason: String,
  },
}

/// 可以写入/读取记录文件的检测结果
pub trait Recordable: Sized {
  fn to_record_lines(&self) -> Vec<String>;
  fn from_record_fields(rows: Vec<RecordRow>) -> Result<Self, String>;
}

/// 解析后的一行记录
#[derive(Debug, Clone)]
pub struct RecordRow {
  pub line: usize,
  pub label: String,
  pub values: Vec<f32>,
}

impl RecordRow {
  fn class_id(&self) -> u32 {
    self.label.parse().unwrap_or(0)
  }

  fn score(&self) -> f32 {
    self.values[0]
  }

  fn bbox(&self) -> [f32; 4] {
    [self.values[1], self.values[2], self.values[3], self.values[4]]
  }
}

impl Recordable for DetectResult {
  fn to_record_lines(&self) -> Vec<String> {
    self
      .items
      .iter()
      .map(|item| {
        format!(
          "{}, {:.4}, {:.2}, {:.2}, {:.2}, {:.2}",
          item.class_id, item.score, item.bbox[0], item.bbox[1], item.bbox[2], item.bbox[3]
        )
      })
      .collect()
  }

  fn from_record_fields(rows: Vec<RecordRow>) -> Result<Self, String> {
    let items = rows
      .into_iter()
      .map(|row| DetectItem {
        class_id: row.class_id(),
        score: row.score(),
        bbox: row.bbox(),
      })
      .collect::<Vec<_>>();
    Ok(DetectResult::from(items))
  }
}

impl Recordable for PoseResult {
  fn to_record_lines(&self) -> Vec<String> {
    self
      .items
      .iter()
      .map(|item| {
        let mut line = format!(
          "person, {:.4}, {:.2}, {:.2}, {:.2}, {:.2}",
          item.score, item.bbox[0], item.bbox[1], item.bbox[2], item.bbox[3]
        );
        for kp in item.keypoints.iter() {
          line.push_str(&format!(", {:.2}, {:.2}, {:.3}", kp.x, kp.y, kp.visibility));
        }
        line
      })
      .collect()
  }

  fn from_record_fields(rows: Vec<RecordRow>) -> Result<Self, String> {
    let mut items = Vec::with_capacity(rows.len());
    for row in rows {
      if row.values.len() + 1 != POSE_FIELDS {
        return Err(format!(
          "line {}: pose record needs {} fields, found {}",
          row.line,
          POSE_FIELDS,
          row.values.len() + 1
        ));
      }

      let mut keypoints = [Keypoint::default(); KEYPOINT_COUNT];
      for (k, kp) in keypoints.iter_mut().enumerate() {
        let base = BOX_FIELDS - 1 + k * 3;
        *kp = Keypoint {
          x: row.values[base],
          y: row.values[base + 1],
          visibility: row.values[base + 2],
        };
      }

      items.push(PoseItem {
        score: row.score(),
        bbox: row.bbox(),
        keypoints,
      });
    }
    Ok(PoseResult::from(items))
  }
}

/// 解析记录文本
pub fn parse_record(path: &Path, text: &str) -> Result<Vec<RecordRow>, RecordModelError> {
  let mut rows = Vec::new();
  for (idx, raw) in text.lines().enumerate() {
    let line = raw.trim();
    if line.is_empty() || line.starts_with('#') {
      continue;
    }

    let malformed = |reason: String| RecordModelError::Malformed {
      path: path.to_path_buf(),
      line: idx + 1,
      reason,
    };

    let mut fields = line.split(',').map(str::trim);
    let label = fields.next().unwrap_or_default().to_string();
    let values = fields
      .map(|f| {
        f.parse::<f32>()
          .map_err(|e| malformed(format!("'{}': {}", f, e)))
      })
      .collect::<Result<Vec<f32>, _>>()?;

    if values.len() + 1 < BOX_FIELDS {
      return Err(malformed(format!(
        "expected at least {} fields, found {}",
        BOX_FIELDS,
        values.len() + 1
      )));
    }

    rows.push(RecordRow {
      line: idx + 1,
      label,
      values,
    });
  }
  Ok(rows)
}

/// 将检测结果写到 `path` 对应的 `.txt` 记录文件
pub fn write_record<T: Recordable>(result: &T, path: &Path) -> Result<PathBuf, std::io::Error> {
  let target = path.with_extension("txt");
  let mut text = result.to_record_lines().join("\n");
  text.push('\n');
  std::fs::write(&target, text)?;
  debug!("写入检测记录: {}", target.display());
  Ok(target)
}

/// 回放外部检测器产生的记录，代替在线推理
pub struct RecordModel<T> {
  directory: Option<PathBuf>,
  /// 低于该分数的记录行被丢弃
  confidence: f32,
  _phantom: PhantomData<T>,
}

impl<T> FromUrlWithScheme for RecordModel<T> {
  const SCHEME: &'static str = RECORD_SCHEME;
}

impl<T> FromUrl for RecordModel<T> {
  type Error = RecordModelError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(RecordModelError::SchemaMismatch(url.scheme().to_string()));
    }

    // record:// 或 record:/// 表示记录与图像放在一起
    let path = url_path(url);
    let directory = if path.as_os_str().is_empty() || path == Path::new("/") {
      None
    } else if path.is_dir() {
      Some(path)
    } else {
      return Err(RecordModelError::NotFound(path));
    };

    info!(
      "使用检测记录回放: {}",
      directory
        .as_ref()
        .map(|d| d.display().to_string())
        .unwrap_or_else(|| "<与图像同目录>".to_string())
    );

    Ok(RecordModel {
      directory,
      confidence: 0.0,
      _phantom: PhantomData,
    })
  }
}

impl<T> RecordModel<T> {
  pub fn with_directory(directory: Option<PathBuf>) -> Self {
    Self {
      directory,
      confidence: 0.0,
      _phantom: PhantomData,
    }
  }

  pub fn with_confidence(self, confidence: f32) -> Self {
    Self { confidence, ..self }
  }

  pub fn record_path(&self, frame: &ImageFrame) -> PathBuf {
    match &self.directory {
      Some(dir) => {
        let stem = frame
          .path()
          .file_stem()
          .map(|s| s.to_string_lossy().into_owned())
          .unwrap_or_default();
        dir.join(format!("{}.txt", stem))
      }
      None => frame.path().with_extension("txt"),
    }
  }
}

impl<T: Recordable> Model for RecordModel<T> {
  type Input = ImageFrame;
  type Output = T;
  type Error = RecordModelError;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    let path = self.record_path(input);
    if !path.is_file() {
      return Err(RecordModelError::NotFound(path));
    }

    let text = std::fs::read_to_string(&path)?;
    let mut rows = parse_record(&path, &text)?;
    let total = rows.len();
    rows.retain(|row| row.score() >= self.confidence);
    debug!(
      "从 {} 读取 {} 条记录，置信度过滤后保留 {} 条",
      path.display(),
      total,
      rows.len()
    );

    T::from_record_fields(rows).map_err(|reason| RecordModelError::Malformed {
      path: path.clone(),
      line: 0,
      reason,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::RgbImage;

  #[test]
  fn parses_box_lines_and_skips_comments() {
    let text = "# vertebrae\n0, 0.91, 10, 20, 60, 45\n\n3, 0.5, 1.5, 2.5, 3.5, 4.5\n";
    let rows = parse_record(Path::new("a.txt"), text).unwrap();
    let result = DetectResult::from_record_fields(rows).unwrap();

    assert_eq!(result.len(), 2);
    assert_eq!(result.items[0].bbox, [10.0, 20.0, 60.0, 45.0]);
    assert_eq!(result.items[1].class_id, 3);
    assert_eq!(result.items[1].score, 0.5);
  }

  #[test]
  fn non_numeric_field_reports_line() {
    let err = parse_record(Path::new("a.txt"), "0, 0.9, 1, 2, x, 4").unwrap_err();
    assert!(
      matches!(err, RecordModelError::Malformed { line: 1, .. }),
      "{err}"
    );
  }

  #[test]
  fn short_pose_line_is_rejected() {
    let rows = parse_record(Path::new("p.txt"), "person, 0.9, 0, 0, 10, 10").unwrap();
    assert!(PoseResult::from_record_fields(rows).is_err());
  }

  #[test]
  fn written_pose_record_replays() {
    let dir = tempfile::tempdir().unwrap();
    let image_path = dir.path().join("side.jpeg");

    let mut keypoints = [Keypoint::default(); KEYPOINT_COUNT];
    for (k, kp) in keypoints.iter_mut().enumerate() {
      kp.x = 10.0 * k as f32;
      kp.y = 5.0 * k as f32;
      kp.visibility = 0.9;
    }
    let pose = PoseResult::from(vec![PoseItem {
      score: 0.87,
      bbox: [1.0, 2.0, 300.0, 400.0],
      keypoints,
    }]);
    let written = write_record(&pose, &image_path).unwrap();
    assert_eq!(written, dir.path().join("side.txt"));

    let model = RecordModel::<PoseResult>::with_directory(None);
    let frame = ImageFrame::new(&image_path, RgbImage::new(2, 2));
    let replay = model.infer(&frame).unwrap();
    let item = replay.best().unwrap();
    assert_eq!(item.keypoints[11].x, 110.0);
    assert_eq!(item.keypoints[11].y, 55.0);
    assert_eq!(item.bbox, [1.0, 2.0, 300.0, 400.0]);
  }

  #[test]
  fn record_directory_uses_image_stem() {
    let model = RecordModel::<DetectResult>::with_directory(Some(PathBuf::from("/records")));
    let frame = ImageFrame::new("/xrays/patient 7.png", RgbImage::new(1, 1));
    assert_eq!(
      model.record_path(&frame),
      PathBuf::from("/records/patient 7.txt")
    );
  }

  #[test]
  fn low_score_rows_are_dropped() {
    let dir = tempfile::tempdir().unwrap();
    let image_path = dir.path().join("xray.png");
    std::fs::write(
      dir.path().join("xray.txt"),
      "0, 0.90, 0, 0, 10, 10\n0, 0.05, 0, 20, 10, 30\n0, 0.25, 0, 40, 10, 50\n",
    )
    .unwrap();

    let model = RecordModel::<DetectResult>::with_directory(None).with_confidence(0.25);
    let frame = ImageFrame::new(&image_path, RgbImage::new(1, 1));
    let result = model.infer(&frame).unwrap();
    assert_eq!(result.len(), 2);
    assert!(result.items.iter().all(|item| item.score >= 0.25));
  }

  #[test]
  fn missing_record_is_an_error() {
    let model = RecordModel::<DetectResult>::with_directory(None);
    let frame = ImageFrame::new("/nowhere/a.png", RgbImage::new(1, 1));
    assert!(matches!(
      model.infer(&frame),
      Err(RecordModelError::NotFound(_))
    ));
  }
}
