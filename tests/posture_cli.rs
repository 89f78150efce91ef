// 该文件是 Jizhu （脊柱） 项目的一部分。
// tests/posture_cli.rs - posture-analysis 集成测试
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

use assert_cmd::{Command, cargo::cargo_bin_cmd};
use image::{Rgb, RgbImage};
use serde_json::{Value, json};
use tempfile::TempDir;

const NOSE: usize = 0;
const EARS: [usize; 2] = [3, 4];
const SHOULDERS: [usize; 2] = [5, 6];
const HIPS: [usize; 2] = [11, 12];

/// 一条姿态记录：框 + 17 个关键点
fn person_line(ear: (f32, f32), shoulder: (f32, f32), hip: (f32, f32)) -> String {
  let mut keypoints = [(0.0f32, 0.0f32, 0.0f32); 17];
  keypoints[NOSE] = (ear.0 + 10.0, ear.1 - 10.0, 1.0);
  for k in EARS {
    keypoints[k] = (ear.0, ear.1, 1.0);
  }
  for k in SHOULDERS {
    keypoints[k] = (shoulder.0, shoulder.1, 1.0);
  }
  for k in HIPS {
    keypoints[k] = (hip.0, hip.1, 1.0);
  }

  let mut line = "person, 0.93, 0, 0, 600, 800".to_string();
  for (x, y, v) in keypoints {
    line.push_str(&format!(", {}, {}, {}", x, y, v));
  }
  line
}

fn photo_with_record(dir: &Path, name: &str, record: &str) -> PathBuf {
  let image = dir.join(name);
  RgbImage::from_pixel(600, 800, Rgb([200, 200, 200]))
    .save(&image)
    .expect("save photo");
  std::fs::write(image.with_extension("txt"), record).expect("write record");
  image
}

fn posture() -> Command {
  cargo_bin_cmd!("posture-analysis")
}

#[test]
fn forward_head_is_detected() {
  let dir = TempDir::new().expect("temp dir");
  let record = person_line((370.0, 110.0), (300.0, 200.0), (300.0, 400.0));
  let photo = photo_with_record(dir.path(), "side.png", &record);

  let output = posture()
    .arg("--input")
    .arg(&photo)
    .args(["--model", "record:///"])
    .output()
    .expect("run");

  assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
  let report: Value = serde_json::from_slice(&output.stdout).expect("JSON");
  assert_eq!(report["success"], json!(true));
  assert_eq!(report["direction"], json!("RIGHT"));
  assert_eq!(report["headPosture"]["status"], json!("FORWARD HEAD POSTURE"));
  assert_eq!(report["backPosture"]["status"], json!("BACK ALIGNED"));
  assert_eq!(report["consultDoctor"], json!(true));
  assert_eq!(report["keypoints"]["hip"], json!({"x": 300.0, "y": 400.0}));
}

#[test]
fn aligned_posture_is_healthy() {
  let dir = TempDir::new().expect("temp dir");
  let record = person_line((302.0, 110.0), (300.0, 200.0), (300.0, 400.0));
  let photo = photo_with_record(dir.path(), "upright.png", &record);

  let output = posture()
    .arg("--input")
    .arg(&photo)
    .args(["--model", "record:///"])
    .output()
    .expect("run");

  assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
  let report: Value = serde_json::from_slice(&output.stdout).expect("JSON");
  assert_eq!(report["headPosture"]["status"], json!("NORMAL"));
  assert_eq!(report["overallSeverity"], json!("normal"));
  assert_eq!(report["consultDoctor"], json!(false));
  assert_eq!(report["score"], json!(100));
}

#[test]
fn empty_photo_has_no_person() {
  let dir = TempDir::new().expect("temp dir");
  let photo = photo_with_record(dir.path(), "empty.png", "# nobody\n");

  let output = posture()
    .arg("--input")
    .arg(&photo)
    .args(["--model", "record:///"])
    .output()
    .expect("run");

  assert_eq!(output.status.code(), Some(1));
  let report: Value = serde_json::from_slice(&output.stdout).expect("JSON");
  assert_eq!(report["success"], json!(false));
  assert_eq!(report["error"], json!("No person detected in the image"));
}

#[test]
fn annotated_photo_is_saved() {
  let dir = TempDir::new().expect("temp dir");
  let record = person_line((370.0, 110.0), (300.0, 200.0), (300.0, 400.0));
  let photo = photo_with_record(dir.path(), "side.png", &record);
  let target = dir.path().join("annotated").join("side.png");

  let output = posture()
    .arg("--input")
    .arg(&photo)
    .args(["--model", "record:///"])
    .arg("--output")
    .arg(format!("image://{}", target.display()))
    .output()
    .expect("run");

  assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
  let annotated = image::open(&target).expect("annotated").into_rgb8();
  assert_eq!(annotated.dimensions(), (600, 800));
  // 左上角报告框为黑色
  assert_eq!(annotated.get_pixel(5, 5), &Rgb([0, 0, 0]));
}

#[test]
fn plain_onnx_path_is_checked() {
  let dir = TempDir::new().expect("temp dir");
  let record = person_line((370.0, 110.0), (300.0, 200.0), (300.0, 400.0));
  let photo = photo_with_record(dir.path(), "side.png", &record);

  let output = posture()
    .arg("--input")
    .arg(&photo)
    .arg("--model")
    .arg(dir.path().join("yolov8n-pose.onnx"))
    .output()
    .expect("run");

  assert_eq!(output.status.code(), Some(1));
  let report: Value = serde_json::from_slice(&output.stdout).expect("JSON");
  let error = report["error"].as_str().expect("error text");
  assert!(error.starts_with("Model file not found"), "{error}");
}
