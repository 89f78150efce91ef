// 该文件是 Jizhu （脊柱） 项目的一部分。
// src/bin/posture_analysis.rs - 体态照片分析
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

use std::process::ExitCode;

use clap::Parser;

use jizhu::{
  YOLO_POSE_SCHEME,
  analysis::PostureAnalyzer,
  cli::{CommonArgs, init_logging, parse_args, print_error, run},
  model::{DetectOptions, PERSON_CONFIDENCE, PoseModelWrapper},
};

/// 侧面体态照片分析：头部前倾与驼背筛查
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  #[command(flatten)]
  pub common: CommonArgs,

  /// 人物置信度阈值 (0.0 - 1.0)
  #[arg(long, default_value_t = PERSON_CONFIDENCE, value_name = "THRESHOLD")]
  pub confidence: f32,
}

fn main() -> ExitCode {
  let args = match parse_args::<Args>() {
    Ok(args) => args,
    Err(code) => return code,
  };
  init_logging(args.common.verbose);

  let options = DetectOptions {
    confidence: args.confidence,
    iou_threshold: args.common.iou,
  };

  match run(
    &args.common,
    YOLO_POSE_SCHEME,
    |url| PoseModelWrapper::from_url(url, options),
    PostureAnalyzer::default(),
  ) {
    Ok(true) => ExitCode::SUCCESS,
    Ok(false) => ExitCode::FAILURE,
    Err(e) => {
      print_error(&e, None);
      ExitCode::FAILURE
    }
  }
}
