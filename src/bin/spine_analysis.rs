// 该文件是 Jizhu （脊柱） 项目的一部分。
// src/bin/spine_analysis.rs - 脊柱 X 光分析
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
use tracing::info;

use jizhu::{
  YOLO_SCHEME,
  analysis::{Profile, SpineAnalyzer, SpineThresholds},
  cli::{CommonArgs, init_logging, parse_args, print_error, run},
  model::{DetectModelWrapper, DetectOptions, VERTEBRA_CONFIDENCE},
};

/// 脊柱 X 光分析：椎骨检测、Cobb 角、压缩性骨折/椎间盘/滑脱筛查
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  #[command(flatten)]
  pub common: CommonArgs,

  /// 椎骨置信度阈值 (0.0 - 1.0)
  #[arg(long, default_value_t = VERTEBRA_CONFIDENCE, value_name = "THRESHOLD")]
  pub confidence: f32,

  /// 判定阈值配置
  #[arg(long, value_enum, default_value_t = Profile::Strict)]
  pub profile: Profile,
}

fn main() -> ExitCode {
  let args = match parse_args::<Args>() {
    Ok(args) => args,
    Err(code) => return code,
  };
  init_logging(args.common.verbose);

  info!("阈值配置: {:?}", args.profile);
  let options = DetectOptions {
    confidence: args.confidence,
    iou_threshold: args.common.iou,
  };
  let analyzer = SpineAnalyzer::new(SpineThresholds::for_profile(args.profile));

  match run(
    &args.common,
    YOLO_SCHEME,
    |url| DetectModelWrapper::from_url(url, options),
    analyzer,
  ) {
    Ok(true) => ExitCode::SUCCESS,
    Ok(false) => ExitCode::FAILURE,
    Err(e) => {
      print_error(&e, None);
      ExitCode::FAILURE
    }
  }
}
