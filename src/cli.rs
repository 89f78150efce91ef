// 该文件是 Jizhu （脊柱） 项目的一部分。
// src/cli.rs - 命令行公共部分
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

//! 两个分析程序共用的参数、日志初始化与结果输出。
//!
//! stdout 只输出 JSON：单张图像输出一个对象，目录输出每行一个对象；
//! 日志全部写到 stderr。

use std::{io::Write, path::PathBuf, process::ExitCode};

use anyhow::bail;
use clap::{Args, Parser, error::ErrorKind};
use serde::Serialize;
use tracing::{Level, error, info};
use url::Url;

use crate::{
  FromUrl, IMAGE_SCHEME,
  analysis::{Analyze, AnalysisPipeline, Analyzed},
  frame::ImageFrame,
  input::InputWrapper,
  model::{Model, ModelError, NMS_IOU_THRESHOLD},
  output::{OutputWrapper, Renderable},
  report::ErrorReport,
  model_url, source_url,
  task::{BatchTask, OneShotTask, Task},
  url_path,
};

#[derive(Args, Debug)]
pub struct CommonArgs {
  /// 输入来源：图像文件、图像目录，或 image:// / folder:// URI
  #[arg(long, value_name = "SOURCE", value_parser = source_url)]
  pub input: Url,

  /// 检测模型：ONNX 模型文件、检测记录目录，或 record:// / yolo:// / yolo-pose:// URI
  #[arg(long, value_name = "MODEL")]
  pub model: String,

  /// 输出：image://<文件>（仅单张图像）、folder://<目录>?prefix=Analysis_&record&json 或 json://<文件>
  #[arg(long, value_name = "OUTPUT")]
  pub output: Option<Url>,

  /// NMS IOU 阈值 (0.0 - 1.0)
  #[arg(long, default_value_t = NMS_IOU_THRESHOLD, value_name = "THRESHOLD")]
  pub iou: f32,

  /// 标注文字使用的 TrueType 字体，默认查找系统字体
  #[arg(long, value_name = "FILE")]
  pub font: Option<PathBuf>,

  /// 输出调试日志
  #[arg(short, long)]
  pub verbose: bool,
}

/// 日志写到 stderr，保持 stdout 为纯 JSON
pub fn init_logging(verbose: bool) {
  let level = if verbose { Level::DEBUG } else { Level::INFO };
  tracing_subscriber::fmt()
    .with_max_level(level)
    .with_writer(std::io::stderr)
    .init();
}

fn print_json<T: Serialize>(value: &T, pretty: bool) -> anyhow::Result<()> {
  let text = if pretty {
    serde_json::to_string_pretty(value)?
  } else {
    serde_json::to_string(value)?
  };
  let mut out = std::io::stdout().lock();
  writeln!(out, "{}", text)?;
  out.flush()?;
  Ok(())
}

/// 输出失败报告
pub fn print_error(error: &anyhow::Error, image: Option<String>) {
  error!("{:#}", error);
  let report = ErrorReport::new(error).with_image(image);
  if let Err(e) = print_json(&report, true) {
    error!("无法输出错误报告: {}", e);
  }
}

/// 解析命令行；参数错误同样以 JSON 错误报告输出
///
/// `--help` 与 `--version` 保持 clap 的默认行为。
pub fn parse_args<P: Parser>() -> Result<P, ExitCode> {
  match P::try_parse() {
    Ok(args) => Ok(args),
    Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => e.exit(),
    Err(e) => {
      let _ = e.print();
      let report = ErrorReport::new(clap_message(&e.to_string()));
      if let Err(e) = print_json(&report, true) {
        eprintln!("无法输出错误报告: {}", e);
      }
      Err(ExitCode::FAILURE)
    }
  }
}

/// 去掉 clap 错误中的 `error:` 前缀与用法说明，合并为一行
fn clap_message(rendered: &str) -> String {
  let message = rendered
    .lines()
    .map(str::trim)
    .take_while(|line| !line.starts_with("Usage:"))
    .filter(|line| !line.is_empty())
    .collect::<Vec<_>>()
    .join(" ");
  message
    .strip_prefix("error: ")
    .map(str::to_string)
    .unwrap_or(message)
}

/// 执行一次分析，返回是否全部成功
///
/// 先打开输入再加载模型，这样缺失的图像会先于缺失的模型被报告。
/// 普通的模型路径按 `onnx_scheme` 解释，目录按检测记录解释。
pub fn run<M, A, L>(
  args: &CommonArgs,
  onnx_scheme: &str,
  load_model: L,
  analyzer: A,
) -> anyhow::Result<bool>
where
  L: FnOnce(&Url) -> Result<M, ModelError>,
  M: Model<Input = ImageFrame, Error = ModelError>,
  A: Analyze<M::Output>,
  Analyzed<M::Output, A::Report>: Renderable,
{
  let model = model_url(&args.model, onnx_scheme).map_err(anyhow::Error::msg)?;
  info!("输入来源: {}", args.input);
  info!("模型: {}", model);

  let input = InputWrapper::from_url(&args.input)?;
  if input.is_batch()
    && let Some(output) = &args.output
    && output.scheme() == IMAGE_SCHEME
  {
    bail!("image:// output takes a single image; use folder:// for a folder input");
  }

  let pipeline = AnalysisPipeline::new(load_model(&model)?, analyzer);
  let output = args
    .output
    .as_ref()
    .map(|url| OutputWrapper::from_url(url)?.with_font(args.font.as_deref()))
    .transpose()?;

  if input.is_batch() {
    let outcomes = BatchTask::default()
      .with_interrupt()
      .run_task(input, pipeline, output)?;
    let mut all_ok = true;
    for outcome in outcomes {
      match outcome.result {
        Ok((frame, result)) => print_json(&result.report(&frame.name()), false)?,
        Err(e) => {
          all_ok = false;
          let report = ErrorReport::new(e).with_image(outcome.image);
          print_json(&report, false)?;
        }
      }
    }
    return Ok(all_ok);
  }

  let image = url_path(&args.input)
    .file_name()
    .map(|n| n.to_string_lossy().into_owned());
  match OneShotTask.run_task(input, pipeline, output) {
    Ok((frame, result)) => {
      print_json(&result.report(&frame.name()), true)?;
      Ok(true)
    }
    Err(e) => {
      print_error(&e, image);
      Ok(false)
    }
  }
}
