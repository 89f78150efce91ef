// 该文件是 Jizhu （脊柱） 项目的一部分。
// src/task.rs - 分析任务
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

use std::{
  sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
  },
  time::Instant,
};

use tracing::{error, info, warn};

use crate::{frame::ImageFrame, model::Model, output::Render, report::ErrorReport};

pub trait Task<I, M, O>: Sized {
  type Output;
  type Error;
  fn run_task(self, input: I, model: M, output: O) -> Result<Self::Output, Self::Error>;
}

/// 单张图像的处理结果
#[derive(Debug)]
pub struct Outcome<D> {
  /// 读取失败时可能没有文件名
  pub image: Option<String>,
  pub result: Result<D, anyhow::Error>,
}

impl<D> Outcome<D> {
  pub fn is_ok(&self) -> bool {
    self.result.is_ok()
  }
}

fn process<M, O, D, ME, RE>(model: &M, output: &O, frame: &ImageFrame) -> anyhow::Result<D>
where
  ME: std::error::Error + Sync + Send + 'static,
  RE: std::error::Error + Sync + Send + 'static,
  M: Model<Input = ImageFrame, Output = D, Error = ME>,
  O: Render<ImageFrame, D, Error = RE>,
{
  let now = Instant::now();
  let result = model.infer(frame)?;
  let inferred = now.elapsed();
  output.render_result(frame, &result)?;
  info!(
    "{} 分析完成，耗时: {:.2?} / {:.2?}",
    frame.name(),
    inferred,
    now.elapsed()
  );
  Ok(result)
}

/// 把失败交给输出记录，记录失败只告警
fn record_failure<O, D>(output: &O, image: Option<String>, error: &anyhow::Error)
where
  O: Render<ImageFrame, D>,
  O::Error: std::fmt::Display,
{
  let report = ErrorReport::new(error).with_image(image);
  if let Err(e) = output.render_error(&report) {
    warn!("无法写出错误报告: {}", e);
  }
}

/// 只处理第一帧，任何错误都终止任务
pub struct OneShotTask;

impl<D, IE, ME, RE, I, M, O> Task<I, M, O> for OneShotTask
where
  IE: std::error::Error + Sync + Send + 'static,
  ME: std::error::Error + Sync + Send + 'static,
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = Result<ImageFrame, IE>>,
  M: Model<Input = ImageFrame, Output = D, Error = ME>,
  O: Render<ImageFrame, D, Error = RE>,
{
  type Output = (ImageFrame, D);
  type Error = anyhow::Error;

  fn run_task(self, mut input: I, model: M, output: O) -> Result<Self::Output, Self::Error> {
    info!("开始任务...");
    let frame = input.next().ok_or_else(|| anyhow::anyhow!("No input image"))??;
    match process(&model, &output, &frame) {
      Ok(result) => Ok((frame, result)),
      Err(e) => {
        record_failure::<O, D>(&output, Some(frame.name()), &e);
        Err(e)
      }
    }
  }
}

/// 逐帧处理全部输入；单张失败只记录，不影响其余图像
#[derive(Debug, Default)]
pub struct BatchTask {
  stop: Arc<AtomicBool>,
}

impl BatchTask {
  /// 安装 Ctrl-C 处理，收到中断后处理完当前图像即退出
  pub fn with_interrupt(self) -> Self {
    let stop = self.stop.clone();
    if let Err(e) = ctrlc::set_handler(move || {
      warn!("收到中断信号，处理完当前图像后退出...");
      stop.store(true, Ordering::SeqCst);
    }) {
      warn!("无法设置 Ctrl-C 处理: {}", e);
    }
    self
  }

  pub fn stop_flag(&self) -> Arc<AtomicBool> {
    self.stop.clone()
  }
}

impl<D, IE, ME, RE, I, M, O> Task<I, M, O> for BatchTask
where
  IE: std::error::Error + Sync + Send + 'static,
  ME: std::error::Error + Sync + Send + 'static,
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = Result<ImageFrame, IE>>,
  M: Model<Input = ImageFrame, Output = D, Error = ME>,
  O: Render<ImageFrame, D, Error = RE>,
{
  type Output = Vec<Outcome<(ImageFrame, D)>>;
  type Error = anyhow::Error;

  fn run_task(self, input: I, model: M, output: O) -> Result<Self::Output, Self::Error> {
    info!("开始批量任务...");
    let mut outcomes = Vec::new();

    for (index, frame) in input.enumerate() {
      if self.stop.load(Ordering::SeqCst) {
        warn!("中断信号接收，已处理 {} 张图像", index);
        break;
      }

      let outcome = match frame {
        Ok(frame) => {
          let image = Some(frame.name());
          let result = process(&model, &output, &frame).map(|d| (frame, d));
          Outcome { image, result }
        }
        Err(e) => Outcome {
          image: None,
          result: Err(e.into()),
        },
      };

      if let Err(e) = &outcome.result {
        error!(
          "第 {} 张图像 {} 处理失败: {}",
          index + 1,
          outcome.image.as_deref().unwrap_or("<unknown>"),
          e
        );
        record_failure::<O, D>(&output, outcome.image.clone(), e);
      }
      outcomes.push(outcome);
    }

    let failed = outcomes.iter().filter(|o| !o.is_ok()).count();
    info!("任务完成: {} 张图像，{} 张失败", outcomes.len(), failed);
    Ok(outcomes)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::RgbImage;
  use std::{cell::RefCell, convert::Infallible};
  use thiserror::Error;

  #[derive(Error, Debug)]
  #[error("too narrow: {0}")]
  struct TooNarrow(u32);

  /// 宽度小于 2 的图像视为失败
  struct WidthModel;

  impl Model for WidthModel {
    type Input = ImageFrame;
    type Output = u32;
    type Error = TooNarrow;

    fn infer(&self, input: &ImageFrame) -> Result<u32, TooNarrow> {
      match input.width() {
        w if w < 2 => Err(TooNarrow(w)),
        w => Ok(w),
      }
    }
  }

  #[derive(Default)]
  struct Collect {
    seen: RefCell<Vec<(String, u32)>>,
    failed: RefCell<Vec<ErrorReport>>,
  }

  impl Render<ImageFrame, u32> for &Collect {
    type Error = Infallible;

    fn render_result(&self, frame: &ImageFrame, result: &u32) -> Result<(), Infallible> {
      self.seen.borrow_mut().push((frame.name(), *result));
      Ok(())
    }

    fn render_error(&self, report: &ErrorReport) -> Result<(), Infallible> {
      self.failed.borrow_mut().push(report.clone());
      Ok(())
    }
  }

  fn frames(widths: &[u32]) -> Vec<Result<ImageFrame, TooNarrow>> {
    widths
      .iter()
      .enumerate()
      .map(|(i, &w)| Ok(ImageFrame::new(format!("{}.png", i), RgbImage::new(w, 1))))
      .collect()
  }

  #[test]
  fn one_shot_uses_first_frame() {
    let collect = Collect::default();
    let (frame, width) = OneShotTask
      .run_task(frames(&[4, 8]).into_iter(), WidthModel, &collect)
      .unwrap();
    assert_eq!(frame.name(), "0.png");
    assert_eq!(width, 4);
    assert_eq!(collect.seen.borrow().len(), 1);
  }

  #[test]
  fn one_shot_propagates_errors() {
    let collect = Collect::default();
    let err = OneShotTask
      .run_task(frames(&[1]).into_iter(), WidthModel, &collect)
      .unwrap_err();
    assert_eq!(err.to_string(), "too narrow: 1");
    assert_eq!(collect.failed.borrow()[0].image.as_deref(), Some("0.png"));

    let empty: Vec<Result<ImageFrame, TooNarrow>> = Vec::new();
    assert!(
      OneShotTask
        .run_task(empty.into_iter(), WidthModel, &collect)
        .is_err()
    );
  }

  #[test]
  fn batch_continues_after_failure() {
    let collect = Collect::default();
    let mut input = frames(&[3, 1, 5]);
    input.push(Err(TooNarrow(0)));

    let outcomes = BatchTask::default()
      .run_task(input.into_iter(), WidthModel, &collect)
      .unwrap();

    assert_eq!(outcomes.len(), 4);
    assert!(outcomes[0].is_ok());
    assert_eq!(outcomes[1].image.as_deref(), Some("1.png"));
    assert!(!outcomes[1].is_ok());
    assert!(outcomes[2].is_ok());
    assert!(outcomes[3].image.is_none());
    assert_eq!(
      *collect.seen.borrow(),
      vec![("0.png".to_string(), 3), ("2.png".to_string(), 5)]
    );

    let failed = collect.failed.borrow();
    assert_eq!(failed.len(), 2);
    assert_eq!(failed[0].image.as_deref(), Some("1.png"));
    assert_eq!(failed[0].error, "too narrow: 1");
    assert!(failed[1].image.is_none());
  }

  #[test]
  fn batch_stops_when_flagged() {
    let collect = Collect::default();
    let task = BatchTask::default();
    task.stop_flag().store(true, Ordering::SeqCst);
    let outcomes = task
      .run_task(frames(&[3, 4]).into_iter(), WidthModel, &collect)
      .unwrap();
    assert!(outcomes.is_empty());
  }
}
