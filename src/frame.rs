// 该文件是 Jizhu （脊柱） 项目的一部分。
// src/frame.rs - 图像帧与 NCHW 张量帧定义
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

use image::{RgbImage, imageops::FilterType};

const RGB_CHANNELS: usize = 3;

/// 一张待分析的图像，保留原始分辨率
#[derive(Debug, Clone)]
pub struct ImageFrame {
  path: PathBuf,
  image: RgbImage,
}

impl ImageFrame {
  pub fn new(path: impl Into<PathBuf>, image: RgbImage) -> Self {
    Self {
      path: path.into(),
      image,
    }
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  /// 文件名，用于报告 ID 与输出命名
  pub fn name(&self) -> String {
    self
      .path
      .file_name()
      .map(|n| n.to_string_lossy().into_owned())
      .unwrap_or_else(|| "frame".to_string())
  }

  pub fn image(&self) -> &RgbImage {
    &self.image
  }

  pub fn width(&self) -> u32 {
    self.image.width()
  }

  pub fn height(&self) -> u32 {
    self.image.height()
  }
}

/// 模型输入张量：1x3xHxW，RGB 平面排列，数值归一化到 [0, 1]
#[derive(Debug, Clone)]
pub struct RgbNchwFrame<const W: u32, const H: u32> {
  data: Box<[f32]>,
}

impl<const W: u32, const H: u32> Default for RgbNchwFrame<W, H> {
  fn default() -> Self {
    let size = RGB_CHANNELS * (W as usize) * (H as usize);
    Self {
      data: vec![0f32; size].into_boxed_slice(),
    }
  }
}

impl<const W: u32, const H: u32> RgbNchwFrame<W, H> {
  pub fn height(&self) -> usize {
    H as usize
  }

  pub fn width(&self) -> usize {
    W as usize
  }

  pub fn channels(&self) -> usize {
    RGB_CHANNELS
  }

  pub fn shape(&self) -> [usize; 4] {
    [1, RGB_CHANNELS, H as usize, W as usize]
  }

  pub fn as_nchw(&self) -> &[f32] {
    &self.data
  }

  pub fn into_vec(self) -> Vec<f32> {
    self.data.into_vec()
  }

  /// 原图坐标到模型输入坐标的缩放比例 (x, y)
  pub fn scale_from(frame: &ImageFrame) -> (f32, f32) {
    (
      frame.width() as f32 / W as f32,
      frame.height() as f32 / H as f32,
    )
  }
}

impl<const W: u32, const H: u32> From<&RgbImage> for RgbNchwFrame<W, H> {
  fn from(image: &RgbImage) -> Self {
    // 直接拉伸到模型尺寸，与导出时的预处理一致
    let resized = if image.dimensions() == (W, H) {
      image.clone()
    } else {
      image::imageops::resize(image, W, H, FilterType::Triangle)
    };

    let mut frame = Self::default();
    let plane = (W as usize) * (H as usize);
    for (x, y, pixel) in resized.enumerate_pixels() {
      let idx = (y as usize) * (W as usize) + (x as usize);
      for c in 0..RGB_CHANNELS {
        frame.data[c * plane + idx] = pixel[c] as f32 / 255.0;
      }
    }
    frame
  }
}

impl<const W: u32, const H: u32> From<&ImageFrame> for RgbNchwFrame<W, H> {
  fn from(frame: &ImageFrame) -> Self {
    Self::from(frame.image())
  }
}
