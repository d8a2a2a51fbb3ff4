// 该文件是 RkPost （山南后处理） 项目的一部分。
// src/transform.rs - 坐标变换
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

use crate::{
  error::DecodeError,
  geometry::{Rect, Size},
};

/// 原图与模型输入之间的等比缩放加居中填充
///
/// `target = source * scale + offset`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
  scale: f32,
  x_offset: f32,
  y_offset: f32,
}

impl Transform {
  pub fn new(scale: f32, x_offset: f32, y_offset: f32) -> Result<Self, DecodeError> {
    if !scale.is_finite() || scale <= 0.0 {
      return Err(DecodeError::InvalidTransform(format!("缩放系数 {}", scale)));
    }
    Ok(Self {
      scale,
      x_offset,
      y_offset,
    })
  }

  pub fn identity() -> Self {
    Self {
      scale: 1.0,
      x_offset: 0.0,
      y_offset: 0.0,
    }
  }

  /// 由原图尺寸 `src` 与目标尺寸 `dst` 计算 letterbox 参数
  pub fn letterbox(src: Size, dst: Size) -> Result<Self, DecodeError> {
    if src.area() == 0 || dst.area() == 0 {
      return Err(DecodeError::InvalidTransform(format!(
        "尺寸为 0: {} -> {}",
        src, dst
      )));
    }
    let (sw, sh) = (src.width as f32, src.height as f32);
    let (dw, dh) = (dst.width as f32, dst.height as f32);
    let scale = (dw / sw).min(dh / sh);
    Self::new(scale, (dw - sw * scale) / 2.0, (dh - sh * scale) / 2.0)
  }

  pub fn scale(&self) -> f32 {
    self.scale
  }

  pub fn offset(&self) -> (f32, f32) {
    (self.x_offset, self.y_offset)
  }

  /// 原图坐标 -> 目标坐标
  pub fn to_target(&self, rect: &Rect) -> Rect {
    Rect::new(
      rect.x * self.scale + self.x_offset,
      rect.y * self.scale + self.y_offset,
      rect.width * self.scale,
      rect.height * self.scale,
    )
  }

  /// 目标坐标 -> 原图坐标
  pub fn to_original(&self, rect: &Rect) -> Rect {
    Rect::new(
      (rect.x - self.x_offset) / self.scale,
      (rect.y - self.y_offset) / self.scale,
      rect.width / self.scale,
      rect.height / self.scale,
    )
  }
}

impl Default for Transform {
  fn default() -> Self {
    Self::identity()
  }
}
