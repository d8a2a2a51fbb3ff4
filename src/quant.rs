// 该文件是 RkPost （山南后处理） 项目的一部分。
// src/quant.rs - 量化与反量化
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

use half::f16;

use crate::{error::DecodeError, tensor::TensorType};

/// 张量元素类型
///
/// `from_f32` 为截断转换；超出范围时按 Rust `as` 语义饱和。
pub trait Sample: Copy + PartialOrd + Send + Sync + std::fmt::Debug + 'static {
  const TYPE: TensorType;

  fn to_f32(self) -> f32;
  fn from_f32(value: f32) -> Self;
}

impl Sample for i8 {
  const TYPE: TensorType = TensorType::Int8;

  #[inline(always)]
  fn to_f32(self) -> f32 {
    self as f32
  }

  #[inline(always)]
  fn from_f32(value: f32) -> Self {
    value as i8
  }
}

impl Sample for u8 {
  const TYPE: TensorType = TensorType::UInt8;

  #[inline(always)]
  fn to_f32(self) -> f32 {
    self as f32
  }

  #[inline(always)]
  fn from_f32(value: f32) -> Self {
    value as u8
  }
}

impl Sample for f32 {
  const TYPE: TensorType = TensorType::Float32;

  #[inline(always)]
  fn to_f32(self) -> f32 {
    self
  }

  #[inline(always)]
  fn from_f32(value: f32) -> Self {
    value
  }
}

impl Sample for f16 {
  const TYPE: TensorType = TensorType::Float16;

  #[inline(always)]
  fn to_f32(self) -> f32 {
    f16::to_f32(self)
  }

  #[inline(always)]
  fn from_f32(value: f32) -> Self {
    f16::from_f32(value)
  }
}

/// 反量化: `(sample - zp) * scale`
#[inline(always)]
pub fn dequantize<T: Sample>(sample: T, scale: f32, zero_point: i32) -> f32 {
  (sample.to_f32() - zero_point as f32) * scale
}

/// 量化: `real / scale + zp`，截断到 `T` 的位宽
#[inline(always)]
pub fn quantize<T: Sample>(real: f32, scale: f32, zero_point: i32) -> T {
  T::from_f32(real / scale + zero_point as f32)
}

/// 单个张量的量化参数
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quantization {
  pub scale: f32,
  pub zero_point: i32,
}

impl Quantization {
  pub const IDENTITY: Quantization = Quantization {
    scale: 1.0,
    zero_point: 0,
  };

  pub fn new(scale: f32, zero_point: i32) -> Self {
    Self { scale, zero_point }
  }

  /// 带检查的构造，缩放系数必须为有限正数
  pub fn try_new(scale: f32, zero_point: i32) -> Result<Self, DecodeError> {
    let quant = Self::new(scale, zero_point);
    quant.validate()?;
    Ok(quant)
  }

  pub fn validate(&self) -> Result<(), DecodeError> {
    if !self.scale.is_finite() || self.scale <= 0.0 {
      return Err(DecodeError::InvalidQuantScale(self.scale));
    }
    Ok(())
  }

  #[inline(always)]
  pub fn dequantize<T: Sample>(&self, sample: T) -> f32 {
    dequantize(sample, self.scale, self.zero_point)
  }

  #[inline(always)]
  pub fn quantize<T: Sample>(&self, real: f32) -> T {
    quantize(real, self.scale, self.zero_point)
  }
}

impl Default for Quantization {
  fn default() -> Self {
    Self::IDENTITY
  }
}

impl From<(f32, i32)> for Quantization {
  fn from((scale, zero_point): (f32, i32)) -> Self {
    Self { scale, zero_point }
  }
}
