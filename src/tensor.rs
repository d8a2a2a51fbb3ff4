// 该文件是 RkPost （山南后处理） 项目的一部分。
// src/tensor.rs - 输出张量描述
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
use serde::{Deserialize, Serialize};

use crate::{error::DecodeError, quant::Quantization};

/// 张量内存布局
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TensorFormat {
  /// `[N, C, H, W]`
  Nchw,
  /// `[N, H, W, C]`
  Nhwc,
  /// NPU 分块格式 `[N, C1, H, W, C2]`
  Nc1hwc2,
}

/// 张量元素类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TensorType {
  Float32,
  Float16,
  Int8,
  #[serde(rename = "uint8")]
  UInt8,
}

impl TensorType {
  pub fn is_float(&self) -> bool {
    matches!(self, TensorType::Float32 | TensorType::Float16)
  }

  pub fn size_of(&self) -> usize {
    match self {
      TensorType::Float32 => 4,
      TensorType::Float16 => 2,
      TensorType::Int8 | TensorType::UInt8 => 1,
    }
  }
}

/// 张量属性，对应 rknn_tensor_attr 中后处理关心的部分
#[derive(Debug, Clone, PartialEq)]
pub struct TensorAttr {
  pub name: String,
  pub dims: Vec<usize>,
  pub format: TensorFormat,
  pub dtype: TensorType,
  pub quant: Quantization,
}

impl TensorAttr {
  pub fn new(
    name: impl Into<String>,
    dims: impl Into<Vec<usize>>,
    format: TensorFormat,
    dtype: TensorType,
    quant: Quantization,
  ) -> Self {
    Self {
      name: name.into(),
      dims: dims.into(),
      format,
      dtype,
      quant,
    }
  }

  /// 解码时实际使用的量化参数，浮点张量视为恒等映射
  pub fn quantization(&self) -> Quantization {
    if self.dtype.is_float() {
      Quantization::IDENTITY
    } else {
      self.quant
    }
  }

  pub fn num_elements(&self) -> usize {
    self.dims.iter().product()
  }

  fn invalid_shape(&self) -> DecodeError {
    DecodeError::InvalidShape {
      name: self.name.clone(),
      dims: self.dims.clone(),
    }
  }

  /// 逻辑形状 `(C, H, W)`，只接受 batch 为 1 的四维张量
  pub fn chw(&self) -> Result<(usize, usize, usize), DecodeError> {
    match (self.format, self.dims.as_slice()) {
      (TensorFormat::Nchw, &[1, c, h, w]) => Ok((c, h, w)),
      (TensorFormat::Nhwc, &[1, h, w, c]) => Ok((c, h, w)),
      _ => Err(self.invalid_shape()),
    }
  }

  /// 原生布局下的分块宽度 C2，通道主序时为 `None`
  ///
  /// NHWC 视为只有一个分块、宽度为 C 的分块格式。
  pub fn block_width(&self) -> Result<Option<usize>, DecodeError> {
    match (self.format, self.dims.as_slice()) {
      (TensorFormat::Nchw, &[1, _, _, _]) => Ok(None),
      (TensorFormat::Nhwc, &[1, _, _, c]) if c > 0 => Ok(Some(c)),
      (TensorFormat::Nc1hwc2, &[1, _, _, _, c2]) if c2 > 0 => Ok(Some(c2)),
      _ => Err(self.invalid_shape()),
    }
  }
}

/// 借用的张量数据，所有权属于推理运行时
#[derive(Debug, Clone, Copy)]
pub enum TensorData<'a> {
  Int8(&'a [i8]),
  UInt8(&'a [u8]),
  Float32(&'a [f32]),
  Float16(&'a [f16]),
}

impl<'a> TensorData<'a> {
  pub fn dtype(&self) -> TensorType {
    match self {
      TensorData::Int8(_) => TensorType::Int8,
      TensorData::UInt8(_) => TensorType::UInt8,
      TensorData::Float32(_) => TensorType::Float32,
      TensorData::Float16(_) => TensorType::Float16,
    }
  }

  pub fn len(&self) -> usize {
    match self {
      TensorData::Int8(data) => data.len(),
      TensorData::UInt8(data) => data.len(),
      TensorData::Float32(data) => data.len(),
      TensorData::Float16(data) => data.len(),
    }
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

impl<'a> From<&'a [i8]> for TensorData<'a> {
  fn from(data: &'a [i8]) -> Self {
    TensorData::Int8(data)
  }
}

impl<'a> From<&'a [u8]> for TensorData<'a> {
  fn from(data: &'a [u8]) -> Self {
    TensorData::UInt8(data)
  }
}

impl<'a> From<&'a [f32]> for TensorData<'a> {
  fn from(data: &'a [f32]) -> Self {
    TensorData::Float32(data)
  }
}

impl<'a> From<&'a [f16]> for TensorData<'a> {
  fn from(data: &'a [f16]) -> Self {
    TensorData::Float16(data)
  }
}

/// 一个输出张量：逻辑属性、原生属性与数据
#[derive(Debug, Clone, Copy)]
pub struct OutputTensor<'a> {
  pub attr: &'a TensorAttr,
  pub native: &'a TensorAttr,
  pub data: TensorData<'a>,
}

impl<'a> OutputTensor<'a> {
  /// 原生布局与逻辑布局相同
  pub fn new(attr: &'a TensorAttr, data: TensorData<'a>) -> Self {
    Self {
      attr,
      native: attr,
      data,
    }
  }

  pub fn with_native(attr: &'a TensorAttr, native: &'a TensorAttr, data: TensorData<'a>) -> Self {
    Self { attr, native, data }
  }

  pub fn name(&self) -> &str {
    &self.attr.name
  }

  /// 原生布局的分块宽度，同时检查原生形状与逻辑形状是否一致
  pub fn block_width(&self) -> Result<Option<usize>, DecodeError> {
    let (c, h, w) = self.attr.chw()?;
    let c2 = self.native.block_width()?;
    let consistent = match (self.native.format, self.native.dims.as_slice()) {
      (TensorFormat::Nchw, &[1, nc, nh, nw]) => (nc, nh, nw) == (c, h, w),
      (TensorFormat::Nhwc, &[1, nh, nw, nc]) => (nc, nh, nw) == (c, h, w),
      (TensorFormat::Nc1hwc2, &[1, c1, nh, nw, nc2]) => (nh, nw) == (h, w) && c1 * nc2 >= c,
      _ => false,
    };
    if !consistent {
      return Err(DecodeError::InvalidShape {
        name: self.native.name.clone(),
        dims: self.native.dims.clone(),
      });
    }
    Ok(c2)
  }

  /// 检查数据类型与缓冲区大小
  pub fn validate(&self) -> Result<(), DecodeError> {
    if self.data.dtype() != self.attr.dtype {
      return Err(DecodeError::DataTypeMismatch {
        name: self.attr.name.clone(),
        expected: self.attr.dtype,
        actual: self.data.dtype(),
      });
    }
    if !self.attr.dtype.is_float() {
      self.attr.quant.validate()?;
    }
    let expected = self.native.num_elements();
    if self.data.len() < expected {
      return Err(DecodeError::BufferTooSmall {
        name: self.attr.name.clone(),
        expected,
        actual: self.data.len(),
      });
    }
    Ok(())
  }
}
