// 该文件是 RkPost （山南后处理） 项目的一部分。
// src/frame.rs - 一次推理的输出帧
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

use crate::{
  error::DecodeError,
  geometry::Size,
  tensor::{OutputTensor, TensorAttr, TensorData, TensorType},
  transform::Transform,
};

/// 持有所有权的张量数据
#[derive(Debug, Clone, PartialEq)]
pub enum OwnedData {
  Int8(Vec<i8>),
  UInt8(Vec<u8>),
  Float32(Vec<f32>),
  Float16(Vec<f16>),
}

impl OwnedData {
  /// 按小端序解析原始字节，不足一个元素的尾部字节被忽略
  pub fn from_le_bytes(dtype: TensorType, bytes: &[u8]) -> Self {
    match dtype {
      TensorType::Int8 => OwnedData::Int8(bytes.iter().map(|&b| b as i8).collect()),
      TensorType::UInt8 => OwnedData::UInt8(bytes.to_vec()),
      TensorType::Float32 => OwnedData::Float32(
        bytes
          .chunks_exact(4)
          .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
          .collect(),
      ),
      TensorType::Float16 => OwnedData::Float16(
        bytes
          .chunks_exact(2)
          .map(|b| f16::from_le_bytes([b[0], b[1]]))
          .collect(),
      ),
    }
  }

  pub fn as_data(&self) -> TensorData<'_> {
    match self {
      OwnedData::Int8(data) => TensorData::Int8(data),
      OwnedData::UInt8(data) => TensorData::UInt8(data),
      OwnedData::Float32(data) => TensorData::Float32(data),
      OwnedData::Float16(data) => TensorData::Float16(data),
    }
  }

  pub fn len(&self) -> usize {
    self.as_data().len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OwnedTensor {
  pub attr: TensorAttr,
  /// 原生布局，与逻辑布局相同时为 `None`
  pub native: Option<TensorAttr>,
  pub data: OwnedData,
}

impl OwnedTensor {
  pub fn as_output(&self) -> OutputTensor<'_> {
    let native = self.native.as_ref().unwrap_or(&self.attr);
    OutputTensor::with_native(&self.attr, native, self.data.as_data())
  }
}

/// 一次推理的全部输出
#[derive(Debug, Clone, PartialEq)]
pub struct OutputFrame {
  pub name: String,
  /// 模型输入张量尺寸
  pub input_size: Size,
  /// 原图尺寸，未知时不做坐标还原
  pub source_size: Option<Size>,
  pub tensors: Vec<OwnedTensor>,
}

impl OutputFrame {
  pub fn as_outputs(&self) -> Vec<OutputTensor<'_>> {
    self.tensors.iter().map(OwnedTensor::as_output).collect()
  }

  /// 原图到模型输入的变换
  pub fn transform(&self) -> Result<Transform, DecodeError> {
    match self.source_size {
      Some(source) => Transform::letterbox(source, self.input_size),
      None => Ok(Transform::identity()),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{quant::Quantization, tensor::TensorFormat};

  #[test]
  fn parse_little_endian() {
    let bytes = [0x00, 0x00, 0x80, 0x3f, 0x00, 0x00, 0x00, 0xc0, 0xff];
    assert_eq!(
      OwnedData::from_le_bytes(TensorType::Float32, &bytes),
      OwnedData::Float32(vec![1.0, -2.0])
    );
    assert_eq!(
      OwnedData::from_le_bytes(TensorType::Int8, &[0xff, 0x01]),
      OwnedData::Int8(vec![-1, 1])
    );
    assert_eq!(
      OwnedData::from_le_bytes(TensorType::Float16, &[0x00, 0x3c]),
      OwnedData::Float16(vec![f16::ONE])
    );
  }

  #[test]
  fn frame_lends_outputs() {
    let attr = TensorAttr::new(
      "score",
      [1, 2, 1, 1],
      TensorFormat::Nchw,
      TensorType::UInt8,
      Quantization::new(0.5, 0),
    );
    let frame = OutputFrame {
      name: "f".to_string(),
      input_size: Size::square(640),
      source_size: Some(Size::new(1280, 720)),
      tensors: vec![OwnedTensor {
        attr: attr.clone(),
        native: None,
        data: OwnedData::UInt8(vec![1, 2]),
      }],
    };
    let outputs = frame.as_outputs();
    assert_eq!(outputs.len(), 1);
    assert_eq!(outputs[0].native, &attr);
    assert!(outputs[0].validate().is_ok());

    let t = frame.transform().unwrap();
    assert_eq!(t.scale(), 0.5);
    assert_eq!(t.offset(), (0.0, 140.0));
  }
}
