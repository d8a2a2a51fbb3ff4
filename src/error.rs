// 该文件是 RkPost （山南后处理） 项目的一部分。
// src/error.rs - 解码错误定义
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

use thiserror::Error;

use crate::tensor::TensorType;

/// 后处理过程中的配置错误。
///
/// 数值计算本身不会失败，只有结构或参数不一致时才会返回错误。
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
  #[error("检测头 {head}: 网格尺寸不一致, 回归 {box_grid:?}, 分类 {score_grid:?}")]
  GridMismatch {
    head: usize,
    box_grid: (usize, usize),
    score_grid: (usize, usize),
  },
  #[error("检测头 {0}: 类别数为 0")]
  ZeroClasses(usize),
  #[error("检测头 {head}: 两个张量的通道数 {channels:?} 都不等于类别数 {classes}")]
  ClassCountMismatch {
    head: usize,
    classes: usize,
    channels: (usize, usize),
  },
  #[error("检测头 {head}: 回归通道数 {channels} 不是 4 的正整数倍")]
  InvalidBoxChannels { head: usize, channels: usize },
  #[error("张量 {name}: 形状无效 {dims:?}")]
  InvalidShape { name: String, dims: Vec<usize> },
  #[error("张量 {name}: 缓冲区过小, 需要 {expected}, 实际 {actual}")]
  BufferTooSmall {
    name: String,
    expected: usize,
    actual: usize,
  },
  #[error("张量 {name}: 数据类型 {actual:?} 与描述 {expected:?} 不一致")]
  DataTypeMismatch {
    name: String,
    expected: TensorType,
    actual: TensorType,
  },
  #[error("不支持的数据类型: {0:?}")]
  UnsupportedDataType(TensorType),
  #[error("输出数量 {0} 不是偶数, 无法按 (回归, 分类) 分组")]
  OddOutputCount(usize),
  #[error("没有输出张量")]
  NoOutputs,
  #[error("量化缩放系数无效: {0}")]
  InvalidQuantScale(f32),
  #[error("坐标变换无效: {0}")]
  InvalidTransform(String),
  #[error("阈值 {name} 无效: {value}")]
  InvalidThreshold { name: &'static str, value: f32 },
  #[error("参数 {name} 无效: {value}")]
  InvalidParam { name: String, value: String },
  #[error("URI 方案不匹配: 期望 '{expected}', 实际 '{actual}'")]
  SchemeMismatch { expected: String, actual: String },
}
