// 该文件是 RkPost （山南后处理） 项目的一部分。
// src/geometry.rs - 尺寸与矩形
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

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DecodeError;

/// 图像或张量尺寸（像素）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Size {
  pub width: u32,
  pub height: u32,
}

impl Size {
  pub const fn new(width: u32, height: u32) -> Self {
    Self { width, height }
  }

  pub const fn square(size: u32) -> Self {
    Self {
      width: size,
      height: size,
    }
  }

  pub fn area(&self) -> u64 {
    self.width as u64 * self.height as u64
  }
}

/// 解析 `640x480` 或 `640`
impl FromStr for Size {
  type Err = DecodeError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let invalid = || DecodeError::InvalidParam {
      name: "size".to_string(),
      value: s.to_string(),
    };
    let parse = |v: &str| v.trim().parse::<u32>().map_err(|_| invalid());

    let size = match s.split_once(['x', 'X']) {
      Some((w, h)) => Size::new(parse(w)?, parse(h)?),
      None => Size::square(parse(s)?),
    };
    if size.width == 0 || size.height == 0 {
      return Err(invalid());
    }
    Ok(size)
  }
}

impl std::fmt::Display for Size {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}x{}", self.width, self.height)
  }
}

/// 轴对齐矩形，左上角 + 宽高
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
  pub x: f32,
  pub y: f32,
  pub width: f32,
  pub height: f32,
}

impl Rect {
  pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
    Self {
      x,
      y,
      width,
      height,
    }
  }

  pub fn from_xyxy(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
    Self::new(x1, y1, x2 - x1, y2 - y1)
  }

  pub fn x2(&self) -> f32 {
    self.x + self.width
  }

  pub fn y2(&self) -> f32 {
    self.y + self.height
  }

  pub fn to_xyxy(&self) -> [f32; 4] {
    [self.x, self.y, self.x2(), self.y2()]
  }

  pub fn approx_eq(&self, other: &Rect, delta: f32) -> bool {
    let eq = |a: f32, b: f32| (a - b).abs() <= delta;
    eq(self.x, other.x)
      && eq(self.y, other.y)
      && eq(self.width, other.width)
      && eq(self.height, other.height)
  }
}
