// 该文件是 RkPost （山南后处理） 项目的一部分。
// src/model.rs - 后处理策略
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

use serde::Serialize;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme, error::DecodeError, geometry::Rect, tensor::OutputTensor,
  transform::Transform,
};

/// 把一次推理的全部输出张量解码为结果
pub trait Postprocess {
  type Output;

  fn postprocess(&self, outputs: &[OutputTensor<'_>]) -> Result<Self::Output, DecodeError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DetectItem {
  pub class_id: u32,
  pub score: f32,
  /// 模型输入坐标系下的边框
  pub bbox: Rect,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DetectResult {
  pub items: Box<[DetectItem]>,
}

impl DetectResult {
  pub fn len(&self) -> usize {
    self.items.len()
  }

  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  pub fn iter(&self) -> std::slice::Iter<'_, DetectItem> {
    self.items.iter()
  }

  /// 把边框从模型输入坐标还原到原图坐标
  pub fn to_original(&self, transform: &Transform) -> DetectResult {
    let items = self
      .items
      .iter()
      .map(|item| DetectItem {
        bbox: transform.to_original(&item.bbox),
        ..*item
      })
      .collect();
    DetectResult { items }
  }
}

mod classify;
mod yolo;
pub use self::classify::{ClassItem, Classify, ClassifyBuilder, ClassifyResult};
pub use self::yolo::{Candidates, GridSpec, ScaleGroup, Yolo, YoloBuilder, decode_grid};

/// 配置时选定的后处理策略
#[derive(Debug, Clone)]
pub enum Postprocessor {
  Detect(Yolo),
  Classify(Classify),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "task", rename_all = "lowercase")]
pub enum PostprocessResult {
  Detect(DetectResult),
  Classify(ClassifyResult),
}

impl Postprocess for Postprocessor {
  type Output = PostprocessResult;

  fn postprocess(&self, outputs: &[OutputTensor<'_>]) -> Result<Self::Output, DecodeError> {
    match self {
      Postprocessor::Detect(yolo) => yolo.postprocess(outputs).map(PostprocessResult::Detect),
      Postprocessor::Classify(classify) => classify
        .postprocess(outputs)
        .map(PostprocessResult::Classify),
    }
  }
}

impl FromUrl for Postprocessor {
  type Error = DecodeError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      YoloBuilder::SCHEME => Ok(Postprocessor::Detect(YoloBuilder::from_url(url)?.build()?)),
      ClassifyBuilder::SCHEME => Ok(Postprocessor::Classify(
        ClassifyBuilder::from_url(url)?.build(),
      )),
      other => Err(DecodeError::SchemeMismatch {
        expected: format!("{} | {}", YoloBuilder::SCHEME, ClassifyBuilder::SCHEME),
        actual: other.to_string(),
      }),
    }
  }
}

impl From<Yolo> for Postprocessor {
  fn from(yolo: Yolo) -> Self {
    Postprocessor::Detect(yolo)
  }
}

impl From<Classify> for Postprocessor {
  fn from(classify: Classify) -> Self {
    Postprocessor::Classify(classify)
  }
}
