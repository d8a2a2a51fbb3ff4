// 该文件是 RkPost （山南后处理） 项目的一部分。
// src/model/classify.rs - 分类模型 Top-K 后处理
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
use tracing::{debug, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  error::DecodeError,
  model::Postprocess,
  quant::{Quantization, Sample},
  tensor::{OutputTensor, TensorData},
};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ClassItem {
  pub index: u32,
  pub score: f32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ClassifyResult {
  pub items: Box<[ClassItem]>,
}

impl ClassifyResult {
  pub fn len(&self) -> usize {
    self.items.len()
  }

  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  pub fn iter(&self) -> std::slice::Iter<'_, ClassItem> {
    self.items.iter()
  }
}

/// 分类后处理，输出 `(1, classes)`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Classify {
  top_k: Option<usize>,
}

#[derive(Default)]
pub struct ClassifyBuilder {
  top_k: Option<usize>,
}

impl FromUrlWithScheme for ClassifyBuilder {
  const SCHEME: &'static str = "classify";
}

impl FromUrl for ClassifyBuilder {
  type Error = DecodeError;

  /// `classify:?top_k=5`
  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(DecodeError::SchemeMismatch {
        expected: Self::SCHEME.to_string(),
        actual: url.scheme().to_string(),
      });
    }

    let mut builder = ClassifyBuilder::default();
    for (k, v) in url.query_pairs() {
      match k.as_ref() {
        "top_k" => {
          builder.top_k = Some(v.parse().map_err(|_| DecodeError::InvalidParam {
            name: k.to_string(),
            value: v.to_string(),
          })?)
        }
        _ => warn!("忽略未知参数: {}={}", k, v),
      }
    }
    Ok(builder)
  }
}

impl ClassifyBuilder {
  pub fn top_k(mut self, top_k: usize) -> Self {
    self.top_k = Some(top_k);
    self
  }

  pub fn build(self) -> Classify {
    Classify { top_k: self.top_k }
  }
}

impl Classify {
  pub fn builder() -> ClassifyBuilder {
    ClassifyBuilder::default()
  }

  pub fn top_k(&self) -> Option<usize> {
    self.top_k
  }

  fn collect<T: Sample>(data: &[T], quant: Quantization, nc: usize) -> Vec<ClassItem> {
    data[..nc]
      .iter()
      .enumerate()
      .map(|(i, &s)| ClassItem {
        index: i as u32,
        score: quant.dequantize(s),
      })
      .collect()
  }
}

impl Postprocess for Classify {
  type Output = ClassifyResult;

  fn postprocess(&self, outputs: &[OutputTensor<'_>]) -> Result<Self::Output, DecodeError> {
    let tensor = outputs.first().ok_or(DecodeError::NoOutputs)?;
    tensor.validate()?;

    let nc = tensor.attr.num_elements();
    if tensor.data.len() < nc {
      return Err(DecodeError::BufferTooSmall {
        name: tensor.name().to_string(),
        expected: nc,
        actual: tensor.data.len(),
      });
    }
    let quant = tensor.attr.quantization();
    let mut items = match tensor.data {
      TensorData::Int8(data) => Self::collect(data, quant, nc),
      TensorData::UInt8(data) => Self::collect(data, quant, nc),
      TensorData::Float32(data) => Self::collect(data, quant, nc),
      TensorData::Float16(data) => Self::collect(data, quant, nc),
    };

    // 稳定排序，同分时保持类别顺序
    items.sort_by(|a, b| b.score.total_cmp(&a.score));
    let top_k = self.top_k.map_or(nc, |k| k.min(nc));
    items.truncate(top_k);

    debug!("分类 {} 个类别，保留前 {} 个", nc, items.len());
    Ok(ClassifyResult {
      items: items.into_boxed_slice(),
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::tensor::{TensorAttr, TensorFormat, TensorType};

  #[test]
  fn top_k_from_url() {
    let url = Url::parse("classify:?top_k=5").unwrap();
    assert_eq!(ClassifyBuilder::from_url(&url).unwrap().build().top_k(), Some(5));

    let url = Url::parse("classify:").unwrap();
    assert_eq!(ClassifyBuilder::from_url(&url).unwrap().build().top_k(), None);

    let url = Url::parse("classify:?top_k=-1").unwrap();
    assert!(ClassifyBuilder::from_url(&url).is_err());
  }

  #[test]
  fn sorts_quantized_scores() {
    let attr = TensorAttr::new(
      "prob",
      [1, 5],
      TensorFormat::Nchw,
      TensorType::Int8,
      Quantization::new(0.5, -10),
    );
    let data = [-10i8, 0, 10, 0, -4];
    let outputs = [OutputTensor::new(&attr, TensorData::from(&data[..]))];

    let result = Classify::builder().top_k(3).build().postprocess(&outputs).unwrap();
    let got: Vec<(u32, f32)> = result.iter().map(|c| (c.index, c.score)).collect();
    assert_eq!(got, vec![(2, 10.0), (1, 5.0), (3, 5.0)]);
  }

  #[test]
  fn oversized_top_k_keeps_all() {
    let attr = TensorAttr::new(
      "prob",
      [1, 3],
      TensorFormat::Nchw,
      TensorType::Float32,
      Quantization::IDENTITY,
    );
    let data = [0.2f32, 0.5, 0.3];
    let outputs = [OutputTensor::new(&attr, TensorData::from(&data[..]))];

    let result = Classify::builder().top_k(10).build().postprocess(&outputs).unwrap();
    assert_eq!(result.len(), 3);
    assert_eq!(result.items[0].index, 1);

    assert!(matches!(
      Classify::default().postprocess(&[]),
      Err(DecodeError::NoOutputs)
    ));
  }

  #[test]
  fn native_shorter_than_logical_is_rejected() {
    let attr = TensorAttr::new(
      "prob",
      [1, 8],
      TensorFormat::Nchw,
      TensorType::Int8,
      Quantization::new(1.0, 0),
    );
    let native = TensorAttr::new(
      "prob",
      [1, 4],
      TensorFormat::Nchw,
      TensorType::Int8,
      Quantization::new(1.0, 0),
    );
    let data = [1i8, 2, 3, 4];
    let tensor = OutputTensor::with_native(&attr, &native, TensorData::from(&data[..]));
    assert!(tensor.validate().is_ok());

    assert_eq!(
      Classify::default().postprocess(&[tensor]),
      Err(DecodeError::BufferTooSmall {
        name: "prob".to_string(),
        expected: 8,
        actual: 4,
      })
    );
  }
}
