// 该文件是 RkPost （山南后处理） 项目的一部分。
// src/output.rs - 输出定义
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

use std::fmt;

use serde::Serialize;
use thiserror::Error;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  error::DecodeError,
  frame::OutputFrame,
  geometry::Rect,
  label::Labels,
  model::PostprocessResult,
};

pub trait Render<Frame, Output>: Sized {
  type Error;
  fn render_result(&self, frame: &Frame, result: &Output) -> Result<(), Self::Error>;
}

mod console;
pub use self::console::ConsoleOutput;

#[cfg(feature = "directory_record")]
mod directory_record;
#[cfg(feature = "directory_record")]
pub use self::directory_record::{DirectoryRecordOutput, DirectoryRecordOutputError};

#[derive(Error, Debug)]
pub enum OutputError {
  #[cfg(feature = "directory_record")]
  #[error("目录记录输出错误: {0}")]
  DirectoryRecordOutputError(#[from] DirectoryRecordOutputError),
  #[error("坐标还原错误: {0}")]
  DecodeError(#[from] DecodeError),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

/// 一条结果记录，检测框已还原到原图坐标
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Record {
  pub label: String,
  pub class_id: u32,
  pub score: f32,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub bbox: Option<Rect>,
}

/// `name, score, x, y, w, h`
impl fmt::Display for Record {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}, {:.4}", self.label, self.score)?;
    if let Some(bbox) = &self.bbox {
      write!(
        f,
        ", {:.4}, {:.4}, {:.4}, {:.4}",
        bbox.x, bbox.y, bbox.width, bbox.height
      )?;
    }
    Ok(())
  }
}

/// 把后处理结果整理为记录
///
/// `with_name` 为假时标签使用类别编号。
pub fn records(
  frame: &OutputFrame,
  result: &PostprocessResult,
  labels: &Labels,
  with_name: bool,
) -> Result<Vec<Record>, DecodeError> {
  let label = |id: u32| {
    if with_name {
      labels.name(id).into_owned()
    } else {
      id.to_string()
    }
  };

  let records = match result {
    PostprocessResult::Detect(detect) => {
      let transform = frame.transform()?;
      detect
        .to_original(&transform)
        .iter()
        .map(|item| Record {
          label: label(item.class_id),
          class_id: item.class_id,
          score: item.score,
          bbox: Some(item.bbox),
        })
        .collect()
    }
    PostprocessResult::Classify(classify) => classify
      .iter()
      .map(|item| Record {
        label: label(item.index),
        class_id: item.index,
        score: item.score,
        bbox: None,
      })
      .collect(),
  };
  Ok(records)
}

pub enum OutputWrapper {
  Console(ConsoleOutput),
  #[cfg(feature = "directory_record")]
  DirectoryRecord(DirectoryRecordOutput),
}

impl FromUrl for OutputWrapper {
  type Error = OutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      ConsoleOutput::SCHEME => Ok(OutputWrapper::Console(ConsoleOutput::from_url(url)?)),
      #[cfg(feature = "directory_record")]
      DirectoryRecordOutput::SCHEME => {
        let output = DirectoryRecordOutput::from_url(url)?;
        Ok(OutputWrapper::DirectoryRecord(output))
      }
      other => Err(OutputError::SchemeMismatch(other.to_string())),
    }
  }
}

impl OutputWrapper {
  pub fn with_labels(self, labels: Labels) -> Self {
    match self {
      OutputWrapper::Console(output) => OutputWrapper::Console(output.with_labels(labels)),
      #[cfg(feature = "directory_record")]
      OutputWrapper::DirectoryRecord(output) => {
        OutputWrapper::DirectoryRecord(output.with_labels(labels))
      }
    }
  }
}

impl Render<OutputFrame, PostprocessResult> for OutputWrapper {
  type Error = OutputError;

  fn render_result(
    &self,
    frame: &OutputFrame,
    result: &PostprocessResult,
  ) -> Result<(), Self::Error> {
    match self {
      OutputWrapper::Console(output) => output
        .render_result(frame, result)
        .map_err(OutputError::from),
      #[cfg(feature = "directory_record")]
      OutputWrapper::DirectoryRecord(output) => output
        .render_result(frame, result)
        .map_err(OutputError::from),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    geometry::Size,
    model::{ClassItem, ClassifyResult, DetectItem, DetectResult},
  };

  fn frame(source_size: Option<Size>) -> OutputFrame {
    OutputFrame {
      name: "f".to_string(),
      input_size: Size::square(640),
      source_size,
      tensors: Vec::new(),
    }
  }

  #[test]
  fn detection_records_are_restored() {
    let result = PostprocessResult::Detect(DetectResult {
      items: vec![DetectItem {
        class_id: 0,
        score: 0.87654,
        bbox: Rect::new(100.0, 240.0, 50.0, 20.0),
      }]
      .into_boxed_slice(),
    });

    let recs = records(&frame(Some(Size::new(1280, 720))), &result, &Labels::coco(), true).unwrap();
    assert_eq!(recs[0].label, "person");
    assert_eq!(recs[0].bbox, Some(Rect::new(200.0, 200.0, 100.0, 40.0)));
    assert_eq!(
      recs[0].to_string(),
      "person, 0.8765, 200.0000, 200.0000, 100.0000, 40.0000"
    );

    let recs = records(&frame(None), &result, &Labels::coco(), false).unwrap();
    assert_eq!(recs[0].label, "0");
    assert_eq!(recs[0].bbox, Some(Rect::new(100.0, 240.0, 50.0, 20.0)));
  }

  #[test]
  fn classification_records_have_no_box() {
    let result = PostprocessResult::Classify(ClassifyResult {
      items: vec![ClassItem {
        index: 3,
        score: 0.5,
      }]
      .into_boxed_slice(),
    });
    let recs = records(&frame(None), &result, &Labels::default(), true).unwrap();
    assert_eq!(recs[0].to_string(), "3, 0.5000");
  }

  #[test]
  fn select_output_by_scheme() {
    let url = Url::parse("console:").unwrap();
    assert!(matches!(OutputWrapper::from_url(&url), Ok(OutputWrapper::Console(_))));
    let url = Url::parse("rtsp://localhost/live").unwrap();
    assert!(matches!(
      OutputWrapper::from_url(&url),
      Err(OutputError::SchemeMismatch(_))
    ));
  }
}
