// 该文件是 RkPost （山南后处理） 项目的一部分。
// src/output/directory_record.rs - 目录记录输出
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

use std::{
  borrow::Cow,
  path::{Path, PathBuf},
  sync::atomic::{AtomicU16, Ordering},
};

use chrono::{DateTime, Datelike, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  error::DecodeError,
  frame::OutputFrame,
  label::Labels,
  model::PostprocessResult,
  output::{Record, Render, records},
};

#[derive(Error, Debug)]
pub enum DirectoryRecordOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("未知的记录格式: {0}")]
  UnknownFormat(String),
  #[error("坐标还原错误: {0}")]
  DecodeError(#[from] DecodeError),
  #[error("序列化错误: {0}")]
  JsonError(#[from] serde_json::Error),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordFormat {
  /// 每行 `name, score, x, y, w, h`
  Text,
  Json,
}

impl RecordFormat {
  fn extension(&self) -> &'static str {
    match self {
      RecordFormat::Text => "txt",
      RecordFormat::Json => "json",
    }
  }
}

#[derive(Serialize)]
struct FrameRecord<'a> {
  frame: &'a str,
  records: &'a [Record],
}

/// 按日期目录保存每帧的结果
///
/// `folder:///dir?record=name|id&format=txt|json&always`
pub struct DirectoryRecordOutput {
  directory: PathBuf,
  labels: Labels,
  with_name: bool,
  format: RecordFormat,
  frame_counter: AtomicU16,
  always: bool,
}

impl FromUrlWithScheme for DirectoryRecordOutput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn from_url(uri: &Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(DirectoryRecordOutputError::SchemeMismatch);
    }

    let mut with_name = true;
    let mut format = RecordFormat::Text;
    let mut always = false;
    for (k, v) in uri.query_pairs() {
      match k.as_ref() {
        "record" => with_name = v != "id",
        "format" => {
          format = match v.as_ref() {
            "txt" | "text" => RecordFormat::Text,
            "json" => RecordFormat::Json,
            other => return Err(DirectoryRecordOutputError::UnknownFormat(other.to_string())),
          }
        }
        "always" => always = true,
        _ => warn!("忽略未知参数: {}={}", k, v),
      }
    }

    Ok(DirectoryRecordOutput {
      directory: PathBuf::from(uri.path()),
      labels: Labels::default(),
      with_name,
      format,
      frame_counter: AtomicU16::new(0),
      always,
    })
  }
}

impl DirectoryRecordOutput {
  pub fn with_labels(mut self, labels: Labels) -> Self {
    self.labels = labels;
    self
  }

  pub fn directory(&self) -> &Path {
    &self.directory
  }

  fn frame_id(&self) -> u16 {
    self.frame_counter.fetch_add(1, Ordering::Relaxed).wrapping_add(1)
  }

  fn frame_path(&self, now: DateTime<Utc>, frame: &OutputFrame) -> Result<PathBuf, std::io::Error> {
    let directory = self
      .directory
      .join(now.year().to_string())
      .join(format!("{:02}", now.month()))
      .join(format!("{:02}", now.day()));
    std::fs::create_dir_all(&directory)?;

    // 帧名只取最后一段，文件始终落在日期目录内
    let name = Path::new(&frame.name)
      .file_name()
      .map_or(Cow::Borrowed("frame"), |name| name.to_string_lossy());
    let filename = format!(
      "{}-{:04X}-{}.{}",
      now.format("%H-%M-%S"),
      self.frame_id(),
      name,
      self.format.extension()
    );
    Ok(directory.join(filename))
  }

  fn write_records(
    &self,
    path: &Path,
    frame: &OutputFrame,
    records: &[Record],
  ) -> Result<(), DirectoryRecordOutputError> {
    let content = match self.format {
      RecordFormat::Text => records
        .iter()
        .map(Record::to_string)
        .collect::<Vec<_>>()
        .join("\n"),
      RecordFormat::Json => serde_json::to_string(&FrameRecord {
        frame: &frame.name,
        records,
      })?,
    };
    std::fs::write(path, content)?;
    debug!("保存 {} 条结果到 {}", records.len(), path.display());
    Ok(())
  }
}

impl Render<OutputFrame, PostprocessResult> for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn render_result(
    &self,
    frame: &OutputFrame,
    result: &PostprocessResult,
  ) -> Result<(), Self::Error> {
    let records = records(frame, result, &self.labels, self.with_name)?;
    if self.always || !records.is_empty() {
      let path = self.frame_path(Utc::now(), frame)?;
      self.write_records(&path, frame, &records)?;
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    geometry::{Rect, Size},
    model::{DetectItem, DetectResult},
  };

  fn output_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("rkpost-record-{}-{}", name, std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    dir
  }

  fn frame() -> OutputFrame {
    named_frame("bus")
  }

  fn named_frame(name: &str) -> OutputFrame {
    OutputFrame {
      name: name.to_string(),
      input_size: Size::square(640),
      source_size: None,
      tensors: Vec::new(),
    }
  }

  fn written_files(dir: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    let mut stack = vec![dir.to_path_buf()];
    while let Some(dir) = stack.pop() {
      let Ok(entries) = std::fs::read_dir(&dir) else {
        continue;
      };
      for entry in entries {
        let path = entry.unwrap().path();
        if path.is_dir() {
          stack.push(path);
        } else {
          files.push(path);
        }
      }
    }
    files
  }

  #[test]
  fn parse_query() {
    let url = Url::parse("folder:///tmp/out?record=id&format=json&always").unwrap();
    let output = DirectoryRecordOutput::from_url(&url).unwrap();
    assert_eq!(output.directory(), Path::new("/tmp/out"));
    assert!(!output.with_name);
    assert_eq!(output.format, RecordFormat::Json);
    assert!(output.always);

    let url = Url::parse("folder:///tmp/out?format=xml").unwrap();
    assert!(matches!(
      DirectoryRecordOutput::from_url(&url),
      Err(DirectoryRecordOutputError::UnknownFormat(_))
    ));
  }

  #[test]
  fn writes_text_record_into_date_directory() {
    let dir = output_dir("text");
    let url = Url::parse(&format!("folder://{}", dir.display())).unwrap();
    let output = DirectoryRecordOutput::from_url(&url)
      .unwrap()
      .with_labels(Labels::coco());

    let result = PostprocessResult::Detect(DetectResult {
      items: vec![DetectItem {
        class_id: 5,
        score: 0.5,
        bbox: Rect::new(1.0, 2.0, 3.0, 4.0),
      }]
      .into_boxed_slice(),
    });
    output.render_result(&frame(), &result).unwrap();

    let files = written_files(&dir);
    assert_eq!(files.len(), 1);
    let path = &files[0];
    assert_eq!(path.extension().unwrap(), "txt");
    assert!(path.file_name().unwrap().to_string_lossy().ends_with("-0001-bus.txt"));
    // YYYY/MM/DD
    assert_eq!(path.strip_prefix(&dir).unwrap().components().count(), 4);
    assert_eq!(
      std::fs::read_to_string(path).unwrap(),
      "bus, 0.5000, 1.0000, 2.0000, 3.0000, 4.0000"
    );
  }

  #[test]
  fn skips_empty_results_unless_always() {
    let dir = output_dir("empty");
    let empty = PostprocessResult::Detect(DetectResult::default());

    let url = Url::parse(&format!("folder://{}?format=json", dir.display())).unwrap();
    let output = DirectoryRecordOutput::from_url(&url).unwrap();
    output.render_result(&frame(), &empty).unwrap();
    assert!(written_files(&dir).is_empty());

    let url = Url::parse(&format!("folder://{}?format=json&always", dir.display())).unwrap();
    let output = DirectoryRecordOutput::from_url(&url).unwrap();
    output.render_result(&frame(), &empty).unwrap();
    let files = written_files(&dir);
    assert_eq!(files.len(), 1);
    assert_eq!(
      std::fs::read_to_string(&files[0]).unwrap(),
      r#"{"frame":"bus","records":[]}"#
    );
  }

  #[test]
  fn frame_name_stays_inside_date_directory() {
    let dir = output_dir("escape");
    let url = Url::parse(&format!("folder://{}?always", dir.display())).unwrap();
    let output = DirectoryRecordOutput::from_url(&url).unwrap();
    let empty = PostprocessResult::Detect(DetectResult::default());

    output.render_result(&named_frame("../../escape"), &empty).unwrap();
    output.render_result(&named_frame(".."), &empty).unwrap();

    let mut names: Vec<String> = written_files(&dir)
      .iter()
      .map(|path| {
        assert_eq!(path.strip_prefix(&dir).unwrap().components().count(), 4);
        path.file_name().unwrap().to_string_lossy().into_owned()
      })
      .collect();
    names.sort();
    assert_eq!(names.len(), 2);
    assert!(names.iter().any(|n| n.ends_with("-0001-escape.txt")));
    assert!(names.iter().any(|n| n.ends_with("-0002-frame.txt")));
  }
}
