// 该文件是 RkPost （山南后处理） 项目的一部分。
// src/output/console.rs - 日志输出
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

use tracing::info;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  error::DecodeError,
  frame::OutputFrame,
  label::Labels,
  model::PostprocessResult,
  output::{OutputError, Render, records},
};

/// 通过 tracing 打印每条结果
///
/// `console:` 或 `console:?record=id`
#[derive(Debug, Default)]
pub struct ConsoleOutput {
  labels: Labels,
  with_id: bool,
}

impl FromUrlWithScheme for ConsoleOutput {
  const SCHEME: &'static str = "console";
}

impl FromUrl for ConsoleOutput {
  type Error = OutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(OutputError::SchemeMismatch(format!(
        "期望输出方式 '{}', 实际输出方式 '{}'",
        Self::SCHEME,
        url.scheme()
      )));
    }

    let with_id = url.query_pairs().any(|(k, v)| k == "record" && v == "id");
    Ok(ConsoleOutput {
      labels: Labels::default(),
      with_id,
    })
  }
}

impl ConsoleOutput {
  pub fn with_labels(mut self, labels: Labels) -> Self {
    self.labels = labels;
    self
  }
}

impl Render<OutputFrame, PostprocessResult> for ConsoleOutput {
  type Error = DecodeError;

  fn render_result(
    &self,
    frame: &OutputFrame,
    result: &PostprocessResult,
  ) -> Result<(), Self::Error> {
    let records = records(frame, result, &self.labels, !self.with_id)?;
    info!("帧 {}: {} 条结果", frame.name, records.len());
    for record in &records {
      info!("  {}", record);
    }
    Ok(())
  }
}
