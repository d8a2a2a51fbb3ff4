// 该文件是 RkPost （山南后处理） 项目的一部分。
// src/bin/simple_oneshot.rs - 单帧后处理
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

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use url::Url;

use rkpost::{
  FromUrl,
  label::Labels,
  model::Postprocessor,
  task::{OneShotTask, Task},
};
use tracing::info;

/// RkPost 项目参数配置
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 后处理配置，如 yolo:?size=640x640&score=0.25&nms=0.7
  #[arg(long, value_name = "MODEL")]
  pub model: Url,
  /// 输入来源，如 dump:///path/to/frame.json
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 输出方式，如 console: 或 folder:///path?format=json
  #[arg(long, value_name = "OUTPUT")]
  pub output: Url,
  /// 标签文件，每行一个类别名称，缺省为 COCO 类别
  #[arg(long, value_name = "LABELS")]
  pub labels: Option<PathBuf>,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("后处理配置: {}", args.model);
  info!("输入来源: {}", args.input);
  info!("输出路径: {}", args.output);

  let labels = Labels::load_or_coco(args.labels.as_ref())?;

  let input = rkpost::input::InputWrapper::from_url(&args.input)?;
  let model = Postprocessor::from_url(&args.model)?;
  let output = rkpost::output::OutputWrapper::from_url(&args.output)?.with_labels(labels);

  OneShotTask.run_task(input, model, output)?;

  Ok(())
}
