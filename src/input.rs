// 该文件是 RkPost （山南后处理） 项目的一部分。
// src/input.rs - 输出帧来源
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
use url::Url;

use crate::{FromUrl, frame::OutputFrame};

#[cfg(feature = "dump_input")]
mod tensor_dump;
#[cfg(feature = "dump_input")]
pub use self::tensor_dump::{TensorDumpInput, TensorDumpInputError};

#[derive(Error, Debug)]
pub enum InputError {
  #[cfg(feature = "dump_input")]
  #[error("张量转储输入错误: {0}")]
  TensorDumpInputError(#[from] TensorDumpInputError),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

pub enum InputWrapper {
  #[cfg(feature = "dump_input")]
  TensorDump(TensorDumpInput),
}

impl FromUrl for InputWrapper {
  type Error = InputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    #[cfg(feature = "dump_input")]
    {
      use crate::FromUrlWithScheme;

      if url.scheme() == TensorDumpInput::SCHEME {
        let input = TensorDumpInput::from_url(url)?;
        return Ok(InputWrapper::TensorDump(input));
      }
    }
    Err(InputError::SchemeMismatch(url.scheme().to_string()))
  }
}

impl Iterator for InputWrapper {
  type Item = OutputFrame;

  fn next(&mut self) -> Option<Self::Item> {
    match self {
      #[cfg(feature = "dump_input")]
      InputWrapper::TensorDump(input) => input.next(),
    }
  }
}
