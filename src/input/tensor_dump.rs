// 该文件是 RkPost （山南后处理） 项目的一部分。
// src/input/tensor_dump.rs - 张量转储文件输入
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
  collections::VecDeque,
  path::{Path, PathBuf},
};

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::{OutputFrame, OwnedData, OwnedTensor},
  geometry::Size,
  quant::Quantization,
  tensor::{TensorAttr, TensorFormat, TensorType},
};

#[derive(Error, Debug)]
pub enum TensorDumpInputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("I/O 错误 {path}: {source}")]
  IoError {
    path: PathBuf,
    source: std::io::Error,
  },
  #[error("清单格式错误 {path}: {source}")]
  ManifestError {
    path: PathBuf,
    source: serde_json::Error,
  },
  #[error("张量 {name}: 数据文件过小, 需要 {expected} 字节, 实际 {actual} 字节")]
  DataTooShort {
    name: String,
    expected: usize,
    actual: usize,
  },
  #[error("目录 {0} 中没有清单文件")]
  EmptyDirectory(PathBuf),
}

/// 清单文件中的一帧
///
/// ```json
/// {
///   "name": "bus",
///   "input_size": { "width": 640, "height": 640 },
///   "source_size": { "width": 810, "height": 1080 },
///   "outputs": [
///     { "name": "reg0", "dims": [1, 64, 80, 80], "dtype": "int8",
///       "scale": 0.06, "zero_point": -128, "file": "reg0.bin",
///       "native": { "dims": [1, 4, 80, 80, 16], "format": "nc1hwc2" } }
///   ]
/// }
/// ```
#[derive(Debug, Deserialize)]
struct FrameManifest {
  name: Option<String>,
  input_size: Size,
  source_size: Option<Size>,
  outputs: Vec<TensorManifest>,
}

#[derive(Debug, Deserialize)]
struct TensorManifest {
  name: String,
  dims: Vec<usize>,
  #[serde(default = "default_format")]
  format: TensorFormat,
  dtype: TensorType,
  #[serde(default = "default_scale")]
  scale: f32,
  #[serde(default)]
  zero_point: i32,
  file: PathBuf,
  native: Option<NativeManifest>,
}

#[derive(Debug, Deserialize)]
struct NativeManifest {
  dims: Vec<usize>,
  format: TensorFormat,
}

fn default_format() -> TensorFormat {
  TensorFormat::Nchw
}

fn default_scale() -> f32 {
  1.0
}

fn read_file(path: &Path) -> Result<Vec<u8>, TensorDumpInputError> {
  std::fs::read(path).map_err(|source| TensorDumpInputError::IoError {
    path: path.to_path_buf(),
    source,
  })
}

impl TensorManifest {
  fn load(self, base: &Path) -> Result<OwnedTensor, TensorDumpInputError> {
    let quant = Quantization::new(self.scale, self.zero_point);
    let attr = TensorAttr::new(self.name, self.dims, self.format, self.dtype, quant);
    let native = self.native.map(|native| TensorAttr {
      dims: native.dims,
      format: native.format,
      ..attr.clone()
    });

    let path = base.join(&self.file);
    let bytes = read_file(&path)?;
    let elements = native.as_ref().unwrap_or(&attr).num_elements();
    let expected = elements * attr.dtype.size_of();
    if bytes.len() < expected {
      error!("张量 {} 的数据文件 {} 过小", attr.name, path.display());
      return Err(TensorDumpInputError::DataTooShort {
        name: attr.name,
        expected,
        actual: bytes.len(),
      });
    }

    let data = OwnedData::from_le_bytes(attr.dtype, &bytes[..expected]);
    debug!(
      "读取张量 {}: {:?} {:?} {:?}",
      attr.name, attr.dims, attr.format, attr.dtype
    );
    Ok(OwnedTensor { attr, native, data })
  }
}

fn load_frame(path: &Path) -> Result<OutputFrame, TensorDumpInputError> {
  let bytes = read_file(path)?;
  let manifest: FrameManifest =
    serde_json::from_slice(&bytes).map_err(|source| TensorDumpInputError::ManifestError {
      path: path.to_path_buf(),
      source,
    })?;

  let base = path.parent().unwrap_or_else(|| Path::new("."));
  let tensors = manifest
    .outputs
    .into_iter()
    .map(|tensor| tensor.load(base))
    .collect::<Result<Vec<_>, _>>()?;

  let name = match manifest.name {
    Some(name) => name,
    None => path
      .file_stem()
      .map(|stem| stem.to_string_lossy().into_owned())
      .unwrap_or_default(),
  };

  Ok(OutputFrame {
    name,
    input_size: manifest.input_size,
    source_size: manifest.source_size,
    tensors,
  })
}

/// 目录中按文件名排序的全部 `*.json` 清单
fn list_manifests(dir: &Path) -> Result<Vec<PathBuf>, TensorDumpInputError> {
  let entries = std::fs::read_dir(dir).map_err(|source| TensorDumpInputError::IoError {
    path: dir.to_path_buf(),
    source,
  })?;

  let mut manifests = Vec::new();
  for entry in entries {
    let path = entry
      .map_err(|source| TensorDumpInputError::IoError {
        path: dir.to_path_buf(),
        source,
      })?
      .path();
    if path.is_file() && path.extension().is_some_and(|ext| ext == "json") {
      manifests.push(path);
    }
  }
  if manifests.is_empty() {
    return Err(TensorDumpInputError::EmptyDirectory(dir.to_path_buf()));
  }
  manifests.sort();
  Ok(manifests)
}

/// 从磁盘读取推理输出的转储
///
/// `dump:///path/to/frame.json` 或 `dump:///path/to/dir`
pub struct TensorDumpInput {
  frames: VecDeque<OutputFrame>,
}

impl FromUrlWithScheme for TensorDumpInput {
  const SCHEME: &'static str = "dump";
}

impl FromUrl for TensorDumpInput {
  type Error = TensorDumpInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI 方案不匹配: 期望 '{}', 实际 '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(TensorDumpInputError::SchemeMismatch);
    }

    Self::open(url.path())
  }
}

impl TensorDumpInput {
  pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, TensorDumpInputError> {
    let path = path.as_ref();
    let manifests = if path.is_dir() {
      list_manifests(path)?
    } else {
      vec![path.to_path_buf()]
    };

    let frames = manifests
      .iter()
      .map(|manifest| load_frame(manifest))
      .collect::<Result<VecDeque<_>, _>>()?;
    info!("从 {} 读取 {} 帧", path.display(), frames.len());

    Ok(Self { frames })
  }

  pub fn len(&self) -> usize {
    self.frames.len()
  }

  pub fn is_empty(&self) -> bool {
    self.frames.is_empty()
  }
}

impl Iterator for TensorDumpInput {
  type Item = OutputFrame;

  fn next(&mut self) -> Option<Self::Item> {
    self.frames.pop_front()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn fixture_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("rkpost-dump-{}-{}", name, std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
  }

  #[test]
  fn reads_manifest_and_native_layout() {
    let dir = fixture_dir("native");
    std::fs::write(dir.join("score.bin"), [1u8, 2, 3, 4, 0, 0, 0, 0]).unwrap();
    std::fs::write(
      dir.join("frame.json"),
      r#"{
        "input_size": { "width": 64, "height": 64 },
        "outputs": [
          { "name": "score", "dims": [1, 2, 1, 2], "dtype": "uint8",
            "scale": 0.5, "file": "score.bin",
            "native": { "dims": [1, 1, 1, 2, 4], "format": "nc1hwc2" } }
        ]
      }"#,
    )
    .unwrap();

    let url = Url::from_file_path(dir.join("frame.json")).unwrap();
    let url = Url::parse(&url.as_str().replacen("file:", "dump:", 1)).unwrap();
    let mut input = TensorDumpInput::from_url(&url).unwrap();
    assert_eq!(input.len(), 1);

    let frame = input.next().unwrap();
    assert_eq!(frame.name, "frame");
    assert_eq!(frame.source_size, None);
    let tensor = &frame.tensors[0];
    assert_eq!(tensor.attr.format, TensorFormat::Nchw);
    assert_eq!(tensor.attr.quant, Quantization::new(0.5, 0));
    assert_eq!(tensor.native.as_ref().map(|n| n.format), Some(TensorFormat::Nc1hwc2));
    assert_eq!(tensor.data, OwnedData::UInt8(vec![1, 2, 3, 4, 0, 0, 0, 0]));
    assert!(input.next().is_none());
  }

  #[test]
  fn reads_sorted_directory() {
    let dir = fixture_dir("dir");
    std::fs::write(dir.join("a.bin"), 1.5f32.to_le_bytes()).unwrap();
    for name in ["b", "a"] {
      std::fs::write(
        dir.join(format!("{}.json", name)),
        format!(
          r#"{{ "name": "{}", "input_size": {{ "width": 8, "height": 8 }},
               "outputs": [ {{ "name": "t", "dims": [1, 1, 1, 1],
                               "dtype": "float32", "file": "a.bin" }} ] }}"#,
          name
        ),
      )
      .unwrap();
    }

    let input = TensorDumpInput::open(&dir).unwrap();
    let names: Vec<String> = input.map(|frame| frame.name).collect();
    assert_eq!(names, vec!["a", "b"]);
  }

  #[test]
  fn rejects_short_data() {
    let dir = fixture_dir("short");
    std::fs::write(dir.join("t.bin"), [0u8; 3]).unwrap();
    std::fs::write(
      dir.join("frame.json"),
      r#"{ "input_size": { "width": 8, "height": 8 },
           "outputs": [ { "name": "t", "dims": [1, 1, 1, 1],
                          "dtype": "float32", "file": "t.bin" } ] }"#,
    )
    .unwrap();

    assert!(matches!(
      TensorDumpInput::open(dir.join("frame.json")),
      Err(TensorDumpInputError::DataTooShort {
        expected: 4,
        actual: 3,
        ..
      })
    ));
    assert!(matches!(
      TensorDumpInput::open(fixture_dir("empty")),
      Err(TensorDumpInputError::EmptyDirectory(_))
    ));
  }
}
