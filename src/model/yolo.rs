// 该文件是 RkPost （山南后处理） 项目的一部分。
// src/model/yolo.rs - YOLO DFL 检测后处理
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

use tracing::{debug, error, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme, dfl,
  error::DecodeError,
  geometry::{Rect, Size},
  layout,
  model::{DetectItem, DetectResult, Postprocess},
  nms::nms_per_class,
  quant::{Quantization, Sample},
  tensor::{OutputTensor, TensorData},
};

const YOLO_INPUT_SIZE: Size = Size::square(640);
const YOLO_SCORE_THRESH: f32 = 0.25;
const YOLO_NMS_THRESH: f32 = 0.7;

/// YOLO 检测后处理
///
/// 输出按检测头成对排列 `(回归, 分类)`：
/// `(1, 4*dfl, 80, 80) (1, cls, 80, 80) (1, 4*dfl, 40, 40) ...`
#[derive(Debug, Clone, PartialEq)]
pub struct Yolo {
  input_size: Size,
  score_threshold: f32,
  nms_threshold: f32,
  num_classes: Option<usize>,
}

pub struct YoloBuilder {
  input_size: Size,
  score_threshold: f32,
  nms_threshold: f32,
  num_classes: Option<usize>,
}

impl Default for YoloBuilder {
  fn default() -> Self {
    Self {
      input_size: YOLO_INPUT_SIZE,
      score_threshold: YOLO_SCORE_THRESH,
      nms_threshold: YOLO_NMS_THRESH,
      num_classes: None,
    }
  }
}

impl FromUrlWithScheme for YoloBuilder {
  const SCHEME: &'static str = "yolo";
}

impl FromUrl for YoloBuilder {
  type Error = DecodeError;

  /// `yolo:?size=640x640&score=0.25&nms=0.7&classes=80`
  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(DecodeError::SchemeMismatch {
        expected: Self::SCHEME.to_string(),
        actual: url.scheme().to_string(),
      });
    }

    let mut builder = YoloBuilder::default();
    for (k, v) in url.query_pairs() {
      let invalid = || DecodeError::InvalidParam {
        name: k.to_string(),
        value: v.to_string(),
      };
      match k.as_ref() {
        "size" => builder.input_size = v.parse()?,
        "score" => builder.score_threshold = v.parse().map_err(|_| invalid())?,
        "nms" => builder.nms_threshold = v.parse().map_err(|_| invalid())?,
        "classes" => builder.num_classes = Some(v.parse().map_err(|_| invalid())?),
        _ => warn!("忽略未知参数: {}={}", k, v),
      }
    }
    Ok(builder)
  }
}

impl YoloBuilder {
  pub fn input_size(mut self, size: Size) -> Self {
    self.input_size = size;
    self
  }

  pub fn score_threshold(mut self, threshold: f32) -> Self {
    self.score_threshold = threshold;
    self
  }

  pub fn nms_threshold(mut self, threshold: f32) -> Self {
    self.nms_threshold = threshold;
    self
  }

  pub fn num_classes(mut self, classes: usize) -> Self {
    self.num_classes = Some(classes);
    self
  }

  pub fn build(self) -> Result<Yolo, DecodeError> {
    let mut yolo = Yolo {
      input_size: self.input_size,
      score_threshold: YOLO_SCORE_THRESH,
      nms_threshold: YOLO_NMS_THRESH,
      num_classes: None,
    };
    yolo.set_input_size(self.input_size)?;
    yolo.set_score_threshold(self.score_threshold)?;
    yolo.set_nms_threshold(self.nms_threshold)?;
    if let Some(classes) = self.num_classes {
      yolo.set_num_classes(classes)?;
    }
    debug!(
      "YOLO 后处理: 输入 {}, 分数阈值 {}, NMS 阈值 {}, 类别数 {:?}",
      yolo.input_size, yolo.score_threshold, yolo.nms_threshold, yolo.num_classes
    );
    Ok(yolo)
  }
}

impl Yolo {
  pub fn builder() -> YoloBuilder {
    YoloBuilder::default()
  }

  pub fn input_size(&self) -> Size {
    self.input_size
  }

  pub fn score_threshold(&self) -> f32 {
    self.score_threshold
  }

  pub fn nms_threshold(&self) -> f32 {
    self.nms_threshold
  }

  pub fn num_classes(&self) -> Option<usize> {
    self.num_classes
  }

  pub fn set_input_size(&mut self, size: Size) -> Result<(), DecodeError> {
    if size.area() == 0 {
      return Err(DecodeError::InvalidParam {
        name: "size".to_string(),
        value: size.to_string(),
      });
    }
    self.input_size = size;
    Ok(())
  }

  pub fn set_score_threshold(&mut self, threshold: f32) -> Result<(), DecodeError> {
    if !threshold.is_finite() {
      return Err(DecodeError::InvalidThreshold {
        name: "score",
        value: threshold,
      });
    }
    self.score_threshold = threshold;
    Ok(())
  }

  pub fn set_nms_threshold(&mut self, threshold: f32) -> Result<(), DecodeError> {
    if !(0.0..=1.0).contains(&threshold) {
      return Err(DecodeError::InvalidThreshold {
        name: "nms",
        value: threshold,
      });
    }
    self.nms_threshold = threshold;
    Ok(())
  }

  pub fn set_num_classes(&mut self, classes: usize) -> Result<(), DecodeError> {
    if classes == 0 {
      return Err(DecodeError::InvalidParam {
        name: "classes".to_string(),
        value: classes.to_string(),
      });
    }
    self.num_classes = Some(classes);
    Ok(())
  }
}

/// NMS 之前的候选框，三个序列一一对应
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Candidates {
  pub boxes: Vec<Rect>,
  pub scores: Vec<f32>,
  pub classes: Vec<u32>,
}

impl Candidates {
  pub fn len(&self) -> usize {
    self.boxes.len()
  }

  pub fn is_empty(&self) -> bool {
    self.boxes.is_empty()
  }

  pub fn push(&mut self, bbox: Rect, score: f32, class_id: u32) {
    self.boxes.push(bbox);
    self.scores.push(score);
    self.classes.push(class_id);
  }

  pub fn append(&mut self, other: &mut Candidates) {
    self.boxes.append(&mut other.boxes);
    self.scores.append(&mut other.scores);
    self.classes.append(&mut other.classes);
  }
}

/// 同一检测头的回归与分类张量
#[derive(Debug, Clone, Copy)]
pub struct ScaleGroup<'a> {
  pub head: usize,
  pub boxes: OutputTensor<'a>,
  pub scores: OutputTensor<'a>,
}

/// 单个检测头的解码参数
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridSpec {
  pub height: usize,
  pub width: usize,
  pub classes: usize,
  pub bins: usize,
  /// 网格到模型输入的缩放 `input_width / grid_width`
  pub scale: f32,
  pub box_quant: Quantization,
  pub score_quant: Quantization,
}

/// 根据通道数匹配回归和分类输出
///
/// 已知类别数时允许两者顺序交换，否则认为回归在前。
fn match_reg_cls_tensors<'a>(
  head: usize,
  tensor1: OutputTensor<'a>,
  tensor2: OutputTensor<'a>,
  num_classes: Option<usize>,
) -> Result<ScaleGroup<'a>, DecodeError> {
  let Some(classes) = num_classes else {
    return Ok(ScaleGroup {
      head,
      boxes: tensor1,
      scores: tensor2,
    });
  };

  let (c1, _, _) = tensor1.attr.chw()?;
  let (c2, _, _) = tensor2.attr.chw()?;
  if c2 == classes {
    debug!(
      "检测头 {}: 输出顺序正常 - {} 是回归，{} 是分类",
      head,
      tensor1.name(),
      tensor2.name()
    );
    Ok(ScaleGroup {
      head,
      boxes: tensor1,
      scores: tensor2,
    })
  } else if c1 == classes {
    debug!(
      "检测头 {}: 输出顺序交换 - {} 是分类，{} 是回归",
      head,
      tensor1.name(),
      tensor2.name()
    );
    Ok(ScaleGroup {
      head,
      boxes: tensor2,
      scores: tensor1,
    })
  } else {
    error!(
      "检测头 {}: 通道数不匹配 - {}: {}, {}: {}, 期望分类: {}",
      head,
      tensor1.name(),
      c1,
      tensor2.name(),
      c2,
      classes
    );
    Err(DecodeError::ClassCountMismatch {
      head,
      classes,
      channels: (c1, c2),
    })
  }
}

/// 解码一个检测头
///
/// `boxes` 与 `scores` 均为通道主序。分数阈值在量化域比较 (严格大于)，
/// 只有通过阈值的网格才做反量化与 DFL。
pub fn decode_grid<T: Sample>(
  boxes: &[T],
  scores: &[T],
  spec: &GridSpec,
  threshold: T,
  out: &mut Candidates,
) {
  let total = spec.height * spec.width;
  let mut dfl = vec![0.0f32; 4 * spec.bins];

  for i in 0..spec.height {
    for j in 0..spec.width {
      let off = i * spec.width + j;

      // 寻找最高得分类别
      let mut max_index = 0usize;
      let mut max_score = scores[off];
      for k in 1..spec.classes {
        let score = scores[k * total + off];
        if score > max_score {
          max_index = k;
          max_score = score;
        }
      }

      // 过滤低分框
      if max_score > threshold {
        for (k, d) in dfl.iter_mut().enumerate() {
          *d = spec.box_quant.dequantize(boxes[k * total + off]);
        }
        let [l, t, r, b] = dfl::decode_box(&dfl, spec.bins);

        let grid_x = j as f32 + 0.5;
        let grid_y = i as f32 + 0.5;
        let bbox = Rect::from_xyxy(
          (grid_x - l) * spec.scale,
          (grid_y - t) * spec.scale,
          (grid_x + r) * spec.scale,
          (grid_y + b) * spec.scale,
        );
        out.push(
          bbox,
          spec.score_quant.dequantize(max_score),
          max_index as u32,
        );
      }
    }
  }
}

impl Yolo {
  fn grid_spec(&self, group: &ScaleGroup<'_>) -> Result<GridSpec, DecodeError> {
    let head = group.head;
    let (box_channels, box_h, box_w) = group.boxes.attr.chw()?;
    let (classes, score_h, score_w) = group.scores.attr.chw()?;

    if (box_h, box_w) != (score_h, score_w) {
      error!(
        "检测头 {}: 网格尺寸不一致 {}x{} / {}x{}",
        head, box_h, box_w, score_h, score_w
      );
      return Err(DecodeError::GridMismatch {
        head,
        box_grid: (box_h, box_w),
        score_grid: (score_h, score_w),
      });
    }
    if classes == 0 {
      error!("检测头 {}: 分类通道数为 0", head);
      return Err(DecodeError::ZeroClasses(head));
    }
    if box_channels == 0 || box_channels % 4 != 0 {
      error!("检测头 {}: 回归通道数 {} 不是 4 的正整数倍", head, box_channels);
      return Err(DecodeError::InvalidBoxChannels {
        head,
        channels: box_channels,
      });
    }

    Ok(GridSpec {
      height: box_h,
      width: box_w,
      classes,
      bins: box_channels / 4,
      scale: self.input_size.width as f32 / box_w as f32,
      box_quant: group.boxes.attr.quantization(),
      score_quant: group.scores.attr.quantization(),
    })
  }

  fn decode_typed<T: Sample + Default>(
    &self,
    group: &ScaleGroup<'_>,
    spec: &GridSpec,
    boxes: &[T],
    scores: &[T],
  ) -> Result<Candidates, DecodeError> {
    // NC1HWC2 转 NCHW，临时缓冲区在本函数结束时释放
    let boxes = layout::normalize(
      group.boxes.name(),
      boxes,
      (4 * spec.bins, spec.height, spec.width),
      group.boxes.block_width()?,
    )?;
    let scores = layout::normalize(
      group.scores.name(),
      scores,
      (spec.classes, spec.height, spec.width),
      group.scores.block_width()?,
    )?;

    // 量化后的分数阈值
    let threshold: T = spec.score_quant.quantize(self.score_threshold);

    let mut out = Candidates::default();
    decode_grid(&boxes, &scores, spec, threshold, &mut out);
    Ok(out)
  }

  fn decode_group(&self, group: &ScaleGroup<'_>) -> Result<Candidates, DecodeError> {
    let spec = self.grid_spec(group)?;
    group.boxes.validate()?;
    group.scores.validate()?;

    debug!(
      "检测头 {}: 网格 {}x{}, 类别 {}, DFL 长度 {}, 缩放 {}",
      group.head, spec.height, spec.width, spec.classes, spec.bins, spec.scale
    );

    let candidates = match (group.boxes.data, group.scores.data) {
      (TensorData::Int8(b), TensorData::Int8(s)) => self.decode_typed(group, &spec, b, s),
      (TensorData::UInt8(b), TensorData::UInt8(s)) => self.decode_typed(group, &spec, b, s),
      (TensorData::Float32(b), TensorData::Float32(s)) => self.decode_typed(group, &spec, b, s),
      (TensorData::Float16(b), TensorData::Float16(s)) => self.decode_typed(group, &spec, b, s),
      (b, s) => Err(DecodeError::DataTypeMismatch {
        name: group.scores.name().to_string(),
        expected: b.dtype(),
        actual: s.dtype(),
      }),
    }?;

    debug!("检测头 {}: 候选框 {} 个", group.head, candidates.len());
    Ok(candidates)
  }

  /// 遍历所有尺度输出，按尺度顺序合并候选框
  pub fn decode_candidates(&self, outputs: &[OutputTensor<'_>]) -> Result<Candidates, DecodeError> {
    if outputs.is_empty() {
      return Err(DecodeError::NoOutputs);
    }
    if outputs.len() % 2 != 0 {
      return Err(DecodeError::OddOutputCount(outputs.len()));
    }

    let groups = outputs
      .chunks_exact(2)
      .enumerate()
      .map(|(head, pair)| match_reg_cls_tensors(head, pair[0], pair[1], self.num_classes))
      .collect::<Result<Vec<_>, _>>()?;

    #[cfg(feature = "parallel")]
    let parts = {
      use rayon::prelude::*;
      groups
        .par_iter()
        .map(|group| self.decode_group(group))
        .collect::<Result<Vec<_>, _>>()?
    };
    #[cfg(not(feature = "parallel"))]
    let parts = groups
      .iter()
      .map(|group| self.decode_group(group))
      .collect::<Result<Vec<_>, _>>()?;

    let mut candidates = Candidates::default();
    for mut part in parts {
      candidates.append(&mut part);
    }
    Ok(candidates)
  }
}

impl Postprocess for Yolo {
  type Output = DetectResult;

  fn postprocess(&self, outputs: &[OutputTensor<'_>]) -> Result<Self::Output, DecodeError> {
    debug!("后处理模型输出");
    let candidates = self.decode_candidates(outputs)?;
    debug!("NMS 前候选框 {} 个", candidates.len());

    let keep = nms_per_class(
      &candidates.boxes,
      &candidates.scores,
      &candidates.classes,
      self.nms_threshold,
    );
    let items: Vec<DetectItem> = keep
      .into_iter()
      .map(|i| DetectItem {
        class_id: candidates.classes[i],
        score: candidates.scores[i],
        bbox: candidates.boxes[i],
      })
      .collect();

    debug!("检测到 {} 个物体", items.len());
    Ok(DetectResult {
      items: items.into_boxed_slice(),
    })
  }
}
