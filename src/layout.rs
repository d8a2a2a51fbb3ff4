// 该文件是 RkPost （山南后处理） 项目的一部分。
// src/layout.rs - NC1HWC2 布局转换
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

//! NPU 输出常以 NC1HWC2 分块格式存放：通道被切成宽度为 C2 的块，
//! 每块内按空间位置交织。解码循环需要通道主序 (NCHW)。

use std::borrow::Cow;

use tracing::debug;

use crate::error::DecodeError;

/// 分块布局 `(C1, H, W, C2)` 转通道主序 `(C, H, W)`
///
/// `dst` 长度至少为 `c * h * w`，`src` 只读。
pub fn nc1hwc2_to_nchw<T: Copy>(src: &[T], dst: &mut [T], c: usize, h: usize, w: usize, c2: usize) {
  let total = h * w;
  for ch in 0..c {
    let plane = ch / c2;
    let off1 = ch % c2;
    let scp = &src[plane * total * c2..];
    let dcp = &mut dst[ch * total..(ch + 1) * total];
    for (off2, d) in dcp.iter_mut().enumerate() {
      *d = scp[c2 * off2 + off1];
    }
  }
}

/// 按原生布局把张量整理为通道主序
///
/// 原生布局已经是 NCHW 时直接借用，否则分配临时缓冲区，
/// 缓冲区随返回值一起释放。
pub fn normalize<'a, T: Copy + Default>(
  name: &str,
  src: &'a [T],
  chw: (usize, usize, usize),
  block_width: Option<usize>,
) -> Result<Cow<'a, [T]>, DecodeError> {
  let (c, h, w) = chw;
  let expected = match block_width {
    Some(c2) => c.div_ceil(c2) * h * w * c2,
    None => c * h * w,
  };
  if src.len() < expected {
    return Err(DecodeError::BufferTooSmall {
      name: name.to_string(),
      expected,
      actual: src.len(),
    });
  }

  let Some(c2) = block_width else {
    return Ok(Cow::Borrowed(&src[..expected]));
  };

  debug!("张量 {}: 分块布局转换 C={} H={} W={} C2={}", name, c, h, w, c2);
  let mut dst = vec![T::default(); c * h * w];
  nc1hwc2_to_nchw(src, &mut dst, c, h, w, c2);
  Ok(Cow::Owned(dst))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn unpacks_single_pixel_blocks() {
    // 4 个通道, C2 = 2, 空间 1x1
    let src = [10i8, 20, 30, 40];
    let mut dst = [0i8; 4];
    nc1hwc2_to_nchw(&src, &mut dst, 4, 1, 1, 2);
    assert_eq!(dst, [10, 20, 30, 40]);
  }

  #[test]
  fn unpacks_spatial_interleave() {
    // C=3, H=1, W=2, C2=2 -> C1=2, 末块有一个填充通道
    // 源: 块0 [(c0,c1)@w0, (c0,c1)@w1], 块1 [(c2,pad)@w0, (c2,pad)@w1]
    let src = [1u8, 2, 3, 4, 5, 0, 6, 0];
    let mut dst = [0u8; 6];
    nc1hwc2_to_nchw(&src, &mut dst, 3, 1, 2, 2);
    assert_eq!(dst, [1, 3, 2, 4, 5, 6]);
  }

  #[test]
  fn gather_is_bijective() {
    let (c, h, w, c2) = (32usize, 3usize, 5usize, 16usize);
    let blocks = c.div_ceil(c2);
    let src: Vec<u32> = (0..(blocks * h * w * c2) as u32).collect();
    let mut dst = vec![u32::MAX; c * h * w];
    nc1hwc2_to_nchw(&src, &mut dst, c, h, w, c2);

    let mut seen = vec![false; src.len()];
    for (i, &v) in dst.iter().enumerate() {
      let (ch, rest) = (i / (h * w), i % (h * w));
      assert_eq!(v as usize, (ch / c2) * h * w * c2 + c2 * rest + ch % c2);
      assert!(!seen[v as usize], "源元素 {v} 被读取两次");
      seen[v as usize] = true;
    }
    assert!(seen.iter().all(|&s| s));
  }

  #[test]
  fn nhwc_is_one_block() {
    // H=2, W=2, C=3
    let src: Vec<i8> = (0..12).collect();
    let out = normalize("nhwc", &src, (3, 2, 2), Some(3)).unwrap();
    assert_eq!(&*out, &[0, 3, 6, 9, 1, 4, 7, 10, 2, 5, 8, 11]);
  }

  #[test]
  fn channel_major_is_borrowed() {
    let src = [1.0f32, 2.0, 3.0, 4.0];
    let out = normalize("nchw", &src, (1, 2, 2), None).unwrap();
    assert!(matches!(out, Cow::Borrowed(_)));
    assert_eq!(&*out, &src);
  }

  #[test]
  fn short_blocked_buffer_is_rejected() {
    let src = [0u8; 15];
    assert!(matches!(
      normalize("short", &src, (3, 2, 2), Some(4)),
      Err(DecodeError::BufferTooSmall { expected: 16, .. })
    ));
  }
}
