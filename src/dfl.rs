// 该文件是 RkPost （山南后处理） 项目的一部分。
// src/dfl.rs - DFL 边框解码
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

/// 单条边的分布期望 `Σ softmax(logits)[i] * i`
///
/// 不减最大值；累加在 f64 中进行，logit 不超过 ~700 时指数不会溢出。
#[inline]
pub fn expectation(logits: &[f32]) -> f32 {
  let mut exp_sum = 0.0f64;
  let mut acc_sum = 0.0f64;
  for (i, &l) in logits.iter().enumerate() {
    let e = (l as f64).exp();
    exp_sum += e;
    acc_sum += e * i as f64;
  }
  (acc_sum / exp_sum) as f32
}

/// 解码 `[左, 上, 右, 下]` 四条边到网格中心的距离
///
/// `dist` 依次存放四条边各 `bins` 个 logit。
#[inline]
pub fn decode_box(dist: &[f32], bins: usize) -> [f32; 4] {
  debug_assert!(dist.len() >= 4 * bins);
  let mut edges = [0.0f32; 4];
  for (b, edge) in edges.iter_mut().enumerate() {
    *edge = expectation(&dist[b * bins..(b + 1) * bins]);
  }
  edges
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn uniform_logits_give_center() {
    let logits = [0.0f32; 16];
    assert!((expectation(&logits) - 7.5).abs() < 1e-5);
  }

  #[test]
  fn dominant_bin_wins() {
    for hot in [0usize, 3, 9, 15] {
      let mut logits = [0.0f32; 16];
      logits[hot] = 100.0;
      assert!((expectation(&logits) - hot as f32).abs() < 1e-3, "hot={hot}");
    }
  }

  #[test]
  fn stays_in_bin_range() {
    let cases: [[f32; 8]; 4] = [
      [-5.0, 3.2, 0.1, 7.7, -1.0, 2.2, 0.0, -9.0],
      [10.0, -10.0, 10.0, -10.0, 10.0, -10.0, 10.0, -10.0],
      [0.5, 0.4, 0.3, 0.2, 0.1, 0.0, -0.1, -0.2],
      [-30.0, -30.0, -30.0, -30.0, -30.0, -30.0, -30.0, 20.0],
    ];
    for logits in cases {
      let v = expectation(&logits);
      assert!((0.0..=7.0 + 1e-4).contains(&v), "v={v}");
    }
  }

  #[test]
  fn single_bin_is_zero() {
    assert_eq!(expectation(&[42.0]), 0.0);
    assert_eq!(decode_box(&[1.0, -3.0, 0.0, 8.0], 1), [0.0; 4]);
  }

  #[test]
  fn box_edges_are_independent() {
    let mut dist = [0.0f32; 4 * 4];
    dist[1] = 50.0;
    dist[4 + 2] = 50.0;
    dist[8 + 3] = 50.0;
    dist[12] = 50.0;
    let edges = decode_box(&dist, 4);
    assert!((edges[0] - 1.0).abs() < 1e-4);
    assert!((edges[1] - 2.0).abs() < 1e-4);
    assert!((edges[2] - 3.0).abs() < 1e-4);
    assert!(edges[3].abs() < 1e-4);
  }

  #[test]
  fn nan_propagates() {
    assert!(expectation(&[f32::NAN, 0.0]).is_nan());
  }
}
