// 该文件是 Detect Contract （检测契约） 项目的一部分。
// src/contract.rs - 检测张量契约与形状校验
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

use thiserror::Error;
use tracing::{debug, warn};

/// 输入张量形状 (batch, height, width, channels)
pub type InputShape = [usize; 4];
/// 输出张量形状 (batch, max_detections, fields)
pub type OutputShape = [usize; 3];

/// 单条检测记录中的字段，顺序即为输出张量最后一维的排列顺序
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DetectionField {
  XCenter,
  YCenter,
  Width,
  Height,
  Confidence,
  ClassId,
}

impl DetectionField {
  pub const LAYOUT: [DetectionField; 6] = [
    DetectionField::XCenter,
    DetectionField::YCenter,
    DetectionField::Width,
    DetectionField::Height,
    DetectionField::Confidence,
    DetectionField::ClassId,
  ];

  /// 字段在一条记录中的下标
  pub const fn index(self) -> usize {
    match self {
      DetectionField::XCenter => 0,
      DetectionField::YCenter => 1,
      DetectionField::Width => 2,
      DetectionField::Height => 3,
      DetectionField::Confidence => 4,
      DetectionField::ClassId => 5,
    }
  }

  pub const fn name(self) -> &'static str {
    match self {
      DetectionField::XCenter => "x_center",
      DetectionField::YCenter => "y_center",
      DetectionField::Width => "width",
      DetectionField::Height => "height",
      DetectionField::Confidence => "confidence",
      DetectionField::ClassId => "class_id",
    }
  }
}

impl fmt::Display for DetectionField {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.name())
  }
}

/// 检测模型与移动端推理之间约定的张量形状
pub struct DetectionTensorContract;

impl DetectionTensorContract {
  pub const INPUT_SIZE: usize = 640;
  pub const INPUT_CHANNELS: usize = 3;
  pub const MAX_DETECTIONS: usize = 100;
  pub const FIELD_COUNT: usize = DetectionField::LAYOUT.len();

  pub const INPUT_SHAPE: InputShape = [1, Self::INPUT_SIZE, Self::INPUT_SIZE, Self::INPUT_CHANNELS];
  pub const OUTPUT_SHAPE: OutputShape = [1, Self::MAX_DETECTIONS, Self::FIELD_COUNT];
  pub const FIELD_LAYOUT: [DetectionField; 6] = DetectionField::LAYOUT;

  /// 输出张量的元素个数
  pub const fn output_len() -> usize {
    Self::MAX_DETECTIONS * Self::FIELD_COUNT
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TensorRole {
  Input,
  Output,
}

impl fmt::Display for TensorRole {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      TensorRole::Input => f.write_str("输入张量"),
      TensorRole::Output => f.write_str("输出张量"),
    }
  }
}

/// 单个维度（或秩）上的偏差
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Divergence {
  Rank {
    tensor: TensorRole,
    expected: usize,
    actual: usize,
  },
  Dim {
    tensor: TensorRole,
    index: usize,
    expected: usize,
    actual: i64,
  },
}

impl fmt::Display for Divergence {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Divergence::Rank {
        tensor,
        expected,
        actual,
      } => write!(f, "{} 秩: 期望 {}, 实际 {}", tensor, expected, actual),
      Divergence::Dim {
        tensor,
        index,
        expected,
        actual,
      } => write!(
        f,
        "{} 维度 {}: 期望 {}, 实际 {}",
        tensor, index, expected, actual
      ),
    }
  }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("张量形状与检测契约不符: {}", join_divergences(.divergences))]
pub struct ShapeMismatch {
  divergences: Vec<Divergence>,
}

fn join_divergences(divergences: &[Divergence]) -> String {
  divergences
    .iter()
    .map(|d| d.to_string())
    .collect::<Vec<_>>()
    .join("; ")
}

impl ShapeMismatch {
  pub fn divergences(&self) -> &[Divergence] {
    &self.divergences
  }

  /// 指定张量上出现偏差的维度下标
  pub fn diverged_dims(&self, role: TensorRole) -> Vec<usize> {
    self
      .divergences
      .iter()
      .filter_map(|d| match d {
        Divergence::Dim { tensor, index, .. } if *tensor == role => Some(*index),
        _ => None,
      })
      .collect()
  }
}

fn compare(role: TensorRole, expected: &[usize], actual: &[i64], out: &mut Vec<Divergence>) {
  if expected.len() != actual.len() {
    out.push(Divergence::Rank {
      tensor: role,
      expected: expected.len(),
      actual: actual.len(),
    });
    return;
  }

  for (index, (&e, &a)) in expected.iter().zip(actual).enumerate() {
    // 动态维度（-1）或非正数一律视为不符
    if a < 0 || a as u64 != e as u64 {
      out.push(Divergence::Dim {
        tensor: role,
        index,
        expected: e,
        actual: a,
      });
    }
  }
}

/// 校验导出步骤声明的输入输出形状
pub fn validate(
  declared_input_shape: InputShape,
  declared_output_shape: OutputShape,
) -> Result<(), ShapeMismatch> {
  let input = declared_input_shape.map(|d| d as i64);
  let output = declared_output_shape.map(|d| d as i64);
  validate_dims(&input, &output)
}

/// 校验任意秩的形状，常用于从模型文件中读出的张量
pub fn validate_dims(input: &[i64], output: &[i64]) -> Result<(), ShapeMismatch> {
  let mut divergences = Vec::new();
  compare(
    TensorRole::Input,
    &DetectionTensorContract::INPUT_SHAPE,
    input,
    &mut divergences,
  );
  compare(
    TensorRole::Output,
    &DetectionTensorContract::OUTPUT_SHAPE,
    output,
    &mut divergences,
  );

  if divergences.is_empty() {
    debug!("形状校验通过: 输入 {:?}, 输出 {:?}", input, output);
    Ok(())
  } else {
    for d in &divergences {
      warn!("形状偏差: {}", d);
    }
    Err(ShapeMismatch { divergences })
  }
}
