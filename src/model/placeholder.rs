// 该文件是 Detect Contract （检测契约） 项目的一部分。
// src/model/placeholder.rs - 未训练的占位检测模型
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

//! 结构: Conv3x3(32, SAME) + ReLU -> 全局平均池化 -> Dense(600) -> Reshape(100, 6)。
//! 权重随机初始化，输出只用于联调形状，不代表任何检测能力。

use ndarray::{Array1, Array2, Array3, Array4};
use rand::{Rng, SeedableRng, rngs::StdRng};
use thiserror::Error;
use tracing::{debug, info};

use crate::{
  contract::DetectionTensorContract,
  frame::{FrameError, RGB_CHANNELS, RgbNhwcFrame},
  input::AsNhwcFrame,
  model::{DecodeError, Decoder, DetectResult, DetectionTensor, Model},
  tflite::{
    Activation, BuiltinOperator, BuiltinOptions, GraphBuilder, Padding, TensorType, TfliteError,
    TfliteModel,
  },
};

pub const PLACEHOLDER_FILTERS: usize = 32;
pub const PLACEHOLDER_DESCRIPTION: &str = "placeholder detector (untrained)";
const KERNEL: usize = 3;

const INPUT: &str = "input";
const CONV_KERNEL: &str = "conv/kernel";
const CONV_BIAS: &str = "conv/bias";
const CONV_OUT: &str = "conv/relu";
const POOL_AXES: &str = "pool/axes";
const POOL_OUT: &str = "pool";
const DENSE_KERNEL: &str = "dense/kernel";
const DENSE_BIAS: &str = "dense/bias";
const DENSE_OUT: &str = "dense";
const RESHAPE_SHAPE: &str = "reshape/shape";
const OUTPUT: &str = "output";

#[derive(Error, Debug)]
pub enum PlaceholderError {
  #[error("模型缺少张量: {0}")]
  MissingTensor(&'static str),
  #[error("张量 {name} 形状不符: 期望 {expected:?}, 实际 {actual:?}")]
  TensorShape {
    name: &'static str,
    expected: Vec<usize>,
    actual: Vec<usize>,
  },
  #[error("张量 {name} 类型不符: 期望 float32, 实际 {actual:?}")]
  TensorType {
    name: &'static str,
    actual: Option<TensorType>,
  },
  #[error("张量 {0} 数据长度不符")]
  TensorData(&'static str),
  #[error("TFLite 错误: {0}")]
  Tflite(#[from] TfliteError),
  #[error("帧数据错误: {0}")]
  FrameError(#[from] FrameError),
  #[error("输出解码错误: {0}")]
  DecodeError(#[from] DecodeError),
}

/// Glorot 均匀分布的范围，与 Keras 默认初始化一致
fn glorot_limit(fan_in: usize, fan_out: usize) -> f32 {
  (6.0 / (fan_in + fan_out) as f32).sqrt()
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlaceholderWeights {
  /// [out, kh, kw, in]
  conv_kernel: Array4<f32>,
  conv_bias: Array1<f32>,
  /// [out, in]
  dense_kernel: Array2<f32>,
  dense_bias: Array1<f32>,
}

impl PlaceholderWeights {
  pub fn seeded(seed: u64) -> Self {
    let mut rng = StdRng::seed_from_u64(seed);
    let channels = DetectionTensorContract::INPUT_CHANNELS;
    let outputs = DetectionTensorContract::output_len();

    let conv_limit = glorot_limit(
      KERNEL * KERNEL * channels,
      KERNEL * KERNEL * PLACEHOLDER_FILTERS,
    );
    let conv_kernel = Array4::from_shape_fn(
      (PLACEHOLDER_FILTERS, KERNEL, KERNEL, channels),
      |_| rng.random_range(-conv_limit..conv_limit),
    );

    let dense_limit = glorot_limit(PLACEHOLDER_FILTERS, outputs);
    let dense_kernel = Array2::from_shape_fn((outputs, PLACEHOLDER_FILTERS), |_| {
      rng.random_range(-dense_limit..dense_limit)
    });

    PlaceholderWeights {
      conv_kernel,
      conv_bias: Array1::zeros(PLACEHOLDER_FILTERS),
      dense_kernel,
      dense_bias: Array1::zeros(outputs),
    }
  }

  /// 参数总数
  pub fn parameter_count(&self) -> usize {
    self.conv_kernel.len() + self.conv_bias.len() + self.dense_kernel.len() + self.dense_bias.len()
  }

  /// 按契约形状写出 TFLite 计算图
  pub fn to_tflite(&self) -> Vec<u8> {
    let [n, h, w, c] = DetectionTensorContract::INPUT_SHAPE.map(|d| d as i32);
    let [_, detections, fields] = DetectionTensorContract::OUTPUT_SHAPE.map(|d| d as i32);
    let filters = PLACEHOLDER_FILTERS as i32;
    let units = detections * fields;
    let k = KERNEL as i32;

    let mut graph = GraphBuilder::new(PLACEHOLDER_DESCRIPTION);
    let input = graph.tensor(INPUT, TensorType::Float32, &[n, h, w, c]);

    let conv_kernel = graph.constant_f32(
      CONV_KERNEL,
      &[filters, k, k, c],
      &self.conv_kernel.iter().copied().collect::<Vec<_>>(),
    );
    let conv_bias = graph.constant_f32(
      CONV_BIAS,
      &[filters],
      &self.conv_bias.iter().copied().collect::<Vec<_>>(),
    );
    let conv_out = graph.tensor(CONV_OUT, TensorType::Float32, &[n, h, w, filters]);
    graph.operator(
      BuiltinOperator::Conv2d,
      &[input, conv_kernel, conv_bias],
      &[conv_out],
      Some(BuiltinOptions::Conv2d {
        padding: Padding::Same,
        stride: (1, 1),
        activation: Activation::Relu,
      }),
    );

    let axes = graph.constant_i32(POOL_AXES, &[2], &[1, 2]);
    let pooled = graph.tensor(POOL_OUT, TensorType::Float32, &[n, filters]);
    graph.operator(
      BuiltinOperator::Mean,
      &[conv_out, axes],
      &[pooled],
      Some(BuiltinOptions::Reducer { keep_dims: false }),
    );

    let dense_kernel = graph.constant_f32(
      DENSE_KERNEL,
      &[units, filters],
      &self.dense_kernel.iter().copied().collect::<Vec<_>>(),
    );
    let dense_bias = graph.constant_f32(
      DENSE_BIAS,
      &[units],
      &self.dense_bias.iter().copied().collect::<Vec<_>>(),
    );
    let dense = graph.tensor(DENSE_OUT, TensorType::Float32, &[n, units]);
    graph.operator(
      BuiltinOperator::FullyConnected,
      &[pooled, dense_kernel, dense_bias],
      &[dense],
      Some(BuiltinOptions::FullyConnected {
        activation: Activation::None,
      }),
    );

    let new_shape = vec![n, detections, fields];
    let shape = graph.constant_i32(RESHAPE_SHAPE, &[3], &new_shape);
    let output = graph.tensor(OUTPUT, TensorType::Float32, &new_shape);
    graph.operator(
      BuiltinOperator::Reshape,
      &[dense, shape],
      &[output],
      Some(BuiltinOptions::Reshape { new_shape }),
    );

    graph.inputs(&[input]);
    graph.outputs(&[output]);
    graph.finish()
  }

  /// 从占位模型文件中取回权重
  pub fn from_tflite(model: &TfliteModel) -> Result<Self, PlaceholderError> {
    let channels = DetectionTensorContract::INPUT_CHANNELS;
    let outputs = DetectionTensorContract::output_len();

    let conv_kernel = read_f32(model, CONV_KERNEL, &[PLACEHOLDER_FILTERS, KERNEL, KERNEL, channels])?;
    let conv_bias = read_f32(model, CONV_BIAS, &[PLACEHOLDER_FILTERS])?;
    let dense_kernel = read_f32(model, DENSE_KERNEL, &[outputs, PLACEHOLDER_FILTERS])?;
    let dense_bias = read_f32(model, DENSE_BIAS, &[outputs])?;

    let shape_err = |name| PlaceholderError::TensorData(name);
    Ok(PlaceholderWeights {
      conv_kernel: Array4::from_shape_vec(
        (PLACEHOLDER_FILTERS, KERNEL, KERNEL, channels),
        conv_kernel,
      )
      .map_err(|_| shape_err(CONV_KERNEL))?,
      conv_bias: Array1::from(conv_bias),
      dense_kernel: Array2::from_shape_vec((outputs, PLACEHOLDER_FILTERS), dense_kernel)
        .map_err(|_| shape_err(DENSE_KERNEL))?,
      dense_bias: Array1::from(dense_bias),
    })
  }
}

fn read_f32(
  model: &TfliteModel,
  name: &'static str,
  expected: &[usize],
) -> Result<Vec<f32>, PlaceholderError> {
  let tensor = model
    .tensor_by_name(name)
    .ok_or(PlaceholderError::MissingTensor(name))?;
  if tensor.dtype != Some(TensorType::Float32) {
    return Err(PlaceholderError::TensorType {
      name,
      actual: tensor.dtype,
    });
  }
  if tensor.shape != expected {
    return Err(PlaceholderError::TensorShape {
      name,
      expected: expected.to_vec(),
      actual: tensor.shape.clone(),
    });
  }

  let data = model.tensor_f32(tensor)?;
  if data.len() != expected.iter().product::<usize>() {
    return Err(PlaceholderError::TensorData(name));
  }
  Ok(data.to_vec())
}

/// 在 Rust 中执行占位计算图，W x H 为输入尺寸
pub struct PlaceholderModel<const W: u32, const H: u32> {
  weights: PlaceholderWeights,
  decoder: Decoder,
}

impl<const W: u32, const H: u32> PlaceholderModel<W, H> {
  pub fn new(weights: PlaceholderWeights) -> Self {
    info!(
      "占位模型: 输入 {}x{}, 参数 {} 个",
      W,
      H,
      weights.parameter_count()
    );
    PlaceholderModel {
      weights,
      decoder: Decoder::default(),
    }
  }

  pub fn with_decoder(mut self, decoder: Decoder) -> Self {
    self.decoder = decoder;
    self
  }

  pub fn forward<F: AsNhwcFrame<W, H>>(
    &self,
    frame: &F,
  ) -> Result<DetectionTensor, PlaceholderError> {
    let (height, width, channels) = (H as usize, W as usize, RGB_CHANNELS);
    let image = Array3::from_shape_vec((height, width, channels), frame.normalized()?)
      .map_err(|_| PlaceholderError::TensorData(INPUT))?;

    // [out, kh*kw*in]，与 patch 的展开顺序一致
    let kernel = self
      .weights
      .conv_kernel
      .to_shape((PLACEHOLDER_FILTERS, KERNEL * KERNEL * channels))
      .map_err(|_| PlaceholderError::TensorData(CONV_KERNEL))?
      .to_owned();

    let mut patch = Array1::<f32>::zeros(KERNEL * KERNEL * channels);
    let mut pooled = Array1::<f32>::zeros(PLACEHOLDER_FILTERS);
    let pad = (KERNEL / 2) as isize;

    for y in 0..height {
      for x in 0..width {
        for ky in 0..KERNEL {
          for kx in 0..KERNEL {
            let iy = y as isize + ky as isize - pad;
            let ix = x as isize + kx as isize - pad;
            let inside = iy >= 0 && ix >= 0 && (iy as usize) < height && (ix as usize) < width;
            for c in 0..channels {
              patch[(ky * KERNEL + kx) * channels + c] = if inside {
                image[[iy as usize, ix as usize, c]]
              } else {
                0.0
              };
            }
          }
        }
        let activation = kernel.dot(&patch) + &self.weights.conv_bias;
        pooled += &activation.mapv(|v| v.max(0.0));
      }
    }
    pooled /= (height * width) as f32;

    let dense = self.weights.dense_kernel.dot(&pooled) + &self.weights.dense_bias;
    debug!("占位模型前向完成，输出 {} 个值", dense.len());
    Ok(DetectionTensor::try_from(dense.to_vec())?)
  }
}

impl<const W: u32, const H: u32> Model for PlaceholderModel<W, H> {
  type Input = RgbNhwcFrame<W, H>;
  type Output = DetectResult;
  type Error = PlaceholderError;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    let tensor = self.forward(input)?;
    Ok(self.postprocess(tensor))
  }

  fn postprocess(&self, output: DetectionTensor) -> Self::Output {
    self.decoder.decode(&output)
  }
}
