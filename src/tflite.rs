// 该文件是 Detect Contract （检测契约） 项目的一部分。
// src/tflite.rs - TFLite 模型文件
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
use tflite::context::ElementKind;

mod reader;
mod writer;

pub use self::reader::{TensorInfo, TfliteModel};
pub use self::writer::{Activation, BuiltinOptions, GraphBuilder, Padding};

pub const TFLITE_FILE_IDENTIFIER: &str = "TFL3";
pub const TFLITE_SCHEMA_VERSION: u32 = 3;

/// schema.fbs 中各表字段的槽位
pub(crate) mod slot {
  pub mod model {
    pub const VERSION: usize = 0;
    pub const OPERATOR_CODES: usize = 1;
    pub const SUBGRAPHS: usize = 2;
    pub const DESCRIPTION: usize = 3;
    pub const BUFFERS: usize = 4;
  }

  pub mod subgraph {
    pub const TENSORS: usize = 0;
    pub const INPUTS: usize = 1;
    pub const OUTPUTS: usize = 2;
    pub const OPERATORS: usize = 3;
    pub const NAME: usize = 4;
  }

  pub mod tensor {
    pub const SHAPE: usize = 0;
    pub const TYPE: usize = 1;
    pub const BUFFER: usize = 2;
    pub const NAME: usize = 3;
  }

  pub mod buffer {
    pub const DATA: usize = 0;
  }

  pub mod operator {
    pub const OPCODE_INDEX: usize = 0;
    pub const INPUTS: usize = 1;
    pub const OUTPUTS: usize = 2;
    pub const BUILTIN_OPTIONS_TYPE: usize = 3;
    pub const BUILTIN_OPTIONS: usize = 4;
  }

  pub mod operator_code {
    pub const DEPRECATED_BUILTIN_CODE: usize = 0;
    pub const VERSION: usize = 2;
    pub const BUILTIN_CODE: usize = 3;
  }

  pub mod conv2d_options {
    pub const PADDING: usize = 0;
    pub const STRIDE_W: usize = 1;
    pub const STRIDE_H: usize = 2;
    pub const FUSED_ACTIVATION: usize = 3;
    pub const DILATION_W: usize = 4;
    pub const DILATION_H: usize = 5;
  }

  pub mod fully_connected_options {
    pub const FUSED_ACTIVATION: usize = 0;
  }

  pub mod reshape_options {
    pub const NEW_SHAPE: usize = 0;
  }

  pub mod reducer_options {
    pub const KEEP_DIMS: usize = 0;
  }
}

/// 张量元素类型，编号与 schema.fbs 的 TensorType 一致
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TensorType {
  Float32,
  Float16,
  Int32,
  UInt8,
  Int64,
  String,
  Bool,
  Int16,
  Complex64,
  Int8,
}

impl TensorType {
  /// 运行时报告的元素类型，无对应时返回 None
  pub fn from_element_kind(kind: ElementKind) -> Option<Self> {
    match kind {
      ElementKind::kTfLiteFloat32 => Some(TensorType::Float32),
      ElementKind::kTfLiteFloat16 => Some(TensorType::Float16),
      ElementKind::kTfLiteInt32 => Some(TensorType::Int32),
      ElementKind::kTfLiteUInt8 => Some(TensorType::UInt8),
      ElementKind::kTfLiteInt64 => Some(TensorType::Int64),
      ElementKind::kTfLiteString => Some(TensorType::String),
      ElementKind::kTfLiteBool => Some(TensorType::Bool),
      ElementKind::kTfLiteInt16 => Some(TensorType::Int16),
      ElementKind::kTfLiteComplex64 => Some(TensorType::Complex64),
      ElementKind::kTfLiteInt8 => Some(TensorType::Int8),
      _ => None,
    }
  }
}

impl From<TensorType> for u8 {
  fn from(ty: TensorType) -> Self {
    match ty {
      TensorType::Float32 => 0,
      TensorType::Float16 => 1,
      TensorType::Int32 => 2,
      TensorType::UInt8 => 3,
      TensorType::Int64 => 4,
      TensorType::String => 5,
      TensorType::Bool => 6,
      TensorType::Int16 => 7,
      TensorType::Complex64 => 8,
      TensorType::Int8 => 9,
    }
  }
}

impl fmt::Display for TensorType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", format!("{:?}", self).to_lowercase())
  }
}

/// 占位模型用到的内置算子
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinOperator {
  Conv2d,
  FullyConnected,
  Reshape,
  Mean,
}

impl From<BuiltinOperator> for i32 {
  fn from(op: BuiltinOperator) -> Self {
    match op {
      BuiltinOperator::Conv2d => 3,
      BuiltinOperator::FullyConnected => 9,
      BuiltinOperator::Reshape => 22,
      BuiltinOperator::Mean => 40,
    }
  }
}

#[derive(Error, Debug)]
pub enum TfliteError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("不是 TFLite 模型文件: 文件标识为 {0:?}")]
  NotTflite(String),
  #[error("TFLite 运行时错误: {0}")]
  Runtime(String),
  #[error("模型缺少{0}张量")]
  MissingTensor(&'static str),
  #[error("输入数据长度不匹配: 期望 {expected}, 实际 {actual}")]
  InputLength { expected: usize, actual: usize },
}

impl From<tflite::Error> for TfliteError {
  fn from(err: tflite::Error) -> Self {
    TfliteError::Runtime(err.to_string())
  }
}
