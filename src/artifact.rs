// 该文件是 Detect Contract （检测契约） 项目的一部分。
// src/artifact.rs - 模型产物签名与契约检查
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
  fmt,
  path::{Path, PathBuf},
};

use thiserror::Error;
use tracing::{error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  contract::{ShapeMismatch, validate_dims},
  tflite::{TensorInfo, TensorType, TfliteError, TfliteModel},
  url_file_path,
};

#[derive(Error, Debug)]
pub enum ArtifactError {
  #[error("URI 方案不匹配: 期望 '{expected}', 实际 '{actual}'")]
  SchemeMismatch { expected: &'static str, actual: String },
  #[error("模型文件不存在: {0}")]
  FileNotFound(PathBuf),
  #[error("TFLite 错误: {0}")]
  TfliteError(#[from] TfliteError),
  #[error("模型签名不符: {0}")]
  Signature(String),
  #[error("{0}")]
  ShapeMismatch(#[from] ShapeMismatch),
}

/// 模型声明的单个输入或输出张量
#[derive(Debug, Clone, PartialEq)]
pub struct ArtifactTensor {
  pub name: String,
  pub dtype: Option<TensorType>,
  pub shape: Vec<i64>,
}

impl From<&TensorInfo> for ArtifactTensor {
  fn from(info: &TensorInfo) -> Self {
    ArtifactTensor {
      name: info.name.clone(),
      dtype: info.dtype,
      shape: info.shape.iter().map(|&d| d as i64).collect(),
    }
  }
}

impl fmt::Display for ArtifactTensor {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self.dtype {
      Some(dtype) => write!(f, "{} {:?} ({})", self.name, self.shape, dtype),
      None => write!(f, "{} {:?} (未知类型)", self.name, self.shape),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ArtifactSignature {
  pub inputs: Vec<ArtifactTensor>,
  pub outputs: Vec<ArtifactTensor>,
}

impl From<&TfliteModel> for ArtifactSignature {
  fn from(model: &TfliteModel) -> Self {
    ArtifactSignature {
      inputs: model.input_tensors().map(ArtifactTensor::from).collect(),
      outputs: model.output_tensors().map(ArtifactTensor::from).collect(),
    }
  }
}

impl ArtifactSignature {
  pub fn input_shape(&self) -> Option<&[i64]> {
    self.inputs.first().map(|t| t.shape.as_slice())
  }

  pub fn output_shape(&self) -> Option<&[i64]> {
    self.outputs.first().map(|t| t.shape.as_slice())
  }
}

/// 单输入、单输出、float32，且形状与检测契约一致
pub fn validate_signature(signature: &ArtifactSignature) -> Result<(), ArtifactError> {
  let (input, output) = match (signature.inputs.as_slice(), signature.outputs.as_slice()) {
    ([input], [output]) => (input, output),
    (inputs, outputs) => {
      return Err(ArtifactError::Signature(format!(
        "期望 1 个输入和 1 个输出, 实际 {} 个输入和 {} 个输出",
        inputs.len(),
        outputs.len()
      )));
    }
  };

  for tensor in [input, output] {
    if tensor.dtype != Some(TensorType::Float32) {
      return Err(ArtifactError::Signature(format!(
        "张量 {} 类型不是 float32",
        tensor
      )));
    }
  }

  validate_dims(&input.shape, &output.shape)?;
  Ok(())
}

/// 磁盘上的 TFLite 模型产物
#[derive(Debug)]
pub struct TfliteArtifact {
  path: PathBuf,
  model: TfliteModel,
}

impl FromUrlWithScheme for TfliteArtifact {
  const SCHEME: &'static str = "tflite";
}

impl FromUrl for TfliteArtifact {
  type Error = ArtifactError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI 方案不匹配: 期望 '{}', 实际 '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(ArtifactError::SchemeMismatch {
        expected: Self::SCHEME,
        actual: url.scheme().to_string(),
      });
    }
    Self::open(url_file_path(url))
  }
}

impl TfliteArtifact {
  pub fn open(path: impl AsRef<Path>) -> Result<Self, ArtifactError> {
    let path = path.as_ref();
    if !path.is_file() {
      return Err(ArtifactError::FileNotFound(path.to_path_buf()));
    }
    let model = TfliteModel::load(path)?;
    info!(
      "已加载模型产物 {} ({:.2} KB)",
      path.display(),
      model.size_bytes() as f64 / 1024.0
    );
    Ok(TfliteArtifact {
      path: path.to_path_buf(),
      model,
    })
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  pub fn model(&self) -> &TfliteModel {
    &self.model
  }

  pub fn into_model(self) -> TfliteModel {
    self.model
  }

  /// 由运行时分配张量，确认模型可以真正加载执行
  pub fn allocate(&mut self) -> Result<(), ArtifactError> {
    self.model.allocate()?;
    info!("运行时已为 {} 分配张量", self.path.display());
    Ok(())
  }

  pub fn size_bytes(&self) -> usize {
    self.model.size_bytes()
  }

  pub fn signature(&self) -> ArtifactSignature {
    ArtifactSignature::from(&self.model)
  }

  pub fn validate(&self) -> Result<(), ArtifactError> {
    validate_signature(&self.signature())
  }
}
