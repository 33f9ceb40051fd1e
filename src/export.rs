// 该文件是 Detect Contract （检测契约） 项目的一部分。
// src/export.rs - 模型产物导出
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

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::{
  artifact::{ArtifactError, TfliteArtifact},
  contract::{DetectionTensorContract, ShapeMismatch},
  model::PlaceholderError,
};

mod convert;
mod placeholder;

pub use self::convert::ConvertCheckpoint;
pub use self::placeholder::GeneratePlaceholder;

#[derive(Error, Debug)]
pub enum ExportError {
  #[error("找不到模型检查点: {0}")]
  FileNotFound(PathBuf),
  #[error("模型转换失败: {0}")]
  ConversionFailure(String),
  #[error("{0}")]
  ShapeMismatch(#[from] ShapeMismatch),
  #[error("模型产物错误: {0}")]
  ArtifactError(ArtifactError),
  #[error("占位模型错误: {0}")]
  PlaceholderError(#[from] PlaceholderError),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("报告序列化错误: {0}")]
  ReportError(#[from] serde_json::Error),
}

impl From<ArtifactError> for ExportError {
  fn from(err: ArtifactError) -> Self {
    match err {
      ArtifactError::ShapeMismatch(m) => ExportError::ShapeMismatch(m),
      other => ExportError::ArtifactError(other),
    }
  }
}

/// 导出流程：产出模型文件并完成契约检查
pub trait Export: Sized {
  type Error;
  fn export(self) -> Result<ExportReport, Self::Error>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
  Converted,
  Placeholder,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportReport {
  pub kind: ArtifactKind,
  pub artifact: PathBuf,
  pub size_bytes: u64,
  pub input_shape: Vec<i64>,
  pub output_shape: Vec<i64>,
  pub field_layout: Vec<String>,
  pub conforms: bool,
  pub divergences: Vec<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub seed: Option<u64>,
  pub exported_at: DateTime<Utc>,
}

impl ExportReport {
  pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), ExportError> {
    let path = path.as_ref();
    let json = serde_json::to_string_pretty(self)?;
    std::fs::write(path, json)?;
    info!("导出报告已写入: {}", path.display());
    Ok(())
  }

  pub fn print_summary(&self) {
    println!();
    println!("模型产物: {}", self.artifact.display());
    println!("   模型大小: {:.2} KB", self.size_bytes as f64 / 1024.0);
    println!("   输入形状: {:?}", self.input_shape);
    println!("   输出形状: {:?}", self.output_shape);
    println!("   字段顺序: [{}]", self.field_layout.join(", "));
    if self.conforms {
      println!("   检测契约: 符合");
    } else {
      println!("   检测契约: 不符合");
      for d in &self.divergences {
        println!("     - {}", d);
      }
    }
  }
}

/// 读回产物，由运行时分配张量后检查契约；allow_mismatch 时只记录形状偏差
pub(crate) fn accept_artifact(
  kind: ArtifactKind,
  path: &Path,
  allow_mismatch: bool,
  seed: Option<u64>,
) -> Result<ExportReport, ExportError> {
  let mut artifact = TfliteArtifact::open(path)?;
  // 运行时必须能完成张量分配，签名正确但无法执行的模型同样不可交付
  artifact.allocate()?;
  let signature = artifact.signature();

  let divergences = match artifact.validate() {
    Ok(()) => Vec::new(),
    Err(e) if allow_mismatch => {
      warn!("模型产物不符合检测契约，按要求继续: {}", e);
      match e {
        ArtifactError::ShapeMismatch(m) => m.divergences().iter().map(|d| d.to_string()).collect(),
        other => vec![other.to_string()],
      }
    }
    Err(e) => return Err(e.into()),
  };

  Ok(ExportReport {
    kind,
    artifact: artifact.path().to_path_buf(),
    size_bytes: artifact.size_bytes() as u64,
    input_shape: signature.input_shape().map(<[i64]>::to_vec).unwrap_or_default(),
    output_shape: signature.output_shape().map(<[i64]>::to_vec).unwrap_or_default(),
    field_layout: DetectionTensorContract::FIELD_LAYOUT
      .iter()
      .map(|f| f.name().to_string())
      .collect(),
    conforms: divergences.is_empty(),
    divergences,
    seed,
    exported_at: Utc::now(),
  })
}
