// 该文件是 Detect Contract （检测契约） 项目的一部分。
// src/export/placeholder.rs - 生成占位 TFLite 模型
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

use std::{fs::File, io::Write, path::PathBuf};

use tracing::info;

use crate::{
  export::{ArtifactKind, Export, ExportError, ExportReport, accept_artifact},
  model::PlaceholderWeights,
};

pub const DEFAULT_PLACEHOLDER_PATH: &str = "assets/yolov11_sign_language.tflite";

/// 写出与契约形状一致、权重随机的占位模型，并读回校验
#[derive(Debug, Clone)]
pub struct GeneratePlaceholder {
  output: PathBuf,
  seed: u64,
}

impl Default for GeneratePlaceholder {
  fn default() -> Self {
    GeneratePlaceholder {
      output: PathBuf::from(DEFAULT_PLACEHOLDER_PATH),
      seed: 0,
    }
  }
}

impl GeneratePlaceholder {
  pub fn new(output: impl Into<PathBuf>) -> Self {
    GeneratePlaceholder {
      output: output.into(),
      ..Default::default()
    }
  }

  pub fn seed(mut self, seed: u64) -> Self {
    self.seed = seed;
    self
  }
}

impl Export for GeneratePlaceholder {
  type Error = ExportError;

  fn export(self) -> Result<ExportReport, Self::Error> {
    println!("正在生成占位检测模型...");
    println!("   输出: {}", self.output.display());

    let weights = PlaceholderWeights::seeded(self.seed);
    let bytes = weights.to_tflite();

    if let Some(parent) = self.output.parent().filter(|p| !p.as_os_str().is_empty()) {
      std::fs::create_dir_all(parent)?;
    }
    {
      let mut file = File::create(&self.output)?;
      file.write_all(&bytes)?;
      file.flush()?;
    }
    info!(
      "占位模型已写入 {} ({} 字节, 种子 {})",
      self.output.display(),
      bytes.len(),
      self.seed
    );

    // 读回文件确认声明的形状
    accept_artifact(ArtifactKind::Placeholder, &self.output, false, Some(self.seed))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{artifact::TfliteArtifact, contract::DetectionTensorContract};

  #[test]
  fn generated_artifact_conforms() {
    let dir = std::env::temp_dir().join(format!("detect-contract-placeholder-{}", std::process::id()));
    let path = dir.join("nested").join("placeholder.tflite");

    let report = GeneratePlaceholder::new(&path).seed(11).export().unwrap();
    assert!(report.conforms);
    assert_eq!(report.kind, ArtifactKind::Placeholder);
    assert_eq!(report.seed, Some(11));
    assert_eq!(report.input_shape, vec![1, 640, 640, 3]);
    assert_eq!(report.output_shape, vec![1, 100, 6]);

    let artifact = TfliteArtifact::open(&path).unwrap();
    assert!(artifact.validate().is_ok());
    assert_eq!(artifact.size_bytes() as u64, report.size_bytes);
    let weights = PlaceholderWeights::from_tflite(artifact.model()).unwrap();
    assert_eq!(weights, PlaceholderWeights::seeded(11));
    assert_eq!(
      report.field_layout.len(),
      DetectionTensorContract::FIELD_COUNT
    );
  }
}
