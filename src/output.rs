// 该文件是 Detect Contract （检测契约） 项目的一部分。
// src/output.rs - 输出定义
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

use std::path::PathBuf;

use tracing::info;

use crate::model::DetectResult;

pub trait Render<Frame, Output>: Sized {
  type Error;
  fn render_result(&self, frame: &Frame, result: &Output) -> Result<(), Self::Error>;
}

/// 在终端打印检测结果，可选写入记录文件
#[derive(Debug, Default)]
pub struct ConsoleOutput {
  record: Option<PathBuf>,
}

impl ConsoleOutput {
  pub fn with_record(mut self, record: Option<PathBuf>) -> Self {
    self.record = record;
    self
  }
}

/// 每行一条: class_id, score, x_min, y_min, x_max, y_max
pub fn format_records(result: &DetectResult) -> String {
  result
    .items
    .iter()
    .map(|item| {
      format!(
        "{}, {:.4}, {:.4}, {:.4}, {:.4}, {:.4}",
        item.class_id, item.score, item.bbox[0], item.bbox[1], item.bbox[2], item.bbox[3]
      )
    })
    .collect::<Vec<_>>()
    .join("\n")
}

impl<F> Render<F, DetectResult> for ConsoleOutput {
  type Error = std::io::Error;

  fn render_result(&self, _frame: &F, result: &DetectResult) -> Result<(), Self::Error> {
    println!("检测到 {} 个对象", result.items.len());
    for item in result.items.iter() {
      println!(
        "  - 类别 {}: {:.2}% at ({:.3}, {:.3}, {:.3}, {:.3})",
        item.class_id,
        item.score * 100.0,
        item.bbox[0],
        item.bbox[1],
        item.bbox[2],
        item.bbox[3]
      );
    }

    if let Some(path) = &self.record {
      std::fs::write(path, format_records(result))?;
      info!("检测记录已写入: {}", path.display());
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::DetectItem;

  #[test]
  fn record_lines() {
    let result = DetectResult {
      items: vec![DetectItem {
        class_id: 4,
        score: 0.5,
        bbox: [0.1, 0.2, 0.3, 0.4],
      }]
      .into_boxed_slice(),
    };
    assert_eq!(
      format_records(&result),
      "4, 0.5000, 0.1000, 0.2000, 0.3000, 0.4000"
    );
  }
}
