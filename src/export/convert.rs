// 该文件是 Detect Contract （检测契约） 项目的一部分。
// src/export/convert.rs - 训练检查点转换为 TFLite
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
  collections::HashMap,
  path::{Path, PathBuf},
  process::Command,
  time::SystemTime,
};

use tracing::{debug, error, info, warn};

use crate::{
  contract::DetectionTensorContract,
  export::{ArtifactKind, Export, ExportError, ExportReport, accept_artifact},
};

pub const DEFAULT_EXPORTER: &str = "yolo";

/// 调用外部导出工具（Ultralytics CLI）完成 .pt -> .tflite 转换
#[derive(Debug, Clone)]
pub struct ConvertCheckpoint {
  checkpoint: PathBuf,
  imgsz: usize,
  exporter: String,
  exporter_args: Vec<String>,
  output: Option<PathBuf>,
  allow_mismatch: bool,
}

impl ConvertCheckpoint {
  pub fn new(checkpoint: impl Into<PathBuf>) -> Self {
    ConvertCheckpoint {
      checkpoint: checkpoint.into(),
      imgsz: DetectionTensorContract::INPUT_SIZE,
      exporter: DEFAULT_EXPORTER.to_string(),
      exporter_args: Vec::new(),
      output: None,
      allow_mismatch: false,
    }
  }

  pub fn imgsz(mut self, imgsz: usize) -> Self {
    self.imgsz = imgsz;
    self
  }

  pub fn exporter(mut self, exporter: impl Into<String>) -> Self {
    self.exporter = exporter.into();
    self
  }

  /// 额外的 `key=value` 导出参数
  pub fn exporter_args(mut self, args: impl IntoIterator<Item = String>) -> Self {
    self.exporter_args.extend(args);
    self
  }

  /// 转换完成后复制到该路径
  pub fn output(mut self, output: Option<PathBuf>) -> Self {
    self.output = output;
    self
  }

  pub fn allow_mismatch(mut self, allow: bool) -> Self {
    self.allow_mismatch = allow;
    self
  }

  /// 导出工具写出 .tflite 的目录: <dir>/<stem>_saved_model
  ///
  /// 文件名随精度变化（`_float32`、`_float16`、`_int8` 等），因此只约定目录。
  pub fn saved_model_dir(&self) -> PathBuf {
    let stem = self
      .checkpoint
      .file_stem()
      .map(|s| s.to_string_lossy().into_owned())
      .unwrap_or_else(|| "model".to_string());
    let dir = self
      .checkpoint
      .parent()
      .map(Path::to_path_buf)
      .unwrap_or_default();
    dir.join(format!("{}_saved_model", stem))
  }

  /// 找出本次导出写出的 .tflite，未被改动过的旧文件不算
  fn locate_export(&self, log: &str, before: &Snapshot) -> Result<PathBuf, ExportError> {
    let from_log = saved_paths(log)
      .into_iter()
      .filter(|p| is_tflite(p) && before.is_fresh(p))
      .last();
    if let Some(path) = from_log {
      debug!("导出工具报告的产物: {}", path.display());
      return Ok(path);
    }

    let dir = self.saved_model_dir();
    let after = Snapshot::take(&dir);
    let newest = after
      .files
      .iter()
      .filter(|(path, _)| before.is_fresh(path))
      .max_by_key(|(_, modified)| **modified)
      .map(|(path, _)| path.clone());

    newest.ok_or_else(|| {
      if after.files.is_empty() {
        ExportError::ConversionFailure(format!("导出工具未在 {} 生成 .tflite 文件", dir.display()))
      } else {
        warn!("{} 中只有上一次导出留下的文件", dir.display());
        ExportError::ConversionFailure(format!(
          "导出工具没有生成新的 .tflite 文件, {} 中的文件均早于本次导出",
          dir.display()
        ))
      }
    })
  }

  fn exporter_command(&self) -> Command {
    let mut command = Command::new(&self.exporter);
    command
      .arg("export")
      .arg(format!("model={}", self.checkpoint.display()))
      .arg("format=tflite")
      .arg(format!("imgsz={}", self.imgsz))
      .args(&self.exporter_args);
    command
  }

  /// 运行导出工具，返回其 stdout 与 stderr 合并后的日志
  fn run_exporter(&self) -> Result<String, ExportError> {
    let mut command = self.exporter_command();
    debug!("导出命令: {:?}", command);

    let output = command.output().map_err(|e| {
      error!("无法启动导出工具 {}: {}", self.exporter, e);
      ExportError::ConversionFailure(format!("无法启动导出工具 {}: {}", self.exporter, e))
    })?;

    if !output.status.success() {
      let stderr = String::from_utf8_lossy(&output.stderr);
      let tail: Vec<&str> = stderr.lines().rev().take(5).collect();
      let detail = tail.into_iter().rev().collect::<Vec<_>>().join("\n");
      error!("导出工具退出状态 {}: {}", output.status, detail);
      return Err(ExportError::ConversionFailure(format!(
        "导出工具退出状态 {}: {}",
        output.status, detail
      )));
    }
    let mut log = String::from_utf8_lossy(&output.stdout).into_owned();
    log.push_str(&String::from_utf8_lossy(&output.stderr));
    Ok(log)
  }
}

impl Export for ConvertCheckpoint {
  type Error = ExportError;

  fn export(self) -> Result<ExportReport, Self::Error> {
    if !self.checkpoint.is_file() {
      error!("模型检查点不存在: {}", self.checkpoint.display());
      return Err(ExportError::FileNotFound(self.checkpoint));
    }

    println!("正在从 {} 加载模型", self.checkpoint.display());
    println!("正在导出为 TFLite 格式 (imgsz={})...", self.imgsz);
    let before = Snapshot::take(&self.saved_model_dir());
    let log = self.run_exporter()?;

    let exported = self.locate_export(&log, &before)?;
    println!("模型已导出至: {}", exported.display());
    info!("导出完成: {}", exported.display());

    let artifact = match &self.output {
      Some(output) => {
        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
          std::fs::create_dir_all(parent)?;
        }
        std::fs::copy(&exported, output)?;
        info!("已复制到 {}", output.display());
        output.clone()
      }
      None => exported,
    };

    accept_artifact(ArtifactKind::Converted, &artifact, self.allow_mismatch, None)
  }
}

fn is_tflite(path: &Path) -> bool {
  path.is_file() && path.extension().is_some_and(|ext| ext == "tflite")
}

/// 从导出日志中取出 `saved as '<path>'` 里的路径
fn saved_paths(log: &str) -> Vec<PathBuf> {
  const MARKER: &str = "saved as '";
  log
    .match_indices(MARKER)
    .filter_map(|(at, _)| {
      let rest = &log[at + MARKER.len()..];
      rest.find('\'').map(|end| PathBuf::from(&rest[..end]))
    })
    .collect()
}

/// 导出目录中 .tflite 文件及其修改时间
#[derive(Debug, Default)]
struct Snapshot {
  files: HashMap<PathBuf, SystemTime>,
}

impl Snapshot {
  fn take(dir: &Path) -> Self {
    let files = std::fs::read_dir(dir)
      .into_iter()
      .flatten()
      .flatten()
      .map(|entry| entry.path())
      .filter(|path| is_tflite(path))
      .filter_map(|path| {
        let path = std::fs::canonicalize(&path).ok()?;
        let modified = std::fs::metadata(&path).and_then(|m| m.modified()).ok()?;
        Some((path, modified))
      })
      .collect();
    Snapshot { files }
  }

  /// 新出现的文件，或修改时间变化过的文件
  fn is_fresh(&self, path: &Path) -> bool {
    // 日志中的路径可能是相对路径，统一成绝对路径再比较
    let Ok(path) = std::fs::canonicalize(path) else {
      return false;
    };
    let modified = std::fs::metadata(&path).and_then(|m| m.modified()).ok();
    match (self.files.get(&path), modified) {
      (_, None) => false,
      (None, Some(_)) => true,
      (Some(before), Some(now)) => now != *before,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn temp_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
      "detect-contract-convert-{}-{}",
      name,
      std::process::id()
    ));
    std::fs::create_dir_all(&dir).unwrap();
    dir
  }

  #[test]
  fn saved_model_dir_follows_exporter_layout() {
    let task = ConvertCheckpoint::new("assets/best.pt");
    assert_eq!(task.saved_model_dir(), PathBuf::from("assets/best_saved_model"));
  }

  #[test]
  fn saved_paths_from_exporter_log() {
    let log = "TensorFlow SavedModel: export success 12.0s, saved as 'best_saved_model' (40.1 MB)\n\
               TensorFlow Lite: export success 0.0s, saved as 'best_saved_model/best_float16.tflite' (5.2 MB)\n";
    assert_eq!(
      saved_paths(log),
      vec![
        PathBuf::from("best_saved_model"),
        PathBuf::from("best_saved_model/best_float16.tflite"),
      ]
    );
    assert!(saved_paths("nothing here").is_empty());
  }

  #[test]
  fn command_line_matches_exporter() {
    let task = ConvertCheckpoint::new("best.pt").exporter_args(["nms=True".to_string()]);
    let command = task.exporter_command();
    assert_eq!(command.get_program(), "yolo");
    let args: Vec<_> = command
      .get_args()
      .map(|a| a.to_string_lossy().into_owned())
      .collect();
    assert_eq!(
      args,
      vec!["export", "model=best.pt", "format=tflite", "imgsz=640", "nms=True"]
    );
  }

  #[test]
  fn missing_checkpoint() {
    let task = ConvertCheckpoint::new("/nonexistent/best.pt");
    assert!(matches!(task.export(), Err(ExportError::FileNotFound(_))));
  }

  #[test]
  fn missing_exporter_is_a_conversion_failure() {
    let dir = temp_dir("no-exporter");
    let checkpoint = dir.join("best.pt");
    std::fs::write(&checkpoint, b"not a real checkpoint").unwrap();

    let task = ConvertCheckpoint::new(&checkpoint).exporter("detect-contract-no-such-exporter");
    assert!(matches!(
      task.export(),
      Err(ExportError::ConversionFailure(_))
    ));
  }

  #[cfg(unix)]
  #[test]
  fn exporter_without_output_is_a_conversion_failure() {
    let dir = temp_dir("no-output");
    let checkpoint = dir.join("best.pt");
    std::fs::write(&checkpoint, b"not a real checkpoint").unwrap();

    let task = ConvertCheckpoint::new(&checkpoint).exporter("true");
    match task.export() {
      Err(ExportError::ConversionFailure(msg)) => assert!(msg.contains("best_saved_model")),
      other => panic!("期望 ConversionFailure, 实际 {:?}", other),
    }
  }

  #[cfg(unix)]
  #[test]
  fn failing_exporter_is_a_conversion_failure() {
    let dir = temp_dir("failing");
    let checkpoint = dir.join("best.pt");
    std::fs::write(&checkpoint, b"not a real checkpoint").unwrap();

    let task = ConvertCheckpoint::new(&checkpoint).exporter("false");
    assert!(matches!(
      task.export(),
      Err(ExportError::ConversionFailure(_))
    ));
  }

  #[cfg(unix)]
  fn conforming_model(dir: &Path) -> PathBuf {
    use crate::export::GeneratePlaceholder;
    let path = dir.join("source.tflite");
    GeneratePlaceholder::new(&path).seed(3).export().unwrap();
    path
  }

  /// 写出一个模拟导出工具的脚本，把 source 复制为 <stem>_<suffix>.tflite
  #[cfg(unix)]
  fn script_exporter(dir: &Path, source: &Path, suffix: &str, log: bool) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let echo = if log {
      "echo \"TensorFlow Lite: export success 0.1s, saved as '$out' (1.0 MB)\"\n"
    } else {
      ""
    };
    let script = format!(
      "#!/bin/sh\n\
       model=\"${{2#model=}}\"\n\
       stem=$(basename \"$model\" .pt)\n\
       out=\"$(dirname \"$model\")/${{stem}}_saved_model/${{stem}}_{suffix}.tflite\"\n\
       mkdir -p \"$(dirname \"$out\")\"\n\
       cp \"{source}\" \"$out\"\n\
       {echo}",
      suffix = suffix,
      source = source.display(),
      echo = echo,
    );
    let path = dir.join(format!("exporter-{}.sh", suffix));
    std::fs::write(&path, script).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
  }

  #[cfg(unix)]
  #[test]
  fn stale_export_is_not_accepted() {
    let dir = temp_dir("stale");
    let checkpoint = dir.join("best.pt");
    std::fs::write(&checkpoint, b"not a real checkpoint").unwrap();

    // 上一次导出留下的、符合契约的文件
    let saved = dir.join("best_saved_model");
    std::fs::create_dir_all(&saved).unwrap();
    std::fs::copy(conforming_model(&dir), saved.join("best_float32.tflite")).unwrap();

    let task = ConvertCheckpoint::new(&checkpoint).exporter("true");
    match task.export() {
      Err(ExportError::ConversionFailure(msg)) => assert!(msg.contains("best_saved_model")),
      other => panic!("期望 ConversionFailure, 实际 {:?}", other),
    }
  }

  #[cfg(unix)]
  #[test]
  fn half_precision_export_is_found_by_log() {
    let dir = temp_dir("float16-log");
    let checkpoint = dir.join("best.pt");
    std::fs::write(&checkpoint, b"not a real checkpoint").unwrap();
    let exporter = script_exporter(&dir, &conforming_model(&dir), "float16", true);

    let report = ConvertCheckpoint::new(&checkpoint)
      .exporter(exporter.to_string_lossy())
      .exporter_args(["half=True".to_string()])
      .export()
      .unwrap();
    assert!(report.conforms);
    assert!(report.artifact.ends_with("best_saved_model/best_float16.tflite"));
  }

  #[cfg(unix)]
  #[test]
  fn int8_export_is_found_without_log() {
    let dir = temp_dir("int8-scan");
    let checkpoint = dir.join("best.pt");
    std::fs::write(&checkpoint, b"not a real checkpoint").unwrap();

    // 旧的 float32 文件仍在目录中，新写出的 int8 文件才是本次结果
    let source = conforming_model(&dir);
    let saved = dir.join("best_saved_model");
    std::fs::create_dir_all(&saved).unwrap();
    std::fs::copy(&source, saved.join("best_float32.tflite")).unwrap();
    let exporter = script_exporter(&dir, &source, "int8", false);

    let report = ConvertCheckpoint::new(&checkpoint)
      .exporter(exporter.to_string_lossy())
      .export()
      .unwrap();
    assert!(report.artifact.ends_with("best_saved_model/best_int8.tflite"));
  }
}
