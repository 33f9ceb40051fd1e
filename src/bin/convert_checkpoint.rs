// 该文件是 Detect Contract （检测契约） 项目的一部分。
// src/bin/convert_checkpoint.rs - 训练检查点转换为 TFLite
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

use anyhow::Result;
use clap::Parser;
use tracing::info;

use detect_contract::export::{ConvertCheckpoint, Export};

/// 将训练好的 YOLO 检查点转换为 TFLite，并检查检测契约
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 模型检查点路径 (.pt)
  #[arg(long, default_value = "assets/best.pt", value_name = "FILE")]
  pub checkpoint: PathBuf,
  /// 输入分辨率
  #[arg(long, default_value = "640", value_name = "SIZE")]
  pub imgsz: usize,
  /// 导出工具
  #[arg(long, default_value = "yolo", value_name = "PROGRAM")]
  pub exporter: String,
  /// 传给导出工具的额外参数，形如 key=value，可重复
  #[arg(long = "exporter-arg", value_name = "KEY=VALUE")]
  pub exporter_args: Vec<String>,
  /// 转换完成后复制到该路径
  #[arg(long, value_name = "FILE")]
  pub output: Option<PathBuf>,
  /// 导出报告（JSON）路径
  #[arg(long, value_name = "FILE")]
  pub report: Option<PathBuf>,
  /// 形状不符时仅警告，不中止
  #[arg(long)]
  pub allow_mismatch: bool,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();
  info!("检查点路径: {}", args.checkpoint.display());
  info!("导出工具: {}", args.exporter);

  let report = ConvertCheckpoint::new(&args.checkpoint)
    .imgsz(args.imgsz)
    .exporter(args.exporter.clone())
    .exporter_args(args.exporter_args.clone())
    .output(args.output.clone())
    .allow_mismatch(args.allow_mismatch)
    .export()?;

  println!();
  println!("导出完成!");
  report.print_summary();
  if let Some(path) = &args.report {
    report.write_json(path)?;
  }

  if args.output.is_none() {
    println!();
    println!("现在可以将 .tflite 文件复制到 assets 目录并按需重命名。");
  }

  Ok(())
}
