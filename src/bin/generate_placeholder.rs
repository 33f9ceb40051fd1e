// 该文件是 Detect Contract （检测契约） 项目的一部分。
// src/bin/generate_placeholder.rs - 生成占位 TFLite 模型
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

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use detect_contract::export::{Export, GeneratePlaceholder};

/// 生成与检测契约形状一致的占位模型，用于移动端联调
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 输出的 TFLite 文件路径
  #[arg(long, default_value = "assets/yolov11_sign_language.tflite", value_name = "FILE")]
  pub output: PathBuf,
  /// 随机权重种子
  #[arg(long, default_value = "0", value_name = "SEED")]
  pub seed: u64,
  /// 导出报告（JSON）路径
  #[arg(long, value_name = "FILE")]
  pub report: Option<PathBuf>,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();
  info!("输出路径: {}", args.output.display());
  info!("权重种子: {}", args.seed);

  let report = GeneratePlaceholder::new(&args.output)
    .seed(args.seed)
    .export()
    .with_context(|| format!("生成占位模型失败: {}", args.output.display()))?;

  report.print_summary();
  if let Some(path) = &args.report {
    report.write_json(path)?;
  }

  println!();
  println!("注意: 这是仅用于测试的占位模型!");
  println!("   它只会输出随机检测结果，不具备真实识别能力。");
  println!("   完成训练后请替换为真实模型。");

  Ok(())
}
