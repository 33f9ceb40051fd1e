// 该文件是 Detect Contract （检测契约） 项目的一部分。
// src/bin/inspect_artifact.rs - 查看模型签名并检查检测契约
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

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};
use url::Url;

use detect_contract::{FromUrl, artifact::TfliteArtifact};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 模型产物，如 tflite:///path/model.tflite
  #[arg(long, value_name = "MODEL")]
  pub artifact: Url,
  /// 形状不符时仅警告，不以失败退出
  #[arg(long)]
  pub allow_mismatch: bool,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();
  info!("模型产物: {}", args.artifact);

  let mut artifact = TfliteArtifact::from_url(&args.artifact)?;
  let signature = artifact.signature();

  println!("模型文件: {}", artifact.path().display());
  println!("   模型大小: {:.2} KB", artifact.size_bytes() as f64 / 1024.0);
  println!(
    "   张量 {} 个, 算子 {} 个",
    artifact.model().tensors().len(),
    artifact.model().node_count()
  );
  for tensor in &signature.inputs {
    println!("   输入: {}", tensor);
  }
  for tensor in &signature.outputs {
    println!("   输出: {}", tensor);
  }

  // 运行时无法加载的模型与形状无关，总是失败
  artifact.allocate()?;
  println!("   运行时分配: 成功");

  match artifact.validate() {
    Ok(()) => println!("   检测契约: 符合"),
    Err(e) if args.allow_mismatch => {
      warn!("{}", e);
      println!("   检测契约: 不符合 ({})", e);
    }
    Err(e) => return Err(e.into()),
  }

  Ok(())
}
