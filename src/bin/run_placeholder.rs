// 该文件是 Detect Contract （检测契约） 项目的一部分。
// src/bin/run_placeholder.rs - 用占位模型对单张图片做一次推理
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
use url::Url;

use detect_contract::{
  FromUrl,
  artifact::TfliteArtifact,
  contract::DetectionTensorContract,
  input::ImageFileInput,
  model::{Decoder, PlaceholderModel, PlaceholderWeights, RuntimeModel},
  output::ConsoleOutput,
  task::{OneShotTask, Task},
};

const INPUT_SIZE: u32 = DetectionTensorContract::INPUT_SIZE as u32;

/// 读取占位模型权重，对单张图片推理并打印解码后的检测结果
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 占位模型，如 tflite:///path/model.tflite
  #[arg(long, value_name = "MODEL")]
  pub model: Url,
  /// 输入图片，如 image:///path/sample.jpg
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 置信度阈值 (0.0 - 1.0)
  #[arg(long, default_value = "0.5", value_name = "THRESHOLD")]
  pub confidence: f32,
  /// NMS IOU 阈值 (0.0 - 1.0)
  #[arg(long, default_value = "0.45", value_name = "THRESHOLD")]
  pub nms_threshold: f32,
  /// 检测记录输出路径
  #[arg(long, value_name = "FILE")]
  pub record: Option<PathBuf>,
  /// 交给 TFLite 运行时执行模型文件，而不是读取占位权重在本地计算
  #[arg(long)]
  pub runtime: bool,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();
  info!("模型文件路径: {}", args.model);
  info!("输入来源: {}", args.input);

  let artifact = TfliteArtifact::from_url(&args.model)?;
  artifact.validate()?;

  let decoder = Decoder::new(args.confidence, Some(args.nms_threshold));
  let input = ImageFileInput::<INPUT_SIZE, INPUT_SIZE>::from_url(&args.input)?;
  let output = ConsoleOutput::default().with_record(args.record);

  if args.runtime {
    let model = RuntimeModel::<INPUT_SIZE, INPUT_SIZE>::new(artifact.into_model())?
      .with_decoder(decoder);
    OneShotTask.run_task(input.into_nhwc(), model, output)?;
  } else {
    let weights = PlaceholderWeights::from_tflite(artifact.model())?;
    let model = PlaceholderModel::<INPUT_SIZE, INPUT_SIZE>::new(weights).with_decoder(decoder);
    OneShotTask.run_task(input.into_nhwc(), model, output)?;
  }

  Ok(())
}
