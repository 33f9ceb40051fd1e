// 该文件是 Detect Contract （检测契约） 项目的一部分。
// tests/placeholder_pipeline.rs - 占位模型从生成到解码的完整流程
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

use detect_contract::{
  FromUrl,
  artifact::{ArtifactError, TfliteArtifact},
  contract::{DetectionTensorContract, TensorRole},
  export::{Export, GeneratePlaceholder},
  frame::RgbNhwcFrame,
  model::{Decoder, Model, PlaceholderModel, PlaceholderWeights, RuntimeModel},
  tflite::{Activation, BuiltinOperator, BuiltinOptions, GraphBuilder, TensorType},
};
use url::Url;

fn work_dir(name: &str) -> PathBuf {
  let dir = std::env::temp_dir().join(format!(
    "detect-contract-it-{}-{}",
    name,
    std::process::id()
  ));
  std::fs::create_dir_all(&dir).unwrap();
  dir
}

fn tflite_url(path: &Path) -> Url {
  Url::parse(&format!("tflite://{}", path.display())).unwrap()
}

/// [1, 640, 640, 3] -> MEAN -> Dense -> [1, detections, 6]
fn pooled_head(detections: i32) -> Vec<u8> {
  let units = detections * 6;
  let mut graph = GraphBuilder::new("foreign");
  let input = graph.tensor("images", TensorType::Float32, &[1, 640, 640, 3]);
  let axes = graph.constant_i32("axes", &[2], &[1, 2]);
  let pooled = graph.tensor("pooled", TensorType::Float32, &[1, 3]);
  graph.operator(
    BuiltinOperator::Mean,
    &[input, axes],
    &[pooled],
    Some(BuiltinOptions::Reducer { keep_dims: false }),
  );
  let weights = graph.constant_f32("weights", &[units, 3], &vec![0.0f32; units as usize * 3]);
  let bias = graph.constant_f32("bias", &[units], &vec![0.0f32; units as usize]);
  let dense = graph.tensor("dense", TensorType::Float32, &[1, units]);
  graph.operator(
    BuiltinOperator::FullyConnected,
    &[pooled, weights, bias],
    &[dense],
    Some(BuiltinOptions::FullyConnected {
      activation: Activation::None,
    }),
  );
  let new_shape = vec![1, detections, 6];
  let shape = graph.constant_i32("shape", &[3], &new_shape);
  let output = graph.tensor("detections", TensorType::Float32, &new_shape);
  graph.operator(
    BuiltinOperator::Reshape,
    &[dense, shape],
    &[output],
    Some(BuiltinOptions::Reshape { new_shape }),
  );
  graph.inputs(&[input]);
  graph.outputs(&[output]);
  graph.finish()
}

#[test]
fn generated_placeholder_passes_contract() {
  let path = work_dir("generate").join("yolov11_sign_language.tflite");
  let report = GeneratePlaceholder::new(&path).seed(2026).export().unwrap();
  assert!(report.conforms);

  let artifact = TfliteArtifact::from_url(&tflite_url(&path)).unwrap();
  artifact.validate().unwrap();

  let signature = artifact.signature();
  let expected_input: Vec<i64> = DetectionTensorContract::INPUT_SHAPE
    .iter()
    .map(|&d| d as i64)
    .collect();
  let expected_output: Vec<i64> = DetectionTensorContract::OUTPUT_SHAPE
    .iter()
    .map(|&d| d as i64)
    .collect();
  assert_eq!(signature.input_shape(), Some(expected_input.as_slice()));
  assert_eq!(signature.output_shape(), Some(expected_output.as_slice()));
}

#[test]
fn weights_from_file_drive_the_decoder() {
  let path = work_dir("weights").join("placeholder.tflite");
  GeneratePlaceholder::new(&path).seed(5).export().unwrap();

  let artifact = TfliteArtifact::open(&path).unwrap();
  let weights = PlaceholderWeights::from_tflite(artifact.model()).unwrap();

  let data: Vec<u8> = (0..RgbNhwcFrame::<16, 16>::LEN)
    .map(|i| (i % 251) as u8)
    .collect();
  let frame = RgbNhwcFrame::<16, 16>::try_from(data).unwrap();

  let model = PlaceholderModel::<16, 16>::new(weights).with_decoder(Decoder::new(f32::MIN, None));
  let tensor = model.forward(&frame).unwrap();
  assert_eq!(tensor.as_slice().len(), DetectionTensorContract::output_len());

  // 与相同种子直接构造的模型结果一致
  let seeded = PlaceholderModel::<16, 16>::new(PlaceholderWeights::seeded(5));
  assert_eq!(seeded.forward(&frame).unwrap(), tensor);

  // 阈值取最小值且不做 NMS 时，每个类别编号合法的槽位都保留
  let result = model.infer(&frame).unwrap();
  let valid = tensor
    .records()
    .filter(|r| r.class_id.round() >= 0.0)
    .count();
  assert_eq!(result.items.len(), valid);
}

#[test]
fn foreign_graph_reports_diverging_dimension() {
  let path = work_dir("foreign").join("model.tflite");
  std::fs::write(&path, pooled_head(50)).unwrap();

  let mut artifact = TfliteArtifact::open(&path).unwrap();
  artifact.allocate().unwrap();
  match artifact.validate() {
    Err(ArtifactError::ShapeMismatch(m)) => {
      assert_eq!(m.diverged_dims(TensorRole::Output), vec![1]);
      assert!(m.diverged_dims(TensorRole::Input).is_empty());
    }
    other => panic!("期望 ShapeMismatch, 实际 {:?}", other),
  }
}

#[test]
fn non_tflite_file_is_rejected() {
  let path = work_dir("garbage").join("best.pt");
  std::fs::write(&path, b"PK\x03\x04 not a flatbuffer").unwrap();
  assert!(matches!(
    TfliteArtifact::open(&path),
    Err(ArtifactError::TfliteError(_))
  ));
}

#[test]
fn generated_placeholder_runs_in_interpreter() {
  const SIZE: u32 = DetectionTensorContract::INPUT_SIZE as u32;
  let path = work_dir("runtime").join("placeholder.tflite");
  GeneratePlaceholder::new(&path).seed(9).export().unwrap();

  let artifact = TfliteArtifact::open(&path).unwrap();
  let model = RuntimeModel::<SIZE, SIZE>::new(artifact.into_model())
    .unwrap()
    .with_decoder(Decoder::new(f32::MIN, None));

  // 全黑输入且偏置为零，输出全零，每个槽位都解码为类别 0
  let frame = RgbNhwcFrame::<SIZE, SIZE>::default();
  let tensor = model.forward(&frame).unwrap();
  assert_eq!(tensor.as_slice().len(), DetectionTensorContract::output_len());
  assert!(tensor.as_slice().iter().all(|&v| v == 0.0));
  assert_eq!(
    model.infer(&frame).unwrap().items.len(),
    DetectionTensorContract::MAX_DETECTIONS
  );
}
