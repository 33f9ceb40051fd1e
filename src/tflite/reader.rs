// 该文件是 Detect Contract （检测契约） 项目的一部分。
// src/tflite/reader.rs - TFLite 模型读取
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

use std::{fmt, path::Path};

use tflite::{
  FlatBufferModel, Interpreter, InterpreterBuilder, ops::builtin::BuiltinOpResolver,
};
use tracing::{debug, info};

use super::{TFLITE_FILE_IDENTIFIER, TensorType, TfliteError};

#[derive(Debug, Clone, PartialEq)]
pub struct TensorInfo {
  pub index: usize,
  pub name: String,
  /// 运行时报告了本 crate 不认识的类型时为 None
  pub dtype: Option<TensorType>,
  pub shape: Vec<usize>,
}

/// 由 TFLite 运行时加载的模型
pub struct TfliteModel {
  size_bytes: usize,
  interpreter: Interpreter<'static, BuiltinOpResolver>,
  tensors: Vec<TensorInfo>,
  allocated: bool,
}

impl fmt::Debug for TfliteModel {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("TfliteModel")
      .field("size_bytes", &self.size_bytes)
      .field("tensors", &self.tensors.len())
      .field("nodes", &self.node_count())
      .field("allocated", &self.allocated)
      .finish()
  }
}

impl TfliteModel {
  pub fn load(path: impl AsRef<Path>) -> Result<Self, TfliteError> {
    let path = path.as_ref();
    info!("读取 TFLite 模型: {}", path.display());
    let data = std::fs::read(path)?;
    debug!("模型文件大小: {:.2} KB", data.len() as f64 / 1024.0);
    Self::from_bytes(data)
  }

  pub fn from_bytes(data: Vec<u8>) -> Result<Self, TfliteError> {
    // 先看文件标识，非 TFLite 文件不交给运行时
    match data.get(4..8) {
      Some(id) if id == TFLITE_FILE_IDENTIFIER.as_bytes() => {}
      other => {
        let id = other
          .map(|b| String::from_utf8_lossy(b).into_owned())
          .unwrap_or_default();
        return Err(TfliteError::NotTflite(id));
      }
    }

    let size_bytes = data.len();
    let model = FlatBufferModel::build_from_buffer(data)?;
    let resolver = BuiltinOpResolver::default();
    let interpreter = InterpreterBuilder::new(model, resolver)?.build()?;

    let tensors = (0..interpreter.tensors_size())
      .filter_map(|index| {
        interpreter
          .tensor_info(index as i32)
          .map(|info| TensorInfo {
            index,
            name: info.name,
            dtype: TensorType::from_element_kind(info.element_kind),
            shape: info.dims,
          })
      })
      .collect::<Vec<_>>();

    debug!(
      "TFLite 模型: 张量 {} 个, 算子 {} 个",
      tensors.len(),
      interpreter.nodes_size()
    );

    Ok(TfliteModel {
      size_bytes,
      interpreter,
      tensors,
      allocated: false,
    })
  }

  /// 模型文件的字节数
  pub fn size_bytes(&self) -> usize {
    self.size_bytes
  }

  pub fn node_count(&self) -> usize {
    self.interpreter.nodes_size()
  }

  pub fn tensors(&self) -> &[TensorInfo] {
    &self.tensors
  }

  pub fn input_tensors(&self) -> impl Iterator<Item = &TensorInfo> {
    self
      .interpreter
      .inputs()
      .iter()
      .filter_map(|&i| self.tensors.iter().find(|t| t.index as i32 == i))
  }

  pub fn output_tensors(&self) -> impl Iterator<Item = &TensorInfo> {
    self
      .interpreter
      .outputs()
      .iter()
      .filter_map(|&i| self.tensors.iter().find(|t| t.index as i32 == i))
  }

  pub fn tensor_by_name(&self, name: &str) -> Option<&TensorInfo> {
    self.tensors.iter().find(|t| t.name == name)
  }

  /// 为全部张量分配内存，运行时会在此完成每个算子的形状推导
  pub fn allocate(&mut self) -> Result<(), TfliteError> {
    if !self.allocated {
      self.interpreter.allocate_tensors()?;
      self.allocated = true;
      debug!("TFLite 张量分配完成");
    }
    Ok(())
  }

  /// 常量张量的 float32 数据
  pub fn tensor_f32(&self, tensor: &TensorInfo) -> Result<&[f32], TfliteError> {
    Ok(self.interpreter.tensor_data(tensor.index as i32)?)
  }

  /// 以单输入单输出的方式执行一次推理
  pub fn run(&mut self, input: &[f32]) -> Result<Vec<f32>, TfliteError> {
    self.allocate()?;
    let input_index = *self
      .interpreter
      .inputs()
      .first()
      .ok_or(TfliteError::MissingTensor("输入"))?;
    let output_index = *self
      .interpreter
      .outputs()
      .first()
      .ok_or(TfliteError::MissingTensor("输出"))?;

    let slot: &mut [f32] = self.interpreter.tensor_data_mut(input_index)?;
    if slot.len() != input.len() {
      return Err(TfliteError::InputLength {
        expected: slot.len(),
        actual: input.len(),
      });
    }
    slot.copy_from_slice(input);

    self.interpreter.invoke()?;
    let output: &[f32] = self.interpreter.tensor_data(output_index)?;
    Ok(output.to_vec())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::tflite::{BuiltinOperator, BuiltinOptions, GraphBuilder};

  fn reshape_graph() -> Vec<u8> {
    let mut graph = GraphBuilder::new("sample");
    let input = graph.tensor("input", TensorType::Float32, &[1, 4]);
    let shape = graph.constant_i32("shape", &[2], &[2, 2]);
    let output = graph.tensor("output", TensorType::Float32, &[2, 2]);
    graph.operator(
      BuiltinOperator::Reshape,
      &[input, shape],
      &[output],
      Some(BuiltinOptions::Reshape {
        new_shape: vec![2, 2],
      }),
    );
    graph.inputs(&[input]);
    graph.outputs(&[output]);
    graph.finish()
  }

  #[test]
  fn rejects_foreign_identifier() {
    let mut data = vec![0u8; 32];
    data[4..8].copy_from_slice(b"GGUF");
    match TfliteModel::from_bytes(data) {
      Err(TfliteError::NotTflite(id)) => assert_eq!(id, "GGUF"),
      other => panic!("期望 NotTflite, 实际 {:?}", other),
    }
  }

  #[test]
  fn rejects_short_file() {
    assert!(matches!(
      TfliteModel::from_bytes(vec![1, 2, 3]),
      Err(TfliteError::NotTflite(_))
    ));
  }

  #[test]
  fn runtime_reads_written_graph() {
    let mut model = TfliteModel::from_bytes(reshape_graph()).unwrap();
    assert_eq!(model.node_count(), 1);

    let inputs: Vec<_> = model.input_tensors().collect();
    assert_eq!(inputs.len(), 1);
    assert_eq!(inputs[0].name, "input");
    assert_eq!(inputs[0].shape, vec![1, 4]);
    assert_eq!(inputs[0].dtype, Some(TensorType::Float32));

    let shape = model.tensor_by_name("shape").unwrap().clone();
    assert_eq!(shape.dtype, Some(TensorType::Int32));

    model.allocate().unwrap();
    let outputs: Vec<_> = model.output_tensors().collect();
    assert_eq!(outputs[0].shape, vec![2, 2]);
  }

  #[test]
  fn runs_one_inference() {
    let mut model = TfliteModel::from_bytes(reshape_graph()).unwrap();
    let output = model.run(&[1.0, 2.0, 3.0, 4.0]).unwrap();
    assert_eq!(output, vec![1.0, 2.0, 3.0, 4.0]);
    assert!(matches!(
      model.run(&[1.0]),
      Err(TfliteError::InputLength {
        expected: 4,
        actual: 1
      })
    ));
  }
}
