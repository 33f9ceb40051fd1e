// 该文件是 Detect Contract （检测契约） 项目的一部分。
// src/tflite/writer.rs - TFLite 计算图写出
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

use byteorder::{ByteOrder, LittleEndian};
use flatbuffers::{FlatBufferBuilder, TableFinishedWIPOffset, VOffsetT, WIPOffset};
use tracing::debug;

use super::{BuiltinOperator, TFLITE_FILE_IDENTIFIER, TFLITE_SCHEMA_VERSION, TensorType, slot};

type Table = WIPOffset<TableFinishedWIPOffset>;

/// 槽位对应的 vtable 偏移
fn field(slot: usize) -> VOffsetT {
  (4 + 2 * slot) as VOffsetT
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Padding {
  Same,
  Valid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activation {
  None,
  Relu,
}

impl Activation {
  fn code(self) -> u8 {
    match self {
      Activation::None => 0,
      Activation::Relu => 1,
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BuiltinOptions {
  Conv2d {
    padding: Padding,
    stride: (i32, i32),
    activation: Activation,
  },
  FullyConnected {
    activation: Activation,
  },
  Reshape {
    new_shape: Vec<i32>,
  },
  Reducer {
    keep_dims: bool,
  },
}

impl BuiltinOptions {
  /// BuiltinOptions 联合体中的类型编号
  fn type_code(&self) -> u8 {
    match self {
      BuiltinOptions::Conv2d { .. } => 1,
      BuiltinOptions::FullyConnected { .. } => 8,
      BuiltinOptions::Reshape { .. } => 17,
      BuiltinOptions::Reducer { .. } => 27,
    }
  }

  fn write(&self, fbb: &mut FlatBufferBuilder<'_>) -> Table {
    match self {
      BuiltinOptions::Conv2d {
        padding,
        stride,
        activation,
      } => {
        let padding = match padding {
          Padding::Same => 0u8,
          Padding::Valid => 1u8,
        };
        let start = fbb.start_table();
        fbb.push_slot::<u8>(field(slot::conv2d_options::PADDING), padding, 0);
        fbb.push_slot::<i32>(field(slot::conv2d_options::STRIDE_W), stride.0, 0);
        fbb.push_slot::<i32>(field(slot::conv2d_options::STRIDE_H), stride.1, 0);
        fbb.push_slot::<u8>(
          field(slot::conv2d_options::FUSED_ACTIVATION),
          activation.code(),
          0,
        );
        fbb.push_slot_always::<i32>(field(slot::conv2d_options::DILATION_W), 1);
        fbb.push_slot_always::<i32>(field(slot::conv2d_options::DILATION_H), 1);
        fbb.end_table(start)
      }
      BuiltinOptions::FullyConnected { activation } => {
        let start = fbb.start_table();
        fbb.push_slot::<u8>(
          field(slot::fully_connected_options::FUSED_ACTIVATION),
          activation.code(),
          0,
        );
        fbb.end_table(start)
      }
      BuiltinOptions::Reshape { new_shape } => {
        let new_shape = fbb.create_vector(new_shape);
        let start = fbb.start_table();
        fbb.push_slot_always(field(slot::reshape_options::NEW_SHAPE), new_shape);
        fbb.end_table(start)
      }
      BuiltinOptions::Reducer { keep_dims } => {
        let start = fbb.start_table();
        fbb.push_slot::<bool>(field(slot::reducer_options::KEEP_DIMS), *keep_dims, false);
        fbb.end_table(start)
      }
    }
  }
}

struct TensorSpec {
  name: String,
  dtype: TensorType,
  shape: Vec<i32>,
  buffer: u32,
}

struct OperatorSpec {
  opcode_index: u32,
  inputs: Vec<i32>,
  outputs: Vec<i32>,
  options: Option<BuiltinOptions>,
}

/// 单子图 TFLite 模型构造器
pub struct GraphBuilder {
  description: String,
  tensors: Vec<TensorSpec>,
  // 0 号缓冲区保留为空
  buffers: Vec<Vec<u8>>,
  opcodes: Vec<BuiltinOperator>,
  operators: Vec<OperatorSpec>,
  inputs: Vec<i32>,
  outputs: Vec<i32>,
}

impl GraphBuilder {
  pub fn new(description: &str) -> Self {
    GraphBuilder {
      description: description.to_string(),
      tensors: Vec::new(),
      buffers: vec![Vec::new()],
      opcodes: Vec::new(),
      operators: Vec::new(),
      inputs: Vec::new(),
      outputs: Vec::new(),
    }
  }

  fn push_tensor(&mut self, name: &str, dtype: TensorType, shape: &[i32], buffer: u32) -> i32 {
    self.tensors.push(TensorSpec {
      name: name.to_string(),
      dtype,
      shape: shape.to_vec(),
      buffer,
    });
    (self.tensors.len() - 1) as i32
  }

  /// 运行时张量（无常量数据）
  pub fn tensor(&mut self, name: &str, dtype: TensorType, shape: &[i32]) -> i32 {
    self.push_tensor(name, dtype, shape, 0)
  }

  fn constant(&mut self, name: &str, dtype: TensorType, shape: &[i32], data: Vec<u8>) -> i32 {
    self.buffers.push(data);
    let buffer = (self.buffers.len() - 1) as u32;
    self.push_tensor(name, dtype, shape, buffer)
  }

  pub fn constant_f32(&mut self, name: &str, shape: &[i32], values: &[f32]) -> i32 {
    let mut data = vec![0u8; values.len() * 4];
    LittleEndian::write_f32_into(values, &mut data);
    self.constant(name, TensorType::Float32, shape, data)
  }

  pub fn constant_i32(&mut self, name: &str, shape: &[i32], values: &[i32]) -> i32 {
    let mut data = vec![0u8; values.len() * 4];
    LittleEndian::write_i32_into(values, &mut data);
    self.constant(name, TensorType::Int32, shape, data)
  }

  pub fn operator(
    &mut self,
    op: BuiltinOperator,
    inputs: &[i32],
    outputs: &[i32],
    options: Option<BuiltinOptions>,
  ) {
    let opcode_index = match self.opcodes.iter().position(|&o| o == op) {
      Some(i) => i,
      None => {
        self.opcodes.push(op);
        self.opcodes.len() - 1
      }
    };
    self.operators.push(OperatorSpec {
      opcode_index: opcode_index as u32,
      inputs: inputs.to_vec(),
      outputs: outputs.to_vec(),
      options,
    });
  }

  pub fn inputs(&mut self, inputs: &[i32]) {
    self.inputs = inputs.to_vec();
  }

  pub fn outputs(&mut self, outputs: &[i32]) {
    self.outputs = outputs.to_vec();
  }

  /// 写出完整的 FlatBuffer，子对象先于引用它们的表写入
  pub fn finish(self) -> Vec<u8> {
    let mut fbb = FlatBufferBuilder::new();

    let opcodes: Vec<Table> = self
      .opcodes
      .iter()
      .map(|&op| {
        let code: i32 = op.into();
        let start = fbb.start_table();
        fbb.push_slot::<i8>(
          field(slot::operator_code::DEPRECATED_BUILTIN_CODE),
          code.min(127) as i8,
          0,
        );
        fbb.push_slot_always::<i32>(field(slot::operator_code::VERSION), 1);
        fbb.push_slot::<i32>(field(slot::operator_code::BUILTIN_CODE), code, 0);
        fbb.end_table(start)
      })
      .collect();

    let tensors: Vec<Table> = self
      .tensors
      .iter()
      .map(|t| {
        let shape = fbb.create_vector(&t.shape);
        let name = fbb.create_string(&t.name);
        let start = fbb.start_table();
        fbb.push_slot_always(field(slot::tensor::SHAPE), shape);
        fbb.push_slot::<u8>(field(slot::tensor::TYPE), t.dtype.into(), 0);
        fbb.push_slot::<u32>(field(slot::tensor::BUFFER), t.buffer, 0);
        fbb.push_slot_always(field(slot::tensor::NAME), name);
        fbb.end_table(start)
      })
      .collect();

    let operators: Vec<Table> = self
      .operators
      .iter()
      .map(|op| {
        let inputs = fbb.create_vector(&op.inputs);
        let outputs = fbb.create_vector(&op.outputs);
        let options = op
          .options
          .as_ref()
          .map(|options| (options.type_code(), options.write(&mut fbb)));
        let start = fbb.start_table();
        fbb.push_slot::<u32>(field(slot::operator::OPCODE_INDEX), op.opcode_index, 0);
        fbb.push_slot_always(field(slot::operator::INPUTS), inputs);
        fbb.push_slot_always(field(slot::operator::OUTPUTS), outputs);
        if let Some((code, table)) = options {
          fbb.push_slot::<u8>(field(slot::operator::BUILTIN_OPTIONS_TYPE), code, 0);
          fbb.push_slot_always(field(slot::operator::BUILTIN_OPTIONS), table);
        }
        fbb.end_table(start)
      })
      .collect();

    let subgraph = {
      let tensors = fbb.create_vector(&tensors);
      let inputs = fbb.create_vector(&self.inputs);
      let outputs = fbb.create_vector(&self.outputs);
      let operators = fbb.create_vector(&operators);
      let name = fbb.create_string("main");
      let start = fbb.start_table();
      fbb.push_slot_always(field(slot::subgraph::TENSORS), tensors);
      fbb.push_slot_always(field(slot::subgraph::INPUTS), inputs);
      fbb.push_slot_always(field(slot::subgraph::OUTPUTS), outputs);
      fbb.push_slot_always(field(slot::subgraph::OPERATORS), operators);
      fbb.push_slot_always(field(slot::subgraph::NAME), name);
      fbb.end_table(start)
    };

    let buffers: Vec<Table> = self
      .buffers
      .iter()
      .map(|data| {
        let data = (!data.is_empty()).then(|| fbb.create_vector(data));
        let start = fbb.start_table();
        if let Some(data) = data {
          fbb.push_slot_always(field(slot::buffer::DATA), data);
        }
        fbb.end_table(start)
      })
      .collect();

    let opcodes = fbb.create_vector(&opcodes);
    let subgraphs = fbb.create_vector(&[subgraph]);
    let description = fbb.create_string(&self.description);
    let buffers = fbb.create_vector(&buffers);

    let start = fbb.start_table();
    fbb.push_slot::<u32>(field(slot::model::VERSION), TFLITE_SCHEMA_VERSION, 0);
    fbb.push_slot_always(field(slot::model::OPERATOR_CODES), opcodes);
    fbb.push_slot_always(field(slot::model::SUBGRAPHS), subgraphs);
    fbb.push_slot_always(field(slot::model::DESCRIPTION), description);
    fbb.push_slot_always(field(slot::model::BUFFERS), buffers);
    let model = fbb.end_table(start);

    fbb.finish(model, Some(TFLITE_FILE_IDENTIFIER));
    let data = fbb.finished_data().to_vec();
    debug!(
      "写出 TFLite 模型: 张量 {} 个, 算子 {} 个, {} 字节",
      self.tensors.len(),
      self.operators.len(),
      data.len()
    );
    data
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn carries_file_identifier() {
    let mut graph = GraphBuilder::new("identifier");
    let input = graph.tensor("input", TensorType::Float32, &[1, 4]);
    graph.inputs(&[input]);
    graph.outputs(&[input]);
    let data = graph.finish();
    assert_eq!(&data[4..8], TFLITE_FILE_IDENTIFIER.as_bytes());
  }

  #[test]
  fn constants_are_little_endian() {
    let mut graph = GraphBuilder::new("constants");
    graph.constant_i32("shape", &[2], &[2, 258]);
    assert_eq!(graph.buffers[1], vec![2, 0, 0, 0, 2, 1, 0, 0]);
    assert!(graph.buffers[0].is_empty());
  }

  #[test]
  fn operator_codes_are_shared() {
    let mut graph = GraphBuilder::new("codes");
    graph.operator(BuiltinOperator::Reshape, &[0], &[1], None);
    graph.operator(BuiltinOperator::Mean, &[1], &[2], None);
    graph.operator(BuiltinOperator::Reshape, &[2], &[3], None);
    assert_eq!(graph.opcodes.len(), 2);
    assert_eq!(graph.operators[2].opcode_index, 0);
  }
}
