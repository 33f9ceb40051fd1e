// 该文件是 Detect Contract （检测契约） 项目的一部分。
// src/model/runtime.rs - 由 TFLite 运行时执行的检测模型
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

use std::cell::RefCell;

use thiserror::Error;
use tracing::{debug, info};

use crate::{
  frame::{FrameError, RGB_CHANNELS, RgbNhwcFrame},
  input::AsNhwcFrame,
  model::{DecodeError, Decoder, DetectResult, DetectionTensor, Model},
  tflite::{TfliteError, TfliteModel},
};

#[derive(Error, Debug)]
pub enum RuntimeModelError {
  #[error("TFLite 错误: {0}")]
  Tflite(#[from] TfliteError),
  #[error("模型输入形状不符: 期望 {expected:?}, 实际 {actual:?}")]
  InputShape {
    expected: Vec<usize>,
    actual: Vec<usize>,
  },
  #[error("帧数据错误: {0}")]
  FrameError(#[from] FrameError),
  #[error("输出解码错误: {0}")]
  DecodeError(#[from] DecodeError),
}

/// 用 TFLite 解释器执行任意符合契约的模型，W x H 为输入尺寸
pub struct RuntimeModel<const W: u32, const H: u32> {
  // 解释器推理需要可变引用，而 Model::infer 只拿到 &self
  model: RefCell<TfliteModel>,
  decoder: Decoder,
}

impl<const W: u32, const H: u32> RuntimeModel<W, H> {
  pub fn new(mut model: TfliteModel) -> Result<Self, RuntimeModelError> {
    let expected = vec![1, H as usize, W as usize, RGB_CHANNELS];
    let actual = model
      .input_tensors()
      .next()
      .map(|t| t.shape.clone())
      .ok_or(TfliteError::MissingTensor("输入"))?;
    if actual != expected {
      return Err(RuntimeModelError::InputShape { expected, actual });
    }

    model.allocate()?;
    info!("运行时模型: 输入 {}x{}, 算子 {} 个", W, H, model.node_count());
    Ok(RuntimeModel {
      model: RefCell::new(model),
      decoder: Decoder::default(),
    })
  }

  pub fn with_decoder(mut self, decoder: Decoder) -> Self {
    self.decoder = decoder;
    self
  }

  pub fn forward<F: AsNhwcFrame<W, H>>(
    &self,
    frame: &F,
  ) -> Result<DetectionTensor, RuntimeModelError> {
    let input = frame.normalized()?;
    let output = self.model.borrow_mut().run(&input)?;
    debug!("运行时推理完成，输出 {} 个值", output.len());
    Ok(DetectionTensor::try_from(output)?)
  }
}

impl<const W: u32, const H: u32> Model for RuntimeModel<W, H> {
  type Input = RgbNhwcFrame<W, H>;
  type Output = DetectResult;
  type Error = RuntimeModelError;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    let tensor = self.forward(input)?;
    Ok(self.postprocess(tensor))
  }

  fn postprocess(&self, output: DetectionTensor) -> Self::Output {
    self.decoder.decode(&output)
  }
}
