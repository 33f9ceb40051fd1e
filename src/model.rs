// 该文件是 Detect Contract （检测契约） 项目的一部分。
// src/model.rs - 模型与检测输出解码
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

use thiserror::Error;
use tracing::debug;

use crate::contract::{DetectionField, DetectionTensorContract};

pub trait Model {
  type Input;
  type Output;
  type Error;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error>;
  fn postprocess(&self, output: DetectionTensor) -> Self::Output;
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetectItem {
  pub class_id: u32,
  pub score: f32,
  pub bbox: [f32; 4], // [x_min, y_min, x_max, y_max]
}

#[derive(Debug, Clone, Default)]
pub struct DetectResult {
  pub items: Box<[DetectItem]>,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum DecodeError {
  #[error("输出张量长度不匹配: 期望 {expected}, 实际 {actual}")]
  LengthMismatch { expected: usize, actual: usize },
}

/// 一条检测记录，字段含义见 [`DetectionField`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectionRecord {
  pub x_center: f32,
  pub y_center: f32,
  pub width: f32,
  pub height: f32,
  pub confidence: f32,
  pub class_id: f32,
}

impl DetectionRecord {
  fn from_slots(slots: &[f32]) -> Self {
    let get = |field: DetectionField| slots[field.index()];
    DetectionRecord {
      x_center: get(DetectionField::XCenter),
      y_center: get(DetectionField::YCenter),
      width: get(DetectionField::Width),
      height: get(DetectionField::Height),
      confidence: get(DetectionField::Confidence),
      class_id: get(DetectionField::ClassId),
    }
  }

  pub fn get(&self, field: DetectionField) -> f32 {
    match field {
      DetectionField::XCenter => self.x_center,
      DetectionField::YCenter => self.y_center,
      DetectionField::Width => self.width,
      DetectionField::Height => self.height,
      DetectionField::Confidence => self.confidence,
      DetectionField::ClassId => self.class_id,
    }
  }

  /// 中心点格式转换为 [x_min, y_min, x_max, y_max]
  pub fn bbox(&self) -> [f32; 4] {
    let hw = self.width / 2.0;
    let hh = self.height / 2.0;
    [
      self.x_center - hw,
      self.y_center - hh,
      self.x_center + hw,
      self.y_center + hh,
    ]
  }
}

/// 形状为 [1, 100, 6] 的模型输出
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionTensor {
  data: Box<[f32]>,
}

impl TryFrom<Vec<f32>> for DetectionTensor {
  type Error = DecodeError;

  fn try_from(data: Vec<f32>) -> Result<Self, Self::Error> {
    let expected = DetectionTensorContract::output_len();
    if data.len() != expected {
      return Err(DecodeError::LengthMismatch {
        expected,
        actual: data.len(),
      });
    }
    Ok(DetectionTensor {
      data: data.into_boxed_slice(),
    })
  }
}

impl DetectionTensor {
  pub fn as_slice(&self) -> &[f32] {
    &self.data
  }

  pub fn record(&self, slot: usize) -> Option<DetectionRecord> {
    let n = DetectionTensorContract::FIELD_COUNT;
    let start = slot.checked_mul(n)?;
    let end = start.checked_add(n)?;
    self.data.get(start..end).map(DetectionRecord::from_slots)
  }

  pub fn records(&self) -> impl Iterator<Item = DetectionRecord> + '_ {
    self
      .data
      .chunks_exact(DetectionTensorContract::FIELD_COUNT)
      .map(DetectionRecord::from_slots)
  }
}

/// 输出槽位不保证有序或已做 NMS，由解码端自行过滤
#[derive(Debug, Clone, Copy)]
pub struct Decoder {
  confidence: f32,
  nms_threshold: Option<f32>,
}

impl Default for Decoder {
  fn default() -> Self {
    Decoder {
      confidence: 0.5,
      nms_threshold: Some(0.45),
    }
  }
}

impl Decoder {
  pub fn new(confidence: f32, nms_threshold: Option<f32>) -> Self {
    Decoder {
      confidence,
      nms_threshold,
    }
  }

  pub fn decode(&self, tensor: &DetectionTensor) -> DetectResult {
    let items: Vec<DetectItem> = tensor
      .records()
      .filter(|r| r.confidence >= self.confidence)
      .filter_map(|r| {
        let class_id = r.class_id.round();
        if !class_id.is_finite() || class_id < 0.0 {
          return None;
        }
        Some(DetectItem {
          class_id: class_id as u32,
          score: r.confidence,
          bbox: r.bbox(),
        })
      })
      .collect();
    debug!("置信度过滤后剩余 {} 个候选", items.len());

    let items = match self.nms_threshold {
      Some(threshold) => nms::nms(items, threshold),
      None => items,
    };

    DetectResult {
      items: items.into_boxed_slice(),
    }
  }
}

pub mod nms;
pub mod placeholder;
pub mod runtime;

pub use self::placeholder::{PlaceholderError, PlaceholderModel, PlaceholderWeights};
pub use self::runtime::{RuntimeModel, RuntimeModelError};

#[cfg(test)]
mod tests {
  use super::*;

  fn tensor_with(records: &[[f32; 6]]) -> DetectionTensor {
    let mut data = vec![0.0f32; DetectionTensorContract::output_len()];
    for (slot, r) in records.iter().enumerate() {
      data[slot * 6..slot * 6 + 6].copy_from_slice(r);
    }
    DetectionTensor::try_from(data).unwrap()
  }

  #[test]
  fn wrong_length_is_rejected() {
    assert_eq!(
      DetectionTensor::try_from(vec![0.0; 300]).unwrap_err(),
      DecodeError::LengthMismatch {
        expected: 600,
        actual: 300
      }
    );
  }

  #[test]
  fn records_follow_field_layout() {
    let tensor = tensor_with(&[[0.5, 0.4, 0.2, 0.1, 0.9, 3.0]]);
    let r = tensor.record(0).unwrap();
    assert_eq!(r.get(DetectionField::XCenter), 0.5);
    assert_eq!(r.get(DetectionField::YCenter), 0.4);
    assert_eq!(r.get(DetectionField::Width), 0.2);
    assert_eq!(r.get(DetectionField::Height), 0.1);
    assert_eq!(r.get(DetectionField::Confidence), 0.9);
    assert_eq!(r.get(DetectionField::ClassId), 3.0);
    assert_eq!(tensor.records().count(), 100);
    assert!(tensor.record(100).is_none());
    assert!(tensor.record(usize::MAX).is_none());
    assert!(tensor.record(usize::MAX / 6).is_none());
  }

  #[test]
  fn bbox_from_center() {
    let tensor = tensor_with(&[[0.5, 0.5, 0.2, 0.4, 1.0, 0.0]]);
    let bbox = tensor.record(0).unwrap().bbox();
    let expected = [0.4, 0.3, 0.6, 0.7];
    for (a, b) in bbox.iter().zip(expected) {
      assert!((a - b).abs() < 1e-6);
    }
  }

  #[test]
  fn decode_filters_and_suppresses() {
    let tensor = tensor_with(&[
      [0.50, 0.50, 0.20, 0.20, 0.80, 1.0],
      // 与第一条高度重叠的同类框
      [0.51, 0.50, 0.20, 0.20, 0.70, 1.0],
      // 同位置不同类别，保留
      [0.50, 0.50, 0.20, 0.20, 0.60, 2.0],
      // 低于阈值
      [0.10, 0.10, 0.05, 0.05, 0.30, 1.0],
      // 非法类别
      [0.90, 0.90, 0.05, 0.05, 0.95, -4.0],
    ]);

    let result = Decoder::new(0.5, Some(0.45)).decode(&tensor);
    let classes: Vec<_> = result.items.iter().map(|i| i.class_id).collect();
    assert_eq!(classes, vec![1, 2]);
    assert_eq!(result.items[0].score, 0.80);

    let result = Decoder::new(0.5, None).decode(&tensor);
    assert_eq!(result.items.len(), 3);
  }
}
