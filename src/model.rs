// 该文件是 Shanan-SSD （山南西风） 项目的一部分。
// src/model.rs - 模型输出与检测器
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

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::{
  frame::Frame,
  label::LabelTable,
  postprocess::{Annotation, DetectionPostProcessor, PostprocessError},
};

pub trait Model {
  type Input;
  type Output;
  type Error;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error>;
}

/// 一次推理产生的原始张量，四个数组按槽位平行排列
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DetectionSet {
  /// 每个槽位 4 个数: [y_min, x_min, y_max, x_max]，归一化坐标
  pub locations: Vec<f32>,
  pub classes: Vec<f32>,
  pub scores: Vec<f32>,
  /// 模型声明的有效检测数量，仅供参考
  #[serde(default, alias = "num_detections")]
  pub count: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct NormalizedBox {
  pub y_min: f32,
  pub x_min: f32,
  pub y_max: f32,
  pub x_max: f32,
}

/// 单个检测槽位
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Slot {
  pub index: usize,
  pub score: f32,
  pub bbox: NormalizedBox,
  pub class: f32,
}

impl DetectionSet {
  pub fn slot_count(&self) -> usize {
    self.scores.len()
  }

  pub fn declared_count(&self) -> usize {
    if self.count.is_finite() && self.count > 0.0 {
      self.count.round() as usize
    } else {
      0
    }
  }

  /// 校验数组长度并重组为按槽位排列的记录
  pub fn slots(&self, expected: Option<usize>) -> Result<Vec<Slot>, PostprocessError> {
    let n = self.scores.len();
    if self.classes.len() != n || self.locations.len() != 4 * n {
      return Err(PostprocessError::MalformedInput(format!(
        "locations 长度 {} 应为 classes 长度 {} 与 scores 长度 {} 的 4 倍",
        self.locations.len(),
        self.classes.len(),
        n
      )));
    }
    if let Some(expected) = expected
      && expected != n
    {
      return Err(PostprocessError::MalformedInput(format!(
        "槽位数量不匹配: 期望 {}, 实际 {}",
        expected, n
      )));
    }

    let slots = self
      .locations
      .chunks_exact(4)
      .zip(self.classes.iter().zip(&self.scores))
      .enumerate()
      .map(|(index, (loc, (&class, &score)))| Slot {
        index,
        score,
        bbox: NormalizedBox {
          y_min: loc[0],
          x_min: loc[1],
          y_max: loc[2],
          x_max: loc[3],
        },
        class,
      })
      .collect();
    Ok(slots)
  }
}

#[derive(Error, Debug)]
pub enum DetectorError<E: std::error::Error + 'static> {
  #[error("模型推理错误: {0}")]
  Model(#[source] E),
  #[error("后处理错误: {0}")]
  Postprocess(#[from] PostprocessError),
}

/// 推理模型与后处理的组合，输入帧，输出标注
pub struct Detector<M> {
  model: M,
  processor: DetectionPostProcessor,
  labels: LabelTable,
}

impl<M> Detector<M> {
  pub fn new(model: M, processor: DetectionPostProcessor, labels: LabelTable) -> Self {
    Self {
      model,
      processor,
      labels,
    }
  }
}

impl<M, E> Model for Detector<M>
where
  M: Model<Input = Frame, Output = DetectionSet, Error = E>,
  E: std::error::Error + 'static,
{
  type Input = Frame;
  type Output = Vec<Annotation>;
  type Error = DetectorError<E>;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    let detections = self.model.infer(input).map_err(DetectorError::Model)?;
    let (width, height) = input.dimensions();
    debug!("第 {} 帧后处理, 画布 {}x{}", input.index, width, height);
    let annotations = self
      .processor
      .process(&detections, &self.labels, width, height)?;
    Ok(annotations)
  }
}

#[cfg(feature = "model_replay")]
mod replay;
#[cfg(feature = "model_replay")]
pub use self::replay::{ReplayModel, ReplayModelError};

#[cfg(test)]
mod tests {
  use super::*;
  use crate::postprocess::PostprocessConfig;
  use image::RgbImage;

  #[derive(Debug, Error)]
  #[error("模型不可用")]
  struct Unavailable;

  struct FixedModel(Result<DetectionSet, ()>);

  impl Model for FixedModel {
    type Input = Frame;
    type Output = DetectionSet;
    type Error = Unavailable;

    fn infer(&self, _input: &Frame) -> Result<DetectionSet, Unavailable> {
      self.0.clone().map_err(|_| Unavailable)
    }
  }

  fn single_slot() -> DetectionSet {
    DetectionSet {
      locations: vec![0.1, 0.2, 0.5, 0.6],
      classes: vec![1.0],
      scores: vec![0.9],
      count: 1.0,
    }
  }

  fn detector(model: FixedModel) -> Detector<FixedModel> {
    let processor =
      DetectionPostProcessor::new(PostprocessConfig::default().slot_count(Some(1))).unwrap();
    Detector::new(model, processor, LabelTable::from_labels(["a", "b"]))
  }

  #[test]
  fn slots_regroup_parallel_arrays() {
    let set = DetectionSet {
      locations: vec![0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8],
      classes: vec![3.0, 7.0],
      scores: vec![0.9, 0.1],
      count: 2.0,
    };
    let slots = set.slots(Some(2)).unwrap();
    assert_eq!(slots.len(), 2);
    assert_eq!(slots[1].index, 1);
    assert_eq!(slots[1].class, 7.0);
    assert_eq!(slots[1].score, 0.1);
    assert_eq!(
      slots[1].bbox,
      NormalizedBox {
        y_min: 0.5,
        x_min: 0.6,
        y_max: 0.7,
        x_max: 0.8,
      }
    );
  }

  #[test]
  fn declared_count_handles_odd_values() {
    let mut set = single_slot();
    set.count = 2.6;
    assert_eq!(set.declared_count(), 3);
    set.count = -1.0;
    assert_eq!(set.declared_count(), 0);
    set.count = f32::NAN;
    assert_eq!(set.declared_count(), 0);
  }

  #[test]
  fn detector_uses_frame_dimensions() {
    let detector = detector(FixedModel(Ok(single_slot())));
    let frame = Frame::new(0, RgbImage::new(300, 150));
    let out = detector.infer(&frame).unwrap();
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].label, "b");
    assert!((out[0].bbox.left - 60.0).abs() < 1e-4);
    assert!((out[0].bbox.bottom - 75.0).abs() < 1e-4);
  }

  #[test]
  fn detector_surfaces_model_and_postprocess_errors() {
    let frame = Frame::new(0, RgbImage::new(10, 10));

    let err = detector(FixedModel(Err(()))).infer(&frame).unwrap_err();
    assert!(matches!(err, DetectorError::Model(Unavailable)));

    let mut bad = single_slot();
    bad.classes.push(0.0);
    let err = detector(FixedModel(Ok(bad))).infer(&frame).unwrap_err();
    assert!(matches!(
      err,
      DetectorError::Postprocess(PostprocessError::MalformedInput(_))
    ));
  }

  #[test]
  fn detection_set_reads_json_with_alias() {
    let json = r#"{"locations":[0,0,1,1],"classes":[0],"scores":[0.7],"num_detections":1}"#;
    let set: DetectionSet = serde_json::from_str(json).unwrap();
    assert_eq!(set.declared_count(), 1);
    assert_eq!(set.slot_count(), 1);
  }
}
