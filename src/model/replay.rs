// 该文件是 Shanan-SSD （山南西风） 项目的一部分。
// src/model/replay.rs - 回放录制的模型输出
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

use std::path::Path;

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::Frame,
  model::{DetectionSet, Model},
  url_file_path,
};

#[derive(Error, Debug)]
pub enum ReplayModelError {
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("张量文件解析错误: {0}")]
  ParseError(#[from] serde_json::Error),
  #[error("张量文件中没有任何推理结果")]
  Empty,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ReplayFile {
  Sequence(Vec<DetectionSet>),
  Single(DetectionSet),
}

/// 以 JSON 文件中录制的张量代替真实推理，第 i 帧取第 i % len 条记录
#[derive(Debug, Clone)]
pub struct ReplayModel {
  records: Box<[DetectionSet]>,
}

impl FromUrlWithScheme for ReplayModel {
  const SCHEME: &'static str = "replay";
}

impl FromUrl for ReplayModel {
  type Error = ReplayModelError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(ReplayModelError::SchemeMismatch(format!(
        "期望方案 '{}', 实际方案 '{}'",
        Self::SCHEME,
        url.scheme()
      )));
    }
    Self::from_path(url_file_path(url))
  }
}

impl ReplayModel {
  pub fn new(records: Vec<DetectionSet>) -> Result<Self, ReplayModelError> {
    if records.is_empty() {
      return Err(ReplayModelError::Empty);
    }
    Ok(Self {
      records: records.into_boxed_slice(),
    })
  }

  pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ReplayModelError> {
    let path = path.as_ref();
    info!("加载张量文件: {}", path.display());
    let content = std::fs::read_to_string(path)?;
    let records = match serde_json::from_str::<ReplayFile>(&content)? {
      ReplayFile::Sequence(sets) => sets,
      ReplayFile::Single(set) => vec![set],
    };
    debug!("张量记录数量: {}", records.len());
    Self::new(records)
  }

  pub fn len(&self) -> usize {
    self.records.len()
  }

  pub fn is_empty(&self) -> bool {
    self.records.is_empty()
  }
}

impl Model for ReplayModel {
  type Input = Frame;
  type Output = DetectionSet;
  type Error = ReplayModelError;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    let record = &self.records[input.index % self.records.len()];
    Ok(record.clone())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::RgbImage;
  use std::io::Write;

  fn set(score: f32) -> DetectionSet {
    DetectionSet {
      locations: vec![0.0, 0.0, 1.0, 1.0],
      classes: vec![0.0],
      scores: vec![score],
      count: 1.0,
    }
  }

  #[test]
  fn replays_records_cyclically() {
    let model = ReplayModel::new(vec![set(0.1), set(0.2)]).unwrap();
    let scores: Vec<f32> = (0..5)
      .map(|i| model.infer(&Frame::new(i, RgbImage::new(1, 1))).unwrap().scores[0])
      .collect();
    assert_eq!(scores, [0.1, 0.2, 0.1, 0.2, 0.1]);
  }

  #[test]
  fn empty_record_list_is_rejected() {
    assert!(matches!(ReplayModel::new(vec![]), Err(ReplayModelError::Empty)));
  }

  #[test]
  fn loads_single_object_and_array_files() {
    let mut single = tempfile::NamedTempFile::new().unwrap();
    write!(
      single,
      r#"{{"locations":[0.1,0.2,0.5,0.6],"classes":[1],"scores":[0.9],"count":1}}"#
    )
    .unwrap();
    let url = Url::from_file_path(single.path()).unwrap();
    let url = Url::parse(&url.as_str().replacen("file:", "replay:", 1)).unwrap();
    let model = ReplayModel::from_url(&url).unwrap();
    assert_eq!(model.len(), 1);

    let mut many = tempfile::NamedTempFile::new().unwrap();
    write!(
      many,
      r#"[{{"locations":[],"classes":[],"scores":[]}},{{"locations":[],"classes":[],"scores":[]}}]"#
    )
    .unwrap();
    let model = ReplayModel::from_path(many.path()).unwrap();
    assert_eq!(model.len(), 2);
  }

  #[test]
  fn wrong_scheme_is_rejected() {
    let url = Url::parse("image:///tmp/tensors.json").unwrap();
    assert!(matches!(
      ReplayModel::from_url(&url),
      Err(ReplayModelError::SchemeMismatch(_))
    ));
  }
}
