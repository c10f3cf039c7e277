// 该文件是 Shanan-SSD （山南西风） 项目的一部分。
// src/label.rs - 类别标签表
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

use std::{
  io::{BufRead, BufReader, Read},
  path::Path,
  str::FromStr,
};

use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum LabelError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("标签表为空")]
  Empty,
}

/// 类别索引到名称的映射，启动时从 labels.txt 加载一次
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LabelTable {
  labels: Box<[String]>,
}

impl LabelTable {
  pub fn from_labels<I, S>(labels: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    Self {
      labels: labels.into_iter().map(Into::into).collect(),
    }
  }

  /// 每行一个标签，去除首尾空白并跳过空行
  pub fn from_reader(reader: impl Read) -> Result<Self, LabelError> {
    let mut labels = Vec::new();
    for line in BufReader::new(reader).lines() {
      let line = line?;
      let label = line.trim();
      if !label.is_empty() {
        labels.push(label.to_string());
      }
    }
    if labels.is_empty() {
      return Err(LabelError::Empty);
    }
    Ok(Self::from_labels(labels))
  }

  pub fn from_path(path: impl AsRef<Path>) -> Result<Self, LabelError> {
    let path = path.as_ref();
    let table = Self::from_reader(std::fs::File::open(path)?)?;
    info!("从 {} 加载 {} 个标签", path.display(), table.len());
    Ok(table)
  }

  pub fn get(&self, index: usize) -> Option<&str> {
    self.labels.get(index).map(String::as_str)
  }

  pub fn len(&self) -> usize {
    self.labels.len()
  }

  pub fn is_empty(&self) -> bool {
    self.labels.is_empty()
  }

  pub fn iter(&self) -> impl Iterator<Item = &str> {
    self.labels.iter().map(String::as_str)
  }
}

impl FromStr for LabelTable {
  type Err = LabelError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Self::from_reader(s.as_bytes())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::io::Write;

  #[test]
  fn parses_lines_skipping_blanks() {
    let table: LabelTable = "person\n\n  bicycle \r\ncar\n".parse().unwrap();
    assert_eq!(table.len(), 3);
    assert_eq!(table.get(1), Some("bicycle"));
    assert_eq!(table.get(3), None);
    assert_eq!(table.iter().collect::<Vec<_>>(), ["person", "bicycle", "car"]);
  }

  #[test]
  fn keeps_placeholder_labels() {
    let table: LabelTable = "???\nperson\n".parse().unwrap();
    assert_eq!(table.get(0), Some("???"));
  }

  #[test]
  fn empty_file_is_an_error() {
    assert!(matches!("\n \n".parse::<LabelTable>(), Err(LabelError::Empty)));
  }

  #[test]
  fn loads_from_path() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "person\ncar").unwrap();
    let table = LabelTable::from_path(file.path()).unwrap();
    assert_eq!(table.get(1), Some("car"));

    let missing = file.path().with_extension("missing");
    assert!(matches!(
      LabelTable::from_path(missing),
      Err(LabelError::IoError(_))
    ));
  }
}
