// 该文件是 Shanan-SSD （山南西风） 项目的一部分。
// src/args.rs - 检测器公共参数
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

use thiserror::Error;
use url::Url;

use crate::{
  label::LabelError,
  postprocess::{PostprocessConfig, PostprocessError, ScanPolicy},
};

#[derive(Error, Debug)]
pub enum DetectorArgsError {
  #[error("后处理配置错误: {0}")]
  Postprocess(#[from] PostprocessError),
  #[error("标签文件错误: {0}")]
  Label(#[from] LabelError),
  #[cfg(feature = "model_replay")]
  #[error("模型加载失败: {0}")]
  Replay(#[from] crate::model::ReplayModelError),
}

/// 各可执行程序共用的模型与后处理参数
#[derive(clap::Args, Debug, Clone)]
pub struct DetectorArgs {
  /// 录制的模型输出，例如 replay:///data/tensors.json
  #[arg(long, value_name = "MODEL")]
  pub model: Url,
  /// 标签文件，每行一个类别
  #[arg(long, value_name = "FILE")]
  pub labels: PathBuf,
  /// 置信度阈值 (0.0 - 1.0)，分数需严格大于该值
  #[arg(long, default_value = "0.5", value_name = "THRESHOLD")]
  pub confidence: f32,
  /// 模型固定槽位数量，0 表示不校验
  #[arg(long, default_value = "10", value_name = "COUNT")]
  pub slots: usize,
  /// 仅扫描模型声明的检测数量
  #[arg(long)]
  pub scan_declared_count: bool,
}

impl DetectorArgs {
  pub fn postprocess_config(&self) -> PostprocessConfig {
    PostprocessConfig::default()
      .confidence_threshold(self.confidence)
      .slot_count((self.slots > 0).then_some(self.slots))
      .scan_policy(if self.scan_declared_count {
        ScanPolicy::DeclaredCount
      } else {
        ScanPolicy::AllSlots
      })
  }

  #[cfg(feature = "model_replay")]
  pub fn build_detector(
    &self,
  ) -> Result<crate::model::Detector<crate::model::ReplayModel>, DetectorArgsError> {
    use crate::{
      FromUrl,
      label::LabelTable,
      model::{Detector, ReplayModel},
      postprocess::DetectionPostProcessor,
    };
    use tracing::info;

    info!("模型输出: {}", self.model);
    info!("标签文件: {}", self.labels.display());
    info!("置信度阈值: {}", self.confidence);

    let processor = DetectionPostProcessor::new(self.postprocess_config())?;
    let labels = LabelTable::from_path(&self.labels)?;
    let model = ReplayModel::from_url(&self.model)?;
    Ok(Detector::new(model, processor, labels))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use clap::Parser;

  #[derive(Parser, Debug)]
  struct Cli {
    #[command(flatten)]
    detector: DetectorArgs,
  }

  #[test]
  fn defaults_match_postprocess_defaults() {
    let cli = Cli::parse_from(["test", "--model", "replay:///t.json", "--labels", "labels.txt"]);
    assert_eq!(cli.detector.postprocess_config(), PostprocessConfig::default());
  }

  #[test]
  fn forwards_threshold_slots_and_scan_policy() {
    let cli = Cli::parse_from([
      "test",
      "--model",
      "replay:///t.json",
      "--labels",
      "labels.txt",
      "--confidence",
      "0.3",
      "--slots",
      "0",
      "--scan-declared-count",
    ]);
    let config = cli.detector.postprocess_config();
    assert_eq!(config.confidence_threshold, 0.3);
    assert_eq!(config.slot_count, None);
    assert_eq!(config.scan_policy, ScanPolicy::DeclaredCount);
  }

  #[cfg(feature = "model_replay")]
  #[test]
  fn invalid_threshold_fails_before_loading_files() {
    let cli = Cli::parse_from([
      "test",
      "--model",
      "replay:///missing.json",
      "--labels",
      "/nonexistent/labels.txt",
      "--confidence",
      "1.5",
    ]);
    assert!(matches!(
      cli.detector.build_detector(),
      Err(DetectorArgsError::Postprocess(PostprocessError::InvalidConfig(_)))
    ));
  }
}
