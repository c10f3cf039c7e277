// 该文件是 Shanan-SSD （山南西风） 项目的一部分。
// src/postprocess.rs - 检测结果后处理
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
use tracing::{debug, trace};

use crate::{
  label::LabelTable,
  model::{DetectionSet, NormalizedBox, Slot},
};

/// 默认置信度阈值，分数必须严格大于该值
pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.5;
/// SSD MobileNet v1 每次推理固定输出 10 个槽位
pub const DEFAULT_SLOT_COUNT: usize = 10;
pub const DEFAULT_PALETTE_SIZE: usize = 10;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PostprocessError {
  #[error("输入张量不合法: {0}")]
  MalformedInput(String),
  #[error("类别索引超出标签表范围: 槽位 {slot}, 类别 {class}, 标签数量 {label_count}")]
  LabelIndexOutOfRange {
    slot: usize,
    class: f32,
    label_count: usize,
  },
  #[error("后处理配置无效: {0}")]
  InvalidConfig(String),
  #[error("画布尺寸无效: {width}x{height}")]
  InvalidCanvas { width: u32, height: u32 },
}

/// 槽位扫描策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScanPolicy {
  /// 扫描全部槽位，忽略模型声明的检测数量
  #[default]
  AllSlots,
  /// 仅扫描前 min(count, N) 个槽位
  DeclaredCount,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PostprocessConfig {
  pub confidence_threshold: f32,
  /// 颜色序号的取模基数；默认等于绘制调色板的长度 `DEFAULT_PALETTE_SIZE`，
  /// 改为其他值时绘制端仍按调色板长度再次取模
  pub palette_size: usize,
  /// 模型固定的槽位数量，`None` 表示不校验
  pub slot_count: Option<usize>,
  pub scan_policy: ScanPolicy,
}

impl Default for PostprocessConfig {
  fn default() -> Self {
    Self {
      confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
      palette_size: DEFAULT_PALETTE_SIZE,
      slot_count: Some(DEFAULT_SLOT_COUNT),
      scan_policy: ScanPolicy::default(),
    }
  }
}

impl PostprocessConfig {
  pub fn confidence_threshold(mut self, threshold: f32) -> Self {
    self.confidence_threshold = threshold;
    self
  }

  pub fn palette_size(mut self, palette_size: usize) -> Self {
    self.palette_size = palette_size;
    self
  }

  pub fn slot_count(mut self, slot_count: Option<usize>) -> Self {
    self.slot_count = slot_count;
    self
  }

  pub fn scan_policy(mut self, scan_policy: ScanPolicy) -> Self {
    self.scan_policy = scan_policy;
    self
  }

  fn validate(&self) -> Result<(), PostprocessError> {
    if !(0.0..=1.0).contains(&self.confidence_threshold) {
      return Err(PostprocessError::InvalidConfig(format!(
        "置信度阈值必须位于 [0, 1], 实际为 {}",
        self.confidence_threshold
      )));
    }
    if self.palette_size == 0 {
      return Err(PostprocessError::InvalidConfig(
        "调色板大小必须大于 0".to_string(),
      ));
    }
    if self.slot_count == Some(0) {
      return Err(PostprocessError::InvalidConfig(
        "槽位数量必须大于 0".to_string(),
      ));
    }
    Ok(())
  }
}

/// 像素坐标下的矩形，不做画布裁剪
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PixelRect {
  pub left: f32,
  pub top: f32,
  pub right: f32,
  pub bottom: f32,
}

impl PixelRect {
  pub fn from_normalized(bbox: &NormalizedBox, width: f32, height: f32) -> Self {
    Self {
      left: bbox.x_min * width,
      top: bbox.y_min * height,
      right: bbox.x_max * width,
      bottom: bbox.y_max * height,
    }
  }

  pub fn width(&self) -> f32 {
    self.right - self.left
  }

  pub fn height(&self) -> f32 {
    self.bottom - self.top
  }
}

/// 一个可直接渲染的检测标注
#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
  pub bbox: PixelRect,
  pub label: String,
  pub score: f32,
  /// 槽位序号对调色板取模，与类别无关
  pub color_index: usize,
}

impl Annotation {
  pub fn caption(&self) -> String {
    format!("{} {:.2}", self.label, self.score)
  }
}

/// 将 SSD 输出的固定槽位张量转换为标注序列。
///
/// 处理过程是纯函数：按槽位顺序过滤分数、映射坐标、查找标签，
/// 不做排序、NMS 或去重。任何错误都会使整次调用失败，不返回部分结果。
#[derive(Debug, Clone, Default)]
pub struct DetectionPostProcessor {
  config: PostprocessConfig,
}

impl DetectionPostProcessor {
  pub fn new(config: PostprocessConfig) -> Result<Self, PostprocessError> {
    config.validate()?;
    Ok(Self { config })
  }

  pub fn process(
    &self,
    detections: &DetectionSet,
    labels: &LabelTable,
    width: u32,
    height: u32,
  ) -> Result<Vec<Annotation>, PostprocessError> {
    if width == 0 || height == 0 {
      return Err(PostprocessError::InvalidCanvas { width, height });
    }

    let slots = detections.slots(self.config.slot_count)?;
    let scan = match self.config.scan_policy {
      ScanPolicy::AllSlots => slots.len(),
      ScanPolicy::DeclaredCount => detections.declared_count().min(slots.len()),
    };

    let (w, h) = (width as f32, height as f32);
    let mut annotations = Vec::new();
    for slot in &slots[..scan] {
      let accepted = slot.score > self.config.confidence_threshold;
      if !accepted {
        trace!("槽位 {} 分数 {} 未超过阈值", slot.index, slot.score);
        continue;
      }

      let label = self.resolve_label(slot, labels)?;
      annotations.push(Annotation {
        bbox: PixelRect::from_normalized(&slot.bbox, w, h),
        label: label.to_string(),
        score: slot.score,
        color_index: slot.index % self.config.palette_size,
      });
    }

    debug!(
      "扫描 {} / {} 个槽位, 生成 {} 个标注",
      scan,
      slots.len(),
      annotations.len()
    );
    Ok(annotations)
  }

  fn resolve_label<'l>(
    &self,
    slot: &Slot,
    labels: &'l LabelTable,
  ) -> Result<&'l str, PostprocessError> {
    let out_of_range = || PostprocessError::LabelIndexOutOfRange {
      slot: slot.index,
      class: slot.class,
      label_count: labels.len(),
    };

    let class = slot.class.round();
    if !class.is_finite() || class < 0.0 {
      return Err(out_of_range());
    }
    labels.get(class as usize).ok_or_else(out_of_range)
  }
}
