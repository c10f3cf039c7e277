// 该文件是 Shanan-SSD （山南西风） 项目的一部分。
// src/output/draw.rs - 检测标注可视化
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

use ab_glyph::{FontArc, PxScale};
use image::{Rgb, RgbImage};
use imageproc::{
  drawing::{draw_hollow_rect_mut, draw_text_mut},
  rect::Rect,
};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::postprocess::{Annotation, DEFAULT_PALETTE_SIZE};

const BUNDLED_FONT: &[u8] = include_bytes!("../../assets/DejaVuSans.ttf");

// 线宽与字号均按画布高度比例计算
const STROKE_WIDTH_DIVISOR: u32 = 85;
const TEXT_SIZE_DIVISOR: f32 = 15.0;

const BLACK: Rgb<u8> = Rgb([0x00, 0x00, 0x00]);
const BLUE: Rgb<u8> = Rgb([0x00, 0x00, 0xFF]);
const RED: Rgb<u8> = Rgb([0xFF, 0x00, 0x00]);
const GRAY: Rgb<u8> = Rgb([0x88, 0x88, 0x88]);
const GREEN: Rgb<u8> = Rgb([0x00, 0xFF, 0x00]);
const YELLOW: Rgb<u8> = Rgb([0xFF, 0xFF, 0x00]);
const DARK_GRAY: Rgb<u8> = Rgb([0x44, 0x44, 0x44]);
const MAGENTA: Rgb<u8> = Rgb([0xFF, 0x00, 0xFF]);
const CYAN: Rgb<u8> = Rgb([0x00, 0xFF, 0xFF]);

#[derive(Error, Debug)]
pub enum DrawError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("字体文件无效: {0}")]
  InvalidFont(#[from] ab_glyph::InvalidFont),
}

/// 按槽位序号取色的固定调色板，长度与后处理默认的 `palette_size` 一致
#[derive(Debug, Clone, PartialEq)]
pub struct Palette {
  colors: [Rgb<u8>; DEFAULT_PALETTE_SIZE],
}

impl Default for Palette {
  fn default() -> Self {
    Self {
      colors: [
        BLACK, BLUE, BLACK, RED, GRAY, GREEN, YELLOW, DARK_GRAY, MAGENTA, CYAN,
      ],
    }
  }
}

impl Palette {
  pub fn color(&self, index: usize) -> Rgb<u8> {
    self.colors[index % self.colors.len()]
  }
}

pub fn load_font(path: impl AsRef<Path>) -> Result<FontArc, DrawError> {
  let path = path.as_ref();
  let data = std::fs::read(path)?;
  let font = FontArc::try_from_vec(data)?;
  info!("加载字体: {}", path.display());
  Ok(font)
}

/// 在图像上绘制标注框与文字，默认使用内置的 DejaVu Sans 字体
#[derive(Clone)]
pub struct Draw {
  palette: Palette,
  font: Option<FontArc>,
}

impl Default for Draw {
  fn default() -> Self {
    let font = match FontArc::try_from_slice(BUNDLED_FONT) {
      Ok(font) => Some(font),
      Err(e) => {
        warn!("内置字体无效, 仅绘制边框: {}", e);
        None
      }
    };
    Self {
      palette: Palette::default(),
      font,
    }
  }
}

impl Draw {
  pub fn with_font(mut self, font: FontArc) -> Self {
    self.font = Some(font);
    self
  }

  pub fn draw_annotations(&self, image: &mut RgbImage, annotations: &[Annotation]) {
    let stroke = (image.height() / STROKE_WIDTH_DIVISOR).max(1);
    let text_size = image.height() as f32 / TEXT_SIZE_DIVISOR;

    for annotation in annotations {
      let color = self.palette.color(annotation.color_index);
      let Some((x_min, y_min, x_max, y_max)) = clamp_to_canvas(annotation, image) else {
        debug!("标注 {} 位于画布外, 跳过", annotation.label);
        continue;
      };

      // 线宽向内收缩
      for t in 0..stroke as i32 {
        let width = x_max - x_min + 1 - 2 * t;
        let height = y_max - y_min + 1 - 2 * t;
        if width <= 0 || height <= 0 {
          break;
        }
        let rect = Rect::at(x_min + t, y_min + t).of_size(width as u32, height as u32);
        draw_hollow_rect_mut(image, rect, color);
      }

      if let Some(font) = &self.font {
        // 文字基线对齐到框的左上角
        let text_y = (y_min - text_size as i32).max(0);
        draw_text_mut(
          image,
          color,
          x_min,
          text_y,
          PxScale::from(text_size),
          font,
          &annotation.caption(),
        );
      }
    }
  }

  pub fn draw_on_copy(&self, image: &RgbImage, annotations: &[Annotation]) -> RgbImage {
    let mut image = image.clone();
    self.draw_annotations(&mut image, annotations);
    image
  }
}

/// 裁剪到画布范围内，完全在画布外或含非有限值时返回 None
fn clamp_to_canvas(annotation: &Annotation, image: &RgbImage) -> Option<(i32, i32, i32, i32)> {
  let bbox = &annotation.bbox;
  let (w, h) = (image.width() as f32, image.height() as f32);
  let finite = [bbox.left, bbox.top, bbox.right, bbox.bottom]
    .iter()
    .all(|v| v.is_finite());
  if !finite || w < 1.0 || h < 1.0 {
    return None;
  }
  if bbox.right < 0.0 || bbox.bottom < 0.0 || bbox.left >= w || bbox.top >= h {
    return None;
  }

  let x_min = bbox.left.max(0.0).floor() as i32;
  let y_min = bbox.top.max(0.0).floor() as i32;
  let x_max = bbox.right.min(w - 1.0).ceil() as i32;
  let y_max = bbox.bottom.min(h - 1.0).ceil() as i32;
  if x_min > x_max || y_min > y_max {
    return None;
  }
  Some((x_min, y_min, x_max, y_max))
}

/// 以文本形式记录标注: `label, score, left, top, right, bottom`
pub struct Record;

impl Record {
  pub fn format(&self, annotations: &[Annotation]) -> String {
    annotations
      .iter()
      .map(|a| {
        format!(
          "{}, {:.4}, {:.1}, {:.1}, {:.1}, {:.1}",
          a.label, a.score, a.bbox.left, a.bbox.top, a.bbox.right, a.bbox.bottom
        )
      })
      .collect::<Vec<_>>()
      .join("\n")
  }

  pub fn record(&self, annotations: &[Annotation], path: &Path) -> Result<(), std::io::Error> {
    std::fs::write(path.with_extension("txt"), self.format(annotations))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::postprocess::PixelRect;

  fn annotation(bbox: [f32; 4], color_index: usize) -> Annotation {
    Annotation {
      bbox: PixelRect {
        left: bbox[0],
        top: bbox[1],
        right: bbox[2],
        bottom: bbox[3],
      },
      label: "person".to_string(),
      score: 0.91,
      color_index,
    }
  }

  fn outline_only() -> Draw {
    Draw {
      palette: Palette::default(),
      font: None,
    }
  }

  #[test]
  fn palette_wraps_by_index() {
    let palette = Palette::default();
    assert_eq!(palette.color(1), BLUE);
    assert_eq!(palette.color(DEFAULT_PALETTE_SIZE + 3), RED);
  }

  #[test]
  fn caption_is_drawn_above_box_with_bundled_font() {
    let white = Rgb([255, 255, 255]);
    let mut image = RgbImage::from_pixel(150, 150, white);
    Draw::default().draw_annotations(&mut image, &[annotation([20.0, 60.0, 120.0, 120.0], 1)]);

    // 字号 150 / 15 = 10 像素，文字位于 y ∈ [50, 60)
    let text_pixels = (20..120)
      .flat_map(|x| (50..60).map(move |y| (x, y)))
      .filter(|&(x, y)| *image.get_pixel(x, y) != white)
      .count();
    assert!(text_pixels > 0);
    assert!((0..150).all(|x| *image.get_pixel(x, 30) == white));
  }

  #[test]
  fn loads_font_from_file() {
    let font = load_font(concat!(env!("CARGO_MANIFEST_DIR"), "/assets/DejaVuSans.ttf"));
    assert!(font.is_ok());

    let mut bad = tempfile::NamedTempFile::new().unwrap();
    std::io::Write::write_all(&mut bad, b"not a font").unwrap();
    assert!(matches!(load_font(bad.path()), Err(DrawError::InvalidFont(_))));
  }

  #[test]
  fn draws_box_outline_in_slot_color() {
    let mut image = RgbImage::from_pixel(40, 40, Rgb([255, 255, 255]));
    outline_only().draw_annotations(&mut image, &[annotation([5.0, 5.0, 20.0, 20.0], 3)]);

    assert_eq!(*image.get_pixel(5, 5), RED);
    assert_eq!(*image.get_pixel(20, 5), RED);
    assert_eq!(*image.get_pixel(5, 20), RED);
    assert_eq!(*image.get_pixel(20, 20), RED);
    assert_eq!(*image.get_pixel(12, 12), Rgb([255, 255, 255]));
  }

  #[test]
  fn clamps_partially_visible_box() {
    let mut image = RgbImage::from_pixel(20, 20, Rgb([255, 255, 255]));
    outline_only().draw_annotations(&mut image, &[annotation([-10.0, -10.0, 50.0, 50.0], 1)]);
    assert_eq!(*image.get_pixel(0, 0), BLUE);
    assert_eq!(*image.get_pixel(19, 19), BLUE);
    assert_eq!(*image.get_pixel(10, 10), Rgb([255, 255, 255]));
  }

  #[test]
  fn skips_box_outside_canvas() {
    let blank = RgbImage::from_pixel(20, 20, Rgb([255, 255, 255]));
    let drawn = Draw::default().draw_on_copy(
      &blank,
      &[
        annotation([30.0, 30.0, 40.0, 40.0], 1),
        annotation([-9.0, -9.0, -1.0, -1.0], 1),
        annotation([f32::NAN, 0.0, 5.0, 5.0], 1),
      ],
    );
    assert_eq!(drawn, blank);
  }

  #[test]
  fn stroke_scales_with_canvas_height() {
    let mut image = RgbImage::from_pixel(200, 200, Rgb([255, 255, 255]));
    outline_only().draw_annotations(&mut image, &[annotation([10.0, 10.0, 100.0, 100.0], 3)]);
    // 200 / 85 = 2 像素线宽
    assert_eq!(*image.get_pixel(11, 50), RED);
    assert_eq!(*image.get_pixel(12, 50), Rgb([255, 255, 255]));
  }

  #[test]
  fn record_formats_one_line_per_annotation() {
    let text = Record.format(&[
      annotation([1.0, 2.0, 3.0, 4.0], 0),
      annotation([5.0, 6.0, 7.0, 8.0], 1),
    ]);
    assert_eq!(
      text,
      "person, 0.9100, 1.0, 2.0, 3.0, 4.0\nperson, 0.9100, 5.0, 6.0, 7.0, 8.0"
    );
  }

  #[test]
  fn missing_font_is_an_io_error() {
    assert!(matches!(
      load_font("/nonexistent/font.ttf"),
      Err(DrawError::IoError(_))
    ));
  }
}
