// 该文件是 Shanan-SSD （山南西风） 项目的一部分。
// src/input/read_image_file.rs - 图像文件输入
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

use std::path::{Path, PathBuf};

use image::{ImageReader, RgbImage};
use thiserror::Error;
use tracing::{debug, error};
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, frame::Frame, url_file_path};

const IMAGE_EXTENSIONS: [&str; 6] = ["jpg", "jpeg", "png", "bmp", "gif", "webp"];

#[derive(Error, Debug)]
pub enum ImageFileInputError {
  #[error("URI schema mismatch")]
  SchemaMismatch,
  #[error("I/O error: {0}")]
  IoError(#[from] std::io::Error),
  #[error("Image loading error: {0}")]
  ImageLoadError(#[from] image::ImageError),
  #[error("Invalid query parameter '{0}': {1}")]
  InvalidQuery(String, String),
  #[error("No image files found in {0}")]
  EmptyDirectory(String),
}

fn load_image(path: impl AsRef<Path>) -> Result<RgbImage, ImageFileInputError> {
  let image = ImageReader::open(path)?.with_guessed_format()?.decode()?;
  Ok(image.into_rgb8())
}

/// 单张图像输入，`image:///a.png?repeat=N` 将同一图像作为 N 帧输出
pub struct ImageFileInput {
  image: RgbImage,
  repeat: usize,
  index: usize,
}

impl FromUrlWithScheme for ImageFileInput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for ImageFileInput {
  type Error = ImageFileInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(ImageFileInputError::SchemaMismatch);
    }

    let mut repeat = 1;
    for (k, v) in url.query_pairs() {
      if k == "repeat" {
        repeat = v
          .parse()
          .map_err(|e: std::num::ParseIntError| {
            ImageFileInputError::InvalidQuery(k.to_string(), e.to_string())
          })?;
      }
    }

    let image = load_image(url_file_path(url))?;
    debug!("Loaded image {}x{}", image.width(), image.height());
    Ok(Self::from_image(image).repeat(repeat))
  }
}

impl ImageFileInput {
  pub fn from_image(image: RgbImage) -> Self {
    Self {
      image,
      repeat: 1,
      index: 0,
    }
  }

  pub fn repeat(mut self, repeat: usize) -> Self {
    self.repeat = repeat;
    self
  }
}

impl Iterator for ImageFileInput {
  type Item = Frame;

  fn next(&mut self) -> Option<Self::Item> {
    if self.index >= self.repeat {
      return None;
    }
    let frame = Frame::new(self.index, self.image.clone());
    self.index += 1;
    Some(frame)
  }
}

/// 按文件名顺序读取目录中的图像，`folder:///dir`
pub struct ImageDirectoryInput {
  files: std::vec::IntoIter<PathBuf>,
  index: usize,
}

impl FromUrlWithScheme for ImageDirectoryInput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for ImageDirectoryInput {
  type Error = ImageFileInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(ImageFileInputError::SchemaMismatch);
    }
    Self::from_directory(url_file_path(url))
  }
}

impl ImageDirectoryInput {
  pub fn from_directory(directory: impl AsRef<Path>) -> Result<Self, ImageFileInputError> {
    let directory = directory.as_ref();
    let mut files = Vec::new();
    for entry in std::fs::read_dir(directory)? {
      let path = entry?.path();
      let is_image = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false);
      if path.is_file() && is_image {
        files.push(path);
      }
    }
    if files.is_empty() {
      return Err(ImageFileInputError::EmptyDirectory(
        directory.display().to_string(),
      ));
    }
    files.sort();
    debug!("Found {} image files in {}", files.len(), directory.display());

    Ok(Self {
      files: files.into_iter(),
      index: 0,
    })
  }
}

impl Iterator for ImageDirectoryInput {
  type Item = Frame;

  fn next(&mut self) -> Option<Self::Item> {
    for path in self.files.by_ref() {
      match load_image(&path) {
        Ok(image) => {
          let frame = Frame::new(self.index, image);
          self.index += 1;
          return Some(frame);
        }
        Err(e) => error!("Skipping {}: {}", path.display(), e),
      }
    }
    None
  }
}
