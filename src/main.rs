// 该文件是 Shanan-SSD （山南西风） 项目的一部分。
// src/main.rs - 项目主程序
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

use anyhow::Result;
use clap::Parser;
use tracing::info;
use url::Url;

use shanan_ssd::{
  FromUrl,
  args::DetectorArgs,
  input::InputWrapper,
  model::Model,
  output::{OutputWrapper, Render},
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  #[command(flatten)]
  pub detector: DetectorArgs,
  /// 输入来源，例如 image:///data/frame.jpg 或 folder:///data/frames
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 输出路径，例如 image:///tmp/out.png?font=/path/font.ttf 或 folder:///tmp/record
  #[arg(long, value_name = "OUTPUT")]
  pub output: Url,
  /// 最大处理帧数，0 表示无限制
  #[arg(long, default_value = "0", value_name = "COUNT")]
  pub max_frames: usize,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("输入来源: {}", args.input);
  info!("输出路径: {}", args.output);

  let detector = args.detector.build_detector()?;
  let input = InputWrapper::from_url(&args.input)?;
  let output = OutputWrapper::from_url(&args.output)?;

  let mut frame_count = 0usize;
  let mut total_annotations = 0usize;
  for frame in input {
    if args.max_frames > 0 && frame_count >= args.max_frames {
      info!("已达到最大帧数限制: {}", args.max_frames);
      break;
    }

    let annotations = detector.infer(&frame)?;
    total_annotations += annotations.len();
    info!("帧 {}: 检测到 {} 个对象", frame.index, annotations.len());
    for a in &annotations {
      info!(
        "  - {}: {:.2}% at ({:.0}, {:.0}, {:.0}, {:.0}) 颜色 {}",
        a.label,
        a.score * 100.0,
        a.bbox.left,
        a.bbox.top,
        a.bbox.right,
        a.bbox.bottom,
        a.color_index
      );
    }

    output.render_result(&frame, &annotations)?;
    frame_count += 1;
  }

  info!("处理完成! 总帧数: {}, 总标注数: {}", frame_count, total_annotations);

  Ok(())
}
