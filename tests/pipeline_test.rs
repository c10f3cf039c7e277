use image::{Rgb, RgbImage};
use serde_json::json;
use url::Url;

use shanan_ssd::{
  FromUrl,
  input::ImageFileInput,
  label::LabelTable,
  model::{DetectionSet, Detector, Model, ReplayModel},
  output::SaveImageFileOutput,
  postprocess::{DetectionPostProcessor, PostprocessError},
  task::{OneShotTask, Task},
};

const WHITE: Rgb<u8> = Rgb([255, 255, 255]);
const BLACK: Rgb<u8> = Rgb([0, 0, 0]);
const BLUE: Rgb<u8> = Rgb([0, 0, 255]);

/// 10 个槽位，仅第 0 和第 1 个超过阈值
fn ten_slots() -> serde_json::Value {
  let mut locations = vec![0.1, 0.2, 0.5, 0.6, 0.6, 0.6, 0.9, 0.9];
  locations.extend(std::iter::repeat_n(0.0, 32));
  json!({
    "locations": locations,
    "classes": [1.0, 2.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
    "scores": [0.9, 0.8, 0.5, 0.1, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
    "count": 3.0,
  })
}

#[test]
fn replayed_tensors_are_drawn_onto_the_frame() {
  let dir = tempfile::tempdir().unwrap();
  let labels_path = dir.path().join("labels.txt");
  std::fs::write(&labels_path, "person\nbicycle\ncar\n").unwrap();
  let tensors_path = dir.path().join("tensors.json");
  std::fs::write(&tensors_path, ten_slots().to_string()).unwrap();
  let out_path = dir.path().join("out").join("annotated.png");

  let model = ReplayModel::from_url(
    &Url::parse(&format!("replay://{}", tensors_path.display())).unwrap(),
  )
  .unwrap();
  let detector = Detector::new(
    model,
    DetectionPostProcessor::default(),
    LabelTable::from_path(&labels_path).unwrap(),
  );
  let output = SaveImageFileOutput::from_url(
    &Url::parse(&format!("image://{}", out_path.display())).unwrap(),
  )
  .unwrap();
  let input = ImageFileInput::from_image(RgbImage::from_pixel(300, 300, WHITE));

  OneShotTask.run_task(input, detector, output).unwrap();

  let saved = image::open(&out_path).unwrap().into_rgb8();
  assert_eq!(saved.dimensions(), (300, 300));
  assert_eq!(*saved.get_pixel(60, 30), BLACK);
  assert_eq!(*saved.get_pixel(120, 90), WHITE);
  assert_eq!(*saved.get_pixel(180, 200), BLUE);
  assert_eq!(*saved.get_pixel(5, 295), WHITE);
}

#[test]
fn detector_reports_annotations_in_slot_order() {
  let set: DetectionSet = serde_json::from_value(ten_slots()).unwrap();
  let detector = Detector::new(
    ReplayModel::new(vec![set]).unwrap(),
    DetectionPostProcessor::default(),
    LabelTable::from_labels(["person", "bicycle", "car"]),
  );
  let frame = ImageFileInput::from_image(RgbImage::new(300, 300))
    .next()
    .unwrap();

  let first = detector.infer(&frame).unwrap();
  let second = detector.infer(&frame).unwrap();
  assert_eq!(first, second);

  let labels: Vec<_> = first.iter().map(|a| a.label.as_str()).collect();
  assert_eq!(labels, ["bicycle", "car"]);
  assert_eq!(first[0].color_index, 0);
  assert_eq!(first[1].color_index, 1);
  assert!((first[0].bbox.left - 60.0).abs() < 1e-3);
  assert!((first[0].bbox.top - 30.0).abs() < 1e-3);
  assert!((first[0].bbox.right - 180.0).abs() < 1e-3);
  assert!((first[0].bbox.bottom - 150.0).abs() < 1e-3);
}

#[test]
fn mismatched_label_table_fails_the_frame() {
  let set: DetectionSet = serde_json::from_value(ten_slots()).unwrap();
  let detector = Detector::new(
    ReplayModel::new(vec![set]).unwrap(),
    DetectionPostProcessor::default(),
    LabelTable::from_labels(["person", "bicycle"]),
  );
  let frame = ImageFileInput::from_image(RgbImage::new(300, 300))
    .next()
    .unwrap();

  let err = detector.infer(&frame).unwrap_err().to_string();
  let expected = PostprocessError::LabelIndexOutOfRange {
    slot: 1,
    class: 2.0,
    label_count: 2,
  }
  .to_string();
  assert!(err.contains(&expected), "{}", err);
}
