//! Vision Layer
//!
//! Model collaborators of the plate pipelines and the geometry helpers they share.
//! The pipelines only see the traits below; the ONNX Runtime implementations live in
//! `detection`, `ocr` and `classification`.

pub mod classification;
pub mod detection;
pub mod models;
pub mod ocr;
pub mod preprocess;
pub mod warp;

use anyhow::Result;
use image::RgbImage;

use crate::config::constants::DETECTION_ROW_FIELDS;
use crate::error::LprError;

pub use classification::PlateClassifier;
pub use detection::MultiTaskDetector;
pub use models::{ModelManager, ModelType, OnnxSession};
pub use ocr::PlateRecognizer;

/// One row of multi-task detector output, in source-image pixels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectionRow {
    /// `[x1, y1, x2, y2]`
    pub bbox: [f32; 4],
    /// Detection confidence
    pub score: f32,
    /// Corner points, TL, TR, BR, BL
    pub landmarks: [(f32, f32); 4],
    /// 0 = single layer, 1 = double layer
    pub layer_flag: f32,
}

impl DetectionRow {
    /// Parse the flat 14-field layout: box(4), score(1), landmarks(8), layer(1)
    pub fn from_slice(row: &[f32]) -> std::result::Result<Self, LprError> {
        if row.len() != DETECTION_ROW_FIELDS {
            return Err(LprError::MalformedDetection {
                expected: DETECTION_ROW_FIELDS,
                actual: row.len(),
            });
        }

        Ok(Self {
            bbox: [row[0], row[1], row[2], row[3]],
            score: row[4],
            landmarks: [
                (row[5], row[6]),
                (row[7], row[8]),
                (row[9], row[10]),
                (row[11], row[12]),
            ],
            layer_flag: row[13],
        })
    }
}

/// Output of a plain box detector: parallel sequences, one entry per detection
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoxDetections {
    pub boxes: Vec<[f32; 4]>,
    pub classes: Vec<i64>,
    pub scores: Vec<f32>,
}

impl BoxDetections {
    /// True when any of the three sequences is empty
    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty() || self.classes.is_empty() || self.scores.is_empty()
    }
}

/// Joint plate detector: boxes, corner landmarks and layer flag in one pass
pub trait Detector {
    fn detect(&mut self, image: &RgbImage) -> Result<Vec<DetectionRow>>;
}

/// Box-only plate detector used by the legacy pipeline
pub trait BoxDetector {
    fn detect_boxes(&mut self, image: &RgbImage) -> Result<BoxDetections>;
}

/// Plate text recognizer: `(text, confidence)` for a rectified crop
pub trait Recognizer {
    fn recognize(&mut self, crop: &RgbImage) -> Result<(String, f32)>;
}

/// Plate color classifier: one score per category
pub trait Classifier {
    fn classify(&mut self, crop: &RgbImage) -> Result<Vec<f32>>;
}

/// Corner predictor for an aligned plate patch, points in patch pixels (TL, TR, BR, BL)
pub trait VertexPredictor {
    fn predict_vertices(&mut self, patch: &RgbImage) -> Result<[(f32, f32); 4]>;
}

impl<T: Detector + ?Sized> Detector for Box<T> {
    fn detect(&mut self, image: &RgbImage) -> Result<Vec<DetectionRow>> {
        (**self).detect(image)
    }
}

impl<T: BoxDetector + ?Sized> BoxDetector for Box<T> {
    fn detect_boxes(&mut self, image: &RgbImage) -> Result<BoxDetections> {
        (**self).detect_boxes(image)
    }
}

impl<T: Recognizer + ?Sized> Recognizer for Box<T> {
    fn recognize(&mut self, crop: &RgbImage) -> Result<(String, f32)> {
        (**self).recognize(crop)
    }
}

impl<T: Classifier + ?Sized> Classifier for Box<T> {
    fn classify(&mut self, crop: &RgbImage) -> Result<Vec<f32>> {
        (**self).classify(crop)
    }
}

impl<T: VertexPredictor + ?Sized> VertexPredictor for Box<T> {
    fn predict_vertices(&mut self, patch: &RgbImage) -> Result<[(f32, f32); 4]> {
        (**self).predict_vertices(patch)
    }
}

/// Index of the largest score, `None` for an empty slice
pub fn argmax(scores: &[f32]) -> Option<usize> {
    // first maximum wins on ties; a NaN counts as the maximum
    if let Some(idx) = scores.iter().position(|v| v.is_nan()) {
        return Some(idx);
    }
    scores
        .iter()
        .enumerate()
        .fold(None, |best: Option<(usize, f32)>, (idx, &v)| match best {
            Some((_, top)) if v <= top => best,
            _ => Some((idx, v)),
        })
        .map(|(idx, _)| idx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detection_row_from_slice() {
        let raw = [
            1.0, 2.0, 3.0, 4.0, 0.9, 10.0, 11.0, 12.0, 13.0, 14.0, 15.0, 16.0, 17.0, 1.0,
        ];
        let row = DetectionRow::from_slice(&raw).unwrap();
        assert_eq!(row.bbox, [1.0, 2.0, 3.0, 4.0]);
        assert_eq!(row.score, 0.9);
        assert_eq!(row.landmarks[0], (10.0, 11.0));
        assert_eq!(row.landmarks[3], (16.0, 17.0));
        assert_eq!(row.layer_flag, 1.0);
    }

    #[test]
    fn test_detection_row_rejects_wrong_length() {
        let err = DetectionRow::from_slice(&[0.0; 13]).unwrap_err();
        assert!(matches!(
            err,
            LprError::MalformedDetection {
                expected: 14,
                actual: 13
            }
        ));
    }

    #[test]
    fn test_argmax() {
        assert_eq!(argmax(&[0.1, 0.7, 0.2]), Some(1));
        assert_eq!(argmax(&[0.4, 0.4, 0.2]), Some(0));
        assert_eq!(argmax(&[0.2, 0.4, 0.4]), Some(1));
        assert_eq!(argmax(&[1.0 / 3.0; 3]), Some(0));
        assert_eq!(argmax(&[0.9, f32::NAN, 0.1]), Some(1));
        assert_eq!(argmax(&[]), None);
    }

    #[test]
    fn test_box_detections_empty() {
        let mut dets = BoxDetections::default();
        assert!(dets.is_empty());
        dets.boxes.push([0.0; 4]);
        dets.scores.push(0.5);
        assert!(dets.is_empty());
        dets.classes.push(0);
        assert!(!dets.is_empty());
    }
}
