//! Multi-task plate detector
//!
//! A single ONNX model predicts plate boxes, four corner landmarks and a single/double layer
//! class. Raw predictions are filtered by score, de-duplicated with NMS and mapped back to
//! source-image pixels as `DetectionRow`s.

use anyhow::{Context, Result};
use image::RgbImage;
use std::path::Path;
use std::time::Instant;
use tracing::debug;

use super::models::OnnxSession;
use super::preprocess::{preprocess_for_detection, Letterbox};
use super::{DetectionRow, Detector};
use crate::config::constants::{DET_CONF_THRESHOLD, DET_NMS_THRESHOLD};

/// Columns before the class scores: box(4), objectness(1), landmarks(8)
const PREDICTION_HEAD: usize = 13;

/// Multi-task detector backed by ONNX Runtime
pub struct MultiTaskDetector {
    session: OnnxSession,
    input_size: u32,
    conf_threshold: f32,
    iou_threshold: f32,
}

impl MultiTaskDetector {
    /// Load the detector model for a square `input_size`
    pub fn new(model_path: &Path, input_size: u32, intra_threads: usize) -> Result<Self> {
        let session = OnnxSession::new(model_path, intra_threads)
            .context("Failed to load plate detector")?;

        Ok(Self {
            session,
            input_size,
            conf_threshold: DET_CONF_THRESHOLD,
            iou_threshold: DET_NMS_THRESHOLD,
        })
    }

    pub fn with_thresholds(mut self, conf_threshold: f32, iou_threshold: f32) -> Self {
        self.conf_threshold = conf_threshold;
        self.iou_threshold = iou_threshold;
        self
    }

    pub fn input_size(&self) -> u32 {
        self.input_size
    }
}

impl Detector for MultiTaskDetector {
    fn detect(&mut self, image: &RgbImage) -> Result<Vec<DetectionRow>> {
        let start = Instant::now();

        let (input, letterbox) = preprocess_for_detection(image, self.input_size);
        let (shape, data) = self.session.run(&input)?;

        let rows = decode_predictions(
            &shape,
            &data,
            &letterbox,
            self.conf_threshold,
            self.iou_threshold,
        )?;

        debug!(
            "Plate detection complete in {:?}: {} candidates",
            start.elapsed(),
            rows.len()
        );

        Ok(rows)
    }
}

/// Decode a `[1, N, 13 + classes]` prediction tensor into detection rows
pub fn decode_predictions(
    shape: &[usize],
    data: &[f32],
    letterbox: &Letterbox,
    conf_threshold: f32,
    iou_threshold: f32,
) -> Result<Vec<DetectionRow>> {
    let cols = *shape.last().context("Detector output has no dimensions")?;
    if cols <= PREDICTION_HEAD {
        anyhow::bail!("Detector output has {} columns, expected more than {}", cols, PREDICTION_HEAD);
    }

    let mut candidates = Vec::new();

    for pred in data.chunks_exact(cols) {
        let objectness = pred[4];
        if objectness < conf_threshold {
            continue;
        }

        let (layer, class_score) = pred[PREDICTION_HEAD..]
            .iter()
            .enumerate()
            .map(|(idx, score)| (idx, score * objectness))
            .fold((0, f32::MIN), |best, cur| if cur.1 > best.1 { cur } else { best });

        if class_score < conf_threshold {
            continue;
        }

        let (cx, cy, w, h) = (pred[0], pred[1], pred[2], pred[3]);
        let (x1, y1) = letterbox.restore(cx - w / 2.0, cy - h / 2.0);
        let (x2, y2) = letterbox.restore(cx + w / 2.0, cy + h / 2.0);

        let mut fields = vec![x1, y1, x2, y2, class_score];
        for i in 0..4 {
            let (x, y) = letterbox.restore(pred[5 + i * 2], pred[6 + i * 2]);
            fields.extend([x, y]);
        }
        fields.push(layer as f32);

        candidates.push(DetectionRow::from_slice(&fields)?);
    }

    Ok(non_maximum_suppression(candidates, iou_threshold))
}

/// Keep the highest scoring rows, dropping any that overlap a kept row above `iou_threshold`
pub fn non_maximum_suppression(mut rows: Vec<DetectionRow>, iou_threshold: f32) -> Vec<DetectionRow> {
    rows.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

    let mut keep: Vec<DetectionRow> = Vec::new();
    for row in rows {
        if keep.iter().all(|kept| iou(&kept.bbox, &row.bbox) < iou_threshold) {
            keep.push(row);
        }
    }
    keep
}

/// Intersection over Union of two `[x1, y1, x2, y2]` boxes
pub fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
    let x1 = a[0].max(b[0]);
    let y1 = a[1].max(b[1]);
    let x2 = a[2].min(b[2]);
    let y2 = a[3].min(b[3]);

    let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    let area_a = (a[2] - a[0]).max(0.0) * (a[3] - a[1]).max(0.0);
    let area_b = (b[2] - b[0]).max(0.0) * (b[3] - b[1]).max(0.0);
    let union = area_a + area_b - intersection;

    if union > 0.0 {
        intersection / union
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const IDENTITY: Letterbox = Letterbox {
        scale: 1.0,
        pad_x: 0.0,
        pad_y: 0.0,
    };

    fn prediction(cx: f32, cy: f32, obj: f32, single: f32, double: f32) -> Vec<f32> {
        vec![
            cx, cy, 40.0, 20.0, obj,
            cx - 20.0, cy - 10.0, cx + 20.0, cy - 10.0,
            cx + 20.0, cy + 10.0, cx - 20.0, cy + 10.0,
            single, double,
        ]
    }

    #[test]
    fn test_iou() {
        let a = [0.0, 0.0, 10.0, 10.0];
        assert!((iou(&a, &a) - 1.0).abs() < 1e-6);
        assert_eq!(iou(&a, &[20.0, 20.0, 30.0, 30.0]), 0.0);
        let half = iou(&a, &[5.0, 0.0, 15.0, 10.0]);
        assert!((half - 50.0 / 150.0).abs() < 1e-6);
    }

    #[test]
    fn test_decode_filters_and_classifies_layer() {
        let mut data = prediction(100.0, 50.0, 0.9, 0.1, 0.95);
        data.extend(prediction(300.0, 50.0, 0.2, 0.9, 0.1)); // low objectness
        data.extend(prediction(500.0, 50.0, 0.9, 0.9, 0.05));

        let rows = decode_predictions(&[1, 3, 15], &data, &IDENTITY, 0.5, 0.5).unwrap();
        assert_eq!(rows.len(), 2);

        let double = rows.iter().find(|r| r.bbox[0] < 200.0).unwrap();
        assert_eq!(double.layer_flag, 1.0);
        assert_eq!(double.bbox, [80.0, 40.0, 120.0, 60.0]);
        assert_eq!(double.landmarks[0], (80.0, 40.0));
        assert!((double.score - 0.9 * 0.95).abs() < 1e-6);

        let single = rows.iter().find(|r| r.bbox[0] > 400.0).unwrap();
        assert_eq!(single.layer_flag, 0.0);
    }

    #[test]
    fn test_decode_applies_nms() {
        let mut data = prediction(100.0, 50.0, 0.9, 0.9, 0.1);
        data.extend(prediction(102.0, 51.0, 0.8, 0.9, 0.1));

        let rows = decode_predictions(&[1, 2, 15], &data, &IDENTITY, 0.5, 0.5).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].bbox[0], 80.0);
    }

    #[test]
    fn test_decode_restores_letterbox() {
        let letterbox = Letterbox {
            scale: 0.5,
            pad_x: 0.0,
            pad_y: 80.0,
        };
        let data = prediction(100.0, 130.0, 0.9, 0.9, 0.1);
        let rows = decode_predictions(&[1, 1, 15], &data, &letterbox, 0.5, 0.5).unwrap();
        assert_eq!(rows[0].bbox, [160.0, 80.0, 240.0, 120.0]);
    }

    #[test]
    fn test_decode_rejects_narrow_output() {
        assert!(decode_predictions(&[1, 1, 13], &[0.0; 13], &IDENTITY, 0.5, 0.5).is_err());
    }
}
