//! Plate color classifier

use anyhow::{Context, Result};
use image::RgbImage;
use std::path::Path;

use super::models::OnnxSession;
use super::preprocess::preprocess_for_classification;
use super::Classifier;
use crate::config::constants::CLS_INPUT_SIZE;

/// ONNX-backed plate color classifier
pub struct PlateClassifier {
    session: OnnxSession,
    input_size: (u32, u32),
}

impl PlateClassifier {
    pub fn new(model_path: &Path, intra_threads: usize) -> Result<Self> {
        let session = OnnxSession::new(model_path, intra_threads)
            .context("Failed to load plate classifier")?;

        Ok(Self {
            session,
            input_size: CLS_INPUT_SIZE,
        })
    }
}

impl Classifier for PlateClassifier {
    fn classify(&mut self, crop: &RgbImage) -> Result<Vec<f32>> {
        let input = preprocess_for_classification(crop, self.input_size);
        let (_, data) = self.session.run(&input)?;
        Ok(softmax(&data))
    }
}

/// Numerically stable softmax
pub fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|&v| (v - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    if sum > 0.0 {
        exps.into_iter().map(|v| v / sum).collect()
    } else {
        exps
    }
}
