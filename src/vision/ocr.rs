//! Plate text recognition
//!
//! CRNN-style recognizer run through ONNX Runtime. The model emits per-timestep character
//! probabilities which are collapsed with greedy CTC decoding.

use anyhow::{Context, Result};
use image::RgbImage;
use std::path::Path;
use tracing::debug;

use super::models::OnnxSession;
use super::preprocess::preprocess_for_recognition;
use super::Recognizer;
use crate::config::constants::REC_INPUT_SIZE;

/// Recognizer vocabulary. Index 0 is the CTC blank.
pub const PLATE_TOKENS: &[&str] = &[
    "blank", "'", "京", "沪", "津", "渝", "冀", "晋", "蒙", "辽", "吉", "黑", "苏", "浙", "皖",
    "闽", "赣", "鲁", "豫", "鄂", "湘", "粤", "桂", "琼", "川", "贵", "云", "藏", "陕", "甘",
    "青", "宁", "新", "0", "1", "2", "3", "4", "5", "6", "7", "8", "9", "A", "B", "C", "D",
    "E", "F", "G", "H", "J", "K", "L", "M", "N", "P", "Q", "R", "S", "T", "U", "V", "W", "X",
    "Y", "Z", "港", "学", "使", "警", "澳", "挂", "军", "北", "南", "广", "沈", "兰", "成",
    "济", "海", "民", "航", "空",
];

/// ONNX-backed plate recognizer
pub struct PlateRecognizer {
    session: OnnxSession,
    input_size: (u32, u32),
    tokens: Vec<String>,
}

impl PlateRecognizer {
    pub fn new(model_path: &Path, intra_threads: usize) -> Result<Self> {
        let session = OnnxSession::new(model_path, intra_threads)
            .context("Failed to load plate recognizer")?;

        Ok(Self {
            session,
            input_size: REC_INPUT_SIZE,
            tokens: PLATE_TOKENS.iter().map(|t| t.to_string()).collect(),
        })
    }

    /// Replace the vocabulary (index 0 must stay the blank)
    pub fn with_tokens(mut self, tokens: Vec<String>) -> Self {
        self.tokens = tokens;
        self
    }
}

impl Recognizer for PlateRecognizer {
    fn recognize(&mut self, crop: &RgbImage) -> Result<(String, f32)> {
        let input = preprocess_for_recognition(crop, self.input_size);
        let (shape, data) = self.session.run(&input)?;

        let &[_, steps, classes] = shape.as_slice() else {
            anyhow::bail!("Unexpected recognizer output shape {:?}", shape);
        };
        if classes == 0 || data.len() < steps * classes {
            anyhow::bail!("Recognizer output shorter than its shape {:?}", shape);
        }

        let (text, confidence) = ctc_greedy_decode(&data, steps, classes, &self.tokens);
        debug!("Recognized '{}' ({:.3})", text, confidence);
        Ok((text, confidence))
    }
}

/// Greedy CTC decoding over a `steps x classes` probability matrix.
///
/// Skips blanks (index 0) and repeated indices; the confidence is the mean probability of the
/// kept characters, 0 when nothing is kept.
pub fn ctc_greedy_decode(
    probs: &[f32],
    steps: usize,
    classes: usize,
    tokens: &[String],
) -> (String, f32) {
    let mut text = String::new();
    if classes == 0 {
        return (text, 0.0);
    }

    let mut kept = Vec::new();
    let mut prev = 0usize;

    for step in probs.chunks_exact(classes).take(steps) {
        let (idx, prob) = step
            .iter()
            .copied()
            .enumerate()
            .fold((0, f32::MIN), |best, cur| if cur.1 > best.1 { cur } else { best });

        if idx != 0 && idx != prev {
            if let Some(token) = tokens.get(idx) {
                text.push_str(token);
                kept.push(prob);
            }
        }
        prev = idx;
    }

    let confidence = if kept.is_empty() {
        0.0
    } else {
        kept.iter().sum::<f32>() / kept.len() as f32
    };

    (text, confidence)
}
