//! Legacy plate pipeline
//!
//! Box detector, then a vertex predictor run on a 96x96 patch aligned around each box. The
//! predicted corners are mapped back to the source image for rectification. No type
//! inference and no length filter happen here.

use image::{DynamicImage, RgbImage};
use std::collections::HashSet;
use tracing::debug;

use super::{recognize_crop, to_rgb};
use crate::config::constants::{ALIGN_SCALE_FACTOR, ALIGN_SIZE};
use crate::error::Result;
use crate::types::{LayerNum, Plate, PlateDict, PlateType};
use crate::vision::warp::{align_box, isolate_box, rectify, Point};
use crate::vision::{BoxDetector, Recognizer, VertexPredictor};

/// Returns the indices of boxes that sit close enough to another box to need isolating
pub type AdjacencyFinder = Box<dyn Fn(&[[f32; 4]]) -> HashSet<usize> + Send + Sync>;

/// Indices of boxes whose alignment window (the box grown by `ALIGN_SCALE_FACTOR` about its
/// centre) intersects another box
pub fn find_adjacent_boxes(boxes: &[[f32; 4]]) -> HashSet<usize> {
    let mut adjacent = HashSet::new();

    for (i, a) in boxes.iter().enumerate() {
        let window = expand_box(a, ALIGN_SCALE_FACTOR);
        for (j, b) in boxes.iter().enumerate() {
            if i != j && intersects(&window, b) {
                adjacent.insert(i);
                break;
            }
        }
    }

    adjacent
}

fn expand_box(bbox: &[f32; 4], factor: f32) -> [f32; 4] {
    let [x1, y1, x2, y2] = *bbox;
    let cx = (x1 + x2) / 2.0;
    let cy = (y1 + y2) / 2.0;
    let hw = (x2 - x1) * factor / 2.0;
    let hh = (y2 - y1) * factor / 2.0;
    [cx - hw, cy - hh, cx + hw, cy + hh]
}

fn intersects(a: &[f32; 4], b: &[f32; 4]) -> bool {
    a[0] < b[2] && b[0] < a[2] && a[1] < b[3] && b[1] < a[3]
}

/// Box detector + vertex predictor + recognizer pipeline
pub struct LegacyPipeline<D, V, R> {
    detector: D,
    vertex_predictor: V,
    recognizer: R,
    adjacency: AdjacencyFinder,
}

impl<D: BoxDetector, V: VertexPredictor, R: Recognizer> LegacyPipeline<D, V, R> {
    pub fn new(detector: D, vertex_predictor: V, recognizer: R) -> Self {
        Self {
            detector,
            vertex_predictor,
            recognizer,
            adjacency: Box::new(find_adjacent_boxes),
        }
    }

    /// Replace the adjacency finder
    pub fn with_adjacency<F>(mut self, finder: F) -> Self
    where
        F: Fn(&[[f32; 4]]) -> HashSet<usize> + Send + Sync + 'static,
    {
        self.adjacency = Box::new(finder);
        self
    }

    /// Recognize every plate in a 3-channel image, in detector order
    pub fn run(&mut self, image: &DynamicImage) -> Result<Vec<PlateDict>> {
        let rgb = to_rgb(image)?;

        let detections = self.detector.detect_boxes(&rgb)?;
        if detections.is_empty() {
            return Ok(Vec::new());
        }

        let adjacent = (self.adjacency)(&detections.boxes);
        if !adjacent.is_empty() {
            debug!("{} adjacent boxes will be isolated before alignment", adjacent.len());
        }

        let mut results = Vec::with_capacity(detections.boxes.len());

        for (idx, (bbox, &score)) in detections
            .boxes
            .iter()
            .zip(detections.scores.iter())
            .enumerate()
        {
            let quad = if adjacent.contains(&idx) {
                self.locate_plate(&isolate_box(&rgb, bbox), bbox)?
            } else {
                self.locate_plate(&rgb, bbox)?
            };
            let Some(quad) = quad else {
                debug!("Singular alignment transform for box {:?}, skipping", bbox);
                continue;
            };

            let crop = rectify(&rgb, &quad);
            let (code, rec_confidence) = recognize_crop(&mut self.recognizer, &crop)?;
            if code.is_empty() {
                debug!("No text for box {:?}", bbox);
                continue;
            }

            let plate = Plate::new(
                quad.map(|(x, y)| [x.round() as i32, y.round() as i32]),
                code,
                rec_confidence,
                bbox.map(|v| v as i32),
                score,
                PlateType::Unknown,
                LayerNum::Mono,
            );
            results.push(plate.to_dict());
        }

        Ok(results)
    }

    /// Plate corners in source pixels, predicted on a patch aligned around `bbox` in `source`.
    /// `None` when the alignment transform cannot be inverted.
    fn locate_plate(&mut self, source: &RgbImage, bbox: &[f32; 4]) -> Result<Option<[Point; 4]>> {
        let (patch, mat) = align_box(source, bbox, ALIGN_SCALE_FACTOR, ALIGN_SIZE);
        let points = self.vertex_predictor.predict_vertices(&patch)?;
        Ok(mat.invert().map(|inverse| points.map(|p| inverse.apply(p))))
    }
}
