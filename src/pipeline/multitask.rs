//! Multi-task plate pipeline
//!
//! Per image: one detector call, then for every detection row a perspective-rectified crop,
//! one or two recognizer calls depending on the layer flag, and a plate type taken from the
//! rules engine or, failing that, the classifier.

use image::{DynamicImage, RgbImage};
use std::time::Instant;
use tracing::debug;

use super::{recognize_crop, to_rgb};
use crate::analysis::RulesEngine;
use crate::config::constants::{DOUBLE_LAYER_SPLIT_RATIO, MIN_PLATE_CODE_LEN};
use crate::error::Result;
use crate::types::{BoundingBox, LayerNum, Plate, PlateResult, PlateType, Vertex};
use crate::vision::warp::{rectify, split_layers};
use crate::vision::{argmax, Classifier, DetectionRow, Detector, Recognizer};

/// Classes of the color classifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassifierLabel {
    Blue,
    Green,
    Yellow,
}

/// Classifier output index -> label. Indices past the end leave the type unknown.
pub const CLASSIFIER_LABELS: [ClassifierLabel; 3] = [
    ClassifierLabel::Blue,
    ClassifierLabel::Green,
    ClassifierLabel::Yellow,
];

impl ClassifierLabel {
    /// Plate type for this label; yellow plates keep their layer distinction
    pub fn plate_type(&self, layer: LayerNum) -> PlateType {
        match (self, layer) {
            (ClassifierLabel::Blue, _) => PlateType::Blue,
            (ClassifierLabel::Green, _) => PlateType::Green,
            (ClassifierLabel::Yellow, LayerNum::Double) => PlateType::YellowDouble,
            (ClassifierLabel::Yellow, LayerNum::Mono) => PlateType::YellowSingle,
        }
    }
}

/// A detection decoded into integer pixel geometry
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectionCandidate {
    pub bounding_box: BoundingBox,
    pub score: f32,
    pub landmarks: Vertex,
    pub layer: LayerNum,
}

impl From<&DetectionRow> for DetectionCandidate {
    fn from(row: &DetectionRow) -> Self {
        let [x1, y1, x2, y2] = row.bbox;
        Self {
            bounding_box: [x1 as i32, y1 as i32, x2 as i32, y2 as i32],
            score: row.score,
            landmarks: row.landmarks.map(|(x, y)| [x as i32, y as i32]),
            layer: LayerNum::from_flag(row.layer_flag as i32),
        }
    }
}

impl DetectionCandidate {
    /// Landmarks as float points for warping
    pub fn quad(&self) -> [(f32, f32); 4] {
        self.landmarks.map(|[x, y]| (x as f32, y as f32))
    }
}

/// Detector + recognizer + classifier pipeline
pub struct MultiTaskPipeline<D, R, C> {
    detector: D,
    recognizer: R,
    classifier: C,
    rules: RulesEngine,
    full_result: bool,
}

impl<D: Detector, R: Recognizer, C: Classifier> MultiTaskPipeline<D, R, C> {
    /// Create a pipeline. `full_result` selects the projection returned by `run`.
    pub fn new(detector: D, recognizer: R, classifier: C, full_result: bool) -> Self {
        Self {
            detector,
            recognizer,
            classifier,
            rules: RulesEngine::new(),
            full_result,
        }
    }

    /// Replace the rules engine (e.g. one with extra rules registered)
    pub fn with_rules(mut self, rules: RulesEngine) -> Self {
        self.rules = rules;
        self
    }

    pub fn full_result(&self) -> bool {
        self.full_result
    }

    /// Recognize every plate in a 3-channel image, in detector order
    pub fn run(&mut self, image: &DynamicImage) -> Result<Vec<PlateResult>> {
        let rgb = to_rgb(image)?;
        let start = Instant::now();

        let rows = self.detector.detect(&rgb)?;
        let mut results = Vec::with_capacity(rows.len());

        for row in &rows {
            let candidate = DetectionCandidate::from(row);
            let Some(plate) = self.process_candidate(&rgb, &candidate)? else {
                continue;
            };

            results.push(if self.full_result {
                PlateResult::Full(plate.to_full_result())
            } else {
                PlateResult::Compact(plate.to_result())
            });
        }

        debug!(
            "Plate pipeline complete in {:?}: {} detections, {} plates",
            start.elapsed(),
            rows.len(),
            results.len()
        );

        Ok(results)
    }

    fn process_candidate(
        &mut self,
        image: &RgbImage,
        candidate: &DetectionCandidate,
    ) -> Result<Option<Plate>> {
        let crop = rectify(image, &candidate.quad());

        let (code, rec_confidence) = match candidate.layer {
            LayerNum::Double => {
                let (top, bottom) = split_layers(&crop, DOUBLE_LAYER_SPLIT_RATIO);
                let (top_code, top_conf) = recognize_crop(&mut self.recognizer, &top)?;
                let (bottom_code, bottom_conf) = recognize_crop(&mut self.recognizer, &bottom)?;
                (top_code + &bottom_code, (top_conf + bottom_conf) / 2.0)
            }
            LayerNum::Mono => recognize_crop(&mut self.recognizer, &crop)?,
        };

        if code.is_empty() {
            debug!("No text for detection at {:?}", candidate.bounding_box);
            return Ok(None);
        }
        if code.chars().count() < MIN_PLATE_CODE_LEN {
            debug!("Dropping short plate code '{}'", code);
            return Ok(None);
        }

        let plate_type = self.resolve_plate_type(&code, &crop, candidate.layer)?;

        Ok(Some(Plate::new(
            candidate.landmarks,
            code,
            rec_confidence,
            candidate.bounding_box,
            candidate.score,
            plate_type,
            candidate.layer,
        )))
    }

    fn resolve_plate_type(
        &mut self,
        code: &str,
        crop: &RgbImage,
        layer: LayerNum,
    ) -> Result<PlateType> {
        let by_rule = self.rules.evaluate(code);
        if by_rule != PlateType::Unknown {
            return Ok(by_rule);
        }

        let scores = self.classifier.classify(crop)?;
        Ok(argmax(&scores)
            .and_then(|idx| CLASSIFIER_LABELS.get(idx))
            .map(|label| label.plate_type(layer))
            .unwrap_or(PlateType::Unknown))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LprError;
    use image::{GrayImage, Rgb};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct StubDetector {
        rows: Vec<DetectionRow>,
        calls: Arc<AtomicUsize>,
    }

    impl Detector for StubDetector {
        fn detect(&mut self, _image: &RgbImage) -> anyhow::Result<Vec<DetectionRow>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.rows.clone())
        }
    }

    /// Returns its responses in order, cycling
    struct StubRecognizer {
        responses: Vec<(String, f32)>,
        calls: Arc<AtomicUsize>,
        heights: Vec<u32>,
    }

    impl Recognizer for StubRecognizer {
        fn recognize(&mut self, crop: &RgbImage) -> anyhow::Result<(String, f32)> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            self.heights.push(crop.height());
            Ok(self.responses[n % self.responses.len()].clone())
        }
    }

    struct StubClassifier {
        scores: Vec<f32>,
        calls: Arc<AtomicUsize>,
    }

    impl Classifier for StubClassifier {
        fn classify(&mut self, _crop: &RgbImage) -> anyhow::Result<Vec<f32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.scores.clone())
        }
    }

    struct FailingRecognizer;

    impl Recognizer for FailingRecognizer {
        fn recognize(&mut self, _crop: &RgbImage) -> anyhow::Result<(String, f32)> {
            anyhow::bail!("recognizer exploded")
        }
    }

    struct Counters {
        detector: Arc<AtomicUsize>,
        recognizer: Arc<AtomicUsize>,
        classifier: Arc<AtomicUsize>,
    }

    fn row(x: f32, layer: f32) -> DetectionRow {
        DetectionRow {
            bbox: [x, 20.0, x + 100.0, 60.0],
            score: 0.87,
            landmarks: [
                (x + 0.7, 20.2),
                (x + 100.0, 20.0),
                (x + 100.0, 60.0),
                (x, 60.9),
            ],
            layer_flag: layer,
        }
    }

    fn pipeline(
        rows: Vec<DetectionRow>,
        responses: &[(&str, f32)],
        scores: Vec<f32>,
        full_result: bool,
    ) -> (
        MultiTaskPipeline<StubDetector, StubRecognizer, StubClassifier>,
        Counters,
    ) {
        let counters = Counters {
            detector: Arc::new(AtomicUsize::new(0)),
            recognizer: Arc::new(AtomicUsize::new(0)),
            classifier: Arc::new(AtomicUsize::new(0)),
        };
        let pipeline = MultiTaskPipeline::new(
            StubDetector {
                rows,
                calls: counters.detector.clone(),
            },
            StubRecognizer {
                responses: responses
                    .iter()
                    .map(|(code, conf)| (code.to_string(), *conf))
                    .collect(),
                calls: counters.recognizer.clone(),
                heights: Vec::new(),
            },
            StubClassifier {
                scores,
                calls: counters.classifier.clone(),
            },
            full_result,
        );
        (pipeline, counters)
    }

    fn image() -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(400, 120, Rgb([40, 80, 160])))
    }

    #[test]
    fn test_mono_plate_recognized_once() {
        let (mut p, counters) = pipeline(
            vec![row(20.0, 0.0)],
            &[("京A12345", 0.93)],
            vec![0.9, 0.05, 0.05],
            false,
        );

        let results = p.run(&image()).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(counters.detector.load(Ordering::SeqCst), 1);
        assert_eq!(counters.recognizer.load(Ordering::SeqCst), 1);

        let result = &results[0];
        assert_eq!(result.code(), "京A12345");
        assert!((result.confidence() - 0.93).abs() < 1e-6);
        assert_eq!(result.bounding_box(), [20, 20, 120, 60]);
        assert_eq!(result.layer(), LayerNum::Mono);
        assert_eq!(result.plate_type(), PlateType::Blue);
        assert!(result.vertex().is_none());
    }

    #[test]
    fn test_double_plate_split_and_merged() {
        let (mut p, counters) = pipeline(
            vec![row(20.0, 1.0)],
            &[("京A", 0.8), ("12345", 0.6)],
            vec![0.0, 0.0, 1.0],
            false,
        );

        let results = p.run(&image()).unwrap();
        assert_eq!(counters.recognizer.load(Ordering::SeqCst), 2);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].code(), "京A12345");
        assert!((results[0].confidence() - 0.7).abs() < 1e-6);
        assert_eq!(results[0].layer(), LayerNum::Double);
        assert_eq!(results[0].plate_type(), PlateType::YellowDouble);

        // top band is 40% of the rectified height, bottom band the rest
        let heights = &p.recognizer.heights;
        assert_eq!(heights.len(), 2);
        let total = heights[0] + heights[1];
        assert_eq!(heights[0], (total as f32 * DOUBLE_LAYER_SPLIT_RATIO) as u32);
    }

    #[test]
    fn test_yellow_single_for_mono() {
        let (mut p, _) = pipeline(
            vec![row(20.0, 0.0)],
            &[("京A12345", 0.9)],
            vec![0.1, 0.2, 0.7],
            false,
        );
        let results = p.run(&image()).unwrap();
        assert_eq!(results[0].plate_type(), PlateType::YellowSingle);
    }

    #[test]
    fn test_empty_and_short_codes_are_dropped() {
        let (mut p, counters) = pipeline(
            vec![row(20.0, 0.0), row(150.0, 0.0), row(280.0, 0.0)],
            &[("", 0.0), ("京A12345", 0.9), ("京A1234", 0.9)],
            vec![1.0, 0.0, 0.0],
            false,
        );

        let results = p.run(&image()).unwrap();
        assert_eq!(counters.recognizer.load(Ordering::SeqCst), 3);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].code(), "京A12345");
        assert_eq!(results[0].bounding_box()[0], 150);
        // dropped candidates never reach the classifier
        assert_eq!(counters.classifier.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_rule_precedence_skips_classifier() {
        let (mut p, counters) = pipeline(
            vec![row(20.0, 0.0)],
            &[("WJ1234AB", 0.9)],
            vec![0.0, 0.0, 1.0],
            false,
        );

        let results = p.run(&image()).unwrap();
        assert_eq!(results[0].plate_type(), PlateType::WhiteSingle);
        assert_eq!(counters.classifier.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_eight_chars_green_without_classifier() {
        let (mut p, counters) = pipeline(
            vec![row(20.0, 0.0)],
            &[("京AD12345", 0.9)],
            vec![0.0, 0.0, 1.0],
            false,
        );

        let results = p.run(&image()).unwrap();
        assert_eq!(results[0].plate_type(), PlateType::Green);
        assert_eq!(counters.classifier.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_hong_kong_marker() {
        let (mut p, counters) = pipeline(
            vec![row(20.0, 0.0)],
            &[("粤Z1234港", 0.9)],
            vec![1.0, 0.0, 0.0],
            false,
        );

        let results = p.run(&image()).unwrap();
        assert_eq!(results[0].plate_type(), PlateType::BlackHkMacao);
        assert_eq!(counters.classifier.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_classifier_mapping() {
        for (scores, expected) in [
            (vec![0.8, 0.1, 0.1], PlateType::Blue),
            (vec![0.1, 0.8, 0.1], PlateType::Green),
            (vec![0.1, 0.1, 0.8], PlateType::YellowSingle),
            (vec![0.4, 0.4, 0.2], PlateType::Blue),
            (vec![0.2, 0.4, 0.4], PlateType::Green),
            (vec![0.1, 0.1, 0.1, 0.7], PlateType::Unknown),
            (vec![], PlateType::Unknown),
        ] {
            let (mut p, counters) =
                pipeline(vec![row(20.0, 0.0)], &[("京A12345", 0.9)], scores, false);
            let results = p.run(&image()).unwrap();
            assert_eq!(results[0].plate_type(), expected);
            assert_eq!(counters.classifier.load(Ordering::SeqCst), 1);
        }
    }

    #[test]
    fn test_uniform_classifier_scores_pick_first_label() {
        let (mut p, _) = pipeline(
            vec![row(20.0, 1.0)],
            &[("京A", 0.8), ("12345", 0.6)],
            vec![1.0 / 3.0; 3],
            false,
        );
        let results = p.run(&image()).unwrap();
        assert_eq!(results[0].plate_type(), PlateType::Blue);
    }

    #[test]
    fn test_thin_double_plate_reads_bottom_band_only() {
        let mut thin = row(20.0, 1.0);
        thin.landmarks = [(20.0, 30.0), (120.0, 30.0), (120.0, 32.0), (20.0, 32.0)];
        let (mut p, counters) =
            pipeline(vec![thin], &[("京A12345", 0.8)], vec![1.0, 0.0, 0.0], false);

        let results = p.run(&image()).unwrap();
        // a 2px crop splits into an empty top band, which is never recognized
        assert_eq!(counters.recognizer.load(Ordering::SeqCst), 1);
        assert_eq!(p.recognizer.heights, vec![2]);
        assert_eq!(results[0].code(), "京A12345");
        assert!((results[0].confidence() - 0.4).abs() < 1e-6);
    }

    #[test]
    fn test_full_result_carries_decoded_landmarks() {
        let (mut p, _) = pipeline(
            vec![row(20.0, 0.0)],
            &[("京A12345", 0.9)],
            vec![1.0, 0.0, 0.0],
            true,
        );

        let results = p.run(&image()).unwrap();
        let vertex = results[0].vertex().expect("full result has vertices");
        assert_eq!(vertex, &[[20, 20], [120, 20], [120, 60], [20, 60]]);
    }

    #[test]
    fn test_results_keep_detector_order() {
        let (mut p, _) = pipeline(
            vec![row(280.0, 0.0), row(20.0, 0.0), row(150.0, 0.0)],
            &[("京A00001", 0.9), ("京A00002", 0.9), ("京A00003", 0.9)],
            vec![1.0, 0.0, 0.0],
            false,
        );

        let results = p.run(&image()).unwrap();
        let xs: Vec<i32> = results.iter().map(|r| r.bounding_box()[0]).collect();
        assert_eq!(xs, vec![280, 20, 150]);
    }

    #[test]
    fn test_run_is_idempotent() {
        let (mut p, _) = pipeline(
            vec![row(20.0, 1.0), row(200.0, 0.0)],
            &[("京A", 0.8), ("12345", 0.6), ("沪B67890", 0.9)],
            vec![0.2, 0.5, 0.3],
            true,
        );

        let first = p.run(&image()).unwrap();
        let second = p.run(&image()).unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(first, second);
    }

    #[test]
    fn test_no_detections_is_empty() {
        let (mut p, counters) = pipeline(vec![], &[("京A12345", 0.9)], vec![], false);
        assert!(p.run(&image()).unwrap().is_empty());
        assert_eq!(counters.recognizer.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_invalid_input_checked_before_detection() {
        let (mut p, counters) = pipeline(vec![row(20.0, 0.0)], &[("京A12345", 0.9)], vec![], false);

        let gray = DynamicImage::ImageLuma8(GrayImage::new(100, 100));
        assert!(matches!(p.run(&gray), Err(LprError::InvalidInput(_))));
        assert_eq!(counters.detector.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_degenerate_quad_skips_recognizer() {
        let mut degenerate = row(20.0, 0.0);
        degenerate.landmarks = [(30.0, 30.0); 4];
        let (mut p, counters) = pipeline(vec![degenerate], &[("京A12345", 0.9)], vec![], false);

        assert!(p.run(&image()).unwrap().is_empty());
        assert_eq!(counters.recognizer.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_collaborator_errors_propagate() {
        let mut p = MultiTaskPipeline::new(
            StubDetector {
                rows: vec![row(20.0, 0.0)],
                calls: Arc::new(AtomicUsize::new(0)),
            },
            FailingRecognizer,
            StubClassifier {
                scores: vec![],
                calls: Arc::new(AtomicUsize::new(0)),
            },
            false,
        );

        let err = p.run(&image()).unwrap_err();
        assert!(matches!(err, LprError::Inference(_)));
        assert_eq!(err.to_string(), "recognizer exploded");
    }

    #[test]
    fn test_candidate_decode_truncates() {
        let candidate = DetectionCandidate::from(&row(20.0, 1.0));
        assert_eq!(candidate.bounding_box, [20, 20, 120, 60]);
        assert_eq!(candidate.landmarks[0], [20, 20]);
        assert_eq!(candidate.landmarks[3], [20, 60]);
        assert_eq!(candidate.layer, LayerNum::Double);
    }
}
