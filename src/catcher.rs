//! High-level recognition API
//!
//! `LicensePlateCatcher` resolves the model files, loads the three ONNX collaborators and
//! wraps them in a `MultiTaskPipeline`.

use image::DynamicImage;
use std::path::Path;
use tracing::info;

use crate::config::{load_config, AppConfig, InferenceBackend};
use crate::error::{LprError, Result};
use crate::pipeline::MultiTaskPipeline;
use crate::types::PlateResult;
use crate::vision::{
    ModelManager, ModelType, MultiTaskDetector, PlateClassifier, PlateRecognizer,
};

/// Multi-task pipeline over the ONNX Runtime collaborators
pub struct LicensePlateCatcher {
    pipeline: MultiTaskPipeline<MultiTaskDetector, PlateRecognizer, PlateClassifier>,
}

impl LicensePlateCatcher {
    /// Build from configuration, downloading missing models unless offline
    pub fn new(config: &AppConfig) -> Result<Self> {
        let inference = &config.inference;
        if inference.backend != InferenceBackend::OnnxRuntime {
            return Err(LprError::UnsupportedConfiguration(format!(
                "inference backend {:?} is not available in this build",
                inference.backend
            )));
        }

        let manager = match &config.models.folder {
            Some(folder) => ModelManager::with_dir(folder.clone())?,
            None => ModelManager::new()?,
        }
        .offline(config.models.offline);

        manager.ensure_all_models(inference.detect_level)?;

        let detector = MultiTaskDetector::new(
            &manager.model_path(ModelType::detector(inference.detect_level)),
            inference.detect_level.input_size(),
            inference.intra_threads,
        )?;
        let recognizer = PlateRecognizer::new(
            &manager.model_path(ModelType::Recognizer),
            inference.intra_threads,
        )?;
        let classifier = PlateClassifier::new(
            &manager.model_path(ModelType::Classifier),
            inference.intra_threads,
        )?;

        info!(
            "Plate models loaded from {:?} (detector {}x{})",
            manager.root(),
            detector.input_size(),
            detector.input_size()
        );

        Ok(Self {
            pipeline: MultiTaskPipeline::new(
                detector,
                recognizer,
                classifier,
                inference.full_result,
            ),
        })
    }

    /// Build from a TOML configuration file
    pub fn from_config_file(path: &Path) -> Result<Self> {
        let config = load_config(path)
            .map_err(|e| LprError::Config(format!("{:?}: {:#}", path, e)))?;
        Self::new(&config)
    }

    /// Recognize every plate in a 3-channel image
    pub fn run(&mut self, image: &DynamicImage) -> Result<Vec<PlateResult>> {
        self.pipeline.run(image)
    }

    /// Decode an image file and recognize its plates
    pub fn run_file(&mut self, path: &Path) -> Result<Vec<PlateResult>> {
        let image = image::open(path)?;
        self.run(&image)
    }
}
