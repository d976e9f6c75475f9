//! Model management for ONNX Runtime
//!
//! Handles downloading, caching, and loading of the plate detector, recognizer and
//! classifier models.

use anyhow::{Context, Result};
use futures_util::StreamExt;
use ndarray::Array4;
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::TensorRef;
use sha2::{Digest, Sha256};
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::runtime::Runtime;
use tracing::{debug, info, warn};

use crate::config::constants::{
    CLASSIFIER_FILE, DETECTOR_320_FILE, DETECTOR_640_FILE, MODEL_REMOTE_URL, MODEL_VERSION,
    RECOGNIZER_FILE,
};
use crate::config::DetectLevel;

/// Environment variable that forbids model downloads
pub const OFFLINE_ENV: &str = "HYPERLPR_OFFLINE";

/// Model files of the plate pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelType {
    /// Multi-task detector, 320x320 input
    Detector320,
    /// Multi-task detector, 640x640 input
    Detector640,
    /// Plate text recognizer
    Recognizer,
    /// Plate color classifier
    Classifier,
}

impl ModelType {
    /// Detector model for a detect level
    pub fn detector(level: DetectLevel) -> Self {
        match level {
            DetectLevel::Low => ModelType::Detector320,
            DetectLevel::High => ModelType::Detector640,
        }
    }

    /// Get the filename for this model type
    pub fn filename(&self) -> &'static str {
        match self {
            ModelType::Detector320 => DETECTOR_320_FILE,
            ModelType::Detector640 => DETECTOR_640_FILE,
            ModelType::Recognizer => RECOGNIZER_FILE,
            ModelType::Classifier => CLASSIFIER_FILE,
        }
    }

    /// Path relative to the model root, e.g. `20230229/onnx/rpv3_mdict_160_r3.onnx`
    pub fn relative_path(&self) -> PathBuf {
        PathBuf::from(MODEL_VERSION).join("onnx").join(self.filename())
    }

    /// Get the download URL for this model
    pub fn download_url(&self) -> String {
        format!("{}{}/onnx/{}", MODEL_REMOTE_URL, MODEL_VERSION, self.filename())
    }

    /// Display name for progress reporting
    pub fn display_name(&self) -> &'static str {
        match self {
            ModelType::Detector320 => "Plate Detector (320)",
            ModelType::Detector640 => "Plate Detector (640)",
            ModelType::Recognizer => "Plate Recognizer",
            ModelType::Classifier => "Plate Classifier",
        }
    }
}

/// Model manifest tracking downloaded models
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ModelManifest {
    pub version: String,
    pub models: Vec<ModelInfo>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ModelInfo {
    pub model_type: String,
    pub filename: String,
    pub size_bytes: u64,
    pub sha256: Option<String>,
    pub downloaded_at: u64,
}

impl Default for ModelManifest {
    fn default() -> Self {
        Self {
            version: MODEL_VERSION.to_string(),
            models: Vec::new(),
        }
    }
}

/// Model manager for downloading and caching ONNX models
pub struct ModelManager {
    root: PathBuf,
    offline: bool,
}

impl ModelManager {
    /// Create a model manager rooted at the application data directory
    pub fn new() -> Result<Self> {
        let data_dir = crate::storage::get_data_dir()?;
        Self::with_dir(data_dir)
    }

    /// Create model manager with custom directory
    pub fn with_dir(root: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            offline: std::env::var(OFFLINE_ENV).is_ok(),
        })
    }

    /// Refuse downloads regardless of the environment
    pub fn offline(mut self, offline: bool) -> Self {
        self.offline = self.offline || offline;
        self
    }

    /// Get the model root path
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Get the path to a specific model file
    pub fn model_path(&self, model_type: ModelType) -> PathBuf {
        self.root.join(model_type.relative_path())
    }

    /// Check if a model is already downloaded
    pub fn is_model_available(&self, model_type: ModelType) -> bool {
        std::fs::metadata(self.model_path(model_type))
            .map(|m| m.is_file() && m.len() > 0)
            .unwrap_or(false)
    }

    /// Check if all models needed for a detect level are available
    pub fn are_models_ready(&self, level: DetectLevel) -> bool {
        self.is_model_available(ModelType::detector(level))
            && self.is_model_available(ModelType::Recognizer)
            && self.is_model_available(ModelType::Classifier)
    }

    /// Get status of all models
    pub fn get_model_status(&self) -> Vec<(ModelType, bool, Option<u64>)> {
        let models = [
            ModelType::Detector320,
            ModelType::Detector640,
            ModelType::Recognizer,
            ModelType::Classifier,
        ];

        models
            .iter()
            .map(|&model_type| {
                let path = self.model_path(model_type);
                let available = self.is_model_available(model_type);
                let size = std::fs::metadata(&path).ok().map(|m| m.len());
                (model_type, available, size)
            })
            .collect()
    }

    /// Download a model if not already available
    /// Returns the path to the model file
    pub fn ensure_model(&self, model_type: ModelType) -> Result<PathBuf> {
        let path = self.model_path(model_type);

        if self.is_model_available(model_type) {
            debug!("Model {:?} already available at {:?}", model_type, path);
            return Ok(path);
        }

        info!("Downloading model {:?}...", model_type);
        self.download_model(model_type)?;

        Ok(path)
    }

    /// Download every model needed for a detect level
    pub fn ensure_all_models(&self, level: DetectLevel) -> Result<()> {
        self.ensure_model(ModelType::detector(level))?;
        self.ensure_model(ModelType::Recognizer)?;
        self.ensure_model(ModelType::Classifier)?;
        Ok(())
    }

    /// Download a specific model (blocking)
    fn download_model(&self, model_type: ModelType) -> Result<()> {
        let url = model_type.download_url();
        let path = self.model_path(model_type);

        if self.offline {
            anyhow::bail!(
                "Offline mode: cannot download models. Please download manually from {} and place at {:?}",
                url,
                path
            );
        }

        info!("Downloading {} model from {}", model_type.display_name(), url);

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let rt = Runtime::new().context("Failed to create tokio runtime")?;
        let hash = rt.block_on(download_file_async(&url, &path))?;

        if !self.is_model_available(model_type) {
            anyhow::bail!("Download completed but model file is missing or empty");
        }

        self.update_manifest_for_model(model_type, hash)?;

        info!("Successfully downloaded {} model", model_type.display_name());
        Ok(())
    }

    /// Update manifest after successful download
    fn update_manifest_for_model(&self, model_type: ModelType, sha256: String) -> Result<()> {
        let mut manifest = match self.load_manifest() {
            Ok(manifest) => manifest,
            Err(e) => {
                warn!("Ignoring unreadable model manifest: {}", e);
                ModelManifest::default()
            }
        };

        let metadata = std::fs::metadata(self.model_path(model_type))?;
        let model_info = ModelInfo {
            model_type: format!("{:?}", model_type),
            filename: model_type.filename().to_string(),
            size_bytes: metadata.len(),
            sha256: Some(sha256),
            downloaded_at: unix_now(),
        };

        if let Some(existing) = manifest
            .models
            .iter_mut()
            .find(|m| m.filename == model_info.filename)
        {
            *existing = model_info;
        } else {
            manifest.models.push(model_info);
        }

        self.save_manifest(&manifest)
    }

    fn manifest_path(&self) -> PathBuf {
        self.root.join(MODEL_VERSION).join("manifest.json")
    }

    /// Load the model manifest
    pub fn load_manifest(&self) -> Result<ModelManifest> {
        let manifest_path = self.manifest_path();
        if manifest_path.exists() {
            let content = std::fs::read_to_string(&manifest_path)?;
            let manifest: ModelManifest = serde_json::from_str(&content)?;
            Ok(manifest)
        } else {
            Ok(ModelManifest::default())
        }
    }

    /// Save the model manifest
    pub fn save_manifest(&self, manifest: &ModelManifest) -> Result<()> {
        let manifest_path = self.manifest_path();
        if let Some(parent) = manifest_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(manifest)?;
        std::fs::write(manifest_path, content)?;
        Ok(())
    }
}

/// Stream `url` into `path` via a temp file, returning the sha256 of the content
async fn download_file_async(url: &str, path: &Path) -> Result<String> {
    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(300))
        .build()
        .context("Failed to create HTTP client")?;

    let response = client
        .get(url)
        .send()
        .await
        .context("Failed to send download request")?;

    if !response.status().is_success() {
        anyhow::bail!("Download failed with status {}: {}", response.status(), url);
    }

    debug!("Download size: {:?} bytes", response.content_length());

    let temp_path = path.with_extension("tmp");
    let mut file = std::fs::File::create(&temp_path).context("Failed to create temp file")?;

    let mut hasher = Sha256::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.context("Error reading download stream")?;
        file.write_all(&chunk).context("Failed to write to temp file")?;
        hasher.update(&chunk);
    }

    file.flush().context("Failed to flush temp file")?;
    drop(file);

    let hash = format!("{:x}", hasher.finalize());
    debug!("sha256 of {}: {}", url, hash);

    std::fs::rename(&temp_path, path)
        .context("Failed to move downloaded file to final location")?;

    Ok(hash)
}

/// ONNX Runtime session wrapper
pub struct OnnxSession {
    session: Session,
    input_names: Vec<String>,
    output_names: Vec<String>,
}

impl OnnxSession {
    /// Create a new ONNX session from a model file
    pub fn new(model_path: &Path, intra_threads: usize) -> Result<Self> {
        info!("Loading ONNX model from {:?}", model_path);

        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(intra_threads)?
            .commit_from_file(model_path)
            .with_context(|| format!("Failed to load ONNX model {:?}", model_path))?;

        let input_names: Vec<String> = session
            .inputs
            .iter()
            .map(|input| input.name.clone())
            .collect();

        let output_names: Vec<String> = session
            .outputs
            .iter()
            .map(|output| output.name.clone())
            .collect();

        info!(
            "Model loaded. Inputs: {:?}, Outputs: {:?}",
            input_names, output_names
        );

        Ok(Self {
            session,
            input_names,
            output_names,
        })
    }

    /// Get input names
    pub fn input_names(&self) -> &[String] {
        &self.input_names
    }

    /// Get output names
    pub fn output_names(&self) -> &[String] {
        &self.output_names
    }

    /// Run a single-input model and copy out its first output as (shape, data)
    pub fn run(&mut self, input: &Array4<f32>) -> Result<(Vec<usize>, Vec<f32>)> {
        let tensor = TensorRef::from_array_view(input.view())?;
        let outputs = self
            .session
            .run(ort::inputs![tensor])
            .context("ONNX inference failed")?;

        let (shape, data) = outputs[0]
            .try_extract_tensor::<f32>()
            .context("Failed to extract output tensor")?;

        let shape: Vec<usize> = shape.iter().map(|&d| d.max(0) as usize).collect();
        Ok((shape, data.to_vec()))
    }
}

/// Seconds since the Unix epoch
fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
