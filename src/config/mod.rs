//! Application Configuration
//!
//! Inference and model settings stored in TOML format.

pub mod constants;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Inference settings
    pub inference: InferenceConfig,
    /// Model location settings
    pub models: ModelConfig,
}

/// Inference runtime to execute the models with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InferenceBackend {
    /// ONNX Runtime
    #[default]
    OnnxRuntime,
    /// MNN (not available in this build)
    Mnn,
}

/// Detector resolution tradeoff
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectLevel {
    /// 320x320 detector input, faster
    #[default]
    Low,
    /// 640x640 detector input, finds smaller plates
    High,
}

impl DetectLevel {
    /// Square detector input size for this level
    pub fn input_size(&self) -> u32 {
        match self {
            DetectLevel::Low => 320,
            DetectLevel::High => 640,
        }
    }
}

impl std::str::FromStr for DetectLevel {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(DetectLevel::Low),
            "high" => Ok(DetectLevel::High),
            other => Err(format!("unknown detect level '{}'", other)),
        }
    }
}

/// Inference-related settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    /// Inference backend
    pub backend: InferenceBackend,
    /// Detector input resolution
    pub detect_level: DetectLevel,
    /// Include plate vertices in results
    pub full_result: bool,
    /// ONNX Runtime intra-op threads
    pub intra_threads: usize,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            backend: InferenceBackend::OnnxRuntime,
            detect_level: DetectLevel::Low,
            full_result: false,
            intra_threads: 4,
        }
    }
}

/// Model location settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Model root folder; the platform data directory when unset
    pub folder: Option<PathBuf>,
    /// Never download missing models
    pub offline: bool,
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path)?;
    let config: AppConfig = toml::from_str(&content)?;
    Ok(config)
}

/// Save configuration to file
pub fn save_config(config: &AppConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}
