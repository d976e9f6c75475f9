//! HyperLPR - Chinese license plate recognition
//!
//! Detects plates, rectifies each one, recognizes its text and infers its type.
//! `LicensePlateCatcher` is the entry point for ONNX models; the pipelines in `pipeline` accept
//! any collaborators implementing the `vision` traits.

pub mod analysis;
pub mod catcher;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod storage;
pub mod types;
pub mod vision;

pub use catcher::LicensePlateCatcher;
pub use config::{AppConfig, DetectLevel, InferenceBackend};
pub use error::{LprError, Result};
pub use pipeline::{LegacyPipeline, MultiTaskPipeline};
pub use types::{LayerNum, Plate, PlateDict, PlateResult, PlateType};
