//! Deployment settings, read once from the process environment at cold start.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use config::{Config, Environment};
use serde::Deserialize;

use crate::archive::ExtractStrategy;
use crate::error::InitError;

/// Serialization format of the model member inside the archive
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ModelFormat {
    /// ONNX graph, run with tract
    #[default]
    Onnx,
    /// TorchScript module, run with libtorch
    Torchscript,
}

impl FromStr for ModelFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "onnx" => Ok(ModelFormat::Onnx),
            "torchscript" | "torch" => Ok(ModelFormat::Torchscript),
            other => Err(format!("unknown model format '{}'", other)),
        }
    }
}

impl fmt::Display for ModelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelFormat::Onnx => f.write_str("onnx"),
            ModelFormat::Torchscript => f.write_str("torchscript"),
        }
    }
}

/// Where the fetched archive is unpacked
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExtractMode {
    #[default]
    Memory,
    Disk,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Bucket holding the model archive (`MODEL_BUCKET`)
    pub model_bucket: String,

    /// Object key of the model archive (`MODEL_KEY`)
    pub model_key: String,

    /// `MODEL_FORMAT`, `onnx` unless set
    #[serde(default)]
    pub model_format: ModelFormat,

    /// `MODEL_EXTRACT`, `memory` unless set
    #[serde(default)]
    pub model_extract: ExtractMode,

    /// Extraction directory used by the disk strategy (`MODEL_DIR`)
    #[serde(default = "default_model_dir")]
    pub model_dir: PathBuf,
}

fn default_model_dir() -> PathBuf {
    PathBuf::from("/tmp/model")
}

impl Settings {
    pub fn from_env() -> Result<Self, InitError> {
        Self::from_source(Environment::default())
    }

    fn from_source(env: Environment) -> Result<Self, InitError> {
        let settings = Config::builder()
            .add_source(env)
            .build()?
            .try_deserialize()?;

        Ok(settings)
    }

    pub fn extract_strategy(&self) -> ExtractStrategy {
        match self.model_extract {
            ExtractMode::Memory => ExtractStrategy::InMemory,
            ExtractMode::Disk => ExtractStrategy::Disk(self.model_dir.clone()),
        }
    }
}
