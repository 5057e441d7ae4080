//! Error taxonomy of the classifier.
//!
//! Initialization errors are fatal for the execution environment. Input and
//! inference errors belong to a single request.

use crate::config::ModelFormat;

/// Failure while bringing the environment from "nothing loaded" to "ready".
#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Could not fetch model archive from {location}: {reason}")]
    Storage { location: String, reason: String },

    #[error("Could not read model archive: {0}")]
    Archive(#[from] std::io::Error),

    #[error("Model archive has no {role} member ending in '{suffix}'")]
    MissingMember { role: &'static str, suffix: String },

    #[error("Model archive has more than one {role} member: {candidates:?}")]
    AmbiguousMember {
        role: &'static str,
        candidates: Vec<String>,
    },

    #[error("Class list is not valid UTF-8: {0}")]
    Labels(#[from] std::str::Utf8Error),

    #[error("Class list is empty")]
    EmptyLabels,

    #[error("Model format {0:?} is not compiled into this build")]
    BackendUnavailable(ModelFormat),

    #[error("Could not load model '{name}': {reason}")]
    Model { name: String, reason: String },

    #[error("Model produces {outputs} scores but the class list has {labels} entries")]
    LabelMismatch { outputs: usize, labels: usize },
}

/// Failure turning a request body into an input tensor.
#[derive(Debug, thiserror::Error)]
pub enum InputError {
    #[error("Request has no body")]
    MissingBody,

    #[error("Request body is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Request body is not valid UTF-8")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("Request body is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Request body has no 'url' string")]
    MissingUrl,

    #[error("Could not fetch image: {0}")]
    Fetch(#[from] reqwest::Error),

    #[error("Could not decode image: {0}")]
    Decode(#[from] image::ImageError),

    #[error("Image has no pixels")]
    EmptyImage,
}

/// Failure while running the model on a prepared tensor.
#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    #[error("Inference failed: {0}")]
    Backend(String),

    #[error("Model produced no scores")]
    EmptyOutput,

    #[error("Model produced a non-finite score at index {0}")]
    NonFinite(usize),

    #[error("Predicted index {index} is outside the class list of {labels} entries")]
    LabelOutOfRange { index: usize, labels: usize },
}

impl InferenceError {
    /// An out-of-range label means the loaded artifact is inconsistent, which
    /// no retry of the request can fix.
    pub fn is_fatal(&self) -> bool {
        matches!(self, InferenceError::LabelOutOfRange { .. })
    }
}

/// Per-request failure.
#[derive(Debug, thiserror::Error)]
pub enum ClassifyError {
    #[error(transparent)]
    Input(#[from] InputError),

    #[error(transparent)]
    Inference(#[from] InferenceError),
}

impl ClassifyError {
    /// HTTP status reported to the caller for this failure
    pub fn status_code(&self) -> u16 {
        match self {
            ClassifyError::Input(_) => 400,
            ClassifyError::Inference(_) => 500,
        }
    }

    pub fn is_fatal(&self) -> bool {
        match self {
            ClassifyError::Input(_) => false,
            ClassifyError::Inference(e) => e.is_fatal(),
        }
    }
}

/// Error surfaced to the hosting runtime instead of a shaped response.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error("Environment initialization failed: {0}")]
    Init(#[from] InitError),

    #[error("Classification failure: {0}")]
    Classify(#[from] ClassifyError),

    #[error("Could not encode response: {0}")]
    Encode(#[from] serde_json::Error),
}
