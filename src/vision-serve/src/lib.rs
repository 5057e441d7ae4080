//! Serverless image classification.
//!
//! A model archive is fetched from object storage once per execution
//! environment; every request then downloads an image by URL, preprocesses it
//! to a normalized (1, 3, 224, 224) tensor and returns the most probable class.

pub mod archive;
pub mod backend;
pub mod config;
pub mod error;
pub mod handler;
pub mod loader;
pub mod predict;
pub mod preprocess;
pub mod store;
pub mod timer;

#[cfg(test)]
mod testing;

pub use crate::config::{ModelFormat, Settings};
pub use crate::error::{ClassifyError, HandlerError, InferenceError, InitError, InputError};
pub use crate::handler::{ImageClassifier, InvocationEvent, InvocationResponse};
pub use crate::loader::{InferenceState, ModelLoader};
pub use crate::predict::Prediction;
pub use crate::preprocess::{HttpImageFetcher, RequestBody};
pub use crate::timer::Timer;
