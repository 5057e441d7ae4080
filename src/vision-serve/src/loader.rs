//! Cold-start model loading.

use log::info;
use ndarray::Array4;

use crate::archive::{self, ExtractStrategy};
use crate::backend::{backend_for, ImageModel, ModelBackend};
use crate::config::Settings;
use crate::error::InitError;
use crate::preprocess::CROP_SIZE;
use crate::store::ArtifactStore;
use crate::timer::Timer;

/// The loaded model and its index-aligned class labels. Immutable once built.
pub struct InferenceState {
    model: Box<dyn ImageModel>,
    labels: Vec<String>,
}

impl InferenceState {
    /// Bind a model to its labels, checking with a forward pass on a blank
    /// input that the model emits one score per label.
    pub fn new(model: Box<dyn ImageModel>, labels: Vec<String>) -> Result<Self, InitError> {
        if labels.is_empty() {
            return Err(InitError::EmptyLabels);
        }

        let side = CROP_SIZE as usize;
        let blank = Array4::zeros((1, 3, side, side));
        let outputs = model
            .forward(&blank)
            .map_err(|e| InitError::Model {
                name: "warm-up".into(),
                reason: e.to_string(),
            })?
            .len();

        if outputs != labels.len() {
            return Err(InitError::LabelMismatch {
                outputs,
                labels: labels.len(),
            });
        }

        Ok(InferenceState { model, labels })
    }

    pub fn model(&self) -> &dyn ImageModel {
        self.model.as_ref()
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }
}

/// Fetches, extracts and deserializes the model archive
pub struct ModelLoader {
    store: Box<dyn ArtifactStore>,
    backend: Box<dyn ModelBackend>,
    key: String,
    strategy: ExtractStrategy,
}

impl ModelLoader {
    pub fn new(
        store: Box<dyn ArtifactStore>,
        backend: Box<dyn ModelBackend>,
        key: &str,
        strategy: ExtractStrategy,
    ) -> Self {
        ModelLoader {
            store,
            backend,
            key: key.to_owned(),
            strategy,
        }
    }

    pub fn from_settings(
        settings: &Settings,
        store: Box<dyn ArtifactStore>,
    ) -> Result<Self, InitError> {
        let backend = backend_for(settings.model_format)?;

        Ok(Self::new(
            store,
            backend,
            &settings.model_key,
            settings.extract_strategy(),
        ))
    }

    pub async fn load(&self) -> Result<InferenceState, InitError> {
        info!("Loading model from {}", self.store.location(&self.key));

        let mut t = Timer::start("Fetching model archive");
        let data = self.store.fetch(&self.key).await?;
        t.stop();

        let mut t = Timer::start("Extracting model archive");
        let members = archive::extract(&data, &self.strategy, self.backend.model_suffix())?;
        t.stop();

        info!("Getting classes from {}", members.labels_name);
        let labels = archive::parse_labels(&members.labels)?;
        info!("Classes are {:?}", labels);

        info!("Model path is {}", members.model_name);
        let mut t = Timer::start("Deserializing model");
        let model = self.backend.load(&members.model_name, &members.model)?;
        t.stop();

        InferenceState::new(model, labels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{tar_gz, ChannelBackend, CountingStore};

    fn loader(archive: Vec<u8>) -> ModelLoader {
        ModelLoader::new(
            Box::new(CountingStore::new(archive)),
            Box::new(ChannelBackend),
            "models/resnet.tar.gz",
            ExtractStrategy::InMemory,
        )
    }

    #[tokio::test]
    async fn loads_model_and_labels() {
        let archive = tar_gz(&[("resnet_jit.pth", b"graph"), ("classes.txt", b"cat\ndog")]);

        let state = loader(archive).load().await.unwrap();

        assert_eq!(state.labels(), &["cat", "dog"]);
    }

    #[tokio::test]
    async fn label_count_must_match_model_output() {
        let archive = tar_gz(&[
            ("resnet_jit.pth", b"graph"),
            ("classes.txt", b"cat\ndog\nbird"),
        ]);

        let err = loader(archive).load().await.err().unwrap();

        assert!(matches!(
            err,
            InitError::LabelMismatch {
                outputs: 2,
                labels: 3
            }
        ));
    }

    #[tokio::test]
    async fn deserialization_failure_is_fatal() {
        let archive = tar_gz(&[("resnet_jit.pth", b"corrupt"), ("classes.txt", b"cat\ndog")]);

        let err = loader(archive).load().await.err().unwrap();

        assert!(matches!(err, InitError::Model { .. }));
    }

    #[tokio::test]
    async fn storage_failure_is_fatal() {
        let store = CountingStore::failing();
        let loader = ModelLoader::new(
            Box::new(store),
            Box::new(ChannelBackend),
            "models/resnet.tar.gz",
            ExtractStrategy::InMemory,
        );

        let err = loader.load().await.err().unwrap();

        assert!(matches!(err, InitError::Storage { .. }));
    }
}
