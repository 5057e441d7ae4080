//! Test doubles for the storage, fetch and backend seams.

use std::collections::HashMap;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use flate2::write::GzEncoder;
use flate2::Compression;
use image::{DynamicImage, ImageOutputFormat};
use ndarray::{Array4, Axis};

use crate::backend::{ImageModel, ModelBackend};
use crate::error::{InferenceError, InitError, InputError};
use crate::loader::InferenceState;
use crate::preprocess::{HttpImageFetcher, ImageFetcher};
use crate::store::ArtifactStore;

fn build<W: std::io::Write>(writer: W, members: &[(&str, &[u8])]) -> W {
    let mut builder = tar::Builder::new(writer);
    for (name, data) in members {
        let mut header = tar::Header::new_gnu();
        header.set_entry_type(tar::EntryType::Regular);
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        builder.append_data(&mut header, name, *data).unwrap();
    }
    builder.into_inner().unwrap()
}

pub fn tar(members: &[(&str, &[u8])]) -> Vec<u8> {
    build(Vec::new(), members)
}

pub fn tar_gz(members: &[(&str, &[u8])]) -> Vec<u8> {
    build(GzEncoder::new(Vec::new(), Compression::default()), members)
        .finish()
        .unwrap()
}

pub fn png(image: &DynamicImage) -> Vec<u8> {
    let mut buf = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut buf), ImageOutputFormat::Png)
        .unwrap();
    buf
}

/// Serves one archive and counts how often it was fetched
pub struct CountingStore {
    archive: Option<Vec<u8>>,
    fetches: Arc<AtomicUsize>,
}

impl CountingStore {
    pub fn new(archive: Vec<u8>) -> Self {
        CountingStore {
            archive: Some(archive),
            fetches: Arc::default(),
        }
    }

    pub fn failing() -> Self {
        CountingStore {
            archive: None,
            fetches: Arc::default(),
        }
    }

    pub fn fetches(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.fetches)
    }
}

#[async_trait]
impl ArtifactStore for CountingStore {
    async fn fetch(&self, key: &str) -> Result<Vec<u8>, InitError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);

        self.archive.clone().ok_or_else(|| InitError::Storage {
            location: self.location(key),
            reason: "connection refused".into(),
        })
    }

    fn location(&self, key: &str) -> String {
        format!("mem://{}", key)
    }
}

/// Serves canned images, falling back to real HTTP for unknown URLs
#[derive(Default)]
pub struct StaticFetcher {
    images: HashMap<String, Vec<u8>>,
    http: HttpImageFetcher,
}

impl StaticFetcher {
    pub fn with(mut self, url: &str, data: Vec<u8>) -> Self {
        self.images.insert(url.to_owned(), data);
        self
    }
}

#[async_trait]
impl ImageFetcher for StaticFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, InputError> {
        match self.images.get(url) {
            Some(data) => Ok(data.clone()),
            None => self.http.fetch(url).await,
        }
    }
}

/// Loads two-class models that score "red" against "blue" pixels.
/// Member contents `corrupt` fail to load, `drift` load a model whose
/// output grows past the class list once it sees a real image, `nan` load a
/// model that scores every image NaN.
pub struct ChannelBackend;

impl ModelBackend for ChannelBackend {
    fn model_suffix(&self) -> &'static str {
        "_jit.pth"
    }

    fn load(&self, name: &str, data: &[u8]) -> Result<Box<dyn ImageModel>, InitError> {
        match data {
            b"corrupt" => Err(InitError::Model {
                name: name.to_owned(),
                reason: "not a TorchScript archive".into(),
            }),
            b"drift" => Ok(Box::new(DriftingModel)),
            b"nan" => Ok(Box::new(FixedModel(vec![f32::NAN, f32::NAN]))),
            _ => Ok(Box::new(ChannelModel)),
        }
    }
}

struct ChannelModel;

impl ImageModel for ChannelModel {
    fn forward(&self, input: &Array4<f32>) -> Result<Vec<f32>, InferenceError> {
        let mean = |c| input.index_axis(Axis(1), c).mean().unwrap_or(0.0);

        Ok(vec![mean(0), mean(2)])
    }
}

struct DriftingModel;

impl ImageModel for DriftingModel {
    fn forward(&self, input: &Array4<f32>) -> Result<Vec<f32>, InferenceError> {
        if input.iter().all(|v| *v == 0.0) {
            Ok(vec![0.0, 0.0])
        } else {
            Ok(vec![0.0, 0.0, 5.0])
        }
    }
}

/// Returns the same scores for every input
pub struct FixedModel(Vec<f32>);

impl FixedModel {
    pub fn state(scores: Vec<f32>, labels: &[&str]) -> InferenceState {
        let labels = labels.iter().map(|l| l.to_string()).collect();

        InferenceState::new(Box::new(FixedModel(scores)), labels).unwrap()
    }
}

impl ImageModel for FixedModel {
    fn forward(&self, _input: &Array4<f32>) -> Result<Vec<f32>, InferenceError> {
        Ok(self.0.clone())
    }
}
