//! Object stores the model archive can be fetched from.

use std::path::PathBuf;

use async_trait::async_trait;
use aws_sdk_s3::error::DisplayErrorContext;
use log::debug;

use crate::error::InitError;

/// Source of the packaged model archive
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Fetch the whole object stored under `key`
    async fn fetch(&self, key: &str) -> Result<Vec<u8>, InitError>;

    /// Human readable location of `key`, for logs and errors
    fn location(&self, key: &str) -> String;
}

/// Amazon S3 bucket
pub struct S3Store {
    client: aws_sdk_s3::Client,
    bucket: String,
}

impl S3Store {
    pub fn new(client: aws_sdk_s3::Client, bucket: &str) -> Self {
        S3Store {
            client,
            bucket: bucket.to_owned(),
        }
    }

    /// Client configured from the Lambda execution role and region
    pub async fn from_env(bucket: &str) -> Self {
        let sdk_config = aws_config::load_from_env().await;

        Self::new(aws_sdk_s3::Client::new(&sdk_config), bucket)
    }
}

#[async_trait]
impl ArtifactStore for S3Store {
    async fn fetch(&self, key: &str) -> Result<Vec<u8>, InitError> {
        let storage_error = |reason: String| InitError::Storage {
            location: self.location(key),
            reason,
        };

        let object = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| storage_error(DisplayErrorContext(&e).to_string()))?;

        let data = object
            .body
            .collect()
            .await
            .map_err(|e| storage_error(e.to_string()))?;

        Ok(data.into_bytes().to_vec())
    }

    fn location(&self, key: &str) -> String {
        format!("s3://{}/{}", self.bucket, key)
    }
}

/// Directory on the local filesystem. Keys are paths relative to the root;
/// an empty root resolves them against the working directory.
#[derive(Debug, Default)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new(root: PathBuf) -> Self {
        LocalStore { root }
    }
}

#[async_trait]
impl ArtifactStore for LocalStore {
    async fn fetch(&self, key: &str) -> Result<Vec<u8>, InitError> {
        let path = self.root.join(key);
        debug!("Reading model archive from {}", path.display());

        std::fs::read(&path).map_err(|e| InitError::Storage {
            location: self.location(key),
            reason: e.to_string(),
        })
    }

    fn location(&self, key: &str) -> String {
        self.root.join(key).display().to_string()
    }
}
