//! Invocation entry point: event in, HTTP-style response out.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::OnceCell;

use crate::error::{ClassifyError, HandlerError, InitError, InputError};
use crate::loader::{InferenceState, ModelLoader};
use crate::predict::{predict, Prediction};
use crate::preprocess::{input_tensor, ImageFetcher, RequestBody};

/// API Gateway proxy event, or a direct invocation carrying only `body`
#[derive(Debug, Clone, Deserialize)]
pub struct InvocationEvent {
    #[serde(default)]
    pub body: Option<RequestBody>,

    #[serde(default, rename = "isBase64Encoded")]
    pub is_base64_encoded: bool,
}

impl InvocationEvent {
    pub fn new(body: RequestBody) -> Self {
        InvocationEvent {
            body: Some(body),
            is_base64_encoded: false,
        }
    }

    fn decoded_body(&self) -> Result<RequestBody, InputError> {
        match &self.body {
            None => Err(InputError::MissingBody),
            Some(RequestBody::Text(raw)) if self.is_base64_encoded => {
                let bytes = STANDARD.decode(raw.trim())?;
                Ok(RequestBody::Text(String::from_utf8(bytes)?))
            }
            Some(body) => Ok(body.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvocationResponse {
    #[serde(rename = "statusCode")]
    pub status_code: u16,

    /// JSON document, already encoded
    pub body: String,
}

impl InvocationResponse {
    fn ok(prediction: &Prediction) -> Result<Self, serde_json::Error> {
        Ok(InvocationResponse {
            status_code: 200,
            body: serde_json::to_string(prediction)?,
        })
    }

    fn failure(err: &ClassifyError) -> Self {
        InvocationResponse {
            status_code: err.status_code(),
            body: json!({ "error": err.to_string() }).to_string(),
        }
    }
}

/// Owns the process-wide inference state and serves classification requests.
///
/// The state is loaded at most once: concurrent first callers wait on the
/// same load, and a failed load is retried by the next caller.
pub struct ImageClassifier {
    loader: ModelLoader,
    fetcher: Box<dyn ImageFetcher>,
    state: OnceCell<InferenceState>,
}

impl ImageClassifier {
    pub fn new(loader: ModelLoader, fetcher: Box<dyn ImageFetcher>) -> Self {
        ImageClassifier {
            loader,
            fetcher,
            state: OnceCell::new(),
        }
    }

    /// The loaded model, loading it on first use
    pub async fn state(&self) -> Result<&InferenceState, InitError> {
        self.state.get_or_try_init(|| self.loader.load()).await
    }

    pub async fn classify(&self, body: &RequestBody) -> Result<Prediction, HandlerError> {
        let state = self.state().await?;

        Ok(self.run(state, body).await?)
    }

    pub async fn classify_url(&self, url: &str) -> Result<Prediction, HandlerError> {
        self.classify(&RequestBody::Json(json!({ "url": url }))).await
    }

    async fn run(
        &self,
        state: &InferenceState,
        body: &RequestBody,
    ) -> Result<Prediction, ClassifyError> {
        let input = input_tensor(self.fetcher.as_ref(), body).await?;

        Ok(predict(&input, state)?)
    }

    /// Serve one invocation.
    ///
    /// Input and inference failures become 400 and 500 responses. Failures
    /// that mean the environment itself is broken are returned as errors.
    pub async fn handle(
        &self,
        event: InvocationEvent,
    ) -> Result<InvocationResponse, HandlerError> {
        info!("Starting event");
        debug!("Received event: {:?}", event);

        let state = self.state().await?;

        let result = match event.decoded_body() {
            Ok(body) => self.run(state, &body).await,
            Err(err) => Err(err.into()),
        };

        match result {
            Ok(prediction) => {
                info!("Returning response");
                Ok(InvocationResponse::ok(&prediction)?)
            }
            Err(err) if err.is_fatal() => {
                error!("Inconsistent model state: {}", err);
                Err(err.into())
            }
            Err(err) => {
                warn!("Classification failure: '{}'", err);
                Ok(InvocationResponse::failure(&err))
            }
        }
    }
}
