use std::time::Instant;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::services::metrics::{ErrorType, Metrics};

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected status {status}: {body}")]
    Status { status: StatusCode, body: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelDescriptor {
    #[serde(default)]
    pub id: String,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ModelList {
    #[serde(default)]
    data: Vec<ModelDescriptor>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GenerationRequest {
    pub model: String,
    pub prompt: String,
    pub size: String,
    pub quality: String,
    pub n: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerationResult {
    #[serde(default)]
    pub data: Vec<GeneratedImage>,
}

/// One entry of a generation response: a URL to fetch or inline base64 bytes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeneratedImage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub b64_json: Option<String>,
}

/// Where the bytes of a generated image come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    Remote(String),
    Inline(String),
}

impl GeneratedImage {
    #[must_use]
    pub fn inline(b64: impl Into<String>) -> Self {
        Self {
            url: None,
            b64_json: Some(b64.into()),
        }
    }

    #[must_use]
    pub fn remote(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            b64_json: None,
        }
    }

    /// `None` for entries carrying neither shape. A URL wins over inline data.
    #[must_use]
    pub fn source(&self) -> Option<ImageSource> {
        if let Some(url) = &self.url {
            return Some(ImageSource::Remote(url.clone()));
        }
        self.b64_json.clone().map(ImageSource::Inline)
    }
}

/// The external image-generation API.
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    /// Available models. Failures degrade to an empty list.
    async fn list_models(&self) -> Vec<ModelDescriptor>;

    /// `None` when the upstream call fails for any reason.
    async fn generate(&self, request: &GenerationRequest) -> Option<GenerationResult>;
}

#[derive(Clone)]
pub struct GenerationClient {
    client: Client,
    base_url: String,
    api_key: String,
    metrics: Metrics,
}

impl GenerationClient {
    #[must_use]
    pub fn new(
        client: Client,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        metrics: Metrics,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            metrics,
        }
    }

    async fn fetch_models(&self) -> Result<Vec<ModelDescriptor>, GatewayError> {
        let url = format!("{}/v1/models", self.base_url);

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.api_key)
            .send()
            .await?;

        let response = check_status(response).await?;
        let models: ModelList = response.json().await?;
        Ok(models.data)
    }

    async fn request_generation(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationResult, GatewayError> {
        let url = format!("{}/v1/images/generations", self.base_url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await?;

        let response = check_status(response).await?;
        Ok(response.json().await?)
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, GatewayError> {
    let status = response.status();
    if status == StatusCode::OK {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let body = body.chars().take(200).collect();
    Err(GatewayError::Status { status, body })
}

#[async_trait]
impl ImageGenerator for GenerationClient {
    async fn list_models(&self) -> Vec<ModelDescriptor> {
        match self.fetch_models().await {
            Ok(models) => models,
            Err(e) => {
                warn!(error = %e, "Failed to fetch models");
                self.metrics.record_error(ErrorType::ApiModels);
                Vec::new()
            }
        }
    }

    async fn generate(&self, request: &GenerationRequest) -> Option<GenerationResult> {
        let start = Instant::now();
        let result = self.request_generation(request).await;
        self.metrics.record_api_latency(start.elapsed());

        match result {
            Ok(result) => {
                debug!(
                    model = %request.model,
                    images = result.data.len(),
                    elapsed_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
                    "Generation API returned"
                );
                Some(result)
            }
            Err(e) => {
                warn!(model = %request.model, error = %e, "Image generation failed");
                self.metrics.record_error(ErrorType::ApiGeneration);
                None
            }
        }
    }
}
