//! Turns a prompt into stored images and updated usage stats.

use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use thiserror::Error;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::clients::generation::{
    GeneratedImage, GenerationRequest, ImageGenerator, ModelDescriptor,
};
use crate::config::GenerationConfig;
use crate::db::{NewImage, Store, UsageStats, User};
use crate::entities::images;
use crate::services::metrics::{ErrorType, Metrics};
use crate::services::notification::Notifier;
use crate::services::storage::{Backend, StorageService};

const IMAGE_CONTENT_TYPE: &str = "image/png";

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Upstream(String),

    #[error("Server error: {0}")]
    Transaction(String),
}

/// Body of a generation submission. Missing options fall back to configured defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GenerateRequest {
    pub prompt: Option<String>,
    pub model: Option<String>,
    pub size: Option<String>,
    pub quality: Option<String>,
}

#[derive(Debug)]
pub struct GenerationOutcome {
    pub images: Vec<images::Model>,
    pub stats: UsageStats,
}

pub struct GenerationService {
    store: Store,
    generator: Arc<dyn ImageGenerator>,
    storage: Arc<StorageService>,
    notifier: Notifier,
    metrics: Metrics,
    defaults: GenerationConfig,
}

impl GenerationService {
    #[must_use]
    pub fn new(
        store: Store,
        generator: Arc<dyn ImageGenerator>,
        storage: Arc<StorageService>,
        notifier: Notifier,
        metrics: Metrics,
        defaults: GenerationConfig,
    ) -> Self {
        Self {
            store,
            generator,
            storage,
            notifier,
            metrics,
            defaults,
        }
    }

    #[must_use]
    pub const fn defaults(&self) -> &GenerationConfig {
        &self.defaults
    }

    pub async fn list_models(&self) -> Vec<ModelDescriptor> {
        self.generator.list_models().await
    }

    #[instrument(skip(self, user, request), fields(user_id = user.id))]
    pub async fn submit(
        &self,
        user: &User,
        request: GenerateRequest,
    ) -> Result<GenerationOutcome, GenerationError> {
        let Some(prompt) = request.prompt.filter(|p| !p.is_empty()) else {
            return Err(GenerationError::Validation("Prompt is required".to_string()));
        };

        let upstream_request = GenerationRequest {
            model: request
                .model
                .unwrap_or_else(|| self.defaults.default_model.clone()),
            prompt,
            size: request
                .size
                .unwrap_or_else(|| self.defaults.default_size.clone()),
            quality: request
                .quality
                .unwrap_or_else(|| self.defaults.default_quality.clone()),
            n: 1,
        };

        let Some(result) = self.generator.generate(&upstream_request).await else {
            self.metrics
                .record_generation(false, &upstream_request.model);
            return Err(GenerationError::Upstream(
                "Failed to generate image".to_string(),
            ));
        };

        let new_images = self.persist_entries(&upstream_request, &result.data).await;

        let (images, stats) = match self.store.save_generation(user.id, new_images).await {
            Ok(saved) => saved,
            Err(e) => {
                warn!(error = %e, "Generation transaction rolled back");
                self.metrics.record_error(ErrorType::Generation);
                return Err(GenerationError::Transaction(format!("{e:#}")));
            }
        };

        self.metrics.record_generation(true, &upstream_request.model);
        self.notifier.generation_complete(&upstream_request.prompt);

        info!(
            model = %upstream_request.model,
            saved = images.len(),
            "Generation completed"
        );

        Ok(GenerationOutcome { images, stats })
    }

    /// Stores each usable entry. Entries that fail to resolve or persist are skipped.
    async fn persist_entries(
        &self,
        request: &GenerationRequest,
        entries: &[GeneratedImage],
    ) -> Vec<NewImage> {
        let timestamp = Utc::now().format("%Y%m%d_%H%M%S").to_string();
        let mut saved = Vec::with_capacity(entries.len());

        for (i, entry) in entries.iter().enumerate() {
            let Some(source) = entry.source() else {
                continue;
            };

            let filename = image_filename(&timestamp, i);

            let bytes = match self.storage.resolve_source(&source).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!(filename = %filename, error = %e, "Skipping generated image");
                    continue;
                }
            };

            let persisted = match self
                .storage
                .persist(&bytes, &filename, IMAGE_CONTENT_TYPE)
                .await
            {
                Ok(persisted) => persisted,
                Err(e) => {
                    warn!(filename = %filename, error = %e, "Skipping generated image");
                    continue;
                }
            };

            let (storage_key, public_url) = match persisted.backend {
                Backend::ObjectStorage => (Some(persisted.key), Some(persisted.url)),
                Backend::Local => (None, None),
            };

            saved.push(NewImage {
                prompt: request.prompt.clone(),
                model: request.model.clone(),
                filename,
                storage_key,
                public_url,
                size: request.size.clone(),
                quality: request.quality.clone(),
            });
        }

        saved
    }
}

fn image_filename(timestamp: &str, index: usize) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{timestamp}_{}_{}.png", &suffix[..8], index + 1)
}
