//! Persistence of generated image bytes.
//!
//! Object storage is used when configured; any upload failure falls back to the
//! local media directory so a generated image is never dropped.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use base64::{Engine as _, engine::general_purpose::STANDARD};
use reqwest::StatusCode;
use serde::Serialize;
use thiserror::Error;
use tokio::fs;
use tracing::{debug, warn};

use crate::clients::generation::ImageSource;
use crate::clients::object_store::ObjectStore;
use crate::config::StorageConfig;
use crate::services::metrics::{ErrorType, Metrics};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to fetch image from {url}: {reason}")]
    Fetch { url: String, reason: String },

    #[error("invalid base64 image payload: {0}")]
    Decode(#[from] base64::DecodeError),

    #[error("failed to write {}: {source}", path.display())]
    LocalWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid media filename: {0}")]
    InvalidFilename(String),

    #[error("media file not found: {0}")]
    NotFound(String),

    #[error("failed to read media file: {0}")]
    Read(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    ObjectStorage,
    Local,
}

/// Where a persisted image ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedRef {
    pub key: String,
    pub url: String,
    pub backend: Backend,
}

#[derive(Debug, Clone, Serialize)]
pub struct StorageInfo {
    pub storage_type: &'static str,
    pub bucket_name: Option<String>,
    pub cdn_domain: Option<String>,
    pub region: Option<String>,
    pub object_store_configured: bool,
    pub use_object_storage: bool,
}

pub struct StorageService {
    config: StorageConfig,
    media_dir: PathBuf,
    object_store: Option<Arc<dyn ObjectStore>>,
    http: reqwest::Client,
    metrics: Metrics,
}

impl StorageService {
    #[must_use]
    pub fn new(
        config: StorageConfig,
        media_dir: impl Into<PathBuf>,
        object_store: Option<Arc<dyn ObjectStore>>,
        http: reqwest::Client,
        metrics: Metrics,
    ) -> Self {
        Self {
            config,
            media_dir: media_dir.into(),
            object_store,
            http,
            metrics,
        }
    }

    #[must_use]
    pub fn media_dir(&self) -> &Path {
        &self.media_dir
    }

    #[must_use]
    pub fn object_key(&self, filename: &str) -> String {
        let prefix = self.config.key_prefix.trim_matches('/');
        if prefix.is_empty() {
            filename.to_string()
        } else {
            format!("{prefix}/{filename}")
        }
    }

    /// CDN URL when a CDN domain is configured, otherwise the region-qualified bucket URL.
    #[must_use]
    pub fn public_url(&self, key: &str) -> String {
        self.config.cdn_domain().map_or_else(
            || {
                format!(
                    "https://{}.s3.{}.amazonaws.com/{key}",
                    self.config.bucket, self.config.region
                )
            },
            |domain| format!("https://{domain}/{key}"),
        )
    }

    pub async fn persist(
        &self,
        bytes: &[u8],
        filename: &str,
        content_type: &str,
    ) -> Result<PersistedRef, StorageError> {
        if let Some(store) = &self.object_store {
            let key = self.object_key(filename);
            match store.put_object(&key, bytes, content_type).await {
                Ok(()) => {
                    let url = self.public_url(&key);
                    debug!(key = %key, url = %url, "Image stored in object storage");
                    return Ok(PersistedRef {
                        key,
                        url,
                        backend: Backend::ObjectStorage,
                    });
                }
                Err(e) => {
                    warn!(key = %key, error = %e, "Object upload failed, falling back to local storage");
                    self.metrics.record_error(ErrorType::ObjectUpload);
                }
            }
        }

        self.write_local(bytes, filename).await
    }

    async fn write_local(&self, bytes: &[u8], filename: &str) -> Result<PersistedRef, StorageError> {
        let path = self.media_dir.join(filename);

        let result = async {
            fs::create_dir_all(&self.media_dir).await?;
            fs::write(&path, bytes).await
        }
        .await;

        if let Err(source) = result {
            self.metrics.record_error(ErrorType::LocalWrite);
            return Err(StorageError::LocalWrite { path, source });
        }

        debug!(path = %path.display(), "Image stored locally");
        Ok(PersistedRef {
            key: filename.to_string(),
            url: format!("/media/{filename}"),
            backend: Backend::Local,
        })
    }

    /// Produces the raw image bytes for a generated entry.
    pub async fn resolve_source(&self, source: &ImageSource) -> Result<Vec<u8>, StorageError> {
        match source {
            ImageSource::Remote(url) => self.fetch_remote(url).await.inspect_err(|_| {
                self.metrics.record_error(ErrorType::ImageFetch);
            }),
            ImageSource::Inline(payload) => decode_inline(payload).inspect_err(|_| {
                self.metrics.record_error(ErrorType::ImageDecode);
            }),
        }
    }

    async fn fetch_remote(&self, url: &str) -> Result<Vec<u8>, StorageError> {
        let fetch_error = |reason: String| StorageError::Fetch {
            url: url.to_string(),
            reason,
        };

        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| fetch_error(e.to_string()))?;

        if response.status() != StatusCode::OK {
            return Err(fetch_error(format!("status {}", response.status())));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| fetch_error(e.to_string()))?;
        Ok(bytes.to_vec())
    }

    /// Reads a locally stored image. Rejects anything that is not a bare filename.
    pub async fn open_local(&self, filename: &str) -> Result<Vec<u8>, StorageError> {
        if !is_plain_filename(filename) {
            return Err(StorageError::InvalidFilename(filename.to_string()));
        }

        match fs::read(self.media_dir.join(filename)).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(filename.to_string()))
            }
            Err(e) => Err(StorageError::Read(e)),
        }
    }

    #[must_use]
    pub fn info(&self) -> StorageInfo {
        let use_object_storage = self.config.use_object_storage;
        let some_if_used = |value: &str| {
            (use_object_storage && !value.is_empty()).then(|| value.to_string())
        };

        StorageInfo {
            storage_type: if use_object_storage {
                "Object Storage + CDN"
            } else {
                "Local Storage"
            },
            bucket_name: some_if_used(&self.config.bucket),
            cdn_domain: self.config.cdn_domain().map(str::to_string),
            region: some_if_used(&self.config.region),
            object_store_configured: self.object_store.is_some(),
            use_object_storage,
        }
    }
}

/// Decodes an inline base64 payload, dropping any `data:<mime>;base64,` prefix.
pub fn decode_inline(payload: &str) -> Result<Vec<u8>, StorageError> {
    let encoded = if payload.starts_with("data:") {
        payload.split_once(',').map_or(payload, |(_, rest)| rest)
    } else {
        payload
    };

    Ok(STANDARD.decode(encoded.trim())?)
}

fn is_plain_filename(filename: &str) -> bool {
    !filename.is_empty()
        && !filename.starts_with('.')
        && !filename.contains(['/', '\\'])
        && !filename.contains("..")
}
