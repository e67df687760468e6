//! Best-effort application counters and timers.
//!
//! Everything goes through the `metrics` facade: with no recorder installed the
//! calls are no-ops, so emitting can never fail a request.

use std::time::Duration;

/// Source of an application error, recorded as the `error_type` label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorType {
    ObjectUpload,
    ImageFetch,
    ImageDecode,
    LocalWrite,
    ApiModels,
    ApiGeneration,
    Generation,
    Registration,
    Gallery,
}

impl ErrorType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ObjectUpload => "S3Upload",
            Self::ImageFetch => "ImageSave",
            Self::ImageDecode => "Base64Save",
            Self::LocalWrite => "LocalWrite",
            Self::ApiModels => "APIModels",
            Self::ApiGeneration => "APIGeneration",
            Self::Generation => "Generation",
            Self::Registration => "Registration",
            Self::Gallery => "Gallery",
        }
    }
}

/// Handle passed to the components that emit domain metrics.
#[derive(Debug, Clone, Copy)]
pub struct Metrics {
    enabled: bool,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new(true)
    }
}

impl Metrics {
    #[must_use]
    pub const fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    #[must_use]
    pub const fn disabled() -> Self {
        Self::new(false)
    }

    pub fn record_registration(&self) {
        if self.enabled {
            metrics::counter!("user_registrations_total").increment(1);
        }
    }

    pub fn record_login(&self) {
        if self.enabled {
            metrics::counter!("user_logins_total").increment(1);
        }
    }

    pub fn record_generation(&self, success: bool, model: &str) {
        if self.enabled {
            let status = if success { "success" } else { "failed" };
            metrics::counter!(
                "image_generations_total",
                "status" => status,
                "model" => model.to_string()
            )
            .increment(1);
        }
    }

    pub fn record_error(&self, error_type: ErrorType) {
        tracing::debug!(error_type = error_type.as_str(), "Recording application error");
        if self.enabled {
            metrics::counter!("application_errors_total", "error_type" => error_type.as_str())
                .increment(1);
        }
    }

    /// Upstream generation API latency, recorded whether or not the call succeeded.
    pub fn record_api_latency(&self, elapsed: Duration) {
        if self.enabled {
            metrics::histogram!("api_response_time_ms").record(elapsed.as_secs_f64() * 1000.0);
        }
    }
}
