use axum::{
    Router,
    http::HeaderValue,
    middleware,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tower_sessions::{Expiry, MemoryStore, SessionManagerLayer};

use crate::config::Config;
use crate::db::Store;
use crate::services::{AuthService, GenerationService, Metrics, Notifier, StorageService};
use crate::state::{Components, SharedState};

pub mod auth;
mod error;
pub mod flash;
mod generate;
mod media;
mod observability;
mod pages;
mod types;

pub use auth::Principal;
pub use error::ApiError;
pub use types::*;

use metrics_exporter_prometheus::PrometheusHandle;

#[derive(Clone)]
pub struct AppState {
    pub shared: Arc<SharedState>,

    pub prometheus_handle: Option<PrometheusHandle>,
}

impl AppState {
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.shared.config
    }

    #[must_use]
    pub fn store(&self) -> &Store {
        &self.shared.store
    }

    #[must_use]
    pub fn auth(&self) -> &Arc<dyn AuthService> {
        &self.shared.auth_service
    }

    #[must_use]
    pub fn generation(&self) -> &Arc<GenerationService> {
        &self.shared.generation
    }

    #[must_use]
    pub fn storage(&self) -> &Arc<StorageService> {
        &self.shared.storage
    }

    #[must_use]
    pub fn metrics(&self) -> Metrics {
        self.shared.metrics
    }

    #[must_use]
    pub fn notifier(&self) -> &Notifier {
        &self.shared.notifier
    }
}

#[must_use]
pub fn create_app_state(
    shared: Arc<SharedState>,
    prometheus_handle: Option<PrometheusHandle>,
) -> Arc<AppState> {
    Arc::new(AppState {
        shared,
        prometheus_handle,
    })
}

pub async fn create_app_state_from_config(
    config: Config,
    prometheus_handle: Option<PrometheusHandle>,
) -> anyhow::Result<Arc<AppState>> {
    let shared = Arc::new(SharedState::new(config).await?);
    Ok(create_app_state(shared, prometheus_handle))
}

/// Same as [`create_app_state_from_config`] with caller-supplied external clients.
pub async fn create_app_state_with(
    config: Config,
    components: Components,
    prometheus_handle: Option<PrometheusHandle>,
) -> anyhow::Result<Arc<AppState>> {
    let shared = Arc::new(SharedState::with_components(config, components).await?);
    Ok(create_app_state(shared, prometheus_handle))
}

pub fn router(state: Arc<AppState>) -> Router {
    let server = &state.config().server;

    let session_layer = SessionManagerLayer::new(MemoryStore::default())
        .with_secure(server.secure_cookies)
        .with_same_site(tower_sessions::cookie::SameSite::Lax)
        .with_expiry(Expiry::OnInactivity(time::Duration::minutes(
            server.session_inactivity_minutes,
        )));

    let cors_layer = if server.cors_allowed_origins.iter().any(|o| o == "*") {
        CorsLayer::new().allow_origin(Any)
    } else {
        let origins: Vec<HeaderValue> = server
            .cors_allowed_origins
            .iter()
            .filter_map(|s| s.parse().ok())
            .collect();
        CorsLayer::new().allow_origin(origins)
    };

    let public_routes = Router::new()
        .route("/", get(pages::index))
        .route("/register", get(auth::register_page).post(auth::register))
        .route("/login", get(auth::login_page).post(auth::login));

    Router::new()
        .merge(public_routes)
        .merge(create_protected_router(state.clone()))
        .route_layer(middleware::from_fn(observability::track_request))
        .layer(session_layer)
        .with_state(state)
        .layer(cors_layer.allow_methods(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http())
}

fn create_protected_router(state: Arc<AppState>) -> Router<Arc<AppState>> {
    let admin_routes = Router::new()
        .route("/admin", get(pages::admin))
        .route("/admin/users/{id}/delete", post(pages::delete_user))
        .route("/metrics", get(observability::get_metrics))
        .route_layer(middleware::from_fn(auth::require_admin));

    Router::new()
        .route("/logout", get(auth::logout))
        .route("/dashboard", get(pages::dashboard))
        .route("/generate", get(pages::generate))
        .route("/gallery", get(pages::gallery))
        .route("/api/models", get(generate::list_models))
        .route("/api/generate", post(generate::submit))
        .route("/api/user/stats", get(generate::user_stats))
        .route("/api/storage-info", get(generate::storage_info))
        .route("/media/{filename}", get(media::serve_media))
        .merge(admin_routes)
        .route_layer(middleware::from_fn_with_state(state, auth::require_login))
}
