use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::clients::generation::{GenerationClient, ImageGenerator};
use crate::clients::notifier::{NotificationPublisher, SnsPublisher};
use crate::clients::object_store::{ObjectStore, S3ObjectStore};
use crate::config::Config;
use crate::db::Store;
use crate::services::{
    AuthService, GenerationService, Metrics, Notifier, SeaOrmAuthService, StorageService,
};

/// Build a shared HTTP client for the generation API and image downloads.
/// A zero timeout leaves requests unbounded.
fn build_shared_http_client(timeout_seconds: u64) -> anyhow::Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder()
        .user_agent("imagegen/1.0")
        .pool_max_idle_per_host(10);

    if timeout_seconds > 0 {
        builder = builder.timeout(Duration::from_secs(timeout_seconds));
    }

    builder
        .build()
        .map_err(|e| anyhow::anyhow!("Failed to build shared HTTP client: {e}"))
}

/// External collaborators. Production builds them from config; tests pass stubs.
pub struct Components {
    pub generator: Arc<dyn ImageGenerator>,
    pub object_store: Option<Arc<dyn ObjectStore>>,
    pub publisher: Option<Arc<dyn NotificationPublisher>>,
}

#[derive(Clone)]
pub struct SharedState {
    pub config: Arc<Config>,

    pub store: Store,

    pub metrics: Metrics,

    pub notifier: Notifier,

    pub auth_service: Arc<dyn AuthService>,

    pub storage: Arc<StorageService>,

    pub generation: Arc<GenerationService>,
}

impl SharedState {
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let http_client = build_shared_http_client(config.generation.request_timeout_seconds)?;
        let metrics = Metrics::new(config.observability.metrics_enabled);

        let generator = Arc::new(GenerationClient::new(
            http_client.clone(),
            config.generation.base_url.clone(),
            config.generation.api_key.clone(),
            metrics,
        )) as Arc<dyn ImageGenerator>;

        let object_store = if config.storage.object_storage_active() {
            let store =
                S3ObjectStore::from_env(config.storage.bucket.clone(), &config.storage.region)
                    .await;
            Some(Arc::new(store) as Arc<dyn ObjectStore>)
        } else {
            if config.storage.use_object_storage {
                warn!("Object storage enabled without a bucket, using local storage");
            }
            None
        };

        let publisher = if config.notifications.enabled() {
            let publisher = SnsPublisher::from_env(
                config.notifications.topic_arn.clone(),
                &config.notifications.region,
            )
            .await;
            Some(Arc::new(publisher) as Arc<dyn NotificationPublisher>)
        } else {
            None
        };

        Self::assemble(
            config,
            http_client,
            metrics,
            Components {
                generator,
                object_store,
                publisher,
            },
        )
        .await
    }

    pub async fn with_components(config: Config, components: Components) -> anyhow::Result<Self> {
        let http_client = build_shared_http_client(config.generation.request_timeout_seconds)?;
        let metrics = Metrics::new(config.observability.metrics_enabled);
        Self::assemble(config, http_client, metrics, components).await
    }

    async fn assemble(
        config: Config,
        http_client: reqwest::Client,
        metrics: Metrics,
        components: Components,
    ) -> anyhow::Result<Self> {
        let store = Store::with_pool_options(
            &config.general.database_path,
            config.general.max_db_connections,
            config.general.min_db_connections,
        )
        .await?;

        let storage = Arc::new(StorageService::new(
            config.storage.clone(),
            config.general.media_path.clone(),
            components.object_store,
            http_client,
            metrics,
        ));
        let notifier = Notifier::new(components.publisher);

        let auth_service = Arc::new(SeaOrmAuthService::new(
            store.clone(),
            config.security.clone(),
        )) as Arc<dyn AuthService>;

        let generation = Arc::new(GenerationService::new(
            store.clone(),
            components.generator,
            storage.clone(),
            notifier.clone(),
            metrics,
            config.generation.clone(),
        ));

        let info = storage.info();
        info!(
            storage_type = info.storage_type,
            notifications = notifier.is_enabled(),
            "Application state initialized"
        );

        Ok(Self {
            config: Arc::new(config),
            store,
            metrics,
            notifier,
            auth_service,
            storage,
            generation,
        })
    }
}
