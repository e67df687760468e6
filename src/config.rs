use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,

    pub server: ServerConfig,

    pub generation: GenerationConfig,

    pub storage: StorageConfig,

    pub notifications: NotificationConfig,

    pub observability: ObservabilityConfig,

    pub security: SecurityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    pub database_path: String,

    pub log_level: String,

    /// Directory for locally persisted images, served under `/media`.
    pub media_path: String,

    #[serde(default)]
    pub suppress_connection_errors: bool,

    /// Number of tokio worker threads (0 = number of CPU cores)
    pub worker_threads: usize,

    pub max_db_connections: u32,

    pub min_db_connections: u32,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            database_path: "sqlite:data/imagegen.db".to_string(),
            log_level: "info".to_string(),
            media_path: "media".to_string(),
            suppress_connection_errors: false,
            worker_threads: 0,
            max_db_connections: 10,
            min_db_connections: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,

    pub cors_allowed_origins: Vec<String>,

    /// Whether to set the Secure flag on session cookies.
    /// Set to false for local development without HTTPS.
    pub secure_cookies: bool,

    /// Sessions expire after this many minutes without a request.
    pub session_inactivity_minutes: i64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 5000,
            cors_allowed_origins: vec![
                "http://localhost:5000".to_string(),
                "http://127.0.0.1:5000".to_string(),
            ],
            secure_cookies: true,
            session_inactivity_minutes: 60 * 24,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub base_url: String,

    /// Bearer token for the generation API.
    pub api_key: String,

    pub default_model: String,

    pub default_size: String,

    pub default_quality: String,

    /// Upper bound for a single upstream call. 0 disables the timeout.
    pub request_timeout_seconds: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.infip.pro".to_string(),
            api_key: String::new(),
            default_model: "img3".to_string(),
            default_size: "1024x1024".to_string(),
            default_quality: "standard".to_string(),
            request_timeout_seconds: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub use_object_storage: bool,

    pub bucket: String,

    pub region: String,

    /// Public hostname fronting the bucket. Empty means direct bucket URLs.
    pub cdn_domain: String,

    pub key_prefix: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            use_object_storage: false,
            bucket: String::new(),
            region: "us-east-1".to_string(),
            cdn_domain: String::new(),
            key_prefix: "images".to_string(),
        }
    }
}

impl StorageConfig {
    /// Object storage is only usable when a bucket is named.
    #[must_use]
    pub fn object_storage_active(&self) -> bool {
        self.use_object_storage && !self.bucket.is_empty()
    }

    #[must_use]
    pub fn cdn_domain(&self) -> Option<&str> {
        let domain = self.cdn_domain.trim();
        (!domain.is_empty()).then_some(domain)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    /// SNS topic receiving registration and generation notices. Empty disables notifications.
    pub topic_arn: String,

    pub region: String,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            topic_arn: String::new(),
            region: "us-east-1".to_string(),
        }
    }
}

impl NotificationConfig {
    #[must_use]
    pub fn enabled(&self) -> bool {
        !self.topic_arn.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub metrics_enabled: bool,

    pub loki_enabled: bool,

    pub loki_url: String,

    pub loki_labels: std::collections::HashMap<String, String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        let mut labels = std::collections::HashMap::new();
        labels.insert("app".to_string(), "imagegen".to_string());

        Self {
            metrics_enabled: true,
            loki_enabled: false,
            loki_url: "http://localhost:3100".to_string(),
            loki_labels: labels,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Argon2 memory cost in KiB
    pub argon2_memory_cost_kib: u32,

    /// Argon2 time cost (iterations)
    pub argon2_time_cost: u32,

    pub argon2_parallelism: u32,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            argon2_memory_cost_kib: 8192,
            argon2_time_cost: 3,
            argon2_parallelism: 1,
        }
    }
}

impl Config {
    /// Loads the first config file found (or defaults), then applies `.env` and
    /// process environment overrides.
    pub fn load() -> Result<Self> {
        let _ = dotenvy::dotenv();

        let mut config = Self::load_file()?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    fn load_file() -> Result<Self> {
        for path in &Self::config_paths() {
            if path.exists() {
                info!("Loading config from: {}", path.display());
                return Self::load_from_path(path);
            }
        }

        info!("No config file found, using defaults");
        Ok(Self::default())
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Environment variables win over file values. `lookup` is injectable for tests.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("API_KEY") {
            self.generation.api_key = v;
        }
        if let Some(v) = lookup("API_BASE_URL") {
            self.generation.base_url = v;
        }
        if let Some(v) = lookup("DATABASE_URL") {
            self.general.database_path = v;
        }
        if let Some(v) = lookup("MEDIA_FOLDER") {
            self.general.media_path = v;
        }
        if let Some(v) = lookup("USE_S3") {
            self.storage.use_object_storage = v.eq_ignore_ascii_case("true");
        }
        if let Some(v) = lookup("S3_BUCKET_NAME") {
            self.storage.bucket = v;
        }
        if let Some(v) = lookup("AWS_REGION") {
            self.storage.region.clone_from(&v);
            self.notifications.region = v;
        }
        if let Some(v) = lookup("CLOUDFRONT_DOMAIN") {
            self.storage.cdn_domain = v;
        }
        if let Some(v) = lookup("SNS_TOPIC_ARN") {
            self.notifications.topic_arn = v;
        }
    }

    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Config saved to: {}", path.display());
        Ok(())
    }

    fn config_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from("config.toml")];

        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("imagegen").join("config.toml"));
        }

        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".imagegen").join("config.toml"));
        }

        paths
    }

    fn default_config_path() -> PathBuf {
        PathBuf::from("config.toml")
    }

    pub fn create_default_if_missing() -> Result<bool> {
        let path = Self::default_config_path();
        if path.exists() {
            Ok(false)
        } else {
            Self::default().save_to_path(&path)?;
            info!("Created default config file: {}", path.display());
            Ok(true)
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.generation.base_url.trim().is_empty() {
            anyhow::bail!("Generation API base URL cannot be empty");
        }

        if self.server.session_inactivity_minutes <= 0 {
            anyhow::bail!("Session inactivity must be at least one minute");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.generation.default_model, "img3");
        assert_eq!(config.generation.default_size, "1024x1024");
        assert_eq!(config.generation.default_quality, "standard");
        assert_eq!(config.storage.key_prefix, "images");
        assert!(!config.storage.object_storage_active());
        assert!(!config.notifications.enabled());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_deserialization() {
        let toml_str = r#"
            [general]
            log_level = "debug"

            [storage]
            use_object_storage = true
            bucket = "gen-images"
            cdn_domain = "  "
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.general.log_level, "debug");
        assert!(config.storage.object_storage_active());
        assert_eq!(config.storage.cdn_domain(), None);
        assert_eq!(config.storage.region, "us-east-1");
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("API_KEY", "secret"),
            ("USE_S3", "TRUE"),
            ("S3_BUCKET_NAME", "bucket"),
            ("AWS_REGION", "eu-west-1"),
            ("SNS_TOPIC_ARN", "arn:aws:sns:eu-west-1:1:topic"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_env_overrides(|k| env.get(k).map(|v| (*v).to_string()));

        assert_eq!(config.generation.api_key, "secret");
        assert!(config.storage.object_storage_active());
        assert_eq!(config.storage.region, "eu-west-1");
        assert_eq!(config.notifications.region, "eu-west-1");
        assert!(config.notifications.enabled());
    }

    #[test]
    fn test_object_storage_without_bucket_is_inactive() {
        let mut config = Config::default();
        config.storage.use_object_storage = true;
        assert!(!config.storage.object_storage_active());
    }

    #[test]
    fn test_validate_rejects_empty_base_url() {
        let mut config = Config::default();
        config.generation.base_url = String::new();
        assert!(config.validate().is_err());
    }
}
