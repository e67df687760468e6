use anyhow::{Context, Result};
use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseConnection, Statement, TransactionTrait,
};
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::entities::images;

pub mod migrator;
pub mod repositories;

pub use repositories::image::NewImage;
pub use repositories::stats::UsageStats;
pub use repositories::user::{NewUser, User};

#[derive(Clone)]
pub struct Store {
    pub conn: DatabaseConnection,
}

impl Store {
    pub async fn new(db_url: &str) -> Result<Self> {
        Self::with_pool_options(db_url, 5, 1).await
    }

    pub async fn with_pool_options(
        db_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self> {
        use sea_orm_migration::MigratorTrait;

        let in_memory = db_url.contains(":memory:");

        if !in_memory {
            let path_str = db_url.trim_start_matches("sqlite:").trim_start_matches("//");
            let path_str = path_str.split('?').next().unwrap_or(path_str);
            if let Some(parent) = Path::new(path_str).parent() {
                tokio::fs::create_dir_all(parent).await.ok();
            }
            if !Path::new(path_str).exists() {
                std::fs::File::create(path_str)
                    .with_context(|| format!("Failed to create database file {path_str}"))?;
            }
        }

        // Every pooled connection to `:memory:` would open its own empty database.
        let (max_connections, min_connections) = if in_memory {
            (1, 1)
        } else {
            (max_connections, min_connections)
        };

        let mut opt = ConnectOptions::new(db_url.to_string());
        opt.max_connections(max_connections)
            .min_connections(min_connections)
            .connect_timeout(Duration::from_secs(10))
            .acquire_timeout(Duration::from_secs(10))
            .sqlx_logging(false);

        if !in_memory {
            opt.idle_timeout(Duration::from_secs(300))
                .max_lifetime(Duration::from_secs(600));
        }

        let conn = Database::connect(opt).await?;

        migrator::Migrator::up(&conn, None).await?;

        info!(
            "Database connected & migrations applied (pool: {}-{})",
            min_connections, max_connections
        );

        Ok(Self { conn })
    }

    pub async fn ping(&self) -> Result<()> {
        let backend = self.conn.get_database_backend();
        self.conn
            .query_one(Statement::from_string(backend, "SELECT 1".to_string()))
            .await?;
        Ok(())
    }

    fn user_repo(&self) -> repositories::user::UserRepository {
        repositories::user::UserRepository::new(self.conn.clone())
    }

    fn image_repo(&self) -> repositories::image::ImageRepository {
        repositories::image::ImageRepository::new(self.conn.clone())
    }

    fn stats_repo(&self) -> repositories::stats::StatsRepository {
        repositories::stats::StatsRepository::new(self.conn.clone())
    }

    // Users

    pub async fn get_user(&self, id: i32) -> Result<Option<User>> {
        self.user_repo().get_by_id(id).await
    }

    pub async fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        self.user_repo().get_by_username(username).await
    }

    pub async fn username_exists(&self, username: &str) -> Result<bool> {
        self.user_repo().username_exists(username).await
    }

    pub async fn email_exists(&self, email: &str) -> Result<bool> {
        self.user_repo().email_exists(email).await
    }

    pub async fn create_user(&self, new_user: NewUser) -> Result<User> {
        self.user_repo().create(new_user).await
    }

    pub async fn verify_user_password(&self, username: &str, password: &str) -> Result<Option<User>> {
        self.user_repo().verify_password(username, password).await
    }

    pub async fn count_users(&self) -> Result<u64> {
        self.user_repo().count().await
    }

    pub async fn recent_users(&self, limit: u64) -> Result<Vec<User>> {
        self.user_repo().recent(limit).await
    }

    pub async fn delete_user(&self, id: i32) -> Result<bool> {
        self.user_repo().delete(id).await
    }

    // Images

    pub async fn list_user_images(
        &self,
        user_id: i32,
        limit: Option<u64>,
    ) -> Result<Vec<images::Model>> {
        self.image_repo().list_for_user(user_id, limit).await
    }

    pub async fn recent_images(&self, limit: u64) -> Result<Vec<images::Model>> {
        self.image_repo().recent(limit).await
    }

    pub async fn count_images(&self) -> Result<u64> {
        self.image_repo().count().await
    }

    pub async fn count_user_images(&self, user_id: i32) -> Result<u64> {
        self.image_repo().count_for_user(user_id).await
    }

    // Stats

    pub async fn get_user_stats(&self, user_id: i32) -> Result<UsageStats> {
        self.stats_repo().get(user_id).await
    }

    pub async fn total_generations(&self) -> Result<i64> {
        self.stats_repo().total_generations().await
    }

    /// Writes the image rows of one generation request and counts the request
    /// in the user's stats. Either everything commits or nothing does.
    pub async fn save_generation(
        &self,
        user_id: i32,
        new_images: Vec<NewImage>,
    ) -> Result<(Vec<images::Model>, UsageStats)> {
        let txn = self
            .conn
            .begin()
            .await
            .context("Failed to start generation transaction")?;

        let mut saved = Vec::with_capacity(new_images.len());
        for image in new_images {
            saved.push(repositories::image::insert(&txn, user_id, image).await?);
        }

        let image_count = i64::try_from(saved.len()).unwrap_or(i64::MAX);
        let stats = repositories::stats::record_generation(&txn, user_id, image_count).await?;

        txn.commit()
            .await
            .context("Failed to commit generation")?;

        Ok((saved, stats))
    }
}
