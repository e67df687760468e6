use anyhow::{Context, Result};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set,
};

use crate::entities::images;

/// An image that has been persisted to storage but not yet recorded.
#[derive(Debug, Clone)]
pub struct NewImage {
    pub prompt: String,
    pub model: String,
    pub filename: String,
    pub storage_key: Option<String>,
    pub public_url: Option<String>,
    pub size: String,
    pub quality: String,
}

pub struct ImageRepository {
    conn: DatabaseConnection,
}

impl ImageRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    /// Newest first. `limit` of `None` returns every image of the user.
    pub async fn list_for_user(
        &self,
        user_id: i32,
        limit: Option<u64>,
    ) -> Result<Vec<images::Model>> {
        images::Entity::find()
            .filter(images::Column::UserId.eq(user_id))
            .order_by_desc(images::Column::CreatedAt)
            .order_by_desc(images::Column::Id)
            .limit(limit)
            .all(&self.conn)
            .await
            .context("Failed to list user images")
    }

    pub async fn recent(&self, limit: u64) -> Result<Vec<images::Model>> {
        images::Entity::find()
            .order_by_desc(images::Column::CreatedAt)
            .order_by_desc(images::Column::Id)
            .limit(limit)
            .all(&self.conn)
            .await
            .context("Failed to list recent images")
    }

    pub async fn count(&self) -> Result<u64> {
        images::Entity::find()
            .count(&self.conn)
            .await
            .context("Failed to count images")
    }

    pub async fn count_for_user(&self, user_id: i32) -> Result<u64> {
        images::Entity::find()
            .filter(images::Column::UserId.eq(user_id))
            .count(&self.conn)
            .await
            .context("Failed to count user images")
    }
}

/// Inserts one image row on `conn`, which may be an open transaction.
pub async fn insert<C: ConnectionTrait>(
    conn: &C,
    user_id: i32,
    image: NewImage,
) -> Result<images::Model> {
    images::ActiveModel {
        user_id: Set(user_id),
        prompt: Set(image.prompt),
        model: Set(image.model),
        filename: Set(image.filename),
        storage_key: Set(image.storage_key),
        thumbnail_key: Set(None),
        public_url: Set(image.public_url),
        size: Set(Some(image.size)),
        quality: Set(Some(image.quality)),
        created_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(conn)
    .await
    .context("Failed to insert image record")
}
