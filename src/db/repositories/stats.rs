use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QuerySelect, Set,
};
use serde::Serialize;

use crate::entities::user_stats;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UsageStats {
    pub total_generations: i64,
    pub total_images: i64,
    pub last_generation: Option<DateTime<Utc>>,
}

impl From<user_stats::Model> for UsageStats {
    fn from(model: user_stats::Model) -> Self {
        Self {
            total_generations: model.total_generations,
            total_images: model.total_images,
            last_generation: model.last_generation,
        }
    }
}

pub struct StatsRepository {
    conn: DatabaseConnection,
}

impl StatsRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    /// Zero values when the user has no stats row.
    pub async fn get(&self, user_id: i32) -> Result<UsageStats> {
        let row = user_stats::Entity::find()
            .filter(user_stats::Column::UserId.eq(user_id))
            .one(&self.conn)
            .await
            .context("Failed to query user stats")?;

        Ok(row.map(UsageStats::from).unwrap_or_default())
    }

    pub async fn total_generations(&self) -> Result<i64> {
        let total: Option<Option<i64>> = user_stats::Entity::find()
            .select_only()
            .column_as(user_stats::Column::TotalGenerations.sum(), "total")
            .into_tuple()
            .one(&self.conn)
            .await
            .context("Failed to sum generations")?;

        Ok(total.flatten().unwrap_or(0))
    }
}

/// Counts one generation event of `image_count` images for the user, creating
/// the stats row when it is missing. Runs on `conn`, normally the caller's
/// transaction.
pub async fn record_generation<C: ConnectionTrait>(
    conn: &C,
    user_id: i32,
    image_count: i64,
) -> Result<UsageStats> {
    let now = Utc::now();

    let existing = user_stats::Entity::find()
        .filter(user_stats::Column::UserId.eq(user_id))
        .one(conn)
        .await
        .context("Failed to query user stats")?;

    let model = if let Some(row) = existing {
        let total_generations = row.total_generations + 1;
        let total_images = row.total_images + image_count;

        let mut active: user_stats::ActiveModel = row.into();
        active.total_generations = Set(total_generations);
        active.total_images = Set(total_images);
        active.last_generation = Set(Some(now));
        active.update(conn).await
    } else {
        user_stats::ActiveModel {
            user_id: Set(user_id),
            total_generations: Set(1),
            total_images: Set(image_count),
            last_generation: Set(Some(now)),
            ..Default::default()
        }
        .insert(conn)
        .await
    }
    .context("Failed to update user stats")?;

    Ok(UsageStats::from(model))
}
