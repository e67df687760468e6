use serde::Serialize;

use crate::db::{UsageStats, User};
use crate::entities::images;
use crate::services::StorageInfo;

use super::flash::Flash;

const DEFAULT_SIZE: &str = "1024x1024";
const DEFAULT_QUALITY: &str = "standard";

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub const fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

/// Serialized form of a stored image.
#[derive(Debug, Clone, Serialize)]
pub struct ImageDto {
    pub id: i32,
    pub prompt: String,
    pub model: String,
    pub filename: String,
    pub url: String,
    pub thumbnail: Option<String>,
    pub size: String,
    pub quality: String,
    pub created_at: String,
}

impl From<&images::Model> for ImageDto {
    fn from(image: &images::Model) -> Self {
        Self {
            id: image.id,
            prompt: image.prompt.clone(),
            model: image.model.clone(),
            filename: image.filename.clone(),
            url: image
                .public_url
                .clone()
                .unwrap_or_else(|| format!("/media/{}", image.filename)),
            thumbnail: image.thumbnail_key.clone(),
            size: image
                .size
                .clone()
                .unwrap_or_else(|| DEFAULT_SIZE.to_string()),
            quality: image
                .quality
                .clone()
                .unwrap_or_else(|| DEFAULT_QUALITY.to_string()),
            created_at: image.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }
}

#[must_use]
pub fn image_dtos(images: &[images::Model]) -> Vec<ImageDto> {
    images.iter().map(ImageDto::from).collect()
}

#[derive(Debug, Clone, Serialize)]
pub struct StatsDto {
    pub total_generations: i64,
    pub total_images: i64,
    pub last_generation: Option<String>,
}

impl From<UsageStats> for StatsDto {
    fn from(stats: UsageStats) -> Self {
        Self {
            total_generations: stats.total_generations,
            total_images: stats.total_images,
            last_generation: stats.last_generation.map(|at| at.to_rfc3339()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct UserDto {
    pub id: i32,
    pub username: String,
    pub email: String,
    pub is_admin: bool,
    pub created_at: String,
}

impl From<&User> for UserDto {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
            is_admin: user.is_admin,
            created_at: user.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct GenerateResponse {
    pub success: bool,
    pub images: Vec<ImageDto>,
    pub message: String,
}

// ============================================================================
// Page view models
// ============================================================================

#[derive(Debug, Serialize)]
pub struct AuthPageView {
    pub page: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
    pub flashes: Vec<Flash>,
}

#[derive(Debug, Serialize)]
pub struct DashboardView {
    pub user: UserDto,
    pub stats: StatsDto,
    pub recent_images: Vec<ImageDto>,
    pub flashes: Vec<Flash>,
}

#[derive(Debug, Serialize)]
pub struct GeneratePageView {
    pub user: UserDto,
    pub default_model: String,
    pub default_size: String,
    pub default_quality: String,
    pub flashes: Vec<Flash>,
}

#[derive(Debug, Serialize)]
pub struct GalleryView {
    pub images: Vec<ImageDto>,
    pub total_images: usize,
    pub storage_info: StorageInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub flashes: Vec<Flash>,
}

#[derive(Debug, Serialize)]
pub struct AdminView {
    pub total_users: u64,
    pub total_images: u64,
    pub total_generations: i64,
    pub recent_users: Vec<UserDto>,
    pub recent_images: Vec<ImageDto>,
    pub flashes: Vec<Flash>,
}
