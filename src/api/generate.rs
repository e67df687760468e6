use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
};
use std::sync::Arc;

use super::auth::Principal;
use super::{ApiError, ApiResponse, AppState, GenerateResponse, StatsDto, image_dtos};
use crate::clients::generation::ModelDescriptor;
use crate::services::{GenerateRequest, StorageInfo};

/// GET /api/models
///
/// Descriptors are returned under `data`, the same envelope the upstream uses.
pub async fn list_models(
    State(state): State<Arc<AppState>>,
) -> Json<ApiResponse<Vec<ModelDescriptor>>> {
    Json(ApiResponse::success(state.generation().list_models().await))
}

/// POST /api/generate
pub async fn submit(
    State(state): State<Arc<AppState>>,
    Principal(user): Principal,
    payload: Result<Json<GenerateRequest>, JsonRejection>,
) -> Result<Json<GenerateResponse>, ApiError> {
    let Json(request) = payload?;
    let outcome = state.generation().submit(&user, request).await?;
    let images = image_dtos(&outcome.images);

    Ok(Json(GenerateResponse {
        success: true,
        message: format!("Generated {} image(s) successfully!", images.len()),
        images,
    }))
}

/// GET /api/user/stats
pub async fn user_stats(
    State(state): State<Arc<AppState>>,
    Principal(user): Principal,
) -> Result<Json<StatsDto>, ApiError> {
    let stats = state.store().get_user_stats(user.id).await?;
    Ok(Json(stats.into()))
}

/// GET /api/storage-info
pub async fn storage_info(State(state): State<Arc<AppState>>) -> Json<StorageInfo> {
    Json(state.storage().info())
}
