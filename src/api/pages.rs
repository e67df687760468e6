use axum::{
    Json,
    extract::{Path, State},
    response::{IntoResponse, Redirect, Response},
};
use std::sync::Arc;
use tower_sessions::Session;

use super::auth::{Principal, session_user_id};
use super::flash;
use super::{
    AdminView, ApiError, AppState, DashboardView, GalleryView, GeneratePageView, UserDto,
    image_dtos,
};
use crate::services::ErrorType;

const DASHBOARD_RECENT_IMAGES: u64 = 6;
const ADMIN_RECENT_ROWS: u64 = 10;

/// GET /
pub async fn index(session: Session) -> Result<Redirect, ApiError> {
    if session_user_id(&session).await?.is_some() {
        Ok(Redirect::to("/generate"))
    } else {
        Ok(Redirect::to("/login"))
    }
}

/// GET /dashboard
pub async fn dashboard(
    State(state): State<Arc<AppState>>,
    session: Session,
    Principal(user): Principal,
) -> Result<Json<DashboardView>, ApiError> {
    let stats = state.store().get_user_stats(user.id).await?;
    let recent = state
        .store()
        .list_user_images(user.id, Some(DASHBOARD_RECENT_IMAGES))
        .await?;

    Ok(Json(DashboardView {
        user: UserDto::from(&user),
        stats: stats.into(),
        recent_images: image_dtos(&recent),
        flashes: flash::take(&session).await,
    }))
}

/// GET /generate
pub async fn generate(
    State(state): State<Arc<AppState>>,
    session: Session,
    Principal(user): Principal,
) -> Json<GeneratePageView> {
    let defaults = state.generation().defaults();

    Json(GeneratePageView {
        user: UserDto::from(&user),
        default_model: defaults.default_model.clone(),
        default_size: defaults.default_size.clone(),
        default_quality: defaults.default_quality.clone(),
        flashes: flash::take(&session).await,
    })
}

/// GET /gallery
pub async fn gallery(
    State(state): State<Arc<AppState>>,
    session: Session,
    Principal(user): Principal,
) -> Json<GalleryView> {
    let storage_info = state.storage().info();
    let flashes = flash::take(&session).await;

    match state.store().list_user_images(user.id, None).await {
        Ok(images) => Json(GalleryView {
            total_images: images.len(),
            images: image_dtos(&images),
            storage_info,
            error: None,
            flashes,
        }),
        Err(e) => {
            tracing::error!(user_id = user.id, error = %e, "Failed to load gallery");
            state.metrics().record_error(ErrorType::Gallery);
            Json(GalleryView {
                images: Vec::new(),
                total_images: 0,
                storage_info,
                error: Some(e.to_string()),
                flashes,
            })
        }
    }
}

/// GET /admin
pub async fn admin(
    State(state): State<Arc<AppState>>,
    session: Session,
) -> Result<Json<AdminView>, ApiError> {
    let store = state.store();

    let recent_users = store.recent_users(ADMIN_RECENT_ROWS).await?;
    let recent_images = store.recent_images(ADMIN_RECENT_ROWS).await?;

    Ok(Json(AdminView {
        total_users: store.count_users().await?,
        total_images: store.count_images().await?,
        total_generations: store.total_generations().await?,
        recent_users: recent_users.iter().map(UserDto::from).collect(),
        recent_images: image_dtos(&recent_images),
        flashes: flash::take(&session).await,
    }))
}

/// POST /admin/users/{id}/delete
pub async fn delete_user(
    State(state): State<Arc<AppState>>,
    session: Session,
    Principal(admin): Principal,
    Path(id): Path<i32>,
) -> Result<Response, ApiError> {
    if id == admin.id {
        flash::push(&session, "error", "You cannot delete your own account.").await;
        return Ok(Redirect::to("/admin").into_response());
    }

    if state.auth().delete_user(id).await? {
        tracing::info!(admin_id = admin.id, user_id = id, "User deleted");
        flash::push(&session, "success", "User deleted.").await;
    } else {
        flash::push(&session, "error", "User not found.").await;
    }

    Ok(Redirect::to("/admin").into_response())
}
