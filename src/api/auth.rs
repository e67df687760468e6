use axum::{
    Form, Json,
    extract::{FromRequestParts, Query, Request, State},
    http::request::Parts,
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use std::sync::Arc;
use tower_sessions::Session;

use super::flash;
use super::{ApiError, AppState, AuthPageView};
use crate::db::User;
use crate::services::{AuthError, ErrorType};

const SESSION_USER_KEY: &str = "user_id";

// ============================================================================
// Request Types
// ============================================================================

#[derive(Deserialize)]
pub struct RegisterForm {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Deserialize)]
pub struct NextQuery {
    pub next: Option<String>,
}

// ============================================================================
// Principal
// ============================================================================

/// The authenticated user of the current request, placed in the request
/// extensions by [`require_login`].
#[derive(Debug, Clone)]
pub struct Principal(pub User);

impl<S: Send + Sync> FromRequestParts<S> for Principal {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Self>()
            .cloned()
            .ok_or_else(|| ApiError::Unauthorized("Not authenticated".to_string()))
    }
}

// ============================================================================
// Middleware
// ============================================================================

/// Loads the session user. Anonymous callers are sent to the login page with
/// the original location preserved in `next`.
pub async fn require_login(
    State(state): State<Arc<AppState>>,
    session: Session,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if let Some(user_id) = session_user_id(&session).await? {
        if let Some(user) = state.auth().load(user_id).await? {
            request.extensions_mut().insert(Principal(user));
            return Ok(next.run(request).await);
        }

        // The account behind this session is gone.
        if let Err(e) = session.remove::<i32>(SESSION_USER_KEY).await {
            tracing::warn!(error = %e, "Failed to clear stale session user");
        }
    }

    let original = request
        .uri()
        .path_and_query()
        .map_or_else(|| request.uri().path().to_string(), ToString::to_string);

    let location = format!("/login?next={}", urlencoding::encode(&original));
    Ok(Redirect::to(&location).into_response())
}

/// Must run inside [`require_login`].
pub async fn require_admin(session: Session, request: Request, next: Next) -> Response {
    let is_admin = request
        .extensions()
        .get::<Principal>()
        .is_some_and(|principal| principal.0.is_admin);

    if !is_admin {
        flash::push(&session, "error", "Access denied. Admin privileges required.").await;
        return Redirect::to("/dashboard").into_response();
    }

    next.run(request).await
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /register
pub async fn register_page(session: Session) -> Result<Response, ApiError> {
    if session_user_id(&session).await?.is_some() {
        return Ok(Redirect::to("/dashboard").into_response());
    }

    Ok(Json(AuthPageView {
        page: "register",
        next: None,
        flashes: flash::take(&session).await,
    })
    .into_response())
}

/// POST /register
pub async fn register(
    State(state): State<Arc<AppState>>,
    session: Session,
    Form(form): Form<RegisterForm>,
) -> Result<Response, ApiError> {
    if session_user_id(&session).await?.is_some() {
        return Ok(Redirect::to("/dashboard").into_response());
    }

    if form.username.is_empty() || form.email.is_empty() || form.password.is_empty() {
        flash::push(&session, "error", "All fields are required").await;
        return Ok(Redirect::to("/register").into_response());
    }

    match state
        .auth()
        .register(&form.username, &form.email, &form.password, false)
        .await
    {
        Ok(user) => {
            tracing::info!(user_id = user.id, username = %user.username, "User registered");
            state.metrics().record_registration();
            state.notifier().welcome(&user.username);

            flash::push(&session, "success", "Registration successful! Please log in.").await;
            Ok(Redirect::to("/login").into_response())
        }
        Err(e @ (AuthError::UsernameTaken | AuthError::EmailTaken | AuthError::Validation(_))) => {
            flash::push(&session, "error", e.to_string()).await;
            Ok(Redirect::to("/register").into_response())
        }
        Err(e) => {
            tracing::error!(error = %e, "Registration failed");
            state.metrics().record_error(ErrorType::Registration);
            flash::push(&session, "error", "An error occurred. Please try again.").await;
            Ok(Redirect::to("/register").into_response())
        }
    }
}

/// GET /login
pub async fn login_page(
    session: Session,
    Query(query): Query<NextQuery>,
) -> Result<Response, ApiError> {
    if session_user_id(&session).await?.is_some() {
        return Ok(Redirect::to("/dashboard").into_response());
    }

    Ok(Json(AuthPageView {
        page: "login",
        next: query.next.filter(|next| is_local_path(next)),
        flashes: flash::take(&session).await,
    })
    .into_response())
}

/// POST /login
pub async fn login(
    State(state): State<Arc<AppState>>,
    session: Session,
    Query(query): Query<NextQuery>,
    Form(form): Form<LoginForm>,
) -> Result<Response, ApiError> {
    if session_user_id(&session).await?.is_some() {
        return Ok(Redirect::to("/dashboard").into_response());
    }

    let next = query.next.filter(|next| is_local_path(next));

    let user = match state.auth().authenticate(&form.username, &form.password).await {
        Ok(user) => user,
        Err(AuthError::InvalidCredentials) => {
            flash::push(&session, "error", "Invalid username or password").await;
            let location = next.map_or_else(
                || "/login".to_string(),
                |next| format!("/login?next={}", urlencoding::encode(&next)),
            );
            return Ok(Redirect::to(&location).into_response());
        }
        Err(e) => return Err(e.into()),
    };

    session
        .cycle_id()
        .await
        .map_err(|e| ApiError::internal(format!("Failed to rotate session: {e}")))?;
    session
        .insert(SESSION_USER_KEY, user.id)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to create session: {e}")))?;

    tracing::info!(user_id = user.id, "User logged in");
    state.metrics().record_login();
    flash::push(&session, "success", "Login successful!").await;

    let location = next.unwrap_or_else(|| "/dashboard".to_string());
    Ok(Redirect::to(&location).into_response())
}

/// GET /logout
pub async fn logout(session: Session, Principal(user): Principal) -> impl IntoResponse {
    if let Err(e) = session.flush().await {
        tracing::warn!(error = %e, "Failed to flush session");
    }
    tracing::info!(user_id = user.id, "User logged out");

    flash::push(&session, "info", "You have been logged out.").await;
    Redirect::to("/login")
}

// ============================================================================
// Helpers
// ============================================================================

pub async fn session_user_id(session: &Session) -> Result<Option<i32>, ApiError> {
    session
        .get::<i32>(SESSION_USER_KEY)
        .await
        .map_err(|e| ApiError::internal(format!("Session error: {e}")))
}

/// Only same-site absolute paths are accepted as a post-login target.
fn is_local_path(target: &str) -> bool {
    target.starts_with('/') && !target.starts_with("//") && !target.contains('\\')
}
