use axum::{
    extract::{MatchedPath, Request, State},
    http::{HeaderValue, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use std::time::Instant;
use tower_sessions::Session;
use tracing::{Instrument, info, info_span};
use uuid::Uuid;

use super::AppState;
use super::auth::session_user_id;

/// GET /metrics
pub async fn get_metrics(State(state): State<Arc<AppState>>) -> Response {
    state.prometheus_handle.as_ref().map_or_else(
        || (StatusCode::NOT_FOUND, "Metrics are disabled").into_response(),
        |handle| handle.render().into_response(),
    )
}

/// Coarse area of the application a route belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteGroup {
    Auth,
    Page,
    Api,
    Media,
    Admin,
    Unmatched,
}

impl RouteGroup {
    #[must_use]
    pub fn of(route: Option<&str>) -> Self {
        let Some(route) = route else {
            return Self::Unmatched;
        };

        match route {
            "/" | "/register" | "/login" | "/logout" => Self::Auth,
            "/metrics" => Self::Admin,
            r if r.starts_with("/admin") => Self::Admin,
            r if r.starts_with("/api/") => Self::Api,
            r if r.starts_with("/media/") => Self::Media,
            _ => Self::Page,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Auth => "auth",
            Self::Page => "page",
            Self::Api => "api",
            Self::Media => "media",
            Self::Admin => "admin",
            Self::Unmatched => "unmatched",
        }
    }

    /// Session-bound responses must not be cached. Media is per-user but immutable.
    const fn cache_control(self) -> &'static str {
        match self {
            Self::Media => "private, max-age=86400, immutable",
            _ => "no-store",
        }
    }
}

/// Request span, per-group HTTP metrics and response headers.
pub async fn track_request(session: Session, req: Request, next: Next) -> Response {
    let start = Instant::now();

    let method = req.method().to_string();
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map(|mp| mp.as_str().to_string());
    let group = RouteGroup::of(route.as_deref());

    let span = info_span!(
        "request",
        request_id = %Uuid::new_v4(),
        method = %method,
        path = %req.uri().path(),
        group = group.as_str(),
        user_id = tracing::field::Empty,
    );

    if let Ok(Some(user_id)) = session_user_id(&session).await {
        span.record("user_id", user_id);
    }

    async move {
        let mut response = next.run(req).await;
        let status = response.status();

        let labels = [
            ("method", method),
            ("group", group.as_str().to_string()),
            ("route", route.unwrap_or_else(|| "unmatched".to_string())),
            ("status", status.as_u16().to_string()),
        ];
        metrics::counter!("http_requests_total", &labels).increment(1);
        metrics::histogram!("http_request_duration_seconds", &labels)
            .record(start.elapsed().as_secs_f64());

        let headers = response.headers_mut();
        headers.insert(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        );
        headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
        headers.insert(
            header::CACHE_CONTROL,
            HeaderValue::from_static(group.cache_control()),
        );

        info!(
            status = status.as_u16(),
            duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
            "Request finished"
        );

        response
    }
    .instrument(span)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_groups() {
        assert_eq!(RouteGroup::of(Some("/login")), RouteGroup::Auth);
        assert_eq!(RouteGroup::of(Some("/gallery")), RouteGroup::Page);
        assert_eq!(RouteGroup::of(Some("/api/generate")), RouteGroup::Api);
        assert_eq!(RouteGroup::of(Some("/media/{filename}")), RouteGroup::Media);
        assert_eq!(
            RouteGroup::of(Some("/admin/users/{id}/delete")),
            RouteGroup::Admin
        );
        assert_eq!(RouteGroup::of(Some("/metrics")), RouteGroup::Admin);
        assert_eq!(RouteGroup::of(None), RouteGroup::Unmatched);
    }

    #[test]
    fn test_media_is_cacheable_pages_are_not() {
        assert_eq!(RouteGroup::Page.cache_control(), "no-store");
        assert!(RouteGroup::Media.cache_control().starts_with("private"));
    }
}
