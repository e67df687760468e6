//! Router harness shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Request, Response, StatusCode, header},
};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use http_body_util::BodyExt;
use imagegen::api::AppState;
use imagegen::clients::generation::{
    GeneratedImage, GenerationRequest, GenerationResult, ImageGenerator, ModelDescriptor,
};
use imagegen::clients::notifier::NotificationPublisher;
use imagegen::clients::object_store::ObjectStore;
use imagegen::config::Config;
use imagegen::state::Components;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tower::ServiceExt;

pub const PNG_BYTES: &[u8] = b"\x89PNG\r\n\x1a\nstub image";

// ============================================================================
// Stubs
// ============================================================================

/// Returns a fixed response for every generation call.
pub struct StubGenerator {
    response: Option<GenerationResult>,
    calls: AtomicUsize,
}

impl StubGenerator {
    pub fn inline_images(count: usize) -> Self {
        let data = (0..count)
            .map(|_| GeneratedImage::inline(STANDARD.encode(PNG_BYTES)))
            .collect();
        Self::with_result(Some(GenerationResult { data }))
    }

    pub fn failing() -> Self {
        Self::with_result(None)
    }

    pub fn with_result(response: Option<GenerationResult>) -> Self {
        Self {
            response,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ImageGenerator for StubGenerator {
    async fn list_models(&self) -> Vec<ModelDescriptor> {
        vec![ModelDescriptor {
            id: "img3".to_string(),
            extra: serde_json::Map::new(),
        }]
    }

    async fn generate(&self, _request: &GenerationRequest) -> Option<GenerationResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.response.clone()
    }
}

pub struct FailingObjectStore;

#[async_trait]
impl ObjectStore for FailingObjectStore {
    async fn put_object(&self, _: &str, _: &[u8], _: &str) -> anyhow::Result<()> {
        anyhow::bail!("AccessDenied")
    }
}

#[derive(Default)]
pub struct RecordingObjectStore {
    pub keys: Mutex<Vec<String>>,
}

#[async_trait]
impl ObjectStore for RecordingObjectStore {
    async fn put_object(&self, key: &str, _: &[u8], _: &str) -> anyhow::Result<()> {
        self.keys.lock().unwrap().push(key.to_string());
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingPublisher {
    pub subjects: Mutex<Vec<String>>,
}

#[async_trait]
impl NotificationPublisher for RecordingPublisher {
    async fn publish(&self, subject: &str, _message: &str) -> anyhow::Result<()> {
        self.subjects.lock().unwrap().push(subject.to_string());
        Ok(())
    }
}

// ============================================================================
// Harness
// ============================================================================

pub struct TestApp {
    pub state: Arc<AppState>,
    pub router: Router,
    pub media_dir: PathBuf,
}

pub struct AppOptions {
    pub generator: Arc<dyn ImageGenerator>,
    pub object_store: Option<Arc<dyn ObjectStore>>,
    pub publisher: Option<Arc<dyn NotificationPublisher>>,
}

impl Default for AppOptions {
    fn default() -> Self {
        Self {
            generator: Arc::new(StubGenerator::inline_images(1)),
            object_store: None,
            publisher: None,
        }
    }
}

pub async fn spawn_app() -> TestApp {
    spawn_app_with(AppOptions::default()).await
}

pub async fn spawn_app_with(options: AppOptions) -> TestApp {
    let id = uuid::Uuid::new_v4();
    let db_path = std::env::temp_dir().join(format!("imagegen-test-{id}.db"));
    let media_dir = std::env::temp_dir().join(format!("imagegen-test-media-{id}"));

    let mut config = Config::default();
    config.general.database_path = format!("sqlite:{}", db_path.display());
    config.general.media_path = media_dir.display().to_string();
    config.server.secure_cookies = false;
    config.observability.metrics_enabled = false;

    if options.object_store.is_some() {
        config.storage.use_object_storage = true;
        config.storage.bucket = "gen-bucket".to_string();
        config.storage.cdn_domain = "cdn.example.com".to_string();
    }

    let state = imagegen::api::create_app_state_with(
        config,
        Components {
            generator: options.generator,
            object_store: options.object_store,
            publisher: options.publisher,
        },
        None,
    )
    .await
    .expect("failed to create app state");

    let router = imagegen::api::router(state.clone());

    TestApp {
        state,
        router,
        media_dir,
    }
}

/// A browser-like client that keeps the session cookie between requests.
pub struct TestClient {
    router: Router,
    cookie: Option<String>,
}

impl TestApp {
    pub fn client(&self) -> TestClient {
        TestClient {
            router: self.router.clone(),
            cookie: None,
        }
    }
}

impl TestClient {
    pub async fn send(&mut self, builder: axum::http::request::Builder, body: Body) -> Response<Body> {
        let builder = match &self.cookie {
            Some(cookie) => builder.header(header::COOKIE, cookie),
            None => builder,
        };

        let response = self
            .router
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();

        if let Some(set_cookie) = response.headers().get(header::SET_COOKIE) {
            let pair = set_cookie.to_str().unwrap().split(';').next().unwrap();
            // An empty value is the removal cookie for a drained session.
            self.cookie = (!pair.ends_with('=')).then(|| pair.to_string());
        }

        response
    }

    pub async fn get(&mut self, uri: &str) -> Response<Body> {
        self.send(Request::builder().uri(uri), Body::empty()).await
    }

    pub async fn post_form(&mut self, uri: &str, form: &str) -> Response<Body> {
        self.send(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded"),
            Body::from(form.to_string()),
        )
        .await
    }

    pub async fn post_json(&mut self, uri: &str, body: &Value) -> Response<Body> {
        self.send(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header(header::CONTENT_TYPE, "application/json"),
            Body::from(body.to_string()),
        )
        .await
    }

    pub async fn register(&mut self, username: &str, email: &str, password: &str) -> Response<Body> {
        self.post_form(
            "/register",
            &format!(
                "username={}&email={}&password={}",
                urlencoding::encode(username),
                urlencoding::encode(email),
                urlencoding::encode(password)
            ),
        )
        .await
    }

    pub async fn login(&mut self, username: &str, password: &str) -> Response<Body> {
        self.post_form(
            "/login",
            &format!(
                "username={}&password={}",
                urlencoding::encode(username),
                urlencoding::encode(password)
            ),
        )
        .await
    }

    /// Registers and logs in, asserting both steps succeed.
    pub async fn sign_up(&mut self, username: &str) {
        let response = self
            .register(username, &format!("{username}@x.com"), "pw123")
            .await;
        assert_eq!(location(&response), "/login");

        let response = self.login(username, "pw123").await;
        assert_eq!(location(&response), "/dashboard");
    }
}

pub fn location(response: &Response<Body>) -> String {
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    response
        .headers()
        .get(header::LOCATION)
        .expect("redirect without location")
        .to_str()
        .unwrap()
        .to_string()
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    response.into_body().collect().await.unwrap().to_bytes().to_vec()
}

pub async fn body_json(response: Response<Body>) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

pub fn flash_messages(view: &Value) -> Vec<String> {
    view["flashes"]
        .as_array()
        .map(|flashes| {
            flashes
                .iter()
                .filter_map(|f| f["message"].as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}
