//! Generation submissions against stubbed upstream and storage backends.

mod common;

use axum::http::{StatusCode, header};
use common::{
    AppOptions, FailingObjectStore, PNG_BYTES, RecordingObjectStore, StubGenerator, body_bytes,
    body_json, spawn_app, spawn_app_with,
};
use imagegen::clients::generation::{GeneratedImage, GenerationResult, ImageGenerator};
use imagegen::clients::object_store::ObjectStore;
use sea_orm::ConnectionTrait;
use serde_json::json;
use std::sync::Arc;

#[tokio::test]
async fn test_alice_generates_one_inline_image() {
    let app = spawn_app().await;
    let mut client = app.client();
    client.sign_up("alice").await;

    let response = client
        .post_json("/api/generate", &json!({"prompt": "a cat"}))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["message"], "Generated 1 image(s) successfully!");

    let images = body["images"].as_array().unwrap();
    assert_eq!(images.len(), 1);
    let image = &images[0];
    assert_eq!(image["prompt"], "a cat");
    assert_eq!(image["model"], "img3");
    assert_eq!(image["size"], "1024x1024");
    assert_eq!(image["quality"], "standard");
    assert!(image["thumbnail"].is_null());

    let filename = image["filename"].as_str().unwrap();
    assert!(filename.ends_with("_1.png"));
    assert_eq!(image["url"], format!("/media/{filename}"));

    let response = client.get("/api/user/stats").await;
    assert_eq!(response.headers()[header::CACHE_CONTROL], "no-store");
    assert_eq!(response.headers()["x-content-type-options"], "nosniff");
    let stats = body_json(response).await;
    assert_eq!(stats["total_generations"], 1);
    assert_eq!(stats["total_images"], 1);
    assert!(stats["last_generation"].is_string());

    let response = client.get(&format!("/media/{filename}")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");
    assert!(
        response.headers()[header::CACHE_CONTROL]
            .to_str()
            .unwrap()
            .starts_with("private")
    );
    assert_eq!(body_bytes(response).await, PNG_BYTES);
    assert!(app.media_dir.join(filename).exists());
}

#[tokio::test]
async fn test_request_options_are_stored() {
    let app = spawn_app().await;
    let mut client = app.client();
    client.sign_up("alice").await;

    let response = client
        .post_json(
            "/api/generate",
            &json!({"prompt": "a dog", "model": "img4", "size": "512x512", "quality": "hd"}),
        )
        .await;
    let body = body_json(response).await;
    let image = &body["images"][0];
    assert_eq!(image["model"], "img4");
    assert_eq!(image["size"], "512x512");
    assert_eq!(image["quality"], "hd");
}

#[tokio::test]
async fn test_empty_prompt_is_rejected() {
    let generator = Arc::new(StubGenerator::inline_images(1));
    let app = spawn_app_with(AppOptions {
        generator: generator.clone() as Arc<dyn ImageGenerator>,
        ..AppOptions::default()
    })
    .await;
    let mut client = app.client();
    client.sign_up("alice").await;

    for body in [json!({"prompt": ""}), json!({"prompt": null}), json!({})] {
        let response = client.post_json("/api/generate", &body).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "Prompt is required");
    }

    assert_eq!(generator.calls(), 0);

    // Only an empty prompt is rejected.
    let response = client
        .post_json("/api/generate", &json!({"prompt": "   "}))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(generator.calls(), 1);
}

#[tokio::test]
async fn test_malformed_body_gets_json_error() {
    let app = spawn_app().await;
    let mut client = app.client();
    client.sign_up("alice").await;

    let response = client
        .send(
            axum::http::Request::builder()
                .method("POST")
                .uri("/api/generate")
                .header(header::CONTENT_TYPE, "application/json"),
            axum::body::Body::from("{\"prompt\": "),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["success"], false);
    assert!(body["error"].is_string());

    let response = client
        .post_json("/api/generate", &json!({"prompt": 42}))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["success"], false);
}

#[tokio::test]
async fn test_gateway_failure_commits_nothing() {
    let app = spawn_app_with(AppOptions {
        generator: Arc::new(StubGenerator::failing()),
        ..AppOptions::default()
    })
    .await;
    let mut client = app.client();
    client.sign_up("alice").await;

    let response = client
        .post_json("/api/generate", &json!({"prompt": "a cat"}))
        .await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_json(response).await["error"], "Failed to generate image");

    let stats = body_json(client.get("/api/user/stats").await).await;
    assert_eq!(stats["total_generations"], 0);
    assert_eq!(stats["total_images"], 0);
    assert!(stats["last_generation"].is_null());
    assert_eq!(app.state.store().count_images().await.unwrap(), 0);
}

#[tokio::test]
async fn test_failed_commit_rolls_back_images_and_stats() {
    let app = spawn_app().await;
    let mut client = app.client();
    client.sign_up("alice").await;

    app.state
        .store()
        .conn
        .execute_unprepared(
            "CREATE TRIGGER stats_read_only BEFORE UPDATE ON user_stats \
             BEGIN SELECT RAISE(ABORT, 'stats are read-only'); END;",
        )
        .await
        .unwrap();

    let response = client
        .post_json("/api/generate", &json!({"prompt": "a cat"}))
        .await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_json(response).await;
    assert_eq!(body["success"], false);
    let error = body["error"].as_str().unwrap();
    assert!(error.starts_with("Server error:"), "{error}");

    assert_eq!(app.state.store().count_images().await.unwrap(), 0);
    let stats = body_json(client.get("/api/user/stats").await).await;
    assert_eq!(stats["total_generations"], 0);
    assert_eq!(stats["total_images"], 0);
    assert!(stats["last_generation"].is_null());
}

#[tokio::test]
async fn test_stats_accumulate_over_submissions() {
    let app = spawn_app_with(AppOptions {
        generator: Arc::new(StubGenerator::with_result(Some(GenerationResult {
            data: vec![
                GeneratedImage::inline(base64_png()),
                GeneratedImage::default(),
                GeneratedImage::inline(format!("data:image/png;base64,{}", base64_png())),
            ],
        }))),
        ..AppOptions::default()
    })
    .await;
    let mut client = app.client();
    client.sign_up("alice").await;

    for _ in 0..3 {
        let response = client
            .post_json("/api/generate", &json!({"prompt": "a cat"}))
            .await;
        let body = body_json(response).await;
        assert_eq!(body["images"].as_array().unwrap().len(), 2);
        assert_eq!(body["message"], "Generated 2 image(s) successfully!");
    }

    let stats = body_json(client.get("/api/user/stats").await).await;
    assert_eq!(stats["total_generations"], 3);
    assert_eq!(stats["total_images"], 6);

    let gallery = body_json(client.get("/gallery").await).await;
    assert_eq!(gallery["total_images"], 6);
    assert_eq!(gallery["storage_info"]["storage_type"], "Local Storage");

    let dashboard = body_json(client.get("/dashboard").await).await;
    assert_eq!(dashboard["recent_images"].as_array().unwrap().len(), 6);
}

#[tokio::test]
async fn test_undecodable_entries_are_skipped() {
    let app = spawn_app_with(AppOptions {
        generator: Arc::new(StubGenerator::with_result(Some(GenerationResult {
            data: vec![
                GeneratedImage::inline("%%% not base64 %%%"),
                GeneratedImage::remote("http://127.0.0.1:1/unreachable.png"),
            ],
        }))),
        ..AppOptions::default()
    })
    .await;
    let mut client = app.client();
    client.sign_up("alice").await;

    let response = client
        .post_json("/api/generate", &json!({"prompt": "a cat"}))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["images"].as_array().unwrap().len(), 0);
    assert_eq!(body["message"], "Generated 0 image(s) successfully!");

    // The request still counts as a generation.
    let stats = body_json(client.get("/api/user/stats").await).await;
    assert_eq!(stats["total_generations"], 1);
    assert_eq!(stats["total_images"], 0);
}

#[tokio::test]
async fn test_object_store_failure_falls_back_to_local() {
    let app = spawn_app_with(AppOptions {
        object_store: Some(Arc::new(FailingObjectStore) as Arc<dyn ObjectStore>),
        ..AppOptions::default()
    })
    .await;
    let mut client = app.client();
    client.sign_up("alice").await;

    let body = body_json(
        client
            .post_json("/api/generate", &json!({"prompt": "a cat"}))
            .await,
    )
    .await;
    let image = &body["images"][0];
    let filename = image["filename"].as_str().unwrap();
    assert_eq!(image["url"], format!("/media/{filename}"));

    let response = client.get(&format!("/media/{filename}")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_bytes(response).await, PNG_BYTES);

    let info = body_json(client.get("/api/storage-info").await).await;
    assert_eq!(info["storage_type"], "Object Storage + CDN");
    assert_eq!(info["bucket_name"], "gen-bucket");
    assert_eq!(info["object_store_configured"], true);
}

#[tokio::test]
async fn test_object_store_success_uses_cdn_url() {
    let store = Arc::new(RecordingObjectStore::default());
    let app = spawn_app_with(AppOptions {
        object_store: Some(store.clone() as Arc<dyn ObjectStore>),
        ..AppOptions::default()
    })
    .await;
    let mut client = app.client();
    client.sign_up("alice").await;

    let body = body_json(
        client
            .post_json("/api/generate", &json!({"prompt": "a cat"}))
            .await,
    )
    .await;
    let image = &body["images"][0];
    let filename = image["filename"].as_str().unwrap();
    assert_eq!(
        image["url"],
        format!("https://cdn.example.com/images/{filename}")
    );
    assert_eq!(
        store.keys.lock().unwrap().as_slice(),
        &[format!("images/{filename}")]
    );

    // Nothing was written locally.
    let response = client.get(&format!("/media/{filename}")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_media_rejects_path_traversal() {
    let app = spawn_app().await;
    let mut client = app.client();
    client.sign_up("alice").await;

    let response = client.get("/media/..%2Fconfig.toml").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_models_and_generate_page() {
    let app = spawn_app().await;
    let mut client = app.client();
    client.sign_up("alice").await;

    let models = body_json(client.get("/api/models").await).await;
    assert_eq!(models["success"], true);
    assert_eq!(models["data"][0]["id"], "img3");

    let page = body_json(client.get("/generate").await).await;
    assert_eq!(page["default_model"], "img3");
    assert_eq!(page["default_size"], "1024x1024");
    assert_eq!(page["default_quality"], "standard");
}

fn base64_png() -> String {
    use base64::{Engine as _, engine::general_purpose::STANDARD};
    STANDARD.encode(PNG_BYTES)
}
