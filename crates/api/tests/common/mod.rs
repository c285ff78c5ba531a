//! Shared helpers for API integration tests.
//!
//! Builds the full application router over a temp-dir store and a stub
//! generation backend, mirroring the construction in `main.rs` so tests
//! exercise the same middleware stack production uses.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use atelier_api::config::ServerConfig;
use atelier_api::registry::JobRegistry;
use atelier_api::router::build_app_router;
use atelier_api::state::AppState;
use atelier_core::Request;
use atelier_novelai::{BackendError, GeneratedImage, GenerationBackend};
use atelier_queue::{GenerationQueue, QueueConfig};
use atelier_store::AccessStore;
use axum::body::Body;
use axum::http::{header, Request as HttpRequest, Response};
use axum::Router;
use http_body_util::BodyExt;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

// ---------------------------------------------------------------------------
// Stub backend
// ---------------------------------------------------------------------------

/// Instant backend double; flip `fail` to make every call error.
pub struct StubBackend {
    pub fail: AtomicBool,
}

#[async_trait]
impl GenerationBackend for StubBackend {
    async fn generate(&self, request: &Request) -> Result<GeneratedImage, BackendError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(BackendError::Upstream {
                status: 500,
                body: "stub failure".to_string(),
            });
        }
        Ok(GeneratedImage {
            bytes: vec![0x50, 0x4b, 0x03, 0x04],
            seed: request.seed,
            model: request.model.clone(),
        })
    }
}

// ---------------------------------------------------------------------------
// App construction
// ---------------------------------------------------------------------------

/// A fully wired test application.
pub struct TestApp {
    pub router: Router,
    pub store: Arc<AccessStore>,
    pub backend: Arc<StubBackend>,
    /// Snapshot path, for tests that corrupt or edit it out-of-band.
    pub snapshot_path: std::path::PathBuf,
    _cancel: CancellationToken,
    _dir: tempfile::TempDir,
}

/// Build a test `ServerConfig` with safe defaults and a near-zero dispatch
/// throttle.
pub fn test_config(data_dir: &std::path::Path) -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        data_dir: data_dir.display().to_string(),
        default_daily_limit: 10,
        nai_token: "test-token".to_string(),
        nai_proxy: None,
        default_model: atelier_core::presets::DEFAULT_MODEL.to_string(),
        models: atelier_core::presets::MODELS.iter().map(|m| m.to_string()).collect(),
        quality_words: vec!["best quality".to_string(), "masterpiece".to_string()],
        negative_preset: None,
        always_add_quality: false,
        min_dispatch_delay: Duration::from_millis(1),
        max_dispatch_delay: Duration::from_millis(2),
    }
}

/// Build the full application with a running dispatcher.
pub async fn build_test_app() -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let snapshot_path = dir.path().join("whitelist.json");

    let store = Arc::new(
        AccessStore::open(&snapshot_path, config.default_daily_limit)
            .await
            .unwrap(),
    );
    let backend = Arc::new(StubBackend {
        fail: AtomicBool::new(false),
    });

    let queue_config = QueueConfig::new(config.min_dispatch_delay, config.max_dispatch_delay);
    let (queue, dispatcher) = GenerationQueue::new(
        Arc::clone(&store),
        Arc::clone(&backend) as Arc<dyn GenerationBackend>,
        queue_config,
    );

    let cancel = CancellationToken::new();
    tokio::spawn(dispatcher.run(cancel.clone()));

    let state = AppState {
        store: Arc::clone(&store),
        queue,
        policy: Arc::new(config.policy()),
        jobs: JobRegistry::new(),
        config: Arc::new(config.clone()),
    };

    TestApp {
        router: build_app_router(state, &config),
        store,
        backend,
        snapshot_path,
        _cancel: cancel,
        _dir: dir,
    }
}

// ---------------------------------------------------------------------------
// Request helpers
// ---------------------------------------------------------------------------

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    app.oneshot(
        HttpRequest::builder()
            .method("GET")
            .uri(uri)
            .body(Body::empty())
            .unwrap(),
    )
    .await
    .unwrap()
}

pub async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> Response<Body> {
    send_json(app, "POST", uri, body).await
}

pub async fn put_json(app: Router, uri: &str, body: serde_json::Value) -> Response<Body> {
    send_json(app, "PUT", uri, body).await
}

pub async fn delete(app: Router, uri: &str) -> Response<Body> {
    app.oneshot(
        HttpRequest::builder()
            .method("DELETE")
            .uri(uri)
            .body(Body::empty())
            .unwrap(),
    )
    .await
    .unwrap()
}

async fn send_json(app: Router, method: &str, uri: &str, body: serde_json::Value) -> Response<Body> {
    app.oneshot(
        HttpRequest::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
    )
    .await
    .unwrap()
}

/// Collect a response body as JSON.
pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// Collect a response body as raw bytes.
pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    response.into_body().collect().await.unwrap().to_bytes().to_vec()
}
