//! Shared fixtures for the wpi-is integration tests

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use sqlx::sqlite::SqlitePoolOptions;
use tempfile::TempDir;
use tower::ServiceExt;
use wpi_common::events::EventBus;

use wpi_is::services::inference::{InferenceError, InferenceOutcome, InferenceRequest, Prediction};
use wpi_is::services::{InferenceEngine, UnconfiguredInference};
use wpi_is::storage::StoragePaths;
use wpi_is::{build_router, AppState, EVENT_BUS_CAPACITY};

pub const BOUNDARY: &str = "wpi-test-boundary";

/// Inference engine answering with a preset outcome
pub struct StubInference {
    outcome: Mutex<(u32, Prediction)>,
}

impl StubInference {
    pub fn new() -> Self {
        Self {
            outcome: Mutex::new((0, classification("OK", 0.95))),
        }
    }

    pub fn respond_with(&self, faces: u32, prediction: Prediction) {
        *self.outcome.lock().unwrap() = (faces, prediction);
    }
}

#[async_trait]
impl InferenceEngine for StubInference {
    fn name(&self) -> &'static str {
        "stub"
    }

    async fn infer(&self, _request: InferenceRequest) -> Result<InferenceOutcome, InferenceError> {
        let (faces_detected, prediction) = self.outcome.lock().unwrap().clone();
        Ok(InferenceOutcome {
            faces_detected,
            processed_image: None,
            prediction,
        })
    }
}

pub fn classification(label: &str, confidence: f64) -> Prediction {
    Prediction::Classification {
        class_id: None,
        label: label.to_string(),
        confidence,
    }
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub inference: Arc<StubInference>,
    pub root: TempDir,
}

async fn test_pool() -> sqlx::SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    wpi_common::db::create_schema(&pool).await.unwrap();
    wpi_common::db::init_default_settings(&pool).await.unwrap();
    pool
}

fn test_storage() -> (StoragePaths, TempDir) {
    let root = TempDir::new().unwrap();
    let storage = StoragePaths::new(root.path().to_path_buf());
    storage.ensure_layout().unwrap();
    (storage, root)
}

/// App backed by the stub engine
pub async fn test_app() -> TestApp {
    let (storage, root) = test_storage();
    let inference = Arc::new(StubInference::new());
    let engine: Arc<dyn InferenceEngine> = inference.clone();
    let state = AppState::new(test_pool().await, EventBus::new(EVENT_BUS_CAPACITY), engine, storage);

    TestApp {
        router: build_router(state.clone()),
        state,
        inference,
        root,
    }
}

/// App without an inference endpoint
pub async fn unconfigured_app() -> (Router, TempDir) {
    let (storage, root) = test_storage();
    let state = AppState::new(
        test_pool().await,
        EventBus::new(EVENT_BUS_CAPACITY),
        Arc::new(UnconfiguredInference),
        storage,
    );
    (build_router(state), root)
}

pub async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
    };
    (status, body)
}

pub async fn get(router: &Router, uri: &str) -> (StatusCode, Value) {
    send(router, Request::builder().uri(uri).body(Body::empty()).unwrap()).await
}

pub async fn delete(router: &Router, uri: &str) -> (StatusCode, Value) {
    send(
        router,
        Request::builder().method("DELETE").uri(uri).body(Body::empty()).unwrap(),
    )
    .await
}

pub async fn json_request(router: &Router, method: &str, uri: &str, body: Value) -> (StatusCode, Value) {
    send(
        router,
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
    )
    .await
}

/// multipart/form-data body builder
#[derive(Default)]
pub struct MultipartBody {
    body: Vec<u8>,
}

impl MultipartBody {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, name: &str, value: &str) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                BOUNDARY, name, value
            )
            .as_bytes(),
        );
        self
    }

    pub fn file(mut self, name: &str, file_name: &str, bytes: &[u8]) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: application/octet-stream\r\n\r\n",
                BOUNDARY, name, file_name
            )
            .as_bytes(),
        );
        self.body.extend_from_slice(bytes);
        self.body.extend_from_slice(b"\r\n");
        self
    }

    pub fn request(mut self, uri: &str) -> Request<Body> {
        self.body
            .extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(self.body))
            .unwrap()
    }
}

pub const JPEG_BYTES: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F', 0xFF, 0xD9];

/// Create a workplace with the items hamer, schaar, sleutel; returns its id
pub async fn create_workplace(router: &Router, name: &str) -> String {
    let (status, body) = json_request(
        router,
        "POST",
        "/api/workplaces",
        serde_json::json!({ "name": name, "items": ["hamer", "schaar", "sleutel"] }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    body["id"].as_str().unwrap().to_string()
}

/// Run one inspection through the stub engine
pub async fn inspect(app: &TestApp, workplace_id: &str, prediction: Prediction) -> (StatusCode, Value) {
    app.inference.respond_with(0, prediction);
    let request = MultipartBody::new()
        .file("file", "frame.jpg", JPEG_BYTES)
        .text("workplace_id", workplace_id)
        .request("/api/inspect");
    send(&app.router, request).await
}
