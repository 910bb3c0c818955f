//! wpi-is library interface
//!
//! Exposes the router and state so integration tests can drive the service
//! without binding a socket.

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod services;
pub mod storage;

pub use crate::error::{ApiError, ApiResult};

use axum::extract::DefaultBodyLimit;
use axum::Router;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use wpi_common::events::EventBus;

use crate::services::InferenceEngine;
use crate::storage::{StoragePaths, UPLOADS_DIR};

/// Capacity of the progress event channel
pub const EVENT_BUS_CAPACITY: usize = 256;

/// Hard request body limit; per-upload limits come from runtime settings
const MAX_BODY_BYTES: usize = 256 * 1024 * 1024;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    /// Inspection progress for SSE subscribers
    pub event_bus: EventBus,
    pub inference: Arc<dyn InferenceEngine>,
    pub storage: StoragePaths,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    /// Last server-side error, reported by /health
    pub last_error: Arc<RwLock<Option<String>>>,
}

impl AppState {
    pub fn new(
        db: SqlitePool,
        event_bus: EventBus,
        inference: Arc<dyn InferenceEngine>,
        storage: StoragePaths,
    ) -> Self {
        Self {
            db,
            event_bus,
            inference,
            storage,
            startup_time: Utc::now(),
            last_error: Arc::new(RwLock::new(None)),
        }
    }

    /// Remember an error for the health endpoint
    pub async fn record_error(&self, message: impl Into<String>) {
        *self.last_error.write().await = Some(message.into());
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::get;

    let uploads = ServeDir::new(state.storage.root().join(UPLOADS_DIR));

    Router::new()
        .merge(api::health_routes())
        .route("/events", get(api::event_stream))
        .merge(api::workplace_routes())
        .merge(api::model_routes())
        .merge(api::training_image_routes())
        .merge(api::inspection_routes())
        .merge(api::analysis_routes())
        .merge(api::training_routes())
        .merge(api::performance_routes())
        .merge(api::settings_routes())
        .nest_service("/uploads", uploads)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
