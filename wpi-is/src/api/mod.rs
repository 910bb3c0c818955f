//! HTTP API handlers for wpi-is
//!
//! REST endpoints under `/api`, SSE progress under `/api/inspect/progress`.

pub mod analyses;
pub mod health;
pub mod inspections;
pub mod models;
pub mod performance;
pub mod settings;
pub mod training;
pub mod training_images;
pub mod upload;
pub mod workplaces;

pub use analyses::analysis_routes;
pub use health::health_routes;
pub use inspections::inspection_routes;
pub use models::model_routes;
pub use performance::performance_routes;
pub use settings::settings_routes;
pub use training::training_routes;
pub use training_images::training_image_routes;
pub use workplaces::workplace_routes;

use axum::extract::State;
use axum::response::IntoResponse;

use crate::AppState;

/// GET /events
///
/// Connection indicator plus `ModelActivated` and `DatasetChanged` events.
pub async fn event_stream(State(state): State<AppState>) -> impl IntoResponse {
    wpi_common::sse::create_general_sse_stream(&state.event_bus, "wpi-is")
}
