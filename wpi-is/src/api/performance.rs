//! Model performance API handlers

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use wpi_common::performance::{accuracy_timeline, compare_models, ModelPerformance, TimelinePoint};

use crate::config::load_runtime_settings;
use crate::db;
use crate::error::{ApiError, ApiResult};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct PerformanceQuery {
    /// Length of the per-model error lists; defaults to the runtime setting
    pub top_k: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct PerformanceResponse {
    pub workplace_id: Uuid,
    pub active_model_id: Option<Uuid>,
    pub models: Vec<ModelPerformance>,
}

#[derive(Debug, Deserialize)]
pub struct TimelineQuery {
    pub workplace_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct TimelineResponse {
    pub weeks: Vec<TimelinePoint>,
}

/// GET /api/workplaces/:id/performance
pub async fn workplace_performance(
    State(state): State<AppState>,
    Path(workplace_id): Path<Uuid>,
    Query(query): Query<PerformanceQuery>,
) -> ApiResult<Json<PerformanceResponse>> {
    let top_k = match query.top_k {
        Some(0) => return Err(ApiError::BadRequest("top_k must be at least 1".to_string())),
        Some(k) => k,
        None => load_runtime_settings(&state.db).await?.performance_top_k,
    };

    let workplace = db::workplaces::require_workplace(&state.db, workplace_id).await?;
    let table = db::category_codes::table_for(&state.db, &workplace).await?;
    let models = db::models::list_models(&state.db, workplace_id, None).await?;
    let analyses = db::analyses::load_all(&state.db, Some(workplace_id)).await?;

    let mut performance = compare_models(&models, &analyses, Some(&table));
    for entry in &mut performance {
        entry.top_errors.truncate(top_k);
        entry.confusions.truncate(top_k);
    }

    let active_model_id = db::models::load_active_model(&state.db, workplace_id)
        .await?
        .map(|m| m.id);

    Ok(Json(PerformanceResponse {
        workplace_id,
        active_model_id,
        models: performance,
    }))
}

/// GET /api/accuracy-timeline
pub async fn timeline(
    State(state): State<AppState>,
    Query(query): Query<TimelineQuery>,
) -> ApiResult<Json<TimelineResponse>> {
    let analyses = db::analyses::load_all(&state.db, query.workplace_id).await?;
    Ok(Json(TimelineResponse {
        weeks: accuracy_timeline(&analyses),
    }))
}

/// Build performance routes
pub fn performance_routes() -> Router<AppState> {
    Router::new()
        .route("/api/workplaces/:id/performance", get(workplace_performance))
        .route("/api/accuracy-timeline", get(timeline))
}
