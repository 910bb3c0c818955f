//! Training data API handlers
//!
//! Candidate review queue, review progress and export of selected analyses
//! into a training partition.

use axum::{
    extract::{Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use wpi_common::candidates::{
    select_candidates, training_statistics, CandidateReason, CandidateThreshold, TrainingStatistics,
};
use wpi_common::domain::Analysis;

use crate::config::load_runtime_settings;
use crate::db;
use crate::error::ApiResult;
use crate::services::training_export::{export_training_data, TrainingExportRequest, TrainingExportResult};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct CandidateQuery {
    /// Percent, 50–95; defaults to the runtime setting
    pub confidence_threshold: Option<f64>,
    pub workplace_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct CandidateEntry {
    #[serde(flatten)]
    pub analysis: Analysis,
    pub reason: CandidateReason,
}

#[derive(Debug, Serialize)]
pub struct CandidateListResponse {
    pub candidates: Vec<CandidateEntry>,
    pub count: usize,
    pub confidence_threshold: f64,
}

#[derive(Debug, Deserialize)]
pub struct StatisticsQuery {
    pub workplace_id: Option<Uuid>,
}

/// GET /api/training/candidates
///
/// Analyses not yet exported that the reviewer corrected or the model was
/// unsure about, newest first.
pub async fn list_candidates(
    State(state): State<AppState>,
    Query(query): Query<CandidateQuery>,
) -> ApiResult<Json<CandidateListResponse>> {
    let threshold = match query.confidence_threshold {
        Some(percent) => CandidateThreshold::new(percent)?,
        None => load_runtime_settings(&state.db).await?.candidate_threshold()?,
    };

    let analyses: Vec<Analysis> = db::analyses::load_all(&state.db, query.workplace_id)
        .await?
        .into_iter()
        .filter(|a| !a.exported_for_training)
        .collect();

    let mut candidates: Vec<CandidateEntry> = select_candidates(&analyses, threshold)
        .into_iter()
        .map(|candidate| CandidateEntry {
            analysis: candidate.analysis.clone(),
            reason: candidate.reason,
        })
        .collect();
    candidates.sort_by(|a, b| b.analysis.created_at.cmp(&a.analysis.created_at));

    Ok(Json(CandidateListResponse {
        count: candidates.len(),
        candidates,
        confidence_threshold: threshold.percent(),
    }))
}

/// GET /api/training/statistics
pub async fn get_statistics(
    State(state): State<AppState>,
    Query(query): Query<StatisticsQuery>,
) -> ApiResult<Json<TrainingStatistics>> {
    let settings = load_runtime_settings(&state.db).await?;
    let analyses = db::analyses::load_all(&state.db, query.workplace_id).await?;
    Ok(Json(training_statistics(
        &analyses,
        settings.candidate_threshold()?,
        settings.training_target,
    )))
}

/// POST /api/training/export
pub async fn export_training(
    State(state): State<AppState>,
    Json(request): Json<TrainingExportRequest>,
) -> ApiResult<Json<TrainingExportResult>> {
    Ok(Json(export_training_data(&state, request).await?))
}

/// Build training routes
pub fn training_routes() -> Router<AppState> {
    Router::new()
        .route("/api/training/candidates", get(list_candidates))
        .route("/api/training/statistics", get(get_statistics))
        .route("/api/training/export", post(export_training))
}
