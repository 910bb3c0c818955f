//! Analysis history API handlers
//!
//! Review history, reviewer corrections, deletion and CSV export.

use axum::{
    extract::{Path, Query, State},
    http::header,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;
use wpi_common::domain::Analysis;

use crate::db;
use crate::db::analyses::{AnalysisFilter, AnalysisStatistics};
use crate::error::ApiResult;
use crate::services::correction::{apply_correction, CorrectionRequest, CorrectionResult};
use crate::services::csv_export::analyses_to_csv;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct AnalysisListResponse {
    pub analyses: Vec<Analysis>,
    pub count: usize,
    pub statistics: AnalysisStatistics,
}

#[derive(Debug, Serialize)]
pub struct DeleteAnalysisResponse {
    pub deleted: bool,
    pub image_removed: bool,
}

#[derive(Debug, Deserialize)]
pub struct BulkDeleteRequest {
    pub ids: Vec<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct BulkFailure {
    pub id: Uuid,
    pub error: String,
}

#[derive(Debug, Serialize)]
pub struct BulkDeleteResponse {
    pub succeeded: usize,
    pub failed: usize,
    pub errors: Vec<BulkFailure>,
}

#[derive(Debug, Deserialize)]
pub struct CsvQuery {
    pub workplace_id: Option<Uuid>,
}

/// GET /api/analyses
pub async fn list_analyses(
    State(state): State<AppState>,
    Query(filter): Query<AnalysisFilter>,
) -> ApiResult<Json<AnalysisListResponse>> {
    let analyses = db::analyses::list_analyses(&state.db, &filter).await?;
    let statistics = db::analyses::statistics(&state.db, filter.workplace_id).await?;
    Ok(Json(AnalysisListResponse {
        count: analyses.len(),
        analyses,
        statistics,
    }))
}

/// GET /api/analyses/:id
pub async fn get_analysis(
    State(state): State<AppState>,
    Path(analysis_id): Path<Uuid>,
) -> ApiResult<Json<Analysis>> {
    Ok(Json(db::analyses::require_analysis(&state.db, analysis_id).await?))
}

/// POST /api/analyses/:id/correction
pub async fn correct_analysis(
    State(state): State<AppState>,
    Path(analysis_id): Path<Uuid>,
    Json(request): Json<CorrectionRequest>,
) -> ApiResult<Json<CorrectionResult>> {
    Ok(Json(apply_correction(&state, analysis_id, request).await?))
}

async fn remove_analysis(state: &AppState, analysis_id: Uuid) -> ApiResult<bool> {
    let analysis = db::analyses::delete_analysis(&state.db, analysis_id).await?;
    let image_removed = match &analysis.image_path {
        Some(path) => state.storage.remove_file(path).await?,
        None => false,
    };
    info!(analysis_id = %analysis_id, image_removed, "Analysis deleted");
    Ok(image_removed)
}

/// DELETE /api/analyses/:id
pub async fn delete_analysis(
    State(state): State<AppState>,
    Path(analysis_id): Path<Uuid>,
) -> ApiResult<Json<DeleteAnalysisResponse>> {
    let image_removed = remove_analysis(&state, analysis_id).await?;
    Ok(Json(DeleteAnalysisResponse {
        deleted: true,
        image_removed,
    }))
}

/// POST /api/analyses/bulk-delete
///
/// Each id is deleted on its own; failures are reported per id.
pub async fn bulk_delete(
    State(state): State<AppState>,
    Json(request): Json<BulkDeleteRequest>,
) -> ApiResult<Json<BulkDeleteResponse>> {
    let mut succeeded = 0;
    let mut errors = Vec::new();

    for id in request.ids {
        match remove_analysis(&state, id).await {
            Ok(_) => succeeded += 1,
            Err(e) => {
                warn!(analysis_id = %id, error = %e, "Bulk delete: analysis not deleted");
                errors.push(BulkFailure {
                    id,
                    error: e.to_string(),
                });
            }
        }
    }

    Ok(Json(BulkDeleteResponse {
        succeeded,
        failed: errors.len(),
        errors,
    }))
}

/// GET /api/analyses/export.csv
pub async fn export_csv(
    State(state): State<AppState>,
    Query(query): Query<CsvQuery>,
) -> ApiResult<impl IntoResponse> {
    let filter = AnalysisFilter {
        workplace_id: query.workplace_id,
        ..Default::default()
    };
    let analyses = db::analyses::list_analyses(&state.db, &filter).await?;
    let body = analyses_to_csv(&analyses)?;

    let file_name = format!("analyses_{}.csv", Utc::now().format("%Y%m%d_%H%M%S"));
    info!(rows = analyses.len(), file = %file_name, "Analyses exported to CSV");

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", file_name),
            ),
        ],
        body,
    ))
}

/// Build analysis routes
pub fn analysis_routes() -> Router<AppState> {
    Router::new()
        .route("/api/analyses", get(list_analyses))
        .route("/api/analyses/export.csv", get(export_csv))
        .route("/api/analyses/bulk-delete", post(bulk_delete))
        .route("/api/analyses/:id", get(get_analysis).delete(delete_analysis))
        .route("/api/analyses/:id/correction", post(correct_analysis))
}
