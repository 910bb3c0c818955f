//! Model version API handlers
//!
//! Upload, activation and deletion of trained model files.

use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;
use wpi_common::domain::model::{next_version_label, plan_activation, MODEL_FILE_EXTENSIONS};
use wpi_common::domain::{ModelStatus, ModelType, ModelVersion};
use wpi_common::events::WpiEvent;

use crate::api::upload::UploadForm;
use crate::db;
use crate::error::{ApiError, ApiResult};
use crate::storage::{file_extension, unique_file_name, StoragePaths};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ModelListQuery {
    pub status: Option<ModelStatus>,
}

#[derive(Debug, Serialize)]
pub struct ModelListResponse {
    pub models: Vec<ModelVersion>,
    pub active_model_id: Option<Uuid>,
    pub count: usize,
}

#[derive(Debug, Serialize)]
pub struct ActivationResponse {
    pub model: ModelVersion,
    /// Models archived by this activation
    pub archived: Vec<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct DeleteModelResponse {
    pub deleted: bool,
    pub file_removed: bool,
}

/// GET /api/workplaces/:id/models
pub async fn list_models(
    State(state): State<AppState>,
    Path(workplace_id): Path<Uuid>,
    Query(query): Query<ModelListQuery>,
) -> ApiResult<Json<ModelListResponse>> {
    db::workplaces::require_workplace(&state.db, workplace_id).await?;
    let models = db::models::list_models(&state.db, workplace_id, query.status).await?;
    let active_model_id = db::models::load_active_model(&state.db, workplace_id)
        .await?
        .map(|m| m.id);

    Ok(Json(ModelListResponse {
        count: models.len(),
        models,
        active_model_id,
    }))
}

fn validate_version(version: &str) -> ApiResult<String> {
    let version = version.trim();
    let valid = !version.is_empty()
        && version.len() <= 64
        && version
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
    if !valid {
        return Err(ApiError::BadRequest(format!(
            "Invalid model version '{}' (letters, digits, '.', '_' and '-' only)",
            version
        )));
    }
    Ok(version.to_string())
}

/// POST /api/workplaces/:id/models (multipart)
///
/// Fields: `file` (.pt or .onnx), optional `version`, `model_type`,
/// `test_accuracy` (percent) and `notes`. New models start as `uploaded`.
pub async fn upload_model(
    State(state): State<AppState>,
    Path(workplace_id): Path<Uuid>,
    multipart: Multipart,
) -> ApiResult<(StatusCode, Json<ModelVersion>)> {
    db::workplaces::require_workplace(&state.db, workplace_id).await?;
    let mut form = UploadForm::read(multipart, usize::MAX).await?;
    let file = form.take_file("file")?;

    let ext = file
        .file_name
        .as_deref()
        .and_then(file_extension)
        .filter(|ext| MODEL_FILE_EXTENSIONS.contains(&ext.as_str()))
        .ok_or_else(|| {
            ApiError::BadRequest(format!(
                "Model file must have one of the extensions: {}",
                MODEL_FILE_EXTENSIONS.join(", ")
            ))
        })?;
    if file.bytes.is_empty() {
        return Err(ApiError::BadRequest("Empty model file".to_string()));
    }

    let version = match form.text("version") {
        Some(version) => validate_version(version)?,
        None => {
            let existing = db::models::list_models(&state.db, workplace_id, None).await?;
            next_version_label(existing.len())
        }
    };
    let model_type: ModelType = form.parse("model_type")?.unwrap_or_default();
    let test_accuracy: Option<f64> = form.parse("test_accuracy")?;
    if let Some(accuracy) = test_accuracy {
        if !(0.0..=100.0).contains(&accuracy) {
            return Err(ApiError::BadRequest(format!(
                "test_accuracy must be a percentage between 0 and 100, got {}",
                accuracy
            )));
        }
    }

    let file_path = state
        .storage
        .write_file(
            &StoragePaths::model_dir(workplace_id),
            &unique_file_name(&version, &ext),
            &file.bytes,
        )
        .await?;

    let model = ModelVersion {
        id: Uuid::new_v4(),
        workplace_id,
        version,
        model_type,
        status: ModelStatus::Uploaded,
        test_accuracy,
        uploaded_at: Utc::now(),
        notes: form.text("notes").map(str::to_string),
        file_path,
    };

    if let Err(e) = db::models::insert_model(&state.db, &model).await {
        let _ = state.storage.remove_file(&model.file_path).await;
        return Err(e.into());
    }

    info!(
        model_id = %model.id,
        workplace_id = %workplace_id,
        version = %model.version,
        model_type = %model.model_type,
        bytes = file.bytes.len(),
        "Model uploaded"
    );
    Ok((StatusCode::CREATED, Json(model)))
}

/// POST /api/models/:id/activate
///
/// Archives the previously active model of the workplace in the same
/// transaction.
pub async fn activate_model(
    State(state): State<AppState>,
    Path(model_id): Path<Uuid>,
) -> ApiResult<Json<ActivationResponse>> {
    let target = db::models::require_model(&state.db, model_id).await?;
    let models = db::models::list_models(&state.db, target.workplace_id, None).await?;
    let plan = plan_activation(&models, model_id)?;

    db::models::apply_activation(&state.db, &plan).await?;
    let model = db::models::require_model(&state.db, model_id).await?;

    info!(
        model_id = %model.id,
        workplace_id = %model.workplace_id,
        version = %model.version,
        archived = plan.archive.len(),
        "Model activated"
    );
    state.event_bus.emit_lossy(WpiEvent::ModelActivated {
        workplace_id: model.workplace_id,
        model_id: model.id,
        version: model.version.clone(),
        archived_model_id: plan.archive.first().copied(),
        timestamp: Utc::now(),
    });

    Ok(Json(ActivationResponse {
        model,
        archived: plan.archive,
    }))
}

/// DELETE /api/models/:id
///
/// The active model cannot be deleted; activate another one first.
pub async fn delete_model(
    State(state): State<AppState>,
    Path(model_id): Path<Uuid>,
) -> ApiResult<Json<DeleteModelResponse>> {
    let model = db::models::require_model(&state.db, model_id).await?;
    if model.status == ModelStatus::Active {
        return Err(ApiError::Conflict(format!(
            "Model {} is the active model of its workplace",
            model.version
        )));
    }

    let deleted = db::models::delete_model(&state.db, model_id).await?;
    let file_removed = state.storage.remove_file(&model.file_path).await?;

    info!(model_id = %model_id, version = %model.version, "Model deleted");
    Ok(Json(DeleteModelResponse { deleted, file_removed }))
}

/// Build model routes
pub fn model_routes() -> Router<AppState> {
    Router::new()
        .route("/api/workplaces/:id/models", get(list_models).post(upload_model))
        .route("/api/models/:id/activate", post(activate_model))
        .route("/api/models/:id", delete(delete_model))
}
