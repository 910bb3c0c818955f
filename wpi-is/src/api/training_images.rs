//! Training image API handlers
//!
//! Labeled images feed the dataset completion view and the dataset export.
//! Every change emits `DatasetChanged` for the workplace.

use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;
use wpi_common::category::CategoryTable;
use wpi_common::domain::workplace::parse_item_list;
use wpi_common::domain::{ImageSource, TrainingImage, TrainingLabel, Workplace};
use wpi_common::events::WpiEvent;

use crate::api::upload::{UploadForm, UploadedFile};
use crate::config::load_runtime_settings;
use crate::db;
use crate::error::{ApiError, ApiResult};
use crate::services::inspection::category_for_training_label;
use crate::storage::{image_extension, unique_file_name, StoragePaths};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ImageListQuery {
    #[serde(default)]
    pub validated_only: bool,
}

#[derive(Debug, Serialize)]
pub struct ImageListResponse {
    pub images: Vec<TrainingImage>,
    pub count: usize,
}

#[derive(Debug, Deserialize)]
pub struct UpdateImageRequest {
    pub label: Option<String>,
    pub missing_items: Option<Vec<String>>,
    pub validated: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct BatchFailure {
    pub file_name: String,
    pub error: String,
}

#[derive(Debug, Serialize)]
pub struct BatchUploadResponse {
    pub succeeded: usize,
    pub failed: usize,
    pub errors: Vec<BatchFailure>,
    pub images: Vec<TrainingImage>,
}

#[derive(Debug, Serialize)]
pub struct DeleteImageResponse {
    pub deleted: bool,
    pub file_removed: bool,
}

/// Label from `missing_items` (preferred) or a label string
///
/// Returns the label and, for labeled images, the class code of the
/// workplace table.
pub fn resolve_label(
    table: &CategoryTable,
    label: Option<&str>,
    missing_items: Option<&[String]>,
) -> ApiResult<(TrainingLabel, Option<String>)> {
    let label = match (missing_items, label) {
        (Some(missing), _) => TrainingLabel::from_missing(table.items(), missing)?,
        (None, Some(raw)) => {
            let label: TrainingLabel = raw.parse()?;
            label.validate_for(table.items())?;
            label
        }
        (None, None) => TrainingLabel::Unlabeled,
    };

    let class_id = if label.is_labeled() {
        Some(category_for_training_label(table, &label)?.class_id)
    } else {
        None
    };
    Ok((label, class_id))
}

/// `missing_items` form field: JSON array or comma separated names
fn form_missing_items(form: &UploadForm) -> ApiResult<Option<Vec<String>>> {
    let Some(raw) = form.text("missing_items") else {
        return Ok(None);
    };
    if raw.starts_with('[') {
        let items: Vec<String> = serde_json::from_str(raw)
            .map_err(|e| ApiError::BadRequest(format!("Invalid missing_items: {}", e)))?;
        return Ok(Some(items));
    }
    Ok(Some(parse_item_list(raw)?))
}

async fn store_image(
    state: &AppState,
    workplace: &Workplace,
    file: &UploadedFile,
    label: &TrainingLabel,
    class_id: Option<&str>,
    validated: bool,
    max_bytes: usize,
) -> ApiResult<TrainingImage> {
    if file.bytes.is_empty() {
        return Err(ApiError::BadRequest("Empty image upload".to_string()));
    }
    if file.bytes.len() > max_bytes {
        return Err(ApiError::BadRequest(format!(
            "Image exceeds the upload limit of {} bytes",
            max_bytes
        )));
    }
    let ext = image_extension(file.file_name.as_deref())?;
    let image_path = state
        .storage
        .write_file(
            &StoragePaths::training_image_dir(workplace.id),
            &unique_file_name("train", &ext),
            &file.bytes,
        )
        .await?;

    let image = TrainingImage {
        id: Uuid::new_v4(),
        workplace_id: workplace.id,
        image_path,
        label: label.clone(),
        class_id: class_id.map(str::to_string),
        source: ImageSource::ManualUpload,
        validated,
        created_at: Utc::now(),
    };

    if let Err(e) = db::training_images::insert_image(&state.db, &image).await {
        let _ = state.storage.remove_file(&image.image_path).await;
        return Err(e.into());
    }
    Ok(image)
}

fn dataset_changed(state: &AppState, workplace_id: Uuid) {
    state.event_bus.emit_lossy(WpiEvent::DatasetChanged {
        workplace_id,
        timestamp: Utc::now(),
    });
}

/// GET /api/workplaces/:id/training-images
pub async fn list_images(
    State(state): State<AppState>,
    Path(workplace_id): Path<Uuid>,
    Query(query): Query<ImageListQuery>,
) -> ApiResult<Json<ImageListResponse>> {
    db::workplaces::require_workplace(&state.db, workplace_id).await?;
    let images = db::training_images::list_images(&state.db, workplace_id, query.validated_only).await?;
    Ok(Json(ImageListResponse {
        count: images.len(),
        images,
    }))
}

/// POST /api/workplaces/:id/training-images (multipart)
///
/// Fields: `file`, `label` or `missing_items`, optional `validated`.
pub async fn upload_image(
    State(state): State<AppState>,
    Path(workplace_id): Path<Uuid>,
    multipart: Multipart,
) -> ApiResult<(StatusCode, Json<TrainingImage>)> {
    let workplace = db::workplaces::require_workplace(&state.db, workplace_id).await?;
    let table = db::category_codes::table_for(&state.db, &workplace).await?;
    let settings = load_runtime_settings(&state.db).await?;

    let mut form = UploadForm::read(multipart, settings.max_upload_bytes).await?;
    let missing = form_missing_items(&form)?;
    let (label, class_id) = resolve_label(&table, form.text("label"), missing.as_deref())?;
    let validated = form.flag("validated", false)?;
    let file = form.take_file("file")?;

    let image = store_image(
        &state,
        &workplace,
        &file,
        &label,
        class_id.as_deref(),
        validated,
        settings.max_upload_bytes,
    )
    .await?;
    dataset_changed(&state, workplace_id);

    info!(image_id = %image.id, workplace_id = %workplace_id, label = %image.label, "Training image added");
    Ok((StatusCode::CREATED, Json(image)))
}

/// POST /api/workplaces/:id/training-images/batch (multipart)
///
/// Every `file` part shares one label. A failing file is reported and the
/// batch continues.
pub async fn upload_batch(
    State(state): State<AppState>,
    Path(workplace_id): Path<Uuid>,
    multipart: Multipart,
) -> ApiResult<Json<BatchUploadResponse>> {
    let workplace = db::workplaces::require_workplace(&state.db, workplace_id).await?;
    let table = db::category_codes::table_for(&state.db, &workplace).await?;
    let settings = load_runtime_settings(&state.db).await?;

    // Oversized files fail individually below
    let form = UploadForm::read(multipart, usize::MAX).await?;
    let missing = form_missing_items(&form)?;
    let (label, class_id) = resolve_label(&table, form.text("label"), missing.as_deref())?;
    let validated = form.flag("validated", false)?;

    let files: Vec<&UploadedFile> = form.files.iter().filter(|f| f.field == "file").collect();
    if files.is_empty() {
        return Err(ApiError::BadRequest("No files in batch upload".to_string()));
    }

    let mut images = Vec::with_capacity(files.len());
    let mut errors = Vec::new();
    for file in files {
        let stored = store_image(
            &state,
            &workplace,
            file,
            &label,
            class_id.as_deref(),
            validated,
            settings.max_upload_bytes,
        )
        .await;
        match stored {
            Ok(image) => images.push(image),
            Err(e) => {
                let file_name = file.file_name.clone().unwrap_or_default();
                warn!(file = %file_name, error = %e, "Batch upload: file rejected");
                errors.push(BatchFailure {
                    file_name,
                    error: e.to_string(),
                });
            }
        }
    }

    if !images.is_empty() {
        dataset_changed(&state, workplace_id);
    }
    info!(
        workplace_id = %workplace_id,
        label = %label,
        succeeded = images.len(),
        failed = errors.len(),
        "Batch upload finished"
    );

    Ok(Json(BatchUploadResponse {
        succeeded: images.len(),
        failed: errors.len(),
        errors,
        images,
    }))
}

/// PUT /api/training-images/:id
pub async fn update_image(
    State(state): State<AppState>,
    Path(image_id): Path<Uuid>,
    Json(request): Json<UpdateImageRequest>,
) -> ApiResult<Json<TrainingImage>> {
    let mut image = db::training_images::require_image(&state.db, image_id).await?;

    if request.label.is_some() || request.missing_items.is_some() {
        let workplace = db::workplaces::require_workplace(&state.db, image.workplace_id).await?;
        let table = db::category_codes::table_for(&state.db, &workplace).await?;
        let (label, class_id) = resolve_label(
            &table,
            request.label.as_deref(),
            request.missing_items.as_deref(),
        )?;
        image.label = label;
        image.class_id = class_id;
    }
    if let Some(validated) = request.validated {
        image.validated = validated;
    }

    db::training_images::update_image(
        &state.db,
        image_id,
        &image.label,
        image.class_id.as_deref(),
        image.validated,
    )
    .await?;
    dataset_changed(&state, image.workplace_id);

    Ok(Json(image))
}

/// DELETE /api/training-images/:id
pub async fn delete_image(
    State(state): State<AppState>,
    Path(image_id): Path<Uuid>,
) -> ApiResult<Json<DeleteImageResponse>> {
    let image = db::training_images::delete_image(&state.db, image_id).await?;
    let file_removed = state.storage.remove_file(&image.image_path).await?;
    dataset_changed(&state, image.workplace_id);

    info!(image_id = %image_id, workplace_id = %image.workplace_id, "Training image deleted");
    Ok(Json(DeleteImageResponse {
        deleted: true,
        file_removed,
    }))
}

/// Build training image routes
pub fn training_image_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/api/workplaces/:id/training-images",
            get(list_images).post(upload_image),
        )
        .route("/api/workplaces/:id/training-images/batch", post(upload_batch))
        .route("/api/training-images/:id", put(update_image).delete(delete_image))
}
