//! Workplace management API handlers
//!
//! CRUD, category table, reference photo, whiteboard region, dataset
//! completion and dataset export.

use axum::{
    extract::{Multipart, Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;
use wpi_common::category::{legacy_discrepancies, Category, CategoryDiscrepancy, CategoryTable};
use wpi_common::completion::{compute_completion, DatasetCompletion};
use wpi_common::domain::workplace::{
    normalize_items, parse_item_list, validate_confidence_threshold, DEFAULT_CONFIDENCE_THRESHOLD,
};
use wpi_common::domain::{ModelVersion, WhiteboardRegion, Workplace};
use wpi_common::events::WpiEvent;

use crate::api::upload::UploadForm;
use crate::config::load_runtime_settings;
use crate::db;
use crate::db::dataset_exports::DatasetExport;
use crate::error::{ApiError, ApiResult};
use crate::services::dataset_export::{export_dataset, DatasetExportResult};
use crate::storage::{image_extension, unique_file_name, StoragePaths, REFERENCE_PHOTOS_DIR};
use crate::AppState;

/// Checklist as a JSON array or as comma separated text
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ItemList {
    List(Vec<String>),
    Text(String),
}

impl ItemList {
    fn normalize(&self) -> ApiResult<Vec<String>> {
        Ok(match self {
            ItemList::List(items) => normalize_items(items)?,
            ItemList::Text(raw) => parse_item_list(raw)?,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateWorkplaceRequest {
    pub name: String,
    pub description: Option<String>,
    pub items: ItemList,
    pub confidence_threshold: Option<f64>,
    pub active: Option<bool>,
}

/// Partial update; absent fields keep their value
#[derive(Debug, Deserialize)]
pub struct UpdateWorkplaceRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub items: Option<ItemList>,
    pub confidence_threshold: Option<f64>,
    pub active: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub active_only: bool,
}

#[derive(Debug, Serialize)]
pub struct WorkplaceListResponse {
    pub workplaces: Vec<Workplace>,
    pub count: usize,
}

#[derive(Debug, Serialize)]
pub struct WorkplaceDetailResponse {
    pub workplace: Workplace,
    pub active_model: Option<ModelVersion>,
    pub models: Vec<ModelVersion>,
    pub dataset_stats: DatasetCompletion,
    pub exports: Vec<DatasetExport>,
}

#[derive(Debug, Serialize)]
pub struct CategoryTableResponse {
    pub workplace_id: Uuid,
    pub items: Vec<String>,
    pub categories: Vec<Category>,
    /// Subsets the old three-item resolver coded differently
    pub legacy_discrepancies: Vec<CategoryDiscrepancy>,
}

#[derive(Debug, Deserialize)]
pub struct ExportQuery {
    pub train_split: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub deleted: bool,
}

fn validate_name(name: &str) -> ApiResult<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ApiError::BadRequest("Workplace name must not be empty".to_string()));
    }
    Ok(name.to_string())
}

fn clean_description(description: Option<String>) -> Option<String> {
    description
        .map(|d| d.trim().to_string())
        .filter(|d| !d.is_empty())
}

/// GET /api/workplaces
pub async fn list_workplaces(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<WorkplaceListResponse>> {
    let workplaces = db::workplaces::list_workplaces(&state.db, query.active_only).await?;
    Ok(Json(WorkplaceListResponse {
        count: workplaces.len(),
        workplaces,
    }))
}

/// POST /api/workplaces
///
/// Stores the workplace and its category table in one transaction.
pub async fn create_workplace(
    State(state): State<AppState>,
    Json(request): Json<CreateWorkplaceRequest>,
) -> ApiResult<(StatusCode, Json<Workplace>)> {
    let items = request.items.normalize()?;
    let table = CategoryTable::generate(&items)?;
    let now = Utc::now();

    let workplace = Workplace {
        id: Uuid::new_v4(),
        name: validate_name(&request.name)?,
        description: clean_description(request.description),
        items,
        reference_photo: None,
        whiteboard_region: None,
        confidence_threshold: validate_confidence_threshold(
            request.confidence_threshold.unwrap_or(DEFAULT_CONFIDENCE_THRESHOLD),
        )?,
        active: request.active.unwrap_or(true),
        created_at: now,
        updated_at: now,
    };

    let mut tx = state.db.begin().await?;
    db::workplaces::insert_workplace(&mut tx, &workplace).await?;
    db::category_codes::replace_table(&mut tx, workplace.id, &table).await?;
    tx.commit().await?;

    info!(
        workplace_id = %workplace.id,
        name = %workplace.name,
        items = workplace.items.len(),
        categories = table.len(),
        "Workplace created"
    );
    Ok((StatusCode::CREATED, Json(workplace)))
}

async fn dataset_completion(state: &AppState, workplace: &Workplace) -> ApiResult<DatasetCompletion> {
    let targets = load_runtime_settings(&state.db).await?.scenario_targets();
    let labels = db::training_images::list_labels(&state.db, workplace.id).await?;
    let validated = db::training_images::count_validated(&state.db, workplace.id).await?;
    Ok(compute_completion(&labels, &workplace.items, &targets).with_validated(validated))
}

/// GET /api/workplaces/:id
pub async fn get_workplace(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<WorkplaceDetailResponse>> {
    let workplace = db::workplaces::require_workplace(&state.db, id).await?;
    let models = db::models::list_models(&state.db, id, None).await?;
    let active_model = db::models::load_active_model(&state.db, id).await?;
    let dataset_stats = dataset_completion(&state, &workplace).await?;
    let exports = db::dataset_exports::list_exports(&state.db, id).await?;

    Ok(Json(WorkplaceDetailResponse {
        workplace,
        active_model,
        models,
        dataset_stats,
        exports,
    }))
}

/// PUT /api/workplaces/:id
///
/// A changed item list regenerates the category table in the same
/// transaction.
pub async fn update_workplace(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateWorkplaceRequest>,
) -> ApiResult<Json<Workplace>> {
    let mut workplace = db::workplaces::require_workplace(&state.db, id).await?;

    if let Some(name) = &request.name {
        workplace.name = validate_name(name)?;
    }
    if request.description.is_some() {
        workplace.description = clean_description(request.description);
    }
    if let Some(threshold) = request.confidence_threshold {
        workplace.confidence_threshold = validate_confidence_threshold(threshold)?;
    }
    if let Some(active) = request.active {
        workplace.active = active;
    }

    let new_table = match &request.items {
        Some(items) => {
            let items = items.normalize()?;
            if items != workplace.items {
                let table = CategoryTable::generate(&items)?;
                workplace.items = items;
                Some(table)
            } else {
                None
            }
        }
        None => None,
    };
    workplace.updated_at = Utc::now();

    let mut tx = state.db.begin().await?;
    db::workplaces::update_workplace(&mut tx, &workplace).await?;
    if let Some(table) = &new_table {
        db::category_codes::replace_table(&mut tx, workplace.id, table).await?;
    }
    tx.commit().await?;

    if new_table.is_some() {
        warn!(
            workplace_id = %workplace.id,
            items = ?workplace.items,
            "Item list changed, category table regenerated"
        );
        state.event_bus.emit_lossy(WpiEvent::DatasetChanged {
            workplace_id: workplace.id,
            timestamp: Utc::now(),
        });
    }
    info!(workplace_id = %workplace.id, "Workplace updated");

    Ok(Json(workplace))
}

async fn remove_dir_if_present(storage: &StoragePaths, relative: &str) -> ApiResult<()> {
    let dir = storage.resolve(relative)?;
    match tokio::fs::remove_dir_all(&dir).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// DELETE /api/workplaces/:id
///
/// Models, training images and category codes go with the workplace;
/// analyses stay for history with their workplace cleared.
pub async fn delete_workplace(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<DeleteResponse>> {
    let workplace = db::workplaces::require_workplace(&state.db, id).await?;
    db::workplaces::delete_workplace(&state.db, id).await?;

    if let Some(photo) = &workplace.reference_photo {
        state.storage.remove_file(photo).await?;
    }
    remove_dir_if_present(&state.storage, &StoragePaths::model_dir(id)).await?;
    remove_dir_if_present(&state.storage, &StoragePaths::training_image_dir(id)).await?;

    info!(workplace_id = %id, name = %workplace.name, "Workplace deleted");
    Ok(Json(DeleteResponse { deleted: true }))
}

/// GET /api/workplaces/:id/categories
pub async fn get_categories(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<CategoryTableResponse>> {
    let workplace = db::workplaces::require_workplace(&state.db, id).await?;
    let table = db::category_codes::table_for(&state.db, &workplace).await?;

    Ok(Json(CategoryTableResponse {
        workplace_id: id,
        items: table.items().to_vec(),
        categories: table.categories().to_vec(),
        legacy_discrepancies: legacy_discrepancies(&table),
    }))
}

/// POST /api/workplaces/:id/reference-photo (multipart `file`)
pub async fn upload_reference_photo(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    multipart: Multipart,
) -> ApiResult<Json<Workplace>> {
    let mut workplace = db::workplaces::require_workplace(&state.db, id).await?;
    let settings = load_runtime_settings(&state.db).await?;
    let mut form = UploadForm::read(multipart, settings.max_upload_bytes).await?;
    let file = form.take_file("file")?;
    if file.bytes.is_empty() {
        return Err(ApiError::BadRequest("Empty image upload".to_string()));
    }

    let ext = image_extension(file.file_name.as_deref())?;
    let path = state
        .storage
        .write_file(REFERENCE_PHOTOS_DIR, &unique_file_name(&format!("workplace_{}", id), &ext), &file.bytes)
        .await?;

    let previous = workplace.reference_photo.replace(path);
    workplace.updated_at = Utc::now();
    let mut conn = state.db.acquire().await?;
    db::workplaces::update_workplace(&mut conn, &workplace).await?;

    if let Some(previous) = previous {
        state.storage.remove_file(&previous).await?;
    }
    info!(workplace_id = %id, "Reference photo updated");
    Ok(Json(workplace))
}

/// PUT /api/workplaces/:id/whiteboard-region
pub async fn set_whiteboard_region(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(region): Json<WhiteboardRegion>,
) -> ApiResult<Json<Workplace>> {
    region.validate()?;
    let mut workplace = db::workplaces::require_workplace(&state.db, id).await?;
    workplace.whiteboard_region = Some(region);
    workplace.updated_at = Utc::now();

    let mut conn = state.db.acquire().await?;
    db::workplaces::update_workplace(&mut conn, &workplace).await?;
    Ok(Json(workplace))
}

/// DELETE /api/workplaces/:id/whiteboard-region
pub async fn clear_whiteboard_region(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Workplace>> {
    let mut workplace = db::workplaces::require_workplace(&state.db, id).await?;
    workplace.whiteboard_region = None;
    workplace.updated_at = Utc::now();

    let mut conn = state.db.acquire().await?;
    db::workplaces::update_workplace(&mut conn, &workplace).await?;
    Ok(Json(workplace))
}

/// GET /api/workplaces/:id/dataset-stats
pub async fn get_dataset_stats(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<DatasetCompletion>> {
    let workplace = db::workplaces::require_workplace(&state.db, id).await?;
    Ok(Json(dataset_completion(&state, &workplace).await?))
}

/// POST /api/workplaces/:id/export-dataset?train_split=
///
/// Answers with the zip archive as a download.
pub async fn export_workplace_dataset(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<ExportQuery>,
) -> ApiResult<Response> {
    let train_split = match query.train_split {
        Some(split) => split,
        None => load_runtime_settings(&state.db).await?.dataset_train_split,
    };

    let DatasetExportResult { export, file_name, .. } = export_dataset(&state, id, train_split).await?;
    let bytes = tokio::fs::read(state.storage.resolve(&export.archive_path)?).await?;

    Ok((
        [
            (header::CONTENT_TYPE, "application/zip".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", file_name),
            ),
        ],
        bytes,
    )
        .into_response())
}

/// Build workplace routes
pub fn workplace_routes() -> Router<AppState> {
    Router::new()
        .route("/api/workplaces", get(list_workplaces).post(create_workplace))
        .route(
            "/api/workplaces/:id",
            get(get_workplace).put(update_workplace).delete(delete_workplace),
        )
        .route("/api/workplaces/:id/categories", get(get_categories))
        .route("/api/workplaces/:id/reference-photo", post(upload_reference_photo))
        .route(
            "/api/workplaces/:id/whiteboard-region",
            put(set_whiteboard_region).delete(clear_whiteboard_region),
        )
        .route("/api/workplaces/:id/dataset-stats", get(get_dataset_stats))
        .route("/api/workplaces/:id/export-dataset", post(export_workplace_dataset))
}
