//! Inspection API handlers
//!
//! `POST /api/inspect` runs one inspection; clients that want live progress
//! open `GET /api/inspect/progress/:session_id` first and pass the same
//! session id in the upload. `POST /api/blur-preview` only runs the face
//! check so the camera view can show a privacy-safe frame.

use axum::{
    extract::{Multipart, Path, State},
    http::{header, HeaderMap},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use uuid::Uuid;

use crate::api::upload::UploadForm;
use crate::config::load_runtime_settings;
use crate::error::{ApiError, ApiResult};
use crate::services::inspection::{preview_blur, run_inspection, BlurPreview, InspectionInput, InspectionResult};
use crate::services::user_agent::resolve_device_id;
use crate::AppState;

/// POST /api/inspect (multipart)
///
/// Fields: `file` (or `image`), `workplace_id`, optional `blur_faces`
/// (default true), `confidence_threshold` (0–1), `session_id`, `device_id`.
pub async fn inspect(
    State(state): State<AppState>,
    headers: HeaderMap,
    multipart: Multipart,
) -> ApiResult<Json<InspectionResult>> {
    let settings = load_runtime_settings(&state.db).await?;
    let mut form = UploadForm::read(multipart, settings.max_upload_bytes).await?;

    let file = form
        .take_file("file")
        .or_else(|_| form.take_file("image"))?;
    let workplace_id: Uuid = form
        .parse("workplace_id")?
        .ok_or_else(|| ApiError::BadRequest("workplace_id is required".to_string()))?;
    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|value| value.to_str().ok());

    let input = InspectionInput {
        image: file.bytes,
        file_name: file.file_name,
        workplace_id,
        blur_faces: form.flag("blur_faces", true)?,
        confidence_threshold: form.parse("confidence_threshold")?,
        session_id: form
            .text("session_id")
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string()),
        device_id: resolve_device_id(form.text("device_id"), user_agent),
    };

    let result = run_inspection(&state, input).await;
    if let Err(e) = &result {
        if !matches!(e, ApiError::PrivacyBlocked { .. } | ApiError::BadRequest(_)) {
            state.record_error(e.to_string()).await;
        }
    }
    Ok(Json(result?))
}

/// POST /api/blur-preview (multipart)
///
/// Field: `file` (or `image`). Nothing is persisted.
pub async fn blur_preview(
    State(state): State<AppState>,
    multipart: Multipart,
) -> ApiResult<Json<BlurPreview>> {
    let settings = load_runtime_settings(&state.db).await?;
    let mut form = UploadForm::read(multipart, settings.max_upload_bytes).await?;
    let file = form
        .take_file("file")
        .or_else(|_| form.take_file("image"))?;

    let result = preview_blur(&state, file.bytes, file.file_name).await;
    if let Err(e) = &result {
        if !matches!(e, ApiError::PrivacyBlocked { .. } | ApiError::BadRequest(_)) {
            state.record_error(e.to_string()).await;
        }
    }
    Ok(Json(result?))
}

/// GET /api/inspect/progress/:session_id
pub async fn inspection_progress(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    wpi_common::sse::create_session_sse_stream(&state.event_bus, session_id)
}

/// Build inspection routes
pub fn inspection_routes() -> Router<AppState> {
    Router::new()
        .route("/api/inspect", post(inspect))
        .route("/api/blur-preview", post(blur_preview))
        .route("/api/inspect/progress/:session_id", get(inspection_progress))
}
