//! Inspection orchestration
//!
//! One inspection: resolve the workplace and its active model, call the
//! inference port, enforce the privacy gate, map the prediction onto the
//! workplace category table, store the processed image and the analysis.
//! Every step is reported on the event bus under the caller's session id.

use base64::Engine as _;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;
use wpi_common::category::{Category, CategoryTable};
use wpi_common::domain::workplace::DEFAULT_CONFIDENCE_THRESHOLD;
use wpi_common::domain::{Analysis, InspectionStatus, ItemCounts, ModelType, TrainingLabel};
use wpi_common::events::{InspectionStage, WpiEvent};
use wpi_common::{Error, Result};

use crate::db;
use crate::error::{ApiError, ApiResult};
use crate::services::inference::{InferenceRequest, ModelRef, Prediction};
use crate::storage::{image_extension, unique_file_name, UPLOADS_DIR};
use crate::AppState;

/// Validated inspection upload
#[derive(Debug, Clone)]
pub struct InspectionInput {
    pub image: Vec<u8>,
    pub file_name: Option<String>,
    pub workplace_id: Uuid,
    pub blur_faces: bool,
    /// Overrides the workplace threshold (0–1)
    pub confidence_threshold: Option<f64>,
    pub session_id: String,
    pub device_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Suggestion {
    pub item: String,
    pub action: String,
}

/// One suggestion per missing item, in declared order
pub fn suggestions_for(missing: &[String]) -> Vec<Suggestion> {
    missing
        .iter()
        .map(|item| Suggestion {
            item: item.clone(),
            action: format!("Put the {} back in its marked place", item),
        })
        .collect()
}

/// Category and counts derived from a prediction
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedPrediction {
    pub category: Category,
    pub detected_counts: ItemCounts,
    pub confidence: f64,
}

/// Map a raw prediction onto the workplace's category table
///
/// Detection: every workplace item counted zero (or not reported) is
/// missing. Classification: the label is looked up as a category label or
/// class id, then as a training label (`OK`, `NOK-a-b`, `Leeg`), then the
/// reported class id is tried.
pub fn resolve_prediction(table: &CategoryTable, prediction: &Prediction) -> Result<ResolvedPrediction> {
    match prediction {
        Prediction::Detection { counts, confidence } => {
            let detected_counts: ItemCounts = table
                .items()
                .iter()
                .map(|item| (item.clone(), counts.get(item).copied().unwrap_or(0)))
                .collect();
            let missing: Vec<&str> = detected_counts
                .iter()
                .filter(|(_, count)| **count == 0)
                .map(|(item, _)| item.as_str())
                .collect();
            let category = table.resolve_missing(&missing)?.clone();

            Ok(ResolvedPrediction {
                category,
                detected_counts,
                confidence: *confidence,
            })
        }
        Prediction::Classification {
            class_id,
            label,
            confidence,
        } => {
            let category = match table.lookup(label) {
                Some(category) => category.clone(),
                None => match label.parse::<TrainingLabel>() {
                    Ok(training_label) if training_label.is_labeled() => {
                        category_for_training_label(table, &training_label)?
                    }
                    _ => class_id
                        .as_deref()
                        .and_then(|id| table.by_class(id))
                        .cloned()
                        .ok_or_else(|| {
                            Error::Internal(format!(
                                "Model predicted '{}', which is not a category of this workplace",
                                label
                            ))
                        })?,
                },
            };

            Ok(ResolvedPrediction {
                category,
                detected_counts: ItemCounts::new(),
                confidence: *confidence,
            })
        }
    }
}

/// Category matching a training label; `Unlabeled` maps to `OK`
pub fn category_for_training_label(table: &CategoryTable, label: &TrainingLabel) -> Result<Category> {
    let missing: Vec<String> = match label {
        TrainingLabel::Ok | TrainingLabel::Unlabeled => Vec::new(),
        TrainingLabel::Empty => table.items().to_vec(),
        TrainingLabel::Missing(items) => items.clone(),
    };
    Ok(table.resolve_missing(&missing)?.clone())
}

#[derive(Debug, Clone, Serialize)]
pub struct ModelSummary {
    pub id: Uuid,
    pub version: String,
    pub model_type: ModelType,
}

#[derive(Debug, Clone, Serialize)]
pub struct PrivacyReport {
    pub faces_detected: u32,
    pub faces_blurred: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClassificationReport {
    pub status: InspectionStatus,
    pub class_id: String,
    pub label: String,
    pub confidence: f64,
    pub missing_items: Vec<String>,
    pub detected_counts: ItemCounts,
}

#[derive(Debug, Clone, Serialize)]
pub struct StoredImage {
    /// Path relative to the root folder, served below `/uploads`
    pub path: String,
    pub base64: String,
}

/// Response of a finished inspection
#[derive(Debug, Clone, Serialize)]
pub struct InspectionResult {
    pub analysis_id: Uuid,
    pub session_id: String,
    pub workplace_id: Uuid,
    pub created_at: DateTime<Utc>,
    /// `None` when the inference service's default model was used
    pub model: Option<ModelSummary>,
    pub privacy: PrivacyReport,
    pub classification: ClassificationReport,
    pub suggestions: Vec<Suggestion>,
    pub image: StoredImage,
}

/// Run one inspection and report its outcome on the event bus
pub async fn run_inspection(state: &AppState, input: InspectionInput) -> ApiResult<InspectionResult> {
    let session_id = input.session_id.clone();
    match inspect(state, input).await {
        Ok(result) => {
            state.event_bus.emit_lossy(WpiEvent::InspectionCompleted {
                session_id,
                analysis_id: result.analysis_id,
                status: result.classification.status.as_str().to_string(),
                label: result.classification.label.clone(),
                confidence: result.classification.confidence,
                timestamp: Utc::now(),
            });
            Ok(result)
        }
        Err(ApiError::PrivacyBlocked { faces_detected }) => {
            state.event_bus.emit_lossy(WpiEvent::InspectionPrivacyBlocked {
                session_id,
                faces_detected,
                timestamp: Utc::now(),
            });
            Err(ApiError::PrivacyBlocked { faces_detected })
        }
        Err(e) => {
            state.event_bus.emit_lossy(WpiEvent::InspectionFailed {
                session_id,
                error: e.to_string(),
                timestamp: Utc::now(),
            });
            Err(e)
        }
    }
}

async fn inspect(state: &AppState, input: InspectionInput) -> ApiResult<InspectionResult> {
    let session = input.session_id.as_str();
    let progress = |stage: InspectionStage, message: &str| {
        state
            .event_bus
            .emit_lossy(WpiEvent::progress(session, stage, message));
    };

    if input.image.is_empty() {
        return Err(ApiError::BadRequest("Empty image upload".to_string()));
    }
    let extension = image_extension(input.file_name.as_deref())?;

    let workplace = db::workplaces::require_workplace(&state.db, input.workplace_id).await?;
    let threshold = input
        .confidence_threshold
        .unwrap_or(workplace.confidence_threshold);
    let threshold = wpi_common::domain::workplace::validate_confidence_threshold(threshold)?;
    let table = db::category_codes::table_for(&state.db, &workplace).await?;
    let model = db::models::load_active_model(&state.db, workplace.id).await?;
    progress(InspectionStage::Received, "Upload received");

    let model_ref = match &model {
        Some(model) => Some(ModelRef {
            path: state.storage.resolve(&model.file_path)?,
            model_type: model.model_type,
        }),
        None => None,
    };

    progress(InspectionStage::Analyzing, "Running model");
    let outcome = state
        .inference
        .infer(InferenceRequest {
            image: input.image.clone(),
            file_name: input
                .file_name
                .clone()
                .unwrap_or_else(|| format!("upload.{}", extension)),
            model: model_ref,
            confidence_threshold: threshold,
            blur_faces: input.blur_faces,
        })
        .await?;

    if input.blur_faces && outcome.faces_detected > 0 {
        warn!(
            session_id = %session,
            faces = outcome.faces_detected,
            "Inspection rejected: faces in frame, image discarded"
        );
        return Err(ApiError::PrivacyBlocked {
            faces_detected: outcome.faces_detected,
        });
    }
    progress(InspectionStage::PrivacyChecked, "No people in frame");

    progress(InspectionStage::Categorizing, "Mapping prediction to categories");
    let resolved = resolve_prediction(&table, &outcome.prediction)?;
    let missing_items = resolved.category.missing.clone();
    let status = InspectionStatus::from_missing(&missing_items);

    progress(InspectionStage::Saving, "Saving analysis");
    let image_bytes = outcome.processed_image.unwrap_or(input.image);
    let image_path = state
        .storage
        .write_file(UPLOADS_DIR, &unique_file_name("inspect", &extension), &image_bytes)
        .await?;

    let model_type = model
        .as_ref()
        .map(|m| m.model_type)
        .unwrap_or(match outcome.prediction {
            Prediction::Detection { .. } => ModelType::Detection,
            Prediction::Classification { .. } => ModelType::Classification,
        });

    let analysis = Analysis {
        id: Uuid::new_v4(),
        workplace_id: Some(workplace.id),
        model_id: model.as_ref().map(|m| m.id),
        model_version: model.as_ref().map(|m| m.version.clone()),
        model_type,
        predicted_class: resolved.category.class_id.clone(),
        predicted_label: resolved.category.label.clone(),
        confidence: resolved.confidence,
        status,
        missing_items: missing_items.clone(),
        detected_counts: resolved.detected_counts.clone(),
        corrected_class: None,
        corrected_label: None,
        corrected_counts: None,
        notes: None,
        face_count: outcome.faces_detected,
        device_id: input.device_id,
        image_path: Some(image_path.clone()),
        exported_for_training: false,
        created_at: Utc::now(),
    };

    if let Err(e) = db::analyses::insert_analysis(&state.db, &analysis).await {
        // Keep disk and database consistent
        let _ = state.storage.remove_file(&image_path).await;
        return Err(e.into());
    }

    info!(
        analysis_id = %analysis.id,
        workplace_id = %workplace.id,
        label = %analysis.predicted_label,
        confidence = analysis.confidence,
        "Inspection stored"
    );

    Ok(InspectionResult {
        analysis_id: analysis.id,
        session_id: input.session_id,
        workplace_id: workplace.id,
        created_at: analysis.created_at,
        model: model.map(|m| ModelSummary {
            id: m.id,
            version: m.version,
            model_type: m.model_type,
        }),
        privacy: PrivacyReport {
            faces_detected: outcome.faces_detected,
            faces_blurred: if input.blur_faces { outcome.faces_detected } else { 0 },
        },
        classification: ClassificationReport {
            status,
            class_id: analysis.predicted_class,
            label: analysis.predicted_label,
            confidence: analysis.confidence,
            missing_items: missing_items.clone(),
            detected_counts: analysis.detected_counts,
        },
        suggestions: suggestions_for(&missing_items),
        image: StoredImage {
            path: image_path,
            base64: base64::engine::general_purpose::STANDARD.encode(&image_bytes),
        },
    })
}

/// Response of a blur preview
#[derive(Debug, Clone, Serialize)]
pub struct BlurPreview {
    pub faces_detected: u32,
    /// `data:image/jpeg;base64,...` of the processed frame
    pub blurred_image: String,
}

/// Run the face check on a frame without storing anything
///
/// Frames with people in them are refused with `PrivacyBlocked`, the same
/// as an inspection, so the client never displays them.
pub async fn preview_blur(state: &AppState, image: Vec<u8>, file_name: Option<String>) -> ApiResult<BlurPreview> {
    if image.is_empty() {
        return Err(ApiError::BadRequest("Empty image upload".to_string()));
    }
    let extension = image_extension(file_name.as_deref())?;

    let outcome = state
        .inference
        .infer(InferenceRequest {
            image: image.clone(),
            file_name: file_name.unwrap_or_else(|| format!("preview.{}", extension)),
            model: None,
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            blur_faces: true,
        })
        .await?;

    if outcome.faces_detected > 0 {
        warn!(faces = outcome.faces_detected, "Blur preview refused: faces in frame");
        return Err(ApiError::PrivacyBlocked {
            faces_detected: outcome.faces_detected,
        });
    }

    let bytes = outcome.processed_image.unwrap_or(image);
    Ok(BlurPreview {
        faces_detected: 0,
        blurred_image: format!(
            "data:image/jpeg;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(&bytes)
        ),
    })
}
