//! Review of a stored analysis
//!
//! A reviewer states what was really on the station, either as the set of
//! missing items or as a class/label pair from the workplace table. The
//! predicted fields are never touched. Images of analyses that are neither
//! training candidates nor annotated are discarded after review.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;
use wpi_common::candidates::{candidate_reason, CandidateReason, CandidateThreshold};
use wpi_common::category::{Category, CategoryTable};
use wpi_common::domain::{Analysis, ItemCounts};
use wpi_common::{Error, Result};

use crate::config::load_runtime_settings;
use crate::db;
use crate::db::analyses::CorrectionUpdate;
use crate::error::ApiResult;
use crate::AppState;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CorrectionRequest {
    /// Items that were actually missing; takes precedence over class/label
    pub missing_items: Option<Vec<String>>,
    pub corrected_class: Option<String>,
    pub corrected_label: Option<String>,
    pub corrected_counts: Option<ItemCounts>,
    pub notes: Option<String>,
    /// Candidate threshold in percent; runtime default when absent
    pub confidence_threshold: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CorrectionResult {
    pub analysis: Analysis,
    pub candidate_reason: Option<CandidateReason>,
    pub image_removed: bool,
}

/// Category a correction request points at
///
/// `table` is `None` for analyses whose workplace was deleted; an explicit
/// class/label pair is then stored as given.
pub fn resolve_correction(table: Option<&CategoryTable>, request: &CorrectionRequest) -> Result<Category> {
    if let Some(missing) = &request.missing_items {
        let table = table.ok_or_else(|| {
            Error::InvalidInput(
                "Analysis has no workplace; correct it with corrected_class and corrected_label".to_string(),
            )
        })?;
        return Ok(table.resolve_missing(missing)?.clone());
    }

    let class = request.corrected_class.as_deref().map(str::trim).filter(|s| !s.is_empty());
    let label = request.corrected_label.as_deref().map(str::trim).filter(|s| !s.is_empty());

    match (table, class, label) {
        (_, None, None) => Err(Error::InvalidInput(
            "Correction needs missing_items or corrected_class/corrected_label".to_string(),
        )),
        (Some(table), class, label) => {
            let by_class = class
                .map(|c| {
                    table
                        .by_class(c)
                        .ok_or_else(|| Error::InvalidInput(format!("Unknown class '{}'", c)))
                })
                .transpose()?;
            let by_label = label
                .map(|l| {
                    table
                        .by_label(l)
                        .ok_or_else(|| Error::InvalidInput(format!("Unknown label '{}'", l)))
                })
                .transpose()?;

            match (by_class, by_label) {
                (Some(a), Some(b)) if a.class_id != b.class_id => Err(Error::InvalidInput(format!(
                    "Class '{}' does not carry label '{}'",
                    a.class_id, b.label
                ))),
                (Some(category), _) | (None, Some(category)) => Ok(category.clone()),
                (None, None) => Err(Error::InvalidInput("Empty correction".to_string())),
            }
        }
        (None, Some(class), Some(label)) => Ok(Category {
            class_id: class.to_string(),
            label: label.to_string(),
            missing: Vec::new(),
        }),
        (None, _, _) => Err(Error::InvalidInput(
            "Analysis has no workplace; both corrected_class and corrected_label are required".to_string(),
        )),
    }
}

fn validate_counts(items: Option<&[String]>, counts: &ItemCounts) -> Result<()> {
    if let Some(items) = items {
        if let Some(unknown) = counts.keys().find(|name| !items.contains(name)) {
            return Err(Error::InvalidInput(format!("Unknown item '{}' in corrected_counts", unknown)));
        }
    }
    Ok(())
}

/// True when the notes carry actual content
fn has_notes(notes: Option<&str>) -> bool {
    notes
        .map(str::trim)
        .is_some_and(|n| !n.is_empty() && n != "{}")
}

pub async fn apply_correction(
    state: &AppState,
    analysis_id: Uuid,
    request: CorrectionRequest,
) -> ApiResult<CorrectionResult> {
    let analysis = db::analyses::require_analysis(&state.db, analysis_id).await?;

    let threshold = match request.confidence_threshold {
        Some(percent) => CandidateThreshold::new(percent)?,
        None => load_runtime_settings(&state.db).await?.candidate_threshold()?,
    };

    let table = match analysis.workplace_id {
        Some(workplace_id) => match db::workplaces::load_workplace(&state.db, workplace_id).await? {
            Some(workplace) => Some(db::category_codes::table_for(&state.db, &workplace).await?),
            None => None,
        },
        None => None,
    };

    let category = resolve_correction(table.as_ref(), &request)?;
    if let Some(counts) = &request.corrected_counts {
        validate_counts(table.as_ref().map(|t| t.items()), counts)?;
    }

    let notes = request
        .notes
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(str::to_string);

    let mut reviewed = analysis.clone();
    reviewed.corrected_class = Some(category.class_id.clone());
    reviewed.corrected_label = Some(category.label.clone());
    reviewed.corrected_counts = request.corrected_counts.clone();
    reviewed.notes = notes.clone();

    let reason = candidate_reason(&reviewed, threshold);
    let keep_image = reason.is_some() || has_notes(notes.as_deref());

    let discarded = if keep_image { None } else { reviewed.image_path.take() };

    db::analyses::save_correction(
        &state.db,
        analysis_id,
        &CorrectionUpdate {
            corrected_class: category.class_id.clone(),
            corrected_label: category.label.clone(),
            corrected_counts: reviewed.corrected_counts.clone(),
            notes,
            image_path: reviewed.image_path.clone(),
        },
    )
    .await?;

    // The row no longer references the file, remove it only now
    let mut image_removed = false;
    if let Some(path) = discarded {
        image_removed = state.storage.remove_file(&path).await?;
        debug!(analysis_id = %analysis_id, path = %path, "Discarded image of reviewed analysis");
    }

    info!(
        analysis_id = %analysis_id,
        predicted = %analysis.predicted_label,
        corrected = %category.label,
        candidate = reason.is_some(),
        "Analysis reviewed"
    );

    Ok(CorrectionResult {
        analysis: reviewed,
        candidate_reason: reason,
        image_removed,
    })
}
