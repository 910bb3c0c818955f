//! Export of selected analyses into a training partition
//!
//! Images are copied to `exports/<partition>/<class>/`, where the class is the
//! reviewer's corrected class (the predicted class for unreviewed low
//! confidence candidates). Exported analyses are marked so they drop out of
//! later candidate lists.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{info, warn};
use uuid::Uuid;
use wpi_common::candidates::partition_name;
use wpi_common::domain::Analysis;
use wpi_common::{Error, Result};

use crate::db;
use crate::error::{ApiError, ApiResult};
use crate::storage::EXPORTS_DIR;
use crate::AppState;

#[derive(Debug, Clone, Deserialize)]
pub struct TrainingExportRequest {
    pub analysis_ids: Vec<Uuid>,
    /// Partition name; `training_v<unix millis>` when absent
    pub export_name: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrainingExportResult {
    pub partition: String,
    /// Partition directory relative to the root folder
    pub export_path: String,
    pub total_exported: usize,
    /// Class folder -> copied images
    pub class_distribution: BTreeMap<String, u32>,
    /// Ids that were unknown or already exported
    pub skipped: Vec<Uuid>,
    /// Selected analyses without a copyable image; left unmarked
    pub not_copied: Vec<Uuid>,
}

/// Partition names become directory names: `[A-Za-z0-9._-]`, no leading dot
pub fn validate_partition_name(name: &str) -> Result<&str> {
    let name = name.trim();
    let valid = !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
    if !valid {
        return Err(Error::InvalidInput(format!(
            "Export name '{}' may only contain letters, digits, '.', '_' and '-'",
            name
        )));
    }
    Ok(name)
}

/// Folder an analysis is filed under
pub fn class_folder(analysis: &Analysis) -> &str {
    analysis
        .corrected_class
        .as_deref()
        .unwrap_or(&analysis.predicted_class)
}

pub async fn export_training_data(
    state: &AppState,
    request: TrainingExportRequest,
) -> ApiResult<TrainingExportResult> {
    if request.analysis_ids.is_empty() {
        return Err(ApiError::BadRequest("No analyses selected".to_string()));
    }

    let partition = match request.export_name.as_deref() {
        Some(name) if !name.trim().is_empty() => validate_partition_name(name)?.to_string(),
        _ => partition_name(Utc::now()),
    };
    let export_path = format!("{}/{}", EXPORTS_DIR, partition);
    let export_dir = state.storage.resolve(&export_path)?;
    if tokio::fs::try_exists(&export_dir).await? {
        return Err(ApiError::Conflict(format!("Export '{}' already exists", partition)));
    }

    let loaded = db::analyses::load_by_ids(&state.db, &request.analysis_ids).await?;
    let (selected, already_exported): (Vec<Analysis>, Vec<Analysis>) =
        loaded.into_iter().partition(|a| !a.exported_for_training);

    let skipped: Vec<Uuid> = request
        .analysis_ids
        .iter()
        .filter(|id| !selected.iter().any(|a| a.id == **id))
        .copied()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    if !already_exported.is_empty() {
        warn!(count = already_exported.len(), "Skipping analyses that were already exported");
    }
    if selected.is_empty() {
        return Err(ApiError::BadRequest(
            "None of the selected analyses can be exported".to_string(),
        ));
    }

    tokio::fs::create_dir_all(&export_dir).await?;

    let mut class_distribution: BTreeMap<String, u32> = BTreeMap::new();
    let mut copied: Vec<Uuid> = Vec::with_capacity(selected.len());
    let mut not_copied: Vec<Uuid> = Vec::new();
    for analysis in &selected {
        match copy_image(state, analysis, &export_dir).await {
            Ok(class) => {
                *class_distribution.entry(class.to_string()).or_insert(0) += 1;
                copied.push(analysis.id);
            }
            Err(reason) => {
                warn!(analysis_id = %analysis.id, reason = %reason, "Analysis not exported");
                not_copied.push(analysis.id);
            }
        }
    }

    if copied.is_empty() {
        if let Err(e) = tokio::fs::remove_dir_all(&export_dir).await {
            warn!(path = %export_dir.display(), error = %e, "Could not remove empty export");
        }
        return Err(ApiError::BadRequest(
            "None of the selected analyses has an image to export".to_string(),
        ));
    }

    let mut tx = state.db.begin().await?;
    db::analyses::mark_exported(&mut *tx, &copied, &partition).await?;
    tx.commit().await?;

    info!(
        partition = %partition,
        exported = copied.len(),
        not_copied = not_copied.len(),
        skipped = skipped.len(),
        "Training partition exported"
    );

    Ok(TrainingExportResult {
        partition,
        export_path,
        total_exported: copied.len(),
        class_distribution,
        skipped,
        not_copied,
    })
}

/// Copy the stored image of one analysis into its class folder
async fn copy_image<'a>(
    state: &AppState,
    analysis: &'a Analysis,
    export_dir: &std::path::Path,
) -> std::result::Result<&'a str, String> {
    let image_path = analysis
        .image_path
        .as_deref()
        .ok_or_else(|| "no stored image".to_string())?;
    let source = state.storage.resolve(image_path).map_err(|e| e.to_string())?;
    let file_name = source
        .file_name()
        .ok_or_else(|| format!("invalid image path '{}'", image_path))?;

    // Orphaned analyses may carry free-form classes
    let class = validate_partition_name(class_folder(analysis)).unwrap_or("unclassified");
    let class_dir = export_dir.join(class);
    tokio::fs::create_dir_all(&class_dir)
        .await
        .map_err(|e| e.to_string())?;
    tokio::fs::copy(&source, class_dir.join(file_name))
        .await
        .map_err(|e| format!("{}: {}", image_path, e))?;
    Ok(class)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partition_names() {
        assert_eq!(validate_partition_name(" batch_2 ").unwrap(), "batch_2");
        assert!(validate_partition_name("v2.1").is_ok());
        assert!(validate_partition_name("../up").is_err());
        assert!(validate_partition_name("a/b").is_err());
        assert!(validate_partition_name(".hidden").is_err());
    }
}
