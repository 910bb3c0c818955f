//! Inspection analyses and their review state

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::model::ModelType;
use crate::{Error, Result};

/// Overall pass/fail outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InspectionStatus {
    #[serde(rename = "OK")]
    Ok,
    #[serde(rename = "NOK")]
    Nok,
}

impl InspectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InspectionStatus::Ok => "OK",
            InspectionStatus::Nok => "NOK",
        }
    }

    /// Status implied by a missing-item list
    pub fn from_missing(missing: &[String]) -> Self {
        if missing.is_empty() {
            InspectionStatus::Ok
        } else {
            InspectionStatus::Nok
        }
    }
}

impl fmt::Display for InspectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InspectionStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "OK" => Ok(InspectionStatus::Ok),
            "NOK" => Ok(InspectionStatus::Nok),
            other => Err(Error::InvalidInput(format!("Unknown status '{}'", other))),
        }
    }
}

/// Per-item object counts
pub type ItemCounts = BTreeMap<String, u32>;

/// One stored inspection result
///
/// The predicted fields are written once at inference time; review only ever
/// fills the `corrected_*` fields and `notes`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Analysis {
    pub id: Uuid,
    pub workplace_id: Option<Uuid>,
    /// Model actually used for inference
    pub model_id: Option<Uuid>,
    pub model_version: Option<String>,
    pub model_type: ModelType,
    pub predicted_class: String,
    pub predicted_label: String,
    /// 0–1
    pub confidence: f64,
    pub status: InspectionStatus,
    pub missing_items: Vec<String>,
    /// Detection models only
    pub detected_counts: ItemCounts,
    pub corrected_class: Option<String>,
    /// `None` means awaiting review
    pub corrected_label: Option<String>,
    /// True per-item counts supplied by the reviewer (detection feedback)
    pub corrected_counts: Option<ItemCounts>,
    pub notes: Option<String>,
    pub face_count: u32,
    pub device_id: String,
    /// Path relative to the root folder; cleared once the image is discarded
    pub image_path: Option<String>,
    pub exported_for_training: bool,
    pub created_at: DateTime<Utc>,
}

impl Analysis {
    pub fn is_reviewed(&self) -> bool {
        self.corrected_label.is_some()
    }

    /// `Some(true)` when the reviewer confirmed the prediction
    pub fn is_correct(&self) -> Option<bool> {
        self.corrected_label
            .as_deref()
            .map(|corrected| corrected == self.predicted_label)
    }
}
