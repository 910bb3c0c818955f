//! Trained model versions and activation rules

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::{Error, Result};

/// Kind of network a model file contains
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ModelType {
    /// Predicts a single overall label for the whole frame
    #[default]
    Classification,
    /// Predicts per-item boxes, overall status is derived from the counts
    Detection,
}

impl ModelType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelType::Classification => "classification",
            ModelType::Detection => "detection",
        }
    }
}

impl fmt::Display for ModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "classification" => Ok(ModelType::Classification),
            "detection" => Ok(ModelType::Detection),
            other => Err(Error::InvalidInput(format!("Unknown model type '{}'", other))),
        }
    }
}

/// Lifecycle of a model version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelStatus {
    /// Stored but never activated
    Uploaded,
    /// Live model of its workplace
    Active,
    /// Previously active
    Archived,
}

impl ModelStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelStatus::Uploaded => "uploaded",
            ModelStatus::Active => "active",
            ModelStatus::Archived => "archived",
        }
    }
}

impl fmt::Display for ModelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "uploaded" => Ok(ModelStatus::Uploaded),
            "active" => Ok(ModelStatus::Active),
            "archived" => Ok(ModelStatus::Archived),
            other => Err(Error::InvalidInput(format!("Unknown model status '{}'", other))),
        }
    }
}

/// A trained model file registered for a workplace
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelVersion {
    pub id: Uuid,
    pub workplace_id: Uuid,
    pub version: String,
    pub model_type: ModelType,
    pub status: ModelStatus,
    /// Accuracy reported by the training run, in percent
    pub test_accuracy: Option<f64>,
    pub uploaded_at: DateTime<Utc>,
    pub notes: Option<String>,
    pub file_path: String,
}

/// File extensions accepted for model uploads
pub const MODEL_FILE_EXTENSIONS: &[&str] = &["pt", "onnx"];

/// Version label used when an upload does not name one
pub fn next_version_label(existing_models: usize) -> String {
    format!("v{}.0", existing_models + 1)
}

/// Status changes needed to make one model the live model of its workplace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivationPlan {
    pub workplace_id: Uuid,
    pub activate: Uuid,
    /// Currently active models that must be archived first
    pub archive: Vec<Uuid>,
}

/// Plan the activation of `model_id` among the models of one workplace
///
/// Activating the model that is already active yields an empty archive list.
pub fn plan_activation(models: &[ModelVersion], model_id: Uuid) -> Result<ActivationPlan> {
    let target = models
        .iter()
        .find(|m| m.id == model_id)
        .ok_or_else(|| Error::NotFound(format!("Model {} not found", model_id)))?;

    let archive = models
        .iter()
        .filter(|m| {
            m.workplace_id == target.workplace_id
                && m.status == ModelStatus::Active
                && m.id != target.id
        })
        .map(|m| m.id)
        .collect();

    Ok(ActivationPlan {
        workplace_id: target.workplace_id,
        activate: target.id,
        archive,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model(workplace_id: Uuid, status: ModelStatus) -> ModelVersion {
        ModelVersion {
            id: Uuid::new_v4(),
            workplace_id,
            version: "v1.0".into(),
            model_type: ModelType::Classification,
            status,
            test_accuracy: None,
            uploaded_at: Utc::now(),
            notes: None,
            file_path: "models/m.pt".into(),
        }
    }

    #[test]
    fn test_plan_archives_previous_active_only_in_same_workplace() {
        let wp = Uuid::new_v4();
        let other_wp = Uuid::new_v4();
        let current = model(wp, ModelStatus::Active);
        let candidate = model(wp, ModelStatus::Uploaded);
        let foreign = model(other_wp, ModelStatus::Active);
        let models = vec![current.clone(), candidate.clone(), foreign];

        let plan = plan_activation(&models, candidate.id).unwrap();
        assert_eq!(plan.activate, candidate.id);
        assert_eq!(plan.archive, vec![current.id]);
        assert_eq!(plan.workplace_id, wp);
    }

    #[test]
    fn test_plan_reactivating_active_model_is_noop() {
        let wp = Uuid::new_v4();
        let current = model(wp, ModelStatus::Active);
        let plan = plan_activation(std::slice::from_ref(&current), current.id).unwrap();
        assert!(plan.archive.is_empty());
    }

    #[test]
    fn test_plan_unknown_model() {
        assert!(matches!(
            plan_activation(&[], Uuid::new_v4()),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_parse_enums() {
        assert_eq!("Detection".parse::<ModelType>().unwrap(), ModelType::Detection);
        assert!("segmentation".parse::<ModelType>().is_err());
        assert_eq!("archived".parse::<ModelStatus>().unwrap(), ModelStatus::Archived);
        assert_eq!(next_version_label(2), "v3.0");
    }
}
