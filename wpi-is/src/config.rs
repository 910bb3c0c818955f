//! Runtime settings
//!
//! Tunables stored in the database `settings` table. Bootstrap settings
//! (root folder, listen address, inference endpoint) come from TOML, see
//! `wpi_common::config`.

use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use wpi_common::candidates::{
    CandidateThreshold, DEFAULT_THRESHOLD_PERCENT, DEFAULT_TRAINING_TARGET,
};
use wpi_common::completion::ScenarioTargets;
use wpi_common::{Error, Result};

use crate::db::settings::{get_setting, set_setting};

/// Runtime settings with their built-in defaults
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeSettings {
    pub scenario_target_ok: u32,
    pub scenario_target_per_item: u32,
    pub scenario_target_empty: u32,
    /// Default candidate threshold in percent (50–95)
    pub candidate_threshold_percent: f64,
    pub training_target: u32,
    pub performance_top_k: usize,
    /// Share of images in the train split of a dataset export
    pub dataset_train_split: f64,
    /// Upper bound for inspection and training image uploads
    pub max_upload_bytes: usize,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        let targets = ScenarioTargets::default();
        Self {
            scenario_target_ok: targets.ok,
            scenario_target_per_item: targets.per_item,
            scenario_target_empty: targets.empty,
            candidate_threshold_percent: DEFAULT_THRESHOLD_PERCENT,
            training_target: DEFAULT_TRAINING_TARGET,
            performance_top_k: 5,
            dataset_train_split: 0.8,
            max_upload_bytes: 20 * 1024 * 1024,
        }
    }
}

impl RuntimeSettings {
    pub fn scenario_targets(&self) -> ScenarioTargets {
        ScenarioTargets {
            ok: self.scenario_target_ok,
            per_item: self.scenario_target_per_item,
            empty: self.scenario_target_empty,
        }
    }

    pub fn candidate_threshold(&self) -> Result<CandidateThreshold> {
        CandidateThreshold::new(self.candidate_threshold_percent)
    }

    pub fn validate(&self) -> Result<()> {
        self.candidate_threshold()?;
        validate_train_split(self.dataset_train_split)?;
        if self.performance_top_k == 0 {
            return Err(Error::InvalidInput("performance_top_k must be at least 1".to_string()));
        }
        if self.max_upload_bytes == 0 {
            return Err(Error::InvalidInput("max_upload_bytes must be positive".to_string()));
        }
        Ok(())
    }
}

/// Train share of a dataset split, strictly between 0 and 1
pub fn validate_train_split(split: f64) -> Result<f64> {
    if !split.is_finite() || split <= 0.0 || split >= 1.0 {
        return Err(Error::InvalidInput(format!(
            "train_split must be between 0 and 1 (exclusive), got {}",
            split
        )));
    }
    Ok(split)
}

/// Load runtime settings; absent keys keep their defaults
pub async fn load_runtime_settings(pool: &SqlitePool) -> Result<RuntimeSettings> {
    let mut settings = RuntimeSettings::default();

    if let Some(val) = get_setting(pool, "scenario_target_ok").await? {
        settings.scenario_target_ok = val;
    }
    if let Some(val) = get_setting(pool, "scenario_target_per_item").await? {
        settings.scenario_target_per_item = val;
    }
    if let Some(val) = get_setting(pool, "scenario_target_empty").await? {
        settings.scenario_target_empty = val;
    }
    if let Some(val) = get_setting(pool, "candidate_threshold_percent").await? {
        settings.candidate_threshold_percent = val;
    }
    if let Some(val) = get_setting(pool, "training_target").await? {
        settings.training_target = val;
    }
    if let Some(val) = get_setting(pool, "performance_top_k").await? {
        settings.performance_top_k = val;
    }
    if let Some(val) = get_setting(pool, "dataset_train_split").await? {
        settings.dataset_train_split = val;
    }
    if let Some(val) = get_setting(pool, "max_upload_bytes").await? {
        settings.max_upload_bytes = val;
    }

    Ok(settings)
}

/// Validate and persist every runtime setting
pub async fn save_runtime_settings(pool: &SqlitePool, settings: &RuntimeSettings) -> Result<()> {
    settings.validate()?;

    set_setting(pool, "scenario_target_ok", settings.scenario_target_ok).await?;
    set_setting(pool, "scenario_target_per_item", settings.scenario_target_per_item).await?;
    set_setting(pool, "scenario_target_empty", settings.scenario_target_empty).await?;
    set_setting(pool, "candidate_threshold_percent", settings.candidate_threshold_percent).await?;
    set_setting(pool, "training_target", settings.training_target).await?;
    set_setting(pool, "performance_top_k", settings.performance_top_k).await?;
    set_setting(pool, "dataset_train_split", settings.dataset_train_split).await?;
    set_setting(pool, "max_upload_bytes", settings.max_upload_bytes).await?;

    tracing::info!(?settings, "Saved runtime settings");
    Ok(())
}
