//! Runtime settings API handlers

use axum::{extract::State, routing::get, Json, Router};
use serde::Deserialize;
use tracing::info;

use crate::config::{load_runtime_settings, save_runtime_settings, RuntimeSettings};
use crate::error::ApiResult;
use crate::AppState;

/// Partial settings update; absent fields keep their stored value
#[derive(Debug, Default, Deserialize)]
pub struct UpdateSettingsRequest {
    pub scenario_target_ok: Option<u32>,
    pub scenario_target_per_item: Option<u32>,
    pub scenario_target_empty: Option<u32>,
    pub candidate_threshold_percent: Option<f64>,
    pub training_target: Option<u32>,
    pub performance_top_k: Option<usize>,
    pub dataset_train_split: Option<f64>,
    pub max_upload_bytes: Option<usize>,
}

impl UpdateSettingsRequest {
    fn apply(self, settings: &mut RuntimeSettings) {
        if let Some(v) = self.scenario_target_ok {
            settings.scenario_target_ok = v;
        }
        if let Some(v) = self.scenario_target_per_item {
            settings.scenario_target_per_item = v;
        }
        if let Some(v) = self.scenario_target_empty {
            settings.scenario_target_empty = v;
        }
        if let Some(v) = self.candidate_threshold_percent {
            settings.candidate_threshold_percent = v;
        }
        if let Some(v) = self.training_target {
            settings.training_target = v;
        }
        if let Some(v) = self.performance_top_k {
            settings.performance_top_k = v;
        }
        if let Some(v) = self.dataset_train_split {
            settings.dataset_train_split = v;
        }
        if let Some(v) = self.max_upload_bytes {
            settings.max_upload_bytes = v;
        }
    }
}

/// GET /api/settings
pub async fn get_settings(State(state): State<AppState>) -> ApiResult<Json<RuntimeSettings>> {
    Ok(Json(load_runtime_settings(&state.db).await?))
}

/// PUT /api/settings
///
/// Nothing is stored unless the merged settings validate.
pub async fn update_settings(
    State(state): State<AppState>,
    Json(request): Json<UpdateSettingsRequest>,
) -> ApiResult<Json<RuntimeSettings>> {
    let mut settings = load_runtime_settings(&state.db).await?;
    request.apply(&mut settings);
    save_runtime_settings(&state.db, &settings).await?;

    info!("Runtime settings updated");
    Ok(Json(settings))
}

/// Build settings routes
pub fn settings_routes() -> Router<AppState> {
    Router::new().route("/api/settings", get(get_settings).put(update_settings))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_update_keeps_other_fields() {
        let mut settings = RuntimeSettings::default();
        let request: UpdateSettingsRequest =
            serde_json::from_str(r#"{"candidate_threshold_percent": 80, "training_target": 50}"#).unwrap();
        request.apply(&mut settings);

        let defaults = RuntimeSettings::default();
        assert_eq!(settings.candidate_threshold_percent, 80.0);
        assert_eq!(settings.training_target, 50);
        assert_eq!(settings.max_upload_bytes, defaults.max_upload_bytes);
        assert_eq!(settings.dataset_train_split, defaults.dataset_train_split);
    }

    #[test]
    fn test_merged_settings_are_validated() {
        let mut settings = RuntimeSettings::default();
        UpdateSettingsRequest {
            dataset_train_split: Some(1.5),
            ..Default::default()
        }
        .apply(&mut settings);
        assert!(settings.validate().is_err());
    }
}
