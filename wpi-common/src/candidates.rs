//! Training candidate selection
//!
//! An analysis is a training candidate when the reviewer corrected the model
//! or when the model was unsure (confidence below the threshold).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::analysis::Analysis;
use crate::{Error, Result};

pub const MIN_THRESHOLD_PERCENT: f64 = 50.0;
pub const MAX_THRESHOLD_PERCENT: f64 = 95.0;
pub const DEFAULT_THRESHOLD_PERCENT: f64 = 70.0;

/// Number of candidates the training statistics count toward
pub const DEFAULT_TRAINING_TARGET: u32 = 200;

/// Confidence threshold in percent, limited to 50–95
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize)]
pub struct CandidateThreshold(f64);

impl CandidateThreshold {
    pub fn new(percent: f64) -> Result<Self> {
        if !percent.is_finite()
            || !(MIN_THRESHOLD_PERCENT..=MAX_THRESHOLD_PERCENT).contains(&percent)
        {
            return Err(Error::InvalidInput(format!(
                "Confidence threshold must be between {}% and {}%, got {}",
                MIN_THRESHOLD_PERCENT, MAX_THRESHOLD_PERCENT, percent
            )));
        }
        Ok(Self(percent))
    }

    pub fn percent(&self) -> f64 {
        self.0
    }

    /// Threshold on the 0–1 confidence scale
    pub fn as_fraction(&self) -> f64 {
        self.0 / 100.0
    }
}

impl Default for CandidateThreshold {
    fn default() -> Self {
        Self(DEFAULT_THRESHOLD_PERCENT)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateReason {
    Incorrect,
    LowConfidence,
    /// Corrected and low confidence
    Both,
}

/// Why (if at all) an analysis is a training candidate
pub fn candidate_reason(analysis: &Analysis, threshold: CandidateThreshold) -> Option<CandidateReason> {
    let incorrect = analysis.is_correct() == Some(false);
    let low_confidence = analysis.confidence < threshold.as_fraction();

    match (incorrect, low_confidence) {
        (true, true) => Some(CandidateReason::Both),
        (true, false) => Some(CandidateReason::Incorrect),
        (false, true) => Some(CandidateReason::LowConfidence),
        (false, false) => None,
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Candidate<'a> {
    pub analysis: &'a Analysis,
    pub reason: CandidateReason,
}

/// Candidates among `analyses`, in input order
pub fn select_candidates(analyses: &[Analysis], threshold: CandidateThreshold) -> Vec<Candidate<'_>> {
    analyses
        .iter()
        .filter_map(|analysis| {
            candidate_reason(analysis, threshold).map(|reason| Candidate { analysis, reason })
        })
        .collect()
}

/// Name of a new training partition
pub fn partition_name(now: DateTime<Utc>) -> String {
    format!("training_v{}", now.timestamp_millis())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingStatistics {
    /// Analyses awaiting review
    pub unreviewed_count: usize,
    /// Candidates not yet exported
    pub training_queue_count: usize,
    pub exported_count: usize,
    pub training_target: u32,
    /// 0–100
    pub training_progress_percent: f64,
}

/// Review and export progress over all analyses
pub fn training_statistics(
    analyses: &[Analysis],
    threshold: CandidateThreshold,
    target: u32,
) -> TrainingStatistics {
    let unreviewed_count = analyses.iter().filter(|a| !a.is_reviewed()).count();
    let exported_count = analyses.iter().filter(|a| a.exported_for_training).count();
    let training_queue_count = analyses
        .iter()
        .filter(|a| !a.exported_for_training)
        .filter(|a| candidate_reason(a, threshold).is_some())
        .count();

    let training_progress_percent = if target == 0 {
        100.0
    } else {
        (100.0 * training_queue_count as f64 / target as f64).min(100.0)
    };

    TrainingStatistics {
        unreviewed_count,
        training_queue_count,
        exported_count,
        training_target: target,
        training_progress_percent,
    }
}
