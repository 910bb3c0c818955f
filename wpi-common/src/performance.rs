//! Model performance aggregator
//!
//! Accuracy, error and confusion breakdowns per model version, computed from
//! reviewed analyses. Analyses are attributed to the model id stamped on them
//! at inference time. Unstamped analyses fall back to the most recent model of
//! their workplace uploaded at or before the analysis.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

use crate::category::CategoryTable;
use crate::domain::analysis::{Analysis, ItemCounts};
use crate::domain::model::{ModelType, ModelVersion};

/// `round(100 * correct / reviewed)`, `None` without reviews
pub fn accuracy(correct: usize, reviewed: usize) -> Option<u32> {
    if reviewed == 0 {
        return None;
    }
    Some((100.0 * correct as f64 / reviewed as f64).round() as u32)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorCount {
    pub label: String,
    pub count: usize,
}

/// Prediction that was corrected to another label
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionCount {
    pub predicted: String,
    pub actual: String,
    pub count: usize,
}

/// Per-item detection errors
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectionBreakdown {
    /// Item present but not detected
    pub missing: BTreeMap<String, usize>,
    /// Item detected but not present
    pub false_positive: BTreeMap<String, usize>,
    /// Item present and detected with the wrong count
    pub count_error: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionErrorKind {
    Missing,
    FalsePositive,
    CountError,
}

/// What the reviewer says about one item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemTruth {
    /// Exact count supplied by the reviewer
    Count(u32),
    /// Presence implied by the corrected category
    Present(bool),
}

/// How an analysis was tied to its model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Attribution {
    Stamped,
    UploadTimeFallback,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelPerformance {
    pub model_id: Uuid,
    pub version: String,
    pub model_type: ModelType,
    pub total_analyses: usize,
    /// Analyses attributed by upload time rather than by stamp
    pub fallback_attributed: usize,
    pub reviewed: usize,
    pub correct: usize,
    pub incorrect: usize,
    pub accuracy: Option<u32>,
    pub top_errors: Vec<ErrorCount>,
    pub confusions: Vec<ConfusionCount>,
    /// Detection models only
    pub detection: Option<DetectionBreakdown>,
}

/// Incorrect analyses grouped by corrected label
///
/// Sorted by count descending, then label ascending.
pub fn error_breakdown<'a, I>(analyses: I) -> Vec<ErrorCount>
where
    I: IntoIterator<Item = &'a Analysis>,
{
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for analysis in analyses {
        if analysis.is_correct() == Some(false) {
            if let Some(label) = analysis.corrected_label.as_deref() {
                *counts.entry(label).or_insert(0) += 1;
            }
        }
    }

    let mut errors: Vec<ErrorCount> = counts
        .into_iter()
        .map(|(label, count)| ErrorCount {
            label: label.to_string(),
            count,
        })
        .collect();
    errors.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.label.cmp(&b.label)));
    errors
}

/// Predicted → actual pairs of incorrect analyses, same ordering as errors
pub fn confusion_pairs<'a, I>(analyses: I) -> Vec<ConfusionCount>
where
    I: IntoIterator<Item = &'a Analysis>,
{
    let mut counts: HashMap<(&str, &str), usize> = HashMap::new();
    for analysis in analyses {
        if analysis.is_correct() == Some(false) {
            if let Some(actual) = analysis.corrected_label.as_deref() {
                *counts
                    .entry((analysis.predicted_label.as_str(), actual))
                    .or_insert(0) += 1;
            }
        }
    }

    let mut pairs: Vec<ConfusionCount> = counts
        .into_iter()
        .map(|((predicted, actual), count)| ConfusionCount {
            predicted: predicted.to_string(),
            actual: actual.to_string(),
            count,
        })
        .collect();
    pairs.sort_by(|a, b| {
        b.count
            .cmp(&a.count)
            .then_with(|| a.predicted.cmp(&b.predicted))
            .then_with(|| a.actual.cmp(&b.actual))
    });
    pairs
}

/// Classify one item of one reviewed analysis
pub fn classify_detection(detected: u32, truth: ItemTruth) -> Option<DetectionErrorKind> {
    let (present, exact) = match truth {
        ItemTruth::Count(n) => (n > 0, Some(n)),
        ItemTruth::Present(present) => (present, None),
    };

    match (present, detected) {
        (true, 0) => Some(DetectionErrorKind::Missing),
        (false, d) if d > 0 => Some(DetectionErrorKind::FalsePositive),
        (true, d) => match exact {
            Some(n) if n != d => Some(DetectionErrorKind::CountError),
            _ => None,
        },
        _ => None,
    }
}

/// Reviewer truth per item for one analysis
///
/// Corrected counts win; otherwise presence follows from the corrected label
/// looked up in the category table. `None` when neither is available.
fn item_truth(
    analysis: &Analysis,
    items: &[String],
    table: Option<&CategoryTable>,
) -> Option<Vec<(String, ItemTruth)>> {
    if let Some(counts) = &analysis.corrected_counts {
        return Some(
            items
                .iter()
                .map(|item| {
                    let n = counts.get(item).copied().unwrap_or(0);
                    (item.clone(), ItemTruth::Count(n))
                })
                .collect(),
        );
    }

    let corrected = analysis.corrected_label.as_deref()?;
    let category = table?.lookup(corrected)?;
    Some(
        items
            .iter()
            .map(|item| {
                let present = !category.missing.contains(item);
                (item.clone(), ItemTruth::Present(present))
            })
            .collect(),
    )
}

/// Aggregate detection errors per item over reviewed analyses
pub fn detection_breakdown<'a, I>(analyses: I, table: Option<&CategoryTable>) -> DetectionBreakdown
where
    I: IntoIterator<Item = &'a Analysis>,
{
    let mut breakdown = DetectionBreakdown::default();

    for analysis in analyses {
        if !analysis.is_reviewed() {
            continue;
        }
        let items = detection_items(analysis, table);
        let Some(truths) = item_truth(analysis, &items, table) else {
            continue;
        };
        for (item, truth) in truths {
            let detected = analysis.detected_counts.get(&item).copied().unwrap_or(0);
            let bucket = match classify_detection(detected, truth) {
                Some(DetectionErrorKind::Missing) => &mut breakdown.missing,
                Some(DetectionErrorKind::FalsePositive) => &mut breakdown.false_positive,
                Some(DetectionErrorKind::CountError) => &mut breakdown.count_error,
                None => continue,
            };
            *bucket.entry(item).or_insert(0) += 1;
        }
    }

    breakdown
}

fn detection_items(analysis: &Analysis, table: Option<&CategoryTable>) -> Vec<String> {
    if let Some(table) = table {
        return table.items().to_vec();
    }
    let mut keys: ItemCounts = analysis.detected_counts.clone();
    if let Some(corrected) = &analysis.corrected_counts {
        keys.extend(corrected.iter().map(|(k, v)| (k.clone(), *v)));
    }
    keys.into_keys().collect()
}

/// Assign analyses to models
///
/// Returns, per model index, the attributed analyses and how each one was
/// attributed. Analyses that match no model are dropped.
pub fn attribute_analyses<'a>(
    models: &[ModelVersion],
    analyses: &'a [Analysis],
) -> Vec<Vec<(&'a Analysis, Attribution)>> {
    let mut buckets: Vec<Vec<(&'a Analysis, Attribution)>> = vec![Vec::new(); models.len()];

    for analysis in analyses {
        if let Some(index) = stamped_model(models, analysis) {
            buckets[index].push((analysis, Attribution::Stamped));
        } else if analysis.model_id.is_none() && analysis.model_version.is_none() {
            if let Some(index) = fallback_model(models, analysis) {
                buckets[index].push((analysis, Attribution::UploadTimeFallback));
            }
        }
    }

    buckets
}

fn stamped_model(models: &[ModelVersion], analysis: &Analysis) -> Option<usize> {
    if let Some(model_id) = analysis.model_id {
        return models.iter().position(|m| m.id == model_id);
    }
    let version = analysis.model_version.as_deref()?;
    models.iter().position(|m| {
        m.version == version && Some(m.workplace_id) == analysis.workplace_id
    })
}

fn fallback_model(models: &[ModelVersion], analysis: &Analysis) -> Option<usize> {
    models
        .iter()
        .enumerate()
        .filter(|(_, m)| Some(m.workplace_id) == analysis.workplace_id)
        .filter(|(_, m)| m.uploaded_at <= analysis.created_at)
        .max_by_key(|(_, m)| m.uploaded_at)
        .map(|(index, _)| index)
}

/// Evaluate one model over its attributed analyses
pub fn evaluate_model(
    model: &ModelVersion,
    attributed: &[(&Analysis, Attribution)],
    table: Option<&CategoryTable>,
) -> ModelPerformance {
    let analyses = || attributed.iter().map(|(a, _)| *a);

    let reviewed = analyses().filter(|a| a.is_reviewed()).count();
    let correct = analyses().filter(|a| a.is_correct() == Some(true)).count();

    let detection = match model.model_type {
        ModelType::Detection => Some(detection_breakdown(analyses(), table)),
        ModelType::Classification => None,
    };

    ModelPerformance {
        model_id: model.id,
        version: model.version.clone(),
        model_type: model.model_type,
        total_analyses: attributed.len(),
        fallback_attributed: attributed
            .iter()
            .filter(|(_, how)| *how == Attribution::UploadTimeFallback)
            .count(),
        reviewed,
        correct,
        incorrect: reviewed - correct,
        accuracy: accuracy(correct, reviewed),
        top_errors: error_breakdown(analyses()),
        confusions: confusion_pairs(analyses()),
        detection,
    }
}

/// Evaluate every model, in the order given
pub fn compare_models(
    models: &[ModelVersion],
    analyses: &[Analysis],
    table: Option<&CategoryTable>,
) -> Vec<ModelPerformance> {
    let buckets = attribute_analyses(models, analyses);
    models
        .iter()
        .zip(buckets.iter())
        .map(|(model, attributed)| evaluate_model(model, attributed, table))
        .collect()
}

/// Accuracy of reviewed analyses in one ISO week
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelinePoint {
    /// `YYYY-Www`
    pub week: String,
    /// Monday of the week
    pub week_start: NaiveDate,
    pub total: usize,
    pub correct: usize,
    /// Percent, one decimal
    pub accuracy: f64,
}

/// Weekly accuracy of reviewed analyses, oldest week first
pub fn accuracy_timeline(analyses: &[Analysis]) -> Vec<TimelinePoint> {
    let mut weeks: BTreeMap<(i32, u32), (usize, usize)> = BTreeMap::new();

    for analysis in analyses {
        let Some(correct) = analysis.is_correct() else {
            continue;
        };
        let iso = analysis.created_at.date_naive().iso_week();
        let entry = weeks.entry((iso.year(), iso.week())).or_insert((0, 0));
        entry.0 += 1;
        if correct {
            entry.1 += 1;
        }
    }

    weeks
        .into_iter()
        .filter_map(|((year, week), (total, correct))| {
            let week_start = NaiveDate::from_isoywd_opt(year, week, chrono::Weekday::Mon)?;
            Some(TimelinePoint {
                week: format!("{}-W{:02}", year, week),
                week_start,
                total,
                correct,
                accuracy: (1000.0 * correct as f64 / total as f64).round() / 10.0,
            })
        })
        .collect()
}
