//! Dataset completion calculator
//!
//! Reports how far the labeled training images of a workplace are from the
//! collection targets: one `OK` scenario, one `NOK-<item>` scenario per
//! required item and one `Leeg` (everything missing) scenario.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::domain::training_image::{EMPTY_TRAINING_LABEL, OK_TRAINING_LABEL, UNLABELED};

/// Per-scenario image targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioTargets {
    pub ok: u32,
    pub per_item: u32,
    pub empty: u32,
}

impl Default for ScenarioTargets {
    fn default() -> Self {
        Self {
            ok: 100,
            per_item: 50,
            empty: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    pub label: String,
    pub description: String,
    pub count: u32,
    pub target: u32,
    pub is_complete: bool,
    /// 0–100
    pub progress: f64,
}

impl Scenario {
    fn new(label: String, description: String, count: u32, target: u32) -> Self {
        Self {
            label,
            description,
            count,
            target,
            is_complete: count >= target,
            progress: scenario_progress(count, target),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetCompletion {
    pub total_images: u32,
    pub labeled_images: u32,
    pub unlabeled_images: u32,
    pub validated_count: u32,
    pub unvalidated_count: u32,
    /// Image count per label, unlabeled images excluded
    pub label_counts: BTreeMap<String, u32>,
    pub scenarios: Vec<Scenario>,
    /// Incomplete scenario with the lowest count
    pub next_scenario: Option<Scenario>,
    pub completion_percentage: u32,
    pub ready_for_training: bool,
}

impl DatasetCompletion {
    /// Record how many of the images were validated by a reviewer
    pub fn with_validated(mut self, validated: u32) -> Self {
        self.validated_count = validated.min(self.total_images);
        self.unvalidated_count = self.total_images - self.validated_count;
        self
    }
}

/// `min(100, 100 * count / target)`; a zero target counts as done
pub fn scenario_progress(count: u32, target: u32) -> f64 {
    if target == 0 {
        return 100.0;
    }
    (100.0 * count as f64 / target as f64).min(100.0)
}

/// Compute completion from the labels of a workplace's training images
pub fn compute_completion<I, S>(
    labels: I,
    items: &[String],
    targets: &ScenarioTargets,
) -> DatasetCompletion
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut total_images = 0u32;
    let mut unlabeled_images = 0u32;
    let mut label_counts: BTreeMap<String, u32> = BTreeMap::new();

    for label in labels {
        total_images += 1;
        let label = label.as_ref().trim();
        if label.is_empty() || label == UNLABELED {
            unlabeled_images += 1;
            continue;
        }
        *label_counts.entry(label.to_string()).or_insert(0) += 1;
    }

    let count_of = |label: &str| label_counts.get(label).copied().unwrap_or(0);

    let mut scenarios = Vec::with_capacity(items.len() + 2);
    scenarios.push(Scenario::new(
        OK_TRAINING_LABEL.to_string(),
        "All items present".to_string(),
        count_of(OK_TRAINING_LABEL),
        targets.ok,
    ));
    for item in items {
        let label = format!("NOK-{}", item);
        scenarios.push(Scenario::new(
            label.clone(),
            format!("Only {} missing", item),
            count_of(&label),
            targets.per_item,
        ));
    }
    scenarios.push(Scenario::new(
        EMPTY_TRAINING_LABEL.to_string(),
        "All items missing".to_string(),
        count_of(EMPTY_TRAINING_LABEL),
        targets.empty,
    ));

    let complete = scenarios.iter().filter(|s| s.is_complete).count();
    let completion_percentage =
        ((complete as f64 / scenarios.len() as f64) * 100.0).round() as u32;

    // min_by_key keeps the first of equal elements
    let next_scenario = scenarios
        .iter()
        .filter(|s| !s.is_complete)
        .min_by_key(|s| s.count)
        .cloned();

    DatasetCompletion {
        total_images,
        labeled_images: total_images - unlabeled_images,
        unlabeled_images,
        validated_count: 0,
        unvalidated_count: total_images,
        label_counts,
        ready_for_training: complete == scenarios.len(),
        scenarios,
        next_scenario,
        completion_percentage,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn items() -> Vec<String> {
        vec!["hamer".into(), "schaar".into(), "sleutel".into()]
    }

    #[test]
    fn test_forty_five_ok_images() {
        let labels = vec!["OK"; 45];
        let result = compute_completion(labels, &items(), &ScenarioTargets::default());

        let ok = &result.scenarios[0];
        assert_eq!(ok.label, "OK");
        assert_eq!(ok.count, 45);
        assert!(!ok.is_complete);
        assert_eq!(ok.progress, 45.0);
    }

    #[test]
    fn test_progress_capped_and_monotonic() {
        let mut previous = 0.0;
        for count in 0..=150 {
            let progress = scenario_progress(count, 100);
            assert!(progress >= previous);
            assert!((0.0..=100.0).contains(&progress));
            previous = progress;
        }
        assert_eq!(scenario_progress(150, 100), 100.0);
        assert_eq!(scenario_progress(0, 0), 100.0);
    }

    #[test]
    fn test_complete_iff_count_reaches_target() {
        let targets = ScenarioTargets {
            ok: 2,
            per_item: 1,
            empty: 1,
        };
        let result = compute_completion(["OK", "OK", "NOK-hamer"], &items(), &targets);
        let by_label: BTreeMap<_, _> = result
            .scenarios
            .iter()
            .map(|s| (s.label.as_str(), s.is_complete))
            .collect();

        assert!(by_label["OK"]);
        assert!(by_label["NOK-hamer"]);
        assert!(!by_label["NOK-schaar"]);
        assert!(!by_label["Leeg"]);
        // 2 of 5 scenarios
        assert_eq!(result.completion_percentage, 40);
        assert!(!result.ready_for_training);
    }

    #[test]
    fn test_next_scenario_lowest_count_first_on_tie() {
        let labels = ["OK", "NOK-hamer", "NOK-sleutel", "Leeg", "Leeg"];
        let result = compute_completion(labels, &items(), &ScenarioTargets::default());
        assert_eq!(result.next_scenario.unwrap().label, "NOK-schaar");

        let empty = compute_completion(Vec::<String>::new(), &items(), &ScenarioTargets::default());
        assert_eq!(empty.next_scenario.unwrap().label, "OK");
    }

    #[test]
    fn test_counts_and_histogram() {
        let labels = ["OK", "unlabeled", "", "NOK-hamer-schaar", "OK"];
        let result = compute_completion(labels, &items(), &ScenarioTargets::default());

        assert_eq!(result.total_images, 5);
        assert_eq!(result.unlabeled_images, 2);
        assert_eq!(result.labeled_images, 3);
        assert_eq!(result.label_counts["OK"], 2);
        assert_eq!(result.label_counts["NOK-hamer-schaar"], 1);
        assert!(!result.label_counts.contains_key("unlabeled"));
        assert_eq!((result.validated_count, result.unvalidated_count), (0, 5));

        let result = result.with_validated(2);
        assert_eq!((result.validated_count, result.unvalidated_count), (2, 3));
        assert_eq!(result.with_validated(9).unvalidated_count, 0);
    }

    #[test]
    fn test_ready_when_every_target_met() {
        let targets = ScenarioTargets {
            ok: 1,
            per_item: 1,
            empty: 1,
        };
        let labels = ["OK", "NOK-hamer", "NOK-schaar", "NOK-sleutel", "Leeg"];
        let result = compute_completion(labels, &items(), &targets);
        assert!(result.ready_for_training);
        assert_eq!(result.completion_percentage, 100);
        assert!(result.next_scenario.is_none());
    }
}
