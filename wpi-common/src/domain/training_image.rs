//! Labeled training images

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::{Error, Result};

/// Label of an image showing every item in place
pub const OK_TRAINING_LABEL: &str = "OK";

/// Label of an image showing an empty station
pub const EMPTY_TRAINING_LABEL: &str = "Leeg";

/// Label of an image nobody classified yet
pub const UNLABELED: &str = "unlabeled";

const MISSING_PREFIX: &str = "NOK-";

/// Dataset label of a training image
///
/// Text forms: `OK`, `NOK-<item>[-<item>...]`, `Leeg`, `unlabeled`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum TrainingLabel {
    Ok,
    /// Some but not all items missing, in the workplace's declared order
    Missing(Vec<String>),
    /// Every item missing
    Empty,
    Unlabeled,
}

impl TrainingLabel {
    /// Label for a missing-item set expressed against the workplace checklist
    ///
    /// Missing items are reordered into declared order. Unknown names are
    /// rejected.
    pub fn from_missing<S: AsRef<str>>(items: &[String], missing: &[S]) -> Result<Self> {
        for name in missing {
            if !items.iter().any(|item| item == name.as_ref()) {
                return Err(Error::InvalidInput(format!(
                    "Unknown item '{}'",
                    name.as_ref()
                )));
            }
        }

        let ordered: Vec<String> = items
            .iter()
            .filter(|item| missing.iter().any(|m| m.as_ref() == item.as_str()))
            .cloned()
            .collect();

        Ok(match ordered.len() {
            0 => TrainingLabel::Ok,
            n if n == items.len() => TrainingLabel::Empty,
            _ => TrainingLabel::Missing(ordered),
        })
    }

    /// Check that every item named by the label belongs to the checklist
    pub fn validate_for(&self, items: &[String]) -> Result<()> {
        if let TrainingLabel::Missing(missing) = self {
            for name in missing {
                if !items.contains(name) {
                    return Err(Error::InvalidInput(format!(
                        "Label names unknown item '{}'",
                        name
                    )));
                }
            }
            if missing.len() >= items.len() {
                return Err(Error::InvalidInput(format!(
                    "Use '{}' when every item is missing",
                    EMPTY_TRAINING_LABEL
                )));
            }
        }
        Ok(())
    }

    pub fn is_labeled(&self) -> bool {
        !matches!(self, TrainingLabel::Unlabeled)
    }
}

impl fmt::Display for TrainingLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrainingLabel::Ok => f.write_str(OK_TRAINING_LABEL),
            TrainingLabel::Missing(items) => write!(f, "{}{}", MISSING_PREFIX, items.join("-")),
            TrainingLabel::Empty => f.write_str(EMPTY_TRAINING_LABEL),
            TrainingLabel::Unlabeled => f.write_str(UNLABELED),
        }
    }
}

impl FromStr for TrainingLabel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() || s == UNLABELED {
            return Ok(TrainingLabel::Unlabeled);
        }
        if s == OK_TRAINING_LABEL {
            return Ok(TrainingLabel::Ok);
        }
        if s == EMPTY_TRAINING_LABEL {
            return Ok(TrainingLabel::Empty);
        }
        if let Some(rest) = s.strip_prefix(MISSING_PREFIX) {
            let items: Vec<String> = rest.split('-').map(str::to_string).collect();
            if items.iter().any(|i| i.is_empty()) {
                return Err(Error::InvalidInput(format!("Malformed label '{}'", s)));
            }
            return Ok(TrainingLabel::Missing(items));
        }
        Err(Error::InvalidInput(format!("Unknown training label '{}'", s)))
    }
}

impl TryFrom<String> for TrainingLabel {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<TrainingLabel> for String {
    fn from(label: TrainingLabel) -> Self {
        label.to_string()
    }
}

/// Where a training image came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ImageSource {
    #[default]
    ManualUpload,
    /// Copied from a reviewed analysis
    Analysis,
}

impl ImageSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageSource::ManualUpload => "manual_upload",
            ImageSource::Analysis => "analysis",
        }
    }
}

impl FromStr for ImageSource {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "manual_upload" => Ok(ImageSource::ManualUpload),
            "analysis" => Ok(ImageSource::Analysis),
            other => Err(Error::InvalidInput(format!("Unknown image source '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrainingImage {
    pub id: Uuid,
    pub workplace_id: Uuid,
    /// Path relative to the root folder
    pub image_path: String,
    pub label: TrainingLabel,
    /// Class code from the workplace category table, when known
    pub class_id: Option<String>,
    pub source: ImageSource,
    pub validated: bool,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn items() -> Vec<String> {
        vec!["hamer".into(), "schaar".into(), "sleutel".into()]
    }

    #[test]
    fn test_from_missing_uses_declared_order() {
        let label = TrainingLabel::from_missing(&items(), &["sleutel", "hamer"]).unwrap();
        assert_eq!(label.to_string(), "NOK-hamer-sleutel");

        assert_eq!(
            TrainingLabel::from_missing::<&str>(&items(), &[]).unwrap(),
            TrainingLabel::Ok
        );
        assert_eq!(
            TrainingLabel::from_missing(&items(), &["schaar", "hamer", "sleutel"]).unwrap(),
            TrainingLabel::Empty
        );
        assert!(TrainingLabel::from_missing(&items(), &["tang"]).is_err());
    }

    #[test]
    fn test_parse_labels() {
        assert_eq!("OK".parse::<TrainingLabel>().unwrap(), TrainingLabel::Ok);
        assert_eq!("Leeg".parse::<TrainingLabel>().unwrap(), TrainingLabel::Empty);
        assert_eq!("".parse::<TrainingLabel>().unwrap(), TrainingLabel::Unlabeled);
        assert_eq!(
            "NOK-hamer".parse::<TrainingLabel>().unwrap(),
            TrainingLabel::Missing(vec!["hamer".into()])
        );
        assert!("NOK-".parse::<TrainingLabel>().is_err());
        assert!("ok".parse::<TrainingLabel>().is_err());
    }

    #[test]
    fn test_validate_for_checklist() {
        let label: TrainingLabel = "NOK-hamer-schaar".parse().unwrap();
        assert!(label.validate_for(&items()).is_ok());

        let unknown: TrainingLabel = "NOK-tang".parse().unwrap();
        assert!(unknown.validate_for(&items()).is_err());

        let everything: TrainingLabel = "NOK-hamer-schaar-sleutel".parse().unwrap();
        assert!(everything.validate_for(&items()).is_err());
    }

    #[test]
    fn test_serde_uses_text_form() {
        let json = serde_json::to_string(&TrainingLabel::Missing(vec!["schaar".into()])).unwrap();
        assert_eq!(json, "\"NOK-schaar\"");
        let back: TrainingLabel = serde_json::from_str("\"Leeg\"").unwrap();
        assert_eq!(back, TrainingLabel::Empty);
    }
}
