//! Workplace (inspection station) types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

/// Default confidence threshold handed to the inference service
pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.25;

/// Upper bound on checklist length; the category table grows as 2^N
pub const MAX_ITEMS: usize = 10;

/// Name taken by the all-missing label `NOK-alles_weg`
pub const RESERVED_ITEM_NAME: &str = "alles";

/// A monitored physical station with a fixed checklist of required items
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Workplace {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    /// Required items in declared order
    pub items: Vec<String>,
    /// Stored file name of the reference photo
    pub reference_photo: Option<String>,
    pub whiteboard_region: Option<WhiteboardRegion>,
    /// Detection confidence threshold (0–1)
    pub confidence_threshold: f64,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Rectangular region of the frame holding the whiteboard
///
/// Coordinates are normalized to the image size, origin top-left.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct WhiteboardRegion {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

impl WhiteboardRegion {
    /// Build a region, rejecting coordinates outside 0–1 or inverted corners
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Result<Self> {
        let region = Self { x1, y1, x2, y2 };
        region.validate()?;
        Ok(region)
    }

    pub fn validate(&self) -> Result<()> {
        for (name, value) in [("x1", self.x1), ("y1", self.y1), ("x2", self.x2), ("y2", self.y2)] {
            if !value.is_finite() || !(0.0..=1.0).contains(&value) {
                return Err(Error::InvalidInput(format!(
                    "Whiteboard region {} must be between 0 and 1, got {}",
                    name, value
                )));
            }
        }
        if self.x1 >= self.x2 || self.y1 >= self.y2 {
            return Err(Error::InvalidInput(
                "Whiteboard region requires x1 < x2 and y1 < y2".to_string(),
            ));
        }
        Ok(())
    }
}

/// Validate a confidence threshold expressed as a fraction
pub fn validate_confidence_threshold(threshold: f64) -> Result<f64> {
    if !threshold.is_finite() || !(0.0..=1.0).contains(&threshold) {
        return Err(Error::InvalidInput(format!(
            "Confidence threshold must be between 0 and 1, got {}",
            threshold
        )));
    }
    Ok(threshold)
}

/// Normalize a checklist: trim names, drop nothing silently
///
/// Names must be non-empty, unique, and free of `-`, `/` and `\` because they
/// end up in training labels and export folder names. Category labels join
/// names with `_` and use `alles` for "everything missing", so names may
/// neither contain `_` nor be `alles`.
pub fn normalize_items<S: AsRef<str>>(raw: &[S]) -> Result<Vec<String>> {
    let mut items: Vec<String> = Vec::with_capacity(raw.len());

    for name in raw {
        let name = name.as_ref().trim();
        if name.is_empty() {
            return Err(Error::InvalidInput("Item names must not be empty".to_string()));
        }
        if name.contains(['-', '/', '\\']) {
            return Err(Error::InvalidInput(format!(
                "Item name '{}' must not contain '-', '/' or '\\'",
                name
            )));
        }
        if name.contains('_') {
            return Err(Error::InvalidInput(format!(
                "Item name '{}' must not contain '_'",
                name
            )));
        }
        if name.eq_ignore_ascii_case(RESERVED_ITEM_NAME) {
            return Err(Error::InvalidInput(format!(
                "Item name '{}' is reserved",
                name
            )));
        }
        if items.iter().any(|existing| existing == name) {
            return Err(Error::InvalidInput(format!("Duplicate item '{}'", name)));
        }
        items.push(name.to_string());
    }

    if items.is_empty() {
        return Err(Error::InvalidInput(
            "A workplace needs at least one required item".to_string(),
        ));
    }
    if items.len() > MAX_ITEMS {
        return Err(Error::InvalidInput(format!(
            "A workplace supports at most {} items, got {}",
            MAX_ITEMS,
            items.len()
        )));
    }

    Ok(items)
}

/// Split a comma separated item list as typed into the admin form
pub fn parse_item_list(raw: &str) -> Result<Vec<String>> {
    let parts: Vec<&str> = raw.split(',').filter(|s| !s.trim().is_empty()).collect();
    normalize_items(&parts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_region_accepts_valid_corners() {
        let region = WhiteboardRegion::new(0.1, 0.2, 0.6, 0.9).unwrap();
        assert_eq!(region.x2, 0.6);
    }

    #[test]
    fn test_region_rejects_out_of_range_and_inverted() {
        assert!(WhiteboardRegion::new(-0.1, 0.0, 0.5, 0.5).is_err());
        assert!(WhiteboardRegion::new(0.0, 0.0, 1.5, 0.5).is_err());
        assert!(WhiteboardRegion::new(0.5, 0.0, 0.5, 0.5).is_err());
        assert!(WhiteboardRegion::new(0.0, 0.6, 0.5, 0.2).is_err());
        assert!(WhiteboardRegion::new(0.0, 0.0, f64::NAN, 0.2).is_err());
    }

    #[test]
    fn test_normalize_items() {
        let items = normalize_items(&[" hamer", "schaar ", "sleutel"]).unwrap();
        assert_eq!(items, vec!["hamer", "schaar", "sleutel"]);

        assert!(normalize_items::<&str>(&[]).is_err());
        assert!(normalize_items(&["hamer", "hamer"]).is_err());
        assert!(normalize_items(&["tang-klein"]).is_err());
        assert!(normalize_items(&["  "]).is_err());
    }

    #[test]
    fn test_normalize_items_rejects_label_collisions() {
        // "rol_tape" alone would share NOK-rol_tape_weg with rol+tape
        assert!(matches!(
            normalize_items(&["rol_tape", "rol", "tape"]),
            Err(Error::InvalidInput(_))
        ));
        // "alles" alone would share NOK-alles_weg with the full set
        assert!(matches!(
            normalize_items(&["alles", "hamer"]),
            Err(Error::InvalidInput(_))
        ));
        assert!(normalize_items(&["Alles"]).is_err());
    }

    #[test]
    fn test_parse_item_list_skips_blank_entries() {
        let items = parse_item_list("hamer, schaar,,sleutel, ").unwrap();
        assert_eq!(items, vec!["hamer", "schaar", "sleutel"]);
    }

    #[test]
    fn test_threshold_bounds() {
        assert!(validate_confidence_threshold(0.25).is_ok());
        assert!(validate_confidence_threshold(1.0).is_ok());
        assert!(validate_confidence_threshold(1.01).is_err());
        assert!(validate_confidence_threshold(-0.01).is_err());
    }
}
