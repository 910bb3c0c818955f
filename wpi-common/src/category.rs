//! Category resolver
//!
//! Maps the set of missing items of a workplace onto a `(class, label)` pair.
//! Class codes come from a table that enumerates every subset of the checklist
//! once, when the workplace is configured. The service persists that table and
//! looks codes up on every submission.
//!
//! Enumeration order:
//! - empty set → `0` (`OK`)
//! - full set → `1` (`NOK-alles_weg`)
//! - remaining subsets by ascending size, ties ordered lexicographically by the
//!   declared indices of their members
//!
//! For the checklist `[hamer, schaar, sleutel]` this yields `2` hamer,
//! `3` schaar, `4` sleutel, `5` hamer+schaar, `6` hamer+sleutel,
//! `7` schaar+sleutel.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::domain::workplace::normalize_items;
use crate::{Error, Result};

pub const OK_CLASS: &str = "0";
pub const OK_LABEL: &str = "OK";
pub const ALL_MISSING_CLASS: &str = "1";
pub const ALL_MISSING_LABEL: &str = "NOK-alles_weg";

/// Item name → "is missing", as submitted by a reviewer
pub type MissingItemsState = BTreeMap<String, bool>;

/// One entry of a workplace category table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub class_id: String,
    pub label: String,
    /// Missing items in declared order
    pub missing: Vec<String>,
}

/// Bijective mapping between missing-item subsets and class codes
#[derive(Debug, Clone)]
pub struct CategoryTable {
    items: Vec<String>,
    categories: Vec<Category>,
    by_mask: HashMap<u32, usize>,
}

impl CategoryTable {
    /// Enumerate all 2^N subsets of `items`
    pub fn generate<S: AsRef<str>>(items: &[S]) -> Result<Self> {
        let items = normalize_items(items)?;
        let categories = enumerate_masks(items.len())
            .into_iter()
            .enumerate()
            .map(|(code, mask)| {
                let missing = members(&items, mask);
                Category {
                    class_id: code.to_string(),
                    label: label_for(&missing, items.len()),
                    missing,
                }
            })
            .collect();

        Self::from_categories(items, categories)
    }

    /// Rebuild a table from persisted rows
    ///
    /// Fails unless the rows cover every subset exactly once with distinct
    /// class codes and labels.
    pub fn from_categories(items: Vec<String>, categories: Vec<Category>) -> Result<Self> {
        let expected = 1usize << items.len();
        if categories.len() != expected {
            return Err(Error::Internal(format!(
                "Category table has {} entries, expected {}",
                categories.len(),
                expected
            )));
        }

        let mut by_mask = HashMap::with_capacity(expected);
        let mut seen_classes = HashMap::with_capacity(expected);
        let mut seen_labels = HashMap::with_capacity(expected);

        for (index, category) in categories.iter().enumerate() {
            let mask = mask_of(&items, &category.missing)?;
            if by_mask.insert(mask, index).is_some() {
                return Err(Error::Internal(format!(
                    "Category table lists missing set {:?} twice",
                    category.missing
                )));
            }
            if seen_classes.insert(category.class_id.as_str(), index).is_some() {
                return Err(Error::Internal(format!(
                    "Category table reuses class {}",
                    category.class_id
                )));
            }
            if seen_labels.insert(category.label.as_str(), index).is_some() {
                return Err(Error::Internal(format!(
                    "Category table reuses label {}",
                    category.label
                )));
            }
        }

        Ok(Self {
            items,
            categories,
            by_mask,
        })
    }

    pub fn items(&self) -> &[String] {
        &self.items
    }

    /// Categories in class-code order
    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    /// Resolve a reviewer's missing-item flags
    ///
    /// Items absent from the state count as present. Unknown names are
    /// rejected.
    pub fn resolve(&self, state: &MissingItemsState) -> Result<&Category> {
        for name in state.keys() {
            if !self.items.contains(name) {
                return Err(Error::InvalidInput(format!("Unknown item '{}'", name)));
            }
        }
        let missing: Vec<&str> = state
            .iter()
            .filter(|(_, is_missing)| **is_missing)
            .map(|(name, _)| name.as_str())
            .collect();
        self.resolve_missing(&missing)
    }

    /// Resolve a list of missing item names (any order, duplicates ignored)
    pub fn resolve_missing<S: AsRef<str>>(&self, missing: &[S]) -> Result<&Category> {
        let mask = mask_of(&self.items, missing)?;
        self.by_mask
            .get(&mask)
            .map(|&index| &self.categories[index])
            .ok_or_else(|| Error::Internal(format!("No category for mask {:#b}", mask)))
    }

    pub fn by_class(&self, class_id: &str) -> Option<&Category> {
        self.categories.iter().find(|c| c.class_id == class_id)
    }

    pub fn by_label(&self, label: &str) -> Option<&Category> {
        self.categories.iter().find(|c| c.label == label)
    }

    /// Match a model prediction that may name either a label or a class code
    pub fn lookup(&self, label_or_class: &str) -> Option<&Category> {
        self.by_label(label_or_class)
            .or_else(|| self.by_class(label_or_class))
    }

    /// Missing items of the category with the given label
    pub fn missing_items(&self, label: &str) -> Option<&[String]> {
        self.by_label(label).map(|c| c.missing.as_slice())
    }
}

fn enumerate_masks(n: usize) -> Vec<u32> {
    let full: u32 = (1u32 << n) - 1;
    let mut masks = vec![0, full];

    for size in 1..n as u32 {
        let mut group: Vec<Vec<usize>> = (1..full)
            .filter(|mask| mask.count_ones() == size)
            .map(|mask| indices(mask, n))
            .collect();
        group.sort();
        masks.extend(
            group
                .into_iter()
                .map(|idx| idx.into_iter().fold(0u32, |acc, i| acc | (1 << i))),
        );
    }

    masks
}

fn indices(mask: u32, n: usize) -> Vec<usize> {
    (0..n).filter(|i| mask & (1 << i) != 0).collect()
}

fn members(items: &[String], mask: u32) -> Vec<String> {
    indices(mask, items.len())
        .into_iter()
        .map(|i| items[i].clone())
        .collect()
}

fn mask_of<S: AsRef<str>>(items: &[String], missing: &[S]) -> Result<u32> {
    let mut mask = 0u32;
    for name in missing {
        let name = name.as_ref();
        let index = items
            .iter()
            .position(|item| item == name)
            .ok_or_else(|| Error::InvalidInput(format!("Unknown item '{}'", name)))?;
        mask |= 1 << index;
    }
    Ok(mask)
}

fn label_for(missing: &[String], total: usize) -> String {
    if missing.is_empty() {
        OK_LABEL.to_string()
    } else if missing.len() == total {
        ALL_MISSING_LABEL.to_string()
    } else {
        format!("NOK-{}_weg", missing.join("_"))
    }
}

/// Checklist the hardcoded resolver was written for
pub const LEGACY_ITEMS: [&str; 3] = ["hamer", "schaar", "sleutel"];

/// The original hardcoded three-item resolver
///
/// Kept only to report where it disagrees with the generated table. It maps
/// hamer+sleutel and schaar+sleutel onto the same class `4`, and labels
/// hamer+schaar as `NOK-alleen_sleutel`.
pub fn legacy_three_item_category(
    hamer: bool,
    schaar: bool,
    sleutel: bool,
) -> (&'static str, &'static str) {
    match (hamer, schaar, sleutel) {
        (false, false, false) => ("0", "OK"),
        (true, true, true) => ("1", "NOK-alles_weg"),
        (true, false, false) => ("2", "NOK-hamer_weg"),
        (false, true, false) => ("3", "NOK-schaar_weg"),
        (false, false, true) => ("5", "NOK-sleutel_weg"),
        (false, true, true) => ("4", "NOK-schaar_sleutel_weg"),
        (true, true, false) => ("6", "NOK-alleen_sleutel"),
        (true, false, true) => ("4", "NOK-schaar_sleutel_weg"),
    }
}

/// A subset the legacy resolver codes differently from the table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryDiscrepancy {
    pub missing: Vec<String>,
    pub legacy_class: String,
    pub legacy_label: String,
    pub class_id: String,
    pub label: String,
}

/// Compare a table with the legacy resolver
///
/// Only tables whose checklist is exactly [`LEGACY_ITEMS`] are compared; any
/// other table yields no discrepancies.
pub fn legacy_discrepancies(table: &CategoryTable) -> Vec<CategoryDiscrepancy> {
    if !table.items().iter().map(String::as_str).eq(LEGACY_ITEMS) {
        return Vec::new();
    }

    table
        .categories()
        .iter()
        .filter_map(|category| {
            let is_missing = |name: &str| category.missing.iter().any(|m| m == name);
            let (legacy_class, legacy_label) = legacy_three_item_category(
                is_missing("hamer"),
                is_missing("schaar"),
                is_missing("sleutel"),
            );
            if legacy_class == category.class_id && legacy_label == category.label {
                return None;
            }
            Some(CategoryDiscrepancy {
                missing: category.missing.clone(),
                legacy_class: legacy_class.to_string(),
                legacy_label: legacy_label.to_string(),
                class_id: category.class_id.clone(),
                label: category.label.clone(),
            })
        })
        .collect()
}
