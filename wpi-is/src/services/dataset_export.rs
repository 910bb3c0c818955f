//! YOLO classification dataset export
//!
//! Labeled training images of one workplace are split per label into
//! train/val and packed into a zip archive:
//!
//! ```text
//! data.yaml
//! README.md
//! train/<label>/<image>
//! val/<label>/<image>
//! ```
//!
//! Class names in `data.yaml` are the labels in alphabetical order, which is
//! the order YOLO assigns class indices for folder datasets.

use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Write;
use std::path::PathBuf;
use tracing::{info, warn};
use uuid::Uuid;
use wpi_common::domain::{TrainingImage, Workplace};
use wpi_common::{Error, Result};

use crate::config::validate_train_split;
use crate::db;
use crate::db::dataset_exports::DatasetExport;
use crate::error::{ApiError, ApiResult};
use crate::storage::EXPORTS_DIR;
use crate::AppState;

/// Images of one label after the split
#[derive(Debug, Clone)]
pub struct LabelSplit {
    pub label: String,
    pub train: Vec<TrainingImage>,
    pub val: Vec<TrainingImage>,
}

/// Shuffle the images of every label and cut at `floor(n * train_split)`
///
/// Unlabeled images are left out. Result is ordered by label.
pub fn split_by_label<R: Rng + ?Sized>(
    images: Vec<TrainingImage>,
    train_split: f64,
    rng: &mut R,
) -> Vec<LabelSplit> {
    let mut by_label: BTreeMap<String, Vec<TrainingImage>> = BTreeMap::new();
    for image in images.into_iter().filter(|i| i.label.is_labeled()) {
        by_label.entry(image.label.to_string()).or_default().push(image);
    }

    by_label
        .into_iter()
        .map(|(label, mut images)| {
            images.shuffle(rng);
            let cut = ((images.len() as f64) * train_split).floor() as usize;
            let val = images.split_off(cut.min(images.len()));
            LabelSplit {
                label,
                train: images,
                val,
            }
        })
        .collect()
}

/// `data.yaml` for a YOLO classification run
pub fn data_yaml(workplace_name: &str, labels: &[&str], generated_at: DateTime<Utc>) -> String {
    let mut sorted = labels.to_vec();
    sorted.sort_unstable();

    let mut yaml = format!(
        "# YOLOv8 classification dataset\n# Workplace: {}\n# Generated: {}\n\npath: .\ntrain: train\nval: val\n\nnames:\n",
        workplace_name,
        generated_at.format("%Y-%m-%d %H:%M:%S")
    );
    for (index, label) in sorted.iter().enumerate() {
        yaml.push_str(&format!("  {}: {}\n", index, label));
    }
    yaml
}

fn readme(
    workplace: &Workplace,
    splits: &[LabelSplit],
    train_split: f64,
    generated_at: DateTime<Utc>,
) -> String {
    let train_total: usize = splits.iter().map(|s| s.train.len()).sum();
    let val_total: usize = splits.iter().map(|s| s.val.len()).sum();

    let mut text = format!(
        "# Training dataset: {name}\n\n\
         - Workplace: {name}\n\
         - Description: {description}\n\
         - Items: {items}\n\
         - Images: {total} (train {train}, val {val})\n\
         - Split: {train_pct}% train / {val_pct}% val\n\
         - Generated: {generated}\n\n\
         ## Classes\n\n",
        name = workplace.name,
        description = workplace.description.as_deref().unwrap_or("-"),
        items = workplace.items.join(", "),
        total = train_total + val_total,
        train = train_total,
        val = val_total,
        train_pct = (train_split * 100.0).round(),
        val_pct = ((1.0 - train_split) * 100.0).round(),
        generated = generated_at.format("%Y-%m-%d %H:%M:%S"),
    );
    for split in splits {
        text.push_str(&format!(
            "- {}: {} images (train {}, val {})\n",
            split.label,
            split.train.len() + split.val.len(),
            split.train.len(),
            split.val.len()
        ));
    }
    text.push_str(
        "\n## Training\n\n\
         The `train/` and `val/` folders follow the image-classification\n\
         folder layout, one folder per class:\n\n\
         ```\n\
         yolo classify train data=. model=yolov8n-cls.pt epochs=50 imgsz=640\n\
         ```\n\n\
         Upload the resulting `best.pt` as a new model version of this workplace.\n",
    );
    text
}

/// Archive file name: workplace name reduced to `[A-Za-z0-9_-]`, plus timestamp
fn archive_name(workplace_name: &str, generated_at: DateTime<Utc>) -> String {
    let safe: String = workplace_name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    format!("dataset_{}_{}.zip", safe, generated_at.format("%Y%m%d_%H%M%S"))
}

struct ArchiveSummary {
    train_written: usize,
    val_written: usize,
}

fn write_archive(
    target: PathBuf,
    root: PathBuf,
    splits: &[LabelSplit],
    yaml: &str,
    readme: &str,
) -> Result<ArchiveSummary> {
    let zip_err = |e: zip::result::ZipError| Error::Internal(format!("Zip archive: {}", e));

    let file = File::create(&target)?;
    let mut zip = zip::ZipWriter::new(file);
    let options =
        zip::write::SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    zip.start_file("data.yaml", options).map_err(zip_err)?;
    zip.write_all(yaml.as_bytes())?;
    zip.start_file("README.md", options).map_err(zip_err)?;
    zip.write_all(readme.as_bytes())?;

    let mut summary = ArchiveSummary {
        train_written: 0,
        val_written: 0,
    };
    for split in splits {
        for (subset, images) in [("train", &split.train), ("val", &split.val)] {
            for image in images.iter() {
                let source = root.join(&image.image_path);
                let bytes = match std::fs::read(&source) {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        warn!(image_id = %image.id, path = %source.display(), error = %e, "Skipping unreadable training image");
                        continue;
                    }
                };
                let file_name = source
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| format!("{}.jpg", image.id));

                zip.start_file(format!("{}/{}/{}", subset, split.label, file_name), options)
                    .map_err(zip_err)?;
                zip.write_all(&bytes)?;
                match subset {
                    "train" => summary.train_written += 1,
                    _ => summary.val_written += 1,
                }
            }
        }
    }

    zip.finish().map_err(zip_err)?;
    Ok(summary)
}

#[derive(Debug, Clone, Serialize)]
pub struct DatasetExportResult {
    pub export: DatasetExport,
    pub file_name: String,
    pub train_count: usize,
    pub val_count: usize,
}

/// Build and register a dataset archive for a workplace
pub async fn export_dataset(
    state: &AppState,
    workplace_id: Uuid,
    train_split: f64,
) -> ApiResult<DatasetExportResult> {
    let train_split = validate_train_split(train_split)?;
    let workplace = db::workplaces::require_workplace(&state.db, workplace_id).await?;
    let images = db::training_images::list_images(&state.db, workplace_id, false).await?;

    let splits = split_by_label(images, train_split, &mut rand::thread_rng());
    if splits.is_empty() {
        return Err(Error::InvalidInput(format!(
            "Workplace '{}' has no labeled training images",
            workplace.name
        ))
        .into());
    }

    let generated_at = Utc::now();
    let labels: Vec<&str> = splits.iter().map(|s| s.label.as_str()).collect();
    let yaml = data_yaml(&workplace.name, &labels, generated_at);
    let readme = readme(&workplace, &splits, train_split, generated_at);
    let class_distribution: BTreeMap<String, u32> = splits
        .iter()
        .map(|s| (s.label.clone(), (s.train.len() + s.val.len()) as u32))
        .collect();

    let file_name = archive_name(&workplace.name, generated_at);
    let relative = format!("{}/{}", EXPORTS_DIR, file_name);
    let target = state.storage.resolve(&relative)?;
    if let Some(parent) = target.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let root = state.storage.root().to_path_buf();
    let summary = tokio::task::spawn_blocking(move || {
        write_archive(target, root, &splits, &yaml, &readme)
    })
    .await
    .map_err(|e| ApiError::Internal(format!("Export task failed: {}", e)))??;

    let export = DatasetExport {
        id: Uuid::new_v4(),
        workplace_id,
        archive_path: relative,
        image_count: (summary.train_written + summary.val_written) as u32,
        class_distribution,
        train_split,
        created_at: generated_at,
    };
    db::dataset_exports::insert_export(&state.db, &export).await?;

    info!(
        workplace_id = %workplace_id,
        archive = %export.archive_path,
        train = summary.train_written,
        val = summary.val_written,
        "Dataset exported"
    );

    Ok(DatasetExportResult {
        export,
        file_name,
        train_count: summary.train_written,
        val_count: summary.val_written,
    })
}
