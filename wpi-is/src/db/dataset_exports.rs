//! Dataset export registry

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{Row, SqlitePool};
use std::collections::BTreeMap;
use uuid::Uuid;
use wpi_common::Result;

use super::{parse_timestamp, parse_uuid};

/// A dataset archive produced for a workplace
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatasetExport {
    pub id: Uuid,
    pub workplace_id: Uuid,
    /// Archive path relative to the root folder
    pub archive_path: String,
    pub image_count: u32,
    /// label -> number of images
    pub class_distribution: BTreeMap<String, u32>,
    pub train_split: f64,
    pub created_at: DateTime<Utc>,
}

pub async fn insert_export(pool: &SqlitePool, export: &DatasetExport) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO dataset_exports (id, workplace_id, archive_path, image_count, class_distribution, train_split, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(export.id.to_string())
    .bind(export.workplace_id.to_string())
    .bind(&export.archive_path)
    .bind(export.image_count as i64)
    .bind(serde_json::to_string(&export.class_distribution)?)
    .bind(export.train_split)
    .bind(export.created_at.to_rfc3339())
    .execute(pool)
    .await?;

    Ok(())
}

/// Exports of a workplace, newest first
pub async fn list_exports(pool: &SqlitePool, workplace_id: Uuid) -> Result<Vec<DatasetExport>> {
    let rows = sqlx::query(
        r#"
        SELECT id, workplace_id, archive_path, image_count, class_distribution, train_split, created_at
        FROM dataset_exports
        WHERE workplace_id = ?
        ORDER BY created_at DESC
        "#,
    )
    .bind(workplace_id.to_string())
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| {
            let id: String = row.get("id");
            let workplace_id: String = row.get("workplace_id");
            let image_count: i64 = row.get("image_count");
            let distribution: String = row.get("class_distribution");
            let created_at: String = row.get("created_at");

            Ok(DatasetExport {
                id: parse_uuid(&id)?,
                workplace_id: parse_uuid(&workplace_id)?,
                archive_path: row.get("archive_path"),
                image_count: image_count.max(0) as u32,
                class_distribution: serde_json::from_str(&distribution)?,
                train_split: row.get("train_split"),
                created_at: parse_timestamp(&created_at)?,
            })
        })
        .collect()
}
