//! Training image database operations

use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;
use wpi_common::domain::{TrainingImage, TrainingLabel};
use wpi_common::{Error, Result};

use super::{parse_timestamp, parse_uuid};

const SELECT_IMAGE: &str = r#"
    SELECT id, workplace_id, image_path, label, class_id, source, validated, created_at
    FROM training_images
"#;

fn image_from_row(row: &SqliteRow) -> Result<TrainingImage> {
    let id: String = row.get("id");
    let workplace_id: String = row.get("workplace_id");
    let label: String = row.get("label");
    let source: String = row.get("source");
    let created_at: String = row.get("created_at");

    Ok(TrainingImage {
        id: parse_uuid(&id)?,
        workplace_id: parse_uuid(&workplace_id)?,
        image_path: row.get("image_path"),
        label: label.parse()?,
        class_id: row.get("class_id"),
        source: source.parse()?,
        validated: row.get("validated"),
        created_at: parse_timestamp(&created_at)?,
    })
}

pub async fn insert_image(pool: &SqlitePool, image: &TrainingImage) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO training_images (id, workplace_id, image_path, label, class_id, source, validated, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(image.id.to_string())
    .bind(image.workplace_id.to_string())
    .bind(&image.image_path)
    .bind(image.label.to_string())
    .bind(&image.class_id)
    .bind(image.source.as_str())
    .bind(image.validated)
    .bind(image.created_at.to_rfc3339())
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn require_image(pool: &SqlitePool, id: Uuid) -> Result<TrainingImage> {
    let row = sqlx::query(&format!("{} WHERE id = ?", SELECT_IMAGE))
        .bind(id.to_string())
        .fetch_optional(pool)
        .await?;

    match row {
        Some(row) => image_from_row(&row),
        None => Err(Error::NotFound(format!("Training image {} not found", id))),
    }
}

/// Images of a workplace, newest first
pub async fn list_images(
    pool: &SqlitePool,
    workplace_id: Uuid,
    validated_only: bool,
) -> Result<Vec<TrainingImage>> {
    let sql = if validated_only {
        format!(
            "{} WHERE workplace_id = ? AND validated = 1 ORDER BY created_at DESC",
            SELECT_IMAGE
        )
    } else {
        format!("{} WHERE workplace_id = ? ORDER BY created_at DESC", SELECT_IMAGE)
    };

    let rows = sqlx::query(&sql)
        .bind(workplace_id.to_string())
        .fetch_all(pool)
        .await?;
    rows.iter().map(image_from_row).collect()
}

/// Raw labels of every image of a workplace (input of the completion calculator)
pub async fn list_labels(pool: &SqlitePool, workplace_id: Uuid) -> Result<Vec<String>> {
    let labels: Vec<String> =
        sqlx::query_scalar("SELECT label FROM training_images WHERE workplace_id = ?")
            .bind(workplace_id.to_string())
            .fetch_all(pool)
            .await?;
    Ok(labels)
}

pub async fn count_validated(pool: &SqlitePool, workplace_id: Uuid) -> Result<u32> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM training_images WHERE workplace_id = ? AND validated = 1",
    )
    .bind(workplace_id.to_string())
    .fetch_one(pool)
    .await?;
    Ok(count as u32)
}

/// Relabel and/or (un)validate an image
pub async fn update_image(
    pool: &SqlitePool,
    id: Uuid,
    label: &TrainingLabel,
    class_id: Option<&str>,
    validated: bool,
) -> Result<()> {
    let result = sqlx::query(
        "UPDATE training_images SET label = ?, class_id = ?, validated = ? WHERE id = ?",
    )
    .bind(label.to_string())
    .bind(class_id)
    .bind(validated)
    .bind(id.to_string())
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("Training image {} not found", id)));
    }
    Ok(())
}

/// Delete an image row, returning it so the caller can remove the file
pub async fn delete_image(pool: &SqlitePool, id: Uuid) -> Result<TrainingImage> {
    let image = require_image(pool, id).await?;
    sqlx::query("DELETE FROM training_images WHERE id = ?")
        .bind(id.to_string())
        .execute(pool)
        .await?;
    Ok(image)
}
