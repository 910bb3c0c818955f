//! Model version database operations

use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;
use wpi_common::domain::model::ActivationPlan;
use wpi_common::domain::{ModelStatus, ModelVersion};
use wpi_common::{Error, Result};

use super::{parse_timestamp, parse_uuid};

const SELECT_MODEL: &str = r#"
    SELECT id, workplace_id, version, model_type, status, test_accuracy, notes, file_path, uploaded_at
    FROM models
"#;

fn model_from_row(row: &SqliteRow) -> Result<ModelVersion> {
    let id: String = row.get("id");
    let workplace_id: String = row.get("workplace_id");
    let model_type: String = row.get("model_type");
    let status: String = row.get("status");
    let uploaded_at: String = row.get("uploaded_at");

    Ok(ModelVersion {
        id: parse_uuid(&id)?,
        workplace_id: parse_uuid(&workplace_id)?,
        version: row.get("version"),
        model_type: model_type.parse()?,
        status: status.parse()?,
        test_accuracy: row.get("test_accuracy"),
        uploaded_at: parse_timestamp(&uploaded_at)?,
        notes: row.get("notes"),
        file_path: row.get("file_path"),
    })
}

pub async fn insert_model(pool: &SqlitePool, model: &ModelVersion) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO models (id, workplace_id, version, model_type, status, test_accuracy, notes, file_path, uploaded_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(model.id.to_string())
    .bind(model.workplace_id.to_string())
    .bind(&model.version)
    .bind(model.model_type.as_str())
    .bind(model.status.as_str())
    .bind(model.test_accuracy)
    .bind(&model.notes)
    .bind(&model.file_path)
    .bind(model.uploaded_at.to_rfc3339())
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn load_model(pool: &SqlitePool, id: Uuid) -> Result<Option<ModelVersion>> {
    let row = sqlx::query(&format!("{} WHERE id = ?", SELECT_MODEL))
        .bind(id.to_string())
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(model_from_row).transpose()
}

pub async fn require_model(pool: &SqlitePool, id: Uuid) -> Result<ModelVersion> {
    load_model(pool, id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Model {} not found", id)))
}

/// Models of a workplace, oldest upload first
pub async fn list_models(
    pool: &SqlitePool,
    workplace_id: Uuid,
    status: Option<ModelStatus>,
) -> Result<Vec<ModelVersion>> {
    let rows = match status {
        Some(status) => {
            sqlx::query(&format!(
                "{} WHERE workplace_id = ? AND status = ? ORDER BY uploaded_at",
                SELECT_MODEL
            ))
            .bind(workplace_id.to_string())
            .bind(status.as_str())
            .fetch_all(pool)
            .await?
        }
        None => {
            sqlx::query(&format!("{} WHERE workplace_id = ? ORDER BY uploaded_at", SELECT_MODEL))
                .bind(workplace_id.to_string())
                .fetch_all(pool)
                .await?
        }
    };

    rows.iter().map(model_from_row).collect()
}

/// Every model of every workplace, oldest upload first
pub async fn list_all_models(pool: &SqlitePool) -> Result<Vec<ModelVersion>> {
    let rows = sqlx::query(&format!("{} ORDER BY uploaded_at", SELECT_MODEL))
        .fetch_all(pool)
        .await?;
    rows.iter().map(model_from_row).collect()
}

pub async fn load_active_model(pool: &SqlitePool, workplace_id: Uuid) -> Result<Option<ModelVersion>> {
    let row = sqlx::query(&format!(
        "{} WHERE workplace_id = ? AND status = 'active'",
        SELECT_MODEL
    ))
    .bind(workplace_id.to_string())
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(model_from_row).transpose()
}

/// Apply an activation plan in one transaction
///
/// Previously active models are archived before the target is activated so
/// the one-active-model index never sees two active rows.
pub async fn apply_activation(pool: &SqlitePool, plan: &ActivationPlan) -> Result<()> {
    let mut tx = pool.begin().await?;

    for archived in &plan.archive {
        sqlx::query("UPDATE models SET status = 'archived' WHERE id = ?")
            .bind(archived.to_string())
            .execute(&mut *tx)
            .await?;
    }

    let result = sqlx::query("UPDATE models SET status = 'active' WHERE id = ? AND workplace_id = ?")
        .bind(plan.activate.to_string())
        .bind(plan.workplace_id.to_string())
        .execute(&mut *tx)
        .await?;
    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("Model {} not found", plan.activate)));
    }

    sqlx::query("UPDATE workplaces SET active_model_id = ?, updated_at = ? WHERE id = ?")
        .bind(plan.activate.to_string())
        .bind(chrono::Utc::now().to_rfc3339())
        .bind(plan.workplace_id.to_string())
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(())
}

pub async fn delete_model(pool: &SqlitePool, id: Uuid) -> Result<bool> {
    let result = sqlx::query("DELETE FROM models WHERE id = ?")
        .bind(id.to_string())
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}
