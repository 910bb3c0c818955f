//! Analysis database operations
//!
//! Predicted fields are written once at inspection time and never updated;
//! review only touches the `corrected_*`, notes and image columns.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqliteConnection, SqlitePool};
use uuid::Uuid;
use wpi_common::domain::{Analysis, InspectionStatus, ItemCounts};
use wpi_common::{Error, Result};

use super::{parse_optional_uuid, parse_timestamp, parse_uuid, placeholders};

const SELECT_ANALYSIS: &str = r#"
    SELECT id, workplace_id, model_id, model_version, model_type, predicted_class, predicted_label,
           confidence, status, missing_items, detected_counts, corrected_class, corrected_label,
           corrected_counts, notes, face_count, device_id, image_path, exported_for_training, created_at
    FROM analyses
"#;

fn analysis_from_row(row: &SqliteRow) -> Result<Analysis> {
    let id: String = row.get("id");
    let model_type: String = row.get("model_type");
    let status: String = row.get("status");
    let missing_items: String = row.get("missing_items");
    let detected_counts: String = row.get("detected_counts");
    let corrected_counts: Option<String> = row.get("corrected_counts");
    let face_count: i64 = row.get("face_count");
    let created_at: String = row.get("created_at");

    let corrected_counts = match corrected_counts {
        Some(json) => Some(serde_json::from_str::<ItemCounts>(&json)?),
        None => None,
    };

    Ok(Analysis {
        id: parse_uuid(&id)?,
        workplace_id: parse_optional_uuid(row.get("workplace_id"))?,
        model_id: parse_optional_uuid(row.get("model_id"))?,
        model_version: row.get("model_version"),
        model_type: model_type.parse()?,
        predicted_class: row.get("predicted_class"),
        predicted_label: row.get("predicted_label"),
        confidence: row.get("confidence"),
        status: status.parse()?,
        missing_items: serde_json::from_str(&missing_items)?,
        detected_counts: serde_json::from_str(&detected_counts)?,
        corrected_class: row.get("corrected_class"),
        corrected_label: row.get("corrected_label"),
        corrected_counts,
        notes: row.get("notes"),
        face_count: face_count.max(0) as u32,
        device_id: row.get("device_id"),
        image_path: row.get("image_path"),
        exported_for_training: row.get("exported_for_training"),
        created_at: parse_timestamp(&created_at)?,
    })
}

pub async fn insert_analysis(pool: &SqlitePool, analysis: &Analysis) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO analyses (id, workplace_id, model_id, model_version, model_type, predicted_class,
                              predicted_label, confidence, status, missing_items, detected_counts,
                              corrected_class, corrected_label, corrected_counts, notes, face_count,
                              device_id, image_path, exported_for_training, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(analysis.id.to_string())
    .bind(analysis.workplace_id.map(|id| id.to_string()))
    .bind(analysis.model_id.map(|id| id.to_string()))
    .bind(&analysis.model_version)
    .bind(analysis.model_type.as_str())
    .bind(&analysis.predicted_class)
    .bind(&analysis.predicted_label)
    .bind(analysis.confidence)
    .bind(analysis.status.as_str())
    .bind(serde_json::to_string(&analysis.missing_items)?)
    .bind(serde_json::to_string(&analysis.detected_counts)?)
    .bind(&analysis.corrected_class)
    .bind(&analysis.corrected_label)
    .bind(
        analysis
            .corrected_counts
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?,
    )
    .bind(&analysis.notes)
    .bind(analysis.face_count as i64)
    .bind(&analysis.device_id)
    .bind(&analysis.image_path)
    .bind(analysis.exported_for_training)
    .bind(analysis.created_at.to_rfc3339())
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn require_analysis(pool: &SqlitePool, id: Uuid) -> Result<Analysis> {
    let row = sqlx::query(&format!("{} WHERE id = ?", SELECT_ANALYSIS))
        .bind(id.to_string())
        .fetch_optional(pool)
        .await?;

    match row {
        Some(row) => analysis_from_row(&row),
        None => Err(Error::NotFound(format!("Analysis {} not found", id))),
    }
}

/// History filter; `None` fields do not filter
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AnalysisFilter {
    pub workplace_id: Option<Uuid>,
    pub model_version: Option<String>,
    pub status: Option<InspectionStatus>,
    /// `true`: corrected only, `false`: awaiting review only
    pub reviewed: Option<bool>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

fn push_filter(builder: &mut QueryBuilder<'_, Sqlite>, filter: &AnalysisFilter) {
    let mut conditions = 0;
    let mut next_clause = |builder: &mut QueryBuilder<'_, Sqlite>| {
        builder.push(if conditions == 0 { " WHERE " } else { " AND " });
        conditions += 1;
    };

    if let Some(workplace_id) = filter.workplace_id {
        next_clause(builder);
        builder.push("workplace_id = ").push_bind(workplace_id.to_string());
    }
    if let Some(version) = &filter.model_version {
        next_clause(builder);
        builder.push("model_version = ").push_bind(version.clone());
    }
    if let Some(status) = filter.status {
        next_clause(builder);
        builder.push("status = ").push_bind(status.as_str());
    }
    if let Some(reviewed) = filter.reviewed {
        next_clause(builder);
        builder.push(if reviewed {
            "corrected_label IS NOT NULL"
        } else {
            "corrected_label IS NULL"
        });
    }
}

/// Analyses matching a filter, newest first
pub async fn list_analyses(pool: &SqlitePool, filter: &AnalysisFilter) -> Result<Vec<Analysis>> {
    let mut builder = QueryBuilder::<Sqlite>::new(SELECT_ANALYSIS);
    push_filter(&mut builder, filter);
    builder.push(" ORDER BY created_at DESC");
    builder
        .push(" LIMIT ")
        .push_bind(filter.limit.unwrap_or(-1))
        .push(" OFFSET ")
        .push_bind(filter.offset.unwrap_or(0).max(0));

    let rows = builder.build().fetch_all(pool).await?;
    rows.iter().map(analysis_from_row).collect()
}

/// Every analysis, optionally limited to one workplace, oldest first
pub async fn load_all(pool: &SqlitePool, workplace_id: Option<Uuid>) -> Result<Vec<Analysis>> {
    let rows = match workplace_id {
        Some(id) => {
            sqlx::query(&format!("{} WHERE workplace_id = ? ORDER BY created_at", SELECT_ANALYSIS))
                .bind(id.to_string())
                .fetch_all(pool)
                .await?
        }
        None => {
            sqlx::query(&format!("{} ORDER BY created_at", SELECT_ANALYSIS))
                .fetch_all(pool)
                .await?
        }
    };
    rows.iter().map(analysis_from_row).collect()
}

pub async fn load_by_ids(pool: &SqlitePool, ids: &[Uuid]) -> Result<Vec<Analysis>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let sql = format!(
        "{} WHERE id IN ({}) ORDER BY created_at",
        SELECT_ANALYSIS,
        placeholders(ids.len())
    );
    let mut query = sqlx::query(&sql);
    for id in ids {
        query = query.bind(id.to_string());
    }

    let rows = query.fetch_all(pool).await?;
    rows.iter().map(analysis_from_row).collect()
}

/// Review fields written by a correction
#[derive(Debug, Clone)]
pub struct CorrectionUpdate {
    pub corrected_class: String,
    pub corrected_label: String,
    pub corrected_counts: Option<ItemCounts>,
    pub notes: Option<String>,
    /// Image path after the review (cleared when the image was discarded)
    pub image_path: Option<String>,
}

pub async fn save_correction(pool: &SqlitePool, id: Uuid, update: &CorrectionUpdate) -> Result<()> {
    let result = sqlx::query(
        r#"
        UPDATE analyses
        SET corrected_class = ?, corrected_label = ?, corrected_counts = ?, notes = ?,
            image_path = ?, reviewed_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&update.corrected_class)
    .bind(&update.corrected_label)
    .bind(
        update
            .corrected_counts
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?,
    )
    .bind(&update.notes)
    .bind(&update.image_path)
    .bind(Utc::now().to_rfc3339())
    .bind(id.to_string())
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("Analysis {} not found", id)));
    }
    Ok(())
}

/// Mark analyses as exported into a training partition
pub async fn mark_exported(conn: &mut SqliteConnection, ids: &[Uuid], partition: &str) -> Result<u64> {
    if ids.is_empty() {
        return Ok(0);
    }

    let sql = format!(
        "UPDATE analyses SET exported_for_training = 1, training_partition = ? WHERE id IN ({})",
        placeholders(ids.len())
    );
    let mut query = sqlx::query(&sql).bind(partition);
    for id in ids {
        query = query.bind(id.to_string());
    }

    let result = query.execute(conn).await?;
    Ok(result.rows_affected())
}

/// Delete one analysis row, returning it so the caller can remove the image
pub async fn delete_analysis(pool: &SqlitePool, id: Uuid) -> Result<Analysis> {
    let analysis = require_analysis(pool, id).await?;
    sqlx::query("DELETE FROM analyses WHERE id = ?")
        .bind(id.to_string())
        .execute(pool)
        .await?;
    Ok(analysis)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IssueCount {
    pub label: String,
    pub count: i64,
}

/// Summary shown above the review history
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisStatistics {
    pub total_analyses: i64,
    pub ok_count: i64,
    pub nok_count: i64,
    /// Five most frequent NOK predictions
    pub common_issues: Vec<IssueCount>,
    /// Mean confidence (0–1), two decimals
    pub avg_confidence: f64,
    pub corrections_count: i64,
}

pub async fn statistics(pool: &SqlitePool, workplace_id: Option<Uuid>) -> Result<AnalysisStatistics> {
    let scope = workplace_id.map(|id| id.to_string());
    let condition = if scope.is_some() { "workplace_id = ?" } else { "1 = 1" };

    let totals_sql = format!(
        r#"
        SELECT COUNT(*) AS total,
               COALESCE(SUM(CASE WHEN status = 'OK' THEN 1 ELSE 0 END), 0) AS ok_count,
               COALESCE(SUM(CASE WHEN status = 'NOK' THEN 1 ELSE 0 END), 0) AS nok_count,
               AVG(confidence) AS avg_confidence,
               COALESCE(SUM(CASE WHEN corrected_label IS NOT NULL THEN 1 ELSE 0 END), 0) AS corrections
        FROM analyses
        WHERE {}
        "#,
        condition
    );
    let issues_sql = format!(
        r#"
        SELECT predicted_label, COUNT(*) AS count
        FROM analyses
        WHERE status = 'NOK' AND {}
        GROUP BY predicted_label
        ORDER BY count DESC, predicted_label
        LIMIT 5
        "#,
        condition
    );

    let mut totals = sqlx::query(&totals_sql);
    let mut top_issues = sqlx::query(&issues_sql);
    if let Some(id) = &scope {
        totals = totals.bind(id.clone());
        top_issues = top_issues.bind(id.clone());
    }
    let row = totals.fetch_one(pool).await?;
    let issues = top_issues.fetch_all(pool).await?;

    let avg_confidence: Option<f64> = row.get("avg_confidence");

    Ok(AnalysisStatistics {
        total_analyses: row.get("total"),
        ok_count: row.get("ok_count"),
        nok_count: row.get("nok_count"),
        common_issues: issues
            .iter()
            .map(|r| IssueCount {
                label: r.get("predicted_label"),
                count: r.get("count"),
            })
            .collect(),
        avg_confidence: avg_confidence.map(|v| (v * 100.0).round() / 100.0).unwrap_or(0.0),
        corrections_count: row.get("corrections"),
    })
}
