//! Database initialization
//!
//! Creates the SQLite database on first run, applies connection pragmas and
//! creates every table idempotently. Missing runtime settings are written
//! with their built-in defaults.

use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::{info, warn};

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .min_connections(1)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    // WAL lets the review UI read while an inspection writes
    sqlx::query("PRAGMA journal_mode = WAL").execute(&pool).await?;
    sqlx::query("PRAGMA busy_timeout = 5000").execute(&pool).await?;

    create_schema(&pool).await?;
    init_default_settings(&pool).await?;

    Ok(pool)
}

/// Create all tables and indexes (idempotent)
///
/// Also used directly by tests running against `sqlite::memory:`.
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query("PRAGMA foreign_keys = ON").execute(pool).await?;

    create_settings_table(pool).await?;
    create_workplaces_table(pool).await?;
    create_category_codes_table(pool).await?;
    create_models_table(pool).await?;
    create_training_images_table(pool).await?;
    create_analyses_table(pool).await?;
    create_dataset_exports_table(pool).await?;

    Ok(())
}

pub async fn create_settings_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_workplaces_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS workplaces (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            description TEXT,
            items TEXT NOT NULL,
            reference_photo TEXT,
            whiteboard_region TEXT,
            confidence_threshold REAL NOT NULL DEFAULT 0.25,
            active INTEGER NOT NULL DEFAULT 1,
            active_model_id TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_category_codes_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS category_codes (
            workplace_id TEXT NOT NULL REFERENCES workplaces(id) ON DELETE CASCADE,
            class_id TEXT NOT NULL,
            position INTEGER NOT NULL,
            label TEXT NOT NULL,
            missing_items TEXT NOT NULL,
            PRIMARY KEY (workplace_id, class_id),
            UNIQUE (workplace_id, label)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_models_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS models (
            id TEXT PRIMARY KEY,
            workplace_id TEXT NOT NULL REFERENCES workplaces(id) ON DELETE CASCADE,
            version TEXT NOT NULL,
            model_type TEXT NOT NULL CHECK (model_type IN ('classification', 'detection')),
            status TEXT NOT NULL CHECK (status IN ('uploaded', 'active', 'archived')),
            test_accuracy REAL,
            notes TEXT,
            file_path TEXT NOT NULL,
            uploaded_at TEXT NOT NULL,
            UNIQUE (workplace_id, version)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // At most one active model per workplace
    sqlx::query(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_models_one_active ON models(workplace_id) WHERE status = 'active'",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_training_images_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS training_images (
            id TEXT PRIMARY KEY,
            workplace_id TEXT NOT NULL REFERENCES workplaces(id) ON DELETE CASCADE,
            image_path TEXT NOT NULL,
            label TEXT NOT NULL DEFAULT 'unlabeled',
            class_id TEXT,
            source TEXT NOT NULL DEFAULT 'manual_upload',
            validated INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_training_images_workplace ON training_images(workplace_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_analyses_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS analyses (
            id TEXT PRIMARY KEY,
            workplace_id TEXT REFERENCES workplaces(id) ON DELETE SET NULL,
            model_id TEXT,
            model_version TEXT,
            model_type TEXT NOT NULL DEFAULT 'classification',
            predicted_class TEXT NOT NULL,
            predicted_label TEXT NOT NULL,
            confidence REAL NOT NULL,
            status TEXT NOT NULL CHECK (status IN ('OK', 'NOK')),
            missing_items TEXT NOT NULL DEFAULT '[]',
            detected_counts TEXT NOT NULL DEFAULT '{}',
            corrected_class TEXT,
            corrected_label TEXT,
            corrected_counts TEXT,
            notes TEXT,
            face_count INTEGER NOT NULL DEFAULT 0,
            device_id TEXT NOT NULL,
            image_path TEXT,
            exported_for_training INTEGER NOT NULL DEFAULT 0,
            training_partition TEXT,
            reviewed_at TEXT,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_analyses_workplace_created ON analyses(workplace_id, created_at)",
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_analyses_model ON analyses(model_id)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_dataset_exports_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS dataset_exports (
            id TEXT PRIMARY KEY,
            workplace_id TEXT NOT NULL REFERENCES workplaces(id) ON DELETE CASCADE,
            archive_path TEXT NOT NULL,
            image_count INTEGER NOT NULL,
            class_distribution TEXT NOT NULL,
            train_split REAL NOT NULL,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Built-in defaults of the runtime settings
pub const DEFAULT_SETTINGS: &[(&str, &str)] = &[
    ("scenario_target_ok", "100"),
    ("scenario_target_per_item", "50"),
    ("scenario_target_empty", "30"),
    ("candidate_threshold_percent", "70"),
    ("training_target", "200"),
    ("performance_top_k", "5"),
    ("dataset_train_split", "0.8"),
    ("max_upload_bytes", "20971520"),
];

/// Ensure every runtime setting exists, resetting NULL values to defaults
pub async fn init_default_settings(pool: &SqlitePool) -> Result<()> {
    for (key, default_value) in DEFAULT_SETTINGS {
        ensure_setting(pool, key, default_value).await?;
    }
    Ok(())
}

async fn ensure_setting(pool: &SqlitePool, key: &str, default_value: &str) -> Result<()> {
    let value: Option<Option<String>> =
        sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
            .bind(key)
            .fetch_optional(pool)
            .await?;

    match value {
        None => {
            // INSERT OR IGNORE: two services may initialize the same file
            sqlx::query("INSERT OR IGNORE INTO settings (key, value) VALUES (?, ?)")
                .bind(key)
                .bind(default_value)
                .execute(pool)
                .await?;
            info!("Initialized setting '{}' with default value: {}", key, default_value);
        }
        Some(None) => {
            sqlx::query(
                "UPDATE settings SET value = ?, updated_at = CURRENT_TIMESTAMP WHERE key = ?",
            )
            .bind(default_value)
            .bind(key)
            .execute(pool)
            .await?;
            warn!("Setting '{}' was NULL, reset to default: {}", key, default_value);
        }
        Some(Some(_)) => {}
    }

    Ok(())
}
