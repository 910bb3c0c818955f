//! Tests for database creation, schema and default settings

use sqlx::sqlite::SqlitePoolOptions;
use wpi_common::db::init::{create_schema, init_database, init_default_settings, DEFAULT_SETTINGS};

#[tokio::test]
async fn test_database_created_when_missing() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("data").join("wpi.db");

    let result = init_database(&db_path).await;
    assert!(result.is_ok(), "Database initialization failed: {:?}", result.err());
    assert!(db_path.exists(), "Database file was not created");
}

#[tokio::test]
async fn test_existing_database_reopens() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("wpi.db");

    let first = init_database(&db_path).await.unwrap();
    first.close().await;

    let second = init_database(&db_path).await;
    assert!(second.is_ok(), "Failed to open existing database: {:?}", second.err());
}

#[tokio::test]
async fn test_default_settings_written() {
    let dir = tempfile::tempdir().unwrap();
    let pool = init_database(&dir.path().join("wpi.db")).await.unwrap();

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM settings")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count as usize, DEFAULT_SETTINGS.len());

    let target: String =
        sqlx::query_scalar("SELECT value FROM settings WHERE key = 'scenario_target_ok'")
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(target, "100");
}

#[tokio::test]
async fn test_null_setting_reset_and_custom_value_kept() {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    create_schema(&pool).await.unwrap();

    sqlx::query("INSERT INTO settings (key, value) VALUES ('training_target', NULL)")
        .execute(&pool)
        .await
        .unwrap();
    sqlx::query("INSERT INTO settings (key, value) VALUES ('performance_top_k', '10')")
        .execute(&pool)
        .await
        .unwrap();

    init_default_settings(&pool).await.unwrap();

    let target: String =
        sqlx::query_scalar("SELECT value FROM settings WHERE key = 'training_target'")
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(target, "200");

    let top_k: String =
        sqlx::query_scalar("SELECT value FROM settings WHERE key = 'performance_top_k'")
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(top_k, "10");
}

#[tokio::test]
async fn test_one_active_model_enforced_by_schema() {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    create_schema(&pool).await.unwrap();

    sqlx::query(
        "INSERT INTO workplaces (id, name, items, created_at, updated_at) VALUES ('w1', 'Bench', '[\"hamer\"]', '2024-01-01T00:00:00Z', '2024-01-01T00:00:00Z')",
    )
    .execute(&pool)
    .await
    .unwrap();

    let insert = |id: &'static str, version: &'static str| {
        sqlx::query(
            "INSERT INTO models (id, workplace_id, version, model_type, status, file_path, uploaded_at) VALUES (?, 'w1', ?, 'classification', 'active', 'm.pt', '2024-01-01T00:00:00Z')",
        )
        .bind(id)
        .bind(version)
    };

    insert("m1", "v1.0").execute(&pool).await.unwrap();
    let second = insert("m2", "v2.0").execute(&pool).await;
    assert!(second.is_err(), "second active model should violate the unique index");
}

#[tokio::test]
async fn test_schema_creation_is_idempotent() {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();

    create_schema(&pool).await.unwrap();
    create_schema(&pool).await.unwrap();
}
