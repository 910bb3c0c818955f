//! Workplace database operations

use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};
use uuid::Uuid;
use wpi_common::domain::{WhiteboardRegion, Workplace};
use wpi_common::{Error, Result};

use super::{parse_timestamp, parse_uuid};

const SELECT_WORKPLACE: &str = r#"
    SELECT id, name, description, items, reference_photo, whiteboard_region,
           confidence_threshold, active, created_at, updated_at
    FROM workplaces
"#;

fn workplace_from_row(row: &SqliteRow) -> Result<Workplace> {
    let id: String = row.get("id");
    let items: String = row.get("items");
    let region: Option<String> = row.get("whiteboard_region");
    let created_at: String = row.get("created_at");
    let updated_at: String = row.get("updated_at");

    let whiteboard_region = match region {
        Some(json) => Some(serde_json::from_str::<WhiteboardRegion>(&json)?),
        None => None,
    };

    Ok(Workplace {
        id: parse_uuid(&id)?,
        name: row.get("name"),
        description: row.get("description"),
        items: serde_json::from_str(&items)?,
        reference_photo: row.get("reference_photo"),
        whiteboard_region,
        confidence_threshold: row.get("confidence_threshold"),
        active: row.get("active"),
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
    })
}

fn region_json(region: Option<&WhiteboardRegion>) -> Result<Option<String>> {
    Ok(match region {
        Some(region) => Some(serde_json::to_string(region)?),
        None => None,
    })
}

/// Insert a new workplace
pub async fn insert_workplace(conn: &mut SqliteConnection, workplace: &Workplace) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO workplaces (id, name, description, items, reference_photo, whiteboard_region,
                                confidence_threshold, active, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(workplace.id.to_string())
    .bind(&workplace.name)
    .bind(&workplace.description)
    .bind(serde_json::to_string(&workplace.items)?)
    .bind(&workplace.reference_photo)
    .bind(region_json(workplace.whiteboard_region.as_ref())?)
    .bind(workplace.confidence_threshold)
    .bind(workplace.active)
    .bind(workplace.created_at.to_rfc3339())
    .bind(workplace.updated_at.to_rfc3339())
    .execute(conn)
    .await?;

    Ok(())
}

/// Overwrite every mutable column of a workplace
pub async fn update_workplace(conn: &mut SqliteConnection, workplace: &Workplace) -> Result<()> {
    let result = sqlx::query(
        r#"
        UPDATE workplaces
        SET name = ?, description = ?, items = ?, reference_photo = ?, whiteboard_region = ?,
            confidence_threshold = ?, active = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&workplace.name)
    .bind(&workplace.description)
    .bind(serde_json::to_string(&workplace.items)?)
    .bind(&workplace.reference_photo)
    .bind(region_json(workplace.whiteboard_region.as_ref())?)
    .bind(workplace.confidence_threshold)
    .bind(workplace.active)
    .bind(workplace.updated_at.to_rfc3339())
    .bind(workplace.id.to_string())
    .execute(conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("Workplace {} not found", workplace.id)));
    }
    Ok(())
}

pub async fn load_workplace(pool: &SqlitePool, id: Uuid) -> Result<Option<Workplace>> {
    let row = sqlx::query(&format!("{} WHERE id = ?", SELECT_WORKPLACE))
        .bind(id.to_string())
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(workplace_from_row).transpose()
}

/// Load a workplace or fail with `NotFound`
pub async fn require_workplace(pool: &SqlitePool, id: Uuid) -> Result<Workplace> {
    load_workplace(pool, id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Workplace {} not found", id)))
}

/// All workplaces ordered by name
pub async fn list_workplaces(pool: &SqlitePool, active_only: bool) -> Result<Vec<Workplace>> {
    let sql = if active_only {
        format!("{} WHERE active = 1 ORDER BY name", SELECT_WORKPLACE)
    } else {
        format!("{} ORDER BY name", SELECT_WORKPLACE)
    };

    let rows = sqlx::query(&sql).fetch_all(pool).await?;
    rows.iter().map(workplace_from_row).collect()
}

/// Delete a workplace; models, training images and category codes cascade
pub async fn delete_workplace(pool: &SqlitePool, id: Uuid) -> Result<bool> {
    let result = sqlx::query("DELETE FROM workplaces WHERE id = ?")
        .bind(id.to_string())
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn setup_test_db() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        wpi_common::db::create_schema(&pool).await.unwrap();
        pool
    }

    fn workplace(name: &str, active: bool) -> Workplace {
        let now = Utc::now();
        Workplace {
            id: Uuid::new_v4(),
            name: name.to_string(),
            description: None,
            items: vec!["hamer".into(), "schaar".into()],
            reference_photo: None,
            whiteboard_region: Some(WhiteboardRegion::new(0.1, 0.1, 0.5, 0.6).unwrap()),
            confidence_threshold: 0.25,
            active,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_insert_load_list() {
        let pool = setup_test_db().await;
        let mut conn = pool.acquire().await.unwrap();

        let bench = workplace("Bench", true);
        insert_workplace(&mut conn, &bench).await.unwrap();
        insert_workplace(&mut conn, &workplace("Archive", false)).await.unwrap();
        drop(conn);

        let loaded = require_workplace(&pool, bench.id).await.unwrap();
        assert_eq!(loaded, bench);

        assert_eq!(list_workplaces(&pool, true).await.unwrap().len(), 1);
        let all = list_workplaces(&pool, false).await.unwrap();
        assert_eq!(all[0].name, "Archive");
    }

    #[tokio::test]
    async fn test_duplicate_name_rejected() {
        let pool = setup_test_db().await;
        let mut conn = pool.acquire().await.unwrap();

        insert_workplace(&mut conn, &workplace("Bench", true)).await.unwrap();
        let result = insert_workplace(&mut conn, &workplace("Bench", true)).await;
        assert!(matches!(result, Err(Error::Database(_))));
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let pool = setup_test_db().await;
        let mut conn = pool.acquire().await.unwrap();

        let mut bench = workplace("Bench", true);
        insert_workplace(&mut conn, &bench).await.unwrap();

        bench.description = Some("Assembly line 2".into());
        bench.whiteboard_region = None;
        update_workplace(&mut conn, &bench).await.unwrap();
        drop(conn);

        let loaded = require_workplace(&pool, bench.id).await.unwrap();
        assert_eq!(loaded.description.as_deref(), Some("Assembly line 2"));
        assert!(loaded.whiteboard_region.is_none());

        assert!(delete_workplace(&pool, bench.id).await.unwrap());
        assert!(!delete_workplace(&pool, bench.id).await.unwrap());
        assert!(matches!(
            require_workplace(&pool, bench.id).await,
            Err(Error::NotFound(_))
        ));
    }
}
