//! Persisted category tables
//!
//! The class code of every missing-item subset is enumerated once, when the
//! workplace's item list is set, and stored here. Lookups at inspection and
//! review time read this table instead of recomputing codes.

use sqlx::{Row, SqliteConnection, SqlitePool};
use uuid::Uuid;
use wpi_common::category::{Category, CategoryTable};
use wpi_common::domain::Workplace;
use wpi_common::Result;

/// Replace the stored table of a workplace
pub async fn replace_table(
    conn: &mut SqliteConnection,
    workplace_id: Uuid,
    table: &CategoryTable,
) -> Result<()> {
    sqlx::query("DELETE FROM category_codes WHERE workplace_id = ?")
        .bind(workplace_id.to_string())
        .execute(&mut *conn)
        .await?;

    for (position, category) in table.categories().iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO category_codes (workplace_id, class_id, position, label, missing_items)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(workplace_id.to_string())
        .bind(&category.class_id)
        .bind(position as i64)
        .bind(&category.label)
        .bind(serde_json::to_string(&category.missing)?)
        .execute(&mut *conn)
        .await?;
    }

    tracing::debug!(
        workplace_id = %workplace_id,
        categories = table.len(),
        "Stored category table"
    );
    Ok(())
}

/// Stored categories of a workplace in enumeration order
pub async fn load_categories(pool: &SqlitePool, workplace_id: Uuid) -> Result<Vec<Category>> {
    let rows = sqlx::query(
        r#"
        SELECT class_id, label, missing_items
        FROM category_codes
        WHERE workplace_id = ?
        ORDER BY position
        "#,
    )
    .bind(workplace_id.to_string())
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| {
            let missing: String = row.get("missing_items");
            Ok(Category {
                class_id: row.get("class_id"),
                label: row.get("label"),
                missing: serde_json::from_str(&missing)?,
            })
        })
        .collect()
}

/// Category table of a workplace
///
/// A workplace without stored codes gets its table generated and stored
/// once. A stored table that no longer matches the item list is an error.
pub async fn table_for(pool: &SqlitePool, workplace: &Workplace) -> Result<CategoryTable> {
    let categories = load_categories(pool, workplace.id).await?;
    if !categories.is_empty() {
        return CategoryTable::from_categories(workplace.items.clone(), categories);
    }

    tracing::warn!(
        workplace_id = %workplace.id,
        "No stored category codes, generating table"
    );
    let table = CategoryTable::generate(&workplace.items)?;
    let mut conn = pool.acquire().await?;
    replace_table(&mut conn, workplace.id, &table).await?;
    Ok(table)
}
