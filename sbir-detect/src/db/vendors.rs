//! Vendor database operations

use sbir_common::Result;
use sqlx::{SqliteConnection, SqlitePool};

/// Look up a vendor id by exact (case-sensitive) name
pub async fn find_vendor_id(conn: &mut SqliteConnection, name: &str) -> Result<Option<i64>> {
    let id: Option<i64> =
        sqlx::query_scalar("SELECT id FROM vendors WHERE name = ? ORDER BY id LIMIT 1")
            .bind(name)
            .fetch_optional(&mut *conn)
            .await?;
    Ok(id)
}

/// Create a vendor and return its id
pub async fn insert_vendor(conn: &mut SqliteConnection, name: &str) -> Result<i64> {
    let result = sqlx::query("INSERT INTO vendors (name, created_at) VALUES (?, CURRENT_TIMESTAMP)")
        .bind(name)
        .execute(&mut *conn)
        .await?;
    Ok(result.last_insert_rowid())
}

/// Count total vendors
pub async fn count_vendors(pool: &SqlitePool) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM vendors")
        .fetch_one(pool)
        .await?;
    Ok(count)
}
