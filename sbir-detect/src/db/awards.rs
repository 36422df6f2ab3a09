//! SBIR award database operations

use sbir_common::db::models::{NewSbirAward, RawRecord, SbirAward};
use sbir_common::time::{format_storage_date, parse_storage_date};
use sbir_common::{Error, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqliteConnection, SqlitePool};
use std::collections::{BTreeSet, HashSet};

/// Bound parameters per IN (...) query
const ID_BATCH_SIZE: usize = 500;

/// Dedup key for awards within one vendor
pub type AwardKey = (String, String, String);

const AWARD_COLUMNS: &str =
    "id, vendor_id, award_piid, phase, agency, award_date, completion_date, topic, raw_data";

/// Existing `(award_piid, phase, agency)` keys for a vendor
pub async fn award_keys_for_vendor(
    conn: &mut SqliteConnection,
    vendor_id: i64,
) -> Result<HashSet<AwardKey>> {
    let rows: Vec<(String, String, String)> = sqlx::query_as(
        "SELECT award_piid, phase, agency FROM sbir_awards WHERE vendor_id = ?",
    )
    .bind(vendor_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows.into_iter().collect())
}

/// Insert a new award and return its id
pub async fn insert_award(conn: &mut SqliteConnection, award: &NewSbirAward) -> Result<i64> {
    let raw_data = serde_json::to_string(&award.raw_data)?;

    let result = sqlx::query(
        r#"
        INSERT INTO sbir_awards (vendor_id, award_piid, phase, agency, award_date, completion_date, topic, raw_data)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(award.vendor_id)
    .bind(&award.award_piid)
    .bind(&award.phase)
    .bind(&award.agency)
    .bind(format_storage_date(award.award_date))
    .bind(award.completion_date.map(format_storage_date))
    .bind(award.topic.as_deref())
    .bind(raw_data)
    .execute(&mut *conn)
    .await?;

    Ok(result.last_insert_rowid())
}

/// Awards with an eligible phase and no detection yet, in id order
///
/// This is the detection work set: an award with any detection is never
/// reprocessed.
pub async fn pending_award_ids(pool: &SqlitePool, phases: &BTreeSet<String>) -> Result<Vec<i64>> {
    if phases.is_empty() {
        return Ok(Vec::new());
    }

    let mut builder: QueryBuilder<Sqlite> =
        QueryBuilder::new("SELECT a.id FROM sbir_awards a WHERE a.phase IN (");
    let mut separated = builder.separated(", ");
    for phase in phases {
        separated.push_bind(phase.as_str());
    }
    separated.push_unseparated(
        ") AND NOT EXISTS (SELECT 1 FROM detections d WHERE d.sbir_award_id = a.id) ORDER BY a.id",
    );

    let ids: Vec<i64> = builder.build_query_scalar::<i64>().fetch_all(pool).await?;
    Ok(ids)
}

/// Load awards by id; missing ids are silently absent from the result
pub async fn load_awards_by_ids(
    conn: &mut SqliteConnection,
    ids: &[i64],
) -> Result<Vec<SbirAward>> {
    let mut awards = Vec::with_capacity(ids.len());

    for batch in ids.chunks(ID_BATCH_SIZE) {
        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
            "SELECT {} FROM sbir_awards WHERE id IN (",
            AWARD_COLUMNS
        ));
        let mut separated = builder.separated(", ");
        for id in batch {
            separated.push_bind(*id);
        }
        separated.push_unseparated(") ORDER BY id");

        let rows = builder.build().fetch_all(&mut *conn).await?;
        for row in rows {
            awards.push(award_from_row(&row)?);
        }
    }

    Ok(awards)
}

/// Load a single award
pub async fn load_award(pool: &SqlitePool, id: i64) -> Result<Option<SbirAward>> {
    let row = sqlx::query(&format!("SELECT {} FROM sbir_awards WHERE id = ?", AWARD_COLUMNS))
        .bind(id)
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(award_from_row).transpose()
}

/// Count total awards
pub async fn count_awards(pool: &SqlitePool) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sbir_awards")
        .fetch_one(pool)
        .await?;
    Ok(count)
}

fn award_from_row(row: &SqliteRow) -> Result<SbirAward> {
    let id: i64 = row.get("id");

    let award_date_str: String = row.get("award_date");
    let award_date = parse_storage_date(&award_date_str).ok_or_else(|| {
        Error::Internal(format!("Invalid award_date '{}' for award {}", award_date_str, id))
    })?;

    let completion_str: Option<String> = row.get("completion_date");
    let completion_date = match completion_str {
        Some(s) => Some(parse_storage_date(&s).ok_or_else(|| {
            Error::Internal(format!("Invalid completion_date '{}' for award {}", s, id))
        })?),
        None => None,
    };

    let raw_json: String = row.get("raw_data");
    let raw_data: RawRecord = serde_json::from_str(&raw_json)?;

    Ok(SbirAward {
        id,
        vendor_id: row.get("vendor_id"),
        award_piid: row.get("award_piid"),
        phase: row.get("phase"),
        agency: row.get("agency"),
        award_date,
        completion_date,
        topic: row.get("topic"),
        raw_data,
    })
}
