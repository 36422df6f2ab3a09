//! Contract database operations

use chrono::NaiveDate;
use sbir_common::db::models::{CompetitionDetails, Contract, NewContract, RawRecord};
use sbir_common::time::{format_storage_date, parse_storage_date};
use sbir_common::{Error, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};
use std::collections::HashSet;

const CONTRACT_COLUMNS: &str = "id, vendor_id, piid, agency, start_date, competition_details, naics_code, psc_code, description, raw_data";

/// Existing contract PIIDs for a vendor
pub async fn contract_piids_for_vendor(
    conn: &mut SqliteConnection,
    vendor_id: i64,
) -> Result<HashSet<String>> {
    let piids: Vec<String> = sqlx::query_scalar("SELECT piid FROM contracts WHERE vendor_id = ?")
        .bind(vendor_id)
        .fetch_all(&mut *conn)
        .await?;

    Ok(piids.into_iter().collect())
}

/// Insert a contract; returns false when the PIID already exists (any vendor)
pub async fn insert_contract(conn: &mut SqliteConnection, contract: &NewContract) -> Result<bool> {
    let competition = serde_json::to_string(&contract.competition_details)?;
    let raw_data = serde_json::to_string(&contract.raw_data)?;

    let result = sqlx::query(
        r#"
        INSERT INTO contracts (vendor_id, piid, agency, start_date, competition_details, naics_code, psc_code, description, raw_data)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(piid) DO NOTHING
        "#,
    )
    .bind(contract.vendor_id)
    .bind(&contract.piid)
    .bind(&contract.agency)
    .bind(format_storage_date(contract.start_date))
    .bind(competition)
    .bind(contract.naics_code.as_deref())
    .bind(contract.psc_code.as_deref())
    .bind(contract.description.as_deref())
    .bind(raw_data)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Contracts of a vendor starting within `[start, end]` (inclusive)
///
/// Served by `idx_contracts_vendor_start`. ISO date text compares in
/// calendar order.
pub async fn contracts_in_window(
    conn: &mut SqliteConnection,
    vendor_id: i64,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<Vec<Contract>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM contracts WHERE vendor_id = ? AND start_date >= ? AND start_date <= ?",
        CONTRACT_COLUMNS
    ))
    .bind(vendor_id)
    .bind(format_storage_date(start))
    .bind(format_storage_date(end))
    .fetch_all(&mut *conn)
    .await?;

    rows.iter().map(contract_from_row).collect()
}

/// Load a single contract
pub async fn load_contract(pool: &SqlitePool, id: i64) -> Result<Option<Contract>> {
    let row = sqlx::query(&format!("SELECT {} FROM contracts WHERE id = ?", CONTRACT_COLUMNS))
        .bind(id)
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(contract_from_row).transpose()
}

/// Count total contracts
pub async fn count_contracts(pool: &SqlitePool) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM contracts")
        .fetch_one(pool)
        .await?;
    Ok(count)
}

fn contract_from_row(row: &SqliteRow) -> Result<Contract> {
    let id: i64 = row.get("id");

    let start_str: String = row.get("start_date");
    let start_date = parse_storage_date(&start_str).ok_or_else(|| {
        Error::Internal(format!("Invalid start_date '{}' for contract {}", start_str, id))
    })?;

    let competition_json: String = row.get("competition_details");
    let competition_details: CompetitionDetails = serde_json::from_str(&competition_json)?;

    let raw_json: String = row.get("raw_data");
    let raw_data: RawRecord = serde_json::from_str(&raw_json)?;

    Ok(Contract {
        id,
        vendor_id: row.get("vendor_id"),
        piid: row.get("piid"),
        agency: row.get("agency"),
        start_date,
        competition_details,
        naics_code: row.get("naics_code"),
        psc_code: row.get("psc_code"),
        description: row.get("description"),
        raw_data,
    })
}
