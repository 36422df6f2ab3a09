//! Database Test Utilities
//!
//! File-backed test databases (detection workers open their own connections,
//! so an in-memory database would not be shared) and input row builders.

#![allow(dead_code)]

use anyhow::Result;
use sbir_common::db::init::init_database;
use sbir_common::db::models::RawRecord;
use sqlx::SqlitePool;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tempfile::TempDir;

/// Test database with its location
///
/// The TempDir must stay alive for the duration of the test.
pub struct TestDb {
    pub dir: TempDir,
    pub path: PathBuf,
    pub pool: SqlitePool,
}

/// Create a temporary database with the schema applied
pub async fn create_test_db() -> Result<TestDb> {
    let dir = TempDir::new()?;
    let path = dir.path().join("transition_test.db");
    let pool = init_database(&path).await?;
    Ok(TestDb { dir, path, pool })
}

/// Raw input row from column/value pairs
pub fn row(pairs: &[(&str, &str)]) -> RawRecord {
    RawRecord(
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<BTreeMap<_, _>>(),
    )
}

/// Phase II award row completed on `completion`
pub fn award_row(company: &str, piid: &str, agency: &str, completion: &str) -> RawRecord {
    row(&[
        ("Company", company),
        ("Contract", piid),
        ("Phase", "Phase II"),
        ("Agency", agency),
        ("Proposal Award Date", "2021-01-04"),
        ("Contract End Date", completion),
        ("Topic Code", "N201-004"),
    ])
}

/// Base contract row (modification and transaction default to 0)
pub fn contract_row(
    recipient: &str,
    piid: &str,
    agency: &str,
    start: &str,
    extent_competed: &str,
) -> RawRecord {
    row(&[
        ("recipient_name", recipient),
        ("award_id_piid", piid),
        ("awarding_agency_name", agency),
        ("period_of_performance_start_date", start),
        ("extent_competed", extent_competed),
        ("naics_code", "541715"),
    ])
}

/// (award_piid, contract_piid, confidence, score) for every detection, sorted
pub async fn detection_rows(pool: &SqlitePool) -> Result<Vec<(String, String, String, f64)>> {
    let rows = sqlx::query_as::<_, (String, String, String, f64)>(
        r#"
        SELECT a.award_piid, c.piid, d.confidence, d.likelihood_score
        FROM detections d
        JOIN sbir_awards a ON a.id = d.sbir_award_id
        JOIN contracts c ON c.id = d.contract_id
        ORDER BY a.award_piid, c.piid
        "#,
    )
    .fetch_all(pool)
    .await?;
    Ok(rows)
}
