//! Tests for database initialization and schema creation

use sbir_common::db::init::init_database;
use tempfile::TempDir;

async fn table_names(pool: &sqlx::SqlitePool) -> Vec<String> {
    sqlx::query_scalar::<_, String>(
        "SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
    )
    .fetch_all(pool)
    .await
    .unwrap()
}

async fn index_names(pool: &sqlx::SqlitePool) -> Vec<String> {
    sqlx::query_scalar::<_, String>(
        "SELECT name FROM sqlite_master WHERE type='index' AND name LIKE 'idx_%' ORDER BY name",
    )
    .fetch_all(pool)
    .await
    .unwrap()
}

#[tokio::test]
async fn test_database_creation_when_missing() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("nested").join("transition.db");

    let result = init_database(&db_path).await;

    assert!(result.is_ok(), "Database initialization failed: {:?}", result.err());
    assert!(db_path.exists(), "Database file was not created");
}

#[tokio::test]
async fn test_database_opens_existing() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("transition.db");

    let pool1 = init_database(&db_path).await.unwrap();
    pool1.close().await;

    // Second initialization re-runs every CREATE ... IF NOT EXISTS
    let pool2 = init_database(&db_path).await;
    assert!(pool2.is_ok(), "Failed to open existing database: {:?}", pool2.err());
}

#[tokio::test]
async fn test_entity_tables_created() {
    let temp_dir = TempDir::new().unwrap();
    let pool = init_database(&temp_dir.path().join("transition.db")).await.unwrap();

    let tables = table_names(&pool).await;
    for expected in ["contracts", "detection_run_lock", "detections", "sbir_awards", "vendors"] {
        assert!(tables.contains(&expected.to_string()), "missing table {}", expected);
    }
}

#[tokio::test]
async fn test_lookup_and_composite_indexes_created() {
    let temp_dir = TempDir::new().unwrap();
    let pool = init_database(&temp_dir.path().join("transition.db")).await.unwrap();

    let indexes = index_names(&pool).await;
    for expected in [
        "idx_vendors_name",
        "idx_contracts_piid",
        "idx_sbir_awards_phase",
        "idx_sbir_awards_vendor_agency_date",
        "idx_contracts_vendor_agency_date",
        "idx_contracts_vendor_start",
        "idx_detections_award",
    ] {
        assert!(indexes.contains(&expected.to_string()), "missing index {}", expected);
    }
}

#[tokio::test]
async fn test_contract_piid_unique() {
    let temp_dir = TempDir::new().unwrap();
    let pool = init_database(&temp_dir.path().join("transition.db")).await.unwrap();

    sqlx::query("INSERT INTO vendors (name) VALUES ('Acme Photonics')")
        .execute(&pool)
        .await
        .unwrap();

    let insert = "INSERT INTO contracts (vendor_id, piid, agency, start_date) VALUES (1, 'FA8650_0_0', 'AIR FORCE', '2023-01-30')";
    sqlx::query(insert).execute(&pool).await.unwrap();
    let second = sqlx::query(insert).execute(&pool).await;

    assert!(second.is_err(), "duplicate piid must violate the unique index");
}

#[tokio::test]
async fn test_detection_score_range_enforced() {
    let temp_dir = TempDir::new().unwrap();
    let pool = init_database(&temp_dir.path().join("transition.db")).await.unwrap();

    sqlx::query("INSERT INTO vendors (name) VALUES ('Acme Photonics')")
        .execute(&pool)
        .await
        .unwrap();
    sqlx::query(
        "INSERT INTO sbir_awards (vendor_id, award_piid, phase, agency, award_date) VALUES (1, 'A1', 'Phase II', 'NAVY', '2021-01-01')",
    )
    .execute(&pool)
    .await
    .unwrap();
    sqlx::query(
        "INSERT INTO contracts (vendor_id, piid, agency, start_date) VALUES (1, 'N0001_0_0', 'NAVY', '2022-01-01')",
    )
    .execute(&pool)
    .await
    .unwrap();

    let result = sqlx::query(
        r#"INSERT INTO detections (detection_uuid, sbir_award_id, contract_id, likelihood_score, confidence, evidence_bundle, detection_date)
           VALUES ('x', 1, 1, 1.5, 'High Confidence', '{}', CURRENT_TIMESTAMP)"#,
    )
    .execute(&pool)
    .await;

    assert!(result.is_err(), "scores above 1.0 must be rejected");
}
