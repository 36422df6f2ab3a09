//! Database initialization
//!
//! Opens (or creates) the SQLite store and creates the entity tables and
//! their indexes. Every statement is idempotent, so initialization runs on
//! each start.
//!
//! The indexes are load-bearing: candidate search joins on
//! `(vendor_id, start_date)` and the work-set query filters on `phase` and
//! the `detections(sbir_award_id)` anti-join.

use crate::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Connection, SqliteConnection, SqlitePool};
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// SQLite busy timeout; lock waits beyond this surface as errors for retry logic
const BUSY_TIMEOUT: Duration = Duration::from_millis(5000);

/// Connection options shared by the pool and dedicated worker connections
pub fn connect_options(db_path: &Path) -> SqliteConnectOptions {
    SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .foreign_keys(true)
        // WAL allows worker readers alongside the single coordinator writer
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .busy_timeout(BUSY_TIMEOUT)
}

/// Initialize database connection pool and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .min_connections(1)
        .connect_with(connect_options(db_path))
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    create_schema(&pool).await?;

    Ok(pool)
}

/// Open a dedicated connection outside the pool (one per detection worker)
pub async fn open_connection(db_path: &Path) -> Result<SqliteConnection> {
    let conn = SqliteConnection::connect_with(&connect_options(db_path)).await?;
    Ok(conn)
}

/// Create all tables and indexes (idempotent)
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    create_vendors_table(pool).await?;
    create_sbir_awards_table(pool).await?;
    create_contracts_table(pool).await?;
    create_detections_table(pool).await?;
    create_detection_run_lock_table(pool).await?;

    info!("Database schema initialized (vendors, sbir_awards, contracts, detections)");
    Ok(())
}

async fn create_vendors_table(pool: &SqlitePool) -> Result<()> {
    // Name is the lookup key; uniqueness is an ingestion discipline
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS vendors (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_vendors_name ON vendors(name)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_sbir_awards_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sbir_awards (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            vendor_id INTEGER NOT NULL REFERENCES vendors(id),
            award_piid TEXT NOT NULL,
            phase TEXT NOT NULL,
            agency TEXT NOT NULL,
            award_date TEXT NOT NULL,
            completion_date TEXT,
            topic TEXT,
            raw_data TEXT NOT NULL DEFAULT '{}',
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    for statement in [
        "CREATE INDEX IF NOT EXISTS idx_sbir_awards_vendor ON sbir_awards(vendor_id)",
        "CREATE INDEX IF NOT EXISTS idx_sbir_awards_piid ON sbir_awards(award_piid)",
        "CREATE INDEX IF NOT EXISTS idx_sbir_awards_agency ON sbir_awards(agency)",
        "CREATE INDEX IF NOT EXISTS idx_sbir_awards_phase ON sbir_awards(phase)",
        "CREATE INDEX IF NOT EXISTS idx_sbir_awards_award_date ON sbir_awards(award_date)",
        "CREATE INDEX IF NOT EXISTS idx_sbir_awards_completion_date ON sbir_awards(completion_date)",
        "CREATE INDEX IF NOT EXISTS idx_sbir_awards_vendor_agency_date ON sbir_awards(vendor_id, agency, award_date)",
    ] {
        sqlx::query(statement).execute(pool).await?;
    }

    Ok(())
}

async fn create_contracts_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS contracts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            vendor_id INTEGER NOT NULL REFERENCES vendors(id),
            piid TEXT NOT NULL,
            agency TEXT NOT NULL,
            start_date TEXT NOT NULL,
            competition_details TEXT NOT NULL DEFAULT '{}',
            naics_code TEXT,
            psc_code TEXT,
            description TEXT,
            raw_data TEXT NOT NULL DEFAULT '{}',
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    for statement in [
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_contracts_piid ON contracts(piid)",
        "CREATE INDEX IF NOT EXISTS idx_contracts_agency ON contracts(agency)",
        "CREATE INDEX IF NOT EXISTS idx_contracts_start_date ON contracts(start_date)",
        "CREATE INDEX IF NOT EXISTS idx_contracts_vendor_start ON contracts(vendor_id, start_date)",
        "CREATE INDEX IF NOT EXISTS idx_contracts_vendor_agency_date ON contracts(vendor_id, agency, start_date)",
    ] {
        sqlx::query(statement).execute(pool).await?;
    }

    Ok(())
}

async fn create_detections_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS detections (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            detection_uuid TEXT NOT NULL UNIQUE,
            sbir_award_id INTEGER NOT NULL REFERENCES sbir_awards(id),
            contract_id INTEGER NOT NULL REFERENCES contracts(id),
            likelihood_score REAL NOT NULL,
            confidence TEXT NOT NULL,
            evidence_bundle TEXT NOT NULL,
            detection_date TEXT NOT NULL,
            CHECK (likelihood_score >= 0.0 AND likelihood_score <= 1.0)
        )
        "#,
    )
    .execute(pool)
    .await?;

    for statement in [
        "CREATE INDEX IF NOT EXISTS idx_detections_award ON detections(sbir_award_id)",
        "CREATE INDEX IF NOT EXISTS idx_detections_contract ON detections(contract_id)",
        "CREATE INDEX IF NOT EXISTS idx_detections_confidence ON detections(confidence)",
    ] {
        sqlx::query(statement).execute(pool).await?;
    }

    Ok(())
}

async fn create_detection_run_lock_table(pool: &SqlitePool) -> Result<()> {
    // Single row (id = 1) while a detection run is active
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS detection_run_lock (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            run_id TEXT NOT NULL,
            acquired_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
