//! Ingestion Normalizer
//!
//! Parses award and contract rows, resolves vendors, deduplicates against
//! storage and within the batch, and persists accepted records with one
//! transaction per chunk.
//!
//! Row defects are counted by [`RejectReason`] and skipped. A database error
//! inside a chunk drops that chunk's transaction (rolling it back) and ends
//! the run with the error.

pub mod awards;
pub mod contracts;
pub mod rows;
pub mod vendor_resolver;

use crate::utils::begin_monitored;
use sbir_common::db::models::RawRecord;
use sbir_common::{Error, Result};
use serde::Serialize;
use sqlx::{SqliteConnection, SqlitePool};
use std::collections::{BTreeMap, HashSet};
use std::hash::Hash;
use std::time::{Duration, Instant};
use vendor_resolver::{DedupIndex, VendorResolver};

pub use rows::read_rows_jsonl;

/// Why a row was not accepted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, thiserror::Error)]
pub enum RejectReason {
    #[error("missing_company")]
    MissingCompany,
    #[error("missing_recipient")]
    MissingRecipient,
    #[error("missing_piid")]
    MissingPiid,
    #[error("missing_agency")]
    MissingAgency,
    #[error("missing_dates")]
    MissingDates,
}

impl RejectReason {
    /// Stable key used in stats output
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::MissingCompany => "missing_company",
            RejectReason::MissingRecipient => "missing_recipient",
            RejectReason::MissingPiid => "missing_piid",
            RejectReason::MissingAgency => "missing_agency",
            RejectReason::MissingDates => "missing_dates",
        }
    }
}

/// Outcome of one ingestion pass
#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestStats {
    /// Rows seen
    pub total: usize,
    /// Rows passing field validation (inserted + duplicates_skipped)
    pub valid: usize,
    /// New records persisted
    pub inserted: usize,
    pub rejected_by_reason: BTreeMap<String, usize>,
    pub duplicates_skipped: usize,
    pub vendors_created: usize,
    pub chunks_committed: usize,
    pub elapsed: Duration,
}

impl IngestStats {
    fn reject(&mut self, reason: RejectReason) {
        *self
            .rejected_by_reason
            .entry(reason.as_str().to_string())
            .or_insert(0) += 1;
    }

    /// Rejections across all reasons
    pub fn rejected(&self) -> usize {
        self.rejected_by_reason.values().sum()
    }

    /// Count for one reason
    pub fn rejected_for(&self, reason: RejectReason) -> usize {
        self.rejected_by_reason
            .get(reason.as_str())
            .copied()
            .unwrap_or(0)
    }
}

/// One input schema: how rows parse, dedup and persist
pub(crate) trait IngestTarget {
    type Parsed;
    type Key: Eq + Hash;

    /// Name used in logs
    const LABEL: &'static str;

    /// Validate a row; returns the vendor name and the mapped record
    fn parse(row: &RawRecord) -> std::result::Result<(String, Self::Parsed), RejectReason>;

    /// Dedup key within a vendor
    fn key(parsed: &Self::Parsed) -> Self::Key;

    /// Keys already stored for the vendor
    async fn existing_keys(
        conn: &mut SqliteConnection,
        vendor_id: i64,
    ) -> Result<HashSet<Self::Key>>;

    /// Persist; false when storage reports the record already exists
    async fn insert(
        conn: &mut SqliteConnection,
        vendor_id: i64,
        parsed: Self::Parsed,
    ) -> Result<bool>;
}

/// Ingestion entry point bound to a store and chunk size
#[derive(Clone)]
pub struct Ingestor {
    pool: SqlitePool,
    chunk_size: usize,
}

impl Ingestor {
    pub fn new(pool: SqlitePool, chunk_size: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(Error::Config("ingest chunk_size must be at least 1".to_string()));
        }
        Ok(Self { pool, chunk_size })
    }

    /// Ingest award rows
    pub async fn ingest_awards(&self, rows: &[RawRecord]) -> Result<IngestStats> {
        ingest_rows::<awards::AwardTarget>(&self.pool, rows, self.chunk_size).await
    }

    /// Ingest contract rows
    pub async fn ingest_contracts(&self, rows: &[RawRecord]) -> Result<IngestStats> {
        ingest_rows::<contracts::ContractTarget>(&self.pool, rows, self.chunk_size).await
    }
}

async fn ingest_rows<T: IngestTarget>(
    pool: &SqlitePool,
    rows: &[RawRecord],
    chunk_size: usize,
) -> Result<IngestStats> {
    let start = Instant::now();
    let mut stats = IngestStats {
        total: rows.len(),
        ..Default::default()
    };
    let mut vendors = VendorResolver::new();
    let mut dedup: DedupIndex<T::Key> = DedupIndex::new();

    tracing::info!(target_table = T::LABEL, rows = rows.len(), chunk_size, "Ingestion started");

    for (chunk_idx, chunk) in rows.chunks(chunk_size).enumerate() {
        let mut tx = begin_monitored(pool, "ingest::chunk").await?;

        for row in chunk {
            let (vendor_name, parsed) = match T::parse(row) {
                Ok(parsed) => parsed,
                Err(reason) => {
                    stats.reject(reason);
                    continue;
                }
            };
            stats.valid += 1;

            let vendor_id = vendors.resolve(tx.conn(), &vendor_name).await?;

            if !dedup.is_loaded(vendor_id) {
                let existing = T::existing_keys(tx.conn(), vendor_id).await?;
                dedup.load(vendor_id, existing);
            }

            if !dedup.insert(vendor_id, T::key(&parsed)) {
                stats.duplicates_skipped += 1;
                continue;
            }

            if T::insert(tx.conn(), vendor_id, parsed).await? {
                stats.inserted += 1;
            } else {
                stats.duplicates_skipped += 1;
            }
        }

        if let Err(e) = tx.commit().await {
            tracing::error!(
                target_table = T::LABEL,
                chunk = chunk_idx,
                error = %e,
                "Chunk commit failed, chunk rolled back"
            );
            return Err(e);
        }
        stats.chunks_committed += 1;

        tracing::info!(
            target_table = T::LABEL,
            chunk = chunk_idx,
            processed = (chunk_idx * chunk_size + chunk.len()).min(rows.len()),
            total = rows.len(),
            inserted = stats.inserted,
            duplicates = stats.duplicates_skipped,
            rejected = stats.rejected(),
            "Chunk committed"
        );
    }

    stats.vendors_created = vendors.created();
    stats.elapsed = start.elapsed();

    tracing::info!(
        target_table = T::LABEL,
        total = stats.total,
        valid = stats.valid,
        inserted = stats.inserted,
        duplicates = stats.duplicates_skipped,
        rejected = stats.rejected(),
        vendors_created = stats.vendors_created,
        elapsed_ms = stats.elapsed.as_millis() as u64,
        "Ingestion complete"
    );

    Ok(stats)
}
