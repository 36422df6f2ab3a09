//! Database access for sbir-detect
//!
//! Query functions per entity table. Functions used inside ingestion chunks
//! and by detection workers take a `&mut SqliteConnection` so they run on a
//! transaction or a worker's dedicated connection alike; read-only summaries
//! take the pool.

pub mod awards;
pub mod contracts;
pub mod detections;
pub mod run_lock;
pub mod vendors;

use sbir_common::Result;
use serde::Serialize;
use sqlx::SqlitePool;
use std::collections::BTreeMap;

/// Row counts across the entity tables
#[derive(Debug, Clone, Serialize)]
pub struct StoreSummary {
    pub vendors: i64,
    pub awards: i64,
    pub contracts: i64,
    pub detections: i64,
    pub detections_by_confidence: BTreeMap<String, i64>,
}

/// Collect table counts for reporting
pub async fn store_summary(pool: &SqlitePool) -> Result<StoreSummary> {
    Ok(StoreSummary {
        vendors: vendors::count_vendors(pool).await?,
        awards: awards::count_awards(pool).await?,
        contracts: contracts::count_contracts(pool).await?,
        detections: detections::count_detections(pool).await?,
        detections_by_confidence: detections::count_by_confidence(pool).await?,
    })
}
