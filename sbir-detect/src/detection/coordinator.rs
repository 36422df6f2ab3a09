//! Parallel Detection Coordinator
//!
//! Runs detection over every eligible award that has no detection yet.
//!
//! **Workflow:**
//! 1. Validate the configuration and acquire the run lock
//! 2. Partition pending award ids into contiguous batches
//! 3. One tokio task per batch, each on its own SQLite connection, read-only
//! 4. Gather all worker reports
//! 5. Insert every detection in one transaction (retried on lock contention)
//! 6. Release the run lock, on success and on failure
//!
//! The lock is renewed before workers start and again before the commit; a
//! run that lost its lock to a stale takeover fails instead of committing.
//!
//! A failed worker contributes nothing and is counted. A failed final commit
//! discards the whole run; its awards remain pending for the next run.

use super::artifacts::{self, SessionContext};
use super::classifier::ConfidenceTier;
use super::pipeline::{AwardPipeline, DetectionOutcome};
use crate::db::{awards, detections, run_lock};
use crate::utils::db_retry::DEFAULT_MAX_LOCK_WAIT_MS;
use crate::utils::{begin_monitored, retry_on_lock};
use sbir_common::config::DetectionConfig;
use sbir_common::db::init::open_connection;
use sbir_common::db::models::NewDetection;
use sbir_common::{Error, Result};
use serde::Serialize;
use sqlx::{SqliteConnection, SqlitePool};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Coordinator lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Idle,
    Partitioning,
    Running { workers: usize },
    Aggregating,
    Committed,
    Failed,
}

impl RunState {
    fn can_transition_to(&self, next: &RunState) -> bool {
        use RunState::*;
        matches!(
            (self, next),
            (Idle, Partitioning)
                | (Partitioning, Running { .. })
                | (Partitioning, Committed)
                | (Running { .. }, Aggregating)
                | (Aggregating, Committed)
                | (Partitioning | Running { .. } | Aggregating, Failed)
                | (Committed | Failed, Idle)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Committed | RunState::Failed)
    }
}

/// Outcome of one detection run
#[derive(Debug, Clone, Serialize)]
pub struct DetectionRunSummary {
    pub run_id: Uuid,
    pub state: RunState,
    /// Pending awards selected for this run
    pub work_size: usize,
    pub workers: usize,
    pub failed_workers: usize,
    pub failed_awards: usize,
    pub candidates_evaluated: usize,
    pub detections_created: usize,
    pub tier_counts: BTreeMap<String, usize>,
    pub artifacts_written: usize,
    pub elapsed: Duration,
}

/// Cores available to worker tasks
pub fn available_cores() -> usize {
    num_cpus::get()
}

/// Worker count: bounded by config, cores and work per chunk; 0 only for no work
pub fn partition_count(
    work_size: usize,
    max_workers: usize,
    cores: usize,
    min_chunk_size: usize,
) -> usize {
    if work_size == 0 {
        return 0;
    }
    let by_work = work_size / min_chunk_size.max(1);
    max_workers.min(cores).min(by_work).max(1)
}

/// Split ids into `count` contiguous batches of near-equal size
pub fn partition(ids: &[i64], count: usize) -> Vec<Vec<i64>> {
    if ids.is_empty() || count == 0 {
        return Vec::new();
    }
    let batch_size = ids.len().div_ceil(count);
    ids.chunks(batch_size).map(|chunk| chunk.to_vec()).collect()
}

/// What one worker produced
#[derive(Debug, Default)]
struct WorkerReport {
    awards_processed: usize,
    failed_awards: usize,
    candidates_evaluated: usize,
    detections: Vec<DetectionOutcome>,
}

/// Run the pipeline over a batch of awards on one connection; performs no writes
async fn process_batch(
    conn: &mut SqliteConnection,
    award_ids: &[i64],
    config: &DetectionConfig,
) -> Result<WorkerReport> {
    let awards = awards::load_awards_by_ids(conn, award_ids).await?;
    let pipeline = AwardPipeline::new(config);
    let mut report = WorkerReport::default();

    for award in &awards {
        match pipeline.process_award(conn, award).await {
            Ok(outcome) => {
                report.awards_processed += 1;
                report.candidates_evaluated += outcome.candidates_evaluated;
                report.detections.extend(outcome.detections);
            }
            Err(e) => {
                warn!(award_id = award.id, error = %e, "Award failed, skipping");
                report.failed_awards += 1;
            }
        }
    }

    Ok(report)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExecutionMode {
    Parallel,
    Sequential,
}

/// Detection run coordinator
pub struct DetectionCoordinator {
    pool: SqlitePool,
    db_path: PathBuf,
    config: Arc<DetectionConfig>,
    evidence_dir: Option<PathBuf>,
    state: RunState,
}

impl DetectionCoordinator {
    /// `db_path` must name the database behind `pool`; workers open their own connections to it
    pub fn new(
        pool: SqlitePool,
        db_path: impl Into<PathBuf>,
        config: Arc<DetectionConfig>,
    ) -> Self {
        Self {
            pool,
            db_path: db_path.into(),
            config,
            evidence_dir: None,
            state: RunState::Idle,
        }
    }

    /// Write evidence artifacts for committed detections into `dir`
    pub fn with_evidence_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.evidence_dir = dir;
        self
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    fn transition(&mut self, next: RunState) -> Result<()> {
        if !self.state.can_transition_to(&next) {
            return Err(Error::Internal(format!(
                "Illegal coordinator transition {:?} -> {:?}",
                self.state, next
            )));
        }
        debug!(from = ?self.state, to = ?next, "Coordinator state change");
        self.state = next;
        Ok(())
    }

    /// Parallel run across worker tasks
    pub async fn run(&mut self) -> Result<DetectionRunSummary> {
        self.execute(ExecutionMode::Parallel).await
    }

    /// Single worker on a pool connection
    pub async fn run_sequential(&mut self) -> Result<DetectionRunSummary> {
        self.execute(ExecutionMode::Sequential).await
    }

    async fn execute(&mut self, mode: ExecutionMode) -> Result<DetectionRunSummary> {
        if self.state.is_terminal() {
            self.transition(RunState::Idle)?;
        }

        self.config.validate()?;
        let stale_after = self.config.lock_stale_after()?;

        let run_id = Uuid::new_v4();
        run_lock::acquire(&self.pool, run_id, stale_after).await?;

        let result = self.run_locked(run_id, mode).await;

        if let Err(e) = &result {
            error!(run_id = %run_id, error = %e, "Detection run failed");
            if !self.state.is_terminal() && self.state != RunState::Idle {
                self.state = RunState::Failed;
            }
        }

        if let Err(e) = run_lock::release(&self.pool, run_id).await {
            error!(run_id = %run_id, error = %e, "Failed to release detection run lock");
        }

        result
    }

    async fn run_locked(
        &mut self,
        run_id: Uuid,
        mode: ExecutionMode,
    ) -> Result<DetectionRunSummary> {
        let start = Instant::now();
        self.transition(RunState::Partitioning)?;

        let pending = awards::pending_award_ids(&self.pool, &self.config.eligible_phases).await?;
        let mut summary = DetectionRunSummary {
            run_id,
            state: self.state,
            work_size: pending.len(),
            workers: 0,
            failed_workers: 0,
            failed_awards: 0,
            candidates_evaluated: 0,
            detections_created: 0,
            tier_counts: BTreeMap::new(),
            artifacts_written: 0,
            elapsed: Duration::ZERO,
        };

        if pending.is_empty() {
            info!(run_id = %run_id, "No pending awards, nothing to detect");
            self.transition(RunState::Committed)?;
            summary.state = self.state;
            summary.elapsed = start.elapsed();
            return Ok(summary);
        }

        let batches = match mode {
            ExecutionMode::Parallel => {
                let count = partition_count(
                    pending.len(),
                    self.config.max_workers,
                    available_cores(),
                    self.config.min_chunk_size,
                );
                partition(&pending, count)
            }
            ExecutionMode::Sequential => vec![pending],
        };
        summary.workers = batches.len();

        info!(
            run_id = %run_id,
            work_size = summary.work_size,
            workers = summary.workers,
            mode = ?mode,
            "Detection run started"
        );
        run_lock::renew(&self.pool, run_id).await?;
        self.transition(RunState::Running {
            workers: summary.workers,
        })?;

        let reports = match mode {
            ExecutionMode::Parallel => self.run_workers(run_id, batches).await,
            ExecutionMode::Sequential => self.run_inline(run_id, batches).await,
        };

        self.transition(RunState::Aggregating)?;

        let mut outcomes: Vec<DetectionOutcome> = Vec::new();
        for report in reports {
            match report {
                Some(report) => {
                    summary.failed_awards += report.failed_awards;
                    summary.candidates_evaluated += report.candidates_evaluated;
                    outcomes.extend(report.detections);
                }
                None => summary.failed_workers += 1,
            }
        }
        outcomes.sort_by_key(|o| (o.detection.sbir_award_id, o.detection.contract_id));

        for outcome in &outcomes {
            *summary
                .tier_counts
                .entry(outcome.tier.label().to_string())
                .or_insert(0) += 1;
        }
        let new_detections: Vec<NewDetection> =
            outcomes.into_iter().map(|o| o.detection).collect();

        run_lock::renew(&self.pool, run_id).await?;
        let inserted = self.commit_detections(&new_detections).await?;
        summary.detections_created = inserted as usize;
        self.transition(RunState::Committed)?;
        summary.state = self.state;

        if let Some(dir) = &self.evidence_dir {
            let session = SessionContext::new(run_id, &self.config);
            match artifacts::write_artifacts(dir, &new_detections, &session).await {
                Ok(files) => summary.artifacts_written = files.len(),
                // Detections are already committed; artifacts can be regenerated
                Err(e) => error!(run_id = %run_id, error = %e, "Evidence artifact export failed"),
            }
        }

        summary.elapsed = start.elapsed();
        info!(
            run_id = %run_id,
            work_size = summary.work_size,
            workers = summary.workers,
            failed_workers = summary.failed_workers,
            failed_awards = summary.failed_awards,
            candidates = summary.candidates_evaluated,
            detections = summary.detections_created,
            high = summary
                .tier_counts
                .get(ConfidenceTier::HighConfidence.label())
                .copied()
                .unwrap_or(0),
            elapsed_ms = summary.elapsed.as_millis() as u64,
            "Detection run committed"
        );

        Ok(summary)
    }

    /// One task per batch; `None` marks a failed worker
    async fn run_workers(
        &self,
        run_id: Uuid,
        batches: Vec<Vec<i64>>,
    ) -> Vec<Option<WorkerReport>> {
        let mut join_set = JoinSet::new();

        for (worker_idx, batch) in batches.into_iter().enumerate() {
            let config = Arc::clone(&self.config);
            let db_path = self.db_path.clone();
            join_set.spawn(async move {
                let result: Result<WorkerReport> = async {
                    let mut conn = open_connection(&db_path).await?;
                    process_batch(&mut conn, &batch, &config).await
                }
                .await;
                (worker_idx, batch.len(), result)
            });
        }

        let mut reports = Vec::new();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((worker_idx, batch_len, Ok(report))) => {
                    info!(
                        run_id = %run_id,
                        worker = worker_idx,
                        awards = batch_len,
                        processed = report.awards_processed,
                        detections = report.detections.len(),
                        "Worker finished"
                    );
                    reports.push(Some(report));
                }
                Ok((worker_idx, batch_len, Err(e))) => {
                    error!(
                        run_id = %run_id,
                        worker = worker_idx,
                        awards = batch_len,
                        error = %e,
                        "Worker failed"
                    );
                    reports.push(None);
                }
                Err(join_err) => {
                    error!(
                        run_id = %run_id,
                        error = %join_err,
                        "Worker task panicked or was cancelled"
                    );
                    reports.push(None);
                }
            }
        }

        reports
    }

    /// Batches processed in order on one pool connection
    async fn run_inline(
        &self,
        run_id: Uuid,
        batches: Vec<Vec<i64>>,
    ) -> Vec<Option<WorkerReport>> {
        let mut reports = Vec::with_capacity(batches.len());

        for batch in batches {
            let result: Result<WorkerReport> = async {
                let mut conn = self.pool.acquire().await?;
                process_batch(&mut conn, &batch, &self.config).await
            }
            .await;

            match result {
                Ok(report) => reports.push(Some(report)),
                Err(e) => {
                    error!(
                        run_id = %run_id,
                        awards = batch.len(),
                        error = %e,
                        "Sequential batch failed"
                    );
                    reports.push(None);
                }
            }
        }

        reports
    }

    /// All detections of the run in one transaction
    async fn commit_detections(&self, new_detections: &[NewDetection]) -> Result<u64> {
        if new_detections.is_empty() {
            return Ok(0);
        }

        let pool = &self.pool;
        retry_on_lock("detection::commit", DEFAULT_MAX_LOCK_WAIT_MS, || async move {
            let mut tx = begin_monitored(pool, "detection::commit").await?;
            let inserted = detections::insert_detections(tx.conn(), new_detections).await?;
            tx.commit().await?;
            Ok(inserted)
        })
        .await
    }
}
