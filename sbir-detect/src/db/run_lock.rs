//! Detection run lock
//!
//! One row in `detection_run_lock` marks an active run. Two runs selecting
//! the same unprocessed awards would double-detect them, so a run must hold
//! the lock from partitioning until its commit (or failure). A lock older
//! than the stale limit is assumed abandoned by a crashed run and taken over.
//! A live run renews its timestamp at each stage so long runs stay fresh.

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use sbir_common::{Error, Result};
use sqlx::SqlitePool;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Current holder of the lock
#[derive(Debug, Clone, PartialEq)]
pub struct RunLockHolder {
    pub run_id: String,
    pub acquired_at: DateTime<Utc>,
}

fn lock_timestamp(at: DateTime<Utc>) -> String {
    // Fixed layout so stored timestamps compare lexicographically
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Read the current lock holder, if any
pub async fn current_holder(pool: &SqlitePool) -> Result<Option<RunLockHolder>> {
    let row: Option<(String, String)> =
        sqlx::query_as("SELECT run_id, acquired_at FROM detection_run_lock WHERE id = 1")
            .fetch_optional(pool)
            .await?;

    match row {
        Some((run_id, acquired_str)) => {
            let acquired_at = DateTime::parse_from_rfc3339(&acquired_str)
                .map_err(|e| {
                    Error::Internal(format!("Invalid lock timestamp '{}': {}", acquired_str, e))
                })?
                .with_timezone(&Utc);
            Ok(Some(RunLockHolder { run_id, acquired_at }))
        }
        None => Ok(None),
    }
}

/// Acquire the run lock for `run_id`
///
/// Fails with [`Error::Conflict`] while another run holds a lock younger than
/// `stale_after`.
pub async fn acquire(pool: &SqlitePool, run_id: Uuid, stale_after: Duration) -> Result<()> {
    let now = Utc::now();
    let stale_cutoff = now - stale_after;
    let previous = current_holder(pool).await?;

    // Single statement: insert, or take over only a stale row
    let result = sqlx::query(
        r#"
        INSERT INTO detection_run_lock (id, run_id, acquired_at) VALUES (1, ?, ?)
        ON CONFLICT(id) DO UPDATE SET run_id = excluded.run_id, acquired_at = excluded.acquired_at
        WHERE detection_run_lock.acquired_at < ?
        "#,
    )
    .bind(run_id.to_string())
    .bind(lock_timestamp(now))
    .bind(lock_timestamp(stale_cutoff))
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        let holder = current_holder(pool).await?;
        let detail = match holder {
            Some(h) => format!("run {} holds the detection lock since {}", h.run_id, h.acquired_at),
            None => "detection lock is held by another run".to_string(),
        };
        return Err(Error::Conflict(detail));
    }

    match previous {
        Some(stale) => warn!(
            run_id = %run_id,
            stale_run_id = %stale.run_id,
            stale_since = %stale.acquired_at,
            "Took over stale detection run lock"
        ),
        None => info!(run_id = %run_id, "Detection run lock acquired"),
    }

    Ok(())
}

/// Refresh the lock timestamp for `run_id`
///
/// Fails with [`Error::Conflict`] when the lock no longer belongs to this run.
pub async fn renew(pool: &SqlitePool, run_id: Uuid) -> Result<()> {
    let result =
        sqlx::query("UPDATE detection_run_lock SET acquired_at = ? WHERE id = 1 AND run_id = ?")
            .bind(lock_timestamp(Utc::now()))
            .bind(run_id.to_string())
            .execute(pool)
            .await?;

    if result.rows_affected() == 0 {
        return Err(Error::Conflict(format!("Run {} no longer holds the detection lock", run_id)));
    }
    debug!(run_id = %run_id, "Detection run lock renewed");
    Ok(())
}

/// Release the lock if `run_id` still owns it
pub async fn release(pool: &SqlitePool, run_id: Uuid) -> Result<bool> {
    let result = sqlx::query("DELETE FROM detection_run_lock WHERE id = 1 AND run_id = ?")
        .bind(run_id.to_string())
        .execute(pool)
        .await?;

    let released = result.rows_affected() == 1;
    if released {
        info!(run_id = %run_id, "Detection run lock released");
    } else {
        warn!(run_id = %run_id, "Detection run lock was not held by this run at release");
    }
    Ok(released)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sbir_common::db::init::init_database;
    use tempfile::TempDir;

    async fn setup() -> (TempDir, SqlitePool) {
        let dir = TempDir::new().unwrap();
        let pool = init_database(&dir.path().join("lock.db")).await.unwrap();
        (dir, pool)
    }

    #[tokio::test]
    async fn test_second_acquire_conflicts() {
        let (_dir, pool) = setup().await;
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();

        acquire(&pool, first, Duration::minutes(120)).await.unwrap();
        let result = acquire(&pool, second, Duration::minutes(120)).await;

        assert!(matches!(result, Err(Error::Conflict(_))));
        assert_eq!(current_holder(&pool).await.unwrap().unwrap().run_id, first.to_string());
    }

    #[tokio::test]
    async fn test_release_allows_next_run() {
        let (_dir, pool) = setup().await;
        let first = Uuid::new_v4();

        acquire(&pool, first, Duration::minutes(120)).await.unwrap();
        assert!(release(&pool, first).await.unwrap());
        assert!(current_holder(&pool).await.unwrap().is_none());

        acquire(&pool, Uuid::new_v4(), Duration::minutes(120)).await.unwrap();
    }

    #[tokio::test]
    async fn test_release_by_non_owner_keeps_lock() {
        let (_dir, pool) = setup().await;
        let owner = Uuid::new_v4();

        acquire(&pool, owner, Duration::minutes(120)).await.unwrap();
        assert!(!release(&pool, Uuid::new_v4()).await.unwrap());
        assert!(current_holder(&pool).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_stale_lock_is_taken_over() {
        let (_dir, pool) = setup().await;
        let crashed = Uuid::new_v4();
        let old = Utc::now() - Duration::hours(5);
        sqlx::query("INSERT INTO detection_run_lock (id, run_id, acquired_at) VALUES (1, ?, ?)")
            .bind(crashed.to_string())
            .bind(lock_timestamp(old))
            .execute(&pool)
            .await
            .unwrap();

        let next = Uuid::new_v4();
        acquire(&pool, next, Duration::minutes(120)).await.unwrap();

        assert_eq!(current_holder(&pool).await.unwrap().unwrap().run_id, next.to_string());
    }

    #[tokio::test]
    async fn test_renew_keeps_lock_fresh() {
        let (_dir, pool) = setup().await;
        let owner = Uuid::new_v4();
        let old = Utc::now() - Duration::hours(5);
        sqlx::query("INSERT INTO detection_run_lock (id, run_id, acquired_at) VALUES (1, ?, ?)")
            .bind(owner.to_string())
            .bind(lock_timestamp(old))
            .execute(&pool)
            .await
            .unwrap();

        renew(&pool, owner).await.unwrap();

        let holder = current_holder(&pool).await.unwrap().unwrap();
        assert!(holder.acquired_at > old);
        let result = acquire(&pool, Uuid::new_v4(), Duration::minutes(120)).await;
        assert!(matches!(result, Err(Error::Conflict(_))));
    }

    #[tokio::test]
    async fn test_renew_after_takeover_conflicts() {
        let (_dir, pool) = setup().await;
        let owner = Uuid::new_v4();
        acquire(&pool, owner, Duration::minutes(120)).await.unwrap();
        assert!(release(&pool, owner).await.unwrap());
        acquire(&pool, Uuid::new_v4(), Duration::minutes(120)).await.unwrap();

        assert!(matches!(renew(&pool, owner).await, Err(Error::Conflict(_))));
    }
}
