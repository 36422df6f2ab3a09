//! Detection database operations
//!
//! Detections are written only by the coordinator's bulk insert and never
//! updated.

use chrono::{DateTime, Utc};
use sbir_common::db::models::{Detection, NewDetection};
use sbir_common::{Error, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqliteConnection, SqlitePool};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Rows per multi-row INSERT (7 bound parameters each)
const INSERT_BATCH_SIZE: usize = 500;

/// Insert detections in multi-row batches on the given connection
///
/// Callers run this inside a transaction; a failure leaves nothing behind
/// once that transaction is rolled back.
pub async fn insert_detections(
    conn: &mut SqliteConnection,
    detections: &[NewDetection],
) -> Result<u64> {
    let mut inserted = 0u64;

    for batch in detections.chunks(INSERT_BATCH_SIZE) {
        let mut encoded = Vec::with_capacity(batch.len());
        for detection in batch {
            encoded.push((detection, serde_json::to_string(&detection.evidence_bundle)?));
        }

        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
            "INSERT INTO detections (detection_uuid, sbir_award_id, contract_id, likelihood_score, confidence, evidence_bundle, detection_date) ",
        );
        builder.push_values(encoded, |mut row, (detection, evidence)| {
            row.push_bind(detection.detection_uuid.to_string())
                .push_bind(detection.sbir_award_id)
                .push_bind(detection.contract_id)
                .push_bind(detection.likelihood_score)
                .push_bind(detection.confidence.clone())
                .push_bind(evidence)
                .push_bind(detection.detection_date.to_rfc3339());
        });

        let result = builder.build().execute(&mut *conn).await?;
        inserted += result.rows_affected();
    }

    Ok(inserted)
}

/// Count total detections
pub async fn count_detections(pool: &SqlitePool) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM detections")
        .fetch_one(pool)
        .await?;
    Ok(count)
}

/// Detection counts per confidence label
pub async fn count_by_confidence(pool: &SqlitePool) -> Result<BTreeMap<String, i64>> {
    let rows: Vec<(String, i64)> =
        sqlx::query_as("SELECT confidence, COUNT(*) FROM detections GROUP BY confidence")
            .fetch_all(pool)
            .await?;
    Ok(rows.into_iter().collect())
}

/// Detections recorded for one award
pub async fn load_detections_for_award(pool: &SqlitePool, award_id: i64) -> Result<Vec<Detection>> {
    let rows = sqlx::query(
        r#"
        SELECT id, detection_uuid, sbir_award_id, contract_id, likelihood_score, confidence, evidence_bundle, detection_date
        FROM detections
        WHERE sbir_award_id = ?
        ORDER BY id
        "#,
    )
    .bind(award_id)
    .fetch_all(pool)
    .await?;

    rows.iter().map(detection_from_row).collect()
}

fn detection_from_row(row: &SqliteRow) -> Result<Detection> {
    let uuid_str: String = row.get("detection_uuid");
    let detection_uuid = Uuid::parse_str(&uuid_str)
        .map_err(|e| Error::Internal(format!("Invalid UUID in database: {}", e)))?;

    let evidence_json: String = row.get("evidence_bundle");
    let evidence_bundle: serde_json::Value = serde_json::from_str(&evidence_json)?;

    let date_str: String = row.get("detection_date");
    let detection_date = DateTime::parse_from_rfc3339(&date_str)
        .map_err(|e| Error::Internal(format!("Invalid detection_date '{}': {}", date_str, e)))?
        .with_timezone(&Utc);

    Ok(Detection {
        id: row.get("id"),
        detection_uuid,
        sbir_award_id: row.get("sbir_award_id"),
        contract_id: row.get("contract_id"),
        likelihood_score: row.get("likelihood_score"),
        confidence: row.get("confidence"),
        evidence_bundle,
        detection_date,
    })
}
