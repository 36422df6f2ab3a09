//! Integration tests for award and contract ingestion

mod helpers;

use helpers::db_utils::{award_row, contract_row, create_test_db, row};
use sbir_detect::db::{awards, contracts, store_summary, vendors};
use sbir_detect::ingest::{read_rows_jsonl, Ingestor, RejectReason};

const NAVY: &str = "Department of the Navy";
const AIR_FORCE: &str = "Department of the Air Force";
const ENERGY: &str = "Department of Energy";

#[tokio::test]
async fn test_award_ingest_creates_vendors_and_awards() {
    let db = create_test_db().await.unwrap();
    let ingestor = Ingestor::new(db.pool.clone(), 1000).unwrap();

    let rows = vec![
        award_row("Acme Photonics", "N68335-21-C-0101", NAVY, "2022-12-31"),
        award_row("Acme Photonics", "N68335-21-C-0202", NAVY, "2023-03-31"),
        award_row("Borealis Robotics", "FA8650-21-C-1000", AIR_FORCE, "2022-06-30"),
    ];
    let stats = ingestor.ingest_awards(&rows).await.unwrap();

    assert_eq!(stats.total, 3);
    assert_eq!(stats.valid, 3);
    assert_eq!(stats.inserted, 3);
    assert_eq!(stats.rejected(), 0);
    assert_eq!(stats.vendors_created, 2);
    assert_eq!(stats.chunks_committed, 1);

    assert_eq!(vendors::count_vendors(&db.pool).await.unwrap(), 2);
    assert_eq!(awards::count_awards(&db.pool).await.unwrap(), 3);
}

#[tokio::test]
async fn test_reingest_is_idempotent() {
    let db = create_test_db().await.unwrap();
    let ingestor = Ingestor::new(db.pool.clone(), 2).unwrap();

    let award_rows = vec![
        award_row("Acme Photonics", "N68335-21-C-0101", NAVY, "2022-12-31"),
        award_row("Borealis Robotics", "FA8650-21-C-1000", AIR_FORCE, "2022-06-30"),
        award_row("Cobalt Materials", "DE-SC0021-0001", ENERGY, "2022-09-30"),
    ];
    let contract_rows = vec![
        contract_row(
            "Acme Photonics",
            "N0002423C0001",
            NAVY,
            "2023-01-30",
            "NOT AVAILABLE FOR COMPETITION",
        ),
        contract_row(
            "Cobalt Materials",
            "89243123C0001",
            ENERGY,
            "2023-02-15",
            "FULL AND OPEN COMPETITION",
        ),
    ];

    let first_awards = ingestor.ingest_awards(&award_rows).await.unwrap();
    let first_contracts = ingestor.ingest_contracts(&contract_rows).await.unwrap();
    let before = store_summary(&db.pool).await.unwrap();

    let second_awards = ingestor.ingest_awards(&award_rows).await.unwrap();
    let second_contracts = ingestor.ingest_contracts(&contract_rows).await.unwrap();
    let after = store_summary(&db.pool).await.unwrap();

    assert_eq!(first_awards.inserted, 3);
    assert_eq!(first_contracts.inserted, 2);
    assert_eq!(second_awards.inserted, 0);
    assert_eq!(second_awards.duplicates_skipped, award_rows.len());
    assert_eq!(second_contracts.duplicates_skipped, contract_rows.len());
    assert_eq!(second_awards.vendors_created, 0);

    assert_eq!(before.vendors, after.vendors);
    assert_eq!(before.awards, after.awards);
    assert_eq!(before.contracts, after.contracts);
}

#[tokio::test]
async fn test_duplicate_award_rows_in_one_batch() {
    let db = create_test_db().await.unwrap();
    let ingestor = Ingestor::new(db.pool.clone(), 1000).unwrap();

    let duplicate = award_row("Acme Photonics", "N68335-21-C-0101", NAVY, "2022-12-31");
    let stats = ingestor
        .ingest_awards(&[duplicate.clone(), duplicate])
        .await
        .unwrap();

    assert_eq!(stats.valid, 2);
    assert_eq!(stats.inserted, 1);
    assert_eq!(stats.duplicates_skipped, 1);
    assert_eq!(awards::count_awards(&db.pool).await.unwrap(), 1);
}

#[tokio::test]
async fn test_same_piid_different_phase_is_not_duplicate() {
    let db = create_test_db().await.unwrap();
    let ingestor = Ingestor::new(db.pool.clone(), 1000).unwrap();

    let phase_two = award_row("Acme Photonics", "N68335-21-C-0101", NAVY, "2022-12-31");
    let mut phase_one = phase_two.clone();
    phase_one.0.insert("Phase".to_string(), "Phase I".to_string());

    let stats = ingestor.ingest_awards(&[phase_one, phase_two]).await.unwrap();
    assert_eq!(stats.inserted, 2);
    assert_eq!(stats.duplicates_skipped, 0);
}

#[tokio::test]
async fn test_rejections_counted_by_reason() {
    let db = create_test_db().await.unwrap();
    let ingestor = Ingestor::new(db.pool.clone(), 1000).unwrap();

    let award_rows = vec![
        row(&[("Company", ""), ("Proposal Award Date", "2021-01-04")]),
        row(&[("Company", "Acme Photonics"), ("Award Year", "1850")]),
        row(&[("Company", "Acme Photonics"), ("Award Year", "2020")]),
    ];
    let stats = ingestor.ingest_awards(&award_rows).await.unwrap();
    assert_eq!(stats.rejected_for(RejectReason::MissingCompany), 1);
    assert_eq!(stats.rejected_for(RejectReason::MissingDates), 1);
    assert_eq!(stats.inserted, 1);

    let contract_rows = vec![
        row(&[
            ("award_id_piid", "X1"),
            ("awarding_agency_name", "NASA"),
            ("action_date", "2023-01-01"),
        ]),
        row(&[
            ("recipient_name", "Acme Photonics"),
            ("awarding_agency_name", "NASA"),
            ("action_date", "2023-01-01"),
        ]),
        row(&[
            ("recipient_name", "Acme Photonics"),
            ("award_id_piid", "X3"),
            ("action_date", "2023-01-01"),
        ]),
        row(&[
            ("recipient_name", "Acme Photonics"),
            ("award_id_piid", "X4"),
            ("awarding_agency_name", "NASA"),
        ]),
    ];
    let stats = ingestor.ingest_contracts(&contract_rows).await.unwrap();
    assert_eq!(stats.rejected(), 4);
    assert_eq!(stats.valid, 0);
    for reason in [
        RejectReason::MissingRecipient,
        RejectReason::MissingPiid,
        RejectReason::MissingAgency,
        RejectReason::MissingDates,
    ] {
        assert_eq!(stats.rejected_for(reason), 1, "{}", reason);
    }
    assert_eq!(contracts::count_contracts(&db.pool).await.unwrap(), 0);
}

#[tokio::test]
async fn test_piid_unique_across_vendors() {
    let db = create_test_db().await.unwrap();
    let ingestor = Ingestor::new(db.pool.clone(), 1000).unwrap();

    let rows = vec![
        contract_row("Acme Photonics", "N0002423C0001", NAVY, "2023-01-30", ""),
        contract_row("Acme Photonics LLC", "N0002423C0001", NAVY, "2023-01-30", ""),
    ];
    let stats = ingestor.ingest_contracts(&rows).await.unwrap();

    assert_eq!(stats.inserted, 1);
    assert_eq!(stats.duplicates_skipped, 1);
    assert_eq!(stats.vendors_created, 2);
    assert_eq!(contracts::count_contracts(&db.pool).await.unwrap(), 1);
}

#[tokio::test]
async fn test_modifications_stored_as_distinct_contracts() {
    let db = create_test_db().await.unwrap();
    let ingestor = Ingestor::new(db.pool.clone(), 1000).unwrap();

    let base = contract_row("Acme Photonics", "N0002423C0001", NAVY, "2023-01-30", "");
    let mut modification = base.clone();
    modification
        .0
        .insert("modification_number".to_string(), "P00001".to_string());

    let stats = ingestor.ingest_contracts(&[base, modification]).await.unwrap();
    assert_eq!(stats.inserted, 2);

    let piids: Vec<String> = sqlx::query_scalar("SELECT piid FROM contracts ORDER BY piid")
        .fetch_all(&db.pool)
        .await
        .unwrap();
    assert_eq!(piids, vec!["N0002423C0001_0_0", "N0002423C0001_P00001_0"]);
}

#[tokio::test]
async fn test_small_chunks_commit_separately() {
    let db = create_test_db().await.unwrap();
    let ingestor = Ingestor::new(db.pool.clone(), 2).unwrap();

    let rows: Vec<_> = (0..5)
        .map(|i| {
            award_row(
                "Acme Photonics",
                &format!("N68335-21-C-{:04}", i),
                NAVY,
                "2022-12-31",
            )
        })
        .collect();
    let stats = ingestor.ingest_awards(&rows).await.unwrap();

    assert_eq!(stats.chunks_committed, 3);
    assert_eq!(stats.inserted, 5);
    assert_eq!(stats.vendors_created, 1);
}

#[tokio::test]
async fn test_zero_chunk_size_rejected() {
    let db = create_test_db().await.unwrap();
    assert!(Ingestor::new(db.pool.clone(), 0).is_err());
}

#[tokio::test]
async fn test_jsonl_file_ingest() {
    let db = create_test_db().await.unwrap();
    let input = db.dir.path().join("awards.jsonl");
    std::fs::write(
        &input,
        concat!(
            r#"{"Company": "Acme Photonics", "Contract": "N68335-21-C-0101", "Phase": "Phase II", "Agency": "Department of the Navy", "Award Year": 2021, "Contract End Date": "12/31/2022"}"#,
            "\n\n",
            r#"{"Company": "Borealis Robotics", "Contract": null, "Phase": "Phase I", "Agency": "NASA", "Proposal Award Date": "2020-05-01"}"#,
            "\n",
        ),
    )
    .unwrap();

    let rows = read_rows_jsonl(&input).unwrap();
    assert_eq!(rows.len(), 2);

    let stats = Ingestor::new(db.pool.clone(), 1000)
        .unwrap()
        .ingest_awards(&rows)
        .await
        .unwrap();
    assert_eq!(stats.inserted, 2);

    let award = awards::load_award(&db.pool, 1).await.unwrap().unwrap();
    assert_eq!(award.award_date.to_string(), "2021-01-01");
    assert_eq!(award.completion_date.map(|d| d.to_string()).as_deref(), Some("2022-12-31"));
}

#[tokio::test]
async fn test_failed_chunk_rolls_back_and_stops_ingestion() {
    let db = create_test_db().await.unwrap();
    sqlx::query(
        r#"
        CREATE TRIGGER reject_award BEFORE INSERT ON sbir_awards
        WHEN NEW.award_piid = 'N68335-21-C-0003'
        BEGIN SELECT RAISE(ABORT, 'award rejected'); END
        "#,
    )
    .execute(&db.pool)
    .await
    .unwrap();

    // Chunks of 2: [0000, 0001] [0002, 0003] [0004]
    let rows: Vec<_> = (0..5)
        .map(|i| {
            let company = if i < 2 { "Acme Photonics" } else { "Borealis Robotics" };
            award_row(company, &format!("N68335-21-C-{:04}", i), NAVY, "2022-12-31")
        })
        .collect();
    let result = Ingestor::new(db.pool.clone(), 2)
        .unwrap()
        .ingest_awards(&rows)
        .await;
    assert!(result.is_err());

    let piids: Vec<String> =
        sqlx::query_scalar("SELECT award_piid FROM sbir_awards ORDER BY award_piid")
            .fetch_all(&db.pool)
            .await
            .unwrap();
    assert_eq!(piids, vec!["N68335-21-C-0000", "N68335-21-C-0001"]);

    // The vendor created inside the failed chunk is rolled back with it
    assert_eq!(vendors::count_vendors(&db.pool).await.unwrap(), 1);
}
