//! Award row normalization
//!
//! Maps the award export schema onto [`NewSbirAward`]. The award date is the
//! first parseable value of an ordered fallback chain, ending with the award
//! year read as January 1 of that year.

use super::{IngestTarget, RejectReason};
use crate::db::awards::{self, AwardKey};
use chrono::NaiveDate;
use sbir_common::db::models::{NewSbirAward, RawRecord};
use sbir_common::time::parse_flexible_date;
use sbir_common::Result;
use sqlx::SqliteConnection;
use std::collections::HashSet;

pub const COMPANY: &str = "Company";
pub const AWARD_PIID: &str = "Contract";
pub const AGENCY_TRACKING_NUMBER: &str = "Agency Tracking Number";
pub const PHASE: &str = "Phase";
pub const AGENCY: &str = "Agency";
pub const COMPLETION_DATE: &str = "Contract End Date";
pub const TOPIC_CODE: &str = "Topic Code";
pub const AWARD_TITLE: &str = "Award Title";
pub const AWARD_YEAR: &str = "Award Year";

/// Date columns tried in order for the award date
pub const AWARD_DATE_FIELDS: &[&str] = &[
    "Proposal Award Date",
    "Date of Notification",
    "Solicitation Close Date",
    "Proposal Receipt Date",
];

/// Award years accepted for the January 1 fallback
pub const MIN_AWARD_YEAR: i32 = 1905;
pub const MAX_AWARD_YEAR: i32 = 2025;

/// Award row that passed validation, before vendor resolution
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedAward {
    pub award_piid: String,
    pub phase: String,
    pub agency: String,
    pub award_date: NaiveDate,
    pub completion_date: Option<NaiveDate>,
    pub topic: Option<String>,
    pub raw_data: RawRecord,
}

/// Resolve the award date through the fallback chain
pub fn resolve_award_date(row: &RawRecord) -> Option<NaiveDate> {
    AWARD_DATE_FIELDS
        .iter()
        .filter_map(|field| row.get(field))
        .find_map(parse_flexible_date)
        .or_else(|| row.get(AWARD_YEAR).and_then(parse_award_year))
}

/// January 1 of the award year, if the year is in range
pub fn parse_award_year(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    // Spreadsheet exports sometimes carry "2019.0"
    let year = match value.parse::<i32>() {
        Ok(year) => year,
        Err(_) => {
            let float = value.parse::<f64>().ok()?;
            if float.fract() != 0.0 {
                return None;
            }
            float as i32
        }
    };

    if !(MIN_AWARD_YEAR..=MAX_AWARD_YEAR).contains(&year) {
        return None;
    }
    NaiveDate::from_ymd_opt(year, 1, 1)
}

/// Validate and map one award row; returns the vendor name with the award
pub fn parse_award_row(
    row: &RawRecord,
) -> std::result::Result<(String, ParsedAward), RejectReason> {
    let company = row.get(COMPANY).ok_or(RejectReason::MissingCompany)?;
    let award_date = resolve_award_date(row).ok_or(RejectReason::MissingDates)?;

    let parsed = ParsedAward {
        award_piid: row
            .first_of(&[AWARD_PIID, AGENCY_TRACKING_NUMBER])
            .unwrap_or_default()
            .to_string(),
        phase: row.get(PHASE).unwrap_or_default().to_string(),
        agency: row.get(AGENCY).unwrap_or_default().to_string(),
        award_date,
        completion_date: row.get(COMPLETION_DATE).and_then(parse_flexible_date),
        topic: row.first_of(&[TOPIC_CODE, AWARD_TITLE]).map(str::to_string),
        raw_data: row.clone(),
    };

    Ok((company.to_string(), parsed))
}

/// Award ingestion target
pub(crate) struct AwardTarget;

impl IngestTarget for AwardTarget {
    type Parsed = ParsedAward;
    type Key = AwardKey;

    const LABEL: &'static str = "awards";

    fn parse(row: &RawRecord) -> std::result::Result<(String, ParsedAward), RejectReason> {
        parse_award_row(row)
    }

    fn key(parsed: &ParsedAward) -> AwardKey {
        (
            parsed.award_piid.clone(),
            parsed.phase.clone(),
            parsed.agency.clone(),
        )
    }

    async fn existing_keys(
        conn: &mut SqliteConnection,
        vendor_id: i64,
    ) -> Result<HashSet<AwardKey>> {
        awards::award_keys_for_vendor(conn, vendor_id).await
    }

    async fn insert(
        conn: &mut SqliteConnection,
        vendor_id: i64,
        parsed: ParsedAward,
    ) -> Result<bool> {
        let award = NewSbirAward {
            vendor_id,
            award_piid: parsed.award_piid,
            phase: parsed.phase,
            agency: parsed.agency,
            award_date: parsed.award_date,
            completion_date: parsed.completion_date,
            topic: parsed.topic,
            raw_data: parsed.raw_data,
        };
        awards::insert_award(conn, &award).await?;
        Ok(true)
    }
}
