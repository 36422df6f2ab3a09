//! Contract row normalization
//!
//! Maps the contract-action export schema onto [`NewContract`]. Amendments
//! share a base PIID, so the stored PIID appends the modification and
//! transaction numbers.

use super::{IngestTarget, RejectReason};
use crate::db::contracts;
use chrono::NaiveDate;
use sbir_common::db::models::{CompetitionDetails, NewContract, RawRecord};
use sbir_common::time::parse_flexible_date;
use sbir_common::Result;
use sqlx::SqliteConnection;
use std::collections::HashSet;

pub const RECIPIENT: &str = "recipient_name";
pub const BASE_PIID: &str = "award_id_piid";
pub const MODIFICATION_NUMBER: &str = "modification_number";
pub const TRANSACTION_NUMBER: &str = "transaction_number";
pub const AGENCY: &str = "awarding_agency_name";
pub const EXTENT_COMPETED: &str = "extent_competed";
pub const PRICING_TYPE: &str = "type_of_contract_pricing";
pub const NAICS_CODE: &str = "naics_code";
pub const PSC_CODE: &str = "product_or_service_code";

/// Date columns tried in order for the contract start
pub const START_DATE_FIELDS: &[&str] = &["period_of_performance_start_date", "action_date"];

/// Free-text columns tried in order for the description
pub const DESCRIPTION_FIELDS: &[&str] = &["award_description", "transaction_description"];

/// Contract row that passed validation, before vendor resolution
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedContract {
    pub piid: String,
    pub agency: String,
    pub start_date: NaiveDate,
    pub competition_details: CompetitionDetails,
    pub naics_code: Option<String>,
    pub psc_code: Option<String>,
    pub description: Option<String>,
    pub raw_data: RawRecord,
}

/// `base_modification_transaction`, missing parts default to "0"
pub fn compose_piid(base: &str, modification: Option<&str>, transaction: Option<&str>) -> String {
    format!(
        "{}_{}_{}",
        base,
        modification.unwrap_or("0"),
        transaction.unwrap_or("0")
    )
}

/// Validate and map one contract row; returns the recipient name with the contract
pub fn parse_contract_row(
    row: &RawRecord,
) -> std::result::Result<(String, ParsedContract), RejectReason> {
    let recipient = row.get(RECIPIENT).ok_or(RejectReason::MissingRecipient)?;
    let base_piid = row.get(BASE_PIID).ok_or(RejectReason::MissingPiid)?;
    let agency = row.get(AGENCY).ok_or(RejectReason::MissingAgency)?;
    let start_date = START_DATE_FIELDS
        .iter()
        .filter_map(|field| row.get(field))
        .find_map(parse_flexible_date)
        .ok_or(RejectReason::MissingDates)?;

    let parsed = ParsedContract {
        piid: compose_piid(
            base_piid,
            row.get(MODIFICATION_NUMBER),
            row.get(TRANSACTION_NUMBER),
        ),
        agency: agency.to_string(),
        start_date,
        competition_details: CompetitionDetails {
            extent_competed: row.get(EXTENT_COMPETED).map(str::to_string),
            pricing_type: row.get(PRICING_TYPE).map(str::to_string),
        },
        naics_code: row.get(NAICS_CODE).map(str::to_string),
        psc_code: row.get(PSC_CODE).map(str::to_string),
        description: row.first_of(DESCRIPTION_FIELDS).map(str::to_string),
        raw_data: row.clone(),
    };

    Ok((recipient.to_string(), parsed))
}

/// Contract ingestion target
pub(crate) struct ContractTarget;

impl IngestTarget for ContractTarget {
    type Parsed = ParsedContract;
    type Key = String;

    const LABEL: &'static str = "contracts";

    fn parse(row: &RawRecord) -> std::result::Result<(String, ParsedContract), RejectReason> {
        parse_contract_row(row)
    }

    fn key(parsed: &ParsedContract) -> String {
        parsed.piid.clone()
    }

    async fn existing_keys(conn: &mut SqliteConnection, vendor_id: i64) -> Result<HashSet<String>> {
        contracts::contract_piids_for_vendor(conn, vendor_id).await
    }

    async fn insert(
        conn: &mut SqliteConnection,
        vendor_id: i64,
        parsed: ParsedContract,
    ) -> Result<bool> {
        let contract = NewContract {
            vendor_id,
            piid: parsed.piid,
            agency: parsed.agency,
            start_date: parsed.start_date,
            competition_details: parsed.competition_details,
            naics_code: parsed.naics_code,
            psc_code: parsed.psc_code,
            description: parsed.description,
            raw_data: parsed.raw_data,
        };
        // PIIDs are global; another vendor's contract may already hold it
        contracts::insert_contract(conn, &contract).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn row(pairs: &[(&str, &str)]) -> RawRecord {
        RawRecord(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<BTreeMap<_, _>>(),
        )
    }

    fn complete_row() -> Vec<(&'static str, &'static str)> {
        vec![
            ("recipient_name", "Acme Photonics"),
            ("award_id_piid", "N6833522C0101"),
            ("modification_number", "P00002"),
            ("transaction_number", "1"),
            ("awarding_agency_name", "Department of Defense"),
            ("period_of_performance_start_date", "2023-01-30"),
            ("extent_competed", "NOT AVAILABLE FOR COMPETITION"),
            ("type_of_contract_pricing", "FIRM FIXED PRICE"),
            ("naics_code", "541715"),
            ("product_or_service_code", "AC12"),
            ("transaction_description", "SBIR PHASE III LIDAR PRODUCTION"),
        ]
    }

    #[test]
    fn test_compose_piid_defaults() {
        assert_eq!(compose_piid("W911", None, None), "W911_0_0");
        assert_eq!(compose_piid("W911", Some("P00001"), None), "W911_P00001_0");
    }

    #[test]
    fn test_complete_row_maps_all_fields() {
        let (recipient, parsed) = parse_contract_row(&row(&complete_row())).unwrap();
        assert_eq!(recipient, "Acme Photonics");
        assert_eq!(parsed.piid, "N6833522C0101_P00002_1");
        assert_eq!(parsed.start_date, NaiveDate::from_ymd_opt(2023, 1, 30).unwrap());
        assert_eq!(
            parsed.competition_details.extent_competed.as_deref(),
            Some("NOT AVAILABLE FOR COMPETITION")
        );
        assert_eq!(parsed.psc_code.as_deref(), Some("AC12"));
        assert_eq!(parsed.description.as_deref(), Some("SBIR PHASE III LIDAR PRODUCTION"));
    }

    #[test]
    fn test_action_date_fallback() {
        let mut fields = complete_row();
        fields.retain(|(k, _)| *k != "period_of_performance_start_date");
        fields.push(("action_date", "2023-02-01"));
        let (_, parsed) = parse_contract_row(&row(&fields)).unwrap();
        assert_eq!(parsed.start_date, NaiveDate::from_ymd_opt(2023, 2, 1).unwrap());
    }

    #[test]
    fn test_required_field_rejections() {
        for (missing, reason) in [
            ("recipient_name", RejectReason::MissingRecipient),
            ("award_id_piid", RejectReason::MissingPiid),
            ("awarding_agency_name", RejectReason::MissingAgency),
            ("period_of_performance_start_date", RejectReason::MissingDates),
        ] {
            let mut fields = complete_row();
            fields.retain(|(k, _)| *k != missing);
            assert_eq!(
                parse_contract_row(&row(&fields)).unwrap_err(),
                reason,
                "dropping {}",
                missing
            );
        }
    }
}
