//! Database models
//!
//! Typed forms of the entity tables. JSON columns (`raw_data`,
//! `competition_details`) are typed here and serialized to the same JSON
//! shape the tables store.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Snapshot of the input row an entity was built from
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawRecord(pub BTreeMap<String, String>);

impl RawRecord {
    /// Trimmed, non-empty value for a column
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    /// First present value among the given columns
    pub fn first_of(&self, keys: &[&str]) -> Option<&str> {
        keys.iter().find_map(|key| self.get(key))
    }
}

impl From<BTreeMap<String, String>> for RawRecord {
    fn from(map: BTreeMap<String, String>) -> Self {
        Self(map)
    }
}

/// Research award (SBIR/STTR)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SbirAward {
    pub id: i64,
    pub vendor_id: i64,
    pub award_piid: String,
    pub phase: String,
    pub agency: String,
    pub award_date: NaiveDate,
    pub completion_date: Option<NaiveDate>,
    pub topic: Option<String>,
    pub raw_data: RawRecord,
}

impl SbirAward {
    /// Candidate window anchor: completion date when known, else award date
    pub fn base_date(&self) -> NaiveDate {
        self.completion_date.unwrap_or(self.award_date)
    }
}

/// Award accepted by ingestion, not yet persisted
#[derive(Debug, Clone, PartialEq)]
pub struct NewSbirAward {
    pub vendor_id: i64,
    pub award_piid: String,
    pub phase: String,
    pub agency: String,
    pub award_date: NaiveDate,
    pub completion_date: Option<NaiveDate>,
    pub topic: Option<String>,
    pub raw_data: RawRecord,
}

/// Structured competition fields of a contract
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompetitionDetails {
    /// Free-text extent-competed description
    pub extent_competed: Option<String>,
    /// Contract pricing type
    pub pricing_type: Option<String>,
}

/// Federal contract action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contract {
    pub id: i64,
    pub vendor_id: i64,
    /// `base_piid_modification_transaction`, globally unique
    pub piid: String,
    pub agency: String,
    pub start_date: NaiveDate,
    pub competition_details: CompetitionDetails,
    pub naics_code: Option<String>,
    pub psc_code: Option<String>,
    pub description: Option<String>,
    pub raw_data: RawRecord,
}

impl Contract {
    /// Free text searched by the text signals
    pub fn free_text(&self) -> String {
        [
            self.description.as_deref(),
            self.competition_details.extent_competed.as_deref(),
        ]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join(" ")
    }
}

/// Contract accepted by ingestion, not yet persisted
#[derive(Debug, Clone, PartialEq)]
pub struct NewContract {
    pub vendor_id: i64,
    pub piid: String,
    pub agency: String,
    pub start_date: NaiveDate,
    pub competition_details: CompetitionDetails,
    pub naics_code: Option<String>,
    pub psc_code: Option<String>,
    pub description: Option<String>,
    pub raw_data: RawRecord,
}

/// Persisted award-contract link
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub id: i64,
    pub detection_uuid: Uuid,
    pub sbir_award_id: i64,
    pub contract_id: i64,
    pub likelihood_score: f64,
    pub confidence: String,
    pub evidence_bundle: serde_json::Value,
    pub detection_date: DateTime<Utc>,
}

/// Detection produced by a worker, persisted by the coordinator
#[derive(Debug, Clone, PartialEq)]
pub struct NewDetection {
    pub detection_uuid: Uuid,
    pub sbir_award_id: i64,
    pub contract_id: i64,
    pub likelihood_score: f64,
    pub confidence: String,
    pub evidence_bundle: serde_json::Value,
    pub detection_date: DateTime<Utc>,
}
