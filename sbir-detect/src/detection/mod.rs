//! Transition detection
//!
//! Candidate search, signal extraction, scoring, classification and evidence
//! for award/contract pairs, plus the coordinator that runs them over the
//! pending award set.

pub mod artifacts;
pub mod candidates;
pub mod classifier;
pub mod coordinator;
pub mod evidence;
pub mod pipeline;
pub mod scorer;
pub mod signals;

pub use classifier::{classify, ConfidenceTier, PUBLICATION_FLOOR};
pub use coordinator::{DetectionCoordinator, DetectionRunSummary, RunState};
pub use evidence::EvidenceBundle;
pub use pipeline::AwardPipeline;
pub use signals::{CompetitionTier, Signals};

#[cfg(test)]
pub(crate) mod test_fixtures {
    use chrono::NaiveDate;
    use sbir_common::db::models::{CompetitionDetails, Contract, RawRecord, SbirAward};

    pub fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    /// Phase II award completed on `completion`, awarded 2021-01-04
    pub fn award(agency: &str, completion: &str) -> SbirAward {
        SbirAward {
            id: 1,
            vendor_id: 1,
            award_piid: "W911-21-C-0001".to_string(),
            phase: "Phase II".to_string(),
            agency: agency.to_string(),
            award_date: ymd(2021, 1, 4),
            completion_date: Some(date(completion)),
            topic: None,
            raw_data: RawRecord::default(),
        }
    }

    /// Same-vendor contract starting on `start`, no competition data
    pub fn contract(agency: &str, start: &str) -> Contract {
        Contract {
            id: 1,
            vendor_id: 1,
            piid: "N00024-23-C-0001_0_0".to_string(),
            agency: agency.to_string(),
            start_date: date(start),
            competition_details: CompetitionDetails::default(),
            naics_code: None,
            psc_code: None,
            description: None,
            raw_data: RawRecord::default(),
        }
    }
}
