//! Signal Extractor
//!
//! Evidence signals for one (award, contract) pair. Agency and competition
//! classification are pure keyword-table lookups over free text.

use sbir_common::config::FeatureFlags;
use sbir_common::db::models::{Contract, SbirAward};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Agency keywords that place an agency in the defense department
const DEFENSE_KEYWORDS: &[&str] = &[
    "DEFENSE",
    "DOD",
    "ARMY",
    "NAVY",
    "AIR FORCE",
    "DARPA",
    "MISSILE DEFENSE",
    "SPECIAL OPERATIONS",
    "DEFENSE LOGISTICS",
    "DEFENSE HEALTH",
];

/// Keyword buckets checked after the defense bucket, in order
const DEPARTMENT_KEYWORDS: &[(&str, &[&str])] = &[
    ("NASA", &["NASA", "AERONAUTICS AND SPACE"]),
    ("DOE", &["ENERGY"]),
    ("GSA", &["GSA", "GENERAL SERVICES"]),
    ("DHS", &["HOMELAND"]),
];

const GSA_KEYWORDS: &[&str] = &["GSA", "GENERAL SERVICES"];

/// Competition phrases, first match wins
const COMPETITION_PHRASES: &[(&str, CompetitionTier)] = &[
    ("NOT AVAILABLE FOR COMPETITION", CompetitionTier::SoleSource),
    ("NOT COMPETED", CompetitionTier::LimitedCompetition),
    ("LIMITED", CompetitionTier::LimitedCompetition),
    ("FULL AND OPEN", CompetitionTier::FullCompetition),
];

/// Competition tier parsed from the extent-competed text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompetitionTier {
    SoleSource,
    LimitedCompetition,
    FullCompetition,
    Unknown,
}

impl CompetitionTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompetitionTier::SoleSource => "sole_source",
            CompetitionTier::LimitedCompetition => "limited_competition",
            CompetitionTier::FullCompetition => "full_competition",
            CompetitionTier::Unknown => "unknown",
        }
    }
}

/// Signals for one pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signals {
    pub same_agency: bool,
    pub same_department: bool,
    pub gsa_reseller: bool,
    pub competition: CompetitionTier,
    pub sbir_in_description: bool,
    pub topic_in_description: bool,
    /// Contract start minus award base date; negative when the contract started first
    pub gap_days: i64,
}

impl Signals {
    pub fn sole_source(&self) -> bool {
        self.competition == CompetitionTier::SoleSource
    }

    pub fn limited_competition(&self) -> bool {
        self.competition == CompetitionTier::LimitedCompetition
    }

    pub fn full_competition(&self) -> bool {
        self.competition == CompetitionTier::FullCompetition
    }

    /// Boolean signal map keyed by signal name
    pub fn flags(&self) -> BTreeMap<&'static str, bool> {
        BTreeMap::from([
            ("same_agency", self.same_agency),
            ("same_department", self.same_department),
            ("gsa_reseller", self.gsa_reseller),
            ("sole_source", self.sole_source()),
            ("limited_competition", self.limited_competition()),
            ("full_competition", self.full_competition()),
            ("sbir_in_description", self.sbir_in_description),
            ("topic_in_description", self.topic_in_description),
        ])
    }
}

fn mentions_any(text: &str, keywords: &[&str]) -> bool {
    let upper = text.to_uppercase();
    keywords.iter().any(|keyword| upper.contains(keyword))
}

/// True when the agency names a defense branch
pub fn is_defense_agency(agency: &str) -> bool {
    mentions_any(agency, DEFENSE_KEYWORDS)
}

/// True when the agency names GSA
pub fn is_gsa_agency(agency: &str) -> bool {
    mentions_any(agency, GSA_KEYWORDS)
}

/// Department bucket for an agency name
///
/// Unknown agencies fall back to their first word, so two sub-agencies of
/// the same department still compare equal when named consistently.
pub fn department_of(agency: &str) -> String {
    if is_defense_agency(agency) {
        return "DOD".to_string();
    }
    for (department, keywords) in DEPARTMENT_KEYWORDS {
        if mentions_any(agency, keywords) {
            return department.to_string();
        }
    }
    agency
        .split_whitespace()
        .next()
        .map(|token| token.to_uppercase())
        .unwrap_or_default()
}

/// Competition tier from free text
pub fn classify_competition(extent_competed: Option<&str>) -> CompetitionTier {
    let Some(text) = extent_competed else {
        return CompetitionTier::Unknown;
    };
    let upper = text.to_uppercase();
    COMPETITION_PHRASES
        .iter()
        .find(|(phrase, _)| upper.contains(phrase))
        .map(|(_, tier)| *tier)
        .unwrap_or(CompetitionTier::Unknown)
}

/// Case-insensitive agency equality
pub fn same_agency(a: &str, b: &str) -> bool {
    let (a, b) = (a.trim(), b.trim());
    !a.is_empty() && a.to_lowercase() == b.to_lowercase()
}

/// Extract all signals for a pair
pub fn extract(award: &SbirAward, contract: &Contract, features: &FeatureFlags) -> Signals {
    let same_department = features.enable_cross_service && {
        let award_dept = department_of(&award.agency);
        !award_dept.is_empty() && award_dept == department_of(&contract.agency)
    };
    let gsa_reseller = features.enable_cross_service
        && is_gsa_agency(&contract.agency)
        && is_defense_agency(&award.agency);

    let (sbir_in_description, topic_in_description) = if features.enable_text_analysis {
        let text = contract.free_text().to_lowercase();
        let topic_match = award
            .topic
            .as_deref()
            .map(str::trim)
            .filter(|topic| !topic.is_empty())
            .map(|topic| text.contains(&topic.to_lowercase()))
            .unwrap_or(false);
        (text.contains("sbir"), topic_match)
    } else {
        (false, false)
    };

    Signals {
        same_agency: same_agency(&award.agency, &contract.agency),
        same_department,
        gsa_reseller,
        competition: classify_competition(contract.competition_details.extent_competed.as_deref()),
        sbir_in_description,
        topic_in_description,
        gap_days: (contract.start_date - award.base_date()).num_days(),
    }
}
