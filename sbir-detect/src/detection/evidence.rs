//! Evidence Builder
//!
//! Self-contained record of why a pair was linked. The bundle denormalizes
//! the award and contract fields it cites so it stays readable after the
//! source rows change.

use super::classifier::{ConfidenceTier, PUBLICATION_FLOOR};
use super::scorer::ScoreBreakdown;
use super::signals::{CompetitionTier, Signals};
use chrono::NaiveDate;
use sbir_common::db::models::{Contract, SbirAward};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Gaps shorter than this are flagged as suspiciously quick
pub const SHORT_GAP_DAYS: i64 = 30;

/// Gaps longer than this (three years) are flagged as weakly connected
pub const LONG_GAP_DAYS: i64 = 1095;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AwardSnapshot {
    pub id: i64,
    pub vendor_id: i64,
    pub award_piid: String,
    pub phase: String,
    pub agency: String,
    pub award_date: NaiveDate,
    pub completion_date: Option<NaiveDate>,
    pub topic: Option<String>,
}

impl From<&SbirAward> for AwardSnapshot {
    fn from(award: &SbirAward) -> Self {
        Self {
            id: award.id,
            vendor_id: award.vendor_id,
            award_piid: award.award_piid.clone(),
            phase: award.phase.clone(),
            agency: award.agency.clone(),
            award_date: award.award_date,
            completion_date: award.completion_date,
            topic: award.topic.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractSnapshot {
    pub id: i64,
    pub vendor_id: i64,
    pub piid: String,
    pub agency: String,
    pub start_date: NaiveDate,
    pub extent_competed: Option<String>,
    pub pricing_type: Option<String>,
    pub naics_code: Option<String>,
    pub psc_code: Option<String>,
    pub description: Option<String>,
}

impl From<&Contract> for ContractSnapshot {
    fn from(contract: &Contract) -> Self {
        Self {
            id: contract.id,
            vendor_id: contract.vendor_id,
            piid: contract.piid.clone(),
            agency: contract.agency.clone(),
            start_date: contract.start_date,
            extent_competed: contract.competition_details.extent_competed.clone(),
            pricing_type: contract.competition_details.pricing_type.clone(),
            naics_code: contract.naics_code.clone(),
            psc_code: contract.psc_code.clone(),
            description: contract.description.clone(),
        }
    }
}

/// Caveats a reviewer should weigh against the score
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskFactor {
    VeryShortGap,
    VeryLongGap,
    CrossAgency,
    MissingTopic,
    MissingNaics,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationChecklist {
    pub dates_present: bool,
    pub date_order_valid: bool,
    pub score_above_floor: bool,
}

impl ValidationChecklist {
    pub fn all_passed(&self) -> bool {
        self.dates_present && self.date_order_valid && self.score_above_floor
    }
}

/// JSON stored in `detections.evidence_bundle`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceBundle {
    pub award: AwardSnapshot,
    pub contract: ContractSnapshot,
    pub score: f64,
    pub confidence: ConfidenceTier,
    pub competition: CompetitionTier,
    pub gap_days: i64,
    pub signals: BTreeMap<String, bool>,
    pub contributions: BTreeMap<String, f64>,
    pub reason: String,
    pub risk_factors: Vec<RiskFactor>,
    pub validation: ValidationChecklist,
}

impl EvidenceBundle {
    /// Serialize for storage
    pub fn to_value(&self) -> sbir_common::Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Parse a stored bundle
    pub fn from_value(value: &serde_json::Value) -> sbir_common::Result<Self> {
        Ok(serde_json::from_value(value.clone())?)
    }
}

fn risk_factors(award: &SbirAward, contract: &Contract, signals: &Signals) -> Vec<RiskFactor> {
    let mut factors = Vec::new();
    if (0..SHORT_GAP_DAYS).contains(&signals.gap_days) {
        factors.push(RiskFactor::VeryShortGap);
    }
    if signals.gap_days > LONG_GAP_DAYS {
        factors.push(RiskFactor::VeryLongGap);
    }
    if !signals.same_agency {
        factors.push(RiskFactor::CrossAgency);
    }
    if award.topic.as_deref().map_or(true, |t| t.trim().is_empty()) {
        factors.push(RiskFactor::MissingTopic);
    }
    if contract.naics_code.is_none() {
        factors.push(RiskFactor::MissingNaics);
    }
    factors
}

/// One-line explanation naming the strongest contributions
pub fn reason_text(tier: ConfidenceTier, breakdown: &ScoreBreakdown, gap_days: i64) -> String {
    let mut ranked: Vec<(&String, &f64)> = breakdown
        .contributions
        .iter()
        .filter(|(_, weight)| **weight > 0.0)
        .collect();
    ranked.sort_by(|a, b| b.1.total_cmp(a.1).then_with(|| a.0.cmp(b.0)));

    let drivers = if ranked.is_empty() {
        "no weighted signals".to_string()
    } else {
        ranked
            .iter()
            .map(|(name, weight)| format!("{} (+{:.2})", name, weight))
            .collect::<Vec<_>>()
            .join(", ")
    };

    format!(
        "{} at {:.3}: contract started {} days after the award base date; drivers: {}",
        tier.label(),
        breakdown.score,
        gap_days,
        drivers
    )
}

/// Assemble the bundle for a classified pair
pub fn build(
    award: &SbirAward,
    contract: &Contract,
    signals: &Signals,
    breakdown: &ScoreBreakdown,
    tier: ConfidenceTier,
) -> EvidenceBundle {
    let validation = ValidationChecklist {
        // Start and award dates are mandatory; completion is the nullable one
        dates_present: award.completion_date.is_some(),
        date_order_valid: signals.gap_days >= 0,
        score_above_floor: breakdown.score >= PUBLICATION_FLOOR,
    };

    EvidenceBundle {
        award: AwardSnapshot::from(award),
        contract: ContractSnapshot::from(contract),
        score: breakdown.score,
        confidence: tier,
        competition: signals.competition,
        gap_days: signals.gap_days,
        signals: signals
            .flags()
            .into_iter()
            .map(|(name, value)| (name.to_string(), value))
            .collect(),
        contributions: breakdown.contributions.clone(),
        reason: reason_text(tier, breakdown, signals.gap_days),
        risk_factors: risk_factors(award, contract, signals),
        validation,
    }
}
