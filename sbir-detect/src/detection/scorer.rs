//! Scorer
//!
//! Additive likelihood score over extracted signals. Each true signal adds
//! its configured weight, the timing bonus decays linearly over the first
//! year, and the sum saturates at 1.0.

use super::signals::{self, Signals};
use sbir_common::config::{DetectionConfig, ScoringWeights};
use sbir_common::db::models::{Contract, SbirAward};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Gap after which the timing bonus reaches zero
pub const TIMING_DECAY_DAYS: i64 = 365;

/// Score with the per-signal contributions that produced it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    /// Clamped total in [0, 1]
    pub score: f64,
    /// Unclamped sum of contributions
    pub raw_total: f64,
    /// Weight contributed by each true signal, plus `timing` when positive
    pub contributions: BTreeMap<String, f64>,
}

/// Timing bonus for a gap in days
///
/// Zero for negative gaps (contract started first) and gaps past one year.
pub fn timing_bonus(gap_days: i64, timing_weight: f64) -> f64 {
    if !(0..=TIMING_DECAY_DAYS).contains(&gap_days) {
        return 0.0;
    }
    timing_weight * (1.0 - gap_days as f64 / TIMING_DECAY_DAYS as f64)
}

/// Score with contributions
pub fn score_breakdown(signals: &Signals, weights: &ScoringWeights) -> ScoreBreakdown {
    let mut contributions = BTreeMap::new();

    let weighted = [
        ("same_agency", signals.same_agency, weights.agency_continuity),
        ("same_department", signals.same_department, weights.department_continuity),
        ("gsa_reseller", signals.gsa_reseller, weights.cross_service_bonus),
        ("sole_source", signals.sole_source(), weights.sole_source_bonus),
        (
            "limited_competition",
            signals.limited_competition(),
            weights.limited_competition_bonus,
        ),
        (
            "full_competition",
            signals.full_competition(),
            weights.full_competition_bonus,
        ),
        ("sbir_in_description", signals.sbir_in_description, weights.sbir_mention),
        ("topic_in_description", signals.topic_in_description, weights.text_similarity),
    ];
    for (name, present, weight) in weighted {
        if present {
            contributions.insert(name.to_string(), weight);
        }
    }

    let timing = timing_bonus(signals.gap_days, weights.timing_weight);
    if timing > 0.0 {
        contributions.insert("timing".to_string(), timing);
    }

    let raw_total: f64 = contributions.values().sum();

    ScoreBreakdown {
        score: raw_total.clamp(0.0, 1.0),
        raw_total,
        contributions,
    }
}

/// Clamped score only
pub fn score(signals: &Signals, weights: &ScoringWeights) -> f64 {
    score_breakdown(signals, weights).score
}

/// Extract signals and score one pair
pub fn score_pair(
    award: &SbirAward,
    contract: &Contract,
    config: &DetectionConfig,
) -> (Signals, ScoreBreakdown) {
    let signals = signals::extract(award, contract, &config.features);
    let breakdown = score_breakdown(&signals, &config.weights);
    (signals, breakdown)
}
