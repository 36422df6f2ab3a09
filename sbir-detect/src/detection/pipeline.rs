//! Per-award detection pipeline
//!
//! Locate candidates, extract signals, score, classify and build evidence.
//! Produces unpersisted detections; persistence belongs to the coordinator.

use super::candidates::CandidateLocator;
use super::classifier::{self, ConfidenceTier};
use super::evidence::{self, EvidenceBundle};
use super::scorer;
use sbir_common::config::DetectionConfig;
use sbir_common::db::models::{Contract, NewDetection, SbirAward};
use sbir_common::Result;
use sqlx::SqliteConnection;
use uuid::Uuid;

/// A classified pair ready for persistence
#[derive(Debug, Clone)]
pub struct DetectionOutcome {
    pub detection: NewDetection,
    pub tier: ConfidenceTier,
    pub bundle: EvidenceBundle,
}

/// Result of processing one award
#[derive(Debug, Clone, Default)]
pub struct AwardOutcome {
    pub candidates_evaluated: usize,
    pub detections: Vec<DetectionOutcome>,
}

pub struct AwardPipeline<'a> {
    config: &'a DetectionConfig,
    locator: CandidateLocator<'a>,
}

impl<'a> AwardPipeline<'a> {
    pub fn new(config: &'a DetectionConfig) -> Self {
        Self {
            config,
            locator: CandidateLocator::new(config),
        }
    }

    /// Score every candidate of one award
    pub async fn process_award(
        &self,
        conn: &mut SqliteConnection,
        award: &SbirAward,
    ) -> Result<AwardOutcome> {
        let candidates = self.locator.find_candidates(conn, award).await?;

        let mut outcome = AwardOutcome {
            candidates_evaluated: candidates.len(),
            detections: Vec::new(),
        };
        for contract in &candidates {
            if let Some(detection) = self.evaluate_pair(award, contract)? {
                outcome.detections.push(detection);
            }
        }

        Ok(outcome)
    }

    /// Score and classify one pair; None when skipped or below the floor
    pub fn evaluate_pair(
        &self,
        award: &SbirAward,
        contract: &Contract,
    ) -> Result<Option<DetectionOutcome>> {
        let (signals, breakdown) = scorer::score_pair(award, contract, self.config);

        if signals.full_competition() && !self.config.features.enable_competed_contracts {
            tracing::trace!(
                award_id = award.id,
                contract_id = contract.id,
                "Skipping fully competed contract"
            );
            return Ok(None);
        }

        let Some(tier) = classifier::classify(breakdown.score, &self.config.thresholds) else {
            tracing::trace!(
                award_id = award.id,
                contract_id = contract.id,
                score = breakdown.score,
                "Below publication floor"
            );
            return Ok(None);
        };

        let bundle = evidence::build(award, contract, &signals, &breakdown, tier);
        let detection = NewDetection {
            detection_uuid: Uuid::new_v4(),
            sbir_award_id: award.id,
            contract_id: contract.id,
            likelihood_score: breakdown.score,
            confidence: tier.label().to_string(),
            evidence_bundle: bundle.to_value()?,
            detection_date: sbir_common::time::now(),
        };

        tracing::debug!(
            award_id = award.id,
            contract_id = contract.id,
            score = breakdown.score,
            tier = %tier,
            "Detection produced"
        );

        Ok(Some(DetectionOutcome {
            detection,
            tier,
            bundle,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::test_fixtures::{award, contract};

    #[test]
    fn test_sole_source_follow_on_is_high_confidence() {
        let config = DetectionConfig::default();
        let pipeline = AwardPipeline::new(&config);
        let a = award("Department of the Navy", "2022-12-31");
        let mut c = contract("Department of the Navy", "2023-01-30");
        c.competition_details.extent_competed = Some("NOT AVAILABLE FOR COMPETITION".to_string());

        let outcome = pipeline.evaluate_pair(&a, &c).unwrap().unwrap();
        assert_eq!(outcome.tier, ConfidenceTier::HighConfidence);
        assert!(outcome.detection.likelihood_score >= 0.7);
        assert_eq!(outcome.detection.confidence, "High Confidence");
        assert_eq!(outcome.detection.evidence_bundle["confidence"], "High Confidence");
    }

    #[test]
    fn test_unrelated_pair_is_discarded() {
        let config = DetectionConfig::default();
        let pipeline = AwardPipeline::new(&config);
        let a = award("Department of the Navy", "2022-12-31");
        let c = contract("Department of Energy", "2024-06-01");
        assert!(pipeline.evaluate_pair(&a, &c).unwrap().is_none());
    }

    #[test]
    fn test_competed_contracts_skipped_when_disabled() {
        let mut config = DetectionConfig::default();
        let a = award("Department of the Navy", "2022-12-31");
        let mut c = contract("Department of the Navy", "2023-01-30");
        c.competition_details.extent_competed = Some("FULL AND OPEN COMPETITION".to_string());

        assert!(AwardPipeline::new(&config).evaluate_pair(&a, &c).unwrap().is_some());

        config.features.enable_competed_contracts = false;
        assert!(AwardPipeline::new(&config).evaluate_pair(&a, &c).unwrap().is_none());
    }
}
