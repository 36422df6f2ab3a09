//! Evidence artifacts
//!
//! One JSON document and one plain-text summary per detection, named by the
//! detection UUID. Written after the run's detections are committed.

use super::evidence::{
    AwardSnapshot, ContractSnapshot, EvidenceBundle, RiskFactor, ValidationChecklist,
};
use super::signals::CompetitionTier;
use chrono::{DateTime, Utc};
use sbir_common::config::{DetectionConfig, FeatureFlags, ScoringWeights, Thresholds, TimingWindow};
use sbir_common::db::models::NewDetection;
use sbir_common::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionMetadata {
    pub detection_uuid: Uuid,
    pub detection_date: DateTime<Utc>,
    pub likelihood_score: f64,
    pub confidence: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisSection {
    pub competition: CompetitionTier,
    pub gap_days: i64,
    pub signals: BTreeMap<String, bool>,
    pub contributions: BTreeMap<String, f64>,
    pub reason: String,
    pub risk_factors: Vec<RiskFactor>,
    pub validation: ValidationChecklist,
}

/// Run-level settings the detection was produced under
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionContext {
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub thresholds: Thresholds,
    pub weights: ScoringWeights,
    pub timing: TimingWindow,
    pub features: FeatureFlags,
}

impl SessionContext {
    pub fn new(run_id: Uuid, config: &DetectionConfig) -> Self {
        Self {
            run_id,
            generated_at: sbir_common::time::now(),
            thresholds: config.thresholds,
            weights: config.weights,
            timing: config.timing,
            features: config.features,
        }
    }
}

/// Exported evidence document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceArtifact {
    pub detection_metadata: DetectionMetadata,
    pub sbir_award: AwardSnapshot,
    pub contract: ContractSnapshot,
    pub analysis: AnalysisSection,
    pub session_context: SessionContext,
}

impl EvidenceArtifact {
    /// Build from a detection whose bundle parses as [`EvidenceBundle`]
    pub fn from_detection(detection: &NewDetection, session: &SessionContext) -> Result<Self> {
        let bundle = EvidenceBundle::from_value(&detection.evidence_bundle)?;
        Ok(Self {
            detection_metadata: DetectionMetadata {
                detection_uuid: detection.detection_uuid,
                detection_date: detection.detection_date,
                likelihood_score: detection.likelihood_score,
                confidence: detection.confidence.clone(),
            },
            sbir_award: bundle.award,
            contract: bundle.contract,
            analysis: AnalysisSection {
                competition: bundle.competition,
                gap_days: bundle.gap_days,
                signals: bundle.signals,
                contributions: bundle.contributions,
                reason: bundle.reason,
                risk_factors: bundle.risk_factors,
                validation: bundle.validation,
            },
            session_context: session.clone(),
        })
    }

    /// Human-readable companion summary
    pub fn summary_text(&self) -> String {
        let meta = &self.detection_metadata;
        let award = &self.sbir_award;
        let contract = &self.contract;
        let analysis = &self.analysis;

        let mut lines = vec![
            format!("Detection {}", meta.detection_uuid),
            format!("Confidence: {} (score {:.3})", meta.confidence, meta.likelihood_score),
            format!("Detected: {}", meta.detection_date.to_rfc3339()),
            String::new(),
            format!("Award {} ({}, {})", award.award_piid, award.phase, award.agency),
            format!(
                "  awarded {}, completed {}",
                award.award_date,
                award
                    .completion_date
                    .map(|d| d.to_string())
                    .unwrap_or_else(|| "unknown".to_string())
            ),
            format!("Contract {} ({})", contract.piid, contract.agency),
            format!(
                "  started {}, competition {}",
                contract.start_date,
                analysis.competition.as_str()
            ),
            String::new(),
            format!("Gap: {} days", analysis.gap_days),
            format!("Reason: {}", analysis.reason),
        ];

        if analysis.risk_factors.is_empty() {
            lines.push("Risk factors: none".to_string());
        } else {
            let names: Vec<String> = analysis
                .risk_factors
                .iter()
                .filter_map(|f| serde_json::to_value(f).ok())
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect();
            lines.push(format!("Risk factors: {}", names.join(", ")));
        }

        lines.push(format!("Run: {}", self.session_context.run_id));
        lines.join("\n") + "\n"
    }
}

/// Write `<uuid>.json` and `<uuid>.txt` per detection; returns the files written
pub async fn write_artifacts(
    dir: &Path,
    detections: &[NewDetection],
    session: &SessionContext,
) -> Result<Vec<PathBuf>> {
    tokio::fs::create_dir_all(dir).await?;

    let mut written = Vec::with_capacity(detections.len() * 2);
    for detection in detections {
        let artifact = EvidenceArtifact::from_detection(detection, session)?;

        let json_path = dir.join(format!("{}.json", detection.detection_uuid));
        tokio::fs::write(&json_path, serde_json::to_vec_pretty(&artifact)?).await?;
        written.push(json_path);

        let text_path = dir.join(format!("{}.txt", detection.detection_uuid));
        tokio::fs::write(&text_path, artifact.summary_text()).await?;
        written.push(text_path);
    }

    tracing::info!(
        dir = %dir.display(),
        detections = detections.len(),
        files = written.len(),
        "Evidence artifacts written"
    );

    Ok(written)
}
