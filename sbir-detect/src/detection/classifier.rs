//! Classifier
//!
//! Maps a score to a confidence tier. Scores under the publication floor
//! produce no tier and the pair is discarded.

use sbir_common::config::Thresholds;
use serde::{Deserialize, Serialize};

/// Scores below this are never published
pub const PUBLICATION_FLOOR: f64 = 0.2;

/// Confidence tier of a published detection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ConfidenceTier {
    #[serde(rename = "High Confidence")]
    HighConfidence,
    #[serde(rename = "Likely Transition")]
    LikelyTransition,
    #[serde(rename = "Possible Transition")]
    PossibleTransition,
}

impl ConfidenceTier {
    /// Label stored in `detections.confidence`
    pub fn label(&self) -> &'static str {
        match self {
            ConfidenceTier::HighConfidence => "High Confidence",
            ConfidenceTier::LikelyTransition => "Likely Transition",
            ConfidenceTier::PossibleTransition => "Possible Transition",
        }
    }

    /// Inverse of [`ConfidenceTier::label`]
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "High Confidence" => Some(ConfidenceTier::HighConfidence),
            "Likely Transition" => Some(ConfidenceTier::LikelyTransition),
            "Possible Transition" => Some(ConfidenceTier::PossibleTransition),
            _ => None,
        }
    }
}

impl std::fmt::Display for ConfidenceTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Tier for a score, or None below the floor
pub fn classify(score: f64, thresholds: &Thresholds) -> Option<ConfidenceTier> {
    if score < PUBLICATION_FLOOR {
        return None;
    }
    if score >= thresholds.high_confidence {
        Some(ConfidenceTier::HighConfidence)
    } else if score >= thresholds.likely_transition {
        Some(ConfidenceTier::LikelyTransition)
    } else {
        Some(ConfidenceTier::PossibleTransition)
    }
}
