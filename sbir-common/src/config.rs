//! Configuration loading and validation
//!
//! Single TOML file with bootstrap settings (database path, logging) and the
//! resolved detection configuration consumed by the scoring pipeline.
//!
//! # Settings Sources Priority
//!
//! 1. Command-line arguments (--database)
//! 2. Environment variables (SBIR_DATABASE_PATH)
//! 3. TOML configuration file
//! 4. Built-in defaults (code constants)
//!
//! Every section is optional. Unknown keys are rejected so that typos fail
//! at load time instead of silently falling back to a default.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Environment variable overriding `database_path`
pub const DATABASE_PATH_ENV: &str = "SBIR_DATABASE_PATH";

/// Days per month used to convert the timing window offsets
pub const DAYS_PER_MONTH: i64 = 30;

/// Largest accepted timing window offset (100 years)
pub const MAX_WINDOW_MONTHS: u32 = 1200;

/// Largest accepted run lock staleness limit (10 years)
pub const MAX_LOCK_STALE_MINUTES: u64 = 10 * 365 * 24 * 60;

/// Root configuration loaded from TOML
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Path to SQLite database file (relative or absolute)
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    /// Logging configuration (optional)
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Detection engine configuration
    #[serde(default)]
    pub detection: DetectionConfig,

    /// Ingestion configuration
    #[serde(default)]
    pub ingest: IngestConfig,

    /// Evidence artifact output
    #[serde(default)]
    pub output: OutputConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error), used when RUST_LOG is unset
    #[serde(default = "default_log_level")]
    pub level: String,
}

/// Ingestion settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct IngestConfig {
    /// Input rows per transaction
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
}

/// Evidence artifact output settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct OutputConfig {
    /// Directory receiving one JSON + one text file per detection
    #[serde(default)]
    pub evidence_dir: Option<PathBuf>,
}

/// Resolved detection configuration
///
/// Constructed once and passed explicitly to every detection component.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DetectionConfig {
    /// Award phases eligible for candidate search (exact match)
    #[serde(default = "default_eligible_phases")]
    pub eligible_phases: BTreeSet<String>,

    /// Upper bound on parallel workers
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    /// Minimum awards per worker partition
    #[serde(default = "default_min_chunk_size")]
    pub min_chunk_size: usize,

    /// Age after which an abandoned run lock may be taken over
    #[serde(default = "default_lock_stale_after_minutes")]
    pub lock_stale_after_minutes: u64,

    #[serde(default)]
    pub thresholds: Thresholds,

    #[serde(default)]
    pub weights: ScoringWeights,

    #[serde(default)]
    pub features: FeatureFlags,

    #[serde(default)]
    pub timing: TimingWindow,
}

/// Confidence tier thresholds (`likely_transition <= high_confidence`)
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Thresholds {
    #[serde(default = "default_high_confidence")]
    pub high_confidence: f64,
    #[serde(default = "default_likely_transition")]
    pub likely_transition: f64,
}

/// Per-signal weights summed by the scorer
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ScoringWeights {
    #[serde(default = "default_sole_source_bonus")]
    pub sole_source_bonus: f64,
    #[serde(default = "default_limited_competition_bonus")]
    pub limited_competition_bonus: f64,
    #[serde(default)]
    pub full_competition_bonus: f64,
    /// Maximum timing bonus, decays linearly to zero at 365 days
    #[serde(default = "default_timing_weight")]
    pub timing_weight: f64,
    #[serde(default = "default_agency_continuity")]
    pub agency_continuity: f64,
    #[serde(default = "default_department_continuity")]
    pub department_continuity: f64,
    #[serde(default = "default_cross_service_bonus")]
    pub cross_service_bonus: f64,
    /// Award topic found in contract description
    #[serde(default = "default_text_similarity")]
    pub text_similarity: f64,
    /// Literal "sbir" found in contract description
    #[serde(default = "default_sbir_mention")]
    pub sbir_mention: f64,
}

/// Optional signal families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct FeatureFlags {
    #[serde(default = "default_true")]
    pub enable_cross_service: bool,
    #[serde(default = "default_true")]
    pub enable_text_analysis: bool,
    #[serde(default = "default_true")]
    pub enable_competed_contracts: bool,
}

/// Candidate window relative to the award base date, in months
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TimingWindow {
    #[serde(default)]
    pub min_months_after_phase2: u32,
    #[serde(default = "default_max_months")]
    pub max_months_after_phase2: u32,
}

fn default_database_path() -> PathBuf {
    PathBuf::from("transition.db")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_chunk_size() -> usize {
    1000
}

fn default_eligible_phases() -> BTreeSet<String> {
    BTreeSet::from(["Phase II".to_string()])
}

fn default_max_workers() -> usize {
    8
}

fn default_min_chunk_size() -> usize {
    100
}

fn default_lock_stale_after_minutes() -> u64 {
    120
}

fn default_high_confidence() -> f64 {
    0.7
}

fn default_likely_transition() -> f64 {
    0.4
}

fn default_sole_source_bonus() -> f64 {
    0.25
}

fn default_limited_competition_bonus() -> f64 {
    0.15
}

fn default_timing_weight() -> f64 {
    0.2
}

fn default_agency_continuity() -> f64 {
    0.25
}

fn default_department_continuity() -> f64 {
    0.1
}

fn default_cross_service_bonus() -> f64 {
    0.1
}

fn default_text_similarity() -> f64 {
    0.15
}

fn default_sbir_mention() -> f64 {
    0.1
}

fn default_true() -> bool {
    true
}

fn default_max_months() -> u32 {
    24
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            logging: LoggingConfig::default(),
            detection: DetectionConfig::default(),
            ingest: IngestConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
        }
    }
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            eligible_phases: default_eligible_phases(),
            max_workers: default_max_workers(),
            min_chunk_size: default_min_chunk_size(),
            lock_stale_after_minutes: default_lock_stale_after_minutes(),
            thresholds: Thresholds::default(),
            weights: ScoringWeights::default(),
            features: FeatureFlags::default(),
            timing: TimingWindow::default(),
        }
    }
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            high_confidence: default_high_confidence(),
            likely_transition: default_likely_transition(),
        }
    }
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            sole_source_bonus: default_sole_source_bonus(),
            limited_competition_bonus: default_limited_competition_bonus(),
            full_competition_bonus: 0.0,
            timing_weight: default_timing_weight(),
            agency_continuity: default_agency_continuity(),
            department_continuity: default_department_continuity(),
            cross_service_bonus: default_cross_service_bonus(),
            text_similarity: default_text_similarity(),
            sbir_mention: default_sbir_mention(),
        }
    }
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            enable_cross_service: true,
            enable_text_analysis: true,
            enable_competed_contracts: true,
        }
    }
}

impl Default for TimingWindow {
    fn default() -> Self {
        Self {
            min_months_after_phase2: 0,
            max_months_after_phase2: default_max_months(),
        }
    }
}

impl TimingWindow {
    /// Window start offset in days (30 days per month)
    pub fn min_offset_days(&self) -> i64 {
        i64::from(self.min_months_after_phase2) * DAYS_PER_MONTH
    }

    /// Window end offset in days (30 days per month)
    pub fn max_offset_days(&self) -> i64 {
        i64::from(self.max_months_after_phase2) * DAYS_PER_MONTH
    }
}

impl Config {
    /// Load configuration from a TOML file, apply environment overrides, validate
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
        let mut config = Self::from_toml_str(&content)?;
        config.apply_env_overrides();
        config.validate()?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load from file if given, otherwise use validated defaults
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => {
                let mut config = Self::default();
                config.apply_env_overrides();
                config.validate()?;
                debug!("No config file given, using built-in defaults");
                Ok(config)
            }
        }
    }

    /// Parse TOML without environment overrides or validation
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var(DATABASE_PATH_ENV) {
            if !path.trim().is_empty() {
                info!("Database path overridden by {}", DATABASE_PATH_ENV);
                self.database_path = PathBuf::from(path);
            }
        }
    }

    /// Validate all sections; called before any ingestion or detection work
    pub fn validate(&self) -> Result<()> {
        if self.ingest.chunk_size == 0 {
            return Err(Error::Config("ingest.chunk_size must be at least 1".to_string()));
        }
        self.detection.validate()
    }
}

impl DetectionConfig {
    /// Validate ordering and range constraints
    pub fn validate(&self) -> Result<()> {
        let t = &self.thresholds;
        for (name, value) in [
            ("high_confidence", t.high_confidence),
            ("likely_transition", t.likely_transition),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(Error::Config(format!(
                    "thresholds.{} must be within [0, 1], got {}",
                    name, value
                )));
            }
        }
        if t.likely_transition > t.high_confidence {
            return Err(Error::Config(format!(
                "thresholds.likely_transition ({}) must not exceed thresholds.high_confidence ({})",
                t.likely_transition, t.high_confidence
            )));
        }

        let w = &self.weights;
        for (name, value) in [
            ("sole_source_bonus", w.sole_source_bonus),
            ("limited_competition_bonus", w.limited_competition_bonus),
            ("full_competition_bonus", w.full_competition_bonus),
            ("timing_weight", w.timing_weight),
            ("agency_continuity", w.agency_continuity),
            ("department_continuity", w.department_continuity),
            ("cross_service_bonus", w.cross_service_bonus),
            ("text_similarity", w.text_similarity),
            ("sbir_mention", w.sbir_mention),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(Error::Config(format!(
                    "weights.{} must be a finite non-negative number, got {}",
                    name, value
                )));
            }
        }

        if self.timing.min_months_after_phase2 >= self.timing.max_months_after_phase2 {
            return Err(Error::Config(format!(
                "timing.min_months_after_phase2 ({}) must be less than timing.max_months_after_phase2 ({})",
                self.timing.min_months_after_phase2, self.timing.max_months_after_phase2
            )));
        }
        if self.timing.max_months_after_phase2 > MAX_WINDOW_MONTHS {
            return Err(Error::Config(format!(
                "timing.max_months_after_phase2 must be at most {}, got {}",
                MAX_WINDOW_MONTHS, self.timing.max_months_after_phase2
            )));
        }
        if !(1..=MAX_LOCK_STALE_MINUTES).contains(&self.lock_stale_after_minutes) {
            return Err(Error::Config(format!(
                "detection.lock_stale_after_minutes must be within [1, {}], got {}",
                MAX_LOCK_STALE_MINUTES, self.lock_stale_after_minutes
            )));
        }

        if self.eligible_phases.is_empty() {
            return Err(Error::Config("eligible_phases must not be empty".to_string()));
        }
        if self.max_workers == 0 {
            return Err(Error::Config("detection.max_workers must be at least 1".to_string()));
        }
        if self.min_chunk_size == 0 {
            return Err(Error::Config("detection.min_chunk_size must be at least 1".to_string()));
        }

        Ok(())
    }

    /// Lock age after which another run may take it over
    pub fn lock_stale_after(&self) -> Result<chrono::Duration> {
        i64::try_from(self.lock_stale_after_minutes)
            .ok()
            .and_then(chrono::Duration::try_minutes)
            .ok_or_else(|| {
                Error::Config(format!(
                    "detection.lock_stale_after_minutes out of range: {}",
                    self.lock_stale_after_minutes
                ))
            })
    }

    /// True when the phase label is in the eligible set
    pub fn is_eligible_phase(&self, phase: &str) -> bool {
        self.eligible_phases.contains(phase)
    }
}
