//! sbir-detect library interface
//!
//! Ingestion of award and contract exports, and detection of award-to-contract
//! transitions. Exposed as a library for the binary and integration tests.

pub mod db;
pub mod detection;
pub mod ingest;
pub mod utils;

pub use detection::{DetectionCoordinator, DetectionRunSummary};
pub use ingest::{IngestStats, Ingestor};
