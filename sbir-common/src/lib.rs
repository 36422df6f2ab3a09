//! # SBIR Transition Common Library
//!
//! Shared code for the transition detector crates including:
//! - Entity models (vendors, awards, contracts, detections)
//! - Database initialization and schema
//! - Configuration loading and validation
//! - Date parsing helpers used by ingestion

pub mod config;
pub mod db;
pub mod error;
pub mod time;

pub use config::{Config, DetectionConfig};
pub use error::{Error, Result};
