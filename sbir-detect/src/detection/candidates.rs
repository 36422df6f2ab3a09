//! Candidate Locator
//!
//! Contracts of the award's vendor starting inside the timing window.

use crate::db::contracts;
use chrono::{Duration, NaiveDate};
use sbir_common::config::{DetectionConfig, TimingWindow};
use sbir_common::db::models::{Contract, SbirAward};
use sbir_common::{Error, Result};
use sqlx::SqliteConnection;

/// Inclusive `[start, end]` window of contract start dates for an award
///
/// Fails with [`Error::Config`] when an offset leaves the representable date range.
pub fn candidate_window(
    award: &SbirAward,
    timing: &TimingWindow,
) -> Result<(NaiveDate, NaiveDate)> {
    let base = award.base_date();
    Ok((
        offset_date(base, timing.min_offset_days())?,
        offset_date(base, timing.max_offset_days())?,
    ))
}

fn offset_date(base: NaiveDate, days: i64) -> Result<NaiveDate> {
    Duration::try_days(days)
        .and_then(|offset| base.checked_add_signed(offset))
        .ok_or_else(|| {
            Error::Config(format!(
                "Timing window offset of {} days from {} is out of range",
                days, base
            ))
        })
}

/// Finds candidate contracts for awards
pub struct CandidateLocator<'a> {
    config: &'a DetectionConfig,
}

impl<'a> CandidateLocator<'a> {
    pub fn new(config: &'a DetectionConfig) -> Self {
        Self { config }
    }

    /// Same-vendor contracts in the window; empty for ineligible phases
    pub async fn find_candidates(
        &self,
        conn: &mut SqliteConnection,
        award: &SbirAward,
    ) -> Result<Vec<Contract>> {
        if !self.config.is_eligible_phase(&award.phase) {
            tracing::debug!(award_id = award.id, phase = %award.phase, "Phase not eligible");
            return Ok(Vec::new());
        }

        let (start, end) = candidate_window(award, &self.config.timing)?;
        let candidates = contracts::contracts_in_window(conn, award.vendor_id, start, end).await?;

        tracing::debug!(
            award_id = award.id,
            window_start = %start,
            window_end = %end,
            candidates = candidates.len(),
            "Candidates located"
        );

        Ok(candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::test_fixtures::{award, ymd};

    #[test]
    fn test_default_window_spans_720_days() {
        let a = award("Department of the Navy", "2022-12-31");
        let (start, end) = candidate_window(&a, &TimingWindow::default()).unwrap();
        assert_eq!(start, ymd(2022, 12, 31));
        assert_eq!(end, ymd(2024, 12, 20));
    }

    #[test]
    fn test_window_uses_award_date_without_completion() {
        let mut a = award("Department of the Navy", "2022-12-31");
        a.completion_date = None;
        let timing = TimingWindow {
            min_months_after_phase2: 1,
            max_months_after_phase2: 2,
        };
        let (start, end) = candidate_window(&a, &timing).unwrap();
        assert_eq!(start, a.award_date + Duration::days(30));
        assert_eq!(end, a.award_date + Duration::days(60));
    }

    #[test]
    fn test_unrepresentable_window_is_config_error() {
        let a = award("Department of the Navy", "2022-12-31");
        let timing = TimingWindow {
            min_months_after_phase2: 0,
            max_months_after_phase2: 4_000_000,
        };
        assert!(matches!(candidate_window(&a, &timing), Err(Error::Config(_))));
    }
}
