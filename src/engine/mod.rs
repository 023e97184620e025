//! Risk register services

use chrono::{DateTime, Duration, Utc};

use crate::error::{RegisterError, Result};

pub mod action_tracker;
pub mod criticality;
pub mod reports;
pub mod risk_manager;

pub use action_tracker::{ActionPlanDashboard, ActionPlanTracker, ResponsibleCount};
pub use criticality::{score, score_labels, LevelPolicy};
pub use reports::{Kpis, Reports};
pub use risk_manager::RiskManager;

/// `now` moved back by `days`, or a validation error on `field` when the
/// result falls outside the representable calendar
pub(crate) fn days_before(now: DateTime<Utc>, days: i64, field: &'static str) -> Result<DateTime<Utc>> {
    Duration::try_days(days)
        .and_then(|span| now.checked_sub_signed(span))
        .ok_or_else(|| RegisterError::validation(field, format!("{days} days is out of range")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_days_before_rejects_out_of_range_spans() {
        let now = Utc::now();
        assert_eq!(days_before(now, 3, "days").unwrap(), now - Duration::days(3));
        assert!(days_before(now, 200_000_000, "days").is_err());
        assert!(days_before(now, i64::MAX, "days").is_err());
    }
}
