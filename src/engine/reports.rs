//! Management reports over risks and their action plans

use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

use crate::database::reports::{
    self as queries, EvolutionPoint, FilterOptions, MatrixRow, PlanReportRow, RiskDashboard,
};
use crate::database::Database;
use crate::engine::action_tracker::percentage;
use crate::engine::days_before;
use crate::error::{RegisterError, Result};
use crate::model::Risk;

/// Key indicators for the trailing `period_days`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Kpis {
    pub period_days: u32,
    pub new_risks: u64,
    pub assessment_changes: u64,
    pub plans_created: u64,
    pub plans_completed: u64,
    /// Plans completed in the period over plans that existed before it, %
    pub resolution_rate: f64,
}

#[derive(Debug, Clone)]
pub struct Reports {
    database: Arc<Database>,
}

impl Reports {
    pub fn new(database: Arc<Database>) -> Self {
        Self { database }
    }

    pub fn risk_dashboard(&self) -> Result<RiskDashboard> {
        let now = Utc::now();
        self.database
            .read(|conn| Ok(queries::risk_dashboard(conn, &now)?))
    }

    pub fn risk_matrix(&self) -> Result<Vec<MatrixRow>> {
        self.database.read(|conn| Ok(queries::risk_matrix(conn)?))
    }

    /// Plans of active risks, optionally narrowed to one risk
    pub fn action_plan_report(&self, risk_id: Option<i64>) -> Result<Vec<PlanReportRow>> {
        let now = Utc::now();
        self.database
            .read(|conn| Ok(queries::action_plan_report(conn, risk_id, &now)?))
    }

    pub fn kpis(&self, period_days: u32) -> Result<Kpis> {
        if period_days == 0 {
            return Err(RegisterError::validation("period_days", "must be at least 1"));
        }
        let start = days_before(Utc::now(), i64::from(period_days), "period_days")?;
        let counts = self
            .database
            .read(|conn| Ok::<_, RegisterError>(queries::period_counts(conn, &start)?))?;
        debug!(period_days, ?counts, "KPI counts");

        Ok(Kpis {
            period_days,
            new_risks: counts.new_risks,
            assessment_changes: counts.assessment_changes,
            plans_created: counts.plans_created,
            plans_completed: counts.plans_completed,
            resolution_rate: percentage(counts.plans_completed, counts.plans_before_period),
        })
    }

    /// Risks identified over the last `months` (30-day) months, by month
    /// and criticality
    pub fn criticality_evolution(&self, months: u32) -> Result<Vec<EvolutionPoint>> {
        if months == 0 {
            return Err(RegisterError::validation("months", "must be at least 1"));
        }
        let start = days_before(Utc::now(), i64::from(months) * 30, "months")?;
        self.database
            .read(|conn| Ok(queries::criticality_evolution(conn, &start)?))
    }

    /// Active risks sharing source, category or assessment with `risk_id`
    pub fn similar_risks(&self, risk_id: i64, limit: usize) -> Result<Vec<Risk>> {
        self.database.read(|conn| {
            let reference = crate::database::risks::load_risk(conn, risk_id)?
                .ok_or_else(|| RegisterError::not_found("risk", risk_id))?;
            Ok(queries::similar_risks(conn, &reference, limit)?)
        })
    }

    pub fn filter_options(&self) -> Result<FilterOptions> {
        self.database.read(|conn| Ok(queries::filter_options(conn)?))
    }
}
