//! Action Plan Tracker
//!
//! Plans move through `NotStarted -> InProgress -> Completed`, with
//! `Cancelled` reachable from any open state. `Overdue` is never stored:
//! it is derived from the end date on every read and write.

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::database::{self, action_plans, risks, Database};
use crate::engine::days_before;
use crate::error::{RegisterError, Result};
use crate::model::{
    is_overdue_at, ActionPlan, ActionPlanChanges, ActionPlanFilter, ActionPlanUpdate,
    ActionStatus, Actor, NewActionPlan,
};

/// Note recorded on a progress update when the caller gives none
pub const DEFAULT_UPDATE_NOTE: &str = "Automatic update";
pub const DEFAULT_CURRENCY: &str = "BRL";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResponsibleCount {
    pub person: String,
    pub plans: u64,
}

/// Portfolio view of every action plan
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionPlanDashboard {
    /// Keyed by effective status label
    pub by_status: BTreeMap<String, u64>,
    /// Busiest people first
    pub by_responsible: Vec<ResponsibleCount>,
    pub total_overdue: u64,
    pub completed: u64,
    /// Percentage of completed plans finished by their end date, one decimal
    pub on_time_rate: f64,
}

/// `part / whole` as a percentage rounded to one decimal; 0 for an empty whole
pub fn percentage(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    (part as f64 / whole as f64 * 1000.0).round() / 10.0
}

fn check_schedule(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Result<()> {
    if let (Some(start), Some(end)) = (start, end) {
        if end < start {
            return Err(RegisterError::validation("end_date", "must not precede start_date"));
        }
    }
    Ok(())
}

fn check_cost(field: &'static str, cost: Option<f64>) -> Result<()> {
    match cost {
        Some(c) if !c.is_finite() || c < 0.0 => {
            Err(RegisterError::validation(field, "must be a non-negative amount"))
        }
        _ => Ok(()),
    }
}

fn conflict(conn: &Connection, id: i64, expected: i64) -> Result<RegisterError> {
    let actual = action_plans::plan_version(conn, id)?
        .ok_or_else(|| RegisterError::not_found("action plan", id))?;
    Ok(RegisterError::Conflict {
        entity: "action plan",
        id,
        expected,
        actual,
    })
}

fn fresh(mut plans: Vec<ActionPlan>, now: DateTime<Utc>) -> Vec<ActionPlan> {
    for plan in &mut plans {
        plan.refresh_overdue(now);
    }
    plans
}

/// Action plan lifecycle and monitoring
#[derive(Debug, Clone)]
pub struct ActionPlanTracker {
    database: Arc<Database>,
}

impl ActionPlanTracker {
    pub fn new(database: Arc<Database>) -> Self {
        Self { database }
    }

    /// Add a plan to an active risk
    pub fn create(&self, risk_id: i64, new: NewActionPlan, actor: &Actor) -> Result<ActionPlan> {
        if new.description.trim().is_empty() {
            return Err(RegisterError::validation("description", "must not be empty"));
        }
        check_schedule(new.start_date, new.end_date)?;
        check_cost("estimated_cost", new.estimated_cost)?;

        let plan = self.database.transaction(|tx| -> Result<ActionPlan> {
            let risk = risks::load_risk(tx, risk_id)?
                .ok_or_else(|| RegisterError::not_found("risk", risk_id))?;
            if !risk.active {
                return Err(RegisterError::validation(
                    "risk_id",
                    format!("risk {risk_id} is inactive"),
                ));
            }

            let now = database::now();
            let status = ActionStatus::NotStarted;
            let mut plan = ActionPlan {
                id: 0,
                risk_id,
                description: new.description.trim().to_string(),
                responsible_area: new.responsible_area.clone(),
                responsible_person: new.responsible_person.clone(),
                implementation_site: new.implementation_site.clone(),
                implementation_method: new.implementation_method.clone(),
                methodology: new.methodology.clone(),
                required_resources: new.required_resources.clone(),
                start_date: new.start_date,
                end_date: new.end_date,
                estimated_cost: new.estimated_cost,
                actual_cost: None,
                currency: new
                    .currency
                    .as_deref()
                    .map(str::trim)
                    .filter(|c| !c.is_empty())
                    .unwrap_or(DEFAULT_CURRENCY)
                    .to_uppercase(),
                status,
                completion_percent: 0,
                is_overdue: is_overdue_at(new.end_date, status, now),
                monitoring_type: new.monitoring_type,
                monitoring_notes: new.monitoring_notes.clone(),
                effective: None,
                effectiveness_justification: None,
                created_by: actor.id.clone(),
                created_at: now,
                updated_by: None,
                updated_at: now,
                version: 1,
            };
            plan.id = action_plans::insert_plan(tx, &plan)?;
            Ok(plan)
        })?;

        info!(plan_id = plan.id, risk_id, actor = %actor.id, "Action plan created");
        Ok(plan)
    }

    /// Apply a partial update.
    ///
    /// A status or completion change writes one progress record (when
    /// `record_history` is set) in the same transaction as the update.
    /// Moving to `Completed` without an explicit completion sets it to 100.
    /// Completion is frozen once a plan is completed or cancelled, and a
    /// note or evidence without a recorded change is rejected.
    pub fn update(&self, id: i64, changes: ActionPlanChanges, actor: &Actor) -> Result<ActionPlan> {
        if changes.is_empty() {
            return Err(RegisterError::validation("changes", "no fields to update"));
        }
        if let Some(description) = &changes.description {
            if description.trim().is_empty() {
                return Err(RegisterError::validation("description", "must not be empty"));
            }
        }
        if let Some(percent) = changes.completion_percent {
            if percent > 100 {
                return Err(RegisterError::validation(
                    "completion_percent",
                    format!("{percent} is outside 0..=100"),
                ));
            }
        }
        if changes.status == Some(ActionStatus::Overdue) {
            return Err(RegisterError::validation(
                "status",
                "Overdue is derived from the end date and cannot be set",
            ));
        }
        check_cost("estimated_cost", changes.estimated_cost)?;
        check_cost("actual_cost", changes.actual_cost)?;

        let (plan, update) = self.database.transaction(|tx| -> Result<(ActionPlan, Option<ActionPlanUpdate>)> {
            let mut plan = action_plans::load_plan(tx, id)?
                .ok_or_else(|| RegisterError::not_found("action plan", id))?;
            if let Some(expected) = changes.expected_version {
                if expected != plan.version {
                    return Err(RegisterError::Conflict {
                        entity: "action plan",
                        id,
                        expected,
                        actual: plan.version,
                    });
                }
            }

            let prior_status = plan.status;
            let prior_percent = plan.completion_percent;
            let prior_version = plan.version;

            if let Some(next) = changes.status {
                if !prior_status.can_transition_to(next) {
                    return Err(RegisterError::validation(
                        "status",
                        format!("cannot move from {prior_status} to {next}"),
                    ));
                }
                plan.status = next;
                if next == ActionStatus::Completed
                    && prior_status != ActionStatus::Completed
                    && changes.completion_percent.is_none()
                {
                    plan.completion_percent = 100;
                }
            }
            if prior_status.is_terminal() {
                if let Some(percent) = changes.completion_percent.filter(|p| *p != prior_percent) {
                    return Err(RegisterError::validation(
                        "completion_percent",
                        format!("cannot change to {percent} on a {prior_status} plan"),
                    ));
                }
            }
            if let Some(percent) = changes.completion_percent {
                plan.completion_percent = percent;
            }
            if let Some(description) = &changes.description {
                plan.description = description.trim().to_string();
            }
            if let Some(area) = &changes.responsible_area {
                plan.responsible_area = Some(area.clone());
            }
            if let Some(person) = &changes.responsible_person {
                plan.responsible_person = Some(person.clone());
            }
            if let Some(site) = &changes.implementation_site {
                plan.implementation_site = Some(site.clone());
            }
            if let Some(method) = &changes.implementation_method {
                plan.implementation_method = Some(method.clone());
            }
            if let Some(methodology) = &changes.methodology {
                plan.methodology = Some(methodology.clone());
            }
            if let Some(resources) = &changes.required_resources {
                plan.required_resources = Some(resources.clone());
            }
            if let Some(start) = changes.start_date {
                plan.start_date = Some(start);
            }
            if let Some(end) = changes.end_date {
                plan.end_date = Some(end);
            }
            if let Some(cost) = changes.estimated_cost {
                plan.estimated_cost = Some(cost);
            }
            if let Some(cost) = changes.actual_cost {
                plan.actual_cost = Some(cost);
            }
            if let Some(kind) = changes.monitoring_type {
                plan.monitoring_type = kind;
            }
            if let Some(notes) = &changes.monitoring_notes {
                plan.monitoring_notes = Some(notes.clone());
            }
            if let Some(effective) = changes.effective {
                plan.effective = Some(effective);
            }
            if let Some(justification) = &changes.effectiveness_justification {
                plan.effectiveness_justification = Some(justification.clone());
            }
            check_schedule(plan.start_date, plan.end_date)?;

            let now = database::now();
            let progressed = plan.status != prior_status || plan.completion_percent != prior_percent;
            if changes.has_narrative() && !(changes.record_history && progressed) {
                return Err(RegisterError::validation(
                    "note",
                    "progress narrative needs a recorded status or completion change",
                ));
            }
            let mut update = None;
            if changes.record_history && progressed {
                let mut entry = ActionPlanUpdate {
                    id: 0,
                    plan_id: id,
                    prior_status,
                    new_status: plan.status,
                    prior_percent,
                    new_percent: plan.completion_percent,
                    note: changes
                        .note
                        .as_deref()
                        .map(str::trim)
                        .filter(|n| !n.is_empty())
                        .unwrap_or(DEFAULT_UPDATE_NOTE)
                        .to_string(),
                    obstacles: changes.obstacles.clone(),
                    solutions: changes.solutions.clone(),
                    evidence: changes.evidence.clone(),
                    updated_by: actor.id.clone(),
                    updated_at: now,
                };
                entry.id = action_plans::insert_plan_update(tx, &entry)?;
                update = Some(entry);
            }

            plan.refresh_overdue(now);
            plan.updated_by = Some(actor.id.clone());
            plan.updated_at = now;
            plan.version = prior_version + 1;
            if action_plans::save_plan(tx, &plan, prior_version)? == 0 {
                return Err(conflict(tx, id, prior_version)?);
            }
            Ok((plan, update))
        })?;

        match update {
            Some(entry) => info!(
                plan_id = id,
                actor = %actor.id,
                status = %entry.new_status,
                completion = entry.new_percent,
                "Action plan progressed"
            ),
            None => info!(plan_id = id, actor = %actor.id, "Action plan updated"),
        }
        Ok(plan)
    }

    pub fn get(&self, id: i64) -> Result<Option<ActionPlan>> {
        let now = database::now();
        let plan = self
            .database
            .read(|conn| Ok::<_, RegisterError>(action_plans::load_plan(conn, id)?))?;
        Ok(plan.map(|mut plan| {
            plan.refresh_overdue(now);
            plan
        }))
    }

    pub fn list_for_risk(&self, risk_id: i64) -> Result<Vec<ActionPlan>> {
        let plans = self
            .database
            .read(|conn| Ok::<_, RegisterError>(action_plans::plans_for_risk(conn, risk_id)?))?;
        Ok(fresh(plans, database::now()))
    }

    /// Progress history of a plan, oldest first
    pub fn history(&self, plan_id: i64) -> Result<Vec<ActionPlanUpdate>> {
        self.database
            .read(|conn| Ok(action_plans::plan_updates_for(conn, plan_id)?))
    }

    pub fn list(&self, filter: &ActionPlanFilter) -> Result<Vec<ActionPlan>> {
        let now = database::now();
        let plans = self
            .database
            .read(|conn| Ok::<_, RegisterError>(action_plans::list_plans(conn, filter, &now)?))?;
        Ok(fresh(plans, now))
    }

    /// Open plans whose end date is at least `tolerance_days` behind now,
    /// earliest end date first
    pub fn list_overdue(&self, tolerance_days: i64) -> Result<Vec<ActionPlan>> {
        if tolerance_days < 0 {
            return Err(RegisterError::validation("tolerance_days", "must not be negative"));
        }
        let now = database::now();
        let cutoff = days_before(now, tolerance_days, "tolerance_days")?;
        let plans = self
            .database
            .read(|conn| Ok::<_, RegisterError>(action_plans::overdue_plans(conn, &cutoff)?))?;
        debug!(count = plans.len(), tolerance_days, "Overdue plans listed");
        Ok(fresh(plans, now))
    }

    /// Persist the overdue flag of every plan as of now
    pub fn refresh_overdue_flags(&self) -> Result<usize> {
        let now = database::now();
        let flipped = self
            .database
            .transaction(|tx| Ok::<_, RegisterError>(action_plans::refresh_overdue_flags(tx, &now)?))?;
        if flipped > 0 {
            info!(flipped, "Overdue flags refreshed");
        }
        Ok(flipped)
    }

    pub fn dashboard(&self, top_n: usize) -> Result<ActionPlanDashboard> {
        let now = database::now();
        let (by_status, responsible, (completed, on_time)) = self.database.read(|conn| {
            Ok::<_, RegisterError>((
                action_plans::count_by_effective_status(conn, &now)?,
                action_plans::top_responsible(conn, top_n)?,
                action_plans::completion_counts(conn)?,
            ))
        })?;

        let total_overdue = by_status
            .get(ActionStatus::Overdue.as_str())
            .copied()
            .unwrap_or(0);

        Ok(ActionPlanDashboard {
            by_status,
            by_responsible: responsible
                .into_iter()
                .map(|(person, plans)| ResponsibleCount { person, plans })
                .collect(),
            total_overdue,
            completed,
            on_time_rate: percentage(on_time, completed),
        })
    }
}
