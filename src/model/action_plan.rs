//! Mitigation action plans and their progress history

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::levels::{ActionStatus, MonitoringType};

/// A mitigation action owned by one risk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionPlan {
    pub id: i64,
    pub risk_id: i64,
    pub description: String,
    pub responsible_area: Option<String>,
    pub responsible_person: Option<String>,
    pub implementation_site: Option<String>,
    pub implementation_method: Option<String>,
    pub methodology: Option<String>,
    pub required_resources: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub estimated_cost: Option<f64>,
    pub actual_cost: Option<f64>,
    pub currency: String,
    pub status: ActionStatus,
    pub completion_percent: u8,
    /// Derived from `end_date` and `status`; refreshed on every read and write
    pub is_overdue: bool,
    pub monitoring_type: MonitoringType,
    pub monitoring_notes: Option<String>,
    pub effective: Option<bool>,
    pub effectiveness_justification: Option<String>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_by: Option<String>,
    pub updated_at: DateTime<Utc>,
    pub version: i64,
}

/// A plan is overdue when its end date has passed and it is still open
pub fn is_overdue_at(end_date: Option<DateTime<Utc>>, status: ActionStatus, now: DateTime<Utc>) -> bool {
    match end_date {
        Some(end) => end < now && !status.is_terminal(),
        None => false,
    }
}

impl ActionPlan {
    /// Recompute the derived overdue flag against `now`
    pub fn refresh_overdue(&mut self, now: DateTime<Utc>) {
        self.is_overdue = is_overdue_at(self.end_date, self.status, now);
    }

    /// Stored status, or `Overdue` while the plan is late
    pub fn effective_status(&self) -> ActionStatus {
        if self.is_overdue {
            ActionStatus::Overdue
        } else {
            self.status
        }
    }
}

/// Attachment metadata recorded with a progress update
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evidence {
    pub name: String,
    pub uri: String,
    pub media_type: Option<String>,
}

impl Evidence {
    pub fn new(name: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            uri: uri.into(),
            media_type: None,
        }
    }
}

/// Immutable record of a status or completion change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionPlanUpdate {
    pub id: i64,
    pub plan_id: i64,
    pub prior_status: ActionStatus,
    pub new_status: ActionStatus,
    pub prior_percent: u8,
    pub new_percent: u8,
    pub note: String,
    pub obstacles: Option<String>,
    pub solutions: Option<String>,
    pub evidence: Vec<Evidence>,
    pub updated_by: String,
    pub updated_at: DateTime<Utc>,
}

/// Fields for creating an action plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewActionPlan {
    pub description: String,
    pub responsible_area: Option<String>,
    pub responsible_person: Option<String>,
    pub implementation_site: Option<String>,
    pub implementation_method: Option<String>,
    pub methodology: Option<String>,
    pub required_resources: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub estimated_cost: Option<f64>,
    /// ISO 4217 code; defaults to BRL
    pub currency: Option<String>,
    pub monitoring_type: MonitoringType,
    pub monitoring_notes: Option<String>,
}

impl NewActionPlan {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            responsible_area: None,
            responsible_person: None,
            implementation_site: None,
            implementation_method: None,
            methodology: None,
            required_resources: None,
            start_date: None,
            end_date: None,
            estimated_cost: None,
            currency: None,
            monitoring_type: MonitoringType::default(),
            monitoring_notes: None,
        }
    }

    pub fn responsible(mut self, area: impl Into<String>, person: impl Into<String>) -> Self {
        self.responsible_area = Some(area.into());
        self.responsible_person = Some(person.into());
        self
    }

    pub fn schedule(mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        self.start_date = Some(start);
        self.end_date = Some(end);
        self
    }

    pub fn ending(mut self, end: DateTime<Utc>) -> Self {
        self.end_date = Some(end);
        self
    }

    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.implementation_method = Some(method.into());
        self
    }

    pub fn estimated_cost(mut self, cost: f64, currency: impl Into<String>) -> Self {
        self.estimated_cost = Some(cost);
        self.currency = Some(currency.into());
        self
    }
}

/// Partial update of an action plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionPlanChanges {
    pub description: Option<String>,
    pub responsible_area: Option<String>,
    pub responsible_person: Option<String>,
    pub implementation_site: Option<String>,
    pub implementation_method: Option<String>,
    pub methodology: Option<String>,
    pub required_resources: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub estimated_cost: Option<f64>,
    pub actual_cost: Option<f64>,
    pub status: Option<ActionStatus>,
    pub completion_percent: Option<u8>,
    pub monitoring_type: Option<MonitoringType>,
    pub monitoring_notes: Option<String>,
    pub effective: Option<bool>,
    pub effectiveness_justification: Option<String>,

    /// Narrative stored on the history row. An update carrying any of it
    /// must also write that row, so it needs a status or completion change.
    pub note: Option<String>,
    pub obstacles: Option<String>,
    pub solutions: Option<String>,
    pub evidence: Vec<Evidence>,

    pub record_history: bool,
    pub expected_version: Option<i64>,
}

impl Default for ActionPlanChanges {
    fn default() -> Self {
        Self {
            description: None,
            responsible_area: None,
            responsible_person: None,
            implementation_site: None,
            implementation_method: None,
            methodology: None,
            required_resources: None,
            start_date: None,
            end_date: None,
            estimated_cost: None,
            actual_cost: None,
            status: None,
            completion_percent: None,
            monitoring_type: None,
            monitoring_notes: None,
            effective: None,
            effectiveness_justification: None,
            note: None,
            obstacles: None,
            solutions: None,
            evidence: Vec::new(),
            record_history: true,
            expected_version: None,
        }
    }
}

impl ActionPlanChanges {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(mut self, status: ActionStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn completion(mut self, percent: u8) -> Self {
        self.completion_percent = Some(percent);
        self
    }

    pub fn end_date(mut self, end: DateTime<Utc>) -> Self {
        self.end_date = Some(end);
        self
    }

    pub fn note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn obstacles(mut self, obstacles: impl Into<String>) -> Self {
        self.obstacles = Some(obstacles.into());
        self
    }

    pub fn solutions(mut self, solutions: impl Into<String>) -> Self {
        self.solutions = Some(solutions.into());
        self
    }

    pub fn evidence(mut self, evidence: Evidence) -> Self {
        self.evidence.push(evidence);
        self
    }

    pub fn effectiveness(mut self, effective: bool, justification: impl Into<String>) -> Self {
        self.effective = Some(effective);
        self.effectiveness_justification = Some(justification.into());
        self
    }

    pub fn without_history(mut self) -> Self {
        self.record_history = false;
        self
    }

    pub fn expect_version(mut self, version: i64) -> Self {
        self.expected_version = Some(version);
        self
    }

    /// True when any progress narrative is attached
    pub fn has_narrative(&self) -> bool {
        self.note.is_some()
            || self.obstacles.is_some()
            || self.solutions.is_some()
            || !self.evidence.is_empty()
    }

    /// True when no field of the plan would change
    pub fn is_empty(&self) -> bool {
        self.description.is_none()
            && self.responsible_area.is_none()
            && self.responsible_person.is_none()
            && self.implementation_site.is_none()
            && self.implementation_method.is_none()
            && self.methodology.is_none()
            && self.required_resources.is_none()
            && self.start_date.is_none()
            && self.end_date.is_none()
            && self.estimated_cost.is_none()
            && self.actual_cost.is_none()
            && self.status.is_none()
            && self.completion_percent.is_none()
            && self.monitoring_type.is_none()
            && self.monitoring_notes.is_none()
            && self.effective.is_none()
            && self.effectiveness_justification.is_none()
    }
}

/// Filters for listing action plans
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionPlanFilter {
    pub risk_id: Option<i64>,
    pub status: Option<ActionStatus>,
    pub responsible_person: Option<String>,
    pub overdue_only: bool,
    pub limit: Option<u64>,
}
