//! Domain records of the risk register

pub mod action_plan;
pub mod levels;
pub mod risk;

pub use action_plan::{
    is_overdue_at, ActionPlan, ActionPlanChanges, ActionPlanFilter, ActionPlanUpdate, Evidence,
    NewActionPlan,
};
pub use levels::{
    ActionStatus, Criticality, ImpactLevel, ImpactType, LabelError, MonitoringType,
    ProbabilityLevel, ResponseType, RiskCategory, RiskSource,
};
pub use risk::{
    Assessment, AssessmentHistory, CriticalityOverride, NewRisk, Risk, RiskChanges, RiskFilter,
    RiskSort, RiskSortField,
};

use serde::{Deserialize, Serialize};

/// The user performing a mutation.
///
/// Identity is resolved by whoever authenticates the caller; the register
/// only records the id on audit columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: String,
    pub name: Option<String>,
}

impl Actor {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Actor used by maintenance commands run from the CLI
    pub fn system() -> Self {
        Self::new("system").with_name("Risk register")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

impl SortDirection {
    pub(crate) fn sql(self) -> &'static str {
        match self {
            SortDirection::Ascending => "ASC",
            SortDirection::Descending => "DESC",
        }
    }
}

/// Offset/limit window over an ordered result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Page {
    pub offset: u64,
    pub limit: Option<u64>,
}

impl Page {
    pub fn new(offset: u64, limit: u64) -> Self {
        Self {
            offset,
            limit: Some(limit),
        }
    }

    /// Everything from the first row
    pub fn all() -> Self {
        Self::default()
    }
}
