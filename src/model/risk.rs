//! Risk records, their assessment history and the typed inputs that create
//! and change them

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::levels::{
    Criticality, ImpactLevel, ImpactType, ProbabilityLevel, ResponseType, RiskCategory, RiskSource,
};
use super::SortDirection;

/// A registered risk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Risk {
    pub id: i64,
    /// Work-breakdown-structure code used to group risks and plans
    pub eap: String,
    pub code: String,
    pub source: RiskSource,
    pub stages: Option<String>,
    pub category: RiskCategory,
    pub title: String,
    pub description: String,
    pub causes: String,
    pub impact_type: ImpactType,
    pub consequences: String,
    pub probability: Option<ProbabilityLevel>,
    pub impact: Option<ImpactLevel>,
    pub criticality: Option<Criticality>,
    /// Present only when the criticality was set by hand instead of scored
    pub criticality_justification: Option<String>,
    pub suggested_response: Option<ResponseType>,
    pub adopted_response: Option<ResponseType>,
    pub response_justification: Option<String>,
    pub active: bool,
    pub approved: bool,
    pub approved_at: Option<DateTime<Utc>>,
    pub approved_by: Option<String>,
    pub identified_at: DateTime<Utc>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_by: Option<String>,
    pub updated_at: DateTime<Utc>,
    pub version: i64,
}

impl Risk {
    pub fn assessment(&self) -> Assessment {
        Assessment {
            probability: self.probability,
            impact: self.impact,
            criticality: self.criticality,
        }
    }

    pub fn is_criticality_overridden(&self) -> bool {
        self.criticality_justification.is_some()
    }
}

/// The qualitative assessment triple
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Assessment {
    pub probability: Option<ProbabilityLevel>,
    pub impact: Option<ImpactLevel>,
    pub criticality: Option<Criticality>,
}

/// Snapshot of an assessment before and after a change. Never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssessmentHistory {
    pub id: i64,
    pub risk_id: i64,
    pub prior: Assessment,
    pub new: Assessment,
    pub reason: String,
    pub evidence: Option<String>,
    pub assessed_by: String,
    pub assessed_at: DateTime<Utc>,
}

/// Hand-set criticality; the justification is mandatory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CriticalityOverride {
    pub level: Criticality,
    pub justification: String,
}

impl CriticalityOverride {
    pub fn new(level: Criticality, justification: impl Into<String>) -> Self {
        Self {
            level,
            justification: justification.into(),
        }
    }
}

/// Fields for registering a risk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewRisk {
    pub eap: String,
    /// Generated as `RSK-NNN` when absent
    pub code: Option<String>,
    pub source: RiskSource,
    pub stages: Option<String>,
    pub category: RiskCategory,
    pub title: String,
    pub description: String,
    pub causes: String,
    pub impact_type: ImpactType,
    pub consequences: String,
    pub probability: Option<ProbabilityLevel>,
    pub impact: Option<ImpactLevel>,
    pub criticality_override: Option<CriticalityOverride>,
    pub suggested_response: Option<ResponseType>,
    pub adopted_response: Option<ResponseType>,
    pub response_justification: Option<String>,
    /// Defaults to the registration time
    pub identified_at: Option<DateTime<Utc>>,
}

impl NewRisk {
    pub fn new(
        eap: impl Into<String>,
        source: RiskSource,
        category: RiskCategory,
        impact_type: ImpactType,
    ) -> Self {
        Self {
            eap: eap.into(),
            code: None,
            source,
            stages: None,
            category,
            title: String::new(),
            description: String::new(),
            causes: String::new(),
            impact_type,
            consequences: String::new(),
            probability: None,
            impact: None,
            criticality_override: None,
            suggested_response: None,
            adopted_response: None,
            response_justification: None,
            identified_at: None,
        }
    }

    pub fn with_event(mut self, title: impl Into<String>, description: impl Into<String>) -> Self {
        self.title = title.into();
        self.description = description.into();
        self
    }

    pub fn with_causes(mut self, causes: impl Into<String>) -> Self {
        self.causes = causes.into();
        self
    }

    pub fn with_consequences(mut self, consequences: impl Into<String>) -> Self {
        self.consequences = consequences.into();
        self
    }

    pub fn with_assessment(mut self, probability: ProbabilityLevel, impact: ImpactLevel) -> Self {
        self.probability = Some(probability);
        self.impact = Some(impact);
        self
    }

    /// Backdate identification, for risks recorded after the fact
    pub fn identified_on(mut self, at: DateTime<Utc>) -> Self {
        self.identified_at = Some(at);
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_stages(mut self, stages: impl Into<String>) -> Self {
        self.stages = Some(stages.into());
        self
    }

    pub fn with_criticality_override(mut self, over: CriticalityOverride) -> Self {
        self.criticality_override = Some(over);
        self
    }

    pub fn with_responses(
        mut self,
        suggested: Option<ResponseType>,
        adopted: Option<ResponseType>,
    ) -> Self {
        self.suggested_response = suggested;
        self.adopted_response = adopted;
        self
    }
}

/// Partial update of a risk. Only the listed fields can change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskChanges {
    pub eap: Option<String>,
    pub source: Option<RiskSource>,
    pub stages: Option<String>,
    pub category: Option<RiskCategory>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub causes: Option<String>,
    pub impact_type: Option<ImpactType>,
    pub consequences: Option<String>,
    pub probability: Option<ProbabilityLevel>,
    pub impact: Option<ImpactLevel>,
    pub criticality_override: Option<CriticalityOverride>,
    pub suggested_response: Option<ResponseType>,
    pub adopted_response: Option<ResponseType>,
    pub response_justification: Option<String>,

    /// Write an assessment history row when the assessment changes
    pub record_history: bool,
    pub reason: Option<String>,
    pub evidence: Option<String>,
    /// Reject the update unless the stored version matches
    pub expected_version: Option<i64>,
}

impl Default for RiskChanges {
    fn default() -> Self {
        Self {
            eap: None,
            source: None,
            stages: None,
            category: None,
            title: None,
            description: None,
            causes: None,
            impact_type: None,
            consequences: None,
            probability: None,
            impact: None,
            criticality_override: None,
            suggested_response: None,
            adopted_response: None,
            response_justification: None,
            record_history: true,
            reason: None,
            evidence: None,
            expected_version: None,
        }
    }
}

impl RiskChanges {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn probability(mut self, level: ProbabilityLevel) -> Self {
        self.probability = Some(level);
        self
    }

    pub fn impact(mut self, level: ImpactLevel) -> Self {
        self.impact = Some(level);
        self
    }

    pub fn criticality_override(mut self, over: CriticalityOverride) -> Self {
        self.criticality_override = Some(over);
        self
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn eap(mut self, eap: impl Into<String>) -> Self {
        self.eap = Some(eap.into());
        self
    }

    pub fn adopted_response(mut self, response: ResponseType) -> Self {
        self.adopted_response = Some(response);
        self
    }

    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn evidence(mut self, evidence: impl Into<String>) -> Self {
        self.evidence = Some(evidence.into());
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

    /// True when no field of the risk would change
    pub fn is_empty(&self) -> bool {
        self.eap.is_none()
            && self.source.is_none()
            && self.stages.is_none()
            && self.category.is_none()
            && self.title.is_none()
            && self.description.is_none()
            && self.causes.is_none()
            && self.impact_type.is_none()
            && self.consequences.is_none()
            && self.probability.is_none()
            && self.impact.is_none()
            && self.criticality_override.is_none()
            && self.suggested_response.is_none()
            && self.adopted_response.is_none()
            && self.response_justification.is_none()
    }
}

/// Filters for risk queries; `None` / empty means "any"
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RiskFilter {
    /// Case-insensitive substring of the EAP code
    pub eap: Option<String>,
    pub source: Option<RiskSource>,
    pub category: Option<RiskCategory>,
    pub criticality: Vec<Criticality>,
    /// Case-insensitive substring of title, description, causes or consequences
    pub text: Option<String>,
    pub identified_from: Option<DateTime<Utc>>,
    pub identified_to: Option<DateTime<Utc>>,
    pub active: Option<bool>,
}

impl RiskFilter {
    pub fn active_only() -> Self {
        Self {
            active: Some(true),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RiskSortField {
    #[default]
    Id,
    Code,
    Eap,
    Title,
    /// Ordinal, Low to Critical; unassessed risks sort first
    Criticality,
    IdentifiedAt,
    UpdatedAt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RiskSort {
    pub field: RiskSortField,
    pub direction: SortDirection,
}

impl RiskSort {
    pub fn ascending(field: RiskSortField) -> Self {
        Self {
            field,
            direction: SortDirection::Ascending,
        }
    }

    pub fn descending(field: RiskSortField) -> Self {
        Self {
            field,
            direction: SortDirection::Descending,
        }
    }
}
