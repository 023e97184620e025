//! Closed enumerations used across the register
//!
//! Every enum is persisted as its canonical label. Parsing is strict: an
//! unknown label is a [`LabelError`], never a silent default. The
//! Portuguese labels are accepted as aliases so records imported from the
//! legacy spreadsheets parse without a translation step.

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Raised when a label does not name any variant of the target enum
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unrecognized {field} value '{value}'")]
pub struct LabelError {
    pub field: &'static str,
    pub value: String,
}

macro_rules! labelled_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident as $field:literal {
            $(
                $(#[$vmeta:meta])*
                $variant:ident => $label:literal $(| $alias:literal)*
            ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub enum $name {
            $(
                $(#[$vmeta])*
                $variant,
            )+
        }

        impl $name {
            /// Every variant, in declaration order
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// Canonical label, as stored in the database
            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $label,)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = LabelError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let wanted = s.trim().to_lowercase();
                $(
                    if wanted == $label.to_lowercase()
                        || wanted == stringify!($variant).to_lowercase()
                        $(|| wanted == $alias.to_lowercase())*
                    {
                        return Ok($name::$variant);
                    }
                )+
                Err(LabelError {
                    field: $field,
                    value: s.to_string(),
                })
            }
        }

        impl ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.as_str()))
            }
        }

        impl FromSql for $name {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                value
                    .as_str()?
                    .parse()
                    .map_err(|e: LabelError| FromSqlError::Other(Box::new(e)))
            }
        }
    };
}

labelled_enum! {
    /// Where a risk originates
    pub enum RiskSource as "source" {
        Legal => "Legal" | "Jurídico",
        Operational => "Operational" | "Operacional",
        Strategic => "Strategic" | "Estratégico",
        Financial => "Financial" | "Financeiro",
        Technological => "Technological" | "Tecnológico",
        Reputational => "Reputational" | "Reputacional",
        Regulatory => "Regulatory" | "Regulatório",
    }
}

labelled_enum! {
    /// Area of the organisation a risk belongs to
    pub enum RiskCategory as "category" {
        Compliance => "Compliance" | "Conformidade",
        Process => "Process" | "Processo",
        People => "People" | "Pessoas",
        Technology => "Technology" | "Tecnologia",
        ExternalEnvironment => "External environment" | "Ambiente Externo",
    }
}

labelled_enum! {
    /// What the consequences of a risk affect
    pub enum ImpactType as "impact_type" {
        ProjectObjective => "Project objective" | "Objetivo do projeto",
        Financial => "Financial" | "Financeiro",
        Reputational => "Reputational" | "Reputacional",
        Operational => "Operational" | "Operacional",
        Strategic => "Strategic" | "Estratégico",
    }
}

labelled_enum! {
    /// Five-level ordinal likelihood scale
    pub enum ProbabilityLevel as "probability" {
        VeryLow => "Very low" | "Muito baixa",
        Low => "Low" | "Baixa",
        Medium => "Medium" | "Média" | "Media",
        High => "High" | "Alta",
        VeryHigh => "Very high" | "Muito alta",
    }
}

labelled_enum! {
    /// Five-level ordinal impact scale
    pub enum ImpactLevel as "impact" {
        VeryLow => "Very low" | "Muito baixo",
        Low => "Low" | "Baixo",
        Moderate => "Moderate" | "Moderado",
        High => "High" | "Alto",
        VeryHigh => "Very high" | "Muito alto",
    }
}

labelled_enum! {
    /// Derived severity tier
    pub enum Criticality as "criticality" {
        Low => "Low" | "Baixo",
        Medium => "Medium" | "Médio" | "Medio",
        High => "High" | "Alto",
        Critical => "Critical" | "Crítico" | "Critico",
    }
}

labelled_enum! {
    /// Treatment strategy for a risk
    pub enum ResponseType as "response" {
        Avoid => "Avoid" | "Evitar",
        Mitigate => "Mitigate" | "Mitigar",
        Transfer => "Transfer" | "Transferir",
        Accept => "Accept" | "Aceitar",
        Share => "Share" | "Compartilhar",
    }
}

labelled_enum! {
    /// Lifecycle state of an action plan
    pub enum ActionStatus as "status" {
        NotStarted => "Not started" | "Não Iniciado",
        InProgress => "In progress" | "Em andamento",
        Completed => "Completed" | "Concluído",
        /// Observed only; see [`ActionStatus::can_transition_to`]
        Overdue => "Overdue" | "Atrasado",
        Cancelled => "Cancelled" | "Cancelado",
    }
}

labelled_enum! {
    /// How an action plan is being monitored
    pub enum MonitoringType as "monitoring_type" {
        Planned => "Planned" | "Planejado",
        Actual => "Actual" | "Real",
        Preventive => "Preventive" | "Preventivo",
    }
}

impl ProbabilityLevel {
    /// Position on the 1..=5 scale
    pub fn value(self) -> u8 {
        match self {
            ProbabilityLevel::VeryLow => 1,
            ProbabilityLevel::Low => 2,
            ProbabilityLevel::Medium => 3,
            ProbabilityLevel::High => 4,
            ProbabilityLevel::VeryHigh => 5,
        }
    }

    pub fn from_value(value: u8) -> Option<Self> {
        Self::ALL.iter().copied().find(|l| l.value() == value)
    }
}

impl ImpactLevel {
    /// Position on the 1..=5 scale
    pub fn value(self) -> u8 {
        match self {
            ImpactLevel::VeryLow => 1,
            ImpactLevel::Low => 2,
            ImpactLevel::Moderate => 3,
            ImpactLevel::High => 4,
            ImpactLevel::VeryHigh => 5,
        }
    }

    pub fn from_value(value: u8) -> Option<Self> {
        Self::ALL.iter().copied().find(|l| l.value() == value)
    }
}

impl Criticality {
    /// 1 (Low) to 4 (Critical); used for ordinal sorting in SQL
    pub fn rank(self) -> u8 {
        match self {
            Criticality::Low => 1,
            Criticality::Medium => 2,
            Criticality::High => 3,
            Criticality::Critical => 4,
        }
    }
}

impl ActionStatus {
    /// Completed and Cancelled plans never move again
    pub fn is_terminal(self) -> bool {
        matches!(self, ActionStatus::Completed | ActionStatus::Cancelled)
    }

    /// Whether `next` may be stored after `self`.
    ///
    /// `NotStarted -> InProgress -> Completed`, and `Cancelled` from any
    /// non-terminal state. `Overdue` is never stored; it is reported by
    /// `ActionPlan::effective_status` while the plan is late.
    pub fn can_transition_to(self, next: ActionStatus) -> bool {
        use ActionStatus::*;
        if self == next {
            return true;
        }
        match (self, next) {
            (_, Overdue) | (_, NotStarted) => false,
            (NotStarted, InProgress) => true,
            (InProgress, Completed) => true,
            (from, Cancelled) => !from.is_terminal(),
            _ => false,
        }
    }
}

impl Default for ActionStatus {
    fn default() -> Self {
        ActionStatus::NotStarted
    }
}

impl Default for MonitoringType {
    fn default() -> Self {
        MonitoringType::Planned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_accepts_labels_variants_and_aliases() {
        assert_eq!("Very high".parse::<ImpactLevel>(), Ok(ImpactLevel::VeryHigh));
        assert_eq!("veryhigh".parse::<ImpactLevel>(), Ok(ImpactLevel::VeryHigh));
        assert_eq!("  Muito alto ".parse::<ImpactLevel>(), Ok(ImpactLevel::VeryHigh));
        assert_eq!("MÉDIA".parse::<ProbabilityLevel>(), Ok(ProbabilityLevel::Medium));
        assert_eq!("Ambiente Externo".parse::<RiskCategory>(), Ok(RiskCategory::ExternalEnvironment));
    }

    #[test]
    fn test_parse_rejects_unknown_label() {
        let err = "Somewhat likely".parse::<ProbabilityLevel>().unwrap_err();
        assert_eq!(err.field, "probability");
        assert_eq!(err.value, "Somewhat likely");
    }

    #[test]
    fn test_scale_values() {
        let probabilities: Vec<u8> = ProbabilityLevel::ALL.iter().map(|l| l.value()).collect();
        assert_eq!(probabilities, vec![1, 2, 3, 4, 5]);
        assert_eq!(ImpactLevel::from_value(2), Some(ImpactLevel::Low));
        assert_eq!(ImpactLevel::from_value(0), None);
        assert!(Criticality::Low < Criticality::Critical);
    }

    #[test]
    fn test_status_transitions() {
        use ActionStatus::*;
        assert!(NotStarted.can_transition_to(InProgress));
        assert!(InProgress.can_transition_to(Completed));
        assert!(NotStarted.can_transition_to(Cancelled));
        assert!(InProgress.can_transition_to(Cancelled));
        assert!(InProgress.can_transition_to(InProgress));

        assert!(!NotStarted.can_transition_to(Completed));
        assert!(!InProgress.can_transition_to(NotStarted));
        assert!(!InProgress.can_transition_to(Overdue));
        assert!(!Completed.can_transition_to(Cancelled));
        assert!(!Cancelled.can_transition_to(InProgress));
    }
}
