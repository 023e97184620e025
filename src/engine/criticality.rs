//! Criticality scoring from probability and impact

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{RegisterError, Result};
use crate::model::{Criticality, ImpactLevel, ProbabilityLevel};

/// Scale value assumed for an unrecognized label under
/// [`LevelPolicy::DefaultToMiddle`]
const MIDDLE: u8 = 3;

/// What to do with a probability or impact label that names no level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LevelPolicy {
    /// Reject it with a validation error
    #[default]
    Strict,
    /// Treat it as the middle of the scale and log a warning
    DefaultToMiddle,
}

impl Criticality {
    /// Tier of a probability x impact product (1..=25)
    pub fn from_product(product: u8) -> Self {
        if product <= 4 {
            Criticality::Low
        } else if product <= 9 {
            Criticality::Medium
        } else if product <= 16 {
            Criticality::High
        } else {
            Criticality::Critical
        }
    }
}

pub fn score(probability: ProbabilityLevel, impact: ImpactLevel) -> Criticality {
    Criticality::from_product(probability.value() * impact.value())
}

/// Score from free-text labels, resolving unknown labels per `policy`
pub fn score_labels(probability: &str, impact: &str, policy: LevelPolicy) -> Result<Criticality> {
    let p = resolve(probability, "probability", policy, |s| {
        s.parse::<ProbabilityLevel>().map(ProbabilityLevel::value)
    })?;
    let i = resolve(impact, "impact", policy, |s| {
        s.parse::<ImpactLevel>().map(ImpactLevel::value)
    })?;
    Ok(Criticality::from_product(p * i))
}

fn resolve<F>(label: &str, field: &'static str, policy: LevelPolicy, parse: F) -> Result<u8>
where
    F: Fn(&str) -> std::result::Result<u8, crate::model::LabelError>,
{
    match parse(label) {
        Ok(value) => Ok(value),
        Err(err) => match policy {
            LevelPolicy::Strict => Err(RegisterError::from(err)),
            LevelPolicy::DefaultToMiddle => {
                warn!(field, label, "Unrecognized {field} label, scoring as {MIDDLE}");
                Ok(MIDDLE)
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_corner_scores() {
        assert_eq!(score(ProbabilityLevel::VeryLow, ImpactLevel::VeryLow), Criticality::Low);
        assert_eq!(score(ProbabilityLevel::Medium, ImpactLevel::Moderate), Criticality::Medium);
        assert_eq!(score(ProbabilityLevel::VeryHigh, ImpactLevel::VeryHigh), Criticality::Critical);
        assert_eq!(score(ProbabilityLevel::High, ImpactLevel::VeryHigh), Criticality::Critical);
        assert_eq!(score(ProbabilityLevel::High, ImpactLevel::Low), Criticality::Medium);
    }

    #[test]
    fn test_tier_boundaries() {
        assert_eq!(Criticality::from_product(4), Criticality::Low);
        assert_eq!(Criticality::from_product(5), Criticality::Medium);
        assert_eq!(Criticality::from_product(9), Criticality::Medium);
        assert_eq!(Criticality::from_product(10), Criticality::High);
        assert_eq!(Criticality::from_product(16), Criticality::High);
        assert_eq!(Criticality::from_product(17), Criticality::Critical);
    }

    #[test]
    fn test_score_is_monotonic_in_both_axes() {
        for p in ProbabilityLevel::ALL {
            for i in ImpactLevel::ALL {
                let here = score(*p, *i);
                if let Some(up) = ProbabilityLevel::from_value(p.value() + 1) {
                    assert!(score(up, *i) >= here, "{p} -> {up} at impact {i}");
                }
                if let Some(up) = ImpactLevel::from_value(i.value() + 1) {
                    assert!(score(*p, up) >= here, "{i} -> {up} at probability {p}");
                }
            }
        }
    }

    #[test]
    fn test_strict_policy_rejects_unknown_label() {
        let err = score_labels("Sometimes", "High", LevelPolicy::Strict).unwrap_err();
        match err {
            RegisterError::Validation { field, .. } => assert_eq!(field, "probability"),
            other => panic!("unexpected error: {other:?}"),
        }
        let err = score_labels("High", "Huge", LevelPolicy::Strict).unwrap_err();
        assert!(matches!(err, RegisterError::Validation { field: "impact", .. }));
    }

    #[test]
    fn test_default_to_middle_policy() {
        // 3 x 5 = 15
        let level = score_labels("Sometimes", "Very high", LevelPolicy::DefaultToMiddle).unwrap();
        assert_eq!(level, Criticality::High);
        let level = score_labels("??", "??", LevelPolicy::DefaultToMiddle).unwrap();
        assert_eq!(level, Criticality::Medium);
    }

    #[test]
    fn test_labels_accept_aliases() {
        assert_eq!(
            score_labels("Alta", "muito alto", LevelPolicy::Strict).unwrap(),
            Criticality::Critical
        );
    }

    #[test]
    fn test_policy_config_names() {
        let policy: LevelPolicy = serde_json::from_str("\"default-to-middle\"").unwrap();
        assert_eq!(policy, LevelPolicy::DefaultToMiddle);
        assert_eq!(LevelPolicy::default(), LevelPolicy::Strict);
    }
}
