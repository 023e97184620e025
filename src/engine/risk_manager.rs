//! Risk Entity Manager
//!
//! Owns the lifecycle of a risk: registration, partial updates with
//! assessment history, approval and soft deletion. Every mutation runs in a
//! single transaction, so a failed update never leaves a history row behind.

use chrono::SubsecRound;
use rusqlite::Connection;
use std::sync::Arc;
use tracing::{debug, info};

use crate::database::{self, risks, Database};
use crate::engine::criticality;
use crate::error::{RegisterError, Result};
use crate::model::{
    Actor, AssessmentHistory, NewRisk, Page, Risk, RiskChanges, RiskFilter, RiskSort,
};

/// Reason recorded on assessment history when the caller gives none
pub const DEFAULT_CHANGE_REASON: &str = "Assessment updated";

fn require_text(field: &'static str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(RegisterError::validation(field, "must not be empty"));
    }
    Ok(())
}

fn require_some_text(field: &'static str, value: Option<&str>) -> Result<()> {
    match value {
        Some(v) => require_text(field, v),
        None => Ok(()),
    }
}

/// `RSK-NNN` from one past the highest id, skipping codes already taken
fn generate_code(conn: &Connection) -> Result<String> {
    let mut n = risks::next_risk_number(conn)?;
    loop {
        let code = format!("RSK-{n:03}");
        if !risks::code_exists(conn, &code)? {
            return Ok(code);
        }
        n += 1;
    }
}

fn conflict(conn: &Connection, id: i64, expected: i64) -> Result<RegisterError> {
    let actual = risks::risk_version(conn, id)?.ok_or_else(|| RegisterError::not_found("risk", id))?;
    Ok(RegisterError::Conflict {
        entity: "risk",
        id,
        expected,
        actual,
    })
}

/// Risk lifecycle operations
#[derive(Debug, Clone)]
pub struct RiskManager {
    database: Arc<Database>,
}

impl RiskManager {
    pub fn new(database: Arc<Database>) -> Self {
        Self { database }
    }

    /// Register a risk.
    ///
    /// Criticality is scored when both probability and impact are given, or
    /// taken from an explicit override; otherwise it stays unset until the
    /// risk is assessed.
    pub fn create(&self, new: NewRisk, actor: &Actor) -> Result<Risk> {
        require_text("eap", &new.eap)?;
        require_text("title", &new.title)?;
        require_text("description", &new.description)?;
        require_text("causes", &new.causes)?;
        require_text("consequences", &new.consequences)?;
        if let Some(over) = &new.criticality_override {
            require_text("criticality_justification", &over.justification)?;
        }

        let (criticality, justification) = match (&new.criticality_override, new.probability, new.impact) {
            (Some(over), _, _) => (Some(over.level), Some(over.justification.trim().to_string())),
            (None, Some(p), Some(i)) => (Some(criticality::score(p, i)), None),
            _ => (None, None),
        };

        let risk = self.database.transaction(|tx| -> Result<Risk> {
            let code = match new.code.as_deref().map(str::trim) {
                Some("") => return Err(RegisterError::validation("code", "must not be empty")),
                Some(code) if risks::code_exists(tx, code)? => {
                    return Err(RegisterError::Constraint {
                        entity: "risk",
                        message: format!("code {code} already exists"),
                    })
                }
                Some(code) => code.to_string(),
                None => generate_code(tx)?,
            };

            let now = database::now();
            let mut risk = Risk {
                id: 0,
                eap: new.eap.trim().to_string(),
                code,
                source: new.source,
                stages: new.stages.clone(),
                category: new.category,
                title: new.title.trim().to_string(),
                description: new.description.clone(),
                causes: new.causes.clone(),
                impact_type: new.impact_type,
                consequences: new.consequences.clone(),
                probability: new.probability,
                impact: new.impact,
                criticality,
                criticality_justification: justification.clone(),
                suggested_response: new.suggested_response,
                adopted_response: new.adopted_response,
                response_justification: new.response_justification.clone(),
                active: true,
                approved: false,
                approved_at: None,
                approved_by: None,
                identified_at: new.identified_at.map_or(now, |at| at.trunc_subsecs(6)),
                created_by: actor.id.clone(),
                created_at: now,
                updated_by: None,
                updated_at: now,
                version: 1,
            };
            risk.id = risks::insert_risk(tx, &risk)?;
            Ok(risk)
        })?;

        info!(
            risk_id = risk.id,
            code = %risk.code,
            actor = %actor.id,
            "Risk registered"
        );
        Ok(risk)
    }

    /// Apply a partial update.
    ///
    /// Changing probability or impact rescores the risk and drops any
    /// criticality override. Resubmitting the stored values changes nothing. When the assessment triple ends up different
    /// and `record_history` is set, one history row is written in the same
    /// transaction.
    pub fn update(&self, id: i64, changes: RiskChanges, actor: &Actor) -> Result<Risk> {
        if changes.is_empty() {
            return Err(RegisterError::validation("changes", "no fields to update"));
        }
        require_some_text("eap", changes.eap.as_deref())?;
        require_some_text("title", changes.title.as_deref())?;
        require_some_text("description", changes.description.as_deref())?;
        require_some_text("causes", changes.causes.as_deref())?;
        require_some_text("consequences", changes.consequences.as_deref())?;
        if let Some(over) = &changes.criticality_override {
            require_text("criticality_justification", &over.justification)?;
        }

        let (risk, history) = self.database.transaction(|tx| -> Result<(Risk, Option<AssessmentHistory>)> {
            let mut risk = risks::load_risk(tx, id)?.ok_or_else(|| RegisterError::not_found("risk", id))?;
            if let Some(expected) = changes.expected_version {
                if expected != risk.version {
                    return Err(RegisterError::Conflict {
                        entity: "risk",
                        id,
                        expected,
                        actual: risk.version,
                    });
                }
            }

            let prior = risk.assessment();
            let prior_version = risk.version;

            if let Some(eap) = &changes.eap {
                risk.eap = eap.trim().to_string();
            }
            if let Some(source) = changes.source {
                risk.source = source;
            }
            if let Some(stages) = &changes.stages {
                risk.stages = Some(stages.clone());
            }
            if let Some(category) = changes.category {
                risk.category = category;
            }
            if let Some(title) = &changes.title {
                risk.title = title.trim().to_string();
            }
            if let Some(description) = &changes.description {
                risk.description = description.clone();
            }
            if let Some(causes) = &changes.causes {
                risk.causes = causes.clone();
            }
            if let Some(impact_type) = changes.impact_type {
                risk.impact_type = impact_type;
            }
            if let Some(consequences) = &changes.consequences {
                risk.consequences = consequences.clone();
            }
            if let Some(response) = changes.suggested_response {
                risk.suggested_response = Some(response);
            }
            if let Some(response) = changes.adopted_response {
                risk.adopted_response = Some(response);
            }
            if let Some(justification) = &changes.response_justification {
                risk.response_justification = Some(justification.clone());
            }

            let probability = changes.probability.or(risk.probability);
            let impact = changes.impact.or(risk.impact);
            if probability != risk.probability || impact != risk.impact {
                risk.probability = probability;
                risk.impact = impact;
                risk.criticality = match (risk.probability, risk.impact) {
                    (Some(p), Some(i)) => Some(criticality::score(p, i)),
                    _ => None,
                };
                risk.criticality_justification = None;
            }
            if let Some(over) = &changes.criticality_override {
                risk.criticality = Some(over.level);
                risk.criticality_justification = Some(over.justification.trim().to_string());
            }

            let now = database::now();
            let current = risk.assessment();
            let mut history = None;
            if changes.record_history && current != prior {
                let mut entry = AssessmentHistory {
                    id: 0,
                    risk_id: id,
                    prior,
                    new: current,
                    reason: changes
                        .reason
                        .as_deref()
                        .map(str::trim)
                        .filter(|r| !r.is_empty())
                        .unwrap_or(DEFAULT_CHANGE_REASON)
                        .to_string(),
                    evidence: changes.evidence.clone(),
                    assessed_by: actor.id.clone(),
                    assessed_at: now,
                };
                entry.id = risks::insert_assessment(tx, &entry)?;
                history = Some(entry);
            }

            risk.updated_by = Some(actor.id.clone());
            risk.updated_at = now;
            risk.version = prior_version + 1;
            if risks::save_risk(tx, &risk, prior_version)? == 0 {
                return Err(conflict(tx, id, prior_version)?);
            }
            Ok((risk, history))
        })?;

        match history {
            Some(entry) => info!(
                risk_id = id,
                actor = %actor.id,
                prior = ?entry.prior.criticality,
                new = ?entry.new.criticality,
                "Risk updated with reassessment"
            ),
            None => info!(risk_id = id, actor = %actor.id, "Risk updated"),
        }
        Ok(risk)
    }

    /// Soft-delete. Returns false, without error, when the risk is unknown
    /// or already inactive.
    pub fn deactivate(&self, id: i64, actor: &Actor) -> Result<bool> {
        let changed = self
            .database
            .transaction(|tx| Ok::<_, RegisterError>(risks::deactivate_risk(tx, id, &actor.id, &database::now())?))?;
        if changed {
            info!(risk_id = id, actor = %actor.id, "Risk deactivated");
        } else {
            debug!(risk_id = id, "Deactivate skipped, risk unknown or inactive");
        }
        Ok(changed)
    }

    /// Mark a risk approved by `actor`
    pub fn approve(&self, id: i64, actor: &Actor) -> Result<Risk> {
        let risk = self.database.transaction(|tx| -> Result<Risk> {
            let mut risk = risks::load_risk(tx, id)?.ok_or_else(|| RegisterError::not_found("risk", id))?;
            let prior_version = risk.version;
            let now = database::now();
            risk.approved = true;
            risk.approved_at = Some(now);
            risk.approved_by = Some(actor.id.clone());
            risk.updated_by = Some(actor.id.clone());
            risk.updated_at = now;
            risk.version = prior_version + 1;
            if risks::save_risk(tx, &risk, prior_version)? == 0 {
                return Err(conflict(tx, id, prior_version)?);
            }
            Ok(risk)
        })?;
        info!(risk_id = id, actor = %actor.id, "Risk approved");
        Ok(risk)
    }

    pub fn get(&self, id: i64) -> Result<Option<Risk>> {
        self.database
            .read(|conn| Ok(risks::load_risk(conn, id)?))
    }

    /// Assessment history, oldest first
    pub fn history(&self, risk_id: i64) -> Result<Vec<AssessmentHistory>> {
        self.database
            .read(|conn| Ok(risks::assessments_for(conn, risk_id)?))
    }

    /// Filtered, sorted page of risks plus the unpaged match count
    pub fn query(&self, filter: &RiskFilter, sort: RiskSort, page: Page) -> Result<(Vec<Risk>, u64)> {
        if let (Some(from), Some(to)) = (filter.identified_from, filter.identified_to) {
            if from > to {
                return Err(RegisterError::validation(
                    "identified_at",
                    "range start is after its end",
                ));
            }
        }
        if page.limit == Some(0) {
            return Err(RegisterError::validation("limit", "must be at least 1"));
        }

        let (risks, total) = self
            .database
            .read(|conn| Ok::<_, RegisterError>(risks::query_risks(conn, filter, sort, page)?))?;
        debug!(returned = risks.len(), total, "Risk query");
        Ok((risks, total))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        CriticalityOverride, Criticality, ImpactLevel, ImpactType, ProbabilityLevel, RiskCategory,
        RiskSource,
    };

    fn manager() -> RiskManager {
        let db = Database::open_in_memory().unwrap();
        db.initialize().unwrap();
        RiskManager::new(Arc::new(db))
    }

    fn supplier_risk() -> NewRisk {
        NewRisk::new("1.2.3", RiskSource::Operational, RiskCategory::Process, ImpactType::Financial)
            .with_event("Supplier delay", "Key supplier misses delivery window")
            .with_causes("Single-source contract")
            .with_consequences("Schedule slip")
    }

    #[test]
    fn test_create_generates_sequential_codes() {
        let manager = manager();
        let actor = Actor::new("analyst");
        let first = manager.create(supplier_risk(), &actor).unwrap();
        let second = manager.create(supplier_risk(), &actor).unwrap();
        assert_eq!(first.code, "RSK-001");
        assert_eq!(second.code, "RSK-002");
        assert_eq!(first.criticality, None);
        assert!(first.active);
        assert_eq!(first.created_by, "analyst");
    }

    #[test]
    fn test_generated_code_skips_taken_code() {
        let manager = manager();
        let actor = Actor::new("analyst");
        manager.create(supplier_risk().with_code("RSK-002"), &actor).unwrap();
        let next = manager.create(supplier_risk(), &actor).unwrap();
        assert_eq!(next.code, "RSK-003");
    }

    #[test]
    fn test_duplicate_code_is_constraint_error() {
        let manager = manager();
        let actor = Actor::new("analyst");
        manager.create(supplier_risk().with_code("OPS-7"), &actor).unwrap();
        let err = manager.create(supplier_risk().with_code("OPS-7"), &actor).unwrap_err();
        assert!(matches!(err, RegisterError::Constraint { .. }));
    }

    #[test]
    fn test_create_requires_text_fields() {
        let manager = manager();
        let blank = supplier_risk().with_causes("   ");
        let err = manager.create(blank, &Actor::new("analyst")).unwrap_err();
        assert!(matches!(err, RegisterError::Validation { field: "causes", .. }));
    }

    #[test]
    fn test_override_requires_justification() {
        let manager = manager();
        let new = supplier_risk().with_criticality_override(CriticalityOverride::new(Criticality::High, ""));
        let err = manager.create(new, &Actor::new("analyst")).unwrap_err();
        assert!(matches!(
            err,
            RegisterError::Validation { field: "criticality_justification", .. }
        ));
    }

    #[test]
    fn test_rescoring_clears_override() {
        let manager = manager();
        let actor = Actor::new("analyst");
        let risk = manager
            .create(
                supplier_risk()
                    .with_assessment(ProbabilityLevel::Low, ImpactLevel::Low)
                    .with_criticality_override(CriticalityOverride::new(Criticality::High, "Board decision")),
                &actor,
            )
            .unwrap();
        assert_eq!(risk.criticality, Some(Criticality::High));
        assert!(risk.is_criticality_overridden());

        let risk = manager
            .update(risk.id, RiskChanges::new().probability(ProbabilityLevel::Medium), &actor)
            .unwrap();
        assert_eq!(risk.criticality, Some(Criticality::Medium));
        assert!(!risk.is_criticality_overridden());
    }

    #[test]
    fn test_resubmitted_assessment_keeps_override() {
        let manager = manager();
        let actor = Actor::new("analyst");
        let risk = manager
            .create(
                supplier_risk()
                    .with_assessment(ProbabilityLevel::Low, ImpactLevel::Low)
                    .with_criticality_override(CriticalityOverride::new(Criticality::High, "Board decision")),
                &actor,
            )
            .unwrap();

        let risk = manager
            .update(
                risk.id,
                RiskChanges::new()
                    .probability(ProbabilityLevel::Low)
                    .impact(ImpactLevel::Low)
                    .title("Supplier delay, renamed"),
                &actor,
            )
            .unwrap();
        assert_eq!(risk.title, "Supplier delay, renamed");
        assert_eq!(risk.criticality, Some(Criticality::High));
        assert_eq!(risk.criticality_justification.as_deref(), Some("Board decision"));
        assert!(manager.history(risk.id).unwrap().is_empty());
    }

    #[test]
    fn test_text_only_update_writes_no_history() {
        let manager = manager();
        let actor = Actor::new("analyst");
        let risk = manager.create(supplier_risk(), &actor).unwrap();
        let updated = manager
            .update(risk.id, RiskChanges::new().title("Supplier insolvency"), &actor)
            .unwrap();
        assert_eq!(updated.title, "Supplier insolvency");
        assert_eq!(updated.version, risk.version + 1);
        assert!(manager.history(risk.id).unwrap().is_empty());
    }

    #[test]
    fn test_update_rejects_empty_changes_and_unknown_id() {
        let manager = manager();
        let actor = Actor::new("analyst");
        assert!(matches!(
            manager.update(1, RiskChanges::new(), &actor),
            Err(RegisterError::Validation { .. })
        ));
        assert!(matches!(
            manager.update(99, RiskChanges::new().title("x"), &actor),
            Err(RegisterError::NotFound { entity: "risk", id: 99 })
        ));
    }

    #[test]
    fn test_approve_stamps_actor() {
        let manager = manager();
        let risk = manager.create(supplier_risk(), &Actor::new("analyst")).unwrap();
        let approved = manager.approve(risk.id, &Actor::new("manager")).unwrap();
        assert!(approved.approved);
        assert_eq!(approved.approved_by.as_deref(), Some("manager"));
        assert!(approved.approved_at.is_some());
    }
}
