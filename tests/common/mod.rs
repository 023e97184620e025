#![allow(dead_code)]

use risk_register::model::{
    Actor, ImpactLevel, ImpactType, NewRisk, ProbabilityLevel, RiskCategory, RiskSource,
};
use risk_register::RiskRegister;

pub fn register() -> RiskRegister {
    RiskRegister::in_memory().expect("in-memory register")
}

pub fn analyst() -> Actor {
    Actor::new("u-17").with_name("Risk Analyst")
}

pub fn new_risk(title: &str) -> NewRisk {
    NewRisk::new("1.4.2", RiskSource::Operational, RiskCategory::Process, ImpactType::ProjectObjective)
        .with_event(title, format!("{title}, described"))
        .with_causes("Thin staffing")
        .with_consequences("Milestone slips")
}

pub fn assessed_risk(title: &str, p: ProbabilityLevel, i: ImpactLevel) -> NewRisk {
    new_risk(title).with_assessment(p, i)
}
