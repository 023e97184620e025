mod common;

use common::{analyst, assessed_risk};
use risk_register::database::{Database, ScaleKind};
use risk_register::model::{ImpactLevel, NewActionPlan, ProbabilityLevel};
use risk_register::{Config, RiskRegister};

#[test]
fn records_survive_reopening() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.database.path = dir.path().join("nested").join("register.db");

    let (risk_id, plan_id) = {
        let register = RiskRegister::open(&config).unwrap();
        let risk = register
            .risks
            .create(assessed_risk("Port strike", ProbabilityLevel::Medium, ImpactLevel::High), &analyst())
            .unwrap();
        let plan = register
            .plans
            .create(risk.id, NewActionPlan::new("Book alternative route"), &analyst())
            .unwrap();
        (risk.id, plan.id)
    };

    let register = RiskRegister::open(&config).unwrap();
    let risk = register.risks.get(risk_id).unwrap().unwrap();
    assert_eq!(risk.code, "RSK-001");
    assert_eq!(register.plans.list_for_risk(risk_id).unwrap()[0].id, plan_id);
    assert!(register.database.health_check().healthy);

    let stats = register.database.get_stats().unwrap();
    assert_eq!(stats.risk_count, 1);
    assert_eq!(stats.action_plan_count, 1);
}

#[test]
fn reference_scales_are_seeded_once() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("register.db");
    for _ in 0..2 {
        let db = Database::new(&path).unwrap();
        db.initialize().unwrap();
    }
    let db = Database::new(&path).unwrap();
    let levels: Vec<String> = db
        .scale_definitions(ScaleKind::Impact)
        .unwrap()
        .into_iter()
        .map(|d| d.level)
        .collect();
    assert_eq!(levels, vec!["Very low", "Low", "Moderate", "High", "Very high"]);
}
