//! Read-only aggregate queries behind the management reports

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use serde::Serialize;
use std::collections::BTreeMap;

use super::risks::{criticality_rank_sql, risk_from_row, RISK_COLUMNS};
use super::{opt_time_column, to_db_time};
use crate::model::{
    ActionStatus, Criticality, ImpactLevel, ProbabilityLevel, ResponseType, Risk, RiskCategory,
    RiskSource,
};

/// Bucket label for risks not yet assessed
pub const UNASSESSED: &str = "Unassessed";

const OPEN_AND_LATE: &str =
    "p.end_date IS NOT NULL AND p.end_date < ?1 AND p.status NOT IN ('Completed', 'Cancelled')";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskSummary {
    pub id: i64,
    pub code: String,
    pub eap: String,
    pub title: String,
    pub criticality: Option<Criticality>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskDashboard {
    pub active_risks: u64,
    pub action_plans: u64,
    pub overdue_plans: u64,
    pub by_criticality: BTreeMap<String, u64>,
    pub by_source: BTreeMap<String, u64>,
    pub by_category: BTreeMap<String, u64>,
    pub critical_risks: Vec<RiskSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatrixRow {
    pub id: i64,
    pub code: String,
    pub title: String,
    pub source: RiskSource,
    pub category: RiskCategory,
    pub probability: Option<ProbabilityLevel>,
    pub impact: Option<ImpactLevel>,
    pub criticality: Option<Criticality>,
    pub adopted_response: Option<ResponseType>,
    pub plan_count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlanReportRow {
    pub risk_id: i64,
    pub risk_code: String,
    pub risk_title: String,
    pub plan_id: i64,
    pub description: String,
    pub responsible_person: Option<String>,
    pub end_date: Option<DateTime<Utc>>,
    /// `Overdue` for open plans past their end date
    pub status: ActionStatus,
    pub completion_percent: u8,
}

/// Raw counts for one KPI period
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PeriodCounts {
    pub new_risks: u64,
    pub assessment_changes: u64,
    pub plans_created: u64,
    pub plans_completed: u64,
    pub plans_before_period: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EvolutionPoint {
    /// `YYYY-MM`
    pub month: String,
    pub criticality: Option<Criticality>,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct FilterOptions {
    pub eaps: Vec<String>,
    pub sources: Vec<RiskSource>,
    pub categories: Vec<RiskCategory>,
    pub criticalities: Vec<Criticality>,
}

fn to_count(n: i64) -> u64 {
    u64::try_from(n).unwrap_or(0)
}

fn count(conn: &Connection, sql: &str, args: impl rusqlite::Params) -> rusqlite::Result<u64> {
    conn.query_row(sql, args, |row| row.get::<_, i64>(0)).map(to_count)
}

fn grouped(conn: &Connection, column: &str) -> rusqlite::Result<BTreeMap<String, u64>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT COALESCE({column}, '{UNASSESSED}') AS label, COUNT(*)
         FROM risks WHERE active = 1 GROUP BY label"
    ))?;
    let rows = stmt
        .query_map([], |row| {
            Ok((row.get::<_, String>(0)?, to_count(row.get::<_, i64>(1)?)))
        })?
        .collect::<Result<BTreeMap<_, _>, _>>()?;
    Ok(rows)
}

pub fn risk_dashboard(conn: &Connection, now: &DateTime<Utc>) -> rusqlite::Result<RiskDashboard> {
    let active_risks = count(conn, "SELECT COUNT(*) FROM risks WHERE active = 1", [])?;
    let action_plans = count(
        conn,
        "SELECT COUNT(*) FROM action_plans p JOIN risks r ON r.id = p.risk_id WHERE r.active = 1",
        [],
    )?;
    let overdue_plans = count(
        conn,
        &format!(
            "SELECT COUNT(*) FROM action_plans p JOIN risks r ON r.id = p.risk_id
             WHERE r.active = 1 AND {OPEN_AND_LATE}"
        ),
        [to_db_time(now)],
    )?;

    let mut stmt = conn.prepare(
        "SELECT id, code, eap, title, criticality FROM risks
         WHERE active = 1 AND criticality = 'Critical' ORDER BY updated_at DESC, id LIMIT 10",
    )?;
    let critical_risks = stmt
        .query_map([], |row| {
            Ok(RiskSummary {
                id: row.get(0)?,
                code: row.get(1)?,
                eap: row.get(2)?,
                title: row.get(3)?,
                criticality: row.get(4)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(RiskDashboard {
        active_risks,
        action_plans,
        overdue_plans,
        by_criticality: grouped(conn, "criticality")?,
        by_source: grouped(conn, "source")?,
        by_category: grouped(conn, "category")?,
        critical_risks,
    })
}

/// Active risks, most critical first
pub fn risk_matrix(conn: &Connection) -> rusqlite::Result<Vec<MatrixRow>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT r.id, r.code, r.title, r.source, r.category, r.probability, r.impact,
            r.criticality, r.adopted_response,
            (SELECT COUNT(*) FROM action_plans p WHERE p.risk_id = r.id)
         FROM risks r WHERE r.active = 1
         ORDER BY {} DESC, r.code",
        criticality_rank_sql("r.criticality")
    ))?;
    let rows = stmt
        .query_map([], |row| {
            Ok(MatrixRow {
                id: row.get(0)?,
                code: row.get(1)?,
                title: row.get(2)?,
                source: row.get(3)?,
                category: row.get(4)?,
                probability: row.get(5)?,
                impact: row.get(6)?,
                criticality: row.get(7)?,
                adopted_response: row.get(8)?,
                plan_count: to_count(row.get(9)?),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Plans of active risks, by risk code then plan id
pub fn action_plan_report(
    conn: &Connection,
    risk_id: Option<i64>,
    now: &DateTime<Utc>,
) -> rusqlite::Result<Vec<PlanReportRow>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT r.id, r.code, r.title, p.id, p.description, p.responsible_person, p.end_date,
            CASE WHEN {OPEN_AND_LATE} THEN 'Overdue' ELSE p.status END, p.completion_percent
         FROM action_plans p JOIN risks r ON r.id = p.risk_id
         WHERE r.active = 1 AND (?2 IS NULL OR r.id = ?2)
         ORDER BY r.code, p.id"
    ))?;
    let rows = stmt
        .query_map(params![to_db_time(now), risk_id], |row| {
            Ok(PlanReportRow {
                risk_id: row.get(0)?,
                risk_code: row.get(1)?,
                risk_title: row.get(2)?,
                plan_id: row.get(3)?,
                description: row.get(4)?,
                responsible_person: row.get(5)?,
                end_date: opt_time_column(row, 6)?,
                status: row.get(7)?,
                completion_percent: row.get(8)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Activity since `start`
pub fn period_counts(conn: &Connection, start: &DateTime<Utc>) -> rusqlite::Result<PeriodCounts> {
    let start = to_db_time(start);
    Ok(PeriodCounts {
        new_risks: count(
            conn,
            "SELECT COUNT(*) FROM risks WHERE identified_at >= ?1",
            [&start],
        )?,
        assessment_changes: count(
            conn,
            "SELECT COUNT(*) FROM assessment_history WHERE assessed_at >= ?1",
            [&start],
        )?,
        plans_created: count(
            conn,
            "SELECT COUNT(*) FROM action_plans WHERE created_at >= ?1",
            [&start],
        )?,
        plans_completed: count(
            conn,
            "SELECT COUNT(*) FROM action_plans WHERE status = 'Completed' AND updated_at >= ?1",
            [&start],
        )?,
        plans_before_period: count(
            conn,
            "SELECT COUNT(*) FROM action_plans WHERE created_at < ?1",
            [&start],
        )?,
    })
}

/// Risks identified since `start`, per month and criticality
pub fn criticality_evolution(
    conn: &Connection,
    start: &DateTime<Utc>,
) -> rusqlite::Result<Vec<EvolutionPoint>> {
    let mut stmt = conn.prepare(
        "SELECT substr(identified_at, 1, 7) AS month, criticality, COUNT(*)
         FROM risks WHERE identified_at >= ?1
         GROUP BY month, criticality ORDER BY month, criticality",
    )?;
    let points = stmt
        .query_map([to_db_time(start)], |row| {
            Ok(EvolutionPoint {
                month: row.get(0)?,
                criticality: row.get(1)?,
                count: to_count(row.get(2)?),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(points)
}

/// Other active risks sharing the source, the category or the
/// probability/impact pair of `reference`; closest matches first
pub fn similar_risks(conn: &Connection, reference: &Risk, limit: usize) -> rusqlite::Result<Vec<Risk>> {
    let same_pair = "(probability IS NOT NULL AND probability = ?4 AND impact = ?5)";
    let mut stmt = conn.prepare(&format!(
        "SELECT {RISK_COLUMNS} FROM risks
         WHERE active = 1 AND id <> ?1 AND (source = ?2 OR category = ?3 OR {same_pair})
         ORDER BY (source = ?2) + (category = ?3) + COALESCE({same_pair}, 0) DESC, id
         LIMIT ?6"
    ))?;
    let risks = stmt
        .query_map(
            params![
                reference.id,
                reference.source,
                reference.category,
                reference.probability,
                reference.impact,
                i64::try_from(limit).unwrap_or(i64::MAX),
            ],
            risk_from_row,
        )?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(risks)
}

/// Distinct values present on active risks, for building filter widgets
pub fn filter_options(conn: &Connection) -> rusqlite::Result<FilterOptions> {
    let eaps = {
        let mut stmt = conn.prepare("SELECT DISTINCT eap FROM risks WHERE active = 1 ORDER BY eap")?;
        let rows = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        rows
    };
    let sources = {
        let mut stmt = conn.prepare("SELECT DISTINCT source FROM risks WHERE active = 1")?;
        let mut rows = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<RiskSource>, _>>()?;
        rows.sort();
        rows
    };
    let categories = {
        let mut stmt = conn.prepare("SELECT DISTINCT category FROM risks WHERE active = 1")?;
        let mut rows = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<RiskCategory>, _>>()?;
        rows.sort();
        rows
    };
    let criticalities = {
        let mut stmt = conn.prepare(
            "SELECT DISTINCT criticality FROM risks WHERE active = 1 AND criticality IS NOT NULL",
        )?;
        let mut rows = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<Criticality>, _>>()?;
        rows.sort();
        rows
    };

    Ok(FilterOptions {
        eaps,
        sources,
        categories,
        criticalities,
    })
}
