//! Action plan and progress-history persistence

use chrono::{DateTime, Utc};
use rusqlite::types::{Type, Value};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::collections::BTreeMap;

use super::{opt_time_column, time_column, to_db_time};
use crate::model::{ActionPlan, ActionPlanFilter, ActionPlanUpdate, ActionStatus, Evidence};

pub(crate) const PLAN_COLUMNS: &str = "id, risk_id, description, responsible_area, \
     responsible_person, implementation_site, implementation_method, methodology, \
     required_resources, start_date, end_date, estimated_cost, actual_cost, currency, status, \
     completion_percent, is_overdue, monitoring_type, monitoring_notes, effective, \
     effectiveness_justification, created_by, created_at, updated_by, updated_at, version";

/// Terminal statuses, as a SQL list literal
const CLOSED_STATUSES: &str = "('Completed', 'Cancelled')";

pub(crate) fn plan_from_row(row: &Row<'_>) -> rusqlite::Result<ActionPlan> {
    Ok(ActionPlan {
        id: row.get(0)?,
        risk_id: row.get(1)?,
        description: row.get(2)?,
        responsible_area: row.get(3)?,
        responsible_person: row.get(4)?,
        implementation_site: row.get(5)?,
        implementation_method: row.get(6)?,
        methodology: row.get(7)?,
        required_resources: row.get(8)?,
        start_date: opt_time_column(row, 9)?,
        end_date: opt_time_column(row, 10)?,
        estimated_cost: row.get(11)?,
        actual_cost: row.get(12)?,
        currency: row.get(13)?,
        status: row.get(14)?,
        completion_percent: row.get(15)?,
        is_overdue: row.get(16)?,
        monitoring_type: row.get(17)?,
        monitoring_notes: row.get(18)?,
        effective: row.get(19)?,
        effectiveness_justification: row.get(20)?,
        created_by: row.get(21)?,
        created_at: time_column(row, 22)?,
        updated_by: row.get(23)?,
        updated_at: time_column(row, 24)?,
        version: row.get(25)?,
    })
}

/// Insert a new plan; the `id` field is ignored
pub fn insert_plan(conn: &Connection, plan: &ActionPlan) -> rusqlite::Result<i64> {
    conn.execute(
        "INSERT INTO action_plans (risk_id, description, responsible_area, responsible_person,
            implementation_site, implementation_method, methodology, required_resources,
            start_date, end_date, estimated_cost, actual_cost, currency, status,
            completion_percent, is_overdue, monitoring_type, monitoring_notes, effective,
            effectiveness_justification, created_by, created_at, updated_by, updated_at, version)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18,
            ?19, ?20, ?21, ?22, ?23, ?24, ?25)",
        params![
            plan.risk_id,
            plan.description,
            plan.responsible_area,
            plan.responsible_person,
            plan.implementation_site,
            plan.implementation_method,
            plan.methodology,
            plan.required_resources,
            plan.start_date.as_ref().map(to_db_time),
            plan.end_date.as_ref().map(to_db_time),
            plan.estimated_cost,
            plan.actual_cost,
            plan.currency,
            plan.status,
            plan.completion_percent,
            plan.is_overdue,
            plan.monitoring_type,
            plan.monitoring_notes,
            plan.effective,
            plan.effectiveness_justification,
            plan.created_by,
            to_db_time(&plan.created_at),
            plan.updated_by,
            to_db_time(&plan.updated_at),
            plan.version,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Overwrite every mutable column of a stored plan, guarded by
/// `prior_version`. Returns the number of rows written (0 or 1).
pub fn save_plan(conn: &Connection, plan: &ActionPlan, prior_version: i64) -> rusqlite::Result<usize> {
    conn.execute(
        "UPDATE action_plans SET description = ?1, responsible_area = ?2,
            responsible_person = ?3, implementation_site = ?4, implementation_method = ?5,
            methodology = ?6, required_resources = ?7, start_date = ?8, end_date = ?9,
            estimated_cost = ?10, actual_cost = ?11, currency = ?12, status = ?13,
            completion_percent = ?14, is_overdue = ?15, monitoring_type = ?16,
            monitoring_notes = ?17, effective = ?18, effectiveness_justification = ?19,
            updated_by = ?20, updated_at = ?21, version = ?22
         WHERE id = ?23 AND version = ?24",
        params![
            plan.description,
            plan.responsible_area,
            plan.responsible_person,
            plan.implementation_site,
            plan.implementation_method,
            plan.methodology,
            plan.required_resources,
            plan.start_date.as_ref().map(to_db_time),
            plan.end_date.as_ref().map(to_db_time),
            plan.estimated_cost,
            plan.actual_cost,
            plan.currency,
            plan.status,
            plan.completion_percent,
            plan.is_overdue,
            plan.monitoring_type,
            plan.monitoring_notes,
            plan.effective,
            plan.effectiveness_justification,
            plan.updated_by,
            to_db_time(&plan.updated_at),
            plan.version,
            plan.id,
            prior_version,
        ],
    )
}

pub fn load_plan(conn: &Connection, id: i64) -> rusqlite::Result<Option<ActionPlan>> {
    conn.query_row(
        &format!("SELECT {PLAN_COLUMNS} FROM action_plans WHERE id = ?1"),
        [id],
        plan_from_row,
    )
    .optional()
}

/// Stored version of a plan, if it exists
pub fn plan_version(conn: &Connection, id: i64) -> rusqlite::Result<Option<i64>> {
    conn.query_row("SELECT version FROM action_plans WHERE id = ?1", [id], |row| row.get(0))
        .optional()
}

/// Plans of one risk, oldest first
pub fn plans_for_risk(conn: &Connection, risk_id: i64) -> rusqlite::Result<Vec<ActionPlan>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {PLAN_COLUMNS} FROM action_plans WHERE risk_id = ?1 ORDER BY id"
    ))?;
    let plans = stmt
        .query_map([risk_id], plan_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(plans)
}

/// Rewrite the stored overdue flag of every open plan against `now`.
/// Returns how many rows flipped.
pub fn refresh_overdue_flags(conn: &Connection, now: &DateTime<Utc>) -> rusqlite::Result<usize> {
    conn.execute(
        &format!(
            "UPDATE action_plans
             SET is_overdue = CASE
                 WHEN end_date IS NOT NULL AND end_date < ?1 AND status NOT IN {CLOSED_STATUSES}
                 THEN 1 ELSE 0 END
             WHERE is_overdue <> CASE
                 WHEN end_date IS NOT NULL AND end_date < ?1 AND status NOT IN {CLOSED_STATUSES}
                 THEN 1 ELSE 0 END"
        ),
        [to_db_time(now)],
    )
}

/// Plans matching `filter`, oldest first. `now` decides the overdue filter.
pub fn list_plans(
    conn: &Connection,
    filter: &ActionPlanFilter,
    now: &DateTime<Utc>,
) -> rusqlite::Result<Vec<ActionPlan>> {
    let mut clauses: Vec<String> = Vec::new();
    let mut values: Vec<Value> = Vec::new();

    if let Some(risk_id) = filter.risk_id {
        clauses.push("risk_id = ?".to_string());
        values.push(Value::Integer(risk_id));
    }
    match filter.status {
        // Overdue is never stored; it is the open-and-late condition
        Some(ActionStatus::Overdue) => {
            clauses.push(format!(
                "end_date IS NOT NULL AND end_date < ? AND status NOT IN {CLOSED_STATUSES}"
            ));
            values.push(Value::Text(to_db_time(now)));
        }
        Some(status) => {
            clauses.push("status = ?".to_string());
            values.push(Value::Text(status.as_str().to_string()));
        }
        None => {}
    }
    if let Some(person) = filter.responsible_person.as_deref() {
        clauses.push("responsible_person = ?".to_string());
        values.push(Value::Text(person.to_string()));
    }
    if filter.overdue_only {
        clauses.push(format!(
            "end_date IS NOT NULL AND end_date < ? AND status NOT IN {CLOSED_STATUSES}"
        ));
        values.push(Value::Text(to_db_time(now)));
    }

    let where_sql = if clauses.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", clauses.join(" AND "))
    };
    let limit = filter
        .limit
        .map(|l| i64::try_from(l).unwrap_or(i64::MAX))
        .unwrap_or(-1);
    values.push(Value::Integer(limit));

    let mut stmt = conn.prepare(&format!(
        "SELECT {PLAN_COLUMNS} FROM action_plans{where_sql} ORDER BY id LIMIT ?"
    ))?;
    let plans = stmt
        .query_map(params_from_iter(values.iter()), plan_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(plans)
}

/// Open plans whose end date is at or before `cutoff`, earliest first
pub fn overdue_plans(conn: &Connection, cutoff: &DateTime<Utc>) -> rusqlite::Result<Vec<ActionPlan>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {PLAN_COLUMNS} FROM action_plans
         WHERE end_date IS NOT NULL AND end_date <= ?1 AND status NOT IN {CLOSED_STATUSES}
         ORDER BY end_date, id"
    ))?;
    let plans = stmt
        .query_map([to_db_time(cutoff)], plan_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(plans)
}

pub fn insert_plan_update(conn: &Connection, update: &ActionPlanUpdate) -> Result<i64, super::DatabaseError> {
    let evidence = serde_json::to_string(&update.evidence)?;
    conn.execute(
        "INSERT INTO action_plan_updates (plan_id, prior_status, new_status, prior_percent,
            new_percent, note, obstacles, solutions, evidence, updated_by, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            update.plan_id,
            update.prior_status,
            update.new_status,
            update.prior_percent,
            update.new_percent,
            update.note,
            update.obstacles,
            update.solutions,
            evidence,
            update.updated_by,
            to_db_time(&update.updated_at),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Progress history of one plan, oldest first
pub fn plan_updates_for(conn: &Connection, plan_id: i64) -> rusqlite::Result<Vec<ActionPlanUpdate>> {
    let mut stmt = conn.prepare(
        "SELECT id, plan_id, prior_status, new_status, prior_percent, new_percent, note,
            obstacles, solutions, evidence, updated_by, updated_at
         FROM action_plan_updates WHERE plan_id = ?1 ORDER BY id",
    )?;

    let records = stmt
        .query_map([plan_id], |row| {
            let raw: String = row.get(9)?;
            let evidence: Vec<Evidence> = serde_json::from_str(&raw)
                .map_err(|e| rusqlite::Error::FromSqlConversionFailure(9, Type::Text, Box::new(e)))?;
            Ok(ActionPlanUpdate {
                id: row.get(0)?,
                plan_id: row.get(1)?,
                prior_status: row.get(2)?,
                new_status: row.get(3)?,
                prior_percent: row.get(4)?,
                new_percent: row.get(5)?,
                note: row.get(6)?,
                obstacles: row.get(7)?,
                solutions: row.get(8)?,
                evidence,
                updated_by: row.get(10)?,
                updated_at: time_column(row, 11)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(records)
}

/// Plan counts keyed by status as reported to users: open plans past
/// their end date count as `Overdue`
pub fn count_by_effective_status(
    conn: &Connection,
    now: &DateTime<Utc>,
) -> rusqlite::Result<BTreeMap<String, u64>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT CASE
             WHEN end_date IS NOT NULL AND end_date < ?1 AND status NOT IN {CLOSED_STATUSES}
             THEN 'Overdue' ELSE status END AS effective, COUNT(*)
         FROM action_plans GROUP BY effective"
    ))?;
    let rows = stmt
        .query_map([to_db_time(now)], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows
        .into_iter()
        .map(|(status, n)| (status, u64::try_from(n).unwrap_or(0)))
        .collect())
}

/// Plans per responsible person, busiest first, ties by name
pub fn top_responsible(conn: &Connection, top_n: usize) -> rusqlite::Result<Vec<(String, u64)>> {
    let mut stmt = conn.prepare(
        "SELECT responsible_person, COUNT(*) AS n FROM action_plans
         WHERE responsible_person IS NOT NULL AND TRIM(responsible_person) <> ''
         GROUP BY responsible_person ORDER BY n DESC, responsible_person ASC LIMIT ?1",
    )?;
    let rows = stmt
        .query_map([i64::try_from(top_n).unwrap_or(i64::MAX)], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows
        .into_iter()
        .map(|(person, n)| (person, u64::try_from(n).unwrap_or(0)))
        .collect())
}

/// `(completed, completed on time)`; a plan without an end date counts as
/// on time
pub fn completion_counts(conn: &Connection) -> rusqlite::Result<(u64, u64)> {
    conn.query_row(
        "SELECT COUNT(*),
                COALESCE(SUM(CASE WHEN end_date IS NULL OR updated_at <= end_date THEN 1 ELSE 0 END), 0)
         FROM action_plans WHERE status = 'Completed'",
        [],
        |row| {
            let completed: i64 = row.get(0)?;
            let on_time: i64 = row.get(1)?;
            Ok((
                u64::try_from(completed).unwrap_or(0),
                u64::try_from(on_time).unwrap_or(0),
            ))
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Database;
    use chrono::Duration;

    fn seed_risk(conn: &Connection) -> i64 {
        let now = to_db_time(&Utc::now());
        conn.execute(
            "INSERT INTO risks (eap, code, source, category, title, description, causes,
                impact_type, consequences, identified_at, created_by, created_at, updated_at)
             VALUES ('1.1', 'RSK-001', 'Legal', 'Compliance', 't', 'd', 'c', 'Financial', 'q',
                ?1, 'tester', ?1, ?1)",
            [&now],
        )
        .unwrap();
        conn.last_insert_rowid()
    }

    fn plan(risk_id: i64, end: Option<DateTime<Utc>>, status: ActionStatus) -> ActionPlan {
        let now = Utc::now();
        ActionPlan {
            id: 0,
            risk_id,
            description: "Review supplier contracts".into(),
            responsible_area: None,
            responsible_person: Some("Ana".into()),
            implementation_site: None,
            implementation_method: None,
            methodology: None,
            required_resources: None,
            start_date: None,
            end_date: end,
            estimated_cost: None,
            actual_cost: None,
            currency: "BRL".into(),
            status,
            completion_percent: 0,
            is_overdue: false,
            monitoring_type: Default::default(),
            monitoring_notes: None,
            effective: None,
            effectiveness_justification: None,
            created_by: "tester".into(),
            created_at: now,
            updated_by: None,
            updated_at: now,
            version: 1,
        }
    }

    #[test]
    fn test_overdue_plans_respect_cutoff_and_status() {
        let db = Database::open_in_memory().unwrap();
        db.initialize().unwrap();
        let now = Utc::now();

        let ids: Vec<i64> = db
            .transaction(|tx| {
                let risk = seed_risk(tx);
                let late = insert_plan(tx, &plan(risk, Some(now - Duration::days(3)), ActionStatus::InProgress))?;
                let later = insert_plan(tx, &plan(risk, Some(now - Duration::days(10)), ActionStatus::NotStarted))?;
                insert_plan(tx, &plan(risk, Some(now - Duration::days(5)), ActionStatus::Completed))?;
                insert_plan(tx, &plan(risk, Some(now + Duration::days(5)), ActionStatus::InProgress))?;
                Ok::<_, crate::database::DatabaseError>(vec![later, late])
            })
            .unwrap();

        let overdue: Vec<i64> = db
            .read(|conn| overdue_plans(conn, &now).map_err(crate::database::DatabaseError::from))
            .unwrap()
            .iter()
            .map(|p| p.id)
            .collect();
        assert_eq!(overdue, ids);

        let tolerant = db
            .read(|conn| {
                overdue_plans(conn, &(now - Duration::days(7))).map_err(crate::database::DatabaseError::from)
            })
            .unwrap();
        assert_eq!(tolerant.len(), 1);
    }

    #[test]
    fn test_plan_update_evidence_roundtrip() {
        let db = Database::open_in_memory().unwrap();
        db.initialize().unwrap();

        let history = db
            .transaction(|tx| {
                let risk = seed_risk(tx);
                let plan_id = insert_plan(tx, &plan(risk, None, ActionStatus::NotStarted))?;
                insert_plan_update(
                    tx,
                    &ActionPlanUpdate {
                        id: 0,
                        plan_id,
                        prior_status: ActionStatus::NotStarted,
                        new_status: ActionStatus::InProgress,
                        prior_percent: 0,
                        new_percent: 20,
                        note: "Kick-off held".into(),
                        obstacles: None,
                        solutions: None,
                        evidence: vec![Evidence::new("minutes.pdf", "file:///minutes.pdf")],
                        updated_by: "tester".into(),
                        updated_at: Utc::now(),
                    },
                )?;
                Ok::<_, crate::database::DatabaseError>(plan_updates_for(tx, plan_id)?)
            })
            .unwrap();

        assert_eq!(history.len(), 1);
        assert_eq!(history[0].evidence[0].name, "minutes.pdf");
        assert_eq!(history[0].new_percent, 20);
    }
}
