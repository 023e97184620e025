//! Risk and assessment-history persistence

use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};

use super::{opt_time_column, time_column, to_db_time};
use crate::model::{
    Assessment, AssessmentHistory, Criticality, Page, Risk, RiskFilter, RiskSort, RiskSortField,
};

pub(crate) const RISK_COLUMNS: &str = "id, eap, code, source, stages, category, title, description, \
     causes, impact_type, consequences, probability, impact, criticality, criticality_justification, \
     suggested_response, adopted_response, response_justification, active, approved, approved_at, \
     approved_by, identified_at, created_by, created_at, updated_by, updated_at, version";

pub(crate) fn risk_from_row(row: &Row<'_>) -> rusqlite::Result<Risk> {
    Ok(Risk {
        id: row.get(0)?,
        eap: row.get(1)?,
        code: row.get(2)?,
        source: row.get(3)?,
        stages: row.get(4)?,
        category: row.get(5)?,
        title: row.get(6)?,
        description: row.get(7)?,
        causes: row.get(8)?,
        impact_type: row.get(9)?,
        consequences: row.get(10)?,
        probability: row.get(11)?,
        impact: row.get(12)?,
        criticality: row.get(13)?,
        criticality_justification: row.get(14)?,
        suggested_response: row.get(15)?,
        adopted_response: row.get(16)?,
        response_justification: row.get(17)?,
        active: row.get(18)?,
        approved: row.get(19)?,
        approved_at: opt_time_column(row, 20)?,
        approved_by: row.get(21)?,
        identified_at: time_column(row, 22)?,
        created_by: row.get(23)?,
        created_at: time_column(row, 24)?,
        updated_by: row.get(25)?,
        updated_at: time_column(row, 26)?,
        version: row.get(27)?,
    })
}

/// Insert a new risk; the `id` field is ignored
pub fn insert_risk(conn: &Connection, risk: &Risk) -> rusqlite::Result<i64> {
    conn.execute(
        "INSERT INTO risks (eap, code, source, stages, category, title, description, causes,
            impact_type, consequences, probability, impact, criticality, criticality_justification,
            suggested_response, adopted_response, response_justification, active, approved,
            approved_at, approved_by, identified_at, created_by, created_at, updated_by, updated_at,
            version)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18,
            ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26, ?27)",
        params![
            risk.eap,
            risk.code,
            risk.source,
            risk.stages,
            risk.category,
            risk.title,
            risk.description,
            risk.causes,
            risk.impact_type,
            risk.consequences,
            risk.probability,
            risk.impact,
            risk.criticality,
            risk.criticality_justification,
            risk.suggested_response,
            risk.adopted_response,
            risk.response_justification,
            risk.active,
            risk.approved,
            risk.approved_at.as_ref().map(to_db_time),
            risk.approved_by,
            to_db_time(&risk.identified_at),
            risk.created_by,
            to_db_time(&risk.created_at),
            risk.updated_by,
            to_db_time(&risk.updated_at),
            risk.version,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Overwrite every mutable column of a stored risk.
///
/// Matches on `prior_version` as well as the id, so a concurrent writer that
/// got there first leaves this returning 0.
pub fn save_risk(conn: &Connection, risk: &Risk, prior_version: i64) -> rusqlite::Result<usize> {
    conn.execute(
        "UPDATE risks SET eap = ?1, source = ?2, stages = ?3, category = ?4, title = ?5,
            description = ?6, causes = ?7, impact_type = ?8, consequences = ?9, probability = ?10,
            impact = ?11, criticality = ?12, criticality_justification = ?13,
            suggested_response = ?14, adopted_response = ?15, response_justification = ?16,
            active = ?17, approved = ?18, approved_at = ?19, approved_by = ?20, updated_by = ?21,
            updated_at = ?22, version = ?23
         WHERE id = ?24 AND version = ?25",
        params![
            risk.eap,
            risk.source,
            risk.stages,
            risk.category,
            risk.title,
            risk.description,
            risk.causes,
            risk.impact_type,
            risk.consequences,
            risk.probability,
            risk.impact,
            risk.criticality,
            risk.criticality_justification,
            risk.suggested_response,
            risk.adopted_response,
            risk.response_justification,
            risk.active,
            risk.approved,
            risk.approved_at.as_ref().map(to_db_time),
            risk.approved_by,
            risk.updated_by,
            to_db_time(&risk.updated_at),
            risk.version,
            risk.id,
            prior_version,
        ],
    )
}

/// Soft-delete. Returns false when the risk is unknown or already inactive.
pub fn deactivate_risk(
    conn: &Connection,
    id: i64,
    actor_id: &str,
    at: &DateTime<Utc>,
) -> rusqlite::Result<bool> {
    let changed = conn.execute(
        "UPDATE risks SET active = 0, updated_by = ?1, updated_at = ?2, version = version + 1
         WHERE id = ?3 AND active = 1",
        params![actor_id, to_db_time(at), id],
    )?;
    Ok(changed == 1)
}

/// Stored version of a risk, if it exists
pub fn risk_version(conn: &Connection, id: i64) -> rusqlite::Result<Option<i64>> {
    conn.query_row("SELECT version FROM risks WHERE id = ?1", [id], |row| row.get(0))
        .optional()
}

pub fn load_risk(conn: &Connection, id: i64) -> rusqlite::Result<Option<Risk>> {
    conn.query_row(
        &format!("SELECT {RISK_COLUMNS} FROM risks WHERE id = ?1"),
        [id],
        risk_from_row,
    )
    .optional()
}

pub fn code_exists(conn: &Connection, code: &str) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT EXISTS (SELECT 1 FROM risks WHERE code = ?1)",
        [code],
        |row| row.get(0),
    )
}

/// One past the highest risk id ever assigned
pub fn next_risk_number(conn: &Connection) -> rusqlite::Result<i64> {
    conn.query_row("SELECT COALESCE(MAX(id), 0) + 1 FROM risks", [], |row| {
        row.get(0)
    })
}

pub fn insert_assessment(conn: &Connection, entry: &AssessmentHistory) -> rusqlite::Result<i64> {
    conn.execute(
        "INSERT INTO assessment_history (risk_id, prior_probability, new_probability, prior_impact,
            new_impact, prior_criticality, new_criticality, reason, evidence, assessed_by,
            assessed_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            entry.risk_id,
            entry.prior.probability,
            entry.new.probability,
            entry.prior.impact,
            entry.new.impact,
            entry.prior.criticality,
            entry.new.criticality,
            entry.reason,
            entry.evidence,
            entry.assessed_by,
            to_db_time(&entry.assessed_at),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Assessment history of one risk, oldest first
pub fn assessments_for(conn: &Connection, risk_id: i64) -> rusqlite::Result<Vec<AssessmentHistory>> {
    let mut stmt = conn.prepare(
        "SELECT id, risk_id, prior_probability, new_probability, prior_impact, new_impact,
            prior_criticality, new_criticality, reason, evidence, assessed_by, assessed_at
         FROM assessment_history WHERE risk_id = ?1 ORDER BY id",
    )?;

    let records = stmt
        .query_map([risk_id], |row| {
            Ok(AssessmentHistory {
                id: row.get(0)?,
                risk_id: row.get(1)?,
                prior: Assessment {
                    probability: row.get(2)?,
                    impact: row.get(4)?,
                    criticality: row.get(6)?,
                },
                new: Assessment {
                    probability: row.get(3)?,
                    impact: row.get(5)?,
                    criticality: row.get(7)?,
                },
                reason: row.get(8)?,
                evidence: row.get(9)?,
                assessed_by: row.get(10)?,
                assessed_at: time_column(row, 11)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(records)
}

/// `%needle%` for `LIKE ... ESCAPE '\'`, lowercased, with wildcards in the
/// needle taken literally
pub(crate) fn like_pattern(needle: &str) -> String {
    let mut pattern = String::with_capacity(needle.len() + 2);
    pattern.push('%');
    for c in needle.trim().to_lowercase().chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

/// SQL expression ranking `column` Low=1 .. Critical=4, unassessed=0
pub(crate) fn criticality_rank_sql(column: &str) -> String {
    let arms: String = Criticality::ALL
        .iter()
        .map(|c| format!(" WHEN '{}' THEN {}", c.as_str(), c.rank()))
        .collect();
    format!("CASE {column}{arms} ELSE 0 END")
}

fn where_clause(filter: &RiskFilter) -> (String, Vec<Value>) {
    let mut clauses: Vec<String> = Vec::new();
    let mut values: Vec<Value> = Vec::new();

    if let Some(eap) = filter.eap.as_deref().filter(|s| !s.trim().is_empty()) {
        clauses.push("fold_case(eap) LIKE ? ESCAPE '\\'".to_string());
        values.push(Value::Text(like_pattern(eap)));
    }
    if let Some(source) = filter.source {
        clauses.push("source = ?".to_string());
        values.push(Value::Text(source.as_str().to_string()));
    }
    if let Some(category) = filter.category {
        clauses.push("category = ?".to_string());
        values.push(Value::Text(category.as_str().to_string()));
    }
    if !filter.criticality.is_empty() {
        let marks = vec!["?"; filter.criticality.len()].join(", ");
        clauses.push(format!("criticality IN ({marks})"));
        values.extend(
            filter
                .criticality
                .iter()
                .map(|c| Value::Text(c.as_str().to_string())),
        );
    }
    if let Some(text) = filter.text.as_deref().filter(|s| !s.trim().is_empty()) {
        let columns = ["title", "description", "causes", "consequences"];
        let any = columns
            .iter()
            .map(|col| format!("fold_case({col}) LIKE ? ESCAPE '\\'"))
            .collect::<Vec<_>>()
            .join(" OR ");
        clauses.push(format!("({any})"));
        let pattern = like_pattern(text);
        values.extend(columns.iter().map(|_| Value::Text(pattern.clone())));
    }
    if let Some(from) = filter.identified_from {
        clauses.push("identified_at >= ?".to_string());
        values.push(Value::Text(to_db_time(&from)));
    }
    if let Some(to) = filter.identified_to {
        clauses.push("identified_at <= ?".to_string());
        values.push(Value::Text(to_db_time(&to)));
    }
    if let Some(active) = filter.active {
        clauses.push("active = ?".to_string());
        values.push(Value::Integer(i64::from(active)));
    }

    if clauses.is_empty() {
        (String::new(), values)
    } else {
        (format!(" WHERE {}", clauses.join(" AND ")), values)
    }
}

fn order_clause(sort: RiskSort) -> String {
    let column = match sort.field {
        RiskSortField::Id => return format!(" ORDER BY id {}", sort.direction.sql()),
        RiskSortField::Code => "code".to_string(),
        RiskSortField::Eap => "eap".to_string(),
        RiskSortField::Title => "title COLLATE NOCASE".to_string(),
        RiskSortField::Criticality => criticality_rank_sql("criticality"),
        RiskSortField::IdentifiedAt => "identified_at".to_string(),
        RiskSortField::UpdatedAt => "updated_at".to_string(),
    };
    format!(" ORDER BY {column} {}, id ASC", sort.direction.sql())
}

/// Filtered, sorted page of risks plus the total matching count before
/// paging
pub fn query_risks(
    conn: &Connection,
    filter: &RiskFilter,
    sort: RiskSort,
    page: Page,
) -> rusqlite::Result<(Vec<Risk>, u64)> {
    let (where_sql, mut values) = where_clause(filter);

    let total: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM risks{where_sql}"),
        params_from_iter(values.iter()),
        |row| row.get(0),
    )?;

    let limit = page
        .limit
        .map(|l| i64::try_from(l).unwrap_or(i64::MAX))
        .unwrap_or(-1);
    let offset = i64::try_from(page.offset).unwrap_or(i64::MAX);
    values.push(Value::Integer(limit));
    values.push(Value::Integer(offset));

    let sql = format!(
        "SELECT {RISK_COLUMNS} FROM risks{where_sql}{} LIMIT ? OFFSET ?",
        order_clause(sort)
    );
    let mut stmt = conn.prepare(&sql)?;
    let risks = stmt
        .query_map(params_from_iter(values.iter()), risk_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok((risks, u64::try_from(total).unwrap_or(0)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("Fraud"), "%fraud%");
        assert_eq!(like_pattern(" 100%_done "), "%100\\%\\_done%");
    }

    #[test]
    fn test_criticality_rank_sql_lists_every_tier() {
        let sql = criticality_rank_sql("criticality");
        assert!(sql.starts_with("CASE criticality WHEN 'Low' THEN 1"));
        assert!(sql.contains("WHEN 'Critical' THEN 4"));
        assert!(sql.ends_with("ELSE 0 END"));
    }

    #[test]
    fn test_empty_filter_has_no_where_clause() {
        let (sql, values) = where_clause(&RiskFilter::default());
        assert!(sql.is_empty());
        assert!(values.is_empty());

        let (sql, values) = where_clause(&RiskFilter {
            text: Some("vendor".into()),
            active: Some(true),
            ..RiskFilter::default()
        });
        assert!(sql.starts_with(" WHERE ("));
        assert_eq!(values.len(), 5);
    }
}
