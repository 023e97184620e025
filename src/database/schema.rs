//! Database schema module

/// Schema constants and initialization SQL
pub const SCHEMA_VERSION: &str = "1.0.0";

/// Connection settings applied to every database
pub const CONNECTION_PRAGMAS: &str = r#"
PRAGMA foreign_keys = ON;
"#;

/// Extra settings for file-backed databases
pub const FILE_PRAGMAS: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;
PRAGMA cache_size = 10000;
"#;

/// Initialize database with schema version tracking.
///
/// Timestamps are RFC 3339 UTC text with microsecond precision, so text
/// comparison orders them chronologically. Children reference parents with
/// `ON DELETE RESTRICT`: risks are only ever deactivated.
pub const INIT_SQL: &str = r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_version (
    version TEXT PRIMARY KEY,
    applied_at TEXT NOT NULL
);

-- Risks
CREATE TABLE IF NOT EXISTS risks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    eap TEXT NOT NULL,
    code TEXT NOT NULL UNIQUE,
    source TEXT NOT NULL,
    stages TEXT,
    category TEXT NOT NULL,
    title TEXT NOT NULL,
    description TEXT NOT NULL,
    causes TEXT NOT NULL,
    impact_type TEXT NOT NULL,
    consequences TEXT NOT NULL,
    probability TEXT,
    impact TEXT,
    criticality TEXT,
    criticality_justification TEXT,
    suggested_response TEXT,
    adopted_response TEXT,
    response_justification TEXT,
    active INTEGER NOT NULL DEFAULT 1,
    approved INTEGER NOT NULL DEFAULT 0,
    approved_at TEXT,
    approved_by TEXT,
    identified_at TEXT NOT NULL,
    created_by TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_by TEXT,
    updated_at TEXT NOT NULL,
    version INTEGER NOT NULL DEFAULT 1
);

-- Assessment history
CREATE TABLE IF NOT EXISTS assessment_history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    risk_id INTEGER NOT NULL REFERENCES risks(id) ON DELETE RESTRICT,
    prior_probability TEXT,
    new_probability TEXT,
    prior_impact TEXT,
    new_impact TEXT,
    prior_criticality TEXT,
    new_criticality TEXT,
    reason TEXT NOT NULL,
    evidence TEXT,
    assessed_by TEXT NOT NULL,
    assessed_at TEXT NOT NULL
);

-- Action plans
CREATE TABLE IF NOT EXISTS action_plans (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    risk_id INTEGER NOT NULL REFERENCES risks(id) ON DELETE RESTRICT,
    description TEXT NOT NULL,
    responsible_area TEXT,
    responsible_person TEXT,
    implementation_site TEXT,
    implementation_method TEXT,
    methodology TEXT,
    required_resources TEXT,
    start_date TEXT,
    end_date TEXT,
    estimated_cost REAL,
    actual_cost REAL,
    currency TEXT NOT NULL DEFAULT 'BRL',
    status TEXT NOT NULL,
    completion_percent INTEGER NOT NULL DEFAULT 0
        CHECK (completion_percent BETWEEN 0 AND 100),
    is_overdue INTEGER NOT NULL DEFAULT 0,
    monitoring_type TEXT NOT NULL,
    monitoring_notes TEXT,
    effective INTEGER,
    effectiveness_justification TEXT,
    created_by TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_by TEXT,
    updated_at TEXT NOT NULL,
    version INTEGER NOT NULL DEFAULT 1
);

-- Action plan progress history
CREATE TABLE IF NOT EXISTS action_plan_updates (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    plan_id INTEGER NOT NULL REFERENCES action_plans(id) ON DELETE RESTRICT,
    prior_status TEXT NOT NULL,
    new_status TEXT NOT NULL,
    prior_percent INTEGER NOT NULL,
    new_percent INTEGER NOT NULL,
    note TEXT NOT NULL,
    obstacles TEXT,
    solutions TEXT,
    evidence TEXT NOT NULL DEFAULT '[]',
    updated_by TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- Probability / impact scale definitions
CREATE TABLE IF NOT EXISTS scale_definitions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    scale TEXT NOT NULL,
    level TEXT NOT NULL,
    value INTEGER NOT NULL,
    description TEXT,
    examples TEXT,
    active INTEGER NOT NULL DEFAULT 1,
    UNIQUE (scale, level)
);

-- Response type definitions
CREATE TABLE IF NOT EXISTS response_types (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    description TEXT,
    examples TEXT,
    when_to_use TEXT,
    active INTEGER NOT NULL DEFAULT 1
);

-- Indexes
CREATE INDEX IF NOT EXISTS idx_risks_eap_criticality ON risks(eap, criticality);
CREATE INDEX IF NOT EXISTS idx_risks_source_category ON risks(source, category);
CREATE INDEX IF NOT EXISTS idx_risks_identified_at ON risks(identified_at);
CREATE INDEX IF NOT EXISTS idx_history_risk ON assessment_history(risk_id, assessed_at);
CREATE INDEX IF NOT EXISTS idx_plans_risk ON action_plans(risk_id);
CREATE INDEX IF NOT EXISTS idx_plans_status_end ON action_plans(status, end_date);
CREATE INDEX IF NOT EXISTS idx_plan_updates_plan ON action_plan_updates(plan_id, updated_at);
"#;

/// Reference data, inserted once
pub const SEED_SQL: &str = r#"
INSERT OR IGNORE INTO scale_definitions (scale, level, value, description, examples) VALUES
    ('probability', 'Very low', 1, 'Event is not expected to occur', 'Has never happened in comparable projects'),
    ('probability', 'Low', 2, 'Event could occur in exceptional circumstances', 'Happened once in comparable projects'),
    ('probability', 'Medium', 3, 'Event may occur at some point', 'Happened occasionally in comparable projects'),
    ('probability', 'High', 4, 'Event will probably occur', 'Happens in most comparable projects'),
    ('probability', 'Very high', 5, 'Event is expected to occur', 'Already occurring or imminent'),
    ('impact', 'Very low', 1, 'Negligible effect on objectives', 'Absorbed by routine work'),
    ('impact', 'Low', 2, 'Minor effect, easily recovered', 'Small delay without milestone change'),
    ('impact', 'Moderate', 3, 'Noticeable effect on one objective', 'Milestone slips or budget reserve used'),
    ('impact', 'High', 4, 'Major effect on several objectives', 'Deliverable compromised or regulator involved'),
    ('impact', 'Very high', 5, 'Objectives cannot be met', 'Project halted or legal sanction');

INSERT OR IGNORE INTO response_types (name, description, examples, when_to_use) VALUES
    ('Avoid', 'Remove the cause so the event cannot occur', 'Change scope, drop the activity', 'Criticality is unacceptable and the cause can be removed'),
    ('Mitigate', 'Reduce probability or impact', 'Add controls, reviews, redundancy', 'Treatment cost is proportional to the reduction obtained'),
    ('Transfer', 'Move the consequence to a third party', 'Insurance, contractual clauses, outsourcing', 'Another party is better placed to bear the impact'),
    ('Accept', 'Take no action beyond monitoring', 'Contingency reserve, periodic review', 'Criticality is low or treatment costs exceed the impact'),
    ('Share', 'Split ownership with partners', 'Joint ventures, consortium agreements', 'Opportunity and exposure are shared with partners');
"#;
