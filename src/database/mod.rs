//! Database module for the risk register
//!
//! SQL lives here; business rules live in `engine`. Functions taking a
//! `&Connection` can run inside a transaction opened by
//! [`Database::transaction`] (a `Transaction` derefs to `Connection`), so an
//! engine operation composes several of them into one atomic write.

pub mod action_plans;
pub mod reports;
pub mod risks;
pub mod schema;

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use rusqlite::functions::FunctionFlags;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;
use tracing::{debug, info};

use crate::model::ResponseType;

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Database lock poisoned")]
    LockPoisoned,
    #[error("Database not initialized")]
    NotInitialized,
}

/// Current time at the precision the tables store, so a record read back
/// compares equal to the one written
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Render a timestamp the way every table stores it
pub(crate) fn to_db_time(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_db_time(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub(crate) fn time_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    parse_db_time(idx, &raw)
}

pub(crate) fn opt_time_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|raw| parse_db_time(idx, &raw)).transpose()
}

/// Register `fold_case(text)`, a Unicode lowercase. SQLite's `LOWER` only
/// folds ASCII, so `LOWER('AÇÃO')` is `aÇÃo`.
fn register_functions(conn: &Connection) -> rusqlite::Result<()> {
    conn.create_scalar_function(
        "fold_case",
        1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let text: Option<String> = ctx.get(0)?;
            Ok(text.map(|t| t.to_lowercase()))
        },
    )
}

/// Which reference scale a definition belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScaleKind {
    Probability,
    Impact,
}

impl ScaleKind {
    fn as_str(self) -> &'static str {
        match self {
            ScaleKind::Probability => "probability",
            ScaleKind::Impact => "impact",
        }
    }
}

/// Row of the probability/impact reference scale
#[derive(Debug, Clone, Serialize)]
pub struct ScaleDefinition {
    pub id: i64,
    pub level: String,
    pub value: u8,
    pub description: Option<String>,
    pub examples: Option<String>,
}

/// Row of the response-type reference table
#[derive(Debug, Clone, Serialize)]
pub struct ResponseTypeDefinition {
    pub id: i64,
    pub name: ResponseType,
    pub description: Option<String>,
    pub examples: Option<String>,
    pub when_to_use: Option<String>,
}

/// Database statistics
#[derive(Debug, Clone, Serialize)]
pub struct DatabaseStats {
    pub risk_count: i64,
    pub active_risk_count: i64,
    pub action_plan_count: i64,
    pub assessment_count: i64,
    pub plan_update_count: i64,
}

/// Result of [`Database::health_check`]
#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    pub healthy: bool,
    pub schema_version: Option<String>,
    pub error: Option<String>,
    pub checked_at: DateTime<Utc>,
}

/// Database wrapper
pub struct Database {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl Database {
    /// Open or create a database file, creating its directory if needed
    pub fn new(path: impl AsRef<Path>) -> Result<Self, DatabaseError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.execute_batch(schema::CONNECTION_PRAGMAS)?;
        conn.execute_batch(schema::FILE_PRAGMAS)?;
        register_functions(&conn)?;
        debug!("Opened database at {}", path.display());

        Ok(Self {
            conn: Mutex::new(conn),
            path: Some(path.to_path_buf()),
        })
    }

    /// Private in-memory database, mostly for tests
    pub fn open_in_memory() -> Result<Self, DatabaseError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(schema::CONNECTION_PRAGMAS)?;
        register_functions(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: None,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, DatabaseError> {
        self.conn.lock().map_err(|_| DatabaseError::LockPoisoned)
    }

    /// Create tables and indexes, record the schema version and seed the
    /// reference tables. Safe to run on every start.
    pub fn initialize(&self) -> Result<(), DatabaseError> {
        self.transaction(|tx| {
            tx.execute_batch(schema::INIT_SQL)?;
            tx.execute(
                "INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (?1, ?2)",
                params![schema::SCHEMA_VERSION, to_db_time(&Utc::now())],
            )?;
            tx.execute_batch(schema::SEED_SQL)?;
            Ok::<_, DatabaseError>(())
        })?;
        info!("Database schema {} ready", schema::SCHEMA_VERSION);
        Ok(())
    }

    /// Run `f` inside one immediate transaction.
    ///
    /// Commits when `f` returns `Ok`; any error drops the transaction, which
    /// rolls every statement back.
    pub fn transaction<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T, E>,
        E: From<DatabaseError> + From<rusqlite::Error>,
    {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }

    /// Run read-only work against the connection
    pub fn read<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&Connection) -> Result<T, E>,
        E: From<DatabaseError>,
    {
        let conn = self.lock()?;
        f(&conn)
    }

    /// Current schema version, or `NotInitialized` before [`Database::initialize`]
    pub fn schema_version(&self) -> Result<String, DatabaseError> {
        self.read(|conn| {
            let exists: bool = conn.query_row(
                "SELECT EXISTS (SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'schema_version')",
                [],
                |row| row.get(0),
            )?;
            if !exists {
                return Err(DatabaseError::NotInitialized);
            }
            conn.query_row(
                "SELECT version FROM schema_version ORDER BY applied_at DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?
            .ok_or(DatabaseError::NotInitialized)
        })
    }

    /// Active definitions of one reference scale, lowest value first
    pub fn scale_definitions(&self, kind: ScaleKind) -> Result<Vec<ScaleDefinition>, DatabaseError> {
        self.read(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, level, value, description, examples
                 FROM scale_definitions WHERE scale = ?1 AND active = 1 ORDER BY value",
            )?;

            let records = stmt
                .query_map([kind.as_str()], |row| {
                    Ok(ScaleDefinition {
                        id: row.get(0)?,
                        level: row.get(1)?,
                        value: row.get(2)?,
                        description: row.get(3)?,
                        examples: row.get(4)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;

            Ok(records)
        })
    }

    /// Active response-type definitions
    pub fn response_types(&self) -> Result<Vec<ResponseTypeDefinition>, DatabaseError> {
        self.read(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, name, description, examples, when_to_use
                 FROM response_types WHERE active = 1 ORDER BY id",
            )?;

            let records = stmt
                .query_map([], |row| {
                    Ok(ResponseTypeDefinition {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        description: row.get(2)?,
                        examples: row.get(3)?,
                        when_to_use: row.get(4)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;

            Ok(records)
        })
    }

    /// Get statistics
    pub fn get_stats(&self) -> Result<DatabaseStats, DatabaseError> {
        self.read(|conn| {
            let count = |sql: &str| -> Result<i64, DatabaseError> {
                Ok(conn.query_row(sql, [], |row| row.get(0))?)
            };

            Ok(DatabaseStats {
                risk_count: count("SELECT COUNT(*) FROM risks")?,
                active_risk_count: count("SELECT COUNT(*) FROM risks WHERE active = 1")?,
                action_plan_count: count("SELECT COUNT(*) FROM action_plans")?,
                assessment_count: count("SELECT COUNT(*) FROM assessment_history")?,
                plan_update_count: count("SELECT COUNT(*) FROM action_plan_updates")?,
            })
        })
    }

    /// Check the connection and schema without failing
    pub fn health_check(&self) -> HealthStatus {
        let checked_at = Utc::now();
        let checked = self
            .read(|conn| {
                conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
                    .map_err(DatabaseError::from)
            })
            .and_then(|_| self.schema_version());

        match checked {
            Ok(version) => HealthStatus {
                healthy: true,
                schema_version: Some(version),
                error: None,
                checked_at,
            },
            Err(e) => HealthStatus {
                healthy: false,
                schema_version: None,
                error: Some(e.to_string()),
                checked_at,
            },
        }
    }

    /// Write a consistent copy of the database to `dest`
    pub fn backup_to(&self, dest: &Path) -> Result<PathBuf, DatabaseError> {
        if let Some(parent) = dest.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let target = dest.to_string_lossy().to_string();
        self.read(|conn| {
            conn.execute("VACUUM INTO ?1", [&target])?;
            Ok::<_, DatabaseError>(())
        })?;
        info!("Database backup written to {}", dest.display());
        Ok(dest.to_path_buf())
    }

    /// `backups/risk_register_backup_<timestamp>.db` under `dir`
    pub fn default_backup_path(dir: &Path) -> PathBuf {
        let stamp = Utc::now().format("%Y%m%d_%H%M%S");
        dir.join(format!("risk_register_backup_{stamp}.db"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initialize_is_idempotent_and_seeds_reference_tables() {
        let db = Database::open_in_memory().unwrap();
        db.initialize().unwrap();
        db.initialize().unwrap();

        let probability = db.scale_definitions(ScaleKind::Probability).unwrap();
        let values: Vec<u8> = probability.iter().map(|d| d.value).collect();
        assert_eq!(values, vec![1, 2, 3, 4, 5]);
        assert_eq!(db.scale_definitions(ScaleKind::Impact).unwrap().len(), 5);

        let responses: Vec<ResponseType> = db.response_types().unwrap().iter().map(|r| r.name).collect();
        assert_eq!(responses, ResponseType::ALL.to_vec());
        assert_eq!(db.schema_version().unwrap(), schema::SCHEMA_VERSION);
    }

    #[test]
    fn test_uninitialized_database_is_unhealthy() {
        let db = Database::open_in_memory().unwrap();
        assert!(matches!(db.schema_version(), Err(DatabaseError::NotInitialized)));
        let health = db.health_check();
        assert!(!health.healthy);

        db.initialize().unwrap();
        let health = db.health_check();
        assert!(health.healthy);
        assert_eq!(health.schema_version.as_deref(), Some(schema::SCHEMA_VERSION));
    }

    #[test]
    fn test_failed_transaction_rolls_back() {
        let db = Database::open_in_memory().unwrap();
        db.initialize().unwrap();

        let result: Result<(), DatabaseError> = db.transaction(|tx| {
            tx.execute("DELETE FROM response_types", [])?;
            Err(DatabaseError::NotInitialized)
        });
        assert!(result.is_err());
        assert_eq!(db.response_types().unwrap().len(), 5);
    }

    #[test]
    fn test_fold_case_lowers_accented_letters() {
        let db = Database::open_in_memory().unwrap();
        let folded: Option<String> = db
            .read(|conn| {
                conn.query_row("SELECT fold_case('AÇÃO Élevée')", [], |row| row.get(0))
                    .map_err(DatabaseError::from)
            })
            .unwrap();
        assert_eq!(folded.as_deref(), Some("ação élevée"));

        let null: Option<String> = db
            .read(|conn| {
                conn.query_row("SELECT fold_case(NULL)", [], |row| row.get(0))
                    .map_err(DatabaseError::from)
            })
            .unwrap();
        assert!(null.is_none());
    }

    #[test]
    fn test_time_text_roundtrip_keeps_order() {
        let earlier = Utc::now();
        let later = earlier + chrono::Duration::milliseconds(1);
        assert!(to_db_time(&earlier) < to_db_time(&later));
        let parsed = parse_db_time(0, &to_db_time(&earlier)).unwrap();
        assert_eq!(to_db_time(&parsed), to_db_time(&earlier));
    }

    #[test]
    fn test_file_database_backup() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(dir.path().join("data").join("register.db")).unwrap();
        db.initialize().unwrap();

        let backup = Database::default_backup_path(&dir.path().join("backups"));
        let written = db.backup_to(&backup).unwrap();
        assert!(written.exists());

        let copy = Database::new(&written).unwrap();
        assert_eq!(copy.response_types().unwrap().len(), 5);
    }
}
