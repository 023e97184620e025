//! Risk register
//!
//! Records project risks, scores their criticality from probability and
//! impact, keeps an audit trail of every reassessment and tracks the action
//! plans that mitigate them. Everything persists to SQLite.

pub mod config;
pub mod database;
pub mod engine;
pub mod error;
pub mod logging;
pub mod model;

use std::sync::Arc;

/// Re-export commonly used types
pub use config::Config;
pub use database::Database;
pub use engine::{ActionPlanTracker, LevelPolicy, Reports, RiskManager};
pub use error::{RegisterError, Result};

/// The three services sharing one database
#[derive(Debug, Clone)]
pub struct RiskRegister {
    pub database: Arc<Database>,
    pub risks: RiskManager,
    pub plans: ActionPlanTracker,
    pub reports: Reports,
}

impl RiskRegister {
    /// Wrap an already-initialized database
    pub fn new(database: Database) -> Self {
        let database = Arc::new(database);
        Self {
            risks: RiskManager::new(database.clone()),
            plans: ActionPlanTracker::new(database.clone()),
            reports: Reports::new(database.clone()),
            database,
        }
    }

    /// Open the configured database file and make sure its schema exists
    pub fn open(config: &Config) -> Result<Self> {
        let database = Database::new(&config.database.path)?;
        database.initialize()?;
        Ok(Self::new(database))
    }

    /// Private in-memory register
    pub fn in_memory() -> Result<Self> {
        let database = Database::open_in_memory()?;
        database.initialize()?;
        Ok(Self::new(database))
    }
}
