//! Application configuration

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::engine::LevelPolicy;

pub const DEFAULT_DATABASE_PATH: &str = "data/risk_management.db";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    /// Where `backup` writes copies of the database
    pub backup_dir: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_DATABASE_PATH),
            backup_dir: PathBuf::from("backups"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub directory: PathBuf,
    pub file_name: String,
    /// `EnvFilter` directive used when `RUST_LOG` is unset
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("logs"),
            file_name: "risk-register.log".to_string(),
            level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub level_policy: LevelPolicy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    pub overdue_tolerance_days: i64,
    pub dashboard_top_n: usize,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            overdue_tolerance_days: 0,
            dashboard_top_n: 10,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub scoring: ScoringConfig,
    pub tracking: TrackingConfig,
}

impl Config {
    /// Read `path` when given and present, fall back to defaults, then apply
    /// environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) if path.exists() => Self::from_file(path)?,
            _ => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Override settings from `RISK_REGISTER_*` variables. `SQLITE_PATH` is
    /// honoured when `RISK_REGISTER_DB` is unset.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let set = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(path) = set("RISK_REGISTER_DB").or_else(|| set("SQLITE_PATH")) {
            self.database.path = PathBuf::from(path);
        }
        if let Some(dir) = set("RISK_REGISTER_LOG_DIR") {
            self.logging.directory = PathBuf::from(dir);
        }
        if let Some(level) = set("RISK_REGISTER_LOG_LEVEL") {
            self.logging.level = level;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.database.path, PathBuf::from(DEFAULT_DATABASE_PATH));
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.scoring.level_policy, LevelPolicy::Strict);
        assert_eq!(config.tracking.dashboard_top_n, 10);
        assert_eq!(config.tracking.overdue_tolerance_days, 0);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[scoring]\nlevel_policy = \"default-to-middle\"\n\n[tracking]\noverdue_tolerance_days = 3"
        )
        .unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.scoring.level_policy, LevelPolicy::DefaultToMiddle);
        assert_eq!(config.tracking.overdue_tolerance_days, 3);
        assert_eq!(config.tracking.dashboard_top_n, 10);
        assert_eq!(config.database, DatabaseConfig::default());
    }

    #[test]
    fn test_malformed_file_is_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[tracking]\ndashboard_top_n = \"ten\"").unwrap();
        assert!(matches!(
            Config::from_file(file.path()),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("SQLITE_PATH", "/srv/legacy.db"),
            ("RISK_REGISTER_LOG_LEVEL", "debug"),
            ("RISK_REGISTER_LOG_DIR", "  "),
        ]);
        let mut config = Config::default();
        config.apply_env(|key| vars.get(key).map(|v| v.to_string()));
        assert_eq!(config.database.path, PathBuf::from("/srv/legacy.db"));
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.directory, PathBuf::from("logs"));

        let vars: HashMap<&str, &str> =
            HashMap::from([("SQLITE_PATH", "/srv/legacy.db"), ("RISK_REGISTER_DB", "/srv/new.db")]);
        let mut config = Config::default();
        config.apply_env(|key| vars.get(key).map(|v| v.to_string()));
        assert_eq!(config.database.path, PathBuf::from("/srv/new.db"));
    }
}
