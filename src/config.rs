use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::history::HistorySchema;

const CONFIG_FILE: &str = "config.json";
pub const DEFAULT_PORT: u16 = 17020;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// SQLite database file. Defaults to the platform data directory.
    pub db_path: Option<PathBuf>,
    pub port: u16,
    /// Stripped from location paths in graph payloads.
    pub project_root: Option<PathBuf>,
    /// Schema served by `featureHistory` without an argument.
    pub history_schema: HistorySchema,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: None,
            port: DEFAULT_PORT,
            project_root: None,
            history_schema: HistorySchema::Current,
        }
    }
}

impl Config {
    /// Config file from the user's config directory, then environment
    /// overrides. A missing or unreadable file falls back to defaults.
    pub fn load() -> Self {
        let mut config = match config_path().map(|path| Self::from_file(&path)) {
            Some(Ok(config)) => config,
            Some(Err(e)) => {
                tracing::warn!("Failed to load config, using defaults: {:#}", e);
                Self::default()
            }
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        config
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path).context("Failed to read config file")?;
        serde_json::from_str(&content).context("Failed to parse config file")
    }

    /// Override fields from `FEATURE_LENS_*` variables. Unparseable values
    /// are ignored.
    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(path) = var("FEATURE_LENS_DB") {
            self.db_path = Some(PathBuf::from(path));
        }
        if let Some(port) = var("FEATURE_LENS_PORT").and_then(|s| s.parse().ok()) {
            self.port = port;
        }
        if let Some(root) = var("FEATURE_LENS_PROJECT_ROOT") {
            self.project_root = Some(PathBuf::from(root));
        }
        if let Some(schema) =
            var("FEATURE_LENS_HISTORY_SCHEMA").and_then(|s| HistorySchema::from_str(&s))
        {
            self.history_schema = schema;
        }
    }
}

fn config_path() -> Option<PathBuf> {
    let dirs = directories::ProjectDirs::from("", "", "feature-lens")?;
    Some(dirs.config_dir().join(CONFIG_FILE))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::from_file(&dir.path().join("config.json")).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.port, 17020);
    }

    #[test]
    fn file_values_fill_in_over_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"port": 4000, "history_schema": "legacy"}"#).unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.port, 4000);
        assert_eq!(config.history_schema, HistorySchema::Legacy);
        assert_eq!(config.db_path, None);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(Config::from_file(&path).is_err());
    }

    #[test]
    fn environment_overrides_file() {
        let env: HashMap<&str, &str> = [
            ("FEATURE_LENS_DB", "/tmp/lens.db"),
            ("FEATURE_LENS_PORT", "9000"),
            ("FEATURE_LENS_PROJECT_ROOT", "/work/project"),
            ("FEATURE_LENS_HISTORY_SCHEMA", "legacy"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_env(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.db_path, Some(PathBuf::from("/tmp/lens.db")));
        assert_eq!(config.port, 9000);
        assert_eq!(config.project_root, Some(PathBuf::from("/work/project")));
        assert_eq!(config.history_schema, HistorySchema::Legacy);
    }

    #[test]
    fn bad_environment_values_are_ignored() {
        let mut config = Config::default();
        config.apply_env(|key| match key {
            "FEATURE_LENS_PORT" => Some("not-a-port".to_string()),
            "FEATURE_LENS_HISTORY_SCHEMA" => Some("v9".to_string()),
            _ => None,
        });
        assert_eq!(config, Config::default());
    }
}
