//! Configuration Management
//!
//! Two sources: per-environment credentials from the process environment
//! (optionally seeded from a `.env` file), and persistent user preferences
//! stored as JSON in the config directory.

use crate::backup::DEFAULT_BACKUP_DIR;
use crate::error::{Error, Result};
use crate::gate::SEMAPHORE_LIMIT;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Target Redash instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[value(aliases = ["d", "dev"])]
    Development,
    #[value(aliases = ["p", "prod"])]
    Production,
}

impl Environment {
    pub const ALL: [Environment; 2] = [Environment::Development, Environment::Production];

    /// Names of the variables holding the base URL and the API key
    pub fn variables(self) -> (&'static str, &'static str) {
        match self {
            Environment::Development => ("DEV_REDASH_URL", "DEV_API_KEY"),
            Environment::Production => ("PROD_REDASH_URL", "PROD_API_KEY"),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Environment::Development => "DEVELOP",
            Environment::Production => "PRODUCTION",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Environment {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "d" | "dev" | "development" => Ok(Environment::Development),
            "p" | "prod" | "production" => Ok(Environment::Production),
            other => Err(Error::validation(format!(
                "unknown environment {:?} (expected development or production)",
                other
            ))),
        }
    }
}

/// Base URL and API key of one environment
#[derive(Clone)]
pub struct Credentials {
    pub environment: Environment,
    pub base_url: String,
    pub api_key: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("environment", &self.environment)
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

impl Credentials {
    /// Read credentials for `environment` from the process environment
    pub fn from_env(environment: Environment) -> Result<Self> {
        Self::from_lookup(environment, |key| std::env::var(key).ok())
    }

    /// Read credentials through `lookup`; blank values count as missing
    pub fn from_lookup<F>(environment: Environment, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let (url_var, key_var) = environment.variables();
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .ok_or_else(|| Error::validation(format!("{} is not set for {}", key, environment)))
        };

        Ok(Self {
            environment,
            base_url: get(url_var)?,
            api_key: get(key_var)?,
        })
    }
}

/// User configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    /// Last used environment
    #[serde(default)]
    pub last_environment: Option<Environment>,
    /// Maximum concurrent API requests
    #[serde(default)]
    pub concurrency_limit: Option<usize>,
    /// Where snapshots are written
    #[serde(default)]
    pub backup_dir: Option<PathBuf>,
    /// Extra test-message prefixes to ignore when selecting by failed test
    #[serde(default)]
    pub ignored_test_messages: Vec<String>,
    /// Per-request timeout in seconds
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
}

impl Config {
    /// Get the config file path
    fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("dsprune").join("config.json"))
    }

    /// Load configuration from disk
    pub fn load() -> Self {
        let Some(path) = Self::config_path() else {
            return Self::default();
        };

        if !path.exists() {
            return Self::default();
        }

        match std::fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                tracing::warn!("Ignoring unreadable config {:?}: {}", path, e);
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    /// Save configuration to disk
    pub fn save(&self) -> anyhow::Result<()> {
        let Some(path) = Self::config_path() else {
            return Ok(());
        };

        // Create parent directory
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, content)?;

        Ok(())
    }

    /// Get effective concurrency (CLI > config > default)
    pub fn effective_concurrency(&self, cli: Option<usize>) -> usize {
        cli.or(self.concurrency_limit).unwrap_or(SEMAPHORE_LIMIT).max(1)
    }

    /// Get effective backup directory (CLI > config > default)
    pub fn effective_backup_dir(&self, cli: Option<PathBuf>) -> PathBuf {
        cli.or_else(|| self.backup_dir.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_BACKUP_DIR))
    }

    /// Get effective request timeout (CLI > config > default)
    pub fn effective_timeout(&self, cli: Option<u64>) -> Duration {
        cli.or(self.request_timeout_secs)
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
            .unwrap_or(crate::redash::DEFAULT_TIMEOUT)
    }

    /// Remember the environment and save
    pub fn set_environment(&mut self, environment: Environment) -> anyhow::Result<()> {
        self.last_environment = Some(environment);
        self.save()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_credentials_per_environment() {
        let vars = lookup(&[
            ("DEV_REDASH_URL", "https://dev.redash"),
            ("DEV_API_KEY", "dev-key"),
            ("PROD_REDASH_URL", "https://redash"),
            ("PROD_API_KEY", " prod-key "),
        ]);

        let dev = Credentials::from_lookup(Environment::Development, &vars).unwrap();
        assert_eq!(dev.base_url, "https://dev.redash");

        let prod = Credentials::from_lookup(Environment::Production, &vars).unwrap();
        assert_eq!(prod.api_key, "prod-key");
    }

    #[test]
    fn test_missing_or_blank_credentials_are_rejected() {
        let vars = lookup(&[("DEV_REDASH_URL", "https://dev.redash"), ("DEV_API_KEY", "  ")]);
        let err = Credentials::from_lookup(Environment::Development, &vars).unwrap_err();
        assert!(err.to_string().contains("DEV_API_KEY"));

        assert!(Credentials::from_lookup(Environment::Production, &vars).is_err());
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let creds = Credentials {
            environment: Environment::Production,
            base_url: "https://redash".to_string(),
            api_key: "secret".to_string(),
        };
        assert!(!format!("{:?}", creds).contains("secret"));
    }

    #[test]
    fn test_environment_codes() {
        assert_eq!("d".parse::<Environment>().unwrap(), Environment::Development);
        assert_eq!("P".parse::<Environment>().unwrap(), Environment::Production);
        assert!(matches!("x".parse::<Environment>(), Err(Error::Validation(_))));
    }

    #[test]
    fn test_effective_values() {
        let config = Config {
            concurrency_limit: Some(4),
            backup_dir: Some(PathBuf::from("/var/backups")),
            ..Config::default()
        };

        assert_eq!(config.effective_concurrency(None), 4);
        assert_eq!(config.effective_concurrency(Some(2)), 2);
        assert_eq!(config.effective_concurrency(Some(0)), 1);
        assert_eq!(Config::default().effective_concurrency(None), SEMAPHORE_LIMIT);

        assert_eq!(config.effective_backup_dir(None), PathBuf::from("/var/backups"));
        assert_eq!(
            Config::default().effective_backup_dir(None),
            PathBuf::from(DEFAULT_BACKUP_DIR)
        );
    }

    #[test]
    fn test_config_parses_partial_json() {
        let config: Config =
            serde_json::from_str(r#"{"last_environment": "production", "request_timeout_secs": 5}"#)
                .unwrap();
        assert_eq!(config.last_environment, Some(Environment::Production));
        assert_eq!(config.effective_timeout(None), Duration::from_secs(5));
        assert!(config.ignored_test_messages.is_empty());
    }

    #[test]
    fn test_effective_timeout_precedence() {
        let config = Config {
            request_timeout_secs: Some(5),
            ..Default::default()
        };
        assert_eq!(config.effective_timeout(Some(600)), Duration::from_secs(600));
        assert_eq!(config.effective_timeout(Some(0)), crate::redash::DEFAULT_TIMEOUT);

        let config = Config::default();
        assert_eq!(config.effective_timeout(None), crate::redash::DEFAULT_TIMEOUT);
        assert!(crate::redash::DEFAULT_TIMEOUT >= Duration::from_secs(300));
    }
}
