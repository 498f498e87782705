//! Configuration handling for sql_command
//!
//! Configuration comes from one of two places: a TOML file passed on the
//! command line, or the `DB_*` environment variables. Either way it is turned
//! into a [`Config`] once at startup and passed down explicitly.

use serde::{Deserialize, Serialize};
use sqlx::postgres::{PgConnectOptions, PgSslMode};
use std::fmt;
use std::fs;
use std::time::Duration;

use crate::error::{Error, Result};

/// Database used by the bootstrap routine before the application database exists
pub const ADMIN_DATABASE: &str = "postgres";

/// Connect timeout applied when none is configured
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Load configuration from a TOML file
pub fn load_from_file(path: &str) -> Result<Config> {
    let config_str = fs::read_to_string(path)
        .map_err(|e| Error::ConfigError(format!("Failed to read config file: {}", e)))?;

    let config: Config = toml::from_str(&config_str)
        .map_err(|e| Error::ConfigError(format!("Failed to parse config file: {}", e)))?;

    Ok(config)
}

/// Load configuration from `path` if given, otherwise from the environment
pub fn load(path: Option<&str>) -> Result<Config> {
    match path {
        Some(path) => load_from_file(path),
        None => Ok(Config {
            database: DatabaseConfig::from_env()?,
            logging: None,
        }),
    }
}

/// Represents the complete sql_command configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    pub database: DatabaseConfig,
    pub logging: Option<LoggingConfig>,
}

/// Database connection configuration
#[derive(Serialize, Deserialize, Clone, PartialEq)]
pub struct DatabaseConfig {
    pub user: String,
    pub password: String,
    pub host: String,
    pub port: u16,
    pub database: String,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_seconds: u64,
    pub enable_ssl: Option<bool>,
}

fn default_connect_timeout() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_SECS
}

impl DatabaseConfig {
    /// Build the configuration from `DB_USER`, `DB_PASSWORD`, `DB_HOST`,
    /// `DB_PORT`, `DB_NAME` and the optional `DB_CONNECT_TIMEOUT`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key)
                .filter(|value| !value.is_empty())
                .ok_or_else(|| Error::ConfigError(format!("{} is not set", key)))
        };

        let port = required("DB_PORT")?;
        let port = port
            .trim()
            .parse::<u16>()
            .map_err(|e| Error::ConfigError(format!("DB_PORT '{}' is not a valid port: {}", port, e)))?;

        let connect_timeout_seconds = match lookup("DB_CONNECT_TIMEOUT") {
            Some(raw) if !raw.is_empty() => raw.trim().parse::<u64>().map_err(|e| {
                Error::ConfigError(format!("DB_CONNECT_TIMEOUT '{}' is not a number: {}", raw, e))
            })?,
            _ => DEFAULT_CONNECT_TIMEOUT_SECS,
        };

        Ok(Self {
            user: required("DB_USER")?,
            password: required("DB_PASSWORD")?,
            host: required("DB_HOST")?,
            port,
            database: required("DB_NAME")?,
            connect_timeout_seconds,
            enable_ssl: None,
        })
    }

    /// Same credentials, pointed at the administrative database
    pub fn admin(&self) -> Self {
        Self {
            database: ADMIN_DATABASE.to_string(),
            ..self.clone()
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_seconds)
    }

    /// Driver connect options for this configuration
    pub fn connect_options(&self) -> PgConnectOptions {
        let ssl_mode = match self.enable_ssl {
            Some(true) => PgSslMode::Require,
            Some(false) => PgSslMode::Disable,
            None => PgSslMode::Prefer,
        };

        PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.user)
            .password(&self.password)
            .database(&self.database)
            .ssl_mode(ssl_mode)
    }
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("user", &self.user)
            .field("password", &"***")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("connect_timeout_seconds", &self.connect_timeout_seconds)
            .field("enable_ssl", &self.enable_ssl)
            .finish()
    }
}

/// Logging configuration
///
/// Records go to `file` when set, otherwise to stdout when `stdout` is true,
/// otherwise to stderr so they stay apart from printed result rows.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<String>,
    pub format: String,
    pub stdout: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
            format: "text".to_string(),
            stdout: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn full_env() -> HashMap<String, String> {
        env_of(&[
            ("DB_USER", "samuel"),
            ("DB_PASSWORD", "secret"),
            ("DB_HOST", "localhost"),
            ("DB_PORT", "5432"),
            ("DB_NAME", "royale"),
        ])
    }

    #[test]
    fn test_from_lookup_reads_all_variables() {
        let env = full_env();
        let config = DatabaseConfig::from_lookup(|k| env.get(k).cloned()).unwrap();

        assert_eq!(config.user, "samuel");
        assert_eq!(config.password, "secret");
        assert_eq!(config.host, "localhost");
        assert_eq!(config.port, 5432);
        assert_eq!(config.database, "royale");
        assert_eq!(config.connect_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_from_lookup_missing_variable() {
        let mut env = full_env();
        env.remove("DB_HOST");
        let err = DatabaseConfig::from_lookup(|k| env.get(k).cloned()).unwrap_err();

        assert!(matches!(err, Error::ConfigError(_)));
        assert!(err.to_string().contains("DB_HOST"));
    }

    #[test]
    fn test_from_lookup_invalid_port() {
        let mut env = full_env();
        env.insert("DB_PORT".into(), "fifty".into());
        let err = DatabaseConfig::from_lookup(|k| env.get(k).cloned()).unwrap_err();

        assert!(err.to_string().contains("DB_PORT"));
    }

    #[test]
    fn test_from_lookup_custom_timeout() {
        let mut env = full_env();
        env.insert("DB_CONNECT_TIMEOUT".into(), "3".into());
        let config = DatabaseConfig::from_lookup(|k| env.get(k).cloned()).unwrap();

        assert_eq!(config.connect_timeout(), Duration::from_secs(3));
    }

    #[test]
    fn test_admin_switches_database_only() {
        let env = full_env();
        let config = DatabaseConfig::from_lookup(|k| env.get(k).cloned()).unwrap();
        let admin = config.admin();

        assert_eq!(admin.database, ADMIN_DATABASE);
        assert_eq!(admin.user, config.user);
        assert_eq!(admin.port, config.port);
    }

    #[test]
    fn test_debug_masks_password() {
        let env = full_env();
        let config = DatabaseConfig::from_lookup(|k| env.get(k).cloned()).unwrap();
        let debug = format!("{:?}", config);

        assert!(!debug.contains("secret"));
        assert!(debug.contains("***"));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sql_command.toml");
        fs::write(
            &path,
            r#"
            [database]
            user = "postgres"
            password = "password"
            host = "db.internal"
            port = 5433
            database = "royale"

            [logging]
            level = "debug"
            format = "json"
            stdout = true
            "#,
        )
        .unwrap();

        let config = load_from_file(path.to_str().unwrap()).unwrap();
        assert_eq!(config.database.host, "db.internal");
        assert_eq!(config.database.port, 5433);
        assert_eq!(config.database.connect_timeout_seconds, DEFAULT_CONNECT_TIMEOUT_SECS);
        let logging = config.logging.unwrap();
        assert_eq!(logging.level, "debug");
        assert_eq!(logging.format, "json");
    }

    #[test]
    fn test_load_from_file_rejects_missing_section() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        fs::write(&path, "[logging]\nlevel = \"info\"\nformat = \"text\"\nstdout = true\n").unwrap();

        let err = load_from_file(path.to_str().unwrap()).unwrap_err();
        assert!(matches!(err, Error::ConfigError(_)));
    }
}
