use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

/// Configuration trait for environment-sourced configuration
pub trait AppConfigTrait: Sized {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self, ConfigError>;

    /// Validate the configuration
    fn validate(&self) -> Result<(), ConfigError>;
}

/// Output format of the log subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Compact,
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "compact" => Ok(LogFormat::Compact),
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            _ => Err(ConfigError::InvalidValue {
                field: "format".to_string(),
                value: s.to_string(),
                expected: "compact, pretty, or json".to_string(),
            }),
        }
    }
}

/// Migration tool configuration
///
/// Every field can be overridden by the command line after loading.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Connection string, dispatched on its URL scheme
    pub database_url: Option<String>,
    /// Directory containing the `migrations/` folder
    pub project_dir: PathBuf,
    /// Override for the dialect's default record table
    pub migrations_table: Option<String>,
    /// Token for remote libSQL databases
    pub libsql_auth_token: Option<String>,
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            format: LogFormat::Compact,
        }
    }
}

impl AppConfig {
    /// Load `.env` from the working directory (if any), then read the environment
    pub fn load() -> Result<Self, ConfigError> {
        match dotenvy::dotenv() {
            Ok(path) => tracing::debug!("Loaded environment from {}", path.display()),
            Err(e) if e.not_found() => {}
            Err(e) => {
                return Err(ConfigError::ParseError {
                    message: format!("Failed to load .env file: {}", e),
                })
            }
        }

        let config = Self::from_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Database URL, or an error naming the missing variable
    pub fn require_database_url(&self) -> Result<&str, ConfigError> {
        self.database_url
            .as_deref()
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingEnvVar {
                var: "DATABASE_URL".to_string(),
            })
    }

    /// Root of the migration units
    pub fn migrations_dir(&self) -> PathBuf {
        self.project_dir.join("migrations")
    }

    pub fn with_database_url(mut self, url: impl Into<String>) -> Self {
        self.database_url = Some(url.into());
        self
    }

    pub fn with_project_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.project_dir = dir.as_ref().to_path_buf();
        self
    }
}

impl AppConfigTrait for AppConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let database_url = get_env_optional("DATABASE_URL");
        let project_dir = match get_env_optional("MIFLO_PROJECT_DIR") {
            Some(dir) => PathBuf::from(dir),
            None => env::current_dir().map_err(|e| ConfigError::ParseError {
                message: format!("Failed to resolve current directory: {}", e),
            })?,
        };
        let migrations_table = get_env_optional("MIFLO_MIGRATIONS_TABLE");
        let libsql_auth_token = get_env_optional("LIBSQL_AUTH_TOKEN");
        let logging = LoggingConfig::from_env()?;

        Ok(AppConfig {
            database_url,
            project_dir,
            migrations_table,
            libsql_auth_token,
            logging,
        })
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(table) = &self.migrations_table {
            if !is_sql_identifier(table) {
                return Err(ConfigError::InvalidValue {
                    field: "migrations_table".to_string(),
                    value: table.clone(),
                    expected: "a plain SQL identifier ([A-Za-z_][A-Za-z0-9_]*)".to_string(),
                });
            }
        }

        self.logging.validate()?;

        Ok(())
    }
}

impl AppConfigTrait for LoggingConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let level = get_env_or_default("LOG_LEVEL", "warn");
        let format = get_env_or_default("LOG_FORMAT", "compact");
        let format = LogFormat::from_str(&format)?;

        Ok(LoggingConfig { level, format })
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.level.to_lowercase().as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "level".to_string(),
                value: self.level.clone(),
                expected: "trace, debug, info, warn, or error".to_string(),
            });
        }

        Ok(())
    }
}

fn is_sql_identifier(value: &str) -> bool {
    let mut chars = value.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn get_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.is_empty())
}

fn get_env_or_default(key: &str, default: &str) -> String {
    get_env_optional(key).unwrap_or_else(|| default.to_string())
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{var} is not set")]
    MissingEnvVar { var: String },

    #[error("Invalid value for {field}: '{value}', expected {expected}")]
    InvalidValue {
        field: String,
        value: String,
        expected: String,
    },

    #[error("Configuration parsing error: {message}")]
    ParseError { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    const VARS: [&str; 6] = [
        "DATABASE_URL",
        "MIFLO_PROJECT_DIR",
        "MIFLO_MIGRATIONS_TABLE",
        "LIBSQL_AUTH_TOKEN",
        "LOG_LEVEL",
        "LOG_FORMAT",
    ];

    fn clean_test_env() {
        for var in VARS {
            env::remove_var(var);
        }
    }

    #[test]
    #[serial]
    fn test_app_config_from_env() {
        clean_test_env();
        env::set_var("DATABASE_URL", "sqlite:./test.db");
        env::set_var("MIFLO_PROJECT_DIR", "/srv/app");
        env::set_var("MIFLO_MIGRATIONS_TABLE", "schema_history");
        env::set_var("LOG_LEVEL", "debug");
        env::set_var("LOG_FORMAT", "json");

        let config = AppConfig::from_env().unwrap();

        assert_eq!(config.database_url.as_deref(), Some("sqlite:./test.db"));
        assert_eq!(config.project_dir, PathBuf::from("/srv/app"));
        assert_eq!(config.migrations_dir(), PathBuf::from("/srv/app/migrations"));
        assert_eq!(config.migrations_table.as_deref(), Some("schema_history"));
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, LogFormat::Json);
        assert!(config.validate().is_ok());

        clean_test_env();
    }

    #[test]
    #[serial]
    fn test_app_config_defaults() {
        clean_test_env();

        let config = AppConfig::from_env().unwrap();

        assert!(config.database_url.is_none());
        assert_eq!(config.project_dir, env::current_dir().unwrap());
        assert_eq!(config.logging.level, "warn");
        assert_eq!(config.logging.format, LogFormat::Compact);
        assert!(config.migrations_table.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    #[serial]
    fn test_missing_database_url() {
        clean_test_env();
        env::set_var("DATABASE_URL", "");

        let config = AppConfig::from_env().unwrap();
        match config.require_database_url() {
            Err(ConfigError::MissingEnvVar { var }) => assert_eq!(var, "DATABASE_URL"),
            other => panic!("Expected MissingEnvVar error, got {:?}", other),
        }

        clean_test_env();
    }

    #[test]
    #[serial]
    fn test_invalid_log_format() {
        clean_test_env();
        env::set_var("LOG_FORMAT", "xml");

        let result = AppConfig::from_env();
        assert!(matches!(result, Err(ConfigError::InvalidValue { field, .. }) if field == "format"));

        clean_test_env();
    }

    #[test]
    #[serial]
    fn test_table_name_must_be_identifier() {
        clean_test_env();
        env::set_var("MIFLO_MIGRATIONS_TABLE", "migrations; DROP TABLE users");

        let config = AppConfig::from_env().unwrap();
        let result = config.validate();
        assert!(
            matches!(result, Err(ConfigError::InvalidValue { field, .. }) if field == "migrations_table")
        );

        clean_test_env();
    }

    #[test]
    fn test_overrides() {
        let config = AppConfig {
            database_url: None,
            project_dir: PathBuf::from("."),
            migrations_table: None,
            libsql_auth_token: None,
            logging: LoggingConfig::default(),
        }
        .with_database_url("postgres://localhost/app")
        .with_project_dir("/tmp/project");

        assert_eq!(config.require_database_url().unwrap(), "postgres://localhost/app");
        assert_eq!(config.migrations_dir(), PathBuf::from("/tmp/project/migrations"));
    }
}
