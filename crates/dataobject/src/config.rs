//! Configuration for connections and repositories

use serde::Deserialize;
use std::env;
use std::str::FromStr;

use crate::error::{ModelError, ModelResult};

/// Connection-level configuration
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DataObjectConfig {
    pub database_url: Option<String>,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout_seconds: u64,
    pub idle_timeout_seconds: Option<u64>,
    /// Process-wide locale used when a localized repository has none of its own
    pub default_locale: Option<String>,
    /// Page size for paginators created without an explicit one
    pub default_page_size: u64,
    pub log_statements: bool,
}

impl DataObjectConfig {
    pub fn new() -> Self {
        Self {
            database_url: None,
            max_connections: 10,
            min_connections: 1,
            acquire_timeout_seconds: 30,
            idle_timeout_seconds: Some(600),
            default_locale: None,
            default_page_size: 20,
            log_statements: false,
        }
    }

    /// Configuration for in-memory tests
    pub fn testing() -> Self {
        Self {
            min_connections: 0,
            log_statements: true,
            ..Self::new()
        }
    }

    /// Load configuration from environment variables
    pub fn from_env() -> ModelResult<Self> {
        let mut config = Self::new();

        // Database URL
        config.database_url = env::var("DATABASE_URL").ok();

        if let Ok(locale) = env::var("DATAOBJECT_DEFAULT_LOCALE") {
            if !locale.is_empty() {
                config.default_locale = Some(locale);
            }
        }

        if let Some(page_size) = parse_var("DATAOBJECT_PAGE_SIZE")? {
            config.default_page_size = page_size;
        }

        if let Some(max_connections) = parse_var("DATAOBJECT_MAX_CONNECTIONS")? {
            config.max_connections = max_connections;
        }

        if let Some(log_statements) = parse_var("DATAOBJECT_LOG_STATEMENTS")? {
            config.log_statements = log_statements;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> ModelResult<()> {
        if let Some(database_url) = &self.database_url {
            let parsed = url::Url::parse(database_url).map_err(|e| {
                ModelError::Configuration(format!("invalid database_url '{}': {}", database_url, e))
            })?;
            if !matches!(parsed.scheme(), "postgres" | "postgresql") {
                return Err(ModelError::Configuration(format!(
                    "unsupported database scheme '{}', expected postgres or postgresql",
                    parsed.scheme()
                )));
            }
        }

        if self.max_connections == 0 || self.min_connections > self.max_connections {
            return Err(ModelError::Configuration(format!(
                "min_connections ({}) must not exceed max_connections ({}) and max must be positive",
                self.min_connections, self.max_connections
            )));
        }

        if self.default_page_size == 0 {
            return Err(ModelError::Configuration(
                "default_page_size must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for DataObjectConfig {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_var<T: FromStr>(name: &str) -> ModelResult<Option<T>> {
    match env::var(name) {
        Ok(raw) => raw.parse().map(Some).map_err(|_| {
            ModelError::Configuration(format!("{} has an invalid value '{}'", name, raw))
        }),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_default_config_is_valid() {
        assert!(DataObjectConfig::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_foreign_scheme() {
        let config = DataObjectConfig {
            database_url: Some("mysql://localhost/app".to_string()),
            ..DataObjectConfig::new()
        };
        assert!(matches!(config.validate(), Err(ModelError::Configuration(_))));
    }

    #[test]
    fn test_deserialize_partial_config() {
        let config: DataObjectConfig =
            serde_json::from_str(r#"{"default_locale": "en", "default_page_size": 50}"#).unwrap();
        assert_eq!(config.default_locale.as_deref(), Some("en"));
        assert_eq!(config.default_page_size, 50);
        assert_eq!(config.max_connections, 10);
    }

    #[test]
    #[serial]
    fn test_from_env() {
        env::set_var("DATABASE_URL", "postgres://localhost/dataobject_test");
        env::set_var("DATAOBJECT_DEFAULT_LOCALE", "de");
        env::set_var("DATAOBJECT_PAGE_SIZE", "15");

        let config = DataObjectConfig::from_env().unwrap();
        assert_eq!(config.default_locale.as_deref(), Some("de"));
        assert_eq!(config.default_page_size, 15);

        env::set_var("DATAOBJECT_PAGE_SIZE", "many");
        assert!(DataObjectConfig::from_env().is_err());

        env::remove_var("DATABASE_URL");
        env::remove_var("DATAOBJECT_DEFAULT_LOCALE");
        env::remove_var("DATAOBJECT_PAGE_SIZE");
    }
}
