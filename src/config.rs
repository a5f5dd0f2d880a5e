use crate::application::services::AssignmentSettings;
use std::env;
use std::str::FromStr;
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub server_host: String,
    pub server_port: u16,
    pub push_endpoint: Option<String>,
    pub push_api_key: Option<String>,
    pub push_timeout_secs: u64,
    pub assignment_max_retries: u32,
    pub history_default_limit: i64,
    pub history_max_limit: i64,
    pub otel_exporter_endpoint: Option<String>,
    pub service_name: String,
    pub metrics_port: u16,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from any key lookup; `from_env` passes the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let database_url = lookup("DATABASE_URL")
            .unwrap_or_else(|| "sqlite://evdesk.db?mode=rwc".to_string());

        let server_host = lookup("SERVER_HOST").unwrap_or_else(|| "127.0.0.1".to_string());

        let server_port = lookup("SERVER_PORT")
            .unwrap_or_else(|| "3000".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidPort)?;

        let history_default_limit: i64 = parse_or(&lookup, "HISTORY_DEFAULT_LIMIT", 20)?;
        let history_max_limit: i64 = parse_or(&lookup, "HISTORY_MAX_LIMIT", 100)?;
        if history_default_limit < 1 || history_default_limit > history_max_limit {
            return Err(ConfigError::InvalidValue("HISTORY_DEFAULT_LIMIT"));
        }

        Ok(Config {
            database_url,
            server_host,
            server_port,
            push_endpoint: non_empty("PUSH_ENDPOINT"),
            push_api_key: non_empty("PUSH_API_KEY"),
            push_timeout_secs: parse_or(&lookup, "PUSH_TIMEOUT_SECS", 10)?,
            assignment_max_retries: parse_or(&lookup, "ASSIGNMENT_MAX_RETRIES", 3)?,
            history_default_limit,
            history_max_limit,
            otel_exporter_endpoint: non_empty("OTEL_EXPORTER_OTLP_ENDPOINT"),
            service_name: lookup("SERVICE_NAME").unwrap_or_else(|| "evdesk".to_string()),
            metrics_port: lookup("METRICS_PORT")
                .unwrap_or_else(|| "9000".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidPort)?,
        })
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }

    pub fn push_timeout(&self) -> Duration {
        Duration::from_secs(self.push_timeout_secs)
    }

    pub fn assignment_settings(&self) -> AssignmentSettings {
        AssignmentSettings {
            max_retries: self.assignment_max_retries,
            history_default_limit: self.history_default_limit,
            history_max_limit: self.history_max_limit,
        }
    }
}

fn parse_or<T, F>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidValue(key)),
        None => Ok(default),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid port number")]
    InvalidPort,

    #[error("Invalid value for {0}")]
    InvalidValue(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.database_url, "sqlite://evdesk.db?mode=rwc");
        assert_eq!(config.server_address(), "127.0.0.1:3000");
        assert_eq!(config.push_endpoint, None);
        assert_eq!(config.push_timeout(), Duration::from_secs(10));
        assert_eq!(config.assignment_max_retries, 3);
        assert_eq!(config.history_default_limit, 20);
        assert_eq!(config.history_max_limit, 100);
        assert_eq!(config.service_name, "evdesk");
        assert_eq!(config.metrics_port, 9000);
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("SERVER_PORT", "8080"),
            ("PUSH_ENDPOINT", "https://push.example.com/send"),
            ("PUSH_API_KEY", "secret"),
            ("ASSIGNMENT_MAX_RETRIES", "5"),
            ("HISTORY_DEFAULT_LIMIT", "50"),
        ])
        .unwrap();
        assert_eq!(config.server_port, 8080);
        assert_eq!(config.push_endpoint.as_deref(), Some("https://push.example.com/send"));
        let settings = config.assignment_settings();
        assert_eq!(settings.max_retries, 5);
        assert_eq!(settings.history_default_limit, 50);
    }

    #[test]
    fn test_blank_push_endpoint_is_unset() {
        let config = config_from(&[("PUSH_ENDPOINT", "  ")]).unwrap();
        assert!(config.push_endpoint.is_none());
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(matches!(
            config_from(&[("SERVER_PORT", "not-a-port")]),
            Err(ConfigError::InvalidPort)
        ));
        assert!(matches!(
            config_from(&[("ASSIGNMENT_MAX_RETRIES", "-1")]),
            Err(ConfigError::InvalidValue("ASSIGNMENT_MAX_RETRIES"))
        ));
        assert!(matches!(
            config_from(&[("HISTORY_DEFAULT_LIMIT", "500")]),
            Err(ConfigError::InvalidValue("HISTORY_DEFAULT_LIMIT"))
        ));
    }
}
