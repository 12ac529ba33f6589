//! Runtime settings.
//!
//! Read once at startup from the environment (a `.env` file is honoured via
//! dotenvy); CLI flags override individual values.
//!
//! | Variable                    | Default                  |
//! |-----------------------------|--------------------------|
//! | `DATABASE_URL`              | `sqlite://campusload.db` |
//! | `PORT`                      | `3000`                   |
//! | `CAMPUSLOAD_MAX_UPLOAD_MB`  | `20`                     |

use std::env;

use crate::error::ConfigError;

pub const DEFAULT_DATABASE_URL: &str = "sqlite://campusload.db";
pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_MAX_UPLOAD_MB: usize = 20;

/// Settings for the HTTP server and the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub database_url: String,
    pub port: u16,
    /// Largest accepted request body, in bytes.
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            port: DEFAULT_PORT,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_MB * 1024 * 1024,
        }
    }
}

impl ServerConfig {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|var| env::var(var).ok())
    }

    /// Load from any variable source; unset variables keep their default.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(url) = lookup("DATABASE_URL").filter(|v| !v.trim().is_empty()) {
            config.database_url = url;
        }
        if let Some(value) = lookup("PORT") {
            config.port = value
                .trim()
                .parse()
                .map_err(|_| ConfigError::Invalid { var: "PORT", value })?;
        }
        if let Some(value) = lookup("CAMPUSLOAD_MAX_UPLOAD_MB") {
            config.max_upload_bytes = value
                .trim()
                .parse::<usize>()
                .ok()
                .and_then(|mb| mb.checked_mul(1024 * 1024))
                .ok_or(ConfigError::Invalid { var: "CAMPUSLOAD_MAX_UPLOAD_MB", value })?;
        }

        Ok(config)
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_database_url(mut self, url: impl Into<String>) -> Self {
        self.database_url = url.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> =
            vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ServerConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, ServerConfig::default());
        assert_eq!(config.max_upload_bytes, 20 * 1024 * 1024);
    }

    #[test]
    fn test_overrides() {
        let config = ServerConfig::from_lookup(lookup(&[
            ("DATABASE_URL", "sqlite::memory:"),
            ("PORT", "8080"),
            ("CAMPUSLOAD_MAX_UPLOAD_MB", "1"),
        ]))
        .unwrap();
        assert_eq!(config.database_url, "sqlite::memory:");
        assert_eq!(config.port, 8080);
        assert_eq!(config.max_upload_bytes, 1024 * 1024);
    }

    #[test]
    fn test_invalid_port() {
        let err = ServerConfig::from_lookup(lookup(&[("PORT", "http")])).unwrap_err();
        assert_eq!(err.to_string(), "Invalid value for PORT: \"http\"");
    }

    #[test]
    fn test_upload_limit_overflow_is_invalid() {
        let huge = usize::MAX.to_string();
        let err = ServerConfig::from_lookup(lookup(&[("CAMPUSLOAD_MAX_UPLOAD_MB", huge.as_str())]))
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            format!("Invalid value for CAMPUSLOAD_MAX_UPLOAD_MB: {:?}", huge)
        );
        assert!(ServerConfig::from_lookup(lookup(&[("CAMPUSLOAD_MAX_UPLOAD_MB", "-1")])).is_err());
    }

    #[test]
    fn test_builders() {
        let config = ServerConfig::default().with_port(1).with_database_url("sqlite://x.db");
        assert_eq!((config.port, config.database_url.as_str()), (1, "sqlite://x.db"));
    }
}
