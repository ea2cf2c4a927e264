use std::env;
use std::time::Duration;

use sqlx::postgres::{PgConnectOptions, PgSslMode};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
    #[error("invalid value {value:?} for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    pub ssl_mode: PgSslMode,
    pub max_connections: u32,
}

impl DatabaseConfig {
    /// Reads only the `DB_*` variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars(lookup);

        Ok(DatabaseConfig {
            host: vars.required("DB_HOST")?,
            port: vars.parsed_or("DB_PORT", 5432)?,
            user: vars.required("DB_USER")?,
            password: vars.required("DB_PASSWORD")?,
            database: vars.required("DB_NAME")?,
            ssl_mode: match vars.optional("DB_SSL_MODE") {
                Some(raw) => raw.parse().map_err(|_| ConfigError::Invalid {
                    key: "DB_SSL_MODE",
                    value: raw.clone(),
                    reason: "expected disable, allow, prefer, require, verify-ca or verify-full"
                        .to_string(),
                })?,
                None => PgSslMode::Prefer,
            },
            max_connections: vars.positive_or("DB_MAX_CONNECTIONS", 10)?,
        })
    }

    pub fn connect_options(&self) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.user)
            .password(&self.password)
            .database(&self.database)
            .ssl_mode(self.ssl_mode)
            .application_name("beta_admin_api")
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database: DatabaseConfig,
    pub server_host: String,
    pub server_port: u16,
    pub api_base_uri: String,
    pub webhook_url: String,
    pub webhook_timeout_secs: Option<u64>,
    pub audit_queue_capacity: usize,
    pub rate_limit_sweep_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from any key lookup. Empty values count as absent.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database = DatabaseConfig::from_lookup(&lookup)?;
        let vars = Vars(lookup);

        let webhook_url = vars.required("INVITE_WEBHOOK_URL")?;
        if !(webhook_url.starts_with("https://") || webhook_url.starts_with("http://")) {
            return Err(ConfigError::Invalid {
                key: "INVITE_WEBHOOK_URL",
                value: webhook_url,
                reason: "must be an http or https URL".to_string(),
            });
        }

        let api_base_uri = vars.optional("API_BASE_URI").unwrap_or_default();
        if !api_base_uri.is_empty() && !api_base_uri.starts_with('/') {
            return Err(ConfigError::Invalid {
                key: "API_BASE_URI",
                value: api_base_uri,
                reason: "must start with '/'".to_string(),
            });
        }

        Ok(Config {
            database,
            server_host: vars
                .optional("SERVER_HOST")
                .unwrap_or_else(|| "0.0.0.0".to_string()),
            server_port: vars.parsed_or("SERVER_PORT", 3000)?,
            api_base_uri: api_base_uri.trim_end_matches('/').to_string(),
            webhook_url,
            webhook_timeout_secs: match vars.optional("INVITE_WEBHOOK_TIMEOUT_SECS") {
                Some(_) => Some(vars.positive_or("INVITE_WEBHOOK_TIMEOUT_SECS", 0)?),
                None => None,
            },
            audit_queue_capacity: vars.positive_or("AUDIT_QUEUE_CAPACITY", 1024)?,
            rate_limit_sweep_secs: vars.positive_or("RATE_LIMIT_SWEEP_SECS", 300)?,
        })
    }

    pub fn webhook_timeout(&self) -> Option<Duration> {
        self.webhook_timeout_secs.map(Duration::from_secs)
    }

    pub fn rate_limit_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.rate_limit_sweep_secs)
    }
}

struct Vars<F>(F);

impl<F> Vars<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn optional(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn required(&self, key: &'static str) -> Result<String, ConfigError> {
        self.optional(key).ok_or(ConfigError::Missing(key))
    }

    fn parsed_or<T>(&self, key: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        match self.optional(key) {
            Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::Invalid {
                key,
                reason: e.to_string(),
                value: raw,
            }),
            None => Ok(default),
        }
    }

    fn positive_or<T>(&self, key: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: std::str::FromStr + PartialOrd + Default,
        T::Err: std::fmt::Display,
    {
        let value = self.parsed_or(key, default)?;
        if value > T::default() {
            Ok(value)
        } else {
            Err(ConfigError::Invalid {
                key,
                value: self.optional(key).unwrap_or_default(),
                reason: "must be greater than zero".to_string(),
            })
        }
    }
}
