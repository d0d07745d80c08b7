use std::time::Duration;

use lorekeep_core::PersistenceError;
use lorekeep_sync::SyncConfig;

pub const ENV_REDIS_URL: &str = "LOREKEEP_REDIS_URL";
pub const ENV_REDIS_NAMESPACE: &str = "LOREKEEP_REDIS_NAMESPACE";
pub const ENV_DATABASE_URL: &str = "LOREKEEP_DATABASE_URL";
pub const ENV_DB_MAX_CONNECTIONS: &str = "LOREKEEP_DB_MAX_CONNECTIONS";
pub const ENV_RUN_MIGRATIONS: &str = "LOREKEEP_RUN_MIGRATIONS";
pub const ENV_SYNC_INTERVAL_SECS: &str = "LOREKEEP_SYNC_INTERVAL_SECS";
pub const ENV_POLL_INTERVAL_MS: &str = "LOREKEEP_POLL_INTERVAL_MS";
pub const ENV_PAGE_SIZE: &str = "LOREKEEP_PAGE_SIZE";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StackConfig {
    pub redis_url: String,
    pub redis_namespace: String,
    /// Without a database the manager only reports what it would copy.
    pub database_url: Option<String>,
    pub max_connections: u32,
    pub run_migrations: bool,
    pub sync: SyncConfig,
}

impl Default for StackConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://127.0.0.1:6379".to_string(),
            redis_namespace: "lorekeep".to_string(),
            database_url: None,
            max_connections: 5,
            run_migrations: true,
            sync: SyncConfig::default(),
        }
    }
}

fn invalid(var: &str, value: &str, expected: &str) -> PersistenceError {
    PersistenceError::InvalidConfig(format!("{var}={value:?} is not {expected}"))
}

fn parse_bool(var: &str, value: &str) -> Result<bool, PersistenceError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(invalid(var, value, "a boolean")),
    }
}

fn parse_number<T: std::str::FromStr>(var: &str, value: &str) -> Result<T, PersistenceError> {
    value
        .trim()
        .parse()
        .map_err(|_| invalid(var, value, "a non-negative integer"))
}

impl StackConfig {
    /// Reads `LOREKEEP_*` variables, loading a `.env` file first if present.
    pub fn from_env() -> Result<Self, PersistenceError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds a config from any variable source. Unset variables keep their
    /// defaults. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, PersistenceError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());
        let mut config = Self::default();

        if let Some(value) = get(ENV_REDIS_URL) {
            config.redis_url = value;
        }
        if let Some(value) = get(ENV_REDIS_NAMESPACE) {
            config.redis_namespace = value;
        }
        config.database_url = get(ENV_DATABASE_URL);
        if let Some(value) = get(ENV_DB_MAX_CONNECTIONS) {
            config.max_connections = parse_number(ENV_DB_MAX_CONNECTIONS, &value)?;
        }
        if let Some(value) = get(ENV_RUN_MIGRATIONS) {
            config.run_migrations = parse_bool(ENV_RUN_MIGRATIONS, &value)?;
        }
        if let Some(value) = get(ENV_SYNC_INTERVAL_SECS) {
            config.sync.sync_interval =
                Duration::from_secs(parse_number(ENV_SYNC_INTERVAL_SECS, &value)?);
        }
        if let Some(value) = get(ENV_POLL_INTERVAL_MS) {
            config.sync.poll_interval =
                Duration::from_millis(parse_number(ENV_POLL_INTERVAL_MS, &value)?);
        }
        if let Some(value) = get(ENV_PAGE_SIZE) {
            config.sync.page_size = parse_number(ENV_PAGE_SIZE, &value)?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), PersistenceError> {
        self.sync.validate()?;
        if self.redis_url.trim().is_empty() {
            return Err(PersistenceError::InvalidConfig(
                "redis_url must not be empty".to_string(),
            ));
        }
        if self.redis_namespace.is_empty() || self.redis_namespace.contains(':') {
            return Err(PersistenceError::InvalidConfig(format!(
                "redis_namespace must be non-empty and free of ':': {:?}",
                self.redis_namespace
            )));
        }
        if self.max_connections == 0 {
            return Err(PersistenceError::InvalidConfig(
                "max_connections must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
