use std::{str::FromStr, time::Duration};

use anyhow::Context;
use sqlx::mysql::MySqlConnectOptions;

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub name: String,
    pub user: String,
    pub password: String,
    pub pool_size: u32,
    pub acquire_timeout: Duration,
    pub connect_attempts: u32,
    pub connect_interval: Duration,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub database: DatabaseConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup. Unset keys take their
    /// defaults, set-but-unparsable keys are an error.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let text = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.into());

        let database = DatabaseConfig {
            host: text("DB_HOST", "localhost"),
            port: parsed(&lookup, "DB_PORT", 3306)?,
            name: text("DB_NAME", "users_db"),
            user: text("DB_USER", "root"),
            password: text("DB_PASSWORD", "root"),
            pool_size: parsed(&lookup, "DB_POOL_SIZE", 20)?,
            acquire_timeout: Duration::from_secs(parsed(&lookup, "DB_ACQUIRE_TIMEOUT_SECS", 10)?),
            connect_attempts: parsed(&lookup, "DB_CONNECT_ATTEMPTS", 90)?,
            connect_interval: Duration::from_millis(parsed(
                &lookup,
                "DB_CONNECT_INTERVAL_MS",
                2000,
            )?),
        };

        if database.pool_size == 0 {
            anyhow::bail!("DB_POOL_SIZE must be at least 1");
        }
        if database.connect_attempts == 0 {
            anyhow::bail!("DB_CONNECT_ATTEMPTS must be at least 1");
        }

        Ok(Self {
            host: text("APP_HOST", "0.0.0.0"),
            port: parsed(&lookup, "PORT", 3000)?,
            database,
        })
    }
}

impl DatabaseConfig {
    pub fn connect_options(&self) -> MySqlConnectOptions {
        MySqlConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .database(&self.name)
            .username(&self.user)
            .password(&self.password)
    }
}

fn parsed<F, T>(lookup: &F, key: &str, default: T) -> anyhow::Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("invalid value for {key}: {raw:?}")),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> anyhow::Result<AppConfig> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let cfg = config_from(&[]).expect("defaults are valid");
        assert_eq!(cfg.host, "0.0.0.0");
        assert_eq!(cfg.port, 3000);
        assert_eq!(cfg.database.host, "localhost");
        assert_eq!(cfg.database.port, 3306);
        assert_eq!(cfg.database.name, "users_db");
        assert_eq!(cfg.database.pool_size, 20);
        assert_eq!(cfg.database.acquire_timeout, Duration::from_secs(10));
        assert_eq!(cfg.database.connect_attempts, 90);
        assert_eq!(cfg.database.connect_interval, Duration::from_millis(2000));
    }

    #[test]
    fn env_values_override_defaults() {
        let cfg = config_from(&[
            ("DB_HOST", "mysql"),
            ("DB_PORT", "3307"),
            ("DB_NAME", "people"),
            ("DB_USER", "svc"),
            ("DB_PASSWORD", "secret"),
            ("PORT", "8080"),
        ])
        .expect("valid config");
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.database.host, "mysql");
        assert_eq!(cfg.database.port, 3307);
        assert_eq!(cfg.database.name, "people");
        assert_eq!(cfg.database.user, "svc");
        assert_eq!(cfg.database.password, "secret");
    }

    #[test]
    fn unparsable_port_names_the_variable() {
        let err = config_from(&[("PORT", "abc")]).unwrap_err();
        assert!(err.to_string().contains("PORT"));
    }

    #[test]
    fn zero_pool_size_is_rejected() {
        assert!(config_from(&[("DB_POOL_SIZE", "0")]).is_err());
    }
}
