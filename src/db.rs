use std::{future::Future, time::Duration};

use anyhow::Context;
use sqlx::{
    mysql::{MySqlDatabaseError, MySqlPoolOptions},
    MySqlPool,
};
use tracing::{info, warn};

use crate::config::DatabaseConfig;

/// MySQL `ER_DUP_KEYNAME`: the index already exists.
const ER_DUP_KEYNAME: u16 = 1061;

const CREATE_USERS_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS users (
        id CHAR(36) NOT NULL PRIMARY KEY,
        name VARCHAR(255) NOT NULL,
        email VARCHAR(255) NOT NULL UNIQUE,
        created_at TIMESTAMP(6) NOT NULL DEFAULT CURRENT_TIMESTAMP(6),
        updated_at TIMESTAMP(6) NOT NULL DEFAULT CURRENT_TIMESTAMP(6)
    )
"#;

const USER_INDEXES: [&str; 2] = [
    "CREATE INDEX idx_users_email ON users(email)",
    "CREATE INDEX idx_users_created_at ON users(created_at)",
];

/// Builds the process-wide pool. No connection is opened until first use,
/// so an unreachable database shows up in `wait_for_database`.
pub fn connect_pool(cfg: &DatabaseConfig) -> MySqlPool {
    MySqlPoolOptions::new()
        .max_connections(cfg.pool_size)
        .acquire_timeout(cfg.acquire_timeout)
        .connect_lazy_with(cfg.connect_options())
}

pub async fn ping(db: &MySqlPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(db).await?;
    Ok(())
}

/// Blocks until `SELECT 1` succeeds or `max_attempts` probes have failed.
pub async fn wait_for_database(
    db: &MySqlPool,
    cfg: &DatabaseConfig,
) -> anyhow::Result<()> {
    info!(host = %cfg.host, port = cfg.port, "waiting for database");
    retry_until_ready(cfg.connect_attempts, cfg.connect_interval, || ping(db))
        .await
        .with_context(|| {
            format!(
                "database at {}:{} not reachable after {} attempts",
                cfg.host, cfg.port, cfg.connect_attempts
            )
        })
}

/// Runs `probe` until it succeeds, sleeping `interval` between failures.
/// The error of the last attempt is returned once `max_attempts` is used up.
pub async fn retry_until_ready<F, Fut, E>(
    max_attempts: u32,
    interval: Duration,
    mut probe: F,
) -> Result<(), E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(), E>>,
    E: std::fmt::Display,
{
    let mut attempt = 1;
    loop {
        match probe().await {
            Ok(()) => return Ok(()),
            Err(e) if attempt >= max_attempts => return Err(e),
            Err(e) => {
                if attempt <= 5 || attempt % 10 == 0 {
                    warn!(attempt, max_attempts, error = %e, "database not ready");
                }
            }
        }
        attempt += 1;
        tokio::time::sleep(interval).await;
    }
}

/// Creates the `users` table and its indexes. Safe to run on every start.
pub async fn ensure_schema(db: &MySqlPool) -> anyhow::Result<()> {
    sqlx::query(CREATE_USERS_TABLE)
        .execute(db)
        .await
        .context("create users table")?;

    for stmt in USER_INDEXES {
        match sqlx::query(stmt).execute(db).await {
            Ok(_) => info!(stmt, "index created"),
            Err(e) if is_duplicate_index(&e) => {}
            Err(e) => return Err(e).with_context(|| format!("run `{stmt}`")),
        }
    }
    Ok(())
}

pub fn is_duplicate_index(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .and_then(|db| db.try_downcast_ref::<MySqlDatabaseError>())
        .map(|e| e.number() == ER_DUP_KEYNAME)
        .unwrap_or(false)
}
