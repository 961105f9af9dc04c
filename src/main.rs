use std::sync::Arc;

use tracing::{error, info};

mod app;
mod config;
mod db;
mod error;
mod state;
mod users;

use crate::{config::AppConfig, state::AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "user_service=debug,axum=info,tower_http=info".to_string());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    if let Err(e) = run().await {
        error!(error = %format!("{e:#}"), "startup failed");
        return Err(e);
    }
    Ok(())
}

async fn run() -> anyhow::Result<()> {
    let config = Arc::new(AppConfig::from_env()?);

    // The pool lives for the whole process and is closed once, below.
    let pool = db::connect_pool(&config.database);

    db::wait_for_database(&pool, &config.database).await?;
    info!("database connection established");

    db::ensure_schema(&pool).await?;
    info!("database schema verified");

    let app = app::build_app(AppState::from_pool(pool.clone()));
    let served = app::serve(app, &config).await;

    pool.close().await;
    info!("database pool closed");
    served
}
