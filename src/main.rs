// src/main.rs
use std::env;

use anyhow::Context;
use sqlx::Connection;
use tracing::info;

use dbpool::logging::{self, LogLevel};
use dbpool::{create_pool, Config, MySqlConnectionPool};

/// Application-wide shared state, passed to whatever needs the database
#[derive(Clone)]
struct AppState {
    db: MySqlConnectionPool,
}

/// Borrows one connection and pings the server with it
async fn check_connection(state: &AppState) -> anyhow::Result<()> {
    let mut conn = state
        .db
        .acquire()
        .await
        .context("Database connection failed")?;
    conn.ping().await.context("Database ping failed")?;
    conn.release();

    info!(status = ?state.db.status(), "database reachable");
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env is loaded once here, before any config source is read
    dotenv::dotenv().ok();

    // A config file takes precedence over the environment
    let conf = match env::var("DBPOOL_CONFIG") {
        Ok(path) => Config::from_file(&path)?,
        Err(_) => Config::from_env()?,
    };

    logging::init(LogLevel::from_str(&conf.log_level), conf.log_file.as_deref())?;
    info!("[Startup] dbpool starting...");

    let state = AppState {
        db: create_pool(&conf.pool)?,
    };

    let result = check_connection(&state).await;
    state
        .db
        .close()
        .await
        .context("Failed to close database pool")?;
    result
}
