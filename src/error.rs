// src/error.rs

/// Errors raised while loading or validating the pool configuration
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("Error reading config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config value: {0}")]
    Parse(#[from] envy::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Errors returned when building the pool or borrowing a connection from it
#[derive(thiserror::Error, Debug)]
pub enum PoolError {
    #[error("Database connection failed: {0}")]
    Connect(#[from] sqlx::Error),

    #[error("No connections available (limit {limit})")]
    Exhausted { limit: u32 },

    #[error("Queue limit reached ({limit} waiting)")]
    QueueFull { limit: u32 },

    #[error("Pool is closed")]
    Closed,

    #[error(transparent)]
    Config(#[from] ConfigError),
}

pub type PoolResult<T> = Result<T, PoolError>;
