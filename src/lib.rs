// src/lib.rs
//! Shared MySQL connection pool, configured from the environment or a
//! `KEY=VALUE` file and handed to callers as an explicit handle.

pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod pool;

pub use config::{Config, PoolConfig};
pub use db::{create_pool, MySqlConnectionPool, MySqlSource};
pub use error::{ConfigError, PoolError, PoolResult};
pub use pool::{ConnectionPool, ConnectionSource, PoolLimits, PoolStatus, PooledConnection};
