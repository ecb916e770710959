use async_trait::async_trait;
use secrecy::ExposeSecret;
use sqlx::mysql::{MySqlConnectOptions, MySqlPoolOptions};
use sqlx::pool::PoolConnection;
use sqlx::{MySql, MySqlPool};
use tracing::info;

use crate::config::PoolConfig;
use crate::error::PoolResult;
use crate::pool::{ConnectionPool, ConnectionSource};

pub type MySqlConnectionPool = ConnectionPool<MySqlSource>;

/// sqlx pool used as the connection store behind [`ConnectionPool`]
pub struct MySqlSource {
    pool: MySqlPool,
}

impl MySqlSource {
    /// Connections are opened on first checkout, not here.
    pub fn new(conf: &PoolConfig) -> Self {
        let options = MySqlConnectOptions::new()
            .host(&conf.host)
            .port(conf.port)
            .username(&conf.user)
            .password(conf.password.expose_secret())
            .database(&conf.database)
            .charset(&conf.charset);

        let pool = MySqlPoolOptions::new()
            .max_connections(conf.connection_limit)
            .acquire_timeout(conf.connect_timeout())
            .connect_lazy_with(options);

        MySqlSource { pool }
    }

    /// Connections currently open against the server, idle or borrowed
    pub fn open_connections(&self) -> u32 {
        self.pool.size()
    }
}

#[async_trait]
impl ConnectionSource for MySqlSource {
    type Connection = PoolConnection<MySql>;

    async fn checkout(&self) -> PoolResult<PoolConnection<MySql>> {
        Ok(self.pool.acquire().await?)
    }

    // waits for borrowed connections to be returned
    async fn close(&self) {
        self.pool.close().await;
    }
}

// Builds the shared MySQL pool; no connection is made until the first acquire
pub fn create_pool(conf: &PoolConfig) -> PoolResult<MySqlConnectionPool> {
    conf.validate()?;
    let source = MySqlSource::new(conf);
    info!(url = %conf.display_url(), "database pool configured");
    Ok(ConnectionPool::new(source, conf.limits()))
}
