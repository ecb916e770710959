#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use dbpool::{ConnectionSource, PoolError, PoolLimits, PoolResult};

#[derive(Debug, Default)]
struct Counters {
    idle: Vec<u64>,
    opened: u64,
    checked_out: usize,
    peak: usize,
    refuse: bool,
    closed: bool,
}

/// In-memory stand-in for a database that records how connections are used
#[derive(Clone, Default)]
pub struct FakeSource {
    state: Arc<Mutex<Counters>>,
}

impl FakeSource {
    /// Connections ever opened
    pub fn opened(&self) -> u64 {
        self.state.lock().unwrap().opened
    }

    /// Highest number of connections out at the same time
    pub fn peak(&self) -> usize {
        self.state.lock().unwrap().peak
    }

    pub fn checked_out(&self) -> usize {
        self.state.lock().unwrap().checked_out
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().unwrap().closed
    }

    /// Makes every following checkout fail as if credentials were rejected
    pub fn refuse(&self, refuse: bool) {
        self.state.lock().unwrap().refuse = refuse;
    }
}

#[derive(Debug)]
pub struct FakeConnection {
    pub id: u64,
    state: Arc<Mutex<Counters>>,
}

impl Drop for FakeConnection {
    fn drop(&mut self) {
        let mut state = self.state.lock().unwrap();
        state.idle.push(self.id);
        state.checked_out -= 1;
    }
}

#[async_trait]
impl ConnectionSource for FakeSource {
    type Connection = FakeConnection;

    async fn checkout(&self) -> PoolResult<FakeConnection> {
        let mut state = self.state.lock().unwrap();
        if state.refuse {
            return Err(PoolError::Connect(sqlx::Error::Protocol(
                "Access denied for user 'root'@'localhost'".to_string(),
            )));
        }

        let id = match state.idle.pop() {
            Some(id) => id,
            None => {
                state.opened += 1;
                state.opened
            }
        };
        state.checked_out += 1;
        state.peak = state.peak.max(state.checked_out);

        Ok(FakeConnection {
            id,
            state: Arc::clone(&self.state),
        })
    }

    // like sqlx, closing waits until every borrowed connection is back
    async fn close(&self) {
        while self.checked_out() > 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        let mut state = self.state.lock().unwrap();
        state.idle.clear();
        state.closed = true;
    }
}

pub fn limits(connection_limit: u32, queue_limit: u32, wait_for_connections: bool) -> PoolLimits {
    PoolLimits {
        wait_for_connections,
        connection_limit,
        queue_limit,
    }
}
