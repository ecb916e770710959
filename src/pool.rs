//! Bounded connection pool
//!
//! At most `connection_limit` connections are checked out at once. Callers
//! beyond that either wait in FIFO order or are rejected, depending on
//! [`PoolLimits`]. Opening and recycling the connections themselves is left to
//! a [`ConnectionSource`].

use std::collections::VecDeque;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{PoolError, PoolResult};

/// Backend that hands out live connections.
///
/// Dropping a connection returned by `checkout` must give it back to the
/// source without closing it.
#[async_trait]
pub trait ConnectionSource: Send + Sync + 'static {
    type Connection: Send + 'static;

    async fn checkout(&self) -> PoolResult<Self::Connection>;

    /// Close the backend. May wait for borrowed connections to come back;
    /// [`ConnectionPool::close`] runs it on a background task.
    async fn close(&self) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolLimits {
    pub wait_for_connections: bool,
    pub connection_limit: u32,
    /// 0 means unbounded
    pub queue_limit: u32,
}

/// Point-in-time view of the pool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    pub in_use: usize,
    pub available: usize,
    pub waiting: usize,
    pub limits: PoolLimits,
}

struct Waiter {
    id: u64,
    tx: oneshot::Sender<()>,
}

#[derive(Default)]
struct QueueState {
    in_use: usize,
    waiters: VecDeque<Waiter>,
    next_id: u64,
    closed: bool,
}

/// Slot accounting shared by the pool and every borrowed connection
struct SlotQueue {
    limits: PoolLimits,
    state: Mutex<QueueState>,
}

enum Admission {
    Ready(Slot),
    Queued(u64, oneshot::Receiver<()>),
}

impl SlotQueue {
    /// Decides under one lock whether the caller gets a slot, waits or fails
    fn admit(self: &Arc<Self>) -> PoolResult<Admission> {
        let limits = self.limits;
        let mut state = self.state.lock();

        if state.closed {
            return Err(PoolError::Closed);
        }

        if state.waiters.is_empty() && state.in_use < limits.connection_limit as usize {
            state.in_use += 1;
            return Ok(Admission::Ready(Slot {
                queue: Arc::clone(self),
            }));
        }

        if !limits.wait_for_connections {
            debug!(limit = limits.connection_limit, "pool exhausted, not waiting");
            return Err(PoolError::Exhausted {
                limit: limits.connection_limit,
            });
        }

        if limits.queue_limit != 0 && state.waiters.len() >= limits.queue_limit as usize {
            debug!(queue_limit = limits.queue_limit, "wait queue full");
            return Err(PoolError::QueueFull {
                limit: limits.queue_limit,
            });
        }

        let (tx, rx) = oneshot::channel();
        let id = state.next_id;
        state.next_id += 1;
        state.waiters.push_back(Waiter { id, tx });
        debug!(waiting = state.waiters.len(), "all connections in use, waiting");

        Ok(Admission::Queued(id, rx))
    }

    /// Hands a freed slot to the oldest live waiter, or marks it free
    fn release(&self) {
        let mut state = self.state.lock();
        while let Some(waiter) = state.waiters.pop_front() {
            if waiter.tx.send(()).is_ok() {
                return;
            }
        }
        state.in_use = state.in_use.saturating_sub(1);
    }

    /// Drops a waiter that gave up. Returns false if it was already served.
    fn withdraw(&self, id: u64) -> bool {
        let mut state = self.state.lock();
        match state.waiters.iter().position(|w| w.id == id) {
            Some(pos) => {
                state.waiters.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Fails every waiter; returns false if already closed
    fn close(&self) -> bool {
        let mut state = self.state.lock();
        if state.closed {
            return false;
        }
        state.closed = true;
        // dropping the senders wakes the waiters with an error
        state.waiters.clear();
        true
    }
}

/// One of the `connection_limit` slots; freed on drop
struct Slot {
    queue: Arc<SlotQueue>,
}

impl Drop for Slot {
    fn drop(&mut self) {
        self.queue.release();
    }
}

/// Queue position of a suspended `acquire`; leaves the queue if dropped
struct QueuedCaller {
    queue: Arc<SlotQueue>,
    id: u64,
    rx: oneshot::Receiver<()>,
    served: bool,
}

impl Drop for QueuedCaller {
    fn drop(&mut self) {
        if self.served || self.queue.withdraw(self.id) {
            return;
        }
        // a slot was handed over just before the caller went away
        if self.rx.try_recv().is_ok() {
            self.queue.release();
        }
    }
}

struct PoolInner<S> {
    source: S,
    slots: Arc<SlotQueue>,
}

/// Shared pool handle. Clones refer to the same pool.
pub struct ConnectionPool<S: ConnectionSource> {
    inner: Arc<PoolInner<S>>,
}

impl<S: ConnectionSource> Clone for ConnectionPool<S> {
    fn clone(&self) -> Self {
        ConnectionPool {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: ConnectionSource> fmt::Debug for ConnectionPool<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("status", &self.status())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl<S: ConnectionSource> ConnectionPool<S> {
    pub fn new(source: S, limits: PoolLimits) -> Self {
        info!(
            connection_limit = limits.connection_limit,
            queue_limit = limits.queue_limit,
            wait_for_connections = limits.wait_for_connections,
            "connection pool created"
        );
        ConnectionPool {
            inner: Arc::new(PoolInner {
                source,
                slots: Arc::new(SlotQueue {
                    limits,
                    state: Mutex::new(QueueState::default()),
                }),
            }),
        }
    }

    pub fn limits(&self) -> PoolLimits {
        self.inner.slots.limits
    }

    pub fn source(&self) -> &S {
        &self.inner.source
    }

    /// Borrows a connection.
    ///
    /// When every connection is out this either suspends until one is
    /// released or fails with [`PoolError::Exhausted`], and fails with
    /// [`PoolError::QueueFull`] once `queue_limit` callers are already waiting.
    /// Dropping the returned future gives up the caller's place in the queue.
    pub async fn acquire(&self) -> PoolResult<PooledConnection<S::Connection>> {
        let slot = match self.inner.slots.admit()? {
            Admission::Ready(slot) => slot,
            Admission::Queued(id, rx) => self.wait_for_slot(id, rx).await?,
        };

        // on error the slot drops here and goes to the next waiter
        let conn = match self.inner.source.checkout().await {
            Ok(conn) => conn,
            Err(err) => {
                warn!(error = %err, "connection checkout failed");
                return Err(err);
            }
        };

        Ok(PooledConnection { conn, _slot: slot })
    }

    async fn wait_for_slot(&self, id: u64, rx: oneshot::Receiver<()>) -> PoolResult<Slot> {
        let mut caller = QueuedCaller {
            queue: Arc::clone(&self.inner.slots),
            id,
            rx,
            served: false,
        };

        (&mut caller.rx).await.map_err(|_| PoolError::Closed)?;
        caller.served = true;

        Ok(Slot {
            queue: Arc::clone(&self.inner.slots),
        })
    }

    pub fn status(&self) -> PoolStatus {
        let limits = self.inner.slots.limits;
        let state = self.inner.slots.state.lock();
        PoolStatus {
            in_use: state.in_use,
            available: (limits.connection_limit as usize).saturating_sub(state.in_use),
            waiting: state.waiters.len(),
            limits,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.slots.state.lock().closed
    }

    /// Stops handing out connections and fails every waiting caller.
    ///
    /// The backend is shut down on a background task, which finishes once all
    /// borrowed connections have been dropped; they stay usable until then.
    /// Must be called from within a tokio runtime.
    pub fn close(&self) -> JoinHandle<()> {
        let first = self.inner.slots.close();
        let inner = Arc::clone(&self.inner);

        tokio::spawn(async move {
            if first {
                inner.source.close().await;
                info!("connection pool closed");
            }
        })
    }
}

/// A connection borrowed from a [`ConnectionPool`].
///
/// Dropping it returns the connection and frees the slot for the next waiter.
pub struct PooledConnection<C> {
    // dropped before the slot, so the connection is back before a waiter wakes
    conn: C,
    _slot: Slot,
}

impl<C> PooledConnection<C> {
    pub fn release(self) {
        drop(self);
    }
}

impl<C> Deref for PooledConnection<C> {
    type Target = C;

    fn deref(&self) -> &C {
        &self.conn
    }
}

impl<C> DerefMut for PooledConnection<C> {
    fn deref_mut(&mut self) -> &mut C {
        &mut self.conn
    }
}

impl<C: fmt::Debug> fmt::Debug for PooledConnection<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PooledConnection").field(&self.conn).finish()
    }
}
