//! Connection pooling.
//!
//! The multi-threaded pool keeps idle connections in a stack and records
//! which caller holds which connection. A caller asking again while it still
//! holds one gets the same connection back, so nested operations never
//! deadlock on the pool and a transaction stays on one session. When the
//! pool is at capacity, acquirers wait until a release wakes them or the
//! configured timeout passes.
//!
//! The single-threaded pool shares one lazily opened connection between
//! every caller and never blocks on capacity.
//!
//! A connection that leaves the pool for good is closed through its driver:
//! right away when nothing else holds it, otherwise on a runtime task once
//! the last holder lets go.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use futures::future::BoxFuture;
use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, Notify};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::caller::{in_caller_scope, CallerId};
use crate::config::ConnectOptions;
use crate::driver::{Driver, DriverConnection, RawResult};
use crate::error::{Error, Result};

static NEXT_ENTRY: AtomicU64 = AtomicU64::new(1);

#[derive(Debug)]
struct PoolEntry {
    id: u64,
    conn: AsyncMutex<Option<Box<dyn DriverConnection>>>,
    in_transaction: AtomicBool,
    savepoints: AtomicUsize,
}

impl PoolEntry {
    fn new(conn: Box<dyn DriverConnection>) -> Arc<Self> {
        Arc::new(Self {
            id: NEXT_ENTRY.fetch_add(1, Ordering::Relaxed),
            conn: AsyncMutex::new(Some(conn)),
            in_transaction: AtomicBool::new(false),
            savepoints: AtomicUsize::new(0),
        })
    }

    async fn close(self: Arc<Self>) {
        let id = self.id;
        // Still held elsewhere: the last drop closes it.
        let Ok(mut entry) = Arc::try_unwrap(self) else {
            return;
        };
        if let Some(conn) = entry.conn.get_mut().take() {
            close_connection(id, conn).await;
        }
    }
}

impl Drop for PoolEntry {
    fn drop(&mut self) {
        let Some(conn) = self.conn.get_mut().take() else {
            return;
        };
        let id = self.id;
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(close_connection(id, conn));
            }
            Err(_) => warn!(connection = id, "no runtime to close connection; dropping it"),
        }
    }
}

async fn close_connection(id: u64, conn: Box<dyn DriverConnection>) {
    match conn.close().await {
        Ok(()) => debug!(connection = id, "closed connection"),
        Err(e) => warn!(connection = id, error = %e, "error while closing connection"),
    }
}

#[derive(Debug)]
struct Allocation {
    entry: Arc<PoolEntry>,
    depth: usize,
}

#[derive(Debug, Default)]
struct PoolState {
    available: Vec<Arc<PoolEntry>>,
    allocated: HashMap<CallerId, Allocation>,
    size: usize,
    closed: bool,
}

#[derive(Debug)]
struct PoolInner {
    driver: Arc<dyn Driver>,
    options: ConnectOptions,
    state: Mutex<PoolState>,
    notify: Notify,
    shared: Mutex<Option<Arc<PoolEntry>>>,
    connecting: AsyncMutex<()>,
}

impl PoolInner {
    fn release(&self, caller: CallerId) {
        let mut state = self.state.lock();
        let Some(allocation) = state.allocated.get_mut(&caller) else {
            return;
        };
        allocation.depth -= 1;
        if allocation.depth > 0 {
            return;
        }
        let Some(allocation) = state.allocated.remove(&caller) else {
            return;
        };
        let entry = allocation.entry;
        let poisoned = entry.in_transaction.load(Ordering::Acquire);
        if state.closed || poisoned {
            state.size -= 1;
            drop(state);
            if poisoned {
                warn!(
                    connection = entry.id,
                    caller = %caller,
                    "discarding connection released inside a transaction"
                );
            }
            // The last holder's drop closes the driver connection.
            drop(entry);
        } else {
            state.available.push(entry);
            drop(state);
        }
        self.notify.notify_one();
    }
}

/// Counters describing a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    /// Open connections.
    pub size: usize,
    /// Idle connections.
    pub available: usize,
    /// Callers currently holding a connection.
    pub in_use: usize,
    /// Connection limit.
    pub max_size: usize,
}

enum Checkout {
    Ready(Arc<PoolEntry>),
    Connect(Reservation),
    Wait,
}

/// A capacity slot taken before connecting. Dropping it unfulfilled gives
/// the slot back, so a failed or cancelled connect never leaks capacity.
struct Reservation {
    pool: Arc<PoolInner>,
    armed: bool,
}

impl Reservation {
    fn fulfil(mut self, conn: Box<dyn DriverConnection>, caller: CallerId) -> Arc<PoolEntry> {
        self.armed = false;
        let entry = PoolEntry::new(conn);
        let mut state = self.pool.state.lock();
        // The caller got a connection while this one was opening: keep the
        // first and park the new one for somebody else.
        if let Some(allocation) = state.allocated.get_mut(&caller) {
            allocation.depth += 1;
            let held = Arc::clone(&allocation.entry);
            debug!(connection = entry.id, caller = %caller, "parking connection opened concurrently");
            state.available.push(entry);
            drop(state);
            self.pool.notify.notify_one();
            return held;
        }
        state.allocated.insert(
            caller,
            Allocation {
                entry: Arc::clone(&entry),
                depth: 1,
            },
        );
        entry
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        if self.armed {
            self.pool.state.lock().size -= 1;
            self.pool.notify.notify_one();
        }
    }
}

/// A bounded, caller-aware connection pool.
#[derive(Debug, Clone)]
pub struct ConnectionPool {
    inner: Arc<PoolInner>,
}

impl ConnectionPool {
    /// Creates a pool. No connection is opened until first use.
    #[must_use]
    pub fn new(driver: Arc<dyn Driver>, options: ConnectOptions) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                driver,
                options,
                state: Mutex::new(PoolState::default()),
                notify: Notify::new(),
                shared: Mutex::new(None),
                connecting: AsyncMutex::new(()),
            }),
        }
    }

    /// Options the pool was created with.
    #[must_use]
    pub fn options(&self) -> &ConnectOptions {
        &self.inner.options
    }

    /// Whether the pool shares a single connection.
    #[must_use]
    pub fn is_single_threaded(&self) -> bool {
        self.inner.options.single_threaded
    }

    fn max_size(&self) -> usize {
        if self.is_single_threaded() {
            1
        } else {
            self.inner.options.max_connections.max(1)
        }
    }

    /// Current counters.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        let state = self.inner.state.lock();
        PoolStats {
            size: state.size,
            available: state.available.len(),
            in_use: state.allocated.len(),
            max_size: self.max_size(),
        }
    }

    /// Acquires a connection for the current caller.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PoolTimeout`] when no connection frees up in time,
    /// [`Error::PoolClosed`] after [`ConnectionPool::disconnect`], and
    /// [`Error::Connection`] when opening a new connection fails.
    pub async fn acquire(&self) -> Result<PooledConnection> {
        self.acquire_for(CallerId::current_or_next()).await
    }

    /// Acquires a connection on behalf of `caller`.
    ///
    /// # Errors
    ///
    /// See [`ConnectionPool::acquire`].
    pub async fn acquire_for(&self, caller: CallerId) -> Result<PooledConnection> {
        if self.is_single_threaded() {
            return self.acquire_shared(caller).await;
        }
        let timeout = self.inner.options.timeout();
        let deadline = Instant::now() + timeout;
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            match self.checkout(caller)? {
                Checkout::Ready(entry) => return Ok(self.handle(entry, caller, false)),
                Checkout::Connect(reservation) => {
                    let conn = self.connect().await?;
                    let entry = reservation.fulfil(conn, caller);
                    debug!(connection = entry.id, caller = %caller, "opened connection");
                    return Ok(self.handle(entry, caller, false));
                }
                Checkout::Wait => {
                    if tokio::time::timeout_at(deadline, notified).await.is_err() {
                        return Err(Error::PoolTimeout(timeout));
                    }
                }
            }
        }
    }

    fn checkout(&self, caller: CallerId) -> Result<Checkout> {
        let mut state = self.inner.state.lock();
        if state.closed {
            return Err(Error::PoolClosed);
        }
        if let Some(allocation) = state.allocated.get_mut(&caller) {
            allocation.depth += 1;
            return Ok(Checkout::Ready(Arc::clone(&allocation.entry)));
        }
        if let Some(entry) = state.available.pop() {
            state.allocated.insert(
                caller,
                Allocation {
                    entry: Arc::clone(&entry),
                    depth: 1,
                },
            );
            return Ok(Checkout::Ready(entry));
        }
        if state.size < self.max_size() {
            state.size += 1;
            return Ok(Checkout::Connect(Reservation {
                pool: Arc::clone(&self.inner),
                armed: true,
            }));
        }
        Ok(Checkout::Wait)
    }

    async fn connect(&self) -> Result<Box<dyn DriverConnection>> {
        self.inner
            .driver
            .connect(&self.inner.options)
            .await
            .map_err(|e| match e {
                Error::Connection(_) => e,
                other => Error::Connection(other.to_string()),
            })
    }

    async fn acquire_shared(&self, caller: CallerId) -> Result<PooledConnection> {
        let _connecting = self.inner.connecting.lock().await;
        if self.inner.state.lock().closed {
            return Err(Error::PoolClosed);
        }
        let existing = self.inner.shared.lock().clone();
        let entry = match existing {
            Some(entry) => entry,
            None => {
                let entry = PoolEntry::new(self.connect().await?);
                debug!(connection = entry.id, "opened shared connection");
                *self.inner.shared.lock() = Some(Arc::clone(&entry));
                self.inner.state.lock().size = 1;
                entry
            }
        };
        Ok(self.handle(entry, caller, true))
    }

    fn handle(&self, entry: Arc<PoolEntry>, caller: CallerId, shared: bool) -> PooledConnection {
        PooledConnection {
            pool: Arc::clone(&self.inner),
            entry,
            caller,
            shared,
            released: false,
        }
    }

    /// Runs `f` with a connection held for its whole duration.
    ///
    /// The closure runs inside a caller scope, so anything it does through
    /// the same pool reuses the held connection.
    ///
    /// # Errors
    ///
    /// Returns acquisition errors and whatever `f` returns.
    pub async fn with_connection<T, F>(&self, f: F) -> Result<T>
    where
        F: for<'c> FnOnce(&'c PooledConnection) -> BoxFuture<'c, Result<T>>,
    {
        in_caller_scope(async move {
            let conn = self.acquire().await?;
            f(&conn).await
        })
        .await
    }

    /// Closes idle connections and refuses further acquisitions. Connections
    /// still held are closed when released.
    pub async fn disconnect(&self) {
        let idle = {
            let mut state = self.inner.state.lock();
            state.closed = true;
            let idle = std::mem::take(&mut state.available);
            state.size -= idle.len();
            idle
        };
        let shared = self.inner.shared.lock().take();
        if shared.is_some() {
            self.inner.state.lock().size = 0;
        }
        let count = idle.len() + usize::from(shared.is_some());
        for entry in idle.into_iter().chain(shared) {
            entry.close().await;
        }
        self.inner.notify.notify_waiters();
        info!(closed = count, "connection pool disconnected");
    }
}

/// A connection checked out of a [`ConnectionPool`]. Returned on drop.
#[derive(Debug)]
pub struct PooledConnection {
    pool: Arc<PoolInner>,
    entry: Arc<PoolEntry>,
    caller: CallerId,
    shared: bool,
    released: bool,
}

impl PooledConnection {
    /// The caller holding this connection.
    #[must_use]
    pub const fn caller(&self) -> CallerId {
        self.caller
    }

    /// Identifies the physical connection.
    #[must_use]
    pub fn connection_id(&self) -> u64 {
        self.entry.id
    }

    /// Executes one statement on the held connection.
    ///
    /// # Errors
    ///
    /// Returns the driver error enriched with `sql`.
    pub async fn execute(&self, sql: &str) -> Result<RawResult> {
        debug!(sql = %sql, caller = %self.caller, connection = self.entry.id, "executing");
        let mut conn = self.entry.conn.lock().await;
        let conn = conn.as_mut().ok_or_else(closed_connection)?;
        conn.execute(sql).await.map_err(|e| e.with_sql(sql))
    }

    /// Column names of a table, given its already-quoted name.
    ///
    /// # Errors
    ///
    /// Returns the driver error.
    pub async fn table_columns(&self, quoted_table: &str) -> Result<Vec<String>> {
        let mut conn = self.entry.conn.lock().await;
        let conn = conn.as_mut().ok_or_else(closed_connection)?;
        conn.table_columns(quoted_table).await
    }

    /// Current savepoint nesting on this connection.
    #[must_use]
    pub fn savepoint_depth(&self) -> usize {
        self.entry.savepoints.load(Ordering::Acquire)
    }

    /// Opens one more savepoint level and returns its depth.
    pub fn enter_savepoint(&self) -> usize {
        self.entry.savepoints.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Closes the innermost savepoint level.
    pub fn leave_savepoint(&self) {
        let left = self
            .entry
            .savepoints
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
        if left.is_err() {
            warn!(
                connection = self.entry.id,
                caller = %self.caller,
                "savepoint released with no savepoint open"
            );
        }
    }

    /// Whether a transaction is open on this connection.
    #[must_use]
    pub fn in_transaction(&self) -> bool {
        self.entry.in_transaction.load(Ordering::Acquire)
    }

    /// Marks whether a transaction is open on this connection.
    pub fn set_in_transaction(&self, open: bool) {
        self.entry.in_transaction.store(open, Ordering::Release);
    }

    /// Takes the connection out of service once every holder has released
    /// it. Used when its session state can no longer be trusted.
    ///
    /// A pooled connection is already discarded on release while its
    /// transaction flag is set; a shared connection is removed from the
    /// shared slot here so the next acquirer opens a fresh one.
    pub fn discard(&self) {
        if !self.shared {
            return;
        }
        let mut slot = self.pool.shared.lock();
        if slot.as_ref().is_some_and(|e| e.id == self.entry.id) {
            *slot = None;
            drop(slot);
            self.pool.state.lock().size = 0;
            warn!(connection = self.entry.id, caller = %self.caller, "discarding shared connection");
        }
    }

    /// Returns the connection to the pool now rather than on drop.
    pub fn release(mut self) {
        self.release_inner();
    }

    fn release_inner(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if !self.shared {
            self.pool.release(self.caller);
        }
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        self.release_inner();
    }
}

fn closed_connection() -> Error {
    Error::Connection(String::from("connection already closed"))
}
