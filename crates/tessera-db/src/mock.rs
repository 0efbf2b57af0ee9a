//! An in-memory driver that records SQL instead of running it.
//!
//! Every statement sent through a [`MockDriver`] connection is appended to a
//! shared log. Results default to empty row sets, one affected row with an
//! increasing id for inserts, and zero affected rows otherwise; a handler can
//! script specific answers or errors. Connect failures can be queued to
//! exercise pool error paths.

use std::fmt;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tessera_core::{Dialect, GenericDialect};

use crate::config::ConnectOptions;
use crate::database::Database;
use crate::driver::{Driver, DriverConnection, RawResult};
use crate::error::{Error, Result};

/// Scripted answer for a statement. Returning `None` falls back to the
/// default behavior.
pub type MockHandler = Arc<dyn Fn(&str) -> Option<Result<RawResult>> + Send + Sync>;

struct MockState {
    dialect: Arc<dyn Dialect>,
    log: Mutex<Vec<String>>,
    handler: Mutex<Option<MockHandler>>,
    connect_failures: AtomicUsize,
    connect_delay: Mutex<Option<Duration>>,
    opened: AtomicUsize,
    closed: AtomicUsize,
    next_id: AtomicI64,
}

/// Recording driver for tests and dry runs.
#[derive(Clone)]
pub struct MockDriver {
    state: Arc<MockState>,
}

impl fmt::Debug for MockDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockDriver")
            .field("dialect", &self.state.dialect.name())
            .field("statements", &self.state.log.lock().len())
            .finish_non_exhaustive()
    }
}

impl Default for MockDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl MockDriver {
    /// A mock rendering with the generic dialect.
    #[must_use]
    pub fn new() -> Self {
        Self::with_dialect(Arc::new(GenericDialect::new()))
    }

    /// A mock rendering with `dialect`.
    #[must_use]
    pub fn with_dialect(dialect: Arc<dyn Dialect>) -> Self {
        Self {
            state: Arc::new(MockState {
                dialect,
                log: Mutex::new(Vec::new()),
                handler: Mutex::new(None),
                connect_failures: AtomicUsize::new(0),
                connect_delay: Mutex::new(None),
                opened: AtomicUsize::new(0),
                closed: AtomicUsize::new(0),
                next_id: AtomicI64::new(1),
            }),
        }
    }

    /// Installs a handler consulted for every statement.
    pub fn set_handler<F>(&self, handler: F)
    where
        F: Fn(&str) -> Option<Result<RawResult>> + Send + Sync + 'static,
    {
        *self.state.handler.lock() = Some(Arc::new(handler));
    }

    /// Makes the next `count` connection attempts fail.
    pub fn fail_connects(&self, count: usize) {
        self.state.connect_failures.store(count, Ordering::SeqCst);
    }

    /// Delays every connection attempt.
    pub fn set_connect_delay(&self, delay: Duration) {
        *self.state.connect_delay.lock() = Some(delay);
    }

    /// Statements executed so far, in order.
    #[must_use]
    pub fn sqls(&self) -> Vec<String> {
        self.state.log.lock().clone()
    }

    /// Returns and clears the statement log.
    #[must_use]
    pub fn take_sqls(&self) -> Vec<String> {
        std::mem::take(&mut *self.state.log.lock())
    }

    /// Connections opened so far.
    #[must_use]
    pub fn connections_opened(&self) -> usize {
        self.state.opened.load(Ordering::SeqCst)
    }

    /// Connections explicitly closed so far.
    #[must_use]
    pub fn connections_closed(&self) -> usize {
        self.state.closed.load(Ordering::SeqCst)
    }

    /// A database over this driver.
    #[must_use]
    pub fn database(&self, options: ConnectOptions) -> Database {
        Database::with_driver(Arc::new(self.clone()), options)
    }
}

#[async_trait]
impl Driver for MockDriver {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn dialect(&self) -> Arc<dyn Dialect> {
        Arc::clone(&self.state.dialect)
    }

    async fn connect(&self, _options: &ConnectOptions) -> Result<Box<dyn DriverConnection>> {
        let delay = *self.state.connect_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let failing = self
            .state
            .connect_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(Error::Connection(String::from("mock connection refused")));
        }
        let id = self.state.opened.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Box::new(MockConnection {
            state: Arc::clone(&self.state),
            id,
        }))
    }
}

struct MockConnection {
    state: Arc<MockState>,
    id: usize,
}

impl fmt::Debug for MockConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockConnection").field("id", &self.id).finish()
    }
}

#[async_trait]
impl DriverConnection for MockConnection {
    async fn execute(&mut self, sql: &str) -> Result<RawResult> {
        self.state.log.lock().push(String::from(sql));
        let handler = self.state.handler.lock().clone();
        if let Some(answer) = handler.and_then(|h| h(sql)) {
            return answer;
        }
        let verb = sql
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .to_ascii_uppercase();
        Ok(match verb.as_str() {
            "INSERT" => RawResult::affected(
                1,
                Some(self.state.next_id.fetch_add(1, Ordering::SeqCst)),
            ),
            _ => RawResult::default(),
        })
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.state.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
