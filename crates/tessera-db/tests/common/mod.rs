#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use tessera_core::Dialect;
use tessera_db::{ConnectOptions, Database, MockDriver};

/// Sends log output to the test harness. Later calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

pub fn options(max_connections: usize) -> ConnectOptions {
    init_tracing();
    ConnectOptions::new("mock")
        .with_max_connections(max_connections)
        .with_pool_timeout(Duration::from_secs(5))
}

pub fn mock_db(max_connections: usize) -> (MockDriver, Database) {
    let driver = MockDriver::new();
    let db = driver.database(options(max_connections));
    (driver, db)
}

pub fn mock_db_with_dialect(dialect: Arc<dyn Dialect>) -> (MockDriver, Database) {
    let driver = MockDriver::with_dialect(dialect);
    let db = driver.database(options(4));
    (driver, db)
}

/// Waits for discarded connections to be closed on their background task.
pub async fn wait_for_closed(driver: &MockDriver, expected: usize) {
    tokio::time::timeout(Duration::from_secs(1), async {
        while driver.connections_closed() < expected {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("connection was not closed");
}
