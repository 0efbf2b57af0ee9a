//! Pool capacity, affinity and lifecycle.

mod common;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tessera_db::{in_caller_scope, CallerId, ConnectOptions, Error, MockDriver};

use common::{mock_db, options, wait_for_closed};

#[tokio::test]
async fn test_second_acquire_times_out_at_capacity() {
    let driver = MockDriver::new();
    let db = driver.database(
        ConnectOptions::new("mock")
            .with_max_connections(1)
            .with_pool_timeout(Duration::from_millis(50)),
    );

    let held = CallerId::next().scope(db.pool().acquire()).await.unwrap();
    let err = db.pool().acquire().await.unwrap_err();
    assert!(matches!(err, Error::PoolTimeout(_)));

    let stats = db.pool().stats();
    assert_eq!(stats.size, 1);
    assert_eq!(stats.in_use, 1);

    drop(held);
    let again = db.pool().acquire().await.unwrap();
    assert_eq!(driver.connections_opened(), 1);
    drop(again);
}

#[tokio::test]
async fn test_waiter_wakes_when_connection_is_released() {
    let (driver, db) = mock_db(1);
    let held = CallerId::next().scope(db.pool().acquire()).await.unwrap();

    let pool = db.pool().clone();
    let waiter = tokio::spawn(async move { pool.acquire().await.map(|c| c.connection_id()) });
    tokio::time::sleep(Duration::from_millis(20)).await;
    let id = held.connection_id();
    drop(held);

    assert_eq!(waiter.await.unwrap().unwrap(), id);
    assert_eq!(driver.connections_opened(), 1);
}

#[tokio::test]
async fn test_same_caller_gets_same_connection() {
    let (_driver, db) = mock_db(1);
    in_caller_scope(async {
        let outer = db.pool().acquire().await.unwrap();
        let inner = db.pool().acquire().await.unwrap();
        assert_eq!(outer.connection_id(), inner.connection_id());
        assert_eq!(db.pool().stats().in_use, 1);
        drop(inner);
        assert_eq!(db.pool().stats().in_use, 1);
        drop(outer);
        assert_eq!(db.pool().stats().in_use, 0);
        assert_eq!(db.pool().stats().available, 1);
    })
    .await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_no_connection_is_shared_between_callers() {
    let (driver, db) = mock_db(3);
    let held = Arc::new(Mutex::new(HashSet::new()));

    let mut tasks = Vec::new();
    for _ in 0..16 {
        let db = db.clone();
        let held = Arc::clone(&held);
        tasks.push(tokio::spawn(in_caller_scope(async move {
            for _ in 0..5 {
                let conn = db.pool().acquire().await.unwrap();
                assert!(held.lock().insert(conn.connection_id()));
                assert!(db.pool().stats().in_use <= 3);
                tokio::time::sleep(Duration::from_millis(1)).await;
                assert!(held.lock().remove(&conn.connection_id()));
            }
        })));
    }
    for task in tasks {
        task.await.unwrap();
    }

    assert!(driver.connections_opened() <= 3);
    let stats = db.pool().stats();
    assert_eq!(stats.in_use, 0);
    assert_eq!(stats.available, stats.size);
}

#[tokio::test]
async fn test_failed_connect_frees_its_slot() {
    let (driver, db) = mock_db(1);
    driver.fail_connects(1);

    let err = db.pool().acquire().await.unwrap_err();
    assert!(matches!(err, Error::Connection(_)));
    assert_eq!(db.pool().stats().size, 0);

    let conn = db.pool().acquire().await.unwrap();
    assert_eq!(db.pool().stats().size, 1);
    drop(conn);
}

#[tokio::test]
async fn test_cancelled_connect_frees_its_slot() {
    let driver = MockDriver::new();
    driver.set_connect_delay(Duration::from_millis(200));
    let db = driver.database(options(1));

    let attempt = tokio::time::timeout(Duration::from_millis(20), db.pool().acquire()).await;
    assert!(attempt.is_err());
    assert_eq!(db.pool().stats().size, 0);
}

#[tokio::test]
async fn test_connection_released_inside_transaction_is_discarded() {
    let (driver, db) = mock_db(2);
    let conn = db.pool().acquire().await.unwrap();
    conn.set_in_transaction(true);
    drop(conn);

    let stats = db.pool().stats();
    assert_eq!(stats.size, 0);
    assert_eq!(stats.available, 0);

    let fresh = db.pool().acquire().await.unwrap();
    assert!(!fresh.in_transaction());
    assert_eq!(driver.connections_opened(), 2);
}

#[tokio::test]
async fn test_disconnect_closes_idle_and_refuses_new_acquires() {
    let (driver, db) = mock_db(2);
    db.execute("SELECT 1").await.unwrap();
    assert_eq!(db.pool().stats().available, 1);

    db.disconnect().await;
    assert_eq!(driver.connections_closed(), 1);
    assert_eq!(db.pool().stats().size, 0);
    assert!(matches!(
        db.pool().acquire().await.unwrap_err(),
        Error::PoolClosed
    ));
}

#[tokio::test]
async fn test_single_threaded_pool_shares_one_connection() {
    let driver = MockDriver::new();
    let db = driver.database(options(4).with_single_threaded(true));

    let a = db.pool().acquire().await.unwrap();
    let b = db.pool().acquire().await.unwrap();
    assert_eq!(a.connection_id(), b.connection_id());
    assert!(db.pool().is_single_threaded());
    assert_eq!(db.pool().stats().max_size, 1);
    assert_eq!(driver.connections_opened(), 1);
}

#[tokio::test]
async fn test_discarded_connection_is_closed_by_driver() {
    let (driver, db) = mock_db(2);
    let conn = db.pool().acquire().await.unwrap();
    conn.set_in_transaction(true);
    drop(conn);

    wait_for_closed(&driver, 1).await;
    assert_eq!(driver.connections_closed(), 1);
}

#[tokio::test]
async fn test_connection_held_through_disconnect_is_closed_on_release() {
    let (driver, db) = mock_db(2);
    let held = db.pool().acquire().await.unwrap();

    db.disconnect().await;
    assert_eq!(driver.connections_closed(), 0);
    drop(held);

    wait_for_closed(&driver, 1).await;
    assert_eq!(db.pool().stats().size, 0);
}

#[tokio::test]
async fn test_concurrent_acquires_by_one_caller_share_a_connection() {
    let driver = MockDriver::new();
    driver.set_connect_delay(Duration::from_millis(20));
    let db = driver.database(options(2));

    in_caller_scope(async {
        let (a, b) = tokio::join!(db.pool().acquire(), db.pool().acquire());
        let (a, b) = (a.unwrap(), b.unwrap());
        assert_eq!(a.connection_id(), b.connection_id());
        assert_eq!(db.pool().stats().in_use, 1);
        assert_eq!(db.pool().stats().available, 1);
        drop(a);
        assert_eq!(db.pool().stats().in_use, 1);
        drop(b);
    })
    .await;

    let stats = db.pool().stats();
    assert_eq!(driver.connections_opened(), 2);
    assert_eq!(stats.size, 2);
    assert_eq!(stats.available, 2);
    assert_eq!(stats.in_use, 0);
}

#[tokio::test]
async fn test_discarded_shared_connection_is_replaced() {
    let driver = MockDriver::new();
    let db = driver.database(options(4).with_single_threaded(true));

    let first = db.pool().acquire().await.unwrap();
    let old_id = first.connection_id();
    first.discard();
    assert_eq!(db.pool().stats().size, 0);
    drop(first);
    wait_for_closed(&driver, 1).await;

    let fresh = db.pool().acquire().await.unwrap();
    assert_ne!(fresh.connection_id(), old_id);
    assert_eq!(driver.connections_opened(), 2);
    assert_eq!(db.pool().stats().size, 1);
}

#[tokio::test]
async fn test_unbalanced_savepoint_release_keeps_depth_at_zero() {
    let (_driver, db) = mock_db(1);
    let conn = db.pool().acquire().await.unwrap();
    assert_eq!(conn.enter_savepoint(), 1);
    conn.leave_savepoint();
    conn.leave_savepoint();
    assert_eq!(conn.savepoint_depth(), 0);
    assert_eq!(conn.enter_savepoint(), 1);
}
