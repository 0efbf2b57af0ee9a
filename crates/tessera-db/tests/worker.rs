//! Background worker streams.

mod common;

use tessera_db::{Error, Worker, WorkerOptions};

use common::mock_db;

fn insert_job(n: usize) -> String {
    format!("INSERT INTO events VALUES ({n})")
}

#[tokio::test]
async fn test_failing_job_rolls_back_transaction() {
    let (driver, db) = mock_db(2);
    let worker = Worker::spawn(db.clone(), WorkerOptions { transaction: true });

    for n in 1..=5 {
        worker
            .submit(move |db| async move {
                if n == 3 {
                    return Err(Error::InvalidOperation(String::from("job 3 failed")));
                }
                db.execute(&insert_job(n)).await.map(|_| ())
            })
            .unwrap();
    }
    let report = worker.join().await.unwrap();

    assert_eq!(report.completed, 4);
    assert_eq!(report.errors.len(), 1);
    assert!(report.rolled_back);
    assert_eq!(
        driver.sqls(),
        vec![
            String::from("BEGIN"),
            insert_job(1),
            insert_job(2),
            insert_job(4),
            insert_job(5),
            String::from("ROLLBACK"),
        ]
    );
    assert_eq!(driver.connections_opened(), 1);
    assert_eq!(db.pool().stats().in_use, 0);
}

#[tokio::test]
async fn test_clean_stream_commits() {
    let (driver, db) = mock_db(2);
    let worker = Worker::spawn(db, WorkerOptions { transaction: true });
    for n in 1..=2 {
        worker
            .submit(move |db| async move { db.execute(&insert_job(n)).await.map(|_| ()) })
            .unwrap();
    }
    let report = worker.join().await.unwrap();

    assert!(report.errors.is_empty());
    assert!(!report.rolled_back);
    assert_eq!(driver.sqls().last().map(String::as_str), Some("COMMIT"));
}

#[tokio::test]
async fn test_worker_without_transaction_keeps_going() {
    let (driver, db) = mock_db(1);
    let worker = Worker::spawn(db, WorkerOptions::default());
    for n in 1..=3 {
        worker
            .submit(move |db| async move {
                db.execute(&insert_job(n)).await?;
                if n == 2 {
                    return Err(Error::InvalidOperation(String::from("bad row")));
                }
                Ok(())
            })
            .unwrap();
    }
    let report = worker.join().await.unwrap();

    assert_eq!(report.completed, 2);
    assert_eq!(report.errors.len(), 1);
    assert!(!report.rolled_back);
    assert_eq!(driver.sqls(), vec![insert_job(1), insert_job(2), insert_job(3)]);
}

#[tokio::test]
async fn test_worker_reports_connection_failure() {
    let (driver, db) = mock_db(1);
    driver.fail_connects(1);
    let worker = Worker::spawn(db, WorkerOptions::default());
    let err = worker.join().await.unwrap_err();
    assert!(matches!(err, Error::Connection(_)));
}
