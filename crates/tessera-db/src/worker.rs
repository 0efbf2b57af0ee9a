//! Background worker bound to one connection.
//!
//! A [`Worker`] runs submitted jobs one after another on a dedicated task
//! that holds a single pooled connection for its whole life. Job failures
//! are collected rather than stopping the stream. With
//! [`WorkerOptions::transaction`] set, every job runs inside one transaction
//! that is rolled back at [`Worker::join`] if any job failed.

use std::future::Future;

use futures::future::BoxFuture;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::caller::CallerId;
use crate::database::Database;
use crate::error::{Error, Result};

type Job = Box<dyn FnOnce(Database) -> BoxFuture<'static, Result<()>> + Send>;

/// Worker settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerOptions {
    /// Wrap every job in one transaction.
    pub transaction: bool,
}

/// Outcome of a drained worker.
#[derive(Debug, Default)]
pub struct WorkerReport {
    /// Jobs that finished without error.
    pub completed: usize,
    /// Errors from failed jobs, in submission order.
    pub errors: Vec<Error>,
    /// Whether the worker's transaction was rolled back.
    pub rolled_back: bool,
}

/// Queue-fed job runner on a single connection.
#[derive(Debug)]
pub struct Worker {
    sender: UnboundedSender<Job>,
    handle: JoinHandle<Result<WorkerReport>>,
}

impl Worker {
    /// Starts a worker on the current tokio runtime.
    #[must_use]
    pub fn spawn(db: Database, options: WorkerOptions) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel::<Job>();
        let caller = CallerId::next();
        let handle = tokio::spawn(caller.scope(run_worker(db, options, receiver)));
        debug!(caller = %caller, transaction = options.transaction, "worker started");
        Self { sender, handle }
    }

    /// Queues a job.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidOperation`] when the worker already stopped,
    /// for instance because its connection could not be opened.
    pub fn submit<F, Fut>(&self, job: F) -> Result<()>
    where
        F: FnOnce(Database) -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let job: Job = Box::new(move |db| Box::pin(job(db)));
        self.sender
            .send(job)
            .map_err(|_| Error::InvalidOperation(String::from("worker has stopped")))
    }

    /// Closes the queue, waits for every queued job, and reports.
    ///
    /// # Errors
    ///
    /// Returns connection and transaction errors that stopped the worker
    /// itself. Job errors are reported in [`WorkerReport::errors`].
    pub async fn join(self) -> Result<WorkerReport> {
        drop(self.sender);
        self.handle
            .await
            .map_err(|e| Error::InvalidOperation(format!("worker task failed: {e}")))?
    }
}

async fn run_worker(
    db: Database,
    options: WorkerOptions,
    mut receiver: UnboundedReceiver<Job>,
) -> Result<WorkerReport> {
    let conn = db.pool().acquire().await?;
    let mut report = WorkerReport::default();

    if options.transaction {
        let stream = &mut report;
        let outcome = db
            .transaction(|tx| async move {
                drain(tx.database(), &mut receiver, stream).await;
                if stream.errors.is_empty() {
                    Ok(())
                } else {
                    tx.rollback()
                }
            })
            .await?;
        report.rolled_back = outcome.is_none();
    } else {
        drain(&db, &mut receiver, &mut report).await;
    }

    drop(conn);
    info!(
        completed = report.completed,
        failed = report.errors.len(),
        rolled_back = report.rolled_back,
        "worker finished"
    );
    Ok(report)
}

async fn drain(db: &Database, receiver: &mut UnboundedReceiver<Job>, report: &mut WorkerReport) {
    while let Some(job) = receiver.recv().await {
        match job(db.clone()).await {
            Ok(()) => report.completed += 1,
            Err(e) => {
                warn!(error = %e, "worker job failed");
                report.errors.push(e);
            }
        }
    }
}
