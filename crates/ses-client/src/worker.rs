//! # Entitlement Worker
//!
//! Async facade over the blocking [`EntitlementEngine`]. The engine lives on
//! one dedicated thread that takes jobs from a queue in submission order,
//! which is what serializes access to its cached AKA token. Results come
//! back either as a [`PendingFetch`] future or through a
//! [`PseudonymCallback`] run on a runtime of the caller's choosing.
//!
//! The worker thread enters the runtime handle it was spawned with, so a
//! transport that bridges onto Tokio (such as
//! [`crate::transport::HttpsTransport`]) works from it.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::thread::JoinHandle;

use ses_core::{CarrierId, PseudonymRecord};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};

use crate::engine::EntitlementEngine;
use crate::error::{EntitlementError, FailureReason};

type FetchResult = Result<Option<PseudonymRecord>, EntitlementError>;

struct Job {
    carrier_id: CarrierId,
    reply: Box<dyn FnOnce(FetchResult) + Send>,
}

/// Receives the outcome of a callback-style submission.
pub trait PseudonymCallback: Send + Sync {
    fn on_success(&self, carrier_id: CarrierId, record: PseudonymRecord);

    fn on_failure(&self, carrier_id: CarrierId, reason: FailureReason, description: String);
}

/// Worker facade failure.
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("failed to spawn entitlement worker: {reason}")]
    Spawn { reason: String },

    /// The worker no longer accepts jobs.
    #[error("entitlement worker is shut down")]
    Closed,

    /// The worker went away before answering.
    #[error("entitlement worker dropped the request")]
    Dropped,

    #[error("entitlement worker panicked")]
    Panicked,

    #[error(transparent)]
    Entitlement(#[from] EntitlementError),
}

/// Future resolving to the result of one submitted fetch.
#[derive(Debug)]
pub struct PendingFetch {
    rx: oneshot::Receiver<FetchResult>,
}

impl Future for PendingFetch {
    type Output = Result<Option<PseudonymRecord>, WorkerError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result.map_err(WorkerError::from)),
            Poll::Ready(Err(_)) => Poll::Ready(Err(WorkerError::Dropped)),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Handle to the worker thread that owns an engine.
pub struct EntitlementWorker {
    jobs: mpsc::UnboundedSender<Job>,
    thread: JoinHandle<()>,
}

impl fmt::Debug for EntitlementWorker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntitlementWorker")
            .field("closed", &self.jobs.is_closed())
            .field("thread", &self.thread.thread().name())
            .finish()
    }
}

impl EntitlementWorker {
    /// Move `engine` onto a new worker thread that has entered `runtime`.
    pub fn spawn(engine: EntitlementEngine, runtime: Handle) -> Result<Self, WorkerError> {
        let (jobs, mut rx) = mpsc::unbounded_channel::<Job>();
        let thread = std::thread::Builder::new()
            .name("ses-entitlement".into())
            .spawn(move || {
                let _guard = runtime.enter();
                let mut engine = engine;
                while let Some(job) = rx.blocking_recv() {
                    let result = engine.fetch_pseudonym(job.carrier_id);
                    (job.reply)(result);
                }
                tracing::debug!("entitlement worker stopped");
            })
            .map_err(|e| WorkerError::Spawn {
                reason: e.to_string(),
            })?;
        Ok(Self { jobs, thread })
    }

    /// Queue a fetch and return a future for its result.
    pub fn submit(&self, carrier_id: CarrierId) -> Result<PendingFetch, WorkerError> {
        let (tx, rx) = oneshot::channel();
        self.enqueue(
            carrier_id,
            Box::new(move |result| {
                // The caller may have dropped the future.
                let _ = tx.send(result);
            }),
        )?;
        Ok(PendingFetch { rx })
    }

    /// Queue a fetch whose outcome is delivered to `callback` on `deliver_on`.
    ///
    /// A successful exchange without a usable pseudonym is reported as a
    /// non-transient failure.
    pub fn submit_with_callback(
        &self,
        carrier_id: CarrierId,
        callback: Arc<dyn PseudonymCallback>,
        deliver_on: Handle,
    ) -> Result<(), WorkerError> {
        self.enqueue(
            carrier_id,
            Box::new(move |result| {
                deliver_on.spawn(async move {
                    match result {
                        Ok(Some(record)) => callback.on_success(carrier_id, record),
                        Ok(None) => callback.on_failure(
                            carrier_id,
                            FailureReason::NonTransientFailure,
                            "no valid pseudonym received".into(),
                        ),
                        Err(e) => callback.on_failure(carrier_id, e.reason(), e.to_string()),
                    }
                });
            }),
        )
    }

    fn enqueue(
        &self,
        carrier_id: CarrierId,
        reply: Box<dyn FnOnce(FetchResult) + Send>,
    ) -> Result<(), WorkerError> {
        self.jobs
            .send(Job { carrier_id, reply })
            .map_err(|_| WorkerError::Closed)
    }

    /// Stop accepting jobs, let queued jobs finish and join the thread.
    pub fn shutdown(self) -> Result<(), WorkerError> {
        let Self { jobs, thread } = self;
        drop(jobs);
        thread.join().map_err(|_| WorkerError::Panicked)
    }
}
