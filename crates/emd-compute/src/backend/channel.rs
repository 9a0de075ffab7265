//! Serialized compute channel.
//!
//! All kernel calls in the process funnel through one dedicated worker
//! thread, fed by an unbounded FIFO queue. Any thread may submit; units
//! run strictly one at a time in the order they were accepted, and each
//! submitter gets its result back through a [`ComputeHandle`].
//!
//! ```text
//! batch job ──┐
//! preview   ──┼── Submitter::submit ──> mpsc queue ──> "emd-compute" worker ──> KernelPort
//! estimator ──┘                                            │
//!                  ComputeHandle::wait <── oneshot ────────┘
//! ```
//!
//! A unit that fails or panics only affects its own handle; the worker
//! keeps draining the queue. Dropping the [`ComputeChannel`] closes the
//! queue, lets already queued units finish and joins the worker.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use tracing::{debug, trace, warn};

use super::kernel::KernelError;
use crate::{DenoiseError, DenoiseResult};

/// Default worker thread name.
pub const DEFAULT_WORKER_NAME: &str = "emd-compute";

type Job = Box<dyn FnOnce() + Send + 'static>;

struct Shared {
    name: String,
    tx: Mutex<Option<Sender<Job>>>,
    submitted: AtomicU64,
    completed: AtomicU64,
}

/// Owner of the compute worker.
pub struct ComputeChannel {
    submitter: Submitter,
    worker: Option<JoinHandle<()>>,
}

impl ComputeChannel {
    /// Spawns the worker with the default name.
    pub fn new() -> DenoiseResult<Self> {
        Self::with_name(DEFAULT_WORKER_NAME)
    }

    /// Spawns the worker thread under `name`.
    pub fn with_name(name: &str) -> DenoiseResult<Self> {
        let (tx, rx) = mpsc::channel::<Job>();
        let shared = Arc::new(Shared {
            name: name.to_string(),
            tx: Mutex::new(Some(tx)),
            submitted: AtomicU64::new(0),
            completed: AtomicU64::new(0),
        });

        let worker_shared = Arc::clone(&shared);
        let worker = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || run_worker(rx, &worker_shared))
            .map_err(DenoiseError::WorkerSpawn)?;

        debug!(worker = name, "compute channel started");
        Ok(Self { submitter: Submitter { shared }, worker: Some(worker) })
    }

    /// Queues a unit of work. See [`Submitter::submit`].
    pub fn submit<T, F>(&self, work: F) -> ComputeHandle<T>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T, KernelError> + Send + 'static,
    {
        self.submitter.submit(work)
    }

    /// Cloneable handle for submitting from other threads.
    pub fn submitter(&self) -> Submitter {
        self.submitter.clone()
    }

    /// Number of units that have finished running.
    pub fn completed(&self) -> u64 {
        self.submitter.completed()
    }
}

impl Drop for ComputeChannel {
    fn drop(&mut self) {
        // Closing the sender ends the worker loop once the queue is drained.
        self.submitter.shared.tx.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!(worker = %self.submitter.shared.name, "compute worker terminated abnormally");
            }
        }
    }
}

fn run_worker(rx: Receiver<Job>, shared: &Shared) {
    for job in rx {
        job();
        let done = shared.completed.fetch_add(1, Ordering::AcqRel) + 1;
        trace!(worker = %shared.name, done, "unit complete");
    }
    debug!(worker = %shared.name, "compute channel closed");
}

/// Cloneable entry point to a [`ComputeChannel`].
#[derive(Clone)]
pub struct Submitter {
    shared: Arc<Shared>,
}

impl Submitter {
    /// Queues `work` behind everything already submitted.
    ///
    /// Never blocks beyond the enqueue. A panic inside `work` is caught on
    /// the worker and reported as [`KernelError::Panicked`]. If the channel
    /// has shut down the handle resolves to [`KernelError::Disconnected`].
    pub fn submit<T, F>(&self, work: F) -> ComputeHandle<T>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T, KernelError> + Send + 'static,
    {
        let (result_tx, result_rx) = mpsc::sync_channel(1);
        let job: Job = Box::new(move || {
            let outcome = panic::catch_unwind(AssertUnwindSafe(work))
                .unwrap_or_else(|payload| Err(KernelError::Panicked(panic_message(payload.as_ref()))));
            // The waiter may have given up; that is not the worker's problem.
            let _ = result_tx.send(outcome);
        });

        // Numbered under the queue lock so `seq` matches queue order.
        let guard = self.shared.tx.lock().unwrap_or_else(PoisonError::into_inner);
        let seq = self.shared.submitted.fetch_add(1, Ordering::AcqRel);
        match guard.as_ref() {
            Some(tx) => {
                if tx.send(job).is_err() {
                    warn!(worker = %self.shared.name, seq, "compute worker gone, unit dropped");
                } else {
                    trace!(worker = %self.shared.name, seq, "unit queued");
                }
            }
            None => warn!(worker = %self.shared.name, seq, "compute channel closed, unit dropped"),
        }

        ComputeHandle { rx: result_rx, seq }
    }

    /// Number of units submitted so far.
    pub fn submitted(&self) -> u64 {
        self.shared.submitted.load(Ordering::Acquire)
    }

    /// Number of units that have finished running.
    pub fn completed(&self) -> u64 {
        self.shared.completed.load(Ordering::Acquire)
    }

    /// Worker thread name.
    pub fn name(&self) -> &str {
        &self.shared.name
    }
}

impl std::fmt::Debug for Submitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Submitter")
            .field("name", &self.shared.name)
            .field("submitted", &self.submitted())
            .field("completed", &self.completed())
            .finish()
    }
}

/// Pending result of a submitted unit.
#[derive(Debug)]
pub struct ComputeHandle<T> {
    rx: Receiver<Result<T, KernelError>>,
    seq: u64,
}

impl<T> ComputeHandle<T> {
    /// Submission order of the unit (0-based, per channel).
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Blocks until the unit has run.
    pub fn wait(self) -> Result<T, KernelError> {
        self.rx.recv().unwrap_or(Err(KernelError::Disconnected))
    }

    /// Returns the outcome if the unit has already run.
    ///
    /// Once an outcome has been returned, later calls report
    /// [`KernelError::Disconnected`].
    pub fn try_wait(&mut self) -> Option<Result<T, KernelError>> {
        match self.rx.try_recv() {
            Ok(outcome) => Some(outcome),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(KernelError::Disconnected)),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
