//! Background batch jobs.
//!
//! [`BatchJob::spawn`] runs [`DenoiseEngine::denoise`] on its own thread so
//! a UI loop can keep polling progress and offer a cancel button.

use std::sync::Arc;
use std::sync::mpsc::{self, Receiver};
use std::thread::{self, JoinHandle};

use emd_core::SliceSource;
use tracing::{debug, warn};

use crate::backend::{CancelToken, DenoiseEngine, DenoiseJob, DenoiseOutcome, ProgressState};
use crate::{DenoiseError, DenoiseResult};

/// Snapshot returned by [`BatchJob::poll`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    /// Still running; latest progress seen.
    Running(ProgressState),
    /// The worker has returned; call [`BatchJob::join`] for the outcome.
    Finished(ProgressState),
}

/// Handle to a denoise job running on a background thread.
pub struct BatchJob {
    cancel: CancelToken,
    progress_rx: Receiver<ProgressState>,
    latest: ProgressState,
    worker: JoinHandle<DenoiseResult<DenoiseOutcome>>,
}

impl BatchJob {
    /// Starts `job` over `source` on a new thread.
    pub fn spawn(engine: DenoiseEngine, source: Arc<dyn SliceSource>, job: DenoiseJob) -> DenoiseResult<Self> {
        let cancel = CancelToken::new();
        let (tx, progress_rx) = mpsc::channel();

        let worker_cancel = cancel.clone();
        let worker = thread::Builder::new()
            .name("emd-batch".to_string())
            .spawn(move || engine.denoise(source.as_ref(), &job, &tx, &worker_cancel))
            .map_err(DenoiseError::WorkerSpawn)?;

        debug!("batch job spawned");
        Ok(Self { cancel, progress_rx, latest: ProgressState::default(), worker })
    }

    /// Token that cancels this job; may be handed to other threads.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Asks the job to stop before its next tile.
    pub fn request_cancel(&self) {
        self.cancel.request_cancel();
    }

    /// Drains pending progress updates without blocking.
    pub fn poll(&mut self) -> JobStatus {
        // Checked first so a finished job has no updates left in flight.
        let finished = self.worker.is_finished();
        while let Ok(state) = self.progress_rx.try_recv() {
            self.latest = state;
        }
        if finished {
            JobStatus::Finished(self.latest)
        } else {
            JobStatus::Running(self.latest)
        }
    }

    /// Latest progress seen by [`poll`](Self::poll).
    pub fn progress(&self) -> ProgressState {
        self.latest
    }

    /// Waits for the job and returns its outcome.
    pub fn join(self) -> DenoiseResult<DenoiseOutcome> {
        self.worker.join().unwrap_or_else(|_| {
            warn!("batch job thread panicked");
            Err(DenoiseError::JobPanicked)
        })
    }
}

impl std::fmt::Debug for BatchJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchJob")
            .field("latest", &self.latest)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithm::AlgorithmParams;
    use crate::backend::{ComputeChannel, KernelError, KernelPort};
    use crate::normalize::Normalizer;
    use emd_core::{Image, SliceRange, SliceStack};
    use std::time::Duration;

    struct Slow;

    impl KernelPort for Slow {
        fn name(&self) -> &str {
            "slow"
        }

        fn invoke(&self, tile: &Image, _: &AlgorithmParams, _: &Normalizer) -> Result<Image, KernelError> {
            thread::sleep(Duration::from_millis(5));
            Ok(tile.clone())
        }
    }

    fn source(n: usize) -> Arc<SliceStack> {
        let slices = (0..n).map(|_| Image::from_u8(16, 16, vec![7; 256]).unwrap()).collect();
        Arc::new(SliceStack::new("stack", slices).unwrap())
    }

    fn job(src: &SliceStack) -> DenoiseJob {
        DenoiseJob {
            range: SliceRange::all(src).unwrap(),
            tile_width: 8,
            tile_height: 8,
            margin: 2,
            params: AlgorithmParams::Gaussian(Default::default()),
        }
    }

    #[test]
    fn test_runs_to_completion() {
        let channel = ComputeChannel::new().unwrap();
        let engine = DenoiseEngine::new(channel.submitter(), Arc::new(Slow));
        let src = source(2);
        let mut handle = BatchJob::spawn(engine, src.clone(), job(&src)).unwrap();

        while let JobStatus::Running(_) = handle.poll() {
            thread::sleep(Duration::from_millis(2));
        }
        assert_eq!(handle.progress(), ProgressState { completed_units: 8, total_units: 8 });
        let stack = handle.join().unwrap().into_stack().unwrap();
        assert_eq!(stack.slices(), src.slices());
    }

    #[test]
    fn test_cancel_from_another_thread() {
        let channel = ComputeChannel::new().unwrap();
        let engine = DenoiseEngine::new(channel.submitter(), Arc::new(Slow));
        let src = source(50);
        let handle = BatchJob::spawn(engine, src.clone(), job(&src)).unwrap();

        let token = handle.cancel_token();
        thread::spawn(move || token.request_cancel()).join().unwrap();

        match handle.join().unwrap() {
            DenoiseOutcome::Cancelled(state) => {
                assert_eq!(state.total_units, 200);
                assert!(state.completed_units < 200);
            }
            DenoiseOutcome::Completed(_) => panic!("job ignored cancellation"),
        }
    }
}
