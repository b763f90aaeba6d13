//! Background LZ4 compression worker
//!
//! A single worker thread hides compression cost off the simulation
//! thread. One mutex guards the job queue, the result queue, the
//! shutdown flag, and the queue high-water marks; two condition
//! variables signal "job available" (worker side) and "result
//! available" (simulation side, used by the pre-free wait).
//!
//! The worker reads payload bytes through a shared [`SharedBuf`] and
//! never touches ring slots; every `compress_pending` flag is owned by
//! the simulation thread. On shutdown the worker finishes the jobs it
//! already holds and parks their results; the simulation thread drains
//! the leftovers after the join and clears the referenced flags.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use tracing::{debug, warn};

use crate::config::SAVED_STATE_CAPACITY;
use crate::input::Frame;
use crate::state::{codec, SharedBuf};

/// A payload waiting to be compressed. `slot` is the ring index the
/// payload was installed at; `input` keeps the bytes alive while the
/// worker reads them.
pub(crate) struct CompressJob {
    pub slot: usize,
    pub frame: Frame,
    pub input: SharedBuf,
    pub accel: i32,
}

/// A finished compression. `input` is the same buffer the job carried;
/// apply uses its identity to detect a slot that moved on.
pub(crate) struct CompressResult {
    pub slot: usize,
    pub frame: Frame,
    pub input: SharedBuf,
    pub output: Vec<u8>,
}

#[derive(Default)]
struct WorkerState {
    jobs: VecDeque<CompressJob>,
    results: VecDeque<CompressResult>,
    shutdown: bool,
    jobs_high_water: usize,
    results_high_water: usize,
}

struct Shared {
    state: Mutex<WorkerState>,
    job_ready: Condvar,
    result_ready: Condvar,
}

impl Shared {
    /// A poisoned lock means the worker panicked mid-compress; the
    /// queues themselves are still structurally sound, so keep going.
    fn lock(&self) -> MutexGuard<'_, WorkerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Queue metrics, snapshot under the worker lock.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct QueueStats {
    pub job_queue_len: usize,
    pub result_queue_len: usize,
    pub job_queue_max: usize,
    pub result_queue_max: usize,
}

/// Jobs and results still queued when the worker stopped. The caller
/// clears `compress_pending` on every slot these reference.
#[derive(Default)]
pub(crate) struct Leftovers {
    pub jobs: Vec<CompressJob>,
    pub results: Vec<CompressResult>,
}

pub(crate) struct CompressWorker {
    shared: Arc<Shared>,
    thread: Option<JoinHandle<()>>,
}

impl CompressWorker {
    /// Start the worker thread with empty queues and zeroed high-water
    /// marks.
    pub fn spawn() -> Option<Self> {
        let shared = Arc::new(Shared {
            state: Mutex::new(WorkerState::default()),
            job_ready: Condvar::new(),
            result_ready: Condvar::new(),
        });
        let worker_shared = Arc::clone(&shared);
        let thread = thread::Builder::new()
            .name("framelock-compress".into())
            .spawn(move || worker_main(worker_shared));
        match thread {
            Ok(handle) => Some(Self {
                shared,
                thread: Some(handle),
            }),
            Err(err) => {
                warn!("failed to spawn compression worker: {}", err);
                None
            }
        }
    }

    /// Queue a payload for compression.
    ///
    /// Refused (returns `false`) when the worker is shutting down or the
    /// combined queue depth has reached the ring capacity; the caller
    /// falls back to inline compression.
    pub fn try_enqueue(&self, job: CompressJob) -> bool {
        {
            let mut state = self.shared.lock();
            if state.shutdown {
                return false;
            }
            if state.jobs.len() + state.results.len() >= SAVED_STATE_CAPACITY {
                debug!("compression queue full, frame {} compresses inline", job.frame);
                return false;
            }
            state.jobs.push_back(job);
            if state.jobs.len() > state.jobs_high_water {
                state.jobs_high_water = state.jobs.len();
            }
        }
        self.shared.job_ready.notify_one();
        true
    }

    /// Take one finished result, if any.
    pub fn pop_result(&self) -> Option<CompressResult> {
        self.shared.lock().results.pop_front()
    }

    /// Block until a result is available or the worker is shutting
    /// down. Returns `false` on shutdown with nothing to drain.
    pub fn wait_for_result(&self) -> bool {
        let mut state = self.shared.lock();
        loop {
            if !state.results.is_empty() {
                return true;
            }
            if state.shutdown {
                return false;
            }
            state = self
                .shared
                .result_ready
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    pub fn queue_stats(&self) -> QueueStats {
        let state = self.shared.lock();
        QueueStats {
            job_queue_len: state.jobs.len(),
            result_queue_len: state.results.len(),
            job_queue_max: state.jobs_high_water,
            result_queue_max: state.results_high_water,
        }
    }

    /// Cooperative shutdown: flag, wake both sides, join, then hand the
    /// remaining queue contents back for flag cleanup.
    pub fn shutdown(mut self) -> Leftovers {
        self.shared.lock().shutdown = true;
        self.shared.job_ready.notify_all();
        self.shared.result_ready.notify_all();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("compression worker panicked; draining its queues anyway");
            }
        }

        let mut state = self.shared.lock();
        Leftovers {
            jobs: state.jobs.drain(..).collect(),
            results: state.results.drain(..).collect(),
        }
    }
}

impl Drop for CompressWorker {
    fn drop(&mut self) {
        // Safety net for paths that drop the worker without calling
        // shutdown(); the owned queues free their buffers on drop.
        if let Some(thread) = self.thread.take() {
            self.shared.lock().shutdown = true;
            self.shared.job_ready.notify_all();
            self.shared.result_ready.notify_all();
            let _ = thread.join();
        }
    }
}

fn worker_main(shared: Arc<Shared>) {
    loop {
        let job = {
            let mut state = shared.lock();
            loop {
                if let Some(job) = state.jobs.pop_front() {
                    break job;
                }
                if state.shutdown {
                    return;
                }
                state = shared
                    .job_ready
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner);
            }
        };

        // Compress outside the lock; this is the expensive part.
        let output = codec::compress_block(&job.input, job.accel);

        {
            let mut state = shared.lock();
            state.results.push_back(CompressResult {
                slot: job.slot,
                frame: job.frame,
                input: job.input,
                output,
            });
            if state.results.len() > state.results_high_water {
                state.results_high_water = state.results.len();
            }
        }
        shared.result_ready.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job_for(slot: usize, frame: Frame, data: Vec<u8>) -> CompressJob {
        CompressJob {
            slot,
            frame,
            input: Arc::new(data),
            accel: 2,
        }
    }

    #[test]
    fn test_worker_compresses_and_reports() {
        let worker = CompressWorker::spawn().unwrap();
        let data = vec![0u8; 64 * 1024];
        let input = Arc::new(data.clone());
        assert!(worker.try_enqueue(CompressJob {
            slot: 3,
            frame: 7,
            input: Arc::clone(&input),
            accel: 2,
        }));

        assert!(worker.wait_for_result());
        let result = worker.pop_result().unwrap();
        assert_eq!(result.slot, 3);
        assert_eq!(result.frame, 7);
        assert!(Arc::ptr_eq(&result.input, &input));
        assert!(result.output.len() < data.len());

        let mut decoded = vec![0xffu8; data.len()];
        codec::decompress_block(&result.output, &mut decoded).unwrap();
        assert_eq!(decoded, data);
    }

    #[test]
    fn test_admission_bounded_by_ring_capacity() {
        let worker = CompressWorker::spawn().unwrap();
        // Stuff the result queue directly: the admission bound counts
        // jobs + results, so a full result queue refuses new jobs.
        {
            let mut state = worker.shared.lock();
            for i in 0..SAVED_STATE_CAPACITY {
                state.results.push_back(CompressResult {
                    slot: i,
                    frame: i as Frame,
                    input: Arc::new(Vec::new()),
                    output: Vec::new(),
                });
            }
        }
        assert!(!worker.try_enqueue(job_for(0, 0, vec![0; 16])));

        worker.pop_result().unwrap();
        assert!(worker.try_enqueue(job_for(0, 0, vec![0; 16])));
    }

    #[test]
    fn test_shutdown_returns_leftovers() {
        let worker = CompressWorker::spawn().unwrap();
        for i in 0..4 {
            worker.try_enqueue(job_for(i, i as Frame, vec![1u8; 4096]));
        }
        let leftovers = worker.shutdown();
        // Every queued job either became a leftover result or a leftover
        // job; none vanish (a job mid-compress at shutdown still lands
        // in the result queue before the join returns).
        let total = leftovers.jobs.len() + leftovers.results.len();
        assert_eq!(total, 4);
        for result in &leftovers.results {
            assert!(!result.output.is_empty());
        }
    }

    #[test]
    fn test_enqueue_after_shutdown_refused() {
        let worker = CompressWorker::spawn().unwrap();
        let shared = Arc::clone(&worker.shared);
        shared.lock().shutdown = true;
        assert!(!worker.try_enqueue(job_for(0, 0, vec![0; 16])));
    }
}
