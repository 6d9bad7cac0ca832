//! A fixed-size pool of worker threads for the CPU-bound verification calls.
//!
//! Calls are dispatched from the caller's thread, which keeps at most
//! `workers * MAX_CALLS_PER_WORKER` of them in flight and matches responses to requests by
//! [`CallId`]. A call that panics is a worker failure and is re-dispatched until the retry
//! budget is spent. Cancelling the pool makes the dispatcher return at its next poll; calls
//! still running are abandoned and queued ones never start.
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::{
    any::Any,
    collections::{HashMap, VecDeque},
    panic::{self, AssertUnwindSafe},
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        mpsc::{self, RecvTimeoutError},
        Arc,
    },
    time::Duration,
};
use thiserror::Error;
use tracing::{debug, warn};

/// Calls a single worker may have in flight at once
pub const MAX_CALLS_PER_WORKER: usize = 3;

/// Re-dispatches of a failing call before its error surfaces
pub const MAX_RETRIES: usize = 3;

/// Batches per worker when a job is split into chunks
const CHUNKS_PER_WORKER: usize = 4;

const POLL_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkerError {
    #[error("cannot start worker pool: {0}")]
    Build(String),

    #[error("{method}: call failed after {attempts} attempts: {reason}")]
    Failed {
        method: String,
        attempts: usize,
        reason: String,
    },

    #[error("{method}: interrupted")]
    Cancelled { method: String },

    #[error("{method}: worker pool returned no result")]
    Disconnected { method: String },
}

/// Identity of one dispatched call; a retry gets a fresh one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallId(u64);

/// Cloneable handle that cancels the pool it came from, e.g. from a signal handler
#[derive(Debug, Clone)]
pub struct CancelHandle {
    flag: Arc<AtomicBool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        return self.flag.load(Ordering::SeqCst);
    }
}

pub struct WorkerPool {
    pool: ThreadPool,
    workers: usize,
    retries: usize,
    cancelled: Arc<AtomicBool>,
    next_id: AtomicU64,
}

impl WorkerPool {
    pub fn new(workers: usize, retries: usize) -> Result<Self, WorkerError> {
        let workers = workers.max(1);
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|idx| format!("audit-worker-{}", idx))
            .build()
            .map_err(|e| WorkerError::Build(e.to_string()))?;
        return Ok(Self {
            pool,
            workers,
            retries,
            cancelled: Arc::new(AtomicBool::new(false)),
            next_id: AtomicU64::new(0),
        });
    }

    /// One worker per logical CPU, with the default retry budget
    pub fn with_hardware_parallelism() -> Result<Self, WorkerError> {
        return Self::new(num_cpus::get(), MAX_RETRIES);
    }

    pub fn get_workers(&self) -> usize {
        self.workers
    }

    /// Batch size that spreads a job over a few batches per worker
    pub fn chunk_size(&self) -> usize {
        return self.workers * CHUNKS_PER_WORKER;
    }

    pub fn get_cancel_handle(&self) -> CancelHandle {
        return CancelHandle {
            flag: Arc::clone(&self.cancelled),
        };
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        return self.cancelled.load(Ordering::SeqCst);
    }

    fn next_call_id(&self) -> CallId {
        return CallId(self.next_id.fetch_add(1, Ordering::Relaxed));
    }

    /// Apply `f` to every input on the pool. Results come back in input order no matter
    /// in which order the calls complete.
    pub fn map<I, T, F>(&self, method: &str, inputs: Vec<I>, f: F) -> Result<Vec<T>, WorkerError>
    where
        I: Clone + Send + 'static,
        T: Send + 'static,
        F: Fn(I) -> T + Send + Sync + 'static,
    {
        let total = inputs.len();
        let f = Arc::new(f);
        let limit = self.workers * MAX_CALLS_PER_WORKER;
        let (sender, receiver) = mpsc::channel::<(CallId, Result<T, String>)>();

        let mut results: Vec<Option<T>> = (0..total).map(|_| None).collect();
        let mut queue: VecDeque<(usize, usize)> = (0..total).map(|idx| (idx, 0)).collect();
        let mut in_flight: HashMap<CallId, (usize, usize)> = HashMap::new();
        let mut completed = 0;

        debug!("{}: dispatching {} calls", method, total);
        while completed < total {
            if self.is_cancelled() {
                debug!("{}: abandoning {} calls in flight", method, in_flight.len());
                return Err(WorkerError::Cancelled {
                    method: method.to_string(),
                });
            }

            while in_flight.len() < limit {
                let (idx, retry) = match queue.pop_front() {
                    Some(next) => next,
                    None => break,
                };
                let id = self.next_call_id();
                in_flight.insert(id, (idx, retry));

                let sender = sender.clone();
                let f = Arc::clone(&f);
                let input = inputs[idx].clone();
                let cancelled = Arc::clone(&self.cancelled);
                self.pool.spawn(move || {
                    if cancelled.load(Ordering::SeqCst) {
                        return;
                    }
                    let outcome = panic::catch_unwind(AssertUnwindSafe(|| f(input)))
                        .map_err(|payload| panic_message(payload.as_ref()));
                    // the dispatcher may be gone after a cancellation
                    let _ = sender.send((id, outcome));
                });
            }

            let (id, outcome) = match receiver.recv_timeout(POLL_INTERVAL) {
                Ok(response) => response,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(WorkerError::Disconnected {
                        method: method.to_string(),
                    })
                }
            };
            let (idx, retry) = match in_flight.remove(&id) {
                Some(call) => call,
                None => continue,
            };
            match outcome {
                Ok(value) => {
                    results[idx] = Some(value);
                    completed += 1;
                }
                Err(reason) if retry < self.retries => {
                    warn!(
                        "{}: call {:?} failed ({}), retry {}/{}",
                        method,
                        id,
                        reason,
                        retry + 1,
                        self.retries
                    );
                    queue.push_back((idx, retry + 1));
                }
                Err(reason) => {
                    return Err(WorkerError::Failed {
                        method: method.to_string(),
                        attempts: retry + 1,
                        reason,
                    });
                }
            }
        }

        return results
            .into_iter()
            .map(|result| {
                result.ok_or_else(|| WorkerError::Disconnected {
                    method: method.to_string(),
                })
            })
            .collect();
    }

    /// Run a single call on the pool
    pub fn call<T, F>(&self, method: &str, f: F) -> Result<T, WorkerError>
    where
        T: Send + 'static,
        F: Fn() -> T + Send + Sync + 'static,
    {
        return self
            .map(method, vec![()], move |()| f())?
            .into_iter()
            .next()
            .ok_or_else(|| WorkerError::Disconnected {
                method: method.to_string(),
            });
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        return message.to_string();
    }
    if let Some(message) = payload.downcast_ref::<String>() {
        return message.clone();
    }
    return "worker panicked".to_string();
}
