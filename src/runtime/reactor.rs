//! Shared event reactor.
//!
//! # Responsibilities
//! - Drive every asynchronous handler of a run on one thread
//! - Accept jobs posted from any thread, queued until the loop runs
//! - Stop on request and reset to a pristine loop between runs
//!
//! # Design Decisions
//! - `run()` builds a current-thread Tokio runtime and blocks on it; handlers
//!   spawned during a run are dropped with that runtime when `run()` returns
//! - Each reset retires the current generation: its queued jobs are dropped and
//!   every `ReactorHandle` into it becomes inert
//! - A stopped reactor must be reset before it can run again

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::runtime::Builder;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::observability::targets;

/// A unit of work posted to the reactor thread.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Error type for reactor operations.
#[derive(Debug, Error)]
pub enum ReactorError {
    #[error("failed to build reactor runtime: {0}")]
    Build(#[source] std::io::Error),
    #[error("reactor is already running")]
    AlreadyRunning,
    #[error("reactor generation {0} already ran; reset it before running again")]
    NeedsReset(u64),
}

/// One logical lifetime of the reactor, from one reset to the next.
struct Generation {
    id: u64,
    jobs_tx: mpsc::UnboundedSender<Job>,
    jobs_rx: Mutex<Option<mpsc::UnboundedReceiver<Job>>>,
    queued: AtomicUsize,
    stop: CancellationToken,
    handlers: TaskTracker,
    retired: AtomicBool,
}

impl Generation {
    fn new(id: u64) -> Self {
        let (jobs_tx, jobs_rx) = mpsc::unbounded_channel();
        Self {
            id,
            jobs_tx,
            jobs_rx: Mutex::new(Some(jobs_rx)),
            queued: AtomicUsize::new(0),
            stop: CancellationToken::new(),
            handlers: TaskTracker::new(),
            retired: AtomicBool::new(false),
        }
    }

    fn post(&self, job: Job) -> bool {
        if self.retired.load(Ordering::Acquire) {
            return false;
        }
        self.queued.fetch_add(1, Ordering::AcqRel);
        if self.jobs_tx.send(job).is_err() {
            self.queued.fetch_sub(1, Ordering::AcqRel);
            return false;
        }
        true
    }

    fn retire(&self) {
        self.retired.store(true, Ordering::Release);
        self.stop.cancel();
        self.handlers.close();
        let dropped = self.jobs_rx.lock().take();
        self.queued.store(0, Ordering::Release);
        // Queued jobs may own subsystem handles; drop them outside the lock.
        drop(dropped);
    }
}

/// Cloneable handle bound to one reactor generation.
///
/// After the reactor is reset, posting through an old handle fails and its
/// shutdown token is cancelled.
#[derive(Clone)]
pub struct ReactorHandle {
    generation: Arc<Generation>,
}

impl ReactorHandle {
    /// Queue a job for the reactor thread. Returns false if the generation is retired.
    pub fn post<F>(&self, job: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        self.generation.post(Box::new(job))
    }

    /// Register an asynchronous handler on the reactor.
    ///
    /// The handler starts once the reactor runs and lives until it completes,
    /// the run ends, or the generation is reset.
    pub fn spawn<F>(&self, handler: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let tracker = self.generation.handlers.clone();
        self.post(move || {
            tracker.spawn(handler);
        })
    }

    /// Ask the loop to return from `run()`.
    pub fn stop(&self) {
        self.generation.stop.cancel();
    }

    /// Token cancelled when this generation stops or is reset.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.generation.stop.child_token()
    }

    pub fn generation(&self) -> u64 {
        self.generation.id
    }

    /// True while this handle still refers to a live generation.
    pub fn is_live(&self) -> bool {
        !self.generation.retired.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for ReactorHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReactorHandle")
            .field("generation", &self.generation.id)
            .field("live", &self.is_live())
            .finish()
    }
}

struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// The process-wide event loop shared by both subsystems.
pub struct Reactor {
    current: Mutex<Arc<Generation>>,
    next_generation: AtomicU64,
    running: AtomicBool,
    resets: AtomicU64,
}

impl Reactor {
    pub fn new() -> Self {
        Self {
            current: Mutex::new(Arc::new(Generation::new(0))),
            next_generation: AtomicU64::new(1),
            running: AtomicBool::new(false),
            resets: AtomicU64::new(0),
        }
    }

    /// Handle to the current generation.
    pub fn handle(&self) -> ReactorHandle {
        ReactorHandle {
            generation: Arc::clone(&self.current.lock()),
        }
    }

    /// Queue a job on the current generation.
    pub fn post<F>(&self, job: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        self.handle().post(job)
    }

    /// Register a handler on the current generation.
    pub fn spawn<F>(&self, handler: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.handle().spawn(handler)
    }

    /// Make the running loop return. Thread-safe.
    pub fn stop(&self) {
        self.handle().stop();
    }

    /// Run the loop on the calling thread until stopped.
    pub fn run(&self) -> Result<(), ReactorError> {
        if self.running.swap(true, Ordering::AcqRel) {
            return Err(ReactorError::AlreadyRunning);
        }
        // Cleared on unwind too, so a panicking job does not wedge the reactor.
        let _running = RunningGuard(&self.running);
        self.run_generation()
    }

    fn run_generation(&self) -> Result<(), ReactorError> {
        let generation = Arc::clone(&self.current.lock());
        let Some(mut jobs) = generation.jobs_rx.lock().take() else {
            return Err(ReactorError::NeedsReset(generation.id));
        };

        let runtime = Builder::new_current_thread()
            .enable_all()
            .thread_name("nfd-reactor")
            .build()
            .map_err(ReactorError::Build)?;

        tracing::debug!(target: targets::REACTOR, generation = generation.id, "reactor running");

        let stop = generation.stop.clone();
        runtime.block_on(async {
            loop {
                tokio::select! {
                    biased;
                    _ = stop.cancelled() => break,
                    job = jobs.recv() => match job {
                        Some(job) => {
                            generation.queued.fetch_sub(1, Ordering::AcqRel);
                            job();
                        }
                        None => break,
                    },
                }
            }
        });

        // Handlers still registered die with the runtime.
        drop(runtime);
        tracing::debug!(target: targets::REACTOR, generation = generation.id, "reactor stopped");
        Ok(())
    }

    /// Discard handlers and queued jobs and start a fresh generation. Idempotent.
    pub fn reset(&self) {
        if self.running.load(Ordering::Acquire) {
            tracing::warn!(target: targets::REACTOR, "reset while the reactor is running");
        }
        let id = self.next_generation.fetch_add(1, Ordering::AcqRel);
        let retired = std::mem::replace(&mut *self.current.lock(), Arc::new(Generation::new(id)));
        retired.retire();
        self.resets.fetch_add(1, Ordering::AcqRel);
        tracing::trace!(target: targets::REACTOR, generation = id, "reactor reset");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Jobs posted to the current generation and not yet executed.
    pub fn queued_jobs(&self) -> usize {
        self.current.lock().queued.load(Ordering::Acquire)
    }

    /// Handlers of the current generation that have started and not finished.
    pub fn live_handlers(&self) -> usize {
        self.current.lock().handlers.len()
    }

    pub fn generation(&self) -> u64 {
        self.current.lock().id
    }

    pub fn reset_count(&self) -> u64 {
        self.resets.load(Ordering::Acquire)
    }
}

impl Default for Reactor {
    fn default() -> Self {
        Self::new()
    }
}
