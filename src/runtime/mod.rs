//! Global runtime state shared by every run.
//!
//! # Data Flow
//! ```text
//! worker thread:
//!     GlobalRuntime::reset()            (pre-run)
//!     → Runner binds subsystems to reactor.rs / scheduler.rs
//!     → Reactor::run() until stopped
//!     → GlobalRuntime::reset()          (post-run)
//! ```
//!
//! # Design Decisions
//! - One process-wide instance (`GlobalRuntime::global()`), but every consumer
//!   takes an `Arc<GlobalRuntime>` so tests can use isolated instances
//! - Resets happen at both run boundaries; both resets are idempotent
//! - Scheduler is reset before the reactor, since its timers live on the reactor

pub mod reactor;
pub mod scheduler;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use serde::Serialize;

use crate::observability::{metrics, targets};

pub use reactor::{Job, Reactor, ReactorError, ReactorHandle};
pub use scheduler::{EventId, Scheduler};

/// Point-in-time view of the runtime state, for diagnostics and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RuntimeSnapshot {
    pub resets: u64,
    pub reactor_resets: u64,
    pub scheduler_resets: u64,
    pub reactor_generation: u64,
    pub reactor_running: bool,
    pub queued_jobs: usize,
    pub live_handlers: usize,
    pub pending_events: usize,
}

impl RuntimeSnapshot {
    /// No queued work, no handlers, no timers, not running.
    pub fn is_pristine(&self) -> bool {
        !self.reactor_running
            && self.queued_jobs == 0
            && self.live_handlers == 0
            && self.pending_events == 0
    }
}

/// The reactor and scheduler singletons with explicit reset semantics.
pub struct GlobalRuntime {
    reactor: Arc<Reactor>,
    scheduler: Arc<Scheduler>,
    resets: AtomicU64,
}

impl GlobalRuntime {
    pub fn new() -> Self {
        let reactor = Arc::new(Reactor::new());
        let scheduler = Arc::new(Scheduler::new(Arc::clone(&reactor)));
        Self {
            reactor,
            scheduler,
            resets: AtomicU64::new(0),
        }
    }

    /// The process-wide instance.
    pub fn global() -> Arc<GlobalRuntime> {
        static GLOBAL: OnceLock<Arc<GlobalRuntime>> = OnceLock::new();
        Arc::clone(GLOBAL.get_or_init(|| Arc::new(GlobalRuntime::new())))
    }

    pub fn reactor(&self) -> &Arc<Reactor> {
        &self.reactor
    }

    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    /// Cancel all pending deferred tasks.
    pub fn reset_scheduler(&self) {
        self.scheduler.reset();
    }

    /// Drop registered handlers and queued jobs, leaving a fresh reactor.
    pub fn reset_reactor(&self) {
        self.reactor.reset();
    }

    /// Reset both singletons so the next run starts from a clean slate.
    pub fn reset(&self) {
        self.reset_scheduler();
        self.reset_reactor();
        let resets = self.resets.fetch_add(1, Ordering::AcqRel) + 1;
        metrics::record_runtime_reset();
        tracing::debug!(
            target: targets::SERVICE,
            resets,
            generation = self.reactor.generation(),
            "global runtime reset"
        );
    }

    /// Number of full resets performed.
    pub fn reset_count(&self) -> u64 {
        self.resets.load(Ordering::Acquire)
    }

    pub fn snapshot(&self) -> RuntimeSnapshot {
        RuntimeSnapshot {
            resets: self.reset_count(),
            reactor_resets: self.reactor.reset_count(),
            scheduler_resets: self.scheduler.reset_count(),
            reactor_generation: self.reactor.generation(),
            reactor_running: self.reactor.is_running(),
            queued_jobs: self.reactor.queued_jobs(),
            live_handlers: self.reactor.live_handlers(),
            pending_events: self.scheduler.pending(),
        }
    }

    pub fn is_pristine(&self) -> bool {
        self.snapshot().is_pristine()
    }
}

impl Default for GlobalRuntime {
    fn default() -> Self {
        Self::new()
    }
}
