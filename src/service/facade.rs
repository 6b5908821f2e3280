//! Host-facing service controls.
//!
//! # Responsibilities
//! - start / stop / is-running / list-log-modules for the embedding host
//! - Make double starts and stray stops harmless
//! - Keep every failure on the worker thread; the host only sees state
//!
//! # Design Decisions
//! - Service state, a stop request and the run number share one atomic word;
//!   a compare-and-swap on it admits exactly one worker
//! - A stop recorded while the worker is still constructing is seen by the
//!   worker's own Starting → Running transition, so it cannot be lost
//! - Finishing a run clears the stop request together with the state, so a
//!   late stop never leaks into the next run

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use arc_swap::ArcSwapOption;
use parking_lot::{Condvar, Mutex};
use serde::Serialize;

use crate::config::ConfigSource;
use crate::lifecycle::{FailureKind, RunnerHandle};
use crate::observability::{metrics, modules, targets};
use crate::runtime::GlobalRuntime;
use crate::service::params::StartupParameters;
use crate::service::worker;

/// Coarse state of the service as seen by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ServiceState {
    Stopped,
    Starting,
    Running,
}

impl ServiceState {
    fn from_bits(bits: u64) -> Self {
        match bits & STATE_MASK {
            1 => ServiceState::Starting,
            2 => ServiceState::Running,
            _ => ServiceState::Stopped,
        }
    }

    fn bits(self) -> u64 {
        match self {
            ServiceState::Stopped => 0,
            ServiceState::Starting => 1,
            ServiceState::Running => 2,
        }
    }
}

const STATE_MASK: u64 = 0b011;
const STOP_REQUESTED: u64 = 0b100;
const RUN_SHIFT: u32 = 3;

/// Service state, stop request and run number packed in one word.
pub(crate) struct Control(AtomicU64);

impl Control {
    fn new() -> Self {
        Self(AtomicU64::new(ServiceState::Stopped.bits()))
    }

    fn update(&self, f: impl FnMut(u64) -> Option<u64>) -> Result<u64, u64> {
        self.0.fetch_update(Ordering::SeqCst, Ordering::SeqCst, f)
    }

    pub(crate) fn state(&self) -> ServiceState {
        ServiceState::from_bits(self.0.load(Ordering::SeqCst))
    }

    fn runs(&self) -> u64 {
        self.0.load(Ordering::SeqCst) >> RUN_SHIFT
    }

    #[cfg(test)]
    fn stop_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst) & STOP_REQUESTED != 0
    }

    /// Stopped → Starting with a fresh run number and no stop request.
    fn admit(&self) -> Option<u64> {
        self.update(|bits| {
            (ServiceState::from_bits(bits) == ServiceState::Stopped).then(|| {
                let run = (bits >> RUN_SHIFT) + 1;
                (run << RUN_SHIFT) | ServiceState::Starting.bits()
            })
        })
        .ok()
        .map(|previous| (previous >> RUN_SHIFT) + 1)
    }

    /// Record a stop against the current run. Returns the state it was
    /// recorded in, or `None` when nothing runs.
    fn request_stop(&self) -> Option<ServiceState> {
        self.update(|bits| {
            (ServiceState::from_bits(bits) != ServiceState::Stopped)
                .then_some(bits | STOP_REQUESTED)
        })
        .ok()
        .map(ServiceState::from_bits)
    }

    /// Starting → Running. True if a stop was requested before the switch.
    pub(crate) fn mark_running(&self) -> bool {
        let previous = self
            .update(|bits| Some((bits & !STATE_MASK) | ServiceState::Running.bits()))
            .unwrap_or_else(|bits| bits);
        previous & STOP_REQUESTED != 0
    }

    /// Back to Stopped, dropping any stop request. The run number stays.
    fn finish(&self) {
        let _ = self.update(|bits| Some(bits & !(STATE_MASK | STOP_REQUESTED)));
    }
}

/// State shared between the facade and its worker thread.
pub(crate) struct Inner {
    pub(crate) runtime: Arc<GlobalRuntime>,
    pub(crate) config: ConfigSource,
    pub(crate) control: Control,
    pub(crate) controller: ArcSwapOption<RunnerHandle>,
    pub(crate) last_failure: Mutex<Option<FailureKind>>,
    stopped_lock: Mutex<()>,
    stopped: Condvar,
}

impl Inner {
    pub(crate) fn state(&self) -> ServiceState {
        self.control.state()
    }

    /// Mark the run finished and wake `wait_stopped` callers.
    pub(crate) fn finish(&self, failure: Option<FailureKind>) {
        if let Some(kind) = failure {
            *self.last_failure.lock() = Some(kind);
            metrics::record_run_failure(kind.as_str());
        }
        self.controller.store(None);
        let _guard = self.stopped_lock.lock();
        self.control.finish();
        self.stopped.notify_all();
    }
}

/// Start/stop controls for the embedded daemon.
#[derive(Clone)]
pub struct ServiceFacade {
    inner: Arc<Inner>,
}

impl ServiceFacade {
    /// A facade driving `runtime` with the built-in configuration.
    pub fn new(runtime: Arc<GlobalRuntime>) -> Self {
        Self::with_config(runtime, ConfigSource::Builtin)
    }

    pub fn with_config(runtime: Arc<GlobalRuntime>, config: ConfigSource) -> Self {
        Self {
            inner: Arc::new(Inner {
                runtime,
                config,
                control: Control::new(),
                controller: ArcSwapOption::empty(),
                last_failure: Mutex::new(None),
                stopped_lock: Mutex::new(()),
                stopped: Condvar::new(),
            }),
        }
    }

    /// The process-wide facade over the global runtime.
    pub fn global() -> &'static ServiceFacade {
        static GLOBAL: OnceLock<ServiceFacade> = OnceLock::new();
        GLOBAL.get_or_init(|| ServiceFacade::new(GlobalRuntime::global()))
    }

    /// Start the daemon on a worker thread. No-op while running.
    pub fn start_service(&self, params: &StartupParameters) {
        let Some(run) = self.inner.control.admit() else {
            tracing::debug!(target: targets::SERVICE, "already running, start ignored");
            return;
        };

        params.apply_environment();
        *self.inner.last_failure.lock() = None;
        metrics::record_run_started();

        let inner = Arc::clone(&self.inner);
        let spawned = std::thread::Builder::new()
            .name(format!("nfd-service-{run}"))
            .spawn(move || worker::run(inner));

        match spawned {
            Ok(_) => tracing::info!(target: targets::SERVICE, run, "service starting"),
            Err(err) => {
                tracing::error!(target: targets::SERVICE, error = %err, "fatal: cannot spawn worker");
                self.inner.finish(Some(FailureKind::Unknown));
            }
        }
    }

    /// Ask the running daemon to stop. Never blocks; no-op when stopped.
    pub fn stop_service(&self) {
        match self.inner.control.request_stop() {
            None => {
                tracing::debug!(target: targets::SERVICE, "not running, stop ignored");
            }
            Some(ServiceState::Running) => {
                // Published before the worker switched to Running.
                if let Some(controller) = self.inner.controller.load_full() {
                    tracing::info!(target: targets::SERVICE, "service stopping");
                    controller.stop();
                }
            }
            Some(_) => {
                tracing::debug!(target: targets::SERVICE, "stop recorded for the starting worker");
            }
        }
    }

    /// True from a successful start until the worker has unwound.
    pub fn is_running(&self) -> bool {
        self.inner.state() != ServiceState::Stopped
    }

    pub fn state(&self) -> ServiceState {
        self.inner.state()
    }

    /// Names of every log module, sorted.
    pub fn list_log_modules(&self) -> Vec<String> {
        modules::names()
    }

    /// Failure of the most recent run, if it failed.
    pub fn last_failure(&self) -> Option<FailureKind> {
        *self.inner.last_failure.lock()
    }

    /// Number of worker threads started.
    pub fn runs_started(&self) -> u64 {
        self.inner.control.runs()
    }

    /// Block until the service is stopped or `timeout` elapses.
    pub fn wait_stopped(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut guard = self.inner.stopped_lock.lock();
        while self.inner.state() != ServiceState::Stopped {
            if self.inner.stopped.wait_until(&mut guard, deadline).timed_out() {
                return self.inner.state() == ServiceState::Stopped;
            }
        }
        true
    }

    pub fn runtime(&self) -> &Arc<GlobalRuntime> {
        &self.inner.runtime
    }
}

impl std::fmt::Debug for ServiceFacade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceFacade")
            .field("state", &self.state())
            .field("runs_started", &self.runs_started())
            .field("last_failure", &self.last_failure())
            .finish()
    }
}
