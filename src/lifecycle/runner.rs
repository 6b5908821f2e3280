//! The lifecycle controller for one run of the daemon.
//!
//! # Responsibilities
//! - Construct identity, privileges and both subsystems from a configuration
//! - Run the shared reactor on the calling thread until stopped
//! - Tear subsystems down on the reactor thread, RIB service first
//!
//! # Design Decisions
//! - `stop()` never tears down inline; it posts a job so teardown happens on
//!   the thread that drives the subsystems
//! - One mutex guards the subsystem slot and nothing else
//! - A runner runs at most once; afterwards it is inert

use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;

use crate::config::{ConfigError, ConfigSource, ConfigTree};
use crate::forwarder::ForwarderClient;
use crate::lifecycle::state::{AtomicRunState, FailureKind, RunState};
use crate::observability::{logging, targets};
use crate::routing::RibHandle;
use crate::runtime::{GlobalRuntime, ReactorError, ReactorHandle};
use crate::security::{KeyChain, KeyChainError, PrivilegeError, PrivilegeHelper};
use crate::subsystem::{SubsystemContext, SubsystemError, SubsystemPair};

/// Error type for runner construction and start.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("key chain: {0}")]
    KeyChain(#[from] KeyChainError),
    #[error("privilege helper: {0}")]
    Privilege(#[from] PrivilegeError),
    #[error("subsystem: {0}")]
    Subsystem(#[from] SubsystemError),
    #[error("reactor: {0}")]
    Reactor(#[from] ReactorError),
    #[error("runner already finished")]
    Finished,
    #[error("runner is already running")]
    AlreadyRunning,
}

impl RunError {
    /// Classification reported to the host.
    pub fn kind(&self) -> FailureKind {
        match self {
            RunError::Privilege(_) => FailureKind::PrivilegeHelper,
            _ => FailureKind::Construction,
        }
    }
}

struct Shared {
    state: AtomicRunState,
    subsystems: Mutex<Option<SubsystemPair>>,
    reactor: ReactorHandle,
}

impl Shared {
    fn stop(self: &Arc<Self>) {
        loop {
            let current = self.state.load();
            match current {
                RunState::Idle | RunState::Stopping => return,
                RunState::Starting | RunState::Running => {
                    if self.state.transition(current, RunState::Stopping).is_ok() {
                        break;
                    }
                }
            }
        }

        let target = Arc::clone(self);
        let posted = self.reactor.post(move || {
            target.reactor.stop();
            target.destroy_subsystems();
        });

        if posted {
            tracing::info!(target: targets::RUNNER, "stop requested");
        } else {
            tracing::warn!(
                target: targets::RUNNER,
                generation = self.reactor.generation(),
                "reactor gone, tearing down inline"
            );
            self.destroy_subsystems();
            self.state.store(RunState::Idle);
        }
    }

    fn destroy_subsystems(&self) {
        let pair = self.subsystems.lock().take();
        if let Some(pair) = pair {
            drop(pair);
            tracing::info!(target: targets::RUNNER, "subsystems destroyed");
        }
    }
}

/// Cloneable stop/state access for other threads.
#[derive(Clone)]
pub struct RunnerHandle {
    shared: Arc<Shared>,
}

impl RunnerHandle {
    /// Request a stop. Returns before shutdown completes.
    pub fn stop(&self) {
        self.shared.stop();
    }

    pub fn state(&self) -> RunState {
        self.shared.state.load()
    }

    /// Reactor generation the runner is bound to.
    pub fn generation(&self) -> u64 {
        self.shared.reactor.generation()
    }
}

impl std::fmt::Debug for RunnerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunnerHandle")
            .field("state", &self.state())
            .field("generation", &self.generation())
            .finish()
    }
}

/// Owns one run of the forwarder and the RIB service.
pub struct Runner {
    shared: Arc<Shared>,
    runtime: Arc<GlobalRuntime>,
}

impl Runner {
    /// Construct against `config`, with the key chain under the current `$HOME`.
    pub fn new(runtime: Arc<GlobalRuntime>, config: ConfigTree) -> Result<Self, RunError> {
        let keychain = KeyChain::from_env()?;
        Self::construct(runtime, config, keychain)
    }

    /// Load configuration from `source`, then construct.
    pub fn from_source(runtime: Arc<GlobalRuntime>, source: &ConfigSource) -> Result<Self, RunError> {
        let config = source.load()?;
        Self::new(runtime, config)
    }

    /// Construct with an already opened key chain.
    pub fn construct(
        runtime: Arc<GlobalRuntime>,
        config: ConfigTree,
        keychain: KeyChain,
    ) -> Result<Self, RunError> {
        match logging::apply(&config.log) {
            Ok(applied) => {
                tracing::debug!(target: targets::RUNNER, applied, "log levels configured");
            }
            Err(err) => {
                tracing::warn!(target: targets::RUNNER, error = %err, "keeping previous log levels");
            }
        }

        let privileges = PrivilegeHelper::initialize(&config.general)?;
        let identity = Arc::new(keychain.into_identity());
        tracing::info!(
            target: targets::RUNNER,
            identity = identity.name(),
            user = privileges.user().unwrap_or("<unknown>"),
            "constructing subsystems"
        );

        let ctx = SubsystemContext::new(Arc::new(config), identity, Arc::clone(&runtime));
        let mut pair = SubsystemPair::construct(&ctx)?;
        pair.initialize()?;

        Ok(Self {
            shared: Arc::new(Shared {
                state: AtomicRunState::new(RunState::Starting),
                subsystems: Mutex::new(Some(pair)),
                reactor: ctx.reactor,
            }),
            runtime,
        })
    }

    /// Run the reactor on this thread until stopped, then reset it.
    pub fn start(&self) -> Result<(), RunError> {
        loop {
            match self.shared.state.load() {
                RunState::Idle => return Err(RunError::Finished),
                RunState::Running => return Err(RunError::AlreadyRunning),
                // Stopped before starting: run just long enough to tear down.
                RunState::Stopping => break,
                RunState::Starting => {
                    if self
                        .shared
                        .state
                        .transition(RunState::Starting, RunState::Running)
                        .is_ok()
                    {
                        break;
                    }
                }
            }
        }

        let result = if self.shared.reactor.is_live() {
            tracing::info!(
                target: targets::RUNNER,
                generation = self.shared.reactor.generation(),
                "running"
            );
            self.runtime.reactor().run().map_err(RunError::from)
        } else {
            Err(RunError::Reactor(ReactorError::NeedsReset(
                self.shared.reactor.generation(),
            )))
        };

        self.shared.destroy_subsystems();
        self.shared.state.store(RunState::Idle);
        self.runtime.reactor().reset();
        tracing::info!(target: targets::RUNNER, "stopped");
        result
    }

    /// Request a stop from any thread. No-op once idle.
    pub fn stop(&self) {
        self.shared.stop();
    }

    pub fn state(&self) -> RunState {
        self.shared.state.load()
    }

    pub fn handle(&self) -> RunnerHandle {
        RunnerHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Management client of the forwarder, while subsystems exist.
    pub fn forwarder_client(&self) -> Option<ForwarderClient> {
        self.shared
            .subsystems
            .lock()
            .as_ref()
            .map(SubsystemPair::forwarder_client)
    }

    /// Handle to the RIB service, while subsystems exist.
    pub fn rib_handle(&self) -> Option<RibHandle> {
        self.shared.subsystems.lock().as_ref().map(SubsystemPair::rib_handle)
    }
}

impl Drop for Runner {
    fn drop(&mut self) {
        self.shared.stop();
        self.shared.destroy_subsystems();
        self.shared.state.store(RunState::Idle);
        self.runtime.reactor().reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigBootstrap, GeneralConfig};

    fn runner(runtime: &Arc<GlobalRuntime>) -> (tempfile::TempDir, Runner) {
        let home = tempfile::tempdir().unwrap();
        let keychain = KeyChain::open(home.path()).unwrap();
        let runner = Runner::construct(
            Arc::clone(runtime),
            ConfigBootstrap::default_config(),
            keychain,
        )
        .unwrap();
        (home, runner)
    }

    #[test]
    fn constructed_runner_is_starting() {
        let runtime = Arc::new(GlobalRuntime::new());
        let (_home, runner) = runner(&runtime);
        assert_eq!(runner.state(), RunState::Starting);
        assert!(runner.forwarder_client().is_some());
        assert!(runner.rib_handle().is_some());
    }

    #[test]
    fn stop_before_start_runs_teardown() {
        let runtime = Arc::new(GlobalRuntime::new());
        let (_home, runner) = runner(&runtime);

        runner.stop();
        runner.stop();
        assert_eq!(runner.state(), RunState::Stopping);

        runner.start().unwrap();
        assert_eq!(runner.state(), RunState::Idle);
        assert!(runner.forwarder_client().is_none());
        assert!(matches!(runner.start(), Err(RunError::Finished)));
    }

    #[test]
    fn drop_without_start_resets_reactor() {
        let runtime = Arc::new(GlobalRuntime::new());
        let (_home, runner) = runner(&runtime);
        let handle = runner.handle();
        assert!(runtime.scheduler().pending() > 0);

        drop(runner);
        assert_eq!(handle.state(), RunState::Idle);
        assert_eq!(runtime.reactor().reset_count(), 1);
        assert_eq!(runtime.reactor().queued_jobs(), 0);
        handle.stop();
    }

    #[test]
    fn privilege_failure_is_classified() {
        let runtime = Arc::new(GlobalRuntime::new());
        let home = tempfile::tempdir().unwrap();
        let mut config = ConfigBootstrap::default_config();
        config.general = GeneralConfig {
            user: None,
            group: Some("nfd".into()),
        };

        let err = Runner::construct(runtime, config, KeyChain::open(home.path()).unwrap())
            .err()
            .unwrap();
        assert_eq!(err.kind(), FailureKind::PrivilegeHelper);
    }

    #[test]
    fn subsystem_failure_is_construction() {
        let runtime = Arc::new(GlobalRuntime::new());
        let home = tempfile::tempdir().unwrap();
        let mut config = ConfigBootstrap::default_config();
        config.rib.localhost_security = None;

        let err = Runner::construct(runtime, config, KeyChain::open(home.path()).unwrap())
            .err()
            .unwrap();
        assert!(matches!(err, RunError::Subsystem(SubsystemError::Rib(_))));
        assert_eq!(err.kind(), FailureKind::Construction);
    }
}
