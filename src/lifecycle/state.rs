//! Run state machine and failure classification.

use std::sync::atomic::{AtomicU8, Ordering};

use serde::Serialize;

/// Lifecycle state of one runner.
///
/// `Idle → Starting → Running → Stopping → Idle`; once back in `Idle` the
/// runner is finished and cannot run again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunState {
    Idle,
    Starting,
    Running,
    Stopping,
}

impl RunState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => RunState::Starting,
            2 => RunState::Running,
            3 => RunState::Stopping,
            _ => RunState::Idle,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            RunState::Idle => 0,
            RunState::Starting => 1,
            RunState::Running => 2,
            RunState::Stopping => 3,
        }
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RunState::Idle => "idle",
            RunState::Starting => "starting",
            RunState::Running => "running",
            RunState::Stopping => "stopping",
        };
        f.write_str(name)
    }
}

/// `RunState` readable and swappable from any thread.
#[derive(Debug)]
pub struct AtomicRunState(AtomicU8);

impl AtomicRunState {
    pub fn new(state: RunState) -> Self {
        Self(AtomicU8::new(state.as_u8()))
    }

    pub fn load(&self) -> RunState {
        RunState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub fn store(&self, state: RunState) {
        self.0.store(state.as_u8(), Ordering::Release);
    }

    /// Move from `current` to `new`. On failure returns the observed state.
    pub fn transition(&self, current: RunState, new: RunState) -> Result<(), RunState> {
        self.0
            .compare_exchange(
                current.as_u8(),
                new.as_u8(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .map(|_| ())
            .map_err(RunState::from_u8)
    }
}

/// Why a run ended without being stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FailureKind {
    /// Configuration, identity or subsystem construction failed.
    Construction,
    /// The privilege helper rejected the configured credentials.
    PrivilegeHelper,
    /// The run panicked.
    Unknown,
}

impl FailureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FailureKind::Construction => "construction",
            FailureKind::PrivilegeHelper => "privilege_helper",
            FailureKind::Unknown => "unknown",
        }
    }
}
