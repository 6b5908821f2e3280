//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Construction (runner.rs):
//!     Config → key chain → privilege helper → SubsystemPair::construct → initialize
//!
//! Run (runner.rs):
//!     start() → Reactor::run() on the calling thread
//!
//! Stop (runner.rs):
//!     stop() → job posted to the reactor
//!         → reactor stopped → RIB service dropped → forwarder dropped
//!     → run() returns → reactor reset → Idle
//! ```
//!
//! # Design Decisions
//! - Ordered construction: identity and privileges before any subsystem
//! - Ordered teardown: RIB service before forwarder, on the reactor thread
//! - No shutdown timeout: teardown is bounded by the subsystems' drop code

pub mod runner;
pub mod state;

pub use runner::{RunError, Runner, RunnerHandle};
pub use state::{AtomicRunState, FailureKind, RunState};
