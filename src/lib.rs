//! Embeddable forwarding daemon with restartable lifecycle.
//!
//! The crate runs a forwarder and its RIB service on one shared reactor inside
//! a host process, and lets the host stop and start the whole daemon again
//! without restarting the process.

// Runtime and configuration
pub mod config;
pub mod runtime;

// Daemon components
pub mod forwarder;
pub mod routing;
pub mod security;
pub mod subsystem;

// Control
pub mod lifecycle;
pub mod service;

// Cross-cutting concerns
pub mod observability;

pub use config::{ConfigBootstrap, ConfigSource, ConfigTree};
pub use lifecycle::{FailureKind, RunError, RunState, Runner, RunnerHandle};
pub use runtime::GlobalRuntime;
pub use service::{ServiceFacade, StartupParameters};
