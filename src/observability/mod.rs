//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All components produce:
//!     → tracing events, one target per log module (logging.rs)
//!     → counters for runs, failures and resets (metrics.rs)
//!
//! Each run:
//!     config `log` section → logging.rs → reload of the active EnvFilter
//!
//! Host introspection:
//!     listLogModules → modules.rs registry
//! ```
//!
//! # Design Decisions
//! - Log targets are daemon module names (`Forwarder`, `RibService`, ...) rather than
//!   Rust module paths, so per-module levels in the config match what the host lists
//! - The subscriber is installed once per process; runs only swap the filter
//! - Metrics are recorded through the `metrics` facade; exporting is the host's choice

pub mod logging;
pub mod metrics;
pub mod modules;

pub use modules::targets;
