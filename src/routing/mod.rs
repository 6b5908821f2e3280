//! Routing-management subsystem (RIB service).
//!
//! # Data Flow
//! ```text
//! RibHandle (any thread)
//!     → command channel → rib.rs handler (reactor thread)
//!     → Rib table updated
//!     → ForwarderClient::add_next_hop → forwarder FIB
//!
//! Scheduler (every refresh_interval)
//!     → propagation.rs (read prefixes, compute announcement set)
//!     → reschedule
//! ```
//!
//! # Design Decisions
//! - The RIB never touches forwarder tables directly
//! - Propagation is optional and driven entirely by the shared scheduler
//! - Deterministic: the same prefixes always yield the same announcement set

pub mod propagation;
pub mod rib;

pub use propagation::{
    covering_prefixes, retry_backoff, AutoPrefixPropagator, PrefixSource, PropagationStatus,
    HUB_PREFIX,
};
pub use rib::{Rib, RibHandle, RibService, RibStatus, Route, RouteOrigin, RIB_MANAGEMENT_PREFIX};
