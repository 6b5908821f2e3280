//! Service boundary between the host application and the daemon.
//!
//! # Data Flow
//! ```text
//! host: start_service(params)
//!     → facade.rs (admit one start, copy params into the environment)
//!     → worker.rs (dedicated thread)
//!         → GlobalRuntime::reset → Runner → start() ... → drop → GlobalRuntime::reset
//! host: stop_service()
//!     → facade.rs → RunnerHandle::stop (or pending stop while constructing)
//! ```
//!
//! # Design Decisions
//! - Host calls never block and never fail; failures are logged and recorded
//! - One worker thread per run, owned by nobody once spawned

pub mod facade;
pub mod params;
mod worker;

pub use facade::{ServiceFacade, ServiceState};
pub use params::{StartupParameters, HOME_PATH_KEY};
