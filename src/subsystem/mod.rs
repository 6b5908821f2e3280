//! The forwarder and RIB service as one unit.
//!
//! # Data Flow
//! ```text
//! Runner construction:
//!     SubsystemContext (config, identity, runtime)
//!     → Forwarder::new → RibService::new(forwarder client)
//!     → initialize() forwarder, then RIB service
//!     → handlers registered on the shared reactor
//! Teardown (reactor thread):
//!     drop SubsystemPair → RIB service dropped → forwarder dropped
//! ```
//!
//! # Design Decisions
//! - Both subsystems are bound to the reactor generation current at construction
//! - Field order of `SubsystemPair` encodes teardown order

use std::sync::Arc;

use thiserror::Error;

use crate::config::ConfigTree;
use crate::forwarder::{Forwarder, ForwarderClient};
use crate::routing::{RibHandle, RibService};
use crate::runtime::{GlobalRuntime, ReactorHandle};
use crate::security::Identity;

/// Error type for subsystem construction and initialization.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubsystemError {
    #[error("{0} is already initialized")]
    AlreadyInitialized(&'static str),
    #[error("{0} could not register with the reactor")]
    ReactorUnavailable(&'static str),
    #[error("face system: {0}")]
    FaceSystem(String),
    #[error("rib: {0}")]
    Rib(String),
}

/// A daemon component driven by the shared reactor.
pub trait Subsystem: Send {
    /// Log module name of the component.
    fn name(&self) -> &'static str;

    /// Register handlers and timers. Called once, before the reactor runs.
    fn initialize(&mut self) -> Result<(), SubsystemError>;
}

/// What both subsystems are constructed against.
#[derive(Clone)]
pub struct SubsystemContext {
    pub config: Arc<ConfigTree>,
    pub identity: Arc<Identity>,
    pub runtime: Arc<GlobalRuntime>,
    pub reactor: ReactorHandle,
}

impl SubsystemContext {
    pub fn new(config: Arc<ConfigTree>, identity: Arc<Identity>, runtime: Arc<GlobalRuntime>) -> Self {
        let reactor = runtime.reactor().handle();
        Self {
            config,
            identity,
            runtime,
            reactor,
        }
    }
}

/// Forwarder and RIB service of one run.
pub struct SubsystemPair {
    // Dropped first: the RIB service talks to the forwarder until it goes.
    rib: RibService,
    forwarder: Forwarder,
}

impl SubsystemPair {
    /// Construct both subsystems without initializing them.
    pub fn construct(ctx: &SubsystemContext) -> Result<Self, SubsystemError> {
        let forwarder = Forwarder::new(ctx)?;
        let rib = RibService::new(ctx, forwarder.client())?;
        Ok(Self { rib, forwarder })
    }

    /// Initialize the forwarder, then the RIB service.
    pub fn initialize(&mut self) -> Result<(), SubsystemError> {
        for subsystem in [
            &mut self.forwarder as &mut dyn Subsystem,
            &mut self.rib as &mut dyn Subsystem,
        ] {
            subsystem.initialize()?;
            tracing::debug!(
                target: crate::observability::targets::RUNNER,
                subsystem = subsystem.name(),
                "initialized"
            );
        }
        Ok(())
    }

    pub fn forwarder_client(&self) -> ForwarderClient {
        self.forwarder.client()
    }

    pub fn rib_handle(&self) -> RibHandle {
        self.rib.handle()
    }
}
