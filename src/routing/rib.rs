//! Routing information base and its service.
//!
//! # Responsibilities
//! - Keep routes registered by applications and by the daemon itself
//! - Install the resulting next hops in the forwarder's FIB
//! - Serve route commands from other threads through `RibHandle`
//! - Drive automatic prefix propagation when configured
//!
//! # Design Decisions
//! - RIB state is shared with the propagator, which reads prefixes only
//! - FIB updates go through forwarder management like any other client
//! - Route registration is rejected once the forwarder is gone

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::config::validation::is_valid_name;
use crate::config::TrustAnchor;
use crate::forwarder::{FaceId, ForwarderClient, ManagementError};
use crate::observability::targets;
use crate::routing::propagation::{AutoPrefixPropagator, PrefixSource, PropagationStatus};
use crate::runtime::ReactorHandle;
use crate::subsystem::{Subsystem, SubsystemContext, SubsystemError};

/// Prefix of the RIB's own management service.
pub const RIB_MANAGEMENT_PREFIX: &str = "/localhost/nfd/rib";

/// Who registered a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RouteOrigin {
    App,
    Static,
    Client,
    Prefixann,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Route {
    pub prefix: String,
    pub face: FaceId,
    pub origin: RouteOrigin,
    pub cost: u64,
}

impl Route {
    pub fn new(prefix: impl Into<String>, face: FaceId, origin: RouteOrigin, cost: u64) -> Self {
        Self {
            prefix: prefix.into(),
            face,
            origin,
            cost,
        }
    }
}

/// Routes grouped by prefix.
#[derive(Debug, Default)]
pub struct Rib {
    entries: BTreeMap<String, Vec<Route>>,
}

impl Rib {
    /// Insert or replace the route with the same prefix, face and origin.
    /// Returns the replaced route.
    pub fn insert(&mut self, route: Route) -> Option<Route> {
        let routes = self.entries.entry(route.prefix.clone()).or_default();
        let replaced = routes
            .iter()
            .position(|r| r.face == route.face && r.origin == route.origin)
            .map(|index| routes.remove(index));
        routes.push(route);
        replaced
    }

    /// Remove every route for `prefix` through `face`.
    pub fn remove(&mut self, prefix: &str, face: FaceId) -> usize {
        let Some(routes) = self.entries.get_mut(prefix) else {
            return 0;
        };
        let before = routes.len();
        routes.retain(|r| r.face != face);
        let removed = before - routes.len();
        if routes.is_empty() {
            self.entries.remove(prefix);
        }
        removed
    }

    /// Remove the route with the same prefix, face and origin as `route`.
    pub fn remove_route(&mut self, route: &Route) -> bool {
        let Some(routes) = self.entries.get_mut(&route.prefix) else {
            return false;
        };
        let before = routes.len();
        routes.retain(|r| !(r.face == route.face && r.origin == route.origin));
        let removed = routes.len() != before;
        if routes.is_empty() {
            self.entries.remove(&route.prefix);
        }
        removed
    }

    /// Lowest cost among routes for `prefix` through `face`.
    pub fn best_cost(&self, prefix: &str, face: FaceId) -> Option<u64> {
        self.entries
            .get(prefix)?
            .iter()
            .filter(|r| r.face == face)
            .map(|r| r.cost)
            .min()
    }

    pub fn prefixes(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    pub fn routes(&self) -> Vec<Route> {
        self.entries.values().flatten().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Clone)]
struct SharedRib(Arc<Mutex<Rib>>);

impl PrefixSource for SharedRib {
    fn prefixes(&self) -> Vec<String> {
        self.0.lock().prefixes()
    }
}

enum RibCommand {
    Register {
        route: Route,
        reply: oneshot::Sender<Result<(), ManagementError>>,
    },
    Unregister {
        prefix: String,
        face: FaceId,
        reply: oneshot::Sender<Result<usize, ManagementError>>,
    },
}

/// RIB contents and propagation counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RibStatus {
    pub routes: Vec<Route>,
    pub trust_anchor: String,
    pub propagation: Option<PropagationStatus>,
}

/// Cloneable access to a running RIB service.
#[derive(Clone)]
pub struct RibHandle {
    rib: SharedRib,
    commands: mpsc::UnboundedSender<RibCommand>,
}

impl RibHandle {
    /// Register a route from a thread outside the reactor.
    pub fn register_route_blocking(&self, route: Route) -> Result<(), ManagementError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(RibCommand::Register { route, reply })
            .map_err(|_| ManagementError::Unavailable)?;
        rx.blocking_recv().map_err(|_| ManagementError::Unavailable)?
    }

    /// Unregister routes from a thread outside the reactor.
    pub fn unregister_route_blocking(&self, prefix: &str, face: FaceId) -> Result<usize, ManagementError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(RibCommand::Unregister {
                prefix: prefix.to_string(),
                face,
                reply,
            })
            .map_err(|_| ManagementError::Unavailable)?;
        rx.blocking_recv().map_err(|_| ManagementError::Unavailable)?
    }

    /// Current routes.
    pub fn routes(&self) -> Vec<Route> {
        self.rib.0.lock().routes()
    }
}

/// Handler state living on the reactor.
struct Worker {
    rib: SharedRib,
    forwarder: ForwarderClient,
    signer: String,
}

impl Worker {
    async fn register(&self, route: Route) -> Result<(), ManagementError> {
        if !is_valid_name(&route.prefix) {
            return Err(ManagementError::InvalidCommand(format!(
                "'{}' is not a name",
                route.prefix
            )));
        }
        let (replaced, cost) = {
            let mut rib = self.rib.0.lock();
            let replaced = rib.insert(route.clone());
            let cost = rib.best_cost(&route.prefix, route.face).unwrap_or(route.cost);
            (replaced, cost)
        };
        if let Err(err) = self
            .forwarder
            .add_next_hop(&self.signer, &route.prefix, route.face, cost)
            .await
        {
            let mut rib = self.rib.0.lock();
            match replaced {
                Some(previous) => {
                    rib.insert(previous);
                }
                None => {
                    rib.remove_route(&route);
                }
            }
            return Err(err);
        }
        tracing::info!(
            target: targets::RIB,
            prefix = %route.prefix,
            face = %route.face,
            origin = ?route.origin,
            "route registered"
        );
        Ok(())
    }

    async fn unregister(&self, prefix: &str, face: FaceId) -> Result<usize, ManagementError> {
        let removed = self.rib.0.lock().remove(prefix, face);
        if removed > 0 {
            self.forwarder
                .remove_next_hop(&self.signer, prefix, face)
                .await?;
            tracing::info!(target: targets::RIB, %prefix, %face, "route unregistered");
        }
        Ok(removed)
    }

    async fn serve(self, mut commands: mpsc::UnboundedReceiver<RibCommand>, shutdown: CancellationToken) {
        let management = Route::new(RIB_MANAGEMENT_PREFIX, FaceId::INTERNAL, RouteOrigin::App, 0);
        if let Err(err) = self.register(management).await {
            tracing::error!(target: targets::RIB_SERVICE, error = %err, "cannot register management prefix");
        }

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                command = commands.recv() => match command {
                    Some(RibCommand::Register { route, reply }) => {
                        let _ = reply.send(self.register(route).await);
                    }
                    Some(RibCommand::Unregister { prefix, face, reply }) => {
                        let _ = reply.send(self.unregister(&prefix, face).await);
                    }
                    None => break,
                },
            }
        }
        tracing::debug!(target: targets::RIB_SERVICE, "command handler finished");
    }
}

/// The routing-management service.
pub struct RibService {
    rib: SharedRib,
    forwarder: ForwarderClient,
    signer: String,
    trust_anchor: TrustAnchor,
    reactor: ReactorHandle,
    commands_tx: mpsc::UnboundedSender<RibCommand>,
    commands_rx: Option<mpsc::UnboundedReceiver<RibCommand>>,
    shutdown: CancellationToken,
    // Declared last so pending refreshes are cancelled after the handler stops.
    propagator: Option<AutoPrefixPropagator<SharedRib>>,
}

impl RibService {
    pub fn new(ctx: &SubsystemContext, forwarder: ForwarderClient) -> Result<Self, SubsystemError> {
        let rib_config = &ctx.config.rib;
        let trust_anchor = rib_config
            .localhost_security
            .as_ref()
            .map(|security| security.trust_anchor.clone())
            .ok_or_else(|| SubsystemError::Rib("localhost_security is required".into()))?;

        let rib = SharedRib(Arc::new(Mutex::new(Rib::default())));
        let propagator = rib_config.auto_prefix_propagate.clone().map(|config| {
            AutoPrefixPropagator::new(config, Arc::clone(ctx.runtime.scheduler()), rib.clone())
        });

        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        tracing::info!(
            target: targets::RIB_SERVICE,
            trust_anchor = ?trust_anchor,
            propagation = propagator.is_some(),
            "rib service constructed"
        );

        Ok(Self {
            rib,
            forwarder,
            signer: ctx.identity.certificate_name(),
            trust_anchor,
            reactor: ctx.reactor.clone(),
            commands_tx,
            commands_rx: Some(commands_rx),
            shutdown: ctx.reactor.shutdown_token(),
            propagator,
        })
    }

    pub fn handle(&self) -> RibHandle {
        RibHandle {
            rib: self.rib.clone(),
            commands: self.commands_tx.clone(),
        }
    }

    pub fn status(&self) -> RibStatus {
        RibStatus {
            routes: self.rib.0.lock().routes(),
            trust_anchor: match &self.trust_anchor {
                TrustAnchor::Any => "any".to_string(),
                TrustAnchor::File { file_name } => file_name.clone(),
            },
            propagation: self.propagator.as_ref().map(AutoPrefixPropagator::status),
        }
    }
}

impl Subsystem for RibService {
    fn name(&self) -> &'static str {
        targets::RIB_SERVICE
    }

    fn initialize(&mut self) -> Result<(), SubsystemError> {
        let commands = self
            .commands_rx
            .take()
            .ok_or(SubsystemError::AlreadyInitialized(targets::RIB_SERVICE))?;
        let worker = Worker {
            rib: self.rib.clone(),
            forwarder: self.forwarder.clone(),
            signer: self.signer.clone(),
        };
        if !self.reactor.spawn(worker.serve(commands, self.shutdown.clone())) {
            return Err(SubsystemError::ReactorUnavailable(targets::RIB_SERVICE));
        }
        if let Some(propagator) = &self.propagator {
            propagator.start();
        }
        Ok(())
    }
}

impl Drop for RibService {
    fn drop(&mut self) {
        self.shutdown.cancel();
        tracing::info!(target: targets::RIB_SERVICE, "rib service destroyed");
    }
}
