//! Forwarder subsystem.
//!
//! # Data Flow
//! ```text
//! construct: config.tables → tables.rs
//!            config.face_system → faces.rs (channels)
//!            config.authorizations → management.rs (authenticator)
//! initialize: management handler registered on the shared reactor
//! run:        ForwarderClient → command channel → handler → tables
//! drop:       handler shutdown token cancelled
//! ```
//!
//! # Design Decisions
//! - Tables sit behind one lock shared with the handler; commands are applied
//!   on the reactor thread only
//! - No packet processing: the forwarder exposes its tables through management

pub mod faces;
pub mod management;
pub mod tables;

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::Privilege;
use crate::observability::targets;
use crate::runtime::ReactorHandle;
use crate::security::Identity;
use crate::subsystem::{Subsystem, SubsystemContext, SubsystemError};

pub use faces::{Channel, FaceEntry, FaceId, FaceScope, FaceSystem, FaceTable};
pub use management::{
    CommandAuthenticator, ForwarderClient, ForwarderStatus, ManagementError, ANY_SIGNER,
};
pub use tables::{name_has_prefix, ContentStore, Fib, NextHop, StrategyChoice};

use management::ManagementCommand;

/// Tables mutated by management commands.
struct ForwarderTables {
    faces: FaceTable,
    fib: Fib,
    strategy_choice: StrategyChoice,
    cs: ContentStore,
}

/// State shared between the forwarder and its reactor handler.
struct Shared {
    identity: Arc<Identity>,
    channels: Vec<Channel>,
    generation: u64,
    authenticator: CommandAuthenticator,
    tables: Mutex<ForwarderTables>,
}

impl Shared {
    fn status(&self) -> ForwarderStatus {
        let tables = self.tables.lock();
        ForwarderStatus {
            identity: self.identity.name().to_string(),
            generation: self.generation,
            faces: tables.faces.len(),
            channels: self.channels.len(),
            fib_entries: tables.fib.len(),
            strategy_choice_entries: tables.strategy_choice.len(),
            cs_capacity: tables.cs.capacity(),
        }
    }

    fn handle(&self, command: ManagementCommand) {
        match command {
            ManagementCommand::Status { reply } => {
                let _ = reply.send(Ok(self.status()));
            }
            ManagementCommand::SetStrategy {
                signer,
                prefix,
                strategy,
                reply,
            } => {
                let result = self
                    .authenticator
                    .authorize(&signer, Privilege::StrategyChoice)
                    .and_then(|()| self.set_strategy(prefix, strategy));
                let _ = reply.send(result);
            }
            ManagementCommand::AddNextHop {
                signer,
                prefix,
                face,
                cost,
                reply,
            } => {
                let result = self
                    .authenticator
                    .authorize(&signer, Privilege::Fib)
                    .and_then(|()| self.add_next_hop(&prefix, face, cost));
                let _ = reply.send(result);
            }
            ManagementCommand::RemoveNextHop {
                signer,
                prefix,
                face,
                reply,
            } => {
                let result = self
                    .authenticator
                    .authorize(&signer, Privilege::Fib)
                    .map(|()| self.tables.lock().fib.remove_next_hop(&prefix, face));
                let _ = reply.send(result);
            }
            ManagementCommand::FaceList { reply } => {
                let _ = reply.send(Ok(self.tables.lock().faces.entries()));
            }
            ManagementCommand::FaceCreate { signer, uri, reply } => {
                let result = self
                    .authenticator
                    .authorize(&signer, Privilege::Faces)
                    .and_then(|()| self.create_face(uri));
                let _ = reply.send(result);
            }
            ManagementCommand::FaceDestroy {
                signer,
                face,
                reply,
            } => {
                let result = self
                    .authenticator
                    .authorize(&signer, Privilege::Faces)
                    .and_then(|()| self.destroy_face(face));
                let _ = reply.send(result);
            }
            ManagementCommand::EffectiveStrategy { name, reply } => {
                let tables = self.tables.lock();
                let strategy = tables.strategy_choice.find_effective(&name).map(str::to_string);
                let _ = reply.send(Ok(strategy));
            }
            ManagementCommand::NextHops { name, reply } => {
                let tables = self.tables.lock();
                let hops = tables
                    .fib
                    .longest_prefix_match(&name)
                    .map(<[NextHop]>::to_vec)
                    .unwrap_or_default();
                let _ = reply.send(Ok(hops));
            }
            ManagementCommand::SetCsCapacity {
                signer,
                capacity,
                reply,
            } => {
                let result = self.authenticator.authorize(&signer, Privilege::Cs).map(|()| {
                    tracing::info!(target: targets::CONTENT_STORE, capacity, "capacity changed");
                    self.tables.lock().cs.set_capacity(capacity)
                });
                let _ = reply.send(result);
            }
        }
    }

    fn create_face(&self, uri: String) -> Result<FaceId, ManagementError> {
        let Some((scheme, host)) = uri.split_once("://").filter(|(_, host)| !host.is_empty()) else {
            return Err(ManagementError::InvalidCommand(format!("'{uri}' is not a face uri")));
        };
        if !self.channels.iter().any(|channel| channel.accepts(scheme)) {
            return Err(ManagementError::InvalidCommand(format!(
                "no channel for '{scheme}'"
            )));
        }
        let scope = FaceScope::of_host(host);

        let mut tables = self.tables.lock();
        if let Some(existing) = tables.faces.find_by_uri(&uri) {
            return Ok(existing);
        }
        let id = tables.faces.add(uri, scope);
        tracing::info!(target: targets::FACE_TABLE, %id, ?scope, "face created");
        Ok(id)
    }

    fn destroy_face(&self, face: FaceId) -> Result<bool, ManagementError> {
        if face.is_reserved() {
            return Err(ManagementError::InvalidCommand(format!("{face} is reserved")));
        }
        let mut tables = self.tables.lock();
        if !tables.faces.remove(face) {
            return Ok(false);
        }
        let entries = tables.fib.remove_face(face);
        tracing::info!(target: targets::FACE_TABLE, %face, fib_entries = entries, "face destroyed");
        Ok(true)
    }

    fn set_strategy(&self, prefix: String, strategy: String) -> Result<(), ManagementError> {
        use crate::config::validation::{is_valid_name, STRATEGY_NAMESPACE};

        if !is_valid_name(&prefix) {
            return Err(ManagementError::InvalidCommand(format!(
                "'{prefix}' is not a name"
            )));
        }
        if !strategy.starts_with(STRATEGY_NAMESPACE) {
            return Err(ManagementError::InvalidCommand(format!(
                "unknown strategy '{strategy}'"
            )));
        }
        tracing::info!(target: targets::STRATEGY_CHOICE, %prefix, %strategy, "strategy set");
        self.tables.lock().strategy_choice.insert(prefix, strategy);
        Ok(())
    }

    fn add_next_hop(&self, prefix: &str, face: FaceId, cost: u64) -> Result<(), ManagementError> {
        let mut tables = self.tables.lock();
        if tables.faces.get(face).is_none() {
            return Err(ManagementError::InvalidCommand(format!("unknown {face}")));
        }
        tables.fib.add_next_hop(prefix, face, cost);
        tracing::debug!(target: targets::FORWARDER, %prefix, %face, cost, "next hop added");
        Ok(())
    }
}

/// The forwarding daemon core.
pub struct Forwarder {
    shared: Arc<Shared>,
    reactor: ReactorHandle,
    commands_tx: mpsc::UnboundedSender<ManagementCommand>,
    commands_rx: Option<mpsc::UnboundedReceiver<ManagementCommand>>,
    shutdown: CancellationToken,
}

impl Forwarder {
    /// Build tables, face system and authenticator from the configuration.
    pub fn new(ctx: &SubsystemContext) -> Result<Self, SubsystemError> {
        let config = &ctx.config;
        let face_system = FaceSystem::from_config(&config.face_system)?;

        let cs = ContentStore::new(config.tables.cs_max_packets);
        tracing::debug!(
            target: targets::CONTENT_STORE,
            capacity = cs.capacity(),
            "content store ready"
        );

        let tables = ForwarderTables {
            faces: FaceTable::new(),
            fib: Fib::default(),
            strategy_choice: StrategyChoice::from_config(&config.tables),
            cs,
        };

        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            identity: Arc::clone(&ctx.identity),
            channels: face_system.channels().to_vec(),
            generation: ctx.reactor.generation(),
            authenticator: CommandAuthenticator::from_config(&config.authorizations),
            tables: Mutex::new(tables),
        });

        tracing::info!(
            target: targets::FORWARDER,
            identity = ctx.identity.name(),
            channels = shared.channels.len(),
            "forwarder constructed"
        );

        Ok(Self {
            shared,
            reactor: ctx.reactor.clone(),
            commands_tx,
            commands_rx: Some(commands_rx),
            shutdown: ctx.reactor.shutdown_token(),
        })
    }

    /// Client for management commands.
    pub fn client(&self) -> ForwarderClient {
        ForwarderClient::new(self.commands_tx.clone())
    }

    pub fn status(&self) -> ForwarderStatus {
        self.shared.status()
    }
}

impl Subsystem for Forwarder {
    fn name(&self) -> &'static str {
        targets::FORWARDER
    }

    fn initialize(&mut self) -> Result<(), SubsystemError> {
        let mut commands = self
            .commands_rx
            .take()
            .ok_or(SubsystemError::AlreadyInitialized(targets::FORWARDER))?;
        let shared = Arc::clone(&self.shared);
        let shutdown = self.shutdown.clone();

        let accepted = self.reactor.spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    command = commands.recv() => match command {
                        Some(command) => shared.handle(command),
                        None => break,
                    },
                }
            }
            tracing::debug!(target: targets::FORWARDER, "management handler finished");
        });

        if accepted {
            Ok(())
        } else {
            Err(SubsystemError::ReactorUnavailable(targets::FORWARDER))
        }
    }
}

impl Drop for Forwarder {
    fn drop(&mut self) {
        self.shutdown.cancel();
        tracing::info!(target: targets::FORWARDER, "forwarder destroyed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigBootstrap;
    use crate::runtime::GlobalRuntime;
    use crate::security::KeyChain;

    fn context(runtime: Arc<GlobalRuntime>) -> (tempfile::TempDir, SubsystemContext) {
        let home = tempfile::tempdir().unwrap();
        let identity = KeyChain::open(home.path()).unwrap().into_identity();
        let ctx = SubsystemContext::new(
            Arc::new(ConfigBootstrap::default_config()),
            Arc::new(identity),
            runtime,
        );
        (home, ctx)
    }

    #[test]
    fn status_reflects_builtin_config() {
        let runtime = Arc::new(GlobalRuntime::new());
        let (_home, ctx) = context(Arc::clone(&runtime));
        let forwarder = Forwarder::new(&ctx).unwrap();

        let status = forwarder.status();
        assert_eq!(status.channels, 3);
        assert_eq!(status.faces, 3);
        assert_eq!(status.cs_capacity, 100);
        assert_eq!(status.strategy_choice_entries, 5);
        assert_eq!(status.generation, runtime.reactor().generation());
    }

    #[test]
    fn initialize_twice_fails() {
        let runtime = Arc::new(GlobalRuntime::new());
        let (_home, ctx) = context(runtime);
        let mut forwarder = Forwarder::new(&ctx).unwrap();

        forwarder.initialize().unwrap();
        assert_eq!(
            forwarder.initialize(),
            Err(SubsystemError::AlreadyInitialized(targets::FORWARDER))
        );
    }

    #[test]
    fn initialize_on_retired_reactor_fails() {
        let runtime = Arc::new(GlobalRuntime::new());
        let (_home, ctx) = context(Arc::clone(&runtime));
        let mut forwarder = Forwarder::new(&ctx).unwrap();

        runtime.reset();
        assert_eq!(
            forwarder.initialize(),
            Err(SubsystemError::ReactorUnavailable(targets::FORWARDER))
        );
    }

    #[test]
    fn commands_are_served_while_reactor_runs() {
        let runtime = Arc::new(GlobalRuntime::new());
        let (_home, ctx) = context(Arc::clone(&runtime));
        let mut forwarder = Forwarder::new(&ctx).unwrap();
        forwarder.initialize().unwrap();
        let client = forwarder.client();

        let reactor = Arc::clone(runtime.reactor());
        let thread = std::thread::spawn(move || reactor.run());

        client
            .set_strategy_blocking(ANY_SIGNER, "/example", "/localhost/nfd/strategy/multicast")
            .unwrap();
        let err = client
            .set_strategy_blocking(ANY_SIGNER, "/example", "/other/strategy")
            .unwrap_err();
        assert!(matches!(err, ManagementError::InvalidCommand(_)));
        assert_eq!(client.status_blocking().unwrap().strategy_choice_entries, 6);

        runtime.reactor().stop();
        thread.join().unwrap().unwrap();
        drop(forwarder);
        assert_eq!(client.status_blocking(), Err(ManagementError::Unavailable));
    }

    #[test]
    fn face_commands_manage_faces_and_next_hops() {
        let runtime = Arc::new(GlobalRuntime::new());
        let (_home, ctx) = context(Arc::clone(&runtime));
        let mut forwarder = Forwarder::new(&ctx).unwrap();
        forwarder.initialize().unwrap();
        let client = forwarder.client();

        let reactor = Arc::clone(runtime.reactor());
        let thread = std::thread::spawn(move || reactor.run());

        let face = client
            .create_face_blocking(ANY_SIGNER, "udp4://192.0.2.1:6363")
            .unwrap();
        assert_eq!(face.as_u64(), FaceId::FIRST_DYNAMIC);
        assert_eq!(
            client.create_face_blocking(ANY_SIGNER, "udp4://192.0.2.1:6363"),
            Ok(face)
        );
        assert!(matches!(
            client.create_face_blocking(ANY_SIGNER, "ether://01:00:5e:00:17:aa"),
            Err(ManagementError::InvalidCommand(_))
        ));
        let faces = client.list_faces_blocking().unwrap();
        assert_eq!(faces.len(), 4);
        assert_eq!(faces[3].scope, FaceScope::NonLocal);

        forwarder.shared.tables.lock().fib.add_next_hop("/example", face, 10);
        assert_eq!(client.next_hops_blocking("/example/data").unwrap().len(), 1);
        assert_eq!(
            client.effective_strategy_blocking("/example/data").unwrap().as_deref(),
            Some(crate::config::defaults::BEST_ROUTE_STRATEGY)
        );

        assert_eq!(client.destroy_face_blocking(ANY_SIGNER, face), Ok(true));
        assert_eq!(client.destroy_face_blocking(ANY_SIGNER, face), Ok(false));
        assert!(client.next_hops_blocking("/example/data").unwrap().is_empty());
        assert!(matches!(
            client.destroy_face_blocking(ANY_SIGNER, FaceId::INTERNAL),
            Err(ManagementError::InvalidCommand(_))
        ));

        assert_eq!(client.set_cs_capacity_blocking(ANY_SIGNER, 10), Ok(100));
        assert_eq!(client.status_blocking().unwrap().cs_capacity, 10);

        runtime.reactor().stop();
        thread.join().unwrap().unwrap();
    }

    #[test]
    fn face_and_cs_commands_need_their_privileges() {
        let runtime = Arc::new(GlobalRuntime::new());
        let home = tempfile::tempdir().unwrap();
        let identity = KeyChain::open(home.path()).unwrap().into_identity();
        let mut config = ConfigBootstrap::default_config();
        config.authorizations.authorize[0].privileges = vec![Privilege::Fib];
        let ctx = SubsystemContext::new(Arc::new(config), Arc::new(identity), Arc::clone(&runtime));
        let mut forwarder = Forwarder::new(&ctx).unwrap();
        forwarder.initialize().unwrap();
        let client = forwarder.client();

        let reactor = Arc::clone(runtime.reactor());
        let thread = std::thread::spawn(move || reactor.run());

        assert!(matches!(
            client.create_face_blocking(ANY_SIGNER, "tcp4://192.0.2.1:6363"),
            Err(ManagementError::Unauthorized { privilege: Privilege::Faces, .. })
        ));
        assert!(matches!(
            client.set_cs_capacity_blocking(ANY_SIGNER, 1),
            Err(ManagementError::Unauthorized { privilege: Privilege::Cs, .. })
        ));
        assert_eq!(client.list_faces_blocking().unwrap().len(), 3);

        runtime.reactor().stop();
        thread.join().unwrap().unwrap();
    }
}
