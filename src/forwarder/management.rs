//! Forwarder management commands.
//!
//! # Responsibilities
//! - Carry commands from other threads and from the RIB service to the forwarder
//! - Check the signer's privileges before any table change
//! - Report forwarder status
//!
//! # Design Decisions
//! - Commands travel over an unbounded channel drained by a reactor handler
//! - Replies use oneshot channels; a dropped reply means the forwarder is gone
//! - Blocking client calls are for threads outside the reactor only

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

use crate::config::{AuthorizationsConfig, Privilege};
use crate::forwarder::faces::{FaceEntry, FaceId};
use crate::forwarder::tables::NextHop;
use crate::observability::targets;

/// Certificate name accepted as a wildcard signer.
pub const ANY_SIGNER: &str = "any";

/// Error type for management requests.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ManagementError {
    #[error("forwarder is not running")]
    Unavailable,
    #[error("'{signer}' lacks the {privilege:?} privilege")]
    Unauthorized { signer: String, privilege: Privilege },
    #[error("invalid command: {0}")]
    InvalidCommand(String),
}

/// Snapshot of the forwarder's tables and faces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ForwarderStatus {
    pub identity: String,
    pub generation: u64,
    pub faces: usize,
    pub channels: usize,
    pub fib_entries: usize,
    pub strategy_choice_entries: usize,
    pub cs_capacity: usize,
}

pub(crate) type Reply<T> = oneshot::Sender<Result<T, ManagementError>>;

/// A request handled on the reactor thread.
pub(crate) enum ManagementCommand {
    Status {
        reply: Reply<ForwarderStatus>,
    },
    SetStrategy {
        signer: String,
        prefix: String,
        strategy: String,
        reply: Reply<()>,
    },
    AddNextHop {
        signer: String,
        prefix: String,
        face: FaceId,
        cost: u64,
        reply: Reply<()>,
    },
    RemoveNextHop {
        signer: String,
        prefix: String,
        face: FaceId,
        reply: Reply<bool>,
    },
    FaceList {
        reply: Reply<Vec<FaceEntry>>,
    },
    FaceCreate {
        signer: String,
        uri: String,
        reply: Reply<FaceId>,
    },
    FaceDestroy {
        signer: String,
        face: FaceId,
        reply: Reply<bool>,
    },
    EffectiveStrategy {
        name: String,
        reply: Reply<Option<String>>,
    },
    NextHops {
        name: String,
        reply: Reply<Vec<NextHop>>,
    },
    SetCsCapacity {
        signer: String,
        capacity: usize,
        reply: Reply<usize>,
    },
}

/// Signers and the privileges they hold.
#[derive(Debug, Clone, Default)]
pub struct CommandAuthenticator {
    grants: BTreeMap<String, BTreeSet<Privilege>>,
}

impl CommandAuthenticator {
    pub fn from_config(config: &AuthorizationsConfig) -> Self {
        let mut grants: BTreeMap<String, BTreeSet<Privilege>> = BTreeMap::new();
        for entry in &config.authorize {
            grants
                .entry(entry.certfile.clone())
                .or_default()
                .extend(entry.privileges.iter().copied());
        }
        tracing::debug!(
            target: targets::COMMAND_AUTHENTICATOR,
            signers = grants.len(),
            "authorizations loaded"
        );
        Self { grants }
    }

    /// Check that `signer` holds `privilege`, directly or through `any`.
    pub fn authorize(&self, signer: &str, privilege: Privilege) -> Result<(), ManagementError> {
        let granted = [signer, ANY_SIGNER].iter().any(|name| {
            self.grants
                .get(*name)
                .is_some_and(|privileges| privileges.contains(&privilege))
        });
        if granted {
            Ok(())
        } else {
            tracing::warn!(
                target: targets::COMMAND_AUTHENTICATOR,
                signer,
                ?privilege,
                "command rejected"
            );
            Err(ManagementError::Unauthorized {
                signer: signer.to_string(),
                privilege,
            })
        }
    }
}

/// Cloneable sender of management commands.
#[derive(Debug, Clone)]
pub struct ForwarderClient {
    tx: mpsc::UnboundedSender<ManagementCommand>,
}

impl std::fmt::Debug for ManagementCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ManagementCommand::Status { .. } => "Status",
            ManagementCommand::SetStrategy { .. } => "SetStrategy",
            ManagementCommand::AddNextHop { .. } => "AddNextHop",
            ManagementCommand::RemoveNextHop { .. } => "RemoveNextHop",
            ManagementCommand::FaceList { .. } => "FaceList",
            ManagementCommand::FaceCreate { .. } => "FaceCreate",
            ManagementCommand::FaceDestroy { .. } => "FaceDestroy",
            ManagementCommand::EffectiveStrategy { .. } => "EffectiveStrategy",
            ManagementCommand::NextHops { .. } => "NextHops",
            ManagementCommand::SetCsCapacity { .. } => "SetCsCapacity",
        };
        f.write_str(name)
    }
}

impl ForwarderClient {
    pub(crate) fn new(tx: mpsc::UnboundedSender<ManagementCommand>) -> Self {
        Self { tx }
    }

    fn send<T>(
        &self,
        build: impl FnOnce(Reply<T>) -> ManagementCommand,
    ) -> Result<oneshot::Receiver<Result<T, ManagementError>>, ManagementError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(build(reply))
            .map_err(|_| ManagementError::Unavailable)?;
        Ok(rx)
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(Reply<T>) -> ManagementCommand,
    ) -> Result<T, ManagementError> {
        self.send(build)?
            .await
            .map_err(|_| ManagementError::Unavailable)?
    }

    fn request_blocking<T>(
        &self,
        build: impl FnOnce(Reply<T>) -> ManagementCommand,
    ) -> Result<T, ManagementError> {
        self.send(build)?
            .blocking_recv()
            .map_err(|_| ManagementError::Unavailable)?
    }

    pub async fn status(&self) -> Result<ForwarderStatus, ManagementError> {
        self.request(|reply| ManagementCommand::Status { reply }).await
    }

    /// Query status from a thread outside the reactor.
    pub fn status_blocking(&self) -> Result<ForwarderStatus, ManagementError> {
        self.request_blocking(|reply| ManagementCommand::Status { reply })
    }

    /// Change the strategy for `prefix` from a thread outside the reactor.
    pub fn set_strategy_blocking(
        &self,
        signer: &str,
        prefix: &str,
        strategy: &str,
    ) -> Result<(), ManagementError> {
        self.request_blocking(|reply| ManagementCommand::SetStrategy {
            signer: signer.to_string(),
            prefix: prefix.to_string(),
            strategy: strategy.to_string(),
            reply,
        })
    }

    pub async fn add_next_hop(
        &self,
        signer: &str,
        prefix: &str,
        face: FaceId,
        cost: u64,
    ) -> Result<(), ManagementError> {
        self.request(|reply| ManagementCommand::AddNextHop {
            signer: signer.to_string(),
            prefix: prefix.to_string(),
            face,
            cost,
            reply,
        })
        .await
    }

    pub async fn remove_next_hop(
        &self,
        signer: &str,
        prefix: &str,
        face: FaceId,
    ) -> Result<bool, ManagementError> {
        self.request(|reply| ManagementCommand::RemoveNextHop {
            signer: signer.to_string(),
            prefix: prefix.to_string(),
            face,
            reply,
        })
        .await
    }

    /// Faces known to the forwarder, ordered by id.
    pub fn list_faces_blocking(&self) -> Result<Vec<FaceEntry>, ManagementError> {
        self.request_blocking(|reply| ManagementCommand::FaceList { reply })
    }

    /// Create a face to `uri`, or return the face that already has it.
    pub fn create_face_blocking(&self, signer: &str, uri: &str) -> Result<FaceId, ManagementError> {
        self.request_blocking(|reply| ManagementCommand::FaceCreate {
            signer: signer.to_string(),
            uri: uri.to_string(),
            reply,
        })
    }

    /// Destroy a face along with its next hops.
    pub fn destroy_face_blocking(&self, signer: &str, face: FaceId) -> Result<bool, ManagementError> {
        self.request_blocking(|reply| ManagementCommand::FaceDestroy {
            signer: signer.to_string(),
            face,
            reply,
        })
    }

    /// Strategy that applies to `name`.
    pub fn effective_strategy_blocking(&self, name: &str) -> Result<Option<String>, ManagementError> {
        self.request_blocking(|reply| ManagementCommand::EffectiveStrategy {
            name: name.to_string(),
            reply,
        })
    }

    /// Next hops of the longest FIB entry covering `name`.
    pub fn next_hops_blocking(&self, name: &str) -> Result<Vec<NextHop>, ManagementError> {
        self.request_blocking(|reply| ManagementCommand::NextHops {
            name: name.to_string(),
            reply,
        })
    }

    /// Change the content store capacity. Returns the previous capacity.
    pub fn set_cs_capacity_blocking(&self, signer: &str, capacity: usize) -> Result<usize, ManagementError> {
        self.request_blocking(|reply| ManagementCommand::SetCsCapacity {
            signer: signer.to_string(),
            capacity,
            reply,
        })
    }

    /// True once the forwarder's command handler is gone.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AuthorizeConfig, ConfigBootstrap};

    #[test]
    fn builtin_authorizations_accept_any_signer() {
        let config = ConfigBootstrap::default_config();
        let auth = CommandAuthenticator::from_config(&config.authorizations);
        for privilege in [
            Privilege::Faces,
            Privilege::Fib,
            Privilege::Cs,
            Privilege::StrategyChoice,
        ] {
            assert!(auth.authorize("/some/operator", privilege).is_ok());
        }
    }

    #[test]
    fn missing_privilege_is_rejected() {
        let config = AuthorizationsConfig {
            authorize: vec![AuthorizeConfig {
                certfile: "operator.cert".into(),
                privileges: vec![Privilege::Fib],
            }],
        };
        let auth = CommandAuthenticator::from_config(&config);

        assert!(auth.authorize("operator.cert", Privilege::Fib).is_ok());
        assert_eq!(
            auth.authorize("operator.cert", Privilege::Cs),
            Err(ManagementError::Unauthorized {
                signer: "operator.cert".into(),
                privilege: Privilege::Cs
            })
        );
        assert!(auth.authorize("stranger.cert", Privilege::Fib).is_err());
    }

    #[test]
    fn closed_channel_is_unavailable() {
        let (tx, rx) = mpsc::unbounded_channel();
        let client = ForwarderClient::new(tx);
        drop(rx);

        assert!(client.is_closed());
        assert_eq!(client.status_blocking(), Err(ManagementError::Unavailable));
    }

    #[test]
    fn dropped_reply_is_unavailable() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let client = ForwarderClient::new(tx);
        let server = std::thread::spawn(move || {
            // Receive the request and drop it unanswered.
            drop(rx.blocking_recv());
        });

        assert_eq!(client.status_blocking(), Err(ManagementError::Unavailable));
        server.join().unwrap();
    }
}
