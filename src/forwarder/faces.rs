//! Faces and the face system.
//!
//! # Responsibilities
//! - Allocate face ids and track faces (reserved faces included)
//! - Create one channel per enabled face type in `face_system`
//!
//! # Design Decisions
//! - Face ids below 256 are reserved; allocation starts at 256 per table, so
//!   each run numbers its faces from the same base
//! - Channels are descriptors only; no sockets are opened

use std::collections::BTreeMap;

use serde::Serialize;

use crate::config::FaceSystemConfig;
use crate::subsystem::SubsystemError;
use crate::observability::{modules, targets};

/// Identifier of a face.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct FaceId(u64);

impl FaceId {
    /// Face used by the daemon's own management.
    pub const INTERNAL: FaceId = FaceId(1);
    /// Face representing the content store.
    pub const CONTENT_STORE: FaceId = FaceId(254);
    /// Face that drops everything sent to it.
    pub const NULL: FaceId = FaceId(255);
    /// First id handed out to ordinary faces.
    pub const FIRST_DYNAMIC: u64 = 256;

    pub const fn from_raw(id: u64) -> Self {
        Self(id)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }

    pub fn is_reserved(&self) -> bool {
        self.0 < Self::FIRST_DYNAMIC
    }
}

impl std::fmt::Display for FaceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "face-{}", self.0)
    }
}

/// Whether a face may leave the local host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FaceScope {
    Local,
    NonLocal,
}

impl FaceScope {
    /// Scope of a face to `host`.
    pub fn of_host(host: &str) -> Self {
        if host == "localhost" || host.starts_with("127.") || host.starts_with("[::1]") {
            FaceScope::Local
        } else {
            FaceScope::NonLocal
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FaceEntry {
    pub id: FaceId,
    pub uri: String,
    pub scope: FaceScope,
}

/// Table of faces known to the forwarder.
#[derive(Debug)]
pub struct FaceTable {
    next_id: u64,
    faces: BTreeMap<FaceId, FaceEntry>,
}

impl FaceTable {
    /// A table holding only the reserved faces.
    pub fn new() -> Self {
        let mut table = Self {
            next_id: FaceId::FIRST_DYNAMIC,
            faces: BTreeMap::new(),
        };
        for (id, uri) in [
            (FaceId::INTERNAL, "internal://"),
            (FaceId::CONTENT_STORE, "contentstore://"),
            (FaceId::NULL, "null://"),
        ] {
            table.faces.insert(
                id,
                FaceEntry {
                    id,
                    uri: uri.to_string(),
                    scope: FaceScope::Local,
                },
            );
        }
        table
    }

    /// Add a face and assign it the next free id.
    pub fn add(&mut self, uri: impl Into<String>, scope: FaceScope) -> FaceId {
        let id = FaceId(self.next_id);
        self.next_id += 1;
        let uri = uri.into();
        tracing::debug!(target: targets::FACE_TABLE, %id, %uri, "added face");
        self.faces.insert(id, FaceEntry { id, uri, scope });
        id
    }

    /// Remove a face. Reserved faces stay.
    pub fn remove(&mut self, id: FaceId) -> bool {
        if id.is_reserved() {
            return false;
        }
        let removed = self.faces.remove(&id).is_some();
        if removed {
            tracing::debug!(target: targets::FACE_TABLE, %id, "removed face");
        }
        removed
    }

    pub fn get(&self, id: FaceId) -> Option<&FaceEntry> {
        self.faces.get(&id)
    }

    pub fn find_by_uri(&self, uri: &str) -> Option<FaceId> {
        self.faces.values().find(|face| face.uri == uri).map(|face| face.id)
    }

    /// Every face, ordered by id.
    pub fn entries(&self) -> Vec<FaceEntry> {
        self.faces.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.faces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.faces.is_empty()
    }
}

impl Default for FaceTable {
    fn default() -> Self {
        Self::new()
    }
}

/// A listening channel for one face type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Channel {
    pub kind: &'static str,
    pub uri: String,
    pub listening: bool,
}

impl Channel {
    /// True if faces with `scheme` (`tcp4`, `udp6`, ...) belong to this channel.
    pub fn accepts(&self, scheme: &str) -> bool {
        let family = scheme.trim_end_matches(['4', '6']);
        self.uri
            .split_once("://")
            .is_some_and(|(own, _)| own == family)
    }
}

/// Channels created from the `face_system` section.
#[derive(Debug, Default)]
pub struct FaceSystem {
    channels: Vec<Channel>,
}

impl FaceSystem {
    /// Create channels for every enabled face type.
    pub fn from_config(config: &FaceSystemConfig) -> Result<Self, SubsystemError> {
        let mut channels = Vec::new();

        if let Some(tcp) = &config.tcp {
            channels.push(channel(targets::TCP_CHANNEL, "tcp", tcp.port, tcp.listen)?);
        }
        if let Some(udp) = &config.udp {
            channels.push(channel(targets::UDP_CHANNEL, "udp", udp.port, true)?);
            if udp.mcast {
                modules::register(targets::MULTICAST_UDP_FACE);
            }
        }
        if let Some(websocket) = &config.websocket {
            channels.push(channel(
                targets::WEBSOCKET_CHANNEL,
                "ws",
                websocket.port,
                websocket.listen,
            )?);
        }

        for channel in &channels {
            tracing::info!(
                target: targets::FACE_SYSTEM,
                kind = channel.kind,
                uri = %channel.uri,
                listening = channel.listening,
                "channel created"
            );
        }
        Ok(Self { channels })
    }

    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }
}

fn channel(
    kind: &'static str,
    scheme: &str,
    port: u16,
    listening: bool,
) -> Result<Channel, SubsystemError> {
    if port == 0 {
        return Err(SubsystemError::FaceSystem(format!(
            "{kind} needs a non-zero port"
        )));
    }
    modules::register(kind);
    Ok(Channel {
        kind,
        uri: format!("{scheme}://0.0.0.0:{port}"),
        listening,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigBootstrap, TcpFaceConfig};

    #[test]
    fn reserved_faces_present() {
        let table = FaceTable::new();
        assert_eq!(table.len(), 3);
        assert!(table.get(FaceId::NULL).is_some());
        assert!(FaceId::CONTENT_STORE.is_reserved());
    }

    #[test]
    fn ids_start_after_reserved_range() {
        let mut table = FaceTable::new();
        let first = table.add("tcp4://192.0.2.1:6363", FaceScope::NonLocal);
        let second = table.add("unix:///run/nfd.sock", FaceScope::Local);
        assert_eq!(first.as_u64(), 256);
        assert_eq!(second.as_u64(), 257);

        assert!(table.remove(first));
        assert!(!table.remove(first));
        assert!(!table.remove(FaceId::INTERNAL));
    }

    #[test]
    fn lookup_by_uri_and_listing() {
        let mut table = FaceTable::new();
        let id = table.add("udp4://192.0.2.7:6363", FaceScope::NonLocal);
        assert_eq!(table.find_by_uri("udp4://192.0.2.7:6363"), Some(id));
        assert_eq!(table.find_by_uri("udp4://192.0.2.8:6363"), None);

        let ids: Vec<_> = table.entries().iter().map(|face| face.id.as_u64()).collect();
        assert_eq!(ids, vec![1, 254, 255, 256]);
    }

    #[test]
    fn scope_follows_host() {
        assert_eq!(FaceScope::of_host("127.0.0.1:6363"), FaceScope::Local);
        assert_eq!(FaceScope::of_host("[::1]:6363"), FaceScope::Local);
        assert_eq!(FaceScope::of_host("192.0.2.1:6363"), FaceScope::NonLocal);
    }

    #[test]
    fn channels_accept_their_scheme_family() {
        let config = ConfigBootstrap::default_config();
        let faces = FaceSystem::from_config(&config.face_system).unwrap();
        let tcp = &faces.channels()[0];
        assert!(tcp.accepts("tcp"));
        assert!(tcp.accepts("tcp4"));
        assert!(!tcp.accepts("udp4"));
    }

    #[test]
    fn builtin_face_system_creates_three_channels() {
        let config = ConfigBootstrap::default_config();
        let faces = FaceSystem::from_config(&config.face_system).unwrap();
        let kinds: Vec<_> = faces.channels().iter().map(|c| c.kind).collect();
        assert_eq!(kinds, vec!["TcpChannel", "UdpChannel", "WebSocketChannel"]);
        assert!(modules::is_registered("UdpChannel"));
    }

    #[test]
    fn zero_port_is_rejected() {
        let config = FaceSystemConfig {
            tcp: Some(TcpFaceConfig {
                listen: true,
                port: 0,
            }),
            ..FaceSystemConfig::default()
        };
        assert!(matches!(
            FaceSystem::from_config(&config),
            Err(SubsystemError::FaceSystem(_))
        ));
    }
}
