//! Configuration schema definitions.
//!
//! This module defines the configuration tree shared by the forwarder and the
//! RIB service. All types derive Serde traits for deserialization from the
//! embedded default or a host-supplied override.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Root of the daemon configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct ConfigTree {
    /// Process credentials for the privilege helper.
    pub general: GeneralConfig,

    /// Log levels.
    pub log: LogConfig,

    /// Forwarding tables (content store, strategy choice).
    pub tables: TablesConfig,

    /// Face types to enable.
    pub face_system: FaceSystemConfig,

    /// Management privileges.
    pub authorizations: AuthorizationsConfig,

    /// RIB service settings.
    pub rib: RibConfig,
}

/// Credentials the daemon should run as.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct GeneralConfig {
    pub user: Option<String>,
    pub group: Option<String>,
}

/// Daemon log level names.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    None,
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
    All,
}

impl LogLevel {
    /// The matching `tracing` filter directive.
    pub fn as_directive(self) -> &'static str {
        match self {
            LogLevel::None => "off",
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace | LogLevel::All => "trace",
        }
    }
}

/// `log` section.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct LogConfig {
    /// Level for modules without an explicit entry.
    pub default_level: LogLevel,

    /// Per-module levels, keyed by log module name.
    pub modules: BTreeMap<String, LogLevel>,
}

/// `tables` section.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct TablesConfig {
    /// Content store capacity in packets.
    pub cs_max_packets: usize,

    /// Strategy assignments, name prefix → strategy name.
    pub strategy_choice: BTreeMap<String, String>,
}

impl Default for TablesConfig {
    fn default() -> Self {
        Self {
            cs_max_packets: 65_536,
            strategy_choice: BTreeMap::new(),
        }
    }
}

/// `face_system` section. A present subsection enables that face type.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct FaceSystemConfig {
    pub tcp: Option<TcpFaceConfig>,
    pub udp: Option<UdpFaceConfig>,
    pub websocket: Option<WebSocketFaceConfig>,
}

impl FaceSystemConfig {
    /// Number of enabled face types.
    pub fn enabled_count(&self) -> usize {
        [
            self.tcp.is_some(),
            self.udp.is_some(),
            self.websocket.is_some(),
        ]
        .into_iter()
        .filter(|enabled| *enabled)
        .count()
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct TcpFaceConfig {
    pub listen: bool,
    pub port: u16,
}

impl Default for TcpFaceConfig {
    fn default() -> Self {
        Self {
            listen: true,
            port: 6363,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct UdpFaceConfig {
    pub port: u16,

    /// Enable multicast faces.
    pub mcast: bool,

    /// Idle timeout for on-demand faces, in seconds.
    pub idle_timeout: u64,
}

impl Default for UdpFaceConfig {
    fn default() -> Self {
        Self {
            port: 6363,
            mcast: true,
            idle_timeout: 600,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct WebSocketFaceConfig {
    pub listen: bool,
    pub port: u16,
}

impl Default for WebSocketFaceConfig {
    fn default() -> Self {
        Self {
            listen: true,
            port: 9696,
        }
    }
}

/// `authorizations` section.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct AuthorizationsConfig {
    pub authorize: Vec<AuthorizeConfig>,
}

/// One `authorize` block: a certificate and the privileges it grants.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct AuthorizeConfig {
    /// Certificate file, or `any` to accept every signer.
    pub certfile: String,

    pub privileges: Vec<Privilege>,
}

/// Management privileges.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum Privilege {
    Faces,
    Fib,
    Cs,
    StrategyChoice,
}

/// `rib` section.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct RibConfig {
    /// Trust policy for commands from local applications.
    pub localhost_security: Option<LocalhostSecurityConfig>,

    /// Propagation of local prefixes to the connected router.
    pub auto_prefix_propagate: Option<PrefixPropagationConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct LocalhostSecurityConfig {
    pub trust_anchor: TrustAnchor,
}

/// Trust anchor for command validation.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TrustAnchor {
    /// Accept commands signed by any key.
    Any,
    /// Accept commands chaining to the certificate in `file_name`.
    File { file_name: String },
}

/// `auto_prefix_propagate` subsection. Durations are in seconds except `timeout`.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct PrefixPropagationConfig {
    pub cost: u64,

    /// Command timeout in milliseconds.
    pub timeout: u64,

    pub refresh_interval: u64,
    pub base_retry_wait: u64,
    pub max_retry_wait: u64,
}

impl Default for PrefixPropagationConfig {
    fn default() -> Self {
        Self {
            cost: 15,
            timeout: 10_000,
            refresh_interval: 25,
            base_retry_wait: 50,
            max_retry_wait: 3600,
        }
    }
}
