//! Registry of log module names.
//!
//! # Responsibilities
//! - Name every component that emits log events
//! - Record modules created at runtime (face channels)
//! - Answer the host's `listLogModules` query
//!
//! # Design Decisions
//! - Static modules are registered on first access, so the list is never empty
//! - The registry only grows; names survive across runs

use std::collections::BTreeSet;
use std::sync::OnceLock;

use parking_lot::RwLock;

/// Log targets used by the crate's components.
pub mod targets {
    pub const SERVICE: &str = "NfdService";
    pub const RUNNER: &str = "Runner";
    pub const REACTOR: &str = "Reactor";
    pub const SCHEDULER: &str = "Scheduler";
    pub const CONFIG: &str = "ConfigBootstrap";
    pub const KEY_CHAIN: &str = "KeyChain";
    pub const PRIVILEGE_HELPER: &str = "PrivilegeHelper";
    pub const FORWARDER: &str = "Forwarder";
    pub const FACE_SYSTEM: &str = "FaceSystem";
    pub const FACE_TABLE: &str = "FaceTable";
    pub const CONTENT_STORE: &str = "ContentStore";
    pub const STRATEGY_CHOICE: &str = "StrategyChoice";
    pub const COMMAND_AUTHENTICATOR: &str = "CommandAuthenticator";
    pub const RIB_SERVICE: &str = "RibService";
    pub const RIB: &str = "Rib";
    pub const PREFIX_PROPAGATOR: &str = "AutoPrefixPropagator";
    pub const TCP_CHANNEL: &str = "TcpChannel";
    pub const UDP_CHANNEL: &str = "UdpChannel";
    pub const MULTICAST_UDP_FACE: &str = "MulticastUdpFace";
    pub const WEBSOCKET_CHANNEL: &str = "WebSocketChannel";
}

const STATIC_MODULES: &[&str] = &[
    targets::SERVICE,
    targets::RUNNER,
    targets::REACTOR,
    targets::SCHEDULER,
    targets::CONFIG,
    targets::KEY_CHAIN,
    targets::PRIVILEGE_HELPER,
    targets::FORWARDER,
    targets::FACE_SYSTEM,
    targets::FACE_TABLE,
    targets::CONTENT_STORE,
    targets::STRATEGY_CHOICE,
    targets::COMMAND_AUTHENTICATOR,
    targets::RIB_SERVICE,
    targets::RIB,
    targets::PREFIX_PROPAGATOR,
    targets::TCP_CHANNEL,
    targets::UDP_CHANNEL,
    targets::MULTICAST_UDP_FACE,
    targets::WEBSOCKET_CHANNEL,
];

fn registry() -> &'static RwLock<BTreeSet<String>> {
    static REGISTRY: OnceLock<RwLock<BTreeSet<String>>> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        RwLock::new(STATIC_MODULES.iter().map(|name| (*name).to_string()).collect())
    })
}

/// Register a module name. Returns true if it was not known before.
pub fn register(name: &str) -> bool {
    if registry().read().contains(name) {
        return false;
    }
    registry().write().insert(name.to_string())
}

/// Check whether a module name is registered.
pub fn is_registered(name: &str) -> bool {
    registry().read().contains(name)
}

/// All registered module names, sorted.
pub fn names() -> Vec<String> {
    registry().read().iter().cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_modules_are_present() {
        let names = names();
        for module in STATIC_MODULES {
            assert!(names.iter().any(|n| n == module), "missing {module}");
        }
    }

    #[test]
    fn register_is_idempotent() {
        assert!(register("UnitTestChannel"));
        assert!(!register("UnitTestChannel"));
        assert!(is_registered("UnitTestChannel"));
    }

    #[test]
    fn names_are_sorted() {
        let names = names();
        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(names, sorted);
    }
}
