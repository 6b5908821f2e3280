//! Built-in daemon configuration.

use std::collections::BTreeMap;

use crate::config::schema::{
    AuthorizationsConfig, AuthorizeConfig, ConfigTree, FaceSystemConfig, GeneralConfig,
    LocalhostSecurityConfig, LogConfig, LogLevel, PrefixPropagationConfig, Privilege, RibConfig,
    TablesConfig, TcpFaceConfig, TrustAnchor, UdpFaceConfig, WebSocketFaceConfig,
};

pub const BEST_ROUTE_STRATEGY: &str = "/localhost/nfd/strategy/best-route";
pub const MULTICAST_STRATEGY: &str = "/localhost/nfd/strategy/multicast";

/// Text form of the built-in configuration.
///
/// Overrides supplied by the host must keep this shape.
pub const DEFAULT_CONFIG: &str = r#"
[log]
default_level = "ALL"

[tables]
cs_max_packets = 100

[tables.strategy_choice]
"/" = "/localhost/nfd/strategy/best-route"
"/localhost" = "/localhost/nfd/strategy/multicast"
"/localhost/nfd" = "/localhost/nfd/strategy/best-route"
"/ndn/broadcast" = "/localhost/nfd/strategy/multicast"
"/ndn/multicast" = "/localhost/nfd/strategy/multicast"

[face_system.tcp]

[face_system.udp]
mcast = false

[face_system.websocket]

[[authorizations.authorize]]
certfile = "any"
privileges = ["faces", "fib", "cs", "strategy-choice"]

[rib.localhost_security.trust_anchor]
type = "any"

[rib.auto_prefix_propagate]
refresh_interval = 300
"#;

/// Source of the configuration every run starts from.
pub struct ConfigBootstrap;

impl ConfigBootstrap {
    /// The built-in configuration tree. Pure, no I/O.
    pub fn default_config() -> ConfigTree {
        let strategy_choice: BTreeMap<String, String> = [
            ("/", BEST_ROUTE_STRATEGY),
            ("/localhost", MULTICAST_STRATEGY),
            ("/localhost/nfd", BEST_ROUTE_STRATEGY),
            ("/ndn/broadcast", MULTICAST_STRATEGY),
            ("/ndn/multicast", MULTICAST_STRATEGY),
        ]
        .into_iter()
        .map(|(prefix, strategy)| (prefix.to_string(), strategy.to_string()))
        .collect();

        ConfigTree {
            general: GeneralConfig::default(),
            log: LogConfig {
                default_level: LogLevel::All,
                modules: BTreeMap::new(),
            },
            tables: TablesConfig {
                cs_max_packets: 100,
                strategy_choice,
            },
            face_system: FaceSystemConfig {
                tcp: Some(TcpFaceConfig::default()),
                udp: Some(UdpFaceConfig {
                    mcast: false,
                    ..UdpFaceConfig::default()
                }),
                websocket: Some(WebSocketFaceConfig::default()),
            },
            authorizations: AuthorizationsConfig {
                authorize: vec![AuthorizeConfig {
                    certfile: "any".to_string(),
                    privileges: vec![
                        Privilege::Faces,
                        Privilege::Fib,
                        Privilege::Cs,
                        Privilege::StrategyChoice,
                    ],
                }],
            },
            rib: RibConfig {
                localhost_security: Some(LocalhostSecurityConfig {
                    trust_anchor: TrustAnchor::Any,
                }),
                auto_prefix_propagate: Some(PrefixPropagationConfig {
                    refresh_interval: 300,
                    ..PrefixPropagationConfig::default()
                }),
            },
        }
    }
}
