//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! defaults.rs (built-in tree, or host override text/file)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ConfigTree (validated, immutable)
//!     → shared via Arc with the forwarder and the RIB service
//! ```
//!
//! # Design Decisions
//! - Config is immutable once a run has constructed its subsystems
//! - Section names are fixed: log, tables, face_system, authorizations, rib
//! - All fields have defaults to allow minimal overrides
//! - Validation separates syntactic (serde) from semantic checks

pub mod defaults;
pub mod loader;
pub mod schema;
pub mod validation;

pub use defaults::{ConfigBootstrap, DEFAULT_CONFIG};
pub use loader::{load_config, parse_config, ConfigError, ConfigSource};
pub use schema::{
    AuthorizationsConfig, AuthorizeConfig, ConfigTree, FaceSystemConfig, GeneralConfig,
    LocalhostSecurityConfig, LogConfig, LogLevel, PrefixPropagationConfig, Privilege, RibConfig,
    TablesConfig, TcpFaceConfig, TrustAnchor, UdpFaceConfig, WebSocketFaceConfig,
};
