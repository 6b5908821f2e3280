//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Runner construction:
//!     → privilege.rs (check requested credentials against the process)
//!     → keychain.rs (open $HOME/.ndn, load or create the identity)
//!     → Identity shared with the forwarder and the RIB service
//! ```
//!
//! # Design Decisions
//! - Fail closed: any problem with identity material aborts construction
//! - Key material never appears in logs or Debug output

pub mod keychain;
pub mod privilege;

pub use keychain::{Identity, KeyChain, KeyChainError, DEFAULT_IDENTITY};
pub use privilege::{PrivilegeError, PrivilegeHelper};
