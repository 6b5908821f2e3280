//! Privilege helper.
//!
//! An embedded daemon shares its process with the host application and cannot
//! switch credentials. The helper accepts a `general` section that names no
//! account, or the account the process already runs as, and rejects anything
//! else so a misconfigured daemon fails at construction instead of running
//! with the wrong privileges.

use thiserror::Error;

use crate::config::GeneralConfig;
use crate::observability::targets;

/// Error type for privilege setup.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PrivilegeError {
    #[error("cannot switch to user '{requested}' (running as '{current}')")]
    UnsupportedUser { requested: String, current: String },
    #[error("cannot switch to group '{requested}' inside an embedded process")]
    UnsupportedGroup { requested: String },
}

/// Credentials the helper settled on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrivilegeHelper {
    user: Option<String>,
}

impl PrivilegeHelper {
    /// Check the `general` section against the current process.
    pub fn initialize(general: &GeneralConfig) -> Result<Self, PrivilegeError> {
        let current = current_user();

        if let Some(requested) = &general.user {
            if current.as_deref() != Some(requested.as_str()) {
                return Err(PrivilegeError::UnsupportedUser {
                    requested: requested.clone(),
                    current: current.unwrap_or_else(|| "<unknown>".into()),
                });
            }
        }
        if let Some(requested) = &general.group {
            return Err(PrivilegeError::UnsupportedGroup {
                requested: requested.clone(),
            });
        }

        tracing::debug!(
            target: targets::PRIVILEGE_HELPER,
            user = current.as_deref().unwrap_or("<unknown>"),
            "keeping process credentials"
        );
        Ok(Self { user: current })
    }

    /// The account the daemon runs as, when known.
    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }
}

fn current_user() -> Option<String> {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .ok()
        .filter(|user| !user.is_empty())
}
