//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check name prefixes and strategy names in the strategy choice table
//! - Validate value ranges (capacity, refresh interval)
//! - Require at least one face type and one privilege per authorization
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ConfigTree → Result<(), Vec<ValidationError>>

use thiserror::Error;

use crate::config::schema::ConfigTree;

/// Prefix every strategy name must live under.
pub const STRATEGY_NAMESPACE: &str = "/localhost/nfd/strategy/";

/// A single semantic problem in a configuration tree.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("tables.cs_max_packets must be greater than zero")]
    ZeroContentStore,
    #[error("strategy_choice prefix '{0}' is not an absolute name")]
    InvalidPrefix(String),
    #[error("strategy '{strategy}' for '{prefix}' is outside {}", STRATEGY_NAMESPACE)]
    UnknownStrategy { prefix: String, strategy: String },
    #[error("face_system enables no face types")]
    NoFaces,
    #[error("authorization for '{0}' grants no privileges")]
    EmptyAuthorization(String),
    #[error("rib.auto_prefix_propagate.refresh_interval must be greater than zero")]
    ZeroRefreshInterval,
    #[error("rib.auto_prefix_propagate.base_retry_wait exceeds max_retry_wait")]
    RetryWaitOrder,
}

/// Check a name is absolute (`/`, `/a`, `/a/b`) with no empty components.
pub fn is_valid_name(name: &str) -> bool {
    if name == "/" {
        return true;
    }
    name.starts_with('/') && name[1..].split('/').all(|component| !component.is_empty())
}

/// Validate a configuration tree, collecting every problem found.
pub fn validate_config(config: &ConfigTree) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.tables.cs_max_packets == 0 {
        errors.push(ValidationError::ZeroContentStore);
    }

    for (prefix, strategy) in &config.tables.strategy_choice {
        if !is_valid_name(prefix) {
            errors.push(ValidationError::InvalidPrefix(prefix.clone()));
        }
        if !strategy.starts_with(STRATEGY_NAMESPACE) || !is_valid_name(strategy) {
            errors.push(ValidationError::UnknownStrategy {
                prefix: prefix.clone(),
                strategy: strategy.clone(),
            });
        }
    }

    if config.face_system.enabled_count() == 0 {
        errors.push(ValidationError::NoFaces);
    }

    for entry in &config.authorizations.authorize {
        if entry.privileges.is_empty() {
            errors.push(ValidationError::EmptyAuthorization(entry.certfile.clone()));
        }
    }

    if let Some(propagate) = &config.rib.auto_prefix_propagate {
        if propagate.refresh_interval == 0 {
            errors.push(ValidationError::ZeroRefreshInterval);
        }
        if propagate.base_retry_wait > propagate.max_retry_wait {
            errors.push(ValidationError::RetryWaitOrder);
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigBootstrap;

    #[test]
    fn builtin_config_is_valid() {
        assert!(validate_config(&ConfigBootstrap::default_config()).is_ok());
    }

    #[test]
    fn name_validation() {
        assert!(is_valid_name("/"));
        assert!(is_valid_name("/localhost/nfd"));
        assert!(!is_valid_name("localhost"));
        assert!(!is_valid_name("/a//b"));
        assert!(!is_valid_name("/a/"));
    }

    #[test]
    fn collects_all_errors() {
        let mut config = ConfigBootstrap::default_config();
        config.tables.cs_max_packets = 0;
        config.face_system.tcp = None;
        config.face_system.udp = None;
        config.face_system.websocket = None;
        config
            .tables
            .strategy_choice
            .insert("/x".into(), "/other/strategy".into());

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 3);
        assert!(errors.contains(&ValidationError::ZeroContentStore));
        assert!(errors.contains(&ValidationError::NoFaces));
    }

    #[test]
    fn rejects_bad_propagation_timers() {
        let mut config = ConfigBootstrap::default_config();
        if let Some(propagate) = config.rib.auto_prefix_propagate.as_mut() {
            propagate.refresh_interval = 0;
            propagate.base_retry_wait = propagate.max_retry_wait + 1;
        }
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(
            errors,
            vec![
                ValidationError::ZeroRefreshInterval,
                ValidationError::RetryWaitOrder
            ]
        );
    }
}
