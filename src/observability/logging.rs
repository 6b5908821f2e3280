//! Structured logging.
//!
//! # Responsibilities
//! - Install the process-wide tracing subscriber
//! - Translate the config `log` section into filter directives
//! - Swap the active filter when a run starts
//!
//! # Design Decisions
//! - Uses tracing + tracing-subscriber with a reloadable EnvFilter
//! - `RUST_LOG`, when set at init, wins over the config for the whole process
//! - Applying a config before `init()` is a no-op, so library users keep their own subscriber

use std::sync::OnceLock;

use thiserror::Error;
use tracing_subscriber::{
    filter::ParseError, fmt, layer::SubscriberExt, reload, util::SubscriberInitExt, EnvFilter,
    Registry,
};

use crate::config::LogConfig;

type FilterHandle = reload::Handle<EnvFilter, Registry>;

struct Installed {
    handle: FilterHandle,
    env_override: bool,
}

static INSTALLED: OnceLock<Installed> = OnceLock::new();

/// Error type for logging setup.
#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("invalid log filter '{directives}': {source}")]
    Filter {
        directives: String,
        #[source]
        source: ParseError,
    },
    #[error("failed to install log subscriber: {0}")]
    Install(#[from] tracing_subscriber::util::TryInitError),
    #[error("failed to reload log filter: {0}")]
    Reload(#[from] reload::Error),
}

/// Build EnvFilter directives for a `log` section.
///
/// The default level comes first, followed by one `Module=level` directive per
/// configured module.
pub fn directives(log: &LogConfig) -> String {
    let mut parts = vec![log.default_level.as_directive().to_string()];
    for (module, level) in &log.modules {
        parts.push(format!("{module}={}", level.as_directive()));
    }
    parts.join(",")
}

fn parse(directives: &str) -> Result<EnvFilter, LoggingError> {
    EnvFilter::try_new(directives).map_err(|source| LoggingError::Filter {
        directives: directives.to_string(),
        source,
    })
}

/// Install the global subscriber with the given fallback directives.
pub fn init(default_directives: &str) -> Result<(), LoggingError> {
    let (filter, env_override) = match EnvFilter::try_from_default_env() {
        Ok(filter) => (filter, true),
        Err(_) => (parse(default_directives)?, false),
    };

    let (layer, handle) = reload::Layer::new(filter);
    tracing_subscriber::registry()
        .with(layer)
        .with(fmt::layer().with_target(true))
        .try_init()?;

    let _ = INSTALLED.set(Installed {
        handle,
        env_override,
    });
    Ok(())
}

/// Apply a `log` section to the installed subscriber.
///
/// Returns `Ok(false)` when nothing was changed (no subscriber installed by
/// this module, or `RUST_LOG` took precedence).
pub fn apply(log: &LogConfig) -> Result<bool, LoggingError> {
    let Some(installed) = INSTALLED.get() else {
        return Ok(false);
    };
    if installed.env_override {
        return Ok(false);
    }

    let filter = parse(&directives(log))?;
    installed.handle.reload(filter)?;
    Ok(true)
}
