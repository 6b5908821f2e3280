//! Host-supplied startup parameters.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::observability::targets;

/// Key naming the directory used as `HOME` for a run.
pub const HOME_PATH_KEY: &str = "homePath";

/// Immutable string map handed over by the host on start.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StartupParameters(BTreeMap<String, String>);

impl StartupParameters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn with_home_path(self, path: impl AsRef<Path>) -> Self {
        self.with(HOME_PATH_KEY, path.as_ref().to_string_lossy())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn home_path(&self) -> Option<PathBuf> {
        self.get(HOME_PATH_KEY)
            .filter(|path| !path.is_empty())
            .map(PathBuf::from)
    }

    /// Copy parameters into the process environment.
    ///
    /// Must run before the runner is constructed: the key chain reads `HOME`
    /// during construction.
    pub fn apply_environment(&self) {
        match self.home_path() {
            Some(home) => {
                std::env::set_var("HOME", &home);
                tracing::info!(
                    target: targets::SERVICE,
                    "Use [{}] as a security storage",
                    home.display()
                );
            }
            None => {
                tracing::warn!(
                    target: targets::SERVICE,
                    "no {HOME_PATH_KEY} supplied, keeping HOME as is"
                );
            }
        }
    }
}

impl From<BTreeMap<String, String>> for StartupParameters {
    fn from(map: BTreeMap<String, String>) -> Self {
        Self(map)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for StartupParameters {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}
