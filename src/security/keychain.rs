//! Key chain rooted at the user's home directory.
//!
//! # Responsibilities
//! - Resolve the identity store under `$HOME/.ndn`
//! - Create a default identity on first use
//! - Reject malformed identity material with a typed error
//!
//! # Design Decisions
//! - `$HOME` is read when the key chain is opened, never cached, so the host can
//!   point every run at a different storage location
//! - The store is a single JSON document; key bytes are hex encoded

use std::fs;
use std::path::{Path, PathBuf};

use rand::RngCore;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::config::validation::is_valid_name;
use crate::observability::targets;

/// Identity created when the store is empty.
pub const DEFAULT_IDENTITY: &str = "/localhost/daemons/nfd";

const STORE_DIR: &str = ".ndn";
const STORE_FILE: &str = "ndnsec-key.json";
const KEY_LEN: usize = 32;

/// Error type for key chain access.
#[derive(Debug, Error)]
pub enum KeyChainError {
    #[error("HOME is not set; cannot locate the key chain")]
    HomeUnset,
    #[error("key chain I/O failed at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed key chain at {path}: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid identity in {path}: {reason}")]
    InvalidIdentity { path: PathBuf, reason: String },
}

/// On-disk form of the default identity.
#[derive(Debug, Serialize, Deserialize)]
struct StoredKey {
    identity: String,
    key_id: String,
    key: String,
    created: u64,
}

/// The daemon's signing identity.
#[derive(Clone)]
pub struct Identity {
    name: String,
    key_id: String,
    key: Vec<u8>,
}

impl Identity {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    pub fn key_len(&self) -> usize {
        self.key.len()
    }

    /// Name of the certificate for this key.
    pub fn certificate_name(&self) -> String {
        format!("{}/KEY/{}", self.name, self.key_id)
    }
}

impl std::fmt::Debug for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Identity")
            .field("name", &self.name)
            .field("key_id", &self.key_id)
            .field("key", &"<redacted>")
            .finish()
    }
}

/// Key chain opened from a storage root.
#[derive(Debug)]
pub struct KeyChain {
    store: PathBuf,
    identity: Identity,
}

impl KeyChain {
    /// Open the key chain under the current `$HOME`.
    pub fn from_env() -> Result<Self, KeyChainError> {
        let home = std::env::var_os("HOME")
            .filter(|home| !home.is_empty())
            .ok_or(KeyChainError::HomeUnset)?;
        Self::open(Path::new(&home))
    }

    /// Open the key chain under `home`, creating the default identity if needed.
    pub fn open(home: &Path) -> Result<Self, KeyChainError> {
        let dir = home.join(STORE_DIR);
        let store = dir.join(STORE_FILE);

        let identity = if store.exists() {
            let identity = read_identity(&store)?;
            tracing::debug!(
                target: targets::KEY_CHAIN,
                identity = identity.name(),
                path = %store.display(),
                "loaded identity"
            );
            identity
        } else {
            fs::create_dir_all(&dir).map_err(|source| KeyChainError::Io {
                path: dir.clone(),
                source,
            })?;
            let identity = create_identity(&store)?;
            tracing::info!(
                target: targets::KEY_CHAIN,
                identity = identity.name(),
                path = %store.display(),
                "created default identity"
            );
            identity
        };

        Ok(Self { store, identity })
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn into_identity(self) -> Identity {
        self.identity
    }

    /// Path of the identity store.
    pub fn store_path(&self) -> &Path {
        &self.store
    }
}

fn read_identity(path: &Path) -> Result<Identity, KeyChainError> {
    let content = fs::read_to_string(path).map_err(|source| KeyChainError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let stored: StoredKey =
        serde_json::from_str(&content).map_err(|source| KeyChainError::Malformed {
            path: path.to_path_buf(),
            source,
        })?;

    let invalid = |reason: String| KeyChainError::InvalidIdentity {
        path: path.to_path_buf(),
        reason,
    };

    if !is_valid_name(&stored.identity) || stored.identity == "/" {
        return Err(invalid(format!("'{}' is not an identity name", stored.identity)));
    }
    if stored.key_id.is_empty() {
        return Err(invalid("empty key id".into()));
    }
    let key = decode_hex(&stored.key).ok_or_else(|| invalid("key is not hex".into()))?;
    if key.len() != KEY_LEN {
        return Err(invalid(format!("key is {} bytes, expected {KEY_LEN}", key.len())));
    }

    Ok(Identity {
        name: stored.identity,
        key_id: stored.key_id,
        key,
    })
}

fn create_identity(path: &Path) -> Result<Identity, KeyChainError> {
    let mut key = vec![0u8; KEY_LEN];
    rand::thread_rng().fill_bytes(&mut key);

    let identity = Identity {
        name: DEFAULT_IDENTITY.to_string(),
        key_id: Uuid::new_v4().simple().to_string(),
        key,
    };
    let stored = StoredKey {
        identity: identity.name.clone(),
        key_id: identity.key_id.clone(),
        key: encode_hex(&identity.key),
        created: std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|elapsed| elapsed.as_secs())
            .unwrap_or_default(),
    };

    let content = serde_json::to_string_pretty(&stored).map_err(|source| KeyChainError::Malformed {
        path: path.to_path_buf(),
        source,
    })?;
    fs::write(path, content).map_err(|source| KeyChainError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(identity)
}

fn encode_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|byte| format!("{byte:02x}")).collect()
}

fn decode_hex(text: &str) -> Option<Vec<u8>> {
    if text.len() % 2 != 0 || !text.is_ascii() {
        return None;
    }
    (0..text.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&text[i..i + 2], 16).ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_open_creates_identity() {
        let home = tempfile::tempdir().unwrap();
        let keychain = KeyChain::open(home.path()).unwrap();

        assert_eq!(keychain.identity().name(), DEFAULT_IDENTITY);
        assert_eq!(keychain.identity().key_len(), KEY_LEN);
        assert!(keychain.store_path().starts_with(home.path().join(".ndn")));
        assert!(keychain.store_path().exists());
    }

    #[test]
    fn reopen_returns_same_identity() {
        let home = tempfile::tempdir().unwrap();
        let first = KeyChain::open(home.path()).unwrap().into_identity();
        let second = KeyChain::open(home.path()).unwrap().into_identity();

        assert_eq!(first.key_id(), second.key_id());
        assert_eq!(first.certificate_name(), second.certificate_name());
        assert!(first
            .certificate_name()
            .starts_with("/localhost/daemons/nfd/KEY/"));
    }

    #[test]
    fn garbage_store_is_malformed() {
        let home = tempfile::tempdir().unwrap();
        fs::create_dir_all(home.path().join(STORE_DIR)).unwrap();
        fs::write(home.path().join(STORE_DIR).join(STORE_FILE), "not json").unwrap();

        assert!(matches!(
            KeyChain::open(home.path()),
            Err(KeyChainError::Malformed { .. })
        ));
    }

    #[test]
    fn bad_key_is_invalid_identity() {
        let home = tempfile::tempdir().unwrap();
        fs::create_dir_all(home.path().join(STORE_DIR)).unwrap();
        let stored = r#"{"identity":"/localhost/daemons/nfd","key_id":"k1","key":"abcd","created":0}"#;
        fs::write(home.path().join(STORE_DIR).join(STORE_FILE), stored).unwrap();

        let err = KeyChain::open(home.path()).unwrap_err();
        assert!(matches!(err, KeyChainError::InvalidIdentity { .. }));
        assert!(err.to_string().contains("expected 32"));
    }

    #[test]
    fn debug_redacts_key() {
        let home = tempfile::tempdir().unwrap();
        let identity = KeyChain::open(home.path()).unwrap().into_identity();
        let debug = format!("{identity:?}");
        assert!(debug.contains("<redacted>"));
        assert!(!debug.contains(&encode_hex(&identity.key)));
    }

    #[test]
    fn hex_decoding() {
        assert_eq!(decode_hex("00ff10"), Some(vec![0x00, 0xff, 0x10]));
        assert_eq!(decode_hex("abc"), None);
        assert_eq!(decode_hex("zz"), None);
    }
}
