//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tempfile::TempDir;

/// Serializes tests that touch process environment (`HOME`).
pub fn env_lock() -> MutexGuard<'static, ()> {
    static LOCK: Mutex<()> = Mutex::new(());
    LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Poll `condition` until it holds or `timeout` elapses.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}

/// Fresh directory to use as HOME.
pub fn temp_home() -> TempDir {
    tempfile::Builder::new()
        .prefix("nfd-home")
        .tempdir()
        .unwrap()
}

/// Plant identity material the key chain must reject.
pub fn write_invalid_identity(home: &Path) {
    let dir = home.join(".ndn");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("ndnsec-key.json"), "{ not an identity").unwrap();
}

pub const TIMEOUT: Duration = Duration::from_secs(10);
