//! Per-stack lock store.
//!
//! One JSON file per stack records which containers the engine created for
//! it, the compose-content fingerprint, and the declared networks and
//! volumes. The store is a persistence artefact, not a mutex: writes are
//! atomic per file (`.tmp` + rename), and readers always see the latest
//! committed version or nothing.

use crate::error::{DockgeacError, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const LOCK_SUFFIX: &str = ".lock.json";

/// One container created for a service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockedService {
    pub container_name: String,
    pub image: String,
    /// ISO-8601 UTC creation time.
    pub created_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_id: Option<String>,
}

/// Persistent record of which containers belong to a stack.
///
/// If a record exists, the engine owns exactly the listed container names
/// and must not assume ownership of any other container, even one whose
/// name happens to match the prefix convention.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockRecord {
    pub stack_name: String,
    /// sha256 hex of the compose text this deploy was built from.
    pub fingerprint: String,
    pub services: BTreeMap<String, LockedService>,
    #[serde(default)]
    pub networks: Vec<String>,
    #[serde(default)]
    pub volumes: Vec<String>,
    /// ISO-8601 UTC time of the last deploy.
    pub last_deployed: String,
}

impl LockRecord {
    /// All container names owned by this record.
    pub fn container_names(&self) -> Vec<String> {
        self.services.values().map(|s| s.container_name.clone()).collect()
    }
}

/// Store of per-stack lock files under a single directory.
pub struct LockStore {
    dir: PathBuf,
}

impl LockStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Read a stack's record. Missing or corrupt files return `None`.
    pub fn read(&self, stack_name: &str) -> Option<LockRecord> {
        let path = self.lock_path(stack_name);
        let content = std::fs::read_to_string(&path).ok()?;
        match serde_json::from_str(&content) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(stack = %stack_name, error = %e, "Ignoring corrupt lock file");
                None
            }
        }
    }

    /// Write a stack's record atomically (`.tmp` + rename).
    pub fn write(&self, stack_name: &str, record: &LockRecord) -> Result<()> {
        std::fs::create_dir_all(&self.dir)
            .map_err(|e| DockgeacError::Io { path: self.dir.clone(), source: e })?;

        let path = self.lock_path(stack_name);
        let tmp = path.with_extension("json.tmp");

        let content = serde_json::to_string_pretty(record)
            .map_err(|e| DockgeacError::Internal(format!("Failed to serialize lock: {}", e)))?;
        std::fs::write(&tmp, content)
            .map_err(|e| DockgeacError::Io { path: tmp.clone(), source: e })?;
        std::fs::rename(&tmp, &path)
            .map_err(|e| DockgeacError::Io { path: path.clone(), source: e })?;

        debug!(stack = %stack_name, path = %path.display(), "Wrote lock record");
        Ok(())
    }

    /// Delete a stack's record. Deleting a missing record is not an error.
    pub fn delete(&self, stack_name: &str) -> Result<()> {
        let path = self.lock_path(stack_name);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(DockgeacError::Io { path, source: e }),
        }
    }

    pub fn exists(&self, stack_name: &str) -> bool {
        self.lock_path(stack_name).exists()
    }

    /// Names of every stack with a lock file.
    pub fn list_all(&self) -> Vec<String> {
        let Ok(entries) = std::fs::read_dir(&self.dir) else {
            return Vec::new();
        };
        let mut names: Vec<String> = entries
            .flatten()
            .filter_map(|entry| {
                let name = entry.file_name().to_string_lossy().to_string();
                name.strip_suffix(LOCK_SUFFIX).map(str::to_string)
            })
            .collect();
        names.sort();
        names
    }

    /// sha256 hex of the compose text; detects drift between the on-disk
    /// compose and the deployed containers.
    pub fn fingerprint(text: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(text.as_bytes());
        hex_encode(&hasher.finalize())
    }

    /// Has the compose text changed since the recorded deploy?
    pub fn has_changed(&self, stack_name: &str, text: &str) -> bool {
        match self.read(stack_name) {
            Some(record) => record.fingerprint != Self::fingerprint(text),
            None => true,
        }
    }

    fn lock_path(&self, stack_name: &str) -> PathBuf {
        self.dir.join(format!("{}{}", stack_name, LOCK_SUFFIX))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push_str(&format!("{:02x}", b));
    }
    out
}
