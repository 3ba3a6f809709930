//! Settings store.
//!
//! Persisted user preferences. None of these change engine behaviour; they
//! flavour presentation (the primary hostname shown to clients) and the
//! update checker, which lives outside the core.

use crate::error::{DockgeacError, Result};
use crate::paths;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Persistent settings for dockgeac.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    /// Hostname reported to clients for service URLs. Empty means "derive".
    pub primary_hostname: String,
    pub check_update: bool,
    pub check_beta: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self { primary_hostname: String::new(), check_update: true, check_beta: false }
    }
}

impl Settings {
    /// Get the path to the settings file.
    pub fn default_path() -> PathBuf {
        paths::settings_path()
    }

    /// Load settings from disk, falling back to defaults when the file is missing.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .map_err(|e| DockgeacError::Io { path: path.to_path_buf(), source: e })?;
        serde_json::from_str(&content)
            .map_err(|e| DockgeacError::Internal(format!("Failed to parse settings: {}", e)))
    }

    /// Save settings to disk.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| DockgeacError::Io { path: parent.to_path_buf(), source: e })?;
        }
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| DockgeacError::Internal(format!("Failed to serialize settings: {}", e)))?;
        std::fs::write(path, content)
            .map_err(|e| DockgeacError::Io { path: path.to_path_buf(), source: e })
    }

    /// The hostname to present for this endpoint.
    ///
    /// Prefers the configured primary hostname, then the endpoint's host
    /// portion, then `localhost`.
    pub fn hostname_for(&self, endpoint: &str) -> String {
        if !self.primary_hostname.is_empty() {
            return self.primary_hostname.clone();
        }
        let host = endpoint.split(':').next().unwrap_or("");
        if host.is_empty() {
            "localhost".to_string()
        } else {
            host.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hostname_prefers_setting() {
        let settings =
            Settings { primary_hostname: "nas.local".to_string(), ..Default::default() };
        assert_eq!(settings.hostname_for("10.0.0.5:5001"), "nas.local");
    }

    #[test]
    fn test_hostname_derived_from_endpoint() {
        let settings = Settings::default();
        assert_eq!(settings.hostname_for("10.0.0.5:5001"), "10.0.0.5");
        assert_eq!(settings.hostname_for(""), "localhost");
    }

    #[test]
    fn test_settings_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");

        let settings = Settings {
            primary_hostname: "example.test".to_string(),
            check_update: false,
            check_beta: true,
        };
        settings.save(&path).unwrap();

        let loaded = Settings::load(&path).unwrap();
        assert_eq!(loaded.primary_hostname, "example.test");
        assert!(!loaded.check_update);
        assert!(loaded.check_beta);
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = Settings::load(&dir.path().join("nope.json")).unwrap();
        assert!(loaded.check_update);
    }
}
