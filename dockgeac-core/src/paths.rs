//! Centralized path configuration for dockgeac.
//!
//! All data paths should go through this module to ensure consistency
//! between daemon and tooling, whether running as user or system service.

use std::path::PathBuf;

/// Get the dockgeac data directory.
///
/// Resolution order:
/// 1. `DOCKGEAC_DATA_DIR` environment variable
/// 2. `/var/lib/dockgeac` if it exists (system install)
/// 3. `~/.dockgeac` for user-only installs
pub fn data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("DOCKGEAC_DATA_DIR") {
        return PathBuf::from(dir);
    }

    let system_dir = PathBuf::from("/var/lib/dockgeac");
    if system_dir.exists() {
        return system_dir;
    }

    dirs::home_dir().map(|h| h.join(".dockgeac")).unwrap_or(system_dir)
}

/// Get the stacks directory (one subdirectory per stack, holding the compose file and `.env`).
pub fn stacks_dir() -> PathBuf {
    data_dir().join("stacks")
}

/// Get the locks directory (one `<stack>.lock.json` per deployed stack).
pub fn locks_dir() -> PathBuf {
    data_dir().join("locks")
}

/// Get the settings file path.
pub fn settings_path() -> PathBuf {
    data_dir().join("settings.json")
}
