//! Filesystem locations used by the update engine.
//!
//! Uses the [`dirs`] crate for platform-appropriate resolution.
//!
//! | Purpose | macOS | Linux |
//! |---------|-------|-------|
//! | Config | `~/Library/Application Support/hub-update/` | `~/.config/hub-update/` |
//! | Cache (downloads, lock) | `~/Library/Caches/hub-update/` | `~/.cache/hub-update/` |
//!
//! # Environment Overrides
//!
//! - `HUB_UPDATE_CONFIG_DIR`: overrides [`config_dir`]
//! - `HUB_UPDATE_CACHE_DIR`: overrides [`cache_dir`]

use std::path::PathBuf;

const APP_DIR: &str = "hub-update";

/// Configuration directory.
#[must_use]
pub fn config_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("HUB_UPDATE_CONFIG_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::config_dir()
        .map(|d| d.join(APP_DIR))
        .unwrap_or_else(|| std::env::temp_dir().join("hub-update-config"))
}

/// Cache directory. Downloaded packages and the update lock live here.
#[must_use]
pub fn cache_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("HUB_UPDATE_CACHE_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::cache_dir()
        .map(|d| d.join(APP_DIR))
        .unwrap_or_else(|| std::env::temp_dir().join("hub-update-cache"))
}

/// Default download directory (`cache_dir()/downloads/`).
#[must_use]
pub fn downloads_dir() -> PathBuf {
    cache_dir().join("downloads")
}

/// Main config file path (`config_dir()/config.toml`).
#[must_use]
pub fn config_file() -> PathBuf {
    config_dir().join("config.toml")
}

/// Update preferences file (`config_dir()/update-state.json`).
#[must_use]
pub fn state_file() -> PathBuf {
    config_dir().join("update-state.json")
}

/// Name of the lock file placed in the download directory.
pub const LOCK_FILE_NAME: &str = "update.lock";

/// Name of the backup directory inside an installation.
pub const BACKUP_DIR_NAME: &str = "backup";

/// Name of the updater log file inside an installation.
pub const UPDATER_LOG_NAME: &str = "updater.log";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_paths_hang_off_their_roots() {
        assert!(downloads_dir().starts_with(cache_dir()));
        assert!(config_file().starts_with(config_dir()));
        assert!(state_file().ends_with("update-state.json"));
    }
}
