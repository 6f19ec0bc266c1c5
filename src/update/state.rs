//! Persisted update preferences.
//!
//! Tracks the last check time, whether background checks are enabled and a
//! release the user chose to skip. Stored as JSON at
//! [`paths::state_file`](crate::paths::state_file).

use crate::error::{Result, UpdateError};
use crate::version;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// Persistent update state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdateState {
    /// Run background checks.
    pub auto_check: bool,
    /// Time of the last completed check.
    pub last_check: Option<DateTime<Utc>>,
    /// Release the user dismissed; it is not offered again.
    pub skipped_version: Option<String>,
    /// Free-form note recorded with the skip.
    pub skip_reason: Option<String>,
}

impl Default for UpdateState {
    fn default() -> Self {
        Self {
            auto_check: true,
            last_check: None,
            skipped_version: None,
            skip_reason: None,
        }
    }
}

impl UpdateState {
    /// Load from the default state file.
    pub fn load() -> Self {
        Self::load_from(&crate::paths::state_file())
    }

    /// Load state from `path`. A missing or unreadable file yields defaults.
    pub fn load_from(path: &Path) -> Self {
        let bytes = match std::fs::read(path) {
            Ok(b) => b,
            Err(_) => return Self::default(),
        };
        match serde_json::from_slice(&bytes) {
            Ok(state) => state,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "ignoring unreadable update state");
                Self::default()
            }
        }
    }

    /// Persist to the default state file.
    ///
    /// # Errors
    ///
    /// See [`save_to`](Self::save_to).
    pub fn save(&self) -> Result<()> {
        self.save_to(&crate::paths::state_file())
    }

    /// Persist to `path`, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or file cannot be written.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| UpdateError::Config(format!("cannot serialize update state: {e}")))?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Record a check at the current time.
    pub fn mark_checked(&mut self) {
        self.last_check = Some(Utc::now());
    }

    /// `true` when no check is recorded or the last one is at least
    /// `hours` old.
    pub fn check_is_stale(&self, hours: u64) -> bool {
        let Some(last) = self.last_check else {
            return true;
        };
        let elapsed = Utc::now().signed_duration_since(last);
        elapsed.num_hours() >= i64::try_from(hours).unwrap_or(i64::MAX)
    }

    /// Dismiss `version` so it is no longer offered.
    pub fn skip(&mut self, version: &str, reason: Option<String>) {
        self.skipped_version = Some(version.trim().to_owned());
        self.skip_reason = reason;
    }

    /// Forget a previous skip.
    pub fn clear_skip(&mut self) {
        self.skipped_version = None;
        self.skip_reason = None;
    }

    /// Whether `version` was dismissed. `v1.2.0` and `1.2.0` are the same.
    pub fn is_skipped(&self, version: &str) -> bool {
        self.skipped_version
            .as_deref()
            .is_some_and(|s| version::normalize(s) == version::normalize(version))
    }
}
