//! Configuration for the update engine.

use crate::error::{Result, UpdateError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdateConfig {
    /// Release feed and selection policy.
    pub release: ReleaseConfig,
    /// Download behaviour.
    pub download: DownloadConfig,
    /// Handoff to the standalone updater.
    pub handoff: HandoffConfig,
}

/// Release feed settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReleaseConfig {
    /// URL returning a JSON array of releases (GitHub `releases` shape).
    pub feed_url: String,
    /// Substring that identifies this platform's asset (e.g. `"windows-amd64"`).
    pub platform: String,
    /// Consider pre-releases when selecting the upgrade target.
    pub include_prerelease: bool,
    /// How long a successful check result is reused.
    pub cache_ttl_hours: u64,
    /// Feed request timeout.
    pub timeout_secs: u64,
    /// Version of the running application.
    pub current_version: String,
}

impl Default for ReleaseConfig {
    fn default() -> Self {
        Self {
            feed_url: String::new(),
            platform: crate::platform::platform_identifier(),
            include_prerelease: false,
            cache_ttl_hours: 24,
            timeout_secs: 10,
            current_version: format!("v{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl ReleaseConfig {
    /// Cache TTL as a `Duration`.
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_hours.saturating_mul(3600))
    }
}

/// Download settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    /// Directory receiving `<asset>.tmp` and `<asset>`.
    pub dir: PathBuf,
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Fixed delay between attempts, in milliseconds.
    pub retry_delay_ms: u64,
    /// Whole-request timeout, in seconds.
    pub timeout_secs: u64,
    /// Optional proxy URL applied to every request.
    pub proxy: Option<String>,
    /// Minimum spacing between progress samples, in milliseconds.
    pub progress_interval_ms: u64,
    /// Expected SHA-256 of the package, checked before handoff when set.
    pub verify_sha256: Option<String>,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            dir: crate::paths::downloads_dir(),
            max_retries: 3,
            retry_delay_ms: 5_000,
            timeout_secs: 30 * 60,
            proxy: None,
            progress_interval_ms: 100,
            verify_sha256: None,
        }
    }
}

impl DownloadConfig {
    /// Retry delay as a `Duration`.
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Progress throttle interval as a `Duration`.
    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }
}

/// Handoff settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HandoffConfig {
    /// File name of the standalone updater next to the host executable.
    pub updater_name: String,
    /// Installation directory override. Defaults to the directory of the
    /// running executable.
    pub install_dir: Option<PathBuf>,
}

impl Default for HandoffConfig {
    fn default() -> Self {
        Self {
            updater_name: crate::platform::executable_name("hub-updater"),
            install_dir: None,
        }
    }
}

impl UpdateConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| UpdateError::Config(e.to_string()))
    }

    /// Load from `path` when it exists, defaults otherwise.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing file cannot be parsed.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.is_file() {
            Self::from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| UpdateError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Check values that would make the engine misbehave.
    ///
    /// # Errors
    ///
    /// Returns [`UpdateError::Config`] describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        if self.release.feed_url.trim().is_empty() {
            return Err(UpdateError::Config("release.feed_url is not set".to_owned()));
        }
        if self.release.platform.trim().is_empty() {
            return Err(UpdateError::Config("release.platform is empty".to_owned()));
        }
        if self.handoff.updater_name.trim().is_empty() {
            return Err(UpdateError::Config("handoff.updater_name is empty".to_owned()));
        }
        if let Some(proxy) = &self.download.proxy {
            parse_proxy(proxy)?;
        }
        Ok(())
    }
}

/// Proxy schemes the HTTP client can speak.
const PROXY_SCHEMES: &[&str] = &["http", "https"];

/// Parse a download proxy URL, rejecting schemes the client cannot use.
///
/// # Errors
///
/// Returns [`UpdateError::Config`] when the URL does not parse or its
/// scheme is unsupported.
pub fn parse_proxy(proxy: &str) -> Result<reqwest::Proxy> {
    let url = reqwest::Url::parse(proxy)
        .map_err(|e| UpdateError::Config(format!("invalid download.proxy {proxy}: {e}")))?;
    if !PROXY_SCHEMES.contains(&url.scheme()) {
        return Err(UpdateError::Config(format!(
            "unsupported download.proxy scheme {}: expected one of {}",
            url.scheme(),
            PROXY_SCHEMES.join(", ")
        )));
    }
    Ok(reqwest::Proxy::all(url)?)
}
