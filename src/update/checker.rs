//! Release feed checker.
//!
//! Fetches the release list, picks the highest eligible version, compares it
//! against the running version and selects this platform's asset. Results
//! are cached for `cache_ttl_hours`; when the feed is unreachable or rate
//! limited the last cached result is returned instead.

use crate::config::ReleaseConfig;
use crate::error::{Result, UpdateError};
use crate::version::{self, PrereleaseType, Version};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// A release entry from the feed.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Release {
    /// Tag name (e.g. `"v1.2.0"`).
    pub tag_name: String,
    /// Display name.
    pub name: String,
    /// Release notes.
    pub body: String,
    /// Draft releases are never offered.
    pub draft: bool,
    /// Marked as pre-release by the publisher.
    pub prerelease: bool,
    /// RFC3339 publication time.
    pub published_at: String,
    /// Downloadable files.
    pub assets: Vec<Asset>,
}

/// A downloadable file attached to a release.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Asset {
    /// File name (e.g. `"app-windows-amd64.zip"`).
    pub name: String,
    /// Size in bytes.
    pub size: u64,
    /// Direct download URL.
    pub browser_download_url: String,
}

/// Outcome of an update check. Read-only to callers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateInfo {
    /// `latest_version` orders after `current_version`.
    pub has_update: bool,
    /// Version of the running application.
    pub current_version: String,
    /// Tag of the selected release.
    pub latest_version: String,
    /// Release notes of the selected release.
    pub release_notes: String,
    /// Publication time, when the feed value parses.
    pub published_at: Option<DateTime<Utc>>,
    /// Platform asset URL; empty when no asset matches this platform.
    #[serde(rename = "downloadURL")]
    pub download_url: String,
    /// Platform asset file name; empty when no asset matches.
    pub asset_name: String,
    /// Platform asset size in bytes.
    pub size: u64,
    /// The selected release is a pre-release.
    pub is_prerelease: bool,
    /// Kind of pre-release (`""` for stable).
    pub prerelease_type: PrereleaseType,
}

impl UpdateInfo {
    /// An update exists and there is something to download for this platform.
    pub fn is_installable(&self) -> bool {
        self.has_update && !self.download_url.is_empty()
    }
}

#[derive(Debug, Clone)]
struct CachedCheck {
    info: UpdateInfo,
    checked_at: Instant,
}

/// Checks the release feed for a newer version.
pub struct ReleaseChecker {
    config: ReleaseConfig,
    client: reqwest::Client,
    cache: RwLock<Option<CachedCheck>>,
}

impl ReleaseChecker {
    /// Create a checker with its own HTTP client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: ReleaseConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("hub-update/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            config,
            client,
            cache: RwLock::new(None),
        })
    }

    /// Returns the checker configuration.
    pub fn config(&self) -> &ReleaseConfig {
        &self.config
    }

    /// Last successful result, regardless of age.
    pub fn cached(&self) -> Option<UpdateInfo> {
        let guard = self.cache.read().unwrap_or_else(|e| e.into_inner());
        guard.as_ref().map(|c| c.info.clone())
    }

    /// Drop the cached result so the next check hits the feed.
    pub fn invalidate_cache(&self) {
        let mut guard = self.cache.write().unwrap_or_else(|e| e.into_inner());
        *guard = None;
    }

    fn fresh_cached(&self) -> Option<UpdateInfo> {
        let ttl = self.config.cache_ttl();
        let guard = self.cache.read().unwrap_or_else(|e| e.into_inner());
        guard
            .as_ref()
            .filter(|c| c.checked_at.elapsed() < ttl)
            .map(|c| c.info.clone())
    }

    /// Check the feed for an update.
    ///
    /// # Errors
    ///
    /// Returns the fetch error when there is no cached result to fall back
    /// on, a feed decode error, or [`UpdateError::NoRelease`] when nothing
    /// in the feed satisfies the selection policy.
    pub async fn check_for_updates(&self) -> Result<UpdateInfo> {
        if let Some(info) = self.fresh_cached() {
            info!(latest = %info.latest_version, "using cached update check result");
            return Ok(info);
        }

        info!(feed = %self.config.feed_url, "checking for updates");
        let releases = match self.fetch_releases().await {
            Ok(releases) => releases,
            Err(e) if e.is_rate_limited() => {
                if let Some(cached) = self.cached() {
                    warn!(error = %e, "release feed unavailable, returning cached result");
                    return Ok(cached);
                }
                warn!(error = %e, "release feed unavailable and nothing cached");
                return Err(e);
            }
            Err(e) => return Err(e),
        };

        let info = evaluate_releases(&releases, &self.config)?;
        info!(
            current = %info.current_version,
            latest = %info.latest_version,
            has_update = info.has_update,
            "update check complete"
        );

        let mut guard = self.cache.write().unwrap_or_else(|e| e.into_inner());
        *guard = Some(CachedCheck {
            info: info.clone(),
            checked_at: Instant::now(),
        });
        Ok(info)
    }

    /// Fetch the feed and drop draft entries.
    async fn fetch_releases(&self) -> Result<Vec<Release>> {
        let resp = self
            .client
            .get(&self.config.feed_url)
            .header(reqwest::header::ACCEPT, "application/vnd.github+json")
            .send()
            .await?;

        let status = resp.status();
        if status != reqwest::StatusCode::OK {
            return Err(UpdateError::Status {
                status: status.as_u16(),
                url: self.config.feed_url.clone(),
            });
        }

        let body = resp.text().await?;
        let releases: Vec<Release> =
            serde_json::from_str(&body).map_err(|e| UpdateError::Feed(e.to_string()))?;
        let total = releases.len();
        let releases: Vec<Release> = releases.into_iter().filter(|r| !r.draft).collect();
        debug!(total, published = releases.len(), "release feed fetched");
        Ok(releases)
    }

    /// Run [`check_for_updates`](Self::check_for_updates) every `interval`
    /// until `cancel` fires. The first check runs immediately. Failures are
    /// logged, never propagated.
    pub fn spawn_background_check(
        self: Arc<Self>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        info!(interval_secs = interval.as_secs(), "starting background update check");
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = self.check_for_updates().await {
                            warn!(error = %e, "background update check failed");
                        }
                    }
                }
            }
            debug!("background update check stopped");
        })
    }
}

/// Turn a (draft-free) release list into an [`UpdateInfo`] for `config`.
///
/// # Errors
///
/// Returns [`UpdateError::NoRelease`] when no release is eligible.
pub fn evaluate_releases(releases: &[Release], config: &ReleaseConfig) -> Result<UpdateInfo> {
    let (release, selected) =
        select_release(releases, config.include_prerelease).ok_or(UpdateError::NoRelease)?;

    let has_update = version::is_newer(&release.tag_name, &config.current_version);

    let (asset_name, download_url, size) = match find_platform_asset(&release.assets, &config.platform)
    {
        Some(asset) => (
            asset.name.clone(),
            asset.browser_download_url.clone(),
            asset.size,
        ),
        None => {
            warn!(
                platform = %config.platform,
                tag = %release.tag_name,
                "no release asset for this platform"
            );
            (String::new(), String::new(), 0)
        }
    };

    let published_at = match DateTime::parse_from_rfc3339(&release.published_at) {
        Ok(t) => Some(t.with_timezone(&Utc)),
        Err(e) => {
            warn!(value = %release.published_at, error = %e, "unparseable published_at");
            None
        }
    };

    Ok(UpdateInfo {
        has_update,
        current_version: config.current_version.clone(),
        latest_version: release.tag_name.clone(),
        release_notes: release.body.clone(),
        published_at,
        download_url,
        asset_name,
        size,
        is_prerelease: release.prerelease || selected.is_prerelease(),
        prerelease_type: selected.prerelease_type(),
    })
}

/// Pick the highest non-draft release whose tag parses. Pre-releases (by
/// flag or by tag) are only eligible when `include_prerelease` is set.
pub fn select_release(releases: &[Release], include_prerelease: bool) -> Option<(&Release, Version)> {
    let mut best: Option<(&Release, Version)> = None;
    for release in releases.iter().filter(|r| !r.draft) {
        let Ok(parsed) = Version::parse(&version::normalize(&release.tag_name)) else {
            debug!(tag = %release.tag_name, "skipping release with unparseable tag");
            continue;
        };
        if !include_prerelease && (release.prerelease || parsed.is_prerelease()) {
            continue;
        }
        if best.as_ref().is_none_or(|(_, b)| parsed > *b) {
            best = Some((release, parsed));
        }
    }
    best
}

/// Find the asset for `platform` by substring match on the asset name.
///
/// Independent of input order: among matching assets the
/// lexicographically smallest name wins.
pub fn find_platform_asset<'a>(assets: &'a [Asset], platform: &str) -> Option<&'a Asset> {
    if platform.is_empty() {
        return None;
    }
    assets
        .iter()
        .filter(|a| a.name.contains(platform))
        .min_by(|a, b| a.name.cmp(&b.name))
}
