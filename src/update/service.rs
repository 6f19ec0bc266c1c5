//! Update flow façade.
//!
//! [`UpdateService`] wires the checker, downloader and installer together.
//! [`UpdateService::update_to_latest`] holds the [`UpdateLock`] for the
//! whole check → download → handoff flow; [`UpdateService::begin_update`]
//! takes an already checked [`UpdateInfo`] and locks download → handoff.

use crate::config::UpdateConfig;
use crate::error::{Result, UpdateError};
use crate::update::checker::{ReleaseChecker, UpdateInfo};
use crate::update::download::Downloader;
use crate::update::handoff::{HandoffOutcome, Installer};
use crate::update::lock::UpdateLock;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Composes the update components. Construct once and share.
pub struct UpdateService {
    checker: Arc<ReleaseChecker>,
    downloader: Arc<Downloader>,
    installer: Installer,
    expected_sha256: Option<String>,
}

impl UpdateService {
    /// Build from explicitly constructed components.
    pub fn new(checker: Arc<ReleaseChecker>, downloader: Arc<Downloader>, installer: Installer) -> Self {
        Self {
            checker,
            downloader,
            installer,
            expected_sha256: None,
        }
    }

    /// Build every component from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or a component
    /// cannot be constructed.
    pub fn from_config(config: &UpdateConfig) -> Result<Self> {
        config.validate()?;
        let checker = Arc::new(ReleaseChecker::new(config.release.clone())?);
        let downloader = Arc::new(Downloader::new(&config.download)?);
        let installer = Installer::new(&config.handoff)?;
        Ok(Self::new(checker, downloader, installer)
            .with_expected_sha256(config.download.verify_sha256.clone()))
    }

    /// Require the package to match this SHA-256 before handoff.
    pub fn with_expected_sha256(mut self, hex: Option<String>) -> Self {
        self.expected_sha256 = hex;
        self
    }

    /// The release checker.
    pub fn checker(&self) -> &Arc<ReleaseChecker> {
        &self.checker
    }

    /// The downloader.
    pub fn downloader(&self) -> &Arc<Downloader> {
        &self.downloader
    }

    /// Check the feed (cached for the configured TTL).
    ///
    /// # Errors
    ///
    /// See [`ReleaseChecker::check_for_updates`].
    pub async fn check(&self) -> Result<UpdateInfo> {
        self.checker.check_for_updates().await
    }

    /// Download the package described by `info`, verifying its hash when
    /// one is configured.
    ///
    /// # Errors
    ///
    /// Returns [`UpdateError::Handoff`] when `info` has nothing to install,
    /// otherwise any download or hash error.
    pub async fn download(&self, info: &UpdateInfo) -> Result<PathBuf> {
        if !info.is_installable() {
            return Err(UpdateError::Handoff(format!(
                "nothing to install for {} (has_update={}, asset={:?})",
                info.latest_version, info.has_update, info.asset_name
            )));
        }
        let path = self
            .downloader
            .download(&info.download_url, &info.asset_name)
            .await?;
        if let Some(expected) = &self.expected_sha256 {
            self.downloader.verify_hash(&path, expected).await?;
        }
        Ok(path)
    }

    /// Run download → handoff under the update lock.
    ///
    /// On success the caller must terminate the host process.
    ///
    /// # Errors
    ///
    /// Returns [`UpdateError::Locked`] when another flow is running, or the
    /// first download, hash or handoff error.
    pub async fn begin_update(&self, info: &UpdateInfo) -> Result<HandoffOutcome> {
        let _lock = UpdateLock::acquire(self.downloader.dir())?;
        self.download_and_install(info).await
    }

    /// Run check → download → handoff under the update lock.
    ///
    /// On success the caller must terminate the host process.
    ///
    /// # Errors
    ///
    /// Returns [`UpdateError::Locked`] before touching the feed when another
    /// flow is running, [`UpdateError::Handoff`] when there is nothing to
    /// install, or the first check, download, hash or handoff error.
    pub async fn update_to_latest(&self) -> Result<HandoffOutcome> {
        let _lock = UpdateLock::acquire(self.downloader.dir())?;
        let info = self.check().await?;
        self.download_and_install(&info).await
    }

    async fn download_and_install(&self, info: &UpdateInfo) -> Result<HandoffOutcome> {
        info!(version = %info.latest_version, "beginning update");
        let package = self.download(info).await?;
        self.installer.install(&package)
    }

    /// Periodic background checks until `cancel` fires.
    pub fn spawn_background_check(&self, interval: Duration, cancel: CancellationToken) -> JoinHandle<()> {
        Arc::clone(&self.checker).spawn_background_check(interval, cancel)
    }
}
