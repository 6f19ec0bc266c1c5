//! hub-update: self-update engine.
//!
//! Detects a newer release, downloads it over an unreliable network and
//! swaps the installed executable for the new one without corrupting the
//! installation.
//!
//! # Architecture
//!
//! - **Release check** ([`update::ReleaseChecker`]): reads the release feed,
//!   picks the upgrade target and this platform's asset, caches the result
//! - **Download** ([`update::Downloader`]): resumable, retried transfer with
//!   throttled progress samples
//! - **Handoff** ([`update::Installer`]): stages and launches the detached
//!   updater, then tells the host to exit
//! - **Updater** ([`updater::Updater`]): waits for the host to exit, then
//!   extracts, backs up, replaces and relaunches, rolling back on failure
//!
//! The host and updater share nothing but the updater's command line.

pub mod config;
pub mod error;
pub mod paths;
pub mod platform;
pub mod progress;
pub mod update;
pub mod updater;
pub mod version;

pub use config::UpdateConfig;
pub use error::{Result, UpdateError};
pub use progress::{ProgressCallback, ProgressSample};
pub use update::{HandoffOutcome, UpdateInfo, UpdateService};
pub use version::Version;
