//! Host-side update flow.
//!
//! Checks the release feed for a newer version, downloads the platform
//! package with resume and retry, and hands off to the standalone updater
//! (see [`crate::updater`]) which replaces the installation after the host
//! exits.

pub mod checker;
pub mod download;
pub mod handoff;
pub mod integrity;
pub mod lock;
pub mod service;
pub mod state;

pub use checker::{Asset, Release, ReleaseChecker, UpdateInfo, find_platform_asset};
pub use download::Downloader;
pub use handoff::{HandoffOutcome, HandoffParameters, Installer};
pub use lock::UpdateLock;
pub use service::UpdateService;
pub use state::UpdateState;
