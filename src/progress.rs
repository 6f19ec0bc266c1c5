//! Download progress reporting.
//!
//! The downloader emits [`ProgressSample`]s through a [`ProgressCallback`],
//! which keeps the transfer logic independent of the presentation layer
//! (an `indicatif` bar in the CLI, an event bus in an embedding UI).

use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A single progress observation. Transient, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSample {
    /// Bytes on disk so far, including any resumed prefix.
    pub downloaded_bytes: u64,
    /// Expected total size; `0` when the server did not say.
    pub total_bytes: u64,
    /// Average transfer rate since the last sample.
    pub bytes_per_second: u64,
    /// Human-readable time remaining.
    pub eta_formatted: String,
    /// URL being downloaded.
    pub source_url: String,
}

impl ProgressSample {
    /// Completion percentage in `0.0..=100.0`; `0.0` when the total is unknown.
    pub fn percentage(&self) -> f64 {
        if self.total_bytes == 0 {
            return 0.0;
        }
        (self.downloaded_bytes as f64 / self.total_bytes as f64 * 100.0).min(100.0)
    }

    /// The notification payload handed to an embedding application:
    /// `{percentage, downloaded, total, speed, eta, url}`.
    pub fn notification(&self) -> ProgressNotification {
        ProgressNotification {
            percentage: self.percentage(),
            downloaded: self.downloaded_bytes,
            total: self.total_bytes,
            speed: self.bytes_per_second,
            eta: self.eta_formatted.clone(),
            url: self.source_url.clone(),
        }
    }
}

/// Wire shape of a progress event for UI layers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressNotification {
    /// Completion percentage.
    pub percentage: f64,
    /// Bytes downloaded.
    pub downloaded: u64,
    /// Total bytes.
    pub total: u64,
    /// Bytes per second.
    pub speed: u64,
    /// Formatted ETA.
    pub eta: String,
    /// Source URL.
    pub url: String,
}

/// Callback type for receiving progress samples.
///
/// Shared with the transfer task, hence `Arc` rather than `Box`.
pub type ProgressCallback = Arc<dyn Fn(ProgressSample) + Send + Sync>;

/// Throttles progress samples and computes speed/ETA.
///
/// `observe` is called after every chunk written; it returns a sample at
/// most once per `interval`.
#[derive(Debug)]
pub(crate) struct ProgressThrottle {
    interval: Duration,
    total: u64,
    url: String,
    last_emit: Instant,
    last_bytes: u64,
}

impl ProgressThrottle {
    pub(crate) fn new(interval: Duration, start_bytes: u64, total: u64, url: &str) -> Self {
        Self {
            interval,
            total,
            url: url.to_owned(),
            last_emit: Instant::now(),
            last_bytes: start_bytes,
        }
    }

    pub(crate) fn observe(&mut self, downloaded: u64) -> Option<ProgressSample> {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_emit);
        if elapsed < self.interval {
            return None;
        }

        let delta = downloaded.saturating_sub(self.last_bytes);
        let speed = (delta as f64 / elapsed.as_secs_f64().max(f64::EPSILON)) as u64;
        self.last_emit = now;
        self.last_bytes = downloaded;

        Some(self.sample(downloaded, speed))
    }

    /// Unthrottled sample, used for the final 100% report.
    pub(crate) fn finish(&self, downloaded: u64) -> ProgressSample {
        ProgressSample {
            downloaded_bytes: downloaded,
            total_bytes: self.total.max(downloaded),
            bytes_per_second: 0,
            eta_formatted: format_eta(Some(Duration::ZERO)),
            source_url: self.url.clone(),
        }
    }

    fn sample(&self, downloaded: u64, speed: u64) -> ProgressSample {
        let eta = if speed > 0 && self.total > 0 {
            let remaining = self.total.saturating_sub(downloaded);
            Some(Duration::from_secs(remaining / speed))
        } else {
            None
        };
        ProgressSample {
            downloaded_bytes: downloaded,
            total_bytes: self.total,
            bytes_per_second: speed,
            eta_formatted: format_eta(eta),
            source_url: self.url.clone(),
        }
    }
}

/// Format a byte count with binary units (`"512 B"`, `"1.5 MiB"`).
pub fn format_bytes(bytes: u64) -> String {
    const UNIT: u64 = 1024;
    if bytes < UNIT {
        return format!("{bytes} B");
    }
    let mut div = UNIT;
    let mut exp = 0usize;
    let mut n = bytes / UNIT;
    while n >= UNIT {
        div *= UNIT;
        exp += 1;
        n /= UNIT;
    }
    let prefix = ['K', 'M', 'G', 'T', 'P', 'E'][exp];
    format!("{:.1} {prefix}iB", bytes as f64 / div as f64)
}

/// Format a remaining duration (`"42s"`, `"3m 5s"`, `"1h 2m"`).
/// `None` means the rate is not known yet.
pub fn format_eta(eta: Option<Duration>) -> String {
    let Some(eta) = eta else {
        return "calculating".to_owned();
    };
    let secs = eta.as_secs();
    if secs < 60 {
        format!("{secs}s")
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    }
}
