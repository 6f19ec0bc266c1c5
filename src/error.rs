//! Error types for the self-update engine.

use std::path::PathBuf;

/// Top-level error type for release checks, downloads, handoff and the
/// standalone updater.
#[derive(Debug, thiserror::Error)]
pub enum UpdateError {
    /// A version string did not match `[v]N.N.N[-pre]`.
    #[error("invalid version format: {0:?}")]
    InvalidVersion(String),

    /// Transport-level HTTP failure (connect, timeout, reset).
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with a status the caller cannot use.
    #[error("unexpected HTTP status {status} from {url}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Requested URL.
        url: String,
    },

    /// The release feed could not be decoded.
    #[error("release feed error: {0}")]
    Feed(String),

    /// No release in the feed satisfies the selection policy.
    #[error("no eligible release found in feed")]
    NoRelease,

    /// Byte count after a transfer differs from the advertised size.
    #[error("size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch {
        /// Advertised total size.
        expected: u64,
        /// Bytes actually on disk.
        actual: u64,
    },

    /// SHA-256 digest of a downloaded file differs from the expected one.
    #[error("hash mismatch: expected {expected}, got {actual}")]
    HashMismatch {
        /// Expected hex digest.
        expected: String,
        /// Computed hex digest.
        actual: String,
    },

    /// The download was cancelled by the caller.
    #[error("download cancelled")]
    Cancelled,

    /// Another update flow holds the update lock.
    #[error("another update is already in progress (pid {pid})")]
    Locked {
        /// PID recorded in the lock file.
        pid: u32,
    },

    /// The updater executable could not be located, provisioned or spawned.
    #[error("handoff error: {0}")]
    Handoff(String),

    /// The host process did not exit within the polling budget.
    #[error("process {pid} still running after {attempts} liveness checks")]
    ProcessWaitTimeout {
        /// PID being waited on.
        pid: u32,
        /// Number of probes performed.
        attempts: u32,
    },

    /// The update package could not be unpacked or contains nothing usable.
    #[error("extraction error: {0}")]
    Extraction(String),

    /// Copying the new files over the installation failed.
    #[error("replace failed at {path}: {reason}")]
    Replace {
        /// File that could not be written.
        path: PathBuf,
        /// Underlying failure.
        reason: String,
    },

    /// Replace failed and restoring the backup failed as well. The
    /// installation needs manual recovery.
    #[error("update failed ({update}) and rollback failed ({rollback}); manual recovery required")]
    RollbackFailed {
        /// The original replace failure.
        update: String,
        /// The failure encountered while restoring the backup.
        rollback: String,
    },

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl UpdateError {
    /// Whether the download retry loop may try again after this error.
    ///
    /// Transport failures and unexpected statuses are retried; everything
    /// else (size or hash mismatch, cancellation, local I/O) is final.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Http(_) | Self::Status { .. })
    }

    /// Whether a release check failing with this error may fall back to a
    /// cached result (network trouble, timeouts, 403/429 rate limiting).
    pub fn is_rate_limited(&self) -> bool {
        match self {
            Self::Http(_) => true,
            Self::Status { status, .. } => *status == 403 || *status == 429,
            _ => false,
        }
    }
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, UpdateError>;

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    fn status(code: u16) -> UpdateError {
        UpdateError::Status {
            status: code,
            url: "https://example.com/feed".to_owned(),
        }
    }

    #[test]
    fn statuses_are_retryable() {
        assert!(status(500).is_retryable());
        assert!(status(404).is_retryable());
    }

    #[test]
    fn fatal_kinds_are_not_retryable() {
        let mismatch = UpdateError::SizeMismatch {
            expected: 10,
            actual: 4,
        };
        assert!(!mismatch.is_retryable());
        assert!(!UpdateError::Cancelled.is_retryable());
        assert!(
            !UpdateError::HashMismatch {
                expected: "aa".into(),
                actual: "bb".into()
            }
            .is_retryable()
        );
    }

    #[test]
    fn only_403_and_429_count_as_rate_limit() {
        assert!(status(403).is_rate_limited());
        assert!(status(429).is_rate_limited());
        assert!(!status(404).is_rate_limited());
        assert!(!status(500).is_rate_limited());
        assert!(!UpdateError::Feed("bad json".into()).is_rate_limited());
    }

    #[test]
    fn rollback_failure_message_is_distinct() {
        let err = UpdateError::RollbackFailed {
            update: "disk full".into(),
            rollback: "permission denied".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("rollback failed"));
        assert!(msg.contains("manual recovery"));
    }
}
