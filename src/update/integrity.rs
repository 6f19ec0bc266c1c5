//! Content hash verification for downloaded packages.
//!
//! Only a SHA-256 content check is performed; there is no signature
//! verification.
//!
//! # Example
//!
//! ```rust
//! use hub_update::update::integrity::sha256_hex;
//! use std::path::Path;
//!
//! assert!(sha256_hex(Path::new("/nonexistent/package.zip")).is_err());
//! ```

use crate::error::{Result, UpdateError};
use sha2::{Digest, Sha256};
use std::io::{self, Read};
use std::path::Path;
use tracing::{info, warn};

/// Verify `path` against an expected SHA-256 hex digest (case-insensitive).
///
/// The file is deleted when the digest does not match, so a corrupt package
/// is never handed to the updater.
///
/// # Errors
///
/// Returns [`UpdateError::HashMismatch`] on mismatch, or an I/O error when
/// the file cannot be read.
pub fn verify_hash(path: &Path, expected_hex: &str) -> Result<()> {
    let actual = sha256_hex(path)?;
    let expected = expected_hex.trim();

    if actual.eq_ignore_ascii_case(expected) {
        info!(path = %path.display(), "package hash verified");
        return Ok(());
    }

    warn!(
        path = %path.display(),
        expected,
        actual = %actual,
        "package hash mismatch, discarding file"
    );
    if let Err(e) = std::fs::remove_file(path) {
        warn!(path = %path.display(), error = %e, "failed to remove corrupt package");
    }
    Err(UpdateError::HashMismatch {
        expected: expected.to_ascii_lowercase(),
        actual,
    })
}

/// Compute the SHA-256 hex digest of a file, reading in 64 KiB chunks.
///
/// # Errors
///
/// Returns the underlying I/O error.
pub fn sha256_hex(path: &Path) -> io::Result<String> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; 65_536];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    fn digest_of(content: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(content);
        format!("{:x}", hasher.finalize())
    }

    #[test]
    fn matching_hash_keeps_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pkg.zip");
        std::fs::write(&path, b"package bytes").unwrap();

        verify_hash(&path, &digest_of(b"package bytes")).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn uppercase_hash_is_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pkg.zip");
        std::fs::write(&path, b"case test").unwrap();

        let upper = digest_of(b"case test").to_uppercase();
        assert!(verify_hash(&path, &upper).is_ok());
    }

    #[test]
    fn mismatch_discards_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pkg.zip");
        std::fs::write(&path, b"tampered").unwrap();

        let err = verify_hash(
            &path,
            "deadbeefdeadbeefdeadbeefdeadbeefdeadbeefdeadbeefdeadbeefdeadbeef",
        )
        .unwrap_err();
        assert!(matches!(err, UpdateError::HashMismatch { .. }));
        assert!(!path.exists());
    }

    #[test]
    fn missing_file_is_io_error() {
        let result = verify_hash(Path::new("/nonexistent/pkg.zip"), "00");
        assert!(matches!(result, Err(UpdateError::Io(_))));
    }
}
