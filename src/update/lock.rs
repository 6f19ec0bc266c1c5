//! Cross-process update lock.
//!
//! A lock file created with `create_new` holds the owner's PID. A lock whose
//! owner is no longer running is reclaimed. The file is removed when the
//! [`UpdateLock`] is dropped.

use crate::error::{Result, UpdateError};
use crate::paths::LOCK_FILE_NAME;
use crate::platform;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Held while an update flow is running.
#[derive(Debug)]
pub struct UpdateLock {
    path: PathBuf,
}

impl UpdateLock {
    /// Take the lock in `dir`.
    ///
    /// # Errors
    ///
    /// Returns [`UpdateError::Locked`] when a live process holds it, or an
    /// I/O error when the lock file cannot be created.
    pub fn acquire(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(LOCK_FILE_NAME);

        match try_create(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                let owner = read_owner(&path);
                if let Some(pid) = owner.filter(|&pid| platform::is_process_alive(pid)) {
                    return Err(UpdateError::Locked { pid });
                }
                warn!(path = %path.display(), ?owner, "reclaiming stale update lock");
                std::fs::remove_file(&path)?;
                try_create(&path).map_err(|e| {
                    if e.kind() == io::ErrorKind::AlreadyExists {
                        UpdateError::Locked {
                            pid: read_owner(&path).unwrap_or(0),
                        }
                    } else {
                        UpdateError::Io(e)
                    }
                })?;
            }
            Err(e) => return Err(e.into()),
        }

        debug!(path = %path.display(), "update lock acquired");
        Ok(Self { path })
    }

    /// Path of the lock file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for UpdateLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), error = %e, "failed to remove update lock");
        }
    }
}

fn try_create(path: &Path) -> io::Result<()> {
    let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
    write!(file, "{}", std::process::id())?;
    file.sync_all()
}

fn read_owner(path: &Path) -> Option<u32> {
    std::fs::read_to_string(path).ok()?.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn second_acquire_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let lock = UpdateLock::acquire(dir.path()).unwrap();
        let err = UpdateLock::acquire(dir.path()).unwrap_err();
        match err {
            UpdateError::Locked { pid } => assert_eq!(pid, std::process::id()),
            other => panic!("expected Locked, got {other:?}"),
        }
        drop(lock);
        assert!(UpdateLock::acquire(dir.path()).is_ok());
    }

    #[test]
    fn drop_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = {
            let lock = UpdateLock::acquire(dir.path()).unwrap();
            assert!(lock.path().exists());
            lock.path().to_owned()
        };
        assert!(!path.exists());
    }

    #[test]
    fn garbage_lock_is_reclaimed() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(LOCK_FILE_NAME), "not a pid").unwrap();
        let lock = UpdateLock::acquire(dir.path()).unwrap();
        let owner = read_owner(lock.path()).unwrap();
        assert_eq!(owner, std::process::id());
    }

    #[cfg(unix)]
    #[test]
    fn dead_owner_is_reclaimed() {
        let mut child = std::process::Command::new("true").spawn().unwrap();
        let pid = child.id();
        child.wait().unwrap();

        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(LOCK_FILE_NAME), pid.to_string()).unwrap();
        assert!(UpdateLock::acquire(dir.path()).is_ok());
    }
}
