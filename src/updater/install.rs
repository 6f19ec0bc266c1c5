//! Installation steps: validate, backup, replace, rollback and cleanup.
//!
//! Replacement is a sequential copy, not a transaction. The backup taken
//! beforehand is what makes a failed replace recoverable.

use crate::error::{Result, UpdateError};
use crate::paths::{BACKUP_DIR_NAME, UPDATER_LOG_NAME};
use crate::platform;
use chrono::Utc;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Executables saved from the installation before replacement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupSet {
    /// `backup/<timestamp>/` directory; not created when `files` is empty.
    pub dir: PathBuf,
    /// Backed-up file names, relative to the install root.
    pub files: Vec<PathBuf>,
}

impl BackupSet {
    /// Nothing was backed up (fresh install).
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Directory entries of `dir` in name order.
fn sorted_entries(dir: &Path) -> io::Result<Vec<fs::DirEntry>> {
    let mut entries = fs::read_dir(dir)?.collect::<io::Result<Vec<_>>>()?;
    entries.sort_by_key(fs::DirEntry::file_name);
    Ok(entries)
}

/// Entries the engine owns inside an installation; never update content.
fn is_reserved(name: &std::ffi::OsStr) -> bool {
    name == BACKUP_DIR_NAME || name == UPDATER_LOG_NAME
}

/// All platform executables under `root`, recursively, in name order.
///
/// # Errors
///
/// Returns an error if a directory cannot be read.
pub fn find_executables(root: &Path) -> io::Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        for entry in sorted_entries(&dir)? {
            let path = entry.path();
            if entry.file_type()?.is_dir() {
                pending.push(path);
            } else if platform::is_executable(&path) {
                found.push(path);
            }
        }
    }
    found.sort();
    Ok(found)
}

/// Require at least one executable in the extracted package.
///
/// # Errors
///
/// Returns [`UpdateError::Extraction`] when none is found.
pub fn validate_package(extracted: &Path) -> Result<Vec<PathBuf>> {
    let executables = find_executables(extracted)?;
    if executables.is_empty() {
        return Err(UpdateError::Extraction(
            "no executable found in update package".to_owned(),
        ));
    }
    for exe in &executables {
        let name = exe.strip_prefix(extracted).unwrap_or(exe);
        info!(executable = %name.display(), "package executable");
    }
    Ok(executables)
}

/// Copy every top-level executable of `target` into a new
/// `backup/<timestamp>/` set. File modes are preserved.
///
/// # Errors
///
/// Returns an error if an executable cannot be copied.
pub fn backup_executables(target: &Path) -> Result<BackupSet> {
    let stamp = Utc::now().format("%Y%m%dT%H%M%S%.6fZ").to_string();
    let dir = target.join(BACKUP_DIR_NAME).join(stamp);

    let entries = match sorted_entries(target) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => Vec::new(),
        Err(e) => return Err(e.into()),
    };

    let mut files = Vec::new();
    for entry in entries {
        let path = entry.path();
        if is_reserved(&entry.file_name()) || !platform::is_executable(&path) {
            continue;
        }
        if files.is_empty() {
            fs::create_dir_all(&dir)?;
        }
        let name = PathBuf::from(entry.file_name());
        fs::copy(&path, dir.join(&name))?;
        debug!(file = %name.display(), "backed up");
        files.push(name);
    }

    if files.is_empty() {
        info!(target = %target.display(), "nothing to back up");
    } else {
        info!(count = files.len(), dir = %dir.display(), "backup complete");
    }
    Ok(BackupSet { dir, files })
}

/// Copy the extracted tree over `target`, in sorted order.
///
/// Stops at the first file that cannot be written; earlier files stay
/// replaced.
///
/// # Errors
///
/// Returns [`UpdateError::Replace`] naming the failing path.
pub fn replace_files(extracted: &Path, target: &Path) -> Result<usize> {
    fs::create_dir_all(target).map_err(|e| replace_error(target, &e))?;
    let mut copied = 0usize;
    copy_tree(extracted, target, true, &mut copied)?;
    info!(files = copied, target = %target.display(), "files replaced");
    Ok(copied)
}

fn copy_tree(src: &Path, dst: &Path, top_level: bool, copied: &mut usize) -> Result<()> {
    let entries = sorted_entries(src).map_err(|e| replace_error(src, &e))?;
    for entry in entries {
        if top_level && is_reserved(&entry.file_name()) {
            warn!(name = ?entry.file_name(), "ignoring reserved name in package");
            continue;
        }
        let from = entry.path();
        let to = dst.join(entry.file_name());
        let file_type = entry.file_type().map_err(|e| replace_error(&from, &e))?;

        if file_type.is_dir() {
            fs::create_dir_all(&to).map_err(|e| replace_error(&to, &e))?;
            copy_tree(&from, &to, false, copied)?;
        } else {
            fs::copy(&from, &to).map_err(|e| replace_error(&to, &e))?;
            *copied += 1;
            debug!(file = %to.display(), "replaced");
        }
    }
    Ok(())
}

fn replace_error(path: &Path, err: &io::Error) -> UpdateError {
    UpdateError::Replace {
        path: path.to_path_buf(),
        reason: err.to_string(),
    }
}

/// Restore a backup set over `target`.
///
/// # Errors
///
/// Returns the first copy failure; the caller reports it as a failed
/// rollback.
pub fn rollback(backup: &BackupSet, target: &Path) -> Result<usize> {
    if backup.is_empty() {
        warn!("no backup to restore");
        return Ok(0);
    }
    for name in &backup.files {
        fs::copy(backup.dir.join(name), target.join(name))?;
        info!(file = %name.display(), "restored");
    }
    Ok(backup.files.len())
}

/// Remove all but the newest `keep` backup sets. Returns how many were
/// removed. Failures to remove a set are logged.
///
/// # Errors
///
/// Returns an error if the backup directory exists but cannot be listed.
pub fn cleanup_old_backups(target: &Path, keep: usize) -> Result<usize> {
    let backup_root = target.join(BACKUP_DIR_NAME);
    let entries = match sorted_entries(&backup_root) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e.into()),
    };

    let sets: Vec<PathBuf> = entries
        .into_iter()
        .filter(|e| e.file_type().is_ok_and(|t| t.is_dir()))
        .map(|e| e.path())
        .collect();
    let excess = sets.len().saturating_sub(keep);

    let mut removed = 0usize;
    for old in &sets[..excess] {
        match fs::remove_dir_all(old) {
            Ok(()) => {
                removed += 1;
                debug!(dir = %old.display(), "removed old backup");
            }
            Err(e) => warn!(dir = %old.display(), error = %e, "cannot remove old backup"),
        }
    }
    Ok(removed)
}
