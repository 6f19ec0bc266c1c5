//! Standalone updater.
//!
//! Runs in its own process after the host has handed off:
//!
//! ```text
//! WaitForExit → Extract → Validate → Backup → Replace → Cleanup → Relaunch
//!                                               └─(fail)→ Rollback → exit 1
//! ```
//!
//! Every step before Replace leaves the installation untouched.

pub mod extract;
pub mod install;

use crate::error::{Result, UpdateError};
use crate::platform;
use crate::update::handoff::HandoffParameters;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info, warn};

/// Spacing between host liveness probes.
pub const POLL_INTERVAL: Duration = Duration::from_secs(1);
/// Liveness probes before giving up on the host exiting.
pub const MAX_WAIT_ATTEMPTS: u32 = 30;
/// Pause between installing and relaunching.
pub const SETTLE_DELAY: Duration = Duration::from_secs(2);
/// Backup sets retained after a successful update.
pub const BACKUPS_TO_KEEP: usize = 1;

/// Timing and retention knobs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdaterOptions {
    /// Spacing between host liveness probes.
    pub poll_interval: Duration,
    /// Liveness probes before proceeding anyway.
    pub max_wait_attempts: u32,
    /// Pause before relaunching.
    pub settle_delay: Duration,
    /// Backup sets to keep.
    pub backups_to_keep: usize,
}

impl Default for UpdaterOptions {
    fn default() -> Self {
        Self {
            poll_interval: POLL_INTERVAL,
            max_wait_attempts: MAX_WAIT_ATTEMPTS,
            settle_delay: SETTLE_DELAY,
            backups_to_keep: BACKUPS_TO_KEEP,
        }
    }
}

/// Updater state machine stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    WaitForExit,
    Extract,
    Validate,
    Backup,
    Replace,
    Rollback,
    Cleanup,
    Relaunch,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::WaitForExit => "wait-for-exit",
            Self::Extract => "extract",
            Self::Validate => "validate",
            Self::Backup => "backup",
            Self::Replace => "replace",
            Self::Rollback => "rollback",
            Self::Cleanup => "cleanup",
            Self::Relaunch => "relaunch",
        };
        f.write_str(name)
    }
}

/// What a successful run did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateReport {
    /// The host was still alive when the wait budget ran out.
    pub host_wait_timed_out: bool,
    /// Files unpacked from the package.
    pub files_extracted: usize,
    /// Entries skipped during extraction.
    pub entries_skipped: usize,
    /// Files copied into the installation.
    pub files_replaced: usize,
    /// Backup set created, if anything was backed up.
    pub backup_dir: Option<PathBuf>,
    /// Old backup sets removed.
    pub backups_removed: usize,
    /// PID of the relaunched application.
    pub relaunched_pid: Option<u32>,
}

/// Poll `pid` until it is gone.
///
/// # Errors
///
/// Returns [`UpdateError::ProcessWaitTimeout`] when it is still alive after
/// `max_attempts` probes.
pub fn wait_for_exit(pid: u32, poll_interval: Duration, max_attempts: u32) -> Result<()> {
    for attempt in 1..=max_attempts {
        if !platform::is_process_alive(pid) {
            info!(pid, "host process has exited");
            return Ok(());
        }
        info!(pid, attempt, max_attempts, "waiting for host process to exit");
        std::thread::sleep(poll_interval);
    }
    Err(UpdateError::ProcessWaitTimeout {
        pid,
        attempts: max_attempts,
    })
}

/// Drives one update from a set of handoff parameters.
#[derive(Debug, Clone)]
pub struct Updater {
    params: HandoffParameters,
    options: UpdaterOptions,
}

impl Updater {
    /// Updater with default timing.
    pub fn new(params: HandoffParameters) -> Self {
        Self {
            params,
            options: UpdaterOptions::default(),
        }
    }

    /// Override timing and retention.
    pub fn with_options(mut self, options: UpdaterOptions) -> Self {
        self.options = options;
        self
    }

    /// Run the state machine to completion.
    ///
    /// # Errors
    ///
    /// Returns the first fatal error. A replace failure is returned after a
    /// successful rollback; if the rollback fails too the result is
    /// [`UpdateError::RollbackFailed`].
    pub fn run(&self) -> Result<UpdateReport> {
        let target = &self.params.target;
        let mut report = UpdateReport::default();

        if let Some(pid) = self.params.pid {
            enter(Stage::WaitForExit);
            if let Err(e) = wait_for_exit(pid, self.options.poll_interval, self.options.max_wait_attempts)
            {
                warn!(error = %e, "host still running, proceeding anyway");
                report.host_wait_timed_out = true;
            }
        }

        enter(Stage::Extract);
        let extracted = extract::extract_package(&self.params.source)?;
        report.files_extracted = extracted.files();
        report.entries_skipped = extracted.skipped();

        enter(Stage::Validate);
        install::validate_package(extracted.path())?;

        enter(Stage::Backup);
        let backup = install::backup_executables(target)?;
        if !backup.is_empty() {
            report.backup_dir = Some(backup.dir.clone());
        }

        enter(Stage::Replace);
        match install::replace_files(extracted.path(), target) {
            Ok(count) => report.files_replaced = count,
            Err(update_err) => {
                error!(error = %update_err, "replace failed");
                enter(Stage::Rollback);
                return match install::rollback(&backup, target) {
                    Ok(restored) => {
                        warn!(restored, "previous version restored");
                        Err(update_err)
                    }
                    Err(rollback_err) => {
                        error!(error = %rollback_err, "rollback failed");
                        Err(UpdateError::RollbackFailed {
                            update: update_err.to_string(),
                            rollback: rollback_err.to_string(),
                        })
                    }
                };
            }
        }
        drop(extracted);

        enter(Stage::Cleanup);
        match install::cleanup_old_backups(target, self.options.backups_to_keep) {
            Ok(removed) => report.backups_removed = removed,
            Err(e) => warn!(error = %e, "backup cleanup failed"),
        }

        if let Some(exec) = &self.params.exec {
            enter(Stage::Relaunch);
            std::thread::sleep(self.options.settle_delay);
            match platform::spawn_detached(exec, std::iter::empty::<&str>()) {
                Ok(child) => {
                    info!(pid = child.id(), exec = %exec.display(), "application relaunched");
                    report.relaunched_pid = Some(child.id());
                }
                Err(e) => warn!(
                    exec = %exec.display(),
                    error = %e,
                    "relaunch failed, start the application manually"
                ),
            }
        }

        info!(files = report.files_replaced, "update installed");
        Ok(report)
    }
}

fn enter(stage: Stage) {
    info!(%stage, "entering stage");
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn default_options_use_named_constants() {
        let options = UpdaterOptions::default();
        assert_eq!(options.poll_interval, Duration::from_secs(1));
        assert_eq!(options.max_wait_attempts, 30);
        assert_eq!(options.backups_to_keep, 1);
    }

    #[test]
    fn dead_pid_returns_immediately() {
        assert!(wait_for_exit(0, Duration::from_secs(60), 3).is_ok());
    }

    #[test]
    fn live_pid_times_out() {
        let err = wait_for_exit(std::process::id(), Duration::from_millis(1), 3).unwrap_err();
        match err {
            UpdateError::ProcessWaitTimeout { attempts, .. } => assert_eq!(attempts, 3),
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[test]
    fn stage_names() {
        assert_eq!(Stage::WaitForExit.to_string(), "wait-for-exit");
        assert_eq!(Stage::Rollback.to_string(), "rollback");
    }
}
