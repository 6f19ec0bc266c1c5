//! Handoff to the standalone updater.
//!
//! A running executable cannot safely overwrite itself, so the host stages
//! the updater outside the install directory, launches it detached with the
//! package location and its own PID, and then exits. The updater does the
//! actual file replacement once the host is gone.

use crate::config::HandoffConfig;
use crate::error::{Result, UpdateError};
use crate::platform;
use clap::Parser;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Everything the updater needs, passed as command-line arguments.
///
/// This is the argument contract of the `hub-updater` binary:
/// `--source <zip> --target <installDir> [--pid <hostPID>] [--exec <hostExecPath>]`.
#[derive(Debug, Clone, PartialEq, Eq, Parser)]
#[command(
    name = "hub-updater",
    version,
    about = "Replace an installation with the contents of an update package"
)]
pub struct HandoffParameters {
    /// Update package (zip).
    #[arg(long, value_name = "ZIP")]
    pub source: PathBuf,

    /// Installation directory to update.
    #[arg(long, value_name = "DIR")]
    pub target: PathBuf,

    /// Host process to wait for before touching any file.
    #[arg(long)]
    pub pid: Option<u32>,

    /// Executable to start once the update is installed.
    #[arg(long, value_name = "PATH")]
    pub exec: Option<PathBuf>,
}

impl HandoffParameters {
    /// Render as updater arguments (without the program name).
    pub fn to_args(&self) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "--source".into(),
            self.source.clone().into_os_string(),
            "--target".into(),
            self.target.clone().into_os_string(),
        ];
        if let Some(pid) = self.pid {
            args.push("--pid".into());
            args.push(pid.to_string().into());
        }
        if let Some(exec) = &self.exec {
            args.push("--exec".into());
            args.push(exec.clone().into_os_string());
        }
        args
    }
}

/// Result of a successful handoff.
#[derive(Debug)]
pub enum HandoffOutcome {
    /// The updater is running. The host must exit now so its files can be
    /// replaced.
    ExitRequired {
        /// PID of the spawned updater.
        updater_pid: u32,
        /// Staged updater executable that was launched.
        updater: PathBuf,
        /// Arguments the updater was started with.
        params: HandoffParameters,
    },
}

/// Locates, stages and launches the standalone updater.
#[derive(Debug, Clone)]
pub struct Installer {
    updater_name: String,
    install_dir: PathBuf,
    host_exec: PathBuf,
    staging_dir: PathBuf,
    bundled_updater: Option<Vec<u8>>,
}

impl Installer {
    /// Create an installer for the running executable.
    ///
    /// # Errors
    ///
    /// Returns an error if the current executable path cannot be resolved.
    pub fn new(config: &HandoffConfig) -> Result<Self> {
        let host_exec = std::env::current_exe()?;
        let install_dir = match &config.install_dir {
            Some(dir) => dir.clone(),
            None => host_exec
                .parent()
                .map(Path::to_path_buf)
                .ok_or_else(|| UpdateError::Handoff("executable has no parent directory".into()))?,
        };
        Ok(Self {
            updater_name: config.updater_name.clone(),
            install_dir,
            host_exec,
            staging_dir: std::env::temp_dir().join(format!("hub-updater-{}", std::process::id())),
            bundled_updater: None,
        })
    }

    /// Executable to relaunch after the update (defaults to the running one).
    pub fn with_host_exec(mut self, path: PathBuf) -> Self {
        self.host_exec = path;
        self
    }

    /// Installation directory handed to the updater.
    pub fn with_install_dir(mut self, dir: PathBuf) -> Self {
        self.install_dir = dir;
        self
    }

    /// Where the updater is copied before launch.
    pub fn with_staging_dir(mut self, dir: PathBuf) -> Self {
        self.staging_dir = dir;
        self
    }

    /// Updater binary embedded in the host, used when no sibling updater
    /// exists on disk.
    pub fn with_bundled_updater(mut self, bytes: Vec<u8>) -> Self {
        self.bundled_updater = Some(bytes);
        self
    }

    /// Installation directory.
    pub fn install_dir(&self) -> &Path {
        &self.install_dir
    }

    /// Sibling updater location next to the host executable.
    pub fn sibling_updater(&self) -> Option<PathBuf> {
        self.host_exec.parent().map(|dir| dir.join(&self.updater_name))
    }

    /// Launch the updater for `package` and tell the caller to exit.
    ///
    /// # Errors
    ///
    /// Returns [`UpdateError::Handoff`] when the package is missing, no
    /// updater can be provisioned, or the spawn fails. Nothing is left
    /// behind in that case.
    pub fn install(&self, package: &Path) -> Result<HandoffOutcome> {
        if !package.is_file() {
            return Err(UpdateError::Handoff(format!(
                "update package not found: {}",
                package.display()
            )));
        }
        let source = std::fs::canonicalize(package)?;

        let updater = self.stage_updater()?;
        let params = HandoffParameters {
            source,
            target: self.install_dir.clone(),
            pid: Some(std::process::id()),
            exec: Some(self.host_exec.clone()),
        };

        info!(
            updater = %updater.display(),
            source = %params.source.display(),
            target = %params.target.display(),
            pid = ?params.pid,
            "launching updater"
        );

        let child = match platform::spawn_detached(&updater, params.to_args()) {
            Ok(child) => child,
            Err(e) => {
                self.discard_staging();
                return Err(UpdateError::Handoff(format!(
                    "failed to start {}: {e}",
                    updater.display()
                )));
            }
        };

        let updater_pid = child.id();
        info!(updater_pid, "updater started, host must exit");
        Ok(HandoffOutcome::ExitRequired {
            updater_pid,
            updater,
            params,
        })
    }

    /// Copy the updater out of the install directory so replacing the
    /// installation never touches the running updater image.
    fn stage_updater(&self) -> Result<PathBuf> {
        let staged = self.staging_dir.join(&self.updater_name);

        let sibling = self.sibling_updater().filter(|p| p.is_file());
        let result = match (&sibling, &self.bundled_updater) {
            (Some(path), _) => {
                std::fs::create_dir_all(&self.staging_dir)?;
                std::fs::copy(path, &staged).map(|_| ())
            }
            (None, Some(bytes)) => {
                info!("no sibling updater, extracting bundled copy");
                std::fs::create_dir_all(&self.staging_dir)?;
                std::fs::write(&staged, bytes)
            }
            (None, None) => {
                return Err(UpdateError::Handoff(format!(
                    "updater not found next to {} and none bundled",
                    self.host_exec.display()
                )));
            }
        };

        if let Err(e) = result.and_then(|()| platform::set_executable(&staged)) {
            self.discard_staging();
            return Err(UpdateError::Handoff(format!(
                "cannot stage updater at {}: {e}",
                staged.display()
            )));
        }
        Ok(staged)
    }

    fn discard_staging(&self) {
        if let Err(e) = std::fs::remove_dir_all(&self.staging_dir) {
            warn!(dir = %self.staging_dir.display(), error = %e, "failed to remove updater staging dir");
        }
    }
}
