//! Standalone updater binary.
//!
//! Started detached by the host with
//! `--source <zip> --target <installDir> [--pid <hostPID>] [--exec <hostExecPath>]`.
//! Output goes to stdout and to `<installDir>/updater.log`, since a detached
//! process usually has no visible console. Exit code 0 on success, 1 on any
//! failure.

use clap::Parser;
use hub_update::UpdateError;
use hub_update::paths::UPDATER_LOG_NAME;
use hub_update::update::HandoffParameters;
use hub_update::updater::Updater;
use std::path::Path;
use std::process::ExitCode;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

fn main() -> ExitCode {
    let params = match HandoffParameters::try_parse() {
        Ok(params) => params,
        Err(e) => {
            // --help/--version print to stdout and are not failures.
            let code = u8::from(e.use_stderr());
            let _ = e.print();
            return ExitCode::from(code);
        }
    };

    let _guard = match init_logging(&params.target) {
        Ok(guard) => Some(guard),
        Err(e) => {
            init_stdout_logging();
            tracing::warn!(error = %e, "updater log file unavailable, logging to stdout only");
            None
        }
    };

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        source = %params.source.display(),
        target = %params.target.display(),
        pid = ?params.pid,
        "hub-updater starting"
    );

    match Updater::new(params).run() {
        Ok(report) => {
            tracing::info!(
                files = report.files_replaced,
                relaunched = report.relaunched_pid.is_some(),
                "update finished"
            );
            ExitCode::SUCCESS
        }
        Err(e @ UpdateError::RollbackFailed { .. }) => {
            tracing::error!(error = %e, "UPDATE AND ROLLBACK FAILED: the installation may be broken");
            ExitCode::FAILURE
        }
        Err(e) => {
            tracing::error!(error = %e, "update failed");
            ExitCode::FAILURE
        }
    }
}

fn default_filter() -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("hub_update=info,hub_updater=info"))
}

fn init_logging(install_dir: &Path) -> anyhow::Result<WorkerGuard> {
    std::fs::create_dir_all(install_dir)?;
    let appender = RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(UPDATER_LOG_NAME)
        .build(install_dir)?;
    let (writer, guard) = tracing_appender::non_blocking(appender);

    tracing_subscriber::registry()
        .with(default_filter())
        .with(fmt::layer().with_writer(std::io::stdout))
        .with(fmt::layer().with_writer(writer).with_ansi(false))
        .init();
    Ok(guard)
}

fn init_stdout_logging() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stdout)
        .with_env_filter(default_filter())
        .init();
}
