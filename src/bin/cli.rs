//! CLI binary for hub-update.

use anyhow::Context;
use clap::{Parser, Subcommand};
use hub_update::progress::format_bytes;
use hub_update::update::{Downloader, ReleaseChecker, UpdateState};
use hub_update::{
    HandoffOutcome, ProgressCallback, ProgressSample, UpdateConfig, UpdateInfo, UpdateService,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Check for, download and install application updates.
#[derive(Parser)]
#[command(name = "hub-update", version, about)]
struct Cli {
    /// Path to TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Subcommand to run.
    #[command(subcommand)]
    command: Command,
}

/// Available commands.
#[derive(Subcommand)]
enum Command {
    /// Check the release feed for a newer version.
    Check {
        /// Print the result as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Download the update package without installing it.
    Download,

    /// Download the update and hand off to the updater.
    Update {
        /// Install even if this version was skipped.
        #[arg(long)]
        force: bool,
    },

    /// Stop offering a version.
    Skip {
        /// Version to skip (e.g. `v1.4.0`).
        version: String,

        /// Note stored with the skip.
        #[arg(long)]
        reason: Option<String>,
    },

    /// Check periodically until interrupted.
    Watch {
        /// Hours between checks.
        #[arg(long, default_value_t = 6)]
        interval_hours: u64,
    },

    /// Print the effective configuration.
    Config {
        /// Write the default configuration file if none exists.
        #[arg(long)]
        init: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                EnvFilter::new("hub_update=info,reqwest=warn,hyper=warn")
            }),
        )
        .init();

    let cli = Cli::parse();

    let config_path = cli.config.unwrap_or_else(hub_update::paths::config_file);
    let config = UpdateConfig::load_or_default(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;

    match cli.command {
        Command::Check { json } => run_check(&config, json).await,
        Command::Download => run_download(&config).await,
        Command::Update { force } => run_update(&config, force).await,
        Command::Skip { version, reason } => run_skip(&version, reason),
        Command::Watch { interval_hours } => run_watch(&config, interval_hours).await,
        Command::Config { init } => run_config(&config, &config_path, init),
    }
}

async fn run_check(config: &UpdateConfig, json: bool) -> anyhow::Result<()> {
    config.validate()?;
    let checker = ReleaseChecker::new(config.release.clone())?;
    let info = checker.check_for_updates().await?;

    let mut state = UpdateState::load();
    state.mark_checked();
    state.save()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&info)?);
        return Ok(());
    }
    print_info(&info, &state);
    Ok(())
}

async fn run_download(config: &UpdateConfig) -> anyhow::Result<()> {
    let service = build_service(config)?;
    let info = service.check().await?;
    if !info.is_installable() {
        println!("No update to download ({} is current).", info.current_version);
        return Ok(());
    }
    let path = service.download(&info).await?;
    println!("Downloaded {} to {}", info.latest_version, path.display());
    Ok(())
}

async fn run_update(config: &UpdateConfig, force: bool) -> anyhow::Result<()> {
    let service = build_service(config)?;
    let info = service.check().await?;

    if !info.has_update {
        println!("Already up to date ({}).", info.current_version);
        return Ok(());
    }
    if !force && UpdateState::load().is_skipped(&info.latest_version) {
        println!(
            "{} was skipped. Use --force to install it anyway.",
            info.latest_version
        );
        return Ok(());
    }

    println!(
        "Updating {} -> {}",
        info.current_version, info.latest_version
    );
    let HandoffOutcome::ExitRequired { updater_pid, .. } = service.begin_update(&info).await?;
    println!("Updater started (pid {updater_pid}). Exiting so files can be replaced.");
    info!(updater_pid, "handing off to updater");
    std::process::exit(0);
}

fn run_skip(version: &str, reason: Option<String>) -> anyhow::Result<()> {
    hub_update::Version::parse(version)?;
    let mut state = UpdateState::load();
    state.skip(version, reason);
    state.save()?;
    println!("{version} will no longer be offered.");
    Ok(())
}

async fn run_watch(config: &UpdateConfig, interval_hours: u64) -> anyhow::Result<()> {
    config.validate()?;
    let checker = Arc::new(ReleaseChecker::new(config.release.clone())?);
    let cancel = CancellationToken::new();
    let interval = Duration::from_secs(interval_hours.max(1) * 3600);
    let handle = Arc::clone(&checker).spawn_background_check(interval, cancel.clone());

    tokio::signal::ctrl_c().await?;
    cancel.cancel();
    handle.await?;

    if let Some(info) = checker.cached() {
        print_info(&info, &UpdateState::load());
    }
    Ok(())
}

fn run_config(
    config: &UpdateConfig,
    path: &std::path::Path,
    init: bool,
) -> anyhow::Result<()> {
    if init {
        if path.exists() {
            println!("{} already exists.", path.display());
        } else {
            config.save_to_file(path)?;
            println!("Wrote {}", path.display());
        }
    }
    println!("# {}", path.display());
    print!("{}", toml::to_string_pretty(config)?);
    Ok(())
}

fn build_service(config: &UpdateConfig) -> anyhow::Result<UpdateService> {
    config.validate()?;
    let checker = Arc::new(ReleaseChecker::new(config.release.clone())?);
    let downloader = Arc::new(Downloader::new(&config.download)?.with_progress(progress_bar()));
    let installer = hub_update::update::Installer::new(&config.handoff)?;
    Ok(UpdateService::new(checker, downloader, installer)
        .with_expected_sha256(config.download.verify_sha256.clone()))
}

fn progress_bar() -> ProgressCallback {
    let pb = ProgressBar::new(0);
    if let Ok(style) = ProgressStyle::with_template(
        "  {msg} [{bar:30}] {bytes}/{total_bytes} {bytes_per_sec} ETA {eta}",
    ) {
        pb.set_style(style);
    }
    pb.set_message("downloading");

    Arc::new(move |sample: ProgressSample| {
        if sample.total_bytes > 0 {
            pb.set_length(sample.total_bytes);
        }
        pb.set_position(sample.downloaded_bytes);
        if sample.total_bytes > 0 && sample.downloaded_bytes >= sample.total_bytes {
            pb.finish_with_message("done");
        }
    })
}

fn print_info(info: &UpdateInfo, state: &UpdateState) {
    println!("Current version: {}", info.current_version);
    println!("Latest version:  {}", info.latest_version);
    if let Some(published) = info.published_at {
        println!("Published:       {}", published.format("%Y-%m-%d"));
    }
    if !info.has_update {
        println!("Up to date.");
        return;
    }
    if state.is_skipped(&info.latest_version) {
        println!("Update available but skipped.");
        return;
    }
    if info.download_url.is_empty() {
        println!("Update available, but there is no package for this platform.");
        return;
    }
    println!(
        "Update available: {} ({})",
        info.asset_name,
        format_bytes(info.size)
    );
    if info.is_prerelease {
        println!("Pre-release: {}", info.prerelease_type);
    }
    if !info.release_notes.trim().is_empty() {
        println!("\n{}", info.release_notes.trim());
    }
}
