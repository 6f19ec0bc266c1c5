//! Resumable package downloader.
//!
//! Bytes land in `<dir>/<file>.tmp` and are renamed to `<dir>/<file>` only
//! after the byte count matches the advertised size. An existing `.tmp` is
//! resumed with a `Range` request; a server that ignores the range (plain
//! `200`) restarts the file from zero.

use crate::config::{DownloadConfig, parse_proxy};
use crate::error::{Result, UpdateError};
use crate::progress::{ProgressCallback, ProgressThrottle};
use crate::update::integrity;
use futures_util::StreamExt;
use reqwest::StatusCode;
use reqwest::header::RANGE;
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Downloads release packages with resume, retry and cancellation.
pub struct Downloader {
    client: reqwest::Client,
    dir: PathBuf,
    max_retries: u32,
    retry_delay: Duration,
    progress_interval: Duration,
    progress: Option<ProgressCallback>,
    active: Mutex<HashMap<String, CancellationToken>>,
}

impl Downloader {
    /// Build a downloader from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the proxy URL is invalid or the HTTP client
    /// cannot be built.
    pub fn new(config: &DownloadConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("hub-update/", env!("CARGO_PKG_VERSION")));
        if let Some(proxy) = &config.proxy {
            builder = builder.proxy(parse_proxy(proxy)?);
        }

        Ok(Self {
            client: builder.build()?,
            dir: config.dir.clone(),
            max_retries: config.max_retries,
            retry_delay: config.retry_delay(),
            progress_interval: config.progress_interval(),
            progress: None,
            active: Mutex::new(HashMap::new()),
        })
    }

    /// Attach a progress callback.
    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    /// Directory receiving downloads.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Final location of `filename`.
    pub fn final_path(&self, filename: &str) -> PathBuf {
        self.dir.join(filename)
    }

    /// In-progress location of `filename`.
    pub fn tmp_path(&self, filename: &str) -> PathBuf {
        self.dir.join(format!("{filename}.tmp"))
    }

    /// Download `url` into `<dir>/<filename>` and return the final path.
    ///
    /// Transport failures and unexpected statuses are retried up to
    /// `max_retries` times with a fixed delay. Each attempt resumes from
    /// whatever the `.tmp` file holds at that moment.
    ///
    /// # Errors
    ///
    /// Returns [`UpdateError::Cancelled`] after [`cancel`](Self::cancel),
    /// [`UpdateError::SizeMismatch`] when the transfer ends short (the
    /// `.tmp` is kept for a later resume), or the last transport error once
    /// retries are exhausted.
    pub async fn download(&self, url: &str, filename: &str) -> Result<PathBuf> {
        validate_filename(filename)?;
        tokio::fs::create_dir_all(&self.dir).await?;

        let token = CancellationToken::new();
        self.active_map().insert(filename.to_owned(), token.clone());

        let result = self.download_with_retries(url, filename, &token).await;

        self.active_map().remove(filename);
        if matches!(result, Err(UpdateError::Cancelled)) {
            remove_if_present(&self.tmp_path(filename)).await;
        }
        result
    }

    async fn download_with_retries(
        &self,
        url: &str,
        filename: &str,
        token: &CancellationToken,
    ) -> Result<PathBuf> {
        let tmp_path = self.tmp_path(filename);
        let final_path = self.final_path(filename);
        let attempts = self.max_retries.saturating_add(1);

        info!(url, file = %final_path.display(), "starting download");

        for attempt in 1..=attempts {
            if token.is_cancelled() {
                return Err(UpdateError::Cancelled);
            }

            let transfer = Transfer {
                client: self.client.clone(),
                url: url.to_owned(),
                tmp_path: tmp_path.clone(),
                interval: self.progress_interval,
                progress: self.progress.clone(),
                cancel: token.clone(),
            };
            let outcome = tokio::spawn(transfer.run())
                .await
                .map_err(|e| UpdateError::Io(io::Error::other(e)))?;

            match outcome {
                Ok(done) => {
                    tokio::fs::rename(&tmp_path, &final_path).await?;
                    if let Some(cb) = &self.progress {
                        cb(done.throttle.finish(done.bytes));
                    }
                    info!(
                        bytes = done.bytes,
                        attempt,
                        file = %final_path.display(),
                        "download complete"
                    );
                    return Ok(final_path);
                }
                Err(e) if e.is_retryable() && attempt < attempts => {
                    warn!(
                        attempt,
                        max_attempts = attempts,
                        error = %e,
                        delay_ms = self.retry_delay.as_millis() as u64,
                        "download attempt failed, retrying"
                    );
                    tokio::select! {
                        () = token.cancelled() => return Err(UpdateError::Cancelled),
                        () = tokio::time::sleep(self.retry_delay) => {}
                    }
                }
                Err(e) => {
                    warn!(attempt, error = %e, "download failed");
                    return Err(e);
                }
            }
        }

        // Only reachable with zero attempts, which saturating_add rules out.
        Err(UpdateError::Cancelled)
    }

    /// Stop an in-flight download of `filename` and delete both its `.tmp`
    /// and final files.
    ///
    /// # Errors
    ///
    /// Returns an error only for an invalid file name; files that cannot be
    /// removed are logged.
    pub async fn cancel(&self, filename: &str) -> Result<()> {
        validate_filename(filename)?;
        if let Some(token) = self.active_map().get(filename) {
            info!(file = filename, "cancelling download");
            token.cancel();
        }
        remove_if_present(&self.tmp_path(filename)).await;
        remove_if_present(&self.final_path(filename)).await;
        Ok(())
    }

    /// Verify a downloaded file against a SHA-256 hex digest. The file is
    /// deleted on mismatch.
    ///
    /// # Errors
    ///
    /// See [`integrity::verify_hash`].
    pub async fn verify_hash(&self, path: &Path, expected_hex: &str) -> Result<()> {
        let path = path.to_owned();
        let expected = expected_hex.to_owned();
        tokio::task::spawn_blocking(move || integrity::verify_hash(&path, &expected))
            .await
            .map_err(|e| UpdateError::Io(io::Error::other(e)))?
    }

    fn active_map(&self) -> std::sync::MutexGuard<'_, HashMap<String, CancellationToken>> {
        self.active.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Successful single-attempt transfer.
struct Completed {
    bytes: u64,
    throttle: ProgressThrottle,
}

/// One HTTP attempt, owned so it can run on its own task.
struct Transfer {
    client: reqwest::Client,
    url: String,
    tmp_path: PathBuf,
    interval: Duration,
    progress: Option<ProgressCallback>,
    cancel: CancellationToken,
}

impl Transfer {
    async fn run(self) -> Result<Completed> {
        let existing = match tokio::fs::metadata(&self.tmp_path).await {
            Ok(meta) => meta.len(),
            Err(_) => 0,
        };

        let mut request = self.client.get(&self.url);
        if existing > 0 {
            debug!(offset = existing, "resuming partial download");
            request = request.header(RANGE, format!("bytes={existing}-"));
        }

        let response = tokio::select! {
            () = self.cancel.cancelled() => return Err(UpdateError::Cancelled),
            resp = request.send() => resp?,
        };

        let status = response.status();
        let remaining = response.content_length();
        let (start, total, mut file) = match status {
            StatusCode::PARTIAL_CONTENT if existing > 0 => {
                let file = tokio::fs::OpenOptions::new()
                    .append(true)
                    .open(&self.tmp_path)
                    .await?;
                (existing, remaining.map_or(0, |n| existing + n), file)
            }
            StatusCode::OK | StatusCode::PARTIAL_CONTENT => {
                if existing > 0 {
                    debug!("server ignored range request, restarting from zero");
                }
                let file = tokio::fs::File::create(&self.tmp_path).await?;
                (0, remaining.unwrap_or(0), file)
            }
            StatusCode::RANGE_NOT_SATISFIABLE => {
                // The partial file no longer lines up with the remote one.
                remove_if_present(&self.tmp_path).await;
                return Err(UpdateError::Status {
                    status: status.as_u16(),
                    url: self.url,
                });
            }
            _ => {
                return Err(UpdateError::Status {
                    status: status.as_u16(),
                    url: self.url,
                });
            }
        };

        let mut throttle = ProgressThrottle::new(self.interval, start, total, &self.url);
        let mut downloaded = start;
        let mut stream = response.bytes_stream();

        loop {
            let next = tokio::select! {
                () = self.cancel.cancelled() => {
                    file.flush().await?;
                    return Err(UpdateError::Cancelled);
                }
                next = stream.next() => next,
            };

            match next {
                None => break,
                Some(Ok(chunk)) => {
                    file.write_all(&chunk).await?;
                    downloaded += chunk.len() as u64;
                    if let Some(sample) = throttle.observe(downloaded) {
                        debug!(
                            downloaded,
                            total,
                            speed = sample.bytes_per_second,
                            "download progress"
                        );
                        if let Some(cb) = &self.progress {
                            cb(sample);
                        }
                    }
                }
                Some(Err(e)) => {
                    file.flush().await?;
                    if total > 0 {
                        warn!(error = %e, downloaded, total, "transfer ended early");
                        return Err(UpdateError::SizeMismatch {
                            expected: total,
                            actual: downloaded,
                        });
                    }
                    return Err(UpdateError::Http(e));
                }
            }
        }

        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        if total > 0 && downloaded != total {
            return Err(UpdateError::SizeMismatch {
                expected: total,
                actual: downloaded,
            });
        }

        Ok(Completed {
            bytes: downloaded,
            throttle,
        })
    }
}

fn validate_filename(filename: &str) -> Result<()> {
    let bad = filename.is_empty()
        || filename == "."
        || filename == ".."
        || filename.contains(['/', '\\']);
    if bad {
        return Err(UpdateError::Io(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("invalid download file name: {filename:?}"),
        )));
    }
    Ok(())
}

async fn remove_if_present(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!(path = %path.display(), "removed download file"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "failed to remove download file"),
    }
}
