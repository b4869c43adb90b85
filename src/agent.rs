use chrono::{DateTime, Utc};
use std::future::Future;
use std::path::PathBuf;

use crate::config::Config;
use crate::errors::AppResult;
use crate::selector::{select_recent_files_excluding, NothingProcessed, ProcessedFiles};
use crate::single_instance::{default_lock_path, RunLock};
use crate::uploader::{BrowserLauncher, ChromiumLauncher, DriverSettings, UploadDriver, UploadReport};

/// How a successful run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Nothing in the window; the browser was never started.
    NoFiles { skipped: usize },
    Uploaded(UploadReport),
}

/// One scan-then-upload pass over the configured share.
pub struct Agent<L: BrowserLauncher> {
    config: Config,
    driver: UploadDriver<L>,
    lock_path: PathBuf,
}

impl Agent<ChromiumLauncher> {
    pub fn from_config(config: Config) -> Self {
        let launcher = ChromiumLauncher::from_config(&config);
        Agent::new(config, launcher)
    }
}

impl<L: BrowserLauncher> Agent<L> {
    pub fn new(config: Config, launcher: L) -> Self {
        let driver = UploadDriver::new(launcher, DriverSettings::from_config(&config));
        Self {
            config,
            driver,
            lock_path: default_lock_path(),
        }
    }

    pub fn with_lock_path(mut self, lock_path: PathBuf) -> Self {
        self.lock_path = lock_path;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run once against the current clock, aborting the upload on SIGINT or SIGTERM.
    pub async fn run(&self) -> AppResult<RunOutcome> {
        // Handlers are installed before the scan so no signal falls back to the default action.
        let shutdown = listen_for_shutdown();
        self.run_once(Utc::now(), &NothingProcessed, shutdown).await
    }

    pub async fn run_once<S>(
        &self,
        now: DateTime<Utc>,
        processed: &dyn ProcessedFiles,
        shutdown: S,
    ) -> AppResult<RunOutcome>
    where
        S: Future<Output = ()>,
    {
        let run_id = uuid::Uuid::new_v4().to_string();
        log::info!("[{}] Starting claim upload run", run_id);

        let selection = select_recent_files_excluding(
            &self.config.network_location,
            &self.config.file_extensions,
            self.config.selection_window(),
            now,
            processed,
        )?;

        if selection.is_empty() {
            log::info!(
                "No files found from the last {} days. Exiting.",
                self.config.selection_window_days
            );
            return Ok(RunOutcome::NoFiles {
                skipped: selection.skipped.len(),
            });
        }

        log::info!("Found {} files to upload.", selection.files.len());

        let lock = RunLock::acquire_at(&self.lock_path)?;
        log::debug!("[{}] Holding run lock {}", run_id, lock.path().display());

        let report = self
            .driver
            .upload_batch_until(&selection.files, &run_id, shutdown)
            .await?;

        log::info!("Upload complete.");
        Ok(RunOutcome::Uploaded(report))
    }
}

/// Install the termination signal handlers now and resolve when one fires.
///
/// A handler that cannot be installed is logged and never fires.
#[cfg(unix)]
fn listen_for_shutdown() -> impl Future<Output = ()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut interrupt = register(signal(SignalKind::interrupt()), "SIGINT");
    let mut terminate = register(signal(SignalKind::terminate()), "SIGTERM");

    async move {
        tokio::select! {
            Some(()) = async { interrupt.as_mut()?.recv().await } => {
                log::warn!("Received SIGINT, aborting upload");
            }
            Some(()) = async { terminate.as_mut()?.recv().await } => {
                log::warn!("Received SIGTERM, aborting upload");
            }
            else => std::future::pending::<()>().await,
        }
    }
}

#[cfg(windows)]
fn listen_for_shutdown() -> impl Future<Output = ()> {
    use tokio::signal::windows::{ctrl_c, ctrl_close};

    let mut interrupt = register(ctrl_c(), "Ctrl+C");
    let mut close = register(ctrl_close(), "console close");

    async move {
        tokio::select! {
            Some(()) = async { interrupt.as_mut()?.recv().await } => {
                log::warn!("Received Ctrl+C, aborting upload");
            }
            Some(()) = async { close.as_mut()?.recv().await } => {
                log::warn!("Console is closing, aborting upload");
            }
            else => std::future::pending::<()>().await,
        }
    }
}

fn register<T>(listener: std::io::Result<T>, name: &str) -> Option<T> {
    listener
        .map_err(|e| log::warn!("Could not listen for {} (non-critical): {}", name, e))
        .ok()
}
