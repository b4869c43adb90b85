use futures::FutureExt;
use std::future::Future;
use std::path::PathBuf;
use tokio::time::{sleep, Duration, Instant};

use crate::config::Config;
use crate::errors::{AppError, AppResult, UploadError, UploadStep};

use super::browser::{BrowserLauncher, BrowserSession, Locator};
use super::progress_tracker::{StepTracker, UploadReport};

pub const UPLOAD_CLAIMS_BUTTON: &str = "Upload claims";
pub const BROWSE_LABEL: &str = "Browse";
pub const SUBMIT_BUTTON: &str = "Submit";

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Debug, Clone)]
pub struct DriverSettings {
    pub app_url: String,
    pub navigation_timeout: Duration,
    pub control_timeout: Duration,
    pub file_chooser_timeout: Duration,
    pub quiescence_wait: Duration,
    /// Delay between lookups while waiting for a control to appear.
    pub poll_interval: Duration,
}

impl DriverSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            app_url: config.app_url.clone(),
            navigation_timeout: config.navigation_timeout(),
            control_timeout: config.control_timeout(),
            file_chooser_timeout: config.file_chooser_timeout(),
            quiescence_wait: config.quiescence_wait(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// Drives one browser session through the claims upload form.
pub struct UploadDriver<L: BrowserLauncher> {
    launcher: L,
    settings: DriverSettings,
}

impl<L: BrowserLauncher> UploadDriver<L> {
    pub fn new(launcher: L, settings: DriverSettings) -> Self {
        Self { launcher, settings }
    }

    pub async fn upload_batch(&self, batch: &[PathBuf], run_id: &str) -> AppResult<UploadReport> {
        self.upload_batch_until(batch, run_id, std::future::pending())
            .await
    }

    /// Upload `batch` as one attachment, aborting the current step if `shutdown` resolves first.
    ///
    /// The browser is closed on every path out of this function once it has launched.
    pub async fn upload_batch_until<S>(
        &self,
        batch: &[PathBuf],
        run_id: &str,
        shutdown: S,
    ) -> AppResult<UploadReport>
    where
        S: Future<Output = ()>,
    {
        if batch.is_empty() {
            return Err(AppError::validation("batch", "Upload batch must not be empty"));
        }

        let mut shutdown = std::pin::pin!(shutdown);
        if shutdown.as_mut().now_or_never().is_some() {
            log::warn!("[{}] Shutdown requested before launch, not starting the browser", run_id);
            return Err(AppError::upload(UploadStep::Launched, UploadError::Interrupted));
        }

        let mut tracker = StepTracker::new(run_id);

        // A launch in flight is never dropped: the session it yields must be closed.
        tracker.begin(UploadStep::Launched);
        let launch = self.launcher.launch();
        tokio::pin!(launch);
        let (launched, interrupted) = tokio::select! {
            launched = &mut launch => (launched, false),
            _ = shutdown.as_mut() => {
                log::warn!("[{}] Shutdown requested while the browser starts", run_id);
                (launch.await, true)
            }
        };

        let mut session = match launched {
            Ok(session) => session,
            Err(e) => {
                let step = tracker.fail(&e);
                tracker.finish(0);
                return Err(AppError::upload(step, e));
            }
        };

        let outcome = if interrupted {
            Err(UploadError::Interrupted)
        } else {
            tracker.complete();
            tokio::select! {
                result = self.run_steps(&mut session, batch, &mut tracker) => result,
                _ = shutdown.as_mut() => Err(UploadError::Interrupted),
            }
        };

        let failure = outcome.err().map(|e| (tracker.fail(&e), e));
        let attached = if tracker
            .completed_steps()
            .contains(&UploadStep::FilesAttached)
        {
            batch.len()
        } else {
            0
        };

        tracker.begin(UploadStep::Closed);
        let closed = session.close().await;

        match (failure, closed) {
            (Some((step, error)), closed) => {
                match closed {
                    Ok(()) => tracker.complete(),
                    Err(e) => log::warn!(
                        "Failed to close browser after failed run (non-critical): {}",
                        e
                    ),
                }
                tracker.finish(attached);
                Err(AppError::upload(step, error))
            }
            (None, Err(e)) => {
                let step = tracker.fail(&e);
                tracker.finish(attached);
                Err(AppError::upload(step, e))
            }
            (None, Ok(())) => {
                tracker.complete();
                Ok(tracker.finish(attached))
            }
        }
    }

    async fn run_steps(
        &self,
        session: &mut L::Session,
        batch: &[PathBuf],
        tracker: &mut StepTracker,
    ) -> Result<(), UploadError> {
        tracker.begin(UploadStep::Navigated);
        log::info!("Opening {}", self.settings.app_url);
        session
            .navigate(&self.settings.app_url, self.settings.navigation_timeout)
            .await?;
        tracker.complete();

        tracker.begin(UploadStep::UploadTriggered);
        let upload_button = self
            .locate(session, &Locator::button(UPLOAD_CLAIMS_BUTTON))
            .await?;
        session.click(&upload_button).await?;
        tracker.complete();

        // Interception must be armed before the click that opens the dialog.
        tracker.begin(UploadStep::FileChooserOpened);
        let browse = self.locate(session, &Locator::label(BROWSE_LABEL)).await?;
        let watch = session.arm_file_chooser().await?;
        session.click(&browse).await?;
        let chooser = session
            .await_file_chooser(watch, self.settings.file_chooser_timeout)
            .await?;
        tracker.complete();

        tracker.begin(UploadStep::FilesAttached);
        log::info!("Attaching {} file(s) to the upload form", batch.len());
        for path in batch {
            log::debug!("  {}", path.display());
        }
        session.set_files(chooser, batch).await?;
        tracker.complete();

        tracker.begin(UploadStep::Submitted);
        let submit = self.locate(session, &Locator::button(SUBMIT_BUTTON)).await?;
        session.click(&submit).await?;
        tracker.complete();

        // Success is not confirmed by the portal; give it time to finish client-side.
        tracker.begin(UploadStep::Settled);
        session.wait(self.settings.quiescence_wait).await;
        tracker.complete();

        Ok(())
    }

    /// Wait until exactly one control matches `locator`.
    async fn locate<S: BrowserSession>(
        &self,
        session: &mut S,
        locator: &Locator,
    ) -> Result<S::Element, UploadError> {
        let deadline = Instant::now() + self.settings.control_timeout;

        loop {
            let mut found = session.find(locator).await?;

            match found.len() {
                1 => return Ok(found.swap_remove(0)),
                0 if Instant::now() >= deadline => {
                    return Err(UploadError::ControlNotFound {
                        locator: locator.to_string(),
                        timeout_ms: self.settings.control_timeout.as_millis() as u64,
                    });
                }
                0 => {
                    log::debug!("Waiting for {} to appear", locator);
                    sleep(self.settings.poll_interval).await;
                }
                count => {
                    return Err(UploadError::AmbiguousControl {
                        locator: locator.to_string(),
                        count,
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_follow_config() {
        let mut config = Config::default();
        config.app_url = "https://portal.example.com/claims".to_string();
        config.quiescence_wait_ms = 1500;
        config.file_chooser_timeout_ms = 2000;

        let settings = DriverSettings::from_config(&config);

        assert_eq!(settings.app_url, "https://portal.example.com/claims");
        assert_eq!(settings.quiescence_wait, Duration::from_millis(1500));
        assert_eq!(settings.file_chooser_timeout, Duration::from_secs(2));
        assert_eq!(settings.control_timeout, Duration::from_secs(10));
        assert_eq!(settings.poll_interval, DEFAULT_POLL_INTERVAL);
    }
}
