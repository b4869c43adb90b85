//! `BrowserSession` backed by a visible Chromium instance driven over the DevTools protocol.

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::accessibility::{AxNode, QueryAxTreeParams};
use chromiumoxide::cdp::browser_protocol::dom::{
    BackendNodeId, ResolveNodeParams, SetFileInputFilesParams,
};
use chromiumoxide::cdp::browser_protocol::page::{
    EventFileChooserOpened, FileChooserOpenedMode, SetInterceptFileChooserDialogParams,
};
use chromiumoxide::cdp::js_protocol::runtime::CallFunctionOnParams;
use chromiumoxide::error::CdpError;
use chromiumoxide::listeners::EventStream;
use chromiumoxide::Page;
use futures::StreamExt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Duration};

use crate::config::Config;
use crate::errors::UploadError;

use super::browser::{BrowserLauncher, BrowserSession, Locator};

const READY_STATE_POLL: Duration = Duration::from_millis(100);

const CLICK_FUNCTION: &str =
    "function() { this.scrollIntoView({ block: 'center' }); this.click(); }";

/// Accessibility roles that carry text but are never the control itself.
const TEXT_ROLES: &[&str] = &["StaticText", "InlineTextBox", "LabelText"];

pub struct ChromiumLauncher {
    executable: Option<PathBuf>,
}

impl ChromiumLauncher {
    pub fn new(executable: Option<PathBuf>) -> Self {
        Self { executable }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.browser_executable.clone())
    }
}

#[async_trait]
impl BrowserLauncher for ChromiumLauncher {
    type Session = ChromiumSession;

    async fn launch(&self) -> Result<ChromiumSession, UploadError> {
        // Headed so an operator can watch the upload and step in.
        let mut builder = BrowserConfig::builder().with_head();
        if let Some(executable) = &self.executable {
            builder = builder.chrome_executable(executable);
        }
        let config = builder
            .build()
            .map_err(|reason| UploadError::LaunchFailed { reason })?;

        let (mut browser, mut handler) =
            Browser::launch(config)
                .await
                .map_err(|e| UploadError::LaunchFailed {
                    reason: e.to_string(),
                })?;

        let alive = Arc::new(AtomicBool::new(true));
        let handler_alive = alive.clone();
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    log::debug!("Browser connection event error: {}", e);
                }
            }
            handler_alive.store(false, Ordering::SeqCst);
            log::debug!("Browser connection closed");
        });

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                if let Some(Err(kill_error)) = browser.kill().await {
                    log::warn!("Failed to kill browser after launch failure: {}", kill_error);
                }
                handler_task.abort();
                return Err(UploadError::LaunchFailed {
                    reason: format!("could not open page: {}", e),
                });
            }
        };

        log::info!("Browser launched");

        Ok(ChromiumSession {
            browser,
            page,
            handler_task,
            alive,
        })
    }
}

pub struct ChromiumSession {
    browser: Browser,
    page: Page,
    handler_task: JoinHandle<()>,
    alive: Arc<AtomicBool>,
}

/// Intercepted file chooser: the input element that opened it.
pub struct ChromiumFileChooser {
    backend_node_id: BackendNodeId,
    multiple: bool,
}

impl ChromiumSession {
    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    fn protocol_error(&self, error: CdpError) -> UploadError {
        if self.is_alive() {
            UploadError::Protocol {
                reason: error.to_string(),
            }
        } else {
            UploadError::SessionCrashed {
                reason: error.to_string(),
            }
        }
    }

    fn navigation_error(&self, url: &str, reason: impl ToString) -> UploadError {
        if self.is_alive() {
            UploadError::NavigationFailed {
                url: url.to_string(),
                reason: reason.to_string(),
            }
        } else {
            UploadError::SessionCrashed {
                reason: reason.to_string(),
            }
        }
    }

    async fn load(&self, url: &str) -> Result<(), UploadError> {
        self.page
            .goto(url)
            .await
            .map_err(|e| self.navigation_error(url, e))?;

        let current = self
            .page
            .url()
            .await
            .map_err(|e| self.navigation_error(url, e))?;
        if let Some(current) = current {
            if current.starts_with("chrome-error://") {
                return Err(self.navigation_error(url, "browser showed an error page"));
            }
        }

        loop {
            let state: String = self
                .page
                .evaluate("document.readyState")
                .await
                .map_err(|e| self.navigation_error(url, e))?
                .into_value()
                .map_err(|e| self.navigation_error(url, e))?;

            if state == "interactive" || state == "complete" {
                return Ok(());
            }
            sleep(READY_STATE_POLL).await;
        }
    }
}

fn is_control(node: &AxNode) -> bool {
    if node.ignored {
        return false;
    }
    let role = node
        .role
        .as_ref()
        .and_then(|role| role.value.as_ref())
        .and_then(|value| value.as_str());
    !matches!(role, Some(role) if TEXT_ROLES.contains(&role))
}

#[async_trait]
impl BrowserSession for ChromiumSession {
    type Element = BackendNodeId;
    type ChooserWatch = EventStream<EventFileChooserOpened>;
    type FileChooser = ChromiumFileChooser;

    async fn navigate(&mut self, url: &str, limit: Duration) -> Result<(), UploadError> {
        match timeout(limit, self.load(url)).await {
            Ok(result) => result,
            Err(_) => Err(self.navigation_error(
                url,
                format!(
                    "page did not become interactive within {}ms",
                    limit.as_millis()
                ),
            )),
        }
    }

    async fn find(&mut self, locator: &Locator) -> Result<Vec<BackendNodeId>, UploadError> {
        let document = self
            .page
            .get_document()
            .await
            .map_err(|e| self.protocol_error(e))?;

        let query = QueryAxTreeParams::builder().node_id(document.node_id);
        let query = match locator {
            Locator::Role { role, name } => query.role(role.clone()).accessible_name(name.clone()),
            Locator::Label(label) => query.accessible_name(label.clone()),
        };

        let response = self
            .page
            .execute(query.build())
            .await
            .map_err(|e| self.protocol_error(e))?;

        let found: Vec<BackendNodeId> = response
            .result
            .nodes
            .iter()
            .filter(|node| is_control(node))
            .filter_map(|node| node.backend_dom_node_id.clone())
            .collect();

        log::debug!("{} control(s) match {}", found.len(), locator);
        Ok(found)
    }

    async fn click(&mut self, element: &BackendNodeId) -> Result<(), UploadError> {
        let resolved = self
            .page
            .execute(
                ResolveNodeParams::builder()
                    .backend_node_id(element.clone())
                    .build(),
            )
            .await
            .map_err(|e| self.protocol_error(e))?;

        let object_id =
            resolved
                .result
                .object
                .object_id
                .clone()
                .ok_or_else(|| UploadError::Protocol {
                    reason: "control has no script object to click".to_string(),
                })?;

        // A user gesture is required for file inputs to open their dialog.
        let mut call = CallFunctionOnParams::new(CLICK_FUNCTION);
        call.object_id = Some(object_id);
        call.user_gesture = Some(true);
        call.await_promise = Some(false);

        self.page
            .execute(call)
            .await
            .map_err(|e| self.protocol_error(e))?;
        Ok(())
    }

    async fn arm_file_chooser(&mut self) -> Result<Self::ChooserWatch, UploadError> {
        let watch = self
            .page
            .event_listener::<EventFileChooserOpened>()
            .await
            .map_err(|e| self.protocol_error(e))?;

        self.page
            .execute(SetInterceptFileChooserDialogParams::new(true))
            .await
            .map_err(|e| self.protocol_error(e))?;

        log::debug!("File chooser interception armed");
        Ok(watch)
    }

    async fn await_file_chooser(
        &mut self,
        mut watch: Self::ChooserWatch,
        limit: Duration,
    ) -> Result<ChromiumFileChooser, UploadError> {
        match timeout(limit, watch.next()).await {
            Ok(Some(event)) => {
                let backend_node_id =
                    event
                        .backend_node_id
                        .clone()
                        .ok_or_else(|| UploadError::Protocol {
                            reason: "file chooser event did not name its input".to_string(),
                        })?;
                log::info!("File chooser intercepted");
                Ok(ChromiumFileChooser {
                    backend_node_id,
                    multiple: matches!(event.mode, FileChooserOpenedMode::SelectMultiple),
                })
            }
            Ok(None) => Err(UploadError::SessionCrashed {
                reason: "browser connection closed while waiting for the file chooser"
                    .to_string(),
            }),
            Err(_) => Err(UploadError::FileChooserTimeout {
                timeout_ms: limit.as_millis() as u64,
            }),
        }
    }

    async fn set_files(
        &mut self,
        chooser: ChromiumFileChooser,
        files: &[PathBuf],
    ) -> Result<(), UploadError> {
        if files.len() > 1 && !chooser.multiple {
            log::warn!(
                "File chooser accepts a single file but {} are being attached",
                files.len()
            );
        }

        let paths: Vec<String> = files
            .iter()
            .map(|path| path.to_string_lossy().to_string())
            .collect();
        let mut params = SetFileInputFilesParams::new(paths);
        params.backend_node_id = Some(chooser.backend_node_id);

        self.page
            .execute(params)
            .await
            .map_err(|e| self.protocol_error(e))?;

        if let Err(e) = self
            .page
            .execute(SetInterceptFileChooserDialogParams::new(false))
            .await
        {
            log::warn!("Failed to disarm file chooser interception (non-critical): {}", e);
        }

        Ok(())
    }

    async fn wait(&mut self, duration: Duration) {
        log::info!("Waiting {}ms for the upload to settle", duration.as_millis());
        sleep(duration).await;
    }

    async fn close(&mut self) -> Result<(), UploadError> {
        let mut result = Ok(());

        if let Err(e) = self.browser.close().await {
            log::warn!("Graceful browser shutdown failed, killing process: {}", e);
            if let Some(Err(kill_error)) = self.browser.kill().await {
                result = Err(UploadError::SessionCrashed {
                    reason: format!("browser could not be stopped: {}", kill_error),
                });
            }
        }

        if let Err(e) = self.browser.wait().await {
            log::warn!("Failed to reap browser process (non-critical): {}", e);
        }
        self.handler_task.abort();

        if result.is_ok() {
            log::info!("Browser closed");
        }
        result
    }
}

impl Drop for ChromiumSession {
    fn drop(&mut self) {
        self.handler_task.abort();
    }
}
