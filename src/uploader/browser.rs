use async_trait::async_trait;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::errors::UploadError;

/// How a control on the page is identified.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Locator {
    /// Accessible role plus exact accessible name, e.g. a button's visible text.
    Role { role: String, name: String },
    /// Exact accessible label, e.g. a file input labelled "Browse".
    Label(String),
}

impl Locator {
    pub fn role(role: &str, name: &str) -> Self {
        Locator::Role {
            role: role.to_string(),
            name: name.to_string(),
        }
    }

    pub fn label(label: &str) -> Self {
        Locator::Label(label.to_string())
    }

    pub fn button(name: &str) -> Self {
        Self::role("button", name)
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::Role { role, name } => write!(f, "{} \"{}\"", role, name),
            Locator::Label(label) => write!(f, "label \"{}\"", label),
        }
    }
}

/// Starts a fresh browser session.
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    type Session: BrowserSession;

    async fn launch(&self) -> Result<Self::Session, UploadError>;
}

/// The browser capabilities the upload sequence needs.
///
/// Implementations report a dead browser as [`UploadError::SessionCrashed`].
#[async_trait]
pub trait BrowserSession: Send {
    /// Handle to a located control.
    type Element: Send + Sync;
    /// Armed, not yet fired, file chooser interception.
    type ChooserWatch: Send;
    /// An intercepted file chooser waiting for files.
    type FileChooser: Send;

    /// Load `url` and wait until the document is interactive.
    async fn navigate(&mut self, url: &str, timeout: Duration) -> Result<(), UploadError>;

    /// Every control currently matching `locator`. Does not wait.
    async fn find(&mut self, locator: &Locator) -> Result<Vec<Self::Element>, UploadError>;

    async fn click(&mut self, element: &Self::Element) -> Result<(), UploadError>;

    /// Start intercepting the native file dialog. Must be called before the triggering click.
    async fn arm_file_chooser(&mut self) -> Result<Self::ChooserWatch, UploadError>;

    /// Wait for the armed interception to fire.
    async fn await_file_chooser(
        &mut self,
        watch: Self::ChooserWatch,
        timeout: Duration,
    ) -> Result<Self::FileChooser, UploadError>;

    /// Hand all `files` to the chooser in a single call.
    async fn set_files(
        &mut self,
        chooser: Self::FileChooser,
        files: &[PathBuf],
    ) -> Result<(), UploadError>;

    async fn wait(&mut self, duration: Duration);

    async fn close(&mut self) -> Result<(), UploadError>;
}
