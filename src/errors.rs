use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {field} - {message}")]
    Validation { field: String, message: String },

    #[error("Directory unavailable: {path}: {reason}")]
    DirectoryUnavailable { path: PathBuf, reason: String },

    #[error("Metadata unavailable for {path}: {reason}")]
    MetadataUnavailable { path: PathBuf, reason: String },

    #[error("Another upload run is already in progress (PID {pid})")]
    AlreadyRunning { pid: u32 },

    #[error("Upload aborted at step '{step}': {source}")]
    Upload {
        step: UploadStep,
        #[source]
        source: UploadError,
    },
}

/// Failures of the browser-driven upload sequence. All of them end the run.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UploadError {
    #[error("Failed to launch browser: {reason}")]
    LaunchFailed { reason: String },

    #[error("Navigation to {url} failed: {reason}")]
    NavigationFailed { url: String, reason: String },

    #[error("No control matching {locator} appeared within {timeout_ms}ms")]
    ControlNotFound { locator: String, timeout_ms: u64 },

    #[error("{count} controls match {locator}, expected exactly one")]
    AmbiguousControl { locator: String, count: usize },

    #[error("File chooser did not open within {timeout_ms}ms")]
    FileChooserTimeout { timeout_ms: u64 },

    #[error("Browser session crashed: {reason}")]
    SessionCrashed { reason: String },

    #[error("Browser protocol error: {reason}")]
    Protocol { reason: String },

    #[error("Interrupted by shutdown signal")]
    Interrupted,
}

/// Steps of the upload sequence, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum UploadStep {
    Launched,
    Navigated,
    UploadTriggered,
    FileChooserOpened,
    FilesAttached,
    Submitted,
    Settled,
    Closed,
}

impl UploadStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            UploadStep::Launched => "launch browser",
            UploadStep::Navigated => "open application",
            UploadStep::UploadTriggered => "click 'Upload claims'",
            UploadStep::FileChooserOpened => "open file chooser",
            UploadStep::FilesAttached => "attach files",
            UploadStep::Submitted => "click 'Submit'",
            UploadStep::Settled => "wait for upload to settle",
            UploadStep::Closed => "close browser",
        }
    }
}

impl fmt::Display for UploadStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Custom result type
pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn validation(field: &str, message: &str) -> Self {
        Self::Validation {
            field: field.to_string(),
            message: message.to_string(),
        }
    }

    pub fn directory_unavailable(path: &Path, reason: impl fmt::Display) -> Self {
        Self::DirectoryUnavailable {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        }
    }

    pub fn metadata_unavailable(path: &Path, reason: impl fmt::Display) -> Self {
        Self::MetadataUnavailable {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        }
    }

    pub fn upload(step: UploadStep, source: UploadError) -> Self {
        Self::Upload { step, source }
    }

    /// The upload step that failed, if this error came from the driver.
    pub fn failed_step(&self) -> Option<UploadStep> {
        match self {
            AppError::Upload { step, .. } => Some(*step),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upload_error_message_names_the_step() {
        let err = AppError::upload(
            UploadStep::Submitted,
            UploadError::ControlNotFound {
                locator: "button \"Submit\"".to_string(),
                timeout_ms: 10_000,
            },
        );

        let message = err.to_string();
        assert!(message.contains("click 'Submit'"));
        assert!(message.contains("button \"Submit\""));
        assert_eq!(err.failed_step(), Some(UploadStep::Submitted));
    }

    #[test]
    fn scan_errors_have_no_step() {
        let missing = AppError::directory_unavailable(Path::new("/share"), "not found");

        assert!(missing.to_string().contains("/share"));
        assert_eq!(missing.failed_step(), None);
    }

    #[test]
    fn steps_are_ordered_by_execution() {
        assert!(UploadStep::Launched < UploadStep::Navigated);
        assert!(UploadStep::Submitted < UploadStep::Settled);
        assert!(UploadStep::Settled < UploadStep::Closed);
    }
}
