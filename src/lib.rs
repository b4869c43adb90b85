//! Uploads this week's claim files from a network share through the claims portal.
//!
//! [`selector`] decides which files belong in the batch; [`uploader`] walks the
//! portal's upload form in a visible browser; [`agent`] ties the two together.

pub mod agent;
pub mod config;
pub mod errors;
pub mod selector;
pub mod single_instance;
pub mod uploader;

pub use agent::{Agent, RunOutcome};
pub use config::{default_location_for, load_config, Config, Platform};
pub use errors::{AppError, AppResult, UploadError, UploadStep};
pub use selector::{select_recent_files, ProcessedFiles, Selection};
