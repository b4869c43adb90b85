//! Picks the claim files that belong in this run's upload batch.
//!
//! A file qualifies when its name ends with one of the configured extensions
//! and its creation timestamp is strictly newer than `now - window`. Only the
//! immediate entries of the directory are considered.

use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::errors::{AppError, AppResult};

/// One immediate entry of the scanned directory.
#[derive(Debug)]
pub struct DirectoryEntry {
    pub path: PathBuf,
    pub is_dir: bool,
    pub created: io::Result<SystemTime>,
}

/// Result of a scan: the batch to upload plus per-entry warnings.
#[derive(Debug, Default)]
pub struct Selection {
    pub files: Vec<PathBuf>,
    /// `MetadataUnavailable` errors for entries that were skipped.
    pub skipped: Vec<AppError>,
    pub already_processed: usize,
}

impl Selection {
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Paths that should not be selected again even if they are still inside the window.
pub trait ProcessedFiles {
    fn contains(&self, path: &Path) -> bool;
}

/// Every run re-selects everything in the window.
#[derive(Debug, Default, Clone, Copy)]
pub struct NothingProcessed;

impl ProcessedFiles for NothingProcessed {
    fn contains(&self, _path: &Path) -> bool {
        false
    }
}

impl ProcessedFiles for HashSet<PathBuf> {
    fn contains(&self, path: &Path) -> bool {
        HashSet::contains(self, path)
    }
}

pub fn select_recent_files(
    directory: &Path,
    extensions: &[String],
    window: chrono::Duration,
    now: DateTime<Utc>,
) -> AppResult<Selection> {
    select_recent_files_excluding(directory, extensions, window, now, &NothingProcessed)
}

pub fn select_recent_files_excluding(
    directory: &Path,
    extensions: &[String],
    window: chrono::Duration,
    now: DateTime<Utc>,
    processed: &dyn ProcessedFiles,
) -> AppResult<Selection> {
    log::info!(
        "Scanning {} for {} created after {}",
        directory.display(),
        extensions.join(", "),
        now - window
    );

    let entries = scan_directory(directory)?;
    let selection = filter_entries(entries, extensions, window, now, processed);

    log::info!(
        "Selected {} file(s) from {} ({} skipped, {} already processed)",
        selection.files.len(),
        directory.display(),
        selection.skipped.len(),
        selection.already_processed
    );

    Ok(selection)
}

/// List the immediate entries of `directory`, reading each one's metadata.
pub fn scan_directory(directory: &Path) -> AppResult<Vec<DirectoryEntry>> {
    let directory = absolute_path(directory)?;

    let listing = fs::read_dir(&directory)
        .map_err(|e| AppError::directory_unavailable(&directory, e))?;

    let mut entries = Vec::new();
    for entry in listing {
        // A listing that breaks halfway (dropped share) is not "zero files".
        let entry = entry.map_err(|e| AppError::directory_unavailable(&directory, e))?;
        let path = entry.path();

        let (is_dir, created) = match fs::metadata(&path) {
            Ok(metadata) => (metadata.is_dir(), creation_timestamp(&metadata)),
            Err(e) => (false, Err(e)),
        };

        entries.push(DirectoryEntry {
            path,
            is_dir,
            created,
        });
    }

    Ok(entries)
}

/// Apply the extension and window predicate to already-listed entries.
///
/// The cutoff is computed once from `now`; entries keep their listing order.
pub fn filter_entries<I>(
    entries: I,
    extensions: &[String],
    window: chrono::Duration,
    now: DateTime<Utc>,
    processed: &dyn ProcessedFiles,
) -> Selection
where
    I: IntoIterator<Item = DirectoryEntry>,
{
    let cutoff = now - window;
    let mut selection = Selection::default();

    for entry in entries {
        if entry.is_dir || !matches_extension(&entry.path, extensions) {
            continue;
        }

        let created = match entry.created {
            Ok(created) => DateTime::<Utc>::from(created),
            Err(e) => {
                let warning = AppError::metadata_unavailable(&entry.path, e);
                log::warn!("Skipping entry: {}", warning);
                selection.skipped.push(warning);
                continue;
            }
        };

        if created <= cutoff {
            log::debug!(
                "Ignoring {} (created {}, cutoff {})",
                entry.path.display(),
                created,
                cutoff
            );
            continue;
        }

        if processed.contains(&entry.path) {
            log::debug!("Ignoring {} (already processed)", entry.path.display());
            selection.already_processed += 1;
            continue;
        }

        selection.files.push(entry.path);
    }

    selection
}

/// Exact, case-sensitive suffix match on the file name.
pub fn matches_extension(path: &Path, extensions: &[String]) -> bool {
    let Some(name) = path.file_name() else {
        return false;
    };
    let name = name.to_string_lossy();
    extensions.iter().any(|ext| name.ends_with(ext.as_str()))
}

/// Best available creation-like timestamp.
///
/// Uses the birth time where the platform reports one (Windows, macOS,
/// Linux statx). Otherwise Unix falls back to `st_ctime`, the time of the
/// last status change.
pub fn creation_timestamp(metadata: &fs::Metadata) -> io::Result<SystemTime> {
    match metadata.created() {
        Ok(created) => Ok(created),
        #[cfg(unix)]
        Err(_) => {
            use std::os::unix::fs::MetadataExt;

            let secs = u64::try_from(metadata.ctime()).map_err(|_| {
                io::Error::new(io::ErrorKind::InvalidData, "ctime before the Unix epoch")
            })?;
            let nanos = u32::try_from(metadata.ctime_nsec()).unwrap_or(0);
            Ok(SystemTime::UNIX_EPOCH + std::time::Duration::new(secs, nanos))
        }
        #[cfg(not(unix))]
        Err(e) => Err(e),
    }
}

fn absolute_path(directory: &Path) -> AppResult<PathBuf> {
    if directory.is_absolute() {
        return Ok(directory.to_path_buf());
    }
    let cwd = std::env::current_dir().map_err(|e| AppError::directory_unavailable(directory, e))?;
    Ok(cwd.join(directory))
}
