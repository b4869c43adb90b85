use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use sysinfo::{Pid, System};
use uuid::Uuid;

use crate::errors::{AppError, AppResult};

const LOCK_FILE_NAME: &str = "claim_uploader.lock";
const MAX_ACQUIRE_ATTEMPTS: usize = 3;

/// Held while an upload run owns the browser. Removes its lock file on drop.
#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
}

impl RunLock {
    /// Take the run lock at `path`, replacing a lock left behind by a dead process.
    pub fn acquire_at(path: &Path) -> AppResult<Self> {
        let current_pid = std::process::id();

        for _ in 0..MAX_ACQUIRE_ATTEMPTS {
            if create_exclusive(path, current_pid)? {
                log::debug!("Created lock file {} with PID: {}", path.display(), current_pid);
                return Ok(Self {
                    path: path.to_path_buf(),
                });
            }

            match read_lock_owner(path) {
                Some(pid) if is_uploader_process(pid) => {
                    log::info!("Found running upload (PID: {}), refusing to start", pid);
                    return Err(AppError::AlreadyRunning { pid });
                }
                Some(pid) => log::info!("Removing stale lock file left by PID {}", pid),
                None => log::info!("Removing unreadable lock file {}", path.display()),
            }

            match fs::remove_file(path) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }

        Err(AppError::Io(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("could not take run lock {}", path.display()),
        )))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if read_lock_owner(&self.path) != Some(std::process::id()) {
            log::warn!(
                "Lock file {} no longer belongs to this run, leaving it",
                self.path.display()
            );
            return;
        }

        if let Err(e) = fs::remove_file(&self.path) {
            log::warn!("Failed to remove lock file {}: {}", self.path.display(), e);
        } else {
            log::debug!("Cleaned up lock file");
        }
    }
}

/// Publish a lock file naming `pid`, failing with `false` if one already exists.
///
/// The PID is written to a private staging file first, so a reader never sees
/// the lock file half-written.
fn create_exclusive(path: &Path, pid: u32) -> io::Result<bool> {
    let staging = path.with_file_name(format!(
        ".{}.{}",
        path.file_name()
            .and_then(|name| name.to_str())
            .unwrap_or(LOCK_FILE_NAME),
        Uuid::new_v4()
    ));

    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&staging)?;
    let written = file.write_all(pid.to_string().as_bytes());
    drop(file);

    let published = written.and_then(|()| fs::hard_link(&staging, path));
    if let Err(e) = fs::remove_file(&staging) {
        log::debug!("Failed to remove staging file {}: {}", staging.display(), e);
    }

    match published {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(false),
        Err(e) => Err(e),
    }
}

/// Get the path to the lock file
pub fn default_lock_path() -> PathBuf {
    std::env::temp_dir().join(LOCK_FILE_NAME)
}

fn read_lock_owner(path: &Path) -> Option<u32> {
    fs::read_to_string(path).ok()?.trim().parse().ok()
}

/// Whether `pid` is this process, or alive and looks like this tool.
fn is_uploader_process(pid: u32) -> bool {
    if pid == std::process::id() {
        return true;
    }

    let mut system = System::new();
    system.refresh_processes();

    match system.process(Pid::from(pid as usize)) {
        Some(process) => {
            let name = process.name().to_lowercase();
            name.contains("claim") || name.contains("uploader")
        }
        None => false,
    }
}
