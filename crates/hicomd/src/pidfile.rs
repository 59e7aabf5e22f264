//! Daemon PID file.
//!
//! `hicomd start` records its process id here; `stop` and `status` read it
//! back. A file naming a process that no longer exists is stale and is
//! removed on the next lookup.

use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use thiserror::Error;
use tracing::debug;

/// Location of the daemon's PID file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<state dir>/hicom/hicomd.pid`, falling back to `/tmp` without a
    /// state directory.
    pub fn default_path() -> PathBuf {
        dirs::state_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join("hicom")
            .join("hicomd.pid")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Log file kept next to the PID file for background runs.
    pub fn log_path(&self) -> PathBuf {
        self.path.with_extension("log")
    }

    /// Reads the recorded process id, if the file exists and parses.
    pub fn read(&self) -> Option<u32> {
        fs::read_to_string(&self.path).ok()?.trim().parse().ok()
    }

    /// Records the current process.
    ///
    /// # Errors
    ///
    /// Returns `PidFileError::Io` if the directory or file cannot be written.
    pub fn write_current(&self) -> Result<(), PidFileError> {
        self.write(process::id())
    }

    /// Records `pid`, creating the parent directory if needed.
    ///
    /// # Errors
    ///
    /// Returns `PidFileError::Io` if the directory or file cannot be written.
    pub fn write(&self, pid: u32) -> Result<(), PidFileError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| self.io_error(&e))?;
        }
        fs::write(&self.path, pid.to_string()).map_err(|e| self.io_error(&e))
    }

    /// Removes the file. A missing file is not an error.
    pub fn remove(&self) {
        if let Err(e) = fs::remove_file(&self.path) {
            debug!(path = %self.path.display(), error = %e, "PID file not removed");
        }
    }

    /// Returns the recorded pid if that process is still alive.
    ///
    /// A stale file is removed.
    pub fn running_pid(&self) -> Option<u32> {
        let pid = self.read()?;
        if is_process_running(pid) {
            return Some(pid);
        }
        debug!(pid, path = %self.path.display(), "Removing stale PID file");
        self.remove();
        None
    }

    fn io_error(&self, error: &std::io::Error) -> PidFileError {
        PidFileError::Io {
            path: self.path.clone(),
            error: error.to_string(),
        }
    }
}

/// Returns true if a process with this id exists.
pub fn is_process_running(pid: u32) -> bool {
    Path::new("/proc").join(pid.to_string()).exists()
}

/// Errors writing the PID file.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PidFileError {
    #[error("Cannot write PID file {path}: {error}")]
    Io { path: PathBuf, error: String },
}
