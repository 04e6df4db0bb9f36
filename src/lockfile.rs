//! Instance lock: one watcher per tree, recorded as a PID in a dotfile at the root.

use std::path::{Path, PathBuf};

use crate::config::LOCK_FILE_NAME;
use crate::error::Error;

/// Held for the lifetime of a watcher. Dropping it removes the lock file,
/// provided the file still names this process.
#[derive(Debug)]
pub struct InstanceLock {
    /// Lock file path.
    path: PathBuf,
    /// Our process identifier, as written to the file.
    pid: u32,
}

/// What the lock file currently says.
#[derive(Debug, PartialEq, Eq)]
enum LockState {
    /// No lock file.
    Absent,
    /// Present but not a decimal PID.
    Malformed,
    /// Owned by the given process.
    Owned(u32),
}

impl InstanceLock {
    /// Take the lock for `root`. A lock left by a dead process, or one that
    /// cannot be parsed, is overwritten with a warning.
    ///
    /// # Errors
    ///
    /// Returns `Error::LockHeld` if a live process owns the lock, or
    /// `Error::Io` if the lock file cannot be read or written.
    pub fn acquire(root: &Path) -> Result<Self, Error> {
        let path = root.join(LOCK_FILE_NAME);
        let pid = std::process::id();
        match read_state(&path)? {
            LockState::Absent => {},
            LockState::Malformed => {
                tracing::warn!(path = %path.display(), "overwriting malformed lock file");
            },
            LockState::Owned(owner) if owner != pid && is_alive(owner) => {
                return Err(Error::LockHeld { path, pid: owner });
            },
            LockState::Owned(owner) => {
                tracing::warn!(path = %path.display(), stale_pid = owner, "overwriting stale lock file");
            },
        }
        std::fs::write(&path, format!("{pid}\n"))?;
        tracing::info!(event = "lock_acquired", path = %path.display(), pid, "instance lock acquired");
        return Ok(Self { path, pid });
    }

    /// Lock file path.
    pub fn path(&self) -> &Path {
        return &self.path;
    }
}

impl Drop for InstanceLock {
    /// Remove the lock file unless another process has since taken it over.
    fn drop(&mut self) {
        if !matches!(read_state(&self.path), Ok(LockState::Owned(owner)) if owner == self.pid) {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => tracing::info!(event = "lock_released", path = %self.path.display(), "instance lock released"),
            Err(e) => tracing::warn!(path = %self.path.display(), error = %e, "could not remove lock file"),
        }
    }
}

/// Whether a process with this identifier exists.
#[cfg(target_os = "linux")]
fn is_alive(pid: u32) -> bool {
    return Path::new("/proc").join(pid.to_string()).exists();
}

/// Whether a process with this identifier exists.
#[cfg(all(unix, not(target_os = "linux")))]
fn is_alive(pid: u32) -> bool {
    return std::process::Command::new("kill")
        .args(["-0", &pid.to_string()])
        .stderr(std::process::Stdio::null())
        .status()
        .is_ok_and(|status| return status.success());
}

/// Whether a process with this identifier exists. Without a cheap probe,
/// any recorded owner counts as live.
#[cfg(not(unix))]
const fn is_alive(_pid: u32) -> bool {
    return true;
}

/// Read and classify the lock file.
///
/// # Errors
///
/// Returns `Error::Io` for read failures other than the file being absent.
fn read_state(path: &Path) -> Result<LockState, Error> {
    let content = match std::fs::read_to_string(path) {
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(LockState::Absent),
        Err(e) if e.kind() == std::io::ErrorKind::InvalidData => return Ok(LockState::Malformed),
        Err(e) => return Err(Error::Io(e)),
        Ok(c) => c,
    };
    return Ok(content.trim().parse::<u32>().map_or(LockState::Malformed, LockState::Owned));
}
