//! Single-instance guard backed by a lock file.
//!
//! Only one grab may run on the machine at a time: two sessions would fight
//! over the system cursors and both try to swallow the same click.  The
//! guard is a file created with create-new semantics; its existence means
//! a grab is running (or crashed without cleaning up).  The file holds the
//! owner's pid so a contender can say who is in the way and cleanup can
//! tell a live session from a stale one.

use crate::traits::Platform;
use log::{debug, warn};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// File name used when no lock path is configured.
pub const DEFAULT_LOCK_FILE_NAME: &str = "WINGRAB.LOCKFILE";

/// Errors produced while acquiring the lock.
#[derive(Debug, thiserror::Error)]
pub enum LockError {
    /// Another session owns the lock file.
    #[error("another wingrab instance is already running (lock file {}{})", .path.display(), holder_suffix(.holder))]
    AlreadyRunning { path: PathBuf, holder: Option<u32> },

    /// The lock file cannot be created where it is configured.
    #[error("unable to create lock file {}: {source}", .path.display())]
    PermissionDenied {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("lock file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

pub(crate) fn holder_suffix(holder: &Option<u32>) -> String {
    match holder {
        Some(pid) => format!(", held by pid {}", pid),
        None => String::new(),
    }
}

/// Exclusive ownership of the lock file.
///
/// Released on [`release`](InstanceLock::release) or on drop, whichever
/// comes first.
#[derive(Debug)]
pub struct InstanceLock {
    path: PathBuf,
    file: Option<File>,
}

impl InstanceLock {
    /// Claim the lock file at `path`, treating every recorded holder as
    /// alive.
    ///
    /// Missing parent directories are created.  Fails with
    /// [`LockError::AlreadyRunning`] if the file already exists.
    pub fn acquire(path: impl AsRef<Path>) -> Result<Self, LockError> {
        Self::acquire_with(path, |_| true)
    }

    /// Claim the lock file at `path`, taking over a stale one.
    ///
    /// An existing file whose recorded holder is another process for which
    /// `holder_alive` answers `false` was left by a grab that died without
    /// unwinding: it is removed and creation is retried once.  A file
    /// without a readable pid, or holding this process's own pid, is always
    /// treated as held.
    pub fn acquire_with<F>(path: impl AsRef<Path>, holder_alive: F) -> Result<Self, LockError>
    where
        F: Fn(u32) -> bool,
    {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            if let Err(source) = fs::create_dir_all(parent) {
                return Err(classify(path, source));
            }
        }

        let mut file = match create_new(&path) {
            Ok(file) => file,
            Err(LockError::AlreadyRunning {
                path,
                holder: Some(pid),
            }) if pid != std::process::id() && !holder_alive(pid) => {
                warn!(
                    "lock {} was left by process {} which is gone, taking it over",
                    path.display(),
                    pid
                );
                // Another contender may have taken it over already.
                if read_holder(&path) == Some(pid) {
                    remove_lock_file(&path);
                }
                create_new(&path)?
            }
            Err(e) => return Err(e),
        };

        // The pid is informational; a lock without it is still a lock.
        if let Err(e) = writeln!(file, "{}", std::process::id()).and_then(|_| file.flush()) {
            warn!("could not record pid in {}: {}", path.display(), e);
        }

        debug!("acquired lock {}", path.display());
        Ok(Self {
            path,
            file: Some(file),
        })
    }

    /// The lock file's path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether this guard still owns the file.
    pub fn is_held(&self) -> bool {
        self.file.is_some()
    }

    /// Close and delete the lock file.
    ///
    /// A second call is a no-op.  A file that already vanished is fine;
    /// any other removal failure is logged and swallowed.
    pub fn release(&mut self) {
        let Some(file) = self.file.take() else {
            return;
        };
        // Close before deleting: Windows refuses to remove an open file.
        drop(file);
        remove_lock_file(&self.path);
        debug!("released lock {}", self.path.display());
    }
}

impl Drop for InstanceLock {
    fn drop(&mut self) {
        self.release();
    }
}

/// Delete the lock file at `path` regardless of who created it.
///
/// Used by cleanup to clear a lock left behind by a crashed session.
/// Returns whether a file was actually removed.
pub fn force_release(path: impl AsRef<Path>) -> bool {
    remove_lock_file(path.as_ref())
}

/// Whether `pid`, read from the lock file at `path`, still stands for the
/// grab that wrote it.
///
/// The process must be running, and must not have been started after the
/// file was last written: a younger process only reused the pid.
pub fn holder_alive<P: Platform>(platform: &P, path: &Path, pid: u32) -> bool {
    if !platform.is_process_running(pid) {
        return false;
    }
    let written = fs::metadata(path).and_then(|m| m.modified());
    match (platform.process_started_at(pid), written) {
        (Some(started), Ok(written)) => started <= written,
        _ => true,
    }
}

/// The pid recorded in the lock file, if the file exists and holds one.
pub fn read_holder(path: impl AsRef<Path>) -> Option<u32> {
    fs::read_to_string(path).ok()?.trim().parse().ok()
}

fn remove_lock_file(path: &Path) -> bool {
    match fs::remove_file(path) {
        Ok(()) => true,
        Err(e) if e.kind() == io::ErrorKind::NotFound => false,
        Err(e) => {
            warn!("could not remove lock file {}: {}", path.display(), e);
            false
        }
    }
}

fn create_new(path: &Path) -> Result<File, LockError> {
    match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(file) => Ok(file),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Err(LockError::AlreadyRunning {
            path: path.to_path_buf(),
            holder: read_holder(path),
        }),
        Err(source) => Err(classify(path.to_path_buf(), source)),
    }
}

fn classify(path: PathBuf, source: io::Error) -> LockError {
    if source.kind() == io::ErrorKind::PermissionDenied {
        LockError::PermissionDenied { path, source }
    } else {
        LockError::Io { path, source }
    }
}

//  Tests
