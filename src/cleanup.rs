//! Recovery from a grab that died without unwinding.
//!
//! A process killed mid-grab leaves the system cursors patched and the lock
//! file in place, which blocks every later grab.  [`cleanup_with`] puts the
//! user's cursor scheme back and deletes the lock, unless the lock belongs
//! to a grab that is still alive in another process.

use crate::config::Config;
use crate::lock;
use crate::traits::Platform;
use log::{info, warn};

/// What [`cleanup_with`] did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub cursors_reloaded: bool,
    pub lock_removed: bool,
    /// Set when a live grab in another process owns the lock; nothing was
    /// touched.
    pub live_holder: Option<u32>,
}

impl CleanupReport {
    /// Whether cleanup ran, as opposed to backing off from a live grab.
    pub fn performed(&self) -> bool {
        self.live_holder.is_none()
    }
}

/// Restore the cursor scheme and remove a stale lock file.
///
/// Never fails: problems are logged and reflected in the report.  Running
/// it with nothing to clean up changes nothing.
pub fn cleanup_with<P: Platform>(platform: &P, config: &Config) -> CleanupReport {
    let path = config.lock_path();
    let mut report = CleanupReport::default();

    if let Some(pid) = lock::read_holder(&path) {
        if pid != std::process::id() && lock::holder_alive(platform, &path, pid) {
            warn!(
                "lock {} is held by running process {}, leaving it alone",
                path.display(),
                pid
            );
            report.live_holder = Some(pid);
            return report;
        }
    }

    match platform.reload_system_cursors() {
        Ok(()) => report.cursors_reloaded = true,
        Err(e) => warn!("could not reload system cursors: {}", e),
    }

    report.lock_removed = lock::force_release(&path);
    if report.lock_removed {
        info!("removed stale lock {}", path.display());
    }
    report
}
