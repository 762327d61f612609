//! Running a grab on its own thread.
//!
//! The hook belongs to the thread that installs it and only fires while
//! that thread pumps messages, so the platform is created on the worker
//! itself.  The caller keeps a [`GrabThread`] to cancel or wait on it.
//! Dropping the handle of a grab that is still running cancels it and waits
//! for it to unwind, so a caller returning early never leaves the cursors
//! patched behind a detached thread.

use crate::cancel::CancelToken;
use crate::config::Config;
use crate::platform;
use crate::session::{GrabError, GrabSession};
use crate::traits::Platform;
use crate::types::GrabOutcome;
use log::{debug, error, warn};
use std::thread::{self, JoinHandle};

/// Name given to worker threads.
const THREAD_NAME: &str = "wingrab-grab";

/// Handle to a grab running on a worker thread.
pub struct GrabThread {
    handle: Option<JoinHandle<Result<GrabOutcome, GrabError>>>,
    cancel: CancelToken,
}

impl GrabThread {
    /// Ask the grab to stop.  It unwinds and [`join`](GrabThread::join)
    /// then yields [`GrabOutcome::Interrupted`].
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Wait for the grab to end.
    pub fn join(mut self) -> Result<GrabOutcome, GrabError> {
        match self.handle.take() {
            Some(handle) => join_grab(handle),
            None => Err(GrabError::WorkerPanicked),
        }
    }
}

impl Drop for GrabThread {
    fn drop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        if !handle.is_finished() {
            debug!("grab thread handle dropped while running, cancelling");
            self.cancel.cancel();
        }
        if let Err(e) = join_grab(handle) {
            warn!("abandoned grab ended with: {}", e);
        }
    }
}

fn join_grab(
    handle: JoinHandle<Result<GrabOutcome, GrabError>>,
) -> Result<GrabOutcome, GrabError> {
    match handle.join() {
        Ok(result) => result,
        Err(_) => {
            error!("grab thread panicked");
            Err(GrabError::WorkerPanicked)
        }
    }
}

/// Start a grab on a new thread.
///
/// `make_platform` runs on that thread, so backends that must stay on one
/// thread work unchanged.
pub fn spawn<P, F>(make_platform: F, config: Config) -> Result<GrabThread, GrabError>
where
    P: Platform,
    F: FnOnce() -> Result<P, GrabError> + Send + 'static,
{
    let cancel = CancelToken::new();
    let token = cancel.clone();
    let handle = thread::Builder::new()
        .name(THREAD_NAME.into())
        .spawn(move || {
            let platform = make_platform()?;
            debug!("grab thread started");
            GrabSession::new(&platform, &config)
                .with_cancel_token(token)
                .run()
        })
        .map_err(|e| GrabError::platform("spawn grab thread", e))?;
    Ok(GrabThread {
        handle: Some(handle),
        cancel,
    })
}

/// [`spawn`] with the native backend.
pub fn spawn_native(config: Config) -> Result<GrabThread, GrabError> {
    spawn(platform::native, config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::mock::{exclusive_active, MockInput, MockPlatform};
    use crate::types::{MouseEvent, MouseEventKind, Point};
    use std::time::{Duration, Instant};

    fn config(dir: &tempfile::TempDir) -> Config {
        let cursor = dir.path().join("target.cur");
        std::fs::write(&cursor, b"cur").unwrap();
        Config {
            lock_path: Some(dir.path().join("grab.lock")),
            cursor_path: Some(cursor),
            ..Config::default()
        }
    }

    #[test]
    fn worker_reports_clicked_pid() {
        let _active = exclusive_active();
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(&dir);
        let target = Point::new(3, 4);
        let platform = MockPlatform::new().with_window(target, 4242);
        let input = platform.input();

        let grab = spawn(move || Ok(platform), cfg.clone()).unwrap();
        for kind in [MouseEventKind::LeftDown, MouseEventKind::LeftUp] {
            input
                .send(MockInput::Mouse(MouseEvent::new(kind, target)))
                .unwrap();
        }

        assert_eq!(grab.join().unwrap(), GrabOutcome::Process(4242));
        assert!(!cfg.lock_path().exists());
    }

    #[test]
    fn cancelled_worker_is_interrupted() {
        let _active = exclusive_active();
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(&dir);
        let platform = MockPlatform::new();

        let grab = spawn(move || Ok(platform), cfg.clone()).unwrap();
        grab.cancel();

        assert_eq!(grab.join().unwrap(), GrabOutcome::Interrupted);
        assert!(!cfg.lock_path().exists());
    }

    #[test]
    fn platform_failure_is_returned() {
        let dir = tempfile::tempdir().unwrap();
        let grab = spawn(
            || Err::<MockPlatform, _>(GrabError::Unsupported),
            config(&dir),
        )
        .unwrap();
        assert!(matches!(grab.join(), Err(GrabError::Unsupported)));
    }

    #[test]
    fn panicking_worker_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let grab = spawn(
            || -> Result<MockPlatform, GrabError> { panic!("backend exploded") },
            config(&dir),
        )
        .unwrap();
        assert!(matches!(grab.join(), Err(GrabError::WorkerPanicked)));
    }

    #[test]
    fn dropping_a_running_grab_unwinds_it() {
        let _active = exclusive_active();
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(&dir);
        let grab = spawn(|| Ok(MockPlatform::new()), cfg.clone()).unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while !cfg.lock_path().exists() {
            assert!(Instant::now() < deadline, "grab never took the lock");
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(!grab.is_finished());
        let token = grab.cancel_token();

        drop(grab);

        assert!(token.is_cancelled());
        assert!(!cfg.lock_path().exists());
    }
}
