//! The grab session: one "click a window, get its pid" interaction.
//!
//! A session walks a fixed sequence of states and unwinds them in reverse:
//!
//! ```text
//! Idle → Locked → Patched → Hooked → Pumping → Unwinding → Done
//!          lock     cursors   hook     message loop
//! ```
//!
//! Every resource acquired on the way in is held in an `Option` on the
//! session.  [`GrabSession::run`] always unwinds whatever it holds before
//! returning (hook first, then cursors, then the lock), whether the grab
//! completed, was cancelled, or failed half way.  Dropping a session that
//! never finished does the same.

use crate::cancel::{ActiveGrab, CancelToken, ACTIVE};
use crate::config::Config;
use crate::cursor::{self, CursorError, CursorPatch};
use crate::hook::{ClickInterceptor, Resolution};
use crate::lock::{self, holder_suffix, InstanceLock, LockError};
use crate::traits::Platform;
use crate::types::{GrabOutcome, LoopExit, MouseEvent};
use log::{debug, info, warn};
use std::io;
use std::path::PathBuf;

/// Errors that end a grab without a result.
///
/// Cancellation is not among them: it is reported as
/// [`GrabOutcome::Interrupted`].
#[derive(Debug, thiserror::Error)]
pub enum GrabError {
    /// Another grab holds the single-instance lock.
    #[error("another wingrab instance is already running (lock file {}{})", .path.display(), holder_suffix(.holder))]
    AlreadyRunning { path: PathBuf, holder: Option<u32> },

    #[error("permission denied: {}: {source}", .path.display())]
    PermissionDenied {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The targeting cursor could not be loaded.
    #[error("resource load failed: {message}")]
    ResourceLoad { message: String },

    /// A call into the windowing system failed.
    #[error("{op} failed: {message}")]
    Platform { op: &'static str, message: String },

    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("window grabbing is only supported on Windows")]
    Unsupported,

    #[error("grab thread panicked")]
    WorkerPanicked,
}

impl GrabError {
    pub(crate) fn platform(op: &'static str, err: impl std::fmt::Display) -> Self {
        GrabError::Platform {
            op,
            message: err.to_string(),
        }
    }
}

impl From<LockError> for GrabError {
    fn from(e: LockError) -> Self {
        match e {
            LockError::AlreadyRunning { path, holder } => GrabError::AlreadyRunning { path, holder },
            LockError::PermissionDenied { path, source } => {
                GrabError::PermissionDenied { path, source }
            }
            LockError::Io { path, source } => GrabError::Io { path, source },
        }
    }
}

impl From<CursorError> for GrabError {
    fn from(e: CursorError) -> Self {
        match e {
            CursorError::PermissionDenied { path, source } => {
                GrabError::PermissionDenied { path, source }
            }
            e @ CursorError::Load { .. } => GrabError::ResourceLoad {
                message: e.to_string(),
            },
            CursorError::Platform { op, message } => GrabError::Platform { op, message },
            CursorError::Io { path, source } => GrabError::Io { path, source },
        }
    }
}

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    /// Holds the single-instance lock.
    Locked,
    /// System cursors show the targeting shape.
    Patched,
    /// The mouse hook is installed.
    Hooked,
    /// Blocked in the message loop waiting for the click.
    Pumping,
    Unwinding,
    Done,
}

/// One grab, bound to a [`Platform`].
///
/// Must be run on the thread the platform belongs to.
pub struct GrabSession<'p, P: Platform> {
    platform: &'p P,
    config: Config,
    cancel: CancelToken,
    state: SessionState,
    lock: Option<InstanceLock>,
    cursors: Option<CursorPatch<'p, P>>,
    hook: Option<P::Hook>,
    active: Option<ActiveGrab<'static>>,
}

impl<'p, P: Platform> GrabSession<'p, P> {
    pub fn new(platform: &'p P, config: &Config) -> Self {
        Self {
            platform,
            config: config.clone(),
            cancel: CancelToken::new(),
            state: SessionState::Idle,
            lock: None,
            cursors: None,
            hook: None,
            active: None,
        }
    }

    /// Use `token` instead of a fresh one, so it can be handed out before
    /// the session exists.
    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    /// A handle that cancels this session from any thread.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Run the grab to completion and release everything it acquired.
    ///
    /// Blocks until the user clicks or the session is cancelled.
    pub fn run(mut self) -> Result<GrabOutcome, GrabError> {
        info!("grab started");
        let result = self.drive();
        self.unwind();
        match &result {
            Ok(outcome) => info!("grab finished with {}", outcome),
            Err(e) => warn!("grab failed: {}", e),
        }
        result
    }

    fn drive(&mut self) -> Result<GrabOutcome, GrabError> {
        let lock_path = self.config.lock_path();
        let platform = self.platform;
        self.lock = Some(InstanceLock::acquire_with(&lock_path, |pid| {
            lock::holder_alive(platform, &lock_path, pid)
        })?);
        // Registered as soon as there is something to unwind, so a signal
        // arriving before the pump still takes the cancel path.
        self.active = Some(ACTIVE.register(self.cancel.clone()));
        self.transition(SessionState::Locked);
        if self.cancel.is_cancelled() {
            return Ok(GrabOutcome::Interrupted);
        }

        let asset = cursor::resolve_asset(self.config.cursor_path.as_deref())?;
        let mut cursors = CursorPatch::new(self.platform, self.config.restore);
        cursors.patch_all(&asset)?;
        self.cursors = Some(cursors);
        self.transition(SessionState::Patched);
        if self.cancel.is_cancelled() {
            return Ok(GrabOutcome::Interrupted);
        }

        let hook = self
            .platform
            .install_hook()
            .map_err(|e| GrabError::platform("install mouse hook", e))?;
        self.hook = Some(hook);
        self.transition(SessionState::Hooked);
        if self.cancel.is_cancelled() {
            return Ok(GrabOutcome::Interrupted);
        }

        // From here on a cancel posts a quit message, which the pump below
        // is guaranteed to consume.
        let waker = self
            .platform
            .waker()
            .map_err(|e| GrabError::platform("create message loop waker", e))?;
        self.cancel.arm(waker);
        self.transition(SessionState::Pumping);

        let mut interceptor = ClickInterceptor::new(self.config.debug);
        let exit = platform
            .pump(&mut |event: &MouseEvent| interceptor.handle(event, || window_owner(platform)))
            .map_err(|e| GrabError::platform("run message loop", e))?;
        debug!("message loop exited: {:?}", exit);

        match (exit, interceptor.into_resolution()) {
            (_, Some(Resolution::Process(pid))) => Ok(GrabOutcome::Process(pid)),
            (_, Some(Resolution::NoProcess)) => Ok(GrabOutcome::NoProcess),
            (_, Some(Resolution::Failed(message))) => Err(GrabError::Platform {
                op: "resolve window owner",
                message,
            }),
            (LoopExit::Quit, None) => Ok(GrabOutcome::Interrupted),
            (LoopExit::Completed, None) => Err(GrabError::Platform {
                op: "run message loop",
                message: "completed without a click".into(),
            }),
        }
    }

    /// Release everything in reverse order of acquisition.
    ///
    /// Each step is attempted even if an earlier one failed; failures are
    /// logged.  Runs at most once.  The active-grab registration is
    /// dropped last, once nothing is left to restore.
    fn unwind(&mut self) {
        if self.state == SessionState::Done {
            return;
        }
        let pumped = self.state == SessionState::Pumping;
        self.transition(SessionState::Unwinding);

        self.cancel.disarm();
        if pumped {
            // A cancel racing the click may have queued a quit request the
            // pump never read.  It must not end the next grab on this thread.
            self.platform.discard_wakeups();
        }

        if let Some(hook) = self.hook.take() {
            if let Err(e) = self.platform.uninstall_hook(hook) {
                warn!("could not remove mouse hook: {}", e);
            }
        }
        if let Some(mut cursors) = self.cursors.take() {
            if let Err(e) = cursors.restore_all() {
                warn!("could not restore system cursors: {}", e);
            }
        }
        if let Some(mut lock) = self.lock.take() {
            lock.release();
        }

        self.active = None;
        self.transition(SessionState::Done);
    }

    fn transition(&mut self, next: SessionState) {
        debug!("grab state {:?} -> {:?}", self.state, next);
        self.state = next;
    }
}

impl<P: Platform> Drop for GrabSession<'_, P> {
    fn drop(&mut self) {
        self.unwind();
    }
}

/// Who owns the window under the cursor right now.
fn window_owner<P: Platform>(platform: &P) -> Result<Option<u32>, String> {
    let point = platform.cursor_position().map_err(|e| e.to_string())?;
    let pid = platform.process_at(point).map_err(|e| e.to_string())?;
    debug!("window at {} belongs to {:?}", point, pid);
    Ok(pid)
}

//  Tests
