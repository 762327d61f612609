//! Cancellation of a running grab.
//!
//! A grab blocks in its message pump until a click arrives.  Two things can
//! end it early: a caller holding a [`CancelToken`], and a termination
//! signal delivered to the process.  Both end up posting a quit request
//! into the pump thread's queue (through the [`Waker`] the platform
//! provides) so the session unwinds normally instead of being torn down
//! half way.

use log::{debug, info, warn};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

/// Wakes a blocked message pump on another thread.
pub type Waker = Box<dyn Fn() + Send + Sync>;

/// Cloneable handle used to cancel one grab.
///
/// Cancelling before the pump starts is remembered: the session checks the
/// flag at every transition, and a waker armed after the fact fires
/// immediately.
#[derive(Clone, Default)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    cancelled: AtomicBool,
    waker: Mutex<Option<Waker>>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.  Safe from any thread, any number of times.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        if let Some(wake) = self.inner.waker.lock().as_ref() {
            wake();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Attach the pump thread's waker.
    pub(crate) fn arm(&self, waker: Waker) {
        let mut slot = self.inner.waker.lock();
        if self.is_cancelled() {
            waker();
        }
        *slot = Some(waker);
    }

    /// Detach the waker once the pump is gone.
    pub(crate) fn disarm(&self) {
        self.inner.waker.lock().take();
    }

    fn same_as(&self, other: &CancelToken) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl std::fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

//  Process-wide active grab

/// Holds the token of the grab currently pumping, if any.
pub(crate) struct Registry {
    slot: Mutex<Option<CancelToken>>,
}

impl Registry {
    pub(crate) const fn new() -> Self {
        Self {
            slot: parking_lot::const_mutex(None),
        }
    }

    pub(crate) fn register(&self, token: CancelToken) -> ActiveGrab<'_> {
        let mut slot = self.slot.lock();
        if slot.is_some() {
            warn!("replacing an already registered active grab");
        }
        *slot = Some(token.clone());
        ActiveGrab {
            registry: self,
            token,
        }
    }

    /// Wait until no grab is registered.  Returns `false` on timeout.
    pub(crate) fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.slot.lock().is_none() {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(IDLE_POLL);
        }
    }

    /// Cancel the registered grab.  Returns `false` when none is.
    pub(crate) fn cancel(&self) -> bool {
        let token = self.slot.lock().clone();
        match token {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }
}

/// The grab running in this process, as seen by the signal handler.
pub(crate) static ACTIVE: Registry = Registry::new();

/// Registration of a session as the active grab.
///
/// Dropping it clears the registration, but only if it still points at the
/// same token.
pub(crate) struct ActiveGrab<'r> {
    registry: &'r Registry,
    token: CancelToken,
}

impl Drop for ActiveGrab<'_> {
    fn drop(&mut self) {
        let mut slot = self.registry.slot.lock();
        if slot.as_ref().is_some_and(|t| t.same_as(&self.token)) {
            *slot = None;
        }
    }
}

/// Cancel the grab running in this process.  Returns `false` when none is.
pub fn cancel_active() -> bool {
    ACTIVE.cancel()
}

/// Exit status used when a signal arrives with no grab to cancel.
pub const INTERRUPTED_EXIT_CODE: i32 = 130;

/// How long the signal handler holds on while a cancelled grab unwinds.
///
/// Windows ends the process shortly after a console close event handler
/// returns, so returning at once could cut the unwind short.
const UNWIND_GRACE: Duration = Duration::from_secs(2);

const IDLE_POLL: Duration = Duration::from_millis(10);

static SIGNAL_HANDLER: OnceLock<Result<(), String>> = OnceLock::new();

/// Install the process-wide interrupt/terminate handler.
///
/// While a grab is active the signal cancels it, and the session restores
/// cursors and releases the lock on its own way out; the handler waits for
/// that unwind for up to two seconds before returning.  With no grab active
/// the process exits with [`INTERRUPTED_EXIT_CODE`].
///
/// Only the first call registers anything; later calls report the first
/// call's result.  Fails when another handler was already registered
/// through `ctrlc` by someone else.
pub fn install_signal_handler() -> Result<(), String> {
    SIGNAL_HANDLER
        .get_or_init(|| {
            ctrlc::set_handler(|| {
                if cancel_active() {
                    info!("termination requested, cancelling grab");
                    if !ACTIVE.wait_idle(UNWIND_GRACE) {
                        warn!("grab still unwinding after {:?}", UNWIND_GRACE);
                    }
                } else {
                    debug!("termination requested with no grab running, exiting");
                    std::process::exit(INTERRUPTED_EXIT_CODE);
                }
            })
            .map_err(|e| e.to_string())
        })
        .clone()
}
