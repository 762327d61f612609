//! The trait that decouples wingrab from the windowing system.
//!
//! [`GrabSession`](crate::session::GrabSession), the cursor controller and
//! cleanup only depend on [`Platform`].  The Win32 backend lives in
//! [`platform`](crate::platform); tests drive the same code through a
//! recording mock.

use crate::cancel::Waker;
use crate::cursor::CursorId;
use crate::types::{HookAction, LoopExit, MouseEvent, Point};
use std::path::Path;
use std::time::SystemTime;

/// Abstraction over the windowing system's global-hook, message-pump,
/// cursor and window-ownership primitives.
///
/// A backend is used from a single thread: the one that installs the hook
/// is the one that must pump its messages.  Only the [`Waker`] it hands out
/// may cross threads.
pub trait Platform {
    /// The error type produced by this backend.
    type Error: std::error::Error + Send + 'static;

    /// An owned cursor image.  Dropping one that was never handed to
    /// [`set_system_cursor`](Platform::set_system_cursor) frees it.
    type Cursor;

    /// An installed low-level mouse hook.
    type Hook;

    /// Load a fresh copy of the cursor stored at `path`.
    fn load_cursor(&self, path: &Path) -> Result<Self::Cursor, Self::Error>;

    /// Duplicate the shape currently installed for `id`.
    fn snapshot_cursor(&self, id: CursorId) -> Result<Self::Cursor, Self::Error>;

    /// Install `cursor` as the system-wide shape for `id`.
    ///
    /// The system takes ownership of the image on success.
    fn set_system_cursor(&self, cursor: Self::Cursor, id: CursorId) -> Result<(), Self::Error>;

    /// Reload every standard shape from the user's configured scheme.
    fn reload_system_cursors(&self) -> Result<(), Self::Error>;

    /// Register the global low-level mouse hook on the calling thread.
    ///
    /// Events are only delivered while [`pump`](Platform::pump) runs; until
    /// then the hook passes everything through.
    fn install_hook(&self) -> Result<Self::Hook, Self::Error>;

    /// Remove a hook returned by [`install_hook`](Platform::install_hook).
    fn uninstall_hook(&self, hook: Self::Hook) -> Result<(), Self::Error>;

    /// A thread-safe callback that makes a running [`pump`](Platform::pump)
    /// on the calling thread return [`LoopExit::Quit`].
    ///
    /// Must be requested from the thread that will pump.
    fn waker(&self) -> Result<Waker, Self::Error>;

    /// Retrieve and dispatch messages for the calling thread until the hook
    /// finishes or a quit request arrives.
    ///
    /// `handler` is consulted synchronously for every mouse event seen by
    /// the hook while this call blocks.
    fn pump(
        &self,
        handler: &mut dyn FnMut(&MouseEvent) -> HookAction,
    ) -> Result<LoopExit, Self::Error>;

    /// The cursor position right now.
    fn cursor_position(&self) -> Result<Point, Self::Error>;

    /// The id of the process owning the window at `point`, or `None` when
    /// no window is there.
    fn process_at(&self, point: Point) -> Result<Option<u32>, Self::Error>;

    /// Whether a process with this id is still alive.
    ///
    /// Backends that cannot tell should answer `true`.
    fn is_process_running(&self, pid: u32) -> bool;

    /// When the running process with this id was started, if known.
    ///
    /// Lets a lock holder's pid be told apart from an unrelated process that
    /// reused it.
    fn process_started_at(&self, _pid: u32) -> Option<SystemTime> {
        None
    }

    /// Drop wake-up requests that reached the calling thread after its
    /// [`pump`](Platform::pump) returned, so they cannot end a later loop.
    fn discard_wakeups(&self) {}
}
