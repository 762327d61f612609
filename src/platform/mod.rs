//! Concrete [`Platform`] backends.
//!
//! Only the Win32 backend talks to the real system.  On every other target
//! [`native`] reports [`GrabError::Unsupported`], which keeps the rest of
//! the crate (and its tests, which run against a mock) portable.

#[cfg(windows)]
pub mod win32;

#[cfg(test)]
pub(crate) mod mock;

use crate::session::GrabError;

#[cfg(not(windows))]
use crate::{
    cancel::Waker,
    cursor::CursorId,
    traits::Platform,
    types::{HookAction, LoopExit, MouseEvent, Point},
};
#[cfg(not(windows))]
use std::{convert::Infallible, path::Path};

/// The backend for the target being built.
#[cfg(windows)]
pub type NativePlatform = win32::Win32Platform;

/// The backend for the target being built.
#[cfg(not(windows))]
pub type NativePlatform = Unsupported;

/// Create the backend for the calling thread.
///
/// The returned value must stay on the thread that created it: that thread
/// installs the hook and pumps its messages.
pub fn native() -> Result<NativePlatform, GrabError> {
    #[cfg(windows)]
    {
        Ok(win32::Win32Platform::new())
    }
    #[cfg(not(windows))]
    {
        Err(GrabError::Unsupported)
    }
}

/// Stand-in backend on targets without a windowing system wingrab knows.
///
/// It has no values, so [`native`] can never hand one out.
#[cfg(not(windows))]
#[derive(Debug)]
pub enum Unsupported {}

#[cfg(not(windows))]
impl Platform for Unsupported {
    type Error = Infallible;
    type Cursor = Infallible;
    type Hook = Infallible;

    fn load_cursor(&self, _: &Path) -> Result<Infallible, Infallible> {
        match *self {}
    }

    fn snapshot_cursor(&self, _: CursorId) -> Result<Infallible, Infallible> {
        match *self {}
    }

    fn set_system_cursor(&self, cursor: Infallible, _: CursorId) -> Result<(), Infallible> {
        match cursor {}
    }

    fn reload_system_cursors(&self) -> Result<(), Infallible> {
        match *self {}
    }

    fn install_hook(&self) -> Result<Infallible, Infallible> {
        match *self {}
    }

    fn uninstall_hook(&self, hook: Infallible) -> Result<(), Infallible> {
        match hook {}
    }

    fn waker(&self) -> Result<Waker, Infallible> {
        match *self {}
    }

    fn pump(
        &self,
        _: &mut dyn FnMut(&MouseEvent) -> HookAction,
    ) -> Result<LoopExit, Infallible> {
        match *self {}
    }

    fn cursor_position(&self) -> Result<Point, Infallible> {
        match *self {}
    }

    fn process_at(&self, _: Point) -> Result<Option<u32>, Infallible> {
        match *self {}
    }

    fn is_process_running(&self, _: u32) -> bool {
        match *self {}
    }
}
