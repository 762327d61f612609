//! Win32 backend: low-level mouse hook, thread message pump, system
//! cursors and window ownership.
//!
//! A `WH_MOUSE_LL` hook is called by the system on the thread that installed
//! it, from inside that thread's `GetMessageW`.  The hook procedure is a
//! plain `extern "system"` function, so the handler passed to
//! [`pump`](Platform::pump) is parked in a thread-local for exactly as long
//! as the pump runs.

use crate::cancel::Waker;
use crate::cursor::CursorId;
use crate::traits::Platform;
use crate::types::{HookAction, LoopExit, MouseEvent, MouseEventKind, Point};
use log::{debug, error, warn};
use std::cell::Cell;
use std::marker::PhantomData;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use windows::core::{HSTRING, PCWSTR};
use windows::Win32::Foundation::{
    CloseHandle, ERROR_INVALID_PARAMETER, FILETIME, HANDLE, HWND, LPARAM, LRESULT, POINT,
    STILL_ACTIVE, WPARAM,
};
use windows::Win32::System::Threading::{
    GetCurrentThreadId, GetExitCodeProcess, GetProcessTimes, OpenProcess,
    PROCESS_QUERY_LIMITED_INFORMATION,
};
use windows::Win32::UI::WindowsAndMessaging::{
    CallNextHookEx, CopyIcon, DestroyCursor, DispatchMessageW, GetCursorPos, GetMessageW,
    GetWindowThreadProcessId, LoadCursorFromFileW, LoadCursorW, PeekMessageW, PostQuitMessage,
    PostThreadMessageW, SetSystemCursor, SetWindowsHookExW, SystemParametersInfoW,
    TranslateMessage, UnhookWindowsHookEx, WindowFromPoint, HCURSOR, HC_ACTION, HHOOK, HICON,
    MSG, MSLLHOOKSTRUCT, PM_NOREMOVE, PM_REMOVE, SPI_SETCURSORS, SYSTEM_CURSOR_ID,
    SYSTEM_PARAMETERS_INFO_UPDATE_FLAGS, WH_MOUSE_LL, WM_APP, WM_QUIT, WM_USER,
};

/// Thread message posted by the hook once the click is resolved.
const WM_GRAB_COMPLETE: u32 = WM_APP + 0x47;

/// A failed Win32 call.
#[derive(Debug, thiserror::Error)]
#[error("{op}: {source}")]
pub struct Win32Error {
    op: &'static str,
    #[source]
    source: windows::core::Error,
}

impl Win32Error {
    fn new(op: &'static str, source: windows::core::Error) -> Self {
        Self { op, source }
    }
}

/// A cursor image owned by wingrab.  Destroyed on drop unless it was
/// handed to the system.
#[derive(Debug)]
pub struct OwnedCursor(HCURSOR);

impl Drop for OwnedCursor {
    fn drop(&mut self) {
        unsafe {
            let _ = DestroyCursor(self.0);
        }
    }
}

/// A process opened for querying.  Closed on drop.
struct ProcessHandle(HANDLE);

impl ProcessHandle {
    /// `Ok(None)` when no process has that id.
    fn open(pid: u32) -> windows::core::Result<Option<Self>> {
        match unsafe { OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, false, pid) } {
            Ok(handle) => Ok(Some(Self(handle))),
            Err(e) if e.code() == ERROR_INVALID_PARAMETER.to_hresult() => Ok(None),
            Err(e) => Err(e),
        }
    }
}

impl Drop for ProcessHandle {
    fn drop(&mut self) {
        unsafe {
            let _ = CloseHandle(self.0);
        }
    }
}

/// 100 ns intervals between 1601-01-01 and the Unix epoch.
const FILETIME_UNIX_OFFSET: u64 = 116_444_736_000_000_000;

fn filetime_to_system_time(time: FILETIME) -> Option<SystemTime> {
    let ticks = (u64::from(time.dwHighDateTime) << 32) | u64::from(time.dwLowDateTime);
    let since_epoch = ticks.checked_sub(FILETIME_UNIX_OFFSET)?;
    UNIX_EPOCH.checked_add(Duration::from_nanos(since_epoch.saturating_mul(100)))
}

/// An installed `WH_MOUSE_LL` hook.
#[derive(Debug)]
pub struct HookHandle(HHOOK);

/// The Win32 [`Platform`].
///
/// Neither `Send` nor `Sync`: the hook and the pump belong to the thread
/// that created the value.
#[derive(Debug, Default)]
pub struct Win32Platform {
    _thread_bound: PhantomData<*const ()>,
}

impl Win32Platform {
    pub fn new() -> Self {
        Self::default()
    }
}

//  Handler slot

type Handler = dyn FnMut(&MouseEvent) -> HookAction;

thread_local! {
    static HANDLER: Cell<Option<*mut Handler>> = const { Cell::new(None) };
}

/// Makes a handler visible to the hook procedure until dropped.
struct HandlerScope<'a> {
    previous: Option<*mut Handler>,
    _handler: PhantomData<&'a mut ()>,
}

impl<'a> HandlerScope<'a> {
    fn enter(handler: &'a mut (dyn FnMut(&MouseEvent) -> HookAction + 'a)) -> Self {
        let ptr: *mut (dyn FnMut(&MouseEvent) -> HookAction + 'a) = handler;
        // SAFETY: the slot is reset when the scope drops, before 'a ends, and
        // the hook only runs on this thread.
        let ptr: *mut Handler = unsafe { std::mem::transmute(ptr) };
        let previous = HANDLER.with(|slot| slot.replace(Some(ptr)));
        Self {
            previous,
            _handler: PhantomData,
        }
    }
}

impl Drop for HandlerScope<'_> {
    fn drop(&mut self) {
        HANDLER.with(|slot| slot.set(self.previous));
    }
}

unsafe extern "system" fn low_level_mouse_proc(
    code: i32,
    wparam: WPARAM,
    lparam: LPARAM,
) -> LRESULT {
    if code == HC_ACTION as i32 {
        let info = &*(lparam.0 as *const MSLLHOOKSTRUCT);
        let event = MouseEvent {
            kind: MouseEventKind::from_message(wparam.0 as u32),
            point: Point::new(info.pt.x, info.pt.y),
            mouse_data: info.mouseData,
            flags: info.flags,
            time: info.time,
        };

        // Taken out while it runs, so a re-entrant call passes through.
        if let Some(handler) = HANDLER.with(|slot| slot.take()) {
            let action = catch_unwind(AssertUnwindSafe(|| (&mut *handler)(&event)));
            HANDLER.with(|slot| slot.set(Some(handler)));

            match action {
                Ok(HookAction::PassThrough) => {}
                Ok(HookAction::Swallow) => return LRESULT(1),
                Ok(HookAction::Finish) => {
                    let posted = PostThreadMessageW(
                        GetCurrentThreadId(),
                        WM_GRAB_COMPLETE,
                        WPARAM(0),
                        LPARAM(0),
                    );
                    if let Err(e) = posted {
                        error!("could not post grab completion: {}", e);
                        PostQuitMessage(0);
                    }
                    return LRESULT(1);
                }
                Err(_) => {
                    error!("mouse hook handler panicked, stopping the grab");
                    PostQuitMessage(0);
                }
            }
        }
    }

    CallNextHookEx(HHOOK::default(), code, wparam, lparam)
}

impl Platform for Win32Platform {
    type Error = Win32Error;
    type Cursor = OwnedCursor;
    type Hook = HookHandle;

    fn load_cursor(&self, path: &Path) -> Result<OwnedCursor, Win32Error> {
        let file = HSTRING::from(path.as_os_str());
        let cursor = unsafe { LoadCursorFromFileW(&file) }
            .map_err(|e| Win32Error::new("LoadCursorFromFileW", e))?;
        Ok(OwnedCursor(cursor))
    }

    fn snapshot_cursor(&self, id: CursorId) -> Result<OwnedCursor, Win32Error> {
        // Integer resource id, as MAKEINTRESOURCEW does it.
        let name = PCWSTR(id.raw() as usize as *const u16);
        let shared =
            unsafe { LoadCursorW(None, name) }.map_err(|e| Win32Error::new("LoadCursorW", e))?;
        // The shared handle changes under us once patched; keep a private copy.
        let copy =
            unsafe { CopyIcon(HICON(shared.0)) }.map_err(|e| Win32Error::new("CopyIcon", e))?;
        Ok(OwnedCursor(HCURSOR(copy.0)))
    }

    fn set_system_cursor(&self, cursor: OwnedCursor, id: CursorId) -> Result<(), Win32Error> {
        unsafe { SetSystemCursor(cursor.0, SYSTEM_CURSOR_ID(id.raw())) }
            .map_err(|e| Win32Error::new("SetSystemCursor", e))?;
        // The system destroys it when it is replaced.
        std::mem::forget(cursor);
        Ok(())
    }

    fn reload_system_cursors(&self) -> Result<(), Win32Error> {
        unsafe {
            SystemParametersInfoW(
                SPI_SETCURSORS,
                0,
                None,
                SYSTEM_PARAMETERS_INFO_UPDATE_FLAGS(0),
            )
        }
        .map_err(|e| Win32Error::new("SystemParametersInfoW(SPI_SETCURSORS)", e))
    }

    fn install_hook(&self) -> Result<HookHandle, Win32Error> {
        // Make sure this thread has a message queue before anyone posts to it.
        let mut msg = MSG::default();
        unsafe {
            let _ = PeekMessageW(&mut msg, HWND::default(), WM_USER, WM_USER, PM_NOREMOVE);
        }

        let hook = unsafe { SetWindowsHookExW(WH_MOUSE_LL, Some(low_level_mouse_proc), None, 0) }
            .map_err(|e| Win32Error::new("SetWindowsHookExW", e))?;
        debug!("mouse hook installed on thread {}", unsafe { GetCurrentThreadId() });
        Ok(HookHandle(hook))
    }

    fn uninstall_hook(&self, hook: HookHandle) -> Result<(), Win32Error> {
        unsafe { UnhookWindowsHookEx(hook.0) }
            .map_err(|e| Win32Error::new("UnhookWindowsHookEx", e))
    }

    fn waker(&self) -> Result<Waker, Win32Error> {
        let thread_id = unsafe { GetCurrentThreadId() };
        Ok(Box::new(move || {
            let posted = unsafe { PostThreadMessageW(thread_id, WM_QUIT, WPARAM(0), LPARAM(0)) };
            if let Err(e) = posted {
                warn!("could not wake message loop on thread {}: {}", thread_id, e);
            }
        }))
    }

    fn pump(
        &self,
        handler: &mut dyn FnMut(&MouseEvent) -> HookAction,
    ) -> Result<LoopExit, Win32Error> {
        let _scope = HandlerScope::enter(handler);
        let mut msg = MSG::default();
        loop {
            let ret = unsafe { GetMessageW(&mut msg, HWND::default(), 0, 0) };
            match ret.0 {
                -1 => {
                    return Err(Win32Error::new(
                        "GetMessageW",
                        windows::core::Error::from_win32(),
                    ))
                }
                0 => return Ok(LoopExit::Quit),
                _ => {}
            }
            if msg.message == WM_GRAB_COMPLETE && msg.hwnd.0.is_null() {
                return Ok(LoopExit::Completed);
            }
            unsafe {
                let _ = TranslateMessage(&msg);
                DispatchMessageW(&msg);
            }
        }
    }

    fn cursor_position(&self) -> Result<Point, Win32Error> {
        let mut pt = POINT::default();
        unsafe { GetCursorPos(&mut pt) }.map_err(|e| Win32Error::new("GetCursorPos", e))?;
        Ok(Point::new(pt.x, pt.y))
    }

    fn process_at(&self, point: Point) -> Result<Option<u32>, Win32Error> {
        let hwnd = unsafe {
            WindowFromPoint(POINT {
                x: point.x,
                y: point.y,
            })
        };
        if hwnd.0.is_null() {
            return Ok(None);
        }
        let mut pid = 0u32;
        unsafe {
            GetWindowThreadProcessId(hwnd, Some(&mut pid));
        }
        Ok((pid != 0).then_some(pid))
    }

    fn is_process_running(&self, pid: u32) -> bool {
        let process = match ProcessHandle::open(pid) {
            Ok(Some(process)) => process,
            Ok(None) => return false,
            // Exists, but we may not look at it.
            Err(_) => return true,
        };
        let mut code = 0u32;
        unsafe { GetExitCodeProcess(process.0, &mut code) }
            .map(|_| code == STILL_ACTIVE.0 as u32)
            .unwrap_or(true)
    }

    fn process_started_at(&self, pid: u32) -> Option<SystemTime> {
        let process = ProcessHandle::open(pid).ok()??;
        let mut created = FILETIME::default();
        let mut exited = FILETIME::default();
        let mut kernel = FILETIME::default();
        let mut user = FILETIME::default();
        unsafe { GetProcessTimes(process.0, &mut created, &mut exited, &mut kernel, &mut user) }
            .ok()?;
        filetime_to_system_time(created)
    }

    fn discard_wakeups(&self) {
        let mut msg = MSG::default();
        for message in [WM_QUIT, WM_GRAB_COMPLETE] {
            while unsafe { PeekMessageW(&mut msg, HWND::default(), message, message, PM_REMOVE) }
                .as_bool()
            {
                debug!("discarded stale message {:#x}", message);
            }
        }
    }
}
