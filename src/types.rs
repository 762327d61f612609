//! Types shared by every part of wingrab.
//!
//! This module defines the vocabulary the components talk in:
//! [`MouseEvent`] is what the low-level hook observes, [`HookAction`] is
//! what the hook answers, [`LoopExit`] is why the message pump stopped, and
//! [`GrabOutcome`] is what a grab hands back to the caller.

use std::fmt;

// Raw Win32 mouse message ids, as delivered in the hook's `wParam`.
pub const WM_MOUSEMOVE: u32 = 0x0200;
pub const WM_LBUTTONDOWN: u32 = 0x0201;
pub const WM_LBUTTONUP: u32 = 0x0202;
pub const WM_RBUTTONDOWN: u32 = 0x0204;
pub const WM_RBUTTONUP: u32 = 0x0205;
pub const WM_MBUTTONDOWN: u32 = 0x0207;
pub const WM_MBUTTONUP: u32 = 0x0208;
pub const WM_MOUSEWHEEL: u32 = 0x020A;
pub const WM_XBUTTONDOWN: u32 = 0x020B;
pub const WM_XBUTTONUP: u32 = 0x020C;
pub const WM_MOUSEHWHEEL: u32 = 0x020E;

/// A point in virtual-screen coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Which kind of mouse message the hook saw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MouseEventKind {
    Move,
    LeftDown,
    LeftUp,
    RightDown,
    RightUp,
    MiddleDown,
    MiddleUp,
    XDown,
    XUp,
    Wheel,
    HorizontalWheel,
    /// A message id wingrab has no name for.
    Other(u32),
}

impl MouseEventKind {
    /// Classify a raw window-message id.
    pub fn from_message(message: u32) -> Self {
        match message {
            WM_MOUSEMOVE => MouseEventKind::Move,
            WM_LBUTTONDOWN => MouseEventKind::LeftDown,
            WM_LBUTTONUP => MouseEventKind::LeftUp,
            WM_RBUTTONDOWN => MouseEventKind::RightDown,
            WM_RBUTTONUP => MouseEventKind::RightUp,
            WM_MBUTTONDOWN => MouseEventKind::MiddleDown,
            WM_MBUTTONUP => MouseEventKind::MiddleUp,
            WM_XBUTTONDOWN => MouseEventKind::XDown,
            WM_XBUTTONUP => MouseEventKind::XUp,
            WM_MOUSEWHEEL => MouseEventKind::Wheel,
            WM_MOUSEHWHEEL => MouseEventKind::HorizontalWheel,
            other => MouseEventKind::Other(other),
        }
    }

    /// The raw window-message id for this kind.
    pub fn message(self) -> u32 {
        match self {
            MouseEventKind::Move => WM_MOUSEMOVE,
            MouseEventKind::LeftDown => WM_LBUTTONDOWN,
            MouseEventKind::LeftUp => WM_LBUTTONUP,
            MouseEventKind::RightDown => WM_RBUTTONDOWN,
            MouseEventKind::RightUp => WM_RBUTTONUP,
            MouseEventKind::MiddleDown => WM_MBUTTONDOWN,
            MouseEventKind::MiddleUp => WM_MBUTTONUP,
            MouseEventKind::XDown => WM_XBUTTONDOWN,
            MouseEventKind::XUp => WM_XBUTTONUP,
            MouseEventKind::Wheel => WM_MOUSEWHEEL,
            MouseEventKind::HorizontalWheel => WM_MOUSEHWHEEL,
            MouseEventKind::Other(message) => message,
        }
    }
}

impl fmt::Display for MouseEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // `pad` so callers can align columns with `{:15}`.
        match self {
            MouseEventKind::Move => f.pad("WM_MOUSEMOVE"),
            MouseEventKind::LeftDown => f.pad("WM_LBUTTONDOWN"),
            MouseEventKind::LeftUp => f.pad("WM_LBUTTONUP"),
            MouseEventKind::RightDown => f.pad("WM_RBUTTONDOWN"),
            MouseEventKind::RightUp => f.pad("WM_RBUTTONUP"),
            MouseEventKind::MiddleDown => f.pad("WM_MBUTTONDOWN"),
            MouseEventKind::MiddleUp => f.pad("WM_MBUTTONUP"),
            MouseEventKind::XDown => f.pad("WM_XBUTTONDOWN"),
            MouseEventKind::XUp => f.pad("WM_XBUTTONUP"),
            MouseEventKind::Wheel => f.pad("WM_MOUSEWHEEL"),
            MouseEventKind::HorizontalWheel => f.pad("WM_MOUSEHWHEEL"),
            MouseEventKind::Other(message) => f.pad(&message.to_string()),
        }
    }
}

/// One low-level mouse event, as reported to the hook.
///
/// Mirrors the fields of `MSLLHOOKSTRUCT` that are useful for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MouseEvent {
    pub kind: MouseEventKind,
    /// Where the event happened.
    pub point: Point,
    /// Wheel delta or X-button id in the high word; zero otherwise.
    pub mouse_data: u32,
    /// Injected / lower-integrity flags.
    pub flags: u32,
    /// Message timestamp in milliseconds.
    pub time: u32,
}

impl MouseEvent {
    /// Build an event with zeroed diagnostic fields.
    pub fn new(kind: MouseEventKind, point: Point) -> Self {
        Self {
            kind,
            point,
            mouse_data: 0,
            flags: 0,
            time: 0,
        }
    }
}

/// What the hook wants done with an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookAction {
    /// Hand the event to the next hook in the chain unchanged.
    PassThrough,
    /// Eat the event; the window under the cursor never sees it.
    Swallow,
    /// Eat the event and stop the message pump: the grab has its answer.
    Finish,
}

/// Why the message pump returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    /// The hook returned [`HookAction::Finish`].
    Completed,
    /// A quit request arrived (explicit cancel or termination signal).
    Quit,
}

/// The result of one grab.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GrabOutcome {
    /// The clicked window belongs to this process id.
    Process(u32),
    /// The click landed where no window with an owning process exists.
    NoProcess,
    /// The grab was cancelled before a click was captured.
    Interrupted,
}

impl GrabOutcome {
    /// Integer form: the pid, `0` for no owning process, `-1` when interrupted.
    pub fn code(self) -> i64 {
        match self {
            GrabOutcome::Process(pid) => i64::from(pid),
            GrabOutcome::NoProcess => 0,
            GrabOutcome::Interrupted => -1,
        }
    }

    /// The resolved pid, if any.
    pub fn pid(self) -> Option<u32> {
        match self {
            GrabOutcome::Process(pid) => Some(pid),
            _ => None,
        }
    }

    pub fn is_interrupted(self) -> bool {
        self == GrabOutcome::Interrupted
    }
}

impl From<Option<u32>> for GrabOutcome {
    fn from(pid: Option<u32>) -> Self {
        match pid {
            Some(pid) if pid != 0 => GrabOutcome::Process(pid),
            _ => GrabOutcome::NoProcess,
        }
    }
}

impl fmt::Display for GrabOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_messages_round_trip_through_kind() {
        for message in [
            WM_MOUSEMOVE,
            WM_LBUTTONDOWN,
            WM_LBUTTONUP,
            WM_RBUTTONDOWN,
            WM_RBUTTONUP,
            WM_MBUTTONDOWN,
            WM_MBUTTONUP,
            WM_XBUTTONDOWN,
            WM_XBUTTONUP,
            WM_MOUSEWHEEL,
            WM_MOUSEHWHEEL,
        ] {
            let kind = MouseEventKind::from_message(message);
            assert!(!matches!(kind, MouseEventKind::Other(_)), "{message:#x}");
            assert_eq!(kind.message(), message);
        }
    }

    #[test]
    fn unknown_message_is_kept_raw() {
        let kind = MouseEventKind::from_message(0x1234);
        assert_eq!(kind, MouseEventKind::Other(0x1234));
        assert_eq!(kind.to_string(), "4660");
    }

    #[test]
    fn kind_display_pads_like_a_column() {
        assert_eq!(format!("{:15}|", MouseEventKind::LeftUp), "WM_LBUTTONUP   |");
        assert_eq!(MouseEventKind::Move.to_string(), "WM_MOUSEMOVE");
    }

    #[test]
    fn outcome_codes() {
        assert_eq!(GrabOutcome::Process(4242).code(), 4242);
        assert_eq!(GrabOutcome::NoProcess.code(), 0);
        assert_eq!(GrabOutcome::Interrupted.code(), -1);
        assert_eq!(GrabOutcome::Interrupted.to_string(), "-1");
        assert!(GrabOutcome::Interrupted.is_interrupted());
        assert_eq!(GrabOutcome::Process(7).pid(), Some(7));
        assert_eq!(GrabOutcome::NoProcess.pid(), None);
    }

    #[test]
    fn zero_pid_means_no_process() {
        assert_eq!(GrabOutcome::from(Some(0)), GrabOutcome::NoProcess);
        assert_eq!(GrabOutcome::from(None), GrabOutcome::NoProcess);
        assert_eq!(GrabOutcome::from(Some(12)), GrabOutcome::Process(12));
    }
}
