//! Decision logic of the low-level mouse hook.
//!
//! The platform calls the hook for every mouse event in the system, on the
//! thread that pumps messages, before the event reaches any window.
//! [`ClickInterceptor`] decides what happens to each one:
//!
//! | event            | action                                         |
//! |------------------|------------------------------------------------|
//! | left press       | swallow                                        |
//! | left release     | resolve the window under the cursor, finish    |
//! | anything else    | pass through (logged in debug mode)            |
//!
//! Both halves of the left click are swallowed so the application under
//! the cursor never receives a click the user only meant as "pick this
//! window".

use crate::types::{HookAction, MouseEvent, MouseEventKind};
use log::{info, trace};

/// How the click was resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// The window under the cursor belongs to this pid.
    Process(u32),
    /// No window, or a window without an owning process.
    NoProcess,
    /// Asking the platform failed.
    Failed(String),
}

/// Per-session hook state.
#[derive(Debug, Default)]
pub struct ClickInterceptor {
    debug: bool,
    resolution: Option<Resolution>,
}

impl ClickInterceptor {
    /// `debug` logs every event at `info` instead of `trace`.
    pub fn new(debug: bool) -> Self {
        Self {
            debug,
            resolution: None,
        }
    }

    /// Decide what to do with `event`.
    ///
    /// `resolve` is only called on the left release, at that instant, and
    /// must report the owner of the window under the cursor right now.
    pub fn handle<F>(&mut self, event: &MouseEvent, resolve: F) -> HookAction
    where
        F: FnOnce() -> Result<Option<u32>, String>,
    {
        self.log_event(event);

        match event.kind {
            MouseEventKind::LeftDown => HookAction::Swallow,
            MouseEventKind::LeftUp if self.resolution.is_some() => {
                // The pump is already on its way out.
                HookAction::Swallow
            }
            MouseEventKind::LeftUp => {
                let resolution = match resolve() {
                    Ok(Some(pid)) if pid != 0 => Resolution::Process(pid),
                    Ok(_) => Resolution::NoProcess,
                    Err(message) => Resolution::Failed(message),
                };
                info!("click resolved: {:?}", resolution);
                self.resolution = Some(resolution);
                HookAction::Finish
            }
            _ => HookAction::PassThrough,
        }
    }

    /// The stored result, once the left button was released.
    pub fn resolution(&self) -> Option<&Resolution> {
        self.resolution.as_ref()
    }

    pub fn into_resolution(self) -> Option<Resolution> {
        self.resolution
    }

    fn log_event(&self, event: &MouseEvent) {
        if self.debug {
            info!(
                "{:15}: {} data={} flags={} time={}",
                event.kind, event.point, event.mouse_data, event.flags, event.time
            );
        } else {
            trace!("{:15}: {}", event.kind, event.point);
        }
    }
}
