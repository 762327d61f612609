//! **wingrab**: click on a window, get the id of the process that owns it.
//!
//! A grab turns every system cursor into a crosshair, installs a global
//! low-level mouse hook and waits.  The next left click is swallowed (the
//! window under it never sees it), the window at the release point is
//! resolved to its owning process, and everything is put back: hook
//! removed, cursors restored, single-instance lock released.
//!
//! ```no_run
//! match wingrab::grab(false) {
//!     Ok(outcome) => println!("{}", outcome.code()),
//!     Err(e) => eprintln!("{}", e),
//! }
//! ```
//!
//! # Architecture
//!
//! * [`traits::Platform`] abstracts the windowing system (hook, message
//!   pump, system cursors, window ownership).  [`platform`] holds the Win32
//!   backend.
//! * [`session::GrabSession`] is the state machine that acquires the
//!   [`lock`], patches the [`cursor`]s, installs the [`hook`] and unwinds
//!   them in reverse.
//! * [`cancel`] ends a grab early from another thread or from a
//!   termination signal; [`worker`] runs a grab off the calling thread.
//! * [`cleanup`] recovers from a grab whose process died mid-wait.

pub mod cancel;
pub mod cleanup;
pub mod config;
pub mod cursor;
pub mod hook;
pub mod lock;
pub mod platform;
pub mod session;
pub mod traits;
pub mod types;
pub mod worker;

pub use cancel::CancelToken;
pub use cleanup::{cleanup_with, CleanupReport};
pub use config::Config;
pub use session::{GrabError, GrabSession};
pub use types::GrabOutcome;

use log::warn;

/// Run one grab on the calling thread and wait for the click.
///
/// Loads the default configuration (`debug` forces diagnostic logging of
/// every mouse event on) and installs the Ctrl-C / termination handler so
/// an interrupted grab still restores the cursors.
pub fn grab(debug: bool) -> Result<GrabOutcome, GrabError> {
    let config = load_config(debug);
    if let Err(e) = cancel::install_signal_handler() {
        warn!("could not install termination handler: {}", e);
    }
    let platform = platform::native()?;
    GrabSession::new(&platform, &config).run()
}

/// Undo what a crashed grab left behind.  See [`cleanup_with`].
pub fn cleanup(debug: bool) -> CleanupReport {
    let config = load_config(debug);
    match platform::native() {
        Ok(platform) => cleanup_with(&platform, &config),
        Err(e) => {
            warn!("cannot restore cursors: {}", e);
            CleanupReport {
                lock_removed: lock::force_release(config.lock_path()),
                ..CleanupReport::default()
            }
        }
    }
}

fn load_config(debug: bool) -> Config {
    let config = Config::load_default();
    let debug = debug || config.debug;
    config.with_debug(debug)
}
