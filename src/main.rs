//! Entry point for the **wingrab** command.
//!
//! ```text
//! wingrab [grab|clean] [--debug|-d]
//! ```
//!
//! `grab` (the default) prints the pid of the clicked window's process,
//! `0` when there was no window under the click, or `-1` when interrupted.
//! `clean` restores the cursors and removes the lock after a crash.

use log::debug;
use std::process::ExitCode;
use wingrab::cancel::INTERRUPTED_EXIT_CODE;

const USAGE: &str = "usage: wingrab [grab|clean] [--debug|-d]";

enum Command {
    Grab,
    Clean,
}

fn main() -> ExitCode {
    let mut command = None;
    let mut debug = false;

    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--debug" | "-d" => debug = true,
            "grab" if command.is_none() => command = Some(Command::Grab),
            "clean" if command.is_none() => command = Some(Command::Clean),
            "--help" | "-h" => {
                println!("{}", USAGE);
                return ExitCode::SUCCESS;
            }
            other => {
                eprintln!("Unknown command: {}", other);
                eprintln!("{}", USAGE);
                return ExitCode::from(2);
            }
        }
    }

    init_logging(debug);

    match command.unwrap_or(Command::Grab) {
        Command::Grab => run_grab(debug),
        Command::Clean => run_clean(debug),
    }
}

fn init_logging(debug: bool) {
    let default_filter = if debug { "debug" } else { "warn" };
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter));
    if debug {
        // --debug wins over RUST_LOG.
        builder.parse_filters(default_filter);
    }
    builder.init();
}

fn run_grab(debug: bool) -> ExitCode {
    match wingrab::grab(debug) {
        Ok(outcome) => {
            println!("{}", outcome.code());
            if outcome.is_interrupted() {
                ExitCode::from(INTERRUPTED_EXIT_CODE as u8)
            } else {
                ExitCode::SUCCESS
            }
        }
        Err(e) => {
            eprintln!("wingrab: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run_clean(debug: bool) -> ExitCode {
    let report = wingrab::cleanup(debug);
    debug!("cleanup: {:?}", report);
    if !report.performed() {
        if let Some(pid) = report.live_holder {
            eprintln!("A grab is still running in process {}; nothing was changed.", pid);
        }
        return ExitCode::FAILURE;
    }
    println!("Cleaned up.");
    ExitCode::SUCCESS
}
