//! Start-up helpers shared by the command-line tools

use env_logger::Env;
use log::{LevelFilter, info, warn};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

#[cfg(windows)]
use std::ffi::OsString;
#[cfg(windows)]
use std::os::windows::ffi::OsStrExt;

/// Map a level name to a filter
pub fn parse_level(log_level: &str) -> Option<LevelFilter> {
    match log_level.to_lowercase().as_str() {
        "off" => Some(LevelFilter::Off),
        "trace" => Some(LevelFilter::Trace),
        "debug" => Some(LevelFilter::Debug),
        "info" => Some(LevelFilter::Info),
        "warn" => Some(LevelFilter::Warn),
        "error" => Some(LevelFilter::Error),
        _ => None,
    }
}

/// Initialize logging with configurable level
pub fn initialize_logging(log_level: &str) {
    let level = parse_level(log_level).unwrap_or_else(|| {
        eprintln!("Warning: Invalid log level '{}', using 'info'", log_level);
        LevelFilter::Info
    });

    env_logger::Builder::from_env(Env::default())
        .filter_level(level)
        .format_timestamp_millis()
        .init();
}

/// Install a Ctrl+C handler
///
/// The first Ctrl+C raises the returned flag so polling loops can stop and
/// the connection is released. A second Ctrl+C exits immediately.
pub fn setup_shutdown_handler() -> Result<Arc<AtomicBool>, ctrlc::Error> {
    let shutdown_flag = Arc::new(AtomicBool::new(false));
    let shutdown_flag_clone = shutdown_flag.clone();

    ctrlc::set_handler(move || {
        if shutdown_flag_clone.swap(true, Ordering::SeqCst) {
            warn!("Second Ctrl+C - exiting without cleanup");
            std::process::exit(130);
        }
        info!("Ctrl+C received - stopping after the current step (press again to force exit)");
    })?;

    Ok(shutdown_flag)
}

/// Give the tool its own titled console when started outside a terminal
/// (double-clicked on Windows); elsewhere this does nothing
#[cfg(windows)]
pub fn ensure_console_allocated(title: &str) {
    use winapi::um::{consoleapi, handleapi, processenv, winbase, wincon};

    let title: Vec<u16> = OsString::from(title)
        .encode_wide()
        .chain(std::iter::once(0))
        .collect();

    unsafe {
        consoleapi::AllocConsole();
        wincon::SetConsoleTitleW(title.as_ptr());

        let stdout = processenv::GetStdHandle(winbase::STD_OUTPUT_HANDLE);
        if stdout == handleapi::INVALID_HANDLE_VALUE {
            return;
        }
        let mut mode = 0;
        if consoleapi::GetConsoleMode(stdout, &mut mode) != 0 {
            consoleapi::SetConsoleMode(stdout, mode | wincon::ENABLE_VIRTUAL_TERMINAL_PROCESSING);
        }
    }
}

#[cfg(not(windows))]
pub fn ensure_console_allocated(_title: &str) {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("DEBUG"), Some(LevelFilter::Debug));
        assert_eq!(parse_level("warn"), Some(LevelFilter::Warn));
        assert_eq!(parse_level("loud"), None);
    }
}
