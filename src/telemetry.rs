//! Tracing setup.
//!
//! Normal runs log to stderr at the env-filtered level so log lines do not
//! interleave with the chat output on stdout. Debug mode instead appends
//! everything at debug level to `debug.log`, matching the diagnostics-sink
//! contract: unhandled event shapes and transport retries end up there.

use std::fs::OpenOptions;
use std::io;
use std::path::Path;

use tracing_subscriber::EnvFilter;

/// Default debug log file, appended to in the working directory.
pub const DEBUG_LOG_FILE: &str = "debug.log";

/// Initialize tracing. Call once, before anything logs.
pub fn init(debug: bool, log_path: &Path) -> anyhow::Result<()> {
    if debug {
        let file = std::sync::Arc::new(open_debug_log(log_path)?);
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::new("debug"))
            .with_writer(file)
            .with_ansi(false)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
            )
            .with_writer(io::stderr)
            .with_target(true)
            .init();
    }
    Ok(())
}

/// Open the append-only debug log.
fn open_debug_log(path: &Path) -> io::Result<std::fs::File> {
    OpenOptions::new().create(true).append(true).open(path)
}
