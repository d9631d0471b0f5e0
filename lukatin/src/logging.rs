//! Development-time tracing.
//!
//! Diagnostics are filtered by `RUST_LOG` and written to stderr, or appended
//! to the file named by `LUKATIN_LOG_FILE` so they stay out of the REPL.
//! Tool results and REPL output go to stdout and never pass through here.

use std::fs::OpenOptions;
use std::sync::Mutex;

use anyhow::{Context, Result};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Names a file that receives log output instead of stderr.
pub const LOG_FILE_ENV: &str = "LUKATIN_LOG_FILE";

/// Initialize the tracing subscriber.
///
/// Reads `RUST_LOG`; defaults to `warn` if unset.
///
/// # Example
/// ```bash
/// RUST_LOG=lukatin=debug LUKATIN_LOG_FILE=lukatin.log lukatin repl
/// ```
pub fn init() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let registry = tracing_subscriber::registry().with(filter);

    match std::env::var_os(LOG_FILE_ENV) {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .with_context(|| format!("open log file {}", path.to_string_lossy()))?;
            registry
                .with(
                    fmt::layer()
                        .with_writer(Mutex::new(file))
                        .with_ansi(false)
                        .compact(),
                )
                .init();
        }
        None => registry
            .with(fmt::layer().with_writer(std::io::stderr).compact())
            .init(),
    }
    Ok(())
}
