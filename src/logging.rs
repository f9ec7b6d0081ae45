//! Diagnostic logging for the CLI.
//!
//! Library code only emits `tracing` events; installing a subscriber is left
//! to the binary.

use std::error::Error;
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;

use tracing_subscriber::EnvFilter;

pub const LOG_ENV_VAR: &str = "PALAVER_LOG";
pub const DEFAULT_DIRECTIVES: &str = "warn";

/// Build the filter from a directive string, falling back to the default
/// level when it is missing or unparsable.
pub fn filter_from(directives: Option<&str>) -> EnvFilter {
    directives
        .filter(|value| !value.trim().is_empty())
        .and_then(|value| EnvFilter::try_new(value).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_DIRECTIVES))
}

/// Install the global subscriber. Events go to stderr, or are appended to
/// `log_file` when one is given.
pub fn init_tracing(log_file: Option<&Path>) -> Result<(), Box<dyn Error>> {
    let directives = std::env::var(LOG_ENV_VAR).ok();
    let filter = filter_from(directives.as_deref());
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    let installed = match log_file {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            builder
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init()
        }
        None => builder.with_writer(std::io::stderr).try_init(),
    };
    installed.map_err(|err| -> Box<dyn Error> { err.to_string().into() })
}
