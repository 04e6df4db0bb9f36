//! Structured logging setup.

use std::path::Path;
use std::sync::Mutex;

use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::error::Error;

/// Install the global subscriber. The level comes from the config; `RUST_LOG`
/// directives apply on top. Output goes to `log_file` (appended, relative
/// paths resolved against `root`) when set, otherwise to stderr.
///
/// # Errors
///
/// Returns `Error::ConfigInvalid` for an unknown level, `Error::Io` if the
/// log file cannot be opened, or `Error::LoggingInit` if a subscriber is
/// already installed.
pub fn init(root: &Path, config: &Config) -> Result<(), Error> {
    let level = config.tracing_level()?;
    let filter = EnvFilter::from_default_env().add_directive(level.into());
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);

    let installed = match &config.log_file {
        Some(log_file) => {
            let file = std::fs::OpenOptions::new().create(true).append(true).open(root.join(log_file))?;
            builder.with_ansi(false).with_writer(Mutex::new(file)).try_init()
        },
        None => builder.with_writer(std::io::stderr).try_init(),
    };
    return installed.map_err(|e| {
        return Error::LoggingInit { reason: e.to_string() };
    });
}
