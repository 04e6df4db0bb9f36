//! Crate-level error types for linkmend diagnostics.
use std::path::PathBuf;

/// Every error names the file, option, or process it concerns so the
/// diagnostic is actionable without a debugger. Per-file failures inside the
/// worker are logged and swallowed; only startup failures reach `main`.
#[allow(clippy::error_impl_error, reason = "crate-internal error type in binary")]
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A configuration option failed validation.
    #[error("invalid config option `{field}`: {reason}")]
    ConfigInvalid {
        /// Name of the offending option.
        field: String,
        /// Why the value was rejected.
        reason: String,
    },

    /// An explicitly requested config file does not exist.
    #[error("config not found: {}", path.display())]
    ConfigNotFound {
        /// Path to the missing config file.
        path: PathBuf,
    },

    /// A file named on the command line or by an operation does not exist.
    #[error("file not found: {}", path.display())]
    FileNotFound {
        /// Path to the missing file.
        path: PathBuf,
    },

    /// File content is not UTF-8 and lossy decoding is disabled.
    #[error("not valid UTF-8: {}", path.display())]
    InvalidUtf8 {
        /// File that failed to decode.
        path: PathBuf,
    },

    /// Underlying I/O error from the filesystem.
    #[error("io: {0}")]
    Io(
        /// The wrapped I/O error.
        #[from]
        std::io::Error,
    ),

    /// JSON serialization failed.
    #[error("json: {0}")]
    Json(
        /// The wrapped JSON error.
        #[from]
        serde_json::Error,
    ),

    /// Another live process owns the instance lock.
    #[error("another instance (pid {pid}) is watching this tree: {}", path.display())]
    LockHeld {
        /// Lock file path.
        path: PathBuf,
        /// Process identifier recorded in the lock file.
        pid: u32,
    },

    /// The tracing subscriber could not be installed.
    #[error("logging setup failed: {reason}")]
    LoggingInit {
        /// Description of the failure.
        reason: String,
    },

    /// A path given to the tool lies outside the project root.
    #[error("path is outside the project root: {}", path.display())]
    PathOutsideRoot {
        /// The rejected path.
        path: PathBuf,
    },

    /// Atomic replacement of a rewritten file failed.
    #[error("could not replace {}: {reason}", path.display())]
    Persist {
        /// File that could not be replaced.
        path: PathBuf,
        /// Description of the failure.
        reason: String,
    },

    /// The interrupt listener could not be started.
    #[error("signal handler setup failed: {reason}")]
    SignalSetup {
        /// Description of the failure.
        reason: String,
    },

    /// TOML deserialization failed.
    #[error("toml deserialize: {0}")]
    TomlDe(
        /// The wrapped TOML deserialization error.
        #[from]
        toml::de::Error,
    ),

    /// The filesystem subscription could not be created.
    #[error("watcher: {0}")]
    Watch(
        /// The wrapped notify error.
        #[from]
        notify::Error,
    ),
}
