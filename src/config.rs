//! Loading and validating `.linkmend.toml`.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::Error;
use crate::paths;

/// Name of the config file looked up at the project root.
pub const CONFIG_FILE_NAME: &str = ".linkmend.toml";

/// Suffix appended to side-by-side backups of rewritten files.
pub const BACKUP_SUFFIX: &str = ".linkbak";

/// Prefix of temporary files created during atomic rewrites.
pub const TEMP_PREFIX: &str = ".linkmend-";

/// Suffix of temporary files created during atomic rewrites.
pub const TEMP_SUFFIX: &str = ".tmp";

/// Instance lock file name at the project root.
pub const LOCK_FILE_NAME: &str = ".linkmend.lock";

/// Extensions (with leading dot) whose files are parsed and watched by default.
const DEFAULT_MONITORED_EXTENSIONS: &[&str] = &[
    ".bat", ".css", ".htm", ".html", ".js", ".json", ".jsx", ".markdown", ".md", ".ps1", ".py",
    ".rst", ".sh", ".toml", ".ts", ".tsx", ".txt", ".xml", ".yaml", ".yml",
];

/// Directory basenames pruned during scans and ignored at event ingress.
const DEFAULT_IGNORED_DIRECTORIES: &[&str] = &[
    ".git", ".hg", ".idea", ".mypy_cache", ".pytest_cache", ".svn", ".tox", ".venv", ".vscode",
    "__pycache__", "build", "dist", "node_modules", "target", "venv",
];

/// Extensions (without dot) a dot-only, separator-free string needs to count as a file name.
const DEFAULT_PATH_EXTENSIONS: &[&str] = &[
    // documents
    "adoc", "csv", "doc", "docx", "htm", "html", "log", "markdown", "md", "odt", "pdf", "ppt",
    "pptx", "rst", "rtf", "tex", "tsv", "txt", "xls", "xlsx",
    // data and config
    "cfg", "conf", "env", "ini", "json", "lock", "toml", "xml", "yaml", "yml",
    // code
    "bat", "c", "cc", "cjs", "cpp", "cs", "css", "go", "h", "hpp", "java", "js", "jsx", "kt",
    "lua", "mjs", "php", "pl", "ps1", "py", "r", "rb", "rs", "sass", "scss", "sh", "sql",
    "swift", "ts", "tsx", "vue",
    // images
    "bmp", "gif", "ico", "jpeg", "jpg", "png", "svg", "tif", "tiff", "webp",
    // archives
    "7z", "bz2", "gz", "rar", "tar", "tgz", "xz", "zip",
    // media
    "avi", "flac", "m4a", "mkv", "mov", "mp3", "mp4", "ogg", "wav", "webm",
];

/// Effective runtime configuration after file loading, CLI overrides and validation.
#[derive(Debug, Clone)]
#[allow(clippy::struct_excessive_bools, reason = "independent user-facing toggles")]
pub struct Config {
    /// Copy each rewritten file to a `.linkbak` sibling first.
    pub create_backups: bool,
    /// Compute edits and report counts without writing.
    pub dry_run_mode: bool,
    /// Lifetime of hash-cache entries.
    pub hash_cache_ttl: Duration,
    /// Directory basenames pruned during scan and ignored at ingress.
    pub ignored_directories: HashSet<String>,
    /// Seed the index before event processing.
    pub initial_scan_enabled: bool,
    /// Optional log destination; ignored at event ingress when set.
    pub log_file: Option<PathBuf>,
    /// Minimum log severity.
    pub log_level: String,
    /// Decode non-UTF-8 files lossily instead of skipping them.
    pub lossy_utf8: bool,
    /// Files of this size or larger are never hashed.
    pub max_hash_file_bytes: u64,
    /// Extensions (leading dot, lowercase) whose files are parsed.
    pub monitored_extensions: HashSet<String>,
    /// How long a deletion waits for a matching creation.
    pub move_detection_window: Duration,
    /// File-path heuristic allow-list (no dot, lowercase).
    pub path_extensions: HashSet<String>,
    /// Rewrite a moved file's own relative links so they keep resolving.
    pub update_moved_file_links: bool,
}

/// Raw TOML structure for `.linkmend.toml`. Every key is optional.
#[derive(serde::Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
struct LinkmendTomlConfig {
    /// See [`Config::create_backups`].
    create_backups: Option<bool>,
    /// See [`Config::dry_run_mode`].
    dry_run_mode: Option<bool>,
    /// See [`Config::hash_cache_ttl`].
    hash_cache_ttl_seconds: Option<f64>,
    /// See [`Config::ignored_directories`].
    ignored_directories: Option<Vec<String>>,
    /// See [`Config::initial_scan_enabled`].
    initial_scan_enabled: Option<bool>,
    /// See [`Config::log_file`].
    log_file: Option<PathBuf>,
    /// See [`Config::log_level`].
    log_level: Option<String>,
    /// See [`Config::lossy_utf8`].
    lossy_utf8: Option<bool>,
    /// See [`Config::max_hash_file_bytes`].
    max_hash_file_bytes: Option<u64>,
    /// See [`Config::monitored_extensions`].
    monitored_extensions: Option<Vec<String>>,
    /// See [`Config::move_detection_window`].
    move_detection_window_seconds: Option<f64>,
    /// See [`Config::path_extensions`].
    path_extensions: Option<Vec<String>>,
    /// See [`Config::update_moved_file_links`].
    update_moved_file_links: Option<bool>,
}

/// Command-line overrides applied on top of the file.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    /// `--backups`.
    pub create_backups: bool,
    /// `--dry-run`.
    pub dry_run_mode: bool,
    /// `--log-level`.
    pub log_level: Option<String>,
    /// `--no-initial-scan`.
    pub skip_initial_scan: bool,
}

impl Default for Config {
    /// Built-in defaults used when no config file exists.
    fn default() -> Self {
        return Self {
            create_backups: false,
            dry_run_mode: false,
            hash_cache_ttl: Duration::from_secs(30),
            ignored_directories: to_set(DEFAULT_IGNORED_DIRECTORIES),
            initial_scan_enabled: true,
            log_file: None,
            log_level: "info".to_string(),
            lossy_utf8: false,
            max_hash_file_bytes: 1024 * 1024,
            monitored_extensions: to_set(DEFAULT_MONITORED_EXTENSIONS),
            move_detection_window: Duration::from_secs(5),
            path_extensions: to_set(DEFAULT_PATH_EXTENSIONS),
            update_moved_file_links: true,
        };
    }
}

impl Config {
    /// Apply command-line overrides. Flags only ever switch features on
    /// (or the scan off); absent flags leave the file's values alone.
    pub fn apply_overrides(&mut self, overrides: &Overrides) {
        if overrides.create_backups {
            self.create_backups = true;
        }
        if overrides.dry_run_mode {
            self.dry_run_mode = true;
        }
        if overrides.skip_initial_scan {
            self.initial_scan_enabled = false;
        }
        if let Some(level) = &overrides.log_level {
            self.log_level.clone_from(level);
        }
        return;
    }

    /// Build a config from TOML text, starting from the defaults.
    ///
    /// # Errors
    ///
    /// Returns `Error::TomlDe` if the TOML is malformed or has unknown keys,
    /// or `Error::ConfigInvalid` if a value fails validation.
    pub fn from_toml(content: &str) -> Result<Self, Error> {
        let raw: LinkmendTomlConfig = toml::from_str(content)?;
        let mut config = Self::default();

        if let Some(v) = raw.create_backups {
            config.create_backups = v;
        }
        if let Some(v) = raw.dry_run_mode {
            config.dry_run_mode = v;
        }
        if let Some(v) = raw.hash_cache_ttl_seconds {
            config.hash_cache_ttl = seconds("hash_cache_ttl_seconds", v)?;
        }
        if let Some(v) = raw.ignored_directories {
            config.ignored_directories = v.into_iter().collect();
        }
        if let Some(v) = raw.initial_scan_enabled {
            config.initial_scan_enabled = v;
        }
        if raw.log_file.is_some() {
            config.log_file = raw.log_file;
        }
        if let Some(v) = raw.log_level {
            config.log_level = v;
        }
        if let Some(v) = raw.lossy_utf8 {
            config.lossy_utf8 = v;
        }
        if let Some(v) = raw.max_hash_file_bytes {
            config.max_hash_file_bytes = v;
        }
        if let Some(v) = raw.monitored_extensions {
            config.monitored_extensions = v.iter().map(|e| return e.to_lowercase()).collect();
        }
        if let Some(v) = raw.move_detection_window_seconds {
            config.move_detection_window = seconds("move_detection_window_seconds", v)?;
        }
        if let Some(v) = raw.path_extensions {
            config.path_extensions = v
                .iter()
                .map(|e| return e.trim_start_matches('.').to_lowercase())
                .collect();
        }
        if let Some(v) = raw.update_moved_file_links {
            config.update_moved_file_links = v;
        }

        config.validate()?;
        return Ok(config);
    }

    /// Whether a project-relative path is excluded from scanning and events:
    /// any segment is an ignored directory, or the path is one of our own
    /// artefacts (lock file, log file, backups, rewrite temporaries).
    pub fn is_ignored(&self, relative: &str, log_file: Option<&str>) -> bool {
        if relative == LOCK_FILE_NAME {
            return true;
        }
        if log_file.is_some_and(|log| return log == relative) {
            return true;
        }
        let name = paths::basename(relative);
        if name.ends_with(BACKUP_SUFFIX) || (name.starts_with(TEMP_PREFIX) && name.ends_with(TEMP_SUFFIX)) {
            return true;
        }
        let parent = paths::dirname(relative);
        return parent
            .split('/')
            .chain(std::iter::once(name))
            .any(|segment| return self.ignored_directories.contains(segment));
    }

    /// Whether files at this path are parsed for references.
    pub fn is_monitored(&self, relative: &str) -> bool {
        let name = paths::basename(relative);
        let Some((stem, ext)) = name.rsplit_once('.') else {
            return false;
        };
        if stem.is_empty() {
            return false;
        }
        return self.monitored_extensions.contains(&format!(".{}", ext.to_lowercase()));
    }

    /// Load config from `.linkmend.toml` in `root`, or from `explicit` when given.
    /// Returns the defaults if the implicit file doesn't exist.
    /// Returns an error if the file exists but is malformed, never silently
    /// falls back to defaults when the user wrote a config file.
    ///
    /// # Errors
    ///
    /// Returns `Error::ConfigNotFound` if `explicit` names a missing file,
    /// `Error::Io` if reading fails, `Error::TomlDe` if the TOML is malformed,
    /// or `Error::ConfigInvalid` if validation fails.
    pub fn load(root: &Path, explicit: Option<&Path>) -> Result<Self, Error> {
        let path = explicit.map_or_else(|| return root.join(CONFIG_FILE_NAME), Path::to_path_buf);
        let content = match std::fs::read_to_string(&path) {
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                if explicit.is_some() {
                    return Err(Error::ConfigNotFound { path });
                }
                return Ok(Self::default());
            },
            Err(e) => return Err(Error::Io(e)),
            Ok(c) => c,
        };
        return Self::from_toml(&content);
    }

    /// Parsed `log_level` as a tracing level.
    ///
    /// # Errors
    ///
    /// Returns `Error::ConfigInvalid` for unknown level names.
    pub fn tracing_level(&self) -> Result<tracing::Level, Error> {
        return self.log_level.parse::<tracing::Level>().map_err(|_err| {
            return Error::ConfigInvalid {
                field: "log_level".to_string(),
                reason: format!("unknown level `{}` (expected error|warn|info|debug|trace)", self.log_level),
            };
        });
    }

    /// Check cross-field invariants.
    ///
    /// # Errors
    ///
    /// Returns `Error::ConfigInvalid` naming the first offending option.
    pub fn validate(&self) -> Result<(), Error> {
        if let Some(bad) = self.monitored_extensions.iter().find(|e| return !e.starts_with('.') || e.len() < 2) {
            return Err(Error::ConfigInvalid {
                field: "monitored_extensions".to_string(),
                reason: format!("`{bad}` must start with a dot, like `.md`"),
            });
        }
        if self.max_hash_file_bytes == 0 {
            return Err(Error::ConfigInvalid {
                field: "max_hash_file_bytes".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.move_detection_window.is_zero() {
            return Err(Error::ConfigInvalid {
                field: "move_detection_window_seconds".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.hash_cache_ttl.is_zero() {
            return Err(Error::ConfigInvalid {
                field: "hash_cache_ttl_seconds".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        self.tracing_level()?;
        return Ok(());
    }
}

/// Convert a seconds value from the config file into a duration.
///
/// # Errors
///
/// Returns `Error::ConfigInvalid` for negative, zero, or non-finite values.
fn seconds(field: &str, value: f64) -> Result<Duration, Error> {
    if !value.is_finite() || value <= 0.0 {
        return Err(Error::ConfigInvalid {
            field: field.to_string(),
            reason: format!("{value} is not a positive number of seconds"),
        });
    }
    return Duration::try_from_secs_f64(value).map_err(|e| {
        return Error::ConfigInvalid {
            field: field.to_string(),
            reason: e.to_string(),
        };
    });
}

/// Own a static list as a set.
fn to_set(items: &[&str]) -> HashSet<String> {
    return items.iter().map(|s| return (*s).to_string()).collect();
}
