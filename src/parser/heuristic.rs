//! The file-path heuristic shared by every strategy that has to guess
//! whether an arbitrary string is a path.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use super::compile_pattern;

/// Overall shape: path characters followed by a final `.ext`.
static PATH_SHAPE: LazyLock<Regex> =
    LazyLock::new(|| return compile_pattern(r"^[A-Za-z0-9_\-./\\]+\.[A-Za-z0-9]+$"));

/// Dotted version numbers such as `1.2.3`.
static VERSION_NUMBER: LazyLock<Regex> = LazyLock::new(|| return compile_pattern(r"^\d+(\.\d+)+$"));

/// Bare host names ending in a common top-level domain.
static BARE_DOMAIN: LazyLock<Regex> = LazyLock::new(|| {
    return compile_pattern(
        r"(?i)^(?:[a-z0-9-]+\.)+(?:com|org|net|io|dev|edu|gov|mil|int|co|uk|de|fr|jp|cn|ru|us|eu|app|ai|info|biz|me|tv|xyz)$",
    );
});

/// Prefixes that mark a string as a URL or a package specifier rather than a path.
const NON_PATH_PREFIXES: &[&str] = &["http://", "https://", "ftp://", "mailto:", "tel:", "package:", "//"];

/// Longest extension accepted on a separator-free candidate.
const MAX_EXTENSION_LEN: usize = 10;

/// Decides whether a string is a plausible file path.
#[derive(Debug, Clone)]
pub struct PathHeuristic {
    /// Extensions (lowercase, no dot) that make `name.ext` count as a file.
    extensions: HashSet<String>,
}

impl PathHeuristic {
    /// Whether `candidate` passes every rule of the heuristic.
    pub fn is_path_candidate(&self, candidate: &str) -> bool {
        if candidate.len() < 3 {
            return false;
        }
        if NON_PATH_PREFIXES.iter().any(|prefix| return candidate.starts_with(prefix)) {
            return false;
        }
        if VERSION_NUMBER.is_match(candidate) {
            return false;
        }
        let has_separator = candidate.contains('/') || candidate.contains('\\');
        if !has_separator && BARE_DOMAIN.is_match(candidate) {
            return false;
        }
        if !candidate.contains('.') || !PATH_SHAPE.is_match(candidate) {
            return false;
        }
        if has_separator {
            return true;
        }

        let Some((stem, extension)) = candidate.rsplit_once('.') else {
            return false;
        };
        if stem.is_empty() || extension.is_empty() || extension.len() > MAX_EXTENSION_LEN {
            return false;
        }
        // A single dot with an unknown extension reads as `object.property`.
        let single_dot = !stem.contains('.');
        if single_dot {
            return self.extensions.contains(&extension.to_lowercase());
        }
        return true;
    }

    /// Build a heuristic from an allow-list of extensions (no leading dot).
    pub fn new(extensions: &HashSet<String>) -> Self {
        return Self {
            extensions: extensions.iter().map(|e| return e.to_lowercase()).collect(),
        };
    }
}
