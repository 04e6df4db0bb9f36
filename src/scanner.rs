//! Walks the tree and seeds the index from every monitored file.

use std::time::{Duration, Instant};

use serde::Serialize;
use walkdir::WalkDir;

use crate::error::Error;
use crate::index::ReferenceIndex;
use crate::workspace::Workspace;

/// What a scan did, for logs and `scan` output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScanStats {
    /// Wall-clock time the walk took.
    #[serde(serialize_with = "serialize_millis", rename = "elapsed_ms")]
    pub elapsed: Duration,
    /// Monitored files parsed into the index.
    pub files_parsed: usize,
    /// Files skipped because they could not be read or decoded.
    pub files_skipped: usize,
    /// Records stored.
    pub references: usize,
}

/// Parse one project-relative file and swap its records into the index.
/// Returns how many records were stored.
///
/// # Errors
///
/// Returns the read error if the file cannot be read or decoded.
pub fn index_file(workspace: &Workspace, index: &ReferenceIndex, relative: &str) -> Result<usize, Error> {
    let references = workspace.parse_file(relative)?;
    return Ok(index.replace_source(relative, references));
}

/// Walk the whole project and seed the index.
pub fn scan(workspace: &Workspace, index: &ReferenceIndex) -> ScanStats {
    let stats = scan_subtree(workspace, index, "");
    tracing::info!(
        event = "scan_completed",
        files = stats.files_parsed,
        skipped = stats.files_skipped,
        references = stats.references,
        elapsed_ms = u64::try_from(stats.elapsed.as_millis()).unwrap_or(u64::MAX),
        "initial scan completed"
    );
    return stats;
}

/// Walk the directory `dir` (project-relative, `""` for the root) depth-first,
/// pruning ignored directories, and index every monitored file in it.
/// Unreadable files are skipped with a warning.
pub fn scan_subtree(workspace: &Workspace, index: &ReferenceIndex, dir: &str) -> ScanStats {
    let started = Instant::now();
    let mut stats = ScanStats::default();
    let start = workspace.root().join(dir);

    let walker = WalkDir::new(&start).follow_links(false).sort_by_file_name().into_iter().filter_entry(|entry| {
        if entry.depth() == 0 {
            return true;
        }
        return workspace.relative(entry.path()).is_none_or(|relative| return !workspace.is_ignored(&relative));
    });

    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                tracing::warn!(error = %e, "skipping unreadable entry");
                stats.files_skipped = stats.files_skipped.saturating_add(1);
                continue;
            },
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(relative) = workspace.relative(entry.path()) else {
            continue;
        };
        if !workspace.is_monitored(&relative) {
            continue;
        }
        match index_file(workspace, index, &relative) {
            Ok(stored) => {
                stats.files_parsed = stats.files_parsed.saturating_add(1);
                stats.references = stats.references.saturating_add(stored);
            },
            Err(e) => {
                tracing::warn!(file = %relative, error = %e, "skipping file");
                stats.files_skipped = stats.files_skipped.saturating_add(1);
            },
        }
    }
    stats.elapsed = started.elapsed();
    return stats;
}

/// Render a duration as whole milliseconds.
///
/// # Errors
///
/// Propagates the serializer's error.
fn serialize_millis<S: serde::Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    return serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX));
}

#[cfg(test)]
#[allow(clippy::missing_panics_doc, reason = "tests unwrap fixtures")]
mod tests {
    use super::*;
    use crate::config::Config;

    fn write(root: &std::path::Path, relative: &str, content: &str) {
        let path = root.join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    #[test]
    fn scans_monitored_files_and_prunes_ignored_dirs() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "README.md", "See [guide](docs/guide.md).\n");
        write(dir.path(), "docs/guide.md", "[back](../README.md)\n");
        write(dir.path(), "node_modules/pkg/readme.md", "[x](y.md)\n");
        write(dir.path(), "img/logo.png", "not text");
        write(dir.path(), "README.md.linkbak", "[old](old.md)\n");

        let workspace = Workspace::new(dir.path().to_path_buf(), Config::default());
        let index = ReferenceIndex::default();
        let stats = scan(&workspace, &index);

        assert_eq!(stats.files_parsed, 2);
        assert_eq!(stats.references, 2);
        assert_eq!(index.lookup("docs/guide.md").len(), 1);
        assert_eq!(index.lookup("README.md").len(), 1);
        assert!(index.records_from("node_modules/pkg/readme.md").is_empty());
    }

    #[test]
    fn undecodable_files_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("bad.txt"), [0xff_u8, 0xfe, b'\n']).unwrap();
        write(dir.path(), "ok.md", "[a](b.md)\n");
        let workspace = Workspace::new(dir.path().to_path_buf(), Config::default());
        let index = ReferenceIndex::default();
        let stats = scan(&workspace, &index);
        assert_eq!(stats.files_parsed, 1);
        assert_eq!(stats.files_skipped, 1);
    }

    #[test]
    fn subtree_scan_only_touches_the_subtree() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.md", "[x](x.md)\n");
        write(dir.path(), "docs/b.md", "[y](y.md)\n");
        let workspace = Workspace::new(dir.path().to_path_buf(), Config::default());
        let index = ReferenceIndex::default();
        let stats = scan_subtree(&workspace, &index, "docs");
        assert_eq!(stats.files_parsed, 1);
        assert_eq!(index.records_from("docs/b.md").len(), 1);
        assert!(index.records_from("a.md").is_empty());
    }
}
