//! Rewriting link targets in place.
//!
//! Planning is pure: given a record and a move, decide the replacement text.
//! Applying is per file: read once, splice every edit from the end of the file
//! backwards, and replace the file atomically.

use std::collections::BTreeMap;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use crate::config::{BACKUP_SUFFIX, Config, TEMP_PREFIX, TEMP_SUFFIX};
use crate::error::Error;
use crate::paths;
use crate::types::{Reference, ReferenceKind};

/// One planned substitution inside a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edit {
    /// Byte offset one past the target within the line.
    pub column_end: usize,
    /// Byte offset of the target within the line.
    pub column_start: usize,
    /// One-based line number.
    pub line: u32,
    /// Target text expected at the span.
    pub original: String,
    /// Text to put there instead.
    pub replacement: String,
}

/// What moved, and from whose point of view the link is being rewritten.
#[derive(Debug, Clone, Copy)]
pub struct EditRequest<'a> {
    /// Project path of the file that holds the link now. Differs from
    /// `reference.source` only when the holder itself has moved.
    pub host: &'a str,
    /// Normalised new location of the moved entity.
    pub new_target: &'a str,
    /// Normalised old location of the moved entity.
    pub old_target: &'a str,
    /// The record to rewrite.
    pub reference: &'a Reference,
}

/// Outcome of applying edits across several files.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RewriteReport {
    /// Files that could not be rewritten, with the reason.
    pub failures: Vec<(String, String)>,
    /// Replacements made (or that would be made, in dry-run mode) per file.
    pub files: BTreeMap<String, usize>,
}

/// How files are written back.
#[derive(Debug, Clone, Copy, Default)]
pub struct WriteOptions {
    /// Copy each file to a `.linkbak` sibling before replacing it.
    pub create_backups: bool,
    /// Count edits without touching the file.
    pub dry_run: bool,
    /// Decode invalid UTF-8 lossily instead of refusing the file.
    pub lossy_utf8: bool,
}

impl RewriteReport {
    /// Total replacements across all files.
    pub fn total(&self) -> usize {
        return self.files.values().sum();
    }
}

impl WriteOptions {
    /// Options taken from the runtime configuration.
    pub const fn from_config(config: &Config) -> Self {
        return Self {
            create_backups: config.create_backups,
            dry_run: config.dry_run_mode,
            lossy_utf8: config.lossy_utf8,
        };
    }
}

/// Apply `edits` to one file under `root`. Returns how many were applied.
///
/// Edits whose span no longer holds the expected text are re-anchored to the
/// nearest occurrence on the same line, or skipped. A file with no applicable
/// edit is never written.
///
/// # Errors
///
/// Returns `Error::FileNotFound` if the file is gone, `Error::InvalidUtf8`
/// for undecodable content in strict mode, `Error::Io` for read, backup or
/// write failures, and `Error::Persist` if the final rename fails.
pub fn apply_edits(root: &Path, file: &str, mut edits: Vec<Edit>, options: WriteOptions) -> Result<usize, Error> {
    let path = root.join(file);
    let content = read_text(&path, options.lossy_utf8)?;
    let mut lines: Vec<String> = content.split_inclusive('\n').map(str::to_string).collect();

    edits.sort_by(|a, b| return (b.line, b.column_start).cmp(&(a.line, a.column_start)));
    edits.dedup_by(|a, b| return a.line == b.line && a.column_start == b.column_start);

    let mut applied = 0_usize;
    for edit in &edits {
        let Some(index) = usize::try_from(edit.line).ok().and_then(|n| return n.checked_sub(1)) else {
            continue;
        };
        let Some(line) = lines.get_mut(index) else {
            continue;
        };
        if splice_line(line, edit) {
            applied = applied.saturating_add(1);
        } else {
            tracing::debug!(file, line = edit.line, original = %edit.original, "stale edit skipped");
        }
    }
    if applied == 0 || options.dry_run {
        return Ok(applied);
    }

    let updated = lines.concat();
    if options.create_backups {
        let mut backup = path.clone().into_os_string();
        backup.push(BACKUP_SUFFIX);
        std::fs::copy(&path, PathBuf::from(backup))?;
    }
    write_atomically(&path, updated.as_bytes())?;
    return Ok(applied);
}

/// Reattach the anchor and build the edit, unless nothing changes.
fn finish_edit(reference: &Reference, new_path: &str, anchor: Option<&str>) -> Option<Edit> {
    let replacement = match anchor {
        Some(fragment) => format!("{new_path}#{fragment}"),
        None => new_path.to_string(),
    };
    if replacement == reference.target {
        return None;
    }
    return Some(Edit {
        column_end: reference.column_end,
        column_start: reference.column_start,
        line: reference.line,
        original: reference.target.clone(),
        replacement,
    });
}

/// Convert `/` in a computed target to the separator style of `original`.
fn match_separator_style(computed: &str, original: &str, kind: ReferenceKind) -> String {
    if kind == ReferenceKind::JsonValue && original.contains("\\\\") {
        return computed.replace('/', "\\\\");
    }
    if original.contains('\\') {
        return computed.replace('/', "\\");
    }
    return computed.to_string();
}

/// New raw target for a record pointing at something that moved from
/// `old_target` to `new_target`, seen from the holder's directory.
fn new_raw_target(original: &str, host_dir: &str, old_target: &str, new_target: &str) -> String {
    let unified = original.replace('\\', "/");
    let bare = !unified.contains('/');
    if paths::is_root_absolute(original) {
        return format!("/{new_target}");
    }
    if bare && paths::dirname(new_target) == host_dir {
        return paths::basename(new_target).to_string();
    }
    if paths::normalize(original) == old_target {
        return new_target.to_string();
    }
    let relative = paths::relative_path(host_dir, new_target);
    if unified.starts_with("./") && !relative.starts_with("../") {
        return format!("./{relative}");
    }
    return relative;
}

/// Plan the substitution for one record, or `None` when the record does not
/// refer to the moved entity or would come out unchanged.
pub fn plan_edit(request: &EditRequest<'_>) -> Option<Edit> {
    let reference = request.reference;
    let (path_part, anchor) = paths::split_anchor(&reference.target);
    if !refers_to(reference, path_part, request.old_target) {
        return None;
    }
    let computed = new_raw_target(path_part, paths::dirname(request.host), request.old_target, request.new_target);
    let styled = match_separator_style(&computed, path_part, reference.kind);
    return finish_edit(reference, &styled, anchor);
}

/// Plan the rewrite of a moved file's own relative link so it keeps pointing
/// at the same thing. Only links that resolved to an existing entry from the
/// old location are touched; root-absolute links never need it.
pub fn plan_outbound_edit(root: &Path, reference: &Reference, old_source: &str, new_source: &str) -> Option<Edit> {
    let (path_part, anchor) = paths::split_anchor(&reference.target);
    if path_part.is_empty() || paths::is_root_absolute(path_part) {
        return None;
    }
    let old_dir = paths::dirname(old_source);
    let new_dir = paths::dirname(new_source);
    if old_dir == new_dir {
        return None;
    }
    let resolved = paths::resolve_from(old_dir, path_part);
    if paths::escapes_root(&resolved) || resolved == old_source || !root.join(&resolved).exists() {
        return None;
    }
    let mut relative = paths::relative_path(new_dir, &resolved);
    if path_part.replace('\\', "/").starts_with("./") && !relative.starts_with("../") {
        relative = format!("./{relative}");
    }
    let styled = match_separator_style(&relative, path_part, reference.kind);
    return finish_edit(reference, &styled, anchor);
}

/// Read a file as text.
///
/// # Errors
///
/// Returns `Error::FileNotFound`, `Error::InvalidUtf8` (strict mode only), or `Error::Io`.
pub fn read_text(path: &Path, lossy: bool) -> Result<String, Error> {
    let bytes = match std::fs::read(path) {
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(Error::FileNotFound {
                path: path.to_path_buf(),
            });
        },
        Err(e) => return Err(Error::Io(e)),
        Ok(b) => b,
    };
    return match String::from_utf8(bytes) {
        Ok(text) => Ok(text),
        Err(e) if lossy => Ok(String::from_utf8_lossy(e.as_bytes()).into_owned()),
        Err(_) => Err(Error::InvalidUtf8 {
            path: path.to_path_buf(),
        }),
    };
}

/// Whether a record genuinely points at `old_target`: same normalised path,
/// a bare file name in the same directory, or resolving there from the
/// record's own directory.
fn refers_to(reference: &Reference, path_part: &str, old_target: &str) -> bool {
    if paths::normalize(path_part) == old_target {
        return true;
    }
    let source_dir = paths::dirname(&reference.source);
    let bare = !path_part.contains('/') && !path_part.contains('\\');
    if bare && path_part == paths::basename(old_target) && paths::dirname(old_target) == source_dir {
        return true;
    }
    return paths::resolve_from(source_dir, path_part) == old_target;
}

/// Apply a batch of edits grouped by file, continuing past per-file failures.
pub fn rewrite_files(root: &Path, edits: BTreeMap<String, Vec<Edit>>, options: WriteOptions) -> RewriteReport {
    let mut report = RewriteReport::default();
    for (file, file_edits) in edits {
        match apply_edits(root, &file, file_edits, options) {
            Err(e) => {
                tracing::warn!(event = "rewrite_failed", file = %file, error = %e, "could not rewrite file");
                report.failures.push((file, e.to_string()));
            },
            Ok(0) => {},
            Ok(count) => {
                tracing::info!(event = "links_updated", file = %file, count, dry_run = options.dry_run, "links updated");
                report.files.insert(file, count);
            },
        }
    }
    return report;
}

/// Splice one edit into a line (line ending included). Falls back to the
/// occurrence of the original text closest to the recorded column.
fn splice_line(line: &mut String, edit: &Edit) -> bool {
    let ending_len = if line.ends_with("\r\n") {
        2
    } else {
        usize::from(line.ends_with('\n'))
    };
    let body_len = line.len().saturating_sub(ending_len);
    let body = line.get(..body_len).unwrap_or("");

    let start = if body.get(edit.column_start..edit.column_end) == Some(edit.original.as_str()) {
        edit.column_start
    } else {
        let nearest = body
            .match_indices(edit.original.as_str())
            .map(|(index, _)| return index)
            .min_by_key(|index| return index.abs_diff(edit.column_start));
        let Some(found) = nearest else {
            return false;
        };
        found
    };
    let end = start.saturating_add(edit.original.len());
    line.replace_range(start..end, &edit.replacement);
    return true;
}

/// Replace `path` with `content` via a temporary sibling and a rename,
/// keeping the original permissions.
///
/// # Errors
///
/// Returns `Error::Io` if the temporary file cannot be written, or
/// `Error::Persist` if the rename fails.
fn write_atomically(path: &Path, content: &[u8]) -> Result<(), Error> {
    let dir = path.parent().unwrap_or_else(|| return Path::new("."));
    let permissions = std::fs::metadata(path)?.permissions();
    let mut temp = tempfile::Builder::new().prefix(TEMP_PREFIX).suffix(TEMP_SUFFIX).tempfile_in(dir)?;
    temp.write_all(content)?;
    temp.as_file().sync_all()?;
    temp.as_file().set_permissions(permissions)?;
    temp.persist(path).map_err(|e| {
        return Error::Persist {
            path: path.to_path_buf(),
            reason: e.error.to_string(),
        };
    })?;
    return Ok(());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference(source: &str, target: &str, kind: ReferenceKind) -> Reference {
        return Reference {
            anchor_text: None,
            column_end: 5 + target.len(),
            column_start: 5,
            kind,
            line: 1,
            source: source.to_string(),
            target: target.to_string(),
        };
    }

    fn plan(source: &str, target: &str, old: &str, new: &str) -> Option<String> {
        let r = reference(source, target, ReferenceKind::MarkdownInline);
        let request = EditRequest {
            host: source,
            new_target: new,
            old_target: old,
            reference: &r,
        };
        return plan_edit(&request).map(|edit| return edit.replacement);
    }

    #[test]
    fn computes_new_targets() {
        assert_eq!(plan("README.md", "docs/guide.md", "docs/guide.md", "docs/handbook.md").as_deref(), Some("docs/handbook.md"));
        assert_eq!(plan("a/index.md", "../b/file.txt", "b/file.txt", "c/file.txt").as_deref(), Some("../c/file.txt"));
        assert_eq!(plan("notes.md", "chapter.md#intro", "chapter.md", "ch1.md").as_deref(), Some("ch1.md#intro"));
        assert_eq!(plan("page.md", "/root.md", "root.md", "home.md").as_deref(), Some("/home.md"));
        assert_eq!(plan("docs/index.md", "guide.md", "docs/guide.md", "docs/api/guide.md").as_deref(), Some("api/guide.md"));
        assert_eq!(plan("docs/index.md", "./guide.md", "docs/guide.md", "docs/handbook.md").as_deref(), Some("./handbook.md"));
        assert_eq!(plan("README.md", "guide.md", "guide.md", "docs/guide.md").as_deref(), Some("docs/guide.md"));
    }

    #[test]
    fn ignores_records_for_other_files() {
        assert_eq!(plan("other/x.md", "guide.md", "docs/guide.md", "docs/handbook.md"), None);
        assert_eq!(plan("README.md", "docs/guide.md", "docs/other.md", "docs/x.md"), None);
    }

    #[test]
    fn keeps_backslash_style() {
        let replaced = plan("a/index.md", "..\\b\\file.txt", "b/file.txt", "c/d/file.txt").unwrap();
        assert_eq!(replaced, "..\\c\\d\\file.txt");
        assert!(!replaced.contains('/'));

        let r = reference("cfg.json", "..\\\\b\\\\file.txt", ReferenceKind::JsonValue);
        let edit = plan_edit(&EditRequest {
            host: "a/cfg.json",
            new_target: "c/file.txt",
            old_target: "b/file.txt",
            reference: &Reference {
                source: "a/cfg.json".to_string(),
                ..r
            },
        })
        .unwrap();
        assert_eq!(edit.replacement, "..\\\\c\\\\file.txt");
    }

    #[test]
    fn apply_preserves_crlf_and_handles_same_line_edits() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("top.md"), "[a](doc/a.md) [b](doc/b.md)\r\nend\r\n").unwrap();
        let edits = vec![
            Edit {
                column_end: 12,
                column_start: 4,
                line: 1,
                original: "doc/a.md".to_string(),
                replacement: "docs/a.md".to_string(),
            },
            Edit {
                column_end: 26,
                column_start: 18,
                line: 1,
                original: "doc/b.md".to_string(),
                replacement: "docs/b.md".to_string(),
            },
        ];
        let applied = apply_edits(dir.path(), "top.md", edits, WriteOptions::default()).unwrap();
        assert_eq!(applied, 2);
        let content = std::fs::read_to_string(dir.path().join("top.md")).unwrap();
        assert_eq!(content, "[a](docs/a.md) [b](docs/b.md)\r\nend\r\n");
    }

    #[test]
    fn stale_edits_are_skipped_and_file_left_alone() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.md"), "nothing here\n").unwrap();
        let edit = Edit {
            column_end: 8,
            column_start: 0,
            line: 1,
            original: "old.md".to_string(),
            replacement: "new.md".to_string(),
        };
        assert_eq!(apply_edits(dir.path(), "a.md", vec![edit], WriteOptions::default()).unwrap(), 0);
        let leftovers: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(leftovers.len(), 1);
    }

    #[test]
    fn shifted_text_is_found_on_the_same_line() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.md"), "new words [x](old.md)\n").unwrap();
        let edit = Edit {
            column_end: 10,
            column_start: 4,
            line: 1,
            original: "old.md".to_string(),
            replacement: "new.md".to_string(),
        };
        assert_eq!(apply_edits(dir.path(), "a.md", vec![edit], WriteOptions::default()).unwrap(), 1);
        assert_eq!(std::fs::read_to_string(dir.path().join("a.md")).unwrap(), "new words [x](new.md)\n");
    }

    #[test]
    fn dry_run_and_backups() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.md"), "[x](old.md)").unwrap();
        let edit = Edit {
            column_end: 10,
            column_start: 4,
            line: 1,
            original: "old.md".to_string(),
            replacement: "new.md".to_string(),
        };
        let dry = WriteOptions {
            dry_run: true,
            ..WriteOptions::default()
        };
        assert_eq!(apply_edits(dir.path(), "a.md", vec![edit.clone()], dry).unwrap(), 1);
        assert_eq!(std::fs::read_to_string(dir.path().join("a.md")).unwrap(), "[x](old.md)");

        let backups = WriteOptions {
            create_backups: true,
            ..WriteOptions::default()
        };
        assert_eq!(apply_edits(dir.path(), "a.md", vec![edit], backups).unwrap(), 1);
        assert_eq!(std::fs::read_to_string(dir.path().join("a.md")).unwrap(), "[x](new.md)");
        assert_eq!(std::fs::read_to_string(dir.path().join("a.md.linkbak")).unwrap(), "[x](old.md)");
    }

    #[test]
    fn strict_utf8_refuses_and_lossy_reads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bin.txt");
        std::fs::write(&path, [b'a', 0xff, b'b']).unwrap();
        assert!(matches!(read_text(&path, false), Err(Error::InvalidUtf8 { .. })));
        assert_eq!(read_text(&path, true).unwrap(), "a\u{fffd}b");
        assert!(matches!(read_text(&dir.path().join("missing.md"), false), Err(Error::FileNotFound { .. })));
    }

    #[test]
    fn rewrite_files_reports_failures_and_continues() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("ok.md"), "[x](old.md)").unwrap();
        let edit = Edit {
            column_end: 10,
            column_start: 4,
            line: 1,
            original: "old.md".to_string(),
            replacement: "new.md".to_string(),
        };
        let mut batch = BTreeMap::new();
        batch.insert("gone.md".to_string(), vec![edit.clone()]);
        batch.insert("ok.md".to_string(), vec![edit]);
        let report = rewrite_files(dir.path(), batch, WriteOptions::default());
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].0, "gone.md");
        assert_eq!(report.total(), 1);
    }

    #[test]
    fn outbound_links_follow_the_moved_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("docs")).unwrap();
        std::fs::write(dir.path().join("docs/sibling.md"), "x").unwrap();
        let r = reference("docs/a.md", "sibling.md#top", ReferenceKind::MarkdownInline);
        let edit = plan_outbound_edit(dir.path(), &r, "docs/a.md", "archive/a.md").unwrap();
        assert_eq!(edit.replacement, "../docs/sibling.md#top");

        let missing = reference("docs/a.md", "nowhere.md", ReferenceKind::MarkdownInline);
        assert!(plan_outbound_edit(dir.path(), &missing, "docs/a.md", "archive/a.md").is_none());
        let absolute = reference("docs/a.md", "/docs/sibling.md", ReferenceKind::MarkdownInline);
        assert!(plan_outbound_edit(dir.path(), &absolute, "docs/a.md", "archive/a.md").is_none());
    }
}
