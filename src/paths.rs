//! Path canonicalisation on project-relative, forward-slash strings.
//!
//! Everything past the ingress boundary (watcher, scanner, CLI) speaks in the
//! normalised form produced here: relative to the project root, `/` separated,
//! no leading slash, `.` and `..` resolved where possible.

use std::path::Path;

/// Last path segment, or the whole string when there is no separator.
pub fn basename(path: &str) -> &str {
    return path.rsplit_once('/').map_or(path, |(_, name)| return name);
}

/// Everything before the last separator, or `""` for root-level entries.
pub fn dirname(path: &str) -> &str {
    return path.rsplit_once('/').map_or("", |(dir, _)| return dir);
}

/// Whether `path` equals `dir` or lies beneath it. `""` contains everything.
pub fn is_under(dir: &str, path: &str) -> bool {
    if dir.is_empty() {
        return true;
    }
    return path == dir
        || path.strip_prefix(dir).is_some_and(|rest| return rest.starts_with('/'));
}

/// Whether a raw reference target is written absolute-from-root.
pub fn is_root_absolute(raw: &str) -> bool {
    return raw.starts_with('/') || raw.starts_with('\\');
}

/// Normalise a path string: forward slashes, no leading `/`, `.` dropped,
/// `..` collapsed against preceding segments. Leading `..` segments that have
/// nothing to pop are kept so callers can detect escapes from the root.
pub fn normalize(path: &str) -> String {
    let unified = path.replace('\\', "/");
    let mut segments: Vec<&str> = Vec::new();
    for segment in unified.split('/') {
        match segment {
            "" | "." => {},
            ".." => {
                let can_pop = segments.last().is_some_and(|last| return *last != "..");
                if can_pop {
                    segments.pop();
                } else {
                    segments.push(segment);
                }
            },
            other => segments.push(other),
        }
    }
    return segments.join("/");
}

/// Shortest relative path from directory `from_dir` to `to_file`, both
/// project-relative. Returns `"."` when they are the same location.
pub fn relative_path(from_dir: &str, to_file: &str) -> String {
    let from = normalize(from_dir);
    let to = normalize(to_file);
    let from_segments: Vec<&str> = from.split('/').filter(|s| return !s.is_empty()).collect();
    let to_segments: Vec<&str> = to.split('/').filter(|s| return !s.is_empty()).collect();

    let common = from_segments
        .iter()
        .zip(to_segments.iter())
        .take_while(|(a, b)| return a == b)
        .count();

    let ups = from_segments.len().saturating_sub(common);
    let mut parts: Vec<&str> = std::iter::repeat_n("..", ups).collect();
    parts.extend(to_segments.iter().skip(common));

    if parts.is_empty() {
        return ".".to_string();
    }
    return parts.join("/");
}

/// Resolve a raw reference target (anchor already removed) as seen from the
/// directory `source_dir`. Absolute-from-root targets ignore `source_dir`.
pub fn resolve_from(source_dir: &str, raw: &str) -> String {
    if is_root_absolute(raw) || source_dir.is_empty() {
        return normalize(raw);
    }
    return normalize(&format!("{source_dir}/{raw}"));
}

/// Whether a normalised path climbs out of the project root.
pub fn escapes_root(normalized: &str) -> bool {
    return normalized == ".." || normalized.starts_with("../");
}

/// Split a raw target into the path part and the `#fragment`, if any.
/// The returned fragment excludes the `#`.
pub fn split_anchor(raw: &str) -> (&str, Option<&str>) {
    return match raw.split_once('#') {
        None => (raw, None),
        Some((path, fragment)) => (path, Some(fragment)),
    };
}

/// Strip `root` from an absolute path and normalise the remainder.
/// Returns `None` for paths outside the root or that are not valid UTF-8.
pub fn to_project_relative(root: &Path, absolute: &Path) -> Option<String> {
    let relative = absolute.strip_prefix(root).ok()?;
    let text = relative.to_str()?;
    let normalized = normalize(text);
    if escapes_root(&normalized) {
        return None;
    }
    return Some(normalized);
}

/// Replace the path part of `path` that equals `from` or lies under it with
/// the same location under `to`. Returns `None` if `path` is not under `from`.
pub fn swap_prefix(path: &str, from: &str, to: &str) -> Option<String> {
    if path == from {
        return Some(to.to_string());
    }
    let rest = path.strip_prefix(from)?.strip_prefix('/')?;
    if to.is_empty() {
        return Some(rest.to_string());
    }
    return Some(format!("{to}/{rest}"));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_collapses_dots_and_separators() {
        assert_eq!(normalize("/docs/./guide.md"), "docs/guide.md");
        assert_eq!(normalize("docs\\sub\\..\\guide.md"), "docs/guide.md");
        assert_eq!(normalize("a//b/"), "a/b");
        assert_eq!(normalize("../b/file.txt"), "../b/file.txt");
        assert_eq!(normalize("./"), "");
    }

    #[test]
    fn relative_path_walks_up_and_down() {
        assert_eq!(relative_path("a", "c/file.txt"), "../c/file.txt");
        assert_eq!(relative_path("", "docs/handbook.md"), "docs/handbook.md");
        assert_eq!(relative_path("docs/api", "docs/guide.md"), "../guide.md");
        assert_eq!(relative_path("docs", "docs"), ".");
        assert_eq!(relative_path("a/b", "a/b/c.md"), "c.md");
    }

    #[test]
    fn resolve_from_handles_absolute_and_relative() {
        assert_eq!(resolve_from("a", "../b/file.txt"), "b/file.txt");
        assert_eq!(resolve_from("docs", "/root.md"), "root.md");
        assert_eq!(resolve_from("", "guide.md"), "guide.md");
        assert_eq!(resolve_from("docs", "img\\logo.png"), "docs/img/logo.png");
    }

    #[test]
    fn basename_and_dirname() {
        assert_eq!(basename("docs/guide.md"), "guide.md");
        assert_eq!(basename("guide.md"), "guide.md");
        assert_eq!(dirname("docs/api/guide.md"), "docs/api");
        assert_eq!(dirname("guide.md"), "");
    }

    #[test]
    fn is_under_requires_segment_boundary() {
        assert!(is_under("doc", "doc/a.md"));
        assert!(is_under("doc", "doc"));
        assert!(!is_under("doc", "docs/a.md"));
        assert!(is_under("", "anything.md"));
    }

    #[test]
    fn split_anchor_keeps_fragment() {
        assert_eq!(split_anchor("chapter.md#intro"), ("chapter.md", Some("intro")));
        assert_eq!(split_anchor("chapter.md"), ("chapter.md", None));
    }

    #[test]
    fn swap_prefix_moves_subtree() {
        assert_eq!(swap_prefix("doc/a.md", "doc", "docs"), Some("docs/a.md".to_string()));
        assert_eq!(swap_prefix("docs/a.md", "doc", "x"), None);
        assert_eq!(swap_prefix("doc", "doc", "docs"), Some("docs".to_string()));
    }

    #[test]
    fn to_project_relative_strips_root() {
        let root = Path::new("/work/project");
        assert_eq!(
            to_project_relative(root, Path::new("/work/project/docs/a.md")),
            Some("docs/a.md".to_string())
        );
        assert_eq!(to_project_relative(root, Path::new("/elsewhere/a.md")), None);
    }
}
