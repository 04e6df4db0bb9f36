//! Any other text file. Four patterns tried in declining order of
//! reliability; once a span is claimed, later patterns skip it.

use std::sync::LazyLock;

use regex::Regex;

use super::markdown::trim_token;
use super::{ParseInput, compile_pattern, numbered_lines, overlaps, quoted_spans, whitespace_tokens};
use crate::types::{Reference, ReferenceKind};

/// `import`, `require`, `include` or `from` followed by a quoted path.
static IMPORT: LazyLock<Regex> = LazyLock::new(|| {
    return compile_pattern(r#"\b(?:import|require|include|from)\b[\s(]*["']([^"'\n]+)["']"#);
});

/// Start of a line or trailing comment.
static COMMENT_INTRODUCER: LazyLock<Regex> =
    LazyLock::new(|| return compile_pattern(r"(?:^|\s)(?:#+|//+|--|;+|/\*+|<!--|(?i:rem)\b)"));

/// Maximal runs of path characters.
static PATH_RUN: LazyLock<Regex> = LazyLock::new(|| return compile_pattern(r"[A-Za-z0-9_\-./\\]+"));

/// `object.method(`, the shape of a call chain.
static METHOD_CHAIN: LazyLock<Regex> =
    LazyLock::new(|| return compile_pattern(r"[A-Za-z_][A-Za-z0-9_]*\.[A-Za-z_][A-Za-z0-9_]*\("));

/// A decimal number such as `0.75`.
static DECIMAL: LazyLock<Regex> = LazyLock::new(|| return compile_pattern(r"\b\d+\.\d+\b"));

/// Extract references from a file with no structured strategy.
pub fn extract(input: &ParseInput<'_>) -> Vec<Reference> {
    let mut references = Vec::new();
    for (number, line) in numbered_lines(input.content) {
        extract_from_line(input, number, line, &mut references);
    }
    return references;
}

/// Run the four patterns over one line.
fn extract_from_line(input: &ParseInput<'_>, number: u32, line: &str, out: &mut Vec<Reference>) {
    let mut claimed: Vec<(usize, usize)> = Vec::new();

    for cap in IMPORT.captures_iter(line) {
        let Some(target) = cap.get(1) else {
            continue;
        };
        if !input.heuristic.is_path_candidate(target.as_str()) {
            continue;
        }
        claimed.push((target.start(), target.end()));
        out.push(input.record(number, target.start(), target.as_str(), ReferenceKind::GenericImport));
    }

    for (start, end) in quoted_spans(line, input.heuristic) {
        let Some(target) = line.get(start..end) else {
            continue;
        };
        if overlaps(&claimed, start, end) {
            continue;
        }
        claimed.push((start, end));
        out.push(input.record(number, start, target, ReferenceKind::GenericQuoted));
    }

    if let Some(introducer) = COMMENT_INTRODUCER.find(line) {
        let body_start = introducer.end();
        let body = line.get(body_start..).unwrap_or("");
        for (offset, token) in whitespace_tokens(body) {
            let Some((lead, trimmed)) = trim_token(token) else {
                continue;
            };
            let start = body_start.saturating_add(offset).saturating_add(lead);
            let end = start.saturating_add(trimmed.len());
            if overlaps(&claimed, start, end) || !input.heuristic.is_path_candidate(trimmed) {
                continue;
            }
            claimed.push((start, end));
            out.push(input.record(number, start, trimmed, ReferenceKind::GenericComment));
        }
    }

    if is_suppressed(line) {
        return;
    }
    for run in PATH_RUN.find_iter(line) {
        let candidate = run.as_str().trim_end_matches('.');
        let has_separator = candidate.contains('/') || candidate.contains('\\');
        let end = run.start().saturating_add(candidate.len());
        if !has_separator || overlaps(&claimed, run.start(), end) || !input.heuristic.is_path_candidate(candidate) {
            continue;
        }
        out.push(input.record(number, run.start(), candidate, ReferenceKind::GenericUnquoted));
    }
    return;
}

/// Lines where unquoted matches are mostly noise: call chains, and decimal
/// numbers on a line with no path separator.
fn is_suppressed(line: &str) -> bool {
    if METHOD_CHAIN.is_match(line) {
        return true;
    }
    let has_separator = line.contains('/') || line.contains('\\');
    return !has_separator && DECIMAL.is_match(line);
}

#[cfg(test)]
mod tests {
    use crate::config::Config;
    use crate::parser::Parser;
    use crate::types::{Reference, ReferenceKind};

    fn parse(source: &str, content: &str) -> Vec<Reference> {
        return Parser::new(&Config::default()).parse(source, content);
    }

    #[test]
    fn import_statements_win_over_plain_quotes() {
        let refs = parse("src/app.js", "import cfg from \"./config/app.json\";\n#include \"util.h\"\n");
        let found: Vec<(&str, ReferenceKind)> = refs.iter().map(|r| return (r.target.as_str(), r.kind)).collect();
        assert_eq!(
            found,
            vec![
                ("./config/app.json", ReferenceKind::GenericImport),
                ("util.h", ReferenceKind::GenericImport),
            ]
        );
    }

    #[test]
    fn comment_tokens_are_classified_as_comments() {
        let line = "x = 1  # see docs/setup.md, or notes.txt.";
        let refs = parse("run.py", line);
        let targets: Vec<&str> = refs.iter().map(|r| return r.target.as_str()).collect();
        assert_eq!(targets, vec!["docs/setup.md", "notes.txt"]);
        assert!(refs.iter().all(|r| return r.kind == ReferenceKind::GenericComment));
        for r in &refs {
            assert_eq!(&line[r.column_start..r.column_end], r.target);
        }
    }

    #[test]
    fn unquoted_paths_need_a_separator() {
        let refs = parse("build.sh", "cp build/out.bin dist/app.bin\ncp out.bin app.bin\n");
        let found: Vec<(u32, &str)> = refs.iter().map(|r| return (r.line, r.target.as_str())).collect();
        assert_eq!(found, vec![(1, "build/out.bin"), (1, "dist/app.bin")]);
        assert!(refs.iter().all(|r| return r.kind == ReferenceKind::GenericUnquoted));
    }

    #[test]
    fn quoted_paths_anywhere() {
        let line = "data = load('data/items.csv', \"..\\\\shared\\\\cfg.ini\")";
        let refs = parse("job.py", line);
        assert_eq!(refs.len(), 2);
        assert_eq!(refs[0].target, "data/items.csv");
        assert_eq!(refs[0].kind, ReferenceKind::GenericQuoted);
        assert_eq!(refs[1].target, "..\\\\shared\\\\cfg.ini");
    }

    #[test]
    fn method_chains_suppress_unquoted_matches() {
        assert!(parse("calc.py", "items.map(lambda x: x/total.count)\n").is_empty());
        assert!(parse("calc.py", "ratio = 0.75\n").is_empty());
    }
}
