//! Markdown: inline links, quoted paths, and standalone path tokens.

use std::sync::LazyLock;

use regex::Regex;

use super::{ParseInput, compile_pattern, numbered_lines, overlaps, quoted_spans, whitespace_tokens};
use crate::types::{Reference, ReferenceKind};

/// `[text](target "optional title")`. Text may not contain brackets, so an
/// image nested inside a link matches as the image only; see [`LINKED_IMAGE_TAIL`].
static INLINE_LINK: LazyLock<Regex> = LazyLock::new(|| {
    return compile_pattern(r#"\[([^\[\]\n]*)\]\(\s*([^()\s]+)(?:\s+(?:"[^"\n]*"|'[^'\n]*'))?\s*\)"#);
});

/// The outer target of `[![alt](img.png)](target)`.
static LINKED_IMAGE_TAIL: LazyLock<Regex> = LazyLock::new(|| {
    return compile_pattern(r#"\)\]\(\s*([^()\s]+)(?:\s+(?:"[^"\n]*"|'[^'\n]*'))?\s*\)"#);
});

/// Schemes whose targets are never local files.
const EXTERNAL_SCHEMES: &[&str] = &["http://", "https://", "ftp://", "mailto:", "tel:", "//"];

/// Characters stripped from the front of a standalone token.
const LEADING_PUNCTUATION: &[char] = &['(', '[', '<', '*', '_', '`', '"', '\''];

/// Characters stripped from the end of a standalone token.
const TRAILING_PUNCTUATION: &[char] = &[')', ']', '>', ',', '.', ';', ':', '!', '?', '*', '_', '`', '"', '\''];

/// Extract all Markdown references from a file.
pub fn extract(input: &ParseInput<'_>) -> Vec<Reference> {
    let mut references = Vec::new();
    for (number, line) in numbered_lines(input.content) {
        extract_from_line(input, number, line, &mut references);
    }
    return references;
}

/// Handle one line: inline links first, then quoted paths outside them,
/// then standalone tokens on lines with no inline link at all.
fn extract_from_line(input: &ParseInput<'_>, number: u32, line: &str, out: &mut Vec<Reference>) {
    let mut claimed: Vec<(usize, usize)> = Vec::new();

    for cap in INLINE_LINK.captures_iter(line) {
        let (Some(whole), Some(target)) = (cap.get(0), cap.get(2)) else {
            continue;
        };
        claimed.push((whole.start(), whole.end()));
        if is_external_or_anchor(target.as_str()) {
            continue;
        }
        let mut reference = input.record(number, target.start(), target.as_str(), ReferenceKind::MarkdownInline);
        reference.anchor_text = cap.get(1).map(|m| return m.as_str().to_string());
        out.push(reference);
    }
    for cap in LINKED_IMAGE_TAIL.captures_iter(line) {
        let (Some(whole), Some(target)) = (cap.get(0), cap.get(1)) else {
            continue;
        };
        if overlaps(&claimed, target.start(), target.end()) {
            continue;
        }
        claimed.push((whole.start(), whole.end()));
        if is_external_or_anchor(target.as_str()) {
            continue;
        }
        out.push(input.record(number, target.start(), target.as_str(), ReferenceKind::MarkdownInline));
    }
    let has_inline_link = !claimed.is_empty();

    for (start, end) in quoted_spans(line, input.heuristic) {
        if overlaps(&claimed, start, end) {
            continue;
        }
        let Some(target) = line.get(start..end) else {
            continue;
        };
        claimed.push((start.saturating_sub(1), end.saturating_add(1)));
        out.push(input.record(number, start, target, ReferenceKind::MarkdownQuoted));
    }

    if has_inline_link {
        return;
    }
    for (start, token) in whitespace_tokens(line) {
        let Some((offset, trimmed)) = trim_token(token) else {
            continue;
        };
        let begin = start.saturating_add(offset);
        let finish = begin.saturating_add(trimmed.len());
        if overlaps(&claimed, begin, finish) || !input.heuristic.is_path_candidate(trimmed) {
            continue;
        }
        out.push(input.record(number, begin, trimmed, ReferenceKind::MarkdownStandalone));
    }
    return;
}

/// Whether an inline target points off-site or inside the same document.
fn is_external_or_anchor(target: &str) -> bool {
    if target.starts_with('#') {
        return true;
    }
    let lowered = target.to_ascii_lowercase();
    return EXTERNAL_SCHEMES.iter().any(|scheme| return lowered.starts_with(scheme));
}

/// Strip surrounding punctuation from a prose token.
/// Returns the byte offset of the kept part and the part itself.
pub(super) fn trim_token(token: &str) -> Option<(usize, &str)> {
    let front = token.trim_start_matches(LEADING_PUNCTUATION);
    let offset = token.len().saturating_sub(front.len());
    let trimmed = front.trim_end_matches(TRAILING_PUNCTUATION);
    if trimmed.is_empty() {
        return None;
    }
    return Some((offset, trimmed));
}

#[cfg(test)]
mod tests {
    use crate::config::Config;
    use crate::parser::Parser;
    use crate::types::ReferenceKind;

    fn parse(content: &str) -> Vec<crate::types::Reference> {
        return Parser::new(&Config::default()).parse("docs/page.md", content);
    }

    #[test]
    fn inline_link_spans_the_target() {
        let line = "See [guide](docs/guide.md).";
        let refs = parse(line);
        assert_eq!(refs.len(), 1);
        let r = &refs[0];
        assert_eq!(r.kind, ReferenceKind::MarkdownInline);
        assert_eq!(r.target, "docs/guide.md");
        assert_eq!(r.anchor_text.as_deref(), Some("guide"));
        assert_eq!(&line[r.column_start..r.column_end], "docs/guide.md");
        assert_eq!(r.line, 1);
    }

    #[test]
    fn inline_link_keeps_anchor_in_raw_target() {
        let refs = parse("[s](chapter.md#intro)");
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].target, "chapter.md#intro");
        assert_eq!(refs[0].column_start, 4);
    }

    #[test]
    fn skips_external_and_pure_anchor_links() {
        let refs = parse("[a](https://x.org/a.md) [b](#top) [c](mailto:me@x.org) [d](TEL:123)");
        assert!(refs.is_empty());
    }

    #[test]
    fn quoted_paths_and_apostrophes() {
        let refs = parse("Don't forget 'config/app.yaml' or \"notes.txt\".");
        let targets: Vec<&str> = refs.iter().map(|r| return r.target.as_str()).collect();
        assert_eq!(targets, vec!["config/app.yaml", "notes.txt"]);
        assert!(refs.iter().all(|r| return r.kind == ReferenceKind::MarkdownQuoted));
    }

    #[test]
    fn standalone_only_on_lines_without_inline_links() {
        let refs = parse("Read docs/a.md first.\n[x](b.md) then docs/c.md\n");
        let found: Vec<(u32, &str, ReferenceKind)> =
            refs.iter().map(|r| return (r.line, r.target.as_str(), r.kind)).collect();
        assert_eq!(
            found,
            vec![
                (1, "docs/a.md", ReferenceKind::MarkdownStandalone),
                (2, "b.md", ReferenceKind::MarkdownInline),
            ]
        );
    }

    #[test]
    fn standalone_strips_backticks_and_punctuation() {
        let line = "Edit `src/main.py`, then (tests/test_main.py).";
        let refs = parse(line);
        assert_eq!(refs.len(), 2);
        for r in &refs {
            assert_eq!(&line[r.column_start..r.column_end], r.target);
        }
        assert_eq!(refs[0].target, "src/main.py");
        assert_eq!(refs[1].target, "tests/test_main.py");
    }

    #[test]
    fn linked_image_yields_both_targets() {
        let refs = parse("[![badge](img/badge.svg)](docs/ci.md)");
        let targets: Vec<&str> = refs.iter().map(|r| return r.target.as_str()).collect();
        assert_eq!(targets, vec!["img/badge.svg", "docs/ci.md"]);
    }

    #[test]
    fn ignores_method_calls_and_versions_in_prose() {
        let refs = parse("Call self.run() on version 1.2.3 today.");
        assert!(refs.is_empty());
    }
}
