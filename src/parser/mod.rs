//! Link extraction. A closed set of syntaxes, picked by file extension,
//! each turning `(path, content)` into reference records without side effects.

mod generic;
mod heuristic;
mod json;
mod markdown;
mod yaml;

use regex::Regex;

pub use heuristic::PathHeuristic;

use crate::config::Config;
use crate::types::{Reference, ReferenceKind};

/// Per-file input handed to every strategy.
pub struct ParseInput<'a> {
    /// File content.
    pub content: &'a str,
    /// Path heuristic shared by all strategies.
    pub heuristic: &'a PathHeuristic,
    /// Project-relative path of the file being parsed.
    pub source: &'a str,
}

/// Stateless link parser configured with the path heuristic.
#[derive(Debug, Clone)]
pub struct Parser {
    /// Shared file-path heuristic.
    heuristic: PathHeuristic,
}

/// The syntaxes the parser understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Syntax {
    /// Fallback for any other text file.
    Generic,
    /// `.json`
    Json,
    /// `.md` / `.markdown`
    Markdown,
    /// `.yaml` / `.yml`
    Yaml,
}

impl ParseInput<'_> {
    /// A record for `target`, found at byte `start` of line `line`.
    fn record(&self, line: u32, start: usize, target: &str, kind: ReferenceKind) -> Reference {
        return Reference {
            anchor_text: None,
            column_end: start.saturating_add(target.len()),
            column_start: start,
            kind,
            line,
            source: self.source.to_string(),
            target: target.to_string(),
        };
    }
}

impl Parser {
    /// Build a parser from the runtime configuration.
    pub fn new(config: &Config) -> Self {
        return Self {
            heuristic: PathHeuristic::new(&config.path_extensions),
        };
    }

    /// Extract every reference from `content`, which lives at `source`.
    /// Output order is deterministic: by line, then column.
    pub fn parse(&self, source: &str, content: &str) -> Vec<Reference> {
        let input = ParseInput {
            content,
            heuristic: &self.heuristic,
            source,
        };
        let mut references = Syntax::for_path(source).extract(&input);
        references.sort_by(|a, b| return (a.line, a.column_start).cmp(&(b.line, b.column_start)));
        references.dedup_by(|a, b| return a.line == b.line && a.column_start == b.column_start);
        return references;
    }
}

impl Syntax {
    /// Run this syntax's strategy, falling back to the generic one when a
    /// structured format fails to parse.
    pub fn extract(self, input: &ParseInput<'_>) -> Vec<Reference> {
        let structured = match self {
            Self::Generic => return generic::extract(input),
            Self::Json => json::extract(input),
            Self::Markdown => return markdown::extract(input),
            Self::Yaml => yaml::extract(input),
        };
        return match structured {
            Ok(references) => references,
            Err(reason) => {
                tracing::debug!(event = "parse_fallback", source = input.source, %reason, "structured parse failed, using generic strategy");
                generic::extract(input)
            },
        };
    }

    /// Pick the syntax for a path by its extension (case-insensitive).
    pub fn for_path(path: &str) -> Self {
        let name = crate::paths::basename(path);
        let extension = name.rsplit_once('.').map(|(_, ext)| return ext.to_lowercase());
        return match extension.as_deref() {
            Some("json") => Self::Json,
            Some("markdown" | "md") => Self::Markdown,
            Some("yaml" | "yml") => Self::Yaml,
            _ => Self::Generic,
        };
    }
}

/// Compile a hardcoded pattern.
///
/// # Panics
///
/// Panics if the pattern is invalid. Every caller passes a string literal
/// that the unit tests exercise, so this cannot fire at runtime.
#[allow(clippy::expect_used, reason = "patterns are literals covered by tests")]
pub(crate) fn compile_pattern(pattern: &str) -> Regex {
    return Regex::new(pattern).expect("valid regex");
}

/// Iterate lines as `(one-based number, text)` with line endings stripped.
pub(crate) fn numbered_lines(content: &str) -> impl Iterator<Item = (u32, &str)> {
    return content.lines().zip(1_u32..).map(|(line, number)| return (number, line));
}

/// Whether `[start, end)` intersects any claimed span.
fn overlaps(claimed: &[(usize, usize)], start: usize, end: usize) -> bool {
    return claimed.iter().any(|&(s, e)| return start < e && s < end);
}

/// Byte spans (content only, quotes excluded) of single- or double-quoted
/// substrings that pass the path heuristic. An opening quote directly after a
/// letter or digit is an apostrophe, not a quote.
fn quoted_spans(line: &str, heuristic: &PathHeuristic) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let bytes = line.as_bytes();
    let mut cursor = 0_usize;

    while let Some(offset) = line.get(cursor..).and_then(|rest| return rest.find(['"', '\''])) {
        let open = cursor.saturating_add(offset);
        let quote = bytes.get(open).copied().unwrap_or(b'"');
        let after_word = open
            .checked_sub(1)
            .and_then(|prev| return bytes.get(prev))
            .is_some_and(|b| return b.is_ascii_alphanumeric());
        let content_start = open.saturating_add(1);
        let close = line
            .get(content_start..)
            .and_then(|rest| return rest.find(char::from(quote)))
            .map(|rel| return content_start.saturating_add(rel));

        match close {
            Some(close) if !after_word => {
                let candidate = line.get(content_start..close).unwrap_or("");
                if heuristic.is_path_candidate(candidate) {
                    spans.push((content_start, close));
                    cursor = close.saturating_add(1);
                    continue;
                }
            },
            _ => {},
        }
        cursor = content_start;
    }
    return spans;
}

/// Split on whitespace, keeping each token's byte offset.
fn whitespace_tokens(line: &str) -> Vec<(usize, &str)> {
    let mut tokens = Vec::new();
    let mut start: Option<usize> = None;
    for (index, ch) in line.char_indices() {
        match (ch.is_whitespace(), start) {
            (true, Some(begin)) => {
                if let Some(token) = line.get(begin..index) {
                    tokens.push((begin, token));
                }
                start = None;
            },
            (false, None) => start = Some(index),
            _ => {},
        }
    }
    if let Some(begin) = start
        && let Some(token) = line.get(begin..)
    {
        tokens.push((begin, token));
    }
    return tokens;
}
