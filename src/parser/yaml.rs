//! YAML: every string scalar that looks like a path.

use std::collections::HashMap;

use serde::Deserialize as _;
use serde_yaml::Value;

use super::ParseInput;
use crate::types::{Reference, ReferenceKind};

/// Extract references from YAML content, one record per scalar occurrence.
///
/// # Errors
///
/// Returns the parser's message when any document fails to parse.
pub fn extract(input: &ParseInput<'_>) -> Result<Vec<Reference>, String> {
    let mut scalars = Vec::new();
    for document in serde_yaml::Deserializer::from_str(input.content) {
        let value = Value::deserialize(document).map_err(|e| return e.to_string())?;
        collect_strings(&value, &mut scalars);
    }

    let line_starts = line_starts(input.content);
    let mut cursors: HashMap<&str, usize> = HashMap::new();
    let mut references = Vec::new();

    for scalar in scalars.iter().map(String::as_str) {
        if !input.heuristic.is_path_candidate(scalar) {
            continue;
        }
        let from = cursors.get(scalar).copied().unwrap_or(0);
        let Some(offset) = find_token(input.content, scalar, from) else {
            continue;
        };
        cursors.insert(scalar, offset.saturating_add(scalar.len()));

        let index = line_starts.partition_point(|&start| return start <= offset).saturating_sub(1);
        let line_start = line_starts.get(index).copied().unwrap_or(0);
        let line = u32::try_from(index.saturating_add(1)).unwrap_or(u32::MAX);
        references.push(input.record(line, offset.saturating_sub(line_start), scalar, ReferenceKind::YamlScalar));
    }
    return Ok(references);
}

/// Depth-first walk collecting string values (not mapping keys).
fn collect_strings(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::Mapping(map) => {
            for (_, child) in map {
                collect_strings(child, out);
            }
        },
        Value::Sequence(items) => {
            for child in items {
                collect_strings(child, out);
            }
        },
        Value::String(text) => out.push(text.clone()),
        Value::Tagged(tagged) => collect_strings(&tagged.value, out),
        Value::Bool(_) | Value::Null | Value::Number(_) => {},
    }
    return;
}

/// First occurrence of `needle` at or after `from` that is not part of a
/// longer path-like token.
fn find_token(haystack: &str, needle: &str, from: usize) -> Option<usize> {
    let mut cursor = from;
    while let Some(relative) = haystack.get(cursor..).and_then(|rest| return rest.find(needle)) {
        let start = cursor.saturating_add(relative);
        let end = start.saturating_add(needle.len());
        let before = haystack.get(..start).and_then(|head| return head.chars().next_back());
        let after = haystack.get(end..).and_then(|tail| return tail.chars().next());
        if !before.is_some_and(is_path_char) && !after.is_some_and(is_path_char) {
            return Some(start);
        }
        cursor = start.saturating_add(1);
    }
    return None;
}

/// Characters that can continue a path token.
fn is_path_char(ch: char) -> bool {
    return ch.is_ascii_alphanumeric() || matches!(ch, '_' | '-' | '.' | '/' | '\\');
}

/// Byte offset at which each line begins.
fn line_starts(content: &str) -> Vec<usize> {
    let mut starts = vec![0];
    starts.extend(content.match_indices('\n').map(|(index, _)| return index.saturating_add(1)));
    return starts;
}
