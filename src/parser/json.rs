//! JSON: string values under file-referential keys.
//!
//! The document is validated with `serde_json` first, then walked
//! positionally so each value is attributed to the key it actually sits
//! under. Arrays inherit the key of the member that holds them.

use super::ParseInput;
use crate::types::{Reference, ReferenceKind};

/// Keys that always name a file.
const FILE_KEYS: &[&str] = &[
    "configfile",
    "datafile",
    "defaulttemplate",
    "destination",
    "file",
    "filename",
    "import",
    "include",
    "outputfile",
    "path",
    "script",
    "source",
    "src",
    "target",
    "template",
    "templatepath",
];

/// Words that make any key containing them file-referential.
const FILE_KEY_WORDS: &[&str] = &["config", "file", "output", "path", "script", "template"];

/// One level of nesting during the walk.
enum Frame {
    /// Inside `[...]`, carrying the key of the enclosing member.
    Array {
        /// Key the array is the value of.
        key: Option<String>,
    },
    /// Inside `{...}`.
    Object {
        /// Whether the next string is a key rather than a value.
        expecting_key: bool,
        /// Most recent key seen at this level.
        key: Option<String>,
    },
}

/// A string literal located in the source.
struct Literal<'a> {
    /// Decoded value.
    decoded: String,
    /// Text between the quotes, escapes intact.
    raw: &'a str,
    /// Byte offset of the opening quote.
    start: usize,
}

/// Extract references from JSON content.
///
/// # Errors
///
/// Returns the parser's message when the content is not valid JSON.
pub fn extract(input: &ParseInput<'_>) -> Result<Vec<Reference>, String> {
    serde_json::from_str::<serde_json::Value>(input.content).map_err(|e| return e.to_string())?;

    let content = input.content;
    let bytes = content.as_bytes();
    let mut references = Vec::new();
    let mut stack: Vec<Frame> = Vec::new();
    let mut line = 1_u32;
    let mut line_start = 0_usize;
    let mut index = 0_usize;

    while let Some(&byte) = bytes.get(index) {
        match byte {
            b'"' => {
                let literal = read_literal(content, index)?;
                let next = literal.start.saturating_add(literal.raw.len()).saturating_add(2);
                handle_literal(input, &mut stack, &literal, line, line_start, &mut references);
                index = next;
                continue;
            },
            b'[' => {
                let key = value_key(&stack).map(str::to_string);
                stack.push(Frame::Array { key });
            },
            b'{' => stack.push(Frame::Object {
                expecting_key: true,
                key: None,
            }),
            b']' | b'}' => {
                stack.pop();
            },
            b',' => {
                if let Some(Frame::Object { expecting_key, .. }) = stack.last_mut() {
                    *expecting_key = true;
                }
            },
            b':' => {
                if let Some(Frame::Object { expecting_key, .. }) = stack.last_mut() {
                    *expecting_key = false;
                }
            },
            b'\n' => {
                line = line.saturating_add(1);
                line_start = index.saturating_add(1);
            },
            _ => {},
        }
        index = index.saturating_add(1);
    }
    return Ok(references);
}

/// Record a key, or emit a reference for a value under a file-referential key.
fn handle_literal(
    input: &ParseInput<'_>,
    stack: &mut [Frame],
    literal: &Literal<'_>,
    line: u32,
    line_start: usize,
    out: &mut Vec<Reference>,
) {
    if let Some(Frame::Object { expecting_key: true, key }) = stack.last_mut() {
        *key = Some(literal.decoded.clone());
        return;
    }
    let Some(key) = value_key(stack) else {
        return;
    };
    if !is_file_key(key) || !input.heuristic.is_path_candidate(&literal.decoded) {
        return;
    }
    // Only escapes we can rewrite in place: none, or doubled backslashes.
    let faithful = literal.raw == literal.decoded || literal.raw == literal.decoded.replace('\\', "\\\\");
    if !faithful {
        return;
    }
    let column = literal.start.saturating_add(1).saturating_sub(line_start);
    out.push(input.record(line, column, literal.raw, ReferenceKind::JsonValue));
    return;
}

/// Whether a key names a file, by exact match or by containing a file word.
fn is_file_key(key: &str) -> bool {
    let lowered = key.to_lowercase();
    return FILE_KEYS.contains(&lowered.as_str()) || FILE_KEY_WORDS.iter().any(|word| return lowered.contains(word));
}

/// Read the string literal whose opening quote is at `start`.
///
/// # Errors
///
/// Returns a message if the literal is unterminated or undecodable; the
/// content already validated, so this only guards against inconsistency.
fn read_literal(content: &str, start: usize) -> Result<Literal<'_>, String> {
    let bytes = content.as_bytes();
    let mut cursor = start.saturating_add(1);
    loop {
        match bytes.get(cursor) {
            None => return Err(format!("unterminated string at byte {start}")),
            Some(b'\\') => cursor = cursor.saturating_add(2),
            Some(b'"') => break,
            Some(_) => cursor = cursor.saturating_add(1),
        }
    }
    let quoted = content.get(start..=cursor).ok_or_else(|| return format!("bad string bounds at byte {start}"))?;
    let raw = content.get(start.saturating_add(1)..cursor).unwrap_or("");
    let decoded: String = serde_json::from_str(quoted).map_err(|e| return e.to_string())?;
    return Ok(Literal { decoded, raw, start });
}

/// Key that a value at the current position belongs to.
fn value_key(stack: &[Frame]) -> Option<&str> {
    return match stack.last() {
        Some(Frame::Array { key } | Frame::Object { key, .. }) => key.as_deref(),
        None => None,
    };
}

#[cfg(test)]
mod tests {
    use crate::config::Config;
    use crate::parser::Parser;
    use crate::types::{Reference, ReferenceKind};

    fn parse(content: &str) -> Vec<Reference> {
        return Parser::new(&Config::default()).parse("config.json", content);
    }

    #[test]
    fn only_file_keys_are_reported() {
        let content = r#"{"template":"tpl.html","unrelated":"tpl.html"}"#;
        let refs = parse(content);
        assert_eq!(refs.len(), 1);
        let r = &refs[0];
        assert_eq!(r.kind, ReferenceKind::JsonValue);
        assert_eq!(r.target, "tpl.html");
        assert_eq!(r.column_start, 13);
        assert_eq!(&content[r.column_start..r.column_end], "tpl.html");
    }

    #[test]
    fn key_words_and_arrays_count() {
        let content = "{\n  \"buildScripts\": [\"scripts/a.sh\", \"scripts/b.sh\"],\n  \"name\": \"x/y.md\",\n  \"nested\": {\"outputDir\": \"out/index.html\"}\n}\n";
        let refs = parse(content);
        let found: Vec<(u32, &str)> = refs.iter().map(|r| return (r.line, r.target.as_str())).collect();
        assert_eq!(found, vec![(2, "scripts/a.sh"), (2, "scripts/b.sh"), (4, "out/index.html")]);
    }

    #[test]
    fn values_in_object_arrays_use_their_own_keys() {
        let content = r#"{"steps": [{"file": "a/run.py", "label": "b/c.txt"}]}"#;
        let refs = parse(content);
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].target, "a/run.py");
    }

    #[test]
    fn escaped_backslashes_keep_their_raw_form() {
        let content = r#"{"path": "..\\shared\\cfg.ini"}"#;
        let refs = parse(content);
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].target, r"..\\shared\\cfg.ini");
        assert_eq!(&content[refs[0].column_start..refs[0].column_end], refs[0].target);
    }
}
