/// Core domain types: reference records, semantic operations, digests.
use std::fmt;

use serde::Serialize;

/// A content digest: 64 hex chars, always lowercase.
/// Newtype prevents mixing with arbitrary strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentDigest(
    /// The hex-encoded SHA-256 digest string.
    pub String,
);

/// A semantic filesystem operation reconstructed from raw watcher events.
/// All paths are normalised and project-relative.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    /// A new file or directory appeared.
    Created {
        /// Path of the new entry.
        path: String,
    },
    /// A file or directory disappeared without a matching creation.
    Deleted {
        /// Path of the removed entry.
        path: String,
    },
    /// A directory moved; everything beneath it moved with it.
    DirectoryMoved {
        /// Previous directory path.
        from: String,
        /// New directory path.
        to: String,
    },
    /// File content changed in place.
    Modified {
        /// Path of the changed file.
        path: String,
    },
    /// A single file moved or was renamed.
    Moved {
        /// Previous file path.
        from: String,
        /// New file path.
        to: String,
    },
}

impl Operation {
    /// Stable lowercase name used as the `kind` field of the operation span.
    pub const fn kind(&self) -> &'static str {
        return match self {
            Self::Created { .. } => "created",
            Self::Deleted { .. } => "deleted",
            Self::DirectoryMoved { .. } => "directory_moved",
            Self::Modified { .. } => "modified",
            Self::Moved { .. } => "moved",
        };
    }

    /// The path the operation is primarily about (the destination for moves).
    pub fn path(&self) -> &str {
        return match self {
            Self::Created { path } | Self::Deleted { path } | Self::Modified { path } => path,
            Self::DirectoryMoved { to, .. } | Self::Moved { to, .. } => to,
        };
    }
}

impl fmt::Display for Operation {
    /// Render as `kind path` or `kind from -> to`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        return match self {
            Self::Created { path } | Self::Deleted { path } | Self::Modified { path } => {
                write!(f, "{} {path}", self.kind())
            },
            Self::DirectoryMoved { from, to } | Self::Moved { from, to } => {
                write!(f, "{} {from} -> {to}", self.kind())
            },
        };
    }
}

/// One occurrence of a link inside a source file.
///
/// Columns are byte offsets within the line (start inclusive, end exclusive)
/// and always span exactly `target` as written, anchor included.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reference {
    /// Visible link text, for syntaxes that have one.
    pub anchor_text: Option<String>,
    /// Byte offset one past the last byte of the target within the line.
    pub column_end: usize,
    /// Byte offset of the first byte of the target within the line.
    pub column_start: usize,
    /// Which syntax produced this record.
    pub kind: ReferenceKind,
    /// One-based line number.
    pub line: u32,
    /// Project-relative path of the containing file.
    pub source: String,
    /// The link target exactly as it appears in the source.
    pub target: String,
}

impl Reference {
    /// The raw target with any `#fragment` removed.
    pub fn target_path(&self) -> &str {
        return crate::paths::split_anchor(&self.target).0;
    }
}

/// Classification of a reference by the syntax it was found in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReferenceKind {
    /// Path-like token following a comment introducer.
    GenericComment,
    /// Quoted path after `import`, `require`, `include` or `from`.
    GenericImport,
    /// Any quoted path in a generic file.
    GenericQuoted,
    /// Unquoted path containing a separator.
    GenericUnquoted,
    /// String value under a file-referential JSON key.
    JsonValue,
    /// `[text](target)` link.
    MarkdownInline,
    /// Quoted path in Markdown prose.
    MarkdownQuoted,
    /// Whitespace-bounded path token in Markdown prose.
    MarkdownStandalone,
    /// String scalar in a YAML document.
    YamlScalar,
}

impl ReferenceKind {
    /// Kebab-case label matching the serialized form.
    pub const fn label(self) -> &'static str {
        return match self {
            Self::GenericComment => "generic-comment",
            Self::GenericImport => "generic-import",
            Self::GenericQuoted => "generic-quoted",
            Self::GenericUnquoted => "generic-unquoted",
            Self::JsonValue => "json-value",
            Self::MarkdownInline => "markdown-inline",
            Self::MarkdownQuoted => "markdown-quoted",
            Self::MarkdownStandalone => "markdown-standalone",
            Self::YamlScalar => "yaml-scalar",
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operation_display_names_both_paths() {
        let op = Operation::Moved {
            from: "a.md".to_string(),
            to: "b/a.md".to_string(),
        };
        assert_eq!(op.to_string(), "moved a.md -> b/a.md");
        assert_eq!(op.path(), "b/a.md");
    }

    #[test]
    fn target_path_drops_fragment() {
        let reference = Reference {
            anchor_text: Some("s".to_string()),
            column_end: 21,
            column_start: 4,
            kind: ReferenceKind::MarkdownInline,
            line: 1,
            source: "notes.md".to_string(),
            target: "chapter.md#intro".to_string(),
        };
        assert_eq!(reference.target_path(), "chapter.md");
    }

    #[test]
    fn kind_label_matches_serde() {
        let json = serde_json::to_string(&ReferenceKind::MarkdownStandalone).unwrap();
        assert_eq!(json, "\"markdown-standalone\"");
        assert_eq!(ReferenceKind::MarkdownStandalone.label(), "markdown-standalone");
    }
}
