//! Core data models for Histmine
//!
//! These models carry the per-commit facts exchanged between pipeline
//! stages: line-granular file diffs and per-file change records with their
//! parsed syntax trees.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::syntax::SyntaxTree;

/// Dependency key under which the per-file diff map travels between stages.
///
/// Producers map file path to [`DiffRecord`]; the diff refiner replaces the
/// value under this same key, so downstream consumers are oblivious to
/// whether refinement ran.
pub const DEP_FILE_DIFF: &str = "file_diff";

/// Per-file diff map as stored in the per-commit state.
pub type DiffMap = FxHashMap<String, DiffRecord>;

/// Per-file change records as stored in the per-commit state.
pub type ChangeList = Vec<FileChange>;

/// The kind of one diff span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffKind {
    /// Text present in both revisions.
    Equal,
    /// Text present only in the new revision.
    Insert,
    /// Text present only in the old revision.
    Delete,
}

impl std::fmt::Display for DiffKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DiffKind::Equal => write!(f, "equal"),
            DiffKind::Insert => write!(f, "insert"),
            DiffKind::Delete => write!(f, "delete"),
        }
    }
}

/// One contiguous typed text span within a [`DiffRecord`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffOp {
    pub kind: DiffKind,
    pub text: String,
}

impl DiffOp {
    pub fn equal(text: impl Into<String>) -> Self {
        Self {
            kind: DiffKind::Equal,
            text: text.into(),
        }
    }

    pub fn insert(text: impl Into<String>) -> Self {
        Self {
            kind: DiffKind::Insert,
            text: text.into(),
        }
    }

    pub fn delete(text: impl Into<String>) -> Self {
        Self {
            kind: DiffKind::Delete,
            text: text.into(),
        }
    }
}

/// Line-granular diff of one file across a commit.
///
/// The op sequence is ordered: concatenating Equal+Delete spans reconstructs
/// the old revision, Equal+Insert spans the new revision. Line counts are
/// declared by the producer and never recomputed downstream; refinement
/// splits spans but copies the counts verbatim.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffRecord {
    /// Lines in the old revision of the file.
    pub old_lines: usize,
    /// Lines in the new revision of the file.
    pub new_lines: usize,
    /// Ordered diff spans.
    pub ops: Vec<DiffOp>,
}

impl DiffRecord {
    pub fn new(old_lines: usize, new_lines: usize, ops: Vec<DiffOp>) -> Self {
        Self {
            old_lines,
            new_lines,
            ops,
        }
    }

    /// Reconstruct the old revision's full text.
    pub fn old_text(&self) -> String {
        self.ops
            .iter()
            .filter(|op| op.kind != DiffKind::Insert)
            .map(|op| op.text.as_str())
            .collect()
    }

    /// Reconstruct the new revision's full text.
    pub fn new_text(&self) -> String {
        self.ops
            .iter()
            .filter(|op| op.kind != DiffKind::Delete)
            .map(|op| op.text.as_str())
            .collect()
    }

    /// Concatenation of every span regardless of kind.
    ///
    /// This merged text is the refinement invariant: splitting spans must
    /// leave it byte-identical.
    pub fn merged_text(&self) -> String {
        self.ops.iter().map(|op| op.text.as_str()).collect()
    }

    /// Structural precondition for refinement.
    ///
    /// A record is consistent when it has at least one span and the declared
    /// line counts match the reconstructed texts. Inconsistent records are
    /// passed through untouched: splitting them could not be proven to
    /// preserve text and counts.
    pub fn is_consistent(&self) -> bool {
        !self.ops.is_empty()
            && count_lines(&self.old_text()) == self.old_lines
            && count_lines(&self.new_text()) == self.new_lines
    }
}

/// Count the lines of a text: `\n`-terminated lines plus a trailing partial
/// line when the text does not end in a newline. Empty text has zero lines.
pub fn count_lines(text: &str) -> usize {
    let newlines = text.bytes().filter(|&b| b == b'\n').count();
    if text.is_empty() || text.ends_with('\n') {
        newlines
    } else {
        newlines + 1
    }
}

/// One file's transition across a commit.
///
/// Built once per commit by an upstream extraction stage and read-only to
/// everything downstream. Either path may be absent (file added or deleted),
/// and either tree may be absent (binary file, unsupported language,
/// extraction failure).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileChange {
    /// Path in the parent commit, if the file existed there.
    pub old_path: Option<String>,
    /// Path in the commit itself, if the file still exists.
    pub new_path: Option<String>,
    /// Parsed tree of the old revision.
    pub before: Option<SyntaxTree>,
    /// Parsed tree of the new revision.
    pub after: Option<SyntaxTree>,
}

impl FileChange {
    /// The path this change is keyed by in per-file maps: the new path, or
    /// the old one for deletions.
    pub fn path(&self) -> Option<&str> {
        self.new_path.as_deref().or(self.old_path.as_deref())
    }
}
