//! Neutral syntax-tree representation
//!
//! The core never parses source text. Trees are produced elsewhere (in this
//! ecosystem that means tree-sitter) and handed to stages as part of the
//! per-commit state. This module defines the neutral shape those trees
//! travel in, plus the adapter from an already-parsed `tree_sitter::Tree`.

mod walk;

pub use walk::TokenBoundaries;

use serde::{Deserialize, Serialize};

/// Dependency key under which the per-commit [`crate::models::ChangeList`]
/// travels between stages.
pub const DEP_SYNTAX_CHANGES: &str = "syntax_changes";

/// Run-wide capability tag: syntax-tree extraction is active for this run.
///
/// Stages that are meaningless without parsed trees declare this feature and
/// are left out of the schedule when it is not enabled.
pub const FEATURE_SYNTAX: &str = "syntax";

/// One node of a parsed syntax tree.
///
/// Spans are byte offsets into the revision's source text. Children are in
/// declared (source) order; a node without children is a leaf token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyntaxNode {
    /// Grammar-level type tag, e.g. `identifier` or `function_definition`.
    pub kind: String,
    /// Byte offset of the first byte of this node's text.
    pub start_byte: usize,
    /// Byte offset one past the last byte of this node's text.
    pub end_byte: usize,
    /// Child nodes in source order.
    pub children: Vec<SyntaxNode>,
}

impl SyntaxNode {
    /// Build a leaf token node.
    pub fn leaf(kind: impl Into<String>, start_byte: usize, end_byte: usize) -> Self {
        Self {
            kind: kind.into(),
            start_byte,
            end_byte,
            children: Vec::new(),
        }
    }

    /// Build an interior node spanning its children.
    ///
    /// The span is derived from the first and last child; an empty child
    /// list yields an empty span at offset zero.
    pub fn branch(kind: impl Into<String>, children: Vec<SyntaxNode>) -> Self {
        let start_byte = children.first().map(|c| c.start_byte).unwrap_or(0);
        let end_byte = children.last().map(|c| c.end_byte).unwrap_or(0);
        Self {
            kind: kind.into(),
            start_byte,
            end_byte,
            children,
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

/// An immutable parsed syntax tree for one file revision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyntaxTree {
    pub root: SyntaxNode,
}

impl SyntaxTree {
    pub fn new(root: SyntaxNode) -> Self {
        Self { root }
    }

    /// Re-shape an already-parsed tree-sitter tree.
    ///
    /// Parsing stays outside the core; this only copies node kinds and byte
    /// spans out of a parse result something else produced.
    pub fn from_tree_sitter(tree: &tree_sitter::Tree) -> Self {
        Self {
            root: convert_node(tree.root_node()),
        }
    }

    /// Leaf-token end offsets in source order. See [`TokenBoundaries`].
    pub fn token_boundaries(&self) -> TokenBoundaries<'_> {
        TokenBoundaries::new(&self.root)
    }
}

fn convert_node(node: tree_sitter::Node<'_>) -> SyntaxNode {
    let mut children = Vec::with_capacity(node.child_count());
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        children.push(convert_node(child));
    }
    SyntaxNode {
        kind: node.kind().to_string(),
        start_byte: node.start_byte(),
        end_byte: node.end_byte(),
        children,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_branch_spans_children() {
        let node = SyntaxNode::branch(
            "call",
            vec![SyntaxNode::leaf("identifier", 4, 9), SyntaxNode::leaf("(", 9, 10)],
        );
        assert_eq!(node.start_byte, 4);
        assert_eq!(node.end_byte, 10);
        assert!(!node.is_leaf());
    }

    #[test]
    fn test_from_tree_sitter_mirrors_shape() {
        let source = "x = 1\n";
        let mut parser = tree_sitter::Parser::new();
        let language = tree_sitter_python::LANGUAGE;
        parser
            .set_language(&language.into())
            .expect("Failed to set Python language");
        let ts_tree = parser.parse(source, None).expect("parse failed");

        let tree = SyntaxTree::from_tree_sitter(&ts_tree);
        assert_eq!(tree.root.kind, "module");
        assert_eq!(tree.root.start_byte, 0);
        assert_eq!(tree.root.end_byte, source.len());
        // module -> expression_statement/assignment -> ... -> leaves
        assert!(!tree.root.is_leaf());
        let mut leaves = tree.token_boundaries();
        assert!(leaves.next().is_some());
    }

    #[test]
    fn test_tree_serde_round_trip() {
        let tree = SyntaxTree::new(SyntaxNode::branch(
            "module",
            vec![SyntaxNode::leaf("identifier", 0, 1)],
        ));
        let json = serde_json::to_string(&tree).expect("serialize");
        let back: SyntaxTree = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, tree);
    }
}
