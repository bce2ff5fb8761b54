//! Histmine - commit-history mining core
//!
//! The analysis heart of a commit-history mining engine: a catalog of
//! composable per-commit analysis stages, the contract they implement, and
//! a syntax-aware diff refiner that realigns line-granular diff hunks onto
//! token boundaries.
//!
//! The core deliberately stays out of repository traversal, source parsing
//! and result reporting. An orchestrating binary walks the commit graph,
//! materializes coarse diffs and parsed syntax trees, and feeds them through
//! a [`Pipeline`] one commit at a time.

pub mod models;
pub mod pipeline;
pub mod stages;
pub mod syntax;

pub use models::{ChangeList, DiffKind, DiffMap, DiffOp, DiffRecord, FileChange, DEP_FILE_DIFF};
pub use pipeline::registry::{self, StageSpec};
pub use pipeline::stage::{
    validate_options, CommitState, ConfigError, ConfigOption, ConfigValues, Stage, StageError,
};
pub use pipeline::{Pipeline, PipelineError};
pub use stages::diff_refine::DiffRefiner;
pub use syntax::{SyntaxNode, SyntaxTree, TokenBoundaries, DEP_SYNTAX_CHANGES, FEATURE_SYNTAX};
