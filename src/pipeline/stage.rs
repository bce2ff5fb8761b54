//! Pipeline stage contract and per-commit state
//!
//! Every analysis stage implements [`Stage`]: it declares the dependency
//! keys it reads and writes, exposes a configuration surface, and processes
//! one commit at a time through [`Stage::consume`]. Branch points in the
//! commit graph are handled by [`Stage::fork`] / [`Stage::merge`] so each
//! concurrently-processed branch owns its stage state exclusively.

use std::any::{type_name, Any};
use std::collections::HashMap;
use std::sync::Arc;

use git2::Repository;
use rustc_hash::FxHashMap;
use serde_json::Value;
use thiserror::Error;

/// One recognized configuration knob of a stage.
///
/// Used for help text and validation; defaults apply when a snapshot leaves
/// the option unset.
#[derive(Debug, Clone)]
pub struct ConfigOption {
    pub name: &'static str,
    pub description: &'static str,
    pub default: Value,
}

/// A configuration snapshot handed to [`Stage::configure`].
///
/// Absent keys keep their defaults.
pub type ConfigValues = HashMap<String, Value>;

/// Configuration failures, surfaced before any commit is processed.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unrecognized option `{option}` for stage `{stage}`")]
    UnknownOption { stage: String, option: String },
    #[error("invalid value for option `{option}` of stage `{stage}`: {reason}")]
    InvalidValue {
        stage: String,
        option: String,
        reason: String,
    },
}

/// Failures from a stage's per-commit processing.
///
/// Missing or mis-shaped required keys are fatal for the current commit on
/// the current branch; they never corrupt the registry or sibling branches.
#[derive(Debug, Error)]
pub enum StageError {
    #[error("missing dependency `{0}` in per-commit state")]
    MissingDependency(String),
    #[error("dependency `{key}` has unexpected shape (expected {expected})")]
    MalformedDependency { key: String, expected: &'static str },
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Per-commit key→value state exchanged between stages.
///
/// Values are type-erased so independently-authored stages can exchange
/// arbitrary facts; access is through typed getters that turn shape
/// mismatches into [`StageError`]s instead of panics. Values are created
/// fresh each commit and discarded once every stage has run.
#[derive(Clone, Default)]
pub struct CommitState {
    values: FxHashMap<String, Arc<dyn Any + Send + Sync>>,
}

impl std::fmt::Debug for CommitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Values are type-erased; keys are the useful part.
        f.debug_set().entries(self.values.keys()).finish()
    }
}

impl CommitState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a value under a dependency key, replacing any previous value.
    pub fn insert<T: Any + Send + Sync>(&mut self, key: impl Into<String>, value: T) {
        self.values.insert(key.into(), Arc::new(value));
    }

    /// Typed access to a required dependency.
    pub fn get<T: Any + Send + Sync>(&self, key: &str) -> Result<&T, StageError> {
        let value = self
            .values
            .get(key)
            .ok_or_else(|| StageError::MissingDependency(key.to_string()))?;
        value
            .downcast_ref::<T>()
            .ok_or_else(|| StageError::MalformedDependency {
                key: key.to_string(),
                expected: type_name::<T>(),
            })
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Fold a stage's returned delta into this state, replacing values under
    /// keys the delta provides.
    pub fn merge(&mut self, delta: CommitState) {
        self.values.extend(delta.values);
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Keys currently present, in no particular order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }
}

/// Contract implemented by every analysis stage.
///
/// Lifecycle: registered → configured → initialized → consuming one commit
/// at a time, with fork/merge excursions wherever the commit graph branches
/// and reconverges. There is no teardown beyond drop.
pub trait Stage: Send + Sync {
    /// Stable identifier used for registry lookup and diagnostics.
    fn name(&self) -> &'static str;

    /// Dependency keys this stage writes. Non-empty for any stage meant to
    /// feed others.
    fn provides(&self) -> &'static [&'static str];

    /// Dependency keys this stage reads. The pipeline guarantees they are
    /// present in the per-commit state before `consume` runs, and the stage
    /// reports their absence as a typed error.
    fn requires(&self) -> &'static [&'static str];

    /// The recognized configuration knobs of this stage.
    fn config_options(&self) -> Vec<ConfigOption> {
        Vec::new()
    }

    /// Apply a configuration snapshot. Unset options keep their defaults;
    /// an empty snapshot always succeeds.
    fn configure(&mut self, _options: &ConfigValues) -> Result<(), ConfigError> {
        Ok(())
    }

    /// One-time per-run setup, called once before any commit is processed.
    fn initialize(&mut self, _repo: &Repository) -> Result<(), StageError> {
        Ok(())
    }

    /// Capability tags that must be enabled run-wide for this stage to be
    /// wired into a pipeline. Missing features mean the stage is skipped at
    /// assembly, not an error.
    fn features(&self) -> &'static [&'static str] {
        &[]
    }

    /// Process one commit. Returns a fresh state containing exactly the
    /// keys in [`Stage::provides`].
    fn consume(&mut self, state: &CommitState) -> Result<CommitState, StageError>;

    /// Replicate this stage for `n` divergent commit-graph branches.
    ///
    /// Each returned instance must own its branch-local state exclusively;
    /// a stateless stage returns cheap clones, which is behaviorally
    /// indistinguishable from sharing itself.
    fn fork(&self, n: usize) -> Vec<Box<dyn Stage>>;

    /// Reconcile previously forked siblings back into this instance when
    /// branches reconverge. Stateless stages have nothing to reconcile.
    fn merge(&mut self, _siblings: Vec<Box<dyn Stage>>) {}

    /// View this stage as [`Any`], letting `merge` implementations downcast
    /// siblings to their concrete type to read branch-local state.
    fn as_any(&self) -> &dyn Any;
}

/// Check a configuration snapshot against a stage's recognized options.
///
/// Callers run this before [`Stage::configure`] so unrecognized options are
/// rejected up front, before any commit is processed.
pub fn validate_options(stage: &dyn Stage, options: &ConfigValues) -> Result<(), ConfigError> {
    let recognized = stage.config_options();
    for key in options.keys() {
        if !recognized.iter().any(|opt| opt.name == key.as_str()) {
            return Err(ConfigError::UnknownOption {
                stage: stage.name().to_string(),
                option: key.clone(),
            });
        }
    }
    Ok(())
}
