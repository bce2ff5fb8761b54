//! Commit analysis pipeline
//!
//! Assembles stages into a dependency-ordered schedule and runs them over
//! one commit at a time:
//! 1. Deploy stages (directly or by summoning them from the registry)
//! 2. Resolve the provides/requires graph into an execution order
//! 3. Initialize every stage against the repository under analysis
//! 4. Feed each commit's seeded state through the schedule
//!
//! Commit-graph traversal itself lives in the orchestrating binary; when it
//! encounters a branch point it forks the pipeline once per branch and
//! merges the survivors back together at the join.

pub mod registry;
pub mod stage;

use git2::Repository;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use thiserror::Error;
use tracing::{debug, trace, warn};

use stage::{CommitState, Stage, StageError};

/// Pipeline assembly and execution failures.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("no registered stage matches `{0}`")]
    UnknownStage(String),
    #[error("dependency cycle involving stage `{0}`")]
    DependencyCycle(String),
    #[error("stage `{stage}` forked {got} instances, expected {want}")]
    ForkMismatch {
        stage: String,
        got: usize,
        want: usize,
    },
    #[error("stage `{stage}` failed: {source}")]
    Stage {
        stage: String,
        #[source]
        source: StageError,
    },
}

/// An ordered collection of stages processing one branch of the commit
/// graph.
///
/// Per-commit execution is strictly sequential; concurrency across branches
/// is the orchestrator's business and is what [`Pipeline::fork`] and
/// [`Pipeline::merge`] exist for.
#[derive(Default)]
pub struct Pipeline {
    stages: Vec<Box<dyn Stage>>,
    /// Indices into `stages` in dependency order; empty until resolved.
    schedule: Vec<usize>,
    /// Run-wide enabled capability tags.
    features: Vec<String>,
    resolved: bool,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable a run-wide capability tag.
    pub fn enable_feature(&mut self, tag: impl Into<String>) {
        let tag = tag.into();
        if !self.features.contains(&tag) {
            self.features.push(tag);
        }
    }

    pub fn has_feature(&self, tag: &str) -> bool {
        self.features.iter().any(|f| f == tag)
    }

    /// Add a concrete stage instance. Invalidates any previous resolution.
    pub fn add_stage(&mut self, stage: Box<dyn Stage>) {
        debug!(stage = stage.name(), "deployed pipeline stage");
        self.stages.push(stage);
        self.resolved = false;
    }

    /// Summon a stage type from the process-wide registry by name or
    /// provided key and deploy a fresh instance of the first match.
    pub fn deploy(&mut self, identifier: &str) -> Result<(), PipelineError> {
        let specs = registry::summon(identifier);
        let spec = specs
            .first()
            .ok_or_else(|| PipelineError::UnknownStage(identifier.to_string()))?;
        self.add_stage(spec.build());
        Ok(())
    }

    /// Names of the deployed stages, in schedule order once resolved.
    pub fn stage_names(&self) -> Vec<&'static str> {
        if self.resolved {
            self.schedule.iter().map(|&i| self.stages[i].name()).collect()
        } else {
            self.stages.iter().map(|s| s.name()).collect()
        }
    }

    /// Resolve the provides/requires graph into an execution order.
    ///
    /// Stages whose required features are not all enabled are dropped from
    /// the pipeline (logged, not an error). Keys no remaining stage provides
    /// are assumed to be seeded into the per-commit state by the caller;
    /// their absence surfaces as a typed error at consume time.
    pub fn resolve(&mut self) -> Result<(), PipelineError> {
        self.stages.retain(|stage| {
            let missing: Vec<&str> = stage
                .features()
                .iter()
                .filter(|tag| !self.features.iter().any(|f| f == *tag))
                .copied()
                .collect();
            if missing.is_empty() {
                true
            } else {
                debug!(
                    stage = stage.name(),
                    ?missing,
                    "skipping stage, required features not enabled"
                );
                false
            }
        });

        let mut graph: DiGraph<usize, &'static str> = DiGraph::new();
        let nodes: Vec<NodeIndex> = (0..self.stages.len()).map(|i| graph.add_node(i)).collect();
        for (consumer, stage) in self.stages.iter().enumerate() {
            for key in stage.requires() {
                for (provider, other) in self.stages.iter().enumerate() {
                    if provider != consumer && other.provides().contains(key) {
                        graph.add_edge(nodes[provider], nodes[consumer], *key);
                    }
                }
            }
        }

        let order = toposort(&graph, None).map_err(|cycle| {
            let stage = self.stages[graph[cycle.node_id()]].name();
            PipelineError::DependencyCycle(stage.to_string())
        })?;
        self.schedule = order.into_iter().map(|n| graph[n]).collect();
        self.resolved = true;
        trace!(schedule = ?self.stage_names(), "resolved pipeline schedule");
        Ok(())
    }

    /// One-time per-run setup: resolve if needed, then initialize every
    /// scheduled stage against the repository under analysis.
    pub fn initialize(&mut self, repo: &Repository) -> Result<(), PipelineError> {
        if !self.resolved {
            self.resolve()?;
        }
        for i in 0..self.schedule.len() {
            let idx = self.schedule[i];
            let stage = &mut self.stages[idx];
            let name = stage.name();
            stage
                .initialize(repo)
                .map_err(|source| PipelineError::Stage {
                    stage: name.to_string(),
                    source,
                })?;
        }
        Ok(())
    }

    /// Run every scheduled stage over one commit's state, in order.
    ///
    /// Each stage's returned delta is folded into the state before the next
    /// stage runs, so later stages observe replaced values under the same
    /// dependency key. A failing stage aborts this commit on this branch;
    /// the registry and sibling branches are unaffected.
    pub fn run_commit(&mut self, state: &mut CommitState) -> Result<(), PipelineError> {
        for i in 0..self.schedule.len() {
            let idx = self.schedule[i];
            let stage = &mut self.stages[idx];
            let name = stage.name();
            let delta = stage.consume(state).map_err(|source| PipelineError::Stage {
                stage: name.to_string(),
                source,
            })?;
            for key in self.stages[idx].provides() {
                if !delta.contains(key) {
                    warn!(stage = name, key = *key, "stage did not produce a declared key");
                }
            }
            state.merge(delta);
        }
        Ok(())
    }

    /// Replicate the pipeline for `n` divergent commit-graph branches.
    ///
    /// Every stage is forked `n` ways; branch `i` receives the `i`-th
    /// replica of each stage, so branch-local state is never shared between
    /// concurrently-processed branches.
    pub fn fork(&self, n: usize) -> Result<Vec<Pipeline>, PipelineError> {
        let mut branches: Vec<Pipeline> = (0..n)
            .map(|_| Pipeline {
                stages: Vec::with_capacity(self.stages.len()),
                schedule: self.schedule.clone(),
                features: self.features.clone(),
                resolved: self.resolved,
            })
            .collect();
        for stage in &self.stages {
            let replicas = stage.fork(n);
            if replicas.len() != n {
                return Err(PipelineError::ForkMismatch {
                    stage: stage.name().to_string(),
                    got: replicas.len(),
                    want: n,
                });
            }
            for (branch, replica) in branches.iter_mut().zip(replicas) {
                branch.stages.push(replica);
            }
        }
        Ok(branches)
    }

    /// Reconcile forked sibling pipelines back into this one at a
    /// commit-graph join point.
    ///
    /// Siblings must come from a [`Pipeline::fork`] of this pipeline; each
    /// stage receives its own replicas to merge.
    pub fn merge(&mut self, branches: Vec<Pipeline>) {
        let mut sibling_stages: Vec<Vec<Box<dyn Stage>>> =
            (0..self.stages.len()).map(|_| Vec::new()).collect();
        for branch in branches {
            for (i, stage) in branch.stages.into_iter().enumerate() {
                if i < sibling_stages.len() {
                    sibling_stages[i].push(stage);
                }
            }
        }
        for (stage, siblings) in self.stages.iter_mut().zip(sibling_stages) {
            stage.merge(siblings);
        }
    }
}
