//! Process-wide stage registry
//!
//! An append-only catalog mapping stage types to the dependency keys they
//! produce, so pipelines can be assembled declaratively ("give me the stage
//! that provides key K") instead of hard-wiring concrete types. Populated by
//! explicit registration calls at program start, read-only afterwards.

use std::sync::{OnceLock, RwLock};

use tracing::debug;

use super::stage::Stage;

/// Static metadata for one registered stage type, plus its factory.
#[derive(Debug, Clone, Copy)]
pub struct StageSpec {
    pub name: &'static str,
    pub provides: &'static [&'static str],
    pub requires: &'static [&'static str],
    pub features: &'static [&'static str],
    build: fn() -> Box<dyn Stage>,
}

impl StageSpec {
    pub fn new(
        name: &'static str,
        provides: &'static [&'static str],
        requires: &'static [&'static str],
        features: &'static [&'static str],
        build: fn() -> Box<dyn Stage>,
    ) -> Self {
        Self {
            name,
            provides,
            requires,
            features,
            build,
        }
    }

    /// Instantiate a fresh stage of this type.
    pub fn build(&self) -> Box<dyn Stage> {
        (self.build)()
    }
}

/// Append-only catalog of stage types.
#[derive(Debug, Default)]
pub struct Registry {
    specs: Vec<StageSpec>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a stage type. Re-registering the same name has no effect.
    pub fn register(&mut self, spec: StageSpec) {
        if self.specs.iter().any(|s| s.name == spec.name) {
            return;
        }
        debug!(stage = spec.name, "registered pipeline stage");
        self.specs.push(spec);
    }

    /// Every registered stage type whose name or one of whose provided keys
    /// matches `identifier`. An empty result is not an error; callers decide
    /// whether zero matches is fatal.
    pub fn summon(&self, identifier: &str) -> Vec<StageSpec> {
        self.specs
            .iter()
            .filter(|s| s.name == identifier || s.provides.iter().any(|key| *key == identifier))
            .copied()
            .collect()
    }

    /// All registered stage types, in registration order.
    pub fn specs(&self) -> &[StageSpec] {
        &self.specs
    }
}

static REGISTRY: OnceLock<RwLock<Registry>> = OnceLock::new();

fn global() -> &'static RwLock<Registry> {
    REGISTRY.get_or_init(|| RwLock::new(Registry::new()))
}

/// Register a stage type in the process-wide registry.
pub fn register(spec: StageSpec) {
    global()
        .write()
        .expect("stage registry lock poisoned — a thread panicked while holding this lock")
        .register(spec);
}

/// Summon from the process-wide registry. See [`Registry::summon`].
pub fn summon(identifier: &str) -> Vec<StageSpec> {
    global()
        .read()
        .expect("stage registry lock poisoned — a thread panicked while holding this lock")
        .summon(identifier)
}

/// Names of every stage type in the process-wide registry.
pub fn registered_names() -> Vec<&'static str> {
    global()
        .read()
        .expect("stage registry lock poisoned — a thread panicked while holding this lock")
        .specs()
        .iter()
        .map(|s| s.name)
        .collect()
}
