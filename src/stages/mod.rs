//! Built-in pipeline stages
//!
//! Concrete [`crate::pipeline::stage::Stage`] implementations shipped with
//! the core, plus their registration into the process-wide registry.

pub mod diff_refine;

use crate::pipeline::registry;

/// Register every built-in stage in the process-wide registry.
///
/// Call once at program start, before assembling pipelines. Safe to call
/// again; registration is idempotent.
pub fn register_builtins() {
    registry::register(diff_refine::DiffRefiner::spec());
}
