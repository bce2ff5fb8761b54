//! Syntax-aware diff refinement
//!
//! Takes the coarse, line-granular diff of a file's two revisions and the
//! parsed syntax trees of those revisions, and splits diff spans so their
//! boundaries land on token boundaries instead of arbitrary line cuts. The
//! refined diff reconstructs byte-identical text and keeps the declared
//! line counts; downstream stages read it under the same dependency key the
//! coarse diff used and cannot tell whether refinement ran.

use rustc_hash::FxHashMap;
use tracing::{debug, trace};

use crate::models::{ChangeList, DiffKind, DiffMap, DiffOp, DiffRecord, FileChange, DEP_FILE_DIFF};
use crate::pipeline::registry::StageSpec;
use crate::pipeline::stage::{CommitState, Stage, StageError};
use crate::syntax::{DEP_SYNTAX_CHANGES, FEATURE_SYNTAX};

const PROVIDES: &[&str] = &[DEP_FILE_DIFF];
const REQUIRES: &[&str] = &[DEP_FILE_DIFF, DEP_SYNTAX_CHANGES];
const FEATURES: &[&str] = &[FEATURE_SYNTAX];

/// Stage that realigns coarse diff hunks onto leaf-token boundaries.
///
/// Pure function of its per-commit inputs: no configuration, no branch-local
/// state, so forks are free and merge has nothing to reconcile.
#[derive(Debug, Clone, Default)]
pub struct DiffRefiner;

impl DiffRefiner {
    pub const NAME: &'static str = "DiffRefiner";

    /// Registry entry for this stage type.
    pub fn spec() -> StageSpec {
        StageSpec::new(Self::NAME, PROVIDES, REQUIRES, FEATURES, || {
            Box::new(DiffRefiner)
        })
    }
}

impl Stage for DiffRefiner {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn provides(&self) -> &'static [&'static str] {
        PROVIDES
    }

    fn requires(&self) -> &'static [&'static str] {
        REQUIRES
    }

    fn features(&self) -> &'static [&'static str] {
        FEATURES
    }

    fn consume(&mut self, state: &CommitState) -> Result<CommitState, StageError> {
        let diffs: &DiffMap = state.get(DEP_FILE_DIFF)?;
        let changes: &ChangeList = state.get(DEP_SYNTAX_CHANGES)?;

        let by_path: FxHashMap<&str, &FileChange> = changes
            .iter()
            .filter_map(|change| change.path().map(|path| (path, change)))
            .collect();

        let mut refined = DiffMap::default();
        for (path, record) in diffs {
            let out = match by_path.get(path.as_str()) {
                Some(change) => refine_record(path, record, change),
                None => {
                    trace!(file = %path, "no change record for file, passing diff through");
                    record.clone()
                }
            };
            refined.insert(path.clone(), out);
        }

        let mut delta = CommitState::new();
        delta.insert(DEP_FILE_DIFF, refined);
        Ok(delta)
    }

    fn fork(&self, n: usize) -> Vec<Box<dyn Stage>> {
        (0..n)
            .map(|_| Box::new(self.clone()) as Box<dyn Stage>)
            .collect()
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

/// Refine one file's diff, or pass it through untouched when refinement
/// preconditions do not hold.
fn refine_record(path: &str, record: &DiffRecord, change: &FileChange) -> DiffRecord {
    let (Some(before), Some(after)) = (&change.before, &change.after) else {
        trace!(file = %path, "syntax tree absent on one side, passing diff through");
        return record.clone();
    };
    if !record.is_consistent() {
        trace!(file = %path, "diff record inconsistent with its line counts, passing through");
        return record.clone();
    }

    // Token end offsets in traversal order, one stream per revision. A
    // malformed tree may yield out-of-order offsets; the scan below simply
    // finds no usable boundary in the affected regions.
    let old_bounds: Vec<usize> = before.token_boundaries().collect();
    let new_bounds: Vec<usize> = after.token_boundaries().collect();

    let mut ops = Vec::with_capacity(record.ops.len());
    let mut splits = 0usize;
    let mut old_off = 0usize;
    let mut new_off = 0usize;
    for op in &record.ops {
        let len = op.text.len();
        // Delete spans only exist in the old revision; Insert and Equal
        // spans are located against the new one.
        let (start, bounds) = match op.kind {
            DiffKind::Delete => (old_off, &old_bounds),
            _ => (new_off, &new_bounds),
        };
        match first_interior_boundary(bounds, start, start + len, &op.text) {
            Some(cut) => {
                let at = cut - start;
                ops.push(DiffOp {
                    kind: op.kind,
                    text: op.text[..at].to_string(),
                });
                ops.push(DiffOp {
                    kind: op.kind,
                    text: op.text[at..].to_string(),
                });
                splits += 1;
            }
            None => ops.push(op.clone()),
        }
        match op.kind {
            DiffKind::Equal => {
                old_off += len;
                new_off += len;
            }
            DiffKind::Insert => new_off += len,
            DiffKind::Delete => old_off += len,
        }
    }

    if splits > 0 {
        debug!(file = %path, splits, "refined diff at token boundaries");
    }
    // Line counts are copied verbatim; refinement never changes them.
    DiffRecord::new(record.old_lines, record.new_lines, ops)
}

/// First boundary in traversal order strictly inside `[start, end)` that is
/// also a UTF-8 character boundary of the span's text.
fn first_interior_boundary(
    bounds: &[usize],
    start: usize,
    end: usize,
    text: &str,
) -> Option<usize> {
    bounds
        .iter()
        .copied()
        .find(|&b| b > start && b < end && text.is_char_boundary(b - start))
}
