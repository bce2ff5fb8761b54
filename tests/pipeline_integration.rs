//! Integration tests for the histmine analysis core
//!
//! These tests drive the whole pipeline the way an orchestrating binary
//! would: register built-in stages, assemble a pipeline from the registry,
//! initialize it against a (temporary) git repository, seed one commit's
//! state with a coarse diff and tree-sitter-parsed syntax trees, and run.
//!
//! Each test uses its own isolated temp directory.

use histmine::{
    stages, ChangeList, CommitState, DiffMap, DiffOp, DiffRecord, FileChange, Pipeline,
    SyntaxTree, DEP_FILE_DIFF, DEP_SYNTAX_CHANGES, FEATURE_SYNTAX,
};
use tempfile::TempDir;

const OLD_SOURCE: &str = "def add(a, b):\n    return a + b\n";
const NEW_SOURCE: &str = "def add(a, b):\n    return a - b\n";

fn init_logs() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

/// Parse Python source into the neutral tree shape, standing in for the
/// external extraction service.
fn parse_python(source: &str) -> SyntaxTree {
    let mut parser = tree_sitter::Parser::new();
    let language = tree_sitter_python::LANGUAGE;
    parser
        .set_language(&language.into())
        .expect("Failed to set Python language");
    let tree = parser.parse(source, None).expect("Failed to parse source");
    SyntaxTree::from_tree_sitter(&tree)
}

/// A coarse, line-granular diff of the fixture sources, the shape a
/// line-diff primitive would hand over.
fn coarse_diff() -> DiffRecord {
    DiffRecord::new(
        2,
        2,
        vec![
            DiffOp::equal("def add(a, b):\n"),
            DiffOp::delete("    return a + b\n"),
            DiffOp::insert("    return a - b\n"),
        ],
    )
}

fn seeded_state() -> CommitState {
    let mut diffs = DiffMap::default();
    diffs.insert("calc.py".to_string(), coarse_diff());

    let changes: ChangeList = vec![FileChange {
        old_path: Some("calc.py".into()),
        new_path: Some("calc.py".into()),
        before: Some(parse_python(OLD_SOURCE)),
        after: Some(parse_python(NEW_SOURCE)),
    }];

    let mut state = CommitState::new();
    state.insert(DEP_FILE_DIFF, diffs);
    state.insert(DEP_SYNTAX_CHANGES, changes);
    state
}

/// Assemble the refiner pipeline against a temp repository.
fn refiner_pipeline(workdir: &TempDir) -> Pipeline {
    stages::register_builtins();
    let repo = git2::Repository::init(workdir.path()).expect("Failed to init temp repository");

    let mut pipeline = Pipeline::new();
    pipeline.enable_feature(FEATURE_SYNTAX);
    pipeline.deploy("DiffRefiner").expect("refiner registered");
    pipeline.initialize(&repo).expect("initialize failed");
    pipeline
}

#[test]
fn test_refined_diff_preserves_text_and_counts() {
    init_logs();
    let workdir = tempfile::tempdir().expect("Failed to create temp dir");
    let mut pipeline = refiner_pipeline(&workdir);

    let mut state = seeded_state();
    pipeline.run_commit(&mut state).expect("commit run failed");

    let refined: &DiffMap = state.get(DEP_FILE_DIFF).expect("diff key present");
    let out = &refined["calc.py"];
    let original = coarse_diff();

    assert_eq!(out.merged_text(), original.merged_text());
    assert_eq!(out.old_text(), OLD_SOURCE);
    assert_eq!(out.new_text(), NEW_SOURCE);
    assert_eq!(out.old_lines, original.old_lines);
    assert_eq!(out.new_lines, original.new_lines);

    // The fixture spans cover several tokens each, so refinement must have
    // split at least one of them.
    assert!(out.ops.len() > original.ops.len());
}

#[test]
fn test_refined_diff_keeps_original_span_boundaries() {
    init_logs();
    let workdir = tempfile::tempdir().expect("Failed to create temp dir");
    let mut pipeline = refiner_pipeline(&workdir);

    let mut state = seeded_state();
    pipeline.run_commit(&mut state).expect("commit run failed");

    let refined: &DiffMap = state.get(DEP_FILE_DIFF).expect("diff key present");
    let out = &refined["calc.py"];

    let offsets = |rec: &DiffRecord| -> Vec<usize> {
        let mut acc = 0;
        rec.ops
            .iter()
            .map(|op| {
                acc += op.text.len();
                acc
            })
            .collect()
    };
    let refined_offsets = offsets(out);
    for boundary in offsets(&coarse_diff()) {
        assert!(
            refined_offsets.contains(&boundary),
            "boundary {boundary} lost by refinement"
        );
    }
}

#[test]
fn test_refinement_is_gated_on_the_syntax_feature() {
    init_logs();
    stages::register_builtins();
    let workdir = tempfile::tempdir().expect("Failed to create temp dir");
    let repo = git2::Repository::init(workdir.path()).expect("Failed to init temp repository");

    // Feature deliberately not enabled: the refiner is skipped at assembly,
    // and the seeded diff flows through the commit run untouched.
    let mut pipeline = Pipeline::new();
    pipeline.deploy("DiffRefiner").expect("refiner registered");
    pipeline.initialize(&repo).expect("initialize failed");
    assert!(pipeline.stage_names().is_empty());

    let mut state = seeded_state();
    pipeline.run_commit(&mut state).expect("commit run failed");
    let diffs: &DiffMap = state.get(DEP_FILE_DIFF).expect("diff key present");
    assert_eq!(diffs["calc.py"], coarse_diff());
}

#[test]
fn test_summon_by_provided_key() {
    stages::register_builtins();
    let specs = histmine::registry::summon(DEP_FILE_DIFF);
    assert!(specs.iter().any(|s| s.name == "DiffRefiner"));

    // Deploying by provided key wires the same stage.
    let workdir = tempfile::tempdir().expect("Failed to create temp dir");
    let repo = git2::Repository::init(workdir.path()).expect("Failed to init temp repository");
    let mut pipeline = Pipeline::new();
    pipeline.enable_feature(FEATURE_SYNTAX);
    pipeline.deploy(DEP_FILE_DIFF).expect("deploy by key");
    pipeline.initialize(&repo).expect("initialize failed");
    assert_eq!(pipeline.stage_names(), vec!["DiffRefiner"]);
}

#[test]
fn test_forked_branches_refine_identically() {
    init_logs();
    let workdir = tempfile::tempdir().expect("Failed to create temp dir");
    let mut pipeline = refiner_pipeline(&workdir);

    let mut trunk_state = seeded_state();
    pipeline.run_commit(&mut trunk_state).expect("trunk run failed");
    let trunk: DiffMap = trunk_state
        .get::<DiffMap>(DEP_FILE_DIFF)
        .expect("diff key present")
        .clone();

    let mut branches = pipeline.fork(2).expect("fork failed");
    for branch in &mut branches {
        let mut state = seeded_state();
        branch.run_commit(&mut state).expect("branch run failed");
        let refined: &DiffMap = state.get(DEP_FILE_DIFF).expect("diff key present");
        assert_eq!(refined, &trunk);
    }

    // Merging the stateless refiner back is a no-op; the trunk still
    // produces the same refinement afterwards.
    pipeline.merge(branches);
    let mut state = seeded_state();
    pipeline.run_commit(&mut state).expect("post-merge run failed");
    let refined: &DiffMap = state.get(DEP_FILE_DIFF).expect("diff key present");
    assert_eq!(refined, &trunk);
}
