//! Integration tests for incremental updates, driven through `Compilation`.
//!
//! Each test edits sources between updates and checks what the declaration
//! graph, the diagnostics and the backend observed.

use kiln::{
    AnalysisOptions, AnalysisState, BackendCall, BackendError, BackendHook, Compilation,
    CompileError, DeclId, RecordingBackend, Value,
};
use pretty_assertions::assert_eq;
use std::path::PathBuf;

/// Load a test script from the test_scripts directory.
fn load_script(filename: &str) -> String {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("test_scripts")
        .join(filename);
    match std::fs::read_to_string(&path) {
        Ok(text) => text,
        Err(e) => panic!("Failed to read {}: {}", path.display(), e),
    }
}

/// Route analyzer logs to the test harness. Set `RUST_LOG=kiln_sema=debug` to see them.
fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn recording() -> Compilation<RecordingBackend> {
    Compilation::new(RecordingBackend::new(), AnalysisOptions::default())
}

fn value_of<B: kiln::Backend>(comp: &Compilation<B>, path: &str, name: &str) -> Value {
    let id = comp.lookup(path, name).unwrap();
    comp.module()
        .decl(id)
        .unwrap()
        .typed_value
        .as_ref()
        .unwrap()
        .val
        .clone()
}

fn state_of<B: kiln::Backend>(comp: &Compilation<B>, path: &str, name: &str) -> AnalysisState {
    let id = comp.lookup(path, name).unwrap();
    comp.module().decl(id).unwrap().analysis
}

fn messages<B: kiln::Backend>(comp: &Compilation<B>) -> Vec<String> {
    comp.diagnostics().into_iter().map(|d| d.message).collect()
}

/// Every edge is present at both ends and points at a live decl.
fn assert_graph_consistent<B: kiln::Backend>(comp: &Compilation<B>) {
    let module = comp.module();
    for decl in module.decls() {
        for dep in decl.dependencies() {
            let target = module
                .decl(dep)
                .unwrap_or_else(|| panic!("{} depends on deleted {}", decl.name, dep));
            assert!(
                target.dependants().any(|d| d == decl.id),
                "{} -> {} missing its back edge",
                decl.name,
                target.name
            );
        }
        for dep in decl.dependants() {
            let source = module
                .decl(dep)
                .unwrap_or_else(|| panic!("{} has deleted dependant {}", decl.name, dep));
            let (target, name) = (&decl.name, &source.name);
            assert!(source.depends_on(decl.id), "{target} <- {name} missing its edge");
        }
    }
}

fn assert_unique(ids: &[DeclId]) {
    let mut sorted = ids.to_vec();
    sorted.sort();
    sorted.dedup();
    assert_eq!(sorted.len(), ids.len(), "duplicates in {:?}", ids);
}

// =============================================================================
// Sample Programs
// =============================================================================

#[test]
fn test_sample_scripts_analyze_cleanly() {
    for name in ["constants.kn", "inline_calls.kn", "exports.kn"] {
        let mut comp = Compilation::default();
        comp.add_source(name, load_script(name)).unwrap();
        if let Err(err) = comp.check() {
            panic!("{name}: {err}: {:?}", comp.diagnostics());
        }
    }
}

#[test]
fn test_sample_constants_fold() {
    let mut comp = Compilation::default();
    comp.add_source("constants.kn", load_script("constants.kn"))
        .unwrap();
    comp.check().unwrap();
    assert_eq!(value_of(&comp, "constants.kn", "answer"), Value::Int(42));
    assert_eq!(value_of(&comp, "constants.kn", "total"), Value::Int(45));
}

#[test]
fn test_sample_exports_reach_the_backend() {
    let mut comp = recording();
    comp.add_source("exports.kn", load_script("exports.kn"))
        .unwrap();
    comp.check().unwrap();
    assert!(comp.module().symbol_export("entry").is_some());
    assert!(comp.module().symbol_export("helper_alias").is_some());
    let calls = comp.module_mut().backend_mut().take_calls();
    assert!(calls.contains(&BackendCall::UpdateDecl("entry".into())));
}

// =============================================================================
// Graph Invariants
// =============================================================================

#[test]
fn test_graph_symmetry_across_edits() {
    let mut comp = Compilation::default();
    comp.add_source(
        "main.kn",
        "\
const a: u32 = 1;
const b: u32 = a + 1;
const c: u32 = a + b;
comptime { _ = c; }
",
    )
    .unwrap();
    comp.check().unwrap();
    assert_graph_consistent(&comp);

    comp.update_source(
        "main.kn",
        "\
const a: u32 = 1;
const b: u32 = 2;
const c: u32 = b;
comptime { _ = c; }
",
    )
    .unwrap();
    comp.check().unwrap();
    assert_graph_consistent(&comp);
    assert_eq!(value_of(&comp, "main.kn", "c"), Value::Int(2));
}

#[test]
fn test_idempotent_reanalysis() {
    let source = "export fn entry() u32 { return 1; }\nconst x: u32 = 2;\ncomptime { _ = x; }\n";
    let mut comp = recording();
    comp.add_source("main.kn", source).unwrap();
    let first = comp.check().unwrap();
    assert!(!first.analyzed.is_empty());
    comp.module_mut().backend_mut().take_calls();

    assert!(!comp.update_source("main.kn", source).unwrap());
    let second = comp.check().unwrap();
    assert!(second.analyzed.is_empty());
    assert!(second.outdated.is_empty());
    assert!(second.deleted.is_empty());
    assert_eq!(comp.module_mut().backend_mut().take_calls(), vec![]);
}

#[test]
fn test_single_outdated_transition_per_update() {
    init_logging();
    let mut comp = Compilation::default();
    let source = |a: u32| {
        format!(
            "\
const a: u32 = {a};
const b: u32 = a + 1;
const c: u32 = a + 2;
const d: u32 = b + c;
comptime {{ _ = d; }}
"
        )
    };
    comp.add_source("main.kn", source(1)).unwrap();
    comp.check().unwrap();
    assert_eq!(value_of(&comp, "main.kn", "d"), Value::Int(5));

    comp.update_source("main.kn", source(5)).unwrap();
    let report = comp.check().unwrap();
    assert_unique(&report.outdated);
    let d = comp.lookup("main.kn", "d").unwrap();
    assert_eq!(report.outdated.iter().filter(|&&id| id == d).count(), 1);
    assert_eq!(value_of(&comp, "main.kn", "d"), Value::Int(13));
}

// =============================================================================
// Redefinition
// =============================================================================

#[test]
fn test_redefinition_and_recovery() {
    let mut comp = Compilation::default();
    comp.add_source("main.kn", "const x = 1;\nconst x = 2;\ncomptime { _ = x; }\n")
        .unwrap();
    let err = comp.check().unwrap_err();
    assert!(matches!(err, CompileError::Analysis(_)));
    assert_eq!(messages(&comp), vec!["redefinition of 'x'".to_string()]);
    let diags = comp.diagnostics();
    assert_eq!((diags[0].line, diags[0].column), (2, 1));

    comp.update_source("main.kn", "const x = 1;\ncomptime { _ = x; }\n")
        .unwrap();
    comp.check().unwrap();
    assert_eq!(value_of(&comp, "main.kn", "x"), Value::Int(1));
    assert_eq!(state_of(&comp, "main.kn", "x"), AnalysisState::Complete);
}

// =============================================================================
// Exports
// =============================================================================

#[test]
fn test_export_collision_across_files() {
    let mut comp = recording();
    comp.add_source("a.kn", "export fn entry() void {}\n")
        .unwrap();
    comp.add_source("b.kn", "export fn entry() void {}\n")
        .unwrap();
    comp.update().unwrap();

    let winner = comp.module().symbol_export("entry").unwrap().exported;
    let a = comp.lookup("a.kn", "entry").unwrap();
    assert_eq!(winner, a);
    assert_eq!(messages(&comp), vec!["exported symbol collision: entry".to_string()]);
    assert_eq!(comp.diagnostics()[0].path, "b.kn");
}

// =============================================================================
// Deletion
// =============================================================================

#[test]
fn test_deletion_cascade_queues_each_orphan_once() {
    init_logging();
    let mut comp = Compilation::default();
    comp.add_source(
        "main.kn",
        "\
const leaf: u32 = 1;
const mid: u32 = leaf + 1;
const top: u32 = mid + leaf;
comptime { _ = top; }
",
    )
    .unwrap();
    comp.check().unwrap();
    let ids: Vec<DeclId> = ["leaf", "mid", "top"]
        .iter()
        .map(|name| comp.lookup("main.kn", name).unwrap())
        .collect();

    comp.update_source(
        "main.kn",
        "\
const leaf: u32 = 1;
const mid: u32 = leaf + 1;
const top: u32 = mid + leaf;
",
    )
    .unwrap();
    let report = comp.check().unwrap();
    assert_unique(&report.deleted);
    for id in &ids {
        assert!(report.deleted.contains(id), "{id} not deleted");
        assert!(comp.module().decl(*id).is_none());
    }
    assert!(comp.module().deletion_set().is_empty());
    assert_graph_consistent(&comp);
}

#[test]
fn test_collected_decls_register_again_on_demand() {
    let base = "const leaf: u32 = 1;\nconst mid: u32 = leaf + 1;\n";
    let mut comp = Compilation::default();
    comp.add_source("main.kn", format!("{base}comptime {{ _ = mid; }}\n"))
        .unwrap();
    comp.check().unwrap();
    let old_mid = comp.lookup("main.kn", "mid").unwrap();

    comp.update_source("main.kn", base).unwrap();
    comp.check().unwrap();
    assert_eq!(comp.lookup("main.kn", "mid"), None);

    comp.update_source("main.kn", format!("{base}comptime {{ _ = mid; }}\n"))
        .unwrap();
    comp.check().unwrap();
    let new_mid = comp.lookup("main.kn", "mid").unwrap();
    assert_ne!(new_mid, old_mid);
    assert_eq!(value_of(&comp, "main.kn", "mid"), Value::Int(2));
}

#[test]
fn test_removed_file_frees_backend_storage() {
    let mut comp = recording();
    comp.add_source("lib.kn", "export fn f() void {}\nexport fn g() void {}\n")
        .unwrap();
    comp.check().unwrap();
    assert_eq!(comp.module().backend().live_allocations(), 2);

    comp.remove_source("lib.kn").unwrap();
    let report = comp.check().unwrap();
    assert_eq!(report.deleted.len(), 2);
    assert_eq!(comp.module().backend().live_allocations(), 0);
    assert!(comp.module().symbol_export("f").is_none());
    assert_eq!(comp.file_id("lib.kn"), None);
}

// =============================================================================
// Dependency Loops
// =============================================================================

#[test]
fn test_dependency_loop_diagnostic_and_repair() {
    init_logging();
    let mut comp = Compilation::default();
    comp.add_source("main.kn", "const a: u32 = b;\nconst b: u32 = a;\ncomptime { _ = a; }\n")
        .unwrap();
    comp.update().unwrap();
    let diags = comp.diagnostics();
    assert_eq!(diags.len(), 1);
    assert_eq!(diags[0].message, "dependency loop detected");
    assert_eq!(diags[0].line, 2);
    assert_eq!(state_of(&comp, "main.kn", "a"), AnalysisState::DependencyFailure);

    comp.update_source("main.kn", "const a: u32 = 1;\nconst b: u32 = a;\ncomptime { _ = a; }\n")
        .unwrap();
    comp.check().unwrap();
    assert_eq!(value_of(&comp, "main.kn", "a"), Value::Int(1));
    assert_graph_consistent(&comp);
}

// =============================================================================
// Backend Failures
// =============================================================================

#[test]
fn test_retryable_codegen_failure_is_retried() {
    init_logging();
    let mut backend = RecordingBackend::new();
    backend.fail_on(
        BackendHook::AllocateDeclIndexes,
        "entry",
        BackendError::Retryable("disk full".into()),
    );
    let mut comp = Compilation::new(backend, AnalysisOptions::default());
    comp.add_source("main.kn", "export fn entry() void {}\n")
        .unwrap();
    comp.update().unwrap();
    assert_eq!(state_of(&comp, "main.kn", "entry"), AnalysisState::CodegenFailureRetryable);
    assert_eq!(messages(&comp), vec!["unable to codegen: disk full".to_string()]);
    assert!(comp.module().symbol_export("entry").is_none());

    // Nothing changed on disk, but the failure may clear on its own.
    comp.module_mut().backend_mut().clear_failures();
    assert!(!comp.has_pending_changes());
    comp.check().unwrap();
    assert_eq!(state_of(&comp, "main.kn", "entry"), AnalysisState::Complete);
    assert!(comp.module().symbol_export("entry").is_some());
}

#[test]
fn test_permanent_codegen_failure_sticks() {
    let mut backend = RecordingBackend::new();
    backend.fail_on(
        BackendHook::UpdateDecl,
        "entry",
        BackendError::Permanent("unsupported".into()),
    );
    let mut comp = Compilation::new(backend, AnalysisOptions::default());
    comp.add_source("main.kn", "export fn entry() void {}\n")
        .unwrap();
    comp.update().unwrap();
    assert_eq!(state_of(&comp, "main.kn", "entry"), AnalysisState::CodegenFailure);
    assert_eq!(messages(&comp), vec!["unable to codegen: unsupported".to_string()]);

    comp.module_mut().backend_mut().clear_failures();
    let report = comp.update().unwrap();
    assert!(report.analyzed.is_empty());
    assert_eq!(state_of(&comp, "main.kn", "entry"), AnalysisState::CodegenFailure);
}

#[test]
fn test_backend_out_of_memory_aborts_the_update() {
    let mut backend = RecordingBackend::new();
    backend.fail_on(BackendHook::AllocateDeclIndexes, "entry", BackendError::OutOfMemory);
    let mut comp = Compilation::new(backend, AnalysisOptions::default());
    comp.add_source("main.kn", "export fn entry() void {}\n")
        .unwrap();
    assert_eq!(comp.update(), Err(CompileError::OutOfMemory));
}

#[test]
fn test_moved_decl_only_updates_line_number() {
    let mut comp = recording();
    comp.add_source("main.kn", "export fn entry() void {}\n")
        .unwrap();
    comp.check().unwrap();
    comp.module_mut().backend_mut().take_calls();

    comp.update_source("main.kn", "\n\nexport fn entry() void {}\n")
        .unwrap();
    let report = comp.check().unwrap();
    assert!(report.analyzed.is_empty());
    let calls = comp.module_mut().backend_mut().take_calls();
    let moved = |c: &BackendCall| {
        matches!(c, BackendCall::UpdateDeclLineNumber { decl, .. } if decl == "entry")
    };
    assert!(calls.iter().any(moved), "{calls:?}");
    let updated = |c: &BackendCall| matches!(c, BackendCall::UpdateDecl(_));
    assert!(!calls.iter().any(updated));
}

// =============================================================================
// Evaluation Limits
// =============================================================================

#[test]
fn test_branch_quota() {
    let source = "\
fn spin() void { while (true) {} }
comptime { spin(); }
";
    let mut comp = Compilation::new(
        kiln::NullBackend,
        AnalysisOptions::default().with_eval_branch_quota(10),
    );
    comp.add_source("main.kn", source).unwrap();
    comp.update().unwrap();
    assert_eq!(
        messages(&comp),
        vec!["evaluation exceeded 10 backwards branches".to_string()]
    );
}

#[test]
fn test_loops_within_quota_complete() {
    let source = "\
fn sum(n: u32) u32 {
    var i: u32 = 0;
    var acc: u32 = 0;
    while (i < n) {
        acc = acc + i;
        i = i + 1;
    }
    return acc;
}
const total = sum(20);
comptime { _ = total; }
";
    let mut comp = Compilation::new(
        kiln::NullBackend,
        AnalysisOptions::default().with_eval_branch_quota(100),
    );
    comp.add_source("main.kn", source).unwrap();
    comp.check().unwrap();
    assert_eq!(value_of(&comp, "main.kn", "total"), Value::Int(190));
}
