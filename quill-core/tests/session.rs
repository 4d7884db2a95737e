
use harness::{EMPTY_MANIFEST, Recorder, context, workspace, write_library, write_module};
use quill_core::stdlib::runtime_library;
use quill_core::{ScriptCompiler, ScriptError, ScriptLoader, Severity};

/// Compile and run one submission, returning its value and the loader.
fn submit<H: quill_core::ScriptHost>(
    compiler: &ScriptCompiler,
    dir: &std::path::Path,
    loader: ScriptLoader<H>,
    text: &str,
) -> (Option<i32>, ScriptLoader<H>) {
    let mut script = compiler
        .compile_submission::<Option<i32>, H>(&context(dir, text), loader)
        .expect("compile submission");
    let value = script.run().expect("run submission");
    (value, script.into_loader())
}

#[test]
fn submissions_see_earlier_declarations() {
    let dir = workspace(EMPTY_MANIFEST);
    let compiler = ScriptCompiler::new();
    let loader = ScriptLoader::new(()).expect("loader");

    let (value, loader) = submit(&compiler, dir.path(), loader, "int x = 40;");
    assert_eq!(value, None);
    let (value, loader) = submit(&compiler, dir.path(), loader, "x + 2");
    assert_eq!(value, Some(42));
    assert_eq!(loader.symbols().submissions(), 2);
}

#[test]
fn assignments_update_earlier_variables() {
    let dir = workspace(EMPTY_MANIFEST);
    let compiler = ScriptCompiler::new();
    let loader = ScriptLoader::new(()).expect("loader");

    let (_, loader) = submit(&compiler, dir.path(), loader, "int counter = 1;");
    let (_, loader) = submit(&compiler, dir.path(), loader, "counter = counter + 5;");
    let (value, _) = submit(&compiler, dir.path(), loader, "counter");
    assert_eq!(value, Some(6));
}

#[test]
fn redeclaring_shadows_with_an_info_diagnostic() {
    let dir = workspace(EMPTY_MANIFEST);
    let compiler = ScriptCompiler::new();
    let loader = ScriptLoader::new(()).expect("loader");
    let (_, loader) = submit(&compiler, dir.path(), loader, "int x = 1;");

    let mut script = compiler
        .compile_submission::<Option<i32>, ()>(&context(dir.path(), "int x = x + 10;"), loader)
        .expect("compile");
    assert_eq!(script.diagnostics().len(), 1);
    assert_eq!(script.diagnostics()[0].severity, Severity::Info);
    assert_eq!(script.diagnostics()[0].code, "QS0201");
    script.run().expect("run");

    let (value, loader) = submit(&compiler, dir.path(), script.into_loader(), "x");
    assert_eq!(value, Some(11));
    assert_eq!(loader.symbols().variables().len(), 2);
}

#[test]
fn rejected_submission_returns_the_loader() {
    let dir = workspace(EMPTY_MANIFEST);
    let compiler = ScriptCompiler::new();
    let loader = ScriptLoader::new(()).expect("loader");
    let (_, loader) = submit(&compiler, dir.path(), loader, "int kept = 9;");

    let rejection = match compiler
        .compile_submission::<Option<i32>, ()>(&context(dir.path(), "kept + unknown"), loader)
    {
        Ok(_) => panic!("expected the submission to be rejected"),
        Err(rejection) => rejection,
    };
    assert!(matches!(rejection.error, ScriptError::Compilation(_)));
    assert_eq!(rejection.loader.symbols().submissions(), 1);

    let (value, _) = submit(&compiler, dir.path(), rejection.loader, "kept");
    assert_eq!(value, Some(9));
}

#[test]
fn unrun_submission_publishes_nothing() {
    let dir = workspace(EMPTY_MANIFEST);
    let compiler = ScriptCompiler::new();
    let loader = ScriptLoader::new(()).expect("loader");

    let script = compiler
        .compile_submission::<Option<i32>, ()>(&context(dir.path(), "int y = 1;"), loader)
        .expect("compile");
    let loader = script.into_loader();
    assert!(loader.symbols().lookup("y").is_none());
}

#[test]
fn libraries_are_instantiated_once_per_session() {
    let dir = workspace(EMPTY_MANIFEST);
    let compiler = ScriptCompiler::new();
    let loader = ScriptLoader::new(()).expect("loader");

    let (value, loader) = submit(&compiler, dir.path(), loader, "abs(-3)");
    assert_eq!(value, Some(3));
    let (value, loader) = submit(&compiler, dir.path(), loader, "core.max(abs(-8), 2)");
    assert_eq!(value, Some(8));
    assert_eq!(loader.libraries().collect::<Vec<_>>(), ["core"]);
}

#[test]
fn a_library_name_keeps_its_module_for_the_session() {
    let dir = workspace(EMPTY_MANIFEST);
    write_library(dir.path(), "a/lib.wasm");
    write_module(dir.path(), "b/lib.wasm", &runtime_library());
    let compiler = ScriptCompiler::new();
    let loader = ScriptLoader::new(()).expect("loader");

    let (value, loader) = submit(&compiler, dir.path(), loader, "#r \"a/lib.wasm\"\nlib.abs(-1)");
    assert_eq!(value, Some(1));

    let rejection = match compiler.compile_submission::<Option<i32>, ()>(
        &context(dir.path(), "#r \"b/lib.wasm\"\nlib.popcount(7)"),
        loader,
    ) {
        Ok(_) => panic!("expected the submission to be rejected"),
        Err(rejection) => rejection,
    };
    let ScriptError::Compilation(error) = &rejection.error else {
        panic!("expected a compilation error, got {}", rejection.error);
    };
    assert_eq!(error.diagnostics[0].code, "QS0008");

    let (value, _) = submit(
        &compiler,
        dir.path(),
        rejection.loader,
        "#r \"a/lib.wasm\"\nlib.max(4, 5)",
    );
    assert_eq!(value, Some(5));
}

#[test]
fn host_state_persists_across_submissions() {
    let dir = workspace(EMPTY_MANIFEST);
    let compiler = ScriptCompiler::new();
    let loader = ScriptLoader::new(Recorder::default()).expect("loader");

    let (_, loader) = submit(&compiler, dir.path(), loader, "int a = emit(1);");
    let (_, loader) = submit(&compiler, dir.path(), loader, "emit(a + 1);");
    let (value, loader) = submit(&compiler, dir.path(), loader, "host.emit(3)");
    assert_eq!(value, Some(3));
    assert_eq!(loader.into_host().emitted, [1, 2, 3]);
}

#[test]
fn unit_submissions_discard_trailing_values_with_a_warning() {
    let dir = workspace(EMPTY_MANIFEST);
    let compiler = ScriptCompiler::new();
    let mut script = compiler
        .compile::<(), Recorder>(&context(dir.path(), "emit(4)"), Recorder::default())
        .expect("compile");
    assert_eq!(script.diagnostics()[0].code, "QS0102");
    script.run().expect("run");
    assert_eq!(script.into_loader().host().emitted, [4]);
}
