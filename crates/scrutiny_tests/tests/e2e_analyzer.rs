//! E2E: the full driver — files on disk, worker pool, checks, exit data.

mod common;

use scrutiny_base::{ErrorMessage, ErrorSink};
use scrutiny_engine::errorlogger::ConcurrentSink;
use scrutiny_engine::{builtin_checks, Ctu, Executor, Settings};
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};

#[derive(Clone, Default)]
struct SharedSink(Arc<Mutex<Vec<ErrorMessage>>>);

impl ErrorSink for SharedSink {
    fn report(&mut self, msg: ErrorMessage) {
        self.0.lock().expect("test sink poisoned").push(msg);
    }
}

fn run(sources: &[(&str, &str)], settings: Settings) -> (Vec<ErrorMessage>, usize) {
    let executor = Executor::new(settings, builtin_checks());
    let store = SharedSink::default();
    let sink = ConcurrentSink::new(Box::new(store.clone()));
    let terminated = Arc::new(AtomicBool::new(false));
    let ctus = sources
        .iter()
        .map(|(path, text)| Ctu::from_content(*path, text.as_bytes().to_vec()))
        .collect();
    executor.run(ctus, &sink, &terminated);
    let errors = sink.error_count();
    let messages = store.0.lock().expect("test sink poisoned").clone();
    (messages, errors)
}

#[test]
fn zero_division_across_configurations() {
    // The bug exists only under FEATURE_X; the splitter must find it.
    let source = "void f(int a) {\n#ifdef FEATURE_X\n  int d = 0;\n  y = a / d;\n#endif\n}\n";
    let (messages, errors) = run(&[("cfg.c", source)], Settings::default());
    assert_eq!(errors, 1);
    let msg = messages.iter().find(|m| m.id == "zerodiv").unwrap();
    assert_eq!(msg.cwe, 369);
    assert!(msg.location().unwrap().file.contains("cfg.c"));
}

#[test]
fn identical_findings_from_two_configurations_are_deduplicated() {
    // The division is outside the conditional; both configurations see it.
    let source = "void f(int a) {\n#ifdef COLOR\n  int unused;\n#endif\n  int d = 0;\n  y = a / d;\n}\n";
    let (messages, errors) = run(&[("dup.c", source)], Settings::default());
    assert_eq!(errors, 1);
    assert_eq!(messages.iter().filter(|m| m.id == "zerodiv").count(), 1);
}

#[test]
fn multiple_files_run_in_parallel() {
    let mut settings = Settings::default();
    settings.jobs = 4;
    let sources: Vec<(String, String)> = (0..8)
        .map(|i| {
            (
                format!("file{}.c", i),
                format!("void f{}(int a) {{\n  int d = 0;\n  y = a / d;\n}}\n", i),
            )
        })
        .collect();
    let borrowed: Vec<(&str, &str)> = sources
        .iter()
        .map(|(p, t)| (p.as_str(), t.as_str()))
        .collect();
    let (messages, errors) = run(&borrowed, settings);
    assert_eq!(errors, 8);
    assert_eq!(messages.iter().filter(|m| m.id == "zerodiv").count(), 8);
}

#[test]
fn error_path_explains_the_derivation() {
    let source = "void f(int a) {\n  int d = 0;\n  y = a % d;\n}\n";
    let (messages, _errors) = run(&[("path.c", source)], Settings::default());
    let msg = messages.iter().find(|m| m.id == "zerodiv").unwrap();
    assert!(msg.path.len() > 1, "expected a derivation trail");
}

#[test]
fn inline_suppression_reaches_the_driver() {
    let source = "void f(int a) {\n  int d = 0;\n  // scrutiny-suppress zerodiv\n  y = a / d;\n}\n";
    let (_messages, errors) = run(&[("supp.c", source)], Settings::default());
    assert_eq!(errors, 0);
}

#[test]
fn settings_suppression_patterns_apply() {
    let mut settings = Settings::default();
    settings.suppressions.push("zerodiv:supp2.c".to_string());
    let source = "void f(int a) {\n  int d = 0;\n  y = a / d;\n}\n";
    let (_messages, errors) = run(&[("supp2.c", source)], settings);
    assert_eq!(errors, 0);
}

#[test]
fn information_diagnostics_require_enablement() {
    let source = "#include \"missing.h\"\nint x;\n";
    let (messages, _errors) = run(&[("inc.c", source)], Settings::default());
    assert!(messages.iter().all(|m| m.id != "missingInclude"));

    let mut settings = Settings::default();
    settings.enable.insert("information".to_string());
    let (messages, _errors) = run(&[("inc.c", source)], settings);
    assert!(messages.iter().any(|m| m.id == "missingInclude"));
}

#[test]
fn whole_program_analysis_sees_every_unit() {
    let mut settings = Settings::default();
    settings.enable.insert("style".to_string());
    let (messages, _errors) = run(
        &[
            ("lib.c", "void orphan(void) { }\nvoid api(void) { }\n"),
            ("app.c", "void api(void);\nint main() {\n  api();\n  return 0;\n}\n"),
        ],
        settings,
    );
    assert!(messages
        .iter()
        .any(|m| m.id == "unusedFunction" && m.message.contains("'orphan'")));
    assert!(!messages
        .iter()
        .any(|m| m.id == "unusedFunction" && m.message.contains("'api'")));
}

#[test]
fn headers_resolve_from_real_directories() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("div.h"), "#define DIVISOR 0\n").unwrap();
    let main_path = dir.path().join("main.c");
    std::fs::write(
        &main_path,
        "#include \"div.h\"\nvoid f(int a) {\n  y = a / DIVISOR;\n}\n",
    )
    .unwrap();

    let mut settings = Settings::default();
    settings.include_paths.push(dir.path().to_path_buf());
    let executor = Executor::new(settings, builtin_checks());
    let store = SharedSink::default();
    let sink = ConcurrentSink::new(Box::new(store.clone()));
    let terminated = Arc::new(AtomicBool::new(false));
    let ctus = vec![Ctu::from_path(main_path.to_string_lossy().into_owned())];
    executor.run(ctus, &sink, &terminated);
    assert_eq!(sink.error_count(), 1);
}
