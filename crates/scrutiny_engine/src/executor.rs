//! The worker pool: one translation unit per worker.
//!
//! The driver keeps a work list of translation units and spawns N workers
//! (default: hardware concurrency). Inside one worker the core is strictly
//! single-threaded; no token list is ever observed from two workers.
//!
//! Exactly three mutexes exist per run, always locked in the same order
//! and never held across a unit:
//!
//! 1. the work iterator (here),
//! 2. the deduplication list (in [`crate::errorlogger::ConcurrentSink`]),
//! 3. the output sink (same).
//!
//! Cancellation is a shared flag polled at unit boundaries; a worker in
//! the middle of a unit finishes it. A panic inside the analysis of one
//! unit becomes an `internalError` diagnostic for that unit; other units
//! continue.

use crate::check::{Check, Context, FileInfo};
use crate::errorlogger::ConcurrentSink;
use crate::settings::Settings;
use crate::suppressions::Suppressions;
use crate::timer::TimerResults;
use scrutiny_base::{ErrorMessage, ErrorSink, Severity, SourceLocation};
use scrutiny_preprocessor::include::FileHeaderSearch;
use scrutiny_preprocessor::Preprocessor;
use scrutiny_valueflow::passes::set_values;
use scrutiny_valueflow::SymbolDatabase;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// One translation unit: a path plus optional in-memory content (used by
/// tests and embedded callers).
#[derive(Debug, Clone)]
pub struct Ctu {
    pub path: String,
    pub content: Option<Vec<u8>>,
}

impl Ctu {
    pub fn from_path(path: impl Into<String>) -> Self {
        Ctu {
            path: path.into(),
            content: None,
        }
    }

    pub fn from_content(path: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Ctu {
            path: path.into(),
            content: Some(content.into()),
        }
    }
}

/// Analyzes one translation unit: preprocess, then per configuration
/// build symbols, run value-flow, and run every enabled check.
/// Returns the per-unit summaries for whole-program analysis.
pub fn analyze_ctu(
    ctu: &Ctu,
    settings: &Settings,
    checks: &[Box<dyn Check>],
    sink: &mut dyn ErrorSink,
    timers: &mut TimerResults,
) -> Vec<FileInfo> {
    let bytes = match &ctu.content {
        Some(content) => content.clone(),
        None => match std::fs::read(&ctu.path) {
            Ok(bytes) => bytes,
            Err(e) => {
                sink.report(ErrorMessage::new(
                    Severity::Error,
                    "internalError",
                    format!("could not read '{}': {}", ctu.path, e),
                    Some(SourceLocation::new(ctu.path.clone(), 0)),
                ));
                return Vec::new();
            }
        },
    };

    let search = FileHeaderSearch::new(settings.include_paths.clone());
    let preprocessor = Preprocessor::new(settings.preprocessor_settings(&ctu.path), &search);
    let result = timers.time("preprocess", || preprocessor.preprocess(&bytes, &ctu.path));

    let mut suppressions = Suppressions::new();
    for pattern in &settings.suppressions {
        // Patterns were validated when settings were assembled.
        let _ = suppressions.add_pattern(pattern);
    }
    suppressions.add_inline(&result.suppressions);

    for msg in &result.diagnostics {
        if !settings.is_enabled(msg.severity) {
            continue;
        }
        if let Some(loc) = msg.location() {
            if suppressions.is_suppressed(&msg.id, &loc.file, loc.line) {
                continue;
            }
        }
        sink.report(msg.clone());
    }

    let mut infos = Vec::new();
    for (name, mut configuration) in result.configurations {
        let symbols = timers.time("symbols", || SymbolDatabase::build(&mut configuration.list));
        timers.time("valueflow", || {
            set_values(
                &mut configuration.list,
                &symbols,
                &settings.valueflow_settings(),
            )
        });

        timers.time("checks", || {
            for check in checks {
                if !settings.check_enabled(check.name()) {
                    continue;
                }
                let mut ctx = Context {
                    list: &configuration.list,
                    symbols: &symbols,
                    settings,
                    suppressions: &suppressions,
                    config: &name,
                    sink: &mut *sink,
                };
                check.run_checks(&mut ctx);
                // File summaries come from the default configuration only;
                // other configurations would duplicate them.
                if name.is_empty() {
                    if let Some(info) = check.file_info(&ctx) {
                        infos.push(info);
                    }
                }
            }
        });
    }
    infos
}

/// The concurrent driver. See the module docs for the locking discipline.
pub struct Executor {
    settings: Arc<Settings>,
    checks: Arc<Vec<Box<dyn Check>>>,
}

impl Executor {
    pub fn new(settings: Settings, checks: Vec<Box<dyn Check>>) -> Self {
        Executor {
            settings: Arc::new(settings),
            checks: Arc::new(checks),
        }
    }

    /// Runs every unit, then whole-program analysis. Returns the merged
    /// timers; the sink counts errors.
    pub fn run(
        &self,
        ctus: Vec<Ctu>,
        sink: &ConcurrentSink,
        terminated: &Arc<AtomicBool>,
    ) -> TimerResults {
        let total = ctus.len();
        // Lock 1 of 3: the work iterator, which also owns the driver's
        // per-run bookkeeping. Locks 2 and 3 (dedup list, output sink)
        // live inside ConcurrentSink. Fixed order, never held across a
        // unit.
        let work = Mutex::new(WorkState {
            iter: ctus.into_iter(),
            infos: Vec::new(),
            timers: TimerResults::new(),
        });
        let finished = AtomicUsize::new(0);

        let workers = self.settings.effective_jobs().max(1).min(total.max(1));
        std::thread::scope(|scope| {
            for _ in 0..workers {
                scope.spawn(|| {
                    let mut timers = TimerResults::new();
                    loop {
                        if terminated.load(Ordering::SeqCst) {
                            break;
                        }
                        let ctu = {
                            let mut state = work.lock().expect("work mutex poisoned");
                            state.iter.next()
                        };
                        let Some(ctu) = ctu else { break };

                        let mut worker_sink = sink.clone();
                        let outcome = catch_unwind(AssertUnwindSafe(|| {
                            analyze_ctu(
                                &ctu,
                                &self.settings,
                                &self.checks,
                                &mut worker_sink,
                                &mut timers,
                            )
                        }));
                        match outcome {
                            Ok(infos) => {
                                let mut state =
                                    work.lock().expect("work mutex poisoned");
                                state.infos.extend(infos);
                            }
                            Err(_) => {
                                // The unit aborts; everything else goes on.
                                let mut worker_sink = sink.clone();
                                worker_sink.report(ErrorMessage::new(
                                    Severity::Error,
                                    "internalError",
                                    format!("analysis of '{}' failed", ctu.path),
                                    Some(SourceLocation::new(ctu.path.clone(), 0)),
                                ));
                            }
                        }

                        let done = finished.fetch_add(1, Ordering::SeqCst) + 1;
                        let mut progress_sink = sink.clone();
                        progress_sink.report_progress(done, total);
                    }
                    let mut state = work.lock().expect("work mutex poisoned");
                    state.timers.merge(timers);
                });
            }
        });

        let state = work.into_inner().expect("work mutex poisoned");
        if !terminated.load(Ordering::SeqCst) {
            let mut sink = sink.clone();
            for check in self.checks.iter() {
                if !self.settings.check_enabled(check.name()) {
                    continue;
                }
                check.analyse_whole_program(&state.infos, &self.settings, &mut sink);
            }
        }

        state.timers
    }
}

/// Everything behind the work-iterator lock.
struct WorkState {
    iter: std::vec::IntoIter<Ctu>,
    infos: Vec<FileInfo>,
    timers: TimerResults,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::check::builtin_checks;
    use scrutiny_base::CollectingSink;

    /// A sink whose storage outlives the executor, for assertions.
    #[derive(Clone, Default)]
    struct SharedSink(Arc<Mutex<Vec<ErrorMessage>>>);

    impl ErrorSink for SharedSink {
        fn report(&mut self, msg: ErrorMessage) {
            self.0.lock().expect("test sink poisoned").push(msg);
        }
    }

    fn run_on(sources: &[(&str, &str)], settings: Settings) -> (Vec<ErrorMessage>, usize) {
        let executor = Executor::new(settings, builtin_checks());
        let store = SharedSink::default();
        let sink = ConcurrentSink::new(Box::new(store.clone()));
        let terminated = Arc::new(AtomicBool::new(false));
        let ctus = sources
            .iter()
            .map(|(path, content)| Ctu::from_content(*path, content.as_bytes().to_vec()))
            .collect();
        executor.run(ctus, &sink, &terminated);
        let errors = sink.error_count();
        let messages = store.0.lock().expect("test sink poisoned").clone();
        (messages, errors)
    }

    #[test]
    fn end_to_end_zero_division_is_found() {
        let (messages, errors) = run_on(
            &[("bad.c", "void f(int a) {\n  int d = 0;\n  y = a / d;\n}\n")],
            Settings::default(),
        );
        assert_eq!(errors, 1);
        assert!(messages.iter().any(|m| m.id == "zerodiv"));
    }

    #[test]
    fn clean_file_produces_no_errors() {
        let (_messages, errors) = run_on(
            &[("ok.c", "void f(int a) {\n  int d = 2;\n  y = a / d;\n}\n")],
            Settings::default(),
        );
        assert_eq!(errors, 0);
    }

    #[test]
    fn division_only_in_one_configuration_is_found() {
        let source = "void f(int a) {\n#ifdef BAD\n  int d = 0;\n  y = a / d;\n#endif\n}\n";
        let (messages, errors) = run_on(&[("cfg.c", source)], Settings::default());
        assert_eq!(errors, 1);
        assert!(messages.iter().any(|m| m.id == "zerodiv"));
    }

    #[test]
    fn inline_suppression_is_honored_end_to_end() {
        let source =
            "void f(int a) {\n  int d = 0;\n  // scrutiny-suppress zerodiv\n  y = a / d;\n}\n";
        let (_messages, errors) = run_on(&[("supp.c", source)], Settings::default());
        assert_eq!(errors, 0);
    }

    #[test]
    fn whole_program_unused_function() {
        let mut settings = Settings::default();
        settings.enable.insert("style".to_string());
        settings.jobs = 2;
        let (messages, _errors) = run_on(
            &[
                ("a.c", "void helper(void) { }\n"),
                ("b.c", "void helper(void);\nvoid g(void) { }\nint main() { g(); return 0; }\n"),
            ],
            settings,
        );
        assert!(messages
            .iter()
            .any(|m| m.id == "unusedFunction" && m.message.contains("'helper'")));
        assert!(!messages
            .iter()
            .any(|m| m.id == "unusedFunction" && m.message.contains("'g'")));
    }

    #[test]
    fn cancellation_skips_remaining_units() {
        let executor = Executor::new(Settings::default(), builtin_checks());
        let sink = ConcurrentSink::new(Box::new(CollectingSink::new()));
        let terminated = Arc::new(AtomicBool::new(true));
        let ctus = vec![Ctu::from_content("x.c", b"int a;\n".to_vec())];
        executor.run(ctus, &sink, &terminated);
        assert_eq!(sink.error_count(), 0);
    }

    #[test]
    fn missing_file_reports_internal_error_and_continues() {
        let executor = Executor::new(Settings::default(), builtin_checks());
        let store = SharedSink::default();
        let sink = ConcurrentSink::new(Box::new(store.clone()));
        let terminated = Arc::new(AtomicBool::new(false));
        let ctus = vec![
            Ctu::from_path("/no/such/path/xyz.c"),
            Ctu::from_content("fine.c", b"int a;\n".to_vec()),
        ];
        executor.run(ctus, &sink, &terminated);
        assert_eq!(sink.error_count(), 1);
        let messages = store.0.lock().unwrap().clone();
        assert!(messages.iter().any(|m| m.id == "internalError"));
    }
}
