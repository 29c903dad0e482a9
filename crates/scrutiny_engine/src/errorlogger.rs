//! Error sinks: concurrent serialization and deduplication.
//!
//! Workers report diagnostics concurrently. [`ConcurrentSink`] wraps any
//! inner sink behind a mutex and drops messages it has already seen — the
//! same header analyzed under two configurations produces byte-identical
//! records, and users should see them once. The dedup list and the output
//! sink are two separate locks, always taken in that order (after the work
//! iterator, which lives in the executor) and never held across a
//! translation unit.
//!
//! [`TextSink`] renders one line per record, appending the verbose text
//! when requested. JSON output serializes records directly, one per line.

use scrutiny_base::{ErrorMessage, ErrorSink, Severity};
use std::collections::HashSet;
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Text renderer over any writer.
pub struct TextSink<W: Write + Send> {
    writer: W,
    verbose: bool,
    errors: usize,
}

impl<W: Write + Send> TextSink<W> {
    pub fn new(writer: W, verbose: bool) -> Self {
        TextSink {
            writer,
            verbose,
            errors: 0,
        }
    }

    /// Number of error-severity records seen; becomes the exit code.
    pub fn error_count(&self) -> usize {
        self.errors
    }
}

impl<W: Write + Send> ErrorSink for TextSink<W> {
    fn report(&mut self, msg: ErrorMessage) {
        if msg.severity == Severity::Error {
            self.errors += 1;
        }
        let _ = writeln!(self.writer, "{}", msg.text());
        if self.verbose && msg.verbose != msg.message {
            let _ = writeln!(self.writer, "   {}", msg.verbose);
        }
        for item in msg.path.iter().skip(1) {
            let _ = writeln!(self.writer, "   {}: note: {}", item.location, item.note);
        }
    }
}

/// JSON-lines renderer over any writer.
pub struct JsonSink<W: Write + Send> {
    writer: W,
    errors: usize,
}

impl<W: Write + Send> JsonSink<W> {
    pub fn new(writer: W) -> Self {
        JsonSink { writer, errors: 0 }
    }

    pub fn error_count(&self) -> usize {
        self.errors
    }
}

impl<W: Write + Send> ErrorSink for JsonSink<W> {
    fn report(&mut self, msg: ErrorMessage) {
        if msg.severity == Severity::Error {
            self.errors += 1;
        }
        if let Ok(line) = serde_json::to_string(&msg) {
            let _ = writeln!(self.writer, "{}", line);
        }
    }
}

/// Thread-safe wrapper: one mutex for the dedup list, one for the sink,
/// locked in that order. Cloneable across workers.
pub struct ConcurrentSink {
    seen: Arc<Mutex<HashSet<String>>>,
    inner: Arc<Mutex<Box<dyn ErrorSink>>>,
    errors: Arc<AtomicUsize>,
}

impl Clone for ConcurrentSink {
    fn clone(&self) -> Self {
        ConcurrentSink {
            seen: Arc::clone(&self.seen),
            inner: Arc::clone(&self.inner),
            errors: Arc::clone(&self.errors),
        }
    }
}

impl ConcurrentSink {
    pub fn new(inner: Box<dyn ErrorSink>) -> Self {
        ConcurrentSink {
            seen: Arc::new(Mutex::new(HashSet::new())),
            inner: Arc::new(Mutex::new(inner)),
            errors: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Error-severity records that passed deduplication.
    pub fn error_count(&self) -> usize {
        self.errors.load(Ordering::SeqCst)
    }

    /// Runs `f` on the inner sink, for final reporting.
    pub fn with_inner<R>(&self, f: impl FnOnce(&mut dyn ErrorSink) -> R) -> R {
        let mut guard = self.inner.lock().expect("sink mutex poisoned");
        f(guard.as_mut())
    }
}

impl ErrorSink for ConcurrentSink {
    fn report(&mut self, msg: ErrorMessage) {
        // Lock order: dedup list, then output sink.
        let key = format!("{}|{}", msg.id, msg.text());
        {
            let mut seen = self.seen.lock().expect("dedup mutex poisoned");
            if !seen.insert(key) {
                return;
            }
        }
        if msg.severity == Severity::Error {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }
        let mut inner = self.inner.lock().expect("sink mutex poisoned");
        inner.report(msg);
    }

    fn report_progress(&mut self, finished: usize, total: usize) {
        let mut inner = self.inner.lock().expect("sink mutex poisoned");
        inner.report_progress(finished, total);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scrutiny_base::{CollectingSink, SourceLocation};

    fn msg(id: &str, line: u32) -> ErrorMessage {
        ErrorMessage::new(
            Severity::Error,
            id,
            "boom",
            Some(SourceLocation::new("t.c", line)),
        )
    }

    #[test]
    fn concurrent_sink_deduplicates_identical_messages() {
        let mut sink = ConcurrentSink::new(Box::new(CollectingSink::new()));
        sink.report(msg("dup", 1));
        sink.report(msg("dup", 1));
        sink.report(msg("dup", 2));
        assert_eq!(sink.error_count(), 2);
    }

    #[test]
    fn clones_share_the_dedup_list() {
        let mut a = ConcurrentSink::new(Box::new(CollectingSink::new()));
        let mut b = a.clone();
        a.report(msg("x", 1));
        b.report(msg("x", 1));
        assert_eq!(a.error_count(), 1);
    }

    #[test]
    fn text_sink_counts_errors_only() {
        let mut out = Vec::new();
        {
            let mut sink = TextSink::new(&mut out, false);
            sink.report(msg("e", 1));
            sink.report(ErrorMessage::new(Severity::Style, "s", "meh", None));
            assert_eq!(sink.error_count(), 1);
        }
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("[t.c:1]: (error) boom [e]"));
        assert!(text.contains("(style) meh [s]"));
    }

    #[test]
    fn json_sink_emits_one_record_per_line() {
        let mut out = Vec::new();
        {
            let mut sink = JsonSink::new(&mut out);
            sink.report(msg("e", 1));
        }
        let text = String::from_utf8(out).unwrap();
        let parsed: ErrorMessage = serde_json::from_str(text.trim()).unwrap();
        assert_eq!(parsed.id, "e");
    }
}
