//! Pass timing for `--showtime`.
//!
//! Each worker owns its own [`TimerResults`]; totals merge under the
//! output lock when the worker finishes. No global state, no contention on
//! the hot path.

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Accumulated wall time per named phase.
#[derive(Debug, Default)]
pub struct TimerResults {
    totals: HashMap<String, (Duration, usize)>,
}

impl TimerResults {
    pub fn new() -> Self {
        Self::default()
    }

    /// Times a closure under `name`.
    pub fn time<R>(&mut self, name: &str, f: impl FnOnce() -> R) -> R {
        let start = Instant::now();
        let result = f();
        self.add(name, start.elapsed());
        result
    }

    pub fn add(&mut self, name: &str, elapsed: Duration) {
        let entry = self.totals.entry(name.to_string()).or_default();
        entry.0 += elapsed;
        entry.1 += 1;
    }

    /// Folds another worker's results into this one.
    pub fn merge(&mut self, other: TimerResults) {
        for (name, (elapsed, count)) in other.totals {
            let entry = self.totals.entry(name).or_default();
            entry.0 += elapsed;
            entry.1 += count;
        }
    }

    /// Renders totals sorted by time, slowest first.
    pub fn render(&self) -> String {
        let mut rows: Vec<(&str, Duration, usize)> = self
            .totals
            .iter()
            .map(|(name, (elapsed, count))| (name.as_str(), *elapsed, *count))
            .collect();
        rows.sort_by(|a, b| b.1.cmp(&a.1));
        let mut out = String::new();
        let mut overall = Duration::ZERO;
        for (name, elapsed, count) in rows {
            overall += elapsed;
            let secs = elapsed.as_secs_f64();
            out.push_str(&format!(
                "{}: {:.4}s (avg. {:.4}s - {} result(s))\n",
                name,
                secs,
                secs / count.max(1) as f64,
                count
            ));
        }
        out.push_str(&format!("Overall time: {:.4}s\n", overall.as_secs_f64()));
        out
    }

    pub fn is_empty(&self) -> bool {
        self.totals.is_empty()
    }
}
