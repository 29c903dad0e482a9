//! # scrutiny-engine
//!
//! The analysis driver: everything between the command line and the core.
//!
//! - [`Settings`] — the full knob surface, serde-loadable from a project
//!   file and assembled by the CLI
//! - [`Suppressions`] — inline and configured diagnostic filtering
//! - [`errorlogger`] — concurrent, deduplicating sinks over the base
//!   [`scrutiny_base::ErrorSink`] contract
//! - [`check`] — the check registry and the per-configuration [`Context`]
//! - [`executor`] — one translation unit per worker, a cancellation
//!   handle, three mutexes in a fixed order
//! - [`timer`] — per-worker pass timing for `--showtime`
//!
//! The pipeline for one translation unit lives in
//! [`executor::analyze_ctu`]: preprocess into configurations, then per
//! configuration build symbols, run value-flow, and invoke every
//! registered check with a borrowed [`Context`].

pub mod check;
pub mod errorlogger;
pub mod executor;
pub mod settings;
pub mod suppressions;
pub mod timer;

pub use check::{builtin_checks, Check, Context, FileInfo};
pub use errorlogger::{ConcurrentSink, TextSink};
pub use executor::{analyze_ctu, Ctu, Executor};
pub use settings::Settings;
pub use suppressions::Suppressions;
