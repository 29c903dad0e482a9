//! Structured diagnostics.
//!
//! Every reportable condition — syntax errors, missing includes, too many
//! configurations, checker findings — is an [`ErrorMessage`]: severity,
//! certainty, CWE, a stable id, short and verbose text, and an error path
//! of (location, note) pairs justifying the finding. Records serialize to
//! JSON for machine consumption and render as one-line text for terminals.
//!
//! Reporting funnels through the [`ErrorSink`] trait; the engine provides
//! collecting and deduplicating implementations.

use crate::location::SourceLocation;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Diagnostic severity, ordered from most to least severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Style,
    Performance,
    Portability,
    Information,
    Debug,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Style => "style",
            Severity::Performance => "performance",
            Severity::Portability => "portability",
            Severity::Information => "information",
            Severity::Debug => "debug",
        };
        f.write_str(s)
    }
}

impl Severity {
    /// Parses the `--enable` spelling.
    pub fn parse(s: &str) -> Option<Severity> {
        match s {
            "error" => Some(Severity::Error),
            "warning" => Some(Severity::Warning),
            "style" => Some(Severity::Style),
            "performance" => Some(Severity::Performance),
            "portability" => Some(Severity::Portability),
            "information" => Some(Severity::Information),
            "debug" => Some(Severity::Debug),
            _ => None,
        }
    }
}

/// Whether a finding is certain or derived under unsound assumptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Certainty {
    #[default]
    Safe,
    Inconclusive,
}

/// One step of an error path: where, and what was concluded there.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathItem {
    pub location: SourceLocation,
    pub note: String,
}

/// A structured diagnostic record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorMessage {
    pub severity: Severity,
    pub certainty: Certainty,
    /// CWE number, 0 when none applies.
    pub cwe: u16,
    /// Stable id; part of the external contract (suppressions key on it).
    pub id: String,
    pub message: String,
    /// Longer explanation shown in verbose mode; falls back to `message`.
    pub verbose: String,
    /// Primary location first, derivation steps after.
    pub path: Vec<PathItem>,
}

impl ErrorMessage {
    pub fn new(
        severity: Severity,
        id: impl Into<String>,
        message: impl Into<String>,
        location: Option<SourceLocation>,
    ) -> Self {
        let message = message.into();
        ErrorMessage {
            severity,
            certainty: Certainty::Safe,
            cwe: 0,
            id: id.into(),
            verbose: message.clone(),
            message,
            path: location
                .into_iter()
                .map(|location| PathItem {
                    location,
                    note: String::new(),
                })
                .collect(),
        }
    }

    pub fn with_certainty(mut self, certainty: Certainty) -> Self {
        self.certainty = certainty;
        self
    }

    pub fn with_cwe(mut self, cwe: u16) -> Self {
        self.cwe = cwe;
        self
    }

    pub fn with_verbose(mut self, verbose: impl Into<String>) -> Self {
        self.verbose = verbose.into();
        self
    }

    /// The reporting location (first path entry), if any.
    pub fn location(&self) -> Option<&SourceLocation> {
        self.path.first().map(|p| &p.location)
    }

    /// One-line terminal rendering:
    /// `[file:line]: (severity) message [id]`.
    pub fn text(&self) -> String {
        let mut out = String::new();
        if let Some(loc) = self.location() {
            out.push_str(&loc.to_string());
            out.push_str(": ");
        }
        out.push_str(&format!("({}) {} [{}]", self.severity, self.message, self.id));
        out
    }
}

impl fmt::Display for ErrorMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text())
    }
}

/// Where diagnostics go. Implementations must be safe to call from worker
/// threads; the engine serializes concurrent reports through one mutex.
pub trait ErrorSink: Send {
    fn report(&mut self, msg: ErrorMessage);

    /// Progress pulse, once per finished translation unit.
    fn report_progress(&mut self, _finished: usize, _total: usize) {}
}

/// Sink that stores everything, for tests and for the JSON output mode.
#[derive(Debug, Default)]
pub struct CollectingSink {
    pub messages: Vec<ErrorMessage>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ids(&self) -> Vec<&str> {
        self.messages.iter().map(|m| m.id.as_str()).collect()
    }

    pub fn count_severity(&self, severity: Severity) -> usize {
        self.messages.iter().filter(|m| m.severity == severity).count()
    }
}

impl ErrorSink for CollectingSink {
    fn report(&mut self, msg: ErrorMessage) {
        self.messages.push(msg);
    }
}
