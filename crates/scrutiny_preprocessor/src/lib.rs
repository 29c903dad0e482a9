//! # scrutiny-preprocessor
//!
//! The configuration-splitting preprocessor.
//!
//! From one translation unit this crate enumerates every `#if`-controlled
//! configuration the file must be analyzed under, expands macros, resolves
//! includes, and emits a fully tokenized token list per configuration.
//!
//! ## Pipeline
//!
//! ```text
//! bytes ──▶ normalize::read_code     BOM, newlines, 0xFF sentinel
//!       ──▶ normalize::simplify      trigraphs, splices, comments,
//!       │                            whitespace; suppressions harvested
//!       ──▶ lex::tokenize            classified tokens with provenance
//!       ──▶ directive::uniformize_ifs / create_linkage
//!       ──▶ configuration::Preprocessor::get_configurations
//!               │  macro expansion       (macros)
//!               │  #if reduction         (condition)
//!               │  include / pragma      (include)
//!               ▼
//!          name ─▶ Configuration        one reduced token list each
//! ```
//!
//! Configuration names are part of the external contract: a `;`-separated
//! sorted list of assumed-defined names, each optionally suffixed with
//! `<op><value>`. The empty string is the default configuration.
//!
//! ## Failure model
//!
//! The preprocessor is not standards-conforming and does not try to be:
//! exotic directives reduce to an "unhandled" verdict, which keeps the
//! branch live and surfaces as a debug note rather than a hard failure.
//! Missing includes and configuration-count overflow are information-level
//! diagnostics; only malformed source bytes are `syntaxError`s, and even
//! those keep processing going best-effort.

pub mod condition;
pub mod configuration;
pub mod directive;
pub mod include;
pub mod lex;
pub mod macros;
pub mod normalize;

pub use configuration::{Configuration, PreprocessResult, Preprocessor};
pub use macros::{AnalysisResult, MacroTable, SplitMode};
pub use normalize::{read_code, simplify, InlineSuppression, NormalizeOutput};
