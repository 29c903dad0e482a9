//! # scrutiny-base
//!
//! Structural atoms for the scrutiny analyzer.
//!
//! This crate provides the foundational types shared by the preprocessor and
//! the value-flow engine:
//!
//! - [`TokenList`]/[`Token`]/[`TokenId`] — the mutable token graph, owned as
//!   an index arena
//! - [`Interner`]/[`Symbol`] — string interning for O(1) name comparison
//! - [`FileTable`]/[`SourceLocation`] — file/line provenance that survives
//!   token surgery
//! - [`Value`] — abstract values attached to tokens by value-flow analysis
//! - [`ErrorMessage`]/[`ErrorSink`] — structured diagnostics
//!
//! # Design Principles
//!
//! This crate has **no knowledge of preprocessing or analysis semantics**.
//! Tokens here are dumb storage with invariant-preserving surgery operations;
//! the crates above decide what the surgery means.
//!
//! Tokens reference each other through [`TokenId`] indices rather than
//! pointers. A token is owned by exactly one [`TokenList`]; ids from one list
//! must never be used on another, with the single exception of cloned lists,
//! where every id remains valid and denotes the corresponding token in the
//! clone.

pub mod diagnostic;
pub mod intern;
pub mod location;
pub mod list;
pub mod token;
pub mod value;

pub use diagnostic::{Certainty, CollectingSink, ErrorMessage, ErrorSink, PathItem, Severity};
pub use intern::{Interner, Symbol};
pub use location::{FileId, FileTable, SourceLocation};
pub use list::TokenList;
pub use token::{StrEncoding, Token, TokenId, TokenKind};
pub use value::{Bound, LifetimeKind, LifetimeScope, MoveKind, Value, ValueKind, ValuePayload};
