//! # scrutiny-valueflow
//!
//! The value-flow engine: attaches abstract [`Value`]s to tokens by
//! fixed-point iteration over a family of analysis passes.
//!
//! ## How values move
//!
//! There is exactly one way a value reaches a token:
//! [`fold::set_token_value`]. It adds the value to the token's bounded set
//! and, when the token has an AST parent, *folds upward* — combining with
//! the sibling operand's values through the parent operator and recursing.
//! Every pass, forward or reverse, ultimately funnels through it, which is
//! what keeps the per-token invariants (one Known per variant, cap, no
//! Impossible through non-invertible operators) in one place.
//!
//! ## Pass structure
//!
//! [`passes::set_values`] clears all values, runs the literal/alias/
//! lifetime producers once, then loops the mutually-reinforcing passes (up
//! to 4 rounds, stopping early once the total value count stops growing —
//! the count is strictly monotone, so equality is a real fixed point).
//!
//! ## Collaborator contract
//!
//! The engine runs after symbol and AST construction. [`symbols`] provides
//! the minimal implementation of that contract — scopes, var-ids, AST
//! links, function bodies — sufficient for the engine and its tests; a
//! full-language front-end can replace it wholesale as long as it fills
//! the same token fields.

pub mod analyzer;
pub mod condition;
pub mod fold;
pub mod forloop;
pub mod lifetime;
pub mod passes;
pub mod programmemory;
pub mod subfunction;
pub mod symbols;

pub use passes::set_values;
pub use scrutiny_base::{Value, ValueKind, ValuePayload};
pub use symbols::SymbolDatabase;
