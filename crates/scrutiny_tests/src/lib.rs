//! Cross-crate end-to-end tests for scrutiny.
//!
//! The tests live in `tests/`; this library is intentionally empty. See
//! `tests/common/mod.rs` for the shared harness.
