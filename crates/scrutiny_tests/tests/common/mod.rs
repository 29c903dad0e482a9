//! E2E test harness.
//!
//! Runs real source text through the whole pipeline — normalizer, lexer,
//! configuration splitter, symbols, value-flow — and exposes small
//! assertion helpers over the result.

#![allow(dead_code)]

use scrutiny_base::{TokenId, TokenList, Value};
use scrutiny_preprocessor::include::MemoryHeaderSearch;
use scrutiny_preprocessor::{PreprocessResult, Preprocessor};
use scrutiny_preprocessor::configuration::PreprocessorSettings;
use scrutiny_valueflow::passes::{set_values, ValueFlowSettings};
use scrutiny_valueflow::SymbolDatabase;
use std::collections::BTreeMap;

/// Preprocesses `code` with default settings and no headers.
pub fn preprocess(code: &str) -> PreprocessResult {
    preprocess_with(code, PreprocessorSettings::default(), MemoryHeaderSearch::new())
}

/// Preprocesses with explicit settings and in-memory headers.
pub fn preprocess_with(
    code: &str,
    settings: PreprocessorSettings,
    headers: MemoryHeaderSearch,
) -> PreprocessResult {
    let preprocessor = Preprocessor::new(settings, &headers);
    preprocessor.preprocess(code.as_bytes(), "test.c")
}

/// Configuration name → stringified token list.
pub fn configurations(code: &str) -> BTreeMap<String, String> {
    let result = preprocess(code);
    result
        .configurations
        .iter()
        .map(|(name, cfg)| (name.clone(), cfg.list.stringify(None, None)))
        .collect()
}

/// Runs the full pipeline on `code` and returns the default
/// configuration's analyzed token list.
pub fn analyze(code: &str) -> (TokenList, SymbolDatabase) {
    let result = preprocess(code);
    let cfg = result
        .configurations
        .get("")
        .expect("default configuration exists");
    let mut list = cfg.list.clone();
    let symbols = SymbolDatabase::build(&mut list);
    set_values(&mut list, &symbols, &ValueFlowSettings::default());
    (list, symbols)
}

/// The `n`-th token with this exact text.
pub fn nth_token(list: &TokenList, text: &str, n: usize) -> TokenId {
    list.iter()
        .filter(|&id| list.str(id) == text)
        .nth(n)
        .unwrap_or_else(|| panic!("no {}-th token '{}'", n, text))
}

/// Sorted non-impossible integer values on a token.
pub fn possible_ints(list: &TokenList, tok: TokenId) -> Vec<i64> {
    let mut out: Vec<i64> = list
        .tok(tok)
        .values
        .iter()
        .filter(|v| !v.is_impossible())
        .filter_map(Value::int_value)
        .collect();
    out.sort_unstable();
    out.dedup();
    out
}
