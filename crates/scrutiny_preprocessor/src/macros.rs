//! The per-configuration macro table and in-place macro expansion.
//!
//! ## Replacement-text encoding
//!
//! A definition is stored as one string whose first character tells the
//! macro's shape:
//!
//! - object-like: the body, preceded by one space (`" 1 + 2"`); an empty
//!   string is an empty object-like macro,
//! - function-like: the parameter list and body verbatim, starting with
//!   `(` (`"( x , y ) x + y"`),
//! - assumed predicate: a comparison carried over from a configuration
//!   split (`">=3"`, `"!=0"`); predicates have no body and never expand.
//!
//! ## Expansion
//!
//! [`replace_macro`] rewrites an invocation in place. Every produced token
//! is flagged `expanded_macro`, and produced names are expanded recursively
//! — except names already on the expansion stack that produced them, which
//! breaks `#define A A` style cycles. Function-like expansion binds
//! arguments positionally (with a variadic tail), applies `#`
//! stringification and `##` concatenation during substitution, and fails
//! soft on malformed invocations: the source is left unchanged.

use crate::lex;
use scrutiny_base::list::Language;
use scrutiny_base::{Token, TokenId, TokenKind, TokenList};
use std::collections::{BTreeMap, BTreeSet, HashSet};

/// Verdict of querying a name against a configuration's macro state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisResult {
    /// Cannot reduce the predicate; treat the branch as live.
    Unhandled,
    /// State unfixed; a configuration split is needed.
    New,
    /// Defined (or assumed defined) compatibly.
    Known,
    /// Incompatible with this configuration; the branch is dead.
    Conflict,
}

/// How unfixed names resolve. Pre-defining macros without pre-undefining
/// any pins every unknown name to "defined", and vice versa; otherwise
/// unknown names split the configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SplitMode {
    #[default]
    AllowSplit,
    AllDefined,
    AllUndefined,
}

/// Macro state of one configuration: what is known defined/undefined and
/// what this configuration hypothesizes.
#[derive(Debug, Clone, Default)]
pub struct MacroTable {
    /// `#define`d (and `-D`) names with their replacement text.
    pub defs: BTreeMap<String, String>,
    /// Names this configuration assumes defined; the value may be a
    /// comparison predicate when the split arose from an inequality.
    pub assumed_defs: BTreeMap<String, String>,
    /// `#undef`ed (and `-U`) names.
    pub undefs: BTreeSet<String>,
    /// Names this configuration assumes undefined.
    pub assumed_ndefs: BTreeSet<String>,
    /// Files protected by `#pragma once` or a recognized include guard.
    pub included_once: BTreeSet<String>,
}

impl MacroTable {
    /// Classifies `name` against the macro state. Order matters: hard
    /// knowledge (defs/undefs) outranks assumptions.
    pub fn analyze(&self, name: &str, mode: SplitMode) -> AnalysisResult {
        if self.undefs.contains(name) {
            return AnalysisResult::Conflict;
        }
        if self.defs.contains_key(name) {
            return AnalysisResult::Known;
        }
        if self.assumed_ndefs.contains(name) {
            return AnalysisResult::Conflict;
        }
        if self.assumed_defs.contains_key(name) {
            return AnalysisResult::Known;
        }
        match mode {
            SplitMode::AllDefined => AnalysisResult::Known,
            SplitMode::AllUndefined => AnalysisResult::Conflict,
            SplitMode::AllowSplit => AnalysisResult::New,
        }
    }

    /// Inserts a `NAME`, `NAME=value` or `NAME<op>value` entry into `map`.
    pub fn insert_cfg(map: &mut BTreeMap<String, String>, cfg: &str) {
        match cfg.find(['=', '>', '<', '!']) {
            Some(i) if cfg.as_bytes()[i] == b'=' => {
                map.insert(cfg[..i].to_string(), cfg[i + 1..].to_string());
            }
            Some(i) => {
                map.insert(cfg[..i].to_string(), cfg[i..].to_string());
            }
            None => {
                map.insert(cfg.to_string(), String::new());
            }
        }
    }

    /// Applies `-D` style pre-definitions.
    pub fn pre_define(&mut self, defines: &[String]) {
        for d in defines {
            Self::insert_cfg(&mut self.defs, d);
        }
    }

    /// Applies `-U` style pre-undefinitions.
    pub fn pre_undef(&mut self, undefs: &[String]) {
        self.undefs.extend(undefs.iter().cloned());
    }

    /// Canonical configuration name: the sorted assumed-defined entries,
    /// `;`-separated, each `NAME` or `NAME<op><value>`. Part of the
    /// external contract — callers persist these strings.
    pub fn config_name(&self) -> String {
        let mut out = String::new();
        for (name, value) in &self.assumed_defs {
            if !out.is_empty() {
                out.push(';');
            }
            out.push_str(name);
            if !value.is_empty() {
                if !value.starts_with(['<', '>', '!']) {
                    out.push('=');
                }
                out.push_str(value);
            }
        }
        out
    }

    /// The replacement text to expand `name` with, if it has one.
    fn expandable_definition(&self, name: &str) -> Option<&str> {
        let definition = match self.defs.get(name) {
            Some(d) => d,
            None => match self.assumed_defs.get(name) {
                Some(d) if !d.is_empty() => d,
                _ => return None,
            },
        };
        // Comparison predicates (">=3", "!=0", "<5") have no body.
        let bytes = definition.as_bytes();
        if matches!(bytes.first(), Some(b'>') | Some(b'<') | Some(b'!')) {
            let second = bytes.get(1);
            if !matches!(second, Some(b'=') | Some(b' ') | None) {
                return None;
            }
            if second == Some(&b'=') && !matches!(bytes.get(2), Some(b' ') | None) {
                return None;
            }
        }
        Some(definition)
    }
}

/// Outcome of [`replace_macro`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplaceOutcome {
    /// Whether any token was rewritten.
    pub changed: bool,
    /// Where the caller should continue scanning: the first produced token
    /// (flagged `expanded_macro`), or the token after a deleted empty
    /// expansion, or the unchanged token itself.
    pub resume: Option<TokenId>,
}

/// Attempts macro expansion at `tok`. Returns an unchanged outcome when the
/// name has no expandable definition or the invocation is malformed.
pub fn replace_macro(list: &mut TokenList, table: &MacroTable, tok: TokenId) -> ReplaceOutcome {
    let unchanged = ReplaceOutcome {
        changed: false,
        resume: Some(tok),
    };
    if !list.tok(tok).is_name() {
        return unchanged;
    }
    let name = list.str(tok).to_string();
    let Some(definition) = table.expandable_definition(&name).map(str::to_string) else {
        return unchanged;
    };
    let mut active = HashSet::new();
    active.insert(name);
    match expand_inner(list, table, tok, &definition, &active) {
        Some(resume) => ReplaceOutcome {
            changed: true,
            resume,
        },
        None => unchanged,
    }
}

/// Expands one invocation. Returns `None` when nothing could be done
/// (malformed function-like invocation), otherwise the resume point.
fn expand_inner(
    list: &mut TokenList,
    table: &MacroTable,
    tok: TokenId,
    definition: &str,
    active: &HashSet<String>,
) -> Option<Option<TokenId>> {
    if definition.trim().is_empty() {
        // Empty object-like macro: the invocation vanishes.
        let next = list.delete(tok);
        return Some(next);
    }

    let (file, line, lang) = {
        let t = list.tok(tok);
        (t.file, t.line, list.lang())
    };
    let prev = list.prev(tok);

    let body: Vec<Token> = if definition.starts_with('(') {
        let def_toks = lex::tokenize_snippet(definition, file, line, lang);
        let (params, variadic, body_start) = parse_parameter_list(&def_toks)?;
        let (args, rparen) = collect_arguments(list, tok)?;
        if !arity_matches(params.len(), variadic, args.len()) {
            return None;
        }
        let substituted = substitute(&def_toks[body_start..], &params, variadic, &args, file, line);
        // Drop the invocation: name through closing parenthesis.
        let end = list.next(rparen);
        let mut cur = Some(tok);
        while cur.is_some() && cur != end {
            cur = list.delete(cur.unwrap());
        }
        substituted
    } else {
        let text = definition.strip_prefix(' ').unwrap_or(definition);
        list.delete(tok);
        lex::tokenize_snippet(text, file, line, lang)
    };

    let spliced = list.splice_after(prev, mark_expanded(body));
    let Some((first, last)) = spliced else {
        return Some(prev.and_then(|p| list.next(p)).or(list.front()));
    };

    // Recursive expansion over the produced run, refusing names already on
    // the expansion stack.
    let stop = list.next(last);
    let mut cur = Some(first);
    while let Some(id) = cur {
        if cur == stop {
            break;
        }
        let name = list.str(id).to_string();
        if list.tok(id).is_name()
            && !active.contains(&name)
            && table.expandable_definition(&name).is_some()
        {
            let definition = table.expandable_definition(&name).unwrap().to_string();
            let mut inner_active = active.clone();
            inner_active.insert(name);
            if let Some(resume) = expand_inner(list, table, id, &definition, &inner_active) {
                cur = resume;
                continue;
            }
        }
        cur = list.next(id);
    }

    Some(Some(first))
}

fn mark_expanded(toks: Vec<Token>) -> Vec<Token> {
    toks.into_iter()
        .map(|mut t| {
            t.expanded_macro = true;
            t
        })
        .collect()
}

/// Splits a function-like definition's leading `( … )` into parameter names.
/// Returns the names, whether the tail is variadic, and the body's start
/// index within the definition tokens.
fn parse_parameter_list(def_toks: &[Token]) -> Option<(Vec<String>, bool, usize)> {
    let mut params = Vec::new();
    let mut variadic = false;
    let mut i = 1;
    loop {
        let tok = def_toks.get(i)?;
        match tok.str() {
            ")" => return Some((params, variadic, i + 1)),
            "," => i += 1,
            "..." => {
                variadic = true;
                i += 1;
            }
            name => {
                if def_toks.get(i + 1).map(Token::str) == Some("...") {
                    // GNU named variadic: `args...`
                    params.push(name.to_string());
                    variadic = true;
                    i += 2;
                } else {
                    params.push(name.to_string());
                    i += 1;
                }
            }
        }
    }
}

fn arity_matches(params: usize, variadic: bool, args: usize) -> bool {
    if variadic {
        args >= params
    } else {
        args == params || (params == 1 && args == 0)
    }
}

/// A copy of a token fit for re-splicing: chain and link fields cleared so
/// no stale references survive into the new position.
fn detached(tok: &Token) -> Token {
    let mut t = tok.clone();
    t.next = None;
    t.prev = None;
    t.link = None;
    t.ast_parent = None;
    t.ast_op1 = None;
    t.ast_op2 = None;
    t
}

/// Collects the argument token runs of the invocation following `tok`.
/// Fails (None) when the `(` is missing or never closed.
fn collect_arguments(
    list: &TokenList,
    tok: TokenId,
) -> Option<(Vec<Vec<Token>>, TokenId)> {
    let lparen = list.next(tok)?;
    if list.str(lparen) != "(" {
        return None;
    }
    let mut args: Vec<Vec<Token>> = Vec::new();
    let mut current: Vec<Token> = Vec::new();
    let mut depth = 1;
    let mut cur = list.next(lparen)?;
    loop {
        match list.str(cur) {
            "(" => {
                depth += 1;
                current.push(detached(list.tok(cur)));
            }
            ")" => {
                depth -= 1;
                if depth == 0 {
                    if !current.is_empty() || !args.is_empty() {
                        args.push(current);
                    }
                    return Some((args, cur));
                }
                current.push(detached(list.tok(cur)));
            }
            "," if depth == 1 => {
                args.push(std::mem::take(&mut current));
            }
            _ => current.push(detached(list.tok(cur))),
        }
        cur = list.next(cur)?;
    }
}

/// Parameter substitution with `#` and `##` handling.
fn substitute(
    body: &[Token],
    params: &[String],
    variadic: bool,
    args: &[Vec<Token>],
    file: scrutiny_base::FileId,
    line: u32,
) -> Vec<Token> {
    let param_index = |name: &str| params.iter().position(|p| p == name);
    let named_variadic = variadic && !params.is_empty();
    let variadic_tail = |name: &str| -> Option<Vec<Token>> {
        let from = if name == "__VA_ARGS__" {
            params.len()
        } else if named_variadic && Some(params.len() - 1) == param_index(name) {
            params.len() - 1
        } else {
            return None;
        };
        let mut out = Vec::new();
        for (i, arg) in args.iter().enumerate().skip(from) {
            if i > from {
                out.push(Token::new(",", TokenKind::Punct, file, line));
            }
            out.extend(arg.iter().cloned());
        }
        Some(out)
    };

    let mut out: Vec<Token> = Vec::new();
    let mut i = 0;
    while i < body.len() {
        let tok = &body[i];
        if tok.str() == "#" {
            if let Some(next) = body.get(i + 1) {
                if let Some(p) = param_index(next.str()) {
                    out.push(stringify_arg(args.get(p), file, line));
                    i += 2;
                    continue;
                }
            }
        }
        if variadic {
            if let Some(tail) = variadic_tail(tok.str()) {
                out.extend(tail);
                i += 1;
                continue;
            }
        }
        if let Some(p) = param_index(tok.str()) {
            if let Some(arg) = args.get(p) {
                out.extend(arg.iter().cloned());
            }
            i += 1;
            continue;
        }
        out.push(tok.clone());
        i += 1;
    }

    // `##` concatenation over the substituted stream.
    let mut joined: Vec<Token> = Vec::new();
    let mut i = 0;
    while i < out.len() {
        if out[i].str() == "##" && !joined.is_empty() && i + 1 < out.len() {
            let left = joined.pop().unwrap();
            let text = format!("{}{}", left.str(), out[i + 1].str());
            joined.push(Token::new(
                &text,
                scrutiny_base::list::classify(&text),
                file,
                line,
            ));
            i += 2;
            continue;
        }
        joined.push(out[i].clone());
        i += 1;
    }
    joined
}

fn stringify_arg(arg: Option<&Vec<Token>>, file: scrutiny_base::FileId, line: u32) -> Token {
    let mut text = String::from("\"");
    if let Some(arg) = arg {
        for (i, tok) in arg.iter().enumerate() {
            if i > 0 {
                text.push(' ');
            }
            for c in tok.str().chars() {
                if c == '"' || c == '\\' {
                    text.push('\\');
                }
                text.push(c);
            }
        }
    }
    text.push('"');
    Token::new(&text, TokenKind::String, file, line)
}
