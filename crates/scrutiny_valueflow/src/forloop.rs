//! For-loop evaluation: counter ranges and after-loop values.
//!
//! `for (init; cond; step)` with a single induction variable is run to
//! completion by a concrete interpreter over the *header only* (the body
//! must not write the counter — that is checked first). The interpreter
//! caps at 10 000 iterations; loops it cannot finish contribute nothing.
//!
//! Three facts come out of a finished loop:
//!
//! - the counter's first value, injected into the body,
//! - the counter's last value, injected into the body (the two loop
//!   boundaries — intermediate values are deliberately not enumerated),
//! - the exit value, forwarded after the loop (demoted to Possible when
//!   the body contains a `break`).

use crate::analyzer::{forward, Analyzer};
use crate::programmemory::{execute, ProgramMemory};
use crate::symbols::SymbolDatabase;
use scrutiny_base::{TokenId, TokenList, Value};

const MAX_ITERATIONS: usize = 10_000;

/// One parsed `for` construct.
struct ForShape {
    init_root: TokenId,
    cond_root: TokenId,
    step_root: TokenId,
    body: (TokenId, TokenId),
    after: Option<TokenId>,
}

fn for_shape(list: &TokenList, for_tok: TokenId) -> Option<ForShape> {
    let lparen = list.next(for_tok).filter(|t| list.str(*t) == "(")?;
    let rparen = list.link(lparen)?;
    // Split the header on top-level semicolons.
    let mut semis = Vec::new();
    let mut cur = list.next(lparen)?;
    let mut depth = 0i32;
    while cur != rparen {
        match list.str(cur) {
            "(" | "[" => depth += 1,
            ")" | "]" => depth -= 1,
            ";" if depth == 0 => semis.push(cur),
            _ => {}
        }
        cur = list.next(cur)?;
    }
    if semis.len() != 2 {
        return None;
    }
    let init_root = span_root(list, list.next(lparen)?, semis[0])?;
    let cond_root = span_root(list, list.next(semis[0])?, semis[1])?;
    let step_root = span_root(list, list.next(semis[1])?, rparen)?;
    let body_open = list.next(rparen).filter(|t| list.str(*t) == "{")?;
    let body_close = list.link(body_open)?;
    Some(ForShape {
        init_root,
        cond_root,
        step_root,
        body: (body_open, body_close),
        after: list.next(body_close),
    })
}

/// The parentless token of `[start, stop)` — the piece's AST root.
fn span_root(list: &TokenList, start: TokenId, stop: TokenId) -> Option<TokenId> {
    let mut cur = Some(start);
    let mut best = None;
    while let Some(id) = cur {
        if id == stop {
            break;
        }
        let t = list.tok(id);
        if t.ast_parent.is_none() && (t.ast_op1.is_some() || best.is_none()) {
            best = Some(id);
        }
        cur = list.next(id);
    }
    best
}

/// The single variable the init assigns, or None.
fn induction_variable(list: &TokenList, init_root: TokenId) -> Option<u32> {
    if list.str(init_root) != "=" {
        return None;
    }
    let lhs = list.tok(init_root).ast_op1?;
    let var = list.tok(lhs).var_id;
    if var == 0 {
        None
    } else {
        Some(var)
    }
}

/// Interprets the loop header to completion. Returns (first, last, exit).
/// `last` is None when the body never runs.
fn run_header(
    list: &TokenList,
    symbols: &SymbolDatabase,
    shape: &ForShape,
    var: u32,
) -> Option<(i64, Option<i64>, i64)> {
    let mut pm = ProgramMemory::new();
    execute(list, symbols, &mut pm, shape.init_root)?;
    let first = pm.get_int(var)?;
    let mut last = None;
    for _ in 0..MAX_ITERATIONS {
        let cond = execute(list, symbols, &mut pm.clone(), shape.cond_root)?;
        if cond == 0 {
            return Some((first, last, pm.get_int(var)?));
        }
        last = Some(pm.get_int(var)?);
        execute(list, symbols, &mut pm, shape.step_root)?;
    }
    None
}

fn body_contains_break(list: &TokenList, open: TokenId, close: TokenId) -> bool {
    let mut cur = list.next(open);
    while let Some(id) = cur {
        if id == close {
            return false;
        }
        if matches!(list.str(id), "break" | "goto") {
            return true;
        }
        cur = list.next(id);
    }
    false
}

/// Does the body write the counter?
fn body_writes_counter(
    list: &TokenList,
    symbols: &SymbolDatabase,
    open: TokenId,
    close: TokenId,
    var: u32,
) -> bool {
    let probe = Analyzer::variable(var, vec![Value::int(0)]);
    let mut cur = Some(open);
    while let Some(id) = cur {
        if id == close {
            break;
        }
        let action = probe.analyze(list, symbols, id);
        if action.contains(crate::analyzer::Action::WRITE)
            || action.contains(crate::analyzer::Action::INVALID)
        {
            return true;
        }
        cur = list.next(id);
    }
    false
}

/// The for-loop pass.
pub fn valueflow_for_loop(list: &mut TokenList, symbols: &SymbolDatabase) {
    let for_tokens: Vec<TokenId> = list
        .iter()
        .filter(|&id| list.str(id) == "for")
        .collect();

    for for_tok in for_tokens {
        let Some(shape) = for_shape(list, for_tok) else { continue };
        let Some(var) = induction_variable(list, shape.init_root) else {
            continue;
        };
        let (body_open, body_close) = shape.body;
        if body_writes_counter(list, symbols, body_open, body_close, var) {
            log::debug!("for-loop counter is written inside the body; skipping");
            continue;
        }
        let Some((first, last, exit)) = run_header(list, symbols, &shape, var) else {
            log::debug!("for-loop header is not interpretable; skipping");
            continue;
        };

        // Loop boundaries into the body.
        if let Some(last) = last {
            let mut boundary = vec![Value::int(first)];
            if last != first {
                boundary.push(Value::int(last));
            }
            for v in boundary.iter_mut() {
                v.push_path(for_tok, format!("Loop counter starts at {}", first));
            }
            let stop = list.next(body_close);
            let mut analyzer = Analyzer::variable(var, boundary);
            forward(list, symbols, body_open, stop, &mut analyzer);
        }

        // Exit value past the loop.
        if let Some(after) = shape.after {
            let mut v = if body_contains_break(list, body_open, body_close) {
                Value::int(exit)
            } else {
                Value::known_int(exit)
            };
            v.push_path(for_tok, format!("After the loop, value is {}", exit));
            let stop = crate::lifetime::enclosing_scope_end(list, after);
            let mut analyzer = Analyzer::variable(var, vec![v]);
            forward(list, symbols, after, stop, &mut analyzer);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scrutiny_base::list::{classify, Language};
    use scrutiny_base::Token;

    fn prepare(code: &str) -> (TokenList, SymbolDatabase) {
        let mut list = TokenList::new(Language::Cpp);
        let file = list.add_file("test.cpp");
        for word in code.split_whitespace() {
            list.push(Token::new(word, classify(word), file, 1));
        }
        let db = SymbolDatabase::build(&mut list);
        (list, db)
    }

    fn ints(list: &TokenList, tok: TokenId) -> Vec<i64> {
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

    #[test]
    fn counter_boundaries_reach_the_body() {
        let (mut list, db) =
            prepare("void f ( ) { for ( int i = 0 ; i < 10 ; ++ i ) { use ( i ) ; } }");
        valueflow_for_loop(&mut list, &db);
        let i_use = list
            .iter()
            .filter(|&id| list.str(id) == "i")
            .nth(3)
            .unwrap();
        assert_eq!(ints(&list, i_use), vec![0, 9]);
    }

    #[test]
    fn exit_value_reaches_past_the_loop() {
        let (mut list, db) =
            prepare("void f ( ) { int i ; for ( i = 0 ; i < 10 ; ++ i ) { } y = i ; }");
        valueflow_for_loop(&mut list, &db);
        let i_after = list
            .iter()
            .filter(|&id| list.str(id) == "i")
            .last()
            .unwrap();
        assert_eq!(ints(&list, i_after), vec![10]);
        assert!(list.tok(i_after).values.iter().any(|v| v.is_known()));
    }

    #[test]
    fn stepped_loop_computes_real_boundaries() {
        let (mut list, db) =
            prepare("void f ( ) { for ( int i = 1 ; i <= 7 ; i += 3 ) { use ( i ) ; } y ( ) ; }");
        valueflow_for_loop(&mut list, &db);
        let i_use = list
            .iter()
            .filter(|&id| list.str(id) == "i")
            .nth(3)
            .unwrap();
        assert_eq!(ints(&list, i_use), vec![1, 7]);
    }

    #[test]
    fn never_entered_loop_only_forwards_exit() {
        let (mut list, db) =
            prepare("void f ( ) { int i ; for ( i = 5 ; i < 3 ; ++ i ) { use ( i ) ; } y = i ; }");
        valueflow_for_loop(&mut list, &db);
        let body_i = list
            .iter()
            .filter(|&id| list.str(id) == "i")
            .nth(4)
            .unwrap();
        assert!(ints(&list, body_i).is_empty());
        let after_i = list
            .iter()
            .filter(|&id| list.str(id) == "i")
            .last()
            .unwrap();
        assert_eq!(ints(&list, after_i), vec![5]);
    }

    #[test]
    fn break_demotes_exit_value() {
        let (mut list, db) = prepare(
            "void f ( ) { int i ; for ( i = 0 ; i < 10 ; ++ i ) { if ( g ( ) ) { break ; } } y = i ; }",
        );
        valueflow_for_loop(&mut list, &db);
        let after_i = list
            .iter()
            .filter(|&id| list.str(id) == "i")
            .last()
            .unwrap();
        assert!(list.tok(after_i).values.iter().all(|v| v.is_possible()));
    }

    #[test]
    fn written_counter_is_skipped() {
        let (mut list, db) = prepare(
            "void f ( ) { for ( int i = 0 ; i < 10 ; ++ i ) { i = g ( ) ; } }",
        );
        valueflow_for_loop(&mut list, &db);
        let body_i = list
            .iter()
            .filter(|&id| list.str(id) == "i")
            .nth(3)
            .unwrap();
        assert!(ints(&list, body_i).is_empty());
    }

    #[test]
    fn uninterpretable_header_is_skipped() {
        let (mut list, db) =
            prepare("void f ( ) { for ( int i = g ( ) ; i < n ; ++ i ) { use ( i ) ; } }");
        valueflow_for_loop(&mut list, &db);
        let body_i = list
            .iter()
            .filter(|&id| list.str(id) == "i")
            .nth(3)
            .unwrap();
        assert!(ints(&list, body_i).is_empty());
    }
}
