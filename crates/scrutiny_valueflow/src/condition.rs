//! Condition shapes and the condition-driven passes.
//!
//! [`parse_condition`] recognizes the testable shapes — `var <op> num`,
//! `num <op> var`, bare `var`, `! var`, and same-variable `&&`/`||`
//! chains — and yields the values each branch implies. Ranges are encoded
//! by complement: an `Impossible` value with [`Bound::Upper`] at *n* rules
//! out everything above *n* (so the variable is ≤ n), with
//! [`Bound::Lower`] everything below, and with [`Bound::Point`] exactly
//! *n*.
//!
//! The passes built on it:
//!
//! - **after-condition** injects the branch values into the then/else
//!   bodies, and past the whole construct when the opposite branch
//!   provably exits,
//! - **terminating-condition** handles the `if (cond) return;` shape with
//!   no else,
//! - **before-condition** pushes the tested value backwards to earlier
//!   reads,
//! - **opposite-condition** marks an `else if` repeating its sibling's
//!   condition — syntactically true, yet dead under the enclosing else,
//! - **infer-condition** turns accumulated Impossible ranges into Known
//!   comparison results.

use crate::analyzer::{condition_root, forward, reverse, Analyzer};
use crate::fold::set_token_value;
use crate::programmemory::int_literal;
use crate::symbols::{same_expression, SymbolDatabase};
use scrutiny_base::{Bound, TokenId, TokenList, Value, ValueKind, ValuePayload};

/// A recognized condition and what each branch implies.
#[derive(Debug, Clone)]
pub struct Condition {
    /// The variable token the condition constrains.
    pub vartok: TokenId,
    /// The condition's AST root (the back-pointer stored on values).
    pub root: TokenId,
    /// Values that hold when the condition is true.
    pub true_values: Vec<Value>,
    /// Values that hold when the condition is false.
    pub false_values: Vec<Value>,
    /// The shape was negated (`!x`).
    pub inverted: bool,
}

/// Recognizes the condition rooted at `root`. See the module docs.
pub fn parse_condition(list: &TokenList, root: TokenId) -> Option<Condition> {
    parse_condition_inner(list, root, false)
}

fn parse_condition_inner(list: &TokenList, root: TokenId, negated: bool) -> Option<Condition> {
    let t = list.tok(root);
    let text = list.str(root);

    if text == "!" && t.ast_op2.is_none() {
        let mut cond = parse_condition_inner(list, t.ast_op1?, !negated)?;
        cond.inverted = true;
        cond.root = root;
        return Some(cond);
    }

    if matches!(text, "&&" | "||") {
        // Same-variable chains: the deciding side is usable.
        let lhs = parse_condition_inner(list, t.ast_op1?, negated)?;
        let rhs = parse_condition_inner(list, t.ast_op2?, negated)?;
        if list.tok(lhs.vartok).var_id != list.tok(rhs.vartok).var_id {
            return None;
        }
        let conjunction = (text == "&&") != negated;
        let (mut true_values, mut false_values) = if conjunction {
            // Both constraints hold when true; an unknown one failed when
            // false.
            let mut tv = lhs.true_values.clone();
            tv.extend(rhs.true_values.clone());
            (tv, Vec::new())
        } else {
            let mut fv = lhs.false_values.clone();
            fv.extend(rhs.false_values.clone());
            (Vec::new(), fv)
        };
        retag(&mut true_values, root);
        retag(&mut false_values, root);
        return Some(Condition {
            vartok: lhs.vartok,
            root,
            true_values,
            false_values,
            inverted: false,
        });
    }

    if t.is_comparison_op() {
        let (op1, op2) = (t.ast_op1?, t.ast_op2?);
        let (vartok, num, op) = if list.tok(op1).var_id != 0 {
            (op1, int_literal(list.str(op2))?, text.to_string())
        } else if list.tok(op2).var_id != 0 {
            (op2, int_literal(list.str(op1))?, flip(text)?.to_string())
        } else {
            return None;
        };
        let op = if negated { negate(&op)? } else { op };
        let (true_values, false_values) = comparison_values(&op, num, root)?;
        return Some(Condition {
            vartok,
            root,
            true_values,
            false_values,
            inverted: negated,
        });
    }

    if t.var_id != 0 {
        // Bare truth test.
        let mut nonzero = Value::impossible_int(0, Bound::Point);
        nonzero.condition = Some(root);
        let mut zero = Value::int(0);
        zero.condition = Some(root);
        let (true_values, false_values) = if negated {
            (vec![zero], vec![nonzero])
        } else {
            (vec![nonzero], vec![zero])
        };
        return Some(Condition {
            vartok: root,
            root,
            true_values,
            false_values,
            inverted: negated,
        });
    }

    None
}

fn retag(values: &mut [Value], root: TokenId) {
    for v in values.iter_mut() {
        v.condition = Some(root);
    }
}

fn flip(op: &str) -> Option<&'static str> {
    Some(match op {
        "==" => "==",
        "!=" => "!=",
        "<" => ">",
        "<=" => ">=",
        ">" => "<",
        ">=" => "<=",
        _ => return None,
    })
}

fn negate(op: &str) -> Option<String> {
    Some(
        match op {
            "==" => "!=",
            "!=" => "==",
            "<" => ">=",
            "<=" => ">",
            ">" => "<=",
            ">=" => "<",
            _ => return None,
        }
        .to_string(),
    )
}

/// The value pairs implied by `var <op> num`.
fn comparison_values(op: &str, num: i64, root: TokenId) -> Option<(Vec<Value>, Vec<Value>)> {
    let mk = |payload: Value| {
        let mut v = payload;
        v.condition = Some(root);
        v
    };
    let point = |n: i64| mk(Value::int(n));
    let not_point = |n: i64| mk(Value::impossible_int(n, Bound::Point));
    let at_most = |n: i64| mk(Value::impossible_int(n, Bound::Upper));
    let at_least = |n: i64| mk(Value::impossible_int(n, Bound::Lower));

    Some(match op {
        "==" => (vec![point(num)], vec![not_point(num)]),
        "!=" => (vec![not_point(num)], vec![point(num)]),
        "<" => (
            vec![at_most(num.checked_sub(1)?)],
            vec![at_least(num)],
        ),
        "<=" => (
            vec![at_most(num)],
            vec![at_least(num.checked_add(1)?)],
        ),
        ">" => (
            vec![at_least(num.checked_add(1)?)],
            vec![at_most(num)],
        ),
        ">=" => (
            vec![at_least(num)],
            vec![at_most(num.checked_sub(1)?)],
        ),
        _ => return None,
    })
}

// ---------------------------------------------------------------------------
// Condition geometry
// ---------------------------------------------------------------------------

/// One `if` construct: condition root, branch ranges, the join point.
pub struct IfConstruct {
    pub if_tok: TokenId,
    pub cond_root: TokenId,
    pub then_range: (TokenId, TokenId),
    pub else_range: Option<(TokenId, TokenId)>,
    pub after: Option<TokenId>,
}

/// Finds every braced `if` in the list.
pub fn if_constructs(list: &TokenList) -> Vec<IfConstruct> {
    let mut out = Vec::new();
    let mut cur = list.front();
    while let Some(id) = cur {
        cur = list.next(id);
        if list.str(id) != "if" {
            continue;
        }
        let Some(lparen) = list.next(id).filter(|t| list.str(*t) == "(") else {
            continue;
        };
        let Some(rparen) = list.link(lparen) else { continue };
        let Some(cond_root) = condition_root(list, lparen, rparen) else {
            continue;
        };
        let Some(then_open) = list.next(rparen).filter(|t| list.str(*t) == "{") else {
            continue;
        };
        let Some(then_close) = list.link(then_open) else { continue };
        let mut after = list.next(then_close);
        let mut else_range = None;
        if after.map(|t| list.str(t)) == Some("else") {
            let else_tok = after.unwrap();
            if let Some(else_open) = list.next(else_tok).filter(|t| list.str(*t) == "{") {
                if let Some(else_close) = list.link(else_open) {
                    else_range = Some((else_open, else_close));
                    after = list.next(else_close);
                }
            } else {
                // `else if` chains are visited at their own `if`.
                after = None;
            }
        }
        out.push(IfConstruct {
            if_tok: id,
            cond_root,
            then_range: (then_open, then_close),
            else_range,
            after,
        });
    }
    out
}

/// Whether the branch provably leaves the enclosing scope on every path:
/// its trailing statement is `return`/`break`/`continue`/`goto`/`throw`.
pub fn branch_exits(list: &TokenList, open: TokenId, close: TokenId) -> bool {
    // Find the start of the last statement in the block.
    let mut last_start: Option<TokenId> = None;
    let mut stmt_start: Option<TokenId> = None;
    let mut cur = list.next(open);
    let mut depth = 0i32;
    while let Some(id) = cur {
        if id == close {
            break;
        }
        match list.str(id) {
            "{" | "(" | "[" => depth += 1,
            "}" | ")" | "]" => depth -= 1,
            _ => {}
        }
        if depth == 0 {
            if stmt_start.is_none() {
                stmt_start = Some(id);
            }
            if list.str(id) == ";" {
                last_start = stmt_start;
                stmt_start = None;
            }
        }
        cur = list.next(id);
    }
    last_start
        .map(|s| matches!(list.str(s), "return" | "break" | "continue" | "goto" | "throw"))
        .unwrap_or(false)
}

// ---------------------------------------------------------------------------
// Passes
// ---------------------------------------------------------------------------

/// After-condition: inject branch values into the bodies, and past the
/// construct when the opposite branch cannot fall through.
pub fn valueflow_after_condition(list: &mut TokenList, symbols: &SymbolDatabase) {
    for construct in if_constructs(list) {
        let Some(cond) = parse_condition(list, construct.cond_root) else {
            continue;
        };
        let var_id = list.tok(cond.vartok).var_id;
        if var_id == 0 {
            continue;
        }

        let (then_open, then_close) = construct.then_range;
        let then_exits = branch_exits(list, then_open, then_close);
        let else_exits = construct
            .else_range
            .map(|(open, close)| branch_exits(list, open, close))
            .unwrap_or(false);

        if !cond.true_values.is_empty() {
            let stop = list.next(then_close);
            let mut analyzer = Analyzer::variable(var_id, cond.true_values.clone());
            analyzer.assume(list, construct.cond_root, true);
            forward(list, symbols, then_open, stop, &mut analyzer);
        }
        if let Some((else_open, else_close)) = construct.else_range {
            if !cond.false_values.is_empty() {
                let stop = list.next(else_close);
                let mut analyzer = Analyzer::variable(var_id, cond.false_values.clone());
                analyzer.assume(list, construct.cond_root, false);
                forward(list, symbols, else_open, stop, &mut analyzer);
            }
        }

        // A dead branch lets the opposite values continue past the chain.
        if let Some(after) = construct.after {
            let stop = crate::lifetime::enclosing_scope_end(list, after);
            if then_exits && !cond.false_values.is_empty() {
                let mut analyzer = Analyzer::variable(var_id, known_after(&cond.false_values));
                forward(list, symbols, after, stop, &mut analyzer);
            } else if else_exits && !cond.true_values.is_empty() {
                let mut analyzer = Analyzer::variable(var_id, known_after(&cond.true_values));
                forward(list, symbols, after, stop, &mut analyzer);
            }
        }
    }
}

/// Past a dead opposite branch the values hold on every surviving path.
fn known_after(values: &[Value]) -> Vec<Value> {
    values
        .iter()
        .cloned()
        .map(|mut v| {
            if v.kind == ValueKind::Possible {
                v.kind = ValueKind::Known;
            }
            v
        })
        .collect()
}

/// Terminating condition: `if (cond) return;` with no else — the negated
/// condition holds below.
pub fn valueflow_terminating_condition(list: &mut TokenList, symbols: &SymbolDatabase) {
    for construct in if_constructs(list) {
        if construct.else_range.is_some() {
            continue;
        }
        let (then_open, then_close) = construct.then_range;
        if !branch_exits(list, then_open, then_close) {
            continue;
        }
        let Some(cond) = parse_condition(list, construct.cond_root) else {
            continue;
        };
        let var_id = list.tok(cond.vartok).var_id;
        if var_id == 0 || cond.false_values.is_empty() {
            continue;
        }
        if let Some(after) = construct.after {
            let stop = crate::lifetime::enclosing_scope_end(list, after);
            let mut analyzer = Analyzer::variable(var_id, known_after(&cond.false_values));
            forward(list, symbols, after, stop, &mut analyzer);
        }
    }
}

/// Before-condition: the tested value reaches backwards to earlier reads.
pub fn valueflow_before_condition(list: &mut TokenList, symbols: &SymbolDatabase) {
    for construct in if_constructs(list) {
        let Some(cond) = parse_condition(list, construct.cond_root) else {
            continue;
        };
        let var_id = list.tok(cond.vartok).var_id;
        if var_id == 0 {
            continue;
        }
        // Only point conditions give a concrete value to carry back.
        let point = cond
            .true_values
            .iter()
            .chain(cond.false_values.iter())
            .find(|v| v.is_possible() && v.is_int());
        let Some(point) = point else { continue };
        let mut v = point.clone();
        v.push_path(
            construct.cond_root,
            format!("Assuming that condition '{}' is not redundant", render(list, construct.cond_root)),
        );
        let mut analyzer = Analyzer::variable(var_id, vec![v]);
        reverse(list, symbols, construct.if_tok, &mut analyzer);
    }
}

/// Renders a condition subtree compactly for error paths.
fn render(list: &TokenList, root: TokenId) -> String {
    let t = list.tok(root);
    match (t.ast_op1, t.ast_op2) {
        (Some(op1), Some(op2)) => format!(
            "{}{}{}",
            render(list, op1),
            list.str(root),
            render(list, op2)
        ),
        (Some(op1), None) => format!("{}{}", list.str(root), render(list, op1)),
        _ => list.str(root).to_string(),
    }
}

/// Opposite-condition: an `else if` repeating its sibling's condition is
/// syntactically true yet dead; mark it Known so checkers can flag it.
pub fn valueflow_opposite_condition(list: &mut TokenList, symbols: &SymbolDatabase) {
    let constructs = if_constructs(list);
    for construct in &constructs {
        // `} else if (...)` — locate the sibling if.
        let (_, then_close) = construct.then_range;
        let Some(else_tok) = list.next(then_close).filter(|t| list.str(*t) == "else") else {
            continue;
        };
        let Some(second_if) = list.next(else_tok).filter(|t| list.str(*t) == "if") else {
            continue;
        };
        let Some(lparen) = list.next(second_if).filter(|t| list.str(*t) == "(") else {
            continue;
        };
        let Some(rparen) = list.link(lparen) else { continue };
        let Some(second_root) = condition_root(list, lparen, rparen) else {
            continue;
        };
        if same_expression(list, construct.cond_root, second_root) {
            let mut v = Value::known_int(1);
            v.condition = Some(construct.cond_root);
            set_token_value(list, symbols, second_root, v);
        }
    }
}

/// Infer-condition: fold comparisons against accumulated Impossible
/// ranges into Known results.
pub fn valueflow_infer_condition(list: &mut TokenList, symbols: &SymbolDatabase) {
    let comparisons: Vec<TokenId> = list
        .iter()
        .filter(|&id| list.tok(id).is_comparison_op())
        .collect();
    for cmp in comparisons {
        if list.tok(cmp).known_int_value().is_some() {
            continue;
        }
        let (Some(op1), Some(op2)) = (list.tok(cmp).ast_op1, list.tok(cmp).ast_op2) else {
            continue;
        };
        let (subject, limit, op) = if let Some(n) = list.tok(op2).known_int_value() {
            (op1, n, list.str(cmp).to_string())
        } else if let Some(n) = list.tok(op1).known_int_value() {
            let Some(flipped) = flip(list.str(cmp)) else { continue };
            (op2, n, flipped.to_string())
        } else {
            continue;
        };

        let bounds = range_of(&list.tok(subject).values);
        let Some(result) = infer(&op, limit, bounds) else {
            continue;
        };
        let mut v = Value::known_int(i64::from(result));
        v.condition = list
            .tok(subject)
            .values
            .iter()
            .find_map(|x| x.condition);
        set_token_value(list, symbols, cmp, v);
    }
}

/// (min, max, excluded point) derived from Impossible values.
fn range_of(values: &[Value]) -> (Option<i64>, Option<i64>, Option<i64>) {
    let mut min = None;
    let mut max = None;
    let mut excluded = None;
    for v in values {
        if !v.is_impossible() {
            continue;
        }
        let ValuePayload::Int(n) = v.payload else { continue };
        match v.bound {
            Bound::Lower => min = Some(min.map_or(n, |m: i64| m.max(n))),
            Bound::Upper => max = Some(max.map_or(n, |m: i64| m.min(n))),
            Bound::Point => excluded = Some(n),
        }
    }
    (min, max, excluded)
}

fn infer(op: &str, limit: i64, bounds: (Option<i64>, Option<i64>, Option<i64>)) -> Option<bool> {
    let (min, max, excluded) = bounds;
    match op {
        ">" => {
            if let Some(min) = min {
                if min > limit {
                    return Some(true);
                }
            }
            if let Some(max) = max {
                if max <= limit {
                    return Some(false);
                }
            }
            None
        }
        ">=" => {
            if let Some(min) = min {
                if min >= limit {
                    return Some(true);
                }
            }
            if let Some(max) = max {
                if max < limit {
                    return Some(false);
                }
            }
            None
        }
        "<" => {
            if let Some(max) = max {
                if max < limit {
                    return Some(true);
                }
            }
            if let Some(min) = min {
                if min >= limit {
                    return Some(false);
                }
            }
            None
        }
        "<=" => {
            if let Some(max) = max {
                if max <= limit {
                    return Some(true);
                }
            }
            if let Some(min) = min {
                if min > limit {
                    return Some(false);
                }
            }
            None
        }
        "==" => {
            if excluded == Some(limit) {
                return Some(false);
            }
            if let Some(min) = min {
                if min > limit {
                    return Some(false);
                }
            }
            if let Some(max) = max {
                if max < limit {
                    return Some(false);
                }
            }
            None
        }
        "!=" => {
            if excluded == Some(limit) {
                return Some(true);
            }
            if let Some(min) = min {
                if min > limit {
                    return Some(true);
                }
            }
            if let Some(max) = max {
                if max < limit {
                    return Some(true);
                }
            }
            None
        }
        _ => None,
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

    fn find(list: &TokenList, text: &str) -> TokenId {
        list.iter().find(|&id| list.str(id) == text).unwrap()
    }

    fn possible_ints(list: &TokenList, tok: TokenId) -> Vec<i64> {
        let mut out: Vec<i64> = list
            .tok(tok)
            .values
            .iter()
            .filter(|v| !v.is_impossible())
            .filter_map(Value::int_value)
            .collect();
        out.sort_unstable();
        out
    }

    #[test]
    fn equality_condition_shapes() {
        let (list, _db) = prepare("int x ; if ( x == 5 ) { }");
        let cond = parse_condition(&list, find(&list, "==")).unwrap();
        assert_eq!(cond.true_values.len(), 1);
        assert_eq!(cond.true_values[0].int_value(), Some(5));
        assert!(cond.true_values[0].is_possible());
        assert!(cond.false_values[0].is_impossible());
        assert_eq!(cond.false_values[0].bound, Bound::Point);
    }

    #[test]
    fn relational_condition_encodes_ranges() {
        let (list, _db) = prepare("int x ; if ( x > 5 ) { }");
        let cond = parse_condition(&list, find(&list, ">")).unwrap();
        // true: below 6 impossible; false: above 5 impossible.
        assert_eq!(cond.true_values[0].int_value(), Some(6));
        assert_eq!(cond.true_values[0].bound, Bound::Lower);
        assert_eq!(cond.false_values[0].int_value(), Some(5));
        assert_eq!(cond.false_values[0].bound, Bound::Upper);
    }

    #[test]
    fn flipped_operands_normalize() {
        let (list, _db) = prepare("int x ; if ( 5 <= x ) { }");
        let cond = parse_condition(&list, find(&list, "<=")).unwrap();
        // 5 <= x  ⇔  x >= 5.
        assert_eq!(cond.true_values[0].int_value(), Some(5));
        assert_eq!(cond.true_values[0].bound, Bound::Lower);
    }

    #[test]
    fn negated_truth_test() {
        let (list, _db) = prepare("int x ; if ( ! x ) { }");
        let bang = find(&list, "!");
        let cond = parse_condition(&list, bang).unwrap();
        assert!(cond.inverted);
        assert_eq!(cond.true_values[0].int_value(), Some(0));
        assert!(!cond.true_values[0].is_impossible());
    }

    #[test]
    fn after_condition_injects_then_value() {
        let (mut list, db) = prepare("int x ; if ( x == 5 ) { y = x ; }");
        valueflow_after_condition(&mut list, &db);
        let uses: Vec<TokenId> = list.iter().filter(|&id| list.str(id) == "x").collect();
        let body_x = uses[2];
        assert_eq!(possible_ints(&list, body_x), vec![5]);
        assert!(list.tok(body_x).values[0].conditional);
    }

    #[test]
    fn after_condition_injects_else_range() {
        let (mut list, db) = prepare("int x ; if ( x > 5 ) { } else { y = x ; }");
        valueflow_after_condition(&mut list, &db);
        let uses: Vec<TokenId> = list.iter().filter(|&id| list.str(id) == "x").collect();
        let else_x = *uses.last().unwrap();
        let imp: Vec<&Value> = list.tok(else_x).values.iter().filter(|v| v.is_impossible()).collect();
        assert_eq!(imp.len(), 1);
        assert_eq!(imp[0].int_value(), Some(5));
        assert_eq!(imp[0].bound, Bound::Upper);
    }

    #[test]
    fn terminating_condition_propagates_negation() {
        let (mut list, db) = prepare("int x ; if ( x == 0 ) { return ; } y = x ;");
        valueflow_terminating_condition(&mut list, &db);
        let uses: Vec<TokenId> = list.iter().filter(|&id| list.str(id) == "x").collect();
        let after_x = *uses.last().unwrap();
        let imp: Vec<&Value> = list.tok(after_x).values.iter().filter(|v| v.is_impossible()).collect();
        assert_eq!(imp.len(), 1);
        assert_eq!(imp[0].int_value(), Some(0));
    }

    #[test]
    fn before_condition_reaches_earlier_reads() {
        let (mut list, db) = prepare("int x ; x = g ( ) ; a = x ; if ( x == 54 ) { }");
        valueflow_before_condition(&mut list, &db);
        let uses: Vec<TokenId> = list.iter().filter(|&id| list.str(id) == "x").collect();
        // a = x read carries 54 as possible.
        assert_eq!(possible_ints(&list, uses[2]), vec![54]);
    }

    #[test]
    fn opposite_condition_marks_dead_else_if() {
        let (mut list, db) =
            prepare("int a ; if ( a == 1 ) { } else if ( a == 1 ) { here ( ) ; }");
        valueflow_opposite_condition(&mut list, &db);
        let eqs: Vec<TokenId> = list.iter().filter(|&id| list.str(id) == "==").collect();
        assert_eq!(list.tok(eqs[1]).known_int_value(), Some(1));
        assert!(list.tok(eqs[0]).known_int_value().is_none());
    }

    #[test]
    fn infer_from_lower_bound() {
        let (mut list, db) = prepare("int x ; b = x > 2 ;");
        let x_use = list.iter().filter(|&id| list.str(id) == "x").last().unwrap();
        // x is known to be at least 5.
        set_token_value(&mut list, &db, x_use, Value::impossible_int(5, Bound::Lower));
        valueflow_infer_condition(&mut list, &db);
        let gt = find(&list, ">");
        assert_eq!(list.tok(gt).known_int_value(), Some(1));
    }

    #[test]
    fn infer_from_excluded_point() {
        let (mut list, db) = prepare("int x ; b = x != 0 ;");
        let x_use = list.iter().filter(|&id| list.str(id) == "x").last().unwrap();
        set_token_value(&mut list, &db, x_use, Value::impossible_int(0, Bound::Point));
        valueflow_infer_condition(&mut list, &db);
        let ne = find(&list, "!=");
        assert_eq!(list.tok(ne).known_int_value(), Some(1));
    }

    #[test]
    fn infer_stays_silent_without_bounds() {
        let (mut list, db) = prepare("int x ; b = x > 2 ;");
        valueflow_infer_condition(&mut list, &db);
        let gt = find(&list, ">");
        assert!(list.tok(gt).known_int_value().is_none());
    }

    #[test]
    fn and_chain_merges_same_variable() {
        let (list, _db) = prepare("int x ; if ( x > 0 && x < 10 ) { }");
        let and = find(&list, "&&");
        let cond = parse_condition(&list, and).unwrap();
        assert_eq!(cond.true_values.len(), 2);
        assert!(cond.false_values.is_empty());
    }

    #[test]
    fn mixed_variable_chain_is_rejected() {
        let (list, _db) = prepare("int x ; int y ; if ( x > 0 && y < 10 ) { }");
        let and = find(&list, "&&");
        assert!(parse_condition(&list, and).is_none());
    }
}
