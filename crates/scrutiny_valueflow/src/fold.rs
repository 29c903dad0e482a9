//! `set_token_value`: the only way a value reaches a token.
//!
//! Attaching a value does two things. First the token's own bounded,
//! deduplicated set is updated. Then, if the token sits in an expression,
//! the value *folds upward*: for each eligible pair of values on the AST
//! parent's two operands, the parent operator's result is computed and
//! recursively attached to the parent. Literal leaves therefore light up
//! whole constant subtrees without any pass knowing about expressions.
//!
//! ## Eligibility
//!
//! - path tags must agree: equal, or one side unconstrained (0). Values
//!   from different sub-function argument combinations never meet.
//! - Impossible values are withheld from non-invertible operators (`%`,
//!   `/`, `&`, `|`, comparisons, `&&`, `||`) — inverting them there would
//!   manufacture false Known results. Through invertible arithmetic an
//!   Impossible operand needs a Known partner.
//! - two Possible operands only combine when they are witnessed by the
//!   same variable with the same witness value (`x + x` with x∈{1,2} is 2
//!   or 4, never 3).
//!
//! The certainty of a result is the weakest of its inputs; bounds follow
//! the operand that carried them, inverting across a subtraction's right
//! side.

use crate::programmemory::truncate;
use crate::symbols::SymbolDatabase;
use scrutiny_base::{Bound, TokenId, TokenKind, TokenList, Value, ValueKind, ValuePayload};

/// Attaches `value` to `tok` and folds upward. See the module docs.
pub fn set_token_value(
    list: &mut TokenList,
    symbols: &SymbolDatabase,
    tok: TokenId,
    value: Value,
) {
    if !list.tok_mut(tok).add_value(value.clone()) {
        return;
    }
    if value.path < 0 {
        return;
    }
    let Some(parent) = list.tok(tok).ast_parent else {
        return;
    };

    if value.is_container_size() {
        fold_container_size(list, symbols, tok, parent, &value);
        return;
    }

    if value.is_lifetime() {
        // Lifetimes survive pointer arithmetic and casts, nothing else.
        let arithmetical = list.tok(parent).is_arithmetical_op();
        if arithmetical || symbols.casts.contains_key(&parent) {
            set_token_value(list, symbols, parent, value);
        }
        return;
    }

    if value.is_uninit() {
        let mut pvalue = value;
        let parent_str = list.str(parent).to_string();
        let unary = list.tok(parent).ast_op2.is_none();
        if parent_str == "&" && unary {
            pvalue.indirect += 1;
            set_token_value(list, symbols, parent, pvalue);
        } else if parent_str == "*" && unary && pvalue.indirect > 0 {
            pvalue.indirect -= 1;
            set_token_value(list, symbols, parent, pvalue);
        }
        return;
    }

    // Casts truncate to the declared width.
    if let Some(&int_type) = symbols.casts.get(&parent) {
        if let ValuePayload::Int(n) = value.payload {
            let mut cast = value.clone();
            cast.payload = ValuePayload::Int(truncate(n, int_type));
            set_token_value(list, symbols, parent, cast);
        }
        return;
    }

    let parent_str = list.str(parent).to_string();

    if parent_str == ":" {
        // Arm values surface on the `:` node so the `?` can choose.
        set_token_value(list, symbols, parent, value);
        return;
    }

    if parent_str == "?" {
        fold_ternary(list, symbols, tok, parent, &value);
        return;
    }

    let parent_tok = list.tok(parent);
    let is_calc = parent_tok.is_arithmetical_op()
        || parent_tok.is_comparison_op()
        || matches!(parent_tok.kind, TokenKind::BitOp | TokenKind::LogicOp);

    if is_calc {
        if let (Some(op1), Some(op2)) = (parent_tok.ast_op1, parent_tok.ast_op2) {
            fold_binary(list, symbols, parent, &parent_str, op1, op2, &value);
            return;
        }
        // Unary operators.
        if parent_tok.ast_op1 == Some(tok) && parent_tok.ast_op2.is_none() {
            fold_unary(list, symbols, parent, &parent_str, &value);
            return;
        }
    }

    if parent_str == "++" || parent_str == "--" {
        // Prefix form folds; postfix yields the old value elsewhere.
        if let Some(operand) = parent_tok.ast_op1 {
            let prefix = list.next(parent) == Some(operand);
            if prefix && value.is_int() && !value.is_impossible() {
                if let ValuePayload::Int(n) = value.payload {
                    let delta = if parent_str == "++" { 1 } else { -1 };
                    if let Some(result) = n.checked_add(delta) {
                        let mut v = value.clone();
                        v.payload = ValuePayload::Int(result);
                        set_token_value(list, symbols, parent, v);
                    }
                }
            }
        }
        return;
    }

    if parent_str == "[" {
        fold_index(list, symbols, parent, &value);
    }
}

/// `ContainerSize + ContainerSize` and `ContainerSize + "literal"`.
fn fold_container_size(
    list: &mut TokenList,
    symbols: &SymbolDatabase,
    _tok: TokenId,
    parent: TokenId,
    _value: &Value,
) {
    if list.str(parent) != "+" {
        return;
    }
    let (Some(op1), Some(op2)) = (list.tok(parent).ast_op1, list.tok(parent).ast_op2) else {
        return;
    };
    let mut results = Vec::new();
    for v1 in &list.tok(op1).values {
        for v2 in &list.tok(op2).values {
            let Some(path) = combined_path(v1, v2) else { continue };
            let size = match (&v1.payload, &v2.payload) {
                (ValuePayload::ContainerSize(a), ValuePayload::ContainerSize(b)) => a + b,
                (ValuePayload::ContainerSize(a), ValuePayload::Tok(t)) => {
                    match string_length(list, *t) {
                        Some(len) => a + len,
                        None => continue,
                    }
                }
                (ValuePayload::Tok(t), ValuePayload::ContainerSize(b)) => {
                    match string_length(list, *t) {
                        Some(len) => len + b,
                        None => continue,
                    }
                }
                _ => continue,
            };
            let mut result = combine_properties(v1, v2, ValuePayload::ContainerSize(size));
            result.path = path;
            results.push(result);
        }
    }
    for result in results {
        set_token_value(list, symbols, parent, result);
    }
}

/// `cond ? a : b` — values pass through the `:`; the `?` takes an arm's
/// value when the condition is decided, or a conditional copy when the
/// condition hinges on one variable.
fn fold_ternary(
    list: &mut TokenList,
    symbols: &SymbolDatabase,
    tok: TokenId,
    parent: TokenId,
    value: &Value,
) {
    let q = list.tok(parent);
    let (Some(cond), Some(colon)) = (q.ast_op1, q.ast_op2) else {
        return;
    };

    if tok == cond {
        // Condition decided: pull the chosen arm's values up.
        if let ValuePayload::Int(n) = value.payload {
            if value.is_known() {
                let colon_tok = list.tok(colon);
                let arm = if n != 0 { colon_tok.ast_op1 } else { colon_tok.ast_op2 };
                if let Some(arm) = arm {
                    let arm_values = list.tok(arm).values.clone();
                    for v in arm_values {
                        set_token_value(list, symbols, parent, v);
                    }
                }
            }
        }
        return;
    }

    if tok != colon {
        return;
    }

    if let Some(cond_value) = list.tok(cond).known_int_value() {
        let colon_tok = list.tok(colon);
        let arm = if cond_value != 0 { colon_tok.ast_op1 } else { colon_tok.ast_op2 };
        let Some(arm) = arm else { return };
        let belongs = list.tok(arm).values.iter().any(|v| v.same_value(value));
        if belongs {
            set_token_value(list, symbols, parent, value.clone());
        }
        return;
    }

    // Unknown condition: only forward when it hinges on a single variable
    // and the value is not already witnessed by another one.
    let mut cond_var = 0u32;
    if !single_condition_variable(list, cond, &mut cond_var) || value.var_id != 0 {
        return;
    }
    let mut v = value.clone();
    v.make_conditional();
    if cond_var != 0 {
        v.var_id = cond_var;
    }
    set_token_value(list, symbols, parent, v);
}

/// True when the subtree reads exactly one variable and calls nothing.
fn single_condition_variable(list: &TokenList, root: TokenId, var: &mut u32) -> bool {
    let t = list.tok(root);
    if t.var_id != 0 {
        if *var != 0 && *var != t.var_id {
            return false;
        }
        *var = t.var_id;
    }
    if list.str(root) == "(" && t.ast_op1.map(|c| list.tok(c).is_name()).unwrap_or(false) {
        return false; // function call
    }
    for op in [t.ast_op1, t.ast_op2].into_iter().flatten() {
        if !single_condition_variable(list, op, var) {
            return false;
        }
    }
    true
}

fn noninvertible(op: &str, kind: TokenKind) -> bool {
    kind == TokenKind::CompOp
        || kind == TokenKind::LogicOp
        || matches!(op, "%" | "/" | "&" | "|")
}

fn is_computable(op: &str, kind: TokenKind, v: &Value) -> bool {
    if noninvertible(op, kind) && v.is_impossible() {
        return false;
    }
    match v.payload {
        ValuePayload::Int(_) | ValuePayload::Float(_) => true,
        // Strings only compare; iterators only shift by integers.
        ValuePayload::Tok(_) => kind == TokenKind::CompOp,
        ValuePayload::IteratorStart(_) | ValuePayload::IteratorEnd(_) => {
            matches!(op, "+" | "-")
        }
        _ => false,
    }
}

/// Path compatibility: equal, or one side unconstrained.
fn combined_path(v1: &Value, v2: &Value) -> Option<i64> {
    if v1.path == v2.path {
        Some(v1.path)
    } else if v1.path == 0 {
        Some(v2.path)
    } else if v2.path == 0 {
        Some(v1.path)
    } else {
        None
    }
}

/// Metadata combination: weakest certainty wins, bounds follow the
/// non-point operand, witnesses and error paths carry over.
fn combine_properties(v1: &Value, v2: &Value, payload: ValuePayload) -> Value {
    let mut result = Value::new(payload);
    result.kind = if v1.is_impossible() || v2.is_impossible() {
        ValueKind::Impossible
    } else if v1.is_inconclusive() || v2.is_inconclusive() {
        ValueKind::Inconclusive
    } else if v1.is_known() && v2.is_known() {
        ValueKind::Known
    } else {
        ValueKind::Possible
    };
    if v1.bound == Bound::Point || v2.bound == Bound::Point {
        if v1.bound == Bound::Upper || v2.bound == Bound::Upper {
            result.bound = Bound::Upper;
        }
        if v1.bound == Bound::Lower || v2.bound == Bound::Lower {
            result.bound = Bound::Lower;
        }
    }
    result.condition = v1.condition.or(v2.condition);
    result.var_id = if v1.var_id != 0 { v1.var_id } else { v2.var_id };
    result.varvalue = if result.var_id == v1.var_id { v1.varvalue } else { v2.varvalue };
    result.error_path = if v1.error_path.is_empty() {
        v2.error_path.clone()
    } else {
        v1.error_path.clone()
    };
    result.conditional = v1.conditional || v2.conditional;
    result.safe = v1.safe || v2.safe;
    result
}

fn fold_binary(
    list: &mut TokenList,
    symbols: &SymbolDatabase,
    parent: TokenId,
    op: &str,
    op1: TokenId,
    op2: TokenId,
    value: &Value,
) {
    let kind = list.tok(parent).kind;

    if noninvertible(op, kind) && value.is_impossible() {
        return;
    }

    // Deciding operands produce a result regardless of the other side.
    if matches!(op, "&" | "*") && value.is_known() && value.int_value() == Some(0) {
        set_token_value(list, symbols, parent, value.clone());
        return;
    }
    if op == "&&" && value.is_known() && value.int_value() == Some(0) {
        set_token_value(list, symbols, parent, Value::known_int(0));
        return;
    }
    if op == "||" && value.is_known() && value.int_value().map(|n| n != 0).unwrap_or(false) {
        set_token_value(list, symbols, parent, Value::known_int(1));
        return;
    }

    let values1 = list.tok(op1).values.clone();
    let values2 = list.tok(op2).values.clone();
    let mut results = Vec::new();
    for v1 in &values1 {
        if !is_computable(op, kind, v1) {
            continue;
        }
        for v2 in &values2 {
            if !is_computable(op, kind, v2) {
                continue;
            }
            let Some(path) = combined_path(v1, v2) else { continue };
            if v1.is_iterator() && v2.is_iterator() {
                continue;
            }
            // An Impossible operand needs a Known partner to stay sound.
            if (v1.is_impossible() && !v2.is_known()) || (v2.is_impossible() && !v1.is_known()) {
                continue;
            }
            let eligible = v1.is_known()
                || v2.is_known()
                || v1.var_id == 0
                || v2.var_id == 0
                || (v1.var_id == v2.var_id && v1.varvalue == v2.varvalue && v1.is_int() && v2.is_int());
            if !eligible {
                continue;
            }
            if let Some(mut result) = calculate(list, op, v1, v2) {
                result.path = path;
                results.push(result);
            }
        }
    }
    for result in results {
        set_token_value(list, symbols, parent, result);
    }
}

/// The operator algebra over two concrete values.
fn calculate(list: &TokenList, op: &str, v1: &Value, v2: &Value) -> Option<Value> {
    // Iterator arithmetic: shift the position by an integer.
    if v1.is_iterator() || v2.is_iterator() {
        let (iter, int) = if v1.is_iterator() { (v1, v2) } else { (v2, v1) };
        let delta = int.int_value()?;
        let delta = if op == "-" && !v1.is_iterator() { return None } else if op == "-" { -delta } else { delta };
        let payload = match iter.payload {
            ValuePayload::IteratorStart(n) => ValuePayload::IteratorStart(n.checked_add(delta)?),
            ValuePayload::IteratorEnd(n) => ValuePayload::IteratorEnd(n.checked_add(delta)?),
            _ => return None,
        };
        return Some(combine_properties(v1, v2, payload));
    }

    // String literal comparisons against integers: the address is nonzero.
    if v1.is_tok() || v2.is_tok() {
        if !matches!(op, "==" | "!=") {
            return None;
        }
        let (t, other) = if v1.is_tok() { (v1, v2) } else { (v2, v1) };
        if let ValuePayload::Tok(tid) = t.payload {
            if list.tok(tid).kind == TokenKind::String && other.int_value() == Some(0) {
                let result = i64::from(op == "!=");
                return Some(combine_properties(v1, v2, ValuePayload::Int(result)));
            }
        }
        return None;
    }

    let float = v1.is_float() || v2.is_float();
    if float {
        let f1 = float_of(v1)?;
        let f2 = float_of(v2)?;
        let payload = match op {
            "+" => ValuePayload::Float(f1 + f2),
            "-" => ValuePayload::Float(f1 - f2),
            "*" => ValuePayload::Float(f1 * f2),
            "/" => {
                if f2 == 0.0 {
                    return None;
                }
                ValuePayload::Float(f1 / f2)
            }
            "==" => ValuePayload::Int(i64::from(f1 == f2)),
            "!=" => ValuePayload::Int(i64::from(f1 != f2)),
            "<" => ValuePayload::Int(i64::from(f1 < f2)),
            "<=" => ValuePayload::Int(i64::from(f1 <= f2)),
            ">" => ValuePayload::Int(i64::from(f1 > f2)),
            ">=" => ValuePayload::Int(i64::from(f1 >= f2)),
            _ => return None,
        };
        return Some(combine_properties(v1, v2, payload));
    }

    let n1 = v1.int_value()?;
    let n2 = v2.int_value()?;
    let n = match op {
        "+" => n1.checked_add(n2)?,
        "-" => n1.checked_sub(n2)?,
        "*" => n1.checked_mul(n2)?,
        "/" => {
            if n2 == 0 {
                return None;
            }
            n1.checked_div(n2)?
        }
        "%" => {
            if n2 == 0 {
                return None;
            }
            n1.checked_rem(n2)?
        }
        "<<" => {
            if !(0..64).contains(&n2) {
                return None;
            }
            n1.checked_shl(n2 as u32)?
        }
        ">>" => {
            if !(0..64).contains(&n2) {
                return None;
            }
            n1.checked_shr(n2 as u32)?
        }
        "&" => n1 & n2,
        "|" => n1 | n2,
        "^" => n1 ^ n2,
        "&&" => i64::from(n1 != 0 && n2 != 0),
        "||" => i64::from(n1 != 0 || n2 != 0),
        "==" => i64::from(n1 == n2),
        "!=" => i64::from(n1 != n2),
        "<" => i64::from(n1 < n2),
        "<=" => i64::from(n1 <= n2),
        ">" => i64::from(n1 > n2),
        ">=" => i64::from(n1 >= n2),
        _ => return None,
    };
    let mut result = combine_properties(v1, v2, ValuePayload::Int(n));
    // A bound taken from the subtrahend flips direction.
    if op == "-" && v2.bound == result.bound && v2.bound != Bound::Point {
        result.bound = result.bound.invert();
    }
    Some(result)
}

fn float_of(v: &Value) -> Option<f64> {
    match v.payload {
        ValuePayload::Float(f) => Some(f),
        ValuePayload::Int(n) => Some(n as f64),
        _ => None,
    }
}

fn fold_unary(
    list: &mut TokenList,
    symbols: &SymbolDatabase,
    parent: TokenId,
    op: &str,
    value: &Value,
) {
    if value.is_impossible() && op != "-" {
        return;
    }
    let payload = match (&value.payload, op) {
        (ValuePayload::Int(n), "!") => Some(ValuePayload::Int(i64::from(*n == 0))),
        (ValuePayload::Int(n), "~") => Some(ValuePayload::Int(!*n)),
        (ValuePayload::Int(n), "-") => n.checked_neg().map(ValuePayload::Int),
        (ValuePayload::Float(f), "-") => Some(ValuePayload::Float(-*f)),
        _ => None,
    };
    let Some(payload) = payload else { return };
    let mut result = value.clone();
    result.payload = payload;
    if op == "-" {
        result.bound = result.bound.invert();
    }
    set_token_value(list, symbols, parent, result);
}

/// `tokvalue [ known-index ]` — index into a string literal or a brace
/// initializer.
fn fold_index(list: &mut TokenList, symbols: &SymbolDatabase, bracket: TokenId, _value: &Value) {
    let (Some(op1), Some(op2)) = (list.tok(bracket).ast_op1, list.tok(bracket).ast_op2) else {
        return;
    };
    let mut results = Vec::new();
    for v1 in &list.tok(op1).values {
        let ValuePayload::Tok(target) = v1.payload else { continue };
        for v2 in &list.tok(op2).values {
            if !v2.is_known() {
                continue;
            }
            let Some(index) = v2.int_value() else { continue };
            if index < 0 {
                continue;
            }
            let element = if list.tok(target).kind == TokenKind::String {
                string_char_at(list, target, index as usize)
            } else if list.str(target) == "{" {
                init_list_element(list, target, index as usize)
            } else {
                None
            };
            if let Some(n) = element {
                let mut result = combine_properties(v1, v2, ValuePayload::Int(n));
                if result.kind == ValueKind::Known && !(v1.is_known() && v2.is_known()) {
                    result.kind = ValueKind::Possible;
                }
                results.push(result);
            }
        }
    }
    for result in results {
        set_token_value(list, symbols, bracket, result);
    }
}

/// Character count of a string literal token (escapes count once).
pub fn string_length(list: &TokenList, tok: TokenId) -> Option<i64> {
    let text = list.str(tok);
    if !text.starts_with('"') {
        return None;
    }
    let inner = text.strip_prefix('"')?.strip_suffix('"')?;
    let mut count = 0i64;
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            chars.next();
        }
        count += 1;
    }
    Some(count)
}

fn string_char_at(list: &TokenList, tok: TokenId, index: usize) -> Option<i64> {
    let text = list.str(tok);
    let inner = text.strip_prefix('"')?.strip_suffix('"')?;
    let mut pos = 0usize;
    let mut chars = inner.chars().peekable();
    while let Some(c) = chars.next() {
        let value = if c == '\\' {
            match chars.next()? {
                'n' => 10,
                't' => 9,
                'r' => 13,
                '0' => 0,
                '\\' => 92,
                '"' => 34,
                '\'' => 39,
                other => other as i64,
            }
        } else {
            c as i64
        };
        if pos == index {
            return Some(value);
        }
        pos += 1;
    }
    // One past the end reads the terminator.
    if pos == index {
        return Some(0);
    }
    None
}

/// The `index`-th number in `{ a, b, c }`.
fn init_list_element(list: &TokenList, brace: TokenId, index: usize) -> Option<i64> {
    let close = list.link(brace)?;
    let mut pos = 0usize;
    let mut cur = list.next(brace)?;
    while cur != close {
        if list.tok(cur).is_number() {
            if pos == index {
                return crate::programmemory::int_literal(list.str(cur));
            }
            pos += 1;
        }
        cur = list.next(cur)?;
    }
    None
}
