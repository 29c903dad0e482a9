//! The pass inventory and the `set_values` fixed-point driver.
//!
//! Producers run before consumers: literals, aliases, globals and
//! lifetimes are attached once, then the mutually-reinforcing passes loop
//! — at most four rounds, ending early when the total per-token value
//! count stops growing. Values are only ever added inside one `set_values`
//! run, so an unchanged count is an exact fixed point, not a heuristic.
//!
//! Every pass is an independent traversal; the only shared state between
//! passes is the token list itself.

use crate::analyzer::{forward, reverse, Analyzer};
use crate::condition::{
    valueflow_after_condition, valueflow_before_condition, valueflow_infer_condition,
    valueflow_opposite_condition, valueflow_terminating_condition,
};
use crate::fold::{set_token_value, string_length};
use crate::forloop::valueflow_for_loop;
use crate::lifetime::{enclosing_scope_end, statement_after, valueflow_lifetime};
use crate::programmemory::int_literal;
use crate::subfunction::{valueflow_function_return, valueflow_subfunction};
use crate::symbols::{has_side_effects, same_expression, SymbolDatabase};
use scrutiny_base::{
    MoveKind, TokenId, TokenKind, TokenList, Value, ValueKind, ValuePayload,
};

/// Engine knobs. `safe_functions` injects worst-case argument ranges and
/// is driven by the checker settings.
#[derive(Debug, Clone)]
pub struct ValueFlowSettings {
    pub max_outer_iterations: usize,
    pub safe_functions: bool,
}

impl Default for ValueFlowSettings {
    fn default() -> Self {
        ValueFlowSettings {
            max_outer_iterations: 4,
            safe_functions: false,
        }
    }
}

/// Total number of values attached across the list — the fixed-point
/// metric.
pub fn total_values(list: &TokenList) -> usize {
    list.iter().map(|id| list.tok(id).values.len()).sum()
}

/// Runs the full pass sequence. The single entry point of the engine.
pub fn set_values(list: &mut TokenList, symbols: &SymbolDatabase, settings: &ValueFlowSettings) {
    let ids: Vec<TokenId> = list.iter().collect();
    for id in ids {
        list.tok_mut(id).clear_values();
    }

    valueflow_enum_value(list, symbols);
    valueflow_number(list, symbols);
    valueflow_string(list, symbols);
    valueflow_array(list, symbols);
    valueflow_global_const_var(list, symbols);
    valueflow_global_static_var(list, symbols);
    valueflow_pointer_alias(list, symbols);
    valueflow_lifetime(list, symbols);
    valueflow_bit_and(list, symbols);
    valueflow_same_expressions(list, symbols);
    valueflow_right_shift(list, symbols);

    let mut values = 0usize;
    let mut rounds = settings.max_outer_iterations;
    while rounds > 0 && values < total_values(list) {
        values = total_values(list);
        valueflow_pointer_alias_deref(list, symbols);
        valueflow_right_shift(list, symbols);
        valueflow_opposite_condition(list, symbols);
        valueflow_terminating_condition(list, symbols);
        valueflow_before_condition(list, symbols);
        valueflow_after_move(list, symbols);
        valueflow_after_condition(list, symbols);
        valueflow_infer_condition(list, symbols);
        valueflow_after_assign(list, symbols);
        valueflow_switch_variable(list, symbols);
        valueflow_for_loop(list, symbols);
        valueflow_subfunction(list, symbols);
        valueflow_function_return(list, symbols);
        valueflow_lifetime(list, symbols);
        valueflow_uninit(list, symbols);
        if list.is_cpp() {
            valueflow_smart_pointer(list, symbols);
            valueflow_iterators(list, symbols);
            valueflow_container_size(list, symbols);
            valueflow_container_after_condition(list, symbols);
        }
        if settings.safe_functions {
            valueflow_safe_functions(list, symbols);
        }
        rounds -= 1;
    }

    valueflow_dynamic_buffer_size(list, symbols);
}

// ---------------------------------------------------------------------------
// Literal producers
// ---------------------------------------------------------------------------

/// Enumerator names become Known constants.
pub fn valueflow_enum_value(list: &mut TokenList, symbols: &SymbolDatabase) {
    let names: Vec<(TokenId, i64)> = list
        .iter()
        .filter(|&id| list.tok(id).kind == TokenKind::Name && list.tok(id).var_id == 0)
        .filter_map(|id| symbols.enums.get(list.str(id)).map(|&n| (id, n)))
        .collect();
    for (id, n) in names {
        set_token_value(list, symbols, id, Value::known_int(n));
    }
}

/// Number, character and boolean literals.
pub fn valueflow_number(list: &mut TokenList, symbols: &SymbolDatabase) {
    let ids: Vec<TokenId> = list.iter().collect();
    for id in ids {
        let t = list.tok(id);
        let value = match t.kind {
            TokenKind::Number | TokenKind::Char => int_literal(list.str(id)),
            TokenKind::Bool => Some(i64::from(list.str(id) == "true")),
            TokenKind::Name if list.str(id) == "nullptr" || list.str(id) == "NULL" => Some(0),
            _ => None,
        };
        if let Some(n) = value {
            set_token_value(list, symbols, id, Value::known_int(n));
        }
    }
}

/// String literals alias themselves.
pub fn valueflow_string(list: &mut TokenList, symbols: &SymbolDatabase) {
    let ids: Vec<TokenId> = list
        .iter()
        .filter(|&id| list.tok(id).kind == TokenKind::String)
        .collect();
    for id in ids {
        let mut v = Value::new(ValuePayload::Tok(id));
        v.kind = ValueKind::Known;
        set_token_value(list, symbols, id, v);
    }
}

/// Uses of statically initialized arrays alias the initializer.
pub fn valueflow_array(list: &mut TokenList, symbols: &SymbolDatabase) {
    for var in symbols.variables.clone() {
        if !var.is_array {
            continue;
        }
        let Some(init) = var.init_tok else { continue };
        // The alias target: `{` of the brace initializer or the string
        // literal after `=`.
        let target = if list.str(init) == "=" {
            list.next(init)
        } else {
            Some(init)
        };
        let Some(target) = target else { continue };
        if list.str(target) != "{" && list.tok(target).kind != TokenKind::String {
            continue;
        }
        let uses: Vec<TokenId> = list
            .iter()
            .filter(|&id| list.tok(id).var_id == var.var_id && id != var.name_tok)
            .collect();
        for use_tok in uses {
            let mut v = Value::new(ValuePayload::Tok(target));
            v.kind = ValueKind::Known;
            set_token_value(list, symbols, use_tok, v);
        }
    }
}

// ---------------------------------------------------------------------------
// Aliases and globals
// ---------------------------------------------------------------------------

/// `p = & x ;` — p aliases the address-of expression.
pub fn valueflow_pointer_alias(list: &mut TokenList, symbols: &SymbolDatabase) {
    let assignments: Vec<TokenId> = assignment_tokens(list);
    for eq in assignments {
        let (Some(lhs), Some(rhs)) = (list.tok(eq).ast_op1, list.tok(eq).ast_op2) else {
            continue;
        };
        if list.tok(lhs).var_id == 0 {
            continue;
        }
        if list.str(rhs) != "&" || list.tok(rhs).ast_op2.is_some() {
            continue;
        }
        let Some(addressed) = list.tok(rhs).ast_op1 else { continue };
        if list.tok(addressed).var_id == 0 {
            continue;
        }
        let mut v = Value::new(ValuePayload::Tok(rhs));
        v.kind = ValueKind::Known;
        let stop = enclosing_scope_end(list, eq);
        if let Some(start) = statement_after(list, eq) {
            let mut analyzer = Analyzer::variable(list.tok(lhs).var_id, vec![v]);
            forward(list, symbols, start, stop, &mut analyzer);
        }
    }
}

/// `* p` where p aliases `& x` reads x's values at aliasing time.
pub fn valueflow_pointer_alias_deref(list: &mut TokenList, symbols: &SymbolDatabase) {
    let derefs: Vec<TokenId> = list
        .iter()
        .filter(|&id| list.str(id) == "*" && list.tok(id).ast_op2.is_none())
        .collect();
    for deref in derefs {
        let Some(operand) = list.tok(deref).ast_op1 else { continue };
        let targets: Vec<TokenId> = list
            .tok(operand)
            .values
            .iter()
            .filter_map(|v| match v.payload {
                ValuePayload::Tok(t) if list.str(t) == "&" => list.tok(t).ast_op1,
                _ => None,
            })
            .collect();
        for target in targets {
            let copied: Vec<Value> = list
                .tok(target)
                .values
                .iter()
                .filter(|v| v.is_int() || v.is_float())
                .cloned()
                .collect();
            for v in copied {
                set_token_value(list, symbols, deref, v);
            }
        }
    }
}

/// Global `const` variables with literal initializers are compile-time
/// constants everywhere.
pub fn valueflow_global_const_var(list: &mut TokenList, symbols: &SymbolDatabase) {
    for var in symbols.variables.clone() {
        if !var.is_global || !var.is_const {
            continue;
        }
        propagate_global_literal(list, symbols, &var);
    }
}

/// File-static variables written exactly once (the initializer) behave
/// like constants.
pub fn valueflow_global_static_var(list: &mut TokenList, symbols: &SymbolDatabase) {
    for var in symbols.variables.clone() {
        if !var.is_global || !var.is_static || var.is_const {
            continue;
        }
        let mut written = false;
        let mut address_taken = false;
        for id in list.iter().collect::<Vec<_>>() {
            if list.tok(id).var_id != var.var_id {
                continue;
            }
            if Some(id) == list.tok(id).ast_parent.and_then(|p| {
                (list.tok(p).is_assignment_op() || matches!(list.str(p), "++" | "--"))
                    .then(|| list.tok(p).ast_op1)
                    .flatten()
            }) && var.init_tok != list.tok(id).ast_parent
            {
                written = true;
            }
            if list
                .tok(id)
                .ast_parent
                .map(|p| list.str(p) == "&" && list.tok(p).ast_op2.is_none())
                .unwrap_or(false)
            {
                address_taken = true;
            }
        }
        if !written && !address_taken {
            propagate_global_literal(list, symbols, &var);
        }
    }
}

fn propagate_global_literal(
    list: &mut TokenList,
    symbols: &SymbolDatabase,
    var: &crate::symbols::Variable,
) {
    let Some(init) = var.init_tok else { return };
    if list.str(init) != "=" {
        return;
    }
    let Some(rhs) = list.tok(init).ast_op2 else { return };
    let Some(n) = int_literal(list.str(rhs)) else { return };
    let uses: Vec<TokenId> = list
        .iter()
        .filter(|&id| list.tok(id).var_id == var.var_id && id != var.name_tok)
        .collect();
    for use_tok in uses {
        set_token_value(list, symbols, use_tok, Value::known_int(n));
    }
}

// ---------------------------------------------------------------------------
// Algebraic identities
// ---------------------------------------------------------------------------

/// `expr & mask` is 0 or the mask when nothing else is known.
pub fn valueflow_bit_and(list: &mut TokenList, symbols: &SymbolDatabase) {
    let ands: Vec<TokenId> = list
        .iter()
        .filter(|&id| list.str(id) == "&" && list.tok(id).ast_op2.is_some())
        .collect();
    for and in ands {
        if list.tok(and).known_int_value().is_some() {
            continue;
        }
        let (Some(op1), Some(op2)) = (list.tok(and).ast_op1, list.tok(and).ast_op2) else {
            continue;
        };
        let mask = if let Some(n) = int_literal(list.str(op2)) {
            if list.tok(op1).known_int_value().is_some() {
                continue;
            }
            n
        } else if let Some(n) = int_literal(list.str(op1)) {
            if list.tok(op2).known_int_value().is_some() {
                continue;
            }
            n
        } else {
            continue;
        };
        set_token_value(list, symbols, and, Value::int(0));
        set_token_value(list, symbols, and, Value::int(mask));
    }
}

/// Comparing an expression with itself has a syntactic answer.
pub fn valueflow_same_expressions(list: &mut TokenList, symbols: &SymbolDatabase) {
    let candidates: Vec<TokenId> = list
        .iter()
        .filter(|&id| {
            let t = list.tok(id);
            (t.is_comparison_op() || list.str(id) == "-") && t.ast_op1.is_some() && t.ast_op2.is_some()
        })
        .collect();
    for tok in candidates {
        if list.tok(tok).known_int_value().is_some() {
            continue;
        }
        let (op1, op2) = (list.tok(tok).ast_op1.unwrap(), list.tok(tok).ast_op2.unwrap());
        if !same_expression(list, op1, op2) || has_side_effects(list, op1) {
            continue;
        }
        let result = match list.str(tok) {
            "==" | "<=" | ">=" => 1,
            "!=" | "<" | ">" | "-" => 0,
            _ => continue,
        };
        set_token_value(list, symbols, tok, Value::known_int(result));
    }
}

/// Shifting everything out leaves zero.
pub fn valueflow_right_shift(list: &mut TokenList, symbols: &SymbolDatabase) {
    let shifts: Vec<TokenId> = list
        .iter()
        .filter(|&id| list.str(id) == ">>" && list.tok(id).ast_op2.is_some())
        .collect();
    for shift in shifts {
        if list.tok(shift).known_int_value().is_some() {
            continue;
        }
        let (Some(op1), Some(op2)) = (list.tok(shift).ast_op1, list.tok(shift).ast_op2) else {
            continue;
        };
        let Some(amount) = list.tok(op2).known_int_value() else { continue };
        let Some(var) = symbols.variable(list.tok(op1).var_id) else { continue };
        let Some(int_type) = var.int_type else { continue };
        if !var.is_pointer && amount >= i64::from(int_type.bits) {
            set_token_value(list, symbols, shift, Value::known_int(0));
        }
    }
}

// ---------------------------------------------------------------------------
// Flow passes
// ---------------------------------------------------------------------------

fn assignment_tokens(list: &TokenList) -> Vec<TokenId> {
    list.iter()
        .filter(|&id| list.str(id) == "=" && list.tok(id).ast_op1.is_some())
        .filter(|&id| !in_loop_header(list, id))
        .collect()
}

/// Is this token inside a `for`/`while` header? Loop-header assignments
/// belong to the loop evaluator, not the statement passes.
fn in_loop_header(list: &TokenList, tok: TokenId) -> bool {
    let mut depth = 0i32;
    let mut cur = list.prev(tok);
    while let Some(id) = cur {
        match list.str(id) {
            ")" => depth += 1,
            "(" => {
                if depth == 0 {
                    return list
                        .prev(id)
                        .map(|kw| matches!(list.str(kw), "for" | "while"))
                        .unwrap_or(false);
                }
                depth -= 1;
            }
            "{" | "}" => return false,
            ";" if depth == 0 => {
                // Still inside a for-header when the matching `(` is
                // further out; keep scanning.
            }
            _ => {}
        }
        cur = list.prev(id);
    }
    false
}

/// Forward the right-hand side's values into the assigned variable.
pub fn valueflow_after_assign(list: &mut TokenList, symbols: &SymbolDatabase) {
    for eq in assignment_tokens(list) {
        let (Some(lhs), Some(rhs)) = (list.tok(eq).ast_op1, list.tok(eq).ast_op2) else {
            continue;
        };
        let var_id = list.tok(lhs).var_id;
        if var_id == 0 {
            continue;
        }
        let var = symbols.variable(var_id);
        let is_container = var.map(|v| v.is_container).unwrap_or(false);

        let mut values: Vec<Value> = list
            .tok(rhs)
            .values
            .iter()
            .filter(|v| !v.is_lifetime() && v.is_container_size() == is_container)
            .cloned()
            .collect();
        if values.is_empty() {
            continue;
        }
        for v in values.iter_mut() {
            let rendered = v.info_string();
            v.push_path(eq, format!("Assignment '{}={}'", list.str(lhs), rendered));
            v.var_id = var_id;
            if let Some(n) = v.int_value() {
                v.varvalue = n;
            }
        }

        let stop = enclosing_scope_end(list, eq);
        if let Some(start) = statement_after(list, eq) {
            let mut analyzer = if is_container {
                Analyzer::container(var_id, values)
            } else {
                Analyzer::variable(var_id, values)
            };
            forward(list, symbols, start, stop, &mut analyzer);
        }
    }
}

/// `switch (x) { case N: … }` — each label pins the subject; the value is
/// propagated backwards from the switch.
pub fn valueflow_switch_variable(list: &mut TokenList, symbols: &SymbolDatabase) {
    let switches: Vec<TokenId> = list
        .iter()
        .filter(|&id| list.str(id) == "switch")
        .collect();
    for switch_tok in switches {
        let Some(lparen) = list.next(switch_tok).filter(|t| list.str(*t) == "(") else {
            continue;
        };
        let Some(rparen) = list.link(lparen) else { continue };
        let Some(subject) = list.next(lparen).filter(|t| list.tok(*t).var_id != 0) else {
            continue;
        };
        if list.next(subject) != Some(rparen) {
            continue;
        }
        let var_id = list.tok(subject).var_id;
        let Some(body_open) = list.next(rparen).filter(|t| list.str(*t) == "{") else {
            continue;
        };
        let Some(body_close) = list.link(body_open) else { continue };

        // Collect top-level case labels.
        let mut labels = Vec::new();
        let mut depth = 0;
        let mut cur = list.next(body_open);
        while let Some(id) = cur {
            if id == body_close {
                break;
            }
            match list.str(id) {
                "{" => depth += 1,
                "}" => depth -= 1,
                "case" if depth == 0 => {
                    if let Some(label) = list.next(id) {
                        if let Some(n) = int_literal(list.str(label)) {
                            labels.push((id, n));
                        }
                    }
                }
                _ => {}
            }
            cur = list.next(id);
        }

        for (case_tok, n) in labels {
            let mut v = Value::int(n);
            v.var_id = var_id;
            v.varvalue = n;
            v.push_path(case_tok, format!("case {}: value is {}", n, n));
            let mut analyzer = Analyzer::variable(var_id, vec![v]);
            reverse(list, symbols, switch_tok, &mut analyzer);
        }
    }
}

/// `std::move(x)` leaves x in a moved-from state.
pub fn valueflow_after_move(list: &mut TokenList, symbols: &SymbolDatabase) {
    let moves: Vec<(TokenId, MoveKind)> = list
        .iter()
        .filter(|&id| matches!(list.str(id), "move" | "forward"))
        .filter(|&id| {
            list.prev(id).map(|p| list.str(p) == "::").unwrap_or(false)
                && list.at(id, -2).map(|p| list.str(p) == "std").unwrap_or(false)
                && list.str_at(id, 1) == "("
        })
        .map(|id| {
            let kind = if list.str(id) == "move" {
                MoveKind::Moved
            } else {
                MoveKind::Forwarded
            };
            (id, kind)
        })
        .collect();

    for (move_tok, kind) in moves {
        let Some(arg) = list.at(move_tok, 2) else { continue };
        let var_id = list.tok(arg).var_id;
        if var_id == 0 || list.str_at(arg, 1) != ")" {
            continue;
        }
        let mut v = Value::new(ValuePayload::Moved(kind));
        v.kind = ValueKind::Known;
        v.push_path(
            move_tok,
            format!(
                "{} is {} here",
                list.str(arg),
                if kind == MoveKind::Moved { "moved" } else { "forwarded" }
            ),
        );
        let stop = enclosing_scope_end(list, move_tok);
        if let Some(start) = statement_after(list, move_tok) {
            let mut analyzer = Analyzer::variable(var_id, vec![v]);
            forward(list, symbols, start, stop, &mut analyzer);
        }
    }
}

/// Scalar locals without an initializer start uninitialized.
pub fn valueflow_uninit(list: &mut TokenList, symbols: &SymbolDatabase) {
    for var in symbols.variables.clone() {
        if var.is_global
            || var.is_argument
            || var.is_static
            || var.is_reference
            || var.is_container
            || var.is_smart_pointer
            || var.init_tok.is_some()
        {
            continue;
        }
        if var.int_type.is_none() && !var.is_pointer {
            continue;
        }
        let mut v = Value::new(ValuePayload::Uninit);
        v.push_path(var.name_tok, format!("{} is not initialized", var.name));
        let stop = enclosing_scope_end(list, var.name_tok);
        if let Some(start) = statement_after(list, var.name_tok) {
            let mut analyzer = Analyzer::variable(var.var_id, vec![v]);
            forward(list, symbols, start, stop, &mut analyzer);
        }
    }
}

// ---------------------------------------------------------------------------
// Library types
// ---------------------------------------------------------------------------

/// Default-constructed smart pointers are null; `reset()` nulls again.
pub fn valueflow_smart_pointer(list: &mut TokenList, symbols: &SymbolDatabase) {
    for var in symbols.variables.clone() {
        if !var.is_smart_pointer {
            continue;
        }
        if var.init_tok.is_none() {
            let stop = enclosing_scope_end(list, var.name_tok);
            if let Some(start) = statement_after(list, var.name_tok) {
                let mut analyzer = Analyzer::variable(var.var_id, vec![Value::known_int(0)]);
                forward(list, symbols, start, stop, &mut analyzer);
            }
        }
        // `p . reset ( )` with no argument.
        let resets: Vec<TokenId> = list
            .iter()
            .filter(|&id| {
                list.tok(id).var_id == var.var_id
                    && list.str_at(id, 1) == "."
                    && list.str_at(id, 2) == "reset"
                    && list.str_at(id, 3) == "("
                    && list.str_at(id, 4) == ")"
            })
            .collect();
        for reset in resets {
            let stop = enclosing_scope_end(list, reset);
            if let Some(start) = statement_after(list, reset) {
                let mut v = Value::known_int(0);
                v.push_path(reset, format!("{} is reset here", var.name));
                let mut analyzer = Analyzer::variable(var.var_id, vec![v]);
                forward(list, symbols, start, stop, &mut analyzer);
            }
        }
    }
}

/// `it = v.begin()` / `v.end()` produce iterator positions.
pub fn valueflow_iterators(list: &mut TokenList, symbols: &SymbolDatabase) {
    for eq in assignment_tokens(list) {
        let (Some(lhs), Some(rhs)) = (list.tok(eq).ast_op1, list.tok(eq).ast_op2) else {
            continue;
        };
        let var_id = list.tok(lhs).var_id;
        if var_id == 0 || list.str(rhs) != "(" {
            continue;
        }
        let Some(dot) = list.tok(rhs).ast_op1.filter(|d| list.str(*d) == ".") else {
            continue;
        };
        let method = list.tok(dot).ast_op2.map(|m| list.str(m)).unwrap_or("");
        let payload = match method {
            "begin" | "cbegin" => ValuePayload::IteratorStart(0),
            "end" | "cend" => ValuePayload::IteratorEnd(0),
            _ => continue,
        };
        let container_ok = list
            .tok(dot)
            .ast_op1
            .and_then(|c| symbols.variable(list.tok(c).var_id))
            .map(|v| v.is_container)
            .unwrap_or(false);
        if !container_ok {
            continue;
        }
        let mut v = Value::new(payload);
        v.kind = ValueKind::Known;
        let stop = enclosing_scope_end(list, eq);
        if let Some(start) = statement_after(list, eq) {
            let mut analyzer = Analyzer::variable(var_id, vec![v]);
            forward(list, symbols, start, stop, &mut analyzer);
        }
    }
}

/// Container sizes from declarations, plus `.size()`/`.empty()` reads.
pub fn valueflow_container_size(list: &mut TokenList, symbols: &SymbolDatabase) {
    // Declarations establish the initial size.
    for var in symbols.variables.clone() {
        if !var.is_container {
            continue;
        }
        let size = match var.init_tok {
            None => Some(0),
            Some(init) if list.str(init) == "=" => list
                .tok(init)
                .ast_op2
                .and_then(|rhs| string_length(list, rhs)),
            Some(init) if list.str(init) == "{" => Some(count_init_elements(list, init)),
            _ => None,
        };
        let Some(size) = size else { continue };
        let mut v = Value::new(ValuePayload::ContainerSize(size));
        v.kind = ValueKind::Known;
        let anchor = var.init_tok.unwrap_or(var.name_tok);
        let stop = enclosing_scope_end(list, anchor);
        if let Some(start) = statement_after(list, anchor) {
            let mut analyzer = Analyzer::container(var.var_id, vec![v]);
            forward(list, symbols, start, stop, &mut analyzer);
        }
    }

    // size()/length()/empty() read the tracked size.
    let dots: Vec<TokenId> = list
        .iter()
        .filter(|&id| list.str(id) == "." && list.tok(id).ast_op2.is_some())
        .collect();
    for dot in dots {
        let Some(obj) = list.tok(dot).ast_op1 else { continue };
        let method = list.tok(dot).ast_op2.map(|m| list.str(m)).unwrap_or("").to_string();
        let Some(call) = list.tok(dot).ast_parent.filter(|p| list.str(*p) == "(") else {
            continue;
        };
        let sizes: Vec<Value> = list
            .tok(obj)
            .values
            .iter()
            .filter(|v| v.is_container_size())
            .cloned()
            .collect();
        for size_value in sizes {
            let ValuePayload::ContainerSize(n) = size_value.payload else {
                continue;
            };
            let result = match method.as_str() {
                "size" | "length" => n,
                "empty" => i64::from(n == 0),
                _ => continue,
            };
            let mut v = size_value.clone();
            v.payload = ValuePayload::Int(result);
            set_token_value(list, symbols, call, v);
        }
    }
}

fn count_init_elements(list: &TokenList, brace: TokenId) -> i64 {
    let Some(close) = list.link(brace) else { return 0 };
    let mut count = 0i64;
    let mut cur = list.next(brace);
    let mut any = false;
    while let Some(id) = cur {
        if id == close {
            break;
        }
        any = true;
        if list.str(id) == "," {
            count += 1;
        }
        cur = list.next(id);
    }
    if any {
        count + 1
    } else {
        0
    }
}

/// `if (s.empty())` and `if (s.size() == N)` condition the size in the
/// branches.
pub fn valueflow_container_after_condition(list: &mut TokenList, symbols: &SymbolDatabase) {
    for construct in crate::condition::if_constructs(list) {
        let root = construct.cond_root;
        let (var_id, then_size) = match container_condition(list, symbols, root) {
            Some(pair) => pair,
            None => continue,
        };
        let (then_open, then_close) = construct.then_range;
        let mut v = Value::new(ValuePayload::ContainerSize(then_size));
        v.condition = Some(root);
        let stop = list.next(then_close);
        let mut analyzer = Analyzer::container(var_id, vec![v]);
        analyzer.assume(list, root, true);
        forward(list, symbols, then_open, stop, &mut analyzer);
    }
}

/// Recognizes `s . empty ( )` (size 0) and `s . size ( ) == N` (size N).
fn container_condition(
    list: &TokenList,
    symbols: &SymbolDatabase,
    root: TokenId,
) -> Option<(u32, i64)> {
    let container_of = |call: TokenId| -> Option<u32> {
        if list.str(call) != "(" {
            return None;
        }
        let dot = list.tok(call).ast_op1.filter(|d| list.str(*d) == ".")?;
        let obj = list.tok(dot).ast_op1?;
        let var = symbols.variable(list.tok(obj).var_id)?;
        if !var.is_container {
            return None;
        }
        Some((var.var_id, list.tok(dot).ast_op2.map(|m| list.str(m).to_string())?))
            .map(|(id, _)| id)
            .filter(|_| {
                matches!(
                    list.tok(dot).ast_op2.map(|m| list.str(m)),
                    Some("empty") | Some("size") | Some("length")
                )
            })
    };

    if list.str(root) == "(" {
        // Bare `s.empty()`.
        let var_id = container_of(root)?;
        let dot = list.tok(root).ast_op1?;
        if list.tok(dot).ast_op2.map(|m| list.str(m)) == Some("empty") {
            return Some((var_id, 0));
        }
        return None;
    }
    if list.str(root) == "==" {
        let (op1, op2) = (list.tok(root).ast_op1?, list.tok(root).ast_op2?);
        let (call, num) = if list.str(op1) == "(" {
            (op1, int_literal(list.str(op2))?)
        } else {
            (op2, int_literal(list.str(op1))?)
        };
        let var_id = container_of(call)?;
        let dot = list.tok(call).ast_op1?;
        let method = list.tok(dot).ast_op2.map(|m| list.str(m))?;
        if method == "size" || method == "length" {
            return Some((var_id, num));
        }
    }
    None
}

/// Allocation sizes: `malloc(n)`, `calloc(a, b)`, `strdup("…")`.
pub fn valueflow_dynamic_buffer_size(list: &mut TokenList, symbols: &SymbolDatabase) {
    for eq in assignment_tokens(list) {
        let (Some(lhs), Some(rhs)) = (list.tok(eq).ast_op1, list.tok(eq).ast_op2) else {
            continue;
        };
        let var_id = list.tok(lhs).var_id;
        if var_id == 0 || list.str(rhs) != "(" {
            continue;
        }
        let Some(callee) = list.tok(rhs).ast_op1 else { continue };
        let mut args = Vec::new();
        if let Some(arg_root) = list.tok(rhs).ast_op2 {
            flatten(list, arg_root, &mut args);
        }
        let size = match list.str(callee) {
            "malloc" if args.len() == 1 => list.tok(args[0]).known_int_value(),
            "calloc" if args.len() == 2 => {
                match (list.tok(args[0]).known_int_value(), list.tok(args[1]).known_int_value()) {
                    (Some(a), Some(b)) => a.checked_mul(b),
                    _ => None,
                }
            }
            "strdup" if args.len() == 1 => string_length(list, args[0]).map(|n| n + 1),
            _ => None,
        };
        let Some(size) = size else { continue };
        let mut v = Value::new(ValuePayload::BufferSize(size));
        v.kind = ValueKind::Known;
        v.push_path(rhs, format!("Allocation size is {}", size));
        let stop = enclosing_scope_end(list, eq);
        if let Some(start) = statement_after(list, eq) {
            let mut analyzer = Analyzer::variable(var_id, vec![v]);
            forward(list, symbols, start, stop, &mut analyzer);
        }
    }
}

fn flatten(list: &TokenList, root: TokenId, out: &mut Vec<TokenId>) {
    if list.str(root) == "," {
        let t = list.tok(root);
        if let Some(op1) = t.ast_op1 {
            flatten(list, op1, out);
        }
        if let Some(op2) = t.ast_op2 {
            flatten(list, op2, out);
        }
    } else {
        out.push(root);
    }
}

/// Inject worst-case values into every function's integer parameters.
pub fn valueflow_safe_functions(list: &mut TokenList, symbols: &SymbolDatabase) {
    for function in symbols.functions.clone() {
        let Some((body_open, body_close)) = function.body else { continue };
        for &param in &function.arg_var_ids {
            let Some(var) = symbols.variable(param) else { continue };
            let Some(int_type) = var.int_type else { continue };
            if var.is_pointer || var.is_array || var.is_reference {
                continue;
            }
            let bits = int_type.bits.min(63);
            let (min, max) = if int_type.signed {
                (-(1i64 << (bits - 1)), (1i64 << (bits - 1)) - 1)
            } else {
                (0, if bits >= 63 { i64::MAX } else { (1i64 << bits) - 1 })
            };
            let mut values = Vec::new();
            for n in [min, max] {
                let mut v = Value::int(n);
                v.safe = true;
                v.push_path(var.name_tok, format!("Safe checks: {} can be {}", var.name, n));
                values.push(v);
            }
            let stop = list.next(body_close);
            let mut analyzer = Analyzer::variable(param, values);
            forward(list, symbols, body_open, stop, &mut analyzer);
        }
    }
}
