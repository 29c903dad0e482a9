//! Program memory: concrete variable states along one analysis path.
//!
//! Analyzers and the for-loop evaluator keep a [`ProgramMemory`] — a map
//! from var-id to the value the variable is known to hold on the path being
//! walked. [`execute`] interprets an expression subtree over that memory:
//! it reads literals and Known token values, applies the operator algebra
//! with C semantics (short-circuit `&&`/`||`, checked arithmetic), and
//! *writes back* through assignments and `++`/`--`, which is exactly what
//! the loop interpreter needs to run a `for` header to completion.
//!
//! `execute` is best-effort: any unmodeled construct makes it return
//! `None`, never a wrong number.

use crate::symbols::SymbolDatabase;
use scrutiny_base::{TokenId, TokenList, Value, ValuePayload};
use std::collections::HashMap;

/// Concrete values of variables along the current path.
#[derive(Debug, Clone, Default)]
pub struct ProgramMemory {
    values: HashMap<u32, Value>,
}

impl ProgramMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, var_id: u32, value: Value) {
        if var_id != 0 {
            self.values.insert(var_id, value);
        }
    }

    pub fn set_int(&mut self, var_id: u32, n: i64) {
        self.set(var_id, Value::known_int(n));
    }

    pub fn get(&self, var_id: u32) -> Option<&Value> {
        self.values.get(&var_id)
    }

    pub fn get_int(&self, var_id: u32) -> Option<i64> {
        self.values.get(&var_id).and_then(Value::int_value)
    }

    pub fn erase(&mut self, var_id: u32) {
        self.values.remove(&var_id);
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Variables this memory pins.
    pub fn var_ids(&self) -> impl Iterator<Item = u32> + '_ {
        self.values.keys().copied()
    }
}

/// C-style integer literal, including char constants.
pub fn int_literal(text: &str) -> Option<i64> {
    if text.starts_with('\'') {
        return char_literal(text);
    }
    let cleaned: String = text
        .chars()
        .filter(|c| *c != '\'')
        .collect::<String>()
        .trim_end_matches(['u', 'U', 'l', 'L'])
        .to_string();
    if cleaned.is_empty() {
        return None;
    }
    if let Some(hex) = cleaned.strip_prefix("0x").or(cleaned.strip_prefix("0X")) {
        return i64::from_str_radix(hex, 16).ok();
    }
    if let Some(bin) = cleaned.strip_prefix("0b").or(cleaned.strip_prefix("0B")) {
        return i64::from_str_radix(bin, 2).ok();
    }
    if cleaned.len() > 1 && cleaned.starts_with('0') && cleaned.chars().all(|c| c.is_ascii_digit())
    {
        return i64::from_str_radix(&cleaned[1..], 8).ok();
    }
    if cleaned.chars().all(|c| c.is_ascii_digit()) {
        cleaned.parse().ok()
    } else {
        None
    }
}

/// `'a'`, `'\n'`, `'\0'`; multi-char constants are not modeled.
fn char_literal(text: &str) -> Option<i64> {
    let inner = text.strip_prefix('\'')?.strip_suffix('\'')?;
    let mut chars = inner.chars();
    let value = match chars.next()? {
        '\\' => match chars.next()? {
            'n' => 10,
            't' => 9,
            'r' => 13,
            '0' => 0,
            '\\' => 92,
            '\'' => 39,
            '"' => 34,
            _ => return None,
        },
        c => c as i64,
    };
    if chars.next().is_some() {
        return None;
    }
    Some(value)
}

/// Interprets the subtree rooted at `tok` over `pm`. Assignments and
/// `++`/`--` update `pm`; everything unmodeled yields `None`.
pub fn execute(
    list: &TokenList,
    symbols: &SymbolDatabase,
    pm: &mut ProgramMemory,
    tok: TokenId,
) -> Option<i64> {
    let t = list.tok(tok);
    let text = list.str(tok);

    if t.is_number() {
        return int_literal(text);
    }
    if text == "true" {
        return Some(1);
    }
    if text == "false" {
        return Some(0);
    }
    if t.is_name() {
        if t.var_id != 0 {
            if let Some(n) = pm.get_int(t.var_id) {
                return Some(n);
            }
        }
        if let Some(&n) = symbols.enums.get(text) {
            return Some(n);
        }
        return known_int(list, tok);
    }

    let op1 = t.ast_op1;
    let op2 = t.ast_op2;

    match text {
        "=" => {
            let rhs = execute(list, symbols, pm, op2?)?;
            let lhs_var = list.tok(op1?).var_id;
            if lhs_var == 0 {
                return None;
            }
            pm.set_int(lhs_var, rhs);
            Some(rhs)
        }
        "+=" | "-=" | "*=" | "/=" | "%=" | "&=" | "|=" | "^=" | "<<=" | ">>=" => {
            let lhs_var = list.tok(op1?).var_id;
            if lhs_var == 0 {
                return None;
            }
            let old = pm.get_int(lhs_var)?;
            let rhs = execute(list, symbols, pm, op2?)?;
            let result = binary_result(&text[..text.len() - 1], old, rhs)?;
            pm.set_int(lhs_var, result);
            Some(result)
        }
        "++" | "--" => {
            let operand = op1?;
            let var = list.tok(operand).var_id;
            if var == 0 {
                return None;
            }
            let old = pm.get_int(var)?;
            let new = if text == "++" { old.checked_add(1)? } else { old.checked_sub(1)? };
            pm.set_int(var, new);
            // Prefix yields the new value; postfix the old one. Prefix
            // operators come out of parse_unary with the operand as op1
            // too, so distinguish by token order.
            let prefix = list.next(tok) == Some(operand);
            Some(if prefix { new } else { old })
        }
        "&&" => {
            let lhs = execute(list, symbols, pm, op1?)?;
            if lhs == 0 {
                return Some(0);
            }
            let rhs = execute(list, symbols, pm, op2?)?;
            Some(i64::from(rhs != 0))
        }
        "||" => {
            let lhs = execute(list, symbols, pm, op1?)?;
            if lhs != 0 {
                return Some(1);
            }
            let rhs = execute(list, symbols, pm, op2?)?;
            Some(i64::from(rhs != 0))
        }
        "!" if op2.is_none() => {
            let v = execute(list, symbols, pm, op1?)?;
            Some(i64::from(v == 0))
        }
        "~" if op2.is_none() => {
            let v = execute(list, symbols, pm, op1?)?;
            Some(!v)
        }
        "-" if op2.is_none() => {
            let v = execute(list, symbols, pm, op1?)?;
            v.checked_neg()
        }
        "+" if op2.is_none() => execute(list, symbols, pm, op1?),
        "?" => {
            let cond = execute(list, symbols, pm, op1?)?;
            let colon = op2?;
            let arm = if cond != 0 {
                list.tok(colon).ast_op1?
            } else {
                list.tok(colon).ast_op2?
            };
            execute(list, symbols, pm, arm)
        }
        "(" => {
            // A cast truncates; a call is opaque.
            if let Some(int_type) = symbols.casts.get(&tok) {
                let v = execute(list, symbols, pm, op1?)?;
                return Some(truncate(v, *int_type));
            }
            None
        }
        "," => {
            execute(list, symbols, pm, op1?)?;
            execute(list, symbols, pm, op2?)
        }
        _ => {
            let lhs = execute(list, symbols, pm, op1?)?;
            let rhs = execute(list, symbols, pm, op2?)?;
            binary_result(text, lhs, rhs)
        }
    }
}

/// Truncation to a declared integer width, sign-extending when signed.
pub fn truncate(value: i64, int_type: crate::symbols::IntType) -> i64 {
    let bits = int_type.bits.min(64);
    if bits >= 64 {
        return value;
    }
    let masked = (value as u64) & ((1u64 << bits) - 1);
    if int_type.signed && bits > 0 && (masked >> (bits - 1)) & 1 == 1 {
        (masked | !((1u64 << bits) - 1)) as i64
    } else {
        masked as i64
    }
}

fn binary_result(op: &str, lhs: i64, rhs: i64) -> Option<i64> {
    Some(match op {
        "+" => lhs.checked_add(rhs)?,
        "-" => lhs.checked_sub(rhs)?,
        "*" => lhs.checked_mul(rhs)?,
        "/" => lhs.checked_div(rhs)?,
        "%" => lhs.checked_rem(rhs)?,
        "&" => lhs & rhs,
        "|" => lhs | rhs,
        "^" => lhs ^ rhs,
        "<<" => {
            if !(0..64).contains(&rhs) {
                return None;
            }
            lhs.checked_shl(rhs as u32)?
        }
        ">>" => {
            if !(0..64).contains(&rhs) {
                return None;
            }
            lhs.checked_shr(rhs as u32)?
        }
        "==" => i64::from(lhs == rhs),
        "!=" => i64::from(lhs != rhs),
        "<" => i64::from(lhs < rhs),
        "<=" => i64::from(lhs <= rhs),
        ">" => i64::from(lhs > rhs),
        ">=" => i64::from(lhs >= rhs),
        _ => return None,
    })
}

fn known_int(list: &TokenList, tok: TokenId) -> Option<i64> {
    list.tok(tok).known_int_value()
}

/// Evaluates a condition to a definite truth value, if possible.
pub fn condition_is_true(
    list: &TokenList,
    symbols: &SymbolDatabase,
    pm: &ProgramMemory,
    cond: TokenId,
) -> Option<bool> {
    let mut scratch = pm.clone();
    execute(list, symbols, &mut scratch, cond).map(|v| v != 0)
}

/// Records the variable states a taken (or refuted) condition implies.
/// Handles `var == n`, `var != n`, bare `var`, and `!var` shapes.
pub fn assume_condition(
    list: &TokenList,
    pm: &mut ProgramMemory,
    cond: TokenId,
    state: bool,
) {
    let t = list.tok(cond);
    let text = list.str(cond);
    match text {
        "==" | "!=" => {
            let eq = (text == "==") == state;
            if !eq {
                return;
            }
            let (Some(op1), Some(op2)) = (t.ast_op1, t.ast_op2) else { return };
            let (var_tok, num_tok) = if list.tok(op1).var_id != 0 {
                (op1, op2)
            } else {
                (op2, op1)
            };
            if let Some(n) = int_literal(list.str(num_tok)) {
                pm.set_int(list.tok(var_tok).var_id, n);
            }
        }
        "!" => {
            if let Some(op1) = t.ast_op1 {
                assume_condition(list, pm, op1, !state);
            }
        }
        "&&" if state => {
            if let (Some(op1), Some(op2)) = (t.ast_op1, t.ast_op2) {
                assume_condition(list, pm, op1, true);
                assume_condition(list, pm, op2, true);
            }
        }
        "||" if !state => {
            if let (Some(op1), Some(op2)) = (t.ast_op1, t.ast_op2) {
                assume_condition(list, pm, op1, false);
                assume_condition(list, pm, op2, false);
            }
        }
        _ if t.var_id != 0 && !state => {
            // `if (x)` refuted pins x to zero.
            pm.set_int(t.var_id, 0);
        }
        _ => {}
    }
}

/// Removes from `pm` every variable written inside the subtree.
pub fn remove_modified(list: &TokenList, pm: &mut ProgramMemory, root: TokenId) {
    let t = list.tok(root);
    if t.is_assignment_op() || matches!(list.str(root), "++" | "--") {
        if let Some(op1) = t.ast_op1 {
            let var = list.tok(op1).var_id;
            if var != 0 {
                pm.erase(var);
            }
        }
    }
    for op in [t.ast_op1, t.ast_op2].into_iter().flatten() {
        remove_modified(list, pm, op);
    }
}
