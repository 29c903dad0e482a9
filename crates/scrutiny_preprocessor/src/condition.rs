//! `#if` condition reduction and verdict analysis.
//!
//! [`simplify_condition`] folds a directive's condition in place until it is
//! either a single literal or an irreducible residue over unfixed macros:
//!
//! 1. every `defined ( X )` whose state is fixed becomes `0` or `1`,
//!    macros with known bodies are expanded,
//! 2. fully-known arithmetic/comparison subtrees fold by C precedence,
//!    `!` is pushed into literals, single-token parentheses unwrap,
//! 3. `&&`/`||` short-circuit pruning deletes the sibling subtree
//!    syntactically once one operand folds to the deciding literal.
//!
//! [`analyze_if`] then delivers the verdict for the branch: `Known`,
//! `Conflict`, a `New` split request carrying the configuration name, or
//! `Unhandled` for residue the reducer does not model (kept live). The
//! header-guard pattern is recognized here so a guarded header does not
//! produce a spurious split.
//!
//! Comparison assumptions from earlier splits (`X>=3`) are discharged by
//! interval entailment: an assumption that implies the condition yields
//! `Known`, one that excludes it yields `Conflict`, anything else stays
//! `Unhandled`.

use crate::macros::{replace_macro, AnalysisResult, MacroTable, SplitMode};
use scrutiny_base::{TokenId, TokenList};

/// Comparison operator in split predicates and reduced conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CmpOp {
    pub fn parse(s: &str) -> Option<CmpOp> {
        match s {
            "==" | "=" => Some(CmpOp::Eq),
            "!=" => Some(CmpOp::Ne),
            "<" => Some(CmpOp::Lt),
            "<=" => Some(CmpOp::Le),
            ">" => Some(CmpOp::Gt),
            ">=" => Some(CmpOp::Ge),
            _ => None,
        }
    }

    /// Spelling used in configuration names.
    pub fn as_str(self) -> &'static str {
        match self {
            CmpOp::Eq => "=",
            CmpOp::Ne => "!=",
            CmpOp::Lt => "<",
            CmpOp::Le => "<=",
            CmpOp::Gt => ">",
            CmpOp::Ge => ">=",
        }
    }

    /// The operator seen from the other side: `n op x` ⇔ `x (flip op) n`.
    pub fn flip(self) -> CmpOp {
        match self {
            CmpOp::Lt => CmpOp::Gt,
            CmpOp::Le => CmpOp::Ge,
            CmpOp::Gt => CmpOp::Lt,
            CmpOp::Ge => CmpOp::Le,
            other => other,
        }
    }

    /// The semantic opposite: `x op n` is false ⇔ `x (negate op) n` is true.
    pub fn negate(self) -> CmpOp {
        match self {
            CmpOp::Eq => CmpOp::Ne,
            CmpOp::Ne => CmpOp::Eq,
            CmpOp::Lt => CmpOp::Ge,
            CmpOp::Le => CmpOp::Gt,
            CmpOp::Gt => CmpOp::Le,
            CmpOp::Ge => CmpOp::Lt,
        }
    }

    pub fn eval(self, lhs: i64, rhs: i64) -> bool {
        match self {
            CmpOp::Eq => lhs == rhs,
            CmpOp::Ne => lhs != rhs,
            CmpOp::Lt => lhs < rhs,
            CmpOp::Le => lhs <= rhs,
            CmpOp::Gt => lhs > rhs,
            CmpOp::Ge => lhs >= rhs,
        }
    }
}

/// Parses a stored predicate such as `">=3"` or `"!=0"`.
pub fn parse_predicate(s: &str) -> Option<(CmpOp, i64)> {
    let (op, rest) = if let Some(rest) = s.strip_prefix("<=") {
        (CmpOp::Le, rest)
    } else if let Some(rest) = s.strip_prefix(">=") {
        (CmpOp::Ge, rest)
    } else if let Some(rest) = s.strip_prefix("!=") {
        (CmpOp::Ne, rest)
    } else if let Some(rest) = s.strip_prefix("==") {
        (CmpOp::Eq, rest)
    } else if let Some(rest) = s.strip_prefix('<') {
        (CmpOp::Lt, rest)
    } else if let Some(rest) = s.strip_prefix('>') {
        (CmpOp::Gt, rest)
    } else if let Some(rest) = s.strip_prefix('=') {
        (CmpOp::Eq, rest)
    } else {
        return None;
    };
    parse_int(rest).map(|n| (op, n))
}

/// The semantic opposite of a split predicate: `X>=3` → `X<3`, bare `X!=0`
/// → `X=0`.
pub fn opposite_predicate(config_name: &str) -> Option<String> {
    let pos = config_name.find(['=', '>', '<', '!'])?;
    let name = &config_name[..pos];
    let (op, n) = parse_predicate(&config_name[pos..])?;
    Some(format!("{}{}{}", name, op.negate().as_str(), n))
}

/// C-style integer literal. Suffixes are dropped; `'` separators allowed.
pub fn parse_int(text: &str) -> Option<i64> {
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

/// Assumption ⇒/⊥ condition over the integers.
fn entailment(assumption: (CmpOp, i64), condition: (CmpOp, i64)) -> AnalysisResult {
    use CmpOp::*;
    let range = |op: CmpOp, n: i64| -> Option<(i64, i64)> {
        match op {
            Lt => Some((i64::MIN, n.saturating_sub(1))),
            Le => Some((i64::MIN, n)),
            Gt => Some((n.saturating_add(1), i64::MAX)),
            Ge => Some((n, i64::MAX)),
            Eq => Some((n, n)),
            Ne => None,
        }
    };
    match (range(assumption.0, assumption.1), range(condition.0, condition.1)) {
        (Some((alo, ahi)), Some((clo, chi))) => {
            if alo > ahi {
                return AnalysisResult::Conflict; // empty assumption, dead anyway
            }
            if alo >= clo && ahi <= chi {
                AnalysisResult::Known
            } else if ahi < clo || alo > chi {
                AnalysisResult::Conflict
            } else {
                AnalysisResult::Unhandled
            }
        }
        (None, None) => {
            if assumption.1 == condition.1 {
                AnalysisResult::Known
            } else {
                AnalysisResult::Unhandled
            }
        }
        // x != a ⇒ (x cmp c) only in degenerate cases; stay conservative.
        (None, Some((clo, chi))) => {
            if clo == chi && clo == assumption.1 {
                AnalysisResult::Conflict
            } else {
                AnalysisResult::Unhandled
            }
        }
        (Some((alo, ahi)), None) => {
            // x in [alo,ahi] ⇒ x != c
            if condition.1 < alo || condition.1 > ahi {
                AnalysisResult::Known
            } else if alo == ahi && alo == condition.1 {
                AnalysisResult::Conflict
            } else {
                AnalysisResult::Unhandled
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Condition simplification
// ---------------------------------------------------------------------------

/// First token of the condition, if the line has one.
fn cond_first(list: &TokenList, directive: TokenId) -> Option<TokenId> {
    let end = list.line_end(directive);
    if end == directive {
        None
    } else {
        list.next(directive)
    }
}

/// Reduces the condition of the `if`/`elif` at `directive` in place.
pub fn simplify_condition(
    list: &mut TokenList,
    table: &MacroTable,
    mode: SplitMode,
    directive: TokenId,
) {
    resolve_defined_and_macros(list, table, mode, directive);
    fold_line(list, directive);
}

/// Pass 1: replace fixed `defined ( X )` with literals, expand macros.
fn resolve_defined_and_macros(
    list: &mut TokenList,
    table: &MacroTable,
    mode: SplitMode,
    directive: TokenId,
) {
    let mut cur = cond_first(list, directive);
    while let Some(id) = cur {
        if !same_line(list, directive, id) {
            break;
        }
        if list.str(id) == "defined" {
            // Uniformized shape: defined ( X )
            if list.str_at(id, 1) == "(" && list.str_at(id, 3) == ")" {
                let name = list.str_at(id, 2).to_string();
                match table.analyze(&name, mode) {
                    AnalysisResult::Known => {
                        list.set_str(id, "1");
                        list.delete_next(id, 3);
                        cur = list.next(id);
                    }
                    AnalysisResult::Conflict => {
                        list.set_str(id, "0");
                        list.delete_next(id, 3);
                        cur = list.next(id);
                    }
                    _ => {
                        cur = list.at(id, 4);
                    }
                }
                continue;
            }
            cur = list.next(id);
            continue;
        }
        if list.tok(id).is_name() && !list.tok(id).expanded_macro {
            let outcome = replace_macro(list, table, id);
            if outcome.changed {
                cur = outcome.resume;
                continue;
            }
        }
        cur = list.next(id);
    }
}

fn same_line(list: &TokenList, a: TokenId, b: TokenId) -> bool {
    let (ta, tb) = (list.tok(a), list.tok(b));
    ta.file == tb.file && ta.line == tb.line
}

/// Binding strength for the fold guard; higher binds tighter.
fn precedence(op: &str) -> Option<u8> {
    Some(match op {
        "*" | "/" | "%" => 10,
        "+" | "-" => 9,
        "<<" | ">>" => 8,
        "<" | "<=" | ">" | ">=" => 7,
        "==" | "!=" => 6,
        "&" => 5,
        "^" => 4,
        "|" => 3,
        "&&" => 2,
        "||" => 1,
        _ => return None,
    })
}

fn apply_binary(op: &str, lhs: i64, rhs: i64) -> Option<i64> {
    Some(match op {
        "*" => lhs.checked_mul(rhs)?,
        "/" => lhs.checked_div(rhs)?,
        "%" => lhs.checked_rem(rhs)?,
        "+" => lhs.checked_add(rhs)?,
        "-" => lhs.checked_sub(rhs)?,
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
        "&" => lhs & rhs,
        "^" => lhs ^ rhs,
        "|" => lhs | rhs,
        "&&" => i64::from(lhs != 0 && rhs != 0),
        "||" => i64::from(lhs != 0 || rhs != 0),
        _ => {
            let cmp = CmpOp::parse(op)?;
            i64::from(cmp.eval(lhs, rhs))
        }
    })
}

/// Pass 2: fold literals, unwrap parens, push `!` into literals, prune
/// `&&`/`||` short circuits. Loops to a fixed point.
fn fold_line(list: &mut TokenList, directive: TokenId) {
    loop {
        let mut changed = false;

        // `( X )` → `X`
        let mut cur = cond_first(list, directive);
        while let Some(id) = cur {
            if !same_line(list, directive, id) {
                break;
            }
            let next = list.next(id);
            let grouping = list
                .prev(id)
                .map(|p| list.str(p) != "defined")
                .unwrap_or(true);
            if list.str(id) == "("
                && grouping
                && next.is_some()
                && list.str_at(id, 2) == ")"
                && list.str_at(id, 1) != ")"
                && precedence(list.str_at(id, 1)).is_none()
            {
                let inner = next.unwrap();
                list.delete(id);
                list.delete_next(inner, 1);
                changed = true;
                cur = list.next(inner);
                continue;
            }
            cur = next;
        }

        // `! <literal>`
        let mut cur = cond_first(list, directive);
        while let Some(id) = cur {
            if !same_line(list, directive, id) {
                break;
            }
            if list.str(id) == "!" {
                if let Some(n) = parse_int(list.str_at(id, 1)) {
                    let lit = list.next(id).unwrap();
                    list.set_str(lit, if n == 0 { "1" } else { "0" });
                    list.delete(id);
                    changed = true;
                    cur = list.next(lit);
                    continue;
                }
            }
            cur = list.next(id);
        }

        // Binary folds, tightest first. The guard refuses a fold whose
        // neighbor operator binds tighter but could not fold itself.
        for prec in (1..=10u8).rev() {
            let mut cur = cond_first(list, directive);
            while let Some(id) = cur {
                if !same_line(list, directive, id) {
                    break;
                }
                let op = list.str(id).to_string();
                if precedence(&op) != Some(prec) {
                    cur = list.next(id);
                    continue;
                }
                let (Some(lhs_id), Some(rhs_id)) = (list.prev(id), list.next(id)) else {
                    cur = list.next(id);
                    continue;
                };
                let (Some(lhs), Some(rhs)) =
                    (parse_int(list.str(lhs_id)), parse_int(list.str(rhs_id)))
                else {
                    cur = list.next(id);
                    continue;
                };
                let outer_left = list.prev(lhs_id).map(|t| list.str(t).to_string());
                let outer_right = list.next(rhs_id).map(|t| list.str(t).to_string());
                let blocked = |neighbor: Option<String>| {
                    neighbor
                        .and_then(|s| precedence(&s))
                        .map(|p| p > prec)
                        .unwrap_or(false)
                };
                if blocked(outer_left) || blocked(outer_right) {
                    cur = list.next(id);
                    continue;
                }
                if let Some(result) = apply_binary(&op, lhs, rhs) {
                    list.set_str(lhs_id, &result.to_string());
                    list.delete_next(lhs_id, 2);
                    changed = true;
                    cur = list.next(lhs_id);
                    continue;
                }
                cur = list.next(id);
            }
        }

        // Short-circuit pruning against non-literal residue.
        if prune_short_circuit(list, directive) {
            changed = true;
        }

        if !changed {
            return;
        }
    }
}

/// Deletes the sibling subtree of a deciding `&&`/`||` literal: `X && 0`,
/// `0 && X` → `0`; `X || 1`, `1 || X` → `1`; `X && 1` → `X`; `X || 0` → `X`.
/// The residue run is only removed when its parentheses are balanced.
fn prune_short_circuit(list: &mut TokenList, directive: TokenId) -> bool {
    let mut cur = cond_first(list, directive);
    while let Some(id) = cur {
        if !same_line(list, directive, id) {
            break;
        }
        let op = list.str(id).to_string();
        if op != "&&" && op != "||" {
            cur = list.next(id);
            continue;
        }
        let prec = precedence(&op).unwrap();
        let lhs = list.prev(id);
        let rhs = list.next(id);
        // A literal operand only belongs to this operator when nothing on
        // its far side binds tighter (`X && 0 + A` keeps its `0`).
        let free_lhs = lhs
            .and_then(|t| list.prev(t))
            .and_then(|t| precedence(list.str(t)))
            .map(|p| p <= prec)
            .unwrap_or(true);
        let free_rhs = rhs
            .and_then(|t| list.next(t))
            .and_then(|t| precedence(list.str(t)))
            .map(|p| p <= prec)
            .unwrap_or(true);
        let lhs_lit = lhs.and_then(|t| parse_int(list.str(t))).filter(|_| free_lhs);
        let rhs_lit = rhs.and_then(|t| parse_int(list.str(t))).filter(|_| free_rhs);

        // Neutral literal operand: drop the literal and the operator.
        let neutral = |n: i64| (op == "&&" && n != 0) || (op == "||" && n == 0);
        if let Some(n) = lhs_lit {
            if neutral(n) {
                list.delete(lhs.unwrap());
                list.delete(id);
                return true;
            }
        }
        if let Some(n) = rhs_lit {
            if neutral(n) {
                list.delete(rhs.unwrap());
                list.delete(id);
                return true;
            }
        }

        // Deciding literal operand: drop the operator and the sibling run.
        let deciding = |n: i64| (op == "&&" && n == 0) || (op == "||" && n != 0);
        if let Some(n) = lhs_lit {
            if deciding(n) {
                if let Some(stop) = run_end_forward(list, directive, id) {
                    let anchor = lhs.unwrap();
                    loop {
                        let Some(next) = list.next(anchor) else { break };
                        if Some(next) == stop {
                            break;
                        }
                        list.delete(next);
                    }
                    return true;
                }
            }
        }
        if let Some(n) = rhs_lit {
            if deciding(n) {
                if let Some(start) = run_start_backward(list, directive, id) {
                    loop {
                        let Some(prev) = list.prev(rhs.unwrap()) else { break };
                        if Some(prev) == start {
                            break;
                        }
                        if !same_line(list, directive, prev) || prev == directive {
                            break;
                        }
                        list.delete(prev);
                    }
                    return true;
                }
            }
        }
        cur = list.next(id);
    }
    false
}

/// End (exclusive) of the operand run after `op_tok`: the matching `)`,
/// the next same-depth `&&`/`||`, or the line end. `Some(None)` means "to
/// the end of the line"; `None` means unbalanced, refuse to prune.
fn run_end_forward(
    list: &TokenList,
    directive: TokenId,
    op_tok: TokenId,
) -> Option<Option<TokenId>> {
    let mut depth = 0i32;
    let mut cur = list.next(op_tok);
    while let Some(id) = cur {
        if !same_line(list, directive, id) {
            return Some(Some(id));
        }
        match list.str(id) {
            "(" => depth += 1,
            ")" => {
                if depth == 0 {
                    return Some(Some(id));
                }
                depth -= 1;
            }
            "&&" | "||" if depth == 0 => return Some(Some(id)),
            _ => {}
        }
        cur = list.next(id);
    }
    if depth == 0 {
        Some(None)
    } else {
        None
    }
}

/// Start (exclusive) of the operand run before `op_tok`, mirroring
/// [`run_end_forward`]. `Some(directive)` means the run starts the line.
fn run_start_backward(
    list: &TokenList,
    directive: TokenId,
    op_tok: TokenId,
) -> Option<Option<TokenId>> {
    let mut depth = 0i32;
    let mut cur = list.prev(op_tok);
    while let Some(id) = cur {
        if !same_line(list, directive, id) || id == directive {
            return Some(Some(id));
        }
        match list.str(id) {
            ")" => depth += 1,
            "(" => {
                if depth == 0 {
                    return Some(Some(id));
                }
                depth -= 1;
            }
            "&&" | "||" if depth == 0 => return Some(Some(id)),
            _ => {}
        }
        cur = list.prev(id);
    }
    if depth == 0 {
        Some(None)
    } else {
        None
    }
}

// ---------------------------------------------------------------------------
// Verdict
// ---------------------------------------------------------------------------

/// Verdict plus the split key for `New`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IfVerdict {
    pub result: AnalysisResult,
    pub config_name: Option<String>,
}

impl IfVerdict {
    fn of(result: AnalysisResult) -> Self {
        IfVerdict {
            result,
            config_name: None,
        }
    }

    fn split(name: String) -> Self {
        IfVerdict {
            result: AnalysisResult::New,
            config_name: Some(name),
        }
    }
}

/// Analyzes the `#if`/`#elif`/`#else` whose `#` token is `hash`.
///
/// `if_decisions` is the stack of taken-branch decisions for the enclosing
/// chains; the top entry refers to this chain for `elif`/`else`.
pub fn analyze_if(
    list: &mut TokenList,
    table: &MacroTable,
    if_decisions: &[bool],
    mode: SplitMode,
    hash: TokenId,
) -> IfVerdict {
    let Some(directive) = list.next(hash) else {
        return IfVerdict::of(AnalysisResult::Unhandled);
    };

    match list.str(directive) {
        "else" => {
            // A taken sibling starves the else.
            return if if_decisions.last().copied().unwrap_or(true) {
                IfVerdict::of(AnalysisResult::Conflict)
            } else {
                IfVerdict::of(AnalysisResult::Known)
            };
        }
        "elif" => {
            if if_decisions.last().copied().unwrap_or(true) {
                return IfVerdict::of(AnalysisResult::Conflict);
            }
        }
        "if" => {
            if let Some(verdict) = header_guard(list, table, hash, directive) {
                return verdict;
            }
        }
        _ => return IfVerdict::of(AnalysisResult::Unhandled),
    }

    simplify_condition(list, table, mode, directive);

    let Some(first) = cond_first(list, directive) else {
        return IfVerdict::of(AnalysisResult::Unhandled);
    };
    let line_end = list.line_end(directive);

    // Fully folded?
    if first == line_end {
        if let Some(n) = parse_int(list.str(first)) {
            return if n == 0 {
                IfVerdict::of(AnalysisResult::Conflict)
            } else {
                IfVerdict::of(AnalysisResult::Known)
            };
        }
    }

    // Skip grouping and negation to find the split subject.
    let mut tok = first;
    while matches!(list.str(tok), "(" | "!") {
        match list.next(tok) {
            Some(n) => tok = n,
            None => return IfVerdict::of(AnalysisResult::Unhandled),
        }
    }

    if list.str(tok) == "defined" {
        let name = if list.str_at(tok, 1) == "(" {
            list.str_at(tok, 2)
        } else {
            list.str_at(tok, 1)
        };
        if !name.is_empty() {
            return IfVerdict::split(name.to_string());
        }
        return IfVerdict::of(AnalysisResult::Unhandled);
    }

    let chain_op = |id: TokenId| -> bool {
        list.next(id)
            .map(|n| matches!(list.str(n), "&&" | "||"))
            .unwrap_or(false)
    };

    // Bare identifier: truth means "defined and nonzero".
    if list.tok(tok).is_name() && (tok == line_end || chain_op(tok)) {
        let name = list.str(tok).to_string();
        return bare_name_verdict(table, mode, &name);
    }

    // NAME <op> NUM, or NUM <op> NAME flipped.
    if let Some(verdict) = comparison_verdict(list, table, mode, tok, line_end) {
        return verdict;
    }

    IfVerdict::of(AnalysisResult::Unhandled)
}

fn bare_name_verdict(table: &MacroTable, mode: SplitMode, name: &str) -> IfVerdict {
    match table.analyze(name, mode) {
        // An undefined identifier evaluates as 0, which is false.
        AnalysisResult::Conflict => IfVerdict::of(AnalysisResult::Conflict),
        AnalysisResult::Known => match table.assumed_defs.get(name).and_then(|p| parse_predicate(p))
        {
            Some(assumption) => IfVerdict::of(entailment(assumption, (CmpOp::Ne, 0))),
            // Defined, value unfixed: split on the truth value.
            None => IfVerdict::split(format!("{}!=0", name)),
        },
        AnalysisResult::New => IfVerdict::split(format!("{}!=0", name)),
        AnalysisResult::Unhandled => IfVerdict::of(AnalysisResult::Unhandled),
    }
}

fn comparison_verdict(
    list: &TokenList,
    table: &MacroTable,
    mode: SplitMode,
    tok: TokenId,
    line_end: TokenId,
) -> Option<IfVerdict> {
    let op_tok = list.next(tok)?;
    let rhs_tok = list.next(op_tok)?;
    if rhs_tok != line_end && !matches!(list.str_at(rhs_tok, 1), "&&" | "||") {
        return None;
    }
    let op = CmpOp::parse(list.str(op_tok))?;

    let (name, op, num) = if list.tok(tok).is_name() {
        (list.str(tok), op, parse_int(list.str(rhs_tok))?)
    } else if list.tok(rhs_tok).is_name() {
        (list.str(rhs_tok), op.flip(), parse_int(list.str(tok))?)
    } else {
        return None;
    };

    match table.analyze(name, mode) {
        // Undefined: the name evaluates as 0.
        AnalysisResult::Conflict => Some(IfVerdict::of(if op.eval(0, num) {
            AnalysisResult::Known
        } else {
            AnalysisResult::Conflict
        })),
        AnalysisResult::Known => {
            match table.assumed_defs.get(name).and_then(|p| parse_predicate(p)) {
                Some(assumption) => Some(IfVerdict::of(entailment(assumption, (op, num)))),
                // Assumed defined with unknown value: refine the split.
                None if table.defs.contains_key(name) => {
                    Some(IfVerdict::of(AnalysisResult::Unhandled))
                }
                None => Some(IfVerdict::split(format!("{}{}{}", name, op.as_str(), num))),
            }
        }
        AnalysisResult::New => Some(IfVerdict::split(format!("{}{}{}", name, op.as_str(), num))),
        AnalysisResult::Unhandled => Some(IfVerdict::of(AnalysisResult::Unhandled)),
    }
}

/// Recognizes `#if ! defined ( X )` + `# define X` guarding a whole file.
fn header_guard(
    list: &TokenList,
    table: &MacroTable,
    hash: TokenId,
    directive: TokenId,
) -> Option<IfVerdict> {
    if list.str_at(directive, 1) != "!"
        || list.str_at(directive, 2) != "defined"
        || list.str_at(directive, 3) != "("
        || list.str_at(directive, 5) != ")"
        || list.str_at(directive, 6) != "#"
        || list.str_at(directive, 7) != "define"
    {
        return None;
    }
    let guard = list.str_at(directive, 4);
    let defined_name = list.at(directive, 8)?;
    if list.str(defined_name) != guard {
        return None;
    }
    // The define line must be exactly `# define X`.
    let define_tok = list.at(directive, 7)?;
    if list.line_end(define_tok) != defined_name {
        return None;
    }
    // The chain must be a plain #if/#endif pair...
    let closer = list.link(hash)?;
    if list.str_at(closer, 1) != "endif" {
        return None;
    }
    // ...opening at the top of its file.
    if let Some(before) = list.prev(hash) {
        if list.tok(before).file == list.tok(hash).file {
            return None;
        }
    }

    if table.defs.contains_key(guard) {
        // Second inclusion: skip the whole body.
        Some(IfVerdict::of(AnalysisResult::Conflict))
    } else {
        Some(IfVerdict::of(AnalysisResult::Known))
    }
}
