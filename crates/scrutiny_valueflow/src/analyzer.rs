//! The analyzer contract and the forward/reverse drivers.
//!
//! An [`Analyzer`] tracks the values of one entity — a variable, an
//! expression, a container, or a set of injected parameters — while a
//! driver walks tokens. At each token [`Analyzer::analyze`] classifies what
//! the token does to the tracked entity as an [`Action`] set; the driver
//! dispatches on it:
//!
//! | action | driver response |
//! |--------|-----------------|
//! | `READ` | current values are attached via `set_token_value` |
//! | `WRITE` | the tracked values are replaced/adjusted |
//! | `IDEMPOTENT` | a write storing what is already tracked; no-op |
//! | `INCONCLUSIVE` | tracking continues with downgraded certainty |
//! | `INVALID` | tracking ends at this token |
//!
//! The forward driver descends into conditional constructs by *forking*
//! the analyzer: the fork's values are downgraded to conditional-possible
//! (`assume`), the branch is walked, and at the join the surviving branch
//! values are merged back — a branch that writes demotes the mainline
//! values to Possible, a branch that exits early contributes nothing but
//! lets the opposite assumption continue. Idempotent writes converge
//! loops instead of invalidating them.
//!
//! The reverse driver walks backwards from a condition toward the scope
//! start, attaching values until the defining write.

use crate::fold::set_token_value;
use crate::programmemory::{self, ProgramMemory};
use crate::symbols::{same_expression, SymbolDatabase};
use scrutiny_base::{TokenId, TokenList, Value};
use std::collections::HashMap;
use std::ops::BitOr;

/// What a token does to the tracked entity. A small bitset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Action(u8);

impl Action {
    pub const NONE: Action = Action(0);
    pub const READ: Action = Action(1);
    pub const WRITE: Action = Action(2);
    pub const MATCH: Action = Action(4);
    pub const INVALID: Action = Action(8);
    pub const INCONCLUSIVE: Action = Action(16);
    pub const IDEMPOTENT: Action = Action(32);

    pub fn contains(self, other: Action) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_none(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for Action {
    type Output = Action;
    fn bitor(self, rhs: Action) -> Action {
        Action(self.0 | rhs.0)
    }
}

/// What entity an [`Analyzer`] tracks.
#[derive(Debug, Clone)]
pub enum AnalyzerKind {
    /// One variable by var-id.
    Variable { var_id: u32 },
    /// Every occurrence of a structurally identical expression.
    Expression { root: TokenId },
    /// A sized container variable; writes adjust the size.
    Container { var_id: u32 },
    /// Injected parameter bindings of one call combination.
    Multi { vars: HashMap<u32, Vec<Value>> },
}

/// Value tracker passed to the drivers. See the module docs.
#[derive(Debug, Clone)]
pub struct Analyzer {
    pub kind: AnalyzerKind,
    /// The values being forwarded (unused for `Multi`).
    pub values: Vec<Value>,
    pub pm: ProgramMemory,
}

impl Analyzer {
    pub fn variable(var_id: u32, values: Vec<Value>) -> Self {
        Analyzer {
            kind: AnalyzerKind::Variable { var_id },
            values,
            pm: ProgramMemory::new(),
        }
    }

    pub fn expression(root: TokenId, values: Vec<Value>) -> Self {
        Analyzer {
            kind: AnalyzerKind::Expression { root },
            values,
            pm: ProgramMemory::new(),
        }
    }

    pub fn container(var_id: u32, values: Vec<Value>) -> Self {
        Analyzer {
            kind: AnalyzerKind::Container { var_id },
            values,
            pm: ProgramMemory::new(),
        }
    }

    pub fn multi(vars: HashMap<u32, Vec<Value>>) -> Self {
        Analyzer {
            kind: AnalyzerKind::Multi { vars },
            values: Vec::new(),
            pm: ProgramMemory::new(),
        }
    }

    fn tracked_var(&self) -> Option<u32> {
        match &self.kind {
            AnalyzerKind::Variable { var_id } | AnalyzerKind::Container { var_id } => {
                Some(*var_id)
            }
            _ => None,
        }
    }

    /// Does this token denote the tracked entity?
    pub fn matches(&self, list: &TokenList, tok: TokenId) -> bool {
        match &self.kind {
            AnalyzerKind::Variable { var_id } | AnalyzerKind::Container { var_id } => {
                list.tok(tok).var_id == *var_id
            }
            AnalyzerKind::Expression { root } => same_expression(list, tok, *root),
            AnalyzerKind::Multi { vars } => vars.contains_key(&list.tok(tok).var_id),
        }
    }

    /// The values to attach at a matching token.
    fn values_at(&self, list: &TokenList, tok: TokenId) -> Vec<Value> {
        match &self.kind {
            AnalyzerKind::Multi { vars } => vars
                .get(&list.tok(tok).var_id)
                .cloned()
                .unwrap_or_default(),
            _ => self.values.clone(),
        }
    }

    /// Classifies `tok`. See the module docs for the action meanings.
    pub fn analyze(&self, list: &TokenList, symbols: &SymbolDatabase, tok: TokenId) -> Action {
        let t = list.tok(tok);

        // A write to any variable the tracked expression reads kills it.
        if let AnalyzerKind::Expression { root } = &self.kind {
            if (t.is_assignment_op() || matches!(list.str(tok), "++" | "--"))
                && t.ast_op1
                    .map(|lhs| expression_reads_var(list, *root, list.tok(lhs).var_id))
                    .unwrap_or(false)
            {
                return Action::INVALID;
            }
        }

        if !self.matches(list, tok) {
            return Action::NONE;
        }

        let mut action = Action::MATCH;
        let Some(parent) = t.ast_parent else {
            return action | Action::READ;
        };
        let parent_tok = list.tok(parent);
        let parent_str = list.str(parent);

        // Address taken: the value is still read here, then anything can
        // happen through the alias.
        if parent_str == "&" && parent_tok.ast_op2.is_none() {
            return action | Action::READ | Action::INVALID;
        }

        if parent_tok.is_assignment_op() && parent_tok.ast_op1 == Some(tok) {
            if parent_str == "=" {
                let rhs_known = parent_tok
                    .ast_op2
                    .and_then(|rhs| self.evaluate(list, symbols, rhs));
                match rhs_known {
                    Some(n) => {
                        if self.single_tracked_int() == Some(n) {
                            return action | Action::IDEMPOTENT;
                        }
                        return action | Action::WRITE;
                    }
                    None => return Action::INVALID,
                }
            }
            // Compound assignment reads then writes.
            let rhs_known = parent_tok
                .ast_op2
                .and_then(|rhs| self.evaluate(list, symbols, rhs));
            return match rhs_known {
                Some(_) => action | Action::READ | Action::WRITE,
                None => action | Action::READ | Action::INVALID,
            };
        }

        if matches!(parent_str, "++" | "--") {
            return action | Action::READ | Action::WRITE;
        }

        // Passed to a function: the value is read at the argument token
        // even when the call ends the tracking.
        if let Some(call) = enclosing_call(list, tok) {
            if argument_may_modify(list, symbols, call, tok) {
                return action | Action::READ | Action::INVALID;
            }
        }

        // Container mutators.
        if let AnalyzerKind::Container { .. } = self.kind {
            if parent_str == "." {
                let method = parent_tok.ast_op2.map(|m| list.str(m)).unwrap_or("");
                return match method {
                    "push_back" | "pop_back" | "emplace_back" => action | Action::WRITE,
                    "clear" | "resize" | "assign" | "insert" | "erase" => Action::INVALID,
                    _ => action | Action::READ,
                };
            }
        }

        action = action | Action::READ;
        action
    }

    /// Best-effort evaluation of a subtree under the tracked state.
    pub fn evaluate(
        &self,
        list: &TokenList,
        symbols: &SymbolDatabase,
        tok: TokenId,
    ) -> Option<i64> {
        let mut pm = self.pm.clone();
        if let Some(var) = self.tracked_var() {
            if let Some(n) = self.single_tracked_int() {
                pm.set_int(var, n);
            }
        }
        programmemory::execute(list, symbols, &mut pm, tok)
    }

    fn single_tracked_int(&self) -> Option<i64> {
        if self.values.len() != 1 || !self.values[0].is_known() {
            return None;
        }
        self.values[0].int_value()
    }

    /// Entering a conditional scope: record the assumption, downgrade the
    /// carried certainty, and extend every error path.
    pub fn assume(&mut self, list: &TokenList, cond: TokenId, state: bool) {
        programmemory::assume_condition(list, &mut self.pm, cond, state);
        let note = format!("Assuming condition is {}", if state { "true" } else { "false" });
        for v in self.values.iter_mut() {
            v.make_conditional();
            v.push_path(cond, note.clone());
        }
        if let AnalyzerKind::Multi { vars } = &mut self.kind {
            for values in vars.values_mut() {
                for v in values.iter_mut() {
                    v.make_conditional();
                }
            }
        }
    }

    /// Applies a write at `tok` (an lhs occurrence). Returns false when the
    /// value cannot be tracked past the write.
    fn write(&mut self, list: &TokenList, symbols: &SymbolDatabase, tok: TokenId) -> bool {
        let Some(parent) = list.tok(tok).ast_parent else {
            return false;
        };
        let parent_str = list.str(parent).to_string();

        if let AnalyzerKind::Container { .. } = self.kind {
            if parent_str == "." {
                let method = list.tok(parent).ast_op2.map(|m| list.str(m)).unwrap_or("");
                let delta = match method {
                    "push_back" | "emplace_back" => 1,
                    "pop_back" => -1,
                    _ => return false,
                };
                for v in self.values.iter_mut() {
                    if let scrutiny_base::ValuePayload::ContainerSize(n) = v.payload {
                        v.payload = scrutiny_base::ValuePayload::ContainerSize(n + delta);
                        v.push_path(tok, format!("{} changes size", method));
                    }
                }
                return true;
            }
        }

        match parent_str.as_str() {
            "=" => {
                let rhs = list.tok(parent).ast_op2;
                let Some(n) = rhs.and_then(|r| self.evaluate(list, symbols, r)) else {
                    return false;
                };
                let mut v = Value::known_int(n);
                if self.values.iter().any(|old| old.conditional) {
                    v.make_conditional();
                }
                v.push_path(tok, format!("{} is assigned {}", list.str(tok), n));
                self.values = vec![v];
                if let Some(var) = self.tracked_var() {
                    self.pm.set_int(var, n);
                }
                true
            }
            "++" | "--" => {
                let delta = if parent_str == "++" { 1 } else { -1 };
                for v in self.values.iter_mut() {
                    if let scrutiny_base::ValuePayload::Int(n) = v.payload {
                        match n.checked_add(delta) {
                            Some(next) => {
                                v.payload = scrutiny_base::ValuePayload::Int(next);
                                let verb = if delta > 0 { "incremented" } else { "decremented" };
                                v.push_path(tok, format!("{} is {}", list.str(tok), verb));
                            }
                            None => return false,
                        }
                    }
                }
                if let Some(var) = self.tracked_var() {
                    if let Some(n) = self.single_tracked_int() {
                        self.pm.set_int(var, n);
                    } else {
                        self.pm.erase(var);
                    }
                }
                true
            }
            "+=" | "-=" | "*=" | "/=" | "%=" | "&=" | "|=" | "^=" | "<<=" | ">>=" => {
                let rhs = list.tok(parent).ast_op2;
                let Some(n) = rhs.and_then(|r| self.evaluate(list, symbols, r)) else {
                    return false;
                };
                let op = &parent_str[..parent_str.len() - 1];
                for v in self.values.iter_mut() {
                    if let Some(old) = v.int_value() {
                        match apply_compound(op, old, n) {
                            Some(next) => {
                                v.payload = scrutiny_base::ValuePayload::Int(next);
                                v.push_path(
                                    tok,
                                    format!("Compound assignment '{}', value is {}", parent_str, next),
                                );
                            }
                            None => return false,
                        }
                    }
                }
                true
            }
            _ => false,
        }
    }
}

fn apply_compound(op: &str, lhs: i64, rhs: i64) -> Option<i64> {
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
        _ => return None,
    })
}

/// Does the tracked expression read `var_id`?
fn expression_reads_var(list: &TokenList, root: TokenId, var_id: u32) -> bool {
    if var_id == 0 {
        return false;
    }
    let t = list.tok(root);
    if t.var_id == var_id {
        return true;
    }
    [t.ast_op1, t.ast_op2]
        .into_iter()
        .flatten()
        .any(|op| expression_reads_var(list, op, var_id))
}

/// The `(` of the call this token is an argument of, if any.
fn enclosing_call(list: &TokenList, tok: TokenId) -> Option<TokenId> {
    let mut cur = list.tok(tok).ast_parent;
    while let Some(id) = cur {
        if list.str(id) == "(" {
            let callee = list.tok(id).ast_op1?;
            if list.tok(callee).is_name() && list.tok(callee).var_id == 0 {
                return Some(id);
            }
            return None;
        }
        // Only comma chains and grouping keep us inside an argument list.
        if !matches!(list.str(id), "," ) {
            return None;
        }
        cur = list.tok(id).ast_parent;
    }
    None
}

/// Could the call modify the variable at `arg_tok`? By-value scalars
/// cannot; references, pointers, arrays, and unknown callees with
/// indirection can.
fn argument_may_modify(
    list: &TokenList,
    symbols: &SymbolDatabase,
    call: TokenId,
    arg_tok: TokenId,
) -> bool {
    let var = symbols.variable(list.tok(arg_tok).var_id);
    let indirect = var
        .map(|v| v.is_pointer || v.is_array || v.is_reference)
        .unwrap_or(false);
    let callee_name = list
        .tok(call)
        .ast_op1
        .map(|c| list.str(c).to_string())
        .unwrap_or_default();
    match symbols.find_function(&callee_name) {
        Some(f) => {
            // Match the argument position to the parameter declaration.
            let index = argument_index(list, call, arg_tok);
            match index.and_then(|i| f.arg_var_ids.get(i)) {
                Some(&param_id) => {
                    let param = symbols.variable(param_id);
                    param
                        .map(|p| p.is_reference || (indirect && p.is_pointer))
                        .unwrap_or(indirect)
                }
                None => indirect,
            }
        }
        None => indirect,
    }
}

/// Zero-based position of `arg_tok` in the call's comma chain.
fn argument_index(list: &TokenList, call: TokenId, arg_tok: TokenId) -> Option<usize> {
    let args = list.tok(call).ast_op2?;
    let mut flat = Vec::new();
    flatten_args(list, args, &mut flat);
    flat.iter().position(|&root| {
        root == arg_tok || expression_reads_var(list, root, list.tok(arg_tok).var_id)
    })
}

fn flatten_args(list: &TokenList, root: TokenId, out: &mut Vec<TokenId>) {
    if list.str(root) == "," {
        let t = list.tok(root);
        if let Some(op1) = t.ast_op1 {
            flatten_args(list, op1, out);
        }
        if let Some(op2) = t.ast_op2 {
            flatten_args(list, op2, out);
        }
    } else {
        out.push(root);
    }
}

// ---------------------------------------------------------------------------
// Forward driver
// ---------------------------------------------------------------------------

/// Result of one forward walk.
#[derive(Debug)]
pub struct ForwardResult {
    /// Values alive at the end of the range, `None` when tracking was
    /// invalidated inside it.
    pub values: Option<Vec<Value>>,
    /// A matching write happened somewhere in the range.
    pub wrote: bool,
    /// The range ended in `return`/`break`/`continue`/`goto` on all paths.
    pub exited: bool,
}

impl ForwardResult {
    fn stopped(wrote: bool) -> Self {
        ForwardResult {
            values: None,
            wrote,
            exited: false,
        }
    }
}

/// Walks tokens `[start, stop)` forward, attaching and updating values.
pub fn forward(
    list: &mut TokenList,
    symbols: &SymbolDatabase,
    start: TokenId,
    stop: Option<TokenId>,
    analyzer: &mut Analyzer,
) -> ForwardResult {
    let mut wrote = false;
    let mut cur = Some(start);

    while let Some(tok) = cur {
        if Some(tok) == stop {
            break;
        }
        let text = list.str(tok).to_string();

        match text.as_str() {
            "if" => {
                match forward_if(list, symbols, tok, analyzer) {
                    ControlFlow::Continue { after, wrote: w } => {
                        wrote |= w;
                        cur = after;
                        continue;
                    }
                    ControlFlow::Stop { wrote: w } => return ForwardResult::stopped(wrote | w),
                }
            }
            "while" | "for" => {
                match forward_loop(list, symbols, tok, analyzer) {
                    ControlFlow::Continue { after, wrote: w } => {
                        wrote |= w;
                        cur = after;
                        continue;
                    }
                    ControlFlow::Stop { wrote: w } => return ForwardResult::stopped(wrote | w),
                }
            }
            "switch" => {
                // Conservative: a switch that touches the entity ends the
                // analysis; one that does not is skipped wholesale.
                let Some(end) = construct_end(list, tok) else {
                    return ForwardResult::stopped(wrote);
                };
                if range_touches(list, symbols, tok, Some(end), analyzer) {
                    return ForwardResult::stopped(wrote);
                }
                cur = Some(end);
                continue;
            }
            "}" => {
                // Leaving a then-branch mid-walk: the else body belongs to
                // the opposite path and must not be walked with these
                // values. When the walk was bounded to the branch, the
                // stop lands on the `else` itself and no skip is needed.
                let next = list.next(tok);
                if next.map(|t| list.str(t) == "else").unwrap_or(false) && next != stop {
                    match skip_else_chain(list, next.unwrap()) {
                        Some(after) => {
                            cur = after;
                            continue;
                        }
                        None => return ForwardResult::stopped(wrote),
                    }
                }
            }
            "return" | "break" | "continue" | "goto" => {
                // The expression is still read before control leaves.
                let mut t = list.next(tok);
                while let Some(id) = t {
                    if Some(id) == stop || list.str(id) == ";" {
                        break;
                    }
                    step_token(list, symbols, id, analyzer, &mut wrote);
                    t = list.next(id);
                }
                return ForwardResult {
                    values: Some(analyzer.values.clone()),
                    wrote,
                    exited: true,
                };
            }
            _ => {}
        }

        match step_token(list, symbols, tok, analyzer, &mut wrote) {
            StepOutcome::Continue => {}
            StepOutcome::Stop => return ForwardResult::stopped(wrote),
        }
        cur = list.next(tok);
    }

    ForwardResult {
        values: Some(analyzer.values.clone()),
        wrote,
        exited: false,
    }
}

enum StepOutcome {
    Continue,
    Stop,
}

fn step_token(
    list: &mut TokenList,
    symbols: &SymbolDatabase,
    tok: TokenId,
    analyzer: &mut Analyzer,
    wrote: &mut bool,
) -> StepOutcome {
    let action = analyzer.analyze(list, symbols, tok);
    if action.contains(Action::MATCH) && action.contains(Action::READ) {
        for v in analyzer.values_at(list, tok) {
            set_token_value(list, symbols, tok, v);
        }
    }
    if action.contains(Action::INVALID) {
        return StepOutcome::Stop;
    }
    if !action.contains(Action::MATCH) {
        return StepOutcome::Continue;
    }
    if action.contains(Action::IDEMPOTENT) {
        return StepOutcome::Continue;
    }
    if action.contains(Action::WRITE) {
        *wrote = true;
        if !analyzer.write(list, symbols, tok) {
            return StepOutcome::Stop;
        }
    }
    if action.contains(Action::INCONCLUSIVE) {
        for v in analyzer.values.iter_mut() {
            v.kind = scrutiny_base::ValueKind::Inconclusive;
        }
    }
    StepOutcome::Continue
}

enum ControlFlow {
    Continue {
        after: Option<TokenId>,
        wrote: bool,
    },
    Stop {
        wrote: bool,
    },
}

/// The branch geometry of an `if`: condition root, then-range, optional
/// else-range, first token after the construct.
struct IfShape {
    cond_root: Option<TokenId>,
    then_range: (TokenId, TokenId),
    else_range: Option<(TokenId, TokenId)>,
    after: Option<TokenId>,
}

fn if_shape(list: &TokenList, if_tok: TokenId) -> Option<IfShape> {
    let lparen = list.next(if_tok).filter(|t| list.str(*t) == "(")?;
    let rparen = list.link(lparen)?;
    let cond_root = condition_root(list, lparen, rparen);
    let then_open = list.next(rparen).filter(|t| list.str(*t) == "{")?;
    let then_close = list.link(then_open)?;

    let mut after = list.next(then_close);
    let mut else_range = None;
    if after.map(|t| list.str(t)) == Some("else") {
        let else_tok = after.unwrap();
        let next = list.next(else_tok)?;
        if list.str(next) == "{" {
            let else_close = list.link(next)?;
            else_range = Some((next, else_close));
            after = list.next(else_close);
        } else if list.str(next) == "if" {
            // else-if: treat the nested if as the else body.
            let nested = if_shape(list, next)?;
            let close = nested.after.and_then(|t| list.prev(t)).or_else(|| list.back())?;
            else_range = Some((next, close));
            after = nested.after;
        } else {
            return None;
        }
    }

    Some(IfShape {
        cond_root,
        then_range: (then_open, then_close),
        else_range,
        after,
    })
}

/// The parentless token inside `( … )` — the condition's AST root.
pub fn condition_root(list: &TokenList, lparen: TokenId, rparen: TokenId) -> Option<TokenId> {
    let mut cur = list.next(lparen);
    let mut best = None;
    while let Some(id) = cur {
        if id == rparen {
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

fn forward_if(
    list: &mut TokenList,
    symbols: &SymbolDatabase,
    if_tok: TokenId,
    analyzer: &mut Analyzer,
) -> ControlFlow {
    let Some(shape) = if_shape(list, if_tok) else {
        // Unbraced or malformed. A write in the controlled statement would
        // be applied unconditionally by the plain walk, so bail out then;
        // a read-only statement is safe to walk through.
        if let Some(rparen) = list
            .next(if_tok)
            .filter(|t| list.str(*t) == "(")
            .and_then(|lp| list.link(lp))
        {
            let stmt_end = statement_semicolon(list, list.next(rparen));
            if range_writes(list, symbols, rparen, stmt_end, analyzer) {
                return ControlFlow::Stop { wrote: false };
            }
        }
        return ControlFlow::Continue {
            after: list.next(if_tok),
            wrote: false,
        };
    };

    // The condition itself is read first.
    let (then_open, then_close) = shape.then_range;
    let mut cond_cur = list.next(if_tok);
    let mut wrote = false;
    while let Some(id) = cond_cur {
        if id == then_open {
            break;
        }
        if let StepOutcome::Stop = step_token(list, symbols, id, analyzer, &mut wrote) {
            return ControlFlow::Stop { wrote };
        }
        cond_cur = list.next(id);
    }

    // Walk the then branch on a fork.
    let mut then_fork = analyzer.clone();
    if let Some(cond) = shape.cond_root {
        then_fork.assume(list, cond, true);
    }
    let then_stop = list.next(then_close);
    let then_res = forward(list, symbols, then_open, then_stop, &mut then_fork);
    if then_res.values.is_none() {
        return ControlFlow::Stop { wrote: wrote | then_res.wrote };
    }

    // And the else branch.
    let mut else_res = None;
    if let Some((else_open, else_close)) = shape.else_range {
        let mut else_fork = analyzer.clone();
        if let Some(cond) = shape.cond_root {
            else_fork.assume(list, cond, false);
        }
        let else_stop = list.next(else_close);
        let res = forward(list, symbols, else_open, else_stop, &mut else_fork);
        if res.values.is_none() {
            return ControlFlow::Stop { wrote: wrote | then_res.wrote | res.wrote };
        }
        else_res = Some((res, else_fork));
    }

    let then_wrote = then_res.wrote;
    let else_wrote = else_res.as_ref().map(|(r, _)| r.wrote).unwrap_or(false);
    let then_exited = then_res.exited;
    let else_exited = else_res.as_ref().map(|(r, _)| r.exited).unwrap_or(false);

    wrote |= then_wrote | else_wrote;

    if then_exited && else_exited {
        // Nothing flows past the construct.
        return ControlFlow::Stop { wrote };
    }

    // Merge: a branch that wrote demotes the mainline values; a surviving
    // written branch contributes its values; an exited branch contributes
    // the opposite assumption.
    if then_wrote || else_wrote {
        for v in analyzer.values.iter_mut() {
            v.change_known_to_possible();
        }
    }

    let mut merged = Vec::new();
    if then_exited {
        if let Some(cond) = shape.cond_root {
            analyzer.assume(list, cond, false);
        }
        if let Some((res, _)) = else_res {
            if res.wrote {
                merged.extend(res.values.unwrap_or_default());
            }
        }
        merged.extend(analyzer.values.clone());
    } else if else_exited {
        if let Some(cond) = shape.cond_root {
            analyzer.assume(list, cond, true);
        }
        if then_wrote {
            merged.extend(then_res.values.unwrap_or_default());
        }
        merged.extend(analyzer.values.clone());
    } else {
        merged.extend(analyzer.values.clone());
        if then_wrote {
            merged.extend(then_res.values.unwrap_or_default());
        }
        if let Some((res, _)) = else_res {
            if res.wrote {
                merged.extend(res.values.unwrap_or_default());
            }
        }
    }

    dedup_values(&mut merged);
    analyzer.values = merged;
    // Branch writes invalidate the concrete memory for the entity.
    if then_wrote || else_wrote {
        if let Some(var) = analyzer.tracked_var() {
            if analyzer.values.len() != 1 {
                analyzer.pm.erase(var);
            }
        }
    }

    ControlFlow::Continue {
        after: shape.after,
        wrote,
    }
}

fn forward_loop(
    list: &mut TokenList,
    symbols: &SymbolDatabase,
    loop_tok: TokenId,
    analyzer: &mut Analyzer,
) -> ControlFlow {
    let Some(lparen) = list.next(loop_tok).filter(|t| list.str(*t) == "(") else {
        return ControlFlow::Continue {
            after: list.next(loop_tok),
            wrote: false,
        };
    };
    let Some(rparen) = list.link(lparen) else {
        return ControlFlow::Stop { wrote: false };
    };
    let Some(body_open) = list.next(rparen).filter(|t| list.str(*t) == "{") else {
        return ControlFlow::Stop { wrote: false };
    };
    let Some(body_close) = list.link(body_open) else {
        return ControlFlow::Stop { wrote: false };
    };

    // Header reads (condition, step expressions).
    let mut wrote = false;
    let mut cur = list.next(loop_tok);
    while let Some(id) = cur {
        if id == body_open {
            break;
        }
        if analyzer
            .analyze(list, symbols, id)
            .contains(Action::WRITE)
        {
            // The loop drives the entity; the dedicated pass handles it.
            return ControlFlow::Stop { wrote };
        }
        if let StepOutcome::Stop = step_token(list, symbols, id, analyzer, &mut wrote) {
            return ControlFlow::Stop { wrote };
        }
        cur = list.next(id);
    }

    if range_writes(list, symbols, body_open, Some(body_close), analyzer) {
        // Values inside the body still hold until the write; walk a fork,
        // then stop tracking past the loop.
        let mut fork = analyzer.clone();
        let cond = condition_root(list, lparen, rparen);
        if let Some(cond) = cond {
            fork.assume(list, cond, true);
        }
        let body_stop = list.next(body_close);
        let res = forward(list, symbols, body_open, body_stop, &mut fork);
        return ControlFlow::Stop { wrote: wrote | res.wrote };
    }

    // Read-only body: values survive the loop.
    let mut fork = analyzer.clone();
    if let Some(cond) = condition_root(list, lparen, rparen) {
        fork.assume(list, cond, true);
    }
    let body_stop = list.next(body_close);
    let res = forward(list, symbols, body_open, body_stop, &mut fork);
    if res.values.is_none() {
        return ControlFlow::Stop { wrote };
    }

    ControlFlow::Continue {
        after: list.next(body_close),
        wrote,
    }
}

/// First token after an `else` (or `else if …` chain) body. The outer
/// `Some(None)` means the chain ends the list; `None` means the shape is
/// not braced and cannot be skipped safely.
fn skip_else_chain(list: &TokenList, else_tok: TokenId) -> Option<Option<TokenId>> {
    let mut cur = list.next(else_tok)?;
    loop {
        match list.str(cur) {
            "{" => {
                let close = list.link(cur)?;
                return Some(list.next(close));
            }
            "if" => {
                let lparen = list.next(cur).filter(|t| list.str(*t) == "(")?;
                let rparen = list.link(lparen)?;
                let then_open = list.next(rparen).filter(|t| list.str(*t) == "{")?;
                let then_close = list.link(then_open)?;
                match list.next(then_close) {
                    Some(next) if list.str(next) == "else" => {
                        cur = list.next(next)?;
                    }
                    other => return Some(other),
                }
            }
            _ => return None,
        }
    }
}

/// The `;` ending the unbraced statement starting at `from`.
fn statement_semicolon(list: &TokenList, from: Option<TokenId>) -> Option<TokenId> {
    let mut cur = from;
    while let Some(id) = cur {
        if list.str(id) == ";" {
            return Some(id);
        }
        cur = list.next(id);
    }
    None
}

/// First token after an `if`/`switch` statement's closing brace.
fn construct_end(list: &TokenList, keyword: TokenId) -> Option<TokenId> {
    let lparen = list.next(keyword).filter(|t| list.str(*t) == "(")?;
    let rparen = list.link(lparen)?;
    let body_open = list.next(rparen).filter(|t| list.str(*t) == "{")?;
    let body_close = list.link(body_open)?;
    list.next(body_close)
}

/// Does any token in the range write the tracked entity?
fn range_writes(
    list: &TokenList,
    symbols: &SymbolDatabase,
    start: TokenId,
    stop: Option<TokenId>,
    analyzer: &Analyzer,
) -> bool {
    let mut cur = Some(start);
    while let Some(id) = cur {
        if Some(id) == stop {
            break;
        }
        let action = analyzer.analyze(list, symbols, id);
        if action.contains(Action::WRITE) || action.contains(Action::INVALID) {
            return true;
        }
        cur = list.next(id);
    }
    false
}

/// Does any token in the range match or invalidate the tracked entity?
fn range_touches(
    list: &TokenList,
    symbols: &SymbolDatabase,
    start: TokenId,
    stop: Option<TokenId>,
    analyzer: &Analyzer,
) -> bool {
    let mut cur = Some(start);
    while let Some(id) = cur {
        if Some(id) == stop {
            break;
        }
        let action = analyzer.analyze(list, symbols, id);
        if !action.is_none() {
            return true;
        }
        cur = list.next(id);
    }
    false
}

fn dedup_values(values: &mut Vec<Value>) {
    let mut seen: Vec<Value> = Vec::new();
    values.retain(|v| {
        if seen.iter().any(|s| s.same_value(v)) {
            false
        } else {
            seen.push(v.clone());
            true
        }
    });
}

// ---------------------------------------------------------------------------
// Reverse driver
// ---------------------------------------------------------------------------

/// Walks backwards from `start` attaching `values` to matching tokens,
/// stopping at the defining write, an aliasing use, or the scope start.
pub fn reverse(
    list: &mut TokenList,
    symbols: &SymbolDatabase,
    start: TokenId,
    analyzer: &mut Analyzer,
) {
    let mut cur = list.prev(start);
    while let Some(tok) = cur {
        let text = list.str(tok).to_string();

        if text == "{" {
            // Scope start.
            return;
        }
        if text == "}" {
            // A sibling block; cross it only when it cannot write.
            let Some(open) = list.link(tok) else { return };
            if range_writes(list, symbols, open, list.next(tok), analyzer) {
                return;
            }
            cur = list.prev(open);
            continue;
        }
        if matches!(text.as_str(), "goto" | "case" | "default") {
            return;
        }

        if analyzer.matches(list, tok) {
            let t = list.tok(tok);
            let parent = t.ast_parent;
            let parent_str = parent.map(|p| list.str(p)).unwrap_or("");
            let is_lhs = parent.map(|p| list.tok(p).ast_op1 == Some(tok)).unwrap_or(false);

            if parent_str == "&" && parent.map(|p| list.tok(p).ast_op2.is_none()).unwrap_or(false) {
                return;
            }
            if (list.tok(tok).ast_parent.map(|p| list.tok(p).is_assignment_op()).unwrap_or(false))
                && is_lhs
            {
                // The defining write; values do not hold before it.
                return;
            }
            if matches!(parent_str, "++" | "--") {
                // Walking backwards across an increment shifts the value.
                let delta = if parent_str == "++" { -1 } else { 1 };
                for v in analyzer.values.iter_mut() {
                    if let scrutiny_base::ValuePayload::Int(n) = v.payload {
                        match n.checked_add(delta) {
                            Some(next) => v.payload = scrutiny_base::ValuePayload::Int(next),
                            None => return,
                        }
                    }
                }
            }
            if let Some(call) = enclosing_call(list, tok) {
                if argument_may_modify(list, symbols, call, tok) {
                    return;
                }
            }
            for v in analyzer.values_at(list, tok) {
                set_token_value(list, symbols, tok, v);
            }
        }

        cur = list.prev(tok);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scrutiny_base::list::{classify, Language};
    use scrutiny_base::{Token, ValueKind};

    fn prepare(code: &str) -> (TokenList, SymbolDatabase) {
        let mut list = TokenList::new(Language::Cpp);
        let file = list.add_file("test.cpp");
        for word in code.split_whitespace() {
            list.push(Token::new(word, classify(word), file, 1));
        }
        let db = SymbolDatabase::build(&mut list);
        (list, db)
    }

    fn ints_at(list: &TokenList, tok: TokenId) -> Vec<i64> {
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

    fn last_use(list: &TokenList, name: &str) -> TokenId {
        list.iter().filter(|&id| list.str(id) == name).last().unwrap()
    }

    #[test]
    fn straight_line_forwarding() {
        let (mut list, db) = prepare("int x ; x = 3 ; y = x ;");
        let start = list.iter().find(|&id| list.str(id) == ";").unwrap();
        let mut analyzer = Analyzer::variable(1, vec![Value::known_int(3)]);
        // Start after `x = 3 ;`.
        let starts: Vec<TokenId> = list.iter().filter(|&id| list.str(id) == ";").collect();
        let _ = start;
        let start = list.next(starts[1]).unwrap();
        forward(&mut list, &db, start, None, &mut analyzer);
        let x = last_use(&list, "x");
        assert_eq!(ints_at(&list, x), vec![3]);
        assert!(list.tok(x).values[0].is_known());
    }

    #[test]
    fn write_replaces_value() {
        let (mut list, db) = prepare("int x ; y = x ; x = 5 ; z = x ;");
        let semis: Vec<TokenId> = list.iter().filter(|&id| list.str(id) == ";").collect();
        let mut analyzer = Analyzer::variable(1, vec![Value::known_int(3)]);
        let start = list.next(semis[0]).unwrap();
        forward(&mut list, &db, start, None, &mut analyzer);
        let x = last_use(&list, "x");
        assert_eq!(ints_at(&list, x), vec![5]);
    }

    #[test]
    fn conditional_write_merges_both_values() {
        let (mut list, db) = prepare("int x ; x = 3 ; if ( x > 0 ) { x = 5 ; } y = x ;");
        let semis: Vec<TokenId> = list.iter().filter(|&id| list.str(id) == ";").collect();
        let mut analyzer = Analyzer::variable(1, vec![Value::known_int(3)]);
        let start = list.next(semis[1]).unwrap();
        forward(&mut list, &db, start, None, &mut analyzer);
        let x = last_use(&list, "x");
        assert_eq!(ints_at(&list, x), vec![3, 5]);
        assert!(list.tok(x).values.iter().all(|v| v.is_possible()));
    }

    #[test]
    fn early_return_keeps_opposite_path() {
        let (mut list, db) = prepare("int x ; x = 3 ; if ( x > 9 ) { return ; } y = x ;");
        let semis: Vec<TokenId> = list.iter().filter(|&id| list.str(id) == ";").collect();
        let mut analyzer = Analyzer::variable(1, vec![Value::known_int(3)]);
        let start = list.next(semis[1]).unwrap();
        forward(&mut list, &db, start, None, &mut analyzer);
        let x = last_use(&list, "x");
        assert_eq!(ints_at(&list, x), vec![3]);
    }

    #[test]
    fn address_of_stops_tracking() {
        let (mut list, db) = prepare("int x ; x = 3 ; p = & x ; y = x ;");
        let semis: Vec<TokenId> = list.iter().filter(|&id| list.str(id) == ";").collect();
        let mut analyzer = Analyzer::variable(1, vec![Value::known_int(3)]);
        let start = list.next(semis[1]).unwrap();
        forward(&mut list, &db, start, None, &mut analyzer);
        let x = last_use(&list, "x");
        assert!(list.tok(x).values.is_empty());
    }

    #[test]
    fn compound_assignment_updates() {
        let (mut list, db) = prepare("int x ; x = 3 ; x += 4 ; y = x ;");
        let semis: Vec<TokenId> = list.iter().filter(|&id| list.str(id) == ";").collect();
        let mut analyzer = Analyzer::variable(1, vec![Value::known_int(3)]);
        let start = list.next(semis[1]).unwrap();
        forward(&mut list, &db, start, None, &mut analyzer);
        let x = last_use(&list, "x");
        assert_eq!(ints_at(&list, x), vec![7]);
    }

    #[test]
    fn increment_bumps_value() {
        let (mut list, db) = prepare("int x ; x = 3 ; x ++ ; y = x ;");
        let semis: Vec<TokenId> = list.iter().filter(|&id| list.str(id) == ";").collect();
        let mut analyzer = Analyzer::variable(1, vec![Value::known_int(3)]);
        let start = list.next(semis[1]).unwrap();
        forward(&mut list, &db, start, None, &mut analyzer);
        let x = last_use(&list, "x");
        assert_eq!(ints_at(&list, x), vec![4]);
    }

    #[test]
    fn idempotent_write_is_noop() {
        let (mut list, db) = prepare("int x ; x = 3 ; x = 3 ; y = x ;");
        let semis: Vec<TokenId> = list.iter().filter(|&id| list.str(id) == ";").collect();
        let mut analyzer = Analyzer::variable(1, vec![Value::known_int(3)]);
        let start = list.next(semis[1]).unwrap();
        let res = forward(&mut list, &db, start, None, &mut analyzer);
        assert!(res.values.is_some());
        let x = last_use(&list, "x");
        assert_eq!(ints_at(&list, x), vec![3]);
        assert!(list.tok(x).values[0].is_known());
    }

    #[test]
    fn by_value_call_does_not_invalidate() {
        let (mut list, db) = prepare("void f ( int a ) { } int x ; x = 3 ; f ( x ) ; y = x ;");
        let semis: Vec<TokenId> = list.iter().filter(|&id| list.str(id) == ";").collect();
        let x_var = list.tok(last_use(&list, "x")).var_id;
        let mut analyzer = Analyzer::variable(x_var, vec![Value::known_int(3)]);
        let start = list.next(semis[1]).unwrap();
        forward(&mut list, &db, start, None, &mut analyzer);
        let x = last_use(&list, "x");
        assert_eq!(ints_at(&list, x), vec![3]);
    }

    #[test]
    fn pointer_argument_invalidates() {
        let (mut list, db) = prepare("int * p ; p = q ; f ( p ) ; y = p ;");
        let semis: Vec<TokenId> = list.iter().filter(|&id| list.str(id) == ";").collect();
        let mut analyzer = Analyzer::variable(1, vec![Value::known_int(0)]);
        let start = list.next(semis[1]).unwrap();
        forward(&mut list, &db, start, None, &mut analyzer);
        let p = last_use(&list, "p");
        assert!(list.tok(p).values.is_empty());
    }

    #[test]
    fn loop_with_write_stops_after() {
        let (mut list, db) = prepare("int x ; x = 3 ; while ( c ) { x = f ( ) ; } y = x ;");
        let semis: Vec<TokenId> = list.iter().filter(|&id| list.str(id) == ";").collect();
        let mut analyzer = Analyzer::variable(1, vec![Value::known_int(3)]);
        let start = list.next(semis[1]).unwrap();
        forward(&mut list, &db, start, None, &mut analyzer);
        let x = last_use(&list, "x");
        assert!(list.tok(x).values.is_empty());
    }

    #[test]
    fn reverse_attaches_until_write() {
        let (mut list, db) = prepare("int x ; x = g ( ) ; a = x ; b = x ; if ( x == 5 ) { }");
        let eq5 = list
            .iter()
            .find(|&id| list.str(id) == "==")
            .unwrap();
        // Reverse from the condition's if-token.
        let if_tok = list.iter().find(|&id| list.str(id) == "if").unwrap();
        let mut v = Value::int(5);
        v.condition = Some(eq5);
        let mut analyzer = Analyzer::variable(1, vec![v]);
        reverse(&mut list, &db, if_tok, &mut analyzer);
        let uses: Vec<TokenId> = list.iter().filter(|&id| list.str(id) == "x").collect();
        // decl x, write x, a = x, b = x — the reads get the value, the
        // write boundary does not carry it backwards further.
        assert!(ints_at(&list, uses[2]).contains(&5));
        assert!(ints_at(&list, uses[3]).contains(&5));
        assert!(list.tok(uses[1]).values.is_empty());
    }

    #[test]
    fn expression_analyzer_invalidated_by_member_write() {
        let (mut list, db) = prepare("int a ; int b ; c = a + b ; a = 1 ; d = a + b ;");
        let plus_tokens: Vec<TokenId> = list.iter().filter(|&id| list.str(id) == "+").collect();
        let mut analyzer = Analyzer::expression(plus_tokens[0], vec![Value::known_int(10)]);
        let semis: Vec<TokenId> = list.iter().filter(|&id| list.str(id) == ";").collect();
        let start = list.next(semis[2]).unwrap();
        forward(&mut list, &db, start, None, &mut analyzer);
        // The write to `a` kills the expression value; the second a+b must
        // not carry 10.
        assert!(ints_at(&list, plus_tokens[1]).is_empty());
    }

    #[test]
    fn multi_analyzer_attaches_per_variable() {
        let (mut list, db) = prepare("int a ; int b ; c = a + b ;");
        let mut vars = HashMap::new();
        let mut va = Value::int(1);
        va.path = 7;
        let mut vb = Value::int(2);
        vb.path = 7;
        vars.insert(1, vec![va]);
        vars.insert(2, vec![vb]);
        let mut analyzer = Analyzer::multi(vars);
        let start = list.front().unwrap();
        forward(&mut list, &db, start, None, &mut analyzer);
        let plus = list.iter().find(|&id| list.str(id) == "+").unwrap();
        assert_eq!(ints_at(&list, plus), vec![3]);
        assert_eq!(list.tok(plus).values[0].path, 7);
    }

    #[test]
    fn assume_downgrades_and_notes() {
        let (list, _db) = prepare("int x ; if ( x > 0 ) { }");
        let gt = list.iter().find(|&id| list.str(id) == ">").unwrap();
        let mut analyzer = Analyzer::variable(1, vec![Value::known_int(3)]);
        analyzer.assume(&list, gt, true);
        assert_eq!(analyzer.values[0].kind, ValueKind::Possible);
        assert!(analyzer.values[0].conditional);
        assert!(analyzer.values[0].error_path[0].1.contains("true"));
    }
}
