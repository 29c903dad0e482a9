//! Symbols and AST links: the front-end contract the engine consumes.
//!
//! Value-flow runs after an external front-end has resolved names and
//! shaped expressions. That contract is small and concrete:
//!
//! - every `(`/`[`/`{` carries a mutual link to its closer,
//! - every use of a variable carries its declaration's `var_id`,
//! - every expression token carries `ast_parent`/`ast_op1`/`ast_op2`
//!   links forming an operator tree,
//! - [`SymbolDatabase`] lists variables (with type/storage classification),
//!   functions (with body spans), scopes, and enumerator constants.
//!
//! [`SymbolDatabase::build`] implements the contract for the C-like subset
//! the engine's tests exercise: declarations, assignments, control flow,
//! function definitions and calls, enums. It is deliberately not a full
//! parser — a real front-end replaces it by filling the same fields.
//!
//! ## AST shape
//!
//! The tree follows the conventions the fold-through step expects:
//! binary operators hold both operands, prefix/postfix operators hold one,
//! a call's `(` holds callee and comma-chained arguments, `?` holds the
//! condition and a `:` node holding both arms, and a cast's `(` holds the
//! casted expression with the type recorded on the side.

use scrutiny_base::list::Language;
use scrutiny_base::{TokenId, TokenKind, TokenList};
use std::collections::HashMap;

/// Integer width and signedness, for cast truncation and shift masking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntType {
    pub bits: u32,
    pub signed: bool,
}

/// One declared variable.
#[derive(Debug, Clone)]
pub struct Variable {
    pub var_id: u32,
    pub name: String,
    pub name_tok: TokenId,
    pub is_const: bool,
    pub is_static: bool,
    pub is_global: bool,
    pub is_argument: bool,
    pub is_pointer: bool,
    pub is_reference: bool,
    pub is_array: bool,
    /// `std::string`/`std::vector`-like sized container.
    pub is_container: bool,
    /// `std::unique_ptr`/`std::shared_ptr`.
    pub is_smart_pointer: bool,
    pub int_type: Option<IntType>,
    /// The `=` of the initializer, or the `{` of a brace initializer.
    pub init_tok: Option<TokenId>,
}

/// One function with a visible definition.
#[derive(Debug, Clone)]
pub struct Function {
    pub name: String,
    pub name_tok: TokenId,
    pub arg_var_ids: Vec<u32>,
    /// Body `{` and `}`.
    pub body: Option<(TokenId, TokenId)>,
}

/// The symbol side of the front-end contract.
#[derive(Debug, Default)]
pub struct SymbolDatabase {
    pub variables: Vec<Variable>,
    pub functions: Vec<Function>,
    /// Enumerator name → constant value.
    pub enums: HashMap<String, i64>,
    /// Cast `(` token → target type.
    pub casts: HashMap<TokenId, IntType>,
}

impl SymbolDatabase {
    pub fn variable(&self, var_id: u32) -> Option<&Variable> {
        if var_id == 0 {
            return None;
        }
        self.variables.get(var_id as usize - 1)
    }

    pub fn find_function(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|f| f.name == name)
    }

    /// Builds symbols and AST links over a reduced token list.
    pub fn build(list: &mut TokenList) -> SymbolDatabase {
        let mut db = SymbolDatabase::default();
        link_brackets(list);
        let mut binder = Binder::new(list, &mut db);
        binder.run();
        let statements = collect_statements(list);
        for span in statements {
            AstBuilder::new(list, &mut db).parse_span(span);
        }
        db
    }
}

/// Pairs `(`/`[`/`{` with their closers via mutual links. Directive pairs
/// are gone by now, so the stack only sees expression brackets.
fn link_brackets(list: &mut TokenList) {
    let mut stack: Vec<TokenId> = Vec::new();
    let mut cur = list.front();
    while let Some(id) = cur {
        match list.str(id) {
            "(" | "[" | "{" => stack.push(id),
            ")" | "]" | "}" => {
                if let Some(open) = stack.pop() {
                    let matches = matches!(
                        (list.str(open), list.str(id)),
                        ("(", ")") | ("[", "]") | ("{", "}")
                    );
                    if matches {
                        list.create_mutual_links(open, id);
                    }
                }
            }
            _ => {}
        }
        cur = list.next(id);
    }
}

const BASE_TYPES: &[&str] = &[
    "void", "char", "short", "int", "long", "float", "double", "bool", "wchar_t", "size_t",
    "int8_t", "int16_t", "int32_t", "int64_t", "uint8_t", "uint16_t", "uint32_t", "uint64_t",
];

const QUALIFIERS: &[&str] = &["const", "static", "extern", "unsigned", "signed", "volatile", "inline", "auto"];

fn int_type_of(type_words: &[&str]) -> Option<IntType> {
    let signed = !type_words.contains(&"unsigned");
    let bits = if type_words.contains(&"char") || type_words.contains(&"int8_t") || type_words.contains(&"uint8_t") {
        8
    } else if type_words.contains(&"short") || type_words.contains(&"int16_t") || type_words.contains(&"uint16_t") {
        16
    } else if type_words.contains(&"long") || type_words.contains(&"int64_t") || type_words.contains(&"uint64_t") || type_words.contains(&"size_t") {
        64
    } else if type_words.contains(&"int") || type_words.contains(&"int32_t") || type_words.contains(&"uint32_t") || type_words.contains(&"wchar_t") {
        32
    } else if type_words.contains(&"bool") {
        1
    } else if type_words.contains(&"unsigned") || type_words.contains(&"signed") {
        // Bare `unsigned x` means unsigned int.
        32
    } else {
        return None;
    };
    Some(IntType { bits, signed })
}

/// Declaration discovery and var-id assignment.
struct Binder<'a> {
    list: &'a mut TokenList,
    db: &'a mut SymbolDatabase,
    /// Innermost-last stack of name → var_id.
    scopes: Vec<HashMap<String, u32>>,
}

impl<'a> Binder<'a> {
    fn new(list: &'a mut TokenList, db: &'a mut SymbolDatabase) -> Self {
        Binder {
            list,
            db,
            scopes: vec![HashMap::new()],
        }
    }

    fn run(&mut self) {
        let mut cur = self.list.front();
        while let Some(id) = cur {
            cur = self.step(id);
        }
    }

    /// Processes the token at `id`, returning where to continue.
    fn step(&mut self, id: TokenId) -> Option<TokenId> {
        match self.list.str(id) {
            "{" => {
                self.scopes.push(HashMap::new());
                return self.list.next(id);
            }
            "}" => {
                if self.scopes.len() > 1 {
                    self.scopes.pop();
                }
                return self.list.next(id);
            }
            "enum" => {
                if let Some(next) = self.enum_definition(id) {
                    return Some(next);
                }
            }
            "std" => {
                if let Some(next) = self.std_declaration(id) {
                    return Some(next);
                }
            }
            _ => {}
        }

        if let Some(next) = self.declaration(id) {
            return Some(next);
        }

        // Plain use of a visible name.
        if self.list.tok(id).kind == TokenKind::Name && self.list.tok(id).var_id == 0 {
            if let Some(var_id) = self.lookup(self.list.str(id)) {
                self.list.tok_mut(id).var_id = var_id;
            }
        }
        self.list.next(id)
    }

    fn lookup(&self, name: &str) -> Option<u32> {
        for scope in self.scopes.iter().rev() {
            if let Some(&id) = scope.get(name) {
                return Some(id);
            }
        }
        None
    }

    /// `enum [Name] { A, B = 4, C };` — constant enumerators only.
    fn enum_definition(&mut self, enum_tok: TokenId) -> Option<TokenId> {
        let mut cur = self.list.next(enum_tok)?;
        if self.list.tok(cur).kind == TokenKind::Name {
            cur = self.list.next(cur)?;
        }
        if self.list.str(cur) != "{" {
            return None;
        }
        let close = self.list.link(cur)?;
        let mut value = 0i64;
        let mut tok = self.list.next(cur)?;
        while tok != close {
            if self.list.tok(tok).kind == TokenKind::Name {
                let name = self.list.str(tok).to_string();
                if self.list.str_at(tok, 1) == "=" {
                    if let Some(n) = parse_enum_int(self.list.str_at(tok, 2)) {
                        value = n;
                    }
                }
                self.db.enums.insert(name, value);
                value += 1;
            }
            tok = self.list.next(tok)?;
        }
        self.list.next(close)
    }

    /// `std :: string s ;` and friends — the library classes the engine
    /// models: sized containers and smart pointers.
    fn std_declaration(&mut self, std_tok: TokenId) -> Option<TokenId> {
        if self.list.str_at(std_tok, 1) != "::" {
            return None;
        }
        let class_tok = self.list.at(std_tok, 2)?;
        let class = self.list.str(class_tok).to_string();
        let is_container = matches!(
            class.as_str(),
            "string" | "wstring" | "vector" | "list" | "deque" | "set" | "map" | "array"
        );
        let is_smart_pointer = matches!(class.as_str(), "unique_ptr" | "shared_ptr");
        if !is_container && !is_smart_pointer {
            return None;
        }

        // Skip template arguments.
        let mut cur = self.list.next(class_tok)?;
        if self.list.str(cur) == "<" {
            let mut depth = 1;
            cur = self.list.next(cur)?;
            while depth > 0 {
                match self.list.str(cur) {
                    "<" => depth += 1,
                    ">" => depth -= 1,
                    ">>" => depth -= 2,
                    _ => {}
                }
                cur = self.list.next(cur)?;
            }
        }

        if !self.list.tok(cur).is_name() || self.list.tok(cur).var_id != 0 {
            return None;
        }
        let name_tok = cur;
        let after = self.list.next(cur);
        let init_tok = after.filter(|t| matches!(self.list.str(*t), "=" | "{"));

        let var_id = self.new_variable(Variable {
            var_id: 0,
            name: self.list.str(name_tok).to_string(),
            name_tok,
            is_const: false,
            is_static: false,
            is_global: self.scopes.len() == 1,
            is_argument: false,
            is_pointer: false,
            is_reference: false,
            is_array: false,
            is_container,
            is_smart_pointer,
            int_type: None,
            init_tok,
        });
        self.list.tok_mut(name_tok).var_id = var_id;
        after
    }

    /// Tries to read a declaration starting at `id`. Returns the token to
    /// continue from when one was consumed.
    fn declaration(&mut self, id: TokenId) -> Option<TokenId> {
        if !self.list.tok(id).is_name() {
            return None;
        }
        // Qualifier and base-type run.
        let mut qualifiers: Vec<String> = Vec::new();
        let mut cur = id;
        while QUALIFIERS.contains(&self.list.str(cur)) {
            qualifiers.push(self.list.str(cur).to_string());
            cur = self.list.next(cur)?;
        }
        let mut saw_base = false;
        while BASE_TYPES.contains(&self.list.str(cur)) {
            qualifiers.push(self.list.str(cur).to_string());
            saw_base = true;
            cur = self.list.next(cur)?;
        }
        let bare_signedness = qualifiers.iter().any(|q| q == "unsigned" || q == "signed");
        let bare_auto = qualifiers.iter().any(|q| q == "auto");
        if !saw_base && !bare_signedness && !bare_auto {
            return None;
        }

        let type_words: Vec<&str> = qualifiers.iter().map(String::as_str).collect();
        let int_type = int_type_of(&type_words);
        let is_const = type_words.contains(&"const");
        let is_static = type_words.contains(&"static");
        let is_global = self.scopes.len() == 1;

        // Declarators: `[*|&]* name ( [args] ) {` is a function definition,
        // otherwise `[*|&]* name [dims] [= init]` (`,`-separated).
        let mut first = true;
        loop {
            let mut is_pointer = false;
            let mut is_reference = false;
            while matches!(self.list.str(cur), "*" | "&") {
                if self.list.str(cur) == "*" {
                    is_pointer = true;
                } else {
                    is_reference = true;
                }
                cur = self.list.next(cur)?;
            }
            if !matches!(self.list.tok(cur).kind, TokenKind::Name) {
                return None;
            }
            let name_tok = cur;
            let name = self.list.str(cur).to_string();
            let after = self.list.next(cur);

            if first && after.map(|t| self.list.str(t)) == Some("(") {
                return self.function_definition(name, name_tok, after.unwrap());
            }
            first = false;

            let mut is_array = false;
            let mut next = after;
            while next.map(|t| self.list.str(t)) == Some("[") {
                is_array = true;
                let close = self.list.link(next.unwrap())?;
                next = self.list.next(close);
            }

            let mut init_tok = None;
            if next.map(|t| self.list.str(t)) == Some("=") {
                init_tok = next;
                // Skip the initializer expression.
                let mut depth = 0i32;
                let mut t = self.list.next(next.unwrap());
                while let Some(tt) = t {
                    match self.list.str(tt) {
                        "(" | "[" | "{" => depth += 1,
                        ")" | "]" | "}" => depth -= 1,
                        ";" | "," if depth == 0 => break,
                        _ => {}
                    }
                    t = self.list.next(tt);
                }
                next = t;
            } else if next.map(|t| self.list.str(t)) == Some("{") {
                // Brace initializer.
                init_tok = next;
                let close = self.list.link(next.unwrap())?;
                next = self.list.next(close);
            }

            let var_id = self.new_variable(Variable {
                var_id: 0,
                name: name.clone(),
                name_tok,
                is_const,
                is_static,
                is_global,
                is_argument: false,
                is_pointer,
                is_reference,
                is_array,
                is_container: false,
                is_smart_pointer: false,
                int_type,
                init_tok,
            });
            self.list.tok_mut(name_tok).var_id = var_id;

            match next.map(|t| self.list.str(t).to_string()).as_deref() {
                Some(",") => {
                    cur = self.list.next(next.unwrap())?;
                }
                _ => {
                    // Leave the `= init ;` tokens (or the `;`) for the
                    // normal walk so names in the initializer resolve.
                    return after;
                }
            }
        }
    }

    fn function_definition(
        &mut self,
        name: String,
        name_tok: TokenId,
        lparen: TokenId,
    ) -> Option<TokenId> {
        let rparen = self.list.link(lparen)?;
        let body_open = self.list.next(rparen)?;
        if self.list.str(body_open) != "{" {
            // Prototype; nothing to analyze.
            return self.list.next(rparen);
        }
        let body_close = self.list.link(body_open)?;

        // Parameters live in the body scope.
        self.scopes.push(HashMap::new());
        let mut arg_var_ids = Vec::new();
        let mut cur = self.list.next(lparen);
        while let Some(id) = cur {
            if id == rparen {
                break;
            }
            if self.list.tok(id).is_name()
                && !QUALIFIERS.contains(&self.list.str(id))
                && !BASE_TYPES.contains(&self.list.str(id))
                && matches!(self.list.str_at(id, 1), "," | ")" | "[")
            {
                let type_words: Vec<String> = param_type_words(self.list, lparen, id);
                let words: Vec<&str> = type_words.iter().map(String::as_str).collect();
                let var_id = self.new_variable(Variable {
                    var_id: 0,
                    name: self.list.str(id).to_string(),
                    name_tok: id,
                    is_const: words.contains(&"const"),
                    is_static: false,
                    is_global: false,
                    is_argument: true,
                    is_pointer: words.contains(&"*"),
                    is_reference: words.contains(&"&"),
                    is_array: self.list.str_at(id, 1) == "[",
                    is_container: false,
                    is_smart_pointer: false,
                    int_type: int_type_of(&words),
                    init_tok: None,
                });
                self.list.tok_mut(id).var_id = var_id;
                arg_var_ids.push(var_id);
            }
            cur = self.list.next(id);
        }

        self.db.functions.push(Function {
            name,
            name_tok,
            arg_var_ids,
            body: Some((body_open, body_close)),
        });

        // Continue inside the body; the scope pushed above is popped by the
        // body's closing brace, and the `{` must not push a second one.
        Some(body_open).and_then(|t| self.list.next(t))
    }

    fn new_variable(&mut self, mut var: Variable) -> u32 {
        let var_id = (self.db.variables.len() + 1) as u32;
        var.var_id = var_id;
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(var.name.clone(), var_id);
        }
        self.db.variables.push(var);
        var_id
    }
}

/// Type words (qualifiers, base types, `*`, `&`) preceding a parameter
/// name, scanning back no further than the opening parenthesis or comma.
fn param_type_words(list: &TokenList, lparen: TokenId, name: TokenId) -> Vec<String> {
    let mut words = Vec::new();
    let mut cur = list.prev(name);
    while let Some(id) = cur {
        if id == lparen || list.str(id) == "," {
            break;
        }
        words.push(list.str(id).to_string());
        cur = list.prev(id);
    }
    words
}

fn parse_enum_int(text: &str) -> Option<i64> {
    if let Some(hex) = text.strip_prefix("0x").or(text.strip_prefix("0X")) {
        return i64::from_str_radix(hex, 16).ok();
    }
    text.parse().ok()
}

// ---------------------------------------------------------------------------
// Statement discovery
// ---------------------------------------------------------------------------

/// A run of tokens forming one expression to be AST-linked.
#[derive(Debug, Clone, Copy)]
struct ExprSpan {
    first: TokenId,
    last: TokenId,
}

/// Collects the expression spans of every statement: assignments and calls,
/// `if`/`while`/`switch` conditions, `for` headers, `return` values,
/// declaration initializers.
fn collect_statements(list: &TokenList) -> Vec<ExprSpan> {
    let mut spans = Vec::new();
    let mut cur = list.front();
    while let Some(id) = cur {
        match list.str(id) {
            "if" | "while" | "switch" => {
                if let Some(lparen) = list.next(id).filter(|t| list.str(*t) == "(") {
                    if let Some(rparen) = list.link(lparen) {
                        push_span(list, &mut spans, list.next(lparen), Some(rparen));
                        cur = list.next(rparen);
                        continue;
                    }
                }
                cur = list.next(id);
            }
            "for" => {
                if let Some(lparen) = list.next(id).filter(|t| list.str(*t) == "(") {
                    if let Some(rparen) = list.link(lparen) {
                        // init ; cond ; step
                        let mut piece_start = list.next(lparen);
                        let mut t = piece_start;
                        while let Some(tt) = t {
                            if tt == rparen || list.str(tt) == ";" {
                                push_span(list, &mut spans, piece_start, Some(tt));
                                piece_start = list.next(tt);
                            }
                            if tt == rparen {
                                break;
                            }
                            t = list.next(tt);
                        }
                        cur = list.next(rparen);
                        continue;
                    }
                }
                cur = list.next(id);
            }
            "return" => {
                let start = list.next(id);
                let end = statement_end(list, start);
                push_span(list, &mut spans, start, end);
                cur = end;
                continue;
            }
            "case" => {
                // `case N :` — no expression tree needed.
                cur = list.next(id);
            }
            "{" | "}" | ";" | "else" | "do" | "break" | "continue" | "goto" | "default" | ":" => {
                cur = list.next(id);
            }
            _ => {
                // Expression statement or declaration. Strip the leading
                // type words so the span starts at the declarator.
                let mut start = id;
                if let Some(declarator) = skip_std_class(list, start) {
                    start = declarator;
                }
                while QUALIFIERS.contains(&list.str(start)) || BASE_TYPES.contains(&list.str(start))
                {
                    match list.next(start) {
                        Some(n) => start = n,
                        None => return spans,
                    }
                }
                // After type words, `*`/`&` belong to the declarator, not
                // an expression; without type words they are operators.
                let is_declaration = start != id;
                while is_declaration && matches!(list.str(start), "*" | "&") {
                    match list.next(start) {
                        Some(n) => start = n,
                        None => return spans,
                    }
                }
                let end = statement_end(list, Some(start));
                push_span(list, &mut spans, Some(start), end);
                cur = end;
                continue;
            }
        }
    }
    spans
}

/// If a `std :: class < … >` declaration type starts at `start`, the
/// declarator token after it. The declared name must already carry a
/// var-id (the binder ran first), which is what separates a declaration
/// from an expression like `std :: move ( x )`.
fn skip_std_class(list: &TokenList, start: TokenId) -> Option<TokenId> {
    if list.str(start) != "std" || list.str_at(start, 1) != "::" {
        return None;
    }
    let mut cur = list.at(start, 3)?;
    if list.str(cur) == "<" {
        let mut depth = 1;
        cur = list.next(cur)?;
        while depth > 0 {
            match list.str(cur) {
                "<" => depth += 1,
                ">" => depth -= 1,
                ">>" => depth -= 2,
                _ => {}
            }
            cur = list.next(cur)?;
        }
    }
    if list.tok(cur).is_name() && list.tok(cur).var_id != 0 {
        Some(cur)
    } else {
        None
    }
}

/// First token past the statement at `start` — the terminating `;`, a
/// block brace, or `None` at the end of the list. The boundary token is
/// never part of the expression.
fn statement_end(list: &TokenList, start: Option<TokenId>) -> Option<TokenId> {
    let mut depth = 0i32;
    let mut cur = start;
    while let Some(id) = cur {
        match list.str(id) {
            "(" | "[" => depth += 1,
            ")" | "]" => depth -= 1,
            "{" => {
                // A brace initializer inside an expression is skipped over;
                // a block brace ends the statement scan.
                if let Some(close) = list.link(id) {
                    if depth > 0 || looks_like_initializer(list, id) {
                        cur = list.next(close);
                        continue;
                    }
                }
                return Some(id);
            }
            "}" => return Some(id),
            ";" if depth == 0 => return Some(id),
            _ => {}
        }
        cur = list.next(id);
    }
    None
}

fn looks_like_initializer(list: &TokenList, brace: TokenId) -> bool {
    list.prev(brace).map(|t| list.str(t) == "=").unwrap_or(false)
}

fn push_span(
    list: &TokenList,
    spans: &mut Vec<ExprSpan>,
    first: Option<TokenId>,
    end_exclusive: Option<TokenId>,
) {
    let Some(mut first) = first else { return };
    // Declaration spans start at the declarator, not the type words.
    while QUALIFIERS.contains(&list.str(first)) || BASE_TYPES.contains(&list.str(first)) {
        match list.next(first) {
            Some(n) if Some(n) != end_exclusive => first = n,
            _ => return,
        }
    }
    let last = match end_exclusive {
        Some(end) if end == first => return,
        Some(end) => match list.prev(end) {
            Some(last) => last,
            None => return,
        },
        None => list.back().unwrap_or(first),
    };
    // Single-token spans still get parsed (a bare `x;` reads x).
    spans.push(ExprSpan { first, last });
}

// ---------------------------------------------------------------------------
// Expression AST
// ---------------------------------------------------------------------------

struct AstBuilder<'a> {
    list: &'a mut TokenList,
    db: &'a mut SymbolDatabase,
    cur: Option<TokenId>,
    stop: Option<TokenId>,
}

impl<'a> AstBuilder<'a> {
    fn new(list: &'a mut TokenList, db: &'a mut SymbolDatabase) -> Self {
        AstBuilder {
            list,
            db,
            cur: None,
            stop: None,
        }
    }

    fn parse_span(&mut self, span: ExprSpan) {
        self.cur = Some(span.first);
        self.stop = self.list.next(span.last);
        self.parse_expr(0);
    }

    fn peek(&self) -> Option<&str> {
        match self.cur {
            Some(id) if self.cur != self.stop => Some(self.list.str(id)),
            _ => None,
        }
    }

    fn advance(&mut self) -> Option<TokenId> {
        let id = self.cur?;
        if self.cur == self.stop {
            return None;
        }
        self.cur = self.list.next(id);
        Some(id)
    }

    fn link(&mut self, parent: TokenId, op1: Option<TokenId>, op2: Option<TokenId>) {
        self.list.tok_mut(parent).ast_op1 = op1;
        self.list.tok_mut(parent).ast_op2 = op2;
        if let Some(op1) = op1 {
            self.list.tok_mut(op1).ast_parent = Some(parent);
        }
        if let Some(op2) = op2 {
            self.list.tok_mut(op2).ast_parent = Some(parent);
        }
    }

    /// Binding power of a binary operator; `None` ends the expression.
    fn binary_precedence(op: &str) -> Option<(u8, bool)> {
        // (precedence, right-associative)
        Some(match op {
            "=" | "+=" | "-=" | "*=" | "/=" | "%=" | "&=" | "|=" | "^=" | "<<=" | ">>=" => (2, true),
            "?" => (3, true),
            "||" => (4, false),
            "&&" => (5, false),
            "|" => (6, false),
            "^" => (7, false),
            "&" => (8, false),
            "==" | "!=" => (9, false),
            "<" | "<=" | ">" | ">=" => (10, false),
            "<<" | ">>" => (11, false),
            "+" | "-" => (12, false),
            "*" | "/" | "%" => (13, false),
            _ => return None,
        })
    }

    fn parse_expr(&mut self, min_prec: u8) -> Option<TokenId> {
        let mut lhs = self.parse_unary()?;
        while let Some(op) = self.peek().map(str::to_string) {
            let Some((prec, right_assoc)) = Self::binary_precedence(&op) else {
                break;
            };
            if prec < min_prec {
                break;
            }
            let op_tok = self.advance()?;
            if op == "?" {
                // cond ? then : else — the `:` node carries the arms.
                let then_branch = self.parse_expr(0);
                let colon = self.advance()?; // the ':'
                let else_branch = self.parse_expr(3);
                self.link(colon, then_branch, else_branch);
                self.link(op_tok, Some(lhs), Some(colon));
                lhs = op_tok;
                continue;
            }
            let next_min = if right_assoc { prec } else { prec + 1 };
            let rhs = self.parse_expr(next_min);
            self.link(op_tok, Some(lhs), rhs);
            lhs = op_tok;
        }
        Some(lhs)
    }

    fn parse_unary(&mut self) -> Option<TokenId> {
        let op = self.peek()?.to_string();
        if matches!(op.as_str(), "!" | "~" | "-" | "+" | "*" | "&" | "++" | "--") {
            let op_tok = self.advance()?;
            let operand = self.parse_unary();
            self.link(op_tok, operand, None);
            return Some(op_tok);
        }
        if op == "(" {
            if let Some(int_type) = self.cast_type() {
                let lparen = self.advance()?;
                // Skip the type tokens and the closing parenthesis.
                while self.peek().map(|s| s != ")").unwrap_or(false) {
                    self.advance();
                }
                self.advance();
                let operand = self.parse_unary();
                self.link(lparen, operand, None);
                self.db.casts.insert(lparen, int_type);
                return Some(lparen);
            }
            // Grouping.
            let lparen = self.advance()?;
            let inner = self.parse_expr(0);
            self.advance(); // ')'
            let _ = lparen;
            return self.parse_postfix(inner?);
        }
        let primary = self.advance()?;
        self.parse_postfix(primary)
    }

    /// Is the `(` at the cursor a C cast? `( type-words )` followed by the
    /// start of another unary expression.
    fn cast_type(&self) -> Option<IntType> {
        let lparen = self.cur?;
        let mut words: Vec<String> = Vec::new();
        let mut cur = self.list.next(lparen)?;
        loop {
            let s = self.list.str(cur);
            if s == ")" {
                break;
            }
            if !QUALIFIERS.contains(&s) && !BASE_TYPES.contains(&s) && s != "*" {
                return None;
            }
            words.push(s.to_string());
            cur = self.list.next(cur)?;
        }
        if words.is_empty() || words.contains(&"*".to_string()) {
            return None;
        }
        // Must be followed by something castable.
        let after = self.list.next(cur)?;
        let next = self.list.tok(after);
        let castable = next.is_name()
            || next.is_number()
            || matches!(self.list.str(after), "(" | "-" | "+" | "~" | "!" | "*" | "&");
        if !castable {
            return None;
        }
        let strs: Vec<&str> = words.iter().map(String::as_str).collect();
        int_type_of(&strs)
    }

    fn parse_postfix(&mut self, mut node: TokenId) -> Option<TokenId> {
        loop {
            match self.peek() {
                Some("(") => {
                    let lparen = self.advance()?;
                    let args = if self.peek() == Some(")") {
                        None
                    } else {
                        self.parse_args()
                    };
                    self.advance(); // ')'
                    self.link(lparen, Some(node), args);
                    node = lparen;
                }
                Some("[") => {
                    let lbracket = self.advance()?;
                    let index = self.parse_expr(0);
                    self.advance(); // ']'
                    self.link(lbracket, Some(node), index);
                    node = lbracket;
                }
                Some(".") | Some("->") | Some("::") => {
                    let dot = self.advance()?;
                    let member = self.advance();
                    self.link(dot, Some(node), member);
                    node = dot;
                }
                Some("++") | Some("--") => {
                    let op_tok = self.advance()?;
                    self.link(op_tok, Some(node), None);
                    node = op_tok;
                }
                _ => return Some(node),
            }
        }
    }

    /// Comma-chained call arguments, left-associated on the `,` tokens.
    /// Ternaries are legal arguments; the comma itself is not an operator
    /// here.
    fn parse_args(&mut self) -> Option<TokenId> {
        let mut root = self.parse_expr(3)?;
        while self.peek() == Some(",") {
            let comma = self.advance()?;
            let rhs = self.parse_expr(3);
            self.link(comma, Some(root), rhs);
            root = comma;
        }
        Some(root)
    }
}

/// True when both subtrees have identical operators and operands.
pub fn same_expression(list: &TokenList, a: TokenId, b: TokenId) -> bool {
    if list.str(a) != list.str(b) {
        return false;
    }
    let (ta, tb) = (list.tok(a), list.tok(b));
    if ta.var_id != tb.var_id {
        return false;
    }
    let ops = [(ta.ast_op1, tb.ast_op1), (ta.ast_op2, tb.ast_op2)];
    for (oa, ob) in ops {
        match (oa, ob) {
            (None, None) => {}
            (Some(oa), Some(ob)) => {
                if !same_expression(list, oa, ob) {
                    return false;
                }
            }
            _ => return false,
        }
    }
    true
}

/// Whether a subtree could have side effects (calls, assignments, ++/--).
pub fn has_side_effects(list: &TokenList, root: TokenId) -> bool {
    let tok = list.tok(root);
    if tok.is_assignment_op() || tok.kind == TokenKind::IncDecOp {
        return true;
    }
    if list.str(root) == "(" && tok.ast_op1.is_some() && list.tok(tok.ast_op1.unwrap()).is_name() {
        return true;
    }
    [tok.ast_op1, tok.ast_op2]
        .into_iter()
        .flatten()
        .any(|op| has_side_effects(list, op))
}

#[cfg(test)]
mod tests {
    use super::*;
    use scrutiny_base::Token;
    use scrutiny_base::list::classify;

    fn prepare(code: &str) -> (TokenList, SymbolDatabase) {
        let mut list = TokenList::new(Language::Cpp);
        let file = list.add_file("test.cpp");
        let mut line = 1;
        for word in code.split_whitespace() {
            if word == "\\n" {
                line += 1;
                continue;
            }
            list.push(Token::new(word, classify(word), file, line));
        }
        let db = SymbolDatabase::build(&mut list);
        (list, db)
    }

    fn find(list: &TokenList, text: &str) -> TokenId {
        list.iter().find(|&id| list.str(id) == text).unwrap()
    }

    #[test]
    fn variables_get_ids() {
        let (list, db) = prepare("int x = 3 ; int y = x ;");
        assert_eq!(db.variables.len(), 2);
        let uses: Vec<u32> = list
            .iter()
            .filter(|&id| list.str(id) == "x")
            .map(|id| list.tok(id).var_id)
            .collect();
        assert_eq!(uses, vec![1, 1]);
    }

    #[test]
    fn shadowing_resolves_to_innermost() {
        let (list, _db) = prepare("int x ; void f ( ) { int x ; x = 1 ; } x = 2 ;");
        let ids: Vec<u32> = list
            .iter()
            .filter(|&id| list.str(id) == "x")
            .map(|id| list.tok(id).var_id)
            .collect();
        // decl(1), inner decl(2), inner use(2), outer use(1)
        assert_eq!(ids, vec![1, 2, 2, 1]);
    }

    #[test]
    fn assignment_ast_links() {
        let (list, _db) = prepare("int x ; x = 1 + 2 * 3 ;");
        let eq = find(&list, "=");
        let plus = find(&list, "+");
        let star = find(&list, "*");
        assert_eq!(list.tok(eq).ast_op2, Some(plus));
        assert_eq!(list.tok(plus).ast_op2, Some(star));
        assert_eq!(list.tok(plus).ast_parent, Some(eq));
        assert_eq!(list.str(list.tok(star).ast_op1.unwrap()), "2");
    }

    #[test]
    fn declaration_initializer_is_linked() {
        let (list, db) = prepare("int x = 3 ;");
        let eq = find(&list, "=");
        assert_eq!(list.str(list.tok(eq).ast_op1.unwrap()), "x");
        assert_eq!(list.str(list.tok(eq).ast_op2.unwrap()), "3");
        assert_eq!(db.variable(1).unwrap().init_tok, Some(eq));
    }

    #[test]
    fn condition_expression_is_linked() {
        let (list, _db) = prepare("int x ; if ( x > 0 ) { }");
        let gt = find(&list, ">");
        assert_eq!(list.str(list.tok(gt).ast_op1.unwrap()), "x");
        assert_eq!(list.str(list.tok(gt).ast_op2.unwrap()), "0");
        assert_eq!(list.tok(gt).ast_parent, None);
    }

    #[test]
    fn function_definition_and_params() {
        let (list, db) = prepare("int add ( int a , int b ) { return a + b ; }");
        let f = db.find_function("add").unwrap();
        assert_eq!(f.arg_var_ids.len(), 2);
        assert!(f.body.is_some());
        let a_use = list
            .iter()
            .filter(|&id| list.str(id) == "a")
            .last()
            .unwrap();
        assert_eq!(list.tok(a_use).var_id, f.arg_var_ids[0]);
        let plus = find(&list, "+");
        assert!(list.tok(plus).ast_op1.is_some());
    }

    #[test]
    fn call_arguments_chain_on_commas() {
        let (list, _db) = prepare("int x ; f ( 1 , x , 3 ) ;");
        let lparen = find(&list, "(");
        let callee = list.tok(lparen).ast_op1.unwrap();
        assert_eq!(list.str(callee), "f");
        let args = list.tok(lparen).ast_op2.unwrap();
        assert_eq!(list.str(args), ",");
    }

    #[test]
    fn ternary_shape() {
        let (list, _db) = prepare("int a ; int b ; b = a ? 1 : 2 ;");
        let q = find(&list, "?");
        let colon = find(&list, ":");
        assert_eq!(list.tok(q).ast_op2, Some(colon));
        assert_eq!(list.str(list.tok(colon).ast_op1.unwrap()), "1");
        assert_eq!(list.str(list.tok(colon).ast_op2.unwrap()), "2");
    }

    #[test]
    fn cast_is_detected() {
        let (list, db) = prepare("int x ; char c ; c = ( char ) x ;");
        let cast = list
            .iter()
            .find(|&id| db.casts.contains_key(&id))
            .expect("cast recorded");
        assert_eq!(list.str(cast), "(");
        assert_eq!(db.casts[&cast], IntType { bits: 8, signed: true });
    }

    #[test]
    fn call_is_not_a_cast() {
        let (list, db) = prepare("f ( 1 ) ;");
        assert!(db.casts.is_empty());
        let lparen = find(&list, "(");
        assert_eq!(list.str(list.tok(lparen).ast_op1.unwrap()), "f");
    }

    #[test]
    fn enums_are_recorded() {
        let (_list, db) = prepare("enum Color { RED , GREEN = 5 , BLUE } ;");
        assert_eq!(db.enums["RED"], 0);
        assert_eq!(db.enums["GREEN"], 5);
        assert_eq!(db.enums["BLUE"], 6);
    }

    #[test]
    fn const_global_flags() {
        let (_list, db) = prepare("const int N = 5 ; void f ( ) { int m ; }");
        let n = db.variable(1).unwrap();
        assert!(n.is_const && n.is_global);
        let m = db.variable(3).unwrap();
        assert!(!m.is_global && !m.is_const);
    }

    #[test]
    fn pointer_and_array_classification() {
        let (_list, db) = prepare("int * p ; int arr [ 3 ] ; int & r = arr [ 0 ] ;");
        assert!(db.variable(1).unwrap().is_pointer);
        assert!(db.variable(2).unwrap().is_array);
        assert!(db.variable(3).unwrap().is_reference);
    }

    #[test]
    fn same_expression_compares_structure() {
        let (list, _db) = prepare("int a ; int b ; b = a + 1 == a + 1 ;");
        let eq_cmp = find(&list, "==");
        let lhs = list.tok(eq_cmp).ast_op1.unwrap();
        let rhs = list.tok(eq_cmp).ast_op2.unwrap();
        assert!(same_expression(&list, lhs, rhs));
        let plus = find(&list, "+");
        assert!(!same_expression(&list, lhs, list.tok(plus).ast_op1.unwrap()));
    }

    #[test]
    fn multi_declarator_line() {
        let (list, db) = prepare("int a , b = 2 ;");
        assert_eq!(db.variables.len(), 2);
        let b_decl = list
            .iter()
            .filter(|&id| list.str(id) == "b")
            .next()
            .unwrap();
        assert_eq!(list.tok(b_decl).var_id, 2);
    }
}
