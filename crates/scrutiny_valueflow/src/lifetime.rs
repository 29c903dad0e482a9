//! Lifetime tracking: which storage does a pointer/reference refer to?
//!
//! [`LifetimeStore`] captures the three borrow modes:
//!
//! - `by_ref` — the receiver refers to the argument's storage itself
//!   (`p = &x`, `int& r = x`),
//! - `by_val` — the receiver copies the argument's lifetime values
//!   (`q = p` where `p` already borrows),
//! - `by_deref_copy` — one dereference first (`q = *pp`).
//!
//! The produced [`ValuePayload::Lifetime`] value names the storage token;
//! dangling-reference checkers read it directly. Only local and argument
//! storage is tracked — an address of a global outlives anything the
//! analysis could flag.

use crate::analyzer::{forward, Analyzer};
use crate::fold::set_token_value;
use crate::symbols::SymbolDatabase;
use scrutiny_base::{LifetimeKind, LifetimeScope, TokenId, TokenList, Value, ValuePayload};

/// Builder for lifetime values of one borrow site.
pub struct LifetimeStore {
    /// The token whose storage is borrowed.
    pub argtok: TokenId,
    /// Error-path note for derived diagnostics.
    pub message: String,
    pub kind: LifetimeKind,
}

impl LifetimeStore {
    pub fn new(argtok: TokenId, message: impl Into<String>, kind: LifetimeKind) -> Self {
        LifetimeStore {
            argtok,
            message: message.into(),
            kind,
        }
    }

    /// A value borrowing the argument's storage directly. `None` when the
    /// storage is not local (globals outlive everything we track).
    pub fn by_ref(&self, list: &TokenList, symbols: &SymbolDatabase) -> Option<Value> {
        let var = symbols.variable(list.tok(self.argtok).var_id)?;
        if var.is_global || var.is_static {
            return None;
        }
        let scope = if var.is_argument {
            LifetimeScope::Argument
        } else {
            LifetimeScope::Local
        };
        let mut v = Value::new(ValuePayload::Lifetime {
            tok: var.name_tok,
            scope,
            kind: self.kind,
        });
        v.kind = scrutiny_base::ValueKind::Known;
        v.push_path(self.argtok, self.message.clone());
        Some(v)
    }

    /// The argument's own lifetime values, copied onto the receiver.
    pub fn by_val(&self, list: &TokenList) -> Vec<Value> {
        list.tok(self.argtok)
            .values
            .iter()
            .filter(|v| v.is_lifetime())
            .cloned()
            .map(|mut v| {
                v.push_path(self.argtok, self.message.clone());
                v
            })
            .collect()
    }

    /// Follow one dereference, then copy.
    pub fn by_deref_copy(&self, list: &TokenList) -> Vec<Value> {
        // The pointee's lifetimes sit one indirection further out.
        list.tok(self.argtok)
            .values
            .iter()
            .filter(|v| v.is_lifetime() && v.indirect > 0)
            .cloned()
            .map(|mut v| {
                v.indirect -= 1;
                v.push_path(self.argtok, self.message.clone());
                v
            })
            .collect()
    }
}

/// The lifetime pass: address-of, reference bindings, borrow copies.
pub fn valueflow_lifetime(list: &mut TokenList, symbols: &SymbolDatabase) {
    // Address-of: `p = & x`.
    let amps: Vec<TokenId> = list
        .iter()
        .filter(|&id| list.str(id) == "&" && list.tok(id).ast_op2.is_none())
        .collect();
    for amp in amps {
        let Some(operand) = list.tok(amp).ast_op1 else { continue };
        if list.tok(operand).var_id == 0 {
            continue;
        }
        let store = LifetimeStore::new(
            operand,
            format!("Address of variable '{}' taken here.", list.str(operand)),
            LifetimeKind::Address,
        );
        let Some(value) = store.by_ref(list, symbols) else { continue };
        set_token_value(list, symbols, amp, value.clone());
        forward_to_assigned(list, symbols, amp, vec![value]);
    }

    // Reference declarations: `int & r = x ;`.
    let ref_vars: Vec<(u32, TokenId)> = symbols
        .variables
        .iter()
        .filter(|v| v.is_reference)
        .filter_map(|v| v.init_tok.map(|init| (v.var_id, init)))
        .collect();
    for (var_id, init) in ref_vars {
        if list.str(init) != "=" {
            continue;
        }
        let Some(rhs) = list.tok(init).ast_op2 else { continue };
        if list.tok(rhs).var_id == 0 {
            continue;
        }
        let store = LifetimeStore::new(
            rhs,
            format!("Reference to '{}' created here.", list.str(rhs)),
            LifetimeKind::Object,
        );
        let Some(value) = store.by_ref(list, symbols) else { continue };
        let stop = enclosing_scope_end(list, init);
        if let Some(start) = statement_after(list, init) {
            let mut analyzer = Analyzer::variable(var_id, vec![value]);
            forward(list, symbols, start, stop, &mut analyzer);
        }
    }

    // Borrow copies: `q = p ;` where p already carries lifetimes.
    let assignments: Vec<TokenId> = list
        .iter()
        .filter(|&id| list.str(id) == "=")
        .collect();
    for eq in assignments {
        let (Some(lhs), Some(rhs)) = (list.tok(eq).ast_op1, list.tok(eq).ast_op2) else {
            continue;
        };
        if list.tok(lhs).var_id == 0 || list.tok(rhs).var_id == 0 {
            continue;
        }
        let store = LifetimeStore::new(
            rhs,
            format!("Borrow of '{}' copied here.", list.str(rhs)),
            LifetimeKind::Object,
        );
        let values = store.by_val(list);
        if values.is_empty() {
            continue;
        }
        let stop = enclosing_scope_end(list, eq);
        if let Some(start) = statement_after(list, eq) {
            let mut analyzer = Analyzer::variable(list.tok(lhs).var_id, values);
            forward(list, symbols, start, stop, &mut analyzer);
        }
    }
}

/// Forwards lifetime values produced at `site` to the variable the
/// enclosing assignment stores into.
fn forward_to_assigned(
    list: &mut TokenList,
    symbols: &SymbolDatabase,
    site: TokenId,
    values: Vec<Value>,
) {
    let mut cur = list.tok(site).ast_parent;
    while let Some(id) = cur {
        if list.str(id) == "=" {
            let Some(lhs) = list.tok(id).ast_op1 else { return };
            let var_id = list.tok(lhs).var_id;
            if var_id == 0 {
                return;
            }
            let stop = enclosing_scope_end(list, id);
            if let Some(start) = statement_after(list, id) {
                let mut analyzer = Analyzer::variable(var_id, values);
                forward(list, symbols, start, stop, &mut analyzer);
            }
            return;
        }
        cur = list.tok(id).ast_parent;
    }
}

/// First token of the statement after the one containing `tok`.
pub fn statement_after(list: &TokenList, tok: TokenId) -> Option<TokenId> {
    let mut cur = Some(tok);
    while let Some(id) = cur {
        if list.str(id) == ";" {
            return list.next(id);
        }
        cur = list.next(id);
    }
    None
}

/// The closing brace of the innermost scope containing `tok`.
pub fn enclosing_scope_end(list: &TokenList, tok: TokenId) -> Option<TokenId> {
    let mut depth = 0i32;
    let mut cur = list.next(tok);
    while let Some(id) = cur {
        match list.str(id) {
            "{" => depth += 1,
            "}" => {
                if depth == 0 {
                    return Some(id);
                }
                depth -= 1;
            }
            _ => {}
        }
        cur = list.next(id);
    }
    None
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

    fn lifetimes_at(list: &TokenList, tok: TokenId) -> Vec<TokenId> {
        list.tok(tok)
            .values
            .iter()
            .filter_map(|v| match v.payload {
                ValuePayload::Lifetime { tok, .. } => Some(tok),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn address_of_local_attaches_lifetime() {
        let (mut list, db) = prepare("void f ( ) { int x ; int * p ; p = & x ; use ( p ) ; }");
        valueflow_lifetime(&mut list, &db);
        let p_use = list
            .iter()
            .filter(|&id| list.str(id) == "p")
            .last()
            .unwrap();
        let lifetimes = lifetimes_at(&list, p_use);
        assert_eq!(lifetimes.len(), 1);
        assert_eq!(list.str(lifetimes[0]), "x");
    }

    #[test]
    fn argument_scope_is_recorded() {
        let (mut list, db) = prepare("void f ( int a ) { int * p ; p = & a ; g ( p ) ; }");
        valueflow_lifetime(&mut list, &db);
        let p_use = list
            .iter()
            .filter(|&id| list.str(id) == "p")
            .last()
            .unwrap();
        let scope = list.tok(p_use).values.iter().find_map(|v| match v.payload {
            ValuePayload::Lifetime { scope, .. } => Some(scope),
            _ => None,
        });
        assert_eq!(scope, Some(LifetimeScope::Argument));
    }

    #[test]
    fn global_address_is_not_tracked() {
        let (mut list, db) = prepare("int g ; void f ( ) { int * p ; p = & g ; use ( p ) ; }");
        valueflow_lifetime(&mut list, &db);
        let p_use = list
            .iter()
            .filter(|&id| list.str(id) == "p")
            .last()
            .unwrap();
        assert!(lifetimes_at(&list, p_use).is_empty());
    }

    #[test]
    fn reference_binding_borrows() {
        let (mut list, db) = prepare("void f ( ) { int x ; int & r = x ; use ( r ) ; }");
        valueflow_lifetime(&mut list, &db);
        let r_use = list
            .iter()
            .filter(|&id| list.str(id) == "r")
            .last()
            .unwrap();
        let lifetimes = lifetimes_at(&list, r_use);
        assert_eq!(lifetimes.len(), 1);
        assert_eq!(list.str(lifetimes[0]), "x");
    }

    #[test]
    fn borrow_copies_propagate() {
        let (mut list, db) =
            prepare("void f ( ) { int x ; int * p ; int * q ; p = & x ; q = p ; use ( q ) ; }");
        valueflow_lifetime(&mut list, &db);
        let q_use = list
            .iter()
            .filter(|&id| list.str(id) == "q")
            .last()
            .unwrap();
        let lifetimes = lifetimes_at(&list, q_use);
        assert_eq!(lifetimes.len(), 1);
        assert_eq!(list.str(lifetimes[0]), "x");
    }

    #[test]
    fn by_val_copies_only_lifetimes() {
        let (mut list, db) = prepare("void f ( ) { int x ; int * p ; p = & x ; }");
        valueflow_lifetime(&mut list, &db);
        let p_use = list
            .iter()
            .filter(|&id| list.str(id) == "p" )
            .last()
            .unwrap();
        let store = LifetimeStore::new(p_use, "copy", LifetimeKind::Object);
        let copied = store.by_val(&list);
        assert!(copied.iter().all(|v| v.is_lifetime()));
    }
}
