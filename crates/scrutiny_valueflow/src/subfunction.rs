//! Cross-function propagation: argument injection and return values.
//!
//! At every call site whose callee has a visible body, the caller's
//! argument values are bound to the parameters and forwarded through the
//! body. Each distinct *combination* of argument values gets a unique path
//! tag (`path = 256·path + call-id`), so values originating from different
//! combinations never meet in fold-through — `f(1, 2)` and `f(3, 4)` do
//! not produce `1 + 4`.
//!
//! The Cartesian product of argument values is capped at 256 combinations
//! per call; overflow is a debug bailout, not an error.
//!
//! The return direction evaluates the callee's `return` expressions under
//! the bound arguments and attaches the result to the call expression in
//! the caller.

use crate::analyzer::{forward, Analyzer};
use crate::fold::set_token_value;
use crate::programmemory::{execute, ProgramMemory};
use crate::symbols::SymbolDatabase;
use scrutiny_base::{TokenId, TokenList, Value, ValueKind};
use std::collections::HashMap;

const MAX_COMBINATIONS: usize = 256;

/// A resolved call site: the `(`, the callee, and per-argument roots.
struct CallSite {
    lparen: TokenId,
    callee: usize,
    arg_roots: Vec<TokenId>,
}

fn call_sites(list: &TokenList, symbols: &SymbolDatabase) -> Vec<CallSite> {
    let mut out = Vec::new();
    for id in list.iter() {
        if list.str(id) != "(" {
            continue;
        }
        let Some(callee_tok) = list.tok(id).ast_op1 else { continue };
        if !list.tok(callee_tok).is_name() || list.tok(callee_tok).var_id != 0 {
            continue;
        }
        let name = list.str(callee_tok);
        let Some(index) = symbols.functions.iter().position(|f| f.name == name) else {
            continue;
        };
        if symbols.functions[index].body.is_none() {
            continue;
        }
        // Calls inside the callee itself do not inject (no recursion).
        let (body_open, body_close) = symbols.functions[index].body.unwrap();
        if in_range(list, id, body_open, body_close) {
            continue;
        }
        let mut arg_roots = Vec::new();
        if let Some(args) = list.tok(id).ast_op2 {
            flatten_args(list, args, &mut arg_roots);
        }
        out.push(CallSite {
            lparen: id,
            callee: index,
            arg_roots,
        });
    }
    out
}

/// Positional containment test over the chain (ids do not order tokens).
fn in_range(list: &TokenList, id: TokenId, open: TokenId, close: TokenId) -> bool {
    let mut cur = list.next(open);
    while let Some(t) = cur {
        if t == close {
            return false;
        }
        if t == id {
            return true;
        }
        cur = list.next(t);
    }
    false
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

/// Values an argument may carry across the boundary.
fn crossable_values(list: &TokenList, arg: TokenId) -> Vec<Value> {
    list.tok(arg)
        .values
        .iter()
        .filter(|v| {
            if v.is_lifetime() {
                return v.is_local_lifetime();
            }
            // Container sizes cannot be conditioned inside the callee yet.
            !v.is_container_size()
        })
        .cloned()
        .collect()
}

/// The sub-function injection pass.
pub fn valueflow_subfunction(list: &mut TokenList, symbols: &SymbolDatabase) {
    let sites = call_sites(list, symbols);
    for (call_id, site) in sites.iter().enumerate() {
        let function = &symbols.functions[site.callee];
        let Some((body_open, body_close)) = function.body else {
            continue;
        };

        // Bind argument values positionally.
        let mut bindings: Vec<(u32, Vec<Value>)> = Vec::new();
        for (pos, &param) in function.arg_var_ids.iter().enumerate() {
            let Some(&arg_root) = site.arg_roots.get(pos) else {
                continue;
            };
            let mut values = crossable_values(list, arg_root);
            if values.is_empty() {
                continue;
            }
            let ordinal = ordinal(pos + 1);
            for v in values.iter_mut() {
                v.push_path(
                    arg_root,
                    format!(
                        "Calling function '{}', {} argument value is {}",
                        function.name,
                        ordinal,
                        v.info_string()
                    ),
                );
                v.path = 256 * v.path + (call_id as i64 + 1);
                if let scrutiny_base::ValuePayload::Lifetime { ref mut scope, .. } = v.payload {
                    *scope = scrutiny_base::LifetimeScope::SubFunction;
                }
                // Passed values are never Known inside the callee.
                v.change_known_to_possible();
            }
            bindings.push((param, values));
        }
        if bindings.is_empty() {
            continue;
        }

        // Cartesian product, capped.
        let mut combos: Vec<HashMap<u32, Vec<Value>>> = vec![HashMap::new()];
        let mut overflow = false;
        for (param, values) in &bindings {
            let mut next = Vec::new();
            for combo in &combos {
                for v in values {
                    if next.len() >= MAX_COMBINATIONS {
                        overflow = true;
                        break;
                    }
                    let mut c = combo.clone();
                    c.insert(*param, vec![v.clone()]);
                    next.push(c);
                }
            }
            combos = next;
            if overflow {
                break;
            }
        }
        if overflow {
            log::debug!(
                "too many argument combinations passed to '{}'",
                function.name
            );
            continue;
        }

        let stop = list.next(body_close);
        for combo in combos {
            let mut analyzer = Analyzer::multi(combo);
            forward(list, symbols, body_open, stop, &mut analyzer);
        }
    }
}

/// The function-return pass: evaluate `return` expressions under bound
/// arguments and attach the result at the call.
pub fn valueflow_function_return(list: &mut TokenList, symbols: &SymbolDatabase) {
    let sites = call_sites(list, symbols);
    for site in &sites {
        let function = &symbols.functions[site.callee];
        let Some((body_open, body_close)) = function.body else {
            continue;
        };

        // All arguments must be integer-known for a concrete evaluation.
        let mut pm = ProgramMemory::new();
        let mut all_known = true;
        for (pos, &param) in function.arg_var_ids.iter().enumerate() {
            let known = site
                .arg_roots
                .get(pos)
                .and_then(|&root| list.tok(root).known_int_value());
            match known {
                Some(n) => pm.set_int(param, n),
                None => {
                    all_known = false;
                    break;
                }
            }
        }
        if !all_known && !function.arg_var_ids.is_empty() {
            continue;
        }

        let returns = return_roots(list, body_open, body_close);
        if returns.is_empty() {
            continue;
        }
        let mut results = Vec::new();
        for ret in &returns {
            match execute(list, symbols, &mut pm.clone(), *ret) {
                Some(n) => results.push(n),
                None => {
                    results.clear();
                    break;
                }
            }
        }
        if results.is_empty() {
            continue;
        }
        results.sort_unstable();
        results.dedup();
        let single = results.len() == 1;
        for n in results {
            let mut v = Value::int(n);
            if single {
                v.kind = ValueKind::Known;
            }
            v.push_path(site.lparen, format!("Function '{}' returns {}", function.name, n));
            set_token_value(list, symbols, site.lparen, v);
        }
    }
}

/// AST roots of every `return` expression in the body.
fn return_roots(list: &TokenList, open: TokenId, close: TokenId) -> Vec<TokenId> {
    let mut out = Vec::new();
    let mut cur = list.next(open);
    while let Some(id) = cur {
        if id == close {
            break;
        }
        if list.str(id) == "return" {
            // The expression root is the parentless token before `;`.
            let mut best = None;
            let mut t = list.next(id);
            while let Some(tt) = t {
                if list.str(tt) == ";" || tt == close {
                    break;
                }
                let tok = list.tok(tt);
                if tok.ast_parent.is_none() && (tok.ast_op1.is_some() || best.is_none()) {
                    best = Some(tt);
                }
                t = list.next(tt);
            }
            if let Some(root) = best {
                out.push(root);
            }
        }
        cur = list.next(id);
    }
    out
}

fn ordinal(n: usize) -> String {
    let suffix = match (n % 10, n % 100) {
        (1, 11) | (2, 12) | (3, 13) => "th",
        (1, _) => "st",
        (2, _) => "nd",
        (3, _) => "rd",
        _ => "th",
    };
    format!("{}{}", n, suffix)
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

    fn seed_numbers(list: &mut TokenList, db: &SymbolDatabase) {
        let numbers: Vec<TokenId> = list.iter().filter(|&id| list.tok(id).is_number()).collect();
        for id in numbers {
            if let Some(n) = crate::programmemory::int_literal(list.str(id)) {
                set_token_value(list, db, id, Value::known_int(n));
            }
        }
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
        out.dedup();
        out
    }

    #[test]
    fn argument_value_reaches_parameter_use() {
        let (mut list, db) = prepare("void f ( int a ) { use ( a ) ; } void g ( ) { f ( 7 ) ; }");
        seed_numbers(&mut list, &db);
        valueflow_subfunction(&mut list, &db);
        let a_use = list
            .iter()
            .filter(|&id| list.str(id) == "a")
            .nth(1)
            .unwrap();
        assert_eq!(possible_ints(&list, a_use), vec![7]);
        // Injected values are possible with a nonzero path tag.
        let v = &list.tok(a_use).values[0];
        assert!(v.is_possible());
        assert_ne!(v.path, 0);
        assert!(v.error_path.iter().any(|(_, note)| note.contains("1st argument")));
    }

    #[test]
    fn two_call_sites_stay_separated() {
        let (mut list, db) =
            prepare("void f ( int a ) { use ( a ) ; } void g ( ) { f ( 1 ) ; f ( 2 ) ; }");
        seed_numbers(&mut list, &db);
        valueflow_subfunction(&mut list, &db);
        let a_use = list
            .iter()
            .filter(|&id| list.str(id) == "a")
            .nth(1)
            .unwrap();
        assert_eq!(possible_ints(&list, a_use), vec![1, 2]);
        let paths: Vec<i64> = list.tok(a_use).values.iter().map(|v| v.path).collect();
        assert_ne!(paths[0], paths[1]);
    }

    #[test]
    fn combination_paths_keep_arguments_coherent() {
        let (mut list, db) = prepare(
            "void f ( int a , int b ) { s = a + b ; } void g ( ) { f ( 1 , 10 ) ; }",
        );
        seed_numbers(&mut list, &db);
        valueflow_subfunction(&mut list, &db);
        let plus = list.iter().find(|&id| list.str(id) == "+").unwrap();
        assert_eq!(possible_ints(&list, plus), vec![11]);
    }

    #[test]
    fn return_value_reaches_call() {
        let (mut list, db) =
            prepare("int f ( int a ) { return a + 1 ; } void g ( ) { y = f ( 3 ) ; }");
        seed_numbers(&mut list, &db);
        valueflow_function_return(&mut list, &db);
        let call = list
            .iter()
            .filter(|&id| list.str(id) == "(")
            .last()
            .unwrap();
        assert_eq!(possible_ints(&list, call), vec![4]);
        assert!(list.tok(call).values[0].is_known());
    }

    #[test]
    fn multiple_returns_yield_possible_values() {
        let (mut list, db) = prepare(
            "int f ( int a ) { if ( a ) { return 1 ; } return 2 ; } void g ( ) { y = f ( 9 ) ; }",
        );
        seed_numbers(&mut list, &db);
        valueflow_function_return(&mut list, &db);
        let call = list
            .iter()
            .filter(|&id| list.str(id) == "(")
            .last()
            .unwrap();
        assert_eq!(possible_ints(&list, call), vec![1, 2]);
        assert!(list.tok(call).values.iter().all(|v| v.is_possible()));
    }

    #[test]
    fn unknown_argument_blocks_return_evaluation() {
        let (mut list, db) =
            prepare("int f ( int a ) { return a + 1 ; } void g ( int u ) { y = f ( u ) ; }");
        seed_numbers(&mut list, &db);
        valueflow_function_return(&mut list, &db);
        let call = list
            .iter()
            .filter(|&id| list.str(id) == "(")
            .last()
            .unwrap();
        assert!(possible_ints(&list, call).is_empty());
    }
}
