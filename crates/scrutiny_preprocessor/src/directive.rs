//! Directive shaping: `#if` uniformization and chain linkage.
//!
//! [`uniformize_ifs`] rewrites the conditional directives into one shape so
//! the reducer only ever sees `#if` / `#elif` with a parenthesized
//! `defined ( NAME )`:
//!
//! ```text
//! #ifdef X      →  # if defined ( X )
//! #ifndef X     →  # if ! defined ( X )
//! #else if …    →  # elif …
//! defined X     →  defined ( X )
//! ```
//!
//! [`create_linkage`] then pairs the members of every `#if`/`#elif`/`#else`/
//! `#endif` chain with mutual links via a stack: each member links to its
//! successor, so `link()` from the directive at hand is "the next sibling",
//! which is exactly what branch elimination needs. Linkage is recreated from
//! scratch over the whole list — include splicing invalidates nothing that
//! way.

use scrutiny_base::{TokenId, TokenList};

/// Rewrites conditional directives into the uniform shape. Run after every
/// tokenization, before the reducer ever looks at the list.
pub fn uniformize_ifs(list: &mut TokenList) {
    let mut cur = list.front();
    while let Some(id) = cur {
        if list.str(id) != "#" || list.next(id).is_none() {
            cur = list.next(id);
            continue;
        }
        let directive = list.next(id).unwrap();
        match list.str(directive) {
            "ifdef" => {
                list.set_str(directive, "if");
                list.insert_text_after(directive, "(");
                list.insert_text_after(directive, "defined");
                let end = list.line_end(directive);
                list.insert_text_after(end, ")");
                cur = list.next(directive);
                continue;
            }
            "ifndef" => {
                list.set_str(directive, "if");
                list.insert_text_after(directive, "(");
                list.insert_text_after(directive, "defined");
                list.insert_text_after(directive, "!");
                let end = list.line_end(directive);
                list.insert_text_after(end, ")");
                cur = list.next(directive);
                continue;
            }
            "else" if list.str_at(directive, 1) == "if" => {
                list.set_str(directive, "elif");
                list.delete_next(directive, 1);
            }
            _ => {}
        }

        if matches!(list.str(directive), "if" | "elif") {
            // Parenthesize every bare `defined NAME` on the line.
            let end = list.line_end(directive);
            let mut tok = list.next(directive);
            while let Some(t) = tok {
                if list.str(t) == "defined" && list.str_at(t, 1) != "(" {
                    list.insert_text_after(t, "(");
                    if let Some(name) = list.at(t, 2) {
                        list.insert_text_after(name, ")");
                    }
                }
                if t == end {
                    break;
                }
                tok = list.next(t);
            }
            cur = list.next(end);
        } else {
            cur = list.next(directive);
        }
    }
}

/// (Re-)creates the mutual links pairing `#if`-chain members.
pub fn create_linkage(list: &mut TokenList) {
    let mut ifs: Vec<TokenId> = Vec::new();
    let mut cur = list.front();
    while let Some(id) = cur {
        cur = list.next(id);
        if list.str(id) != "#" {
            continue;
        }
        let Some(directive) = list.next(id) else { continue };
        match list.str(directive) {
            "if" => ifs.push(id),
            "else" | "elif" => match ifs.last_mut() {
                None => ifs.push(id),
                Some(top) => {
                    let prev = *top;
                    *top = id;
                    list.create_mutual_links(prev, id);
                }
            },
            "endif" => {
                if let Some(top) = ifs.pop() {
                    list.create_mutual_links(top, id);
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lex::tokenize_into;
    use scrutiny_base::list::Language;

    fn prepared(code: &str) -> TokenList {
        let mut list = TokenList::new(Language::C);
        tokenize_into(&mut list, code, "test.c", None);
        uniformize_ifs(&mut list);
        create_linkage(&mut list);
        list
    }

    #[test]
    fn ifdef_becomes_uniform_if() {
        let list = prepared("#ifdef X\n#endif\n");
        assert_eq!(list.stringify(None, None), "# if defined ( X ) # endif");
    }

    #[test]
    fn ifndef_gets_negation() {
        let list = prepared("#ifndef X\n#endif\n");
        assert_eq!(list.stringify(None, None), "# if ! defined ( X ) # endif");
    }

    #[test]
    fn bare_defined_is_parenthesized() {
        let list = prepared("#if defined X && defined ( Y )\n#endif\n");
        assert_eq!(
            list.stringify(None, None),
            "# if defined ( X ) && defined ( Y ) # endif"
        );
    }

    #[test]
    fn else_if_becomes_elif() {
        let list = prepared("#if A\n#else if B\n#endif\n");
        assert!(list.stringify(None, None).contains("# elif B"));
    }

    #[test]
    fn chain_links_reach_next_sibling() {
        let list = prepared("#if A\na\n#elif B\nb\n#else\nc\n#endif\n");
        let hash_if = list.front().unwrap();
        let hash_elif = list.link(hash_if).unwrap();
        assert_eq!(list.str_at(hash_elif, 1), "elif");
        let hash_else = list.link(hash_elif).unwrap();
        assert_eq!(list.str_at(hash_else, 1), "else");
        let hash_endif = list.link(hash_else).unwrap();
        assert_eq!(list.str_at(hash_endif, 1), "endif");
        assert!(list.check_integrity().is_ok());
    }

    #[test]
    fn nested_chains_pair_independently() {
        let list = prepared("#if A\n#if B\n#endif\n#endif\n");
        let outer_if = list.front().unwrap();
        let outer_endif = list.link(outer_if).unwrap();
        assert_eq!(list.str_at(outer_endif, 1), "endif");
        // The outer link must skip the inner pair entirely.
        let inner_if = list.at(outer_if, 6).unwrap();
        assert_eq!(list.str_at(inner_if, 1), "if");
        let inner_endif = list.link(inner_if).unwrap();
        assert_eq!(list.at(inner_endif, 2), Some(outer_endif));
    }
}
