//! `#include` resolution and `#pragma` handling.
//!
//! Header lookup goes through the [`HeaderSearch`] trait so the driver can
//! plug in the real filesystem ([`FileHeaderSearch`]) while tests provide
//! in-memory headers ([`MemoryHeaderSearch`]). Resolution order follows the
//! compiler convention: a quoted header is tried relative to the including
//! file first, then on the include path list; an angle header only on the
//! include path list.
//!
//! A resolved header is normalized, tokenized and spliced in directly after
//! the directive line with its own file id, so provenance and line numbers
//! inside the header stay exact. A missing header is a recoverable
//! condition: `missingInclude` (quoted) or `missingIncludeSystem` (angle),
//! severity information, suppressible.

use crate::directive;
use crate::lex;
use crate::normalize::{self, InlineSuppression, NormalizeOptions};
use scrutiny_base::{ErrorMessage, Severity, TokenId, TokenList};
use std::collections::BTreeSet;
use std::collections::HashMap;
use std::path::PathBuf;

/// Where header files come from.
pub trait HeaderSearch {
    /// Resolves `header` as included from `includer_dir`. Returns the
    /// display path and the raw contents.
    fn find(&self, header: &str, quoted: bool, includer_dir: &str) -> Option<(String, Vec<u8>)>;
}

/// Filesystem-backed search over `-I` include paths.
#[derive(Debug, Default)]
pub struct FileHeaderSearch {
    pub include_paths: Vec<PathBuf>,
}

impl FileHeaderSearch {
    pub fn new(include_paths: Vec<PathBuf>) -> Self {
        Self { include_paths }
    }
}

impl HeaderSearch for FileHeaderSearch {
    fn find(&self, header: &str, quoted: bool, includer_dir: &str) -> Option<(String, Vec<u8>)> {
        let mut candidates: Vec<PathBuf> = Vec::new();
        if quoted {
            candidates.push(PathBuf::from(includer_dir).join(header));
        }
        for dir in &self.include_paths {
            candidates.push(dir.join(header));
        }
        for candidate in candidates {
            if let Ok(bytes) = std::fs::read(&candidate) {
                return Some((candidate.to_string_lossy().into_owned(), bytes));
            }
        }
        None
    }
}

/// In-memory headers for unit tests and embedded fixtures.
#[derive(Debug, Default)]
pub struct MemoryHeaderSearch {
    pub headers: HashMap<String, String>,
}

impl MemoryHeaderSearch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, content: impl Into<String>) {
        self.headers.insert(name.into(), content.into());
    }
}

impl HeaderSearch for MemoryHeaderSearch {
    fn find(&self, header: &str, _quoted: bool, _includer_dir: &str) -> Option<(String, Vec<u8>)> {
        self.headers
            .get(header)
            .map(|content| (header.to_string(), content.clone().into_bytes()))
    }
}

/// The header name as written, and whether it was quoted.
fn include_target(list: &TokenList, include_tok: TokenId) -> Option<(String, bool)> {
    let first = list.next(include_tok)?;
    let text = list.str(first);
    if text.starts_with('"') {
        return Some((text.trim_matches('"').to_string(), true));
    }
    if text == "<" {
        let end = list.line_end(include_tok);
        let mut name = String::new();
        let mut cur = list.next(first)?;
        loop {
            if list.str(cur) == ">" {
                return Some((name, false));
            }
            name.push_str(list.str(cur));
            if cur == end {
                return None;
            }
            cur = list.next(cur)?;
        }
    }
    None
}

/// Handles one `#include` directive (the `include` token itself).
///
/// On success the header's tokens are spliced after the directive line and
/// directive shaping is re-run over the list. Returns diagnostics and
/// harvested suppressions from the header.
#[allow(clippy::too_many_arguments)]
pub fn handle_include(
    list: &mut TokenList,
    include_tok: TokenId,
    included_once: &BTreeSet<String>,
    search: &dyn HeaderSearch,
    options: NormalizeOptions,
    diagnostics: &mut Vec<ErrorMessage>,
    suppressions: &mut Vec<InlineSuppression>,
) {
    let Some((header, quoted)) = include_target(list, include_tok) else {
        return;
    };
    if header.is_empty() || included_once.contains(&header) {
        return;
    }

    let includer = list.file_of(include_tok);
    let includer_dir = match includer.rfind('/') {
        Some(pos) => includer[..pos].to_string(),
        None => String::new(),
    };

    match search.find(&header, quoted, &includer_dir) {
        Some((path, bytes)) => {
            if included_once.contains(&path) {
                return;
            }
            let code = normalize::read_code(&bytes);
            let normalized = normalize::simplify(&code, &path, options);
            diagnostics.extend(normalized.diagnostics);
            suppressions.extend(normalized.suppressions);

            let line_end = list.line_end(include_tok);
            lex::tokenize_into(list, &normalized.text, &path, Some(line_end));
            directive::uniformize_ifs(list);
            directive::create_linkage(list);
        }
        None => {
            let (id, message) = if quoted {
                (
                    "missingInclude",
                    format!("Include file: \"{}\" not found.", header),
                )
            } else {
                (
                    "missingIncludeSystem",
                    format!(
                        "Include file: <{}> not found. Please note: scrutiny does not need \
                         standard library headers to get proper results.",
                        header
                    ),
                )
            };
            diagnostics.push(ErrorMessage::new(
                Severity::Information,
                id,
                message,
                Some(list.location(include_tok)),
            ));
        }
    }
}

/// Handles `#pragma`: `once` records the file, `asm`/`endasm` rewrite into
/// a plain `asm ( … ) ;` statement, anything else is deleted.
///
/// The caller still deletes the leading `#` and, for `once` and unknown
/// pragmas, the rest of the line.
pub fn handle_pragma(
    list: &mut TokenList,
    pragma_tok: TokenId,
    included_once: &mut BTreeSet<String>,
    file: &str,
) -> PragmaAction {
    match list.str_at(pragma_tok, 1) {
        "asm" => {
            list.set_str(pragma_tok, "asm");
            if let Some(next) = list.next(pragma_tok) {
                list.set_str(next, "(");
            }
            PragmaAction::Rewritten
        }
        "endasm" => {
            list.set_str(pragma_tok, ")");
            if let Some(next) = list.next(pragma_tok) {
                list.set_str(next, ";");
            }
            PragmaAction::Rewritten
        }
        "once" => {
            included_once.insert(file.to_string());
            PragmaAction::Erase
        }
        _ => PragmaAction::Erase,
    }
}

/// Handles the bare `#asm` / `#endasm` directives the same way the pragma
/// spelling is handled.
pub fn handle_asm(list: &mut TokenList, directive_tok: TokenId) {
    if list.str(directive_tok) == "asm" {
        list.insert_text_after(directive_tok, "(");
    } else {
        list.set_str(directive_tok, ")");
        list.insert_text_after(directive_tok, ";");
    }
}

/// What the caller must do with the directive tokens after pragma handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PragmaAction {
    /// Delete the pragma line.
    Erase,
    /// The tokens were rewritten in place into code; keep them.
    Rewritten,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lex::tokenize_into;
    use scrutiny_base::list::Language;

    fn list_of(code: &str) -> TokenList {
        let mut list = TokenList::new(Language::C);
        tokenize_into(&mut list, code, "dir/test.c", None);
        list
    }

    #[test]
    fn include_target_quoted() {
        let list = list_of("#include \"foo.h\"\n");
        let include_tok = list.at(list.front().unwrap(), 1).unwrap();
        assert_eq!(
            include_target(&list, include_tok),
            Some(("foo.h".to_string(), true))
        );
    }

    #[test]
    fn include_target_angle() {
        let list = list_of("#include <sys/stat.h>\n");
        let include_tok = list.at(list.front().unwrap(), 1).unwrap();
        assert_eq!(
            include_target(&list, include_tok),
            Some(("sys/stat.h".to_string(), false))
        );
    }

    #[test]
    fn memory_search_splices_header() {
        let mut list = list_of("#include \"foo.h\"\nint x;\n");
        let include_tok = list.at(list.front().unwrap(), 1).unwrap();
        let mut search = MemoryHeaderSearch::new();
        search.insert("foo.h", "int y;\n");
        let mut diags = Vec::new();
        let mut supps = Vec::new();
        handle_include(
            &mut list,
            include_tok,
            &BTreeSet::new(),
            &search,
            NormalizeOptions::default(),
            &mut diags,
            &mut supps,
        );
        assert_eq!(
            list.stringify(None, None),
            "# include \"foo.h\" int y ; int x ;"
        );
        assert!(diags.is_empty());
        let spliced = list
            .iter()
            .find(|&id| list.str(id) == "y")
            .unwrap();
        assert_eq!(list.file_of(spliced), "foo.h");
        assert_eq!(list.linenr(spliced), 1);
    }

    #[test]
    fn missing_quoted_header_reports_information() {
        let mut list = list_of("#include \"nope.h\"\n");
        let include_tok = list.at(list.front().unwrap(), 1).unwrap();
        let search = MemoryHeaderSearch::new();
        let mut diags = Vec::new();
        let mut supps = Vec::new();
        handle_include(
            &mut list,
            include_tok,
            &BTreeSet::new(),
            &search,
            NormalizeOptions::default(),
            &mut diags,
            &mut supps,
        );
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].id, "missingInclude");
        assert_eq!(diags[0].severity, Severity::Information);
    }

    #[test]
    fn missing_angle_header_uses_system_id() {
        let mut list = list_of("#include <nope.h>\n");
        let include_tok = list.at(list.front().unwrap(), 1).unwrap();
        let search = MemoryHeaderSearch::new();
        let mut diags = Vec::new();
        let mut supps = Vec::new();
        handle_include(
            &mut list,
            include_tok,
            &BTreeSet::new(),
            &search,
            NormalizeOptions::default(),
            &mut diags,
            &mut supps,
        );
        assert_eq!(diags[0].id, "missingIncludeSystem");
    }

    #[test]
    fn included_once_suppresses_splice() {
        let mut list = list_of("#include \"foo.h\"\n");
        let include_tok = list.at(list.front().unwrap(), 1).unwrap();
        let mut search = MemoryHeaderSearch::new();
        search.insert("foo.h", "int y;\n");
        let mut once = BTreeSet::new();
        once.insert("foo.h".to_string());
        let mut diags = Vec::new();
        let mut supps = Vec::new();
        handle_include(
            &mut list,
            include_tok,
            &once,
            &search,
            NormalizeOptions::default(),
            &mut diags,
            &mut supps,
        );
        assert_eq!(list.stringify(None, None), "# include \"foo.h\"");
    }

    #[test]
    fn pragma_once_records_file() {
        let mut list = list_of("#pragma once\n");
        let pragma_tok = list.at(list.front().unwrap(), 1).unwrap();
        let mut once = BTreeSet::new();
        let action = handle_pragma(&mut list, pragma_tok, &mut once, "dir/test.c");
        assert_eq!(action, PragmaAction::Erase);
        assert!(once.contains("dir/test.c"));
    }

    #[test]
    fn pragma_asm_rewrites_to_statement() {
        let mut list = list_of("#pragma asm\nmov r0\n#pragma endasm\n");
        let first = list.at(list.front().unwrap(), 1).unwrap();
        let mut once = BTreeSet::new();
        assert_eq!(
            handle_pragma(&mut list, first, &mut once, "f"),
            PragmaAction::Rewritten
        );
        let second = list
            .iter()
            .find(|&id| list.str(id) == "pragma")
            .unwrap();
        assert_eq!(
            handle_pragma(&mut list, second, &mut once, "f"),
            PragmaAction::Rewritten
        );
        assert_eq!(
            list.stringify(None, None),
            "# asm ( mov r0 # ) ;"
        );
    }
}
