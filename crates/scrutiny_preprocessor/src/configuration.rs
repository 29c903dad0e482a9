//! Configuration enumeration: the split queue and the directive scan.
//!
//! A [`Configuration`] is a macro table, its own token list, the stack of
//! taken-branch decisions, and a resume cursor. The [`Preprocessor`] keeps a
//! FIFO of configurations; each is scanned front to back, directives are
//! resolved and erased, macros expand in place, and whenever an `#if`
//! depends on a symbol whose state is not fixed the configuration is
//! *split*:
//!
//! 1. the configuration is cloned — token list included — with the cursor
//!    parked on the very directive, and the clone assumes the symbol
//!    defined (or the predicate true);
//! 2. the current configuration assumes the opposite;
//! 3. the same directive is re-analyzed, now with a fixed state.
//!
//! Cloning the list is cheap to reason about because token ids survive
//! cloning; the clone resumes at the identical id.
//!
//! Scanning ends with the reduced token list holding only live code. The
//! result maps canonical configuration names to their configurations; the
//! name grammar (`;`-separated sorted assumptions, `NAME` or
//! `NAME<op><value>`) is part of the external contract.
//!
//! A settings-driven cap (default 12) bounds the number of configurations;
//! on overflow a `toomanyconfigs` information diagnostic is emitted and the
//! configurations discovered so far are kept.

use crate::condition::{analyze_if, opposite_predicate};
use crate::directive;
use crate::include::{handle_asm, handle_include, handle_pragma, HeaderSearch, PragmaAction};
use crate::lex;
use crate::macros::{replace_macro, AnalysisResult, MacroTable, SplitMode};
use crate::normalize::{self, InlineSuppression, NormalizeOptions};
use scrutiny_base::list::Language;
use scrutiny_base::{ErrorMessage, Severity, TokenId, TokenList};
use std::collections::{BTreeMap, VecDeque};

/// C standard level, as selected by `--std`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CStandard {
    C89,
    C99,
    #[default]
    C11,
}

/// C++ standard level, as selected by `--std`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CppStandard {
    Cpp03,
    #[default]
    Cpp11,
}

/// The slice of driver settings the preprocessor consumes.
#[derive(Debug, Clone)]
pub struct PreprocessorSettings {
    /// Maximum number of configurations to enumerate.
    pub max_configs: usize,
    /// Check all configurations regardless of `max_configs`.
    pub force: bool,
    /// `-D` definitions, `NAME` or `NAME=value`.
    pub defines: Vec<String>,
    /// `-U` undefines.
    pub undefines: Vec<String>,
    pub language: Language,
    pub c_std: CStandard,
    pub cpp_std: CppStandard,
    pub normalize: NormalizeOptions,
}

impl Default for PreprocessorSettings {
    fn default() -> Self {
        PreprocessorSettings {
            max_configs: 12,
            force: false,
            defines: Vec::new(),
            undefines: Vec::new(),
            language: Language::Cpp,
            c_std: CStandard::default(),
            cpp_std: CppStandard::default(),
            normalize: NormalizeOptions::default(),
        }
    }
}

/// One enumerated configuration. See the module docs.
#[derive(Debug, Clone)]
pub struct Configuration {
    pub table: MacroTable,
    pub list: TokenList,
    pub if_decisions: Vec<bool>,
    /// Where scanning resumes after a split clone.
    pub cursor: Option<TokenId>,
}

impl Configuration {
    fn new(list: TokenList) -> Self {
        Configuration {
            table: MacroTable::default(),
            cursor: list.front(),
            list,
            if_decisions: Vec::new(),
        }
    }

    /// Split clone, parked at `at`.
    fn clone_at(&self, at: TokenId) -> Self {
        let mut clone = self.clone();
        clone.cursor = Some(at);
        clone
    }

    /// Canonical name of this configuration.
    pub fn name(&self) -> String {
        self.table.config_name()
    }
}

/// Everything a preprocessing run produces.
#[derive(Debug, Default)]
pub struct PreprocessResult {
    /// Canonical configuration name → reduced configuration.
    pub configurations: BTreeMap<String, Configuration>,
    pub diagnostics: Vec<ErrorMessage>,
    pub suppressions: Vec<InlineSuppression>,
}

/// The configuration-splitting preprocessor.
pub struct Preprocessor<'a> {
    settings: PreprocessorSettings,
    search: &'a dyn HeaderSearch,
    mode: SplitMode,
}

impl<'a> Preprocessor<'a> {
    pub fn new(settings: PreprocessorSettings, search: &'a dyn HeaderSearch) -> Self {
        // Pinning every unknown one way is only sound when the user pinned
        // the other way explicitly.
        let mode = if !settings.defines.is_empty() && settings.undefines.is_empty() {
            SplitMode::AllDefined
        } else if settings.defines.is_empty() && !settings.undefines.is_empty() {
            SplitMode::AllUndefined
        } else {
            SplitMode::AllowSplit
        };
        Preprocessor {
            settings,
            search,
            mode,
        }
    }

    /// Runs the whole pipeline on one translation unit.
    pub fn preprocess(&self, bytes: &[u8], filename: &str) -> PreprocessResult {
        let mut result = PreprocessResult::default();

        let code = normalize::read_code(bytes);
        let normalized = normalize::simplify(&code, filename, self.settings.normalize);
        result.diagnostics.extend(normalized.diagnostics);
        result.suppressions.extend(normalized.suppressions);

        let mut list = TokenList::new(self.settings.language);
        lex::tokenize_into(&mut list, &normalized.text, filename, None);
        directive::uniformize_ifs(&mut list);
        directive::create_linkage(&mut list);
        debug_assert!(list.check_integrity().is_ok());

        let mut initial = Configuration::new(list);
        self.seed_macro_table(&mut initial.table);

        let mut queue: VecDeque<Configuration> = VecDeque::new();
        queue.push_back(initial);

        while let Some(mut cfg) = queue.pop_front() {
            let keep = self.reduce(&mut cfg, &mut queue, &mut result);
            debug_assert!(cfg.list.check_integrity().is_ok());
            if keep {
                result.configurations.insert(cfg.name(), cfg);
            }
            if !self.settings.force
                && result.configurations.len() >= self.settings.max_configs
                && !queue.is_empty()
            {
                result.diagnostics.push(too_many_configs(
                    self.settings.max_configs,
                    filename,
                ));
                break;
            }
        }

        result
    }

    /// `-D`/`-U` plus the built-in language and standard macros.
    fn seed_macro_table(&self, table: &mut MacroTable) {
        table.pre_define(&self.settings.defines);
        table.pre_undef(&self.settings.undefines);
        table.defs.insert("__SCRUTINY__".to_string(), " 1".to_string());
        match self.settings.language {
            Language::Cpp => {
                let value = match self.settings.cpp_std {
                    CppStandard::Cpp11 => " 201103",
                    CppStandard::Cpp03 => " 199711",
                };
                table.defs.insert("__cplusplus".to_string(), value.to_string());
                table.undefs.insert("__STDC__".to_string());
                table.undefs.insert("__STDC_VERSION__".to_string());
            }
            Language::C => {
                table.defs.insert("__STDC__".to_string(), " 1".to_string());
                let value = match self.settings.c_std {
                    CStandard::C11 => " 201112",
                    CStandard::C99 => " 199901",
                    CStandard::C89 => " 199409",
                };
                table
                    .defs
                    .insert("__STDC_VERSION__".to_string(), value.to_string());
                table.undefs.insert("__cplusplus".to_string());
            }
        }
    }

    /// Scans one configuration to the end, splitting as needed.
    /// Returns false when the configuration must be dropped (`#error`).
    fn reduce(
        &self,
        cfg: &mut Configuration,
        queue: &mut VecDeque<Configuration>,
        result: &mut PreprocessResult,
    ) -> bool {
        let mut cursor = cfg.cursor.or_else(|| cfg.list.front());

        while let Some(tok) = cursor {
            let is_directive = cfg.list.str(tok) == "#"
                && !cfg.list.tok(tok).expanded_macro
                && cfg.list.next(tok).is_some();
            if is_directive {
                let mut erase = true;
                // A split re-analyzes the same directive with fixed state.
                'restart: loop {
                    let directive = cfg.list.next(tok).unwrap();
                    let dname = cfg.list.str(directive).to_string();
                    match dname.as_str() {
                        "if" | "elif" | "else" => {
                            let verdict = analyze_if(
                                &mut cfg.list,
                                &cfg.table,
                                &cfg.if_decisions,
                                self.mode,
                                tok,
                            );
                            let decision = match verdict.result {
                                AnalysisResult::Conflict => {
                                    if let Some(sibling) = cfg.list.link(tok) {
                                        let body_start = cfg.list.line_end(directive);
                                        cfg.list.erase_between(body_start, sibling);
                                    }
                                    false
                                }
                                AnalysisResult::Known => true,
                                AnalysisResult::New => {
                                    let name = verdict
                                        .config_name
                                        .expect("New verdict always carries a name");
                                    let mut clone = cfg.clone_at(tok);
                                    MacroTable::insert_cfg(
                                        &mut clone.table.assumed_defs,
                                        &name,
                                    );
                                    queue.push_back(clone);
                                    match opposite_predicate(&name) {
                                        Some(op) => MacroTable::insert_cfg(
                                            &mut cfg.table.assumed_defs,
                                            &op,
                                        ),
                                        None => {
                                            cfg.table.assumed_ndefs.insert(name);
                                        }
                                    }
                                    continue 'restart;
                                }
                                AnalysisResult::Unhandled => {
                                    log::debug!(
                                        "unhandled preprocessor condition at {}",
                                        cfg.list.location(tok)
                                    );
                                    true
                                }
                            };
                            if dname == "if" {
                                cfg.if_decisions.push(decision);
                            } else if decision {
                                if let Some(top) = cfg.if_decisions.last_mut() {
                                    *top = true;
                                }
                            }
                        }
                        "endif" => {
                            cfg.if_decisions.pop();
                        }
                        "include" => {
                            handle_include(
                                &mut cfg.list,
                                directive,
                                &cfg.table.included_once,
                                self.search,
                                self.settings.normalize,
                                &mut result.diagnostics,
                                &mut result.suppressions,
                            );
                        }
                        "define" => {
                            handle_define(&mut cfg.list, &mut cfg.table, directive);
                        }
                        "undef" => {
                            let name = cfg.list.str_at(directive, 1).to_string();
                            if !name.is_empty() {
                                cfg.table.defs.remove(&name);
                                cfg.table.undefs.insert(name);
                            }
                        }
                        "pragma" => {
                            let file = cfg.list.file_of(tok);
                            let action = handle_pragma(
                                &mut cfg.list,
                                directive,
                                &mut cfg.table.included_once,
                                &file,
                            );
                            if action == PragmaAction::Rewritten {
                                erase = false;
                            }
                        }
                        "error" => {
                            // This configuration would not compile; drop it.
                            let line_end = cfg.list.line_end(directive);
                            let text = cfg
                                .list
                                .stringify(cfg.list.next(directive), cfg.list.next(line_end));
                            result.diagnostics.push(ErrorMessage::new(
                                Severity::Information,
                                "preprocessorErrorDirective",
                                format!("#error {}", text),
                                Some(cfg.list.location(tok)),
                            ));
                            return false;
                        }
                        "asm" | "endasm" => {
                            handle_asm(&mut cfg.list, directive);
                            erase = false;
                        }
                        _ => {}
                    }
                    break 'restart;
                }

                if erase {
                    let line_end = cfg.list.line_end(tok);
                    let after = cfg.list.next(line_end);
                    let mut cur = Some(tok);
                    while cur.is_some() && cur != after {
                        cur = cfg.list.delete(cur.unwrap());
                    }
                    cursor = after;
                } else {
                    // Keep the rewritten tokens; only the `#` goes.
                    cursor = cfg.list.delete(tok);
                }
                continue;
            }

            if !cfg.list.tok(tok).expanded_macro {
                let outcome = replace_macro(&mut cfg.list, &cfg.table, tok);
                if outcome.changed {
                    cursor = outcome.resume;
                    continue;
                }
            }
            cursor = cfg.list.next(tok);
        }

        true
    }
}

/// `#define NAME …` bookkeeping. A `(` glued to the name opens a
/// function-like parameter list; a spaced `(` begins an object-like body.
fn handle_define(list: &mut TokenList, table: &mut MacroTable, directive: TokenId) {
    let Some(name_tok) = list.next(directive) else {
        return;
    };
    let line_end = list.line_end(directive);
    if !list.tok(name_tok).is_name() {
        return;
    }
    let name = list.str(name_tok).to_string();

    let body = if name_tok == line_end {
        String::new()
    } else {
        let body_first = list.next(name_tok).unwrap();
        let body_text = list.stringify(Some(body_first), list.next(line_end));
        let function_like = list.str(body_first) == "(" && !list.tok(body_first).ws_before;
        if function_like {
            body_text
        } else {
            format!(" {}", body_text)
        }
    };

    table.defs.insert(name.clone(), body);
    table.undefs.remove(&name);
}

fn too_many_configs(max: usize, file: &str) -> ErrorMessage {
    ErrorMessage::new(
        Severity::Information,
        "toomanyconfigs",
        format!(
            "Too many #ifdef configurations - scrutiny only checks {} of them. Use --force to \
             check all configurations.",
            max
        ),
        Some(scrutiny_base::SourceLocation::new(file, 1)),
    )
    .with_cwe(398)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::include::MemoryHeaderSearch;
    use std::collections::BTreeSet;

    fn run(code: &str) -> PreprocessResult {
        run_with(code, PreprocessorSettings::default(), MemoryHeaderSearch::new())
    }

    fn run_with(
        code: &str,
        settings: PreprocessorSettings,
        search: MemoryHeaderSearch,
    ) -> PreprocessResult {
        let pp = Preprocessor::new(settings, &search);
        pp.preprocess(code.as_bytes(), "test.c")
    }

    fn names(result: &PreprocessResult) -> BTreeSet<String> {
        result.configurations.keys().cloned().collect()
    }

    fn tokens(result: &PreprocessResult, cfg: &str) -> String {
        let cfg = result
            .configurations
            .get(cfg)
            .unwrap_or_else(|| panic!("no configuration {:?}", cfg));
        cfg.list.stringify(None, None)
    }

    #[test]
    fn simple_split() {
        let result = run("#ifdef WIN32\na\n#else\nb\n#endif\n");
        assert_eq!(
            names(&result),
            BTreeSet::from(["".to_string(), "WIN32".to_string()])
        );
        assert_eq!(tokens(&result, ""), "b");
        assert_eq!(tokens(&result, "WIN32"), "a");
    }

    #[test]
    fn nested_guarded_split() {
        let result = run("#ifdef A\na\n#ifdef B\nb\n#endif\n#endif\n");
        assert_eq!(
            names(&result),
            BTreeSet::from(["".to_string(), "A".to_string(), "A;B".to_string()])
        );
        assert_eq!(tokens(&result, ""), "");
        assert_eq!(tokens(&result, "A"), "a");
        assert_eq!(tokens(&result, "A;B"), "a b");
    }

    #[test]
    fn header_guard_not_split_and_second_include_noop() {
        let mut search = MemoryHeaderSearch::new();
        search.insert("h.h", "#ifndef H\n#define H\nx\n#endif\n");
        let result = run_with(
            "#include \"h.h\"\n#include \"h.h\"\n",
            PreprocessorSettings::default(),
            search,
        );
        assert_eq!(names(&result), BTreeSet::from(["".to_string()]));
        assert_eq!(tokens(&result, ""), "x");
    }

    #[test]
    fn define_drives_later_if() {
        let result = run("#define A\n#ifdef A\na\n#endif\n");
        assert_eq!(names(&result), BTreeSet::from(["".to_string()]));
        assert_eq!(tokens(&result, ""), "a");
    }

    #[test]
    fn undef_kills_branch() {
        let result = run("#define A\n#undef A\n#ifdef A\na\n#endif\nb\n");
        assert_eq!(tokens(&result, ""), "b");
    }

    #[test]
    fn elif_chain_reduces_per_configuration() {
        let result = run("#if defined(A)\na\n#elif defined(B)\nb\n#else\nc\n#endif\n");
        assert_eq!(
            names(&result),
            BTreeSet::from(["".to_string(), "A".to_string(), "B".to_string()])
        );
        assert_eq!(tokens(&result, "A"), "a");
        assert_eq!(tokens(&result, "B"), "b");
        assert_eq!(tokens(&result, ""), "c");
    }

    #[test]
    fn taken_if_starves_elif_in_same_configuration() {
        let result = run("#if 1\na\n#elif 1\nb\n#else\nc\n#endif\n");
        assert_eq!(names(&result), BTreeSet::from(["".to_string()]));
        assert_eq!(tokens(&result, ""), "a");
    }

    #[test]
    fn comparison_split_gets_predicate_names() {
        let result = run("#if VER >= 3\nnew_api\n#else\nold_api\n#endif\n");
        assert_eq!(
            names(&result),
            BTreeSet::from(["VER<3".to_string(), "VER>=3".to_string()])
        );
        assert_eq!(tokens(&result, "VER>=3"), "new_api");
        assert_eq!(tokens(&result, "VER<3"), "old_api");
    }

    #[test]
    fn predefine_pins_all_unknowns() {
        let mut settings = PreprocessorSettings::default();
        settings.defines.push("WIN32".to_string());
        let result = run_with(
            "#ifdef WIN32\na\n#endif\n#ifdef OTHER\nb\n#endif\n",
            settings,
            MemoryHeaderSearch::new(),
        );
        // -D without -U: everything unknown counts as defined; no splits.
        assert_eq!(names(&result), BTreeSet::from(["".to_string()]));
        assert_eq!(tokens(&result, ""), "a b");
    }

    #[test]
    fn macro_expansion_in_code() {
        let result = run("#define SIZE 10\nint a[SIZE];\n");
        assert_eq!(tokens(&result, ""), "int a [ 10 ] ;");
    }

    #[test]
    fn function_macro_in_code() {
        let result = run("#define MAX(a, b) ((a) > (b) ? (a) : (b))\nx = MAX(1, y);\n");
        assert_eq!(
            tokens(&result, ""),
            "x = ( ( 1 ) > ( y ) ? ( 1 ) : ( y ) ) ;"
        );
    }

    #[test]
    fn error_directive_drops_configuration() {
        let result = run("#ifdef BAD\n#error unsupported\nx\n#endif\ny\n");
        // The BAD configuration dies; only the default survives.
        assert_eq!(names(&result), BTreeSet::from(["".to_string()]));
        assert_eq!(tokens(&result, ""), "y");
        assert!(result
            .diagnostics
            .iter()
            .any(|d| d.id == "preprocessorErrorDirective"));
    }

    #[test]
    fn too_many_configs_caps_enumeration() {
        let mut code = String::new();
        for i in 0..8 {
            code.push_str(&format!("#ifdef M{}\nint x{};\n#endif\n", i, i));
        }
        let mut settings = PreprocessorSettings::default();
        settings.max_configs = 3;
        let result = run_with(&code, settings, MemoryHeaderSearch::new());
        assert_eq!(result.configurations.len(), 3);
        assert!(result.diagnostics.iter().any(|d| d.id == "toomanyconfigs"));
    }

    #[test]
    fn force_overrides_the_cap() {
        // Two independent #ifdefs enumerate the full product.
        let code = "#ifdef A\nint a;\n#endif\n#ifdef B\nint b;\n#endif\n";
        let mut settings = PreprocessorSettings::default();
        settings.max_configs = 2;
        settings.force = true;
        let result = run_with(code, settings, MemoryHeaderSearch::new());
        assert_eq!(
            names(&result),
            BTreeSet::from([
                "".to_string(),
                "A".to_string(),
                "B".to_string(),
                "A;B".to_string()
            ])
        );
        assert!(result.diagnostics.iter().all(|d| d.id != "toomanyconfigs"));
    }

    #[test]
    fn pragma_asm_becomes_statement() {
        let result = run("#pragma asm\nmov r0\n#pragma endasm\n");
        assert_eq!(tokens(&result, ""), "asm ( mov r0 ) ;");
    }

    #[test]
    fn unknown_pragma_is_deleted() {
        let result = run("#pragma warning(disable: 4996)\nint x;\n");
        assert_eq!(tokens(&result, ""), "int x ;");
    }

    #[test]
    fn unknown_directive_is_deleted() {
        let result = run("#line 99 \"other.c\"\nint x;\n");
        assert_eq!(tokens(&result, ""), "int x ;");
    }

    #[test]
    fn include_pulls_macros_into_configuration() {
        let mut search = MemoryHeaderSearch::new();
        search.insert("config.h", "#define FLAG 1\n");
        let result = run_with(
            "#include \"config.h\"\n#if FLAG\nyes\n#endif\n",
            PreprocessorSettings::default(),
            search,
        );
        assert_eq!(tokens(&result, ""), "yes");
    }

    #[test]
    fn language_builtins_are_seeded() {
        let result = run("#ifdef __cplusplus\ncpp\n#else\nc\n#endif\n");
        // Default settings analyze as C++.
        assert_eq!(names(&result), BTreeSet::from(["".to_string()]));
        assert_eq!(tokens(&result, ""), "cpp");
    }

    #[test]
    fn cplusplus_value_splits_correctly() {
        let result = run("#if __cplusplus >= 201103\nmodern\n#else\nlegacy\n#endif\n");
        assert_eq!(tokens(&result, ""), "modern");
    }

    #[test]
    fn expanded_hash_is_not_a_directive() {
        let result = run("#define H #\nint a; H\n");
        assert_eq!(tokens(&result, ""), "int a ; #");
    }
}
