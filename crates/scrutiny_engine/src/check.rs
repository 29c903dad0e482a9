//! The check registry and the per-configuration context.
//!
//! Checks are pure consumers of the preprocessor and value-flow output.
//! Each registered check is invoked once per configuration with a borrowed
//! [`Context`]; reporting funnels through [`Context::report`], which
//! applies severity enabling, certainty filtering and suppressions in one
//! place.
//!
//! The registry is an explicit list built at startup ([`builtin_checks`]);
//! nothing self-registers through global state.
//!
//! Whole-program analysis runs after every translation unit finished: each
//! check may contribute a [`FileInfo`] summary per unit, and sees the full
//! collection at the end.

use crate::settings::Settings;
use crate::suppressions::Suppressions;
use scrutiny_base::{Certainty, ErrorMessage, ErrorSink, Severity, TokenList};
use scrutiny_valueflow::SymbolDatabase;
use serde::{Deserialize, Serialize};

/// Everything a check sees for one configuration of one translation unit.
pub struct Context<'a> {
    pub list: &'a TokenList,
    pub symbols: &'a SymbolDatabase,
    pub settings: &'a Settings,
    pub suppressions: &'a Suppressions,
    /// Canonical name of the configuration being checked.
    pub config: &'a str,
    pub sink: &'a mut dyn ErrorSink,
}

impl Context<'_> {
    /// Reports a finding, applying enablement and suppression rules.
    pub fn report(&mut self, msg: ErrorMessage) {
        if !self.settings.is_enabled(msg.severity) {
            return;
        }
        if msg.certainty == Certainty::Inconclusive && !self.settings.inconclusive {
            return;
        }
        if let Some(loc) = msg.location() {
            if self.suppressions.is_suppressed(&msg.id, &loc.file, loc.line) {
                return;
            }
        }
        self.sink.report(msg);
    }
}

/// Per-translation-unit summary a check hands to whole-program analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileInfo {
    /// Name of the check that produced this.
    pub check: String,
    /// The unit it describes.
    pub file: String,
    /// Check-defined payload.
    pub data: serde_json::Value,
}

/// A check module. Implementations live in this crate or downstream.
pub trait Check: Send + Sync {
    /// Stable name, used by `--checks` filtering and FileInfo tagging.
    fn name(&self) -> &'static str;

    /// Invoked once per configuration.
    fn run_checks(&self, ctx: &mut Context);

    /// Per-unit summary for whole-program passes; `None` when the check
    /// has no cross-unit component.
    fn file_info(&self, _ctx: &Context) -> Option<FileInfo> {
        None
    }

    /// Invoked once after all units; returns true when anything was
    /// reported.
    fn analyse_whole_program(
        &self,
        _infos: &[FileInfo],
        _settings: &Settings,
        _sink: &mut dyn ErrorSink,
    ) -> bool {
        false
    }
}

/// The explicit registry, assembled at process start.
pub fn builtin_checks() -> Vec<Box<dyn Check>> {
    vec![Box::new(ZeroDivisionCheck), Box::new(UnusedFunctionsCheck)]
}

// ---------------------------------------------------------------------------
// Division by zero
// ---------------------------------------------------------------------------

/// Flags `/` and `%` whose right operand is known to be zero.
pub struct ZeroDivisionCheck;

impl Check for ZeroDivisionCheck {
    fn name(&self) -> &'static str {
        "zerodiv"
    }

    fn run_checks(&self, ctx: &mut Context) {
        let list = ctx.list;
        for tok in list.iter() {
            if !matches!(list.str(tok), "/" | "%") {
                continue;
            }
            let Some(rhs) = list.tok(tok).ast_op2 else { continue };
            let zero = list
                .tok(rhs)
                .values
                .iter()
                .find(|v| v.is_known() && v.is_int() && v.int_value() == Some(0));
            let Some(zero) = zero else { continue };

            let mut msg = ErrorMessage::new(
                Severity::Error,
                "zerodiv",
                "Division by zero.",
                Some(list.location(tok)),
            )
            .with_cwe(369)
            .with_verbose(
                "Division by zero. The right-hand operand is always zero on this path.",
            );
            for (path_tok, note) in &zero.error_path {
                msg.path.push(scrutiny_base::PathItem {
                    location: list.location(*path_tok),
                    note: note.clone(),
                });
            }
            ctx.report(msg);
        }
    }
}

// ---------------------------------------------------------------------------
// Unused functions (whole program)
// ---------------------------------------------------------------------------

/// Collects function definitions and calls per unit; functions never
/// called anywhere are reported after the last unit.
pub struct UnusedFunctionsCheck;

#[derive(Debug, Serialize, Deserialize)]
struct UnusedFunctionsInfo {
    defined: Vec<(String, String, u32)>,
    called: Vec<String>,
}

impl Check for UnusedFunctionsCheck {
    fn name(&self) -> &'static str {
        "unusedFunction"
    }

    fn run_checks(&self, _ctx: &mut Context) {
        // Purely a whole-program check.
    }

    fn file_info(&self, ctx: &Context) -> Option<FileInfo> {
        let list = ctx.list;
        let mut defined = Vec::new();
        for function in &ctx.symbols.functions {
            if function.body.is_none() || function.name == "main" {
                continue;
            }
            let loc = list.location(function.name_tok);
            defined.push((function.name.clone(), loc.file, loc.line));
        }
        let mut called = Vec::new();
        for tok in list.iter() {
            if list.str(tok) != "(" {
                continue;
            }
            let Some(callee) = list.tok(tok).ast_op1 else { continue };
            if !list.tok(callee).is_name() || list.tok(callee).var_id != 0 {
                continue;
            }
            // A definition's own header is not a call.
            let is_definition = ctx
                .symbols
                .functions
                .iter()
                .any(|f| f.name_tok == callee);
            if !is_definition {
                called.push(list.str(callee).to_string());
            }
        }
        let data = serde_json::to_value(UnusedFunctionsInfo { defined, called }).ok()?;
        Some(FileInfo {
            check: self.name().to_string(),
            file: list.files().primary().unwrap_or_default(),
            data,
        })
    }

    fn analyse_whole_program(
        &self,
        infos: &[FileInfo],
        settings: &Settings,
        sink: &mut dyn ErrorSink,
    ) -> bool {
        let mut defined: Vec<(String, String, u32)> = Vec::new();
        let mut called: std::collections::HashSet<String> = std::collections::HashSet::new();
        for info in infos.iter().filter(|i| i.check == self.name()) {
            let Ok(parsed) = serde_json::from_value::<UnusedFunctionsInfo>(info.data.clone())
            else {
                continue;
            };
            defined.extend(parsed.defined);
            called.extend(parsed.called);
        }
        if !settings.is_enabled(Severity::Style) {
            return false;
        }
        let mut reported = false;
        for (name, file, line) in defined {
            if called.contains(&name) {
                continue;
            }
            sink.report(
                ErrorMessage::new(
                    Severity::Style,
                    "unusedFunction",
                    format!("The function '{}' is never used.", name),
                    Some(scrutiny_base::SourceLocation::new(file, line)),
                )
                .with_cwe(561),
            );
            reported = true;
        }
        reported
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scrutiny_base::CollectingSink;
    use scrutiny_base::list::{classify, Language};
    use scrutiny_base::Token;
    use scrutiny_valueflow::passes::{set_values, ValueFlowSettings};

    fn analyzed(code: &str) -> (TokenList, SymbolDatabase) {
        let mut list = TokenList::new(Language::Cpp);
        let file = list.add_file("test.cpp");
        for word in code.split_whitespace() {
            list.push(Token::new(word, classify(word), file, 1));
        }
        let db = SymbolDatabase::build(&mut list);
        set_values(&mut list, &db, &ValueFlowSettings::default());
        (list, db)
    }

    fn run_check(code: &str, check: &dyn Check) -> Vec<ErrorMessage> {
        let (list, db) = analyzed(code);
        let settings = Settings::default();
        let suppressions = Suppressions::new();
        let mut sink = CollectingSink::new();
        let mut ctx = Context {
            list: &list,
            symbols: &db,
            settings: &settings,
            suppressions: &suppressions,
            config: "",
            sink: &mut sink,
        };
        check.run_checks(&mut ctx);
        sink.messages
    }

    #[test]
    fn division_by_literal_zero_is_reported() {
        let msgs = run_check("void f ( int a ) { y = a / 0 ; }", &ZeroDivisionCheck);
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].id, "zerodiv");
        assert_eq!(msgs[0].cwe, 369);
    }

    #[test]
    fn division_by_flowed_zero_is_reported() {
        let msgs = run_check(
            "void f ( int a ) { int d = 0 ; y = a % d ; }",
            &ZeroDivisionCheck,
        );
        assert_eq!(msgs.len(), 1);
        // The error path explains the derivation.
        assert!(!msgs[0].path.is_empty());
    }

    #[test]
    fn nonzero_divisor_is_silent() {
        let msgs = run_check("void f ( int a ) { int d = 2 ; y = a / d ; }", &ZeroDivisionCheck);
        assert!(msgs.is_empty());
    }

    #[test]
    fn possible_zero_is_not_an_error() {
        // d may be zero, but is not known to be.
        let msgs = run_check(
            "void f ( int a , int b ) { int d = 0 ; if ( b ) { d = 2 ; } y = a / d ; }",
            &ZeroDivisionCheck,
        );
        assert!(msgs.is_empty());
    }

    #[test]
    fn suppression_silences_the_finding() {
        let (list, db) = analyzed("void f ( int a ) { y = a / 0 ; }");
        let settings = Settings::default();
        let mut suppressions = Suppressions::new();
        suppressions.add_pattern("zerodiv").unwrap();
        let mut sink = CollectingSink::new();
        let mut ctx = Context {
            list: &list,
            symbols: &db,
            settings: &settings,
            suppressions: &suppressions,
            config: "",
            sink: &mut sink,
        };
        ZeroDivisionCheck.run_checks(&mut ctx);
        assert!(sink.messages.is_empty());
    }

    #[test]
    fn unused_function_found_across_infos() {
        let (list, db) = analyzed("void helper ( ) { } void used ( ) { } void main_like ( ) { used ( ) ; }");
        let mut settings = Settings::default();
        settings.enable.insert("style".to_string());
        let suppressions = Suppressions::new();
        let mut sink = CollectingSink::new();
        let info = {
            let mut ctx = Context {
                list: &list,
                symbols: &db,
                settings: &settings,
                suppressions: &suppressions,
                config: "",
                sink: &mut sink,
            };
            UnusedFunctionsCheck.file_info(&ctx).unwrap()
        };
        let mut out = CollectingSink::new();
        let reported =
            UnusedFunctionsCheck.analyse_whole_program(&[info], &settings, &mut out);
        assert!(reported);
        let names: Vec<&str> = out.messages.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(names, vec!["unusedFunction", "unusedFunction"]);
        // helper and main_like are unused; used() is called.
        assert!(out.messages.iter().any(|m| m.message.contains("'helper'")));
        assert!(!out.messages.iter().any(|m| m.message.contains("'used'")));
    }

    #[test]
    fn registry_lists_builtin_checks() {
        let checks = builtin_checks();
        let names: Vec<&str> = checks.iter().map(|c| c.name()).collect();
        assert!(names.contains(&"zerodiv"));
        assert!(names.contains(&"unusedFunction"));
    }
}
