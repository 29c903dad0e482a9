//! The settings surface shared by the CLI and the core.
//!
//! Everything the core consumes is reached through this struct; there are
//! no free globals. A project file (JSON) can provide any subset of the
//! fields; command-line flags assemble the rest. Unknown fields in the
//! file are an error — a typoed knob should not silently do nothing.

use scrutiny_base::list::Language;
use scrutiny_base::Severity;
use scrutiny_preprocessor::configuration::{CStandard, CppStandard, PreprocessorSettings};
use scrutiny_preprocessor::normalize::NormalizeOptions;
use scrutiny_valueflow::passes::ValueFlowSettings;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Language selection: inferred from the file extension unless forced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LanguageMode {
    #[default]
    Auto,
    C,
    Cpp,
}

/// All driver and core knobs. See the field docs for defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Worker threads; 0 means hardware concurrency.
    pub jobs: usize,
    /// Maximum enumerated configurations per translation unit.
    pub max_configs: usize,
    /// Check every configuration regardless of `max_configs`.
    pub force: bool,
    /// `-I` include search paths.
    pub include_paths: Vec<PathBuf>,
    /// `-D` pre-definitions (`NAME` or `NAME=value`).
    pub defines: Vec<String>,
    /// `-U` pre-undefinitions.
    pub undefines: Vec<String>,
    /// Enabled severities beyond `error` (which is always on).
    pub enable: BTreeSet<String>,
    /// Report inconclusive findings too.
    pub inconclusive: bool,
    /// Named checks to run; empty means all registered checks.
    pub checks: BTreeSet<String>,
    /// Honor `scrutiny-suppress` comments.
    pub inline_suppressions: bool,
    /// `id[:file[:line]]` suppression patterns.
    pub suppressions: Vec<String>,
    pub language: LanguageMode,
    pub c_std: String,
    pub cpp_std: String,
    /// Inject worst-case argument values into externally callable
    /// functions.
    pub safe_functions: bool,
    /// Print verbose diagnostic messages.
    pub verbose: bool,
    /// Print per-pass timing at exit.
    pub show_time: bool,
    /// Emit debug-severity diagnostics.
    pub debug_warnings: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            jobs: 0,
            max_configs: 12,
            force: false,
            include_paths: Vec::new(),
            defines: Vec::new(),
            undefines: Vec::new(),
            enable: BTreeSet::new(),
            inconclusive: false,
            checks: BTreeSet::new(),
            inline_suppressions: true,
            suppressions: Vec::new(),
            language: LanguageMode::Auto,
            c_std: "c11".to_string(),
            cpp_std: "c++11".to_string(),
            safe_functions: false,
            verbose: false,
            show_time: false,
            debug_warnings: false,
        }
    }
}

impl Settings {
    /// Loads a JSON settings file, rejecting unknown keys.
    pub fn from_file(path: &Path) -> Result<Settings, String> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| format!("cannot read settings file '{}': {}", path.display(), e))?;
        serde_json::from_str(&text)
            .map_err(|e| format!("invalid settings file '{}': {}", path.display(), e))
    }

    /// Is a severity enabled for reporting? Errors always are.
    pub fn is_enabled(&self, severity: Severity) -> bool {
        match severity {
            Severity::Error => true,
            Severity::Warning => self.enable.contains("warning") || self.enable.contains("all"),
            Severity::Style => self.enable.contains("style") || self.enable.contains("all"),
            Severity::Performance => {
                self.enable.contains("performance") || self.enable.contains("all")
            }
            Severity::Portability => {
                self.enable.contains("portability") || self.enable.contains("all")
            }
            Severity::Information => {
                self.enable.contains("information") || self.enable.contains("all")
            }
            Severity::Debug => self.debug_warnings,
        }
    }

    /// Is a named check enabled? An empty set enables everything.
    pub fn check_enabled(&self, name: &str) -> bool {
        self.checks.is_empty() || self.checks.contains(name)
    }

    /// The language a file is analyzed as.
    pub fn language_for(&self, path: &str) -> Language {
        match self.language {
            LanguageMode::C => Language::C,
            LanguageMode::Cpp => Language::Cpp,
            LanguageMode::Auto => {
                let lower = path.to_ascii_lowercase();
                if lower.ends_with(".c") {
                    Language::C
                } else {
                    Language::Cpp
                }
            }
        }
    }

    /// Worker count with the hardware default applied.
    pub fn effective_jobs(&self) -> usize {
        if self.jobs > 0 {
            return self.jobs;
        }
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    }

    /// The slice of settings the preprocessor consumes.
    pub fn preprocessor_settings(&self, path: &str) -> PreprocessorSettings {
        PreprocessorSettings {
            max_configs: self.max_configs,
            force: self.force,
            defines: self.defines.clone(),
            undefines: self.undefines.clone(),
            language: self.language_for(path),
            c_std: match self.c_std.as_str() {
                "c89" => CStandard::C89,
                "c99" => CStandard::C99,
                _ => CStandard::C11,
            },
            cpp_std: match self.cpp_std.as_str() {
                "c++03" => CppStandard::Cpp03,
                _ => CppStandard::Cpp11,
            },
            normalize: NormalizeOptions {
                inline_suppressions: self.inline_suppressions,
                fallthrough_suppressions: self.inline_suppressions,
            },
        }
    }

    /// The slice of settings the value-flow engine consumes.
    pub fn valueflow_settings(&self) -> ValueFlowSettings {
        ValueFlowSettings {
            safe_functions: self.safe_functions,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_contract() {
        let s = Settings::default();
        assert_eq!(s.max_configs, 12);
        assert!(!s.force);
        assert!(s.inline_suppressions);
        assert!(s.is_enabled(Severity::Error));
        assert!(!s.is_enabled(Severity::Style));
    }

    #[test]
    fn enable_all_covers_everything_but_debug() {
        let mut s = Settings::default();
        s.enable.insert("all".to_string());
        assert!(s.is_enabled(Severity::Warning));
        assert!(s.is_enabled(Severity::Information));
        assert!(!s.is_enabled(Severity::Debug));
        s.debug_warnings = true;
        assert!(s.is_enabled(Severity::Debug));
    }

    #[test]
    fn language_is_inferred_from_extension() {
        let s = Settings::default();
        assert_eq!(s.language_for("a.c"), Language::C);
        assert_eq!(s.language_for("a.cpp"), Language::Cpp);
        assert_eq!(s.language_for("a.h"), Language::Cpp);
        let mut forced = Settings::default();
        forced.language = LanguageMode::C;
        assert_eq!(forced.language_for("a.cpp"), Language::C);
    }

    #[test]
    fn json_round_trip() {
        let mut s = Settings::default();
        s.defines.push("WIN32".to_string());
        s.max_configs = 3;
        let json = serde_json::to_string(&s).unwrap();
        let back: Settings = serde_json::from_str(&json).unwrap();
        assert_eq!(back.max_configs, 3);
        assert_eq!(back.defines, vec!["WIN32".to_string()]);
    }

    #[test]
    fn unknown_settings_keys_are_rejected()
    {
        let err = serde_json::from_str::<Settings>("{\"max_cfgs\": 3}");
        assert!(err.is_err());
    }

    #[test]
    fn empty_check_set_enables_all() {
        let mut s = Settings::default();
        assert!(s.check_enabled("zerodiv"));
        s.checks.insert("other".to_string());
        assert!(!s.check_enabled("zerodiv"));
        assert!(s.check_enabled("other"));
    }
}
