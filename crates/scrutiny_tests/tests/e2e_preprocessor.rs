//! E2E: configuration splitting.
//!
//! The scenarios fixed by the external contract: split enumeration,
//! per-configuration token lists, guarded headers, canonical names,
//! token-list integrity after arbitrary directive surgery.

mod common;

use common::{configurations, preprocess, preprocess_with};
use scrutiny_preprocessor::configuration::PreprocessorSettings;
use scrutiny_preprocessor::include::MemoryHeaderSearch;
use std::collections::BTreeMap;

#[test]
fn simple_split() {
    let cfgs = configurations("#ifdef WIN32\na\n#else\nb\n#endif\n");
    let expected: BTreeMap<String, String> = BTreeMap::from([
        ("".to_string(), "b".to_string()),
        ("WIN32".to_string(), "a".to_string()),
    ]);
    assert_eq!(cfgs, expected);
}

#[test]
fn nested_guarded_split() {
    let cfgs = configurations("#ifdef A\na\n#ifdef B\nb\n#endif\n#endif\n");
    let expected: BTreeMap<String, String> = BTreeMap::from([
        ("".to_string(), "".to_string()),
        ("A".to_string(), "a".to_string()),
        ("A;B".to_string(), "a b".to_string()),
    ]);
    assert_eq!(cfgs, expected);
}

#[test]
fn self_including_guard_suppressed() {
    let mut headers = MemoryHeaderSearch::new();
    headers.insert("h.h", "#ifndef H\n#define H\nx\n#endif\n");
    let result = preprocess_with(
        "#include \"h.h\"\n#include \"h.h\"\n",
        PreprocessorSettings::default(),
        headers,
    );
    assert_eq!(result.configurations.len(), 1);
    assert_eq!(
        result.configurations[""].list.stringify(None, None),
        "x"
    );
}

#[test]
fn elif_chain() {
    let cfgs = configurations("#if defined(A)\na\n#elif defined(B)\nb\n#else\nc\n#endif\n");
    assert_eq!(cfgs[""], "c");
    assert_eq!(cfgs["A"], "a");
    assert_eq!(cfgs["B"], "b");
    assert_eq!(cfgs.len(), 3);
}

#[test]
fn comparison_splits_carry_the_predicate() {
    let cfgs = configurations("#if VER >= 3\nnew_api ( ) ;\n#else\nold_api ( ) ;\n#endif\n");
    assert_eq!(cfgs["VER>=3"], "new_api ( ) ;");
    assert_eq!(cfgs["VER<3"], "old_api ( ) ;");
}

#[test]
fn configuration_names_are_canonical() {
    // Same assumption set in both orders must serialize identically.
    let a = configurations("#ifdef X\n#ifdef Y\nboth\n#endif\n#endif\n");
    let b = configurations("#ifdef Y\n#ifdef X\nboth\n#endif\n#endif\n");
    assert!(a.contains_key("X;Y"));
    assert!(b.contains_key("X;Y"));
}

#[test]
fn macro_expansion_feeds_conditions() {
    let cfgs = configurations("#define VER 5\n#if VER > 3\nmodern\n#endif\n");
    assert_eq!(cfgs.len(), 1);
    assert_eq!(cfgs[""], "modern");
}

#[test]
fn function_macro_expansion_in_code() {
    let cfgs = configurations("#define SQR(x) ((x) * (x))\ny = SQR(4 + 1);\n");
    assert_eq!(cfgs[""], "y = ( ( 4 + 1 ) * ( 4 + 1 ) ) ;");
}

#[test]
fn stringize_and_paste() {
    let cfgs = configurations("#define NAME(a, b) a ## b\n#define STR(x) # x\nint NAME(foo, bar) = STR(v1);\n");
    assert_eq!(cfgs[""], "int foobar = \"v1\" ;");
}

#[test]
fn token_lists_stay_linked_after_reduction() {
    let result = preprocess(
        "#ifdef A\n#ifdef B\nx\n#endif\n#elif defined(C)\ny\n#else\nz\n#endif\nint tail;\n",
    );
    for cfg in result.configurations.values() {
        cfg.list
            .check_integrity()
            .expect("doubly-linked and mutual-link invariants hold");
    }
}

#[test]
fn configuration_coverage_is_complete() {
    // Every token of the source is retained by at least one configuration.
    let result = preprocess("#ifdef A\nalpha\n#else\nbeta\n#endif\ngamma\n");
    let mut seen = String::new();
    for cfg in result.configurations.values() {
        seen.push(' ');
        seen.push_str(&cfg.list.stringify(None, None));
    }
    for word in ["alpha", "beta", "gamma"] {
        assert!(seen.contains(word), "{} lost from every configuration", word);
    }
}

#[test]
fn missing_include_is_information_not_failure() {
    let result = preprocess("#include \"gone.h\"\nint x;\n");
    assert!(result
        .diagnostics
        .iter()
        .any(|d| d.id == "missingInclude"));
    assert_eq!(result.configurations[""].list.stringify(None, None), "int x ;");
}

#[test]
fn real_files_resolve_through_include_paths() {
    use scrutiny_preprocessor::include::FileHeaderSearch;
    use scrutiny_preprocessor::Preprocessor;

    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("config.h"), "#define FLAG 1\n").unwrap();

    let search = FileHeaderSearch::new(vec![dir.path().to_path_buf()]);
    let pp = Preprocessor::new(PreprocessorSettings::default(), &search);
    let result = pp.preprocess(b"#include <config.h>\n#if FLAG\nyes\n#endif\n", "main.c");
    assert_eq!(result.configurations[""].list.stringify(None, None), "yes");
}

#[test]
fn too_many_configs_keeps_what_was_found() {
    let mut code = String::new();
    for i in 0..10 {
        code.push_str(&format!("#ifdef M{}\nint x{};\n#endif\n", i, i));
    }
    let mut settings = PreprocessorSettings::default();
    settings.max_configs = 4;
    let result = preprocess_with(&code, settings, MemoryHeaderSearch::new());
    assert_eq!(result.configurations.len(), 4);
    assert!(result.diagnostics.iter().any(|d| d.id == "toomanyconfigs"));
}

#[test]
fn utf16_source_is_decoded() {
    use scrutiny_preprocessor::Preprocessor;

    // "a\n#ifdef X\nb\n#endif\n" in UTF-16 BE.
    let text = "a\n#ifdef X\nb\n#endif\n";
    let mut bytes = vec![0xfe, 0xff];
    for unit in text.encode_utf16() {
        bytes.extend_from_slice(&unit.to_be_bytes());
    }
    let search = MemoryHeaderSearch::new();
    let pp = Preprocessor::new(PreprocessorSettings::default(), &search);
    let result = pp.preprocess(&bytes, "wide.c");
    assert!(result.configurations.contains_key("X"));
}

#[test]
fn suppressions_are_harvested_from_all_files() {
    let mut headers = MemoryHeaderSearch::new();
    headers.insert("h.h", "// scrutiny-suppress nullPointer\nint y;\n");
    let result = preprocess_with(
        "#include \"h.h\"\n// scrutiny-suppress zerodiv\nint x;\n",
        PreprocessorSettings::default(),
        headers,
    );
    let ids: Vec<&str> = result.suppressions.iter().map(|s| s.id.as_str()).collect();
    assert!(ids.contains(&"zerodiv"));
    assert!(ids.contains(&"nullPointer"));
}
