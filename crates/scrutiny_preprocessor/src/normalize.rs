//! Source normalization: from raw bytes to a clean, comment-free string.
//!
//! Two stages. [`read_code`] decodes the byte stream: UTF-16 (either
//! endianness, detected by BOM) is folded to one byte per code unit with
//! every unit ≥ 0x80 replaced by a 0xFF sentinel, and `\r` / `\r\n` become
//! `\n`. [`simplify`] then rewrites the text in source order:
//!
//! 1. digraph/trigraph replacement,
//! 2. `\<newline>` line-splice merging — swallowed newlines are re-injected
//!    at the next real newline so physical line numbers stay correct,
//! 3. comment stripping, harvesting `scrutiny-suppress <id>` markers and
//!    fall-through hints into per-location suppressions,
//! 4. whitespace collapse (tabs to spaces, doubled spaces, line-edge
//!    spaces).
//!
//! Simplification is idempotent modulo a trailing newline: feeding the
//! output back in reproduces it.
//!
//! A byte with the high bit set encountered outside a string/character
//! literal produces a `syntaxError` diagnostic naming the character code;
//! processing continues so one stray byte does not hide the rest of the
//! file.

use scrutiny_base::{ErrorMessage, Severity, SourceLocation};

/// An inline suppression harvested from a comment, keyed to the location of
/// the code it precedes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineSuppression {
    pub id: String,
    pub file: String,
    pub line: u32,
}

/// What [`simplify`] produces besides the text itself.
#[derive(Debug, Default)]
pub struct NormalizeOutput {
    pub text: String,
    pub suppressions: Vec<InlineSuppression>,
    pub diagnostics: Vec<ErrorMessage>,
}

/// Normalizer knobs, both on by default in the analyzer driver.
#[derive(Debug, Clone, Copy)]
pub struct NormalizeOptions {
    /// Harvest `scrutiny-suppress <id>` comments.
    pub inline_suppressions: bool,
    /// Turn fall-through hint comments before `case`/`default` into
    /// `switchCaseFallThrough` suppressions.
    pub fallthrough_suppressions: bool,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        NormalizeOptions {
            inline_suppressions: true,
            fallthrough_suppressions: true,
        }
    }
}

/// Decodes a raw byte stream into the working string.
///
/// UTF-16 streams are detected by a leading 0xFEFF/0xFFFE BOM; each two-byte
/// unit becomes one char, with units ≥ 0x80 replaced by the 0xFF sentinel so
/// the rest of the pipeline sees a fixed "non-ASCII" marker. All newline
/// conventions collapse to `\n`. Bytes are otherwise passed through
/// unchanged (a UTF-8 BOM survives; [`simplify`] skips it).
pub fn read_code(bytes: &[u8]) -> String {
    let utf16 = bytes.len() >= 2
        && ((bytes[0] == 0xfe && bytes[1] == 0xff) || (bytes[0] == 0xff && bytes[1] == 0xfe));

    let mut out = String::with_capacity(bytes.len());
    if utf16 {
        let big_endian = bytes[0] == 0xfe;
        let mut units = bytes[2..].chunks_exact(2);
        let mut pending: Option<char> = None;
        for unit in &mut units {
            let code = if big_endian {
                u16::from_be_bytes([unit[0], unit[1]])
            } else {
                u16::from_le_bytes([unit[0], unit[1]])
            };
            let ch = if code >= 0x80 { '\u{ff}' } else { code as u8 as char };
            match (pending.take(), ch) {
                (Some('\r'), '\n') => out.push('\n'),
                (Some('\r'), other) => {
                    out.push('\n');
                    pending = push_or_hold(&mut out, other);
                }
                (Some(held), other) => {
                    out.push(held);
                    pending = push_or_hold(&mut out, other);
                }
                (None, other) => pending = push_or_hold(&mut out, other),
            }
        }
        if let Some(held) = pending {
            out.push(if held == '\r' { '\n' } else { held });
        }
    } else {
        let mut i = 0;
        while i < bytes.len() {
            let b = bytes[i];
            if b == b'\r' {
                out.push('\n');
                if i + 1 < bytes.len() && bytes[i + 1] == b'\n' {
                    i += 1;
                }
            } else {
                out.push(b as char);
            }
            i += 1;
        }
    }
    out
}

fn push_or_hold(out: &mut String, ch: char) -> Option<char> {
    if ch == '\r' {
        Some('\r')
    } else {
        out.push(ch);
        None
    }
}

/// Full normalization of decoded text. See the module docs for the stages.
pub fn simplify(text: &str, filename: &str, options: NormalizeOptions) -> NormalizeOutput {
    let mut chars: Vec<char> = text.chars().collect();
    replace_ditrigraphs(&mut chars);
    concatenate_lines(&mut chars);
    let mut output = remove_comments(&chars, filename, options);
    remove_whitespaces(&mut output.text);
    output
}

/// Trigraph (`??=` …) and digraph (`<:` …) replacement, in one pass.
fn replace_ditrigraphs(chars: &mut Vec<char>) {
    let mut out = Vec::with_capacity(chars.len());
    let mut i = 0;
    while i < chars.len() {
        if chars[i] == '?' && i + 2 < chars.len() && chars[i + 1] == '?' {
            let replacement = match chars[i + 2] {
                '=' => Some('#'),
                '/' => Some('\\'),
                '\'' => Some('^'),
                '(' => Some('['),
                ')' => Some(']'),
                '!' => Some('|'),
                '<' => Some('{'),
                '>' => Some('}'),
                '-' => Some('~'),
                _ => None,
            };
            if let Some(ch) = replacement {
                out.push(ch);
                i += 3;
                continue;
            }
        }
        if i + 1 < chars.len() {
            let digraph = match (chars[i], chars[i + 1]) {
                ('<', ':') => Some('['),
                (':', '>') => Some(']'),
                ('<', '%') => Some('{'),
                ('%', '>') => Some('}'),
                ('%', ':') => Some('#'),
                _ => None,
            };
            if let Some(ch) = digraph {
                out.push(ch);
                i += 2;
                continue;
            }
        }
        out.push(chars[i]);
        i += 1;
    }
    *chars = out;
}

/// Merges `\<newline>` splices. Each swallowed newline is re-injected just
/// before the next real newline, keeping every following physical line at
/// its original number.
fn concatenate_lines(chars: &mut Vec<char>) {
    let mut out = Vec::with_capacity(chars.len());
    let mut swallowed = 0usize;
    let mut i = 0;
    while i < chars.len() {
        if chars[i] == '\\' && i + 1 < chars.len() && chars[i + 1] == '\n' {
            swallowed += 1;
            i += 2;
        } else if chars[i] == '\n' && swallowed > 0 {
            for _ in 0..swallowed {
                out.push('\n');
            }
            swallowed = 0;
            out.push('\n');
            i += 1;
        } else {
            out.push(chars[i]);
            i += 1;
        }
    }
    for _ in 0..swallowed {
        out.push('\n');
    }
    *chars = out;
}

/// Strips `//` and `/* */` comments, harvesting suppression markers, and
/// flags stray high-bit characters. Also collapses doubled spaces and
/// rewrites raw-string literals into ordinary escaped literals.
fn remove_comments(chars: &[char], filename: &str, options: NormalizeOptions) -> NormalizeOutput {
    let mut out = NormalizeOutput::default();
    let code = &mut out.text;

    let mut lineno: u32 = 1;
    // Newlines swallowed inside block comments and string escapes, re-added
    // at the next real newline.
    let mut newlines = 0usize;
    let mut previous = '\0';
    let mut in_preprocessor_line = false;
    let mut suppression_ids: Vec<String> = Vec::new();
    let mut fallthrough_comment = false;

    // Skip a UTF-8 BOM if the decoder passed one through.
    let start = if chars.len() >= 3
        && chars[0] == '\u{ef}'
        && chars[1] == '\u{bb}'
        && chars[2] == '\u{bf}'
    {
        3
    } else {
        0
    };

    let mut i = start;
    while i < chars.len() {
        let ch = chars[i];
        if (ch as u32) & 0x80 != 0 {
            out.diagnostics.push(ErrorMessage::new(
                Severity::Error,
                "syntaxError",
                format!(
                    "The code contains unhandled characters. Neither unicode nor extended ASCII \
                     is supported. (line={}, character code={:x})",
                    lineno, ch as u32
                ),
                Some(SourceLocation::new(filename, lineno)),
            ));
        }

        if ch.is_whitespace() {
            if !(ch == ' ' && previous == ' ') {
                code.push(ch);
                previous = ch;
            }
            if ch == '\n' {
                if previous != '\\' {
                    in_preprocessor_line = false;
                }
                lineno += 1;
                if newlines > 0 {
                    for _ in 0..newlines {
                        code.push('\n');
                    }
                    newlines = 0;
                    previous = '\n';
                }
            }
            i += 1;
            continue;
        }

        if ch == '/' && i + 1 < chars.len() && chars[i + 1] == '/' {
            let comment_start = i + 2;
            while i < chars.len() && chars[i] != '\n' {
                i += 1;
            }
            let comment: String = chars[comment_start..i.min(chars.len())].iter().collect();
            harvest_comment(&comment, options, &mut suppression_ids, &mut fallthrough_comment);
            if i >= chars.len() {
                break;
            }
            code.push('\n');
            previous = '\n';
            lineno += 1;
            i += 1;
        } else if ch == '/' && i + 1 < chars.len() && chars[i + 1] == '*' {
            let comment_start = i + 2;
            i += 2;
            while i + 1 < chars.len() && !(chars[i] == '*' && chars[i + 1] == '/') {
                if chars[i] == '\n' {
                    newlines += 1;
                    lineno += 1;
                }
                i += 1;
            }
            let comment_end = i.min(chars.len());
            let comment: String = chars[comment_start..comment_end].iter().collect();
            harvest_comment(&comment, options, &mut suppression_ids, &mut fallthrough_comment);
            i = (i + 2).min(chars.len());
        } else if ch == '#' && previous == '\n' {
            code.push(ch);
            previous = ch;
            in_preprocessor_line = true;
            flush_suppressions(&mut suppression_ids, filename, lineno, &mut out.suppressions);
            i += 1;
        } else {
            if !in_preprocessor_line {
                // Real code. Resolve a pending fall-through hint against the
                // upcoming keyword, then attach accumulated suppressions.
                if fallthrough_comment && options.fallthrough_suppressions {
                    let mut j = i;
                    while j < chars.len() && chars[j].is_ascii_lowercase() {
                        j += 1;
                    }
                    let word: String = chars[i..j].iter().collect();
                    if word == "case" || word == "default" {
                        suppression_ids.push("switchCaseFallThrough".to_string());
                    }
                    fallthrough_comment = false;
                }
                flush_suppressions(&mut suppression_ids, filename, lineno, &mut out.suppressions);
            }

            if ch == '"' || ch == '\'' {
                code.push(ch);
                let quote = ch;
                i += 1;
                while i < chars.len() {
                    let c = chars[i];
                    if c == '\\' && i + 1 < chars.len() {
                        let escaped = chars[i + 1];
                        if escaped == '\n' {
                            newlines += 1;
                        } else {
                            code.push('\\');
                            code.push(escaped);
                            previous = escaped;
                        }
                        i += 2;
                        continue;
                    }
                    code.push(c);
                    previous = c;
                    i += 1;
                    if c == quote || c == '\n' {
                        break;
                    }
                }
            } else if ch == 'R'
                && i + 1 < chars.len()
                && chars[i + 1] == '"'
                && raw_string(chars, i, code, &mut newlines, &mut i)
            {
                previous = '"';
            } else {
                code.push(ch);
                previous = ch;
                i += 1;
            }
        }
    }

    out
}

/// Rewrites `R"delim( … )delim"` into an ordinary escaped string literal.
/// Returns false (and consumes nothing) when the delimiter is malformed or
/// unterminated, leaving the `R` to pass through as code.
fn raw_string(
    chars: &[char],
    start: usize,
    code: &mut String,
    newlines: &mut usize,
    index: &mut usize,
) -> bool {
    let mut delim = String::new();
    let mut pos = start + 2;
    loop {
        if pos >= chars.len()
            || delim.len() > 16
            || chars[pos].is_whitespace()
            || chars[pos].is_control()
            || chars[pos] == ')'
            || chars[pos] == '\\'
        {
            // Malformed delimiter; the R passes through as ordinary code.
            code.push('R');
            *index = start + 1;
            return false;
        }
        if chars[pos] == '(' {
            break;
        }
        delim.push(chars[pos]);
        pos += 1;
    }

    let closer: Vec<char> = format!("){}\"", delim).chars().collect();
    let body_start = start + 2 + delim.len() + 1;
    let mut end = body_start;
    'search: while end < chars.len() {
        if chars[end..].starts_with(&closer) {
            break 'search;
        }
        end += 1;
    }
    if end >= chars.len() {
        code.push('R');
        *index = start + 1;
        return false;
    }

    let mut raw_newlines = 0usize;
    code.push('"');
    for &c in &chars[body_start..end] {
        match c {
            '\n' => {
                raw_newlines += 1;
                code.push('\\');
                code.push('n');
            }
            c if c.is_control() || c.is_whitespace() => code.push(' '),
            '\\' => code.push('\\'),
            '"' | '\'' => {
                code.push('\\');
                code.push(c);
            }
            c => code.push(c),
        }
    }
    code.push('"');
    *newlines += raw_newlines;
    *index = end + closer.len();
    true
}

fn harvest_comment(
    comment: &str,
    options: NormalizeOptions,
    suppression_ids: &mut Vec<String>,
    fallthrough_comment: &mut bool,
) {
    if options.inline_suppressions {
        let mut words = comment.split_whitespace();
        if words.next() == Some("scrutiny-suppress") {
            if let Some(id) = words.next() {
                suppression_ids.push(id.to_string());
            }
        }
    }
    if is_fallthrough_comment(comment) {
        *fallthrough_comment = true;
    }
}

fn flush_suppressions(
    ids: &mut Vec<String>,
    filename: &str,
    line: u32,
    out: &mut Vec<InlineSuppression>,
) {
    for id in ids.drain(..) {
        out.push(InlineSuppression {
            id,
            file: filename.to_string(),
            line,
        });
    }
}

fn is_fallthrough_comment(comment: &str) -> bool {
    let folded: String = comment
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| c.to_ascii_lowercase())
        .collect();
    folded.contains("fallthr")
        || folded.contains("fallsthr")
        || folded.contains("fall-thr")
        || folded.contains("dropthr")
        || folded.contains("passthr")
        || folded.contains("nobreak")
        || folded == "fall"
}

/// Tabs to spaces, and no space may touch a newline or either end of the
/// text.
fn remove_whitespaces(text: &mut String) {
    let chars: Vec<char> = text.chars().map(|c| if c == '\t' { ' ' } else { c }).collect();
    let mut out = String::with_capacity(chars.len());
    for (i, &c) in chars.iter().enumerate() {
        if c == ' ' {
            let at_edge = i == 0 || i + 1 >= chars.len();
            let next_nl = chars.get(i + 1) == Some(&'\n');
            let prev_nl = i > 0 && chars[i - 1] == '\n';
            if at_edge || next_nl || prev_nl {
                continue;
            }
        }
        out.push(c);
    }
    *text = out;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn simplified(text: &str) -> String {
        simplify(text, "test.c", NormalizeOptions::default()).text
    }

    #[test]
    fn read_code_unifies_newlines() {
        assert_eq!(read_code(b"a\r\nb\rc\nd"), "a\nb\nc\nd");
    }

    #[test]
    fn read_code_utf16_big_endian() {
        let bytes = [0xfe, 0xff, 0x00, b'a', 0x00, b'\n', 0x01, 0x02];
        assert_eq!(read_code(&bytes), "a\n\u{ff}");
    }

    #[test]
    fn read_code_utf16_little_endian() {
        let bytes = [0xff, 0xfe, b'a', 0x00, b'b', 0x00];
        assert_eq!(read_code(&bytes), "ab");
    }

    #[test]
    fn read_code_utf16_crlf() {
        let bytes = [0xfe, 0xff, 0x00, b'a', 0x00, b'\r', 0x00, b'\n', 0x00, b'b'];
        assert_eq!(read_code(&bytes), "a\nb");
    }

    #[test]
    fn trigraphs_are_replaced() {
        let mut chars: Vec<char> = "??=??/??'??(??)??!??<??>??-".chars().collect();
        replace_ditrigraphs(&mut chars);
        let s: String = chars.into_iter().collect();
        assert_eq!(s, "#\\^[]|{}~");
    }

    #[test]
    fn digraphs_are_replaced() {
        let mut chars: Vec<char> = "<: :> <% %> %:".chars().collect();
        replace_ditrigraphs(&mut chars);
        let s: String = chars.into_iter().collect();
        assert_eq!(s, "[ ] { } #");
    }

    #[test]
    fn line_splices_keep_line_count() {
        // Two spliced lines; the swallowed newlines reappear before "int".
        let out = simplified("#define FOO \\\n 1 + \\\n 2\nint x;\n");
        assert_eq!(out, "#define FOO 1 + 2\n\n\nint x;\n");
    }

    #[test]
    fn line_comments_are_stripped() {
        assert_eq!(simplified("int a; // trailing\nint b;\n"), "int a;\nint b;\n");
    }

    #[test]
    fn block_comments_preserve_line_numbers() {
        assert_eq!(simplified("a /* one\ntwo\nthree */ b\n"), "a b\n\n\n");
    }

    #[test]
    fn comment_markers_inside_strings_survive() {
        assert_eq!(simplified("s = \"/* no comment */\";\n"), "s = \"/* no comment */\";\n");
    }

    #[test]
    fn inline_suppression_is_harvested() {
        let out = simplify(
            "// scrutiny-suppress nullPointer\n*p = 0;\n",
            "test.c",
            NormalizeOptions::default(),
        );
        assert_eq!(
            out.suppressions,
            vec![InlineSuppression {
                id: "nullPointer".to_string(),
                file: "test.c".to_string(),
                line: 2,
            }]
        );
        assert_eq!(out.text, "\n*p = 0;\n");
    }

    #[test]
    fn fallthrough_comment_suppresses_next_case() {
        let out = simplify(
            "switch (x) {\ncase 1: y();\n// fall through\ncase 2: break;\n}\n",
            "test.c",
            NormalizeOptions::default(),
        );
        assert!(out
            .suppressions
            .iter()
            .any(|s| s.id == "switchCaseFallThrough" && s.line == 4));
    }

    #[test]
    fn high_bit_byte_reports_syntax_error_and_continues() {
        let out = simplify("int a;\nint \u{e4}...;\nint b;\n", "test.c", NormalizeOptions::default());
        assert_eq!(out.diagnostics.len(), 1);
        assert_eq!(out.diagnostics[0].id, "syntaxError");
        assert!(out.diagnostics[0].message.contains("line=2"));
        assert!(out.text.contains("int b;"));
    }

    #[test]
    fn high_bit_inside_string_is_tolerated() {
        let out = simplify("const char* s = \"\u{e4}\";\n", "test.c", NormalizeOptions::default());
        assert!(out.diagnostics.is_empty());
    }

    #[test]
    fn raw_strings_become_plain_literals() {
        assert_eq!(
            simplified("R\"(a\"b\\c)\";\n"),
            "\"a\\\"b\\c\";\n"
        );
    }

    #[test]
    fn raw_string_newlines_are_reinjected() {
        let out = simplified("R\"(one\ntwo)\";x\n");
        assert_eq!(out, "\"one\\ntwo\";x\n\n");
    }

    #[test]
    fn whitespace_collapses() {
        assert_eq!(simplified("a   b\n  c\nd  \n"), "a b\nc\nd\n");
    }

    #[test]
    fn simplify_is_idempotent() {
        let cases = [
            "#define FOO \\\n 1\nint x;\n",
            "a /* c */ b\n",
            "int a;  // x\n\tint b;\n",
            "R\"(raw)\";\n",
        ];
        for case in cases {
            let once = simplified(case);
            let twice = simplified(&once);
            assert_eq!(
                twice.trim_end_matches('\n'),
                once.trim_end_matches('\n'),
                "not idempotent for {:?}",
                case
            );
        }
    }
}
