//! Lexing normalized source into classified tokens.
//!
//! This is the token *producer*: classification happens here, bracket and
//! directive linkage does not (see [`crate::directive`]). Tokens can be
//! appended to a fresh list or spliced in after an arbitrary token, which is
//! how `#include` bodies and macro expansions enter an existing list with
//! correct provenance.
//!
//! The lexer works on the output of [`crate::normalize`]: comments are gone,
//! whitespace is single spaces and newlines, and every remaining byte is
//! ASCII or the 0xFF sentinel.

use once_cell::sync::Lazy;
use scrutiny_base::list::{classify, Language};
use scrutiny_base::{FileId, StrEncoding, Token, TokenId, TokenKind, TokenList};
use std::collections::HashSet;

static C_KEYWORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "auto", "break", "case", "char", "const", "continue", "default", "do", "double", "else",
        "enum", "extern", "float", "for", "goto", "if", "inline", "int", "long", "register",
        "restrict", "return", "short", "signed", "sizeof", "static", "struct", "switch", "typedef",
        "union", "unsigned", "void", "volatile", "while",
    ]
    .into_iter()
    .collect()
});

static CPP_KEYWORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    C_KEYWORDS
        .iter()
        .copied()
        .chain([
            "alignas", "alignof", "bool", "catch", "class", "constexpr", "const_cast",
            "decltype", "delete", "dynamic_cast", "explicit", "export", "friend", "mutable",
            "namespace", "new", "noexcept", "nullptr", "operator", "private", "protected",
            "public", "reinterpret_cast", "static_assert", "static_cast", "template", "this",
            "throw", "try", "typeid", "typename", "using", "virtual", "wchar_t",
        ])
        .collect()
});

// Longest-match operator tables. Three-character operators first.
static OPS3: &[&str] = &["<<=", ">>=", "...", "->*"];
static OPS2: &[&str] = &[
    "<<", ">>", "<=", ">=", "==", "!=", "&&", "||", "->", "++", "--", "+=", "-=", "*=", "/=",
    "%=", "&=", "|=", "^=", "::", "##",
];

/// Lexes `text` and splices the tokens into `list` after `insert_after`
/// (`None` appends at the back). Returns the id of the first produced token.
///
/// `filename` is registered in the list's file table; every produced token
/// carries that file id plus its physical line.
pub fn tokenize_into(
    list: &mut TokenList,
    text: &str,
    filename: &str,
    insert_after: Option<TokenId>,
) -> Option<TokenId> {
    let file = list.add_file(filename);
    let toks = scan(text, file, 1, list.lang());
    list.splice_after(insert_after, toks).map(|(first, _)| first)
}

/// Lexes replacement text for macro expansion. Every token inherits the
/// provenance of the invocation site so directive line-ends stay intact.
pub fn tokenize_snippet(text: &str, file: FileId, line: u32, lang: Language) -> Vec<Token> {
    scan(text, file, line, lang)
        .into_iter()
        .map(|mut t| {
            t.line = line;
            t
        })
        .collect()
}

/// The scanner proper.
fn scan(text: &str, file: FileId, first_line: u32, lang: Language) -> Vec<Token> {
    let keywords: &HashSet<&str> = match lang {
        Language::C => &C_KEYWORDS,
        Language::Cpp => &CPP_KEYWORDS,
    };

    let chars: Vec<char> = text.chars().collect();
    let mut toks: Vec<Token> = Vec::new();
    let mut line = first_line;
    let mut ws = true;
    let mut i = 0;

    macro_rules! emit {
        ($tok:expr) => {{
            let mut t = $tok;
            t.ws_before = ws;
            ws = false;
            toks.push(t);
        }};
    }

    while i < chars.len() {
        let ch = chars[i];

        if ch == '\n' {
            line += 1;
            ws = true;
            i += 1;
            continue;
        }
        if ch == ' ' {
            ws = true;
            i += 1;
            continue;
        }

        // Identifier or keyword, possibly a literal-encoding prefix.
        if ch.is_ascii_alphabetic() || ch == '_' || ch == '$' {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_' || chars[i] == '$')
            {
                i += 1;
            }
            let name: String = chars[start..i].iter().collect();

            if i < chars.len() && (chars[i] == '"' || chars[i] == '\'') {
                if let Some(encoding) = encoding_prefix(&name) {
                    let (literal, consumed, multichar) = scan_literal(&chars[i..]);
                    let kind = if chars[i] == '"' { TokenKind::String } else { TokenKind::Char };
                    let mut tok = Token::new(literal, kind, file, line);
                    tok.encoding = encoding;
                    tok.c_multichar = multichar && kind == TokenKind::Char;
                    emit!(tok);
                    i += consumed;
                    continue;
                }
            }

            let kind = if name == "true" || name == "false" {
                TokenKind::Bool
            } else if keywords.contains(name.as_str()) {
                TokenKind::Keyword
            } else {
                TokenKind::Name
            };
            emit!(Token::new(name, kind, file, line));
            continue;
        }

        // Number. A leading '.' counts when a digit follows.
        if ch.is_ascii_digit() || (ch == '.' && i + 1 < chars.len() && chars[i + 1].is_ascii_digit())
        {
            let start = i;
            i += 1;
            while i < chars.len() {
                let c = chars[i];
                let prev = chars[i - 1];
                // In hex literals only p/P opens an exponent; e/E is a digit.
                let is_hex =
                    i - start >= 2 && chars[start] == '0' && matches!(chars[start + 1], 'x' | 'X');
                let exponent = if is_hex {
                    matches!(prev, 'p' | 'P')
                } else {
                    matches!(prev, 'e' | 'E')
                };
                let continues = c.is_ascii_alphanumeric()
                    || c == '.'
                    || c == '\''
                    || ((c == '+' || c == '-') && exponent);
                if !continues {
                    break;
                }
                i += 1;
            }
            let number: String = chars[start..i].iter().collect();
            emit!(Token::new(number, TokenKind::Number, file, line));
            continue;
        }

        // String / char literal without prefix.
        if ch == '"' || ch == '\'' {
            let (literal, consumed, multichar) = scan_literal(&chars[i..]);
            let kind = if ch == '"' { TokenKind::String } else { TokenKind::Char };
            let mut tok = Token::new(literal, kind, file, line);
            tok.c_multichar = multichar && kind == TokenKind::Char;
            emit!(tok);
            i += consumed;
            continue;
        }

        // Operators and punctuation, longest match first.
        let rest = &chars[i..];
        let matched = OPS3
            .iter()
            .chain(OPS2.iter())
            .find(|op| rest.starts_with(&op.chars().collect::<Vec<_>>()[..]));
        let text = match matched {
            Some(op) => {
                i += op.len();
                (*op).to_string()
            }
            None => {
                i += 1;
                ch.to_string()
            }
        };
        emit!(Token::new(&text, classify(&text), file, line));
    }

    toks
}

fn encoding_prefix(name: &str) -> Option<StrEncoding> {
    match name {
        "u8" => Some(StrEncoding::Utf8),
        "u" => Some(StrEncoding::Utf16),
        "U" => Some(StrEncoding::Utf32),
        "L" => Some(StrEncoding::Wide),
        _ => None,
    }
}

/// Scans a quoted literal starting at `chars[0]`. Returns the literal text
/// (quotes included), chars consumed, and whether a char literal holds more
/// than one character.
fn scan_literal(chars: &[char]) -> (String, usize, bool) {
    let quote = chars[0];
    let mut text = String::new();
    text.push(quote);
    let mut content = 0usize;
    let mut i = 1;
    while i < chars.len() {
        let c = chars[i];
        if c == '\\' && i + 1 < chars.len() {
            text.push('\\');
            text.push(chars[i + 1]);
            content += 1;
            i += 2;
            continue;
        }
        text.push(c);
        i += 1;
        if c == quote {
            return (text, i, content > 1);
        }
        if c == '\n' {
            // Unterminated literal; give back what we have.
            return (text, i, content > 1);
        }
        content += 1;
    }
    (text, i, content > 1)
}
