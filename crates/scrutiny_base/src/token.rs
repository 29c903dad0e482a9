//! The token: payload, classification, provenance, links, flags, values.
//!
//! Tokens are mutable. The preprocessor rewrites payloads, splices and
//! deletes tokens, and retargets links as a matter of course; the value-flow
//! engine attaches [`Value`]s. All structural edits go through the owning
//! [`crate::TokenList`], which preserves the doubly-linked invariant; the
//! token itself only exposes its fields and the value-list rules.
//!
//! ## Links
//!
//! `link` pairs brackets and `#if`-chain members (mutual: `link(link(t)) ==
//! t`). `ast_parent`/`ast_op1`/`ast_op2` are set by the external syntax
//! collaborator once expressions are shaped. `var_id` resolves a name to its
//! declaration; 0 means unresolved.

use crate::location::FileId;
use crate::value::{Value, ValueKind, ValuePayload};

/// Index of a token inside its owning [`crate::TokenList`] arena.
///
/// Ids are never reused within a list; a deleted token's storage is
/// tombstoned. Cloning a list preserves ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TokenId(pub u32);

impl TokenId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Closed classification set, assigned at lex time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// Identifier that is not a keyword.
    Name,
    /// Reserved word of the selected language.
    Keyword,
    Number,
    String,
    Char,
    Bool,
    /// `+ - * / %`
    ArithOp,
    /// `== != < <= > >=`
    CompOp,
    /// `&& || !`
    LogicOp,
    /// `& | ^ ~ << >>`
    BitOp,
    /// `= += -= *= /= %= &= |= ^= <<= >>=`
    AssignOp,
    /// `++ --`
    IncDecOp,
    /// `( ) [ ] { }`
    Bracket,
    /// `# ` introducing a directive, and `##` inside macro bodies.
    Hash,
    /// Everything else: `, ; : :: . -> ? ...`
    Punct,
}

/// Encoding prefix on a string or character literal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StrEncoding {
    #[default]
    Plain,
    Utf8,
    Utf16,
    Utf32,
    Wide,
}

/// Hard cap on values per token; [`Token::add_value`] refuses beyond it.
pub const MAX_VALUES_PER_TOKEN: usize = 256;

/// One token. See the module docs.
#[derive(Debug, Clone)]
pub struct Token {
    pub text: String,
    pub kind: TokenKind,
    pub file: FileId,
    pub line: u32,

    pub next: Option<TokenId>,
    pub prev: Option<TokenId>,
    /// Matching bracket / `#if`-chain sibling (mutual).
    pub link: Option<TokenId>,
    pub ast_parent: Option<TokenId>,
    pub ast_op1: Option<TokenId>,
    pub ast_op2: Option<TokenId>,
    /// Declaration id of the referenced variable (0 = none).
    pub var_id: u32,

    pub expanded_macro: bool,
    pub template_arg: bool,
    pub c_multichar: bool,
    /// Whitespace preceded this token in the source. Distinguishes
    /// `#define F(x)` (function-like) from `#define F (x)` (object-like).
    pub ws_before: bool,
    pub encoding: StrEncoding,

    pub values: Vec<Value>,
    /// Tombstone flag; set by the owning list on deletion.
    pub(crate) dead: bool,
}

impl Token {
    pub fn new(text: impl Into<String>, kind: TokenKind, file: FileId, line: u32) -> Self {
        Token {
            text: text.into(),
            kind,
            file,
            line,
            next: None,
            prev: None,
            link: None,
            ast_parent: None,
            ast_op1: None,
            ast_op2: None,
            var_id: 0,
            expanded_macro: false,
            template_arg: false,
            c_multichar: false,
            ws_before: false,
            encoding: StrEncoding::Plain,
            values: Vec::new(),
            dead: false,
        }
    }

    pub fn str(&self) -> &str {
        &self.text
    }

    pub fn is_name(&self) -> bool {
        matches!(self.kind, TokenKind::Name | TokenKind::Keyword | TokenKind::Bool)
    }

    pub fn is_number(&self) -> bool {
        self.kind == TokenKind::Number
    }

    pub fn is_string(&self) -> bool {
        self.kind == TokenKind::String
    }

    pub fn is_op(&self) -> bool {
        matches!(
            self.kind,
            TokenKind::ArithOp
                | TokenKind::CompOp
                | TokenKind::LogicOp
                | TokenKind::BitOp
                | TokenKind::AssignOp
                | TokenKind::IncDecOp
        )
    }

    pub fn is_arithmetical_op(&self) -> bool {
        self.kind == TokenKind::ArithOp
    }

    pub fn is_comparison_op(&self) -> bool {
        self.kind == TokenKind::CompOp
    }

    pub fn is_assignment_op(&self) -> bool {
        self.kind == TokenKind::AssignOp
    }

    /// True when the value-flow engine has a Known integer here.
    pub fn known_int_value(&self) -> Option<i64> {
        self.values
            .iter()
            .find(|v| v.is_known() && v.is_int())
            .and_then(|v| v.int_value())
    }

    /// Attaches a value, deduplicating and enforcing the cap.
    ///
    /// Returns `true` when the value set changed. On a duplicate (same
    /// identity per [`Value::same_value`]) the stronger certainty wins and
    /// error paths are not merged. A Known value of a variant that already
    /// has a different Known value of the same variant is demoted to
    /// Possible, keeping the one-Known-per-variant invariant.
    pub fn add_value(&mut self, value: Value) -> bool {
        let mut value = value;

        if let Some(existing) = self.values.iter_mut().find(|v| v.same_value(&value)) {
            let upgraded = match (existing.kind, value.kind) {
                (ValueKind::Possible | ValueKind::Inconclusive, ValueKind::Known) => true,
                (ValueKind::Inconclusive, ValueKind::Possible) => true,
                _ => false,
            };
            if upgraded {
                existing.kind = value.kind;
                existing.error_path = value.error_path;
                return true;
            }
            return false;
        }

        if self.values.len() >= MAX_VALUES_PER_TOKEN {
            return false;
        }

        if value.kind == ValueKind::Known
            && self
                .values
                .iter()
                .any(|v| v.is_known() && v.payload.same_variant(&value.payload))
        {
            value.kind = ValueKind::Possible;
        }

        self.values.push(value);
        true
    }

    /// Drops all attached values; run at the start of every value-flow round.
    pub fn clear_values(&mut self) {
        self.values.clear();
    }

    /// The values whose payload is the given variant.
    pub fn values_of(&self, probe: &ValuePayload) -> impl Iterator<Item = &Value> {
        let d = std::mem::discriminant(probe);
        self.values
            .iter()
            .filter(move |v| std::mem::discriminant(&v.payload) == d)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Bound;

    fn tok() -> Token {
        Token::new("x", TokenKind::Name, FileId(0), 1)
    }

    #[test]
    fn add_value_deduplicates() {
        let mut t = tok();
        assert!(t.add_value(Value::int(3)));
        assert!(!t.add_value(Value::int(3)));
        assert_eq!(t.values.len(), 1);
    }

    #[test]
    fn duplicate_with_stronger_kind_upgrades() {
        let mut t = tok();
        t.add_value(Value::int(3));
        assert!(t.add_value(Value::known_int(3)));
        assert_eq!(t.values.len(), 1);
        assert!(t.values[0].is_known());
    }

    #[test]
    fn second_known_of_same_variant_is_demoted() {
        let mut t = tok();
        t.add_value(Value::known_int(3));
        t.add_value(Value::known_int(5));
        let known: Vec<_> = t.values.iter().filter(|v| v.is_known()).collect();
        assert_eq!(known.len(), 1);
        assert_eq!(known[0].int_value(), Some(3));
        assert_eq!(t.values.len(), 2);
    }

    #[test]
    fn impossible_values_are_kept_separately() {
        let mut t = tok();
        t.add_value(Value::int(3));
        assert!(t.add_value(Value::impossible_int(3, Bound::Point)));
        assert_eq!(t.values.len(), 2);
    }

    #[test]
    fn cap_is_enforced() {
        let mut t = tok();
        for i in 0..(MAX_VALUES_PER_TOKEN as i64 + 10) {
            t.add_value(Value::int(i));
        }
        assert_eq!(t.values.len(), MAX_VALUES_PER_TOKEN);
    }

    #[test]
    fn known_int_value_finds_known_only() {
        let mut t = tok();
        t.add_value(Value::int(1));
        assert_eq!(t.known_int_value(), None);
        t.add_value(Value::known_int(2));
        assert_eq!(t.known_int_value(), Some(2));
    }
}
