//! Diagnostic suppression: the predicate consulted before every report.
//!
//! Two sources feed the list: `id[:file[:line]]` patterns from settings,
//! and inline `scrutiny-suppress <id>` comments harvested by the
//! normalizer (which carry an exact file and line). `*` matches any id or
//! file; a missing file or line matches everywhere.

use scrutiny_preprocessor::normalize::InlineSuppression;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Entry {
    id: String,
    file: Option<String>,
    line: Option<u32>,
}

/// The suppression list. See the module docs.
#[derive(Debug, Default)]
pub struct Suppressions {
    entries: Vec<Entry>,
}

impl Suppressions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses an `id[:file[:line]]` pattern from settings.
    pub fn add_pattern(&mut self, pattern: &str) -> Result<(), String> {
        let mut parts = pattern.splitn(3, ':');
        let id = parts
            .next()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| format!("empty suppression pattern: '{}'", pattern))?;
        let file = parts.next().map(str::to_string);
        let line = match parts.next() {
            Some(l) => Some(
                l.parse::<u32>()
                    .map_err(|_| format!("bad line number in suppression: '{}'", pattern))?,
            ),
            None => None,
        };
        self.entries.push(Entry {
            id: id.to_string(),
            file,
            line,
        });
        Ok(())
    }

    /// Adopts the inline suppressions harvested from one file.
    pub fn add_inline(&mut self, inline: &[InlineSuppression]) {
        for s in inline {
            self.entries.push(Entry {
                id: s.id.clone(),
                file: Some(s.file.clone()),
                line: Some(s.line),
            });
        }
    }

    /// The predicate: is this (id, file, line) suppressed?
    pub fn is_suppressed(&self, id: &str, file: &str, line: u32) -> bool {
        self.entries.iter().any(|e| {
            (e.id == "*" || e.id == id)
                && e.file.as_deref().map(|f| f == "*" || f == file).unwrap_or(true)
                && e.line.map(|l| l == line).unwrap_or(true)
        })
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_only_pattern_matches_everywhere() {
        let mut s = Suppressions::new();
        s.add_pattern("nullPointer").unwrap();
        assert!(s.is_suppressed("nullPointer", "a.c", 1));
        assert!(s.is_suppressed("nullPointer", "b.c", 99));
        assert!(!s.is_suppressed("memleak", "a.c", 1));
    }

    #[test]
    fn file_and_line_narrow_the_match() {
        let mut s = Suppressions::new();
        s.add_pattern("id:src/a.c:10").unwrap();
        assert!(s.is_suppressed("id", "src/a.c", 10));
        assert!(!s.is_suppressed("id", "src/a.c", 11));
        assert!(!s.is_suppressed("id", "src/b.c", 10));
    }

    #[test]
    fn wildcards() {
        let mut s = Suppressions::new();
        s.add_pattern("*:generated.c").unwrap();
        assert!(s.is_suppressed("anything", "generated.c", 5));
        assert!(!s.is_suppressed("anything", "other.c", 5));
    }

    #[test]
    fn inline_suppressions_carry_exact_location() {
        let mut s = Suppressions::new();
        s.add_inline(&[InlineSuppression {
            id: "zerodiv".to_string(),
            file: "t.c".to_string(),
            line: 7,
        }]);
        assert!(s.is_suppressed("zerodiv", "t.c", 7));
        assert!(!s.is_suppressed("zerodiv", "t.c", 8));
    }

    #[test]
    fn malformed_patterns_are_rejected() {
        let mut s = Suppressions::new();
        assert!(s.add_pattern("id:file:notanumber").is_err());
        assert!(s.add_pattern("").is_err());
    }
}
