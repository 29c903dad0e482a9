//! File/line provenance that survives token surgery.
//!
//! The preprocessor splices, deletes and rewrites tokens aggressively, so a
//! byte-offset span into the original text would dangle almost immediately.
//! Instead every token carries a [`FileId`] plus a line number, and the
//! owning list keeps a [`FileTable`] mapping ids back to paths. `file(tok)`
//! and `linenr(tok)` therefore reconstruct source locations no matter how
//! the token graph has been edited — including for tokens spliced in from
//! `#include`d headers, which get their own [`FileId`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Index into a [`FileTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct FileId(pub u32);

impl FileId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A (file, line) pair as reported in diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLocation {
    pub file: String,
    pub line: u32,
}

impl SourceLocation {
    pub fn new(file: impl Into<String>, line: u32) -> Self {
        Self {
            file: file.into(),
            line,
        }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}:{}]", self.file, self.line)
    }
}

/// File-id to path mapping owned by a token list.
///
/// Index 0 is the translation unit itself; headers pulled in by `#include`
/// are appended as they are resolved. Paths are stored with forward-slash
/// separators so configuration output is identical across platforms.
#[derive(Debug, Clone, Default)]
pub struct FileTable {
    paths: Vec<PathBuf>,
}

impl FileTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a path and returns its id. An already-registered path gets
    /// its existing id back.
    pub fn insert(&mut self, path: impl AsRef<Path>) -> FileId {
        let normalized = normalize_separators(path.as_ref());
        if let Some(pos) = self.paths.iter().position(|p| *p == normalized) {
            return FileId(pos as u32);
        }
        self.paths.push(normalized);
        FileId((self.paths.len() - 1) as u32)
    }

    /// Path for the given id, lossily rendered.
    pub fn path(&self, id: FileId) -> String {
        self.paths
            .get(id.index())
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// The translation unit's own path (the first registered file).
    pub fn primary(&self) -> Option<String> {
        self.paths.first().map(|p| p.to_string_lossy().into_owned())
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

fn normalize_separators(path: &Path) -> PathBuf {
    let s = path.to_string_lossy();
    if s.contains('\\') {
        PathBuf::from(s.replace('\\', "/"))
    } else {
        path.to_path_buf()
    }
}
