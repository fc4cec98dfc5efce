//! Graph schema: nodes, edges and stable identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ingest::{SourceRange, SymbolKind};

/// Name hashed in place of a symbol name for module nodes.
pub const MODULE_MARKER: &str = "<module>";

const ID_HEX_LEN: usize = 32;

/// Stable id for a class or function.
///
/// 32 hex characters of BLAKE3 over `(file label, class, name, start line)`.
/// Re-parsing an unchanged file gives identical ids; moving a declaration to
/// another line changes its id.
pub fn symbol_id(file: &str, class_name: Option<&str>, name: &str, start_line: usize) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(file.as_bytes());
    hasher.update(b"\0");
    hasher.update(class_name.unwrap_or("").as_bytes());
    hasher.update(b"\0");
    hasher.update(name.as_bytes());
    hasher.update(b"\0");
    hasher.update(start_line.to_string().as_bytes());
    hasher.finalize().to_hex()[..ID_HEX_LEN].to_string()
}

/// Stable id for a file's module node.
pub fn module_id(file: &str) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(file.as_bytes());
    hasher.update(b"\0");
    hasher.update(MODULE_MARKER.as_bytes());
    hasher.finalize().to_hex()[..ID_HEX_LEN].to_string()
}

/// One module, class or function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    pub kind: SymbolKind,
    /// Display label: the file label for modules, `Class.method` style
    /// qualified names otherwise
    pub label: String,
    /// Bare symbol name (file stem for modules)
    pub name: String,
    pub class_name: Option<String>,
    /// Repository-relative label of the owning file
    pub file: String,
    /// Absent for modules
    pub range: Option<SourceRange>,
    /// Enclosing class, or the module for top-level symbols
    pub parent: Option<String>,
    #[serde(default)]
    pub snippet: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeKind {
    Import,
    Call,
}

impl EdgeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeKind::Import => "import",
            EdgeKind::Call => "call",
        }
    }
}

impl fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Provenance of an edge. `Semantic` outranks `Syntax` on merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    Syntax,
    Semantic,
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Origin::Syntax => "syntax",
            Origin::Semantic => "semantic",
        })
    }
}

/// Deduplication key: one edge per `(kind, from, to)`.
pub type EdgeKey = (EdgeKind, String, String);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub kind: EdgeKind,
    pub from: String,
    pub to: String,
    pub origin: Origin,
    /// Number of sites collapsed into this edge
    pub weight: u32,
}

impl Edge {
    pub fn new(kind: EdgeKind, from: impl Into<String>, to: impl Into<String>, origin: Origin) -> Self {
        Self {
            kind,
            from: from.into(),
            to: to.into(),
            origin,
            weight: 1,
        }
    }

    pub fn import(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self::new(EdgeKind::Import, from, to, Origin::Syntax)
    }

    pub fn call(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self::new(EdgeKind::Call, from, to, Origin::Semantic)
    }

    pub fn key(&self) -> EdgeKey {
        (self.kind, self.from.clone(), self.to.clone())
    }
}
