pub mod detect;
pub mod extract;
pub mod imports;
pub mod pool;
pub mod rules;

// Re-exports from detect module
pub use detect::{detect_language, Language};

use serde::{Deserialize, Serialize};

/// Kind of a graph symbol.
///
/// Language-agnostic: structs, enums, traits and interfaces are all `Class`;
/// free functions, methods and constructors are all `Function`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum SymbolKind {
    /// One per source file
    Module,
    /// Class or struct-like type definition
    Class,
    /// Function or method
    Function,
}

impl SymbolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SymbolKind::Module => "module",
            SymbolKind::Class => "class",
            SymbolKind::Function => "function",
        }
    }
}

/// Separator character for nested class names per language
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeSeparator {
    /// Rust, C, C++ use :: separator
    DoubleColon,
    /// Python, Java, JavaScript, TypeScript use . separator
    Dot,
}

impl ScopeSeparator {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScopeSeparator::DoubleColon => "::",
            ScopeSeparator::Dot => ".",
        }
    }
}

/// Stack of enclosing class names during tree-sitter traversal
///
/// # Example
/// ```rust
/// use codegraph_core::ingest::{ScopeSeparator, ScopeStack};
///
/// let mut stack = ScopeStack::new(ScopeSeparator::Dot);
/// assert_eq!(stack.current(), None);
/// stack.push("Outer");
/// stack.push("Inner");
/// assert_eq!(stack.current().as_deref(), Some("Outer.Inner"));
/// ```
#[derive(Debug, Clone)]
pub struct ScopeStack {
    scopes: Vec<String>,
    separator: ScopeSeparator,
}

impl ScopeStack {
    pub fn new(separator: ScopeSeparator) -> Self {
        Self {
            scopes: Vec::new(),
            separator,
        }
    }

    pub fn push(&mut self, scope: impl Into<String>) {
        self.scopes.push(scope.into());
    }

    pub fn pop(&mut self) -> Option<String> {
        self.scopes.pop()
    }

    /// Joined class path, or None at top level.
    pub fn current(&self) -> Option<String> {
        if self.scopes.is_empty() {
            None
        } else {
            Some(self.scopes.join(self.separator.as_str()))
        }
    }

    pub fn depth(&self) -> usize {
        self.scopes.len()
    }
}

/// Declaration span.
///
/// Lines are 1-indexed, columns are 0-indexed byte offsets. The end position
/// is exclusive, as reported by tree-sitter.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceRange {
    pub start_line: usize,
    pub start_col: usize,
    pub end_line: usize,
    pub end_col: usize,
}

impl SourceRange {
    pub fn new(start_line: usize, start_col: usize, end_line: usize, end_col: usize) -> Self {
        Self {
            start_line,
            start_col,
            end_line,
            end_col,
        }
    }

    pub fn from_node(node: &tree_sitter::Node) -> Self {
        let start = node.start_position();
        let end = node.end_position();
        Self::new(start.row + 1, start.column, end.row + 1, end.column)
    }

    pub fn start(&self) -> (usize, usize) {
        (self.start_line, self.start_col)
    }

    pub fn end(&self) -> (usize, usize) {
        (self.end_line, self.end_col)
    }

    /// True when `(line, col)` lies in `[start, end)`.
    pub fn contains(&self, line: usize, col: usize) -> bool {
        let pos = (line, col);
        self.start() <= pos && pos < self.end()
    }
}

/// A class or function declaration found in one file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Declaration {
    pub kind: SymbolKind,
    pub name: String,
    /// Enclosing class path for methods and nested classes
    pub class_name: Option<String>,
    pub range: SourceRange,
    #[serde(default)]
    pub snippet: String,
}

/// An import statement, left unresolved.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImportSpec {
    /// Raw module specifier (`pkg.mod`, `./util`, `crate::a::b`, `"x.h"`)
    pub specifier: String,
    /// Names imported from the specifier, when the syntax lists them
    #[serde(default)]
    pub names: Vec<String>,
    /// Line of the statement (1-indexed)
    pub line: usize,
}

/// Position of a call expression's callee token.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct CallSite {
    /// 1-indexed
    pub line: usize,
    /// 0-indexed byte column
    pub column: usize,
    /// Callee text
    pub name: String,
}

/// Everything the syntax backend reports for one file.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Extraction {
    pub declarations: Vec<Declaration>,
    pub imports: Vec<ImportSpec>,
    pub call_sites: Vec<CallSite>,
}

/// Syntax backend entry point.
///
/// Stateless: parsers come from the thread-local pool in [`pool`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SyntaxExtractor;

impl SyntaxExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Extract declarations, imports and call sites from `text`.
    ///
    /// A parse failure yields an empty extraction.
    pub fn extract(&self, text: &str, language: Language) -> Extraction {
        extract::extract(text, rules::rules_for(language))
    }

    /// Call sites only. Used by the call-graph pass.
    pub fn call_sites(&self, text: &str, language: Language) -> Vec<CallSite> {
        self.extract(text, language).call_sites
    }
}
