//! Read-only lookup tables the call-graph builder works from.
//!
//! Built from a [`Graph`] snapshot so a pass never holds the graph lock
//! while it waits on a language server.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use super::range_index::RangeIndex;
use super::Graph;
use crate::ingest::{Language, SymbolKind};

/// One file handed to a call-graph pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileTask {
    pub path: PathBuf,
    pub label: String,
    pub language: Language,
}

#[derive(Debug, Clone, Default)]
pub struct SymbolIndex {
    tasks: Vec<FileTask>,
    labels: HashMap<PathBuf, String>,
    ranges: HashMap<String, RangeIndex>,
    kinds: HashMap<String, SymbolKind>,
}

impl SymbolIndex {
    pub fn from_graph(graph: &Graph) -> Self {
        let mut index = Self::default();
        for file in graph.files() {
            index.tasks.push(FileTask {
                path: file.path.clone(),
                label: file.label.clone(),
                language: file.language,
            });
            index.labels.insert(file.path.clone(), file.label.clone());
            if let Some(ranges) = graph.range_index(&file.label) {
                index.ranges.insert(file.label.clone(), ranges.clone());
            }
        }
        for node in graph.nodes() {
            index.kinds.insert(node.id.clone(), node.kind);
        }
        index
    }

    /// Files in label order.
    pub fn tasks(&self) -> &[FileTask] {
        &self.tasks
    }

    /// Label of a scanned file.
    ///
    /// Servers may answer with a non-canonical spelling of a path (symlinked
    /// temp dirs, `..` segments), so misses retry with the canonical form.
    pub fn label_for_path(&self, path: &Path) -> Option<&str> {
        if let Some(label) = self.labels.get(path) {
            return Some(label);
        }
        let canonical = std::fs::canonicalize(path).ok()?;
        self.labels.get(&canonical).map(String::as_str)
    }

    /// Innermost declaration of `label` enclosing the position.
    pub fn enclosing(&self, label: &str, line: usize, column: usize) -> Option<&str> {
        self.ranges.get(label)?.enclosing(line, column)
    }

    pub fn kind(&self, id: &str) -> Option<SymbolKind> {
        self.kinds.get(id).copied()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}
