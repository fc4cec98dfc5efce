//! In-memory dependency and call graph.
//!
//! The [`Graph`] is created per repository scan, filled by the node/import
//! pass, then extended by call-graph passes through [`Graph::merge_edges`].
//! Nodes and edges are never deleted individually; a rescan builds a new
//! graph with a higher generation.

pub mod algorithms;
pub mod calls;
pub mod filter;
pub mod module_resolver;
pub mod ops;
pub mod range_index;
pub mod scan;
pub mod schema;
pub mod symbol_index;

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::ingest::{Language, SymbolKind};

pub use algorithms::{Analyzer, Direction, FindOutcome, SliceOptions, Subgraph};
pub use calls::{CallBudget, CallGraphBuilder, CallGraphOutcome};
pub use filter::FileFilter;
pub use module_resolver::KnownFiles;
pub use ops::{FileParser, OutlineSource, ParsedFile};
pub use range_index::RangeIndex;
pub use scan::{scan_repository, ScanResult};
pub use schema::{module_id, symbol_id, Edge, EdgeKey, EdgeKind, Node, Origin};
pub use symbol_index::{FileTask, SymbolIndex};

/// A scanned source file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub label: String,
    pub path: PathBuf,
    pub language: Language,
    pub module_id: String,
}

/// Neighbor entry in an adjacency list.
pub type Adjacent = (EdgeKind, String);

#[derive(Debug, Clone, Default)]
pub struct Graph {
    generation: u64,
    nodes: BTreeMap<String, Node>,
    edges: BTreeMap<EdgeKey, Edge>,
    outgoing: HashMap<String, Vec<Adjacent>>,
    incoming: HashMap<String, Vec<Adjacent>>,
    files: BTreeMap<String, FileRecord>,
    ranges: HashMap<String, RangeIndex>,
}

impl Graph {
    pub fn new(generation: u64) -> Self {
        Self {
            generation,
            ..Self::default()
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn add_file(&mut self, record: FileRecord) {
        self.files.insert(record.label.clone(), record);
    }

    pub fn file(&self, label: &str) -> Option<&FileRecord> {
        self.files.get(label)
    }

    /// Files in label order.
    pub fn files(&self) -> impl Iterator<Item = &FileRecord> {
        self.files.values()
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    /// Insert or replace a node.
    pub fn add_node(&mut self, node: Node) {
        self.nodes.insert(node.id.clone(), node);
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn contains_node(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    /// Nodes in id order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Add an edge, collapsing duplicates.
    ///
    /// A repeated `(kind, from, to)` adds its weight to the existing edge and
    /// keeps the stronger origin. Edges touching unknown nodes are refused.
    /// Returns true when the edge is new.
    pub fn add_edge(&mut self, edge: Edge) -> bool {
        if !self.nodes.contains_key(&edge.from) || !self.nodes.contains_key(&edge.to) {
            return false;
        }
        let key = edge.key();
        if let Some(existing) = self.edges.get_mut(&key) {
            existing.weight = existing.weight.saturating_add(edge.weight);
            existing.origin = existing.origin.max(edge.origin);
            return false;
        }
        self.outgoing
            .entry(edge.from.clone())
            .or_default()
            .push((edge.kind, edge.to.clone()));
        self.incoming
            .entry(edge.to.clone())
            .or_default()
            .push((edge.kind, edge.from.clone()));
        self.edges.insert(key, edge);
        true
    }

    /// Merge a batch of edges. Returns how many were new.
    pub fn merge_edges(&mut self, edges: impl IntoIterator<Item = Edge>) -> usize {
        edges.into_iter().filter(|e| self.add_edge(e.clone())).count()
    }

    /// Merge the edges of a call-graph pass.
    ///
    /// Passes recount the same sites, so an edge already present keeps the
    /// larger weight instead of summing. Returns how many edges were new.
    pub fn merge_pass(&mut self, edges: impl IntoIterator<Item = Edge>) -> usize {
        let mut added = 0;
        for edge in edges {
            match self.edges.get_mut(&edge.key()) {
                Some(existing) => {
                    existing.weight = existing.weight.max(edge.weight);
                    existing.origin = existing.origin.max(edge.origin);
                }
                None => {
                    if self.add_edge(edge) {
                        added += 1;
                    }
                }
            }
        }
        added
    }

    pub fn edge(&self, kind: EdgeKind, from: &str, to: &str) -> Option<&Edge> {
        self.edges
            .get(&(kind, from.to_string(), to.to_string()))
    }

    /// Edges in `(kind, from, to)` order.
    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges.values()
    }

    pub fn edges_of_kind(&self, kind: EdgeKind) -> impl Iterator<Item = &Edge> {
        self.edges.values().filter(move |e| e.kind == kind)
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn edge_count_of(&self, kind: EdgeKind) -> usize {
        self.edges_of_kind(kind).count()
    }

    pub fn outgoing(&self, id: &str) -> &[Adjacent] {
        self.outgoing.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn incoming(&self, id: &str) -> &[Adjacent] {
        self.incoming.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Total number of edges touching `id`.
    pub fn degree(&self, id: &str) -> usize {
        self.outgoing(id).len() + self.incoming(id).len()
    }

    /// Parent chain of `id`, nearest first (function -> class -> module).
    pub fn ancestors(&self, id: &str) -> Vec<String> {
        let mut out = Vec::new();
        let mut current = self.nodes.get(id).and_then(|n| n.parent.clone());
        while let Some(parent) = current {
            if out.contains(&parent) {
                break;
            }
            current = self.nodes.get(&parent).and_then(|n| n.parent.clone());
            out.push(parent);
        }
        out
    }

    pub fn set_range_index(&mut self, file: &str, index: RangeIndex) {
        self.ranges.insert(file.to_string(), index);
    }

    pub fn range_index(&self, file: &str) -> Option<&RangeIndex> {
        self.ranges.get(file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str, kind: SymbolKind, parent: Option<&str>) -> Node {
        Node {
            id: id.to_string(),
            kind,
            label: id.to_string(),
            name: id.to_string(),
            class_name: None,
            file: "a.py".to_string(),
            range: None,
            parent: parent.map(str::to_string),
            snippet: String::new(),
        }
    }

    fn sample() -> Graph {
        let mut graph = Graph::new(1);
        graph.add_node(node("mod", SymbolKind::Module, None));
        graph.add_node(node("K", SymbolKind::Class, Some("mod")));
        graph.add_node(node("K.m", SymbolKind::Function, Some("K")));
        graph.add_node(node("f", SymbolKind::Function, Some("mod")));
        graph
    }

    #[test]
    fn test_duplicate_edges_collapse() {
        let mut graph = sample();
        assert!(graph.add_edge(Edge::call("f", "K.m")));
        assert!(!graph.add_edge(Edge::call("f", "K.m")));
        assert_eq!(graph.edge_count(), 1);
        assert_eq!(graph.edge(EdgeKind::Call, "f", "K.m").map(|e| e.weight), Some(2));
        assert_eq!(graph.outgoing("f").len(), 1);
        assert_eq!(graph.incoming("K.m").len(), 1);
    }

    #[test]
    fn test_pass_merge_keeps_max_weight() {
        let mut graph = sample();
        let mut first = Edge::call("f", "K.m");
        first.weight = 2;
        assert_eq!(graph.merge_pass(vec![first.clone()]), 1);
        assert_eq!(graph.merge_pass(vec![first, Edge::call("f", "ghost")]), 0);
        assert_eq!(graph.edge(EdgeKind::Call, "f", "K.m").map(|e| e.weight), Some(2));
        assert_eq!(graph.edge_count(), 1);
    }

    #[test]
    fn test_semantic_origin_upgrades_syntax() {
        let mut graph = sample();
        graph.add_edge(Edge::new(EdgeKind::Call, "f", "K.m", Origin::Syntax));
        graph.add_edge(Edge::call("f", "K.m"));
        assert_eq!(
            graph.edge(EdgeKind::Call, "f", "K.m").map(|e| e.origin),
            Some(Origin::Semantic)
        );
    }

    #[test]
    fn test_edges_to_unknown_nodes_refused() {
        let mut graph = sample();
        assert!(!graph.add_edge(Edge::call("f", "ghost")));
        assert_eq!(graph.edge_count(), 0);
        assert!(graph.outgoing("f").is_empty());
    }

    #[test]
    fn test_same_pair_different_kinds_are_distinct() {
        let mut graph = sample();
        graph.add_edge(Edge::import("mod", "f"));
        graph.add_edge(Edge::call("mod", "f"));
        assert_eq!(graph.edge_count(), 2);
        assert_eq!(graph.edge_count_of(EdgeKind::Import), 1);
        assert_eq!(graph.degree("f"), 2);
    }

    #[test]
    fn test_ancestor_chain() {
        let graph = sample();
        assert_eq!(graph.ancestors("K.m"), vec!["K".to_string(), "mod".to_string()]);
        assert!(graph.ancestors("mod").is_empty());
    }
}
