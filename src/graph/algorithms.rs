//! Read-only traversals over a [`Graph`].
//!
//! # Operations
//!
//! - [`Analyzer::slice`]: everything reachable from a node along the chosen
//!   edge kinds and direction, plus the containment chain (function ->
//!   class -> module) of every node reached
//! - [`Analyzer::neighborhood`]: bounded breadth-first subgraph, capped at
//!   `max_nodes` so any answer stays renderable
//! - [`Analyzer::find_target`]: resolve a user-supplied name or id
//!
//! # Target ranking
//!
//! `find_target` tries an exact id, then exact label or name matches, then
//! case-insensitive substring matches. Within a tier candidates are ranked
//! by kind (function and class before module), total degree (higher
//! first), presence of a declaration range, then id. A miss returns the
//! closest labels by edit distance instead of an error.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet, VecDeque};

use super::schema::{Edge, EdgeKind, Node};
use super::Graph;
use crate::ingest::SymbolKind;

const SUGGESTION_LIMIT: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Follow edges backwards: who imports or calls this
    In,
    /// Follow edges forwards: what this imports or calls
    Out,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SliceOptions {
    pub direction: Direction,
    pub include_imports: bool,
    pub include_calls: bool,
}

impl SliceOptions {
    pub fn new(direction: Direction) -> Self {
        Self {
            direction,
            include_imports: true,
            include_calls: true,
        }
    }

    fn follows(&self, kind: EdgeKind) -> bool {
        match kind {
            EdgeKind::Import => self.include_imports,
            EdgeKind::Call => self.include_calls,
        }
    }
}

/// Nodes plus every edge between them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subgraph {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    /// True when a node cap cut the traversal short
    pub truncated: bool,
}

impl Subgraph {
    pub fn ids(&self) -> BTreeSet<String> {
        self.nodes.iter().map(|n| n.id.clone()).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum FindOutcome {
    Found(Node),
    NotFound {
        query: String,
        suggestions: Vec<String>,
    },
}

impl FindOutcome {
    pub fn node(&self) -> Option<&Node> {
        match self {
            FindOutcome::Found(node) => Some(node),
            FindOutcome::NotFound { .. } => None,
        }
    }
}

pub struct Analyzer<'g> {
    graph: &'g Graph,
}

impl<'g> Analyzer<'g> {
    pub fn new(graph: &'g Graph) -> Self {
        Self { graph }
    }

    /// Ids reachable from `start`, with the ancestor chain of each.
    ///
    /// Unknown ids give an empty set.
    pub fn slice(&self, start: &str, options: SliceOptions) -> BTreeSet<String> {
        if !self.graph.contains_node(start) {
            return BTreeSet::new();
        }
        let mut reached: HashSet<String> = HashSet::from([start.to_string()]);
        let mut queue = VecDeque::from([start.to_string()]);
        while let Some(current) = queue.pop_front() {
            let adjacent = match options.direction {
                Direction::Out => self.graph.outgoing(&current),
                Direction::In => self.graph.incoming(&current),
            };
            for (kind, next) in adjacent {
                if options.follows(*kind) && reached.insert(next.clone()) {
                    queue.push_back(next.clone());
                }
            }
        }

        let mut out: BTreeSet<String> = BTreeSet::new();
        for id in reached {
            out.extend(self.graph.ancestors(&id));
            out.insert(id);
        }
        out
    }

    /// [`Analyzer::slice`] as a subgraph.
    pub fn slice_subgraph(&self, start: &str, options: SliceOptions) -> Subgraph {
        let ids = self.slice(start, options);
        self.subgraph(&ids, false)
    }

    /// Nodes within `hops` edges of `id` in either direction, at most
    /// `max_nodes` of them (never fewer than one).
    pub fn neighborhood(&self, id: &str, hops: usize, max_nodes: usize) -> Subgraph {
        if !self.graph.contains_node(id) {
            return Subgraph::default();
        }
        let cap = max_nodes.max(1);
        let mut seen: BTreeSet<String> = BTreeSet::from([id.to_string()]);
        let mut frontier = vec![id.to_string()];
        let mut truncated = false;

        'outer: for _ in 0..hops {
            let mut next_frontier = Vec::new();
            for current in &frontier {
                let mut adjacent: Vec<&String> = self
                    .graph
                    .outgoing(current)
                    .iter()
                    .chain(self.graph.incoming(current))
                    .map(|(_, other)| other)
                    .collect();
                adjacent.sort();
                for other in adjacent {
                    if seen.contains(other) {
                        continue;
                    }
                    if seen.len() >= cap {
                        truncated = true;
                        break 'outer;
                    }
                    seen.insert(other.clone());
                    next_frontier.push(other.clone());
                }
            }
            if next_frontier.is_empty() {
                break;
            }
            frontier = next_frontier;
        }
        self.subgraph(&seen, truncated)
    }

    fn subgraph(&self, ids: &BTreeSet<String>, truncated: bool) -> Subgraph {
        let nodes: Vec<Node> = ids
            .iter()
            .filter_map(|id| self.graph.node(id).cloned())
            .collect();
        let edges: Vec<Edge> = self
            .graph
            .edges()
            .filter(|e| ids.contains(&e.from) && ids.contains(&e.to))
            .cloned()
            .collect();
        Subgraph {
            nodes,
            edges,
            truncated,
        }
    }

    /// Resolve `query` (an id, label, name, or fragment of one) to a node.
    pub fn find_target(&self, query: &str) -> FindOutcome {
        let query = query.trim();
        if let Some(node) = self.graph.node(query) {
            return FindOutcome::Found(node.clone());
        }

        let exact: Vec<&Node> = self
            .graph
            .nodes()
            .filter(|n| n.label == query || n.name == query)
            .collect();
        if let Some(best) = self.best(exact) {
            return FindOutcome::Found(best.clone());
        }

        let needle = query.to_lowercase();
        if !needle.is_empty() {
            let partial: Vec<&Node> = self
                .graph
                .nodes()
                .filter(|n| {
                    n.label.to_lowercase().contains(&needle) || n.name.to_lowercase().contains(&needle)
                })
                .collect();
            if let Some(best) = self.best(partial) {
                return FindOutcome::Found(best.clone());
            }
        }

        FindOutcome::NotFound {
            query: query.to_string(),
            suggestions: self.suggestions(query),
        }
    }

    fn best<'a>(&self, candidates: Vec<&'a Node>) -> Option<&'a Node> {
        candidates.into_iter().min_by(|a, b| {
            let key = |n: &Node| {
                (
                    n.kind == SymbolKind::Module,
                    std::cmp::Reverse(self.graph.degree(&n.id)),
                    n.range.is_none(),
                )
            };
            key(a).cmp(&key(b)).then_with(|| a.id.cmp(&b.id))
        })
    }

    /// Closest labels to `query` by edit distance.
    pub fn suggestions(&self, query: &str) -> Vec<String> {
        let needle = query.to_lowercase();
        let mut scored: Vec<(usize, &str)> = self
            .graph
            .nodes()
            .map(|n| {
                let by_label = levenshtein_distance(&needle, &n.label.to_lowercase());
                let by_name = levenshtein_distance(&needle, &n.name.to_lowercase());
                (by_label.min(by_name), n.label.as_str())
            })
            .collect();
        scored.sort();
        scored.dedup_by(|a, b| a.1 == b.1);
        scored
            .into_iter()
            .take(SUGGESTION_LIMIT)
            .map(|(_, label)| label.to_string())
            .collect()
    }
}

/// Minimum number of single-character insertions, deletions and
/// substitutions turning `a` into `b`.
pub fn levenshtein_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];
    for i in 1..=a.len() {
        curr[0] = i;
        for j in 1..=b.len() {
            let cost = usize::from(a[i - 1] != b[j - 1]);
            curr[j] = (prev[j] + 1).min(curr[j - 1] + 1).min(prev[j - 1] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::SourceRange;

    fn node(id: &str, kind: SymbolKind, label: &str, parent: Option<&str>) -> Node {
        Node {
            id: id.to_string(),
            kind,
            label: label.to_string(),
            name: label.rsplit('.').next().unwrap_or(label).to_string(),
            class_name: None,
            file: "x.py".to_string(),
            range: match kind {
                SymbolKind::Module => None,
                _ => Some(SourceRange::new(1, 0, 2, 0)),
            },
            parent: parent.map(str::to_string),
            snippet: String::new(),
        }
    }

    /// a.py: f -> b.py: Store.save -> b.py: g; a imports b; c.py isolated
    fn sample() -> Graph {
        let mut graph = Graph::new(1);
        graph.add_node(node("ma", SymbolKind::Module, "a.py", None));
        graph.add_node(node("mb", SymbolKind::Module, "b.py", None));
        graph.add_node(node("mc", SymbolKind::Module, "saver.py", None));
        graph.add_node(node("f", SymbolKind::Function, "f", Some("ma")));
        graph.add_node(node("K", SymbolKind::Class, "Store", Some("mb")));
        graph.add_node(node("save", SymbolKind::Function, "Store.save", Some("K")));
        graph.add_node(node("g", SymbolKind::Function, "g", Some("mb")));
        graph.add_edge(Edge::import("ma", "mb"));
        graph.add_edge(Edge::call("f", "save"));
        graph.add_edge(Edge::call("save", "g"));
        graph
    }

    #[test]
    fn test_slice_out_includes_ancestors() {
        let graph = sample();
        let analyzer = Analyzer::new(&graph);
        let mut options = SliceOptions::new(Direction::Out);
        options.include_imports = false;

        let ids = analyzer.slice("f", options);
        let expected: BTreeSet<String> = ["f", "ma", "save", "K", "mb", "g"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(ids, expected);
    }

    #[test]
    fn test_slice_in_and_edge_filters() {
        let graph = sample();
        let analyzer = Analyzer::new(&graph);

        let callers = analyzer.slice("g", SliceOptions::new(Direction::In));
        assert!(callers.contains("f"));
        assert!(callers.contains("K"));

        let options = SliceOptions {
            direction: Direction::Out,
            include_imports: true,
            include_calls: false,
        };
        let imports = analyzer.slice("ma", options);
        assert_eq!(imports.len(), 2);
        assert!(analyzer.slice("ghost", options).is_empty());
    }

    #[test]
    fn test_neighborhood_zero_hops_is_just_the_node() {
        let graph = sample();
        let analyzer = Analyzer::new(&graph);
        for cap in [1, 2, 100] {
            let sub = analyzer.neighborhood("save", 0, cap);
            assert_eq!(sub.ids(), BTreeSet::from(["save".to_string()]));
            assert!(sub.edges.is_empty());
        }
    }

    #[test]
    fn test_neighborhood_hops_and_cap() {
        let graph = sample();
        let analyzer = Analyzer::new(&graph);

        let one = analyzer.neighborhood("save", 1, 10);
        assert_eq!(
            one.ids(),
            BTreeSet::from(["f".to_string(), "g".to_string(), "save".to_string()])
        );
        assert_eq!(one.edges.len(), 2);
        assert!(!one.truncated);

        let capped = analyzer.neighborhood("save", 3, 2);
        assert_eq!(capped.nodes.len(), 2);
        assert!(capped.truncated);
    }

    #[test]
    fn test_find_target_prefers_function_over_module() {
        let graph = sample();
        let analyzer = Analyzer::new(&graph);
        let found = analyzer.find_target("save");
        assert_eq!(found.node().map(|n| n.id.as_str()), Some("save"));

        // Substring tier: "sav" matches the module and the method
        let partial = analyzer.find_target("sav");
        assert_eq!(partial.node().map(|n| n.kind), Some(SymbolKind::Function));
    }

    #[test]
    fn test_find_target_by_id_label_and_degree() {
        let mut graph = sample();
        graph.add_node(node("g2", SymbolKind::Function, "g", Some("mc")));
        let analyzer = Analyzer::new(&graph);

        assert_eq!(analyzer.find_target("K").node().map(|n| n.label.as_str()), Some("Store"));
        assert_eq!(
            analyzer.find_target("Store.save").node().map(|n| n.id.as_str()),
            Some("save")
        );
        // Two functions named g: the one with edges wins
        assert_eq!(analyzer.find_target("g").node().map(|n| n.id.as_str()), Some("g"));
    }

    #[test]
    fn test_find_target_miss_suggests_labels() {
        let graph = sample();
        let analyzer = Analyzer::new(&graph);
        match analyzer.find_target("Stor.sav") {
            FindOutcome::NotFound { suggestions, .. } => {
                assert!(!suggestions.is_empty());
                assert!(suggestions.len() <= SUGGESTION_LIMIT);
                assert_eq!(suggestions[0], "Store.save");
            }
            other => panic!("expected a miss, got {:?}", other),
        }
    }

    #[test]
    fn test_levenshtein() {
        assert_eq!(levenshtein_distance("kitten", "sitting"), 3);
        assert_eq!(levenshtein_distance("", "abc"), 3);
        assert_eq!(levenshtein_distance("same", "same"), 0);
    }
}
