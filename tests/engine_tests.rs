//! End-to-end behavior of `CodeGraphEngine::parse` and `query`.

mod common;

use codegraph_core::{
    CodeGraphEngine, Direction, EdgeKind, FindOutcome, Graph, GraphConfig, GraphQuery, Origin,
    ProgressStatus, QueryResult, SliceOptions, SymbolKind, UnavailableReason,
};
use common::{write_repo, FakeFactory, Gate};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

const WAIT: Duration = Duration::from_secs(30);

fn foreground_only() -> GraphConfig {
    let mut config = GraphConfig::default();
    config.budgets.background_enabled = false;
    config
}

fn node_id(graph: &Graph, label: &str) -> String {
    graph
        .nodes()
        .find(|n| n.label == label)
        .map(|n| n.id.clone())
        .unwrap_or_else(|| panic!("no node labelled {}", label))
}

const A_PY: &str = "from b import g\n\ndef f():\n    return g()\n";
const B_PY: &str = "def g():\n    return 1\n";

#[test]
fn test_empty_repository_completes_with_nothing() {
    let dir = TempDir::new().unwrap();
    let engine = CodeGraphEngine::with_factory(GraphConfig::default(), FakeFactory::working());

    let report = engine.parse(dir.path(), true).unwrap();
    assert!(report.root_found);
    assert_eq!(report.status, ProgressStatus::Completed);
    assert_eq!(report.nodes, 0);
    assert_eq!(report.edges, 0);
    assert!(!report.background_started);
    assert_eq!(engine.status().status, ProgressStatus::Completed);
    assert_eq!(engine.snapshot().node_count(), 0);
}

#[test]
fn test_semantic_call_edge_between_files() {
    let dir = TempDir::new().unwrap();
    write_repo(dir.path(), &[("a.py", A_PY), ("b.py", B_PY)]);
    let engine = CodeGraphEngine::with_factory(foreground_only(), FakeFactory::working());

    let report = engine.parse(dir.path(), true).unwrap();
    assert_eq!(report.status, ProgressStatus::Completed);
    assert_eq!(report.stats.semantic_outlines, 2);
    assert_eq!(report.call_edges, 1);
    let foreground = report.foreground.expect("foreground pass ran");
    assert_eq!(foreground.edges, 1);
    assert!(!foreground.stop.is_partial());

    let graph = engine.snapshot();
    let calls: Vec<_> = graph.edges_of_kind(EdgeKind::Call).collect();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].from, node_id(&graph, "f"));
    assert_eq!(calls[0].to, node_id(&graph, "g"));
    assert_eq!(calls[0].origin, Origin::Semantic);
    assert_eq!(graph.edge_count_of(EdgeKind::Import), 1);
}

#[test]
fn test_without_semantic_backend_only_imports() {
    let dir = TempDir::new().unwrap();
    write_repo(dir.path(), &[("a.py", A_PY), ("b.py", B_PY)]);
    let factory = FakeFactory::missing();
    let engine = CodeGraphEngine::with_factory(GraphConfig::default(), factory.clone());

    let report = engine.parse(dir.path(), true).unwrap();
    assert!(engine.wait_for_background(WAIT));

    let graph = engine.snapshot();
    assert_eq!(graph.edge_count_of(EdgeKind::Call), 0);
    assert_eq!(graph.edge_count_of(EdgeKind::Import), 1);
    assert_eq!(report.stats.syntax_outlines, 2);
    assert_eq!(report.stats.fallbacks.get(&UnavailableReason::MissingBinary), Some(&2));
    assert_eq!(
        report.foreground.map(|s| s.files_without_backend),
        Some(2)
    );
}

#[test]
fn test_missing_binary_spawned_at_most_once() {
    let dir = TempDir::new().unwrap();
    let files: Vec<(String, String)> = (0..100)
        .map(|i| (format!("pkg/m{:03}.py", i), format!("def f{}():\n    return f{}()\n", i, i)))
        .collect();
    let refs: Vec<(&str, &str)> = files.iter().map(|(n, t)| (n.as_str(), t.as_str())).collect();
    write_repo(dir.path(), &refs);

    let factory = FakeFactory::missing();
    let engine = CodeGraphEngine::with_factory(GraphConfig::default(), factory.clone());
    let report = engine.parse(dir.path(), true).unwrap();
    assert!(engine.wait_for_background(WAIT));

    assert_eq!(report.stats.files_scanned, 100);
    assert!(factory.spawn_count() <= 1, "spawned {} times", factory.spawn_count());
    assert!(engine.pool().spawn_attempts() <= 1);
    assert_eq!(report.stats.fallback_total(), 100);
}

#[test]
fn test_import_edges_stay_inside_repository() {
    let dir = TempDir::new().unwrap();
    write_repo(
        dir.path(),
        &[
            ("app.py", "import os\nimport requests\nfrom pkg import util\nimport missing_local\n"),
            ("pkg/__init__.py", ""),
            ("pkg/util.py", "def helper():\n    pass\n"),
        ],
    );
    let engine = CodeGraphEngine::with_factory(GraphConfig::default(), FakeFactory::missing());
    let report = engine.parse(dir.path(), false).unwrap();

    let graph = engine.snapshot();
    for edge in graph.edges() {
        let from = graph.node(&edge.from).expect("edge source is a node");
        let to = graph.node(&edge.to).expect("edge target is a node");
        assert_eq!(from.kind, SymbolKind::Module);
        assert_eq!(to.kind, SymbolKind::Module);
        assert!(graph.file(&to.file).is_some());
    }
    let targets: BTreeSet<String> = graph
        .edges_of_kind(EdgeKind::Import)
        .filter_map(|e| graph.node(&e.to).map(|n| n.file.clone()))
        .collect();
    assert!(targets.contains("pkg/util.py"));
    assert!(!targets.iter().any(|t| t.contains("os") || t.contains("requests")));
    assert_eq!(report.stats.imports_unresolved, 3);
}

#[test]
fn test_reparse_is_deterministic() {
    let dir = TempDir::new().unwrap();
    write_repo(
        dir.path(),
        &[
            ("a.py", A_PY),
            ("b.py", B_PY),
            ("pkg/store.py", "class Store:\n    def save(self):\n        return g()\n"),
        ],
    );
    let engine = CodeGraphEngine::with_factory(foreground_only(), FakeFactory::working());

    let snapshot = |engine: &CodeGraphEngine| {
        engine.parse(dir.path(), true).unwrap();
        let graph = engine.snapshot();
        let nodes: Vec<String> = graph.nodes().map(|n| n.id.clone()).collect();
        let edges: Vec<(EdgeKind, String, String)> = graph.edges().map(|e| e.key()).collect();
        (nodes, edges)
    };
    let first = snapshot(&engine);
    let second = snapshot(&engine);
    assert_eq!(first, second);
    assert!(!first.1.is_empty());
}

#[test]
fn test_neighborhood_with_zero_hops() {
    let dir = TempDir::new().unwrap();
    write_repo(dir.path(), &[("a.py", A_PY), ("b.py", B_PY)]);
    let engine = CodeGraphEngine::with_factory(foreground_only(), FakeFactory::working());
    engine.parse(dir.path(), true).unwrap();
    let f = node_id(&engine.snapshot(), "f");

    for max_nodes in [1, 2, 50] {
        let answer = engine.query(GraphQuery::Neighborhood {
            id: f.clone(),
            hops: 0,
            max_nodes,
        });
        let QueryResult::Neighborhood(sub) = answer.value else {
            panic!("wrong result kind");
        };
        assert_eq!(sub.ids(), BTreeSet::from([f.clone()]));
    }

    let answer = engine.query(GraphQuery::Neighborhood {
        id: f.clone(),
        hops: 1,
        max_nodes: 50,
    });
    let QueryResult::Neighborhood(sub) = answer.value else {
        panic!("wrong result kind");
    };
    assert!(sub.ids().contains(&node_id(&engine.snapshot(), "g")));
}

#[test]
fn test_slice_carries_ancestor_chain() {
    let dir = TempDir::new().unwrap();
    write_repo(
        dir.path(),
        &[
            ("app/store.py", "from app.util import g\n\nclass Store:\n    def save(self):\n        return g()\n"),
            ("app/util.py", "def g():\n    return 1\n"),
        ],
    );
    let engine = CodeGraphEngine::with_factory(foreground_only(), FakeFactory::working());
    engine.parse(dir.path(), true).unwrap();
    let graph = engine.snapshot();
    let g = node_id(&graph, "g");

    let answer = engine.query(GraphQuery::Slice {
        start: g,
        options: SliceOptions {
            direction: Direction::In,
            include_imports: false,
            include_calls: true,
        },
    });
    let QueryResult::Slice(sub) = answer.value else {
        panic!("wrong result kind");
    };
    let ids = sub.ids();
    assert!(ids.contains(&node_id(&graph, "Store.save")));
    assert!(ids.contains(&node_id(&graph, "Store")));
    for id in &ids {
        for ancestor in graph.ancestors(id) {
            assert!(ids.contains(&ancestor), "missing ancestor {} of {}", ancestor, id);
        }
    }
}

#[test]
fn test_find_target_prefers_function_over_module() {
    let dir = TempDir::new().unwrap();
    write_repo(
        dir.path(),
        &[
            ("saver.py", "def save():\n    pass\n"),
            ("save.py", "X = 1\n"),
        ],
    );
    let engine = CodeGraphEngine::with_factory(GraphConfig::default(), FakeFactory::missing());
    engine.parse(dir.path(), false).unwrap();

    let answer = engine.query(GraphQuery::FindTarget { query: "save".into() });
    assert_eq!(answer.status, ProgressStatus::Completed);
    let QueryResult::FindTarget(FindOutcome::Found(node)) = answer.value else {
        panic!("save not found");
    };
    assert_eq!(node.kind, SymbolKind::Function);
    assert_eq!(node.file, "saver.py");

    let answer = engine.query(GraphQuery::FindTarget { query: "sve_all".into() });
    let QueryResult::FindTarget(FindOutcome::NotFound { suggestions, .. }) = answer.value else {
        panic!("expected a miss");
    };
    assert!(!suggestions.is_empty());
}

#[test]
fn test_background_pass_refines_graph() {
    let dir = TempDir::new().unwrap();
    write_repo(dir.path(), &[("a.py", A_PY), ("b.py", B_PY)]);
    let mut config = GraphConfig::default();
    config.budgets.foreground.max_total_sites = 0;
    let engine = CodeGraphEngine::with_factory(config, FakeFactory::working());

    let report = engine.parse(dir.path(), true).unwrap();
    assert!(report.background_started);
    assert_eq!(report.call_edges, 0);

    assert!(engine.wait_for_background(WAIT));
    let status = engine.status();
    assert_eq!(status.status, ProgressStatus::Completed);
    assert_eq!(status.generation, 1);
    assert_eq!(status.call_edges, 1);
    assert_eq!(engine.snapshot().edge_count_of(EdgeKind::Call), 1);
}

#[test]
fn test_stale_background_results_discarded() {
    let dir = TempDir::new().unwrap();
    write_repo(dir.path(), &[("a.py", A_PY), ("b.py", B_PY)]);
    let gate = Gate::new();
    let mut config = GraphConfig::default();
    config.budgets.foreground.max_total_sites = 0;
    let engine = CodeGraphEngine::with_factory(config, FakeFactory::gated(gate.clone()));

    let first = engine.parse(dir.path(), true).unwrap();
    assert_eq!(first.generation, 1);
    assert!(first.background_started);
    assert!(gate.wait_entered(WAIT), "background pass never reached the server");

    // Queries answer immediately while refinement is parked
    let answer = engine.query(GraphQuery::FindTarget { query: "f".into() });
    assert_eq!(answer.status, ProgressStatus::Working);
    assert_eq!(answer.generation, 1);

    let second = engine.parse(dir.path(), false).unwrap();
    assert_eq!(second.generation, 2);
    gate.release();
    assert!(engine.wait_for_background(WAIT));

    let graph = engine.snapshot();
    assert_eq!(graph.generation(), 2);
    assert_eq!(graph.edge_count_of(EdgeKind::Call), 0);
    assert_eq!(graph.edge_count_of(EdgeKind::Import), 1);
    let status = engine.status();
    assert_eq!(status.generation, 2);
    assert_eq!(status.status, ProgressStatus::Completed);
}

#[test]
fn test_reparse_reports_working_while_scanning() {
    let dir = TempDir::new().unwrap();
    write_repo(dir.path(), &[("a.py", A_PY), ("b.py", B_PY)]);
    let gate = Gate::new();
    let engine = CodeGraphEngine::with_factory(foreground_only(), FakeFactory::outline_gated(gate.clone()));

    let first = engine.parse(dir.path(), false).unwrap();
    assert_eq!(first.generation, 1);
    assert_eq!(engine.status().status, ProgressStatus::Completed);

    std::thread::scope(|scope| {
        let reparse = scope.spawn(|| engine.parse(dir.path(), true).unwrap());
        assert!(gate.wait_entered(WAIT), "reparse never asked for an outline");

        // The old graph still answers, but it is no longer the final word
        let status = engine.status();
        assert_eq!(status.status, ProgressStatus::Working);
        assert_eq!(status.generation, 2);
        let answer = engine.query(GraphQuery::FindTarget { query: "f".into() });
        assert_eq!(answer.status, ProgressStatus::Working);
        assert_eq!(answer.generation, 1);

        gate.release();
        let second = reparse.join().unwrap();
        assert_eq!(second.generation, 2);
    });

    assert_eq!(engine.status().status, ProgressStatus::Completed);
    assert_eq!(engine.snapshot().generation(), 2);
}

#[test]
fn test_missing_root_reported_not_raised() {
    let dir = TempDir::new().unwrap();
    let engine = CodeGraphEngine::with_factory(GraphConfig::default(), Arc::new(FakeFactory::default()));
    let report = engine.parse(&dir.path().join("nope"), true).unwrap();
    assert!(!report.root_found);
    assert_eq!(report.status, ProgressStatus::Completed);
}
