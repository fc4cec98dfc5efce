//! Engine coordinating scans, call-graph passes and queries.
//!
//! # Pipeline
//!
//! `parse` runs synchronously: scan, per-file parsing on the rayon pool,
//! node and import population, then the foreground call-graph pass. The
//! background pass runs on its own thread against a snapshot of the symbol
//! tables and merges its edges when it finishes.
//!
//! # Generations
//!
//! Every `parse` bumps the generation counter. A pass polls it between
//! files and stops once it moves; a pass that finishes anyway only merges
//! when its generation is still current, checked both before and after
//! taking the graph lock. A rebuild therefore always wins over stale work.
//!
//! # Lock Ordering
//!
//! The graph lock and the progress lock are never held together.

use anyhow::{Context, Result};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::config::GraphConfig;
use crate::diagnostics::{CallPassSummary, ParseStats, PassKind, SkipReason};
use crate::graph::ops::{add_parsed_file, import_edges};
use crate::graph::{
    scan_repository, Analyzer, CallBudget, CallGraphBuilder, Edge, EdgeKind, FileParser,
    FindOutcome, Graph, KnownFiles, OutlineSource, ParsedFile, SliceOptions, Subgraph, SymbolIndex,
};
use crate::semantic::lsp::LspSettings;
use crate::semantic::{LspSessionFactory, SessionFactory, SessionPool};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProgressStatus {
    /// Nothing parsed yet
    #[default]
    Idle,
    /// A background pass is refining the current graph
    Working,
    /// The current graph will not change until the next parse
    Completed,
}

/// Refinement state of the current generation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub status: ProgressStatus,
    pub generation: u64,
    pub call_edges: usize,
    pub files_done: usize,
    pub files_total: usize,
    /// Summary of the last finished pass
    pub last_pass: Option<CallPassSummary>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseReport {
    pub generation: u64,
    pub root: PathBuf,
    /// False when the root does not exist; the graph is then empty
    pub root_found: bool,
    pub stats: ParseStats,
    /// None when no foreground pass ran
    pub foreground: Option<CallPassSummary>,
    pub background_started: bool,
    pub status: ProgressStatus,
    pub nodes: usize,
    pub edges: usize,
    pub call_edges: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum GraphQuery {
    Slice { start: String, options: SliceOptions },
    Neighborhood { id: String, hops: usize, max_nodes: usize },
    FindTarget { query: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", content = "value", rename_all = "snake_case")]
pub enum QueryResult {
    Slice(Subgraph),
    Neighborhood(Subgraph),
    FindTarget(FindOutcome),
}

/// A query answer with the refinement state it was computed under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotated<T> {
    pub value: T,
    pub status: ProgressStatus,
    pub generation: u64,
    pub call_edges: usize,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Shared handles a background pass needs after `parse` returns.
#[derive(Clone)]
struct Shared {
    pool: Arc<SessionPool>,
    graph: Arc<Mutex<Graph>>,
    generation: Arc<AtomicU64>,
    progress: Arc<Mutex<Progress>>,
}

impl Shared {
    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    /// Merge pass edges if `generation` is still live. Returns the call-edge
    /// count after the merge, or None when the edges were discarded.
    fn merge_if_current(&self, generation: u64, edges: Vec<Edge>) -> Option<usize> {
        if !self.is_current(generation) {
            info!(generation, edges = edges.len(), "discarding call edges from a stale generation");
            return None;
        }
        let mut graph = lock(&self.graph);
        if !self.is_current(generation) || graph.generation() != generation {
            info!(generation, edges = edges.len(), "discarding call edges from a stale generation");
            return None;
        }
        let added = graph.merge_pass(edges);
        let total = graph.edge_count_of(EdgeKind::Call);
        debug!(generation, added, total, "merged call edges");
        Some(total)
    }

    /// Apply `update` to the progress record if `generation` is still live.
    fn update_progress(&self, generation: u64, update: impl FnOnce(&mut Progress)) {
        let mut progress = lock(&self.progress);
        if progress.generation == generation && self.is_current(generation) {
            update(&mut progress);
        }
    }
}

pub struct CodeGraphEngine {
    config: GraphConfig,
    shared: Shared,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl CodeGraphEngine {
    /// Engine backed by language servers launched per the configuration.
    pub fn new(config: GraphConfig) -> Result<Self> {
        config.validate()?;
        let factory = LspSessionFactory::new(LspSettings::from_config(&config))
            .context("starting language server runtime")?;
        Ok(Self::with_factory(config, Arc::new(factory)))
    }

    /// Engine with a caller-supplied session factory.
    pub fn with_factory(config: GraphConfig, factory: Arc<dyn SessionFactory>) -> Self {
        let pool = SessionPool::new(factory, config.pool_settings());
        Self {
            config,
            shared: Shared {
                pool: Arc::new(pool),
                graph: Arc::new(Mutex::new(Graph::default())),
                generation: Arc::new(AtomicU64::new(0)),
                progress: Arc::new(Mutex::new(Progress::default())),
            },
            workers: Mutex::new(Vec::new()),
        }
    }

    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    pub fn pool(&self) -> &SessionPool {
        &self.shared.pool
    }

    pub fn generation(&self) -> u64 {
        self.shared.generation.load(Ordering::SeqCst)
    }

    /// Build a fresh graph for `root`.
    ///
    /// Returns once nodes, import edges and the foreground call edges are
    /// in place. A missing root is reported through
    /// [`ParseReport::root_found`], not as an error.
    pub fn parse(&self, root: &Path, use_semantic: bool) -> Result<ParseReport> {
        let generation = self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.begin_progress(generation);
        let semantic = use_semantic && self.config.semantic.enabled;
        let mut report = ParseReport {
            generation,
            root: root.to_path_buf(),
            ..ParseReport::default()
        };

        if !root.is_dir() {
            warn!(root = %root.display(), "repository root not found");
            self.install(generation, Graph::new(generation));
            self.finish_progress(generation, 0, None);
            report.status = ProgressStatus::Completed;
            return Ok(report);
        }
        report.root_found = true;

        self.shared.pool.evict_idle(self.config.semantic.idle_ttl());

        let scan = scan_repository(root, &self.config.scan)?;
        report.root = scan.root.clone();
        report.stats.files_scanned = scan.files.len();
        report.stats.files_skipped = scan.skipped.clone();

        let markers = &self.config.semantic.root_markers;
        let pool = semantic.then_some(&*self.shared.pool);
        let parser = FileParser::new(pool, &scan.root, markers);
        let results: Vec<(String, Result<ParsedFile>)> = scan
            .files
            .par_iter()
            .map(|task| (task.label.clone(), parser.parse(&task.path, &task.label, task.language)))
            .collect();

        let mut graph = Graph::new(generation);
        let mut parsed_files = Vec::with_capacity(results.len());
        for (label, result) in results {
            match result {
                Ok(parsed) => {
                    match parsed.outline_source {
                        OutlineSource::Semantic => report.stats.semantic_outlines += 1,
                        OutlineSource::Syntax => report.stats.syntax_outlines += 1,
                    }
                    if let Some(reason) = parsed.fallback {
                        report.stats.record_fallback(reason);
                    }
                    add_parsed_file(&mut graph, &parsed);
                    parsed_files.push(parsed);
                }
                Err(err) => {
                    warn!(file = %label, error = %err, "failed to parse file");
                    report.stats.record_skip(SkipReason::Unreadable);
                }
            }
        }

        let known = KnownFiles::new(parsed_files.iter().map(|p| p.label.as_str()));
        for parsed in &parsed_files {
            let (edges, resolved, unresolved) = import_edges(parsed, &known);
            report.stats.imports_resolved += resolved;
            report.stats.imports_unresolved += unresolved;
            graph.merge_edges(edges);
        }
        report.stats.nodes = graph.node_count();
        report.stats.import_edges = graph.edge_count_of(EdgeKind::Import);
        info!(
            generation,
            files = parsed_files.len(),
            nodes = report.stats.nodes,
            imports = report.stats.import_edges,
            fallbacks = report.stats.fallback_total(),
            "graph built"
        );

        let index = SymbolIndex::from_graph(&graph);
        if !self.install(generation, graph) {
            return Ok(self.finalize(report, ProgressStatus::Completed));
        }

        if !semantic || index.is_empty() {
            self.finish_progress(generation, 0, None);
            return Ok(self.finalize(report, ProgressStatus::Completed));
        }

        let shared = self.shared.clone();
        let builder = CallGraphBuilder::new(&index, &self.shared.pool, &scan.root, markers);
        let outcome = builder.build(
            index.tasks(),
            &self.config.budgets.foreground,
            PassKind::Foreground,
            &|| shared.is_current(generation),
            &|_| {},
        );
        let call_edges = self
            .shared
            .merge_if_current(generation, outcome.edges)
            .unwrap_or(0);
        report.foreground = Some(outcome.summary.clone());

        if self.config.budgets.background_enabled {
            {
                let mut progress = lock(&self.shared.progress);
                *progress = Progress {
                    status: ProgressStatus::Working,
                    generation,
                    call_edges,
                    files_done: 0,
                    files_total: index.len(),
                    last_pass: Some(outcome.summary),
                };
            }
            self.spawn_background(generation, index, scan.root.clone());
            report.background_started = true;
            Ok(self.finalize(report, ProgressStatus::Working))
        } else {
            self.finish_progress(generation, call_edges, Some(outcome.summary));
            Ok(self.finalize(report, ProgressStatus::Completed))
        }
    }

    /// Replace the live graph unless a newer parse already did.
    fn install(&self, generation: u64, graph: Graph) -> bool {
        let mut live = lock(&self.shared.graph);
        if !self.shared.is_current(generation) {
            debug!(generation, "newer parse in progress, not installing graph");
            return false;
        }
        *live = graph;
        true
    }

    /// Report `generation` as working from the moment its scan starts.
    fn begin_progress(&self, generation: u64) {
        let mut progress = lock(&self.shared.progress);
        if self.shared.is_current(generation) {
            *progress = Progress {
                status: ProgressStatus::Working,
                generation,
                ..Progress::default()
            };
        }
    }

    fn finish_progress(&self, generation: u64, call_edges: usize, last_pass: Option<CallPassSummary>) {
        let mut progress = lock(&self.shared.progress);
        if self.shared.is_current(generation) {
            *progress = Progress {
                status: ProgressStatus::Completed,
                generation,
                call_edges,
                files_done: 0,
                files_total: 0,
                last_pass,
            };
        }
    }

    fn finalize(&self, mut report: ParseReport, status: ProgressStatus) -> ParseReport {
        let graph = lock(&self.shared.graph);
        if graph.generation() == report.generation {
            report.nodes = graph.node_count();
            report.edges = graph.edge_count();
            report.call_edges = graph.edge_count_of(EdgeKind::Call);
        }
        report.status = status;
        report
    }

    fn spawn_background(&self, generation: u64, index: SymbolIndex, root: PathBuf) {
        let shared = self.shared.clone();
        let budget: CallBudget = self.config.budgets.background;
        let markers = self.config.semantic.root_markers.clone();
        let idle_ttl = self.config.semantic.idle_ttl();

        let handle = thread::spawn(move || {
            debug!(generation, files = index.len(), "background call-graph pass started");
            let builder = CallGraphBuilder::new(&index, &shared.pool, &root, &markers);
            let outcome = builder.build(
                index.tasks(),
                &budget,
                PassKind::Background,
                &|| shared.is_current(generation),
                &|summary| {
                    shared.update_progress(generation, |p| p.files_done = summary.files_processed);
                },
            );

            let summary = outcome.summary.clone();
            if let Some(call_edges) = shared.merge_if_current(generation, outcome.edges) {
                shared.update_progress(generation, |p| {
                    p.status = ProgressStatus::Completed;
                    p.call_edges = call_edges;
                    p.files_done = summary.files_processed;
                    p.last_pass = Some(summary);
                });
            }
            shared.pool.evict_idle(idle_ttl);
        });

        let mut workers = lock(&self.workers);
        workers.retain(|w| !w.is_finished());
        workers.push(handle);
    }

    /// Block until every background pass has finished or `timeout` passes.
    /// Returns true when none is left running.
    pub fn wait_for_background(&self, timeout: Duration) -> bool {
        let started = Instant::now();
        loop {
            let finished: Vec<JoinHandle<()>> = {
                let mut workers = lock(&self.workers);
                let (done, running): (Vec<_>, Vec<_>) =
                    workers.drain(..).partition(|w| w.is_finished());
                *workers = running;
                done
            };
            for handle in finished {
                if handle.join().is_err() {
                    warn!("background call-graph pass panicked");
                }
            }
            if lock(&self.workers).is_empty() {
                return true;
            }
            if started.elapsed() >= timeout {
                return false;
            }
            thread::sleep(Duration::from_millis(10));
        }
    }

    pub fn status(&self) -> Progress {
        lock(&self.shared.progress).clone()
    }

    /// Copy of the live graph.
    pub fn snapshot(&self) -> Graph {
        lock(&self.shared.graph).clone()
    }

    /// Answer `query` from the current graph without waiting for any
    /// background pass.
    pub fn query(&self, query: GraphQuery) -> Annotated<QueryResult> {
        let progress = self.status();
        let graph = lock(&self.shared.graph);
        let analyzer = Analyzer::new(&graph);
        let value = match query {
            GraphQuery::Slice { start, options } => {
                QueryResult::Slice(analyzer.slice_subgraph(&start, options))
            }
            GraphQuery::Neighborhood { id, hops, max_nodes } => {
                QueryResult::Neighborhood(analyzer.neighborhood(&id, hops, max_nodes))
            }
            GraphQuery::FindTarget { query } => QueryResult::FindTarget(analyzer.find_target(&query)),
        };
        Annotated {
            value,
            status: if progress.generation == graph.generation() {
                progress.status
            } else {
                ProgressStatus::Working
            },
            generation: graph.generation(),
            call_edges: graph.edge_count_of(EdgeKind::Call),
        }
    }
}

impl Drop for CodeGraphEngine {
    fn drop(&mut self) {
        // Stop running passes at their next file boundary
        self.shared.generation.fetch_add(1, Ordering::SeqCst);
    }
}
