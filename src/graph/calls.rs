//! Call-graph pass: call sites to `call` edges through the semantic backend.
//!
//! # Algorithm (per file)
//! 1. Call sites come from the syntax extractor
//! 2. Each site's caller is the innermost declaration enclosing it; sites
//!    outside every declaration are dropped
//! 3. Surviving sites are resolved in batches against the file's session
//! 4. A resolved location maps to the innermost function or class of the
//!    target file; anything else leaves the site unresolved
//!
//! The builder never touches the graph. It returns edges for the caller to
//! merge, so a pass can run on a worker thread against a [`SymbolIndex`]
//! snapshot while queries keep reading the live graph.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::schema::Edge;
use super::symbol_index::{FileTask, SymbolIndex};
use crate::diagnostics::{CallPassSummary, PassKind, StopReason};
use crate::ingest::{CallSite, SymbolKind, SyntaxExtractor};
use crate::semantic::{detect_workspace_root, Location, Position, SessionPool};

/// Positions sent to a session per request batch. The time budget is
/// checked between batches.
const RESOLVE_CHUNK: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CallBudget {
    pub max_duration_ms: u64,
    pub max_sites_per_file: usize,
    pub max_total_sites: usize,
}

impl CallBudget {
    /// Small budget for the synchronous pass.
    pub fn foreground() -> Self {
        Self {
            max_duration_ms: 3_000,
            max_sites_per_file: 200,
            max_total_sites: 2_000,
        }
    }

    /// Larger budget for the deferred refinement pass.
    pub fn background() -> Self {
        Self {
            max_duration_ms: 60_000,
            max_sites_per_file: 2_000,
            max_total_sites: 50_000,
        }
    }

    pub fn max_duration(&self) -> Duration {
        Duration::from_millis(self.max_duration_ms)
    }
}

impl Default for CallBudget {
    fn default() -> Self {
        Self::foreground()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallGraphOutcome {
    /// Deduplicated edges; weight is the number of sites behind each
    pub edges: Vec<Edge>,
    pub summary: CallPassSummary,
}

pub struct CallGraphBuilder<'a> {
    index: &'a SymbolIndex,
    pool: &'a SessionPool,
    repo_root: &'a Path,
    markers: &'a [String],
    extractor: SyntaxExtractor,
}

struct PendingSite {
    caller: String,
    site: CallSite,
}

impl<'a> CallGraphBuilder<'a> {
    pub fn new(
        index: &'a SymbolIndex,
        pool: &'a SessionPool,
        repo_root: &'a Path,
        markers: &'a [String],
    ) -> Self {
        Self {
            index,
            pool,
            repo_root,
            markers,
            extractor: SyntaxExtractor::new(),
        }
    }

    /// Run one pass over `files`.
    ///
    /// `should_continue` is polled before each file; `on_file` sees the
    /// running summary after each one.
    pub fn build(
        &self,
        files: &[FileTask],
        budget: &CallBudget,
        pass: PassKind,
        should_continue: &dyn Fn() -> bool,
        on_file: &dyn Fn(&CallPassSummary),
    ) -> CallGraphOutcome {
        let started = Instant::now();
        let mut summary = CallPassSummary::new(pass);
        let mut weights: BTreeMap<(String, String), u32> = BTreeMap::new();

        for (position, task) in files.iter().enumerate() {
            let stop = if !should_continue() {
                Some(StopReason::Cancelled)
            } else if started.elapsed() >= budget.max_duration() {
                Some(StopReason::BudgetTime)
            } else if summary.sites_considered >= budget.max_total_sites {
                Some(StopReason::BudgetSites)
            } else {
                None
            };
            if let Some(stop) = stop {
                summary.stop = stop;
                summary.files_not_reached = files.len() - position;
                break;
            }

            if let Some(stop) = self.process_file(task, budget, started, &mut summary, &mut weights) {
                summary.stop = stop;
                summary.files_processed += 1;
                summary.files_not_reached = files.len() - position - 1;
                on_file(&summary);
                break;
            }
            summary.files_processed += 1;
            on_file(&summary);
        }

        let edges: Vec<Edge> = weights
            .into_iter()
            .map(|((from, to), weight)| {
                let mut edge = Edge::call(from, to);
                edge.weight = weight;
                edge
            })
            .collect();
        summary.edges = edges.len();
        summary.elapsed_ms = started.elapsed().as_millis() as u64;

        if summary.stop.is_partial() {
            info!(%summary, "call-graph pass stopped early");
        } else {
            info!(%summary, "call-graph pass finished");
        }
        CallGraphOutcome { edges, summary }
    }

    /// Resolve one file's sites into `weights`. Returns a stop reason when a
    /// budget ran out inside the file.
    fn process_file(
        &self,
        task: &FileTask,
        budget: &CallBudget,
        started: Instant,
        summary: &mut CallPassSummary,
        weights: &mut BTreeMap<(String, String), u32>,
    ) -> Option<StopReason> {
        let workspace = detect_workspace_root(&task.path, self.repo_root, self.markers);
        if let Err(err) = self.pool.get(task.language, &workspace) {
            debug!(file = %task.label, reason = %err.reason(), "no semantic backend, skipping call sites");
            summary.files_without_backend += 1;
            return None;
        }

        let text = match std::fs::read(&task.path) {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(err) => {
                warn!(file = %task.label, error = %err, "cannot read file for call sites");
                return None;
            }
        };

        let mut pending: Vec<PendingSite> = Vec::new();
        for site in self.extractor.call_sites(&text, task.language) {
            match self.index.enclosing(&task.label, site.line, site.column) {
                Some(caller) => pending.push(PendingSite {
                    caller: caller.to_string(),
                    site,
                }),
                None => summary.sites_without_caller += 1,
            }
        }

        let remaining_total = budget.max_total_sites.saturating_sub(summary.sites_considered);
        let allowed = pending.len().min(budget.max_sites_per_file).min(remaining_total);
        let mut stop = None;
        if allowed < pending.len() {
            summary.sites_skipped_budget += pending.len() - allowed;
            if allowed == remaining_total {
                stop = Some(StopReason::BudgetSites);
            }
            pending.truncate(allowed);
        }

        for (chunk_idx, chunk) in pending.chunks(RESOLVE_CHUNK).enumerate() {
            if started.elapsed() >= budget.max_duration() {
                let unsent = pending.len() - chunk_idx * RESOLVE_CHUNK;
                summary.sites_skipped_budget += unsent;
                return Some(StopReason::BudgetTime);
            }
            summary.sites_considered += chunk.len();

            let positions: Vec<Position> = chunk
                .iter()
                .map(|p| Position::new(p.site.line, p.site.column))
                .collect();
            let resolved = self.pool.with_session(task.language, &workspace, |session| {
                session.resolve_definitions(&task.path, &positions)
            });
            let resolved = match resolved {
                Ok(resolved) => resolved,
                Err(err) => {
                    warn!(file = %task.label, error = %err, "definition lookup failed");
                    summary.sites_unresolved += chunk.len();
                    // The server is gone or stuck for this workspace
                    if self.pool.disabled_reason(task.language, &workspace).is_some() {
                        let sent = ((chunk_idx + 1) * RESOLVE_CHUNK).min(pending.len());
                        summary.sites_unresolved += pending.len() - sent;
                        return stop;
                    }
                    continue;
                }
            };

            for (pending_site, locations) in chunk.iter().zip(resolved) {
                match self.target_for(task, &pending_site.site, &locations) {
                    Some(target) => {
                        *weights
                            .entry((pending_site.caller.clone(), target.to_string()))
                            .or_insert(0) += 1;
                    }
                    None => summary.sites_unresolved += 1,
                }
            }
        }
        stop
    }

    /// First location that lands inside a known function or class.
    ///
    /// A location equal to the site itself (servers answer a definition
    /// request on a declaration with the declaration) is ignored.
    fn target_for(&self, task: &FileTask, site: &CallSite, locations: &[Location]) -> Option<&str> {
        locations.iter().find_map(|location| {
            let label = self.index.label_for_path(&location.path)?;
            if label == task.label && location.line == site.line && location.column == site.column {
                return None;
            }
            let target = self.index.enclosing(label, location.line, location.column)?;
            match self.index.kind(target) {
                Some(SymbolKind::Function) | Some(SymbolKind::Class) => Some(target),
                _ => None,
            }
        })
    }
}
