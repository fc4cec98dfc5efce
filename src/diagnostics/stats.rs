//! Counters reported by `parse` and by each call-graph pass.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::{SkipReason, StopReason};
use crate::semantic::UnavailableReason;

/// Node/import pass counters for one `parse` call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseStats {
    /// Files accepted by the scanner
    pub files_scanned: usize,
    /// Files rejected by the scanner, by reason
    pub files_skipped: BTreeMap<SkipReason, usize>,
    /// Files whose outline came from a language server
    pub semantic_outlines: usize,
    /// Files whose outline came from tree-sitter
    pub syntax_outlines: usize,
    /// Why semantic outlines were not used, for files that asked for one
    pub fallbacks: BTreeMap<UnavailableReason, usize>,
    pub imports_resolved: usize,
    pub imports_unresolved: usize,
    pub nodes: usize,
    pub import_edges: usize,
}

impl ParseStats {
    pub fn record_skip(&mut self, reason: SkipReason) {
        *self.files_skipped.entry(reason).or_insert(0) += 1;
    }

    pub fn record_fallback(&mut self, reason: UnavailableReason) {
        *self.fallbacks.entry(reason).or_insert(0) += 1;
    }

    /// Number of files that wanted a semantic outline but fell back to syntax.
    pub fn fallback_total(&self) -> usize {
        self.fallbacks.values().sum()
    }

    pub fn skipped_total(&self) -> usize {
        self.files_skipped.values().sum()
    }
}

/// Which invocation of the call-graph builder produced a summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PassKind {
    #[default]
    Foreground,
    Background,
}

/// Counters for one call-graph pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallPassSummary {
    pub pass: PassKind,
    pub files_processed: usize,
    /// Files skipped because their language/workspace has no usable server
    pub files_without_backend: usize,
    /// Files not reached because the pass stopped early
    pub files_not_reached: usize,
    /// Call sites with an enclosing caller, sent for resolution
    pub sites_considered: usize,
    /// Top-level call sites with no enclosing declaration
    pub sites_without_caller: usize,
    /// Sites whose resolution produced no known target
    pub sites_unresolved: usize,
    /// Sites dropped by the per-file, total or time budget
    pub sites_skipped_budget: usize,
    /// Distinct caller/callee pairs found
    pub edges: usize,
    pub stop: StopReason,
    pub elapsed_ms: u64,
}

impl CallPassSummary {
    pub fn new(pass: PassKind) -> Self {
        Self {
            pass,
            ..Self::default()
        }
    }
}

impl fmt::Display for CallPassSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?} pass: {} files, {} sites, {} edges, {} unresolved, {} skipped ({}, {}ms)",
            self.pass,
            self.files_processed,
            self.sites_considered,
            self.edges,
            self.sites_unresolved,
            self.sites_skipped_budget,
            self.stop,
            self.elapsed_ms
        )
    }
}
