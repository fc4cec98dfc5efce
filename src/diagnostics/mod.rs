//! Structured diagnostics for scans and call-graph passes.
//!
//! Every degraded outcome (skipped files, syntax fallbacks, unresolved
//! imports and call sites, budget stops) is counted here so callers can
//! decide how far to trust a given graph view.

pub mod reasons;
pub mod stats;

pub use reasons::{SkipReason, StopReason};
pub use stats::{CallPassSummary, ParseStats, PassKind};
