//! codegraph-core: dependency and call graphs for polyglot repositories
//!
//! A repository is scanned, every file is parsed for declarations and
//! imports, and call edges are resolved through long-lived language server
//! sessions. Tree-sitter is the universal fallback: every supported
//! language gets modules, classes, functions and import edges even with no
//! language server installed. Call edges only come from a server, tagged
//! with their origin, so the graph undercounts rather than guesses.
//!
//! # Position Conventions
//!
//! All ranges and positions follow tree-sitter conventions:
//! - **Line positions**: 1-indexed (line 1 is the first line)
//! - **Column positions**: 0-indexed byte offsets within the line
//! - **Range ends**: exclusive
//!
//! Language servers count columns in UTF-16 code units; conversion happens
//! at the protocol boundary in [`semantic::lsp`] and nowhere else.
//!
//! # Entry Point
//!
//! ```no_run
//! use codegraph_core::{CodeGraphEngine, GraphConfig, GraphQuery};
//! use std::path::Path;
//!
//! # fn main() -> anyhow::Result<()> {
//! let engine = CodeGraphEngine::new(GraphConfig::default())?;
//! let report = engine.parse(Path::new("."), true)?;
//! println!("{} nodes, {} call edges", report.nodes, report.call_edges);
//!
//! let answer = engine.query(GraphQuery::FindTarget { query: "main".into() });
//! println!("{:?} ({:?})", answer.value, answer.status);
//! # Ok(())
//! # }
//! ```

pub mod common;
pub mod config;
pub mod diagnostics;
pub mod graph;
pub mod indexer;
pub mod ingest;
pub mod logging;
pub mod semantic;

pub use config::{BudgetConfig, ConfigError, GraphConfig, ScanConfig, SemanticConfig, ServerConfig};
pub use diagnostics::{CallPassSummary, ParseStats, PassKind, SkipReason, StopReason};
pub use graph::{
    Analyzer, CallBudget, Direction, Edge, EdgeKind, FindOutcome, Graph, Node, Origin,
    SliceOptions, Subgraph,
};
pub use indexer::{
    Annotated, CodeGraphEngine, GraphQuery, ParseReport, Progress, ProgressStatus, QueryResult,
};
pub use ingest::{detect_language, Language, SourceRange, SymbolKind, SyntaxExtractor};
pub use logging::init_logging;
pub use semantic::{
    SemanticBackend, SemanticError, SessionFactory, SessionPool, UnavailableReason,
};
