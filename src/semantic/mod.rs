//! Semantic backend: long-lived language server sessions.
//!
//! A [`SemanticBackend`] answers two questions about a file: its symbol
//! outline and the definition behind a source position. The production
//! backend is a language server spoken to over stdio ([`lsp`]); tests inject
//! in-process backends through [`SessionFactory`]. Callers never build
//! sessions themselves, they go through [`SessionPool::get`] or
//! [`SessionPool::with_session`].

pub mod cache;
pub mod lsp;
pub mod outline;
pub mod pool;
pub mod protocol;
pub mod session;
pub mod workspace;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::ingest::{Declaration, Language};

pub use cache::{FileSignature, LruCache};
pub use lsp::LspSessionFactory;
pub use pool::{PoolSettings, SessionKey, SessionPool};
pub use session::Session;
pub use workspace::detect_workspace_root;

/// Why a file could not use the semantic backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnavailableReason {
    MissingBinary,
    StartupTimeout,
    ProtocolError,
    Unsupported,
}

impl fmt::Display for UnavailableReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            UnavailableReason::MissingBinary => "missing_binary",
            UnavailableReason::StartupTimeout => "startup_timeout",
            UnavailableReason::ProtocolError => "protocol_error",
            UnavailableReason::Unsupported => "unsupported",
        };
        f.write_str(text)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SemanticError {
    #[error("language server binary `{0}` not found")]
    MissingBinary(String),

    #[error("language server did not finish initialization within {0:?}")]
    StartupTimeout(Duration),

    #[error("request `{method}` timed out after {timeout:?}")]
    RequestTimeout { method: String, timeout: Duration },

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("language server exited")]
    ServerExited,

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("session was shut down while the request was in flight")]
    Retired,

    #[error("semantic backend disabled for this workspace ({0})")]
    Disabled(UnavailableReason),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SemanticError {
    /// Fallback category used for memoization and statistics.
    pub fn reason(&self) -> UnavailableReason {
        match self {
            SemanticError::MissingBinary(_) => UnavailableReason::MissingBinary,
            SemanticError::StartupTimeout(_) => UnavailableReason::StartupTimeout,
            SemanticError::Unsupported(_) => UnavailableReason::Unsupported,
            SemanticError::Disabled(reason) => *reason,
            SemanticError::RequestTimeout { .. }
            | SemanticError::Protocol(_)
            | SemanticError::ServerExited
            | SemanticError::Retired
            | SemanticError::Io(_) => UnavailableReason::ProtocolError,
        }
    }

    /// True when the session behind this error can no longer serve requests.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SemanticError::ServerExited)
    }

    /// A request reached a live server and got no usable answer.
    pub fn is_request_failure(&self) -> bool {
        matches!(
            self,
            SemanticError::RequestTimeout { .. } | SemanticError::Protocol(_)
        )
    }
}

impl From<serde_json::Error> for SemanticError {
    fn from(err: serde_json::Error) -> Self {
        SemanticError::Protocol(err.to_string())
    }
}

/// Source position: 1-indexed line, 0-indexed byte column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

impl Position {
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

/// A resolved definition site.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Location {
    pub path: PathBuf,
    /// 1-indexed
    pub line: usize,
    /// 0-indexed byte column
    pub column: usize,
}

/// Operations a semantic backend provides for one workspace.
pub trait SemanticBackend: Send + Sync {
    /// Class and function declarations of `path`.
    ///
    /// An empty vector is a successful answer (a file without declarations),
    /// not a failure.
    fn outline(&self, path: &Path) -> Result<Vec<Declaration>, SemanticError>;

    /// Definition sites for each position, in input order.
    ///
    /// A position the server cannot resolve yields an empty entry.
    fn resolve_definitions(
        &self,
        path: &Path,
        positions: &[Position],
    ) -> Result<Vec<Vec<Location>>, SemanticError>;

    fn resolve_definition(
        &self,
        path: &Path,
        position: Position,
    ) -> Result<Vec<Location>, SemanticError> {
        Ok(self
            .resolve_definitions(path, &[position])?
            .into_iter()
            .next()
            .unwrap_or_default())
    }

    /// Stop the backend. Later requests fail with [`SemanticError::ServerExited`].
    fn shutdown(&self) {}
}

/// Creates backends for the session pool.
pub trait SessionFactory: Send + Sync {
    /// Start a backend for `language` rooted at `root`.
    fn spawn(
        &self,
        language: Language,
        root: &Path,
    ) -> Result<Arc<dyn SemanticBackend>, SemanticError>;

    /// Executable that would serve `language`, checked against the
    /// available-binaries list before any spawn.
    fn command_for(&self, _language: Language) -> Option<String> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_reasons() {
        assert_eq!(
            SemanticError::MissingBinary("pyright".into()).reason(),
            UnavailableReason::MissingBinary
        );
        assert_eq!(
            SemanticError::RequestTimeout {
                method: "textDocument/definition".into(),
                timeout: Duration::from_secs(1)
            }
            .reason(),
            UnavailableReason::ProtocolError
        );
        assert_eq!(
            SemanticError::Disabled(UnavailableReason::Unsupported).reason(),
            UnavailableReason::Unsupported
        );
        assert!(SemanticError::ServerExited.is_fatal());
        assert!(!SemanticError::Protocol("bad".into()).is_fatal());
        assert!(!SemanticError::Retired.is_fatal());
        assert!(SemanticError::Protocol("bad".into()).is_request_failure());
        assert!(!SemanticError::Io(std::io::ErrorKind::NotFound.into()).is_request_failure());
    }
}
