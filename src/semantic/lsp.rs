//! Language server backend over stdio.
//!
//! One child process per session. The factory owns a small tokio runtime
//! shared by every backend it starts; backends expose the synchronous
//! [`SemanticBackend`] interface by blocking on that runtime, so callers on
//! rayon or plain threads never see async code.

use lsp_types::{DocumentSymbolResponse, GotoDefinitionResponse, Url};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::runtime::Runtime;
use tracing::{debug, info, warn};

use super::cache::FileSignature;
use super::outline::declarations_from_response;
use super::protocol::RpcClient;
use super::{Location, Position, SemanticBackend, SemanticError, SessionFactory};
use crate::common::{byte_col_to_utf16, line_at, utf16_to_byte_col};
use crate::config::{GraphConfig, ServerConfig};
use crate::ingest::{Declaration, Language};

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct LspSettings {
    pub servers: HashMap<Language, ServerConfig>,
    pub startup_timeout: Duration,
    pub request_timeout: Duration,
    pub max_in_flight: usize,
    pub max_open_documents: usize,
}

impl LspSettings {
    pub fn from_config(config: &GraphConfig) -> Self {
        let servers = config
            .semantic
            .servers
            .iter()
            .filter_map(|(name, server)| Some((Language::from_name(name)?, server.clone())))
            .collect();
        Self {
            servers,
            startup_timeout: Duration::from_millis(config.semantic.startup_timeout_ms),
            request_timeout: Duration::from_millis(config.semantic.request_timeout_ms),
            max_in_flight: config.semantic.max_in_flight,
            max_open_documents: config.semantic.max_open_documents,
        }
    }
}

/// Starts language server processes for the session pool.
pub struct LspSessionFactory {
    runtime: Arc<Runtime>,
    settings: LspSettings,
}

impl LspSessionFactory {
    pub fn new(settings: LspSettings) -> Result<Self, SemanticError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("codegraph-lsp")
            .enable_all()
            .build()?;
        Ok(Self {
            runtime: Arc::new(runtime),
            settings,
        })
    }
}

impl SessionFactory for LspSessionFactory {
    fn spawn(
        &self,
        language: Language,
        root: &Path,
    ) -> Result<Arc<dyn SemanticBackend>, SemanticError> {
        let server = self.settings.servers.get(&language).ok_or_else(|| {
            SemanticError::Unsupported(format!("no language server configured for {}", language))
        })?;
        let program = which::which(&server.command)
            .map_err(|_| SemanticError::MissingBinary(server.command.clone()))?;
        let backend = LspBackend::launch(
            self.runtime.clone(),
            language,
            root,
            &program,
            &server.args,
            &self.settings,
        )?;
        Ok(Arc::new(backend))
    }

    fn command_for(&self, language: Language) -> Option<String> {
        self.settings
            .servers
            .get(&language)
            .map(|server| server.command.clone())
    }
}

struct OpenDocument {
    version: i32,
    signature: FileSignature,
}

pub struct LspBackend {
    runtime: Arc<Runtime>,
    client: Arc<RpcClient>,
    child: Mutex<Option<tokio::process::Child>>,
    language: Language,
    root: PathBuf,
    request_timeout: Duration,
    /// Documents the server holds open, least recently used closed first
    documents: Mutex<lru::LruCache<PathBuf, OpenDocument>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn file_uri(path: &Path) -> Result<Url, SemanticError> {
    Url::from_file_path(path)
        .map_err(|_| SemanticError::Protocol(format!("not an absolute path: {}", path.display())))
}

/// Capability present and not explicitly `false`.
fn advertised(capabilities: &Value, name: &str) -> bool {
    match capabilities.get(name) {
        None | Some(Value::Null) => false,
        Some(Value::Bool(enabled)) => *enabled,
        Some(_) => true,
    }
}

impl LspBackend {
    fn launch(
        runtime: Arc<Runtime>,
        language: Language,
        root: &Path,
        program: &Path,
        args: &[String],
        settings: &LspSettings,
    ) -> Result<Self, SemanticError> {
        let mut child = {
            let _guard = runtime.enter();
            tokio::process::Command::new(program)
                .args(args)
                .current_dir(root)
                .stdin(Stdio::piped())
                .stdout(Stdio::piped())
                .stderr(Stdio::null())
                .kill_on_drop(true)
                .spawn()?
        };
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| SemanticError::Protocol("server stdin unavailable".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| SemanticError::Protocol("server stdout unavailable".into()))?;
        let client = RpcClient::start(runtime.handle(), stdout, stdin, settings.max_in_flight);

        let backend = Self::connect(
            runtime,
            language,
            root,
            client,
            settings.request_timeout,
            settings.max_open_documents,
        );
        *lock(&backend.child) = Some(child);
        if let Err(err) = backend.initialize(settings.startup_timeout) {
            backend.kill();
            return Err(err);
        }
        info!(%language, root = %root.display(), program = %program.display(), "language server ready");
        Ok(backend)
    }

    /// Backend over an already connected client. The caller runs `initialize`.
    pub fn connect(
        runtime: Arc<Runtime>,
        language: Language,
        root: &Path,
        client: Arc<RpcClient>,
        request_timeout: Duration,
        max_open_documents: usize,
    ) -> Self {
        let open_limit = NonZeroUsize::new(max_open_documents).unwrap_or(NonZeroUsize::MIN);
        Self {
            runtime,
            client,
            child: Mutex::new(None),
            language,
            root: root.to_path_buf(),
            request_timeout,
            documents: Mutex::new(lru::LruCache::new(open_limit)),
        }
    }

    /// `initialize` handshake followed by `initialized`.
    ///
    /// Fails with `Unsupported` when the server offers neither document
    /// symbols nor go-to-definition.
    pub fn initialize(&self, timeout: Duration) -> Result<(), SemanticError> {
        let root_uri = file_uri(&self.root)?;
        let name = self
            .root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "workspace".to_string());
        let params = json!({
            "processId": std::process::id(),
            "rootUri": root_uri,
            "workspaceFolders": [{"uri": root_uri, "name": name}],
            "capabilities": {
                "textDocument": {
                    "documentSymbol": {"hierarchicalDocumentSymbolSupport": true},
                    "definition": {"linkSupport": true},
                    "synchronization": {"didSave": false}
                },
                "workspace": {"configuration": true, "workspaceFolders": true}
            },
            "initializationOptions": {}
        });

        let result = self
            .runtime
            .block_on(self.client.request("initialize", params, timeout))
            .map_err(|err| match err {
                SemanticError::RequestTimeout { .. } => SemanticError::StartupTimeout(timeout),
                other => other,
            })?;

        let capabilities = result.get("capabilities").cloned().unwrap_or(Value::Null);
        let symbols = advertised(&capabilities, "documentSymbolProvider");
        let definitions = advertised(&capabilities, "definitionProvider");
        if !symbols && !definitions {
            return Err(SemanticError::Unsupported(format!(
                "{} server offers neither document symbols nor definitions",
                self.language
            )));
        }
        debug!(language = %self.language, symbols, definitions, "server capabilities");
        self.runtime
            .block_on(self.client.notify("initialized", json!({})))
    }

    /// Open `path` on the server, or send its new text if it changed.
    ///
    /// Opening past `max_open_documents` closes the least recently used
    /// document first, so long scans do not grow the server's memory.
    fn sync_document(&self, path: &Path) -> Result<(Url, String), SemanticError> {
        let text = std::fs::read_to_string(path)?;
        let signature = FileSignature::of(path)?;
        let uri = file_uri(path)?;

        let mut notifications = Vec::new();
        // Held while notifying so open/change/close reach the server in order
        let mut documents = lock(&self.documents);
        match documents.get_mut(path) {
            None => {
                let opened = OpenDocument {
                    version: 1,
                    signature,
                };
                if let Some((closed, _)) = documents.push(path.to_path_buf(), opened) {
                    debug!(path = %closed.display(), "closing least recently used document");
                    notifications.push((
                        "textDocument/didClose",
                        json!({"textDocument": {"uri": file_uri(&closed)?}}),
                    ));
                }
                notifications.push((
                    "textDocument/didOpen",
                    json!({"textDocument": {
                        "uri": uri,
                        "languageId": self.language.lsp_language_id(),
                        "version": 1,
                        "text": text,
                    }}),
                ));
            }
            Some(doc) if doc.signature != signature => {
                doc.version += 1;
                doc.signature = signature;
                notifications.push((
                    "textDocument/didChange",
                    json!({
                        "textDocument": {"uri": uri, "version": doc.version},
                        "contentChanges": [{"text": text}],
                    }),
                ));
            }
            Some(_) => {}
        }
        for (method, params) in notifications {
            self.runtime.block_on(self.client.notify(method, params))?;
        }
        Ok((uri, text))
    }

    /// Number of documents currently open on the server.
    pub fn open_documents(&self) -> usize {
        lock(&self.documents).len()
    }

    fn convert_locations(
        &self,
        response: GotoDefinitionResponse,
        origin: &Path,
        origin_text: &str,
        texts: &mut HashMap<PathBuf, Option<String>>,
    ) -> Vec<Location> {
        let targets: Vec<(Url, lsp_types::Position)> = match response {
            GotoDefinitionResponse::Scalar(loc) => vec![(loc.uri, loc.range.start)],
            GotoDefinitionResponse::Array(locs) => {
                locs.into_iter().map(|l| (l.uri, l.range.start)).collect()
            }
            GotoDefinitionResponse::Link(links) => links
                .into_iter()
                .map(|l| (l.target_uri, l.target_selection_range.start))
                .collect(),
        };

        let mut out = Vec::with_capacity(targets.len());
        for (uri, start) in targets {
            let Ok(path) = uri.to_file_path() else {
                continue;
            };
            let line = start.line as usize + 1;
            let column = if path == origin {
                utf16_to_byte_col(line_at(origin_text, line).unwrap_or(""), start.character)
            } else {
                let text = texts
                    .entry(path.clone())
                    .or_insert_with(|| std::fs::read_to_string(&path).ok());
                match text.as_deref().and_then(|t| line_at(t, line)) {
                    Some(line_text) => utf16_to_byte_col(line_text, start.character),
                    None => start.character as usize,
                }
            };
            out.push(Location { path, line, column });
        }
        out
    }

    fn kill(&self) {
        if let Some(mut child) = lock(&self.child).take() {
            if let Err(err) = child.start_kill() {
                debug!(error = %err, "language server already gone");
            }
        }
        self.client.close();
    }
}

impl SemanticBackend for LspBackend {
    fn outline(&self, path: &Path) -> Result<Vec<Declaration>, SemanticError> {
        let (uri, text) = self.sync_document(path)?;
        let value = self.runtime.block_on(self.client.request(
            "textDocument/documentSymbol",
            json!({"textDocument": {"uri": uri}}),
            self.request_timeout,
        ))?;
        if value.is_null() {
            return Ok(Vec::new());
        }
        let response: DocumentSymbolResponse = serde_json::from_value(value)?;
        Ok(declarations_from_response(response, self.language, &text))
    }

    fn resolve_definitions(
        &self,
        path: &Path,
        positions: &[Position],
    ) -> Result<Vec<Vec<Location>>, SemanticError> {
        if positions.is_empty() {
            return Ok(Vec::new());
        }
        let (uri, text) = self.sync_document(path)?;
        let requests: Vec<Value> = positions
            .iter()
            .map(|pos| {
                let line_text = line_at(&text, pos.line).unwrap_or("");
                json!({
                    "textDocument": {"uri": uri},
                    "position": {
                        "line": pos.line.saturating_sub(1),
                        "character": byte_col_to_utf16(line_text, pos.column),
                    }
                })
            })
            .collect();

        let timeout = self.request_timeout;
        let replies = self.runtime.block_on(async {
            let mut set = tokio::task::JoinSet::new();
            for (idx, params) in requests.into_iter().enumerate() {
                let client = self.client.clone();
                set.spawn(async move {
                    (idx, client.request("textDocument/definition", params, timeout).await)
                });
            }
            let mut replies: Vec<Option<Result<Value, SemanticError>>> =
                (0..positions.len()).map(|_| None).collect();
            while let Some(joined) = set.join_next().await {
                if let Ok((idx, reply)) = joined {
                    replies[idx] = Some(reply);
                }
            }
            replies
        });

        let mut texts = HashMap::new();
        let mut out = Vec::with_capacity(positions.len());
        let mut timed_out = None;
        let mut timeouts = 0;
        for reply in replies {
            let locations = match reply {
                Some(Ok(Value::Null)) | None => Vec::new(),
                Some(Ok(value)) => match serde_json::from_value::<GotoDefinitionResponse>(value) {
                    Ok(response) => self.convert_locations(response, path, &text, &mut texts),
                    Err(err) => {
                        debug!(path = %path.display(), error = %err, "unreadable definition response");
                        Vec::new()
                    }
                },
                Some(Err(err)) if err.is_fatal() => return Err(err),
                Some(Err(err @ SemanticError::RequestTimeout { .. })) => {
                    timeouts += 1;
                    timed_out = Some(err);
                    Vec::new()
                }
                Some(Err(err)) => {
                    debug!(path = %path.display(), error = %err, "definition request failed");
                    Vec::new()
                }
            };
            out.push(locations);
        }
        // Nothing answered in time: report it rather than an empty batch
        if let Some(err) = timed_out.filter(|_| timeouts == positions.len()) {
            return Err(err);
        }
        Ok(out)
    }

    fn shutdown(&self) {
        if self.client.is_alive() {
            let client = self.client.clone();
            let result = self.runtime.block_on(async move {
                client.request("shutdown", Value::Null, SHUTDOWN_TIMEOUT).await?;
                client.notify("exit", Value::Null).await
            });
            if let Err(err) = result {
                warn!(language = %self.language, error = %err, "language server did not shut down cleanly");
            }
        }
        self.kill();
    }
}
