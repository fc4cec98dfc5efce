//! Pooled semantic session: one backend plus its response caches.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tracing::debug;

use super::cache::{CacheStats, FileSignature, LruCache};
use super::{Location, Position, SemanticBackend, SemanticError};
use crate::ingest::{Declaration, Language};

type DefinitionKey = (FileSignature, usize, usize);

/// A warm backend for one `(language, workspace root)` pair.
///
/// Outlines are cached by [`FileSignature`], definitions by
/// `(signature, line, column)`. Failed requests are never cached, but
/// consecutive failures are counted so the pool can give up on a server
/// that keeps timing out.
///
/// A session evicted from the pool is retired: its backend is stopped and
/// any request, including one already in flight, fails with
/// [`SemanticError::Retired`] instead of looking like a crashed server.
pub struct Session {
    language: Language,
    root: PathBuf,
    backend: Arc<dyn SemanticBackend>,
    outlines: Mutex<LruCache<FileSignature, Vec<Declaration>>>,
    definitions: Mutex<LruCache<DefinitionKey, Vec<Location>>>,
    last_used: Mutex<Instant>,
    requests: AtomicUsize,
    failures: AtomicUsize,
    retired: AtomicBool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Session {
    pub(crate) fn new(
        language: Language,
        root: PathBuf,
        backend: Arc<dyn SemanticBackend>,
        outline_cache: usize,
        definition_cache: usize,
    ) -> Self {
        Self {
            language,
            root,
            backend,
            outlines: Mutex::new(LruCache::new(outline_cache)),
            definitions: Mutex::new(LruCache::new(definition_cache)),
            last_used: Mutex::new(Instant::now()),
            requests: AtomicUsize::new(0),
            failures: AtomicUsize::new(0),
            retired: AtomicBool::new(false),
        }
    }

    pub fn language(&self) -> Language {
        self.language
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Requests forwarded to the backend (cache misses only).
    pub fn backend_requests(&self) -> usize {
        self.requests.load(Ordering::Relaxed)
    }

    /// Failed backend requests since the last success.
    pub fn consecutive_failures(&self) -> usize {
        self.failures.load(Ordering::SeqCst)
    }

    pub fn is_retired(&self) -> bool {
        self.retired.load(Ordering::SeqCst)
    }

    pub fn idle_for(&self) -> Duration {
        lock(&self.last_used).elapsed()
    }

    fn touch(&self) {
        *lock(&self.last_used) = Instant::now();
    }

    pub fn outline_cache_stats(&self) -> CacheStats {
        lock(&self.outlines).stats()
    }

    pub fn definition_cache_stats(&self) -> CacheStats {
        lock(&self.definitions).stats()
    }

    fn ensure_live(&self) -> Result<(), SemanticError> {
        if self.is_retired() {
            return Err(SemanticError::Retired);
        }
        Ok(())
    }

    /// Run one backend request and keep the failure streak current.
    fn forward<T>(
        &self,
        request: impl FnOnce(&dyn SemanticBackend) -> Result<T, SemanticError>,
    ) -> Result<T, SemanticError> {
        match request(self.backend.as_ref()) {
            Ok(value) => {
                self.failures.store(0, Ordering::SeqCst);
                Ok(value)
            }
            // Our own shutdown, not a crash
            Err(err) if err.is_fatal() && self.is_retired() => Err(SemanticError::Retired),
            Err(err) => {
                if err.is_request_failure() {
                    self.failures.fetch_add(1, Ordering::SeqCst);
                }
                Err(err)
            }
        }
    }

    /// Outline of `path`, served from cache while the file is unchanged.
    pub fn outline(&self, path: &Path) -> Result<Vec<Declaration>, SemanticError> {
        self.ensure_live()?;
        self.touch();
        let signature = FileSignature::of(path)?;
        if let Some(hit) = lock(&self.outlines).get(&signature) {
            return Ok(hit.clone());
        }

        self.requests.fetch_add(1, Ordering::Relaxed);
        let declarations = self.forward(|backend| backend.outline(path))?;
        lock(&self.outlines).put(signature, declarations.clone());
        Ok(declarations)
    }

    /// Definitions for each position; only cache misses reach the backend.
    pub fn resolve_definitions(
        &self,
        path: &Path,
        positions: &[Position],
    ) -> Result<Vec<Vec<Location>>, SemanticError> {
        self.ensure_live()?;
        self.touch();
        let signature = FileSignature::of(path)?;
        let mut results: Vec<Option<Vec<Location>>> = vec![None; positions.len()];
        let mut missing: Vec<(usize, Position)> = Vec::new();
        {
            let mut cache = lock(&self.definitions);
            for (idx, pos) in positions.iter().enumerate() {
                let key = (signature.clone(), pos.line, pos.column);
                match cache.get(&key) {
                    Some(hit) => results[idx] = Some(hit.clone()),
                    None => missing.push((idx, *pos)),
                }
            }
        }

        if !missing.is_empty() {
            debug!(
                path = %path.display(),
                cached = positions.len() - missing.len(),
                requested = missing.len(),
                "resolving definitions"
            );
            self.requests.fetch_add(missing.len(), Ordering::Relaxed);
            let query: Vec<Position> = missing.iter().map(|(_, p)| *p).collect();
            let resolved = self.forward(|backend| backend.resolve_definitions(path, &query))?;
            let mut cache = lock(&self.definitions);
            for ((idx, pos), locations) in missing.into_iter().zip(resolved) {
                cache.put((signature.clone(), pos.line, pos.column), locations.clone());
                results[idx] = Some(locations);
            }
        }

        Ok(results.into_iter().map(|r| r.unwrap_or_default()).collect())
    }

    pub fn resolve_definition(
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

    /// Stop the backend for good. Requests still running on other threads
    /// see [`SemanticError::Retired`].
    pub(crate) fn retire(&self) {
        if self.retired.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!(language = %self.language, root = %self.root.display(), "shutting down session");
        self.backend.shutdown();
    }
}
