//! Session pool keyed by `(language, workspace root)`.
//!
//! The pool is the only way to obtain a [`Session`]. It guarantees at most
//! one live backend per key, caps the number of live sessions (least
//! recently used sessions are shut down beyond the cap), evicts idle
//! sessions on request, and memoizes failures so a workspace whose server is
//! missing, crashed or stuck costs a few attempts, not one per file.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tracing::{debug, info, warn};

use super::cache::LruCache;
use super::session::Session;
use super::{SemanticError, SessionFactory, UnavailableReason};
use crate::ingest::Language;

/// Consecutive timeouts or protocol errors after which a key is disabled.
pub const MAX_CONSECUTIVE_FAILURES: usize = 3;

/// Times a request is retried on a fresh session after its own was retired.
const RETIRED_RETRIES: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionKey {
    pub language: Language,
    pub root: PathBuf,
}

impl SessionKey {
    pub fn new(language: Language, root: &Path) -> Self {
        Self {
            language,
            root: root.to_path_buf(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PoolSettings {
    pub max_sessions: usize,
    pub outline_cache_size: usize,
    pub definition_cache_size: usize,
    /// Installed server executables; None means "look up at spawn time"
    pub available_binaries: Option<HashSet<String>>,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_sessions: 8,
            outline_cache_size: 4096,
            definition_cache_size: 65536,
            available_binaries: None,
        }
    }
}

struct PoolState {
    sessions: LruCache<SessionKey, Arc<Session>>,
    disabled: HashMap<SessionKey, UnavailableReason>,
}

pub struct SessionPool {
    factory: Arc<dyn SessionFactory>,
    settings: PoolSettings,
    state: Mutex<PoolState>,
    spawn_attempts: AtomicUsize,
}

impl SessionPool {
    pub fn new(factory: Arc<dyn SessionFactory>, settings: PoolSettings) -> Self {
        let state = PoolState {
            sessions: LruCache::new(settings.max_sessions),
            disabled: HashMap::new(),
        };
        Self {
            factory,
            settings,
            state: Mutex::new(state),
            spawn_attempts: AtomicUsize::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Session for `(language, root)`, starting it on first use.
    ///
    /// Spawning happens under the pool lock, so concurrent callers for the
    /// same key wait for one spawn instead of racing to start two processes.
    pub fn get(&self, language: Language, root: &Path) -> Result<Arc<Session>, SemanticError> {
        let key = SessionKey::new(language, root);
        let mut evicted = None;

        let result = {
            let mut state = self.lock();
            if let Some(reason) = state.disabled.get(&key) {
                return Err(SemanticError::Disabled(*reason));
            }
            if let Some(session) = state.sessions.get(&key) {
                return Ok(session.clone());
            }

            if let (Some(available), Some(command)) = (
                self.settings.available_binaries.as_ref(),
                self.factory.command_for(language),
            ) {
                if !available.contains(&command) {
                    info!(%language, root = %root.display(), %command, "language server not installed, using syntax backend");
                    state
                        .disabled
                        .insert(key, UnavailableReason::MissingBinary);
                    return Err(SemanticError::MissingBinary(command));
                }
            }

            self.spawn_attempts.fetch_add(1, Ordering::SeqCst);
            match self.factory.spawn(language, root) {
                Ok(backend) => {
                    info!(%language, root = %root.display(), "started semantic session");
                    let session = Arc::new(Session::new(
                        language,
                        root.to_path_buf(),
                        backend,
                        self.settings.outline_cache_size,
                        self.settings.definition_cache_size,
                    ));
                    evicted = state.sessions.put(key, session.clone());
                    Ok(session)
                }
                Err(err) => {
                    warn!(%language, root = %root.display(), error = %err, "semantic session unavailable, disabling for this workspace");
                    state.disabled.insert(key, err.reason());
                    Err(err)
                }
            }
        };

        if let Some((old_key, old)) = evicted {
            debug!(language = %old_key.language, root = %old_key.root.display(), "session cap reached, evicting least recently used");
            old.retire();
        }
        result
    }

    /// Run `request` against the session for `(language, root)`.
    ///
    /// A request whose session was evicted mid-flight is retried on a fresh
    /// one. Any other failure is reported so a crashed or stuck server is
    /// disabled for its workspace.
    pub fn with_session<T>(
        &self,
        language: Language,
        root: &Path,
        request: impl Fn(&Session) -> Result<T, SemanticError>,
    ) -> Result<T, SemanticError> {
        let mut retries = 0;
        loop {
            let session = self.get(language, root)?;
            match request(session.as_ref()) {
                Err(SemanticError::Retired) if retries < RETIRED_RETRIES => {
                    debug!(%language, root = %root.display(), "session retired mid-request, retrying");
                    retries += 1;
                }
                Err(err) => {
                    self.report_failure(&session, &err);
                    return Err(err);
                }
                Ok(value) => return Ok(value),
            }
        }
    }

    /// Disable the session's key if `err` shows its server is unusable.
    ///
    /// A crash disables at once; timeouts and protocol errors do after
    /// [`MAX_CONSECUTIVE_FAILURES`] in a row. Retired sessions are ignored.
    pub fn report_failure(&self, session: &Arc<Session>, err: &SemanticError) {
        if session.is_retired() {
            return;
        }
        let exhausted = err.is_request_failure()
            && session.consecutive_failures() >= MAX_CONSECUTIVE_FAILURES;
        if err.is_fatal() || exhausted {
            self.invalidate(session, err.reason());
        }
    }

    /// Retire `session` and keep its key disabled.
    ///
    /// Nothing happens when the pool already holds a different session for
    /// the key, or when `session` was retired by eviction: the failure
    /// belongs to a backend the pool no longer serves.
    pub fn invalidate(&self, session: &Arc<Session>, reason: UnavailableReason) {
        let key = SessionKey::new(session.language(), session.root());
        {
            let mut state = self.lock();
            let stale = match state.sessions.peek(&key) {
                Some(current) => !Arc::ptr_eq(current, session),
                None => session.is_retired(),
            };
            if stale {
                return;
            }
            state.sessions.remove(&key);
            state.disabled.insert(key, reason);
        }
        warn!(language = %session.language(), root = %session.root().display(), %reason, "invalidated semantic session");
        session.retire();
    }

    /// Shut down sessions unused for longer than `ttl`. Returns how many.
    pub fn evict_idle(&self, ttl: Duration) -> usize {
        let expired = self
            .lock()
            .sessions
            .remove_where(|_, session| session.idle_for() > ttl);
        for (key, session) in &expired {
            debug!(language = %key.language, root = %key.root.display(), "evicting idle session");
            session.retire();
        }
        expired.len()
    }

    /// Memoized failure for a key, if any.
    pub fn disabled_reason(&self, language: Language, root: &Path) -> Option<UnavailableReason> {
        self.lock()
            .disabled
            .get(&SessionKey::new(language, root))
            .copied()
    }

    /// Forget memoized failures, e.g. after installing a server.
    pub fn clear_disabled(&self) {
        self.lock().disabled.clear();
    }

    pub fn spawn_attempts(&self) -> usize {
        self.spawn_attempts.load(Ordering::SeqCst)
    }

    pub fn live_sessions(&self) -> usize {
        self.lock().sessions.len()
    }

    pub fn shutdown_all(&self) {
        let sessions = self.lock().sessions.drain();
        for (_, session) in sessions {
            session.retire();
        }
    }
}

impl Drop for SessionPool {
    fn drop(&mut self) {
        self.shutdown_all();
    }
}
