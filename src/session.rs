//! Session registry: per-session cache, history, and context with TTL expiry.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::cache::ProjectFileCache;
use crate::error::Error;
use crate::history::ModificationHistory;
use crate::store::{self, Namespace, SessionStore};
use crate::types::Strategy;

/// Where a request is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "phase")]
pub enum Phase {
    /// Cache is populated (possibly empty).
    CacheReady,
    /// A scope was chosen.
    Classified,
    /// Finished.
    Done {
        /// Whether a change was committed.
        success: bool,
    },
    /// An executor is running.
    Executing {
        /// The running executor.
        strategy: Strategy,
    },
    /// Request accepted, nothing loaded yet.
    Init,
}

/// Bookkeeping for one editing session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionContext {
    /// Working root the session edits.
    pub build_directory: PathBuf,
    /// Rendered structure summary from the latest request.
    pub cached_summary: Option<String>,
    /// Time of the latest phase transition.
    pub last_activity: DateTime<Utc>,
    /// Current lifecycle phase.
    pub phase: Phase,
    /// Requests started in this session. Only ever incremented.
    pub request_count: u64,
    /// Session key.
    pub session_id: String,
}

impl SessionContext {
    /// Fresh context for a new session.
    pub fn new(session_id: &str, build_directory: &Path) -> Self {
        return Self {
            build_directory: build_directory.to_path_buf(),
            cached_summary: None,
            last_activity: Utc::now(),
            phase: Phase::Init,
            request_count: 0,
            session_id: session_id.to_string(),
        };
    }
}

/// All state scoped to one session key.
pub struct Session {
    /// Cached project files.
    pub cache: ProjectFileCache,
    /// Lifecycle bookkeeping.
    context: Mutex<SessionContext>,
    /// Change log.
    pub history: ModificationHistory,
    /// Store the context is persisted to.
    store: Arc<dyn SessionStore>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        return f
            .debug_struct("Session")
            .field("context", &*self.context.lock())
            .field("cache", &self.cache)
            .field("history", &self.history)
            .finish_non_exhaustive();
    }
}

impl Session {
    /// Snapshot of the context.
    pub fn context(&self) -> SessionContext {
        return self.context.lock().clone();
    }

    /// Session key.
    pub fn id(&self) -> String {
        return self.context.lock().session_id.clone();
    }

    /// Count a new request and move to `Init`.
    pub fn begin_request(&self) -> u64 {
        let count = {
            let mut context = self.context.lock();
            context.request_count = context.request_count.saturating_add(1);
            context.request_count
        };
        self.transition(Phase::Init);
        return count;
    }

    /// Remember the rendered structure summary.
    pub fn set_summary(&self, summary: String) {
        self.context.lock().cached_summary = Some(summary);
        self.persist();
    }

    /// Record a phase transition and touch `last_activity`.
    pub fn transition(&self, phase: Phase) {
        {
            let mut context = self.context.lock();
            tracing::debug!(session = %context.session_id, from = ?context.phase, to = ?phase, "phase transition");
            context.phase = phase;
            context.last_activity = Utc::now();
        }
        self.persist();
    }

    /// Write the context through to the store. Failures are logged.
    fn persist(&self) {
        let context = self.context();
        let result = serde_json::to_string(&context)
            .map_err(Error::from)
            .and_then(|doc| return self.store.set(&context.session_id, Namespace::Metadata, &doc));
        if let Err(e) = result {
            tracing::warn!(session = %context.session_id, error = %e, "session metadata not persisted");
        }
    }
}

/// Owns every live session. Callers serialize requests per session; the
/// registry only guards its own map.
pub struct SessionRegistry {
    /// Live sessions by key.
    sessions: Mutex<HashMap<String, Arc<Session>>>,
    /// Backing store for cache, history, and metadata.
    store: Arc<dyn SessionStore>,
    /// Idle time after which a session expires.
    ttl: Duration,
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        return f
            .debug_struct("SessionRegistry")
            .field("sessions", &self.sessions.lock().len())
            .field("ttl", &self.ttl)
            .finish_non_exhaustive();
    }
}

impl SessionRegistry {
    /// A registry over `store` expiring sessions idle for `ttl_secs`.
    pub fn new(store: Arc<dyn SessionStore>, ttl_secs: u64) -> Self {
        let ttl = Duration::seconds(i64::try_from(ttl_secs).unwrap_or(i64::MAX));
        return Self {
            sessions: Mutex::new(HashMap::new()),
            store,
            ttl,
        };
    }

    /// Tear down one session: cache, history, and metadata are dropped from
    /// memory and the store. Returns whether the session was live.
    pub fn cleanup(&self, session_id: &str) -> bool {
        let removed = self.sessions.lock().remove(session_id);
        match &removed {
            Some(session) => {
                session.cache.invalidate();
                session.history.clear();
                self.purge_stored(session_id, &[Namespace::Metadata]);
            },
            None => self.purge_stored(session_id, &[Namespace::Files, Namespace::History, Namespace::Metadata]),
        }
        tracing::info!(session = session_id, live = removed.is_some(), "session cleaned up");
        return removed.is_some();
    }

    /// A live session, if any.
    pub fn get(&self, session_id: &str) -> Option<Arc<Session>> {
        return self.sessions.lock().get(session_id).cloned();
    }

    /// Get or create the session for `session_id`, bound to `build_directory`.
    ///
    /// A new session restores its cache, history, and context from the
    /// store, unless the stored session sat idle past the TTL, in which case
    /// it is torn down and started fresh. A live session past the TTL is torn
    /// down the same way. Rebinding a session to a different directory
    /// invalidates its cache.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidSessionId` if the key is unusable.
    pub fn open(&self, session_id: &str, build_directory: &Path) -> Result<Arc<Session>, Error> {
        store::validate_session_id(session_id)?;
        let now = Utc::now();
        if self.get(session_id).is_some_and(|s| return self.is_expired(&s.context(), now)) {
            tracing::info!(session = session_id, "session expired, starting fresh");
            self.cleanup(session_id);
        }

        let mut sessions = self.sessions.lock();
        if let Some(existing) = sessions.get(session_id) {
            let rebound = {
                let mut context = existing.context.lock();
                let changed = context.build_directory != build_directory;
                context.build_directory = build_directory.to_path_buf();
                changed
            };
            if rebound {
                tracing::info!(session = session_id, dir = %build_directory.display(), "session rebound, invalidating cache");
                existing.cache.invalidate();
            }
            return Ok(Arc::clone(existing));
        }

        let mut context = match self.load_context(session_id) {
            Some(stored) if self.is_expired(&stored, now) => {
                tracing::info!(session = session_id, idle_since = %stored.last_activity, "stored session expired, starting fresh");
                self.purge_stored(session_id, &[Namespace::Files, Namespace::History, Namespace::Metadata]);
                SessionContext::new(session_id, build_directory)
            },
            Some(stored) => stored,
            None => SessionContext::new(session_id, build_directory),
        };
        let cache = ProjectFileCache::hydrate(session_id, Arc::clone(&self.store));
        if context.build_directory != build_directory {
            cache.invalidate();
            context.build_directory = build_directory.to_path_buf();
        }
        context.last_activity = now;

        let session = Arc::new(Session {
            cache,
            context: Mutex::new(context),
            history: ModificationHistory::load(session_id, Arc::clone(&self.store)),
            store: Arc::clone(&self.store),
        });
        sessions.insert(session_id.to_string(), Arc::clone(&session));
        tracing::debug!(session = session_id, "session opened");
        return Ok(session);
    }

    /// Every live session bound to `build_directory`.
    pub fn sessions_for_directory(&self, build_directory: &Path) -> Vec<Arc<Session>> {
        let mut matching: Vec<Arc<Session>> = self
            .sessions
            .lock()
            .values()
            .filter(|s| return s.context.lock().build_directory == build_directory)
            .cloned()
            .collect();
        matching.sort_by_key(|s| return s.id());
        return matching;
    }

    /// Tear down every session idle longer than the TTL at `now`.
    /// Returns the keys that were removed.
    pub fn sweep_expired(&self, now: DateTime<Utc>) -> Vec<String> {
        let expired: Vec<String> = self
            .sessions
            .lock()
            .iter()
            .filter(|(_, s)| return self.is_expired(&s.context.lock(), now))
            .map(|(id, _)| return id.clone())
            .collect();
        for id in &expired {
            self.cleanup(id);
        }
        return expired;
    }

    /// Whether `context` has been idle longer than the TTL at `now`.
    fn is_expired(&self, context: &SessionContext, now: DateTime<Utc>) -> bool {
        return now.signed_duration_since(context.last_activity) > self.ttl;
    }

    /// Delete stored documents of a session. Failures are logged.
    fn purge_stored(&self, session_id: &str, namespaces: &[Namespace]) {
        for &namespace in namespaces {
            if let Err(e) = self.store.delete(session_id, namespace) {
                tracing::warn!(session = session_id, error = %e, "could not delete stored {namespace}");
            }
        }
    }

    /// Restore a persisted context, if readable.
    fn load_context(&self, session_id: &str) -> Option<SessionContext> {
        let document = match self.store.get(session_id, Namespace::Metadata) {
            Ok(doc) => doc?,
            Err(e) => {
                tracing::warn!(session = session_id, error = %e, "session metadata unavailable");
                return None;
            },
        };
        return serde_json::from_str(&document).ok();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[test]
    fn request_count_is_monotonic_across_reopen() {
        let store: Arc<dyn SessionStore> = Arc::new(MemoryStore::new());
        let registry = SessionRegistry::new(Arc::clone(&store), 60);
        let session = registry.open("s1", Path::new("/tmp/p")).unwrap();
        assert_eq!(session.begin_request(), 1);
        assert_eq!(session.begin_request(), 2);

        let fresh = SessionRegistry::new(store, 60);
        let reopened = fresh.open("s1", Path::new("/tmp/p")).unwrap();
        assert_eq!(reopened.begin_request(), 3);
    }

    #[test]
    fn sweep_removes_idle_sessions_only() {
        let registry = SessionRegistry::new(Arc::new(MemoryStore::new()), 60);
        registry.open("old", Path::new("/p")).unwrap();
        registry.open("new", Path::new("/p")).unwrap();
        registry.get("old").unwrap().context.lock().last_activity = Utc::now() - Duration::seconds(120);

        let removed = registry.sweep_expired(Utc::now());
        assert_eq!(removed, vec!["old".to_string()]);
        assert!(registry.get("old").is_none());
        assert!(registry.get("new").is_some());
    }

    #[test]
    fn stored_session_past_ttl_starts_fresh() {
        let store: Arc<dyn SessionStore> = Arc::new(MemoryStore::new());
        let registry = SessionRegistry::new(Arc::clone(&store), 60);
        let session = registry.open("s1", Path::new("/p")).unwrap();
        session.begin_request();
        session.cache.put("src/App.tsx", "export const A = 1;\n");
        session.context.lock().last_activity = Utc::now() - Duration::days(10);
        session.persist();

        let fresh = SessionRegistry::new(store, 60);
        let reopened = fresh.open("s1", Path::new("/p")).unwrap();
        assert!(reopened.cache.is_empty());
        assert_eq!(reopened.context().request_count, 0);
        assert_eq!(reopened.context().phase, Phase::Init);
    }

    #[test]
    fn live_session_past_ttl_is_replaced_on_open() {
        let registry = SessionRegistry::new(Arc::new(MemoryStore::new()), 60);
        let session = registry.open("s1", Path::new("/p")).unwrap();
        session.cache.put("src/App.tsx", "export const A = 1;\n");
        session.context.lock().last_activity = Utc::now() - Duration::seconds(120);

        let reopened = registry.open("s1", Path::new("/p")).unwrap();
        assert!(!Arc::ptr_eq(&session, &reopened));
        assert!(reopened.cache.is_empty());
    }

    #[test]
    fn stored_session_within_ttl_is_restored() {
        let store: Arc<dyn SessionStore> = Arc::new(MemoryStore::new());
        let registry = SessionRegistry::new(Arc::clone(&store), 60);
        registry.open("s1", Path::new("/p")).unwrap().cache.put("src/App.tsx", "export const A = 1;\n");

        let fresh = SessionRegistry::new(store, 60);
        assert!(!fresh.open("s1", Path::new("/p")).unwrap().cache.is_empty());
    }

    #[test]
    fn directory_lookup_returns_every_match() {
        let registry = SessionRegistry::new(Arc::new(MemoryStore::new()), 60);
        registry.open("a", Path::new("/p")).unwrap();
        registry.open("b", Path::new("/p")).unwrap();
        registry.open("c", Path::new("/q")).unwrap();
        let ids: Vec<String> = registry.sessions_for_directory(Path::new("/p")).iter().map(|s| s.id()).collect();
        assert_eq!(ids, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn rebinding_invalidates_cache() {
        let registry = SessionRegistry::new(Arc::new(MemoryStore::new()), 60);
        let session = registry.open("a", Path::new("/p")).unwrap();
        session.cache.put("src/a.ts", "x");
        let same = registry.open("a", Path::new("/p")).unwrap();
        assert!(!same.cache.is_empty());
        let moved = registry.open("a", Path::new("/q")).unwrap();
        assert!(moved.cache.is_empty());
    }

    #[test]
    fn invalid_ids_are_rejected() {
        let registry = SessionRegistry::new(Arc::new(MemoryStore::new()), 60);
        assert!(registry.open("a/b", Path::new("/p")).is_err());
    }
}
