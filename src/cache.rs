//! Session-scoped project file cache with write-through to the session store.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::Error;
use crate::store::{Namespace, SessionStore};
use crate::types::{FileMap, ProjectFile};

/// Path → file map for one session.
///
/// Readers take an `Arc` snapshot, so a `bulk_replace` is observed either
/// entirely or not at all. Every write recomputes the content hash.
pub struct ProjectFileCache {
    /// Current snapshot.
    files: RwLock<Arc<FileMap>>,
    /// Owning session.
    session: String,
    /// Backing store for write-through persistence.
    store: Arc<dyn SessionStore>,
}

impl std::fmt::Debug for ProjectFileCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        return f
            .debug_struct("ProjectFileCache")
            .field("session", &self.session)
            .field("files", &self.files.read().len())
            .finish_non_exhaustive();
    }
}

impl ProjectFileCache {
    /// Load the session's cache from the store, or start empty.
    ///
    /// Never fails: an unreachable store, a missing document, or a document
    /// whose hashes don't match its contents all yield an empty cache, which
    /// forces a fresh scan downstream.
    pub fn hydrate(session: &str, store: Arc<dyn SessionStore>) -> Self {
        let files = match load_files(session, store.as_ref()) {
            Ok(files) => files,
            Err(e) => {
                tracing::warn!(session, error = %e, "file cache unavailable, starting empty");
                FileMap::new()
            },
        };
        tracing::debug!(session, files = files.len(), "file cache hydrated");
        return Self {
            files: RwLock::new(Arc::new(files)),
            session: session.to_string(),
            store,
        };
    }

    /// Replace the whole map in one step.
    pub fn bulk_replace(&self, files: FileMap) {
        let snapshot = Arc::new(files);
        *self.files.write() = Arc::clone(&snapshot);
        self.persist(&snapshot);
    }

    /// Look up a single file.
    pub fn file(&self, path: &Path) -> Option<ProjectFile> {
        return self.files.read().get(path).cloned();
    }

    /// Snapshot of every cached file.
    pub fn get(&self) -> Arc<FileMap> {
        return Arc::clone(&self.files.read());
    }

    /// Drop every cached file for this session, locally and in the store.
    pub fn invalidate(&self) {
        *self.files.write() = Arc::new(FileMap::new());
        if let Err(e) = self.store.delete(&self.session, Namespace::Files) {
            tracing::warn!(session = %self.session, error = %e, "could not delete stored file cache");
        }
    }

    /// Whether nothing is cached.
    pub fn is_empty(&self) -> bool {
        return self.files.read().is_empty();
    }

    /// Insert or overwrite one file. The stored record is rebuilt from
    /// `content`, so its hash always matches.
    pub fn put(&self, path: impl Into<PathBuf>, content: impl Into<String>) -> ProjectFile {
        let file = ProjectFile::new(path, content);
        let snapshot = {
            let mut guard = self.files.write();
            Arc::make_mut(&mut *guard).insert(file.path.clone(), file.clone());
            Arc::clone(&guard)
        };
        self.persist(&snapshot);
        return file;
    }

    /// Owning session id.
    pub fn session(&self) -> &str {
        return &self.session;
    }

    /// Write the snapshot through to the store. Failures are logged, not raised.
    fn persist(&self, snapshot: &FileMap) {
        let result = serde_json::to_string(snapshot)
            .map_err(Error::from)
            .and_then(|doc| return self.store.set(&self.session, Namespace::Files, &doc));
        if let Err(e) = result {
            tracing::warn!(session = %self.session, error = %e, "file cache not persisted");
        }
    }
}

/// Read and verify the stored file map.
///
/// # Errors
///
/// Returns `Error::CacheUnavailable` when the store fails, the document is
/// malformed, or any entry's hash disagrees with its content.
fn load_files(session: &str, store: &dyn SessionStore) -> Result<FileMap, Error> {
    let unavailable = |reason: String| {
        return Error::CacheUnavailable {
            reason,
            session: session.to_string(),
        };
    };

    let Some(document) = store.get(session, Namespace::Files).map_err(|e| return unavailable(e.to_string()))? else {
        return Ok(FileMap::new());
    };
    let files: FileMap = serde_json::from_str(&document).map_err(|e| return unavailable(e.to_string()))?;
    if let Some(bad) = files.values().find(|f| return !f.is_consistent() || f.path.as_os_str().is_empty()) {
        return Err(unavailable(format!("hash mismatch for {}", bad.path.display())));
    }
    return Ok(files);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    /// A store whose every call fails.
    struct DownStore;

    impl SessionStore for DownStore {
        fn delete(&self, session: &str, _namespace: Namespace) -> Result<(), Error> {
            Err(Error::CacheUnavailable { reason: "down".to_string(), session: session.to_string() })
        }

        fn get(&self, session: &str, _namespace: Namespace) -> Result<Option<String>, Error> {
            Err(Error::CacheUnavailable { reason: "down".to_string(), session: session.to_string() })
        }

        fn set(&self, session: &str, _namespace: Namespace, _document: &str) -> Result<(), Error> {
            Err(Error::CacheUnavailable { reason: "down".to_string(), session: session.to_string() })
        }
    }

    #[test]
    fn read_after_write_and_hash_consistency() {
        let cache = ProjectFileCache::hydrate("s", Arc::new(MemoryStore::new()));
        cache.put("src/App.tsx", "one");
        cache.put("src/App.tsx", "two");
        let file = cache.file(Path::new("src/App.tsx")).unwrap();
        assert_eq!(file.content, "two");
        assert!(cache.get().values().all(ProjectFile::is_consistent));
    }

    #[test]
    fn hydrate_restores_persisted_files() {
        let store: Arc<dyn SessionStore> = Arc::new(MemoryStore::new());
        ProjectFileCache::hydrate("s", Arc::clone(&store)).put("src/main.tsx", "x");
        let again = ProjectFileCache::hydrate("s", Arc::clone(&store));
        assert_eq!(again.get().len(), 1);
        let other = ProjectFileCache::hydrate("t", store);
        assert!(other.is_empty());
    }

    #[test]
    fn unavailable_store_degrades_to_empty() {
        let cache = ProjectFileCache::hydrate("s", Arc::new(DownStore));
        assert!(cache.is_empty());
        cache.put("a.ts", "let a = 1;");
        assert_eq!(cache.get().len(), 1);
    }

    #[test]
    fn tampered_document_is_discarded() {
        let store: Arc<dyn SessionStore> = Arc::new(MemoryStore::new());
        ProjectFileCache::hydrate("s", Arc::clone(&store)).put("a.ts", "original");
        let doc = store.get("s", Namespace::Files).unwrap().unwrap();
        store.set("s", Namespace::Files, &doc.replace("original", "edited")).unwrap();
        assert!(ProjectFileCache::hydrate("s", store).is_empty());
    }

    #[test]
    fn snapshot_is_unaffected_by_bulk_replace() {
        let cache = ProjectFileCache::hydrate("s", Arc::new(MemoryStore::new()));
        cache.put("a.ts", "a");
        let before = cache.get();
        let mut next = FileMap::new();
        next.insert(PathBuf::from("b.ts"), ProjectFile::new("b.ts", "b"));
        cache.bulk_replace(next);
        assert!(before.contains_key(Path::new("a.ts")));
        assert!(cache.file(Path::new("a.ts")).is_none());
        assert!(cache.file(Path::new("b.ts")).is_some());
    }

    #[test]
    fn invalidate_clears_store() {
        let store: Arc<dyn SessionStore> = Arc::new(MemoryStore::new());
        let cache = ProjectFileCache::hydrate("s", Arc::clone(&store));
        cache.put("a.ts", "a");
        cache.invalidate();
        assert!(cache.is_empty());
        assert_eq!(store.get("s", Namespace::Files).unwrap(), None);
    }
}
