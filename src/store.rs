//! Persistent session store: documents keyed by (session, namespace).

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

use parking_lot::Mutex;

use crate::error::Error;
use crate::hasher;

/// Kind of document stored per session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    /// Serialized file cache.
    Files,
    /// Serialized modification history.
    History,
    /// Serialized session context.
    Metadata,
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Files => "files",
            Self::History => "history",
            Self::Metadata => "metadata",
        };
        return f.write_str(name);
    }
}

/// Get/set/delete of opaque JSON documents. Implementations must keep sessions
/// isolated; callers treat every error as "store unavailable" and degrade.
pub trait SessionStore: Send + Sync {
    /// Remove a document. Removing a missing document is not an error.
    ///
    /// # Errors
    ///
    /// Returns `Error::CacheUnavailable` or `Error::Io` if the store cannot be reached.
    fn delete(&self, session: &str, namespace: Namespace) -> Result<(), Error>;

    /// Fetch a document, `None` if absent.
    ///
    /// # Errors
    ///
    /// Returns `Error::CacheUnavailable` or `Error::Io` if the store cannot be reached.
    fn get(&self, session: &str, namespace: Namespace) -> Result<Option<String>, Error>;

    /// Store a document, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns `Error::CacheUnavailable` or `Error::Io` if the store cannot be reached.
    fn set(&self, session: &str, namespace: Namespace, document: &str) -> Result<(), Error>;
}

/// Reject session ids that cannot be used as a single path component.
///
/// # Errors
///
/// Returns `Error::InvalidSessionId` for empty ids, separators, or dot segments.
pub fn validate_session_id(session: &str) -> Result<(), Error> {
    let valid = !session.is_empty()
        && session != "."
        && session != ".."
        && session
            .chars()
            .all(|c| return c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        return Ok(());
    }
    return Err(Error::InvalidSessionId {
        session: session.to_string(),
    });
}

/// In-process store. Lost on exit.
#[derive(Debug, Default)]
pub struct MemoryStore {
    /// Documents by key.
    documents: Mutex<HashMap<(String, Namespace), String>>,
}

impl MemoryStore {
    /// An empty store.
    pub fn new() -> Self {
        return Self::default();
    }
}

impl SessionStore for MemoryStore {
    fn delete(&self, session: &str, namespace: Namespace) -> Result<(), Error> {
        self.documents.lock().remove(&(session.to_string(), namespace));
        return Ok(());
    }

    fn get(&self, session: &str, namespace: Namespace) -> Result<Option<String>, Error> {
        return Ok(self.documents.lock().get(&(session.to_string(), namespace)).cloned());
    }

    fn set(&self, session: &str, namespace: Namespace, document: &str) -> Result<(), Error> {
        self.documents
            .lock()
            .insert((session.to_string(), namespace), document.to_string());
        return Ok(());
    }
}

/// Store backed by `<root>/<session>/<namespace>.json`.
/// A write is skipped when the stored document already has the same hash.
#[derive(Debug, Clone)]
pub struct FsStore {
    /// Directory holding one subdirectory per session.
    root: PathBuf,
}

impl FsStore {
    /// A store rooted at `root`. The directory is created lazily.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        return Self { root: root.into() };
    }

    /// Location of one document.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidSessionId` if the session id is unusable as a path.
    fn document_path(&self, session: &str, namespace: Namespace) -> Result<PathBuf, Error> {
        validate_session_id(session)?;
        return Ok(self.root.join(session).join(format!("{namespace}.json")));
    }
}

impl SessionStore for FsStore {
    fn delete(&self, session: &str, namespace: Namespace) -> Result<(), Error> {
        let path = self.document_path(session, namespace)?;
        return match std::fs::remove_file(&path) {
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Io(e)),
            Ok(()) => {
                // Drop the session directory once its last document is gone.
                if let Some(dir) = path.parent() {
                    let _ignored = std::fs::remove_dir(dir);
                }
                Ok(())
            },
        };
    }

    fn get(&self, session: &str, namespace: Namespace) -> Result<Option<String>, Error> {
        let path = self.document_path(session, namespace)?;
        return match std::fs::read_to_string(&path) {
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::Io(e)),
            Ok(content) => Ok(Some(content)),
        };
    }

    fn set(&self, session: &str, namespace: Namespace, document: &str) -> Result<(), Error> {
        let path = self.document_path(session, namespace)?;
        if let Ok(existing) = std::fs::read_to_string(&path) {
            if hasher::hash_content(&existing) == hasher::hash_content(document) {
                return Ok(());
            }
        }
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        std::fs::write(&path, document)?;
        return Ok(());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_store_isolates_sessions() {
        let store = MemoryStore::new();
        store.set("a", Namespace::Files, "{}").unwrap();
        assert_eq!(store.get("a", Namespace::Files).unwrap().as_deref(), Some("{}"));
        assert_eq!(store.get("b", Namespace::Files).unwrap(), None);
        assert_eq!(store.get("a", Namespace::History).unwrap(), None);
    }

    #[test]
    fn fs_store_round_trips_and_deletes() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::new(dir.path());
        store.set("s1", Namespace::History, "[]").unwrap();
        assert_eq!(store.get("s1", Namespace::History).unwrap().as_deref(), Some("[]"));
        store.delete("s1", Namespace::History).unwrap();
        assert_eq!(store.get("s1", Namespace::History).unwrap(), None);
        store.delete("s1", Namespace::History).unwrap();
    }

    #[test]
    fn fs_store_rejects_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::new(dir.path());
        let err = store.set("../escape", Namespace::Files, "{}").unwrap_err();
        assert!(matches!(err, Error::InvalidSessionId { .. }));
    }
}
