//! Append-only per-session modification log.
//!
//! Best-effort: entries are written through to the session store, but a crash
//! can lose entries that were never persisted.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::store::{Namespace, SessionStore};
use crate::types::{ChangeType, ModificationChange};

/// One session's change log.
pub struct ModificationHistory {
    /// Entries in append order.
    entries: RwLock<Vec<ModificationChange>>,
    /// Owning session.
    session: String,
    /// Backing store.
    store: Arc<dyn SessionStore>,
}

impl std::fmt::Debug for ModificationHistory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        return f
            .debug_struct("ModificationHistory")
            .field("session", &self.session)
            .field("entries", &self.entries.read().len())
            .finish_non_exhaustive();
    }
}

impl ModificationHistory {
    /// Load the session's log from the store, or start empty if it is
    /// missing, unreadable, or the store is down.
    pub fn load(session: &str, store: Arc<dyn SessionStore>) -> Self {
        let entries = match store.get(session, Namespace::History) {
            Ok(Some(doc)) => serde_json::from_str(&doc).unwrap_or_else(|e| {
                tracing::warn!(session, error = %e, "discarding unreadable history");
                Vec::new()
            }),
            Ok(None) => Vec::new(),
            Err(e) => {
                tracing::warn!(session, error = %e, "history unavailable, starting empty");
                Vec::new()
            },
        };
        return Self {
            entries: RwLock::new(entries),
            session: session.to_string(),
            store,
        };
    }

    /// Append one entry and write the log through to the store.
    pub fn append(&self, change: ModificationChange) {
        let document = {
            let mut entries = self.entries.write();
            entries.push(change);
            serde_json::to_string(&*entries)
        };
        let result = document
            .map_err(crate::error::Error::from)
            .and_then(|doc| return self.store.set(&self.session, Namespace::History, &doc));
        if let Err(e) = result {
            tracing::warn!(session = %self.session, error = %e, "history entry not persisted");
        }
    }

    /// Drop the log, locally and in the store.
    pub fn clear(&self) {
        self.entries.write().clear();
        if let Err(e) = self.store.delete(&self.session, Namespace::History) {
            tracing::warn!(session = %self.session, error = %e, "could not delete stored history");
        }
    }

    /// Copy of every entry, oldest first.
    pub fn entries(&self) -> Vec<ModificationChange> {
        return self.entries.read().clone();
    }

    /// Copy of the last `n` entries, oldest first.
    pub fn recent(&self, n: usize) -> Vec<ModificationChange> {
        let entries = self.entries.read();
        let start = entries.len().saturating_sub(n);
        return entries.get(start..).map(<[ModificationChange]>::to_vec).unwrap_or_default();
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        return self.entries.read().len();
    }

    /// Whether no entry was recorded yet.
    pub fn is_empty(&self) -> bool {
        return self.entries.read().is_empty();
    }

    /// Files ranked by how many successful entries touched them, most first.
    /// Ties are broken by path.
    pub fn most_modified_files(&self) -> Vec<(PathBuf, usize)> {
        return rank_files(&self.entries.read());
    }

    /// The last `n` entries rendered as compact lines for re-injection into
    /// the next classification.
    pub fn recent_summary(&self, n: usize) -> String {
        return render_recent(&self.entries.read(), n);
    }
}

/// Count successful per-file entries and sort.
fn rank_files(entries: &[ModificationChange]) -> Vec<(PathBuf, usize)> {
    let mut counts: HashMap<&PathBuf, usize> = HashMap::new();
    for entry in entries.iter().filter(|e| return e.success) {
        if let Some(file) = &entry.file {
            let count = counts.entry(file).or_insert(0);
            *count = count.saturating_add(1);
        }
    }
    let mut ranked: Vec<(PathBuf, usize)> = counts.into_iter().map(|(p, n)| return (p.clone(), n)).collect();
    ranked.sort_by(|a, b| return b.1.cmp(&a.1).then_with(|| return a.0.cmp(&b.0)));
    return ranked;
}

/// Render the last `n` entries, one line each. Phase entries are left out.
pub fn render_recent(entries: &[ModificationChange], n: usize) -> String {
    let shown: Vec<&ModificationChange> = entries.iter().filter(|e| return e.change_type != ChangeType::Phase).collect();
    if shown.is_empty() || n == 0 {
        return "No previous modifications.".to_string();
    }
    let start = shown.len().saturating_sub(n);
    return shown
        .iter()
        .skip(start)
        .map(|e| {
            let status = if e.success { "ok" } else { "failed" };
            let file = e
                .file
                .as_ref()
                .map_or_else(String::new, |f| return format!(" {}", f.display()));
            let approach = e.approach.map_or_else(|| return "UNCLASSIFIED".to_string(), |k| return k.to_string());
            return format!("- [{approach}] {:?}{file}: {} ({status})", e.change_type, e.description);
        })
        .collect::<Vec<_>>()
        .join("\n");
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::store::MemoryStore;
    use crate::types::{ChangeType, ScopeKind};

    fn change(file: Option<&str>, success: bool, description: &str) -> ModificationChange {
        ModificationChange {
            approach: Some(ScopeKind::TargetedNodes),
            change_type: if file.is_some() { ChangeType::Modified } else { ChangeType::Updated },
            description: description.to_string(),
            file: file.map(PathBuf::from),
            reasoning: String::new(),
            success,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn recent_summary_keeps_last_n() {
        let history = ModificationHistory::load("s", Arc::new(MemoryStore::new()));
        assert_eq!(history.recent_summary(5), "No previous modifications.");
        for i in 0..7 {
            history.append(change(Some("src/App.tsx"), true, &format!("edit {i}")));
        }
        let summary = history.recent_summary(5);
        assert_eq!(summary.lines().count(), 5);
        assert!(summary.starts_with("- [TARGETED_NODES] Modified src/App.tsx: edit 2 (ok)"));
        assert!(summary.ends_with("edit 6 (ok)"));
    }

    #[test]
    fn phase_entries_are_kept_but_not_rendered() {
        let history = ModificationHistory::load("s", Arc::new(MemoryStore::new()));
        let mut phase = change(None, true, "classified as FULL_FILE");
        phase.change_type = ChangeType::Phase;
        history.append(change(Some("src/App.tsx"), true, "edit"));
        history.append(phase);
        assert_eq!(history.recent(1).len(), 1);
        assert_eq!(history.recent(1)[0].change_type, ChangeType::Phase);
        assert_eq!(history.recent(10).len(), 2);
        assert_eq!(history.recent_summary(5), "- [TARGETED_NODES] Modified src/App.tsx: edit (ok)");
    }

    #[test]
    fn most_modified_ignores_failures_and_attempt_records() {
        let history = ModificationHistory::load("s", Arc::new(MemoryStore::new()));
        history.append(change(Some("b.ts"), true, "x"));
        history.append(change(Some("a.ts"), true, "x"));
        history.append(change(Some("b.ts"), true, "x"));
        history.append(change(Some("a.ts"), false, "x"));
        history.append(change(None, true, "attempt"));
        assert_eq!(
            history.most_modified_files(),
            vec![(PathBuf::from("b.ts"), 2), (PathBuf::from("a.ts"), 1)]
        );
    }

    #[test]
    fn history_survives_reload_until_cleared() {
        let store: Arc<dyn SessionStore> = Arc::new(MemoryStore::new());
        ModificationHistory::load("s", Arc::clone(&store)).append(change(None, false, "failed attempt"));
        let reloaded = ModificationHistory::load("s", Arc::clone(&store));
        assert_eq!(reloaded.len(), 1);
        reloaded.clear();
        assert!(ModificationHistory::load("s", store).is_empty());
    }
}
