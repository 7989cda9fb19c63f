//! Strategy executors: one trait per strategy plus the default implementations.
//!
//! Every executor writes through `commit_file`, which puts the file on disk
//! before updating the cache, so the cache never holds content that was not
//! written.

mod component;
mod nodes;
mod placeholder;
mod regen;
mod text;
mod tokens;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub use component::{ComponentSynthesisExecutor, apply_integration};
pub use nodes::NodeEditExecutor;
pub use placeholder::write_placeholder;
pub use regen::WholeFileRegenExecutor;
pub use text::{TextReplaceExecutor, count_occurrences};
pub use tokens::DesignTokenExecutor;

use crate::cache::ProjectFileCache;
use crate::config::Config;
use crate::error::Error;
use crate::project_history::ProjectHistory;
use crate::synthesis::Synthesizer;
use crate::types::{CancelFlag, ChangeType, ModificationRequest, ProjectStructureMap, TargetNode, TextChange, TokenChange};
use crate::workspace::Workspace;

/// Everything an executor may touch during one request.
#[derive(Clone, Copy)]
pub struct ExecutionContext<'a> {
    /// Session file cache.
    pub cache: &'a ProjectFileCache,
    /// Cooperative cancellation, checked between items.
    pub cancel: &'a CancelFlag,
    /// Project configuration.
    pub config: &'a Config,
    /// Earlier generation output.
    pub project_history: &'a dyn ProjectHistory,
    /// The request being served.
    pub request: &'a ModificationRequest,
    /// Current structure map.
    pub structure: &'a ProjectStructureMap,
    /// Structure summary, project description, and recent history, rendered.
    pub summary: &'a str,
    /// Code-synthesis collaborator.
    pub synthesizer: &'a dyn Synthesizer,
    /// On-disk working root.
    pub workspace: &'a Workspace,
}

impl std::fmt::Debug for ExecutionContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        return f
            .debug_struct("ExecutionContext")
            .field("cache", &self.cache)
            .field("workspace", &self.workspace)
            .finish_non_exhaustive();
    }
}

/// What one executor run did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionReport {
    /// Human-readable summary of the run.
    pub detail: String,
    /// Files written that did not exist before.
    pub files_added: Vec<PathBuf>,
    /// Existing files that were changed.
    pub files_modified: Vec<PathBuf>,
    /// Occurrences of the primary search term after a text replace.
    pub occurrences_after: usize,
    /// Occurrences of the primary search term before a text replace.
    pub occurrences_before: usize,
    /// Per-file replacement counts of a text replace.
    pub replacement_counts: BTreeMap<PathBuf, usize>,
    /// Items that were skipped, with the reason.
    pub skipped: Vec<String>,
    /// Whether at least one change was committed.
    pub success: bool,
}

impl ExecutionReport {
    /// Note a committed file, once.
    pub fn record(&mut self, path: &Path, change: ChangeType) {
        let list = match change {
            ChangeType::Created => &mut self.files_added,
            ChangeType::Modified | ChangeType::Phase | ChangeType::Updated => &mut self.files_modified,
        };
        if !list.iter().any(|p| return p == path) {
            list.push(path.to_path_buf());
        }
    }

    /// Note a skipped item.
    pub fn skip(&mut self, reason: String) {
        tracing::debug!(%reason, "item skipped");
        self.skipped.push(reason);
    }
}

/// Literal find-and-replace over cached files.
pub trait TextReplace: Send + Sync {
    /// Replace every occurrence of the term and its variations.
    ///
    /// # Errors
    ///
    /// Request-level failures only; per-file problems are reported as skips.
    fn execute(&self, ctx: &ExecutionContext<'_>, change: &TextChange) -> Result<ExecutionReport, Error>;
}

/// Structural edits at re-resolved nodes.
pub trait NodeEdit: Send + Sync {
    /// Edit each target that still resolves.
    ///
    /// # Errors
    ///
    /// Request-level failures only; stale targets are reported as skips.
    fn execute(&self, ctx: &ExecutionContext<'_>, targets: &[TargetNode]) -> Result<ExecutionReport, Error>;
}

/// New unit synthesis plus integration.
pub trait ComponentSynthesis: Send + Sync {
    /// Synthesize the unit, then splice it into the project.
    ///
    /// # Errors
    ///
    /// Returns `Error::SynthesisFailed` for an unusable plan.
    fn execute(&self, ctx: &ExecutionContext<'_>) -> Result<ExecutionReport, Error>;
}

/// Token file and global stylesheet rewrite.
pub trait DesignTokens: Send + Sync {
    /// Rewrite both files or neither.
    ///
    /// # Errors
    ///
    /// Returns `Error::SynthesisFailed` when either file cannot be produced.
    fn execute(&self, ctx: &ExecutionContext<'_>, change: &TokenChange) -> Result<ExecutionReport, Error>;
}

/// Whole-file regeneration.
pub trait WholeFileRegen: Send + Sync {
    /// Regenerate the most relevant files, preferring `hints`.
    ///
    /// # Errors
    ///
    /// Returns `Error::SynthesisFailed` when nothing usable came back.
    fn execute(&self, ctx: &ExecutionContext<'_>, hints: &[PathBuf]) -> Result<ExecutionReport, Error>;
}

/// Write `content` to disk, then to the cache. Reports whether the file is new.
///
/// # Errors
///
/// Returns `Error::WriteFailed` or `Error::PathOutsideRoot`; the cache is
/// untouched then.
pub fn commit_file(ctx: &ExecutionContext<'_>, path: &Path, content: &str) -> Result<ChangeType, Error> {
    let existed = ctx.cache.file(path).is_some() || ctx.workspace.exists(path);
    ctx.workspace.write(path, content)?;
    ctx.cache.put(path, content);
    tracing::debug!(file = %path.display(), existed, "file committed");
    return Ok(if existed { ChangeType::Modified } else { ChangeType::Created });
}

/// Lowercase words of four letters or more, used to rank files.
fn request_keywords(text: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for word in text.split(|c: char| return !c.is_alphanumeric()) {
        let word = word.to_lowercase();
        if word.len() >= 4 && !out.contains(&word) {
            out.push(word);
        }
    }
    return out;
}
