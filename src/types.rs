/// Core domain types for amend: cached files, structure maps, scopes, and changes.
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::hasher;

/// A content hash: 64 hex chars, always lowercase.
/// Newtype prevents mixing with arbitrary strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentHash(
    /// The hex-encoded SHA-256 digest string.
    pub String,
);

/// One file of the generated project as held by the session cache.
/// The hash is recomputed whenever content is set, never supplied by callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectFile {
    /// Full text of the file.
    pub content: String,
    /// Hash of `content` at the time it was set.
    pub content_hash: ContentHash,
    /// When the content was last set.
    pub last_modified: DateTime<Utc>,
    /// Path relative to the project root. Unique key within a session.
    pub path: PathBuf,
}

impl ProjectFile {
    /// Build a file record, hashing the content.
    pub fn new(path: impl Into<PathBuf>, content: impl Into<String>) -> Self {
        let content = content.into();
        return Self {
            content_hash: hasher::hash_content(&content),
            content,
            last_modified: Utc::now(),
            path: path.into(),
        };
    }

    /// Whether the stored hash matches the stored content.
    pub fn is_consistent(&self) -> bool {
        return self.content_hash == hasher::hash_content(&self.content);
    }
}

/// Path → file map. Ordered so scans, manifests, and reports are deterministic.
pub type FileMap = BTreeMap<PathBuf, ProjectFile>;

/// Coarse category of an import, inferred from the shape of its specifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportCategory {
    /// Database / backend client code (e.g. supabase, prisma).
    DataLayer,
    /// The UI framework and its router.
    Framework,
    /// Relative or alias-rooted project files.
    Local,
    /// The active styling framework (heuristic tag for stylesheets and configs).
    Styling,
    /// Anything else pulled from the package registry.
    ThirdParty,
}

/// Structural facts about one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    /// Best-effort name of the default export, if there is one.
    pub default_export: Option<String>,
    /// Every exported name, the default export's name included.
    pub exports: Vec<String>,
    /// File name without directories.
    pub file: String,
    /// Import categories in order of first appearance, deduplicated.
    pub imports: Vec<ImportCategory>,
    /// Why extraction failed, when it did. Imports and exports are empty then.
    pub parse_error: Option<String>,
    /// Path relative to the project root.
    pub path: PathBuf,
}

/// Aggregate numbers over the mapped tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructureSummary {
    /// Extension → file count.
    pub files_by_type: BTreeMap<String, usize>,
    /// Mirrors `StructureValidation::file_structure`.
    pub has_valid_structure: bool,
    /// Deepest path, in components.
    pub structure_depth: usize,
    /// Number of mapped files.
    pub total_files: usize,
}

/// Boolean health flags for the mapped tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructureValidation {
    /// A data-layer directory exists.
    pub data_layer_present: bool,
    /// The source layout is recognizable (a `src/` tree with an entry point).
    pub file_structure: bool,
    /// A styling framework config exists.
    pub styling_config_present: bool,
}

/// Output of a structure scan. Rebuilt wholesale, never patched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectStructureMap {
    /// Per-file facts, ordered by path.
    pub files: Vec<FileEntry>,
    /// Aggregates.
    pub summary: StructureSummary,
    /// Health flags.
    pub validation: StructureValidation,
}

impl ProjectStructureMap {
    /// Look up one file's entry.
    pub fn entry(&self, path: &Path) -> Option<&FileEntry> {
        return self.files.iter().find(|f| return f.path == path);
    }

    /// Whether any file name, path, or export mentions `needle` (case-insensitive).
    pub fn mentions(&self, needle: &str) -> bool {
        let needle = needle.to_lowercase();
        if needle.is_empty() {
            return false;
        }
        return self.files.iter().any(|f| {
            return f.path.to_string_lossy().to_lowercase().contains(&needle)
                || f.exports.iter().any(|e| return e.to_lowercase().contains(&needle));
        });
    }

    /// Compact text rendering handed to the classifier and the synthesis collaborator.
    pub fn render_summary(&self) -> String {
        let by_type = self
            .summary
            .files_by_type
            .iter()
            .map(|(ext, n)| return format!("{ext}:{n}"))
            .collect::<Vec<_>>()
            .join(", ");
        let mut out = format!(
            "{} files ({by_type}), depth {}, valid layout: {}, data layer: {}, styling config: {}\n",
            self.summary.total_files,
            self.summary.structure_depth,
            self.validation.file_structure,
            self.validation.data_layer_present,
            self.validation.styling_config_present,
        );
        for entry in &self.files {
            if entry.exports.is_empty() {
                out.push_str(&format!("- {}\n", entry.path.display()));
            } else {
                out.push_str(&format!("- {} exports {}\n", entry.path.display(), entry.exports.join(", ")));
            }
        }
        return out;
    }
}

/// Discriminant of `ModificationScope`, used in outcomes and history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScopeKind {
    /// New unit plus integration into existing files.
    ComponentAddition,
    /// Global visual token rewrite.
    DesignTokenChange,
    /// Whole-file regeneration.
    FullFile,
    /// AST-targeted edit.
    TargetedNodes,
    /// Literal find-and-replace.
    TextBasedChange,
}

impl fmt::Display for ScopeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ComponentAddition => "COMPONENT_ADDITION",
            Self::DesignTokenChange => "DESIGN_TOKEN_CHANGE",
            Self::FullFile => "FULL_FILE",
            Self::TargetedNodes => "TARGETED_NODES",
            Self::TextBasedChange => "TEXT_BASED_CHANGE",
        };
        return f.write_str(name);
    }
}

/// One extra spelling of the search term with its matching replacement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermVariation {
    /// Replacement text for this spelling.
    pub replacement: String,
    /// Spelling to search for.
    pub search: String,
}

/// Artifacts for a literal find-and-replace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextChange {
    /// Text that replaces every occurrence.
    pub replacement_term: String,
    /// Literal phrase to find.
    pub search_term: String,
    /// Other spellings (case, hyphenation) replaced alongside.
    pub variations: Vec<TermVariation>,
}

/// One step of a structural path: the node's kind, its position among its
/// parent's named children, and an identifying name when the node has one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathStep {
    /// Index among the parent's named children.
    pub index: usize,
    /// Tree-sitter node kind.
    pub kind: String,
    /// Declared name or element tag, used to re-find the node if siblings shifted.
    pub name: Option<String>,
}

/// Root-to-node path through named children. Never a byte offset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodePath(
    /// Steps from the root's first level down to the node.
    pub Vec<PathStep>,
);

impl fmt::Display for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts = self
            .0
            .iter()
            .map(|s| {
                return match &s.name {
                    Some(name) => format!("{}[{}]({name})", s.kind, s.index),
                    None => format!("{}[{}]", s.kind, s.index),
                };
            })
            .collect::<Vec<_>>();
        return f.write_str(&parts.join("/"));
    }
}

/// A reference to a location inside a parsed file, to be re-resolved before use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetNode {
    /// File the node lives in.
    pub file_path: PathBuf,
    /// Tree-sitter kind of the node.
    pub node_kind: String,
    /// Structural path from the file root.
    pub path: NodePath,
    /// Relevance score; higher is more relevant.
    pub rank: u32,
}

/// Counts describing the tree the targets were drawn from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeInformation {
    /// Files searched for targets.
    pub file_count: usize,
    /// Candidate nodes inspected.
    pub node_count: usize,
}

/// Which family of visual token a request is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    /// Palette / brand colors.
    Color,
    /// Corner radius.
    Radius,
    /// Margins, paddings, gaps.
    Spacing,
    /// Fonts and type scale.
    Typography,
}

impl fmt::Display for TokenType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Color => "color",
            Self::Radius => "radius",
            Self::Spacing => "spacing",
            Self::Typography => "typography",
        };
        return f.write_str(name);
    }
}

/// Artifacts for a design token rewrite.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenChange {
    /// Where the token applies; `global` unless the request narrows it.
    pub target_scope: String,
    /// Token family.
    pub token_type: TokenType,
    /// Requested value as written in the request (e.g. `blue`, `#1d4ed8`, `Inter`).
    pub value: String,
}

/// The classified strategy for one request. Each variant carries only what
/// its executor needs. Built per request and dropped after dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModificationScope {
    /// New surface area absent from the project.
    ComponentAddition {
        /// Why this scope was chosen.
        reasoning: String,
    },
    /// Global palette / typography / spacing change.
    DesignTokenChange {
        /// Token, value, and scope.
        change: TokenChange,
        /// Why this scope was chosen.
        reasoning: String,
    },
    /// Conservative default: regenerate whole files.
    FullFile {
        /// Files a follow-up request refers to, regenerated first.
        focus: Vec<PathBuf>,
        /// Why this scope was chosen.
        reasoning: String,
    },
    /// Edit bounded regions of existing code.
    TargetedNodes {
        /// Why this scope was chosen.
        reasoning: String,
        /// Ranked targets, most relevant first.
        targets: Vec<TargetNode>,
        /// Counts of what was searched.
        tree: TreeInformation,
    },
    /// Literal find-and-replace across the project.
    TextBasedChange {
        /// Search and replacement terms.
        change: TextChange,
        /// Why this scope was chosen.
        reasoning: String,
    },
}

impl ModificationScope {
    /// The scope's discriminant.
    pub const fn kind(&self) -> ScopeKind {
        return match self {
            Self::ComponentAddition { .. } => ScopeKind::ComponentAddition,
            Self::DesignTokenChange { .. } => ScopeKind::DesignTokenChange,
            Self::FullFile { .. } => ScopeKind::FullFile,
            Self::TargetedNodes { .. } => ScopeKind::TargetedNodes,
            Self::TextBasedChange { .. } => ScopeKind::TextBasedChange,
        };
    }

    /// Why the classifier picked this scope.
    pub fn reasoning(&self) -> &str {
        return match self {
            Self::ComponentAddition { reasoning }
            | Self::DesignTokenChange { reasoning, .. }
            | Self::FullFile { reasoning, .. }
            | Self::TargetedNodes { reasoning, .. }
            | Self::TextBasedChange { reasoning, .. } => reasoning,
        };
    }
}

/// A concrete executor in the fallback plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Two-phase new unit synthesis.
    ComponentSynthesis,
    /// Token file + global stylesheet rewrite.
    DesignTokens,
    /// Raw write of a minimal placeholder unit.
    EmergencyPlaceholder,
    /// AST-targeted edit.
    NodeEdit,
    /// Literal replace.
    TextReplace,
    /// Whole-file regeneration.
    WholeFileRegen,
}

impl Strategy {
    /// The scope kind reported when this strategy produced the result.
    pub const fn scope_kind(self) -> ScopeKind {
        return match self {
            Self::ComponentSynthesis => ScopeKind::ComponentAddition,
            Self::DesignTokens => ScopeKind::DesignTokenChange,
            Self::EmergencyPlaceholder | Self::WholeFileRegen => ScopeKind::FullFile,
            Self::NodeEdit => ScopeKind::TargetedNodes,
            Self::TextReplace => ScopeKind::TextBasedChange,
        };
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ComponentSynthesis => "component synthesis",
            Self::DesignTokens => "design tokens",
            Self::EmergencyPlaceholder => "emergency placeholder",
            Self::NodeEdit => "node edit",
            Self::TextReplace => "text replace",
            Self::WholeFileRegen => "whole-file regeneration",
        };
        return f.write_str(name);
    }
}

/// What a history entry did to its file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    /// A new file was written.
    Created,
    /// An existing file was edited.
    Modified,
    /// A lifecycle transition of the request.
    Phase,
    /// An attempt was recorded without a single owning file.
    Updated,
}

/// One entry of the per-session modification log. Never edited after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModificationChange {
    /// Scope kind of the strategy that ran; `None` before classification.
    pub approach: Option<ScopeKind>,
    /// What happened to the file.
    pub change_type: ChangeType,
    /// Short human-readable description.
    pub description: String,
    /// Affected file; `None` for attempt-level records.
    pub file: Option<PathBuf>,
    /// Why the step was taken, or why it failed.
    pub reasoning: String,
    /// Whether the step succeeded.
    pub success: bool,
    /// When the entry was recorded.
    pub timestamp: DateTime<Utc>,
}

/// Input contract for one modification.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModificationRequest {
    /// The natural-language change request.
    pub natural_language_request: String,
    /// Optional externally supplied project description.
    pub project_description: Option<String>,
    /// Optional identifier for project-history lookups.
    pub project_id: Option<String>,
}

impl ModificationRequest {
    /// A request with only the text set.
    pub fn new(text: impl Into<String>) -> Self {
        return Self {
            natural_language_request: text.into(),
            project_description: None,
            project_id: None,
        };
    }
}

/// Output contract for one modification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModificationOutcome {
    /// Scope kind of the strategy that produced the final result.
    pub approach: ScopeKind,
    /// Scope kind the classifier chose.
    pub classified_as: ScopeKind,
    /// Error of the last failed step when the request failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Files written that did not exist before.
    pub files_added: Vec<PathBuf>,
    /// Existing files that were changed.
    pub files_modified: Vec<PathBuf>,
    /// Classifier reasoning followed by one line per attempted step.
    pub reasoning: String,
    /// Concrete strategy that produced the final result.
    pub strategy: Strategy,
    /// Whether some valid change was committed.
    pub success: bool,
}

/// Cooperative cancellation shared between a caller and a running request.
/// Checked between discrete phases, never inside a single file edit.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    /// A flag that is not cancelled.
    pub fn new() -> Self {
        return Self::default();
    }

    /// Request cancellation. Running work stops at its next phase boundary.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Fail with `Error::Cancelled` if cancellation was requested.
    ///
    /// # Errors
    ///
    /// Returns `Error::Cancelled` naming the phase that will not start.
    pub fn check(&self, phase: &str) -> Result<(), Error> {
        if self.is_cancelled() {
            return Err(Error::Cancelled { phase: phase.to_string() });
        }
        return Ok(());
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        return self.0.load(Ordering::SeqCst);
    }
}
