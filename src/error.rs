/// Crate-level error types for amend diagnostics.
use std::path::PathBuf;

/// All errors in amend carry enough context to produce a useful diagnostic
/// without a debugger. Each variant names the file, session, or reason for failure.
#[allow(clippy::error_impl_error, reason = "crate-wide error type re-exported from the library root")]
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The session store could not be reached or returned unreadable data.
    #[error("session cache unavailable for `{session}`: {reason}")]
    CacheUnavailable {
        /// Description of the store failure.
        reason: String,
        /// Session whose cache could not be loaded or saved.
        session: String,
    },

    /// The operation was cancelled between two phases.
    #[error("cancelled before {phase}")]
    Cancelled {
        /// Phase that was about to start.
        phase: String,
    },

    /// The classifier could not decide on a scope.
    #[error("classification failed: {reason}")]
    ClassificationFailed {
        /// Description of the classification failure.
        reason: String,
    },

    /// Source file exceeds the configured size limit.
    #[error("file too large ({size_bytes} bytes, max {max_bytes}): {}", file.display())]
    FileTooLarge {
        /// File that exceeded the size limit.
        file: PathBuf,
        /// Maximum allowed file size in bytes.
        max_bytes: u64,
        /// Actual file size in bytes.
        size_bytes: u64,
    },

    /// A session identifier cannot be used as a storage key.
    #[error("invalid session id: `{session}`")]
    InvalidSessionId {
        /// The rejected identifier.
        session: String,
    },

    /// Underlying I/O error from the filesystem.
    #[error("io: {0}")]
    Io(
        /// The wrapped I/O error.
        #[from]
        std::io::Error,
    ),

    /// JSON (de)serialization failed.
    #[error("json: {0}")]
    Json(
        /// The wrapped JSON error.
        #[from]
        serde_json::Error,
    ),

    /// Tree-sitter failed to parse a source file, or the parse contained errors.
    #[error("parse failed: {}: {reason}", file.display())]
    ParseFailed {
        /// File that failed to parse.
        file: PathBuf,
        /// Description of the parse failure.
        reason: String,
    },

    /// A path escapes the session's working root.
    #[error("path outside working root: {}", path.display())]
    PathOutsideRoot {
        /// The rejected path.
        path: PathBuf,
    },

    /// A target reference no longer matches the current content.
    #[error("target not resolvable in {}: {reason}", file.display())]
    ResolutionFailed {
        /// File the target pointed into.
        file: PathBuf,
        /// Why the structural path did not match.
        reason: String,
    },

    /// An executor was handed a scope it does not handle.
    #[error("scope mismatch: expected {expected}, got {actual}")]
    ScopeMismatch {
        /// Scope kind of the scope that was passed.
        actual: String,
        /// Scope kind the executor handles.
        expected: String,
    },

    /// The synthesis collaborator returned unusable or unparseable content.
    #[error("synthesis failed: {reason}")]
    SynthesisFailed {
        /// Description of what was wrong with the response.
        reason: String,
    },

    /// TOML deserialization failed.
    #[error("toml deserialize: {0}")]
    TomlDe(
        /// The wrapped TOML deserialization error.
        #[from]
        toml::de::Error,
    ),

    /// No tree-sitter grammar registered for this file extension.
    #[error("no grammar for extension: .{ext}")]
    UnsupportedLanguage {
        /// File extension without the leading dot.
        ext: String,
    },

    /// Writing a file under the working root failed.
    #[error("write failed: {}: {source}", path.display())]
    WriteFailed {
        /// File that could not be written.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },
}

impl Error {
    /// Shorthand for a `SynthesisFailed` with a formatted reason.
    pub fn synthesis(reason: impl Into<String>) -> Self {
        return Self::SynthesisFailed { reason: reason.into() };
    }

    /// Whether the failure is scoped to a single item (one file, one target)
    /// and the surrounding request can carry on.
    pub const fn is_item_level(&self) -> bool {
        return matches!(
            self,
            Self::ResolutionFailed { .. }
                | Self::ParseFailed { .. }
                | Self::FileTooLarge { .. }
                | Self::UnsupportedLanguage { .. }
                | Self::WriteFailed { .. }
        );
    }
}
