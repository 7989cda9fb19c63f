//! CLI commands for amend: map, modify, history, cleanup.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use amend::config::Config;
use amend::diagnostics;
use amend::error::Error;
use amend::mapper::{StructureMapper, TreeMapper};
use amend::project_history::JsonProjectHistory;
use amend::session::SessionRegistry;
use amend::store::{self, FsStore, SessionStore};
use amend::synthesis::{CommandSynthesizer, Synthesizer, Unconfigured};
use amend::types::{CancelFlag, ModificationRequest};
use amend::{Orchestrator, Services};

/// Everything `amend modify` needs.
pub struct ModifyArgs {
    /// Fallback design description.
    pub description: Option<String>,
    /// Project-history lookup key.
    pub project_id: Option<String>,
    /// The change request.
    pub request: String,
    /// Drop the session cache before running.
    pub rescan: bool,
    /// Project directory as given on the command line.
    pub root: PathBuf,
    /// Session key.
    pub session: String,
    /// Session store directory.
    pub state_dir: PathBuf,
    /// Synthesizer override.
    pub synth_cmd: Option<String>,
}

/// Drop a session's stored cache, history, and metadata.
///
/// # Errors
///
/// Returns `Error::InvalidSessionId` for an unusable key, or errors from config loading.
pub fn cleanup(root: &Path, state_dir: &Path, session: &str) -> Result<(), Error> {
    store::validate_session_id(session)?;
    let config = Config::load(root)?;
    let registry = SessionRegistry::new(open_store(state_dir), config.session_ttl_secs);
    registry.cleanup(session);
    eprintln!("Session `{session}` cleaned up.");
    return Ok(());
}

/// Print a session's recent entries and its most-modified files.
///
/// # Errors
///
/// Returns `Error::InvalidSessionId` for an unusable key, or errors from
/// config loading and root resolution.
pub fn history(root: &Path, state_dir: &Path, session: &str, limit: usize) -> Result<(), Error> {
    let root = project_root(root)?;
    let config = Config::load(&root)?;
    let registry = SessionRegistry::new(open_store(state_dir), config.session_ttl_secs);
    let opened = registry.open(session, &root)?;

    println!("## Recent changes\n");
    println!("{}", opened.history.recent_summary(limit));

    let ranked = opened.history.most_modified_files();
    if !ranked.is_empty() {
        println!("\n## Most modified\n");
        for (path, count) in ranked {
            println!("- {} ({count})", path.display());
        }
    }
    return Ok(());
}

/// Scan the project and print its structure map.
///
/// # Errors
///
/// Returns errors from config loading, the scan, or JSON encoding.
pub fn map(root: &Path, json: bool) -> Result<(), Error> {
    let root = project_root(root)?;
    let config = Config::load(&root)?;
    let mapper = TreeMapper::new(config);
    let files = mapper.scan(&root, &CancelFlag::new())?;
    let structure = mapper.map(&files);

    if json {
        println!("{}", serde_json::to_string_pretty(&structure)?);
    } else {
        print!("{}", structure.render_summary());
    }
    return Ok(());
}

/// Run one change request and print the outcome as JSON.
/// Exit code 1 means every strategy, including the placeholder, failed.
///
/// # Errors
///
/// Returns errors from config loading, an unreadable project history file,
/// an unusable session key, or a cancellation before execution.
pub fn modify(args: &ModifyArgs) -> Result<ExitCode, Error> {
    let root = project_root(&args.root)?;
    let config = Config::load(&root)?;
    let synthesizer: Arc<dyn Synthesizer> = match args.synth_cmd.as_ref().or(config.synth_command.as_ref()) {
        Some(command) => Arc::new(CommandSynthesizer::new(command.clone())),
        None => {
            tracing::warn!("no synthesizer configured, only literal replacements and placeholders can succeed");
            Arc::new(Unconfigured)
        },
    };
    let mut services = Services::new(&config, synthesizer);
    if let Some(file) = &config.project_history {
        services.project_history = Arc::new(JsonProjectHistory::load(&root.join(file))?);
    }
    let orchestrator = Orchestrator::new(config, open_store(&args.state_dir), services);

    if args.rescan {
        orchestrator.registry().open(&args.session, &root)?.cache.invalidate();
    }

    let request = ModificationRequest {
        natural_language_request: args.request.clone(),
        project_description: args.description.clone(),
        project_id: args.project_id.clone(),
    };
    let outcome = orchestrator.modify(&args.session, &root, &request, &CancelFlag::new())?;
    println!("{}", serde_json::to_string_pretty(&outcome)?);

    if outcome.success {
        return Ok(ExitCode::SUCCESS);
    }
    diagnostics::print_failed_outcome(&outcome);
    return Ok(ExitCode::from(1));
}

/// Session store under `state_dir`.
fn open_store(state_dir: &Path) -> Arc<dyn SessionStore> {
    return Arc::new(FsStore::new(state_dir));
}

/// Absolute project root, so a session binds to the same directory however
/// it was spelled.
///
/// # Errors
///
/// Returns `Error::Io` if the directory does not exist.
fn project_root(root: &Path) -> Result<PathBuf, Error> {
    return Ok(std::fs::canonicalize(root)?);
}
