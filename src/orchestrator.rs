//! Request lifecycle: cache, classify, execute with fallbacks, record.
//!
//! `INIT → CACHE_READY → CLASSIFIED → EXECUTING{strategy} → DONE(success|failed)`.
//! Fallback order is the data in `fallback_plan`, walked by `run_plan`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;

use crate::classifier::{ClassificationInput, HeuristicClassifier, ScopeClassifier};
use crate::config::Config;
use crate::error::Error;
use crate::executors::{
    self, ComponentSynthesis, ComponentSynthesisExecutor, DesignTokenExecutor, DesignTokens, ExecutionContext,
    ExecutionReport, NodeEdit, NodeEditExecutor, TextReplace, TextReplaceExecutor, WholeFileRegen,
    WholeFileRegenExecutor,
};
use crate::history;
use crate::mapper::{StructureMapper, TreeMapper};
use crate::project_history::{NoProjectHistory, ProjectHistory};
use crate::session::{Phase, Session, SessionRegistry};
use crate::store::SessionStore;
use crate::synthesis::Synthesizer;
use crate::types::{
    CancelFlag, ChangeType, FileMap, ModificationChange, ModificationOutcome, ModificationRequest, ModificationScope,
    ProjectStructureMap, ScopeKind, Strategy,
};
use crate::workspace::Workspace;

/// Collaborators the orchestrator is built from. Each seam is a trait
/// object so callers can swap any one of them.
#[derive(Clone)]
pub struct Services {
    /// Request classifier.
    pub classifier: Arc<dyn ScopeClassifier>,
    /// New unit synthesis.
    pub component: Arc<dyn ComponentSynthesis>,
    /// Tree scanner and structure builder.
    pub mapper: Arc<dyn StructureMapper>,
    /// Targeted node edits.
    pub nodes: Arc<dyn NodeEdit>,
    /// Earlier generation output.
    pub project_history: Arc<dyn ProjectHistory>,
    /// Whole-file regeneration.
    pub regen: Arc<dyn WholeFileRegen>,
    /// Code-synthesis collaborator.
    pub synthesizer: Arc<dyn Synthesizer>,
    /// Literal replace.
    pub text: Arc<dyn TextReplace>,
    /// Design token rewrite.
    pub tokens: Arc<dyn DesignTokens>,
}

impl Services {
    /// The default implementation of every seam around `synthesizer`.
    pub fn new(config: &Config, synthesizer: Arc<dyn Synthesizer>) -> Self {
        return Self {
            classifier: Arc::new(HeuristicClassifier),
            component: Arc::new(ComponentSynthesisExecutor),
            mapper: Arc::new(TreeMapper::new(config.clone())),
            nodes: Arc::new(NodeEditExecutor),
            project_history: Arc::new(NoProjectHistory),
            regen: Arc::new(WholeFileRegenExecutor),
            synthesizer,
            text: Arc::new(TextReplaceExecutor),
            tokens: Arc::new(DesignTokenExecutor),
        };
    }
}

impl std::fmt::Debug for Services {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        return f.debug_struct("Services").finish_non_exhaustive();
    }
}

// ── Fallback plan ──

/// When a plan step runs, judged by how the previous step ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// First step; always runs.
    Always,
    /// Previous step returned an error.
    OnError,
    /// Previous step returned an error or committed nothing.
    OnFailure,
}

/// One entry of a fallback plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanStep {
    /// Executor to run.
    pub strategy: Strategy,
    /// Condition on the previous step.
    pub trigger: Trigger,
}

/// Shorthand for the plan tables.
const fn step(strategy: Strategy, trigger: Trigger) -> PlanStep {
    return PlanStep { strategy, trigger };
}

/// Text changes never escalate: no occurrence means nothing to do.
const TEXT_PLAN: &[PlanStep] = &[step(Strategy::TextReplace, Trigger::Always)];

/// Targeted edits fall back to regeneration, then to the placeholder.
const NODES_PLAN: &[PlanStep] = &[
    step(Strategy::NodeEdit, Trigger::Always),
    step(Strategy::WholeFileRegen, Trigger::OnFailure),
    step(Strategy::EmergencyPlaceholder, Trigger::OnError),
];

/// New units fall back like targeted edits.
const COMPONENT_PLAN: &[PlanStep] = &[
    step(Strategy::ComponentSynthesis, Trigger::Always),
    step(Strategy::WholeFileRegen, Trigger::OnFailure),
    step(Strategy::EmergencyPlaceholder, Trigger::OnError),
];

/// Token rewrites are all-or-nothing and never escalate.
const TOKENS_PLAN: &[PlanStep] = &[step(Strategy::DesignTokens, Trigger::Always)];

/// Regeneration falls back to the placeholder only.
const FULL_FILE_PLAN: &[PlanStep] = &[
    step(Strategy::WholeFileRegen, Trigger::Always),
    step(Strategy::EmergencyPlaceholder, Trigger::OnError),
];

/// The ordered steps tried for a classified scope.
pub const fn fallback_plan(kind: ScopeKind) -> &'static [PlanStep] {
    return match kind {
        ScopeKind::ComponentAddition => COMPONENT_PLAN,
        ScopeKind::DesignTokenChange => TOKENS_PLAN,
        ScopeKind::FullFile => FULL_FILE_PLAN,
        ScopeKind::TargetedNodes => NODES_PLAN,
        ScopeKind::TextBasedChange => TEXT_PLAN,
    };
}

/// How a step ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StepEnd {
    /// Returned an error.
    Errored,
    /// Committed a change.
    Succeeded,
    /// Ran but committed nothing.
    Unsuccessful,
}

impl Trigger {
    /// Whether a step with this trigger runs after `previous`.
    const fn fires_after(self, previous: StepEnd) -> bool {
        return match self {
            Self::Always => true,
            Self::OnError => matches!(previous, StepEnd::Errored),
            Self::OnFailure => matches!(previous, StepEnd::Errored | StepEnd::Unsuccessful),
        };
    }
}

/// Result of walking a plan.
#[derive(Debug, Default)]
struct PlanRun {
    /// Last error, when the run failed.
    error: Option<String>,
    /// Files added by any step.
    files_added: Vec<PathBuf>,
    /// Files modified by any step.
    files_modified: Vec<PathBuf>,
    /// Strategy of the last step that ran.
    last: Option<Strategy>,
    /// One line per attempted step.
    lines: Vec<String>,
    /// Whether the last step committed a change.
    success: bool,
}

// ── Orchestrator ──

/// Runs modification requests against sessions.
#[derive(Debug)]
pub struct Orchestrator {
    /// Project configuration.
    config: Config,
    /// Live sessions.
    registry: SessionRegistry,
    /// Injected collaborators.
    services: Services,
}

impl Orchestrator {
    /// An orchestrator persisting session state to `store`.
    pub fn new(config: Config, store: Arc<dyn SessionStore>, services: Services) -> Self {
        let registry = SessionRegistry::new(store, config.session_ttl_secs);
        return Self {
            config,
            registry,
            services,
        };
    }

    /// Tear down a session. Returns whether it was live.
    pub fn cleanup(&self, session_id: &str) -> bool {
        return self.registry.cleanup(session_id);
    }

    /// History of every session bound to `build_directory`, oldest first.
    pub fn history_for_directory(&self, build_directory: &Path) -> Vec<ModificationChange> {
        let mut entries: Vec<ModificationChange> = self
            .registry
            .sessions_for_directory(build_directory)
            .iter()
            .flat_map(|s| return s.history.entries())
            .collect();
        entries.sort_by_key(|e| return e.timestamp);
        return entries;
    }

    /// Make sure the session's cache is populated and return the structure map.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidSessionId` or `Error::Cancelled`.
    pub fn map_structure(
        &self,
        session_id: &str,
        build_directory: &Path,
        cancel: &CancelFlag,
    ) -> Result<ProjectStructureMap, Error> {
        let session = self.registry.open(session_id, build_directory)?;
        let files = self.ensure_cache(&session, build_directory, cancel)?;
        return Ok(self.services.mapper.map(&files));
    }

    /// Run one request end to end.
    ///
    /// Item-level problems and failed strategies end up in the outcome, not
    /// in the error; only an unusable session key or a cancellation before
    /// execution starts are returned as errors.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidSessionId` or `Error::Cancelled`.
    pub fn modify(
        &self,
        session_id: &str,
        build_directory: &Path,
        request: &ModificationRequest,
        cancel: &CancelFlag,
    ) -> Result<ModificationOutcome, Error> {
        let session = self.registry.open(session_id, build_directory)?;
        let count = session.begin_request();
        tracing::info!(session = session_id, request = count, "modification request started");

        let files = self
            .ensure_cache(&session, build_directory, cancel)
            .map_err(|e| return abort(&session, None, e))?;
        let structure = self.services.mapper.map(&files);
        session.transition(Phase::CacheReady);
        record_phase(&session, None, format!("cache ready with {} file(s)", files.len()), "");
        cancel.check("classification").map_err(|e| return abort(&session, None, e))?;

        let recent_entries = session.history.recent(self.config.recent_history);
        let recent = history::render_recent(&recent_entries, self.config.recent_history);
        let scope = self.services.classifier.classify(&ClassificationInput {
            files: &files,
            history: &recent_entries,
            request,
            structure: &structure,
        });
        session.transition(Phase::Classified);
        record_phase(&session, Some(scope.kind()), format!("classified as {}", scope.kind()), scope.reasoning());
        cancel
            .check("execution")
            .map_err(|e| return abort(&session, Some(scope.kind()), e))?;

        let summary = render_context(&structure, request, &recent);
        session.set_summary(summary.clone());
        let workspace = Workspace::new(build_directory);
        let ctx = ExecutionContext {
            cache: &session.cache,
            cancel,
            config: &self.config,
            project_history: self.services.project_history.as_ref(),
            request,
            structure: &structure,
            summary: &summary,
            synthesizer: self.services.synthesizer.as_ref(),
            workspace: &workspace,
        };
        let run = self.run_plan(&session, &ctx, &scope);

        session.transition(Phase::Done { success: run.success });
        let strategy = run.last.unwrap_or(Strategy::EmergencyPlaceholder);
        let mut reasoning = scope.reasoning().to_string();
        for line in &run.lines {
            reasoning.push('\n');
            reasoning.push_str(line);
        }
        let outcome = ModificationOutcome {
            approach: strategy.scope_kind(),
            classified_as: scope.kind(),
            error: if run.success { None } else { run.error },
            files_added: run.files_added,
            files_modified: run.files_modified,
            reasoning,
            strategy,
            success: run.success,
        };
        tracing::info!(
            session = session_id,
            success = outcome.success,
            approach = %outcome.approach,
            classified_as = %outcome.classified_as,
            "modification request finished"
        );
        return Ok(outcome);
    }

    /// Live sessions.
    pub const fn registry(&self) -> &SessionRegistry {
        return &self.registry;
    }

    /// Expire idle sessions now.
    pub fn sweep_expired(&self) -> Vec<String> {
        return self.registry.sweep_expired(Utc::now());
    }

    /// Hydrated cache, or a fresh scan when it is empty. A failed scan
    /// degrades to an empty map; only cancellation is returned.
    fn ensure_cache(&self, session: &Session, root: &Path, cancel: &CancelFlag) -> Result<Arc<FileMap>, Error> {
        if session.cache.is_empty() {
            match self.services.mapper.scan(root, cancel) {
                Ok(files) => {
                    tracing::info!(session = session.cache.session(), files = files.len(), "project scanned");
                    session.cache.bulk_replace(files);
                },
                Err(e @ Error::Cancelled { .. }) => return Err(e),
                Err(e) => tracing::warn!(session = session.cache.session(), error = %e, "scan failed, continuing with empty cache"),
            }
        }
        return Ok(session.cache.get());
    }

    /// Walk the scope's fallback plan, recording every attempt.
    fn run_plan(&self, session: &Session, ctx: &ExecutionContext<'_>, scope: &ModificationScope) -> PlanRun {
        let mut run = PlanRun::default();
        let mut previous: Option<StepEnd> = None;
        for planned in fallback_plan(scope.kind()) {
            if let Some(end) = previous
                && (end == StepEnd::Succeeded || !planned.trigger.fires_after(end))
            {
                break;
            }
            if let Err(e) = ctx.cancel.check(&planned.strategy.to_string()) {
                run.lines.push(format!("{e}"));
                run.error = Some(e.to_string());
                run.success = false;
                break;
            }

            session.transition(Phase::Executing {
                strategy: planned.strategy,
            });
            tracing::info!(strategy = %planned.strategy, "executing");
            let result = self.dispatch(planned.strategy, ctx, scope);
            let end = match &result {
                Ok(report) if report.success => StepEnd::Succeeded,
                Ok(_) => StepEnd::Unsuccessful,
                Err(_) => StepEnd::Errored,
            };
            record_attempt(session, planned.strategy, scope, &result);

            run.last = Some(planned.strategy);
            run.success = end == StepEnd::Succeeded;
            match result {
                Ok(report) => {
                    run.lines.push(format!("{}: {}", planned.strategy, report.detail));
                    if !report.success {
                        run.error = Some(report.detail);
                    }
                    merge(&mut run.files_added, report.files_added);
                    merge(&mut run.files_modified, report.files_modified);
                },
                Err(e) => {
                    tracing::warn!(strategy = %planned.strategy, error = %e, "strategy failed");
                    run.lines.push(format!("{} failed: {e}", planned.strategy));
                    run.error = Some(e.to_string());
                },
            }
            previous = Some(end);
        }
        return run;
    }

    /// Run one strategy against the scope's artifacts.
    fn dispatch(
        &self,
        strategy: Strategy,
        ctx: &ExecutionContext<'_>,
        scope: &ModificationScope,
    ) -> Result<ExecutionReport, Error> {
        let mismatch = || {
            return Error::ScopeMismatch {
                actual: scope.kind().to_string(),
                expected: strategy.scope_kind().to_string(),
            };
        };
        return match strategy {
            Strategy::ComponentSynthesis => match scope {
                ModificationScope::ComponentAddition { .. } => self.services.component.execute(ctx),
                _ => Err(mismatch()),
            },
            Strategy::DesignTokens => match scope {
                ModificationScope::DesignTokenChange { change, .. } => self.services.tokens.execute(ctx, change),
                _ => Err(mismatch()),
            },
            Strategy::EmergencyPlaceholder => executors::write_placeholder(ctx),
            Strategy::NodeEdit => match scope {
                ModificationScope::TargetedNodes { targets, .. } => self.services.nodes.execute(ctx, targets),
                _ => Err(mismatch()),
            },
            Strategy::TextReplace => match scope {
                ModificationScope::TextBasedChange { change, .. } => self.services.text.execute(ctx, change),
                _ => Err(mismatch()),
            },
            Strategy::WholeFileRegen => {
                let hints: Vec<PathBuf> = match scope {
                    ModificationScope::TargetedNodes { targets, .. } => {
                        targets.iter().map(|t| return t.file_path.clone()).collect()
                    },
                    ModificationScope::FullFile { focus, .. } => focus.clone(),
                    ModificationScope::ComponentAddition { .. }
                    | ModificationScope::DesignTokenChange { .. }
                    | ModificationScope::TextBasedChange { .. } => Vec::new(),
                };
                self.services.regen.execute(ctx, &hints)
            },
        };
    }
}

/// Append a lifecycle transition to the session history.
fn record_phase(session: &Session, approach: Option<ScopeKind>, description: String, reasoning: &str) {
    session.history.append(ModificationChange {
        approach,
        change_type: ChangeType::Phase,
        description,
        file: None,
        reasoning: reasoning.to_string(),
        success: true,
        timestamp: Utc::now(),
    });
}

/// Record a request that stopped before execution and hand the error back.
fn abort(session: &Session, approach: Option<ScopeKind>, error: Error) -> Error {
    session.history.append(ModificationChange {
        approach,
        change_type: ChangeType::Updated,
        description: "request stopped before execution".to_string(),
        file: None,
        reasoning: error.to_string(),
        success: false,
        timestamp: Utc::now(),
    });
    session.transition(Phase::Done { success: false });
    tracing::info!(session = %session.id(), error = %error, "modification request stopped");
    return error;
}

/// Append the attempt and each committed file to the session history.
fn record_attempt(
    session: &Session,
    strategy: Strategy,
    scope: &ModificationScope,
    result: &Result<ExecutionReport, Error>,
) {
    let approach = Some(strategy.scope_kind());
    let now = Utc::now();
    let (success, description, reasoning) = match result {
        Ok(report) => (report.success, format!("{strategy}: {}", report.detail), scope.reasoning().to_string()),
        Err(e) => (false, format!("{strategy} failed"), e.to_string()),
    };
    session.history.append(ModificationChange {
        approach,
        change_type: ChangeType::Updated,
        description,
        file: None,
        reasoning: reasoning.clone(),
        success,
        timestamp: now,
    });

    let Ok(report) = result else {
        return;
    };
    let files = report
        .files_added
        .iter()
        .map(|p| return (p, ChangeType::Created))
        .chain(report.files_modified.iter().map(|p| return (p, ChangeType::Modified)));
    for (path, change_type) in files {
        session.history.append(ModificationChange {
            approach,
            change_type,
            description: format!("{strategy} {}", path.display()),
            file: Some(path.clone()),
            reasoning: reasoning.clone(),
            success: true,
            timestamp: now,
        });
    }
}

/// Structure summary, external description, and recent history in one block.
fn render_context(structure: &ProjectStructureMap, request: &ModificationRequest, recent: &str) -> String {
    let mut out = structure.render_summary();
    if let Some(description) = &request.project_description {
        out.push_str("\nProject description:\n");
        out.push_str(description);
        out.push('\n');
    }
    out.push_str("\nRecent modifications:\n");
    out.push_str(recent);
    out.push('\n');
    return out;
}

/// Append paths not already present.
fn merge(into: &mut Vec<PathBuf>, from: Vec<PathBuf>) {
    for path in from {
        if !into.contains(&path) {
            into.push(path);
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn plans_match_the_fallback_table() {
        let strategies = |kind| fallback_plan(kind).iter().map(|s| s.strategy).collect::<Vec<_>>();
        assert_eq!(strategies(ScopeKind::TextBasedChange), vec![Strategy::TextReplace]);
        assert_eq!(
            strategies(ScopeKind::TargetedNodes),
            vec![Strategy::NodeEdit, Strategy::WholeFileRegen, Strategy::EmergencyPlaceholder]
        );
        assert_eq!(
            strategies(ScopeKind::ComponentAddition),
            vec![Strategy::ComponentSynthesis, Strategy::WholeFileRegen, Strategy::EmergencyPlaceholder]
        );
        assert_eq!(strategies(ScopeKind::DesignTokenChange), vec![Strategy::DesignTokens]);
        assert_eq!(strategies(ScopeKind::FullFile), vec![Strategy::WholeFileRegen, Strategy::EmergencyPlaceholder]);
    }

    #[test]
    fn placeholder_only_follows_errors() {
        assert!(Trigger::OnError.fires_after(StepEnd::Errored));
        assert!(!Trigger::OnError.fires_after(StepEnd::Unsuccessful));
        assert!(Trigger::OnFailure.fires_after(StepEnd::Unsuccessful));
        assert!(!Trigger::OnFailure.fires_after(StepEnd::Succeeded));
    }

    #[test]
    fn context_includes_description_and_history() {
        let mut request = ModificationRequest::new("x");
        request.project_description = Some("A bakery landing page".to_string());
        let rendered = render_context(&ProjectStructureMap::default(), &request, "No previous modifications.");
        assert!(rendered.contains("A bakery landing page"));
        assert!(rendered.ends_with("No previous modifications.\n"));
    }
}
