use std::path::Path;

use super::{DesignTokens, ExecutionContext, ExecutionReport, commit_file};
use crate::error::Error;
use crate::synthesis::{self, Excerpt, FileRewrites, SynthesisRequest, SynthesisTask};
use crate::types::{ChangeType, ProjectFile, TokenChange};

/// Rewrites the token definition file and the global stylesheet together.
#[derive(Debug, Clone, Copy, Default)]
pub struct DesignTokenExecutor;

impl DesignTokens for DesignTokenExecutor {
    fn execute(&self, ctx: &ExecutionContext<'_>, change: &TokenChange) -> Result<ExecutionReport, Error> {
        let mut report = ExecutionReport::default();
        let (Some(tokens), Some(sheet)) = (
            first_cached(ctx, &ctx.config.token_files),
            first_cached(ctx, &ctx.config.stylesheet_files),
        ) else {
            report.detail = "token file or global stylesheet not found".to_string();
            return Ok(report);
        };

        let design = ctx
            .request
            .project_id
            .as_deref()
            .and_then(|id| return ctx.project_history.design_description(id))
            .or_else(|| return ctx.request.project_description.clone())
            .unwrap_or_else(|| return "no prior design description".to_string());
        let request = SynthesisRequest {
            excerpts: vec![
                Excerpt {
                    path: tokens.path.clone(),
                    text: tokens.content.clone(),
                },
                Excerpt {
                    path: sheet.path.clone(),
                    text: sheet.content.clone(),
                },
            ],
            instructions: format!(
                "Set the {} tokens ({} scope) to {} for: {}\nPrior design: {design}\nRewrite both files completely using absolute values only, never var(...). Reply with {{\"files\": [{{\"path\", \"content\"}}]}}.",
                change.token_type, change.target_scope, change.value, ctx.request.natural_language_request
            ),
            project_summary: ctx.summary.to_string(),
            task: SynthesisTask::DesignTokens,
        };
        let raw = ctx.synthesizer.synthesize(&request)?;
        let rewrites: FileRewrites = synthesis::parse_response(&raw)?;

        let new_tokens = rewritten(&rewrites, &tokens.path)?;
        let new_sheet = rewritten(&rewrites, &sheet.path)?;
        if let Some(extra) = rewrites.files.iter().find(|f| return f.path != tokens.path && f.path != sheet.path) {
            return Err(Error::synthesis(format!("unexpected file {} in token rewrite", extra.path.display())));
        }
        ctx.cancel.check("design token write")?;

        ctx.workspace.backup(&tokens.path)?;
        ctx.workspace.backup(&sheet.path)?;

        let first = commit_file(ctx, &tokens.path, new_tokens)?;
        if let Err(e) = commit_file(ctx, &sheet.path, new_sheet) {
            restore(ctx, &tokens);
            return Err(e);
        }
        report.record(&tokens.path, first);
        report.record(&sheet.path, ChangeType::Modified);
        report.success = true;
        report.detail = format!(
            "rewrote {} and {} with {} = {}",
            tokens.path.display(),
            sheet.path.display(),
            change.token_type,
            change.value
        );
        tracing::info!(token = %change.token_type, value = %change.value, "design tokens rewritten");
        return Ok(report);
    }
}

/// First configured path present in the cache.
fn first_cached(ctx: &ExecutionContext<'_>, candidates: &[String]) -> Option<ProjectFile> {
    return candidates.iter().find_map(|p| return ctx.cache.file(Path::new(p)));
}

/// The rewrite for `path`, checked to parse and to avoid variable indirection.
fn rewritten<'r>(rewrites: &'r FileRewrites, path: &Path) -> Result<&'r str, Error> {
    let file = rewrites
        .files
        .iter()
        .find(|f| return f.path.as_path() == path)
        .ok_or_else(|| return Error::synthesis(format!("no rewrite for {}", path.display())))?;
    synthesis::check_content(&file.path, &file.content)?;
    if file.content.contains("var(") {
        return Err(Error::synthesis(format!("{} still uses var() indirection", path.display())));
    }
    return Ok(&file.content);
}

/// Put the original content back after a failed second write.
fn restore(ctx: &ExecutionContext<'_>, original: &ProjectFile) {
    match commit_file(ctx, &original.path, &original.content) {
        Ok(_) => tracing::warn!(file = %original.path.display(), "token write rolled back"),
        Err(e) => tracing::error!(file = %original.path.display(), error = %e, "token rollback failed, backup kept"),
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{Fixture, Scripted};
    use super::*;
    use crate::types::TokenType;

    const TAILWIND: &str = "export default { theme: { extend: { colors: { primary: \"#000000\" } } } };\n";
    const CSS: &str = "@tailwind base;\nbody { color: #111111; }\n";

    fn change() -> TokenChange {
        TokenChange { target_scope: "global".to_string(), token_type: TokenType::Color, value: "blue".to_string() }
    }

    fn reply(tokens: &str, css: &str) -> String {
        serde_json::json!({"files": [
            {"path": "tailwind.config.ts", "content": tokens},
            {"path": "src/index.css", "content": css},
        ]})
        .to_string()
    }

    fn fixture() -> Fixture {
        Fixture::new(&[("tailwind.config.ts", TAILWIND), ("src/index.css", CSS)], "make the palette blue")
    }

    #[test]
    fn rewrites_both_files_and_keeps_backups() {
        let fx = fixture();
        let new_tokens = "export default { theme: { extend: { colors: { primary: \"#1d4ed8\" } } } };\n";
        let new_css = "@tailwind base;\nbody { color: #1e3a8a; }\n";
        let synth = Scripted::new(&[&reply(new_tokens, new_css)]);
        let report = DesignTokenExecutor.execute(&fx.ctx(&synth), &change()).unwrap();

        assert!(report.success);
        assert_eq!(report.files_modified.len(), 2);
        assert_eq!(fx.disk("tailwind.config.ts"), new_tokens);
        assert_eq!(fx.disk("src/index.css"), new_css);
        assert_eq!(fx.disk("tailwind.config.ts.bak"), TAILWIND);
        assert_eq!(fx.disk("src/index.css.bak"), CSS);
    }

    #[test]
    fn variable_indirection_fails_without_writing() {
        let fx = fixture();
        let synth = Scripted::new(&[&reply(TAILWIND, "body { color: var(--primary); }\n")]);
        let err = DesignTokenExecutor.execute(&fx.ctx(&synth), &change()).unwrap_err();
        assert!(matches!(err, Error::SynthesisFailed { .. }));
        assert_eq!(fx.disk("src/index.css"), CSS);
        assert!(!fx.dir.path().join("src/index.css.bak").exists());
    }

    #[test]
    fn broken_stylesheet_fails_without_writing() {
        let fx = fixture();
        let synth = Scripted::new(&[&reply(TAILWIND, "body { color: red;\n")]);
        assert!(DesignTokenExecutor.execute(&fx.ctx(&synth), &change()).is_err());
        assert_eq!(fx.disk("tailwind.config.ts"), TAILWIND);
    }

    #[test]
    fn missing_stylesheet_is_not_a_success() {
        let fx = Fixture::new(&[("tailwind.config.ts", TAILWIND)], "x");
        let report = DesignTokenExecutor.execute(&fx.ctx(&Scripted::default()), &change()).unwrap();
        assert!(!report.success);
    }
}
