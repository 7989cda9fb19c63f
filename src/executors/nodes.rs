use std::path::PathBuf;

use super::{ExecutionContext, ExecutionReport, NodeEdit, commit_file};
use crate::error::Error;
use crate::synthesis::{self, Excerpt, NodeReplacement, SynthesisRequest, SynthesisTask};
use crate::syntax;
use crate::types::{ChangeType, TargetNode};

/// Edits each target node in place. Targets are re-resolved against the
/// current cached content right before their edit, so earlier edits in the
/// same run cannot leave them pointing at shifted bytes.
#[derive(Debug, Clone, Copy, Default)]
pub struct NodeEditExecutor;

impl NodeEdit for NodeEditExecutor {
    fn execute(&self, ctx: &ExecutionContext<'_>, targets: &[TargetNode]) -> Result<ExecutionReport, Error> {
        let mut report = ExecutionReport::default();
        if targets.is_empty() {
            report.detail = "no target nodes to edit".to_string();
            return Ok(report);
        }

        let mut applied = 0_usize;
        for target in targets {
            if ctx.cancel.is_cancelled() {
                report.skip(format!("{}: cancelled before edit", target.path));
                break;
            }
            match edit_target(ctx, target) {
                Ok(path) => {
                    applied = applied.saturating_add(1);
                    report.record(&path, ChangeType::Modified);
                },
                Err(e) if e.is_item_level() || matches!(e, Error::SynthesisFailed { .. }) => {
                    report.skip(format!("{} {}: {e}", target.file_path.display(), target.path));
                },
                Err(e) => return Err(e),
            }
        }

        report.success = applied > 0;
        report.detail = format!("applied {applied} of {} target edit(s)", targets.len());
        tracing::info!(applied, skipped = report.skipped.len(), "node edit done");
        return Ok(report);
    }
}

/// Re-parse, re-resolve, synthesize, splice, validate, commit. Nothing is
/// written unless every step succeeds.
fn edit_target(ctx: &ExecutionContext<'_>, target: &TargetNode) -> Result<PathBuf, Error> {
    let file = ctx.cache.file(&target.file_path).ok_or_else(|| {
        return Error::ResolutionFailed {
            file: target.file_path.clone(),
            reason: "file is no longer cached".to_string(),
        };
    })?;
    let tree = syntax::parse_strict(&file.path, &file.content)?;
    let node = syntax::resolve_path(&tree, &file.content, &file.path, &target.path)?;
    let range = node.start_byte()..node.end_byte();
    let excerpt = syntax::node_text(node, &file.content).to_string();

    let request = SynthesisRequest {
        excerpts: vec![
            Excerpt {
                path: file.path.clone(),
                text: excerpt,
            },
            Excerpt {
                path: file.path.clone(),
                text: file.content.clone(),
            },
        ],
        instructions: format!(
            "Rewrite the first excerpt (a `{}` node) to satisfy: {}\nReply with {{\"replacement\": \"...\"}} containing only the new node text.",
            target.node_kind, ctx.request.natural_language_request
        ),
        project_summary: ctx.summary.to_string(),
        task: SynthesisTask::NodeEdit,
    };
    let raw = ctx.synthesizer.synthesize(&request)?;
    let edit: NodeReplacement = synthesis::parse_response(&raw)?;

    let updated = syntax::splice(&file.path, &file.content, range, &edit.replacement)?;
    synthesis::check_content(&file.path, &updated)?;
    commit_file(ctx, &file.path, &updated)?;
    tracing::debug!(file = %file.path.display(), path = %target.path, "node edited");
    return Ok(file.path);
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::super::testing::{Fixture, Scripted};
    use super::*;
    use crate::syntax::find_candidates;

    const HOME: &str = r#"export function Hero() {
  return <h1 className="title">Welcome</h1>;
}

export function Cta() {
  return <button className="primary">Sign Up</button>;
}
"#;

    fn targets(fx: &Fixture, words: &[&str]) -> Vec<TargetNode> {
        let path = Path::new("src/Home.tsx");
        let keywords: Vec<String> = words.iter().map(|w| w.to_string()).collect();
        let (mut found, _) = find_candidates(path, &fx.cached("src/Home.tsx"), &keywords).unwrap();
        found.retain(|c| c.kind == "jsx_element");
        found
            .into_iter()
            .map(|c| TargetNode { file_path: path.to_path_buf(), node_kind: c.kind, path: c.path, rank: c.score })
            .collect()
    }

    #[test]
    fn edits_node_and_preserves_surroundings() {
        let fx = Fixture::new(&[("src/Home.tsx", HOME)], "make the primary button blue");
        let synth = Scripted::new(&[r#"{"replacement":"<button className=\"primary bg-blue-600\">Sign Up</button>"}"#]);
        let found = targets(&fx, &["button"]);
        let report = NodeEditExecutor.execute(&fx.ctx(&synth), &found).unwrap();

        assert!(report.success);
        let after = fx.disk("src/Home.tsx");
        assert!(after.contains("bg-blue-600"));
        assert!(after.contains("<h1 className=\"title\">Welcome</h1>"));
        assert_eq!(after, fx.cached("src/Home.tsx"));
    }

    #[test]
    fn second_target_resolves_after_first_edit_shifted_bytes() {
        let fx = Fixture::new(&[("src/Home.tsx", HOME)], "tweak");
        let mut found = targets(&fx, &["title"]);
        found.extend(targets(&fx, &["primary"]));
        assert_eq!(found.len(), 2);
        let synth = Scripted::new(&[
            r#"{"replacement":"<h1 className=\"title text-4xl font-bold\">Welcome aboard</h1>"}"#,
            r#"{"replacement":"<button className=\"primary\">Join</button>"}"#,
        ]);
        let report = NodeEditExecutor.execute(&fx.ctx(&synth), &found).unwrap();
        assert!(report.success);
        assert!(report.skipped.is_empty(), "{:?}", report.skipped);
        let after = fx.cached("src/Home.tsx");
        assert!(after.contains("Welcome aboard"));
        assert!(after.contains(">Join</button>"));
    }

    #[test]
    fn unparseable_replacement_is_skipped_and_nothing_written() {
        let fx = Fixture::new(&[("src/Home.tsx", HOME)], "x");
        let synth = Scripted::new(&[r#"{"replacement":"<button"}"#]);
        let found = targets(&fx, &["button"]);
        let report = NodeEditExecutor.execute(&fx.ctx(&synth), &found).unwrap();
        assert!(!report.success);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(fx.disk("src/Home.tsx"), HOME);
    }

    #[test]
    fn stale_target_is_skipped() {
        let fx = Fixture::new(&[("src/Home.tsx", HOME)], "x");
        let found = targets(&fx, &["button"]);
        fx.cache.put("src/Home.tsx", "export const Gone = 1;\n");
        let report = NodeEditExecutor.execute(&fx.ctx(&Scripted::default()), &found).unwrap();
        assert!(!report.success);
        assert_eq!(report.skipped.len(), 1);
    }

    #[test]
    fn no_targets_is_not_a_success() {
        let fx = Fixture::new(&[("src/Home.tsx", HOME)], "x");
        let report = NodeEditExecutor.execute(&fx.ctx(&Scripted::default()), &[]).unwrap();
        assert!(!report.success);
    }
}
