use std::path::PathBuf;

use super::{ExecutionContext, ExecutionReport, WholeFileRegen, commit_file, request_keywords};
use crate::error::Error;
use crate::grammar;
use crate::synthesis::{self, Excerpt, FileRewrites, SynthesisRequest, SynthesisTask};
use crate::types::FileMap;

/// Entry points tried when nothing in the project matches the request.
const ENTRY_POINTS: &[&str] = &["src/App.tsx", "src/App.jsx", "src/main.tsx", "src/index.tsx", "app/page.tsx"];

/// Regenerates whole files. The last strategy before the placeholder.
#[derive(Debug, Clone, Copy, Default)]
pub struct WholeFileRegenExecutor;

impl WholeFileRegen for WholeFileRegenExecutor {
    fn execute(&self, ctx: &ExecutionContext<'_>, hints: &[PathBuf]) -> Result<ExecutionReport, Error> {
        let snapshot = ctx.cache.get();
        let chosen = choose_files(&snapshot, hints, &ctx.request.natural_language_request, ctx.config.regen_max_files);
        let request = SynthesisRequest {
            excerpts: regen_excerpts(ctx, &snapshot, &chosen),
            instructions: format!(
                "Apply this change by rewriting whole files: {}\nA path listed twice is shown first as it is now, then as originally generated.\nReply with {{\"files\": [{{\"path\", \"content\"}}]}} holding the complete new content of every file you change.",
                ctx.request.natural_language_request
            ),
            project_summary: ctx.summary.to_string(),
            task: SynthesisTask::FileRegen,
        };
        let raw = ctx.synthesizer.synthesize(&request)?;
        let rewrites: FileRewrites = synthesis::parse_response(&raw)?;
        if rewrites.files.is_empty() {
            return Err(Error::synthesis("regeneration returned no files"));
        }

        let mut report = ExecutionReport::default();
        for file in &rewrites.files {
            if ctx.cancel.is_cancelled() {
                report.skip(format!("{}: cancelled before write", file.path.display()));
                break;
            }
            if let Err(e) = synthesis::check_content(&file.path, &file.content) {
                report.skip(format!("{}: {e}", file.path.display()));
                continue;
            }
            match commit_file(ctx, &file.path, &file.content) {
                Ok(kind) => report.record(&file.path, kind),
                Err(e) if e.is_item_level() || matches!(e, Error::PathOutsideRoot { .. }) => {
                    report.skip(format!("{}: {e}", file.path.display()));
                },
                Err(e) => return Err(e),
            }
        }

        if report.files_modified.is_empty() && report.files_added.is_empty() {
            return Err(Error::synthesis(format!(
                "no regenerated file was usable ({})",
                report.skipped.join("; ")
            )));
        }
        report.success = true;
        report.detail = format!(
            "regenerated {} file(s), added {}",
            report.files_modified.len(),
            report.files_added.len()
        );
        tracing::info!(modified = report.files_modified.len(), added = report.files_added.len(), "whole-file regeneration done");
        return Ok(report);
    }
}

/// Current content of every chosen file, followed by the originally
/// generated version of those files when the request names a project.
fn regen_excerpts(ctx: &ExecutionContext<'_>, files: &FileMap, chosen: &[PathBuf]) -> Vec<Excerpt> {
    let mut excerpts: Vec<Excerpt> = chosen
        .iter()
        .filter_map(|p| return files.get(p))
        .map(|f| {
            return Excerpt {
                path: f.path.clone(),
                text: f.content.clone(),
            };
        })
        .collect();
    if let Some(project_id) = ctx.request.project_id.as_deref() {
        let originals = ctx.project_history.generated_files(project_id);
        excerpts.extend(
            originals
                .into_iter()
                .filter(|(path, _)| return chosen.contains(path))
                .map(|(path, text)| return Excerpt { path, text }),
        );
    }
    return excerpts;
}

/// Hinted files first, then files ranked by request keyword hits, then the
/// project entry point. At most `limit` files.
fn choose_files(files: &FileMap, hints: &[PathBuf], request: &str, limit: usize) -> Vec<PathBuf> {
    let mut chosen: Vec<PathBuf> = Vec::new();
    for hint in hints {
        if files.contains_key(hint) && !chosen.contains(hint) {
            chosen.push(hint.clone());
        }
    }

    let keywords = request_keywords(request);
    let mut scored: Vec<(usize, &PathBuf)> = files
        .values()
        .filter(|f| return grammar::is_source_path(&f.path) || grammar::is_stylesheet_path(&f.path))
        .map(|f| {
            let haystack = format!("{} {}", f.path.display(), f.content).to_lowercase();
            let hits = keywords.iter().filter(|k| return haystack.contains(k.as_str())).count();
            return (hits, &f.path);
        })
        .filter(|(hits, _)| return *hits > 0)
        .collect();
    scored.sort_by(|a, b| return b.0.cmp(&a.0).then_with(|| return a.1.cmp(b.1)));
    for (_, path) in scored {
        if !chosen.contains(path) {
            chosen.push(path.clone());
        }
    }

    if chosen.is_empty()
        && let Some(entry) = ENTRY_POINTS.iter().map(PathBuf::from).find(|p| return files.contains_key(p))
    {
        chosen.push(entry);
    }
    chosen.truncate(limit.max(1));
    return chosen;
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use pretty_assertions::assert_eq;

    use super::super::testing::{Fixture, Scripted};
    use super::*;
    use crate::project_history::JsonProjectHistory;
    use crate::types::ProjectFile;

    fn map(paths: &[(&str, &str)]) -> FileMap {
        paths.iter().map(|(p, c)| (PathBuf::from(p), ProjectFile::new(*p, *c))).collect()
    }

    #[test]
    fn hints_then_keyword_hits_then_entry_point() {
        let files = map(&[
            ("src/App.tsx", "export default function App() {}"),
            ("src/components/Pricing.tsx", "export const Pricing = () => null; // pricing tiers"),
            ("src/components/Footer.tsx", "export const Footer = () => null;"),
        ]);
        let chosen = choose_files(&files, &[PathBuf::from("src/components/Footer.tsx")], "rework the pricing tiers", 3);
        assert_eq!(chosen, vec![PathBuf::from("src/components/Footer.tsx"), PathBuf::from("src/components/Pricing.tsx")]);

        let fallback = choose_files(&files, &[], "zzz", 3);
        assert_eq!(fallback, vec![PathBuf::from("src/App.tsx")]);
    }

    #[test]
    fn regenerates_valid_files_and_skips_broken_ones() {
        let fx = Fixture::new(&[("src/App.tsx", "export default function App() { return null; }\n")], "rework app");
        let reply = serde_json::json!({"files": [
            {"path": "src/App.tsx", "content": "export default function App() { return <main />; }\n"},
            {"path": "src/Broken.tsx", "content": "export default function ("},
        ]})
        .to_string();
        let report = WholeFileRegenExecutor.execute(&fx.ctx(&Scripted::new(&[&reply])), &[]).unwrap();
        assert!(report.success);
        assert_eq!(report.files_modified, vec![PathBuf::from("src/App.tsx")]);
        assert_eq!(report.skipped.len(), 1);
        assert!(!fx.dir.path().join("src/Broken.tsx").exists());
        assert!(fx.cache.file(Path::new("src/Broken.tsx")).is_none());
    }

    #[test]
    fn original_generation_is_appended_for_chosen_files() {
        let mut fx = Fixture::new(&[("src/App.tsx", "export default function App() { return <main />; }\n")], "rework app");
        fx.request.project_id = Some("p1".to_string());
        fx.project_history = Box::new(
            JsonProjectHistory::parse(
                r#"{"p1": {"files": {"src/App.tsx": "export default function App() {}\n", "src/Old.tsx": "x"}}}"#,
            )
            .unwrap(),
        );
        let excerpts = regen_excerpts(&fx.ctx(&Scripted::default()), &fx.cache.get(), &[PathBuf::from("src/App.tsx")]);
        let texts: Vec<&str> = excerpts.iter().map(|e| e.text.as_str()).collect();
        assert_eq!(
            texts,
            vec!["export default function App() { return <main />; }\n", "export default function App() {}\n"]
        );

        fx.request.project_id = None;
        let excerpts = regen_excerpts(&fx.ctx(&Scripted::default()), &fx.cache.get(), &[PathBuf::from("src/App.tsx")]);
        assert_eq!(excerpts.len(), 1);
    }

    #[test]
    fn empty_or_unusable_response_is_an_error() {
        let fx = Fixture::new(&[("src/App.tsx", "export default function App() {}\n")], "x");
        let empty = WholeFileRegenExecutor.execute(&fx.ctx(&Scripted::new(&[r#"{"files":[]}"#])), &[]);
        assert!(matches!(empty, Err(Error::SynthesisFailed { .. })));
        let outside = r#"{"files":[{"path":"../escape.ts","content":"export const a = 1;"}]}"#;
        assert!(WholeFileRegenExecutor.execute(&fx.ctx(&Scripted::new(&[outside])), &[]).is_err());
    }
}
