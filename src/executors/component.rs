use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use super::{ComponentSynthesis, ExecutionContext, ExecutionReport, commit_file};
use crate::error::Error;
use crate::grammar;
use crate::synthesis::{self, ComponentPlan, Excerpt, SynthesisRequest, SynthesisTask};
use crate::syntax;
use crate::types::FileMap;

/// Asks for a new unit plus an integration plan, then splices the plan in.
#[derive(Debug, Clone, Copy, Default)]
pub struct ComponentSynthesisExecutor;

impl ComponentSynthesis for ComponentSynthesisExecutor {
    fn execute(&self, ctx: &ExecutionContext<'_>) -> Result<ExecutionReport, Error> {
        let snapshot = ctx.cache.get();

        // Phase 1: synthesis.
        let excerpts: Vec<Excerpt> = snapshot
            .values()
            .filter(|f| return grammar::is_source_path(&f.path) && f.content.contains("<Route"))
            .map(|f| {
                return Excerpt {
                    path: f.path.clone(),
                    text: f.content.clone(),
                };
            })
            .collect();
        let request = SynthesisRequest {
            excerpts,
            instructions: format!(
                "Create one self-contained unit for: {}\nReply with {{\"component\": {{\"name\", \"path\", \"content\"}}, \"integration\": {{\"route\": {{\"file\", \"path\"}}, \"import\": {{\"file\", \"line\"}}}}}}.",
                ctx.request.natural_language_request
            ),
            project_summary: ctx.summary.to_string(),
            task: SynthesisTask::ComponentPlan,
        };
        let raw = ctx.synthesizer.synthesize(&request)?;
        let plan: ComponentPlan = synthesis::parse_response(&raw)?;
        check_plan(ctx, &plan)?;
        ctx.cancel.check("component integration")?;

        // Phase 2: deterministic integration.
        let integrated = apply_integration(&plan, &snapshot)?;
        for (path, content) in &integrated {
            synthesis::check_content(path, content)?;
        }

        let mut report = ExecutionReport::default();
        let kind = commit_file(ctx, &plan.component.path, &plan.component.content)?;
        report.record(&plan.component.path, kind);
        for (path, content) in integrated {
            let kind = commit_file(ctx, &path, &content)?;
            report.record(&path, kind);
        }

        report.success = true;
        report.detail = format!(
            "added `{}` at {} and integrated into {} file(s)",
            plan.component.name,
            plan.component.path.display(),
            report.files_modified.len()
        );
        tracing::info!(component = %plan.component.name, "component synthesized");
        return Ok(report);
    }
}

/// Reject plans whose unit cannot be written or referenced, or whose unit
/// would replace a different existing file.
fn check_plan(ctx: &ExecutionContext<'_>, plan: &ComponentPlan) -> Result<(), Error> {
    let name = &plan.component.name;
    let is_identifier = name.chars().next().is_some_and(|c| return c.is_ascii_uppercase())
        && name.chars().all(|c| return c.is_ascii_alphanumeric() || c == '_');
    if !is_identifier {
        return Err(Error::synthesis(format!("component name `{name}` is not a valid identifier")));
    }
    synthesis::check_content(&plan.component.path, &plan.component.content)?;
    let existing = match ctx.cache.file(&plan.component.path) {
        Some(file) => Some(file.content),
        None if ctx.workspace.exists(&plan.component.path) => Some(ctx.workspace.read(&plan.component.path)?),
        None => None,
    };
    if let Some(content) = existing
        && content != plan.component.content
    {
        return Err(Error::synthesis(format!(
            "component path {} already holds a different file",
            plan.component.path.display()
        )));
    }
    if let Some(route) = &plan.integration.route
        && !route.path.starts_with('/')
    {
        return Err(Error::synthesis(format!("route path `{}` must start with `/`", route.path)));
    }
    return Ok(());
}

/// Compute the integration edits of a plan against `files`. Returns only the
/// files whose content changes, so applying a plan that is already in place
/// yields nothing.
///
/// # Errors
///
/// Returns `Error::SynthesisFailed` when a target file is not in the project
/// or has no place for a route.
pub fn apply_integration(plan: &ComponentPlan, files: &FileMap) -> Result<BTreeMap<PathBuf, String>, Error> {
    let mut edits: BTreeMap<PathBuf, String> = BTreeMap::new();
    let current = |edits: &BTreeMap<PathBuf, String>, path: &Path| -> Result<String, Error> {
        if let Some(text) = edits.get(path) {
            return Ok(text.clone());
        }
        return files
            .get(path)
            .map(|f| return f.content.clone())
            .ok_or_else(|| return Error::synthesis(format!("integration target {} is not in the project", path.display())));
    };

    if let Some(import) = &plan.integration.import {
        let content = current(&edits, &import.file)?;
        if let Some(updated) = insert_import(&import.file, &content, &import.line) {
            edits.insert(import.file.clone(), updated);
        }
    }
    if let Some(route) = &plan.integration.route {
        let content = current(&edits, &route.file)?;
        if let Some(updated) = insert_route(&route.file, &content, &route.path, &plan.component.name)? {
            edits.insert(route.file.clone(), updated);
        }
    }
    return Ok(edits);
}

/// Add `line` after the last import statement, unless it is already there.
fn insert_import(path: &Path, content: &str, line: &str) -> Option<String> {
    let line = line.trim();
    if content.lines().any(|l| return l.trim() == line) {
        return None;
    }
    let last_import_end = syntax::parse_strict(path, content).ok().and_then(|tree| {
        let root = tree.root_node();
        let mut cursor = root.walk();
        return root
            .named_children(&mut cursor)
            .filter(|n| return n.kind() == "import_statement")
            .last()
            .map(|n| return n.end_byte());
    });
    let Some(end) = last_import_end else {
        return Some(format!("{line}\n{content}"));
    };
    let (before, after) = content.split_at(end);
    return Some(format!("{before}\n{line}{after}"));
}

/// Add a `<Route>` for `route_path` before the catch-all route or the closing
/// `</Routes>`, copying indentation. `None` if the path is already routed.
fn insert_route(path: &Path, content: &str, route_path: &str, name: &str) -> Result<Option<String>, Error> {
    let routed = [format!("path=\"{route_path}\""), format!("path='{route_path}'"), format!("path: \"{route_path}\"")];
    if routed.iter().any(|r| return content.contains(r.as_str())) {
        return Ok(None);
    }

    let lines: Vec<&str> = content.lines().collect();
    let indent_of = |l: &str| return l.get(..l.len().saturating_sub(l.trim_start().len())).unwrap_or("").to_string();
    let anchor = lines
        .iter()
        .position(|l| return l.contains("path=\"*\""))
        .map(|i| return (i, indent_of(lines.get(i).copied().unwrap_or(""))))
        .or_else(|| {
            let i = lines.iter().position(|l| return l.contains("</Routes>"))?;
            return Some((i, format!("{}  ", indent_of(lines.get(i).copied().unwrap_or("")))));
        });
    let Some((at, indent)) = anchor else {
        return Err(Error::synthesis(format!("no route table found in {}", path.display())));
    };

    let entry = format!("{indent}<Route path=\"{route_path}\" element={{<{name} />}} />");
    let mut out: Vec<&str> = Vec::with_capacity(lines.len().saturating_add(1));
    out.extend(lines.get(..at).unwrap_or(&[]));
    out.push(&entry);
    out.extend(lines.get(at..).unwrap_or(&[]));
    let mut joined = out.join("\n");
    if content.ends_with('\n') {
        joined.push('\n');
    }
    return Ok(Some(joined));
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::super::testing::{Fixture, Scripted};
    use super::*;
    use crate::executors::count_occurrences;
    use crate::synthesis::{ComponentUnit, ImportSite, IntegrationPlan, RouteEntry};
    use crate::types::ProjectFile;

    const APP: &str = r#"import { Routes, Route } from "react-router-dom";
import Home from "./pages/Home";

export default function App() {
  return (
    <Routes>
      <Route path="/" element={<Home />} />
      <Route path="*" element={<Home />} />
    </Routes>
  );
}
"#;

    const FAQ: &str = "export default function Faq() {\n  return <h1>FAQ</h1>;\n}\n";

    fn plan() -> ComponentPlan {
        ComponentPlan {
            component: ComponentUnit {
                content: FAQ.to_string(),
                name: "Faq".to_string(),
                path: PathBuf::from("src/pages/Faq.tsx"),
            },
            integration: IntegrationPlan {
                import: Some(ImportSite {
                    file: PathBuf::from("src/App.tsx"),
                    line: "import Faq from \"./pages/Faq\";".to_string(),
                }),
                route: Some(RouteEntry { file: PathBuf::from("src/App.tsx"), path: "/faq".to_string() }),
            },
        }
    }

    #[test]
    fn integration_is_idempotent() {
        let mut files = FileMap::new();
        files.insert(PathBuf::from("src/App.tsx"), ProjectFile::new("src/App.tsx", APP));

        let first = apply_integration(&plan(), &files).unwrap();
        let updated = first.get(Path::new("src/App.tsx")).unwrap().clone();
        assert_eq!(count_occurrences(&updated, "path=\"/faq\""), 1);
        assert_eq!(count_occurrences(&updated, "import Faq from"), 1);
        assert!(updated.contains("      <Route path=\"/faq\" element={<Faq />} />\n      <Route path=\"*\""));
        assert!(syntax::parse_strict(Path::new("src/App.tsx"), &updated).is_ok());

        files.insert(PathBuf::from("src/App.tsx"), ProjectFile::new("src/App.tsx", updated.clone()));
        let second = apply_integration(&plan(), &files).unwrap();
        assert!(second.is_empty());
    }

    #[test]
    fn route_goes_before_closing_tag_without_catch_all() {
        let app = APP.replace("      <Route path=\"*\" element={<Home />} />\n", "");
        let out = insert_route(Path::new("src/App.tsx"), &app, "/faq", "Faq").unwrap().unwrap();
        assert!(out.contains("      <Route path=\"/faq\" element={<Faq />} />\n    </Routes>"));
    }

    #[test]
    fn file_without_imports_gets_import_prepended() {
        let out = insert_import(Path::new("src/main.tsx"), "export const a = 1;\n", "import x from \"./x\";").unwrap();
        assert_eq!(out, "import x from \"./x\";\nexport const a = 1;\n");
    }

    #[test]
    fn executor_writes_unit_and_route_table() {
        let fx = Fixture::new(&[("src/App.tsx", APP)], "add a FAQ page");
        let reply = serde_json::to_string(&plan()).unwrap();
        let synth = Scripted::new(&[&reply]);
        let report = ComponentSynthesisExecutor.execute(&fx.ctx(&synth)).unwrap();

        assert!(report.success);
        assert_eq!(report.files_added, vec![PathBuf::from("src/pages/Faq.tsx")]);
        assert_eq!(report.files_modified, vec![PathBuf::from("src/App.tsx")]);
        assert_eq!(fx.disk("src/pages/Faq.tsx"), FAQ);
        assert_eq!(count_occurrences(&fx.disk("src/App.tsx"), "<Route "), 3);
    }

    #[test]
    fn unknown_integration_target_fails_before_writing() {
        let fx = Fixture::new(&[("src/App.tsx", APP)], "add a FAQ page");
        let mut bad = plan();
        bad.integration.route = Some(RouteEntry { file: PathBuf::from("src/Router.tsx"), path: "/faq".to_string() });
        let reply = serde_json::to_string(&bad).unwrap();
        let err = ComponentSynthesisExecutor.execute(&fx.ctx(&Scripted::new(&[&reply]))).unwrap_err();
        assert!(matches!(err, Error::SynthesisFailed { .. }));
        assert!(!fx.dir.path().join("src/pages/Faq.tsx").exists());
    }

    #[test]
    fn invalid_component_name_is_rejected() {
        let fx = Fixture::new(&[("src/App.tsx", APP)], "add a FAQ page");
        let mut bad = plan();
        bad.component.name = "faq-page".to_string();
        assert!(check_plan(&fx.ctx(&Scripted::default()), &bad).is_err());
    }

    #[test]
    fn plan_aimed_at_an_existing_file_is_rejected() {
        let home = "export default function Home() {\n  return <h1>Home</h1>;\n}\n";
        let fx = Fixture::new(&[("src/App.tsx", APP), ("src/pages/Home.tsx", home)], "add a FAQ page");
        let mut bad = plan();
        bad.component.path = PathBuf::from("src/pages/Home.tsx");
        let reply = serde_json::to_string(&bad).unwrap();
        let err = ComponentSynthesisExecutor.execute(&fx.ctx(&Scripted::new(&[&reply]))).unwrap_err();
        assert!(matches!(err, Error::SynthesisFailed { .. }));
        assert_eq!(fx.disk("src/pages/Home.tsx"), home);
        assert_eq!(fx.disk("src/App.tsx"), APP);
    }

    #[test]
    fn reapplying_the_same_plan_is_accepted() {
        let fx = Fixture::new(&[("src/App.tsx", APP), ("src/pages/Faq.tsx", FAQ)], "add a FAQ page");
        assert!(check_plan(&fx.ctx(&Scripted::default()), &plan()).is_ok());
    }
}
