use std::path::PathBuf;

use super::{ExecutionContext, ExecutionReport, commit_file};
use crate::error::Error;

/// Directory the placeholder unit is written to.
const PLACEHOLDER_DIR: &str = "src/components";

/// Base name of the placeholder unit.
const PLACEHOLDER_NAME: &str = "ModificationPlaceholder";

/// Suffixes tried before giving up.
const MAX_SLOTS: u32 = 50;

/// Write a minimal placeholder unit recording the request. No synthesis
/// and no parse round-trip; errors are returned, never swallowed.
///
/// # Errors
///
/// Returns `Error::WriteFailed` or `Error::Json` when the file cannot be
/// produced, including when every placeholder name is taken.
pub fn write_placeholder(ctx: &ExecutionContext<'_>) -> Result<ExecutionReport, Error> {
    let (name, path) = free_slot(ctx)?;
    let request = serde_json::to_string(&ctx.request.natural_language_request)?;
    let content = format!(
        "const pendingRequest = {request};\n\nexport default function {name}() {{\n  return <div data-pending-request={{pendingRequest}}>This change is being prepared.</div>;\n}}\n"
    );
    let kind = commit_file(ctx, &path, &content)?;

    let mut report = ExecutionReport::default();
    report.record(&path, kind);
    report.success = true;
    report.detail = format!("wrote placeholder {}", path.display());
    tracing::warn!(file = %path.display(), "emergency placeholder written");
    return Ok(report);
}

/// First `ModificationPlaceholder{,2,3,..}` name not taken on disk or in the cache.
///
/// # Errors
///
/// Returns `Error::WriteFailed` when all `MAX_SLOTS` names are taken.
fn free_slot(ctx: &ExecutionContext<'_>) -> Result<(String, PathBuf), Error> {
    for suffix in 1..=MAX_SLOTS {
        let name = if suffix == 1 {
            PLACEHOLDER_NAME.to_string()
        } else {
            format!("{PLACEHOLDER_NAME}{suffix}")
        };
        let path = PathBuf::from(PLACEHOLDER_DIR).join(format!("{name}.tsx"));
        if ctx.cache.file(&path).is_none() && !ctx.workspace.exists(&path) {
            return Ok((name, path));
        }
    }
    return Err(Error::WriteFailed {
        path: PathBuf::from(PLACEHOLDER_DIR),
        source: std::io::Error::new(
            std::io::ErrorKind::AlreadyExists,
            format!("all {MAX_SLOTS} placeholder names are taken"),
        ),
    });
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::super::testing::{Fixture, Scripted};
    use super::*;
    use crate::syntax;

    #[test]
    fn placeholder_is_new_valid_source() {
        let fx = Fixture::new(&[], "make it \"pop\" {now}");
        let report = write_placeholder(&fx.ctx(&Scripted::default())).unwrap();
        let path = Path::new("src/components/ModificationPlaceholder.tsx");
        assert_eq!(report.files_added, vec![path.to_path_buf()]);
        let content = fx.cached("src/components/ModificationPlaceholder.tsx");
        assert!(syntax::parse_strict(path, &content).is_ok());
    }

    #[test]
    fn existing_placeholder_gets_a_suffix() {
        let fx = Fixture::new(&[("src/components/ModificationPlaceholder.tsx", "x")], "x");
        let report = write_placeholder(&fx.ctx(&Scripted::default())).unwrap();
        assert_eq!(report.files_added, vec![PathBuf::from("src/components/ModificationPlaceholder2.tsx")]);
        assert!(fx.disk("src/components/ModificationPlaceholder2.tsx").contains("function ModificationPlaceholder2()"));
    }

    #[test]
    fn gives_up_when_every_slot_is_taken() {
        let paths: Vec<String> = (1..=MAX_SLOTS)
            .map(|n| match n {
                1 => "src/components/ModificationPlaceholder.tsx".to_string(),
                n => format!("src/components/ModificationPlaceholder{n}.tsx"),
            })
            .collect();
        let files: Vec<(&str, &str)> = paths.iter().map(|p| (p.as_str(), "x")).collect();
        let fx = Fixture::new(&files, "x");
        let err = write_placeholder(&fx.ctx(&Scripted::default())).unwrap_err();
        assert!(matches!(err, Error::WriteFailed { .. }));
    }
}
