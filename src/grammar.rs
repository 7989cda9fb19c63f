/// Tree-sitter grammar resolution by file extension.
use std::path::Path;

use tree_sitter::Language;

use crate::error::Error;

/// Extensions parsed as source code (imports/exports are extracted from these).
pub const SOURCE_EXTENSIONS: &[&str] = &["cjs", "cts", "js", "jsx", "mjs", "mts", "ts", "tsx"];

/// Map a file extension to its tree-sitter language.
///
/// Plain JavaScript goes through the TSX grammar since generated projects
/// routinely put JSX in `.js` files.
///
/// # Errors
///
/// Returns `Error::UnsupportedLanguage` for unknown extensions.
pub fn language_for_path(path: &Path) -> Result<Language, Error> {
    let ext = path.extension().and_then(|e| return e.to_str()).unwrap_or("");

    return match ext {
        "cts" | "mts" | "ts" => Ok(tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into()),
        "cjs" | "js" | "jsx" | "mjs" | "tsx" => Ok(tree_sitter_typescript::LANGUAGE_TSX.into()),
        _ => Err(Error::UnsupportedLanguage {
            ext: ext.to_string(),
        }),
    };
}

/// Whether a path has one of the source extensions.
pub fn is_source_path(path: &Path) -> bool {
    return path
        .extension()
        .and_then(|e| return e.to_str())
        .is_some_and(|ext| return SOURCE_EXTENSIONS.contains(&ext));
}

/// Whether a path is a stylesheet.
pub fn is_stylesheet_path(path: &Path) -> bool {
    return path
        .extension()
        .and_then(|e| return e.to_str())
        .is_some_and(|ext| return matches!(ext, "css" | "scss" | "sass" | "less"));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jsx_family_resolves() {
        for name in ["App.tsx", "main.jsx", "util.js", "types.ts"] {
            assert!(language_for_path(Path::new(name)).is_ok(), "{name}");
        }
    }

    #[test]
    fn stylesheets_have_no_grammar() {
        let err = language_for_path(Path::new("src/index.css")).unwrap_err();
        assert!(matches!(err, Error::UnsupportedLanguage { ext } if ext == "css"));
        assert!(is_stylesheet_path(Path::new("src/index.css")));
        assert!(!is_source_path(Path::new("src/index.css")));
    }
}
