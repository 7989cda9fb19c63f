//! Project structure mapping: walk a tree, parse sources, categorize imports,
//! enumerate exports, and summarize the layout.

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

use rayon::prelude::*;
use tree_sitter::Node;
use walkdir::WalkDir;

use crate::config::Config;
use crate::error::Error;
use crate::grammar;
use crate::syntax;
use crate::types::{
    CancelFlag, FileEntry, FileMap, ImportCategory, ProjectFile, ProjectStructureMap, StructureSummary,
    StructureValidation,
};

/// Stylesheet names that conventionally hold the styling framework's entry point.
const ROOT_STYLESHEETS: &[&str] = &["App.css", "app.css", "global.css", "globals.css", "index.css"];

/// Entry points that make a `src/` layout recognizable.
const ENTRY_STEMS: &[&str] = &["src/App", "src/index", "src/main", "app/layout", "app/page"];

/// Builds the structural view of a project. Injected into the orchestrator.
pub trait StructureMapper: Send + Sync {
    /// Derive the structure map from cached file contents.
    fn map(&self, files: &FileMap) -> ProjectStructureMap;

    /// Read every relevant file under `root`.
    ///
    /// # Errors
    ///
    /// Returns `Error::Cancelled` if cancelled between files, or `Error::Io`
    /// if `root` itself cannot be walked.
    fn scan(&self, root: &Path, cancel: &CancelFlag) -> Result<FileMap, Error>;
}

/// Filesystem-backed mapper driven by `Config`.
#[derive(Debug, Clone)]
pub struct TreeMapper {
    /// Walk filters and layout conventions.
    config: Config,
}

impl TreeMapper {
    /// A mapper using `config`'s filters.
    pub const fn new(config: Config) -> Self {
        return Self { config };
    }
}

impl StructureMapper for TreeMapper {
    fn map(&self, files: &FileMap) -> ProjectStructureMap {
        return build_structure_map(files, &self.config);
    }

    fn scan(&self, root: &Path, cancel: &CancelFlag) -> Result<FileMap, Error> {
        return scan_tree(root, &self.config, cancel);
    }
}

/// Walk `root` and read every relevant file, in parallel.
///
/// Excluded directories are pruned; only priority directories are descended
/// into, plus files sitting directly in `root`. Unreadable or oversized files
/// are skipped with a warning.
///
/// # Errors
///
/// Returns `Error::Io` if `root` is not a readable directory, or
/// `Error::Cancelled` if cancellation is observed between files.
pub fn scan_tree(root: &Path, config: &Config, cancel: &CancelFlag) -> Result<FileMap, Error> {
    if !root.is_dir() {
        return Err(Error::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("not a directory: {}", root.display()),
        )));
    }
    let paths = collect_candidate_paths(root, config);
    tracing::debug!(root = %root.display(), candidates = paths.len(), "walking project tree");

    let files = paths
        .par_iter()
        .map(|(absolute, relative)| {
            cancel.check("next file scan")?;
            return Ok(read_project_file(absolute, relative));
        })
        .collect::<Result<Vec<Option<ProjectFile>>, Error>>()?;

    return Ok(files
        .into_iter()
        .flatten()
        .map(|file| return (file.path.clone(), file))
        .collect());
}

/// Enumerate `(absolute, relative)` paths the walk should read.
fn collect_candidate_paths(root: &Path, config: &Config) -> Vec<(PathBuf, PathBuf)> {
    let mut paths = Vec::new();
    let walker = WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            if e.depth() == 0 || !e.file_type().is_dir() {
                return true;
            }
            let name = e.file_name().to_string_lossy();
            if config.is_excluded_dir(&name) {
                return false;
            }
            // Only priority trees are descended into from the root.
            return e.depth() > 1 || config.priority_dirs.iter().any(|d| return *d == name);
        });

    for entry in walker.filter_map(Result::ok) {
        if !entry.file_type().is_file() {
            continue;
        }
        let ext = entry.path().extension().and_then(|e| return e.to_str()).unwrap_or("");
        if !config.is_relevant_extension(ext) {
            continue;
        }
        if entry.metadata().is_ok_and(|m| return m.len() > config.max_file_bytes) {
            tracing::debug!(path = %entry.path().display(), "skipping oversized file");
            continue;
        }
        let relative = entry.path().strip_prefix(root).unwrap_or(entry.path()).to_path_buf();
        paths.push((entry.path().to_path_buf(), relative));
    }
    return paths;
}

/// Read one file; `None` (with a warning) if it isn't readable UTF-8.
fn read_project_file(absolute: &Path, relative: &Path) -> Option<ProjectFile> {
    return match std::fs::read_to_string(absolute) {
        Ok(content) => Some(ProjectFile::new(relative, content)),
        Err(e) => {
            tracing::warn!(path = %relative.display(), error = %e, "skipping unreadable file");
            None
        },
    };
}

/// Build the structure map for a set of files. Always terminates with an
/// entry per file: a file that fails to parse gets empty imports/exports and
/// its error recorded, and the others are unaffected.
pub fn build_structure_map(files: &FileMap, config: &Config) -> ProjectStructureMap {
    let mut entries: Vec<FileEntry> = files
        .par_iter()
        .map(|(_path, file)| return analyze_file(file, config))
        .collect();
    entries.sort_by(|a, b| return a.path.cmp(&b.path));

    let validation = validate_layout(files.keys(), config);
    let summary = summarize(files.keys(), validation);
    return ProjectStructureMap {
        files: entries,
        summary,
        validation,
    };
}

/// Structural facts for one file.
fn analyze_file(file: &ProjectFile, config: &Config) -> FileEntry {
    let name = file
        .path
        .file_name()
        .map(|n| return n.to_string_lossy().to_string())
        .unwrap_or_default();

    let mut entry = FileEntry {
        default_export: None,
        exports: Vec::new(),
        file: name.clone(),
        imports: Vec::new(),
        parse_error: None,
        path: file.path.clone(),
    };

    if grammar::is_source_path(&file.path) {
        match extract_source_facts(&file.path, &file.content) {
            Ok(facts) => {
                entry.imports = facts.imports;
                entry.exports = facts.exports;
                entry.default_export = facts.default_export;
            },
            Err(e) => {
                tracing::debug!(path = %file.path.display(), error = %e, "recording file without imports/exports");
                entry.parse_error = Some(e.to_string());
                return entry;
            },
        }
        if config.styling_configs.iter().any(|c| return *c == name) {
            push_unique(&mut entry.imports, ImportCategory::Styling);
        }
        return entry;
    }

    entry.imports = heuristic_tags(&file.path, &name, &file.content);
    return entry;
}

/// Imports and exports extracted from one source file.
#[derive(Debug, Default)]
struct SourceFacts {
    /// Best-effort default export name.
    default_export: Option<String>,
    /// Every exported name.
    exports: Vec<String>,
    /// Deduplicated import categories.
    imports: Vec<ImportCategory>,
}

/// Parse a source file and walk its top-level statements.
///
/// # Errors
///
/// Returns `Error::ParseFailed` if the source contains syntax errors.
fn extract_source_facts(path: &Path, source: &str) -> Result<SourceFacts, Error> {
    let tree = syntax::parse_strict(path, source)?;
    let root = tree.root_node();
    let mut facts = SourceFacts::default();

    let mut cursor = root.walk();
    for node in root.named_children(&mut cursor) {
        match node.kind() {
            "import_statement" => {
                if let Some(spec) = module_specifier(node, source) {
                    push_unique(&mut facts.imports, categorize_import(&spec));
                }
            },
            "export_statement" => collect_export(node, source, path, &mut facts),
            _ => {},
        }
    }
    return Ok(facts);
}

/// The unquoted `source` string of an import or re-export.
fn module_specifier(node: Node<'_>, source: &str) -> Option<String> {
    let raw = syntax::node_text(node.child_by_field_name("source")?, source);
    let unquoted = raw.trim_matches(|c| return c == '"' || c == '\'' || c == '`');
    return if unquoted.is_empty() { None } else { Some(unquoted.to_string()) };
}

/// Record the names exported by one `export_statement`.
fn collect_export(node: Node<'_>, source: &str, path: &Path, facts: &mut SourceFacts) {
    // `export { a } from "./a"` and `export * from "./b"` are imports too.
    if let Some(spec) = module_specifier(node, source) {
        push_unique(&mut facts.imports, categorize_import(&spec));
    }

    let is_default = {
        let mut cursor = node.walk();
        node.children(&mut cursor).any(|c| return c.kind() == "default")
    };

    if let Some(declaration) = node.child_by_field_name("declaration") {
        let names = declaration_names(declaration, source);
        if is_default {
            let name = names.first().cloned().unwrap_or_else(|| return stem_name(path));
            set_default(facts, name);
        } else {
            for name in names {
                push_unique(&mut facts.exports, name);
            }
        }
        return;
    }

    if is_default {
        let name = node
            .child_by_field_name("value")
            .and_then(|value| return default_value_name(value, source))
            .unwrap_or_else(|| return stem_name(path));
        set_default(facts, name);
        return;
    }

    let mut cursor = node.walk();
    for clause in node.named_children(&mut cursor) {
        if clause.kind() != "export_clause" {
            continue;
        }
        let mut inner = clause.walk();
        for specifier in clause.named_children(&mut inner) {
            if specifier.kind() != "export_specifier" {
                continue;
            }
            let name = specifier
                .child_by_field_name("name")
                .map(|n| return syntax::node_text(n, source).to_string());
            let alias = specifier
                .child_by_field_name("alias")
                .map(|n| return syntax::node_text(n, source).to_string());
            match (name, alias) {
                (Some(name), Some(alias)) if alias == "default" => set_default(facts, name),
                (_, Some(alias)) => push_unique(&mut facts.exports, alias),
                (Some(name), None) => push_unique(&mut facts.exports, name),
                (None, None) => {},
            }
        }
    }
}

/// Names declared by an exported declaration node.
fn declaration_names(declaration: Node<'_>, source: &str) -> Vec<String> {
    if matches!(declaration.kind(), "lexical_declaration" | "variable_declaration") {
        let mut cursor = declaration.walk();
        return declaration
            .named_children(&mut cursor)
            .filter(|c| return c.kind() == "variable_declarator")
            .filter_map(|d| return d.child_by_field_name("name"))
            .filter(|n| return n.kind() == "identifier")
            .map(|n| return syntax::node_text(n, source).to_string())
            .collect();
    }
    return syntax::node_name(declaration, source).into_iter().collect();
}

/// Best-effort name for `export default <expr>`.
fn default_value_name(value: Node<'_>, source: &str) -> Option<String> {
    return match value.kind() {
        "identifier" => Some(syntax::node_text(value, source).to_string()),
        // `export default memo(Foo)` and friends: name the wrapped identifier.
        "call_expression" => {
            let arguments = value.child_by_field_name("arguments")?;
            let mut cursor = arguments.walk();
            let first = arguments.named_children(&mut cursor).next()?;
            default_value_name(first, source)
        },
        _ => syntax::node_name(value, source),
    };
}

/// Record the default export, listing its name among the exports too.
fn set_default(facts: &mut SourceFacts, name: String) {
    push_unique(&mut facts.exports, name.clone());
    facts.default_export = Some(name);
}

/// PascalCase name derived from the file stem, for anonymous default exports.
fn stem_name(path: &Path) -> String {
    let stem = path.file_stem().map(|s| return s.to_string_lossy().to_string()).unwrap_or_default();
    let stem = if stem == "index" {
        path.parent()
            .and_then(|p| return p.file_name())
            .map(|n| return n.to_string_lossy().to_string())
            .unwrap_or(stem)
    } else {
        stem
    };
    return pascal_case(&stem);
}

/// `faq-page` → `FaqPage`.
pub fn pascal_case(text: &str) -> String {
    return text
        .split(|c: char| return !c.is_ascii_alphanumeric())
        .filter(|w| return !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            return match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            };
        })
        .collect();
}

/// Classify an import specifier by its shape.
pub fn categorize_import(spec: &str) -> ImportCategory {
    let lower = spec.to_lowercase();
    let data_markers = ["supabase", "prisma", "firebase", "drizzle", "@/integrations", "/integrations/", "mongoose"];
    if data_markers.iter().any(|m| return lower.contains(m)) {
        return ImportCategory::DataLayer;
    }
    if spec.starts_with('.') || spec.starts_with('/') || spec.starts_with("@/") || spec.starts_with("~/") {
        return ImportCategory::Local;
    }
    let package = spec.split('/').next().unwrap_or(spec);
    if matches!(package, "react" | "react-dom" | "react-router" | "react-router-dom" | "next" | "vue" | "svelte") {
        return ImportCategory::Framework;
    }
    if spec.contains("tailwind") {
        return ImportCategory::Styling;
    }
    return ImportCategory::ThirdParty;
}

/// Tags for non-source files, from file name and content conventions.
fn heuristic_tags(path: &Path, name: &str, content: &str) -> Vec<ImportCategory> {
    let mut tags = Vec::new();
    let ext = path.extension().and_then(|e| return e.to_str()).unwrap_or("");
    match ext {
        "css" | "scss" | "sass" | "less" => {
            if ROOT_STYLESHEETS.contains(&name) || content.contains("@tailwind") || content.contains("tailwindcss") {
                tags.push(ImportCategory::Styling);
            }
            if content.contains("@import \".") || content.contains("@import '.") {
                push_unique(&mut tags, ImportCategory::Local);
            }
        },
        "sql" => tags.push(ImportCategory::DataLayer),
        "html" => {
            if content.contains("<script") && content.contains("src=\"/src/") {
                tags.push(ImportCategory::Local);
            }
        },
        _ => {},
    }
    return tags;
}

/// Push `item` if it isn't already present, keeping first-appearance order.
fn push_unique<T: PartialEq>(items: &mut Vec<T>, item: T) {
    if !items.contains(&item) {
        items.push(item);
    }
}

/// `/`-separated form of a relative path, for prefix checks.
fn slash_path(path: &Path) -> String {
    return path
        .components()
        .filter_map(|c| {
            return match c {
                Component::Normal(s) => Some(s.to_string_lossy().to_string()),
                _ => None,
            };
        })
        .collect::<Vec<_>>()
        .join("/");
}

/// Evaluate the layout flags.
fn validate_layout<'a>(paths: impl Iterator<Item = &'a PathBuf>, config: &Config) -> StructureValidation {
    let slashed: Vec<String> = paths.map(|p| return slash_path(p)).collect();

    let file_structure = slashed.iter().any(|p| {
        let stem = p.rsplit_once('.').map_or(p.as_str(), |(stem, _ext)| return stem);
        return ENTRY_STEMS.contains(&stem);
    });
    let data_layer_present = slashed.iter().any(|p| {
        return config
            .data_layer_dirs
            .iter()
            .any(|d| return p.starts_with(&format!("{}/", d.trim_end_matches('/'))));
    });
    let styling_config_present = slashed
        .iter()
        .any(|p| return config.styling_configs.iter().any(|c| return c == p));

    return StructureValidation {
        data_layer_present,
        file_structure,
        styling_config_present,
    };
}

/// Extension histogram and depth.
fn summarize<'a>(paths: impl Iterator<Item = &'a PathBuf>, validation: StructureValidation) -> StructureSummary {
    let mut files_by_type: BTreeMap<String, usize> = BTreeMap::new();
    let mut structure_depth = 0;
    let mut total_files = 0_usize;
    for path in paths {
        total_files = total_files.saturating_add(1);
        let ext = path
            .extension()
            .map_or_else(|| return "none".to_string(), |e| return e.to_string_lossy().to_lowercase());
        let count = files_by_type.entry(ext).or_insert(0);
        *count = count.saturating_add(1);
        structure_depth = structure_depth.max(path.components().count());
    }
    return StructureSummary {
        files_by_type,
        has_valid_structure: validation.file_structure,
        structure_depth,
        total_files,
    };
}
