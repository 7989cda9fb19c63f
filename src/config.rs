use std::path::Path;

use crate::error::Error;

/// Name of the per-project config file.
pub const CONFIG_FILE: &str = ".amend.toml";

/// Project configuration loaded from `.amend.toml`.
/// Every key is optional; unspecified keys keep their defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Directories whose files hint at a backend/data layer.
    pub data_layer_dirs: Vec<String>,
    /// Directory names never descended into.
    pub exclude_dirs: Vec<String>,
    /// File extensions (without dot) that are mapped and cached.
    pub extensions: Vec<String>,
    /// Files larger than this are skipped by the mapper.
    pub max_file_bytes: u64,
    /// JSON file of earlier generation output, relative to the project root.
    pub project_history: Option<String>,
    /// Top-level directories walked recursively. Root-level files are always considered.
    pub priority_dirs: Vec<String>,
    /// How many history entries are re-injected into classification.
    pub recent_history: usize,
    /// Upper bound on files handed to whole-file regeneration.
    pub regen_max_files: usize,
    /// Idle time after which a session is torn down.
    pub session_ttl_secs: u64,
    /// Global stylesheet candidates, first existing one wins.
    pub stylesheet_files: Vec<String>,
    /// File names that mark a styling framework config.
    pub styling_configs: Vec<String>,
    /// External synthesis program, run through the shell.
    pub synth_command: Option<String>,
    /// Design-token definition candidates, first existing one wins.
    pub token_files: Vec<String>,
}

/// Raw TOML structure for `.amend.toml`.
#[derive(serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct AmendTomlConfig {
    data_layer_dirs: Option<Vec<String>>,
    exclude_dirs: Option<Vec<String>>,
    extensions: Option<Vec<String>>,
    max_file_bytes: Option<u64>,
    priority_dirs: Option<Vec<String>>,
    project_history: Option<String>,
    recent_history: Option<usize>,
    regen_max_files: Option<usize>,
    session_ttl_secs: Option<u64>,
    stylesheet_files: Option<Vec<String>>,
    styling_configs: Option<Vec<String>>,
    synth_command: Option<String>,
    token_files: Option<Vec<String>>,
}

/// Turn a static list into owned strings.
fn owned(items: &[&str]) -> Vec<String> {
    return items.iter().map(|s| return (*s).to_string()).collect();
}

impl Default for Config {
    fn default() -> Self {
        return Self {
            data_layer_dirs: owned(&["supabase", "src/integrations", "prisma", "src/lib/db"]),
            exclude_dirs: owned(&[
                ".amend", ".git", ".next", ".turbo", "build", "coverage", "dist", "node_modules", "out", "target",
            ]),
            extensions: owned(&[
                "cjs", "css", "html", "js", "json", "jsx", "mjs", "scss", "sql", "ts", "tsx",
            ]),
            max_file_bytes: 1024 * 1024,
            priority_dirs: owned(&["app", "components", "pages", "public", "src", "supabase"]),
            project_history: None,
            recent_history: 5,
            regen_max_files: 3,
            session_ttl_secs: 60 * 60,
            stylesheet_files: owned(&[
                "src/index.css",
                "src/globals.css",
                "src/styles/globals.css",
                "app/globals.css",
                "src/App.css",
            ]),
            styling_configs: owned(&[
                "tailwind.config.ts",
                "tailwind.config.js",
                "tailwind.config.cjs",
                "tailwind.config.mjs",
                "postcss.config.js",
                "postcss.config.cjs",
            ]),
            synth_command: None,
            token_files: owned(&[
                "tailwind.config.ts",
                "tailwind.config.js",
                "tailwind.config.cjs",
                "tailwind.config.mjs",
                "src/theme.ts",
            ]),
        };
    }
}

impl Config {
    /// Load config from `.amend.toml` in the given root directory.
    /// Returns the defaults if the file doesn't exist.
    /// Returns an error if the file exists but is malformed; never silently
    /// falls back to defaults when the user wrote a config file.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if reading fails (other than not-found),
    /// or `Error::TomlDe` if the TOML is malformed.
    pub fn load(root: &Path) -> Result<Self, Error> {
        let path = root.join(CONFIG_FILE);
        let content = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(Error::Io(e)),
        };

        return Self::parse(&content);
    }

    /// Parse config from TOML text, layering it over the defaults.
    ///
    /// # Errors
    ///
    /// Returns `Error::TomlDe` if the TOML is malformed or has unknown keys.
    pub fn parse(content: &str) -> Result<Self, Error> {
        let raw: AmendTomlConfig = toml::from_str(content)?;
        let defaults = Self::default();
        return Ok(Self {
            data_layer_dirs: raw.data_layer_dirs.unwrap_or(defaults.data_layer_dirs),
            exclude_dirs: raw.exclude_dirs.unwrap_or(defaults.exclude_dirs),
            extensions: raw.extensions.unwrap_or(defaults.extensions),
            max_file_bytes: raw.max_file_bytes.unwrap_or(defaults.max_file_bytes),
            priority_dirs: raw.priority_dirs.unwrap_or(defaults.priority_dirs),
            project_history: raw.project_history.or(defaults.project_history),
            recent_history: raw.recent_history.unwrap_or(defaults.recent_history),
            regen_max_files: raw.regen_max_files.unwrap_or(defaults.regen_max_files).max(1),
            session_ttl_secs: raw.session_ttl_secs.unwrap_or(defaults.session_ttl_secs),
            stylesheet_files: raw.stylesheet_files.unwrap_or(defaults.stylesheet_files),
            styling_configs: raw.styling_configs.unwrap_or(defaults.styling_configs),
            synth_command: raw.synth_command.or(defaults.synth_command),
            token_files: raw.token_files.unwrap_or(defaults.token_files),
        });
    }

    /// Whether a directory name is excluded from the walk.
    pub fn is_excluded_dir(&self, name: &str) -> bool {
        return self.exclude_dirs.iter().any(|d| return d == name);
    }

    /// Whether a file extension is mapped.
    pub fn is_relevant_extension(&self, ext: &str) -> bool {
        return self.extensions.iter().any(|e| return e.eq_ignore_ascii_case(ext));
    }
}
