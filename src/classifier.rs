//! Request → `ModificationScope` classification.
//!
//! Rules are checked once, in order, and the first match wins:
//! literal rename, targeted edit, new surface, design tokens, whole file.

use std::path::PathBuf;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::Error;
use crate::grammar;
use crate::syntax;
use crate::types::{
    FileMap, ModificationChange, ModificationRequest, ModificationScope, ProjectStructureMap, TargetNode, TermVariation, TextChange,
    TokenChange, TokenType, TreeInformation,
};

/// Most targets handed to the node editor.
const MAX_TARGETS: usize = 5;

/// Most recently modified files a follow-up is pointed at.
const MAX_FOCUS: usize = 3;

/// `rename "X" to "Y"` and friends, with straight or curly quotes.
static LITERAL_SWAP: LazyLock<Regex> = LazyLock::new(|| {
    return Regex::new(
        r#"(?i)\b(?:rename|change|replace|swap|switch)\b.*?["'“‘](?P<from>[^"'”’]+)["'”’]\s*(?:to|with|into|for|->|→)\s*["'“‘](?P<to>[^"'”’]+)["'”’]"#,
    )
    .expect("valid regex");
});

/// Verbs that edit something that already exists.
static EDIT_VERB: LazyLock<Regex> = LazyLock::new(|| {
    return Regex::new(
        r"(?i)\b(?:make|change|update|style|restyle|fix|adjust|move|hide|show|resize|align|center|centre|enlarge|shrink|bold|tweak|turn)\b",
    )
    .expect("valid regex");
});

/// Nouns naming a bounded UI region.
static UI_NOUN: LazyLock<Regex> = LazyLock::new(|| {
    return Regex::new(
        r"(?i)\b(?:buttons?|header|navbar|nav|footer|hero|form|card|cards|title|heading|link|links|image|logo|section|menu|input|modal|sidebar|banner)\b",
    )
    .expect("valid regex");
});

/// `add a FAQ page`, `create new pricing section`, ...
static NEW_SURFACE: LazyLock<Regex> = LazyLock::new(|| {
    return Regex::new(
        r"(?i)\b(?:add|create|build|introduce)\b(?P<name>(?:\s+[\w-]+){0,4}?)\s+(?P<noun>page|screen|section|component|form|modal|widget|dialog|view)\b",
    )
    .expect("valid regex");
});

/// Words that point back at the previous change.
static FOLLOW_UP: LazyLock<Regex> = LazyLock::new(|| {
    return Regex::new(r"(?i)\b(?:it|that|this|them|those|again|undo|revert|instead|previous|last change)\b").expect("valid regex");
});

/// Global visual token vocabulary.
static TOKEN_WORD: LazyLock<Regex> = LazyLock::new(|| {
    return Regex::new(
        r"(?i)\b(?P<word>colou?r scheme|palette|theme|brand colou?rs?|primary colou?r|colou?rs|fonts?|typography|typeface|spacing|padding|margins?|radius|rounded|corners)\b",
    )
    .expect("valid regex");
});

/// Hex color literal.
static HEX_COLOR: LazyLock<Regex> = LazyLock::new(|| return Regex::new(r"#[0-9a-fA-F]{3,8}\b").expect("valid regex"));

/// Named colors recognized as token values.
const COLOR_WORDS: &[&str] = &[
    "black", "blue", "cyan", "dark", "emerald", "gray", "green", "grey", "indigo", "light", "orange", "pink", "purple",
    "red", "rose", "slate", "teal", "violet", "white", "yellow",
];

/// Words never used as target keywords.
const STOPWORDS: &[&str] = &[
    "add", "all", "and", "any", "bit", "but", "can", "change", "could", "every", "for", "from", "its", "little", "make",
    "more", "our", "please", "should", "that", "the", "them", "this", "too", "update", "very", "with", "would", "you",
    "your",
];

/// Everything the classifier sees.
#[derive(Debug, Clone, Copy)]
pub struct ClassificationInput<'a> {
    /// Current cached files, for target search.
    pub files: &'a FileMap,
    /// Recent entries of the session's history, oldest first.
    pub history: &'a [ModificationChange],
    /// The request itself.
    pub request: &'a ModificationRequest,
    /// Current structure map.
    pub structure: &'a ProjectStructureMap,
}

/// Chooses exactly one scope per request. Never fails: internal errors
/// degrade to `TargetedNodes` with the failure in `reasoning`.
pub trait ScopeClassifier: Send + Sync {
    /// Classify one request.
    fn classify(&self, input: &ClassificationInput<'_>) -> ModificationScope;
}

/// Keyword and pattern based classifier.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicClassifier;

impl ScopeClassifier for HeuristicClassifier {
    fn classify(&self, input: &ClassificationInput<'_>) -> ModificationScope {
        match classify_request(input) {
            Ok(scope) => {
                tracing::info!(scope = %scope.kind(), "request classified");
                return scope;
            },
            Err(e) => {
                tracing::warn!(error = %e, "classification degraded to targeted nodes");
                return ModificationScope::TargetedNodes {
                    reasoning: format!("classification failed ({e}); falling back to targeted edit"),
                    targets: Vec::new(),
                    tree: TreeInformation::default(),
                };
            },
        }
    }
}

/// Single pass over the rules.
///
/// # Errors
///
/// Returns `Error::ClassificationFailed` for an empty request.
pub fn classify_request(input: &ClassificationInput<'_>) -> Result<ModificationScope, Error> {
    let text = input.request.natural_language_request.trim();
    if text.is_empty() {
        return Err(Error::ClassificationFailed {
            reason: "empty request".to_string(),
        });
    }

    if let Some(change) = literal_swap(text) {
        return Ok(ModificationScope::TextBasedChange {
            reasoning: format!(
                "request names the literal phrase \"{}\" to replace with \"{}\"",
                change.search_term, change.replacement_term
            ),
            change,
        });
    }

    if let Some(region) = targeted_region(text, input.structure) {
        let (targets, tree) = find_targets(text, input.files);
        return Ok(ModificationScope::TargetedNodes {
            reasoning: format!(
                "request edits an existing {region}; {} target(s) across {} file(s)",
                targets.len(),
                tree.file_count
            ),
            targets,
            tree,
        });
    }

    if let Some(name) = new_surface(text, input.structure) {
        return Ok(ModificationScope::ComponentAddition {
            reasoning: format!("request adds {name}, which the project does not have yet"),
        });
    }

    if let Some(change) = token_change(text) {
        return Ok(ModificationScope::DesignTokenChange {
            reasoning: format!("request changes the global {} tokens to {}", change.token_type, change.value),
            change,
        });
    }

    if FOLLOW_UP.is_match(text) {
        let focus = recently_modified(input.history);
        if !focus.is_empty() {
            let listed: Vec<String> = focus.iter().map(|p| return p.display().to_string()).collect();
            return Ok(ModificationScope::FullFile {
                reasoning: format!("request follows up on the previous change to {}", listed.join(", ")),
                focus,
            });
        }
    }

    return Ok(ModificationScope::FullFile {
        focus: Vec::new(),
        reasoning: "no narrower strategy applies; regenerating affected files".to_string(),
    });
}

/// Files touched by the latest successful entries, newest first.
fn recently_modified(history: &[ModificationChange]) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = Vec::new();
    for entry in history.iter().rev().filter(|e| return e.success) {
        if let Some(file) = &entry.file
            && !files.contains(file)
        {
            files.push(file.clone());
        }
        if files.len() == MAX_FOCUS {
            break;
        }
    }
    return files;
}

/// Rule 1: a quoted phrase and its quoted replacement.
pub fn literal_swap(text: &str) -> Option<TextChange> {
    let caps = LITERAL_SWAP.captures(text)?;
    let search = caps.name("from")?.as_str().trim().to_string();
    let replacement = caps.name("to")?.as_str().trim().to_string();
    if search.is_empty() || search == replacement {
        return None;
    }
    return Some(TextChange {
        variations: spelling_variations(&search, &replacement),
        replacement_term: replacement,
        search_term: search,
    });
}

/// Lowercase, uppercase, and hyphenated spellings, each paired with the
/// same transform of the replacement.
fn spelling_variations(search: &str, replacement: &str) -> Vec<TermVariation> {
    let candidates = [
        (search.to_lowercase(), replacement.to_lowercase()),
        (search.to_uppercase(), replacement.to_uppercase()),
        (search.to_lowercase().replace(' ', "-"), replacement.to_lowercase().replace(' ', "-")),
    ];
    let mut out: Vec<TermVariation> = Vec::new();
    for (s, r) in candidates {
        if s != search && !out.iter().any(|v| return v.search == s) {
            out.push(TermVariation {
                replacement: r,
                search: s,
            });
        }
    }
    return out;
}

/// Rule 2: an edit verb aimed at a UI region or an existing export.
fn targeted_region(text: &str, structure: &ProjectStructureMap) -> Option<String> {
    EDIT_VERB.find(text)?;
    if let Some(noun) = UI_NOUN.find(text) {
        return Some(noun.as_str().to_lowercase());
    }
    let words: Vec<String> = words(text);
    return structure
        .files
        .iter()
        .flat_map(|f| return f.exports.iter())
        .find(|export| return export.len() >= 3 && words.contains(&export.to_lowercase()))
        .map(|export| return format!("`{export}`"));
}

/// Rule 3: a new page/section/component whose name the project lacks.
fn new_surface(text: &str, structure: &ProjectStructureMap) -> Option<String> {
    let caps = NEW_SURFACE.captures(text)?;
    let noun = caps.name("noun")?.as_str().to_lowercase();
    let name: Vec<&str> = caps
        .name("name")
        .map_or("", |m| return m.as_str())
        .split_whitespace()
        .filter(|w| return !matches!(w.to_lowercase().as_str(), "a" | "an" | "the" | "new" | "another" | "simple"))
        .collect();
    if name.is_empty() {
        return Some(format!("a new {noun}"));
    }
    let joined = name.join("");
    if structure.mentions(&joined) {
        return None;
    }
    return Some(format!("a {} {noun}", name.join(" ")));
}

/// Rule 4: a global token family plus a value.
pub fn token_change(text: &str) -> Option<TokenChange> {
    let word = TOKEN_WORD.captures(text)?.name("word")?.as_str().to_lowercase();
    let token_type = if word.starts_with("font") || word.starts_with("typ") {
        TokenType::Typography
    } else if ["spacing", "padding", "margin"].iter().any(|w| return word.starts_with(w)) {
        TokenType::Spacing
    } else if ["radius", "rounded", "corners"].contains(&word.as_str()) {
        TokenType::Radius
    } else {
        TokenType::Color
    };
    return Some(TokenChange {
        target_scope: "global".to_string(),
        value: token_value(text, token_type),
        token_type,
    });
}

/// The requested value: a hex color, a color word, or whatever follows
/// the last "to".
fn token_value(text: &str, token_type: TokenType) -> String {
    if token_type == TokenType::Color {
        if let Some(hex) = HEX_COLOR.find(text) {
            return hex.as_str().to_lowercase();
        }
        if let Some(word) = words(text).into_iter().find(|w| return COLOR_WORDS.contains(&w.as_str())) {
            return word;
        }
    }
    let lower = text.to_lowercase();
    if let Some(idx) = lower.rfind(" to ") {
        let tail = text.get(idx.saturating_add(4)..).unwrap_or("").trim();
        let tail = tail.trim_end_matches(['.', '!']).trim_matches(['"', '\'']);
        if !tail.is_empty() {
            return tail.to_string();
        }
    }
    return "unspecified".to_string();
}

/// Keywords from the request, then every matching node across cached
/// source files, ranked and de-nested.
fn find_targets(text: &str, files: &FileMap) -> (Vec<TargetNode>, TreeInformation) {
    let keywords: Vec<String> = words(text)
        .into_iter()
        .filter(|w| return w.len() >= 3 && !STOPWORDS.contains(&w.as_str()) && !EDIT_VERB.is_match(w))
        .collect();
    let mut tree = TreeInformation::default();
    let mut found: Vec<TargetNode> = Vec::new();
    if keywords.is_empty() {
        return (found, tree);
    }

    for file in files.values().filter(|f| return grammar::is_source_path(&f.path)) {
        tree.file_count = tree.file_count.saturating_add(1);
        match syntax::find_candidates(&file.path, &file.content, &keywords) {
            Ok((candidates, inspected)) => {
                tree.node_count = tree.node_count.saturating_add(inspected);
                found.extend(candidates.into_iter().map(|c| {
                    return TargetNode {
                        file_path: file.path.clone(),
                        node_kind: c.kind,
                        path: c.path,
                        rank: c.score,
                    };
                }));
            },
            Err(e) => tracing::debug!(file = %file.path.display(), error = %e, "skipping file during target search"),
        }
    }

    found.sort_by(|a, b| {
        return b
            .rank
            .cmp(&a.rank)
            .then_with(|| return b.path.0.len().cmp(&a.path.0.len()))
            .then_with(|| return a.file_path.cmp(&b.file_path));
    });
    let mut kept: Vec<TargetNode> = Vec::new();
    for candidate in found {
        let nested = kept.iter().any(|k| {
            return k.file_path == candidate.file_path
                && (syntax::is_ancestor(&k.path, &candidate.path) || syntax::is_ancestor(&candidate.path, &k.path));
        });
        if !nested {
            kept.push(candidate);
        }
        if kept.len() == MAX_TARGETS {
            break;
        }
    }
    return (kept, tree);
}

/// Lowercase alphanumeric words.
fn words(text: &str) -> Vec<String> {
    return text
        .split(|c: char| return !c.is_alphanumeric())
        .filter(|w| return !w.is_empty())
        .map(str::to_lowercase)
        .collect();
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::config::Config;
    use crate::mapper::build_structure_map;
    use crate::types::{ChangeType, ProjectFile, ScopeKind};

    fn project(files: &[(&str, &str)]) -> FileMap {
        files
            .iter()
            .map(|(p, c)| (PathBuf::from(p), ProjectFile::new(*p, *c)))
            .collect()
    }

    fn classify(text: &str, files: &FileMap) -> ModificationScope {
        classify_after(text, files, &[])
    }

    fn classify_after(text: &str, files: &FileMap, history: &[ModificationChange]) -> ModificationScope {
        let structure = build_structure_map(files, &Config::default());
        let request = ModificationRequest::new(text);
        HeuristicClassifier.classify(&ClassificationInput {
            files,
            history,
            request: &request,
            structure: &structure,
        })
    }

    fn edited(path: &str, success: bool) -> ModificationChange {
        ModificationChange {
            approach: Some(ScopeKind::TargetedNodes),
            change_type: ChangeType::Modified,
            description: format!("Modified {path}"),
            file: Some(PathBuf::from(path)),
            reasoning: String::new(),
            success,
            timestamp: chrono::Utc::now(),
        }
    }

    const APP: &str = r#"import { Routes, Route } from "react-router-dom";
import Home from "./pages/Home";

export default function App() {
  return (
    <Routes>
      <Route path="/" element={<Home />} />
    </Routes>
  );
}
"#;

    const HOME: &str = r#"export default function Home() {
  return (
    <section>
      <h1>Welcome</h1>
      <button className="primary">Sign Up</button>
    </section>
  );
}
"#;

    #[test]
    fn quoted_rename_is_text_change() {
        let scope = classify("rename 'Sign Up' to 'Join Now' everywhere", &FileMap::new());
        let ModificationScope::TextBasedChange { change, .. } = scope else {
            panic!("expected text change, got {scope:?}");
        };
        assert_eq!(change.search_term, "Sign Up");
        assert_eq!(change.replacement_term, "Join Now");
        let searches: Vec<&str> = change.variations.iter().map(|v| v.search.as_str()).collect();
        assert_eq!(searches, vec!["sign up", "SIGN UP", "sign-up"]);
    }

    #[test]
    fn button_edit_is_targeted_with_ranked_targets() {
        let files = project(&[("src/App.tsx", APP), ("src/pages/Home.tsx", HOME)]);
        let scope = classify("make the primary button blue", &files);
        let ModificationScope::TargetedNodes { targets, tree, .. } = scope else {
            panic!("expected targeted nodes, got {scope:?}");
        };
        assert_eq!(tree.file_count, 2);
        let first = targets.first().unwrap();
        assert_eq!(first.file_path, PathBuf::from("src/pages/Home.tsx"));
        assert_eq!(first.node_kind, "jsx_element");
        assert!(targets.windows(2).all(|w| w[0].rank >= w[1].rank));
    }

    #[test]
    fn button_edit_without_matches_is_still_targeted() {
        let files = project(&[("src/App.tsx", APP)]);
        let scope = classify("make the primary button blue", &files);
        assert_eq!(scope.kind(), ScopeKind::TargetedNodes);
    }

    #[test]
    fn missing_page_is_component_addition() {
        let files = project(&[("src/App.tsx", APP), ("src/pages/Home.tsx", HOME)]);
        assert_eq!(classify("add a FAQ page", &files).kind(), ScopeKind::ComponentAddition);
        assert_ne!(classify("add a Home page", &files).kind(), ScopeKind::ComponentAddition);
    }

    #[test]
    fn palette_request_is_design_tokens() {
        let scope = classify("switch the color scheme to #1D4ED8", &FileMap::new());
        let ModificationScope::DesignTokenChange { change, .. } = scope else {
            panic!("expected token change, got {scope:?}");
        };
        assert_eq!(change.token_type, TokenType::Color);
        assert_eq!(change.value, "#1d4ed8");
        assert_eq!(change.target_scope, "global");

        let fonts = token_change("use a rounder font, change typography to Inter").unwrap();
        assert_eq!(fonts.token_type, TokenType::Typography);
        assert_eq!(fonts.value, "Inter");
    }

    #[test]
    fn vague_request_defaults_to_full_file() {
        assert_eq!(classify("it feels off, rework things", &FileMap::new()).kind(), ScopeKind::FullFile);
    }

    #[test]
    fn follow_up_points_at_recently_modified_files() {
        let files = project(&[("src/App.tsx", APP), ("src/pages/Home.tsx", HOME)]);
        let history = vec![edited("src/App.tsx", true), edited("src/pages/Home.tsx", true), edited("src/App.tsx", false)];
        let scope = classify_after("make it bigger", &files, &history);
        let ModificationScope::FullFile { focus, reasoning } = scope else {
            panic!("expected full file, got {scope:?}");
        };
        assert_eq!(focus, vec![PathBuf::from("src/pages/Home.tsx"), PathBuf::from("src/App.tsx")]);
        assert!(reasoning.contains("follows up"));
    }

    #[test]
    fn follow_up_without_history_has_no_focus() {
        let files = project(&[("src/App.tsx", APP)]);
        let ModificationScope::FullFile { focus, .. } = classify("undo that", &files) else {
            panic!("expected full file");
        };
        assert!(focus.is_empty());
    }

    #[test]
    fn empty_request_degrades_to_targeted() {
        let scope = classify("   ", &FileMap::new());
        assert_eq!(scope.kind(), ScopeKind::TargetedNodes);
        assert!(scope.reasoning().contains("classification failed"));
    }
}
