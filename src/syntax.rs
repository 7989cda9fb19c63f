//! Parsing, parse validation, and structural paths into tree-sitter trees.

use std::ops::Range;
use std::path::Path;

use tree_sitter::{Language, Node, Parser, Tree};

use crate::error::Error;
use crate::grammar;
use crate::types::{NodePath, PathStep};

/// Maximum source file size (16 MiB).
const MAX_FILE_SIZE: u64 = 16 * 1024 * 1024;

/// Node kinds that can be targeted by an edit.
const TARGETABLE_KINDS: &[&str] = &[
    "class_declaration",
    "function_declaration",
    "jsx_element",
    "jsx_self_closing_element",
    "lexical_declaration",
];

/// A node matched against request keywords.
#[derive(Debug, Clone)]
pub struct Candidate {
    /// Tree-sitter kind of the node.
    pub kind: String,
    /// Structural path from the file root.
    pub path: NodePath,
    /// Keyword score; higher is more relevant.
    pub score: u32,
}

/// Parse source into a tree-sitter tree.
///
/// # Errors
///
/// Returns `Error::ParseFailed` if the language cannot be set or parsing fails.
pub fn parse_source(file_path: &Path, source: &str, language: &Language) -> Result<Tree, Error> {
    let source_len: u64 = source.len().try_into().unwrap_or(u64::MAX);
    if source_len > MAX_FILE_SIZE {
        return Err(Error::FileTooLarge {
            file: file_path.to_path_buf(),
            size_bytes: source_len,
            max_bytes: MAX_FILE_SIZE,
        });
    }

    let mut parser = Parser::new();
    parser.set_language(language).map_err(|e| {
        return Error::ParseFailed {
            file: file_path.to_path_buf(),
            reason: e.to_string(),
        };
    })?;

    return parser.parse(source, None).ok_or_else(|| {
        return Error::ParseFailed {
            file: file_path.to_path_buf(),
            reason: "tree-sitter returned None".to_string(),
        };
    });
}

/// Parse a source file and reject trees containing error or missing nodes.
///
/// # Errors
///
/// Returns `Error::UnsupportedLanguage` for non-source paths and
/// `Error::ParseFailed` naming the first broken line otherwise.
pub fn parse_strict(file_path: &Path, source: &str) -> Result<Tree, Error> {
    let language = grammar::language_for_path(file_path)?;
    let tree = parse_source(file_path, source, &language)?;
    let root = tree.root_node();
    if root.has_error() {
        let line = first_error_node(root).map_or(0, |n| return n.start_position().row.saturating_add(1));
        return Err(Error::ParseFailed {
            file: file_path.to_path_buf(),
            reason: format!("syntax error near line {line}"),
        });
    }
    return Ok(tree);
}

/// Depth-first search for the first `ERROR` or missing node.
fn first_error_node(node: Node<'_>) -> Option<Node<'_>> {
    if node.is_error() || node.is_missing() {
        return Some(node);
    }
    if !node.has_error() {
        return None;
    }
    let mut cursor = node.walk();
    let children: Vec<Node<'_>> = node.children(&mut cursor).collect();
    return children.into_iter().find_map(first_error_node);
}

/// Check that content written to `path` is well-formed for its type.
/// Source files must parse cleanly, stylesheets must balance, JSON must load.
/// Other file types are accepted as-is.
///
/// # Errors
///
/// Returns `Error::ParseFailed` describing the first problem.
pub fn validate_content(path: &Path, content: &str) -> Result<(), Error> {
    if grammar::is_source_path(path) {
        return parse_strict(path, content).map(|_tree| return ());
    }
    if grammar::is_stylesheet_path(path) {
        return check_stylesheet(path, content);
    }
    if path.extension().is_some_and(|e| return e == "json") {
        return serde_json::from_str::<serde_json::Value>(content)
            .map(|_value| return ())
            .map_err(|e| {
                return Error::ParseFailed {
                    file: path.to_path_buf(),
                    reason: e.to_string(),
                };
            });
    }
    return Ok(());
}

/// Structural check for CSS-like stylesheets: braces balance outside comments
/// and strings, and the sheet is not empty.
///
/// # Errors
///
/// Returns `Error::ParseFailed` on unbalanced braces, unterminated comments
/// or strings, or an empty sheet.
pub fn check_stylesheet(path: &Path, source: &str) -> Result<(), Error> {
    let fail = |reason: String| {
        return Error::ParseFailed {
            file: path.to_path_buf(),
            reason,
        };
    };

    if source.trim().is_empty() {
        return Err(fail("empty stylesheet".to_string()));
    }

    let mut depth: usize = 0;
    let mut line: usize = 1;
    let mut chars = source.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\n' => line = line.saturating_add(1),
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut closed = false;
                let mut prev = '\0';
                for inner in chars.by_ref() {
                    if inner == '\n' {
                        line = line.saturating_add(1);
                    }
                    if prev == '*' && inner == '/' {
                        closed = true;
                        break;
                    }
                    prev = inner;
                }
                if !closed {
                    return Err(fail(format!("unterminated comment starting before line {line}")));
                }
            },
            '"' | '\'' => {
                let quote = c;
                let mut closed = false;
                while let Some(inner) = chars.next() {
                    if inner == '\\' {
                        chars.next();
                        continue;
                    }
                    if inner == '\n' {
                        break;
                    }
                    if inner == quote {
                        closed = true;
                        break;
                    }
                }
                if !closed {
                    return Err(fail(format!("unterminated string on line {line}")));
                }
            },
            '{' => depth = depth.saturating_add(1),
            '}' => {
                let Some(next) = depth.checked_sub(1) else {
                    return Err(fail(format!("unexpected `}}` on line {line}")));
                };
                depth = next;
            },
            _ => {},
        }
    }

    if depth > 0 {
        return Err(fail(format!("{depth} unclosed block(s)")));
    }
    return Ok(());
}

/// Text of a node, or the empty string if the range is not valid UTF-8.
pub fn node_text<'s>(node: Node<'_>, source: &'s str) -> &'s str {
    return source.get(node.start_byte()..node.end_byte()).unwrap_or("");
}

/// Identifying name of a node: its `name` field, or the tag name of a JSX element.
pub fn node_name(node: Node<'_>, source: &str) -> Option<String> {
    let named = match node.kind() {
        "jsx_element" => node
            .child_by_field_name("open_tag")
            .and_then(|open| return open.child_by_field_name("name")),
        "lexical_declaration" => {
            let mut cursor = node.walk();
            let declarator = node
                .named_children(&mut cursor)
                .find(|c| return c.kind() == "variable_declarator");
            declarator.and_then(|d| return d.child_by_field_name("name"))
        },
        _ => node.child_by_field_name("name"),
    }?;
    let text = node_text(named, source);
    return if text.is_empty() { None } else { Some(text.to_string()) };
}

/// Compute the structural path of a node from its tree's root.
pub fn node_path(node: Node<'_>, source: &str) -> NodePath {
    let mut steps = Vec::new();
    let mut current = node;
    while let Some(parent) = current.parent() {
        let mut cursor = parent.walk();
        let index = parent
            .named_children(&mut cursor)
            .position(|c| return c.id() == current.id())
            .unwrap_or(0);
        steps.push(PathStep {
            index,
            kind: current.kind().to_string(),
            name: node_name(current, source),
        });
        current = parent;
    }
    steps.reverse();
    return NodePath(steps);
}

/// Re-resolve a structural path against a freshly parsed tree.
///
/// Each step first tries the recorded index; if that child has the wrong kind
/// or name and the step carries a name, the unique sibling with the same kind
/// and name is accepted instead (an earlier edit may have shifted indices).
///
/// # Errors
///
/// Returns `Error::ResolutionFailed` naming the first step that no longer matches.
pub fn resolve_path<'t>(
    tree: &'t Tree,
    source: &str,
    file_path: &Path,
    path: &NodePath,
) -> Result<Node<'t>, Error> {
    if path.0.is_empty() {
        return Err(Error::ResolutionFailed {
            file: file_path.to_path_buf(),
            reason: "empty structural path".to_string(),
        });
    }

    let mut node = tree.root_node();
    for (depth, step) in path.0.iter().enumerate() {
        let mut cursor = node.walk();
        let children: Vec<Node<'t>> = node.named_children(&mut cursor).collect();
        let matches_step = |c: &Node<'t>| {
            return c.kind() == step.kind
                && step
                    .name
                    .as_ref()
                    .is_none_or(|n| return node_name(*c, source).as_deref() == Some(n.as_str()));
        };

        if let Some(child) = children.get(step.index).filter(|c: &&Node<'t>| return matches_step(*c)) {
            node = *child;
            continue;
        }

        let shifted: Vec<&Node<'t>> = if step.name.is_some() {
            children.iter().filter(|c: &&Node<'t>| return matches_step(*c)).collect()
        } else {
            Vec::new()
        };
        let [only] = shifted.as_slice() else {
            return Err(Error::ResolutionFailed {
                file: file_path.to_path_buf(),
                reason: format!("step {depth} ({}[{}]) no longer matches", step.kind, step.index),
            });
        };
        node = **only;
    }
    return Ok(node);
}

/// Replace a byte range of `source`, leaving everything around it untouched.
///
/// # Errors
///
/// Returns `Error::ResolutionFailed` if the range is not on character boundaries.
pub fn splice(file_path: &Path, source: &str, range: Range<usize>, replacement: &str) -> Result<String, Error> {
    let (Some(before), Some(after)) = (source.get(..range.start), source.get(range.end..)) else {
        return Err(Error::ResolutionFailed {
            file: file_path.to_path_buf(),
            reason: format!("byte range {}..{} is not a character boundary", range.start, range.end),
        });
    };
    let capacity = before.len().saturating_add(replacement.len()).saturating_add(after.len());
    let mut out = String::with_capacity(capacity);
    out.push_str(before);
    out.push_str(replacement);
    out.push_str(after);
    return Ok(out);
}

/// Whether `ancestor` is a strict prefix of `descendant`.
pub fn is_ancestor(ancestor: &NodePath, descendant: &NodePath) -> bool {
    return ancestor.0.len() < descendant.0.len() && descendant.0.starts_with(&ancestor.0);
}

/// Score every targetable node of a source file against lowercase keywords.
/// Returns matches plus the number of targetable nodes inspected.
///
/// # Errors
///
/// Returns `Error::ParseFailed` or `Error::UnsupportedLanguage` from parsing.
pub fn find_candidates(
    file_path: &Path,
    source: &str,
    keywords: &[String],
) -> Result<(Vec<Candidate>, usize), Error> {
    let language = grammar::language_for_path(file_path)?;
    let tree = parse_source(file_path, source, &language)?;
    let mut found = Vec::new();
    let mut inspected = 0_usize;
    collect_candidates(tree.root_node(), source, keywords, &mut found, &mut inspected);
    return Ok((found, inspected));
}

/// Recursive walk behind `find_candidates`.
fn collect_candidates(
    node: Node<'_>,
    source: &str,
    keywords: &[String],
    found: &mut Vec<Candidate>,
    inspected: &mut usize,
) {
    if TARGETABLE_KINDS.contains(&node.kind()) {
        *inspected = inspected.saturating_add(1);
        let score = score_node(node, source, keywords);
        if score > 0 {
            found.push(Candidate {
                kind: node.kind().to_string(),
                path: node_path(node, source),
                score,
            });
        }
    }

    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        collect_candidates(child, source, keywords, found, inspected);
    }
}

/// Name hits weigh three, hits in the node's own text (opening tag and direct
/// text for JSX) weigh one. Descendants do not count toward a node's score.
fn score_node(node: Node<'_>, source: &str, keywords: &[String]) -> u32 {
    let name = node_name(node, source).unwrap_or_default().to_lowercase();
    let own = own_text(node, source).to_lowercase();
    let mut score = 0_u32;
    for keyword in keywords {
        if !name.is_empty() && name.contains(keyword.as_str()) {
            score = score.saturating_add(3);
        }
        if own.contains(keyword.as_str()) {
            score = score.saturating_add(1);
        }
    }
    return score;
}

/// Text that belongs to the node itself rather than to nested elements.
fn own_text(node: Node<'_>, source: &str) -> String {
    return match node.kind() {
        "jsx_element" => {
            let mut text = node
                .child_by_field_name("open_tag")
                .map(|open| return node_text(open, source).to_string())
                .unwrap_or_default();
            let mut cursor = node.walk();
            for child in node.named_children(&mut cursor) {
                if child.kind() == "jsx_text" {
                    text.push(' ');
                    text.push_str(node_text(child, source));
                }
            }
            text
        },
        "jsx_self_closing_element" => node_text(node, source).to_string(),
        _ => String::new(),
    };
}
