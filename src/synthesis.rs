//! Boundary to the code-synthesis collaborator.
//!
//! Responses are untrusted text. They are parsed into the strict schemas
//! below before any executor looks at them; anything that does not fit
//! becomes `Error::SynthesisFailed`.

use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::syntax;

/// What the collaborator is asked to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SynthesisTask {
    /// A new unit plus an integration plan. Answered with `ComponentPlan`.
    ComponentPlan,
    /// Rewritten token file and stylesheet. Answered with `FileRewrites`.
    DesignTokens,
    /// Whole replacement files. Answered with `FileRewrites`.
    FileRegen,
    /// Replacement text for one node. Answered with `NodeReplacement`.
    NodeEdit,
}

/// A slice of project content handed to the collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Excerpt {
    /// Path relative to the working root.
    pub path: PathBuf,
    /// The excerpt or full file.
    pub text: String,
}

/// One call to the collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SynthesisRequest {
    /// Relevant excerpts or full files.
    pub excerpts: Vec<Excerpt>,
    /// What to do, including the user's request.
    pub instructions: String,
    /// Rendered structure summary plus any external project description.
    pub project_summary: String,
    /// Expected response shape.
    pub task: SynthesisTask,
}

/// The code-synthesis collaborator.
pub trait Synthesizer: Send + Sync {
    /// Send one request and return the raw response text.
    ///
    /// # Errors
    ///
    /// Returns `Error::SynthesisFailed` when the collaborator cannot be
    /// reached or refuses.
    fn synthesize(&self, request: &SynthesisRequest) -> Result<String, Error>;
}

// ── Response schemas ──

/// Answer to `SynthesisTask::NodeEdit`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NodeReplacement {
    /// Text that replaces the node's byte range.
    pub replacement: String,
}

/// The new unit of a component plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ComponentUnit {
    /// Full source of the unit.
    pub content: String,
    /// Exported name, used in the route element.
    pub name: String,
    /// Where to write it, relative to the root.
    pub path: PathBuf,
}

/// An import line to add to an existing file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ImportSite {
    /// File receiving the import.
    pub file: PathBuf,
    /// The complete import statement.
    pub line: String,
}

/// A route entry to add to the route table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RouteEntry {
    /// File holding the route table.
    pub file: PathBuf,
    /// URL path, e.g. `/faq`.
    pub path: String,
}

/// Where the new unit hooks into the project.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IntegrationPlan {
    /// Import to add, if any.
    #[serde(default)]
    pub import: Option<ImportSite>,
    /// Route to add, if any.
    #[serde(default)]
    pub route: Option<RouteEntry>,
}

/// Answer to `SynthesisTask::ComponentPlan`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ComponentPlan {
    /// The new unit.
    pub component: ComponentUnit,
    /// Integration into existing files.
    #[serde(default)]
    pub integration: IntegrationPlan,
}

/// One rewritten file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileRewrite {
    /// Full new content.
    pub content: String,
    /// Path relative to the root.
    pub path: PathBuf,
}

/// Answer to `SynthesisTask::FileRegen` and `SynthesisTask::DesignTokens`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileRewrites {
    /// Rewritten files.
    pub files: Vec<FileRewrite>,
}

/// Parse a raw response into `T`. A single surrounding code fence is
/// tolerated; nothing else is.
///
/// # Errors
///
/// Returns `Error::SynthesisFailed` if the text does not match the schema.
pub fn parse_response<T: DeserializeOwned>(raw: &str) -> Result<T, Error> {
    let body = strip_fence(raw.trim());
    if body.is_empty() {
        return Err(Error::synthesis("empty response"));
    }
    return serde_json::from_str(body).map_err(|e| return Error::synthesis(format!("response does not match schema: {e}")));
}

/// Reject content that would not parse once written to `path`.
///
/// # Errors
///
/// Returns `Error::SynthesisFailed` wrapping the parse problem.
pub fn check_content(path: &Path, content: &str) -> Result<(), Error> {
    if content.trim().is_empty() {
        return Err(Error::synthesis(format!("empty content for {}", path.display())));
    }
    return syntax::validate_content(path, content).map_err(|e| return Error::synthesis(e.to_string()));
}

/// Drop a leading ```` ```lang ```` line and trailing ```` ``` ```` if both exist.
fn strip_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let Some(rest) = rest.strip_suffix("```") else {
        return text;
    };
    return rest.split_once('\n').map_or("", |(_lang, body)| return body.trim());
}

/// Stand-in when no collaborator is configured. Every call fails, so only
/// the strategies that need no synthesis can succeed.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unconfigured;

impl Synthesizer for Unconfigured {
    fn synthesize(&self, _request: &SynthesisRequest) -> Result<String, Error> {
        return Err(Error::synthesis("no synthesizer configured"));
    }
}

/// Synthesizer backed by an external program: the JSON request goes to its
/// stdin, stdout is the response.
#[derive(Debug, Clone)]
pub struct CommandSynthesizer {
    /// Shell command line.
    command: String,
}

impl CommandSynthesizer {
    /// Wrap a shell command line.
    pub fn new(command: impl Into<String>) -> Self {
        return Self { command: command.into() };
    }
}

impl Synthesizer for CommandSynthesizer {
    fn synthesize(&self, request: &SynthesisRequest) -> Result<String, Error> {
        let payload = serde_json::to_vec(request)?;
        let mut child = Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| return Error::synthesis(format!("could not start `{}`: {e}", self.command)))?;

        // Feed stdin from its own thread; the program may write before it reads.
        let writer = child.stdin.take().map(|mut stdin| {
            return std::thread::spawn(move || return stdin.write_all(&payload));
        });
        let output = child
            .wait_with_output()
            .map_err(|e| return Error::synthesis(format!("collaborator did not finish: {e}")))?;
        let sent = match writer.map(std::thread::JoinHandle::join) {
            Some(Ok(result)) => result,
            Some(Err(_)) => return Err(Error::synthesis("request writer panicked")),
            None => Ok(()),
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::synthesis(format!("`{}` exited with {}: {}", self.command, output.status, stderr.trim())));
        }
        if let Err(e) = sent {
            tracing::debug!(error = %e, "collaborator stopped reading the request early");
        }
        tracing::debug!(task = ?request.task, bytes = output.stdout.len(), "synthesis response received");
        return String::from_utf8(output.stdout).map_err(|e| return Error::synthesis(format!("response is not UTF-8: {e}")));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_replacement_is_strict() {
        let ok: NodeReplacement = parse_response(r#"{"replacement":"<b/>"}"#).unwrap();
        assert_eq!(ok.replacement, "<b/>");
        assert!(parse_response::<NodeReplacement>(r#"{"replacement":"x","extra":1}"#).is_err());
        assert!(parse_response::<NodeReplacement>("sure, here you go").is_err());
        assert!(parse_response::<NodeReplacement>("").is_err());
    }

    #[test]
    fn fenced_response_is_accepted() {
        let raw = "```json\n{\"files\":[{\"path\":\"src/App.tsx\",\"content\":\"x\"}]}\n```";
        let rewrites: FileRewrites = parse_response(raw).unwrap();
        assert_eq!(rewrites.files.len(), 1);
    }

    #[test]
    fn component_plan_integration_is_optional() {
        let plan: ComponentPlan =
            parse_response(r#"{"component":{"name":"Faq","path":"src/pages/Faq.tsx","content":"x"}}"#).unwrap();
        assert_eq!(plan.integration, IntegrationPlan::default());
    }

    #[test]
    fn content_check_rejects_broken_source() {
        assert!(check_content(Path::new("src/A.tsx"), "export const A = () => <div>;").is_err());
        assert!(check_content(Path::new("src/A.tsx"), "  ").is_err());
        assert!(check_content(Path::new("src/A.tsx"), "export const A = () => <div />;\n").is_ok());
    }

    #[cfg(unix)]
    #[test]
    fn command_synthesizer_round_trips_through_a_program() {
        let synth = CommandSynthesizer::new(r#"cat >/dev/null; printf '{"replacement":"ok"}'"#);
        let request = SynthesisRequest {
            excerpts: Vec::new(),
            instructions: "x".to_string(),
            project_summary: String::new(),
            task: SynthesisTask::NodeEdit,
        };
        let raw = synth.synthesize(&request).unwrap();
        let parsed: NodeReplacement = parse_response(&raw).unwrap();
        assert_eq!(parsed.replacement, "ok");

        let failing = CommandSynthesizer::new("exit 3");
        assert!(matches!(failing.synthesize(&request), Err(Error::SynthesisFailed { .. })));
    }

    #[cfg(unix)]
    #[test]
    fn program_writing_before_reading_does_not_stall() {
        let synth = CommandSynthesizer::new("head -c 200000 /dev/zero; cat >/dev/null");
        let request = SynthesisRequest {
            excerpts: vec![Excerpt {
                path: PathBuf::from("src/App.tsx"),
                text: "x".repeat(300_000),
            }],
            instructions: "x".to_string(),
            project_summary: String::new(),
            task: SynthesisTask::FileRegen,
        };
        let raw = synth.synthesize(&request).unwrap();
        assert_eq!(raw.len(), 200_000);
    }
}
