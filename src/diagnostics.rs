use std::fmt::Write as _;
use std::path::Path;

use crate::config::CONFIG_FILE;
use crate::error::Error;
use crate::types::ModificationOutcome;

/// ANSI bold.
const BOLD: &str = "\x1b[1m";
/// ANSI reset.
const RESET: &str = "\x1b[0m";

/// Render an error as valid markdown with bold headings and print to stderr.
pub fn print_error(e: &Error) {
    print_markdown(&render_error(e));
}

/// Print a failed outcome the same way errors are printed.
pub fn print_failed_outcome(outcome: &ModificationOutcome) {
    print_markdown(&render_failed_outcome(outcome));
}

/// Write markdown to stderr, bolding headings.
fn print_markdown(md: &str) {
    for line in md.lines() {
        if line.starts_with('#') {
            eprintln!("{BOLD}{line}{RESET}");
        } else {
            eprintln!("{line}");
        }
    }
}

/// Render an error as a structured markdown diagnostic.
///
/// Each variant produces a block with what happened, why, and how to fix it.
/// Designed to be readable by both humans and LLM agents.
pub fn render_error(e: &Error) -> String {
    match e {
        Error::InvalidSessionId { session } => render_invalid_session(session),
        Error::SynthesisFailed { reason } => render_synthesis_failed(reason),
        Error::UnsupportedLanguage { ext } => render_unsupported_language(ext),
        Error::PathOutsideRoot { path } => render_path_outside_root(path),
        Error::FileTooLarge { file, size_bytes, max_bytes } => render_file_too_large(file, *size_bytes, *max_bytes),
        Error::TomlDe(inner) => render_invalid_config(&inner.to_string()),
        _ => render_generic(e),
    }
}

/// Render a request that exhausted its fallback plan.
pub fn render_failed_outcome(outcome: &ModificationOutcome) -> String {
    let mut out = format!(
        "\
# Modification Failed

Classified as `{}`; last strategy tried: {}.
",
        outcome.classified_as, outcome.strategy
    );
    if let Some(error) = &outcome.error {
        let _ = write!(out, "\n## Last error\n\n{error}\n");
    }
    out.push_str("\n## Steps\n\n");
    for line in outcome.reasoning.lines().skip(1) {
        let _ = writeln!(out, "- {line}");
    }
    return out;
}

/// Variants without a dedicated block.
fn render_generic(e: &Error) -> String {
    match e {
        Error::Cancelled { phase } => format!("\
# Cancelled

The request stopped before {phase}. Nothing from the unstarted phase was written.
"),

        Error::ParseFailed { file, reason } => format!("\
# Error: Parse Failed

Could not parse `{}`: {reason}
", file.display()),

        Error::CacheUnavailable { session, reason } => format!("\
# Error: Session Store Unavailable

Session `{session}`: {reason}

The request continues from a fresh scan.
"),

        Error::Io(e) => format!("\
# Error: I/O

{e}
"),
        Error::WriteFailed { path, source } => format!("\
# Error: Write Failed

Could not write `{}`: {source}
", path.display()),
        _ => format!("\
# Error

{e}
"),
    }
}

/// Oversized source file.
fn render_file_too_large(file: &Path, size_bytes: u64, max_bytes: u64) -> String {
    format!("\
# Error: File Too Large

`{}` is {size_bytes} bytes (max {max_bytes}).
", file.display())
}

/// Unusable session key.
fn render_invalid_session(session: &str) -> String {
    format!(
        "\
# Error: Invalid Session

`{session}` cannot be used as a session key.

## Fix

Use letters, digits, `-`, `_` or `.` only:

    amend modify --session my-session \"...\"
"
    )
}

/// Collaborator failure.
fn render_synthesis_failed(reason: &str) -> String {
    format!(
        "\
# Error: Synthesis Failed

{reason}

## Fix

Set a synthesizer command in `{CONFIG_FILE}`:

    synth_command = \"path/to/synthesizer\"

Or pass one for a single run:

    amend modify --synth-cmd path/to/synthesizer \"...\"
"
    )
}

/// Write outside the working root.
fn render_path_outside_root(path: &Path) -> String {
    format!(
        "\
# Error: Path Outside Project

`{}` escapes the project root and was not written.
",
        path.display()
    )
}

/// Malformed config file.
fn render_invalid_config(reason: &str) -> String {
    format!(
        "\
# Error: Invalid Config

`{CONFIG_FILE}` could not be read: {reason}

## Fix

Remove unknown keys and check value types. Every key is optional.
"
    )
}

/// Extension without a grammar.
fn render_unsupported_language(ext: &str) -> String {
    format!(
        "\
# Error: Unsupported Language

No tree-sitter grammar for `.{ext}` files.

## Supported extensions

- `.ts`, `.mts`, `.cts`: TypeScript
- `.tsx`, `.js`, `.jsx`, `.mjs`, `.cjs`: TSX and JavaScript
"
    )
}
