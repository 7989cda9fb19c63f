mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use amend::diagnostics;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::commands::ModifyArgs;

/// Command-line arguments.
#[derive(Parser)]
#[command(name = "amend", about = "Apply natural-language change requests to generated projects")]
struct Cli {
    /// What to do.
    #[command(subcommand)]
    command: Commands,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    log_json: bool,

    /// Project directory
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,

    /// Session key; requests under one key share cache and history
    #[arg(long, global = true, default_value = "default")]
    session: String,

    /// Where session state is kept (default: <root>/.amend/state)
    #[arg(long, global = true)]
    state_dir: Option<PathBuf>,
}

/// Subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Drop a session's cache, history, and metadata
    Cleanup,
    /// Show a session's recent changes and most-modified files
    History {
        /// How many recent entries to show
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Print the project structure map
    Map {
        /// Output the full map as JSON
        #[arg(long)]
        json: bool,
    },
    /// Classify and apply one change request
    Modify {
        /// The change, in plain language
        request: String,

        /// Design description to use when no earlier one is recorded
        #[arg(long)]
        description: Option<String>,

        /// Identifier used to look up earlier generation output
        #[arg(long)]
        project_id: Option<String>,

        /// Re-read the project instead of trusting the session cache
        #[arg(long)]
        rescan: bool,

        /// Synthesizer command, overriding `synth_command` from .amend.toml
        #[arg(long)]
        synth_cmd: Option<String>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.log_json);

    let state_dir = cli.state_dir.clone().unwrap_or_else(|| return cli.root.join(".amend").join("state"));
    let result = match cli.command {
        Commands::Cleanup => commands::cleanup(&cli.root, &state_dir, &cli.session).map(|()| return ExitCode::SUCCESS),
        Commands::History { limit } => {
            commands::history(&cli.root, &state_dir, &cli.session, limit).map(|()| return ExitCode::SUCCESS)
        },
        Commands::Map { json } => commands::map(&cli.root, json).map(|()| return ExitCode::SUCCESS),
        Commands::Modify {
            request,
            description,
            project_id,
            rescan,
            synth_cmd,
        } => commands::modify(&ModifyArgs {
            description,
            project_id,
            request,
            rescan,
            root: cli.root.clone(),
            session: cli.session.clone(),
            state_dir,
            synth_cmd,
        }),
    };

    match result {
        Ok(code) => return code,
        Err(e) => {
            diagnostics::print_error(&e);
            return ExitCode::FAILURE;
        },
    }
}

/// Install the stderr subscriber. `RUST_LOG` overrides the default `warn` filter.
fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| return EnvFilter::new("warn"));
    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}
