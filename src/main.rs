//! # gsh-core CLI
//!
//! A thin front-end over the library, useful for checking a configuration
//! and poking at completion or execution outside an interactive session.
//!
//! ## Usage
//!
//! ```bash
//! gsh-core config                         # show the merged configuration
//! gsh-core complete "git che"             # completion at end of line
//! gsh-core run "ls | sort"                # foreground run, exits with status
//! gsh-core script ./extra.lua             # evaluate a Lua file
//! gsh-core prompt --exit-code 1           # render the prompt
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use gsh_core::bridge::{ExecutionBridge, Invocation, Middleware, Next};
use gsh_core::completion::CompletionProvider;
use gsh_core::loader::{ConfigLoader, LoadResult};
use gsh_core::{ExecError, ShellState};

/// Diagnostic front-end for the gsh runtime core.
#[derive(Parser)]
#[command(name = "gsh-core", version, about = "Inspect and exercise the gsh runtime core")]
struct Cli {
    /// User configuration file (Lua).
    ///
    /// Defaults to `~/.gshrc.lua`. A missing file is not an error.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Skip the baseline configuration layer.
    #[arg(long, global = true)]
    no_baseline: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the merged configuration as JSON, with any load diagnostics.
    Config,

    /// Print completions for a line, one per output line.
    #[command(disable_help_flag = true)]
    Complete {
        line: String,
        /// Cursor position in characters; defaults to the end of the line.
        #[arg(long)]
        cursor: Option<usize>,
        /// Print `#/` or `#!` help for the word at the cursor instead.
        #[arg(long)]
        help: bool,
    },

    /// Run a shell command in the foreground and exit with its status.
    Run {
        command: String,
        /// Print each dispatched command to stderr before running it.
        #[arg(long)]
        trace: bool,
    },

    /// Evaluate a Lua file against the loaded configuration environment.
    Script { path: PathBuf },

    /// Render the prompt as the shell would after a command.
    Prompt {
        #[arg(long, default_value_t = 0)]
        exit_code: i32,
        #[arg(long, default_value_t = 0)]
        duration_ms: u64,
    },
}

/// Echoes each invocation, like `set -x`.
struct TraceCommands;

#[async_trait::async_trait]
impl Middleware for TraceCommands {
    async fn handle(&self, invocation: &Invocation, next: Next<'_>) -> Result<i32, ExecError> {
        eprintln!("+ {} {}", invocation.name, invocation.args.join(" "));
        next.run(invocation).await
    }
}

fn load(cli: &Cli) -> Result<LoadResult> {
    let mut loader = ConfigLoader::new();
    if let Some(path) = &cli.config {
        loader = loader.with_user_path(Some(path.clone()));
    }
    if cli.no_baseline {
        loader = loader.with_baseline("");
    }
    loader.load_layered().context("Failed to load configuration")
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let loaded = load(&cli)?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(loaded.config.log_level()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    for error in &loaded.errors {
        tracing::warn!("{}", error);
    }

    let LoadResult {
        config,
        evaluator,
        errors,
    } = loaded;
    let state = ShellState::from_process().context("Failed to read process state")?;
    let bridge = ExecutionBridge::new(state, evaluator);

    match cli.command {
        Commands::Config => {
            let json = serde_json::to_string_pretty(&config)?;
            println!("{}", json);
            if !errors.is_empty() {
                eprintln!("{} configuration error(s)", errors.len());
            }
        }
        Commands::Complete { line, cursor, help } => {
            let cursor = cursor.unwrap_or_else(|| line.chars().count());
            let provider = CompletionProvider::new(bridge);
            if help {
                println!("{}", provider.help(&line, cursor).await);
            } else {
                for suggestion in provider.complete(&line, cursor).await.suggestions {
                    println!("{}", suggestion);
                }
            }
        }
        Commands::Run { command, trace } => {
            if trace {
                bridge.use_middleware(Arc::new(TraceCommands)).await;
            }
            let cancel = tokio_util::sync::CancellationToken::new();
            let on_interrupt = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    on_interrupt.cancel();
                }
            });
            let started = Instant::now();
            let status = bridge.run_foreground_with_cancel(&command, cancel).await?;
            tracing::debug!(status, elapsed_ms = started.elapsed().as_millis() as u64, "done");
            std::process::exit(status);
        }
        Commands::Script { path } => {
            let source = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read script: {}", path.display()))?;
            bridge.run_script(&source).await?;
        }
        Commands::Prompt {
            exit_code,
            duration_ms,
        } => {
            print!("{}", bridge.render_prompt(&config, exit_code, duration_ms).await);
        }
    }

    Ok(())
}
