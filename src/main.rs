use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use conductor::context::PreviewFormat;
use conductor::ui::UiMode;
use conductor_common::{WorkflowMode, WorkflowStatus};

mod cmd;

#[derive(Parser)]
#[command(name = "conductor")]
#[command(
    version,
    about = "Submit repositories to the orchestration backend and follow their workflows"
)]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Backend HTTP API base URL. Overrides config.toml and CONDUCTOR_API_URL.
    #[arg(long, global = true)]
    pub api_url: Option<String>,

    /// Push channel base URL (ws:// or wss://). Derived from --api-url when unset.
    #[arg(long, global = true)]
    pub ws_url: Option<String>,

    /// API key sent as X-API-Key
    #[arg(long, global = true)]
    pub api_key: Option<String>,

    /// Never try the push channel; poll only
    #[arg(long, global = true)]
    pub no_push: bool,

    /// Output mode: full, plain or json. Defaults to full on a terminal.
    #[arg(long, global = true)]
    pub output: Option<UiMode>,

    #[arg(long, global = true, env = "CONDUCTOR_PROJECT_DIR")]
    pub project_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Submit a GitHub repository and follow the resulting workflow
    Submit {
        /// Repository URL, e.g. https://github.com/owner/repo
        url: String,
        /// Task for the agents; required with --mode prompt-driven
        #[arg(short, long)]
        prompt: Option<String>,
        #[arg(short, long, default_value = "self-contained")]
        mode: WorkflowMode,
        /// Print the workflow id and return without following progress
        #[arg(short, long)]
        detach: bool,
    },
    /// Follow an existing workflow until it completes or fails
    Watch { id: String },
    /// Show the recorded state of one workflow
    Show { id: String },
    /// List previously created workflows, newest first
    History {
        #[arg(short, long, default_value = "20")]
        limit: usize,
        #[arg(long)]
        status: Option<WorkflowStatus>,
    },
    /// Preview context retrieval on the backend
    Context {
        #[command(subcommand)]
        command: ContextCommands,
    },
    /// Check backend health
    Health,
    /// View and validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
pub enum ContextCommands {
    /// Run a context search and show ranked snippets
    Search {
        query: String,
        #[arg(short, long, default_value = "5")]
        limit: u32,
        /// ranked (highlighted snippets plus quality metrics) or markdown
        /// (the context block agents receive)
        #[arg(short, long, default_value = "ranked")]
        format: PreviewFormat,
    },
    /// Show retrieval settings, updating any that are given
    Config {
        #[arg(long)]
        chunk_size: Option<u32>,
        #[arg(long)]
        chunk_overlap: Option<u32>,
        #[arg(long)]
        similarity_threshold: Option<f64>,
        #[arg(long)]
        max_results: Option<u32>,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show effective configuration
    Show,
    /// Create .conductor/config.toml with defaults
    Init {
        #[arg(long)]
        force: bool,
    },
    /// Check config.toml for problems
    Validate,
}

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "conductor=debug,conductor_common=debug,warn"
    } else {
        "warn"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .init();
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let project_dir = match cli.project_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };

    if let Commands::Config { command } = &cli.command {
        cmd::cmd_config(&cli, &project_dir, command.clone())?;
        return Ok(ExitCode::SUCCESS);
    }

    let session = cmd::Session::open(&cli, &project_dir)?;
    let code = match &cli.command {
        Commands::Submit {
            url,
            prompt,
            mode,
            detach,
        } => cmd::cmd_submit(&session, url, prompt.clone(), *mode, *detach).await?,
        Commands::Watch { id } => cmd::cmd_watch(&session, id).await?,
        Commands::Show { id } => {
            cmd::cmd_show(&session, id).await?;
            ExitCode::SUCCESS
        }
        Commands::History { limit, status } => {
            cmd::cmd_history(&session, *limit, *status).await?;
            ExitCode::SUCCESS
        }
        Commands::Context { command } => {
            match command.clone() {
                ContextCommands::Search {
                    query,
                    limit,
                    format,
                } => cmd::cmd_context_search(&session, &query, limit, format).await?,
                ContextCommands::Config {
                    chunk_size,
                    chunk_overlap,
                    similarity_threshold,
                    max_results,
                } => {
                    let changes = cmd::context::ConfigChanges {
                        chunk_size,
                        chunk_overlap,
                        similarity_threshold,
                        max_results,
                    };
                    cmd::cmd_context_config(&session, changes).await?
                }
            }
            ExitCode::SUCCESS
        }
        Commands::Health => cmd::cmd_health(&session).await?,
        Commands::Config { .. } => ExitCode::SUCCESS,
    };
    Ok(code)
}
