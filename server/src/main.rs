//! codebase-qa-agent binary — CLI shell over `codebase-qa-core`, plus the MCP stdio server.
//!
//! One-shot subcommands print a JSON result to stdout, the same shape the MCP tool calls return
//! (`operations::index_project` and friends are shared by both paths). Running with no
//! subcommand, or with `serve`, starts the MCP stdio JSON-RPC loop (§5/§6): a synchronous
//! read-dispatch-write loop with no async runtime, matching this crate's lack of a `tokio`
//! dependency — the teacher's `server` binary is `#[tokio::main] async fn main()` wrapping an
//! axum HTTP server plus an MCP-over-stdio branch; the MCP branch's shape survives here, the HTTP
//! branch does not (out of scope per SPEC_FULL.md §1).

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use codebase_qa_core::{Config, Store};
use codebase_qa_server::{mcp, operations};
use tracing_subscriber::EnvFilter;

use operations::AppState;

#[derive(Parser)]
#[command(name = "codebase-qa-agent", version, about = "Local code question answering over an indexed project", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Path to a TOML config file overriding the default tuning knobs.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the base directory holding projects/, sessions.db, and repos/.
    #[arg(long, global = true)]
    base_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a fresh index for a project root.
    Index { project_path: PathBuf },
    /// Reconcile an existing index with on-disk changes.
    Update { project_path: PathBuf },
    /// Start a debounced watcher on a project root; blocks until interrupted.
    Watch { project_path: PathBuf },
    /// Clone a GitHub repository and index it.
    Clone { github_url: String },
    /// Remove a project's stored index.
    DeleteProject { project_identifier: String },
    /// List all indexed projects.
    ListProjects,
    /// Run the MCP stdio JSON-RPC server (also the default with no subcommand).
    Serve,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("codebase_qa=info".parse().unwrap()),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => match Config::load(path) {
            Ok(cfg) => cfg,
            Err(e) => {
                eprintln!("failed to load config from {}: {e}", path.display());
                std::process::exit(1);
            }
        },
        None => Config::default(),
    };
    if let Some(base_dir) = &cli.base_dir {
        config.base_dir = Some(base_dir.clone());
    }

    let store = Store::new(config.resolved_base_dir());
    let state = AppState::new(config, store);

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Index { project_path } => {
            print_json(operations::index_project(&state, &serde_json::json!({
                "project_path": project_path.display().to_string(),
            })));
        }
        Commands::Update { project_path } => {
            print_json(operations::update_index(&state, &serde_json::json!({
                "project_path": project_path.display().to_string(),
            })));
        }
        Commands::Watch { project_path } => {
            let result = operations::watch_project(&state, &serde_json::json!({
                "project_path": project_path.display().to_string(),
            }));
            print_json(result);
            tracing::info!("watching, press Ctrl-C to stop");
            loop {
                std::thread::sleep(std::time::Duration::from_secs(3600));
            }
        }
        Commands::Clone { github_url } => {
            print_json(operations::clone_and_index(&state, &serde_json::json!({ "github_url": github_url })));
        }
        Commands::DeleteProject { project_identifier } => {
            print_json(operations::delete_project(&state, &serde_json::json!({
                "project_identifier": project_identifier,
            })));
        }
        Commands::ListProjects => {
            print_json(operations::list_projects(&state));
        }
        Commands::Serve => {
            mcp::run_mcp(state);
        }
    }
}

fn print_json(value: serde_json::Value) {
    println!("{}", serde_json::to_string_pretty(&value).unwrap_or_else(|_| value.to_string()));
}
