mod cmd;
mod output;
mod root;

use clap::{Parser, Subcommand};
use cmd::{task::TaskSubcommand, worker::WorkerSubcommand};
use dispatch_core::types::TaskType;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "dispatch",
    about = "Task dispatch coordination: match, score, and allocate workers to tasks",
    version,
    propagate_version = true
)]
struct Cli {
    /// Project root (default: auto-detect from .dispatch/)
    #[arg(long, global = true, env = "DISPATCH_ROOT")]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create .dispatch/ with default config and an empty database
    Init,

    /// Start the HTTP API
    Serve {
        /// Port to listen on (default: server.port from config)
        #[arg(long)]
        port: Option<u16>,
    },

    /// Manage tasks
    Task {
        #[command(subcommand)]
        subcommand: TaskSubcommand,
    },

    /// Manage workers
    Worker {
        #[command(subcommand)]
        subcommand: WorkerSubcommand,
    },

    /// List candidate workers for a task
    Match {
        task_id: String,
        #[arg(long = "type")]
        task_type: Option<TaskType>,
    },

    /// Assign a worker to a task
    Allocate {
        task_id: String,
        worker_id: String,
        #[arg(long = "type")]
        task_type: Option<TaskType>,
    },

    /// Run the full dispatch flow (match, evaluate, allocate) for a task
    Run {
        task_id: String,
        /// Preferred worker; must be among the candidates
        #[arg(long)]
        worker: Option<String>,
        #[arg(long = "type")]
        task_type: Option<TaskType>,
        /// Scoring model version
        #[arg(long)]
        model: Option<String>,
    },

    /// Show the decision history of a task
    Replay { task_id: String },

    /// Show dispatch metrics
    Metrics,
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Serve { .. } => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let root = root::resolve_root(cli.root.as_deref());

    let result = match cli.command {
        Commands::Init => cmd::init::run(&root),
        Commands::Serve { port } => cmd::serve::run(&root, port),
        Commands::Task { subcommand } => cmd::task::run(&root, subcommand, cli.json),
        Commands::Worker { subcommand } => cmd::worker::run(&root, subcommand, cli.json),
        Commands::Match { task_id, task_type } => {
            cmd::dispatch::match_candidates(&root, &task_id, task_type, cli.json)
        }
        Commands::Allocate {
            task_id,
            worker_id,
            task_type,
        } => cmd::dispatch::allocate(&root, &task_id, &worker_id, task_type, cli.json),
        Commands::Run {
            task_id,
            worker,
            task_type,
            model,
        } => cmd::dispatch::run_flow(&root, &task_id, worker, task_type, model, cli.json),
        Commands::Replay { task_id } => cmd::dispatch::replay(&root, &task_id, cli.json),
        Commands::Metrics => cmd::metrics::run(&root, cli.json),
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
