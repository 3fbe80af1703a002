//! Briefsmith CLI: run, resolve and inspect research briefs.

mod commands;
mod script;

use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Briefsmith: iterative research briefs that refine themselves until saturated
#[derive(Parser, Debug)]
#[command(name = "briefsmith", version, about, long_about = None)]
struct Cli {
    /// Workspace directory
    #[arg(short, long, default_value = ".")]
    workspace: PathBuf,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Replay a scripted run through the refinement pipeline
    Run {
        /// Script file (JSON) with the plan, updates and evaluations
        #[arg(short, long)]
        script: PathBuf,
        /// Output directory (defaults to output.output_dir from config)
        #[arg(short, long)]
        out: Option<PathBuf>,
        /// Override the subject named in the script
        #[arg(long)]
        subject: Option<String>,
    },
    /// Resolve citation markers in a report against a saved registry
    Resolve {
        /// Report text containing <cite source="src-N"/> markers
        #[arg(long)]
        report: PathBuf,
        /// Registry JSON written by a previous run
        #[arg(long)]
        registry: PathBuf,
        /// Write the resolved text here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Summarize a brief file
    Inspect {
        /// Brief JSON file
        brief: PathBuf,
    },
    /// List saved run snapshots, newest first
    Runs,
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Subcommand, Debug)]
enum ConfigAction {
    /// Create a default configuration file in the workspace
    Init,
    /// Show the current configuration
    Show,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // Set up tracing: human-readable stderr + JSON file logging
    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::new(filter));

    let log_dir = briefsmith_core::config::log_dir().unwrap_or_else(|| PathBuf::from("."));
    let _ = std::fs::create_dir_all(&log_dir);
    let file_appender = tracing_appender::rolling::daily(&log_dir, "briefsmith.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let json_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking)
        .with_filter(EnvFilter::new("debug"));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let workspace = cli
        .workspace
        .canonicalize()
        .unwrap_or_else(|_| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    commands::handle_command(cli.command, &workspace).await
}
