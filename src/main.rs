//! trustbot CLI entry point

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod config;
mod kg_store;

#[derive(Parser)]
#[command(name = "trustbot")]
#[command(about = "Validates a knowledge graph's recorded call flows against the call graph reconstructed from source", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Repository root path (defaults to current directory)
    #[arg(short, long, default_value = ".")]
    root: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Build (or rebuild) the on-disk code index for the repository
    Index,
    /// Detect languages present and generate or refresh their chunking profiles
    Profile {
        /// Only profile this language (by name), instead of every language detected
        #[arg(short, long)]
        language: Option<String>,
    },
    /// Validate one or more execution flows against the knowledge graph
    Validate {
        /// Flow keys to validate
        flow_keys: Vec<String>,

        /// Project id, passed through to the summary report
        #[arg(long)]
        project: Option<String>,

        /// Run id, passed through to the summary report
        #[arg(long)]
        run: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(format!("trustbot={log_level}")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("trustbot v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(root = %cli.root.display(), "starting");

    let config = config::TrustConfig::load(&cli.root)?;

    match cli.command {
        Commands::Index => commands::index(&cli.root, &config).await,
        Commands::Profile { language } => commands::profile(&cli.root, &config, language.as_deref()).await,
        Commands::Validate { flow_keys, project, run } => commands::validate(&cli.root, &config, &flow_keys, project, run).await,
    }
}
