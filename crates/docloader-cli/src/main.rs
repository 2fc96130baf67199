//! Docloader CLI - search index loader
//!
//! Loads JSON documents from a directory or NDJSON file into a search index.

mod commands;

use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "docloader")]
#[command(about = "Load JSON documents into a search index")]
#[command(version)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Search engine URL (default: http://localhost:9200)
    #[arg(long, global = true, env = "DOCLOADER_URL")]
    url: Option<String>,

    /// Request timeout in seconds
    #[arg(long, global = true, default_value = "30")]
    timeout: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load documents into an index
    Load(commands::load::LoadArgs),

    /// Delete an index (no-op if it does not exist)
    Delete {
        /// Index name
        #[arg(short, long, default_value = "recettes")]
        index: String,
    },

    /// Show whether an index exists
    Status {
        /// Index name
        #[arg(short, long, default_value = "recettes")]
        index: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let timeout = std::time::Duration::from_secs(cli.timeout);

    // Execute command
    match cli.command {
        Commands::Load(args) => commands::load::run(args, cli.url.as_deref(), timeout).await,
        Commands::Delete { index } => {
            commands::delete::run(&index, cli.url.as_deref(), timeout).await
        }
        Commands::Status { index } => {
            commands::status::run(&index, cli.url.as_deref(), timeout).await
        }
    }
}
