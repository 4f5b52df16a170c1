//! memlink - message–memory provenance linker CLI
//!
//! - `import`: bulk-import persisted chat records and print the report
//! - `resolve`: print the display provenance of persisted records
//! - `demo`: run a link/confirm/timeout scenario in-process

use clap::{Parser, Subcommand};
use memlink_linker::LinkerConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

/// memlink CLI
#[derive(Parser)]
#[command(name = "memlink")]
#[command(about = "Message-memory provenance linker", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "MEMLINK_CONFIG", global = true)]
    config: Option<String>,

    /// Log level (overrides the configured level)
    #[arg(long, env = "MEMLINK_LOG_LEVEL", global = true)]
    log_level: Option<String>,

    /// Enable JSON logging
    #[arg(long, env = "MEMLINK_LOG_JSON", global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import a JSON array of persisted records into a conversation
    Import {
        /// Path to the JSON file
        file: String,

        /// Target conversation id
        #[arg(long, default_value = "default")]
        conversation: String,
    },

    /// Print the display provenance of each record in a JSON array
    Resolve {
        /// Path to the JSON file
        file: String,
    },

    /// Run an in-process link scenario and log every link event
    Demo {
        /// Link timeout for the demo, in seconds
        #[arg(long, default_value_t = 2)]
        timeout_secs: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = LinkerConfig::load(cli.config.as_deref())?;

    // Initialize tracing
    let level = cli
        .log_level
        .clone()
        .unwrap_or_else(|| config.logging.level.clone());
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| level.into());

    if cli.json || config.logging.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    match cli.command {
        Commands::Import { file, conversation } => {
            commands::import(config, &file, &conversation).await
        }
        Commands::Resolve { file } => commands::resolve(&file),
        Commands::Demo { timeout_secs } => commands::demo(config, timeout_secs).await,
    }
}
