use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use keystash::commands;

#[derive(Parser)]
#[command(name = "keystash")]
#[command(about = "Embedded key-value store with file and SQLite persistence")]
#[command(version)]
struct Cli {
    /// Configuration file (defaults to ./keystash.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the value stored under a key
    Get {
        key: String,
        /// Pretty-print the JSON value
        #[arg(short, long)]
        pretty: bool,
    },
    /// Store a value (parsed as JSON, or kept as a string)
    Set { key: String, value: String },
    /// Remove a key
    Delete { key: String },
    /// List all keys
    Keys,
    /// Create a backup of the persisted store
    Backup,
    /// Print the store version (-1 when versioning is disabled)
    Version,
}

#[tokio::main]
async fn main() -> Result<()> {
    commands::init_logging();

    let cli = Cli::parse();
    let config = commands::load_config(cli.config.as_deref())?;
    let store = commands::open_store(&config).await?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    let result = match cli.command {
        Commands::Get { key, pretty } => commands::kv::get(&store, &key, pretty, &mut out),
        Commands::Set { key, value } => commands::kv::set(&store, &key, &value, &mut out).await,
        Commands::Delete { key } => commands::kv::delete(&store, &key, &mut out).await,
        Commands::Keys => commands::kv::keys(&store, &mut out),
        Commands::Backup => commands::admin::backup(&store, &mut out).await,
        Commands::Version => commands::admin::version(&store, &mut out),
    };

    store.dispose();
    result
}
