use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use studybuddy_ingest::config::Config;
use studybuddy_ingest::pipeline::Ingestor;
use studybuddy_ingest::server::run_server;
use studybuddy_ingest::storage::Store;

#[derive(Parser)]
#[command(
    name = "sbingest",
    about = "StudyBuddy ingestion pipeline — PDF/DOCX to embedded chunks in MongoDB",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve {
        /// Address to bind
        #[arg(long, default_value = "0.0.0.0:8000")]
        bind: String,
    },

    /// Connect to MongoDB and create the lookup indexes
    Init,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    match cli.command {
        Commands::Serve { bind } => {
            let store = Arc::new(Store::connect(&config.mongo).await?);
            store.ensure_indexes().await?;
            let ingestor = Arc::new(Ingestor::new(config, store)?);
            run_server(ingestor, &bind).await?;
        }
        Commands::Init => {
            let store = Store::connect(&config.mongo).await?;
            store.ping().await?;
            store.ensure_indexes().await?;
            println!("ok");
        }
    }

    Ok(())
}
