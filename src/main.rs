mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use reading_relay::config::{BrokerArgs, RelayArgs};
use std::path::PathBuf;
use tracing::error;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

#[derive(Parser, Debug)]
#[command(
    name = "reading-relay",
    version = reading_relay::version(),
    about = "Relay weather readings from a durable JetStream queue to an HTTP ingestion API"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Consume readings from the queue and deliver them to the API
    Run(RelayArgs),

    /// Publish readings from a JSON-lines file onto the queue
    Publish {
        #[command(flatten)]
        broker: BrokerArgs,

        /// File with one JSON reading per line
        #[arg(long)]
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file before clap reads them
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let sentry_guard = reading_relay::logging::init_sentry(reading_relay::version());
    reading_relay::logging::init_tracing(sentry_guard.is_some());

    let result = match cli.command {
        Commands::Run(args) => commands::handle_run(args).await,
        Commands::Publish { broker, file } => commands::handle_publish(broker, file).await,
    };

    if let Err(e) = &result {
        error!("{:#}", e);
    }
    result
}
