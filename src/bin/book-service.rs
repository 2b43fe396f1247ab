use tracing::{info, warn};

use book_gateway::config::Config;
use book_gateway::rpc::{ServerOptions, ShutdownOutcome};
use book_gateway::signal::shutdown_signal;
use book_gateway::{service, telemetry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    telemetry::init();

    info!(version = env!("CARGO_PKG_VERSION"), "book-service starting");

    let config = Config::load()?;

    let db = service::open_store(&config.storage)?;
    info!("Book database opened at: {}", config.storage.books_data_dir);

    let options = ServerOptions::from_config(&config.rpc);
    let bind_address = config.rpc.bind_address();
    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    info!(
        max_workers = options.max_workers,
        max_message_size = options.max_message_size,
        "Book service listening on: {}",
        bind_address
    );

    match service::run(listener, db, options, shutdown_signal()).await {
        ShutdownOutcome::Graceful => info!("Server stopped successfully"),
        ShutdownOutcome::Forced => warn!("Server forced to stop"),
    }

    Ok(())
}
