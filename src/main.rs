use std::sync::Arc;
use tracing::info;

use book_gateway::signal::shutdown_signal;
use book_gateway::storage::{Database, Store};
use book_gateway::{api, config::Config, telemetry, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    telemetry::init();

    info!(version = env!("CARGO_PKG_VERSION"), "book-gateway starting");

    // Load configuration
    let config = Config::load()?;
    info!(
        api = %config.api.bind_address(),
        book_service = %config.rpc.target_address(),
        "Loaded configuration"
    );

    // Initialize identity database
    let db = Database::open(&config.storage.data_dir, Store::Identities)?;
    info!("Identity database opened at: {}", config.storage.data_dir);

    let bind_address = config.api.bind_address();
    let state = Arc::new(AppState::new(config, db));

    // Build and start the HTTP server
    let app = api::create_router(state);
    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    info!("Listening on: {}", bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutdown complete");
    Ok(())
}
