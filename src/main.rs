//! nice-mock: mock server for partner integration testing.
//!
//! Protocol:
//! - Encoding: EUC-KR
//! - Message: [10-digit length][payload], length counts payload bytes only
//!
//! Behaviour:
//! - Response size: 10-14KB (random)
//! - Response delay: 0.5-2s (random)
//! - At most 100 concurrent sessions, excess connections are closed on accept

use nice_mock::config::Config;
use nice_mock::server::{Server, Shutdown};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!(
        port = config.port,
        workers = config.max_workers,
        max_sessions = config.max_sessions,
        min_response_bytes = config.min_response_bytes,
        max_response_bytes = config.max_response_bytes,
        min_delay_ms = config.min_delay_ms,
        max_delay_ms = config.max_delay_ms,
        "Starting nice-mock server"
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("nice-mock-worker")
        .build()?;

    runtime.block_on(async {
        let server = Server::bind(config)?;
        let shutdown = Shutdown::new();

        let trigger = shutdown.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("Shutting down server...");
                    trigger.trigger();
                }
                Err(e) => error!(error = %e, "Failed to listen for shutdown signal"),
            }
        });

        server.run(shutdown).await
    })?;

    Ok(())
}
