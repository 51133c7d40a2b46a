//! Loghouse Server
//!
//! Process entry point for the Loghouse log storage engine.
//!
//! ## Startup Sequence
//! 1. Install tracing (controlled via `RUST_LOG`, default `info`)
//! 2. Open the store over the mount directory
//! 3. Recover: replay the unflushed WAL and rebuild indexes (fatal on error)
//! 4. Start the background flusher
//! 5. Serve the HTTP API until ctrl-c, then close the store gracefully
//!
//! ## Configuration
//! All configuration is done via environment variables:
//!
//! - `LOGHOUSE_ADDR`: bind address (default: 0.0.0.0:8080)
//! - `LOGHOUSE_DATA`: mount directory (default: ./loghouse_data)
//! - `LOGHOUSE_SEGMENT_MAX_SIZE`: segment rotation threshold in bytes
//!   (default: 16777216)
//! - `LOGHOUSE_FLUSH_INTERVAL_MS`: background flush cadence (default: 1000)
//!
//! ## Example Usage
//! ```bash
//! LOGHOUSE_DATA=/var/lib/loghouse RUST_LOG=debug cargo run -p loghouse-server
//!
//! curl -X POST localhost:8080/write -d '{"Timestamp":1700000000000,
//!   "Level":"ERROR","Service":"auth","Host":"web-1",
//!   "Message":"failed login","StackTrace":"","Properties":{}}'
//!
//! curl -X POST localhost:8080/query -d '{"Filters":[{"Field":"Level",
//!   "Value":"ERROR"}],"SortAsc":true}'
//! ```

use std::sync::Arc;

use loghouse_server::{create_router, AppState};
use loghouse_storage::{LogStore, StoreConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let bind_addr = std::env::var("LOGHOUSE_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());

    let mut config = StoreConfig::default();
    if let Ok(data_dir) = std::env::var("LOGHOUSE_DATA") {
        config.data_dir = data_dir.into();
    }
    if let Ok(max_size) = std::env::var("LOGHOUSE_SEGMENT_MAX_SIZE") {
        config.segment_max_size = max_size.parse()?;
    }
    if let Ok(interval) = std::env::var("LOGHOUSE_FLUSH_INTERVAL_MS") {
        config.flush_interval_ms = interval.parse()?;
    }

    tracing::info!(data_dir = %config.data_dir.display(), "Opening log store");
    let store = Arc::new(LogStore::open(config).await?);

    store.recover().await?;
    store.start_background_flush().await;

    let router = create_router(AppState { store: store.clone() });
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(addr = %bind_addr, "Loghouse listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutdown signal received");
        })
        .await?;

    store.close().await?;
    Ok(())
}
