//! Data Core - runs the data services against the in-memory adapters
//!
//! Wires the store, cache, executor, change bridge and session manager
//! together and keeps them alive until a shutdown signal arrives.

use std::sync::Arc;

use anyhow::Context;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use data_core::notify::BridgeEvent;
use data_core::session::User;
use data_core::{
    ChangeBridge, Config, MemoryCache, MemoryStore, QueryExecutor, Repository, SessionManager,
};

/// Main entry point.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Create the in-memory store and cache
/// 4. Probe connectivity through the query executor
/// 5. Start the change bridge and session manager
/// 6. Handle graceful shutdown on SIGINT/SIGTERM
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "data_core=info", can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "data_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Data Core");

    let config = Config::from_env();
    info!(
        "Configuration loaded: cache_ttl={}s, session_ttl={}s, sweep_interval={}s, query_retry_attempts={}",
        config.cache_ttl, config.session_ttl, config.sweep_interval, config.query_retry_attempts
    );

    let store = MemoryStore::default();
    let cache = Arc::new(MemoryCache::new());

    let executor = QueryExecutor::new(Arc::new(store.clone()), config.query_retry_delay());
    if !executor.check_connection().await {
        anyhow::bail!("Store is not reachable");
    }
    executor
        .execute_query("SELECT 1", &[], config.query_options())
        .await
        .context("Startup probe query failed")?;
    info!("Store status: {:?}", executor.get_status());

    let bridge = ChangeBridge::start(
        Arc::new(store.clone()),
        &config.change_tables,
        config.event_buffer,
    )
    .await
    .context("Failed to start change bridge")?;
    let mut changes = bridge.on_database_change(Vec::<String>::new());
    let change_logger = tokio::spawn(async move {
        while let Some(event) = changes.recv().await {
            if let BridgeEvent::Change(change) = event {
                info!("Change: {:?} on {}", change.operation, change.table);
            }
        }
    });

    let users: Repository<User> =
        Repository::new(Arc::new(store.clone()), cache.clone(), config.repository());
    let sessions = SessionManager::new(
        Arc::new(store.clone()),
        Arc::new(store.clone()),
        cache,
        config.session(),
    );
    info!(
        "Services ready; users table holds {} record(s)",
        users.find_with_cache(&Default::default(), None).await?.len()
    );

    shutdown_signal().await;

    sessions.shutdown();
    bridge.shutdown().await;
    if let Err(e) = change_logger.await {
        warn!("Change logger ended abnormally: {}", e);
    }

    info!("Shutdown complete");
    Ok(())
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }
}
