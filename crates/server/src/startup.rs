//! Server startup: shared state initialization, background task spawning
//! and ordered teardown.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use newswire_bus::{Bus, NatsBus};
use newswire_core::config::{BusConfig, DatabaseConfig};
use newswire_core::Config;
use newswire_store::{MemoryStore, PgStore, RecordStore};
use newswire_sync::fetcher;

use crate::state::AppState;

/// Handles of the long-running tasks, joined on shutdown.
pub struct BackgroundTasks {
    scheduler: JoinHandle<()>,
    bus_consumer: Option<JoinHandle<()>>,
}

/// Open the record store: PostgreSQL when `DATABASE_URL` is set, otherwise
/// an in-memory table that is lost on restart.
pub async fn connect_store(config: &DatabaseConfig) -> anyhow::Result<Arc<dyn RecordStore>> {
    match &config.url {
        Some(url) => {
            let store = PgStore::connect(url, config.max_connections).await?;
            Ok(Arc::new(store))
        }
        None => {
            warn!("DATABASE_URL not set, using in-memory store; records will not survive a restart");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}

/// Connect to the bus. Any failure degrades to running without replication.
pub async fn connect_bus(config: &BusConfig) -> Option<Arc<dyn Bus>> {
    if !config.enabled {
        info!("bus disabled, running without replication");
        return None;
    }
    match NatsBus::connect(&config.nats_url, config.connect_timeout()).await {
        Ok(bus) => Some(Arc::new(bus)),
        Err(e) => {
            error!(error = %e, url = %config.nats_url, "failed to connect to NATS, continuing without replication");
            None
        }
    }
}

pub async fn build_app_state(config: &Config) -> anyhow::Result<Arc<AppState>> {
    let store = connect_store(&config.database).await?;
    info!("Record store ready (backend: {})", store.backend());

    let bus = connect_bus(&config.bus).await;
    let fetcher = fetcher::from_config(&config.fetcher)?;
    info!("Fetcher ready (mode: {})", config.fetcher.mode);

    Ok(Arc::new(AppState::new(
        store,
        bus,
        &config.bus.subject,
        fetcher,
        &config.scheduler,
    )))
}

/// Start the scheduler loop and, when a bus is connected, the bus consumer.
pub async fn spawn_background_tasks(state: &Arc<AppState>) -> BackgroundTasks {
    let scheduler = {
        let scheduler = state.scheduler.clone();
        let token = state.shutdown.clone();
        tokio::spawn(async move { scheduler.run(token).await })
    };

    let bus_consumer = match state.bridge.subscribe().await {
        Some(subscription) => {
            let bridge = state.bridge.clone();
            let token = state.shutdown.clone();
            Some(tokio::spawn(async move { bridge.run(subscription, token).await }))
        }
        None => None,
    };

    BackgroundTasks {
        scheduler,
        bus_consumer,
    }
}

/// Cancel background work, wait for it to wind down, then close the bus and
/// the store.
pub async fn shutdown(state: &AppState, tasks: BackgroundTasks) {
    state.shutdown.cancel();

    if let Err(e) = tasks.scheduler.await {
        warn!(error = %e, "scheduler task ended abnormally");
    }
    if let Some(consumer) = tasks.bus_consumer {
        if let Err(e) = consumer.await {
            warn!(error = %e, "bus consumer task ended abnormally");
        }
    }

    state.bridge.close().await;
    state.store.close().await;
    info!("shutdown complete");
}
