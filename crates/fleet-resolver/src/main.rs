//! Fleet Resolver - instance type catalog and launch selection service
//!
//! Runs next to the cluster autoscaler, which calls it to list schedulable
//! instance types, pick launch targets and report failed launches.

use anyhow::Result;
use fleet_lib::{
    catalog::CatalogSources,
    health::HealthRegistry,
    FleetResolver, StructuredLogger, SystemClock, ZoneTable,
};
use fleet_resolver::{api, config::ResolverConfig, sources::SnapshotInventory};
use std::sync::Arc;
use tracing::{debug, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const RESOLVER_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting fleet-resolver");

    let config = ResolverConfig::load()?;
    info!(
        instance = %config.instance_name,
        snapshot_dir = %config.snapshot_dir.display(),
        "Resolver configured"
    );

    let health_registry = HealthRegistry::new();
    health_registry.register_all().await;

    let logger = StructuredLogger::new(&config.instance_name);
    logger.log_startup(RESOLVER_VERSION);

    let inventory = Arc::new(SnapshotInventory::new(&config.snapshot_dir));
    let sources = CatalogSources {
        quotas: inventory.clone(),
        pod_limits: inventory.clone(),
        cluster: inventory,
        zones: Arc::new(ZoneTable::default()),
    };
    let resolver = Arc::new(FleetResolver::new(
        sources,
        config.engine(),
        Arc::new(SystemClock),
        logger.clone(),
    )?);

    let app_state = Arc::new(api::AppState::new(resolver, health_registry.clone()));

    // Drop expired failure state and reset the blocked gauge once the blocklist drains
    let purge_state = app_state.clone();
    let mut purge_interval = tokio::time::interval(config.purge_interval());
    let purge_handle = tokio::spawn(async move {
        loop {
            purge_interval.tick().await;
            let removed = purge_state.purge_expired().await;
            if removed > 0 {
                debug!(removed = removed, "Purged expired failure state");
            }
        }
    });

    health_registry.set_ready(true).await;

    let api_handle = tokio::spawn(api::serve(config.api_port, app_state));

    tokio::signal::ctrl_c().await?;
    logger.log_shutdown("SIGINT received");
    info!("Shutting down");

    purge_handle.abort();
    api_handle.abort();

    Ok(())
}
