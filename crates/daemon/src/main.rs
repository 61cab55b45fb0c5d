//! Farmhand - Main Entry Point
//!
//! Composition root: wires the store, registries, scheduler, and RPC server.

mod telemetry;

use std::sync::Arc;

use anyhow::Result;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use farmhand_api_rpc::server::RpcServerConfig;
use farmhand_api_rpc::RpcServer;
use farmhand_core::application::{
    shared_group_table, shutdown_channel, AgentRegistry, JobRegistry, LifecycleDriver,
    PriorityQueues, RetryPolicy, Scheduler,
};
use farmhand_core::config::{OrchestratorConfig, TenantWeights};
use farmhand_core::port::id_provider::UuidProvider;
use farmhand_core::port::state_store::memory::MemoryStateStore;
use farmhand_core::port::time_provider::SystemTimeProvider;
use farmhand_core::port::{StateStore, TimeProvider};
use farmhand_core::store::RecordStore;
use farmhand_infra_redis::RedisStateStore;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize logging
    let log_format = std::env::var("FARMHAND_LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("farmhand=info"))
        .expect("Failed to create env filter");

    match log_format.as_str() {
        "json" => {
            // Production: JSON structured logging
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json())
                .init();
        }
        _ => {
            // Development: pretty formatting
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().pretty())
                .init();
        }
    }

    info!("Farmhand orchestrator v{} starting...", VERSION);

    if let Err(e) = telemetry::init_telemetry() {
        warn!(error = ?e, "Failed to initialize OpenTelemetry (continuing without it)");
    }

    // 2. Load configuration
    let config = Arc::new(load_config()?);
    let rpc_port: u16 = std::env::var("FARMHAND_RPC_PORT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or_else(|| RpcServerConfig::default().port);

    // 3. Connect the state store
    let time_provider: Arc<dyn TimeProvider> = Arc::new(SystemTimeProvider);
    let store: Arc<dyn StateStore> = match std::env::var("FARMHAND_STORE_URL") {
        Ok(url) => Arc::new(RedisStateStore::connect(&url).await?),
        Err(_) => {
            warn!("FARMHAND_STORE_URL not set; using volatile in-memory store");
            Arc::new(MemoryStateStore::new(time_provider.clone()))
        }
    };
    store.ping().await?;
    info!("State store reachable");

    // 4. Setup dependencies (DI wiring)
    let id_provider = Arc::new(UuidProvider);
    let records = Arc::new(RecordStore::new(store, &config));
    let queues = Arc::new(PriorityQueues::new(records.clone()));
    let groups = shared_group_table();

    let jobs = Arc::new(JobRegistry::new(
        records.clone(),
        queues.clone(),
        id_provider.clone(),
        time_provider.clone(),
    ));
    let agents = Arc::new(AgentRegistry::new(
        records.clone(),
        id_provider.clone(),
        time_provider.clone(),
        config.clone(),
    ));
    let lifecycle = Arc::new(LifecycleDriver::new(
        records.clone(),
        queues.clone(),
        groups.clone(),
        RetryPolicy::new(config.max_attempts),
        time_provider.clone(),
    ));
    let scheduler = Arc::new(Scheduler::new(
        records.clone(),
        queues.clone(),
        agents.clone(),
        groups,
        config.clone(),
        time_provider.clone(),
    ));

    // 5. Startup reconciliation: rebuild groups and revert orphaned runs
    info!("Running startup reconciliation tick...");
    match scheduler.tick().await {
        Ok(()) => info!("Startup reconciliation completed"),
        Err(e) => tracing::error!(error = ?e, "Startup reconciliation failed"),
    }

    // 6. Start JSON-RPC server
    info!("Starting JSON-RPC server...");
    let rpc_config = RpcServerConfig {
        port: rpc_port,
        ..Default::default()
    };
    let rpc_server = RpcServer::new(
        rpc_config,
        jobs,
        agents,
        lifecycle,
        records,
        queues,
        scheduler.kick_handle(),
    );
    let rpc_handle = rpc_server
        .start()
        .await
        .map_err(|e| anyhow::anyhow!("RPC server start failed: {}", e))?;

    // 7. Start the scheduler loop
    info!("Starting scheduler loop...");
    let (shutdown_tx, shutdown_rx) = shutdown_channel();
    let scheduler_handle = tokio::spawn(async move {
        scheduler.run(shutdown_rx).await;
    });

    info!("System ready. Waiting for submissions...");
    info!("Press Ctrl+C to shutdown");

    // 8. Wait for shutdown signal
    tokio::signal::ctrl_c().await?;

    info!("Shutdown signal received. Exiting gracefully...");

    // 9. Graceful shutdown: the scheduler finishes its in-flight tick
    shutdown_tx.shutdown();
    rpc_handle
        .stop()
        .map_err(|e| anyhow::anyhow!("RPC server stop failed: {}", e))?;
    let _ = tokio::time::timeout(std::time::Duration::from_secs(5), scheduler_handle).await;

    info!("Shutdown complete.");

    Ok(())
}

/// Build the orchestrator configuration from FARMHAND_* env vars
fn load_config() -> Result<OrchestratorConfig> {
    let mut config = OrchestratorConfig::default();

    if let Ok(v) = std::env::var("FARMHAND_TICK_INTERVAL_MS") {
        config.tick_interval_ms = v.parse()?;
    }
    if let Ok(v) = std::env::var("FARMHAND_LIVENESS_TTL_MS") {
        config.liveness_ttl_ms = v.parse()?;
    }
    if let Ok(v) = std::env::var("FARMHAND_JOB_MAX_RUNTIME_MS") {
        config.job_max_runtime_ms = v.parse()?;
    }
    if let Ok(v) = std::env::var("FARMHAND_MAX_ATTEMPTS") {
        config.max_attempts = v.parse()?;
    }
    if let Ok(v) = std::env::var("FARMHAND_TENANT_WEIGHTS") {
        config.tenant_weights =
            TenantWeights::parse(&v).map_err(|e| anyhow::anyhow!("FARMHAND_TENANT_WEIGHTS: {}", e))?;
    }

    Ok(config)
}
