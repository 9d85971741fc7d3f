use crate::config::AppConfig;
use crate::wiring;
use orc_dispatcher::{Dispatcher, DispatcherConfig};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

pub async fn run(cfg: &AppConfig) -> anyhow::Result<()> {
    let shared = wiring::build(cfg).await?;

    let dispatcher_config = DispatcherConfig {
        max_concurrency: cfg.max_concurrency,
        lease_seconds: cfg.task_lease_seconds,
        backoff_cap_secs: cfg.task_backoff_max_sec,
        ..DispatcherConfig::default()
    };

    let dispatcher = Arc::new(Dispatcher::new(
        shared.store.clone(),
        shared.broker.clone(),
        shared.breakers,
        shared.budget,
        shared.handlers,
        dispatcher_config,
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let reaper = tokio::spawn(orc_dispatcher::lease_reaper::run(
        shared.store,
        shared.broker,
        Duration::from_millis(5_000),
        shutdown_rx.clone(),
    ));
    let slots = tokio::spawn(dispatcher.run(shutdown_rx));

    tracing::info!(max_concurrency = cfg.max_concurrency, "worker started");
    tokio::signal::ctrl_c().await?;
    tracing::info!("worker shutting down");
    let _ = shutdown_tx.send(true);

    slots.await??;
    reaper.await?;
    Ok(())
}
