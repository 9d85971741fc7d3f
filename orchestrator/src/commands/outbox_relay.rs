use crate::config::AppConfig;
use orc_outbox::{LoggingSink, Relay, RelayConfig};
use orc_store::Store;
use std::sync::Arc;
use tokio::sync::watch;

pub async fn run(cfg: &AppConfig) -> anyhow::Result<()> {
    let store = Store::connect(&cfg.database_url, 5).await?;
    let relay = Arc::new(Relay::new(
        store,
        Arc::new(LoggingSink),
        RelayConfig::default(),
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let join = tokio::spawn(relay.run(shutdown_rx));

    tracing::info!("outbox relay started");
    tokio::signal::ctrl_c().await?;
    tracing::info!("outbox relay shutting down");
    let _ = shutdown_tx.send(true);
    join.await?;
    Ok(())
}
