use crate::config::AppConfig;
use orc_store::Store;

pub async fn run(cfg: &AppConfig) -> anyhow::Result<()> {
    let store = Store::connect(&cfg.database_url, 5).await?;
    store.migrate().await?;
    tracing::info!("migrations complete");
    Ok(())
}
