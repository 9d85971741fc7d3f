use crate::config::AppConfig;
use crate::wiring;

pub async fn run(cfg: &AppConfig) -> anyhow::Result<()> {
    let shared = wiring::build(cfg).await?;
    let prometheus = orc_gateway::install_prometheus()?;
    let state = orc_gateway::AppState::new(
        shared.store,
        shared.broker,
        shared.breakers,
        shared.budget,
        wiring::gateway_config(cfg),
        prometheus,
    );

    let bind: std::net::SocketAddr = cfg.gateway_bind.parse()?;
    let server = orc_gateway::GatewayServer::start(state, bind).await?;
    tracing::info!(addr = %server.addr, "gateway listening");

    tokio::signal::ctrl_c().await?;
    tracing::info!("gateway shutting down");
    server.shutdown().await?;
    Ok(())
}
