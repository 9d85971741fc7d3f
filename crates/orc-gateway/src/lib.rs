//! HTTP gateway: the Idempotency & Inbox Gate and Admission Controller's external face, plus the
//! task/stream/webhook/admin/metrics/health surface. Bootstrap follows the
//! teacher's `DispatcherServer::start` / `run_dispatcher` / `build_router` shape.

pub mod admission;
pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod state;
pub mod webhooks;

pub use admission::AdmissionController;
pub use config::GatewayConfig;
pub use error::{ApiError, ApiResult};
pub use state::AppState;

use anyhow::Context;
use axum::routing::{get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;

/// A running gateway. Holds the bind address and a shutdown handle so the binary crate can
/// trigger graceful shutdown alongside the dispatcher and outbox relay.
pub struct GatewayServer {
    pub addr: SocketAddr,
    shutdown_tx: watch::Sender<bool>,
    join: JoinHandle<anyhow::Result<()>>,
}

impl GatewayServer {
    pub async fn start(state: AppState, bind: SocketAddr) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(bind)
            .await
            .with_context(|| format!("bind gateway to {bind}"))?;
        let addr = listener.local_addr().context("gateway local_addr")?;

        let state = Arc::new(state);
        let app = build_router(state);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let join = tokio::spawn(run_server(listener, app, shutdown_rx));

        Ok(Self {
            addr,
            shutdown_tx,
            join,
        })
    }

    pub async fn shutdown(self) -> anyhow::Result<()> {
        let _ = self.shutdown_tx.send(true);
        self.join.await.context("join gateway task")??;
        Ok(())
    }
}

async fn run_server(
    listener: TcpListener,
    app: Router,
    mut shutdown_rx: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async move {
            while !*shutdown_rx.borrow() {
                if shutdown_rx.changed().await.is_err() {
                    break;
                }
            }
        })
        .await
        .context("gateway serve")?;
    Ok(())
}

fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/tasks", post(handlers::tasks::submit))
        .route("/tasks/{id}", get(handlers::tasks::get))
        .route("/stream/{id}", get(handlers::stream::stream))
        .route("/webhooks/{source}", post(handlers::webhook::accept))
        .route("/admin/dlq", get(handlers::admin::list_dlq))
        .route("/admin/dlq/{id}/requeue", post(handlers::admin::requeue_dlq))
        .route("/metrics", get(handlers::metrics::metrics))
        .route("/health", get(handlers::health::health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Installs the process-wide Prometheus recorder and returns its render handle, used both by
/// `GET /metrics` and wired into `AppState` at startup.
pub fn install_prometheus() -> anyhow::Result<metrics_exporter_prometheus::PrometheusHandle> {
    PrometheusBuilder::new()
        .install_recorder()
        .context("install prometheus recorder")
}
