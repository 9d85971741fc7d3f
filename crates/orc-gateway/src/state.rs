use crate::admission::AdmissionController;
use crate::config::GatewayConfig;
use metrics_exporter_prometheus::PrometheusHandle;
use orc_breaker::Registry as BreakerRegistry;
use orc_budget::Accountant;
use orc_queue::Broker;
use orc_store::Store;
use std::sync::Arc;

/// Shared handler state, held behind `Arc` across the router.
#[derive(Clone)]
pub struct AppState {
    pub store: Store,
    pub broker: Arc<Broker>,
    pub breakers: Arc<BreakerRegistry>,
    pub budget: Arc<Accountant>,
    pub admission: Arc<AdmissionController>,
    pub config: GatewayConfig,
    pub prometheus: PrometheusHandle,
}

impl AppState {
    pub fn new(
        store: Store,
        broker: Arc<Broker>,
        breakers: Arc<BreakerRegistry>,
        budget: Arc<Accountant>,
        config: GatewayConfig,
        prometheus: PrometheusHandle,
    ) -> Self {
        let admission = Arc::new(AdmissionController::new(
            store.clone(),
            breakers.clone(),
            budget.clone(),
            config.clone(),
        ));
        Self {
            store,
            broker,
            breakers,
            budget,
            admission,
            config,
            prometheus,
        }
    }
}
