use crate::config::AppConfig;
use crate::stub_handler::StubHandler;
use orc_breaker::{BreakerConfig, Registry as BreakerRegistry};
use orc_budget::{Accountant, ProviderBudgets};
use orc_core::TaskType;
use orc_dispatcher::HandlerRegistry;
use orc_gateway::GatewayConfig;
use orc_queue::{Broker, BrokerConfig};
use orc_store::Store;
use std::collections::HashMap;
use std::sync::Arc;

/// Components shared across subcommands, assembled once from `AppConfig`.
pub struct Shared {
    pub store: Store,
    pub broker: Arc<Broker>,
    pub breakers: Arc<BreakerRegistry>,
    pub budget: Arc<Accountant>,
    pub handlers: Arc<HandlerRegistry>,
}

pub async fn build(cfg: &AppConfig) -> anyhow::Result<Shared> {
    let store = Store::connect(&cfg.database_url, 10).await?;

    let broker = Arc::new(Broker::new(BrokerConfig {
        lease_seconds: cfg.task_lease_seconds,
    }));

    let breaker_config = BreakerConfig {
        failure_threshold: cfg.circuit_breaker_threshold,
        open_timeout_secs: cfg.circuit_breaker_timeout,
        ..BreakerConfig::default()
    };
    let breakers = Arc::new(BreakerRegistry::new(store.clone(), breaker_config));

    let budgets = ProviderBudgets::new(HashMap::from([
        ("openai".to_string(), cfg.model_daily_budget_usd),
        ("anthropic".to_string(), cfg.model_daily_budget_usd),
    ]));
    let budget = Arc::new(Accountant::new(store.clone(), budgets));

    let mut registry = HandlerRegistry::new();
    for task_type in [
        TaskType::CodePr,
        TaskType::CenterpointSync,
        TaskType::MrgDeploy,
        TaskType::GenContent,
        TaskType::AureaAction,
    ] {
        registry.register(task_type, Arc::new(StubHandler));
    }

    Ok(Shared {
        store,
        broker,
        breakers,
        budget,
        handlers: Arc::new(registry),
    })
}

pub fn gateway_config(cfg: &AppConfig) -> GatewayConfig {
    GatewayConfig {
        max_queue_depth: cfg.max_queue_depth,
        webhook_secret: cfg.webhook_secret.clone(),
        api_key_salt: cfg.api_key_salt.clone(),
        replay_window_secs: 300,
        provider_budgets_usd: HashMap::from([
            ("openai".to_string(), cfg.model_daily_budget_usd),
            ("anthropic".to_string(), cfg.model_daily_budget_usd),
        ]),
        task_max_retries: cfg.task_max_retries,
    }
}
