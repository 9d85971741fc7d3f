use std::collections::HashMap;

/// HTTP surface configuration. Loaded by the `orchestrator` binary's CLI/env layer and
/// passed in whole; this crate has no opinion on *where* values come from.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub max_queue_depth: i64,
    pub webhook_secret: String,
    pub api_key_salt: String,
    pub replay_window_secs: i64,
    pub provider_budgets_usd: HashMap<String, f64>,
    /// Default `max_retries` for a submitted task that doesn't specify one.
    pub task_max_retries: i32,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            max_queue_depth: 10_000,
            webhook_secret: String::new(),
            api_key_salt: String::new(),
            replay_window_secs: 300,
            provider_budgets_usd: HashMap::new(),
            task_max_retries: 5,
        }
    }
}
