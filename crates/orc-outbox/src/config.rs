#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub poll_interval_ms: u64,
    pub batch_size: i64,
    pub purge_after_days: i64,
    pub purge_interval_ms: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1_000,
            batch_size: 50,
            purge_after_days: 7,
            purge_interval_ms: 3_600_000,
        }
    }
}
