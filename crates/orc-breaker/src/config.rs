#[derive(Debug, Clone, Copy)]
pub struct BreakerConfig {
    /// Rolling window size in calls, default 20.
    pub window_size: usize,
    /// `CIRCUIT_BREAKER_THRESHOLD`, default 0.1.
    pub failure_threshold: f64,
    /// Minimum samples in the window before the threshold is evaluated, default 5.
    pub min_samples: usize,
    /// `CIRCUIT_BREAKER_TIMEOUT` in seconds, default 600.
    pub open_timeout_secs: i64,
    /// Cap on the doubling half_open→open timeout, default 3600 (1 hour).
    pub max_timeout_secs: i64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            window_size: 20,
            failure_threshold: 0.1,
            min_samples: 5,
            open_timeout_secs: 600,
            max_timeout_secs: 3600,
        }
    }
}
