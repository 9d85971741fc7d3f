#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// `MAX_CONCURRENCY`: slots run concurrently per worker process.
    pub max_concurrency: usize,
    /// `TASK_LEASE_SECONDS`, default 900.
    pub lease_seconds: i64,
    /// Backoff base, default 1s. `delay = min(cap, base * 2^retry_count) * jitter`.
    pub backoff_base_secs: f64,
    /// `TASK_BACKOFF_MAX_SEC`, default 60.
    pub backoff_cap_secs: f64,
    /// How often the lease reaper scans for expired leases, default 5s.
    pub lease_reaper_poll_ms: u64,
    /// `max_wait` passed to `LeaseNext` on each slot's dequeue attempt.
    pub lease_next_wait_ms: u64,
    /// Grace period honored on shutdown before in-flight handlers are canceled.
    pub shutdown_grace_secs: u64,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 8,
            lease_seconds: 900,
            backoff_base_secs: 1.0,
            backoff_cap_secs: 60.0,
            lease_reaper_poll_ms: 5_000,
            lease_next_wait_ms: 2_000,
            shutdown_grace_secs: 900,
        }
    }
}
