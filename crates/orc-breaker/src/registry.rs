use crate::config::BreakerConfig;
use crate::window::Window;
use chrono::Utc;
use orc_core::CircuitStateKind;
use orc_store::Store;
use std::collections::{HashMap, HashSet};
use tokio::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Allowed,
    Rejected,
}

struct Local {
    windows: HashMap<String, Window>,
    /// Services with a half_open probe currently outstanding — only one call is admitted per
    /// service while open, allowing exactly one probe call.
    probing: HashSet<String>,
}

/// Circuit Breaker Registry. Cheap to clone (wraps an `orc_store::Store` and an `Arc`-free
/// `Mutex` state shared via the one instance constructed at startup).
pub struct Registry {
    store: Store,
    config: BreakerConfig,
    local: Mutex<Local>,
}

impl Registry {
    pub fn new(store: Store, config: BreakerConfig) -> Self {
        Self {
            store,
            config,
            local: Mutex::new(Local {
                windows: HashMap::new(),
                probing: HashSet::new(),
            }),
        }
    }

    /// Admission check used by the Admission Controller. Performs the
    /// open→half_open timeout transition inline when due.
    pub async fn allow(&self, service: &str) -> anyhow::Result<Admission> {
        let pool = self.store.pool();
        let mut tx = pool.begin().await?;
        let state = orc_store::circuit::lock(&mut tx, service).await?;
        let now = Utc::now();

        match state.state {
            CircuitStateKind::Closed => {
                tx.commit().await?;
                Ok(Admission::Allowed)
            }
            CircuitStateKind::HalfOpen => {
                tx.commit().await?;
                let mut local = self.local.lock().await;
                if local.probing.insert(service.to_string()) {
                    Ok(Admission::Allowed)
                } else {
                    Ok(Admission::Rejected)
                }
            }
            CircuitStateKind::Open => {
                let due = state.next_retry_at.is_some_and(|t| now >= t);
                if due {
                    orc_store::circuit::transition(&mut tx, service, CircuitStateKind::HalfOpen)
                        .await?;
                    tx.commit().await?;
                    tracing::info!(service, "circuit half_open, admitting probe");
                    let mut local = self.local.lock().await;
                    local.probing.insert(service.to_string());
                    Ok(Admission::Allowed)
                } else {
                    tx.commit().await?;
                    Ok(Admission::Rejected)
                }
            }
        }
    }

    /// Records a successful call. In `closed`, feeds the rolling window. In `half_open`, the
    /// probe succeeded: close the breaker and reset counters.
    pub async fn record_success(&self, service: &str) -> anyhow::Result<()> {
        let pool = self.store.pool();
        let mut tx = pool.begin().await?;
        let state = orc_store::circuit::lock(&mut tx, service).await?;
        let now = Utc::now();

        let error_rate = {
            let mut local = self.local.lock().await;
            let window = local
                .windows
                .entry(service.to_string())
                .or_insert_with(|| Window::new(self.config.window_size));

            match state.state {
                CircuitStateKind::HalfOpen => {
                    window.clear();
                    local.probing.remove(service);
                    0.0
                }
                _ => {
                    window.push(true);
                    window.failure_rate()
                }
            }
        };

        let new_state = match state.state {
            CircuitStateKind::HalfOpen => CircuitStateKind::Closed,
            other => other,
        };

        orc_store::circuit::record_success(&mut tx, service, now, new_state, error_rate).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Records a failed call. In `closed`, may trip the breaker open once the window clears
    /// `min_samples` and `failure_threshold`. In `half_open`, the probe failed: reopen with a
    /// doubled timeout, capped at `max_timeout_secs`.
    pub async fn record_failure(&self, service: &str) -> anyhow::Result<()> {
        let pool = self.store.pool();
        let mut tx = pool.begin().await?;
        let state = orc_store::circuit::lock(&mut tx, service).await?;
        let now = Utc::now();

        let (new_state, error_rate, opened_at, next_retry_at) = {
            let mut local = self.local.lock().await;
            let window = local
                .windows
                .entry(service.to_string())
                .or_insert_with(|| Window::new(self.config.window_size));

            match state.state {
                CircuitStateKind::HalfOpen => {
                    local.probing.remove(service);
                    window.clear();
                    let prior_timeout = state
                        .opened_at
                        .zip(state.next_retry_at)
                        .map(|(opened, retry)| (retry - opened).num_seconds())
                        .unwrap_or(self.config.open_timeout_secs);
                    let next_timeout = (prior_timeout * 2).min(self.config.max_timeout_secs);
                    (
                        CircuitStateKind::Open,
                        0.0,
                        Some(now),
                        Some(now + chrono::Duration::seconds(next_timeout)),
                    )
                }
                CircuitStateKind::Closed => {
                    window.push(false);
                    let rate = window.failure_rate();
                    if window.len() >= self.config.min_samples
                        && rate > self.config.failure_threshold
                    {
                        (
                            CircuitStateKind::Open,
                            rate,
                            Some(now),
                            Some(now + chrono::Duration::seconds(self.config.open_timeout_secs)),
                        )
                    } else {
                        (CircuitStateKind::Closed, rate, None, None)
                    }
                }
                CircuitStateKind::Open => (CircuitStateKind::Open, state.error_rate, None, None),
            }
        };

        orc_store::circuit::record_failure(
            &mut tx,
            service,
            now,
            new_state,
            error_rate,
            opened_at,
            next_retry_at,
        )
        .await?;
        tx.commit().await?;

        if new_state == CircuitStateKind::Open {
            tracing::warn!(service, error_rate, "circuit tripped open");
        }
        Ok(())
    }

    pub async fn state(&self, service: &str) -> anyhow::Result<orc_core::CircuitState> {
        orc_store::circuit::get(self.store.pool(), service).await
    }
}
