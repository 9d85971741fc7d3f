use crate::backoff;
use crate::config::DispatcherConfig;
use crate::registry::HandlerRegistry;
use chrono::Utc;
use orc_core::{HandlerContext, HandlerOutcome, RunMetrics, RunStatus, TaskView};
use orc_queue::{Broker, QueueItem};
use orc_store::Store;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// The dispatcher owns one slot pool against a shared `Store`/`Broker`. Multiple `WORKER_REPLICAS`
/// processes each run their own `Dispatcher` against the same Durable Store.
pub struct Dispatcher {
    store: Store,
    broker: Arc<Broker>,
    breakers: Arc<orc_breaker::Registry>,
    budget: Arc<orc_budget::Accountant>,
    handlers: Arc<HandlerRegistry>,
    config: DispatcherConfig,
}

impl Dispatcher {
    pub fn new(
        store: Store,
        broker: Arc<Broker>,
        breakers: Arc<orc_breaker::Registry>,
        budget: Arc<orc_budget::Accountant>,
        handlers: Arc<HandlerRegistry>,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            store,
            broker,
            breakers,
            budget,
            handlers,
            config,
        }
    }

    /// Runs `max_concurrency` slots until `shutdown_rx` fires, then waits up to
    /// `shutdown_grace_secs` for in-flight handlers before returning.
    pub async fn run(self: Arc<Self>, shutdown_rx: watch::Receiver<bool>) -> anyhow::Result<()> {
        let mut slots = Vec::with_capacity(self.config.max_concurrency);
        for slot_id in 0..self.config.max_concurrency {
            let this = Arc::clone(&self);
            let rx = shutdown_rx.clone();
            slots.push(tokio::spawn(async move { this.slot_loop(slot_id, rx).await }));
        }
        for slot in slots {
            if let Err(err) = slot.await {
                tracing::warn!(error = %err, "dispatcher slot panicked");
            }
        }
        Ok(())
    }

    async fn slot_loop(&self, slot_id: usize, mut shutdown_rx: watch::Receiver<bool>) {
        let consumer_id = format!("slot-{slot_id}");
        loop {
            if *shutdown_rx.borrow() {
                return;
            }

            let wait = Duration::from_millis(self.config.lease_next_wait_ms);
            let lease = tokio::select! {
                lease = self.broker.lease_next(&consumer_id, wait) => lease,
                _ = shutdown_rx.changed() => None,
            };

            let Some(lease) = lease else {
                continue;
            };

            if let Err(err) = self.process_once(lease).await {
                tracing::warn!(
                    task_id = %lease.task_id,
                    error = %err,
                    "dispatcher slot error processing task"
                );
            }
        }
    }

    async fn process_once(&self, lease: orc_queue::Lease) -> anyhow::Result<()> {
        let task_id = lease.task_id;
        let task = orc_store::tasks::get(self.store.pool(), task_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("leased task {task_id} missing from store"))?;

        let attempt = task.retry_count + 1;
        let started_at = Utc::now();
        let lease_deadline = started_at + chrono::Duration::seconds(self.config.lease_seconds);

        let run_id = {
            let mut tx = self.store.pool().begin().await?;
            orc_store::tasks::mark_running(&mut tx, task_id, started_at, lease_deadline).await?;
            let run_id = orc_store::runs::start(&mut tx, task_id, attempt, started_at).await?;
            tx.commit().await?;
            run_id
        };

        let cancel = CancellationToken::new();
        let heartbeat_handle = self.spawn_heartbeat(lease, cancel.clone());

        let view = TaskView {
            id: task.id,
            task_type: task.task_type,
            payload: task.payload.clone(),
            attempt,
            trace_id: task.trace_id,
        };
        let ctx = HandlerContext::new(task.trace_id.unwrap_or(task.id), cancel.clone());

        let outcome = match self.handlers.get(task.task_type) {
            Some(handler) => handler.handle(&view, ctx).await,
            None => HandlerOutcome::Terminal {
                error: format!("no handler registered for task type {}", task.task_type),
            },
        };

        cancel.cancel();
        heartbeat_handle.abort();

        self.finalize(
            task_id,
            run_id,
            attempt,
            task.max_retries,
            task.task_type,
            task.priority,
            outcome,
            lease,
        )
        .await
    }

    fn spawn_heartbeat(
        &self,
        lease: orc_queue::Lease,
        cancel: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        let broker = Arc::clone(&self.broker);
        let store = self.store.clone();
        let lease_seconds = self.config.lease_seconds;
        let interval = Duration::from_secs((lease_seconds / 3).max(1) as u64);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {}
                    _ = cancel.cancelled() => return,
                }

                if broker
                    .extend_lease(lease.task_id, lease.token, lease_seconds)
                    .await
                    .is_err()
                {
                    tracing::warn!(task_id = %lease.task_id, "lease lost, cancelling handler");
                    cancel.cancel();
                    return;
                }

                let new_deadline = Utc::now() + chrono::Duration::seconds(lease_seconds);
                if let Err(err) =
                    orc_store::tasks::extend_lease(store.pool(), lease.task_id, new_deadline).await
                {
                    tracing::warn!(task_id = %lease.task_id, error = %err, "failed to persist lease extension");
                }
            }
        })
    }

    #[allow(clippy::too_many_arguments)]
    async fn finalize(
        &self,
        task_id: Uuid,
        run_id: Uuid,
        attempt: i32,
        max_retries: i32,
        task_type: orc_core::TaskType,
        priority: i32,
        outcome: HandlerOutcome,
        lease: orc_queue::Lease,
    ) -> anyhow::Result<()> {
        let now = Utc::now();

        match outcome {
            HandlerOutcome::Success {
                cost_usd,
                tokens,
                model_used,
                dependencies_touched,
                outbox_effects,
            } => {
                let metrics = RunMetrics {
                    model_used,
                    tokens,
                    cost_usd,
                };
                {
                    let mut tx = self.store.pool().begin().await?;
                    orc_store::runs::finish(&mut tx, run_id, now, RunStatus::Success, &metrics, None)
                        .await?;
                    orc_store::tasks::mark_done(&mut tx, task_id, now).await?;
                    for effect in &outbox_effects {
                        orc_store::outbox::enqueue(
                            &mut tx,
                            task_id,
                            &effect.effect_type,
                            &effect.target,
                            &effect.payload,
                            5,
                        )
                        .await?;
                    }
                    tx.commit().await?;
                }

                if let (Some(cost), Some(tok)) = (cost_usd, tokens) {
                    for dep in &dependencies_touched {
                        let _ = self.budget.commit(dep, cost, tok).await;
                    }
                }
                for dep in &dependencies_touched {
                    let _ = self.breakers.record_success(dep).await;
                }

                self.broker.release(task_id, lease.token).await.ok();
            }

            HandlerOutcome::Retryable {
                error,
                dependencies_touched,
            } => {
                for dep in &dependencies_touched {
                    let _ = self.breakers.record_failure(dep).await;
                }
                self.retry_or_dlq(
                    task_id, run_id, attempt, max_retries, task_type, priority, &error, now,
                )
                .await?;
                self.broker.release(task_id, lease.token).await.ok();
            }

            HandlerOutcome::Terminal { error } => {
                let mut tx = self.store.pool().begin().await?;
                orc_store::runs::finish(
                    &mut tx,
                    run_id,
                    now,
                    RunStatus::Failed,
                    &RunMetrics::default(),
                    Some(&error),
                )
                .await?;
                orc_store::tasks::mark_failed(&mut tx, task_id, now, &error).await?;
                tx.commit().await?;
                self.broker.release(task_id, lease.token).await.ok();
            }
        }

        Ok(())
    }

    /// Shared by retryable-failure and lease-loss/timeout paths.
    #[allow(clippy::too_many_arguments)]
    async fn retry_or_dlq(
        &self,
        task_id: Uuid,
        run_id: Uuid,
        attempt: i32,
        max_retries: i32,
        task_type: orc_core::TaskType,
        priority: i32,
        error: &str,
        now: chrono::DateTime<Utc>,
    ) -> anyhow::Result<()> {
        let new_retry_count = attempt;

        if new_retry_count < max_retries {
            let mut rng = rand::thread_rng();
            let delay = backoff::compute_delay(
                new_retry_count - 1,
                self.config.backoff_base_secs,
                self.config.backoff_cap_secs,
                &mut rng,
            );
            let effective_enqueued_at =
                now + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero());

            let mut tx = self.store.pool().begin().await?;
            orc_store::runs::finish(
                &mut tx,
                run_id,
                now,
                RunStatus::Failed,
                &RunMetrics::default(),
                Some(error),
            )
            .await?;
            orc_store::tasks::requeue_for_retry(
                &mut tx,
                task_id,
                new_retry_count,
                effective_enqueued_at,
                error,
            )
            .await?;
            tx.commit().await?;

            self.broker
                .requeue(QueueItem {
                    task_id,
                    task_type,
                    priority,
                    enqueued_at: effective_enqueued_at,
                })
                .await;
        } else {
            tracing::warn!(task_id = %task_id, attempt, "task exhausted retries, routing to dlq");
            let mut tx = self.store.pool().begin().await?;
            orc_store::runs::finish(
                &mut tx,
                run_id,
                now,
                RunStatus::Failed,
                &RunMetrics::default(),
                Some(error),
            )
            .await?;
            orc_store::tasks::mark_failed_exhausted(&mut tx, task_id, new_retry_count, now, error).await?;
            tx.commit().await?;
        }

        Ok(())
    }
}
