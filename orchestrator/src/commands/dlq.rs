use crate::config::AppConfig;
use clap::Subcommand;
use orc_core::TaskType;
use orc_queue::{Broker, BrokerConfig};
use orc_store::Store;
use std::sync::Arc;

#[derive(Subcommand, Debug)]
pub enum DlqCommand {
    /// List dead-lettered tasks (status=failed, retry_count >= max_retries).
    List {
        #[arg(long)]
        task_type: Option<TaskType>,
        #[arg(long, default_value_t = 100)]
        limit: i64,
    },
    /// Reset retry_count to 0 and re-enqueue every matching dead-lettered task.
    Drain {
        #[arg(long)]
        task_type: Option<TaskType>,
        #[arg(long, default_value_t = 100)]
        limit: i64,
    },
}

pub async fn run(cfg: &AppConfig, command: DlqCommand) -> anyhow::Result<()> {
    let store = Store::connect(&cfg.database_url, 5).await?;

    match command {
        DlqCommand::List { task_type, limit } => {
            let tasks = orc_store::tasks::list_dlq(store.pool(), task_type, limit).await?;
            for task in &tasks {
                println!(
                    "{}\t{}\tretries={}/{}\tlast_error={}",
                    task.id,
                    task.task_type,
                    task.retry_count,
                    task.max_retries,
                    task.last_error.as_deref().unwrap_or("")
                );
            }
            tracing::info!(count = tasks.len(), "dlq listed");
        }
        DlqCommand::Drain { task_type, limit } => {
            let broker = Arc::new(Broker::new(BrokerConfig {
                lease_seconds: cfg.task_lease_seconds,
            }));
            let tasks = orc_store::tasks::list_dlq(store.pool(), task_type, limit).await?;
            for task in &tasks {
                orc_dispatcher::dlq::requeue(&store, &broker, task.id).await?;
                tracing::info!(task_id = %task.id, "requeued from dlq");
            }
            tracing::info!(count = tasks.len(), "dlq drained");
        }
    }

    Ok(())
}
