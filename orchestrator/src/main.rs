use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod config;
mod stub_handler;
mod wiring;

use commands::dlq::DlqCommand;

#[derive(Parser, Debug)]
#[command(name = "orchestrator")]
#[command(about = "Task orchestration engine: gateway, worker, outbox relay, and DLQ tooling", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run Durable Store migrations.
    Migrate,
    /// Run the HTTP gateway (admission, tasks, webhooks, streaming, admin, metrics, health).
    Serve,
    /// Run the dispatcher/worker pool and lease reaper.
    Worker,
    /// Run the outbox relay (drain + purge loops).
    OutboxRelay,
    /// Inspect or drain the dead-letter queue.
    Dlq {
        #[command(subcommand)]
        command: DlqCommand,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let cfg = config::AppConfig::from_env().context("load orchestrator config")?;

    match cli.command {
        Command::Migrate => commands::migrate::run(&cfg).await,
        Command::Serve => commands::serve::run(&cfg).await,
        Command::Worker => commands::worker::run(&cfg).await,
        Command::OutboxRelay => commands::outbox_relay::run(&cfg).await,
        Command::Dlq { command } => commands::dlq::run(&cfg, command).await,
    }
}
