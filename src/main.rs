use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use pppoe_billing::config::Config;
use pppoe_billing::db::{AppState, create_pool, init_db};
use pppoe_billing::device::SshChannel;
use pppoe_billing::jobs;
use pppoe_billing::messaging::MessageChannel;

#[derive(Parser)]
#[command(name = "pppoe-billing", version, about = "PPPoE subscription billing and router reconciliation")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP and WebSocket server (default)
    Serve,
    /// Send renewal reminders to subscribers expiring soon
    SendReminders {
        #[arg(long, default_value = "sms")]
        channel: MessageChannel,
    },
    /// Disable expired subscribers on their routers
    Expire {
        #[arg(long)]
        router_id: Option<i64>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pppoe_billing=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();

    let pool = create_pool(&config.database_path, config.db_pool_size)
        .with_context(|| format!("Failed to open database at {}", config.database_path))?;
    {
        let conn = pool.get().context("Failed to get database connection")?;
        init_db(&conn).context("Failed to initialize database schema")?;
    }

    let devices = Arc::new(SshChannel::new(config.device_timeout));
    let state = AppState::new(&config, pool, devices);

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(&config, state).await,
        Command::SendReminders { channel } => {
            let report = jobs::send_reminders(&state, channel).await?;
            tracing::info!(
                channel = channel.as_ref(),
                total = report.total,
                successful = report.successful,
                failed = report.failed,
                "Reminders sent"
            );
            Ok(())
        }
        Command::Expire { router_id } => {
            let now = Utc::now().timestamp();
            let reports = match router_id {
                Some(id) => vec![jobs::expire_router(&state, id, now).await?],
                None => jobs::expire_all(&state, now).await?,
            };
            for report in &reports {
                for failure in &report.failed {
                    tracing::warn!(
                        router_id = report.router_id,
                        subscriber_id = failure.subscriber_id,
                        error = %failure.error,
                        "Subscriber left active, will retry next run"
                    );
                }
            }
            Ok(())
        }
    }
}

async fn serve(config: &Config, state: AppState) -> anyhow::Result<()> {
    let app = pppoe_billing::app(state);

    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    tracing::info!("Shutting down");
}
