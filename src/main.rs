use std::sync::Arc;

use anyhow::Result;
use tokio::signal;
use tokio::sync::broadcast;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use reminder_engine::backoff::RetryPolicy;
use reminder_engine::channel::Channel;
use reminder_engine::config::Settings;
use reminder_engine::ledger::MemoryDeliveryLedger;
use reminder_engine::model::MemoryEventSource;
use reminder_engine::orchestrator::{EngineWiring, ReminderOrchestrator};
use reminder_engine::preference::MemoryPreferenceStore;
use reminder_engine::ratelimit::ChannelRateLimiter;
use reminder_engine::render::DefaultRenderer;
use reminder_engine::scheduler::SchedulerTask;
use reminder_engine::sender::{LoggingSender, SenderRegistry};
use reminder_engine::subscription::SubscriptionRegistry;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    init_tracing();

    // Load configuration
    let settings = Settings::new()?;
    tracing::info!("Configuration loaded");

    SchedulerTask::validate_tolerance(&settings.scheduler, &settings.reminder);

    // In-memory backends and logging transports; real deployments wire in
    // their own EventSource, stores, and channel senders here.
    let logging_sender = Arc::new(LoggingSender);
    let senders = SenderRegistry::new()
        .with_sender(Channel::Push, logging_sender.clone())
        .with_sender(Channel::Email, logging_sender.clone())
        .with_sender(Channel::Sms, logging_sender.clone())
        .with_sender(Channel::WhatsApp, logging_sender);

    let wiring = EngineWiring {
        source: Arc::new(MemoryEventSource::new()),
        preferences: Arc::new(MemoryPreferenceStore::new()),
        subscriptions: Arc::new(SubscriptionRegistry::new()),
        ledger: Arc::new(MemoryDeliveryLedger::new()),
        rate_limiter: Arc::new(ChannelRateLimiter::new(settings.rate_limit.clone())),
        renderer: Arc::new(DefaultRenderer),
        senders: Arc::new(senders),
    };

    let orchestrator = Arc::new(ReminderOrchestrator::new(
        settings.reminder.clone(),
        RetryPolicy::new(settings.backoff.clone()),
        wiring,
    ));
    tracing::info!("Reminder engine initialized");

    // Start the scheduler in the background
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let scheduler = SchedulerTask::new(settings.scheduler.clone(), orchestrator.clone(), shutdown_rx);
    let scheduler_handle = tokio::spawn(async move {
        scheduler.run().await;
    });

    // Wait for shutdown signal
    wait_for_shutdown().await;
    tracing::info!("Shutdown signal received");
    let _ = shutdown_tx.send(());

    // Wait for background tasks to finish
    let _ = scheduler_handle.await;

    let stats = orchestrator.stats();
    tracing::info!(
        runs = stats.runs_completed,
        sent = stats.total_sent,
        "Engine shutdown complete"
    );
    Ok(())
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn wait_for_shutdown() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
