//! Periodic trigger driving the orchestrator.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::broadcast;

use crate::config::{ReminderConfig, SchedulerConfig};
use crate::orchestrator::ReminderOrchestrator;

/// Background task that invokes the orchestrator on a fixed interval.
pub struct SchedulerTask {
    config: SchedulerConfig,
    orchestrator: Arc<ReminderOrchestrator>,
    shutdown: broadcast::Receiver<()>,
}

impl SchedulerTask {
    pub fn new(
        config: SchedulerConfig,
        orchestrator: Arc<ReminderOrchestrator>,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            config,
            orchestrator,
            shutdown,
        }
    }

    /// Warn when the configured tolerance band cannot cover the poll
    /// interval: a window target can then fall entirely between two ticks
    /// and the reminder is silently skipped.
    pub fn validate_tolerance(scheduler: &SchedulerConfig, reminder: &ReminderConfig) {
        let tolerance_secs = reminder.tolerance_minutes as u64 * 60;
        if tolerance_secs * 2 <= scheduler.poll_interval_secs {
            tracing::warn!(
                tolerance_minutes = reminder.tolerance_minutes,
                poll_interval_secs = scheduler.poll_interval_secs,
                "Tolerance band does not exceed half the poll interval; reminder windows can be missed"
            );
        }
    }

    /// Run the scheduler loop until shutdown.
    pub async fn run(mut self) {
        let mut timer =
            tokio::time::interval(Duration::from_secs(self.config.poll_interval_secs));
        // Skip immediate first tick
        timer.tick().await;

        tracing::info!(
            poll_interval_secs = self.config.poll_interval_secs,
            "Scheduler task started"
        );

        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    tracing::info!("Scheduler task received shutdown signal");
                    break;
                }
                _ = timer.tick() => {
                    match self.orchestrator.run(Utc::now()).await {
                        Ok(report) if report.lock_skipped => {
                            tracing::debug!("Tick skipped, previous run still active");
                        }
                        Ok(report) => {
                            tracing::debug!(
                                sent = report.sent,
                                failed = report.failed,
                                "Scheduler tick completed"
                            );
                        }
                        Err(e) => {
                            tracing::error!(error = %e, "Reminder run failed");
                        }
                    }
                }
            }
        }

        tracing::info!("Scheduler task stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backoff::RetryPolicy;
    use crate::ledger::MemoryDeliveryLedger;
    use crate::model::MemoryEventSource;
    use crate::orchestrator::EngineWiring;
    use crate::preference::MemoryPreferenceStore;
    use crate::ratelimit::{ChannelRateLimiter, RateLimitConfig};
    use crate::render::DefaultRenderer;
    use crate::sender::SenderRegistry;
    use crate::subscription::SubscriptionRegistry;

    fn test_orchestrator() -> Arc<ReminderOrchestrator> {
        let wiring = EngineWiring {
            source: Arc::new(MemoryEventSource::new()),
            preferences: Arc::new(MemoryPreferenceStore::new()),
            subscriptions: Arc::new(SubscriptionRegistry::new()),
            ledger: Arc::new(MemoryDeliveryLedger::new()),
            rate_limiter: Arc::new(ChannelRateLimiter::new(RateLimitConfig::default())),
            renderer: Arc::new(DefaultRenderer),
            senders: Arc::new(SenderRegistry::new()),
        };
        Arc::new(ReminderOrchestrator::new(
            ReminderConfig::default(),
            RetryPolicy::default(),
            wiring,
        ))
    }

    #[tokio::test]
    async fn test_scheduler_task_shutdown() {
        let config = SchedulerConfig {
            poll_interval_secs: 1,
        };
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let task = SchedulerTask::new(config, test_orchestrator(), shutdown_rx);

        let handle = tokio::spawn(async move {
            task.run().await;
        });

        tokio::time::sleep(Duration::from_millis(100)).await;
        shutdown_tx.send(()).unwrap();

        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("Task should complete")
            .expect("Task should not panic");
    }
}
