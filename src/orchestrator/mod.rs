//! Delivery orchestrator: the core reminder loop.
//!
//! A run walks every upcoming event, every confirmed registration, every
//! due window, and every eligible channel; claims each delivery key in the
//! ledger; dispatches through the channel senders with bounded concurrency;
//! and records outcomes, driving retry/backoff for transient failures. All
//! writes to engine-owned state happen here.

mod run_lock;
mod stats;

pub use run_lock::RunLock;
pub use stats::{EngineStats, EngineStatsSnapshot};

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Duration, Utc};
use futures::stream::{FuturesUnordered, StreamExt};
use serde::Serialize;

use crate::backoff::{RetryDecision, RetryPolicy};
use crate::channel::{eligible_channels, Channel, ChannelKey};
use crate::config::ReminderConfig;
use crate::error::{Result, SendError};
use crate::ledger::{ClaimDecision, DeliveryKey, DeliveryLedger};
use crate::metrics::{DispatchMetrics, RunMetrics};
use crate::model::{Event, EventSource};
use crate::preference::{PreferenceStore, PreferenceUpdate};
use crate::ratelimit::ChannelRateLimiter;
use crate::render::MessageRenderer;
use crate::sender::SenderRegistry;
use crate::subscription::{SubscriptionKeys, SubscriptionRegistry};
use crate::window::{due_windows, ReminderWindow};

/// Everything the orchestrator talks to, wired in at construction.
pub struct EngineWiring {
    pub source: Arc<dyn EventSource>,
    pub preferences: Arc<dyn PreferenceStore>,
    pub subscriptions: Arc<SubscriptionRegistry>,
    pub ledger: Arc<dyn DeliveryLedger>,
    pub rate_limiter: Arc<ChannelRateLimiter>,
    pub renderer: Arc<dyn MessageRenderer>,
    pub senders: Arc<SenderRegistry>,
}

/// Result of one orchestrator run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    /// Dispatches that reached a transport call
    pub attempted: usize,
    /// Successful sends
    pub sent: usize,
    /// Transient failures scheduled for retry
    pub failed: usize,
    /// Keys that gave up (max attempts or permanent failure)
    pub exhausted: usize,
    /// Keys refused by the ledger (already sent, exhausted, or not yet due)
    pub skipped: usize,
    /// Sends refused by the hourly channel cap
    pub rate_limited: usize,
    /// The run was a no-op because another run held the lock
    pub lock_skipped: bool,
    /// The wall-clock budget expired before all work completed
    pub deadline_hit: bool,
    pub duration_ms: u64,
}

impl RunReport {
    fn lock_skipped() -> Self {
        Self {
            lock_skipped: true,
            ..Default::default()
        }
    }
}

/// One independent piece of dispatch work inside a run. Units for distinct
/// delivery keys may execute concurrently; the ledger claim lease keeps the
/// same key from ever being dispatched twice.
enum DispatchUnit {
    /// A due (event, registration, window) tuple; fans out across channels.
    Fresh {
        event: Event,
        user_id: String,
        window: ReminderWindow,
    },
    /// A previously failed key whose backoff has elapsed.
    Retry { event: Event, key: DeliveryKey },
}

#[derive(Default)]
struct RunCounters {
    attempted: AtomicUsize,
    sent: AtomicUsize,
    failed: AtomicUsize,
    exhausted: AtomicUsize,
    skipped: AtomicUsize,
    rate_limited: AtomicUsize,
}

pub struct ReminderOrchestrator {
    config: ReminderConfig,
    retry_policy: RetryPolicy,
    wiring: EngineWiring,
    run_lock: RunLock,
    stats: EngineStats,
}

impl ReminderOrchestrator {
    pub fn new(config: ReminderConfig, retry_policy: RetryPolicy, wiring: EngineWiring) -> Self {
        Self {
            config,
            retry_policy,
            wiring,
            run_lock: RunLock::new(),
            stats: EngineStats::default(),
        }
    }

    pub fn stats(&self) -> EngineStatsSnapshot {
        self.stats.snapshot()
    }

    /// Audit access to the delivery ledger for support tooling.
    pub fn ledger(&self) -> &Arc<dyn DeliveryLedger> {
        &self.wiring.ledger
    }

    /// API-layer passthrough: subscribe a device endpoint.
    pub fn register_push_endpoint(&self, user_id: &str, endpoint: &str, keys: SubscriptionKeys) {
        self.wiring.subscriptions.register(user_id, endpoint, keys);
    }

    /// API-layer passthrough: unsubscribe a device endpoint.
    pub fn revoke_push_endpoint(&self, user_id: &str, endpoint: &str) -> bool {
        self.wiring.subscriptions.revoke(user_id, endpoint)
    }

    /// Settings-UI passthrough: apply a single preference change.
    pub async fn update_preference(&self, user_id: &str, update: PreferenceUpdate) {
        self.wiring.preferences.update(user_id, update).await;
    }

    /// Execute one reminder run.
    ///
    /// Returns a no-op report when another run holds the lock. Per-dispatch
    /// failures never abort the run; only the lock and the wall-clock
    /// budget end it early.
    #[tracing::instrument(name = "orchestrator.run", skip(self), fields(now = %now))]
    pub async fn run(&self, now: DateTime<Utc>) -> Result<RunReport> {
        let steal_after = Duration::seconds(self.config.run_budget_secs as i64 * 2);
        let Some(_guard) = self.run_lock.try_acquire(now, steal_after) else {
            RunMetrics::record_skipped();
            tracing::debug!("Run lock held, skipping run");
            return Ok(RunReport::lock_skipped());
        };

        let started = Instant::now();
        let units = self.collect_units(now).await?;
        let unit_count = units.len();

        let counters = Arc::new(RunCounters::default());
        let deadline_hit = self.drain_units(units, now, counters.clone()).await;

        let duration_ms = started.elapsed().as_millis() as u64;
        RunMetrics::record_duration_secs(duration_ms as f64 / 1000.0);
        self.wiring.rate_limiter.prune_stale(now);

        let report = RunReport {
            attempted: counters.attempted.load(Ordering::Relaxed),
            sent: counters.sent.load(Ordering::Relaxed),
            failed: counters.failed.load(Ordering::Relaxed),
            exhausted: counters.exhausted.load(Ordering::Relaxed),
            skipped: counters.skipped.load(Ordering::Relaxed),
            rate_limited: counters.rate_limited.load(Ordering::Relaxed),
            lock_skipped: false,
            deadline_hit,
            duration_ms,
        };

        self.stats.record_run(&report);

        tracing::info!(
            units = unit_count,
            attempted = report.attempted,
            sent = report.sent,
            failed = report.failed,
            exhausted = report.exhausted,
            skipped = report.skipped,
            rate_limited = report.rate_limited,
            deadline_hit = report.deadline_hit,
            duration_ms = report.duration_ms,
            "Reminder run completed"
        );

        Ok(report)
    }

    /// Gather the run's dispatch units: due windows for every confirmed
    /// registration on every upcoming event, plus elapsed retries for keys
    /// the due-window pass would no longer reach.
    async fn collect_units(&self, now: DateTime<Utc>) -> Result<Vec<DispatchUnit>> {
        let tolerance = Duration::minutes(self.config.tolerance_minutes);
        let horizon = ReminderWindow::longest_offset() + tolerance;

        let events = self.wiring.source.list_upcoming_events(now, horizon).await?;
        let mut units = Vec::new();
        let mut fresh = std::collections::HashSet::new();

        for event in &events {
            let due = due_windows(event.starts_at, now, tolerance);
            if due.is_empty() {
                continue;
            }

            let registrations = self
                .wiring
                .source
                .list_confirmed_registrations(event.id)
                .await?;

            for registration in registrations {
                for window in &due {
                    fresh.insert((event.id, registration.user_id.clone(), *window));
                    units.push(DispatchUnit::Fresh {
                        event: event.clone(),
                        user_id: registration.user_id.clone(),
                        window: *window,
                    });
                }
            }
        }

        // Elapsed retries whose window band has already passed would never
        // be revisited by the fresh pass; pick them up here while the event
        // is still within the horizon.
        for key in self.wiring.ledger.pending_retries(now).await {
            if fresh.contains(&(key.event_id, key.user_id.clone(), key.window)) {
                continue;
            }
            if let Some(event) = events.iter().find(|e| e.id == key.event_id) {
                units.push(DispatchUnit::Retry {
                    event: event.clone(),
                    key,
                });
            }
        }

        Ok(units)
    }

    /// Fan units out over a bounded worker pool under the run's wall-clock
    /// budget. Returns true if the budget expired with work remaining;
    /// abandoned dispatches are picked up by later runs.
    async fn drain_units(
        &self,
        units: Vec<DispatchUnit>,
        now: DateTime<Utc>,
        counters: Arc<RunCounters>,
    ) -> bool {
        let budget = std::time::Duration::from_secs(self.config.run_budget_secs);
        let max_concurrent = self.config.max_concurrent_dispatches.max(1);

        let drain = async {
            let mut futures = FuturesUnordered::new();
            let mut pending = 0usize;

            for unit in units {
                let counters = counters.clone();
                futures.push(async move {
                    match unit {
                        DispatchUnit::Fresh {
                            event,
                            user_id,
                            window,
                        } => {
                            self.dispatch_fresh(&event, &user_id, window, now, &counters)
                                .await;
                        }
                        DispatchUnit::Retry { event, key } => {
                            self.dispatch_key(&event, &key, now, &counters).await;
                        }
                    }
                });
                pending += 1;

                while pending >= max_concurrent {
                    if futures.next().await.is_some() {
                        pending -= 1;
                    } else {
                        break;
                    }
                }
            }

            while futures.next().await.is_some() {}
        };

        tokio::time::timeout(budget, drain).await.is_err()
    }

    /// Dispatch one due (event, user, window) tuple across all eligible
    /// channels, fanning push out per device endpoint.
    async fn dispatch_fresh(
        &self,
        event: &Event,
        user_id: &str,
        window: ReminderWindow,
        now: DateTime<Utc>,
        counters: &RunCounters,
    ) {
        let pref = self.wiring.preferences.get(user_id).await;
        if !pref.window_enabled(window) {
            return;
        }

        let channels = eligible_channels(&pref, &self.wiring.rate_limiter, now);
        for channel in channels {
            if !self.wiring.senders.is_configured(channel) {
                // Missing credentials: the channel is disabled for this
                // run without failing the others.
                tracing::warn!(
                    channel = %channel,
                    "No sender configured, channel disabled for this run"
                );
                continue;
            }

            match channel {
                Channel::Push => {
                    for subscription in self.wiring.subscriptions.list_active(user_id) {
                        let key = DeliveryKey::new(
                            event.id,
                            user_id,
                            window,
                            ChannelKey::for_push_endpoint(subscription.endpoint.clone()),
                        );
                        self.dispatch_key(event, &key, now, counters).await;
                    }
                }
                other => {
                    let Some(channel_key) = ChannelKey::direct(other) else {
                        continue;
                    };
                    let key = DeliveryKey::new(event.id, user_id, window, channel_key);
                    self.dispatch_key(event, &key, now, counters).await;
                }
            }
        }
    }

    /// Claim, dispatch, and record the outcome for one delivery key.
    /// The claim-to-outcome sequence is the engine's idempotency core.
    async fn dispatch_key(
        &self,
        event: &Event,
        key: &DeliveryKey,
        now: DateTime<Utc>,
        counters: &RunCounters,
    ) {
        let channel = key.channel_key.channel();
        let Some(sender) = self.wiring.senders.get(channel) else {
            return;
        };

        // Retries re-check eligibility; preferences may have changed since
        // the first attempt.
        let pref = self.wiring.preferences.get(&key.user_id).await;
        if !pref.window_enabled(key.window)
            || !pref.channel_enabled(channel)
            || pref.in_quiet_hours(channel, now)
        {
            return;
        }

        let lease = Duration::seconds(self.config.send_timeout_secs as i64 * 2);
        match self.wiring.ledger.claim(key, now, lease).await {
            ClaimDecision::Claimed { attempt } => {
                // Rate budget is consumed per dispatch attempt, success or
                // failure. A refusal is not a per-key failure: the claim is
                // rolled back and the key retried on the next run.
                if !self.wiring.rate_limiter.try_consume(channel, now) {
                    self.wiring.ledger.release(key).await;
                    counters.rate_limited.fetch_add(1, Ordering::Relaxed);
                    DispatchMetrics::record_rate_limited(channel.as_str());
                    return;
                }

                counters.attempted.fetch_add(1, Ordering::Relaxed);
                DispatchMetrics::record_attempted(channel.as_str());

                let message = self.wiring.renderer.render(key.window, event, &key.user_id);
                let send_timeout = std::time::Duration::from_secs(self.config.send_timeout_secs);

                let outcome = match tokio::time::timeout(
                    send_timeout,
                    sender.send(&key.user_id, &key.channel_key, key.window, &message),
                )
                .await
                {
                    Ok(result) => result,
                    Err(_) => Err(SendError::transient("send timed out")),
                };

                self.record_outcome(key, attempt, outcome, now, counters)
                    .await;
            }
            ClaimDecision::AlreadySent
            | ClaimDecision::Exhausted
            | ClaimDecision::NotYetDue { .. } => {
                counters.skipped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    async fn record_outcome(
        &self,
        key: &DeliveryKey,
        attempt: u32,
        outcome: std::result::Result<(), SendError>,
        now: DateTime<Utc>,
        counters: &RunCounters,
    ) {
        let channel = key.channel_key.channel();

        match outcome {
            Ok(()) => {
                self.wiring.ledger.mark_sent(key, now).await;
                counters.sent.fetch_add(1, Ordering::Relaxed);
                DispatchMetrics::record_sent(channel.as_str());

                tracing::debug!(
                    key = %key,
                    attempt = attempt,
                    "Reminder sent"
                );
            }
            Err(error) if error.is_permanent() => {
                let reason = error.reason();
                self.wiring.ledger.mark_exhausted(key, now, &reason).await;
                counters.exhausted.fetch_add(1, Ordering::Relaxed);
                DispatchMetrics::record_exhausted(channel.as_str());

                // A dead push endpoint is removed; the user's other
                // endpoints are unaffected.
                if let ChannelKey::Push { endpoint } = &key.channel_key {
                    if self.wiring.subscriptions.revoke(&key.user_id, endpoint) {
                        DispatchMetrics::record_endpoint_revoked();
                    }
                }

                tracing::warn!(
                    key = %key,
                    reason = %reason,
                    "Permanent send failure, key exhausted"
                );
            }
            Err(error) => {
                let reason = error.reason();
                match self.retry_policy.next_attempt(attempt, now) {
                    RetryDecision::Pending { next_retry_at } => {
                        self.wiring
                            .ledger
                            .mark_retry(key, now, next_retry_at, &reason)
                            .await;
                        counters.failed.fetch_add(1, Ordering::Relaxed);
                        DispatchMetrics::record_failed(channel.as_str());

                        tracing::debug!(
                            key = %key,
                            attempt = attempt,
                            next_retry_at = %next_retry_at,
                            reason = %reason,
                            "Transient send failure, retry scheduled"
                        );
                    }
                    RetryDecision::Exhausted => {
                        self.wiring.ledger.mark_exhausted(key, now, &reason).await;
                        counters.exhausted.fetch_add(1, Ordering::Relaxed);
                        DispatchMetrics::record_exhausted(channel.as_str());

                        tracing::warn!(
                            key = %key,
                            attempts = attempt,
                            reason = %reason,
                            "Retry budget spent, key exhausted"
                        );
                    }
                }
            }
        }
    }
}
