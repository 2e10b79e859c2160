//! Delivery ledger: idempotency and audit log for send attempts.
//!
//! Every (event, user, window, channel-key) dispatch attempt is recorded
//! here. At most one record per key ever reaches `Sent`; once sent, the
//! orchestrator never dispatches that key again. Records are created lazily
//! on the first attempt and never deleted, so they double as the audit
//! trail for support and analytics tooling.

mod memory;

pub use memory::MemoryDeliveryLedger;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::channel::ChannelKey;
use crate::window::ReminderWindow;

/// Unique identity of one deliverable reminder.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeliveryKey {
    pub event_id: Uuid,
    pub user_id: String,
    pub window: ReminderWindow,
    pub channel_key: ChannelKey,
}

impl DeliveryKey {
    pub fn new(
        event_id: Uuid,
        user_id: impl Into<String>,
        window: ReminderWindow,
        channel_key: ChannelKey,
    ) -> Self {
        Self {
            event_id,
            user_id: user_id.into(),
            window,
            channel_key,
        }
    }
}

impl std::fmt::Display for DeliveryKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}",
            self.event_id, self.user_id, self.window, self.channel_key
        )
    }
}

/// Lifecycle of a delivery record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeliveryStatus {
    /// Awaiting (re-)dispatch
    Pending,
    /// Delivered to the transport; terminal
    Sent,
    /// Last attempt failed, retry decision not yet recorded
    Failed,
    /// No further attempts will be made; terminal
    Exhausted,
}

/// One ledger entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryRecord {
    pub key: DeliveryKey,
    pub status: DeliveryStatus,
    pub attempts: u32,
    pub created_at: DateTime<Utc>,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub failure_reason: Option<String>,
}

impl DeliveryRecord {
    fn new(key: DeliveryKey, now: DateTime<Utc>) -> Self {
        Self {
            key,
            status: DeliveryStatus::Pending,
            attempts: 0,
            created_at: now,
            last_attempt_at: None,
            next_retry_at: None,
            failure_reason: None,
        }
    }
}

/// Outcome of a claim attempt on a key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimDecision {
    /// Key claimed for dispatch; `attempt` is the attempt number now
    /// underway (1-based).
    Claimed { attempt: u32 },
    /// Key already delivered; idempotent no-op.
    AlreadySent,
    /// Key gave up after max attempts or a permanent failure.
    Exhausted,
    /// Pending retry whose backoff has not elapsed, or a claim lease held
    /// by a concurrent dispatch.
    NotYetDue { until: DateTime<Utc> },
}

/// Ledger statistics snapshot.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LedgerStats {
    pub total_records: usize,
    pub sent: usize,
    pub pending: usize,
    pub exhausted: usize,
    pub failed: usize,
}

/// Idempotency and audit backend.
///
/// `claim` is the concurrency guard of the whole engine: the
/// read-then-transition for one key happens atomically, so two runs (or two
/// workers) can never both claim the same key. A successful claim takes a
/// lease (`next_retry_at = now + lease`) that makes the key look not-yet-due
/// to any concurrent claimer until the outcome lands or the lease expires.
#[async_trait]
pub trait DeliveryLedger: Send + Sync {
    /// Atomically decide whether `key` may be dispatched now, creating the
    /// record on first contact.
    async fn claim(&self, key: &DeliveryKey, now: DateTime<Utc>, lease: Duration)
        -> ClaimDecision;

    /// Roll back a claim that never led to a dispatch attempt (e.g. the
    /// channel's rate budget was refused). The attempt is uncounted and the
    /// key becomes immediately claimable again.
    async fn release(&self, key: &DeliveryKey);

    /// Record a successful send. Terminal.
    async fn mark_sent(&self, key: &DeliveryKey, now: DateTime<Utc>);

    /// Record a transient failure with a scheduled retry.
    async fn mark_retry(
        &self,
        key: &DeliveryKey,
        now: DateTime<Utc>,
        next_retry_at: DateTime<Utc>,
        reason: &str,
    );

    /// Record that no further attempts will be made. Terminal.
    async fn mark_exhausted(&self, key: &DeliveryKey, now: DateTime<Utc>, reason: &str);

    /// Audit lookup for a single key.
    async fn get(&self, key: &DeliveryKey) -> Option<DeliveryRecord>;

    /// All records for an event, for support tooling.
    async fn records_for_event(&self, event_id: Uuid) -> Vec<DeliveryRecord>;

    /// Keys whose scheduled retry has elapsed.
    async fn pending_retries(&self, now: DateTime<Utc>) -> Vec<DeliveryKey>;

    async fn stats(&self) -> LedgerStats;
}
