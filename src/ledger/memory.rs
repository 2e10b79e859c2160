//! In-memory delivery ledger using DashMap.
//!
//! DashMap's entry API holds the shard lock for the duration of a claim,
//! which gives the per-key atomicity the orchestrator relies on.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use super::{
    ClaimDecision, DeliveryKey, DeliveryLedger, DeliveryRecord, DeliveryStatus, LedgerStats,
};

pub struct MemoryDeliveryLedger {
    records: DashMap<DeliveryKey, DeliveryRecord>,
}

impl MemoryDeliveryLedger {
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
        }
    }
}

impl Default for MemoryDeliveryLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DeliveryLedger for MemoryDeliveryLedger {
    async fn claim(
        &self,
        key: &DeliveryKey,
        now: DateTime<Utc>,
        lease: Duration,
    ) -> ClaimDecision {
        let mut entry = self
            .records
            .entry(key.clone())
            .or_insert_with(|| DeliveryRecord::new(key.clone(), now));

        match entry.status {
            DeliveryStatus::Sent => ClaimDecision::AlreadySent,
            DeliveryStatus::Exhausted => ClaimDecision::Exhausted,
            DeliveryStatus::Pending | DeliveryStatus::Failed => {
                if let Some(until) = entry.next_retry_at {
                    if until > now {
                        return ClaimDecision::NotYetDue { until };
                    }
                }

                entry.attempts += 1;
                entry.last_attempt_at = Some(now);
                // Lease: concurrent claimers see the key as not yet due
                // until the outcome is recorded.
                entry.next_retry_at = Some(now + lease);
                entry.status = DeliveryStatus::Pending;

                ClaimDecision::Claimed {
                    attempt: entry.attempts,
                }
            }
        }
    }

    async fn release(&self, key: &DeliveryKey) {
        if let Some(mut record) = self.records.get_mut(key) {
            if record.status == DeliveryStatus::Pending {
                record.attempts = record.attempts.saturating_sub(1);
                record.next_retry_at = None;
            }
        }
    }

    async fn mark_sent(&self, key: &DeliveryKey, now: DateTime<Utc>) {
        if let Some(mut record) = self.records.get_mut(key) {
            record.status = DeliveryStatus::Sent;
            record.last_attempt_at = Some(now);
            record.next_retry_at = None;
            record.failure_reason = None;
        }
    }

    async fn mark_retry(
        &self,
        key: &DeliveryKey,
        now: DateTime<Utc>,
        next_retry_at: DateTime<Utc>,
        reason: &str,
    ) {
        if let Some(mut record) = self.records.get_mut(key) {
            record.status = DeliveryStatus::Pending;
            record.last_attempt_at = Some(now);
            record.next_retry_at = Some(next_retry_at);
            record.failure_reason = Some(reason.to_string());
        }
    }

    async fn mark_exhausted(&self, key: &DeliveryKey, now: DateTime<Utc>, reason: &str) {
        if let Some(mut record) = self.records.get_mut(key) {
            record.status = DeliveryStatus::Exhausted;
            record.last_attempt_at = Some(now);
            record.next_retry_at = None;
            record.failure_reason = Some(reason.to_string());
        }
    }

    async fn get(&self, key: &DeliveryKey) -> Option<DeliveryRecord> {
        self.records.get(key).map(|r| r.clone())
    }

    async fn records_for_event(&self, event_id: Uuid) -> Vec<DeliveryRecord> {
        self.records
            .iter()
            .filter(|r| r.key.event_id == event_id)
            .map(|r| r.clone())
            .collect()
    }

    async fn pending_retries(&self, now: DateTime<Utc>) -> Vec<DeliveryKey> {
        self.records
            .iter()
            .filter(|r| {
                r.status == DeliveryStatus::Pending
                    && r.next_retry_at.map(|t| t <= now).unwrap_or(false)
            })
            .map(|r| r.key.clone())
            .collect()
    }

    async fn stats(&self) -> LedgerStats {
        let mut stats = LedgerStats {
            total_records: self.records.len(),
            ..Default::default()
        };
        for record in self.records.iter() {
            match record.status {
                DeliveryStatus::Sent => stats.sent += 1,
                DeliveryStatus::Pending => stats.pending += 1,
                DeliveryStatus::Exhausted => stats.exhausted += 1,
                DeliveryStatus::Failed => stats.failed += 1,
            }
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::ChannelKey;
    use crate::window::ReminderWindow;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 15, 7, 0, 0).unwrap()
    }

    fn key() -> DeliveryKey {
        DeliveryKey::new(
            Uuid::new_v4(),
            "user-1",
            ReminderWindow::H2,
            ChannelKey::Email,
        )
    }

    fn lease() -> Duration {
        Duration::minutes(2)
    }

    #[tokio::test]
    async fn test_first_claim_creates_record() {
        let ledger = MemoryDeliveryLedger::new();
        let k = key();

        let decision = ledger.claim(&k, now(), lease()).await;
        assert_eq!(decision, ClaimDecision::Claimed { attempt: 1 });

        let record = ledger.get(&k).await.unwrap();
        assert_eq!(record.status, DeliveryStatus::Pending);
        assert_eq!(record.attempts, 1);
    }

    #[tokio::test]
    async fn test_sent_key_is_never_reclaimed() {
        let ledger = MemoryDeliveryLedger::new();
        let k = key();

        ledger.claim(&k, now(), lease()).await;
        ledger.mark_sent(&k, now()).await;

        let decision = ledger.claim(&k, now() + Duration::hours(1), lease()).await;
        assert_eq!(decision, ClaimDecision::AlreadySent);

        let record = ledger.get(&k).await.unwrap();
        assert_eq!(record.attempts, 1);
    }

    #[tokio::test]
    async fn test_claim_lease_blocks_concurrent_claim() {
        let ledger = MemoryDeliveryLedger::new();
        let k = key();

        ledger.claim(&k, now(), lease()).await;

        // Same key, one second later, outcome not yet recorded
        let decision = ledger.claim(&k, now() + Duration::seconds(1), lease()).await;
        assert!(matches!(decision, ClaimDecision::NotYetDue { .. }));
    }

    #[tokio::test]
    async fn test_retry_due_after_backoff_elapses() {
        let ledger = MemoryDeliveryLedger::new();
        let k = key();

        ledger.claim(&k, now(), lease()).await;
        ledger
            .mark_retry(&k, now(), now() + Duration::seconds(60), "timeout")
            .await;

        // Too early
        let decision = ledger.claim(&k, now() + Duration::seconds(30), lease()).await;
        assert!(matches!(decision, ClaimDecision::NotYetDue { .. }));

        // Backoff elapsed
        let decision = ledger.claim(&k, now() + Duration::seconds(61), lease()).await;
        assert_eq!(decision, ClaimDecision::Claimed { attempt: 2 });
    }

    #[tokio::test]
    async fn test_release_makes_key_claimable_again() {
        let ledger = MemoryDeliveryLedger::new();
        let k = key();

        ledger.claim(&k, now(), lease()).await;
        ledger.release(&k).await;

        let record = ledger.get(&k).await.unwrap();
        assert_eq!(record.attempts, 0);

        let decision = ledger.claim(&k, now() + Duration::seconds(1), lease()).await;
        assert_eq!(decision, ClaimDecision::Claimed { attempt: 1 });
    }

    #[tokio::test]
    async fn test_exhausted_key_is_skipped() {
        let ledger = MemoryDeliveryLedger::new();
        let k = key();

        ledger.claim(&k, now(), lease()).await;
        ledger.mark_exhausted(&k, now(), "endpoint gone").await;

        let decision = ledger.claim(&k, now() + Duration::hours(1), lease()).await;
        assert_eq!(decision, ClaimDecision::Exhausted);

        let record = ledger.get(&k).await.unwrap();
        assert_eq!(record.failure_reason.as_deref(), Some("endpoint gone"));
    }

    #[tokio::test]
    async fn test_pending_retries_lists_due_keys() {
        let ledger = MemoryDeliveryLedger::new();
        let k1 = key();
        let k2 = key();

        ledger.claim(&k1, now(), lease()).await;
        ledger
            .mark_retry(&k1, now(), now() + Duration::seconds(30), "5xx")
            .await;
        ledger.claim(&k2, now(), lease()).await;
        ledger
            .mark_retry(&k2, now(), now() + Duration::hours(1), "5xx")
            .await;

        let due = ledger.pending_retries(now() + Duration::minutes(1)).await;
        assert_eq!(due, vec![k1]);
    }

    #[tokio::test]
    async fn test_stats_counts_by_status() {
        let ledger = MemoryDeliveryLedger::new();
        let k1 = key();
        let k2 = key();
        let k3 = key();

        ledger.claim(&k1, now(), lease()).await;
        ledger.mark_sent(&k1, now()).await;
        ledger.claim(&k2, now(), lease()).await;
        ledger.mark_exhausted(&k2, now(), "gone").await;
        ledger.claim(&k3, now(), lease()).await;

        let stats = ledger.stats().await;
        assert_eq!(stats.total_records, 3);
        assert_eq!(stats.sent, 1);
        assert_eq!(stats.exhausted, 1);
        assert_eq!(stats.pending, 1);
    }
}
