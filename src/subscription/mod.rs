//! Push subscription registry.
//!
//! Tracks push endpoints per user. A user may hold many concurrent
//! subscriptions (one per device); push dispatch fans out to all of them,
//! and a dead endpoint is removed without touching the user's others.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// Web-push crypto material supplied by the client on subscribe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionKeys {
    pub auth: String,
    pub p256dh: String,
}

/// One device endpoint belonging to a user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushSubscription {
    pub user_id: String,
    pub endpoint: String,
    pub keys: SubscriptionKeys,
    pub created_at: DateTime<Utc>,
}

/// In-memory registry keyed by (user, endpoint).
pub struct SubscriptionRegistry {
    subscriptions: DashMap<(String, String), PushSubscription>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self {
            subscriptions: DashMap::new(),
        }
    }

    /// Upsert a subscription by (user, endpoint).
    pub fn register(&self, user_id: &str, endpoint: &str, keys: SubscriptionKeys) {
        let subscription = PushSubscription {
            user_id: user_id.to_string(),
            endpoint: endpoint.to_string(),
            keys,
            created_at: Utc::now(),
        };
        self.subscriptions
            .insert((user_id.to_string(), endpoint.to_string()), subscription);

        tracing::debug!(
            user_id = %user_id,
            endpoint = %endpoint,
            "Push endpoint registered"
        );
    }

    /// Remove a subscription. Idempotent; returns whether it existed.
    pub fn revoke(&self, user_id: &str, endpoint: &str) -> bool {
        let removed = self
            .subscriptions
            .remove(&(user_id.to_string(), endpoint.to_string()))
            .is_some();

        if removed {
            tracing::info!(
                user_id = %user_id,
                endpoint = %endpoint,
                "Push endpoint revoked"
            );
        }
        removed
    }

    /// All active subscriptions for a user.
    pub fn list_active(&self, user_id: &str) -> Vec<PushSubscription> {
        self.subscriptions
            .iter()
            .filter(|entry| entry.key().0 == user_id)
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub fn total(&self) -> usize {
        self.subscriptions.len()
    }
}

impl Default for SubscriptionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
