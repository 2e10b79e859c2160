//! Per-channel sliding-window rate limiting.
//!
//! Counts sends per (channel, minute bucket) over a trailing window.
//! Consumption is attempted before every dispatch; a channel at its cap is
//! simply ineligible for the current run and is reconsidered on the next
//! scheduler tick, not routed through retry/backoff.

mod config;

pub use config::RateLimitConfig;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;

use crate::channel::Channel;

/// Default trailing window for cap evaluation.
pub const WINDOW_MINUTES: i64 = 60;

/// Sliding-window counter over per-minute buckets, one series per channel.
pub struct ChannelRateLimiter {
    /// (channel, unix minute) -> sends in that minute
    buckets: DashMap<(Channel, i64), u32>,
    config: RateLimitConfig,
}

impl ChannelRateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            buckets: DashMap::new(),
            config,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    fn minute(at: DateTime<Utc>) -> i64 {
        at.timestamp() / 60
    }

    /// Sends for `channel` in the trailing `window_minutes`.
    pub fn count(&self, channel: Channel, window_minutes: i64, now: DateTime<Utc>) -> u32 {
        let current = Self::minute(now);
        let oldest = current - window_minutes + 1;

        (oldest..=current)
            .filter_map(|m| self.buckets.get(&(channel, m)).map(|c| *c))
            .sum()
    }

    /// Whether `channel` has reached its hourly cap.
    pub fn at_cap(&self, channel: Channel, now: DateTime<Utc>) -> bool {
        if !self.config.enabled {
            return false;
        }
        self.count(channel, WINDOW_MINUTES, now) >= self.config.cap(channel)
    }

    /// Consume one send from the channel's budget.
    ///
    /// Returns false without incrementing when the cap is already reached.
    /// Incremented on every dispatch attempt, success or failure.
    pub fn try_consume(&self, channel: Channel, now: DateTime<Utc>) -> bool {
        if !self.config.enabled {
            return true;
        }

        if self.at_cap(channel, now) {
            tracing::debug!(
                channel = %channel,
                cap = self.config.cap(channel),
                "Channel at hourly cap, send budget refused"
            );
            return false;
        }

        *self
            .buckets
            .entry((channel, Self::minute(now)))
            .or_insert(0) += 1;
        true
    }

    /// Drop buckets older than the configured TTL.
    ///
    /// Returns the number of buckets removed.
    pub fn prune_stale(&self, now: DateTime<Utc>) -> usize {
        let oldest_kept = Self::minute(now) - (self.config.bucket_ttl_seconds as i64 / 60);
        let before = self.buckets.len();
        self.buckets.retain(|(_, minute), _| *minute >= oldest_kept);
        let removed = before - self.buckets.len();

        if removed > 0 {
            tracing::debug!(
                removed = removed,
                remaining = self.buckets.len(),
                "Pruned stale rate limit buckets"
            );
        }

        removed
    }

    pub fn stats(&self, now: DateTime<Utc>) -> RateLimiterStats {
        RateLimiterStats {
            enabled: self.config.enabled,
            buckets: self.buckets.len(),
            push_last_hour: self.count(Channel::Push, WINDOW_MINUTES, now),
            email_last_hour: self.count(Channel::Email, WINDOW_MINUTES, now),
            sms_last_hour: self.count(Channel::Sms, WINDOW_MINUTES, now),
            whatsapp_last_hour: self.count(Channel::WhatsApp, WINDOW_MINUTES, now),
        }
    }
}

/// Statistics about the rate limiter
#[derive(Debug, Clone, Serialize)]
pub struct RateLimiterStats {
    pub enabled: bool,
    pub buckets: usize,
    pub push_last_hour: u32,
    pub email_last_hour: u32,
    pub sms_last_hour: u32,
    pub whatsapp_last_hour: u32,
}
