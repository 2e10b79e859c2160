//! Rate limiting configuration

use serde::Deserialize;

use crate::channel::Channel;

/// Per-channel hourly send caps.
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    /// Whether rate limiting is enabled
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Maximum push sends in a rolling hour
    #[serde(default = "default_push_per_hour")]
    pub push_per_hour: u32,
    /// Maximum email sends in a rolling hour
    #[serde(default = "default_email_per_hour")]
    pub email_per_hour: u32,
    /// Maximum SMS sends in a rolling hour
    #[serde(default = "default_sms_per_hour")]
    pub sms_per_hour: u32,
    /// Maximum WhatsApp sends in a rolling hour
    #[serde(default = "default_whatsapp_per_hour")]
    pub whatsapp_per_hour: u32,
    /// Time after which unused minute buckets are removed (seconds)
    #[serde(default = "default_bucket_ttl")]
    pub bucket_ttl_seconds: u64,
}

fn default_enabled() -> bool {
    true
}

fn default_push_per_hour() -> u32 {
    3000
}

fn default_email_per_hour() -> u32 {
    1000
}

fn default_sms_per_hour() -> u32 {
    500
}

fn default_whatsapp_per_hour() -> u32 {
    500
}

fn default_bucket_ttl() -> u64 {
    7200 // keep two hours of buckets around
}

impl RateLimitConfig {
    pub fn cap(&self, channel: Channel) -> u32 {
        match channel {
            Channel::Push => self.push_per_hour,
            Channel::Email => self.email_per_hour,
            Channel::Sms => self.sms_per_hour,
            Channel::WhatsApp => self.whatsapp_per_hour,
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            push_per_hour: default_push_per_hour(),
            email_per_hour: default_email_per_hour(),
            sms_per_hour: default_sms_per_hour(),
            whatsapp_per_hour: default_whatsapp_per_hour(),
            bucket_ttl_seconds: default_bucket_ttl(),
        }
    }
}
