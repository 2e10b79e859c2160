use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;

use crate::backoff::BackoffConfig;
use crate::ratelimit::RateLimitConfig;

/// Top-level engine settings, injected explicitly at construction.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub reminder: ReminderConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub backoff: BackoffConfig,
}

/// Periodic trigger settings.
#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    /// Seconds between scheduler ticks
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
}

fn default_poll_interval() -> u64 {
    120 // 2 minutes
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
        }
    }
}

/// Orchestrator run settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ReminderConfig {
    /// Half-width of the due band around each window target, in minutes.
    /// Must exceed half the scheduler poll interval or windows can be
    /// skipped between ticks.
    #[serde(default = "default_tolerance_minutes")]
    pub tolerance_minutes: i64,
    /// Maximum dispatches in flight at once within a run
    #[serde(default = "default_max_concurrent_dispatches")]
    pub max_concurrent_dispatches: usize,
    /// Per-send timeout in seconds; a timed-out send is a transient failure
    #[serde(default = "default_send_timeout_secs")]
    pub send_timeout_secs: u64,
    /// Overall wall-clock budget for one run, in seconds
    #[serde(default = "default_run_budget_secs")]
    pub run_budget_secs: u64,
}

fn default_tolerance_minutes() -> i64 {
    5
}

fn default_max_concurrent_dispatches() -> usize {
    50
}

fn default_send_timeout_secs() -> u64 {
    10
}

fn default_run_budget_secs() -> u64 {
    240 // 4 minutes
}

impl Default for ReminderConfig {
    fn default() -> Self {
        Self {
            tolerance_minutes: default_tolerance_minutes(),
            max_concurrent_dispatches: default_max_concurrent_dispatches(),
            send_timeout_secs: default_send_timeout_secs(),
            run_budget_secs: default_run_budget_secs(),
        }
    }
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        // Load .env file if exists
        let _ = dotenvy::dotenv();

        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let builder = Config::builder()
            // Start with default values
            .set_default("scheduler.poll_interval_secs", 120)?
            .set_default("reminder.tolerance_minutes", 5)?
            .set_default("reminder.run_budget_secs", 240)?
            .set_default("backoff.max_attempts", 3)?
            // Load config file if exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // Load from environment variables
            // SCHEDULER_POLL_INTERVAL_SECS, RATE_LIMIT_PUSH_PER_HOUR, etc.
            .add_source(
                Environment::default()
                    .separator("_")
                    .try_parsing(true)
                    .list_separator(","),
            );

        builder.build()?.try_deserialize()
    }
}
