//! Per-user notification preferences and quiet hours.
//!
//! One preference record per user, shared with the settings UI under
//! last-writer-wins semantics. A user without a stored record gets the
//! defaults: every reminder channel and window enabled, no quiet hours.

use async_trait::async_trait;
use chrono::{DateTime, NaiveTime, Utc};
use chrono_tz::Tz;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::channel::Channel;
use crate::window::ReminderWindow;

/// A user-configured local-time band during which interruptive channels
/// are suppressed. The band may cross midnight (e.g. 22:00-08:00).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuietHours {
    pub start: NaiveTime,
    pub end: NaiveTime,
    pub timezone: Tz,
}

impl QuietHours {
    pub fn new(start: NaiveTime, end: NaiveTime, timezone: Tz) -> Self {
        Self {
            start,
            end,
            timezone,
        }
    }

    /// Whether `now`, converted to the user's local time, falls inside the
    /// quiet band. A zero-length band (start == end) suppresses nothing.
    pub fn contains(&self, now: DateTime<Utc>) -> bool {
        if self.start == self.end {
            return false;
        }

        let local = now.with_timezone(&self.timezone).time();
        if self.start < self.end {
            local >= self.start && local < self.end
        } else {
            // Band wraps midnight
            local >= self.start || local < self.end
        }
    }
}

/// Per-user notification preferences.
///
/// The marketing / event-updates / payment flags are co-located here for the
/// settings UI but are not consulted by the reminder engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationPreference {
    pub email_enabled: bool,
    pub push_enabled: bool,
    pub sms_enabled: bool,
    pub whatsapp_enabled: bool,

    pub remind_24h: bool,
    pub remind_2h: bool,
    pub remind_30min: bool,

    pub quiet_hours: Option<QuietHours>,

    pub marketing: bool,
    pub event_updates: bool,
    pub payment_confirmation: bool,
}

impl Default for NotificationPreference {
    fn default() -> Self {
        Self {
            email_enabled: true,
            push_enabled: true,
            sms_enabled: true,
            whatsapp_enabled: true,
            remind_24h: true,
            remind_2h: true,
            remind_30min: true,
            quiet_hours: None,
            marketing: false,
            event_updates: true,
            payment_confirmation: true,
        }
    }
}

impl NotificationPreference {
    pub fn channel_enabled(&self, channel: Channel) -> bool {
        match channel {
            Channel::Email => self.email_enabled,
            Channel::Push => self.push_enabled,
            Channel::Sms => self.sms_enabled,
            Channel::WhatsApp => self.whatsapp_enabled,
        }
    }

    pub fn window_enabled(&self, window: ReminderWindow) -> bool {
        match window {
            ReminderWindow::H24 => self.remind_24h,
            ReminderWindow::H2 => self.remind_2h,
            ReminderWindow::M30 => self.remind_30min,
        }
    }

    /// Whether `channel` is currently suppressed by quiet hours.
    /// Email never is.
    pub fn in_quiet_hours(&self, channel: Channel, now: DateTime<Utc>) -> bool {
        if !channel.respects_quiet_hours() {
            return false;
        }
        self.quiet_hours
            .as_ref()
            .map(|q| q.contains(now))
            .unwrap_or(false)
    }
}

/// A single-field preference change from the settings UI.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "key", content = "value", rename_all = "snake_case")]
pub enum PreferenceUpdate {
    ChannelOptIn(Channel, bool),
    WindowOptIn(ReminderWindow, bool),
    QuietHours(Option<QuietHours>),
    Marketing(bool),
    EventUpdates(bool),
    PaymentConfirmation(bool),
}

impl PreferenceUpdate {
    pub fn apply(&self, pref: &mut NotificationPreference) {
        match self {
            PreferenceUpdate::ChannelOptIn(channel, enabled) => match channel {
                Channel::Email => pref.email_enabled = *enabled,
                Channel::Push => pref.push_enabled = *enabled,
                Channel::Sms => pref.sms_enabled = *enabled,
                Channel::WhatsApp => pref.whatsapp_enabled = *enabled,
            },
            PreferenceUpdate::WindowOptIn(window, enabled) => match window {
                ReminderWindow::H24 => pref.remind_24h = *enabled,
                ReminderWindow::H2 => pref.remind_2h = *enabled,
                ReminderWindow::M30 => pref.remind_30min = *enabled,
            },
            PreferenceUpdate::QuietHours(quiet) => pref.quiet_hours = quiet.clone(),
            PreferenceUpdate::Marketing(v) => pref.marketing = *v,
            PreferenceUpdate::EventUpdates(v) => pref.event_updates = *v,
            PreferenceUpdate::PaymentConfirmation(v) => pref.payment_confirmation = *v,
        }
    }
}

/// Read/write access to the preference store.
#[async_trait]
pub trait PreferenceStore: Send + Sync {
    /// Fetch a user's preferences, falling back to defaults when no record
    /// exists.
    async fn get(&self, user_id: &str) -> NotificationPreference;

    /// Apply a single-field update (last-writer-wins).
    async fn update(&self, user_id: &str, update: PreferenceUpdate);
}

/// In-memory preference store.
pub struct MemoryPreferenceStore {
    prefs: DashMap<String, NotificationPreference>,
}

impl MemoryPreferenceStore {
    pub fn new() -> Self {
        Self {
            prefs: DashMap::new(),
        }
    }

    /// Seed a full preference record, replacing any existing one.
    pub fn put(&self, user_id: &str, pref: NotificationPreference) {
        self.prefs.insert(user_id.to_string(), pref);
    }
}

impl Default for MemoryPreferenceStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PreferenceStore for MemoryPreferenceStore {
    async fn get(&self, user_id: &str) -> NotificationPreference {
        self.prefs
            .get(user_id)
            .map(|p| p.clone())
            .unwrap_or_default()
    }

    async fn update(&self, user_id: &str, update: PreferenceUpdate) {
        let mut entry = self.prefs.entry(user_id.to_string()).or_default();
        update.apply(&mut entry);

        tracing::debug!(
            user_id = %user_id,
            update = ?update,
            "Applied preference update"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn quiet_22_to_08(tz: Tz) -> QuietHours {
        QuietHours::new(
            NaiveTime::from_hms_opt(22, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
            tz,
        )
    }

    #[test]
    fn test_quiet_hours_wrapping_midnight() {
        let quiet = quiet_22_to_08(chrono_tz::UTC);

        let late = Utc.with_ymd_and_hms(2024, 6, 14, 23, 30, 0).unwrap();
        let early = Utc.with_ymd_and_hms(2024, 6, 15, 7, 59, 0).unwrap();
        let midday = Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap();

        assert!(quiet.contains(late));
        assert!(quiet.contains(early));
        assert!(!quiet.contains(midday));
    }

    #[test]
    fn test_quiet_hours_evaluated_in_user_timezone() {
        // 22:00-08:00 in Tokyo. 14:00 UTC is 23:00 JST -> quiet.
        let quiet = quiet_22_to_08(chrono_tz::Asia::Tokyo);
        let now = Utc.with_ymd_and_hms(2024, 6, 15, 14, 0, 0).unwrap();
        assert!(quiet.contains(now));

        // 04:00 UTC is 13:00 JST -> not quiet.
        let now = Utc.with_ymd_and_hms(2024, 6, 15, 4, 0, 0).unwrap();
        assert!(!quiet.contains(now));
    }

    #[test]
    fn test_zero_length_band_suppresses_nothing() {
        let t = NaiveTime::from_hms_opt(9, 0, 0).unwrap();
        let quiet = QuietHours::new(t, t, chrono_tz::UTC);
        let now = Utc.with_ymd_and_hms(2024, 6, 15, 9, 0, 0).unwrap();
        assert!(!quiet.contains(now));
    }

    #[test]
    fn test_email_exempt_from_quiet_hours() {
        let pref = NotificationPreference {
            quiet_hours: Some(quiet_22_to_08(chrono_tz::UTC)),
            ..Default::default()
        };
        let late = Utc.with_ymd_and_hms(2024, 6, 14, 23, 0, 0).unwrap();

        assert!(pref.in_quiet_hours(Channel::Push, late));
        assert!(pref.in_quiet_hours(Channel::Sms, late));
        assert!(pref.in_quiet_hours(Channel::WhatsApp, late));
        assert!(!pref.in_quiet_hours(Channel::Email, late));
    }

    #[test]
    fn test_defaults_all_on_no_quiet_hours() {
        let pref = NotificationPreference::default();
        for channel in Channel::PRIORITY_ORDER {
            assert!(pref.channel_enabled(channel));
        }
        for window in ReminderWindow::ALL {
            assert!(pref.window_enabled(window));
        }
        assert!(pref.quiet_hours.is_none());
    }

    #[tokio::test]
    async fn test_store_returns_defaults_for_unknown_user() {
        let store = MemoryPreferenceStore::new();
        let pref = store.get("user-1").await;
        assert!(pref.push_enabled);
        assert!(pref.quiet_hours.is_none());
    }

    #[test]
    fn test_update_wire_shape() {
        // Shape shared with the settings UI: {"key": ..., "value": ...}
        let update = PreferenceUpdate::ChannelOptIn(Channel::Sms, false);
        let json = serde_json::to_value(&update).unwrap();
        assert_eq!(json["key"], "channel_opt_in");
        assert_eq!(json["value"][0], "sms");

        let back: PreferenceUpdate = serde_json::from_value(json).unwrap();
        assert!(matches!(
            back,
            PreferenceUpdate::ChannelOptIn(Channel::Sms, false)
        ));
    }

    #[tokio::test]
    async fn test_update_is_field_level() {
        let store = MemoryPreferenceStore::new();
        store
            .update("user-1", PreferenceUpdate::ChannelOptIn(Channel::Sms, false))
            .await;

        let pref = store.get("user-1").await;
        assert!(!pref.sms_enabled);
        // Other fields untouched from defaults
        assert!(pref.push_enabled);
        assert!(pref.remind_24h);
    }
}
