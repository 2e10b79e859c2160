//! External read-side entities and the event source seam.
//!
//! Events, registrations, and users are owned by the surrounding system of
//! record; this engine only reads them through [`EventSource`].

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;

/// An event with a scheduled start time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub title: String,
    pub starts_at: DateTime<Utc>,
    pub timezone: Tz,
}

/// Registration status. Only confirmed registrations receive reminders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RegistrationStatus {
    Pending,
    Confirmed,
    Cancelled,
}

/// A user's registration on an event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Registration {
    pub id: Uuid,
    pub event_id: Uuid,
    pub user_id: String,
    pub status: RegistrationStatus,
}

/// Read API over the external event store.
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Events starting within `within` from `now`.
    async fn list_upcoming_events(&self, now: DateTime<Utc>, within: Duration)
        -> Result<Vec<Event>>;

    /// Confirmed registrations for an event.
    async fn list_confirmed_registrations(&self, event_id: Uuid) -> Result<Vec<Registration>>;
}

/// In-memory event source for tests and local wiring.
pub struct MemoryEventSource {
    events: DashMap<Uuid, Event>,
    registrations: DashMap<Uuid, Vec<Registration>>,
}

impl MemoryEventSource {
    pub fn new() -> Self {
        Self {
            events: DashMap::new(),
            registrations: DashMap::new(),
        }
    }

    pub fn add_event(&self, event: Event) {
        self.events.insert(event.id, event);
    }

    pub fn add_registration(&self, registration: Registration) {
        self.registrations
            .entry(registration.event_id)
            .or_default()
            .push(registration);
    }
}

impl Default for MemoryEventSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventSource for MemoryEventSource {
    async fn list_upcoming_events(
        &self,
        now: DateTime<Utc>,
        within: Duration,
    ) -> Result<Vec<Event>> {
        let horizon = now + within;
        Ok(self
            .events
            .iter()
            .filter(|e| e.starts_at >= now - Duration::hours(1) && e.starts_at <= horizon)
            .map(|e| e.clone())
            .collect())
    }

    async fn list_confirmed_registrations(&self, event_id: Uuid) -> Result<Vec<Registration>> {
        let regs = self
            .registrations
            .get(&event_id)
            .map(|r| {
                r.iter()
                    .filter(|reg| reg.status == RegistrationStatus::Confirmed)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        Ok(regs)
    }
}

impl Event {
    pub fn new(title: impl Into<String>, starts_at: DateTime<Utc>, timezone: Tz) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            starts_at,
            timezone,
        }
    }
}

impl Registration {
    pub fn confirmed(event_id: Uuid, user_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_id,
            user_id: user_id.into(),
            status: RegistrationStatus::Confirmed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tokio_test::assert_ok;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 15, 7, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_upcoming_events_respects_horizon() {
        let source = MemoryEventSource::new();
        let soon = Event::new("soon", now() + Duration::hours(2), chrono_tz::UTC);
        let far = Event::new("far", now() + Duration::hours(48), chrono_tz::UTC);
        source.add_event(soon.clone());
        source.add_event(far);

        let events = tokio_test::assert_ok!(
            source.list_upcoming_events(now(), Duration::hours(25)).await
        );
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].id, soon.id);
    }

    #[tokio::test]
    async fn test_only_confirmed_registrations_returned() {
        let source = MemoryEventSource::new();
        let event = Event::new("event", now() + Duration::hours(2), chrono_tz::UTC);
        let event_id = event.id;
        source.add_event(event);

        source.add_registration(Registration::confirmed(event_id, "user-1"));
        source.add_registration(Registration {
            id: Uuid::new_v4(),
            event_id,
            user_id: "user-2".to_string(),
            status: RegistrationStatus::Cancelled,
        });

        let regs = source.list_confirmed_registrations(event_id).await.unwrap();
        assert_eq!(regs.len(), 1);
        assert_eq!(regs[0].user_id, "user-1");
    }
}
