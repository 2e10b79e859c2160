//! Message rendering seam.
//!
//! Turns a (window, event) pair into the title/body payload handed to the
//! channel senders. Detailed templating and localization live outside this
//! engine; the default renderer covers the built-in reminder copy.

use serde::{Deserialize, Serialize};

use crate::model::Event;
use crate::window::ReminderWindow;

/// Rendered notification payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderedMessage {
    pub title: String,
    pub body: String,
}

/// Renders the payload for one reminder.
pub trait MessageRenderer: Send + Sync {
    fn render(&self, window: ReminderWindow, event: &Event, user_id: &str) -> RenderedMessage;
}

/// Built-in renderer with per-window phrasing. Times are shown in the
/// event's own timezone.
pub struct DefaultRenderer;

impl MessageRenderer for DefaultRenderer {
    fn render(&self, window: ReminderWindow, event: &Event, _user_id: &str) -> RenderedMessage {
        let local_start = event.starts_at.with_timezone(&event.timezone);
        let when = local_start.format("%H:%M on %b %-d");

        let (title, lead) = match window {
            ReminderWindow::H24 => (
                format!("Tomorrow: {}", event.title),
                "starts in 24 hours",
            ),
            ReminderWindow::H2 => (
                format!("Starting soon: {}", event.title),
                "starts in 2 hours",
            ),
            ReminderWindow::M30 => (
                format!("Starting now: {}", event.title),
                "starts in 30 minutes",
            ),
        };

        RenderedMessage {
            title,
            body: format!("{} {} ({}).", event.title, lead, when),
        }
    }
}
