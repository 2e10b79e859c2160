//! Reminder windows and the due-window evaluator.
//!
//! A reminder window is a named offset before event start at which a
//! notification should be attempted. Due-ness is evaluated against a
//! symmetric tolerance band so that a scheduler polling every few minutes
//! neither misses nor double-counts a window.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// The three reminder windows, ordered farthest-out first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReminderWindow {
    /// 24 hours before event start
    H24,
    /// 2 hours before event start
    H2,
    /// 30 minutes before event start
    M30,
}

impl ReminderWindow {
    pub const ALL: [ReminderWindow; 3] =
        [ReminderWindow::H24, ReminderWindow::H2, ReminderWindow::M30];

    /// Fixed offset before event start at which this window fires.
    pub fn offset(&self) -> Duration {
        match self {
            ReminderWindow::H24 => Duration::hours(24),
            ReminderWindow::H2 => Duration::hours(2),
            ReminderWindow::M30 => Duration::minutes(30),
        }
    }

    /// The longest offset across all windows. Events starting further out
    /// than this (plus tolerance) cannot have any due window.
    pub fn longest_offset() -> Duration {
        Duration::hours(24)
    }

    /// Stable key fragment used in delivery ledger keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            ReminderWindow::H24 => "24h",
            ReminderWindow::H2 => "2h",
            ReminderWindow::M30 => "30min",
        }
    }
}

impl std::fmt::Display for ReminderWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Return the set of windows currently due for an event.
///
/// A window with offset `o` is due iff
/// `event_start - o - tolerance <= now <= event_start - o + tolerance`.
///
/// Pure function, no side effects. Configuration constraint: `tolerance`
/// must exceed half the scheduler poll interval, otherwise a window can
/// fall entirely between two polls and be skipped. The scheduler validates
/// this at startup.
pub fn due_windows(
    event_start: DateTime<Utc>,
    now: DateTime<Utc>,
    tolerance: Duration,
) -> Vec<ReminderWindow> {
    ReminderWindow::ALL
        .iter()
        .copied()
        .filter(|w| {
            let target = event_start - w.offset();
            now >= target - tolerance && now <= target + tolerance
        })
        .collect()
}
