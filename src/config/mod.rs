mod settings;

pub use settings::{ReminderConfig, SchedulerConfig, Settings};
