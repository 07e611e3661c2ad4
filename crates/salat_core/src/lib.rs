pub mod location;
pub mod notify;
pub mod prayer_api;
pub mod provider;
pub mod schedule;
pub mod scheduler;

pub use crate::provider::ProviderError;
pub use crate::schedule::{Prayer, PrayerSchedule, ScheduleError};
pub use crate::scheduler::{DueEvent, Evaluation, FiredEvents, NextPrayerScheduler, Observance};
