use tracing::{info, warn};

use crate::scheduler::{DueEvent, ReminderOffset};

pub const APP_NAME: &str = "Prayer Time";

const REMINDER_TIMEOUT_MS: u32 = 15_000;
const ALARM_TIMEOUT_MS: u32 = 30_000;

/// Delivery boundary for reminders. Implementations are best-effort and
/// must never surface failures to the tick loop.
pub trait Notifier {
    fn notify(&mut self, title: &str, body: &str, timeout_ms: u32);
}

#[derive(Debug)]
enum Backend {
    Desktop,
    LogOnly,
}

/// notify-rust backed notifier. After the first delivery failure (no
/// notification service, broken session bus) it downgrades itself to
/// logging for the rest of the run.
#[derive(Debug)]
pub struct DesktopNotifier {
    backend: Backend,
}

impl DesktopNotifier {
    pub fn new() -> Self {
        Self {
            backend: Backend::Desktop,
        }
    }
}

impl Default for DesktopNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Notifier for DesktopNotifier {
    fn notify(&mut self, title: &str, body: &str, timeout_ms: u32) {
        match self.backend {
            Backend::Desktop => {
                let result = notify_rust::Notification::new()
                    .appname(APP_NAME)
                    .summary(title)
                    .body(body)
                    .timeout(notify_rust::Timeout::Milliseconds(timeout_ms))
                    .show();
                if let Err(err) = result {
                    warn!(%err, "desktop notification failed, downgrading to log-only");
                    self.backend = Backend::LogOnly;
                    info!(title, body, "notification");
                }
            }
            Backend::LogOnly => {
                info!(title, body, "notification");
            }
        }
    }
}

/// Notifier that only logs; used in tests and headless sessions.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&mut self, title: &str, body: &str, _timeout_ms: u32) {
        info!(title, body, "notification");
    }
}

/// Renders a due event as (title, body, timeout).
pub fn due_event_message(event: &DueEvent) -> (String, String, u32) {
    let name = event.observance.display_name();
    match event.offset {
        ReminderOffset::AtTime => (
            format!("🕌 {name} — Time to Pray!"),
            format!("It is now time for {name} prayer. Allahu Akbar!"),
            ALARM_TIMEOUT_MS,
        ),
        offset => {
            let minutes = offset.minutes();
            (
                format!("🕌 {name} — {minutes} minutes"),
                format!("{name} prayer starts in {minutes} minutes. Prepare for prayer."),
                REMINDER_TIMEOUT_MS,
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::Prayer;
    use crate::scheduler::Observance;
    use chrono::{NaiveDate, NaiveTime};

    fn event(offset: ReminderOffset) -> DueEvent {
        DueEvent {
            observance: Observance::Prayer(Prayer::Dhuhr),
            offset,
            at: NaiveDate::from_ymd_opt(2025, 3, 1)
                .unwrap()
                .and_time(NaiveTime::from_hms_opt(12, 0, 0).unwrap()),
        }
    }

    #[test]
    fn reminder_message_names_the_lead_time() {
        let (title, body, timeout) = due_event_message(&event(ReminderOffset::FiveMinutes));
        assert!(title.contains("5 minutes"));
        assert!(body.contains("starts in 5 minutes"));
        assert_eq!(timeout, REMINDER_TIMEOUT_MS);
    }

    #[test]
    fn alarm_message_marks_prayer_time() {
        let (title, body, timeout) = due_event_message(&event(ReminderOffset::AtTime));
        assert!(title.contains("Time to Pray"));
        assert!(body.contains("now time for"));
        assert_eq!(timeout, ALARM_TIMEOUT_MS);
    }
}
