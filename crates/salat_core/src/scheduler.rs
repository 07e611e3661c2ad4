use std::collections::HashSet;
use std::fmt;

use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::schedule::{Prayer, PrayerSchedule};

/// Conventional Imsak lead over Fajr, in minutes.
pub const IMSAK_LEAD_MINUTES: i64 = 10;

/// Fixed lead times at which reminder notifications fire.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ReminderOffset {
    TenMinutes,
    FiveMinutes,
    AtTime,
}

impl ReminderOffset {
    pub const ALL: [ReminderOffset; 3] = [
        ReminderOffset::TenMinutes,
        ReminderOffset::FiveMinutes,
        ReminderOffset::AtTime,
    ];

    pub fn minutes(&self) -> i64 {
        match self {
            ReminderOffset::TenMinutes => 10,
            ReminderOffset::FiveMinutes => 5,
            ReminderOffset::AtTime => 0,
        }
    }

    pub fn lead(&self) -> Duration {
        Duration::minutes(self.minutes())
    }
}

/// A notifiable entry of the day: a prayer proper, or one of the Ramadan
/// pseudo events aliased to Fajr and Maghrib.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Observance {
    Prayer(Prayer),
    Imsak,
    Iftar,
}

impl Observance {
    pub fn display_name(&self) -> &'static str {
        match self {
            Observance::Prayer(prayer) => prayer.display_name(),
            Observance::Imsak => "Imsak",
            Observance::Iftar => "Iftar",
        }
    }
}

impl fmt::Display for Observance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Observance::Prayer(prayer) => fmt::Display::fmt(prayer, f),
            Observance::Imsak => f.write_str("Imsak"),
            Observance::Iftar => f.write_str("Iftar"),
        }
    }
}

/// Reminder and alarm events already delivered for the current schedule.
/// Owned by the host and cleared whenever the schedule is replaced.
#[derive(Debug, Default, Clone)]
pub struct FiredEvents {
    fired: HashSet<(Observance, ReminderOffset)>,
}

impl FiredEvents {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, observance: Observance, offset: ReminderOffset) -> bool {
        self.fired.contains(&(observance, offset))
    }

    pub fn clear(&mut self) {
        self.fired.clear();
    }

    pub fn len(&self) -> usize {
        self.fired.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fired.is_empty()
    }

    /// Returns true when the pair was not yet fired, recording it.
    fn mark(&mut self, observance: Observance, offset: ReminderOffset) -> bool {
        self.fired.insert((observance, offset))
    }
}

/// A reminder that became due in this evaluation, at most once per
/// (observance, offset) pair per schedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DueEvent {
    pub observance: Observance,
    pub offset: ReminderOffset,
    /// Timestamp of the observance itself (not of the reminder).
    pub at: NaiveDateTime,
}

impl DueEvent {
    pub fn due_at(&self) -> NaiveDateTime {
        self.at - self.offset.lead()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    /// Earliest schedule entry strictly after `now`; `None` once the day
    /// is over.
    pub next_prayer: Option<(Prayer, NaiveDateTime)>,
    /// Time left until `next_prayer`, always non-negative.
    pub remaining: Option<Duration>,
    /// Newly due reminders, in chronological firing order.
    pub due_events: Vec<DueEvent>,
    /// The schedule no longer covers `now`; the host must fetch the next
    /// day before the following evaluation.
    pub stale: bool,
}

/// Classifies schedule state against a current instant. Performs no I/O and
/// never blocks; dispatching the due events is the host's job.
#[derive(Debug, Clone)]
pub struct NextPrayerScheduler {
    tolerance: Duration,
    ramadan: bool,
}

impl NextPrayerScheduler {
    /// `tolerance` is the width of each due window and should equal the
    /// host tick interval.
    pub fn new(tolerance: Duration) -> Self {
        Self {
            tolerance,
            ramadan: false,
        }
    }

    /// Enables the Imsak/Iftar pseudo events.
    pub fn with_ramadan(mut self, ramadan: bool) -> Self {
        self.ramadan = ramadan;
        self
    }

    pub fn evaluate(
        &self,
        schedule: &PrayerSchedule,
        now: NaiveDateTime,
        fired: &mut FiredEvents,
    ) -> Evaluation {
        let next_prayer = schedule.entries().find(|(_, at)| *at > now);
        let remaining = next_prayer.map(|(_, at)| at - now);

        let mut due_events = Vec::new();
        for (observance, at) in self.observances(schedule) {
            for offset in ReminderOffset::ALL {
                let due_at = at - offset.lead();
                if due_at <= now
                    && now < due_at + self.tolerance
                    && fired.mark(observance, offset)
                {
                    due_events.push(DueEvent {
                        observance,
                        offset,
                        at,
                    });
                }
            }
        }
        due_events.sort_by_key(DueEvent::due_at);

        // Past Isha (or on a different calendar day) the schedule cannot
        // answer "what comes next"; the host must roll over.
        let stale = next_prayer.is_none() || now.date() != schedule.day();

        Evaluation {
            next_prayer,
            remaining,
            due_events,
            stale,
        }
    }

    /// Notifiable entries in chronological order. Sunrise is skipped; in
    /// Ramadan mode Imsak precedes Fajr and Iftar shares Maghrib's instant.
    fn observances(&self, schedule: &PrayerSchedule) -> Vec<(Observance, NaiveDateTime)> {
        let mut out = Vec::with_capacity(8);
        if self.ramadan {
            out.push((
                Observance::Imsak,
                schedule.time_of(Prayer::Fajr) - Duration::minutes(IMSAK_LEAD_MINUTES),
            ));
        }
        for (prayer, at) in schedule.entries() {
            if prayer.is_reminded() {
                out.push((Observance::Prayer(prayer), at));
            }
            if self.ramadan && prayer == Prayer::Maghrib {
                out.push((Observance::Iftar, at));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveTime};

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 1).unwrap()
    }

    fn schedule() -> PrayerSchedule {
        PrayerSchedule::new(
            day(),
            &[
                (Prayer::Fajr, t(4, 45)),
                (Prayer::Sunrise, t(6, 2)),
                (Prayer::Dhuhr, t(12, 0)),
                (Prayer::Asr, t(15, 20)),
                (Prayer::Maghrib, t(18, 10)),
                (Prayer::Isha, t(19, 25)),
            ],
        )
        .unwrap()
    }

    fn scheduler() -> NextPrayerScheduler {
        NextPrayerScheduler::new(Duration::seconds(1))
    }

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        day().and_time(NaiveTime::from_hms_opt(h, m, s).unwrap())
    }

    #[test]
    fn before_first_prayer_next_is_fajr() {
        let mut fired = FiredEvents::new();
        let eval = scheduler().evaluate(&schedule(), at(3, 0, 0), &mut fired);
        assert_eq!(eval.next_prayer, Some((Prayer::Fajr, at(4, 45, 0))));
        assert_eq!(eval.remaining, Some(Duration::minutes(105)));
        assert!(eval.due_events.is_empty());
        assert!(!eval.stale);
    }

    #[test]
    fn five_minutes_before_maghrib() {
        let mut fired = FiredEvents::new();
        let eval = scheduler().evaluate(&schedule(), at(18, 5, 0), &mut fired);
        assert_eq!(eval.next_prayer, Some((Prayer::Maghrib, at(18, 10, 0))));
        assert_eq!(eval.remaining, Some(Duration::minutes(5)));
        assert_eq!(
            eval.due_events,
            vec![DueEvent {
                observance: Observance::Prayer(Prayer::Maghrib),
                offset: ReminderOffset::FiveMinutes,
                at: at(18, 10, 0),
            }]
        );
    }

    #[test]
    fn evaluation_is_idempotent_at_same_instant() {
        let mut fired = FiredEvents::new();
        let scheduler = scheduler();
        let first = scheduler.evaluate(&schedule(), at(11, 50, 0), &mut fired);
        assert_eq!(first.due_events.len(), 1);
        let second = scheduler.evaluate(&schedule(), at(11, 50, 0), &mut fired);
        assert_eq!(second.next_prayer, first.next_prayer);
        assert_eq!(second.remaining, first.remaining);
        assert!(second.due_events.is_empty());
    }

    #[test]
    fn dhuhr_reminders_fire_once_each_in_order() {
        let mut fired = FiredEvents::new();
        let scheduler = scheduler();
        let mut fired_events = Vec::new();
        // One-second ticks across both reminder windows and the alarm.
        for minute_offset in [10i64, 5, 0] {
            let window_start = at(12, 0, 0) - Duration::minutes(minute_offset);
            for tick in 0..3 {
                let now = window_start + Duration::seconds(tick);
                let eval = scheduler.evaluate(&schedule(), now, &mut fired);
                fired_events.extend(eval.due_events);
            }
        }
        let offsets: Vec<ReminderOffset> = fired_events.iter().map(|e| e.offset).collect();
        assert_eq!(
            offsets,
            vec![
                ReminderOffset::TenMinutes,
                ReminderOffset::FiveMinutes,
                ReminderOffset::AtTime
            ]
        );
        assert!(fired_events
            .iter()
            .all(|e| e.observance == Observance::Prayer(Prayer::Dhuhr)));
    }

    #[test]
    fn exact_prayer_time_is_current_not_next() {
        let mut fired = FiredEvents::new();
        let eval = scheduler().evaluate(&schedule(), at(12, 0, 0), &mut fired);
        assert_eq!(eval.next_prayer, Some((Prayer::Asr, at(15, 20, 0))));
        assert_eq!(
            eval.due_events,
            vec![DueEvent {
                observance: Observance::Prayer(Prayer::Dhuhr),
                offset: ReminderOffset::AtTime,
                at: at(12, 0, 0),
            }]
        );
    }

    #[test]
    fn after_last_prayer_reports_stale_without_negative_remaining() {
        let mut fired = FiredEvents::new();
        let eval = scheduler().evaluate(&schedule(), at(22, 0, 0), &mut fired);
        assert!(eval.stale);
        assert_eq!(eval.next_prayer, None);
        assert_eq!(eval.remaining, None);
        assert!(eval.due_events.is_empty());
    }

    #[test]
    fn isha_alarm_fires_even_though_day_is_over() {
        let mut fired = FiredEvents::new();
        let eval = scheduler().evaluate(&schedule(), at(19, 25, 0), &mut fired);
        assert!(eval.stale);
        assert_eq!(
            eval.due_events,
            vec![DueEvent {
                observance: Observance::Prayer(Prayer::Isha),
                offset: ReminderOffset::AtTime,
                at: at(19, 25, 0),
            }]
        );
    }

    #[test]
    fn past_midnight_never_returns_previous_day() {
        let mut fired = FiredEvents::new();
        let next_day = day().succ_opt().unwrap();
        let now = next_day.and_time(t(0, 10));
        let eval = scheduler().evaluate(&schedule(), now, &mut fired);
        assert!(eval.stale);
        assert_eq!(eval.next_prayer, None);
        assert!(eval.due_events.is_empty());
    }

    #[test]
    fn sunrise_is_next_but_never_reminded() {
        let mut fired = FiredEvents::new();
        let scheduler = scheduler();
        let eval = scheduler.evaluate(&schedule(), at(5, 0, 0), &mut fired);
        assert_eq!(eval.next_prayer, Some((Prayer::Sunrise, at(6, 2, 0))));
        // Walk through every second of the sunrise reminder windows.
        let mut due = Vec::new();
        for offset in ReminderOffset::ALL {
            let start = at(6, 2, 0) - offset.lead();
            for tick in 0..2 {
                let eval =
                    scheduler.evaluate(&schedule(), start + Duration::seconds(tick), &mut fired);
                due.extend(eval.due_events);
            }
        }
        assert!(due
            .iter()
            .all(|e| e.observance != Observance::Prayer(Prayer::Sunrise)));
    }

    #[test]
    fn ramadan_adds_imsak_and_iftar() {
        let scheduler = NextPrayerScheduler::new(Duration::seconds(1)).with_ramadan(true);
        let mut fired = FiredEvents::new();

        // Imsak sits ten minutes ahead of Fajr, so its own ten-minute
        // reminder lands at 04:25, clear of any Fajr window.
        let eval = scheduler.evaluate(&schedule(), at(4, 25, 0), &mut fired);
        assert_eq!(
            eval.due_events,
            vec![DueEvent {
                observance: Observance::Imsak,
                offset: ReminderOffset::TenMinutes,
                at: at(4, 35, 0),
            }]
        );

        // Iftar shares Maghrib's instant; Maghrib is listed first.
        let eval = scheduler.evaluate(&schedule(), at(18, 10, 0), &mut fired);
        let observances: Vec<Observance> =
            eval.due_events.iter().map(|e| e.observance).collect();
        assert_eq!(
            observances,
            vec![Observance::Prayer(Prayer::Maghrib), Observance::Iftar]
        );
    }

    #[test]
    fn imsak_alarm_coincides_with_fajr_ten_minute_reminder() {
        let scheduler = NextPrayerScheduler::new(Duration::seconds(1)).with_ramadan(true);
        let mut fired = FiredEvents::new();
        let eval = scheduler.evaluate(&schedule(), at(4, 35, 0), &mut fired);
        // 04:35 is both Imsak's alarm and Fajr's ten-minute mark; Imsak's
        // earlier schedule position wins the tie, Fajr follows.
        assert_eq!(eval.due_events.len(), 2);
        assert_eq!(eval.due_events[0].observance, Observance::Imsak);
        assert_eq!(
            eval.due_events[1],
            DueEvent {
                observance: Observance::Prayer(Prayer::Fajr),
                offset: ReminderOffset::TenMinutes,
                at: at(4, 45, 0),
            }
        );
    }

    #[test]
    fn ramadan_off_keeps_pseudo_events_out() {
        let mut fired = FiredEvents::new();
        let eval = scheduler().evaluate(&schedule(), at(4, 35, 0), &mut fired);
        // Only Fajr's ten-minute reminder, no Imsak.
        assert_eq!(eval.due_events.len(), 1);
        assert_eq!(
            eval.due_events[0].observance,
            Observance::Prayer(Prayer::Fajr)
        );
    }

    #[test]
    fn clearing_fired_events_allows_new_day_to_fire() {
        let mut fired = FiredEvents::new();
        let scheduler = scheduler();
        let eval = scheduler.evaluate(&schedule(), at(11, 55, 0), &mut fired);
        assert_eq!(eval.due_events.len(), 1);
        assert_eq!(fired.len(), 1);

        fired.clear();
        assert!(fired.is_empty());
        let eval = scheduler.evaluate(&schedule(), at(11, 55, 0), &mut fired);
        assert_eq!(eval.due_events.len(), 1);
    }

    #[test]
    fn wider_tolerance_widens_due_window() {
        let scheduler = NextPrayerScheduler::new(Duration::seconds(30));
        let mut fired = FiredEvents::new();
        let eval = scheduler.evaluate(&schedule(), at(11, 50, 20), &mut fired);
        assert_eq!(eval.due_events.len(), 1);
        assert_eq!(eval.due_events[0].offset, ReminderOffset::TenMinutes);

        // Outside the window nothing fires.
        let mut fired = FiredEvents::new();
        let eval = scheduler.evaluate(&schedule(), at(11, 50, 30), &mut fired);
        assert!(eval.due_events.is_empty());
    }
}
