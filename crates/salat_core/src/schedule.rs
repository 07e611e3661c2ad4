use std::fmt;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The six daily entries the Aladhan API reports, in canonical order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Prayer {
    Fajr,
    Sunrise,
    Dhuhr,
    Asr,
    Maghrib,
    Isha,
}

impl Prayer {
    pub const ALL: [Prayer; 6] = [
        Prayer::Fajr,
        Prayer::Sunrise,
        Prayer::Dhuhr,
        Prayer::Asr,
        Prayer::Maghrib,
        Prayer::Isha,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Prayer::Fajr => "Fajr",
            Prayer::Sunrise => "Sunrise",
            Prayer::Dhuhr => "Dhuhr",
            Prayer::Asr => "Asr",
            Prayer::Maghrib => "Maghrib",
            Prayer::Isha => "Isha",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Prayer::Fajr => "Subuh / Fajr",
            Prayer::Sunrise => "Sunrise / Syuruq",
            Prayer::Dhuhr => "Dzuhur / Dhuhr",
            Prayer::Asr => "Ashar / Asr",
            Prayer::Maghrib => "Maghrib",
            Prayer::Isha => "Isya / Isha",
        }
    }

    /// Sunrise marks the end of Fajr but is not itself a prayer, so it
    /// never gets reminder notifications.
    pub fn is_reminded(&self) -> bool {
        !matches!(self, Prayer::Sunrise)
    }
}

impl fmt::Display for Prayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("prayer schedule is empty")]
    Empty,
    #[error("schedule is missing a time for {0}")]
    Missing(Prayer),
    #[error("duplicate entry for {0}")]
    Duplicate(Prayer),
    #[error("{later} does not come after {earlier}")]
    OutOfOrder { earlier: Prayer, later: Prayer },
}

/// Prayer timestamps for one calendar day. Construction validates that all
/// six prayers are present in canonical order with strictly increasing
/// times, so holders never observe a malformed schedule.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PrayerSchedule {
    day: NaiveDate,
    entries: Vec<(Prayer, NaiveDateTime)>,
}

impl PrayerSchedule {
    pub fn new(day: NaiveDate, times: &[(Prayer, NaiveTime)]) -> Result<Self, ScheduleError> {
        if times.is_empty() {
            return Err(ScheduleError::Empty);
        }
        let mut entries: Vec<(Prayer, NaiveDateTime)> = Vec::with_capacity(Prayer::ALL.len());
        for prayer in Prayer::ALL {
            let mut found = None;
            for (candidate, time) in times {
                if *candidate == prayer {
                    if found.is_some() {
                        return Err(ScheduleError::Duplicate(prayer));
                    }
                    found = Some(*time);
                }
            }
            let time = found.ok_or(ScheduleError::Missing(prayer))?;
            entries.push((prayer, day.and_time(time)));
        }
        for pair in entries.windows(2) {
            let (earlier, earlier_at) = pair[0];
            let (later, later_at) = pair[1];
            if later_at <= earlier_at {
                return Err(ScheduleError::OutOfOrder { earlier, later });
            }
        }
        Ok(Self { day, entries })
    }

    pub fn day(&self) -> NaiveDate {
        self.day
    }

    pub fn entries(&self) -> impl Iterator<Item = (Prayer, NaiveDateTime)> + '_ {
        self.entries.iter().copied()
    }

    pub fn time_of(&self, prayer: Prayer) -> NaiveDateTime {
        self.entries
            .iter()
            .find(|(candidate, _)| *candidate == prayer)
            .map(|(_, at)| *at)
            .expect("schedule is validated to contain all prayers")
    }

    pub fn last(&self) -> NaiveDateTime {
        self.time_of(Prayer::Isha)
    }
}
