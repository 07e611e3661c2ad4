use std::collections::HashMap;
use std::fmt;

use chrono::{NaiveDate, NaiveTime};
use serde::Deserialize;
use tracing::debug;

use crate::location::Location;
use crate::provider::{blocking_client, ProviderError, HTTP_TIMEOUT};
use crate::schedule::{Prayer, PrayerSchedule};

pub const ALADHAN_BASE: &str = "https://api.aladhan.com/v1";

/// Calculation method id passed to the API. 11 = Egyptian General Authority
/// of Survey; other common values: 2 = ISNA, 3 = MWL, 4 = Mecca,
/// 5 = Karachi, 15 = Dubai, 20 = Turkey.
pub const DEFAULT_METHOD: u32 = 11;

/// Islamic lunar calendar month and day as reported by the API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HijriDate {
    pub day: String,
    pub month: u32,
    pub month_en: String,
    pub month_ar: String,
    pub year: String,
}

impl HijriDate {
    pub fn is_ramadan(&self) -> bool {
        self.month == 9
    }
}

impl fmt::Display for HijriDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {} H", self.day, self.month_en, self.year)
    }
}

/// One fetched calendar day: the validated schedule plus its Hijri date.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrayerDay {
    pub schedule: PrayerSchedule,
    pub hijri: HijriDate,
}

#[derive(Debug, Deserialize)]
struct ApiEnvelope {
    code: u32,
    status: String,
    data: Option<ApiData>,
}

#[derive(Debug, Deserialize)]
struct ApiData {
    timings: HashMap<String, String>,
    date: ApiDate,
}

#[derive(Debug, Deserialize)]
struct ApiDate {
    hijri: ApiHijri,
}

#[derive(Debug, Deserialize)]
struct ApiHijri {
    day: String,
    year: String,
    month: ApiHijriMonth,
}

#[derive(Debug, Deserialize)]
struct ApiHijriMonth {
    number: u32,
    en: String,
    ar: String,
}

/// Blocking Aladhan client. Callers run it off the UI thread; every request
/// carries a hard timeout.
pub struct AladhanClient {
    base: String,
    method: u32,
    http: reqwest::blocking::Client,
}

impl AladhanClient {
    pub fn new(method: u32) -> Result<Self, ProviderError> {
        Ok(Self {
            base: ALADHAN_BASE.to_string(),
            method,
            http: blocking_client(HTTP_TIMEOUT)?,
        })
    }

    /// Fetches the six prayer times and the Hijri date for one day.
    pub fn fetch_day(&self, date: NaiveDate, location: &Location) -> Result<PrayerDay, ProviderError> {
        let url = format!("{}/timings/{}", self.base, date.format("%d-%m-%Y"));
        debug!(%url, lat = location.lat, lon = location.lon, method = self.method, "fetching prayer times");
        let body = self
            .http
            .get(&url)
            .query(&[
                ("latitude", location.lat.to_string()),
                ("longitude", location.lon.to_string()),
                ("method", self.method.to_string()),
            ])
            .send()?
            .error_for_status()?
            .text()?;
        parse_day_response(&body, date)
    }

    /// The Hijri date alone; a thin view over [`fetch_day`].
    ///
    /// [`fetch_day`]: AladhanClient::fetch_day
    pub fn hijri_date(&self, date: NaiveDate, location: &Location) -> Result<HijriDate, ProviderError> {
        Ok(self.fetch_day(date, location)?.hijri)
    }
}

/// Parses a `/timings` response body into a validated [`PrayerDay`].
/// Split from the HTTP call so it can be exercised against canned payloads.
pub fn parse_day_response(body: &str, date: NaiveDate) -> Result<PrayerDay, ProviderError> {
    let envelope: ApiEnvelope =
        serde_json::from_str(body).map_err(|err| ProviderError::Malformed(err.to_string()))?;
    if envelope.code != 200 {
        return Err(ProviderError::Rejected(envelope.status));
    }
    let data = envelope
        .data
        .ok_or_else(|| ProviderError::Malformed("missing data object".into()))?;

    let mut times = Vec::with_capacity(Prayer::ALL.len());
    for prayer in Prayer::ALL {
        let raw = data
            .timings
            .get(prayer.name())
            .ok_or_else(|| ProviderError::Malformed(format!("no timing for {prayer}")))?;
        times.push((prayer, parse_clock(raw)?));
    }
    let schedule = PrayerSchedule::new(date, &times)
        .map_err(|err| ProviderError::Malformed(err.to_string()))?;

    let hijri = HijriDate {
        day: data.date.hijri.day,
        month: data.date.hijri.month.number,
        month_en: data.date.hijri.month.en,
        month_ar: data.date.hijri.month.ar,
        year: data.date.hijri.year,
    };

    Ok(PrayerDay { schedule, hijri })
}

/// The API appends a timezone suffix to some timings ("04:30 (WIB)");
/// only the leading HH:MM is meaningful.
fn parse_clock(raw: &str) -> Result<NaiveTime, ProviderError> {
    let clock = raw.get(..5).unwrap_or(raw);
    NaiveTime::parse_from_str(clock, "%H:%M")
        .map_err(|_| ProviderError::Malformed(format!("bad clock value {raw:?}")))
}
