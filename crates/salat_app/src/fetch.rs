use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use chrono::NaiveDate;
use parking_lot::Mutex;
use tracing::{info, warn};

use salat_core::location::{IpLocator, Location, LocationStore};
use salat_core::prayer_api::{AladhanClient, PrayerDay};

/// Result of one background refresh. The location is reported even when the
/// schedule fetch failed so the host can keep displaying it.
#[derive(Debug)]
pub enum FetchOutcome {
    Ready { location: Location, day: PrayerDay },
    Failed { location: Location, error: String },
}

/// Handle to an in-flight refresh thread. The tick loop polls it; the
/// worker never blocks the UI.
pub struct FetchJob {
    slot: Arc<Mutex<Option<FetchOutcome>>>,
    started: Instant,
}

impl FetchJob {
    pub fn poll(&self) -> Option<FetchOutcome> {
        self.slot.lock().take()
    }

    pub fn age(&self) -> Duration {
        self.started.elapsed()
    }
}

/// Spawns one refresh: manual location if pinned, otherwise IP detection
/// (with hardcoded fallback), then the prayer-time fetch for `date`.
pub fn spawn(method: u32, date: NaiveDate, store: LocationStore) -> FetchJob {
    let slot = Arc::new(Mutex::new(None));
    let worker_slot = Arc::clone(&slot);
    thread::spawn(move || {
        let outcome = run_refresh(method, date, &store);
        *worker_slot.lock() = Some(outcome);
    });
    FetchJob {
        slot,
        started: Instant::now(),
    }
}

fn run_refresh(method: u32, date: NaiveDate, store: &LocationStore) -> FetchOutcome {
    let location = resolve_location(store);

    let client = match AladhanClient::new(method) {
        Ok(client) => client,
        Err(err) => {
            return FetchOutcome::Failed {
                location,
                error: err.to_string(),
            }
        }
    };
    match client.fetch_day(date, &location) {
        Ok(day) => {
            info!(%date, city = %location.city, "prayer times fetched");
            FetchOutcome::Ready { location, day }
        }
        Err(err) => {
            warn!(%err, %date, "prayer time fetch failed");
            FetchOutcome::Failed {
                location,
                error: err.to_string(),
            }
        }
    }
}

fn resolve_location(store: &LocationStore) -> Location {
    if let Some(manual) = store.load() {
        info!(city = %manual.city, "using manually pinned location");
        return manual;
    }
    match IpLocator::new() {
        Ok(locator) => locator.detect(),
        Err(err) => {
            warn!(%err, "could not build ip locator, using fallback location");
            Location::fallback()
        }
    }
}
