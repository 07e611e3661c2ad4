use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::provider::{blocking_client, ProviderError, HTTP_TIMEOUT};

pub const IP_API_URL: &str = "http://ip-api.com/json/";

/// Best-effort geographic position used to query prayer times.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Location {
    pub city: String,
    pub region: String,
    pub country: String,
    pub lat: f64,
    pub lon: f64,
    pub timezone: String,
}

impl Location {
    /// Hardcoded fallback used whenever detection fails.
    pub fn fallback() -> Self {
        Self {
            city: "Jakarta".to_string(),
            region: "Jakarta".to_string(),
            country: "ID".to_string(),
            lat: -6.2088,
            lon: 106.8456,
            timezone: "Asia/Jakarta".to_string(),
        }
    }

    pub fn label(&self) -> String {
        format!("{}, {}, {}", self.city, self.region, self.country)
    }
}

#[derive(Debug, Deserialize)]
struct IpApiResponse {
    status: String,
    message: Option<String>,
    city: Option<String>,
    #[serde(rename = "regionName")]
    region_name: Option<String>,
    country: Option<String>,
    lat: Option<f64>,
    lon: Option<f64>,
    timezone: Option<String>,
}

/// IP-based geolocation. `detect` upholds the provider contract of never
/// failing: any error degrades to the fallback location.
pub struct IpLocator {
    url: String,
    http: reqwest::blocking::Client,
}

impl IpLocator {
    pub fn new() -> Result<Self, ProviderError> {
        Ok(Self {
            url: IP_API_URL.to_string(),
            http: blocking_client(HTTP_TIMEOUT)?,
        })
    }

    pub fn detect(&self) -> Location {
        match self.try_detect() {
            Ok(location) => {
                debug!(city = %location.city, "location detected from IP");
                location
            }
            Err(err) => {
                warn!(%err, "ip geolocation failed, using fallback location");
                Location::fallback()
            }
        }
    }

    fn try_detect(&self) -> Result<Location, ProviderError> {
        let body = self
            .http
            .get(&self.url)
            .query(&[(
                "fields",
                "city,regionName,country,lat,lon,timezone,status,message",
            )])
            .send()?
            .error_for_status()?
            .text()?;
        parse_ip_response(&body)
    }
}

/// Turns an ip-api.com payload into a [`Location`], filling any gaps from
/// the fallback.
pub fn parse_ip_response(body: &str) -> Result<Location, ProviderError> {
    let response: IpApiResponse =
        serde_json::from_str(body).map_err(|err| ProviderError::Malformed(err.to_string()))?;
    if response.status != "success" {
        return Err(ProviderError::Rejected(
            response.message.unwrap_or_else(|| response.status),
        ));
    }
    let fallback = Location::fallback();
    Ok(Location {
        city: response.city.unwrap_or(fallback.city),
        region: response.region_name.unwrap_or(fallback.region),
        country: response.country.unwrap_or(fallback.country),
        lat: response.lat.unwrap_or(fallback.lat),
        lon: response.lon.unwrap_or(fallback.lon),
        timezone: response.timezone.unwrap_or(fallback.timezone),
    })
}

/// Persistence for a manually pinned location. A saved file takes
/// precedence over IP detection until cleared.
#[derive(Debug, Clone)]
pub struct LocationStore {
    path: PathBuf,
}

impl LocationStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// `~/.config/salat-widget/location.json` (platform equivalent).
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "salat-widget")
            .map(|dirs| dirs.config_dir().join("location.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A missing or unreadable file simply means "no manual location".
    pub fn load(&self) -> Option<Location> {
        let raw = fs::read_to_string(&self.path).ok()?;
        match serde_json::from_str(&raw) {
            Ok(location) => Some(location),
            Err(err) => {
                warn!(path = %self.path.display(), %err, "ignoring unreadable manual location");
                None
            }
        }
    }

    pub fn save(&self, location: &Location) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let payload = serde_json::to_string_pretty(location)?;
        fs::write(&self.path, payload)
            .with_context(|| format!("writing {}", self.path.display()))?;
        Ok(())
    }

    pub fn clear(&self) -> Result<()> {
        if self.path.is_file() {
            fs::remove_file(&self.path)
                .with_context(|| format!("removing {}", self.path.display()))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_successful_ip_response() {
        let body = r#"{
            "status": "success",
            "city": "Bandung",
            "regionName": "West Java",
            "country": "Indonesia",
            "lat": -6.9175,
            "lon": 107.6191,
            "timezone": "Asia/Jakarta"
        }"#;
        let location = parse_ip_response(body).expect("parse");
        assert_eq!(location.city, "Bandung");
        assert_eq!(location.label(), "Bandung, West Java, Indonesia");
        assert!((location.lat + 6.9175).abs() < f64::EPSILON);
    }

    #[test]
    fn rejected_lookup_carries_service_message() {
        let body = r#"{"status": "fail", "message": "private range"}"#;
        let err = parse_ip_response(body).unwrap_err();
        assert!(matches!(err, ProviderError::Rejected(msg) if msg == "private range"));
    }

    #[test]
    fn partial_success_fills_gaps_from_fallback() {
        let body = r#"{"status": "success", "city": "Medan"}"#;
        let location = parse_ip_response(body).expect("parse");
        assert_eq!(location.city, "Medan");
        assert_eq!(location.timezone, "Asia/Jakarta");
        assert!((location.lat - Location::fallback().lat).abs() < f64::EPSILON);
    }

    #[test]
    fn garbage_body_is_malformed() {
        assert!(matches!(
            parse_ip_response("not json"),
            Err(ProviderError::Malformed(_))
        ));
    }
}
