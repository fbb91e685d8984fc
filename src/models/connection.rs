use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::Detected;

/// Structured fields extracted from a User-Agent string
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub browser_name: Detected<String>,
    pub browser_version: Detected<String>,
    pub os_name: Detected<String>,
    pub os_version: Detected<String>,
    /// Form factor such as "mobile" or "tablet"; desktops stay unknown
    pub device_type: Detected<String>,
    pub device_vendor: Detected<String>,
    pub device_model: Detected<String>,
    pub engine_name: Detected<String>,
    pub engine_version: Detected<String>,
}

impl DeviceInfo {
    /// Short label for logs, e.g. "Chrome 120.0 on Windows 10"
    pub fn summary(&self) -> String {
        format!(
            "{} {} on {} {}",
            self.browser_name, self.browser_version, self.os_name, self.os_version
        )
    }
}

/// Latitude/longitude pair
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

/// Resolved geographic location of an IP address
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LocationInfo {
    /// ISO 3166-1 alpha-2 code when the source provides one
    pub country: Detected<String>,
    pub region: Detected<String>,
    pub city: Detected<String>,
    pub timezone: Detected<String>,
    pub coordinates: Option<Coordinates>,
}

impl LocationInfo {
    /// Location with every field unresolved
    pub fn unknown() -> Self {
        Self::default()
    }

    pub fn is_unknown(&self) -> bool {
        !self.country.is_known()
            && !self.region.is_known()
            && !self.city.is_known()
            && !self.timezone.is_known()
            && self.coordinates.is_none()
    }

    /// Human-readable location, e.g. "Abidjan, CI"
    pub fn display_location(&self) -> String {
        match (self.city.as_str(), self.country.as_str()) {
            (Some(city), Some(country)) => format!("{}, {}", city, country),
            (None, Some(country)) => country.to_string(),
            (Some(city), None) => city.to_string(),
            (None, None) => "Unknown".to_string(),
        }
    }
}

/// Everything known about a single incoming connection
///
/// Built per request by the collector, persisted as a login log entry
/// and then discarded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionSnapshot {
    pub user_id: Option<String>,
    pub ip: String,
    pub user_agent: String,
    pub device: DeviceInfo,
    pub location: LocationInfo,
    /// SHA-256 hex digest of the device-identifying headers and the IP
    pub fingerprint: String,
    pub timestamp: DateTime<Utc>,
    /// Request headers with sensitive values redacted
    pub headers: BTreeMap<String, String>,
}
