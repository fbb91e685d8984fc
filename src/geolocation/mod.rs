//! IP geolocation
//!
//! Local lookups go through the [`GeoLookup`] trait, backed either by the
//! MaxMind GeoLite2-City database or by a static JSON table. The
//! [`remote`] module adds an HTTP provider used as a fallback.

pub mod remote;

pub use remote::HttpGeoLocator;

use maxminddb::{geoip2, Reader};
use serde::Deserialize;
use std::collections::HashMap;
use std::net::IpAddr;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

use crate::config::GeolocationConfig;
use crate::models::{Coordinates, Detected, LocationInfo};

/// Errors that can occur during geolocation lookups
#[derive(Error, Debug)]
pub enum GeoError {
    #[error("Failed to open database: {0}")]
    DatabaseOpen(#[from] maxminddb::MaxMindDBError),

    #[error("IP address not found in database")]
    NotFound,

    #[error("Database file not found: {0}")]
    FileNotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid lookup table: {0}")]
    InvalidTable(String),
}

/// Synchronous, read-only IP to location lookup
pub trait GeoLookup: Send + Sync {
    /// Resolve an IP address, returning `None` on a miss
    fn locate(&self, ip: &IpAddr) -> Option<LocationInfo>;
}

/// GeoIP lookup service using the MaxMind GeoLite2-City database
///
/// # Example
///
/// ```ignore
/// use heimdall::geolocation::{GeoIpService, GeoLookup};
///
/// let service = GeoIpService::new("GeoLite2-City.mmdb")?;
/// if let Some(location) = service.locate(&"8.8.8.8".parse()?) {
///     println!("Location: {}", location.display_location());
/// }
/// ```
pub struct GeoIpService {
    reader: Arc<Reader<Vec<u8>>>,
}

impl GeoIpService {
    /// Open a MaxMind database file
    ///
    /// # Errors
    ///
    /// Returns an error if the database file cannot be opened or is invalid.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self, GeoError> {
        let path = db_path.as_ref();
        if !path.exists() {
            return Err(GeoError::FileNotFound(path.display().to_string()));
        }

        let reader = Reader::open_readfile(path)?;
        Ok(GeoIpService {
            reader: Arc::new(reader),
        })
    }

    /// Look up the full location record for an IP address
    pub fn lookup(&self, ip: &IpAddr) -> Result<LocationInfo, GeoError> {
        let city: geoip2::City = self.reader.lookup(*ip).map_err(|e| match e {
            maxminddb::MaxMindDBError::AddressNotFoundError(_) => GeoError::NotFound,
            other => GeoError::DatabaseOpen(other),
        })?;

        let country = city
            .country
            .as_ref()
            .and_then(|c| c.iso_code.map(String::from));
        let region = city
            .subdivisions
            .as_ref()
            .and_then(|subs| subs.first())
            .and_then(|sub| sub.names.as_ref())
            .and_then(|names| names.get("en").map(|s| s.to_string()));
        let city_name = city
            .city
            .as_ref()
            .and_then(|c| c.names.as_ref())
            .and_then(|names| names.get("en").map(|s| s.to_string()));

        let (timezone, coordinates) = match city.location {
            Some(location) => {
                let coordinates = match (location.latitude, location.longitude) {
                    (Some(latitude), Some(longitude)) => Some(Coordinates {
                        latitude,
                        longitude,
                    }),
                    _ => None,
                };
                (location.time_zone.map(String::from), coordinates)
            }
            None => (None, None),
        };

        Ok(LocationInfo {
            country: country.into(),
            region: region.into(),
            city: city_name.into(),
            timezone: timezone.into(),
            coordinates,
        })
    }
}

impl GeoLookup for GeoIpService {
    fn locate(&self, ip: &IpAddr) -> Option<LocationInfo> {
        match self.lookup(ip) {
            Ok(location) => Some(location),
            Err(GeoError::NotFound) => None,
            Err(e) => {
                log::debug!("GeoIP lookup failed for {}: {}", ip, e);
                None
            }
        }
    }
}

impl Clone for GeoIpService {
    fn clone(&self) -> Self {
        GeoIpService {
            reader: Arc::clone(&self.reader),
        }
    }
}

/// One row of the JSON lookup table
#[derive(Debug, Deserialize)]
struct TableRow {
    ip: IpAddr,
    country: Option<String>,
    region: Option<String>,
    city: Option<String>,
    timezone: Option<String>,
    latitude: Option<f64>,
    longitude: Option<f64>,
}

/// In-memory IP to location table
///
/// Loaded from a JSON array of
/// `{ip, country, region, city, timezone, latitude, longitude}` rows.
#[derive(Debug, Clone, Default)]
pub struct StaticGeoTable {
    entries: HashMap<IpAddr, LocationInfo>,
}

impl StaticGeoTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, GeoError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(GeoError::FileNotFound(path.display().to_string()));
        }
        let contents = std::fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    pub fn from_json(json: &str) -> Result<Self, GeoError> {
        let rows: Vec<TableRow> =
            serde_json::from_str(json).map_err(|e| GeoError::InvalidTable(e.to_string()))?;

        let mut table = Self::new();
        for row in rows {
            let coordinates = match (row.latitude, row.longitude) {
                (Some(latitude), Some(longitude)) => Some(Coordinates {
                    latitude,
                    longitude,
                }),
                _ => None,
            };
            table.insert(
                row.ip,
                LocationInfo {
                    country: text(row.country),
                    region: text(row.region),
                    city: text(row.city),
                    timezone: text(row.timezone),
                    coordinates,
                },
            );
        }
        Ok(table)
    }

    pub fn insert(&mut self, ip: IpAddr, location: LocationInfo) {
        self.entries.insert(ip, location);
    }

    /// Builder-style insert with just country and city
    pub fn with_entry(mut self, ip: IpAddr, country: &str, city: &str) -> Self {
        self.insert(
            ip,
            LocationInfo {
                country: Detected::from_text(country),
                city: Detected::from_text(city),
                ..LocationInfo::unknown()
            },
        );
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl GeoLookup for StaticGeoTable {
    fn locate(&self, ip: &IpAddr) -> Option<LocationInfo> {
        self.entries.get(ip).cloned()
    }
}

/// Open the local lookup named in the configuration
///
/// A MaxMind database takes precedence over a JSON table. Returns `None`
/// when neither is configured.
pub fn open_lookup(config: &GeolocationConfig) -> Result<Option<Arc<dyn GeoLookup>>, GeoError> {
    if let Some(ref path) = config.maxmind_path {
        log::info!("Using MaxMind database {:?}", path);
        return Ok(Some(Arc::new(GeoIpService::new(path)?)));
    }

    if let Some(ref path) = config.table_path {
        let table = StaticGeoTable::from_file(path)?;
        log::info!("Loaded {} geolocation entries from {:?}", table.len(), path);
        return Ok(Some(Arc::new(table)));
    }

    Ok(None)
}

fn text(value: Option<String>) -> Detected<String> {
    value.map(Detected::from_text).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    // MaxMind tests require a GeoLite2-City.mmdb file and are skipped without one.
    fn get_test_service() -> Option<GeoIpService> {
        let paths = [
            "GeoLite2-City.mmdb",
            "../GeoLite2-City.mmdb",
            "assets/GeoLite2-City.mmdb",
        ];

        for path in &paths {
            if let Ok(service) = GeoIpService::new(path) {
                return Some(service);
            }
        }
        None
    }

    #[test]
    fn test_file_not_found() {
        let result = GeoIpService::new("nonexistent.mmdb");
        assert!(matches!(result, Err(GeoError::FileNotFound(_))));
    }

    #[test]
    fn test_private_ip_not_found() {
        if let Some(service) = get_test_service() {
            let private_ip = IpAddr::from_str("192.168.1.1").unwrap();
            assert!(service.locate(&private_ip).is_none());
        }
    }

    #[test]
    fn test_public_ip_lookup() {
        if let Some(service) = get_test_service() {
            let google_dns = IpAddr::from_str("8.8.8.8").unwrap();
            if let Some(location) = service.locate(&google_dns) {
                assert!(location.country.is_known());
            }
        }
    }

    #[test]
    fn test_static_table_from_json() {
        let table = StaticGeoTable::from_json(
            r#"[
                {"ip": "41.202.10.1", "country": "CI", "region": "Lagunes", "city": "Abidjan",
                 "timezone": "Africa/Abidjan", "latitude": 5.36, "longitude": -4.01},
                {"ip": "2001:db8::1", "country": "FR", "city": ""}
            ]"#,
        )
        .unwrap();

        assert_eq!(table.len(), 2);

        let abidjan = table.locate(&IpAddr::from_str("41.202.10.1").unwrap()).unwrap();
        assert_eq!(abidjan.country.as_str(), Some("CI"));
        assert_eq!(abidjan.city.as_str(), Some("Abidjan"));
        assert_eq!(abidjan.timezone.as_str(), Some("Africa/Abidjan"));
        assert!(abidjan.coordinates.is_some());

        let v6 = table.locate(&IpAddr::from_str("2001:db8::1").unwrap()).unwrap();
        assert_eq!(v6.country.as_str(), Some("FR"));
        assert_eq!(v6.city, Detected::Unknown);
        assert!(v6.coordinates.is_none());
    }

    #[test]
    fn test_static_table_miss() {
        let table = StaticGeoTable::new().with_entry("1.1.1.1".parse().unwrap(), "AU", "Sydney");
        assert!(table.locate(&"8.8.8.8".parse().unwrap()).is_none());
    }

    #[test]
    fn test_open_lookup_from_config() {
        let none = open_lookup(&GeolocationConfig::default()).unwrap();
        assert!(none.is_none());

        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(
            &mut file,
            br#"[{"ip": "41.202.10.1", "country": "CI", "city": "Abidjan"}]"#,
        )
        .unwrap();
        let config = GeolocationConfig {
            table_path: Some(file.path().to_path_buf()),
            ..GeolocationConfig::default()
        };
        let lookup = open_lookup(&config).unwrap().unwrap();
        let location = lookup.locate(&IpAddr::from_str("41.202.10.1").unwrap()).unwrap();
        assert_eq!(location.display_location(), "Abidjan, CI");

        let missing = GeolocationConfig {
            maxmind_path: Some("missing.mmdb".into()),
            ..GeolocationConfig::default()
        };
        assert!(matches!(open_lookup(&missing), Err(GeoError::FileNotFound(_))));
    }

    #[test]
    fn test_static_table_invalid_json() {
        let result = StaticGeoTable::from_json("{not json");
        assert!(matches!(result, Err(GeoError::InvalidTable(_))));
    }
}
