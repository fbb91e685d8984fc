//! Connection info collection
//!
//! Turns a raw request into a [`ConnectionSnapshot`]: resolved client IP,
//! parsed device info, location, device fingerprint and sanitized headers.
//! Collection never fails; anything that cannot be resolved is recorded
//! as unknown.

pub mod fingerprint;
pub mod headers;
pub mod ip;
pub mod user_agent;

pub use fingerprint::device_fingerprint;
pub use headers::{HeaderSanitizer, REDACTED, SENSITIVE_HEADERS};
pub use ip::{resolve_client_ip, UNKNOWN_IP};
pub use user_agent::UserAgentParser;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::config::CollectorConfig;
use crate::geolocation::{GeoLookup, HttpGeoLocator};
use crate::models::{ConnectionSnapshot, LocationInfo};

/// Framework-independent view of an incoming request
///
/// Header names are stored lowercase.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestInfo {
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Peer address of the socket, with or without a port
    #[serde(default)]
    pub remote_addr: Option<String>,
    /// IP reported by the web framework itself
    #[serde(default)]
    pub ip: Option<String>,
}

impl RequestInfo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.to_string());
        self
    }

    pub fn with_remote_addr(mut self, addr: &str) -> Self {
        self.remote_addr = Some(addr.to_string());
        self
    }

    pub fn with_ip(mut self, ip: &str) -> Self {
        self.ip = Some(ip.to_string());
        self
    }

    /// Lowercase every header name, e.g. after deserializing external input
    pub fn normalized(self) -> Self {
        let headers = self
            .headers
            .into_iter()
            .map(|(name, value)| (name.to_ascii_lowercase(), value))
            .collect();
        RequestInfo { headers, ..self }
    }

    /// Case-insensitive header lookup
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    fn header_or_empty(&self, name: &str) -> &str {
        self.header(name).unwrap_or("")
    }
}

/// Builds connection snapshots from requests
pub struct ConnectionCollector {
    parser: UserAgentParser,
    sanitizer: HeaderSanitizer,
    geo: Option<Arc<dyn GeoLookup>>,
}

impl ConnectionCollector {
    /// Create a collector with the built-in redaction set
    pub fn new(geo: Option<Arc<dyn GeoLookup>>) -> Result<Self, regex::Error> {
        Ok(ConnectionCollector {
            parser: UserAgentParser::new()?,
            sanitizer: HeaderSanitizer::new(),
            geo,
        })
    }

    pub fn from_config(
        config: &CollectorConfig,
        geo: Option<Arc<dyn GeoLookup>>,
    ) -> Result<Self, regex::Error> {
        let mut collector = Self::new(geo)?;
        collector.sanitizer = HeaderSanitizer::with_extra(&config.extra_redacted_headers);
        Ok(collector)
    }

    /// Build a snapshot of the connection at `now`
    pub fn collect(
        &self,
        request: &RequestInfo,
        user_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> ConnectionSnapshot {
        let ip = resolve_client_ip(request);
        let user_agent = request.header_or_empty("user-agent").to_string();

        let fingerprint = device_fingerprint(
            &user_agent,
            request.header_or_empty("accept-language"),
            request.header_or_empty("accept-encoding"),
            request.header_or_empty("accept"),
            &ip,
        );

        ConnectionSnapshot {
            user_id: user_id.map(String::from),
            device: self.parser.parse(&user_agent),
            location: self.resolve_location(&ip),
            headers: self.sanitizer.sanitize(&request.headers),
            ip,
            user_agent,
            fingerprint,
            timestamp: now,
        }
    }

    /// Like [`collect`](Self::collect), asking the remote service when the
    /// local lookup could not resolve the country of a routable IP
    pub async fn collect_enriched(
        &self,
        request: &RequestInfo,
        user_id: Option<&str>,
        now: DateTime<Utc>,
        remote: &HttpGeoLocator,
    ) -> ConnectionSnapshot {
        let mut snapshot = self.collect(request, user_id, now);
        if !snapshot.location.country.is_known() && !ip::is_local(&snapshot.ip) {
            if let Some(location) = remote.locate(&snapshot.ip).await {
                snapshot.location = location;
            }
        }
        snapshot
    }

    /// Resolve the location of an IP using the local lookup table
    ///
    /// Unknown and loopback addresses are never looked up.
    pub fn resolve_location(&self, ip: &str) -> LocationInfo {
        if ip::is_local(ip) {
            return LocationInfo::unknown();
        }

        match (&self.geo, ip::parse_ip(ip)) {
            (Some(geo), Some(addr)) => geo.locate(&addr).unwrap_or_else(|| {
                log::debug!("No geolocation entry for {}", ip);
                LocationInfo::unknown()
            }),
            _ => LocationInfo::unknown(),
        }
    }
}
