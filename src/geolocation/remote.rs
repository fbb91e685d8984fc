//! HTTP geolocation provider
//!
//! Queries `GET <base_url>/<ip>` and expects
//! `{success, city, region, country}`; other fields are ignored. Any failure degrades
//! to `None`; nothing is retried.

use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

use crate::models::{Detected, LocationInfo};

#[derive(Debug, Deserialize)]
struct GeoApiResponse {
    #[serde(default)]
    success: bool,
    city: Option<String>,
    region: Option<String>,
    country: Option<String>,
}

impl GeoApiResponse {
    fn into_location(self) -> Option<LocationInfo> {
        if !self.success {
            return None;
        }
        Some(LocationInfo {
            country: self.country.map(Detected::from_text).unwrap_or_default(),
            region: self.region.map(Detected::from_text).unwrap_or_default(),
            city: self.city.map(Detected::from_text).unwrap_or_default(),
            ..LocationInfo::unknown()
        })
    }
}

/// Async client for an external IP geolocation service
#[derive(Clone)]
pub struct HttpGeoLocator {
    client: Client,
    base_url: String,
}

impl HttpGeoLocator {
    pub fn new(base_url: impl Into<String>) -> Self {
        HttpGeoLocator {
            client: Client::builder()
                .timeout(Duration::from_secs(5))
                .build()
                .unwrap_or_default(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Look up an IP, returning `None` on any failure
    pub async fn locate(&self, ip: &str) -> Option<LocationInfo> {
        let url = format!("{}/{}", self.base_url, ip);

        let response = match self.client.get(&url).send().await {
            Ok(response) => response,
            Err(e) => {
                log::warn!("Geolocation request for {} failed: {}", ip, e);
                return None;
            }
        };

        if !response.status().is_success() {
            log::warn!(
                "Geolocation service returned non-success status {} for {}",
                response.status(),
                ip
            );
            return None;
        }

        match response.json::<GeoApiResponse>().await {
            Ok(body) => body.into_location(),
            Err(e) => {
                log::warn!("Invalid geolocation response for {}: {}", ip, e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_successful_response_maps_fields() {
        let body: GeoApiResponse = serde_json::from_str(
            r#"{"success": true, "city": "Paris", "region": "Ile-de-France",
                "country": "FR", "continent": "Europe"}"#,
        )
        .unwrap();

        let location = body.into_location().unwrap();
        assert_eq!(location.country.as_str(), Some("FR"));
        assert_eq!(location.region.as_str(), Some("Ile-de-France"));
        assert_eq!(location.city.as_str(), Some("Paris"));
        assert!(location.coordinates.is_none());
    }

    #[test]
    fn test_unsuccessful_response_is_none() {
        let body: GeoApiResponse =
            serde_json::from_str(r#"{"success": false, "message": "reserved range"}"#).unwrap();
        assert!(body.into_location().is_none());
    }

    #[test]
    fn test_trailing_slash_trimmed() {
        let locator = HttpGeoLocator::new("https://geo.example.com/");
        assert_eq!(locator.base_url, "https://geo.example.com");
    }

    #[tokio::test]
    async fn test_network_failure_degrades_to_none() {
        // Nothing listens on the discard port locally
        let locator = HttpGeoLocator::new("http://127.0.0.1:9");
        assert!(locator.locate("8.8.8.8").await.is_none());
    }
}
