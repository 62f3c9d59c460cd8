// Copyright 2025 Chris Custine
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Reverse geocoding through OpenStreetMap Nominatim.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use super::{Address, Geocoder, Position, ResolveError};

/// Public Nominatim instance.
pub const DEFAULT_GEOCODER_URL: &str = "https://nominatim.openstreetmap.org";

// Nominatim's usage policy requires an identifying User-Agent.
const USER_AGENT: &str = concat!("radar-snapshot/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Deserialize)]
struct ReverseResponse {
    address: Option<ReverseAddress>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ReverseAddress {
    postcode: Option<String>,
    city: Option<String>,
    town: Option<String>,
    village: Option<String>,
}

impl ReverseResponse {
    fn into_candidates(self) -> Result<Vec<Address>, ResolveError> {
        if let Some(error) = self.error {
            return Err(ResolveError::NoAddress(error));
        }
        Ok(self
            .address
            .map(|a| Address {
                postal_code: a.postcode,
                locality: a.city.or(a.town).or(a.village),
            })
            .into_iter()
            .collect())
    }
}

/// Nominatim `/reverse` client.
#[derive(Debug, Clone)]
pub struct NominatimGeocoder {
    client: Client,
    base_url: String,
}

impl NominatimGeocoder {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }
}

#[async_trait]
impl Geocoder for NominatimGeocoder {
    async fn reverse_geocode(&self, position: Position) -> Result<Vec<Address>, ResolveError> {
        let url = format!("{}/reverse", self.base_url.trim_end_matches('/'));
        let lat = position.latitude.to_string();
        let lon = position.longitude.to_string();

        let response = self
            .client
            .get(&url)
            .query(&[("format", "jsonv2"), ("lat", lat.as_str()), ("lon", lon.as_str()), ("addressdetails", "1")])
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| ResolveError::NoAddress(format!("geocoder request failed: {e}")))?;

        let body: ReverseResponse = response
            .json()
            .await
            .map_err(|e| ResolveError::NoAddress(format!("geocoder response unreadable: {e}")))?;

        body.into_candidates()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reverse_response_postcode() {
        let body: ReverseResponse = serde_json::from_str(
            r#"{"place_id":1,"display_name":"Main Street, Ann Arbor","address":{"road":"Main Street","city":"Ann Arbor","state":"Michigan","postcode":"48104","country_code":"us"}}"#,
        )
        .unwrap();
        let candidates = body.into_candidates().unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].postal_code.as_deref(), Some("48104"));
        assert_eq!(candidates[0].locality.as_deref(), Some("Ann Arbor"));
    }

    #[test]
    fn test_reverse_response_error() {
        let body: ReverseResponse = serde_json::from_str(r#"{"error":"Unable to geocode"}"#).unwrap();
        assert!(matches!(body.into_candidates(), Err(ResolveError::NoAddress(msg)) if msg == "Unable to geocode"));
    }

    #[test]
    fn test_reverse_response_without_address_is_empty() {
        let body: ReverseResponse = serde_json::from_str(r#"{"place_id":1}"#).unwrap();
        assert!(body.into_candidates().unwrap().is_empty());
    }
}
