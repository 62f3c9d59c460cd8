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

//! Location providers.

use std::time::Duration;

use async_trait::async_trait;
use log::warn;
use reqwest::Client;
use serde::Deserialize;

use super::{LocationProvider, Position};

/// Default IP geolocation endpoint.
pub const DEFAULT_IP_LOCATION_URL: &str = "https://ipapi.co/json/";

/// A configured position, for hosts without a GPS (high-accuracy slot).
#[derive(Debug, Clone)]
pub struct FixedLocation {
    position: Option<Position>,
}

impl FixedLocation {
    #[must_use]
    pub fn new(position: Option<Position>) -> Self {
        Self { position }
    }

    /// Builds from optional config overrides; both must be present.
    #[must_use]
    pub fn from_override(latitude: Option<f64>, longitude: Option<f64>) -> Self {
        Self::new(latitude.zip(longitude).map(|(lat, lon)| Position::new(lat, lon)))
    }
}

#[async_trait]
impl LocationProvider for FixedLocation {
    fn name(&self) -> &str {
        "configured location"
    }

    async fn last_known_position(&self) -> Option<Position> {
        self.position
    }
}

#[derive(Debug, Deserialize)]
struct IpLocationResponse {
    latitude: Option<f64>,
    longitude: Option<f64>,
}

impl IpLocationResponse {
    fn position(&self) -> Option<Position> {
        Some(Position::new(self.latitude?, self.longitude?))
    }
}

/// Coarse network position from an IP geolocation service.
#[derive(Debug, Clone)]
pub struct IpLocationProvider {
    client: Client,
    url: String,
}

impl IpLocationProvider {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            url: url.into(),
        })
    }
}

#[async_trait]
impl LocationProvider for IpLocationProvider {
    fn name(&self) -> &str {
        "IP geolocation"
    }

    async fn last_known_position(&self) -> Option<Position> {
        let response = match self.client.get(&self.url).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!("IP geolocation request to {} failed: {}", self.url, e);
                return None;
            }
        };

        match response.json::<IpLocationResponse>().await {
            Ok(body) => body.position(),
            Err(e) => {
                warn!("IP geolocation response from {} unreadable: {}", self.url, e);
                None
            }
        }
    }
}
