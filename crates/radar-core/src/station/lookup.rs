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

//! Postal code to station lookup via the NWS zip-code redirect.
//!
//! The forecast site has no lookup API. Requesting a forecast by zip code
//! answers with a redirect whose `Location` carries `site=<station>`, so the
//! redirect is captured instead of followed.

use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use reqwest::header::LOCATION;
use reqwest::redirect::Policy;
use reqwest::{Client, Url};

use super::{ResolveError, StationCode, StationLookup};

/// Zip code search endpoint; `%s` is replaced by the postal code.
pub const DEFAULT_STATION_LOOKUP_URL: &str = "https://forecast.weather.gov/zipcity.php?inputstring=%s";

const SITE_PARAM: &str = "site";

/// Extract the `site` query parameter from a redirect target.
///
/// Relative targets are resolved against `request_url`.
#[must_use]
pub fn station_from_location(request_url: &Url, location: &str) -> Option<StationCode> {
    let target = request_url.join(location).ok()?;
    target
        .query_pairs()
        .find(|(key, _)| key == SITE_PARAM)
        .and_then(|(_, value)| StationCode::parse(&value))
}

/// Station lookup that reads the zip code search redirect.
#[derive(Debug, Clone)]
pub struct RedirectStationLookup {
    client: Client,
    url_template: String,
}

impl RedirectStationLookup {
    pub fn new(url_template: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .redirect(Policy::none())
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            url_template: url_template.into(),
        })
    }

    fn lookup_url(&self, postal_code: &str) -> Result<Url, ResolveError> {
        let raw = self.url_template.replacen("%s", postal_code, 1);
        Url::parse(&raw).map_err(|e| ResolveError::LookupFailed(format!("bad lookup URL {raw}: {e}")))
    }
}

#[async_trait]
impl StationLookup for RedirectStationLookup {
    async fn station_for_postal_code(&self, postal_code: &str) -> Result<StationCode, ResolveError> {
        let url = self.lookup_url(postal_code)?;
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| ResolveError::LookupFailed(format!("request to {url} failed: {e}")))?;

        let status = response.status();
        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| ResolveError::LookupFailed(format!("{url} answered {status} without a Location header")))?;
        debug!("Station lookup for {} redirected to {}", postal_code, location);

        station_from_location(&url, location)
            .ok_or_else(|| ResolveError::LookupFailed(format!("no {SITE_PARAM} parameter in {location}")))
    }
}
