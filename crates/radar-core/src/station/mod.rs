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

//! Radar station resolution.
//!
//! Turns the device's last known position into a radar station code:
//!
//! 1. **Locate**: ask each [`LocationProvider`] in priority order
//!    (high-accuracy first) for a last known position
//! 2. **Geocode**: reverse-geocode the position to a postal code
//! 3. **Lookup**: map the postal code to a station with a [`StationLookup`]
//!
//! Each stage runs once; the first failure ends the attempt. The resolver
//! never returns an error from [`StationResolver::resolve_current_station`],
//! callers decide what to fall back to.

mod geocode;
mod location;
mod lookup;

pub use geocode::{NominatimGeocoder, DEFAULT_GEOCODER_URL};
pub use location::{FixedLocation, IpLocationProvider, DEFAULT_IP_LOCATION_URL};
pub use lookup::{station_from_location, RedirectStationLookup, DEFAULT_STATION_LOOKUP_URL};

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Short alphanumeric radar station identifier, e.g. `DTX`.
///
/// Case is kept exactly as supplied.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StationCode(String);

impl StationCode {
    /// Accepts a non-empty ASCII alphanumeric code, surrounding whitespace trimmed.
    #[must_use]
    pub fn parse(code: &str) -> Option<Self> {
        let code = code.trim();
        if code.is_empty() || !code.chars().all(|c| c.is_ascii_alphanumeric()) {
            return None;
        }
        Some(Self(code.to_string()))
    }

    /// For compile-time constants known to be valid.
    pub(crate) fn from_static(code: &'static str) -> Self {
        Self(code.to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StationCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for StationCode {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value).ok_or_else(|| format!("invalid station code: {value:?}"))
    }
}

impl From<StationCode> for String {
    fn from(code: StationCode) -> Self {
        code.0
    }
}

/// Geographic position in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,
}

impl Position {
    #[must_use]
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }
}

/// One reverse-geocoding candidate. Only the postal code is consumed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Address {
    pub postal_code: Option<String>,
    pub locality: Option<String>,
}

/// Errors for each resolution stage.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("no last known location from any provider")]
    NoLocation,

    #[error("no postal code for position: {0}")]
    NoAddress(String),

    #[error("station lookup failed: {0}")]
    LookupFailed(String),
}

impl ResolveError {
    /// Pipeline stage that produced the error, for logs.
    #[must_use]
    pub fn stage(&self) -> &'static str {
        match self {
            Self::NoLocation => "locate",
            Self::NoAddress(_) => "geocode",
            Self::LookupFailed(_) => "lookup",
        }
    }
}

/// Source of a last known device position.
#[async_trait]
pub trait LocationProvider: Send + Sync {
    /// Provider name for log messages.
    fn name(&self) -> &str;

    async fn last_known_position(&self) -> Option<Position>;
}

/// Reverse geocoder returning candidates best-first.
#[async_trait]
pub trait Geocoder: Send + Sync {
    async fn reverse_geocode(&self, position: Position) -> Result<Vec<Address>, ResolveError>;
}

/// Postal code to station mapping.
#[async_trait]
pub trait StationLookup: Send + Sync {
    async fn station_for_postal_code(&self, postal_code: &str) -> Result<StationCode, ResolveError>;
}

/// Runs locate, geocode and lookup in sequence.
pub struct StationResolver {
    locators: Vec<Arc<dyn LocationProvider>>,
    geocoder: Arc<dyn Geocoder>,
    lookup: Arc<dyn StationLookup>,
}

impl fmt::Debug for StationResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.locators.iter().map(|l| l.name()).collect();
        f.debug_struct("StationResolver")
            .field("locators", &names)
            .finish_non_exhaustive()
    }
}

impl StationResolver {
    /// `locators` are tried in order; put the most accurate first.
    #[must_use]
    pub fn new(
        locators: Vec<Arc<dyn LocationProvider>>,
        geocoder: Arc<dyn Geocoder>,
        lookup: Arc<dyn StationLookup>,
    ) -> Self {
        Self {
            locators,
            geocoder,
            lookup,
        }
    }

    /// First position any provider knows about.
    pub async fn locate(&self) -> Result<Position, ResolveError> {
        for locator in &self.locators {
            if let Some(position) = locator.last_known_position().await {
                info!(
                    "Location from {}: {:.4}, {:.4}",
                    locator.name(),
                    position.latitude,
                    position.longitude
                );
                return Ok(position);
            }
            info!("No last known location from {}", locator.name());
        }
        Err(ResolveError::NoLocation)
    }

    /// Postal code of the top geocoding candidate.
    pub async fn postal_code(&self, position: Position) -> Result<String, ResolveError> {
        let candidates = self.geocoder.reverse_geocode(position).await?;
        candidates
            .into_iter()
            .next()
            .and_then(|address| address.postal_code)
            .map(|code| code.trim().to_string())
            .filter(|code| !code.is_empty())
            .ok_or_else(|| {
                ResolveError::NoAddress(format!("{:.4}, {:.4}", position.latitude, position.longitude))
            })
    }

    /// Run all stages, stopping at the first failure.
    pub async fn try_resolve(&self) -> Result<StationCode, ResolveError> {
        let position = self.locate().await?;
        let postal_code = self.postal_code(position).await?;
        let station = self.lookup.station_for_postal_code(&postal_code).await?;
        info!("Resolved postal code {} to station {}", postal_code, station);
        Ok(station)
    }

    /// Resolve the station for the current location, or `None` if any stage
    /// fails. Failures are logged, never returned.
    pub async fn resolve_current_station(&self) -> Option<StationCode> {
        match self.try_resolve().await {
            Ok(station) => Some(station),
            Err(e) => {
                warn!("Station resolution failed at {} stage: {}", e.stage(), e);
                None
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use super::*;

    #[derive(Debug)]
    pub struct StubLocation {
        pub name: &'static str,
        pub position: Mutex<Option<Position>>,
        pub calls: AtomicUsize,
    }

    impl StubLocation {
        pub fn new(name: &'static str, position: Option<Position>) -> Self {
            Self {
                name,
                position: Mutex::new(position),
                calls: AtomicUsize::new(0),
            }
        }

        pub fn set(&self, position: Option<Position>) {
            *self.position.lock().unwrap() = position;
        }
    }

    #[async_trait]
    impl LocationProvider for StubLocation {
        fn name(&self) -> &str {
            self.name
        }

        async fn last_known_position(&self) -> Option<Position> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.position.lock().unwrap()
        }
    }

    /// Returns the same candidate list for every position.
    #[derive(Debug, Default)]
    pub struct StubGeocoder {
        pub candidates: Vec<Address>,
    }

    impl StubGeocoder {
        pub fn postal(code: &str) -> Self {
            Self {
                candidates: vec![Address {
                    postal_code: Some(code.to_string()),
                    locality: None,
                }],
            }
        }
    }

    #[async_trait]
    impl Geocoder for StubGeocoder {
        async fn reverse_geocode(&self, _position: Position) -> Result<Vec<Address>, ResolveError> {
            Ok(self.candidates.clone())
        }
    }

    /// Maps postal codes through a fixed table.
    #[derive(Debug, Default)]
    pub struct StubLookup {
        pub table: Vec<(&'static str, &'static str)>,
    }

    #[async_trait]
    impl StationLookup for StubLookup {
        async fn station_for_postal_code(&self, postal_code: &str) -> Result<StationCode, ResolveError> {
            self.table
                .iter()
                .find(|(zip, _)| *zip == postal_code)
                .and_then(|(_, site)| StationCode::parse(site))
                .ok_or_else(|| ResolveError::LookupFailed(format!("no station for {postal_code}")))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::test_support::*;
    use super::*;

    fn ann_arbor() -> Position {
        Position::new(42.2808, -83.7430)
    }

    fn resolver(locators: Vec<Arc<StubLocation>>, geocoder: StubGeocoder) -> StationResolver {
        let locators = locators
            .into_iter()
            .map(|l| l as Arc<dyn LocationProvider>)
            .collect();
        let lookup = StubLookup {
            table: vec![("48104", "DTX"), ("60601", "LOT")],
        };
        StationResolver::new(locators, Arc::new(geocoder), Arc::new(lookup))
    }

    #[test]
    fn test_station_code_parse() {
        assert_eq!(StationCode::parse(" DTX ").unwrap().as_str(), "DTX");
        assert_eq!(StationCode::parse("kdtx").unwrap().as_str(), "kdtx");
        assert!(StationCode::parse("").is_none());
        assert!(StationCode::parse("D TX").is_none());
        assert!(StationCode::parse("DTX&x=1").is_none());
    }

    #[tokio::test]
    async fn test_full_chain_resolves() {
        let gps = Arc::new(StubLocation::new("gps", Some(ann_arbor())));
        let resolver = resolver(vec![gps], StubGeocoder::postal("48104"));
        assert_eq!(resolver.resolve_current_station().await.unwrap().as_str(), "DTX");
    }

    #[tokio::test]
    async fn test_falls_back_to_network_provider() {
        let gps = Arc::new(StubLocation::new("gps", None));
        let network = Arc::new(StubLocation::new("network", Some(ann_arbor())));
        let resolver = resolver(vec![gps.clone(), network.clone()], StubGeocoder::postal("48104"));

        assert_eq!(resolver.locate().await.unwrap(), ann_arbor());
        assert_eq!(gps.calls.load(Ordering::SeqCst), 1);
        assert_eq!(network.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_high_accuracy_provider_wins() {
        let gps = Arc::new(StubLocation::new("gps", Some(ann_arbor())));
        let network = Arc::new(StubLocation::new("network", Some(Position::new(41.88, -87.63))));
        let resolver = resolver(vec![gps, network.clone()], StubGeocoder::postal("48104"));

        resolver.locate().await.unwrap();
        assert_eq!(network.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_no_location_is_unresolved() {
        let gps = Arc::new(StubLocation::new("gps", None));
        let network = Arc::new(StubLocation::new("network", None));
        let resolver = resolver(vec![gps, network], StubGeocoder::postal("48104"));

        assert!(matches!(resolver.try_resolve().await, Err(ResolveError::NoLocation)));
        assert!(resolver.resolve_current_station().await.is_none());
    }

    #[tokio::test]
    async fn test_empty_geocode_is_no_address() {
        let gps = Arc::new(StubLocation::new("gps", Some(ann_arbor())));
        let resolver = resolver(vec![gps], StubGeocoder::default());

        let err = resolver.try_resolve().await.unwrap_err();
        assert!(matches!(err, ResolveError::NoAddress(_)));
        assert_eq!(err.stage(), "geocode");
    }

    #[tokio::test]
    async fn test_only_top_candidate_is_used() {
        let gps = Arc::new(StubLocation::new("gps", Some(ann_arbor())));
        let geocoder = StubGeocoder {
            candidates: vec![
                Address::default(),
                Address {
                    postal_code: Some("48104".to_string()),
                    locality: None,
                },
            ],
        };
        let resolver = resolver(vec![gps], geocoder);
        assert!(matches!(resolver.try_resolve().await, Err(ResolveError::NoAddress(_))));
    }

    #[tokio::test]
    async fn test_unknown_postal_code_is_lookup_failure() {
        let gps = Arc::new(StubLocation::new("gps", Some(ann_arbor())));
        let resolver = resolver(vec![gps], StubGeocoder::postal("99999"));

        let err = resolver.try_resolve().await.unwrap_err();
        assert_eq!(err.stage(), "lookup");
        assert!(resolver.resolve_current_station().await.is_none());
    }
}
