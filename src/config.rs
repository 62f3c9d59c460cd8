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

//! Application configuration management.
//!
//! This module handles persistent configuration storage using TOML format.
//! It covers the default station, zoom, timestamp format, the overlay stack
//! and the endpoints used for station resolution.

use radar_core::station::{DEFAULT_GEOCODER_URL, DEFAULT_IP_LOCATION_URL, DEFAULT_STATION_LOOKUP_URL};
use radar_core::{
    default_overlays, OverlaySpec, SnapshotConfig, StationCode, DEFAULT_FETCH_TIMEOUT, DEFAULT_LAUNCH_TARGET,
    DEFAULT_SCALE, DEFAULT_TIMESTAMP_FORMAT,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const APP_NAME: &str = "radar-snapshot";
const CONFIG_NAME: &str = "config";

/// Application configuration stored in TOML format
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    /// Configuration schema version for migrations
    #[serde(default = "default_config_version")]
    pub config_version: u32,

    /// Station used when location-based resolution fails
    #[serde(default = "default_station")]
    pub default_station: StationCode,

    /// Center zoom factor (values below 1.0 are treated as 1.0)
    #[serde(default = "default_scale")]
    pub scale: f32,

    /// chrono strftime pattern for the "last updated" text
    #[serde(default = "default_timestamp_format")]
    pub timestamp_format: String,

    /// Application to launch when the snapshot is clicked
    #[serde(default = "default_launch_target")]
    pub launch_target: String,

    /// Per-request HTTP timeout in seconds
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,

    /// Postal code search URL, `%s` is replaced by the postal code
    #[serde(default = "default_station_lookup_url")]
    pub station_lookup_url: String,

    /// Reverse geocoding (Nominatim) base URL
    #[serde(default = "default_geocoder_url")]
    pub geocoder_url: String,

    /// IP geolocation endpoint
    #[serde(default = "default_ip_location_url")]
    pub ip_location_url: String,

    /// Fall back to IP geolocation when no position is configured
    #[serde(default = "default_true")]
    pub use_ip_location: bool,

    /// Override latitude (for devices without GPS)
    #[serde(default)]
    pub override_latitude: Option<f64>,

    /// Override longitude (for devices without GPS)
    #[serde(default)]
    pub override_longitude: Option<f64>,

    /// Overlay stack in paint order; set `enabled = false` to drop a layer
    #[serde(default = "default_overlays")]
    pub overlays: Vec<OverlaySpec>,
}

// Default value functions for serde
fn default_config_version() -> u32 {
    1 // Current schema version
}

fn default_station() -> StationCode {
    SnapshotConfig::default().default_station
}

fn default_scale() -> f32 {
    DEFAULT_SCALE
}

fn default_timestamp_format() -> String {
    DEFAULT_TIMESTAMP_FORMAT.to_string()
}

fn default_launch_target() -> String {
    DEFAULT_LAUNCH_TARGET.to_string()
}

fn default_fetch_timeout_secs() -> u64 {
    DEFAULT_FETCH_TIMEOUT.as_secs()
}

fn default_station_lookup_url() -> String {
    DEFAULT_STATION_LOOKUP_URL.to_string()
}

fn default_geocoder_url() -> String {
    DEFAULT_GEOCODER_URL.to_string()
}

fn default_ip_location_url() -> String {
    DEFAULT_IP_LOCATION_URL.to_string()
}

fn default_true() -> bool {
    true
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            config_version: default_config_version(),
            default_station: default_station(),
            scale: default_scale(),
            timestamp_format: default_timestamp_format(),
            launch_target: default_launch_target(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            station_lookup_url: default_station_lookup_url(),
            geocoder_url: default_geocoder_url(),
            ip_location_url: default_ip_location_url(),
            use_ip_location: true,
            override_latitude: None,
            override_longitude: None,
            overlays: default_overlays(),
        }
    }
}

impl AppConfig {
    /// Load configuration from disk, writing defaults on first run
    pub fn load() -> Result<Self, confy::ConfyError> {
        confy::load(APP_NAME, CONFIG_NAME)
    }

    /// Save configuration to disk
    #[allow(dead_code, reason = "kept for callers that edit settings")]
    pub fn save(&self) -> Result<(), confy::ConfyError> {
        confy::store(APP_NAME, CONFIG_NAME, self)
    }

    /// Get the config file path for display to user
    pub fn get_config_path() -> Result<std::path::PathBuf, confy::ConfyError> {
        confy::get_configuration_file_path(APP_NAME, CONFIG_NAME)
    }

    /// HTTP timeout as a Duration
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs.max(1))
    }

    /// Settings for the snapshot service
    pub fn snapshot_config(&self) -> SnapshotConfig {
        SnapshotConfig {
            default_station: self.default_station.clone(),
            scale: self.scale.max(1.0),
            timestamp_format: self.timestamp_format.clone(),
            launch_target: self.launch_target.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.default_station.as_str(), "DTX");
        assert_eq!(config.scale, 2.0);
        assert_eq!(config.timestamp_format, "%I:%M %p");
        assert_eq!(config.overlays.iter().filter(|o| o.enabled).count(), 6);
    }

    #[test]
    fn test_scale_clamped_for_service() {
        let config = AppConfig {
            scale: 0.3,
            ..Default::default()
        };
        assert_eq!(config.snapshot_config().scale, 1.0);
    }

    #[test]
    fn test_timeout_never_zero() {
        let config = AppConfig {
            fetch_timeout_secs: 0,
            ..Default::default()
        };
        assert_eq!(config.fetch_timeout(), Duration::from_secs(1));
    }
}
