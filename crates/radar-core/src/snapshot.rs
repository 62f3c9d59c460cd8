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

//! Radar snapshot orchestration.
//!
//! One refresh runs: resolve station (with fallback) -> fetch and flatten
//! overlays -> stamp with the generation time. A failed refresh leaves the
//! previous artifact in place, so "nothing new this cycle" is always
//! distinguishable from a real result.

use std::fmt::Write as _;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Local};
use log::{error, info, warn};
use thiserror::Error;
use tokio::sync::oneshot;

use crate::overlay::{ComposeError, OverlayCompositor};
use crate::station::{StationCode, StationResolver};
use crate::Raster;

/// Station used when nothing better is known.
pub const DEFAULT_STATION: &str = "DTX";

/// Center zoom applied to every layer except the legend.
pub const DEFAULT_SCALE: f32 = 2.0;

/// `hh:mm a`, e.g. `02:15 PM`.
pub const DEFAULT_TIMESTAMP_FORMAT: &str = "%I:%M %p";

/// Application activated when the displayed snapshot is clicked.
pub const DEFAULT_LAUNCH_TARGET: &str = "com.appdlab.radarexpress";

/// Errors that abort a refresh.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error(transparent)]
    Compose(#[from] ComposeError),

    #[error("snapshot task ended without a result")]
    TaskFailed,
}

/// Service settings.
#[derive(Debug, Clone)]
pub struct SnapshotConfig {
    /// Used when resolution fails and no station has been resolved before.
    pub default_station: StationCode,
    /// Zoom factor; values below 1.0 mean no zoom.
    pub scale: f32,
    /// chrono `strftime` pattern for the display timestamp.
    pub timestamp_format: String,
    /// Opaque identifier handed to the display consumer.
    pub launch_target: String,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            default_station: StationCode::from_static(DEFAULT_STATION),
            scale: DEFAULT_SCALE,
            timestamp_format: DEFAULT_TIMESTAMP_FORMAT.to_string(),
            launch_target: DEFAULT_LAUNCH_TARGET.to_string(),
        }
    }
}

/// A composite and the station and time it was produced for.
#[derive(Debug, Clone)]
pub struct ResolvedSnapshot {
    pub composite: Raster,
    pub station: StationCode,
    pub generated_at: DateTime<Local>,
}

impl ResolvedSnapshot {
    /// Format the generation time, falling back to the default pattern if
    /// `pattern` is not a valid `strftime` string.
    #[must_use]
    pub fn formatted_time(&self, pattern: &str) -> String {
        let mut text = String::new();
        if write!(text, "{}", self.generated_at.format(pattern)).is_ok() {
            return text;
        }
        warn!("Invalid timestamp format {:?}, using default", pattern);
        self.generated_at.format(DEFAULT_TIMESTAMP_FORMAT).to_string()
    }
}

/// What the display consumer receives.
#[derive(Debug, Clone)]
pub struct DisplayArtifact {
    pub snapshot: ResolvedSnapshot,
    pub timestamp: String,
    pub launch_target: String,
}

/// Long-lived snapshot service. Holds the last resolved station and the
/// last produced artifact across refreshes.
pub struct RadarSnapshotService {
    resolver: Option<StationResolver>,
    compositor: OverlayCompositor,
    config: SnapshotConfig,
    last_station: RwLock<Option<StationCode>>,
    latest: RwLock<Option<Arc<DisplayArtifact>>>,
}

impl std::fmt::Debug for RadarSnapshotService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RadarSnapshotService")
            .field("resolver", &self.resolver)
            .field("config", &self.config)
            .field("last_station", &self.last_station())
            .finish_non_exhaustive()
    }
}

impl RadarSnapshotService {
    /// Without a resolver every refresh uses the configured default station.
    #[must_use]
    pub fn new(compositor: OverlayCompositor, config: SnapshotConfig) -> Self {
        Self {
            resolver: None,
            compositor,
            config,
            last_station: RwLock::new(None),
            latest: RwLock::new(None),
        }
    }

    #[must_use]
    pub fn with_resolver(mut self, resolver: StationResolver) -> Self {
        self.resolver = Some(resolver);
        self
    }

    #[must_use]
    pub fn config(&self) -> &SnapshotConfig {
        &self.config
    }

    /// Most recently resolved station, if any resolution has succeeded.
    #[must_use]
    pub fn last_station(&self) -> Option<StationCode> {
        self.last_station.read().ok().and_then(|s| s.clone())
    }

    /// Most recent successful artifact.
    #[must_use]
    pub fn latest(&self) -> Option<Arc<DisplayArtifact>> {
        self.latest.read().ok().and_then(|a| a.clone())
    }

    /// Resolve the station to use for this refresh.
    ///
    /// A resolved station is remembered. Otherwise the last remembered
    /// station is reused, then the configured default. The default is never
    /// remembered.
    pub async fn select_station(&self) -> StationCode {
        if let Some(resolver) = &self.resolver {
            if let Some(station) = resolver.resolve_current_station().await {
                if let Ok(mut last) = self.last_station.write() {
                    *last = Some(station.clone());
                }
                return station;
            }
        }

        if let Some(station) = self.last_station() {
            info!("Using last resolved station {}", station);
            return station;
        }

        info!("Using default station {}", self.config.default_station);
        self.config.default_station.clone()
    }

    /// Full pipeline: station selection, composite, timestamp.
    pub async fn refresh(&self) -> Result<Arc<DisplayArtifact>, SnapshotError> {
        let station = self.select_station().await;
        self.refresh_station(station).await
    }

    /// Composite and stamp a snapshot for a known station, skipping resolution.
    pub async fn refresh_station(&self, station: StationCode) -> Result<Arc<DisplayArtifact>, SnapshotError> {
        let composite = match self.compositor.compose(&station, self.config.scale).await {
            Ok(composite) => composite,
            Err(e) => {
                error!("Radar snapshot for {} failed, keeping previous image: {}", station, e);
                return Err(e.into());
            }
        };

        let snapshot = ResolvedSnapshot {
            composite,
            station,
            generated_at: Local::now(),
        };
        let artifact = Arc::new(DisplayArtifact {
            timestamp: snapshot.formatted_time(&self.config.timestamp_format),
            launch_target: self.config.launch_target.clone(),
            snapshot,
        });

        info!(
            "Radar snapshot for {} ready at {} ({}x{})",
            artifact.snapshot.station,
            artifact.timestamp,
            artifact.snapshot.composite.width(),
            artifact.snapshot.composite.height()
        );

        if let Ok(mut latest) = self.latest.write() {
            *latest = Some(Arc::clone(&artifact));
        }
        Ok(artifact)
    }

    /// Run a refresh on a background task and deliver the result to a
    /// single consumer.
    pub fn spawn_refresh(self: &Arc<Self>) -> oneshot::Receiver<Result<Arc<DisplayArtifact>, SnapshotError>> {
        let (tx, rx) = oneshot::channel();
        let service = Arc::clone(self);
        tokio::spawn(async move {
            let result = service.refresh().await;
            if tx.send(result).is_err() {
                warn!("Snapshot consumer went away before the result was delivered");
            }
        });
        rx
    }

    /// Spawn a refresh and wait for it.
    pub async fn request(self: &Arc<Self>) -> Result<Arc<DisplayArtifact>, SnapshotError> {
        self.spawn_refresh()
            .await
            .unwrap_or(Err(SnapshotError::TaskFailed))
    }
}
