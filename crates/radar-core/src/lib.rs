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

//! Composite weather radar snapshots for NWS RIDGE stations.
//!
//! This library downloads the per-station RIDGE overlay images, decodes them
//! with their transparency intact, and flattens them into one RGBA image. It
//! is organised in layers that can be used on their own:
//!
//! - **Decoder layer**: GIF decoding onto an RGBA canvas ([`GifDecoder`])
//! - **Fetch layer**: buffered HTTP download + decode ([`ImageFetcher`])
//! - **Overlay layer**: the layer stack as data and the compositor
//!   ([`OverlaySpec`], [`OverlayCompositor`])
//! - **Station layer**: location -> postal code -> station ([`StationResolver`])
//! - **Snapshot layer**: orchestration with station fallback and a
//!   "last good result" ([`RadarSnapshotService`])
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use radar_core::{default_overlays, ImageFetcher, OverlayCompositor, RadarSnapshotService, SnapshotConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let fetcher = ImageFetcher::new(Duration::from_secs(15))?;
//!     let compositor = OverlayCompositor::new(Arc::new(fetcher), default_overlays());
//!     let service = RadarSnapshotService::new(compositor, SnapshotConfig::default());
//!
//!     let artifact = service.refresh().await?;
//!     println!("{} updated {}", artifact.snapshot.station, artifact.timestamp);
//!     Ok(())
//! }
//! ```
//!
//! # Decoding a Single Overlay
//!
//! ```
//! use radar_core::{decode, OverlayFormat};
//!
//! assert!(decode(b"not a gif", OverlayFormat::Gif).is_err());
//! ```

pub mod decoder;
pub mod fetch;
pub mod overlay;
pub mod snapshot;
pub mod station;

pub use decoder::{decode_first_frame, FormatError, GifDecoder, MAX_CANVAS_BYTES};
pub use fetch::{decode, FetchError, ImageFetcher, ImageSource, DEFAULT_FETCH_TIMEOUT, MAX_OVERLAY_BYTES};
pub use overlay::{
    default_overlays, flatten, ComposeError, DecodedLayer, LayerKind, OverlayCompositor, OverlayFormat, OverlaySpec,
    Transform,
};
pub use snapshot::{
    DisplayArtifact, RadarSnapshotService, ResolvedSnapshot, SnapshotConfig, SnapshotError, DEFAULT_LAUNCH_TARGET,
    DEFAULT_SCALE, DEFAULT_STATION, DEFAULT_TIMESTAMP_FORMAT,
};
pub use station::{
    Address, FixedLocation, Geocoder, IpLocationProvider, LocationProvider, NominatimGeocoder, Position,
    RedirectStationLookup, ResolveError, StationCode, StationLookup, StationResolver,
};

/// Decoded image: width, height and RGBA pixels with straight alpha.
pub type Raster = image::RgbaImage;
