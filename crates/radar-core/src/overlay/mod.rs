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

//! Radar overlay layers.
//!
//! Each station has a fixed stack of RIDGE overlays served as individual
//! images. This module describes that stack as data (so disabling a layer
//! is a config change) and flattens the downloaded layers into one image.

mod compositor;
mod transform;

pub use compositor::{flatten, ComposeError, DecodedLayer, OverlayCompositor};
pub use transform::Transform;

use serde::{Deserialize, Serialize};

use crate::station::StationCode;

/// NWS RIDGE image root.
pub const BASE_RIDGE_URL: &str = "http://radar.weather.gov/ridge/";

/// Placeholder substituted with the station code in overlay URL templates.
pub const STATION_PLACEHOLDER: &str = "%s";

/// Encoding of an overlay image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverlayFormat {
    Gif,
    Jpeg,
}

/// The kinds of overlay the RIDGE server publishes per station.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerKind {
    Topography,
    BaseReflectivity,
    Counties,
    Highways,
    Rivers,
    Cities,
    Warnings,
    Legend,
}

impl LayerKind {
    /// Get human-readable display name
    #[must_use]
    pub fn display_name(&self) -> &'static str {
        match self {
            LayerKind::Topography => "Topography",
            LayerKind::BaseReflectivity => "Base Reflectivity",
            LayerKind::Counties => "County Lines",
            LayerKind::Highways => "Highways",
            LayerKind::Rivers => "Rivers",
            LayerKind::Cities => "Cities",
            LayerKind::Warnings => "Warnings",
            LayerKind::Legend => "Legend",
        }
    }
}

/// One layer of the composite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverlaySpec {
    pub kind: LayerKind,

    /// URL with a single `%s` station placeholder
    pub url_template: String,

    pub format: OverlayFormat,

    /// Paint order; lower values are drawn first
    pub order: u32,

    /// Whether the zoom transform applies. The legend is drawn unscaled.
    #[serde(default = "default_true")]
    pub scaled: bool,

    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

impl OverlaySpec {
    #[must_use]
    pub fn new(kind: LayerKind, path: &str, format: OverlayFormat, order: u32) -> Self {
        Self {
            kind,
            url_template: format!("{BASE_RIDGE_URL}{path}"),
            format,
            order,
            scaled: kind != LayerKind::Legend,
            enabled: true,
        }
    }

    #[must_use]
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Substitute the station code into the URL template.
    #[must_use]
    pub fn url_for(&self, station: &StationCode) -> String {
        self.url_template
            .replacen(STATION_PLACEHOLDER, station.as_str(), 1)
    }
}

/// The RIDGE "short range" stack in paint order.
///
/// Rivers and the legend are published but switched off by default.
#[must_use]
pub fn default_overlays() -> Vec<OverlaySpec> {
    vec![
        OverlaySpec::new(LayerKind::Topography, "Overlays/Topo/Short/%s_Topo_Short.jpg", OverlayFormat::Jpeg, 0),
        OverlaySpec::new(LayerKind::BaseReflectivity, "RadarImg/N0R/%s_N0R_0.gif", OverlayFormat::Gif, 1),
        OverlaySpec::new(LayerKind::Counties, "Overlays/County/Short/%s_County_Short.gif", OverlayFormat::Gif, 2),
        OverlaySpec::new(LayerKind::Highways, "Overlays/Highways/Short/%s_Highways_Short.gif", OverlayFormat::Gif, 3),
        OverlaySpec::new(LayerKind::Rivers, "Overlays/Rivers/Short/%s_Rivers_Short.gif", OverlayFormat::Gif, 4).disabled(),
        OverlaySpec::new(LayerKind::Cities, "Overlays/Cities/Short/%s_City_Short.gif", OverlayFormat::Gif, 5),
        OverlaySpec::new(LayerKind::Warnings, "Warnings/Short/%s_Warnings_0.gif", OverlayFormat::Gif, 6),
        OverlaySpec::new(LayerKind::Legend, "Legend/N0R/%s_N0R_Legend_0.gif", OverlayFormat::Gif, 7).disabled(),
    ]
}
