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

//! Fetches every enabled overlay for a station and flattens them.

use std::sync::Arc;

use futures::future::join_all;
use image::{imageops, Pixel, Rgba};
use log::{info, warn};
use thiserror::Error;

use super::{OverlaySpec, Transform};
use crate::fetch::ImageSource;
use crate::station::StationCode;
use crate::Raster;

/// Errors from compositing.
#[derive(Debug, Error)]
pub enum ComposeError {
    #[error("no overlay layers could be loaded for station {0}")]
    NoLayers(String),
}

/// A successfully decoded layer and the overlay entry it came from.
#[derive(Debug, Clone)]
pub struct DecodedLayer {
    pub spec: OverlaySpec,
    pub raster: Raster,
}

/// Loads the overlay stack for a station and flattens it into one raster.
pub struct OverlayCompositor {
    source: Arc<dyn ImageSource>,
    overlays: Vec<OverlaySpec>,
}

impl std::fmt::Debug for OverlayCompositor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OverlayCompositor")
            .field("overlays", &self.overlays)
            .finish_non_exhaustive()
    }
}

impl OverlayCompositor {
    /// Keeps only enabled overlays, ordered by their paint order.
    #[must_use]
    pub fn new(source: Arc<dyn ImageSource>, overlays: Vec<OverlaySpec>) -> Self {
        let mut overlays: Vec<OverlaySpec> = overlays.into_iter().filter(|o| o.enabled).collect();
        overlays.sort_by_key(|o| o.order);
        Self { source, overlays }
    }

    /// Enabled overlays in paint order.
    #[must_use]
    pub fn overlays(&self) -> &[OverlaySpec] {
        &self.overlays
    }

    /// Fetch all layers concurrently. Failed layers are logged and dropped;
    /// the survivors keep paint order.
    pub async fn fetch_layers(&self, station: &StationCode) -> Vec<DecodedLayer> {
        let fetches = self.overlays.iter().map(|spec| {
            let url = spec.url_for(station);
            async move {
                match self.source.fetch(&url, spec.format).await {
                    Ok(raster) => Some(DecodedLayer {
                        spec: spec.clone(),
                        raster,
                    }),
                    Err(e) => {
                        warn!("Skipping {} layer: {}", spec.kind.display_name(), e);
                        None
                    }
                }
            }
        });

        join_all(fetches).await.into_iter().flatten().collect()
    }

    pub async fn compose(&self, station: &StationCode, scale: f32) -> Result<Raster, ComposeError> {
        let layers = self.fetch_layers(station).await;
        info!(
            "Loaded {}/{} overlay layers for {}",
            layers.len(),
            self.overlays.len(),
            station
        );
        flatten(&layers, scale).ok_or_else(|| ComposeError::NoLayers(station.to_string()))
    }
}

/// Paint decoded layers, in order, onto a canvas sized to the first scaled
/// layer. Returns `None` when there is nothing to paint.
#[must_use]
pub fn flatten(layers: &[DecodedLayer], scale: f32) -> Option<Raster> {
    let base = layers
        .iter()
        .find(|layer| layer.spec.scaled)
        .or_else(|| layers.first())?;
    let (width, height) = base.raster.dimensions();

    let mut canvas = Raster::new(width, height);
    let zoom = Transform::about_center(scale, width, height);

    for layer in layers {
        let transform = if layer.spec.scaled { zoom } else { Transform::identity() };
        paint(&mut canvas, &layer.raster, transform);
    }

    Some(canvas)
}

fn paint(canvas: &mut Raster, layer: &Raster, transform: Transform) {
    let (lw, lh) = layer.dimensions();
    if lw == 0 || lh == 0 {
        return;
    }

    if transform.is_identity() {
        imageops::overlay(canvas, layer, 0, 0);
        return;
    }

    let max_u = lw as f32 - 0.5;
    let max_v = lh as f32 - 0.5;
    for (x, y, dst) in canvas.enumerate_pixels_mut() {
        let (u, v) = transform.inverse(x, y);
        if u < -0.5 || v < -0.5 || u >= max_u || v >= max_v {
            continue;
        }
        let src = sample_bilinear(layer, u, v);
        if src[3] > 0 {
            dst.blend(&src);
        }
    }
}

/// Bilinear sample with premultiplied alpha, edges clamped.
fn sample_bilinear(image: &Raster, u: f32, v: f32) -> Rgba<u8> {
    let (w, h) = image.dimensions();
    let x0 = u.floor();
    let y0 = v.floor();
    let fx = u - x0;
    let fy = v - y0;

    let clamp_x = |x: f32| x.clamp(0.0, (w - 1) as f32) as u32;
    let clamp_y = |y: f32| y.clamp(0.0, (h - 1) as f32) as u32;
    let (xa, xb) = (clamp_x(x0), clamp_x(x0 + 1.0));
    let (ya, yb) = (clamp_y(y0), clamp_y(y0 + 1.0));

    let taps = [
        (xa, ya, (1.0 - fx) * (1.0 - fy)),
        (xb, ya, fx * (1.0 - fy)),
        (xa, yb, (1.0 - fx) * fy),
        (xb, yb, fx * fy),
    ];

    let mut acc = [0.0f32; 4];
    for (x, y, weight) in taps {
        let p = image.get_pixel(x, y);
        let alpha = f32::from(p[3]) * weight;
        acc[0] += f32::from(p[0]) * alpha;
        acc[1] += f32::from(p[1]) * alpha;
        acc[2] += f32::from(p[2]) * alpha;
        acc[3] += alpha;
    }

    if acc[3] <= f32::EPSILON {
        return Rgba([0, 0, 0, 0]);
    }
    let channel = |c: f32| (c / acc[3]).round().clamp(0.0, 255.0) as u8;
    Rgba([
        channel(acc[0]),
        channel(acc[1]),
        channel(acc[2]),
        acc[3].round().clamp(0.0, 255.0) as u8,
    ])
}
