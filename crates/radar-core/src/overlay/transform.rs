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

//! Uniform scale-plus-translate transform used for the center zoom.

/// Maps layer pixel `(u, v)` to canvas pixel `(u * scale + tx, v * scale + ty)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub scale: f32,
    pub tx: f32,
    pub ty: f32,
}

impl Default for Transform {
    fn default() -> Self {
        Self::identity()
    }
}

impl Transform {
    #[must_use]
    pub const fn identity() -> Self {
        Self {
            scale: 1.0,
            tx: 0.0,
            ty: 0.0,
        }
    }

    /// Zoom by `scale` about the center of a `width` x `height` canvas.
    ///
    /// Scales at or below 1.0, and non-finite scales, collapse to the identity.
    #[must_use]
    pub fn about_center(scale: f32, width: u32, height: u32) -> Self {
        if !scale.is_finite() || scale <= 1.0 {
            return Self::identity();
        }
        let w = width as f32;
        let h = height as f32;
        Self {
            scale,
            tx: (w - scale * w) / 2.0,
            ty: (h - scale * h) / 2.0,
        }
    }

    #[must_use]
    pub fn is_identity(&self) -> bool {
        *self == Self::identity()
    }

    /// Layer coordinates of the canvas pixel center `(x, y)`.
    #[must_use]
    pub fn inverse(&self, x: u32, y: u32) -> (f32, f32) {
        let u = (x as f32 + 0.5 - self.tx) / self.scale - 0.5;
        let v = (y as f32 + 0.5 - self.ty) / self.scale - 0.5;
        (u, v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_scales_clamp_to_identity() {
        assert!(Transform::about_center(1.0, 600, 550).is_identity());
        assert!(Transform::about_center(0.25, 600, 550).is_identity());
        assert!(Transform::about_center(f32::NAN, 600, 550).is_identity());
    }

    #[test]
    fn test_infinite_scale_is_identity() {
        let t = Transform::about_center(f32::INFINITY, 600, 550);
        assert!(t.is_identity());
        assert_eq!(t.inverse(10, 20), (10.0, 20.0));
    }

    #[test]
    fn test_center_zoom_offsets() {
        let t = Transform::about_center(2.0, 600, 550);
        assert_eq!(t.scale, 2.0);
        assert_eq!(t.tx, -300.0);
        assert_eq!(t.ty, -275.0);
    }

    #[test]
    fn test_inverse_zooms_into_center() {
        let t = Transform::about_center(2.0, 600, 550);
        let (u, v) = t.inverse(300, 275);
        // The canvas midpoint (300, 275) stays put, so its neighbouring pixel centers land just beside it.
        assert!((u - 299.75).abs() < 1e-4);
        assert!((v - 274.75).abs() < 1e-4);

        let (u0, v0) = t.inverse(0, 0);
        assert!((u0 - 149.75).abs() < 1e-4);
        assert!((v0 - 137.25).abs() < 1e-4);
    }

    #[test]
    fn test_identity_inverse_is_exact() {
        let t = Transform::identity();
        assert_eq!(t.inverse(17, 3), (17.0, 3.0));
    }
}
