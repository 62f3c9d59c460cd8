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

//! GIF decoding with per-pixel transparency.
//!
//! Radar overlays (reflectivity, county lines, highways, ...) are GIFs whose
//! transparent color index is what lets them stack on top of each other.
//! Generic decoders that hand back an opaque RGB buffer lose that, so this
//! decoder keeps its own RGBA canvas and renders each frame onto it:
//!
//! - the frame's local color table wins over the global one
//! - pixels carrying the transparent index leave the canvas untouched
//! - the previous frame's disposal method is applied before the next frame
//!   is drawn (none / keep / restore-to-background / restore-to-previous)
//!
//! Block parsing and LZW decompression are delegated to the `gif` crate in
//! indexed mode; everything involving color and alpha happens here.

use std::io::Cursor;
use std::num::NonZeroU64;

use gif::{ColorOutput, DecodeOptions, Decoder, DisposalMethod, MemoryLimit};
use image::RgbaImage;
use log::debug;
use thiserror::Error;

use crate::Raster;

const SIGNATURE_87A: &[u8; 6] = b"GIF87a";
const SIGNATURE_89A: &[u8; 6] = b"GIF89a";

/// Largest RGBA canvas a stream may ask for.
pub const MAX_CANVAS_BYTES: u64 = 64 * 1024 * 1024;

/// Per-frame buffer limit handed to the `gif` crate.
const FRAME_MEMORY_LIMIT: NonZeroU64 = NonZeroU64::MIN.saturating_add(MAX_CANVAS_BYTES - 1);

/// Errors raised while decoding image bytes.
#[derive(Debug, Error)]
pub enum FormatError {
    #[error("not a GIF stream (bad signature)")]
    Signature,

    #[error("malformed GIF stream: {0}")]
    Malformed(String),

    #[error("frame {0} has no color table")]
    MissingColorTable(usize),

    #[error("GIF stream contains no image frames")]
    NoFrames,

    #[error("logical screen {width}x{height} exceeds the canvas limit")]
    ScreenTooLarge { width: u32, height: u32 },

    #[error("image decode failed: {0}")]
    Image(#[from] image::ImageError),
}

impl From<gif::DecodingError> for FormatError {
    fn from(err: gif::DecodingError) -> Self {
        Self::Malformed(err.to_string())
    }
}

/// Region of the canvas covered by a frame, clipped to the logical screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FrameRect {
    left: u32,
    top: u32,
    width: u32,
    height: u32,
}

/// Disposal carried over from the last drawn frame.
#[derive(Debug)]
struct PendingDisposal {
    method: DisposalMethod,
    rect: FrameRect,
    /// Fill used by restore-to-background.
    background: [u8; 4],
    /// Canvas state before the frame was drawn, for restore-to-previous.
    saved: Option<Vec<u8>>,
}

/// Stateful decoder over a complete GIF byte buffer.
///
/// ```
/// # fn demo(bytes: &[u8]) -> Result<(), radar_core::FormatError> {
/// let mut decoder = radar_core::GifDecoder::read(bytes)?;
/// if let Some(frame) = decoder.next_frame()? {
///     println!("{}x{}", frame.width(), frame.height());
/// }
/// # Ok(())
/// # }
/// ```
pub struct GifDecoder<'a> {
    decoder: Decoder<Cursor<&'a [u8]>>,
    width: u32,
    height: u32,
    global_palette: Option<Vec<u8>>,
    background_index: Option<usize>,
    canvas: Vec<u8>,
    pending: Option<PendingDisposal>,
    frames_read: usize,
    delay: u16,
}

impl std::fmt::Debug for GifDecoder<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GifDecoder")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("frames_read", &self.frames_read)
            .finish_non_exhaustive()
    }
}

impl<'a> GifDecoder<'a> {
    /// Parse the header, logical screen descriptor and global color table.
    ///
    /// Frames are read lazily by [`advance`](Self::advance).
    pub fn read(bytes: &'a [u8]) -> Result<Self, FormatError> {
        let signature = bytes.get(..6).ok_or(FormatError::Signature)?;
        if signature != SIGNATURE_89A && signature != SIGNATURE_87A {
            return Err(FormatError::Signature);
        }

        let mut options = DecodeOptions::new();
        options.set_color_output(ColorOutput::Indexed);
        options.set_memory_limit(MemoryLimit::Bytes(FRAME_MEMORY_LIMIT));
        let decoder = options.read_info(Cursor::new(bytes))?;

        let width = u32::from(decoder.width());
        let height = u32::from(decoder.height());
        let canvas_size = canvas_len(width, height).ok_or(FormatError::ScreenTooLarge { width, height })?;
        let global_palette = decoder.global_palette().map(<[u8]>::to_vec);
        let background_index = decoder.bg_color();

        debug!(
            "GIF screen {}x{}, global palette: {} colors",
            width,
            height,
            global_palette.as_ref().map_or(0, |p| p.len() / 3)
        );

        Ok(Self {
            decoder,
            width,
            height,
            global_palette,
            background_index,
            canvas: vec![0; canvas_size],
            pending: None,
            frames_read: 0,
            delay: 0,
        })
    }

    /// Logical screen width.
    #[must_use]
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Logical screen height.
    #[must_use]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Number of frames rendered so far.
    #[must_use]
    pub fn frame_count(&self) -> usize {
        self.frames_read
    }

    /// Delay of the current frame in hundredths of a second.
    #[must_use]
    pub fn current_delay(&self) -> u16 {
        self.delay
    }

    /// Move to the next frame and render it onto the canvas.
    ///
    /// Returns `Ok(false)` once the trailer has been reached.
    pub fn advance(&mut self) -> Result<bool, FormatError> {
        self.apply_disposal();

        let frame_index = self.frames_read;
        let Some(frame) = self.decoder.read_next_frame()? else {
            return Ok(false);
        };

        let rect = clip_rect(
            u32::from(frame.left),
            u32::from(frame.top),
            u32::from(frame.width),
            u32::from(frame.height),
            self.width,
            self.height,
        );

        let palette = frame
            .palette
            .as_deref()
            .or(self.global_palette.as_deref())
            .ok_or(FormatError::MissingColorTable(frame_index))?;

        let dispose = frame.dispose;
        let delay = frame.delay;
        let saved = (dispose == DisposalMethod::Previous).then(|| self.canvas.clone());
        let background = background_fill(frame.transparent, self.background_index, self.global_palette.as_deref());

        let screen_width = self.width;
        let frame_width = usize::from(frame.width);
        for y in 0..rect.height {
            let src_row = (y + rect.top - u32::from(frame.top)) as usize;
            for x in 0..rect.width {
                let src_col = (x + rect.left - u32::from(frame.left)) as usize;
                let Some(&index) = frame.buffer.get(src_row * frame_width + src_col) else {
                    continue;
                };
                if frame.transparent == Some(index) {
                    continue;
                }
                let offset = usize::from(index) * 3;
                let Some(rgb) = palette.get(offset..offset + 3) else {
                    continue;
                };
                let dst = (((rect.top + y) * screen_width + rect.left + x) * 4) as usize;
                self.canvas[dst..dst + 4].copy_from_slice(&[rgb[0], rgb[1], rgb[2], 255]);
            }
        }

        self.pending = Some(PendingDisposal {
            method: dispose,
            rect,
            background,
            saved,
        });
        self.delay = delay;
        self.frames_read += 1;
        Ok(true)
    }

    /// Advance and return the rendered canvas, or `None` past the last frame.
    pub fn next_frame(&mut self) -> Result<Option<Raster>, FormatError> {
        if self.advance()? {
            Ok(Some(self.canvas_image()))
        } else {
            Ok(None)
        }
    }

    fn canvas_image(&self) -> Raster {
        // Canvas length is always width * height * 4.
        RgbaImage::from_raw(self.width, self.height, self.canvas.clone())
            .unwrap_or_else(|| RgbaImage::new(self.width, self.height))
    }

    fn pixel_offset(&self, x: u32, y: u32) -> usize {
        ((y * self.width + x) * 4) as usize
    }

    fn apply_disposal(&mut self) {
        let Some(pending) = self.pending.take() else {
            return;
        };

        match pending.method {
            DisposalMethod::Any | DisposalMethod::Keep => {}
            DisposalMethod::Background => {
                for y in pending.rect.top..pending.rect.top + pending.rect.height {
                    for x in pending.rect.left..pending.rect.left + pending.rect.width {
                        let dst = self.pixel_offset(x, y);
                        self.canvas[dst..dst + 4].copy_from_slice(&pending.background);
                    }
                }
            }
            DisposalMethod::Previous => {
                if let Some(saved) = pending.saved {
                    for y in pending.rect.top..pending.rect.top + pending.rect.height {
                        let start = self.pixel_offset(pending.rect.left, y);
                        let end = start + (pending.rect.width * 4) as usize;
                        self.canvas[start..end].copy_from_slice(&saved[start..end]);
                    }
                }
            }
        }
    }
}

/// Decode only the first frame of a GIF, which is all a static overlay needs.
pub fn decode_first_frame(bytes: &[u8]) -> Result<Raster, FormatError> {
    GifDecoder::read(bytes)?
        .next_frame()?
        .ok_or(FormatError::NoFrames)
}

/// RGBA byte length of a `width` x `height` canvas, if within the limit.
fn canvas_len(width: u32, height: u32) -> Option<usize> {
    (width as usize)
        .checked_mul(height as usize)?
        .checked_mul(4)
        .filter(|&len| len as u64 <= MAX_CANVAS_BYTES)
}

fn clip_rect(left: u32, top: u32, width: u32, height: u32, screen_w: u32, screen_h: u32) -> FrameRect {
    let left = left.min(screen_w);
    let top = top.min(screen_h);
    FrameRect {
        left,
        top,
        width: width.min(screen_w - left),
        height: height.min(screen_h - top),
    }
}

/// Restore-to-background clears to transparent when the frame uses
/// transparency, otherwise fills with the screen's background color.
fn background_fill(transparent: Option<u8>, background_index: Option<usize>, global: Option<&[u8]>) -> [u8; 4] {
    if transparent.is_some() {
        return [0, 0, 0, 0];
    }
    match (background_index, global) {
        (Some(index), Some(palette)) => palette
            .get(index * 3..index * 3 + 3)
            .map_or([0, 0, 0, 0], |rgb| [rgb[0], rgb[1], rgb[2], 255]),
        _ => [0, 0, 0, 0],
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::borrow::Cow;

    use gif::{DisposalMethod, Encoder, Frame};

    /// Black, white, red, green.
    pub const PALETTE: [u8; 12] = [0, 0, 0, 255, 255, 255, 255, 0, 0, 0, 255, 0];

    pub struct FrameSpec<'a> {
        pub left: u16,
        pub top: u16,
        pub width: u16,
        pub height: u16,
        pub indices: &'a [u8],
        pub transparent: Option<u8>,
        pub dispose: DisposalMethod,
    }

    impl<'a> FrameSpec<'a> {
        pub fn full(width: u16, height: u16, indices: &'a [u8]) -> Self {
            Self {
                left: 0,
                top: 0,
                width,
                height,
                indices,
                transparent: None,
                dispose: DisposalMethod::Keep,
            }
        }
    }

    pub fn encode_gif(width: u16, height: u16, frames: &[FrameSpec<'_>]) -> Vec<u8> {
        let mut bytes = Vec::new();
        {
            let mut encoder = Encoder::new(&mut bytes, width, height, &PALETTE).unwrap();
            for spec in frames {
                let frame = Frame {
                    left: spec.left,
                    top: spec.top,
                    width: spec.width,
                    height: spec.height,
                    transparent: spec.transparent,
                    dispose: spec.dispose,
                    buffer: Cow::Borrowed(spec.indices),
                    ..Frame::default()
                };
                encoder.write_frame(&frame).unwrap();
            }
        }
        bytes
    }
}
