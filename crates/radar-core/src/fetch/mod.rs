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

//! Overlay image download and decode.
//!
//! The whole response body is buffered before decoding: GIF transparency is
//! resolved against the complete byte stream, never a partial one.

use std::time::Duration;

use async_trait::async_trait;
use image::ImageFormat;
use log::debug;
use reqwest::Client;
use thiserror::Error;

use crate::decoder::{self, FormatError};
use crate::overlay::OverlayFormat;
use crate::Raster;

/// Default per-request timeout for overlay downloads.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(15);

/// Largest overlay body accepted from a server.
pub const MAX_OVERLAY_BYTES: usize = 16 * 1024 * 1024;

/// Errors that can occur while fetching one overlay.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("{url} body exceeds {limit} bytes")]
    TooLarge { url: String, limit: usize },

    #[error("could not decode {url}: {source}")]
    Format {
        url: String,
        #[source]
        source: FormatError,
    },
}

/// Anything that can turn an overlay URL into a decoded raster.
#[async_trait]
pub trait ImageSource: Send + Sync {
    async fn fetch(&self, url: &str, format: OverlayFormat) -> Result<Raster, FetchError>;
}

/// Decode a complete byte buffer according to its overlay format.
pub fn decode(bytes: &[u8], format: OverlayFormat) -> Result<Raster, FormatError> {
    match format {
        OverlayFormat::Gif => decoder::decode_first_frame(bytes),
        OverlayFormat::Jpeg => {
            let image = image::load_from_memory_with_format(bytes, ImageFormat::Jpeg)?;
            Ok(image.to_rgba8())
        }
    }
}

/// HTTP overlay fetcher.
#[derive(Debug, Clone)]
pub struct ImageFetcher {
    client: Client,
    max_bytes: usize,
}

impl ImageFetcher {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            max_bytes: MAX_OVERLAY_BYTES,
        })
    }

    /// Override the body size limit (default [`MAX_OVERLAY_BYTES`]).
    #[must_use]
    pub fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    /// Download the full body of `url` into memory.
    pub async fn download(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let request_error = |source| FetchError::Request {
            url: url.to_string(),
            source,
        };

        let mut response = self.client.get(url).send().await.map_err(request_error)?;
        if !response.status().is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }

        let too_large = || FetchError::TooLarge {
            url: url.to_string(),
            limit: self.max_bytes,
        };

        let declared = response.content_length().unwrap_or(0);
        if declared > self.max_bytes as u64 {
            return Err(too_large());
        }

        let mut bytes = Vec::with_capacity(declared as usize);
        while let Some(chunk) = response.chunk().await.map_err(request_error)? {
            if bytes.len() + chunk.len() > self.max_bytes {
                return Err(too_large());
            }
            bytes.extend_from_slice(&chunk);
        }

        debug!("Downloaded {} bytes from {}", bytes.len(), url);
        Ok(bytes)
    }
}

#[async_trait]
impl ImageSource for ImageFetcher {
    async fn fetch(&self, url: &str, format: OverlayFormat) -> Result<Raster, FetchError> {
        let bytes = self.download(url).await?;
        decode(&bytes, format).map_err(|source| FetchError::Format {
            url: url.to_string(),
            source,
        })
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    /// Serves canned rasters by URL; anything else is a 404.
    #[derive(Debug, Default)]
    pub struct StubSource {
        rasters: HashMap<String, Raster>,
        requests: AtomicUsize,
    }

    impl StubSource {
        pub fn insert(&mut self, url: String, raster: Raster) {
            self.rasters.insert(url, raster);
        }

        pub fn request_count(&self) -> usize {
            self.requests.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ImageSource for StubSource {
        async fn fetch(&self, url: &str, _format: OverlayFormat) -> Result<Raster, FetchError> {
            self.requests.fetch_add(1, Ordering::SeqCst);
            self.rasters.get(url).cloned().ok_or_else(|| FetchError::Status {
                url: url.to_string(),
                status: 404,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use image::{DynamicImage, RgbImage};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    use super::*;
    use crate::decoder::test_support::{encode_gif, FrameSpec};

    /// Answer one HTTP request with a canned response, then close.
    async fn serve_once(response: &'static [u8]) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 2048];
            let _ = socket.read(&mut request).await;
            let _ = socket.write_all(response).await;
            let _ = socket.shutdown().await;
        });
        format!("http://{addr}/overlay.gif")
    }

    fn local_fetcher(max_bytes: usize) -> ImageFetcher {
        ImageFetcher {
            client: Client::builder()
                .no_proxy()
                .timeout(Duration::from_secs(5))
                .build()
                .unwrap(),
            max_bytes,
        }
    }

    #[tokio::test]
    async fn test_download_reads_full_body() {
        let url = serve_once(b"HTTP/1.1 200 OK\r\nContent-Length: 6\r\nConnection: close\r\n\r\nabcdef").await;
        let bytes = local_fetcher(MAX_OVERLAY_BYTES).download(&url).await.unwrap();
        assert_eq!(bytes, b"abcdef");
    }

    #[tokio::test]
    async fn test_forged_content_length_is_too_large() {
        let url = serve_once(
            b"HTTP/1.1 200 OK\r\nContent-Length: 9000000000000000000\r\nConnection: close\r\n\r\nabcdef",
        )
        .await;
        let err = local_fetcher(MAX_OVERLAY_BYTES).download(&url).await.unwrap_err();
        assert!(matches!(err, FetchError::TooLarge { limit, .. } if limit == MAX_OVERLAY_BYTES));
    }

    #[tokio::test]
    async fn test_body_past_limit_is_too_large() {
        // No Content-Length: the body runs until the connection closes.
        let url = serve_once(b"HTTP/1.1 200 OK\r\nConnection: close\r\n\r\n0123456789abcdef0123456789abcdef").await;
        let err = local_fetcher(8).download(&url).await.unwrap_err();
        assert!(matches!(err, FetchError::TooLarge { limit: 8, .. }));
    }

    #[tokio::test]
    async fn test_error_status_is_reported() {
        let url = serve_once(b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n").await;
        let err = local_fetcher(MAX_OVERLAY_BYTES).download(&url).await.unwrap_err();
        assert!(matches!(err, FetchError::Status { status: 404, .. }));
    }

    #[test]
    fn test_decode_jpeg_is_opaque_rgba() {
        let rgb = RgbImage::from_pixel(8, 6, image::Rgb([40, 90, 200]));
        let mut bytes = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(rgb)
            .write_to(&mut bytes, ImageFormat::Jpeg)
            .unwrap();

        let raster = decode(bytes.get_ref(), OverlayFormat::Jpeg).unwrap();
        assert_eq!(raster.dimensions(), (8, 6));
        assert!(raster.pixels().all(|p| p[3] == 255));
    }

    #[test]
    fn test_decode_gif_routes_through_gif_decoder() {
        let indices = [1, 2];
        let mut spec = FrameSpec::full(2, 1, &indices);
        spec.transparent = Some(1);
        let bytes = encode_gif(2, 1, &[spec]);

        let raster = decode(&bytes, OverlayFormat::Gif).unwrap();
        assert_eq!(raster.get_pixel(0, 0)[3], 0);
        assert_eq!(raster.get_pixel(1, 0).0, [255, 0, 0, 255]);
    }

    #[test]
    fn test_decode_garbage_is_format_error() {
        assert!(decode(b"definitely not an image", OverlayFormat::Jpeg).is_err());
        assert!(matches!(
            decode(b"definitely not an image", OverlayFormat::Gif),
            Err(FormatError::Signature)
        ));
    }
}
