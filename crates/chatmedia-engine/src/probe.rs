use std::io::Cursor;
use std::sync::Arc;

use anyhow::Context;
use bytes::Bytes;
use image::ImageReader;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn pixels(self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }

    pub fn longest_edge(self) -> u32 {
        self.width.max(self.height)
    }

    pub fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Reads image dimensions without decoding pixel data.
pub trait ImageProbe: Send + Sync {
    /// `Ok(None)` when the payload is not a decodable image; `Err` only when
    /// the probe itself is unusable.
    fn dimensions(&self, bytes: &[u8]) -> anyhow::Result<Option<Dimensions>>;
}

/// Header probe backed by the `image` crate's format sniffing.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeaderProbe;

impl ImageProbe for HeaderProbe {
    fn dimensions(&self, bytes: &[u8]) -> anyhow::Result<Option<Dimensions>> {
        let reader = ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .context("image format sniffing failed")?;
        if reader.format().is_none() {
            debug!("unrecognised image format");
            return Ok(None);
        }
        match reader.into_dimensions() {
            Ok((width, height)) => Ok(Some(Dimensions::new(width, height))),
            Err(err) => {
                debug!("image header decode failed: {err}");
                Ok(None)
            }
        }
    }
}

/// Runs `probe` on the blocking pool so the caller's task only suspends.
pub async fn probe_dimensions(
    probe: Arc<dyn ImageProbe>,
    bytes: Bytes,
) -> anyhow::Result<Option<Dimensions>> {
    tokio::task::spawn_blocking(move || probe.dimensions(&bytes))
        .await
        .context("image probe task failed")?
}
