//! Synthetic image format for exercising budgets at sizes that would be too
//! slow to decode for real: an 8-byte magic, little-endian width and height,
//! then padding up to the declared payload size.

use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{bail, Result};
use chatmedia_contracts::media::MediaFile;

use crate::codec::{fit_scale, scaled_dimensions, EncodeTarget, Encoded, ImageCodec};
use crate::probe::{Dimensions, ImageProbe};

const MAGIC: &[u8; 8] = b"FAKEIMG\0";
const HEADER_LEN: usize = 16;

pub fn fake_payload(width: u32, height: u32, size: usize) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(size.max(HEADER_LEN));
    bytes.extend_from_slice(MAGIC);
    bytes.extend_from_slice(&width.to_le_bytes());
    bytes.extend_from_slice(&height.to_le_bytes());
    bytes.resize(size.max(HEADER_LEN), 0);
    bytes
}

pub fn fake_image(name: &str, width: u32, height: u32, size: usize) -> MediaFile {
    MediaFile::new(name, "image/png", fake_payload(width, height, size))
}

fn read_header(bytes: &[u8]) -> Option<Dimensions> {
    if bytes.len() < HEADER_LEN || &bytes[..8] != MAGIC {
        return None;
    }
    let width = u32::from_le_bytes(bytes[8..12].try_into().ok()?);
    let height = u32::from_le_bytes(bytes[12..16].try_into().ok()?);
    Some(Dimensions::new(width, height))
}

#[derive(Debug, Default)]
pub struct FakeProbe {
    pub calls: AtomicUsize,
}

impl FakeProbe {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ImageProbe for FakeProbe {
    fn dimensions(&self, bytes: &[u8]) -> Result<Option<Dimensions>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(read_header(bytes))
    }
}

pub struct BrokenProbe;

impl ImageProbe for BrokenProbe {
    fn dimensions(&self, _bytes: &[u8]) -> Result<Option<Dimensions>> {
        bail!("image decoding is unavailable")
    }
}

/// Encoder whose output size is `pixels * bytes_per_pixel`; each iteration
/// shrinks the scale by 10% until the output fits or `max_iterations` runs
/// out. `ignore_geometry` makes it keep the source size, to model an encoder
/// that cannot meet a pixel target.
#[derive(Debug)]
pub struct FakeCodec {
    pub bytes_per_pixel: f64,
    pub max_iterations: u32,
    pub ignore_geometry: bool,
    pub calls: AtomicUsize,
}

impl FakeCodec {
    pub fn new(bytes_per_pixel: f64) -> Self {
        Self {
            bytes_per_pixel,
            max_iterations: 10,
            ignore_geometry: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ImageCodec for FakeCodec {
    fn encode(&self, bytes: &[u8], target: &EncodeTarget) -> Result<Encoded> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let Some(source) = read_header(bytes) else {
            bail!("not a fake image");
        };
        let mut scale = if self.ignore_geometry {
            1.0
        } else {
            fit_scale(source, target)
        };
        let mut iterations = 0;
        loop {
            iterations += 1;
            let dims = scaled_dimensions(source, scale);
            let size = (dims.pixels() as f64 * self.bytes_per_pixel) as usize;
            if size as u64 <= target.max_bytes || iterations >= self.max_iterations {
                return Ok(Encoded {
                    bytes: fake_payload(dims.width, dims.height, size),
                    mime_type: "image/jpeg".to_string(),
                    dimensions: dims,
                    iterations,
                });
            }
            if !self.ignore_geometry {
                scale *= 0.9;
            }
        }
    }
}

pub struct FailingCodec;

impl ImageCodec for FailingCodec {
    fn encode(&self, _bytes: &[u8], _target: &EncodeTarget) -> Result<Encoded> {
        bail!("encoder crashed")
    }
}
