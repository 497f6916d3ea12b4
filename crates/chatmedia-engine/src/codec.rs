use anyhow::{Context, Result};
use chatmedia_contracts::config::CompressionSettings;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, Rgb, RgbImage};

use crate::probe::Dimensions;

/// What a re-encode pass is asked to reach. `max_edge` and `max_pixels` are
/// ceilings on the output geometry; `max_bytes` is the size the encoder
/// iterates towards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodeTarget {
    pub max_bytes: u64,
    pub max_edge: Option<u32>,
    pub max_pixels: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Encoded {
    pub bytes: Vec<u8>,
    pub mime_type: String,
    pub dimensions: Dimensions,
    pub iterations: u32,
}

pub trait ImageCodec: Send + Sync {
    /// Best effort: returns the last attempt even when it is still over
    /// `target.max_bytes`. Errors mean the payload could not be decoded or
    /// encoded at all.
    fn encode(&self, bytes: &[u8], target: &EncodeTarget) -> Result<Encoded>;
}

/// Decodes with the `image` crate, flattens alpha onto white and re-encodes
/// as JPEG, lowering quality and scale on each iteration until the output
/// fits or the iteration ceiling is hit.
#[derive(Debug, Clone)]
pub struct JpegCodec {
    settings: CompressionSettings,
}

impl JpegCodec {
    pub fn new(settings: CompressionSettings) -> Self {
        Self { settings }
    }
}

impl Default for JpegCodec {
    fn default() -> Self {
        Self::new(CompressionSettings::default())
    }
}

impl ImageCodec for JpegCodec {
    fn encode(&self, bytes: &[u8], target: &EncodeTarget) -> Result<Encoded> {
        let decoded = image::load_from_memory(bytes).context("image decode failed")?;
        let source = flatten_onto_white(&decoded);
        drop(decoded);

        let (width, height) = source.dimensions();
        let max_iterations = self.settings.max_iterations.max(1);
        let min_quality = self.settings.min_quality.clamp(1, 100);
        let mut quality = self.settings.initial_quality.clamp(min_quality, 100);
        let mut scale = fit_scale(Dimensions::new(width, height), target);
        let mut iterations = 0;

        loop {
            iterations += 1;
            let dims = scaled_dimensions(Dimensions::new(width, height), scale);
            let mut out = Vec::new();
            {
                let mut encoder = JpegEncoder::new_with_quality(&mut out, quality);
                if dims.width == width && dims.height == height {
                    encoder
                        .encode_image(&source)
                        .context("jpeg encode failed")?;
                } else {
                    let resized =
                        image::imageops::resize(&source, dims.width, dims.height, FilterType::Triangle);
                    encoder
                        .encode_image(&resized)
                        .context("jpeg encode failed")?;
                }
            }

            let fits = out.len() as u64 <= target.max_bytes;
            if fits || iterations >= max_iterations {
                return Ok(Encoded {
                    bytes: out,
                    mime_type: "image/jpeg".to_string(),
                    dimensions: dims,
                    iterations,
                });
            }
            quality = quality.saturating_sub(self.settings.quality_step).max(min_quality);
            scale *= self.settings.scale_step.clamp(0.1, 0.99);
        }
    }
}

fn flatten_onto_white(image: &DynamicImage) -> RgbImage {
    if !image.color().has_alpha() {
        return image.to_rgb8();
    }
    let rgba = image.to_rgba8();
    let mut flattened = RgbImage::new(rgba.width(), rgba.height());
    for (x, y, pixel) in rgba.enumerate_pixels() {
        let alpha = u16::from(pixel[3]);
        let blend =
            |channel: u8| -> u8 { (((u16::from(channel) * alpha) + (255 * (255 - alpha))) / 255) as u8 };
        flattened.put_pixel(x, y, Rgb([blend(pixel[0]), blend(pixel[1]), blend(pixel[2])]));
    }
    flattened
}

pub fn fit_scale(dims: Dimensions, target: &EncodeTarget) -> f64 {
    let mut scale = 1.0f64;
    if let Some(edge) = target.max_edge {
        let longest = dims.longest_edge();
        if edge > 0 && longest > edge {
            scale = scale.min(f64::from(edge) / f64::from(longest));
        }
    }
    if let Some(max_pixels) = target.max_pixels {
        let pixels = dims.pixels();
        if max_pixels > 0 && pixels > max_pixels {
            scale = scale.min((max_pixels as f64 / pixels as f64).sqrt());
        }
    }
    scale
}

pub fn scaled_dimensions(dims: Dimensions, scale: f64) -> Dimensions {
    if scale >= 1.0 {
        return dims;
    }
    let shrink = |value: u32| ((f64::from(value) * scale).floor() as u32).max(1);
    Dimensions::new(shrink(dims.width), shrink(dims.height))
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use image::{ImageFormat, Rgba, RgbaImage};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    use crate::probe::{HeaderProbe, ImageProbe};

    use super::*;

    fn noise_png(width: u32, height: u32, seed: u64) -> anyhow::Result<Vec<u8>> {
        let mut rng = StdRng::seed_from_u64(seed);
        let image = RgbImage::from_fn(width, height, |_, _| Rgb([rng.gen(), rng.gen(), rng.gen()]));
        let mut out = Cursor::new(Vec::new());
        image.write_to(&mut out, ImageFormat::Png)?;
        Ok(out.into_inner())
    }

    #[test]
    fn fit_scale_honours_edge_and_pixel_ceilings() {
        let dims = Dimensions::new(12000, 8000);
        let edge_only = EncodeTarget {
            max_bytes: 1,
            max_edge: Some(8192),
            max_pixels: None,
        };
        let fitted = scaled_dimensions(dims, fit_scale(dims, &edge_only));
        assert!((8191..=8192).contains(&fitted.longest_edge()));

        let pixels_only = EncodeTarget {
            max_bytes: 1,
            max_edge: None,
            max_pixels: Some(16_000_000),
        };
        let fitted = scaled_dimensions(dims, fit_scale(dims, &pixels_only));
        assert!(fitted.pixels() <= 16_000_000);
        assert!(fitted.pixels() > 15_900_000);

        let small = Dimensions::new(640, 480);
        assert_eq!(fit_scale(small, &edge_only), 1.0);
    }

    #[test]
    fn jpeg_codec_resizes_to_edge_and_flattens_alpha() -> anyhow::Result<()> {
        let image = RgbaImage::from_pixel(400, 100, Rgba([255, 0, 0, 0]));
        let mut png = Cursor::new(Vec::new());
        image.write_to(&mut png, ImageFormat::Png)?;

        let encoded = JpegCodec::default().encode(
            &png.into_inner(),
            &EncodeTarget {
                max_bytes: 1024 * 1024,
                max_edge: Some(200),
                max_pixels: None,
            },
        )?;
        assert_eq!(encoded.mime_type, "image/jpeg");
        assert_eq!(encoded.dimensions, Dimensions::new(200, 50));
        assert_eq!(encoded.iterations, 1);
        assert_eq!(
            HeaderProbe.dimensions(&encoded.bytes)?,
            Some(Dimensions::new(200, 50))
        );

        let decoded = image::load_from_memory(&encoded.bytes)?.to_rgb8();
        let center = decoded.get_pixel(100, 25);
        assert!(center[0] > 240 && center[1] > 240 && center[2] > 240);
        Ok(())
    }

    #[test]
    fn jpeg_codec_stops_at_iteration_ceiling_with_last_attempt() -> anyhow::Result<()> {
        let png = noise_png(320, 240, 7)?;
        let codec = JpegCodec::new(CompressionSettings {
            max_iterations: 3,
            ..CompressionSettings::default()
        });
        let encoded = codec.encode(
            &png,
            &EncodeTarget {
                max_bytes: 16,
                max_edge: None,
                max_pixels: None,
            },
        )?;
        assert_eq!(encoded.iterations, 3);
        assert!(encoded.bytes.len() > 16);
        assert!(encoded.dimensions.width < 320);
        Ok(())
    }

    #[test]
    fn jpeg_codec_shrinks_noise_under_budget() -> anyhow::Result<()> {
        let png = noise_png(512, 512, 42)?;
        let first_pass = JpegCodec::new(CompressionSettings {
            max_iterations: 1,
            ..CompressionSettings::default()
        })
        .encode(
            &png,
            &EncodeTarget {
                max_bytes: u64::MAX,
                max_edge: None,
                max_pixels: None,
            },
        )?;

        let budget = first_pass.bytes.len() as u64 / 2;
        let encoded = JpegCodec::default().encode(
            &png,
            &EncodeTarget {
                max_bytes: budget,
                max_edge: None,
                max_pixels: None,
            },
        )?;
        assert!(encoded.bytes.len() as u64 <= budget);
        assert!(encoded.iterations > 1);
        Ok(())
    }

    #[test]
    fn jpeg_codec_rejects_undecodable_payload() {
        let err = JpegCodec::default()
            .encode(
                b"nope",
                &EncodeTarget {
                    max_bytes: 10,
                    max_edge: None,
                    max_pixels: None,
                },
            )
            .unwrap_err();
        assert!(format!("{err:#}").contains("image decode failed"));
    }
}
