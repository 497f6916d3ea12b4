use std::sync::Arc;

use bytes::Bytes;
use chatmedia_contracts::config::MediaLimits;
use chatmedia_contracts::media::{IntakeError, MediaFile, ValidationOutcome};
use chrono::Utc;
use tracing::{debug, warn};

use crate::codec::{EncodeTarget, ImageCodec};
use crate::probe::{probe_dimensions, Dimensions, ImageProbe};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recompressed {
    pub file: MediaFile,
    pub dimensions: Dimensions,
}

/// Brings an image within the per-file and session budgets with at most one
/// corrective re-encode. A result still over budget after that pass is a
/// definitive rejection.
#[derive(Clone)]
pub struct AdaptiveCompressor {
    limits: MediaLimits,
    probe: Arc<dyn ImageProbe>,
    codec: Arc<dyn ImageCodec>,
}

impl AdaptiveCompressor {
    pub fn new(limits: MediaLimits, probe: Arc<dyn ImageProbe>, codec: Arc<dyn ImageCodec>) -> Self {
        Self {
            limits,
            probe,
            codec,
        }
    }

    /// `min(max_file_bytes, remaining session budget)`; zero once the session
    /// is full.
    pub fn effective_budget(&self, current_total_bytes: u64) -> u64 {
        let remaining = self
            .limits
            .max_total_bytes
            .saturating_sub(current_total_bytes);
        self.limits.max_file_bytes.min(remaining)
    }

    pub async fn compress(
        &self,
        file: &MediaFile,
        current_total_bytes: u64,
    ) -> anyhow::Result<ValidationOutcome> {
        let budget = self.effective_budget(current_total_bytes);
        if budget == 0 {
            return Ok(IntakeError::TotalTooLarge.into());
        }

        if file.size() > budget {
            debug!(file = %file.name, size = file.size(), budget, "re-encoding over byte budget");
            let target = EncodeTarget {
                max_bytes: budget,
                max_edge: Some(self.limits.max_edge),
                max_pixels: None,
            };
            return Ok(match self.recompress(file, target).await {
                Ok(out) if out.file.size() <= budget => ValidationOutcome::compressed(out.file),
                Ok(_) => IntakeError::FileTooLarge.into(),
                Err(reason) => reason.into(),
            });
        }

        let dims = probe_dimensions(self.probe.clone(), file.bytes.clone()).await?;
        let Some(dims) = dims.filter(|dims| !dims.is_empty()) else {
            return Ok(IntakeError::InvalidDimensions.into());
        };

        if dims.longest_edge() > self.limits.max_edge {
            debug!(file = %file.name, edge = dims.longest_edge(), "re-encoding to fit edge");
            let target = EncodeTarget {
                max_bytes: budget,
                max_edge: Some(self.limits.max_edge),
                max_pixels: None,
            };
            return Ok(match self.recompress(file, target).await {
                Ok(out) if out.file.size() <= budget => ValidationOutcome::compressed(out.file),
                Ok(_) => IntakeError::FileTooLarge.into(),
                Err(reason) => reason.into(),
            });
        }

        if dims.pixels() > self.limits.max_pixels {
            debug!(file = %file.name, pixels = dims.pixels(), "re-encoding to fit pixel budget");
            let target = EncodeTarget {
                max_bytes: budget,
                max_edge: None,
                max_pixels: Some(self.limits.max_pixels),
            };
            return Ok(match self.recompress(file, target).await {
                Ok(out) if out.dimensions.pixels() > self.limits.max_pixels => {
                    IntakeError::PixelsTooLarge.into()
                }
                Ok(out) if out.file.size() > budget => IntakeError::FileTooLarge.into(),
                Ok(out) => ValidationOutcome::compressed(out.file),
                Err(reason) => reason.into(),
            });
        }

        Ok(ValidationOutcome::accepted())
    }

    /// One codec pass on the blocking pool. Codec errors and panics both
    /// surface as `CompressionFailed`.
    pub async fn recompress(
        &self,
        file: &MediaFile,
        target: EncodeTarget,
    ) -> Result<Recompressed, IntakeError> {
        let codec = self.codec.clone();
        let bytes = file.bytes.clone();
        let joined = tokio::task::spawn_blocking(move || codec.encode(&bytes, &target)).await;

        let encoded = match joined {
            Ok(Ok(encoded)) => encoded,
            Ok(Err(err)) => {
                warn!(file = %file.name, "image re-encode failed: {err:#}");
                return Err(IntakeError::CompressionFailed);
            }
            Err(err) => {
                warn!(file = %file.name, "image re-encode task failed: {err}");
                return Err(IntakeError::CompressionFailed);
            }
        };

        debug!(
            file = %file.name,
            before = file.size(),
            after = encoded.bytes.len(),
            iterations = encoded.iterations,
            "re-encoded"
        );
        Ok(Recompressed {
            file: MediaFile {
                name: file.name.clone(),
                mime_type: encoded.mime_type,
                bytes: Bytes::from(encoded.bytes),
                last_modified: Utc::now(),
            },
            dimensions: encoded.dimensions,
        })
    }
}
