pub mod accumulator;
pub mod codec;
pub mod composer;
pub mod compressor;
pub mod pressure;
pub mod probe;
pub mod signals;
pub mod validator;

#[cfg(test)]
mod test_support;

use std::sync::Arc;

use anyhow::Result;
use chatmedia_contracts::config::{MediaLimits, PipelineConfig};
use chatmedia_contracts::events::{EventKind, EventPayload, EventWriter};
use chatmedia_contracts::media::{IntakeError, MediaFile, ValidationOutcome};
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

pub use accumulator::{accumulate, build_from_fragments, collect_stream, StreamPartAccumulator};
pub use codec::{EncodeTarget, Encoded, ImageCodec, JpegCodec};
pub use composer::{AttachmentComposer, IntakeReport, Resolution};
pub use compressor::{AdaptiveCompressor, Recompressed};
pub use pressure::{alert_copy, image_megabytes, AlertCopy, MemoryPressureMonitor};
pub use probe::{Dimensions, HeaderProbe, ImageProbe};
pub use signals::DeviceSignals;
pub use validator::MediaIntakeValidator;

#[derive(Clone)]
pub struct MediaPipeline {
    validator: MediaIntakeValidator,
    compressor: AdaptiveCompressor,
    events: Option<EventWriter>,
}

impl MediaPipeline {
    pub fn new(limits: MediaLimits, probe: Arc<dyn ImageProbe>, codec: Arc<dyn ImageCodec>) -> Self {
        Self {
            validator: MediaIntakeValidator::new(limits.clone(), probe.clone()),
            compressor: AdaptiveCompressor::new(limits, probe, codec),
            events: None,
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(
            config.limits.clone(),
            Arc::new(HeaderProbe),
            Arc::new(JpegCodec::new(config.compression.clone())),
        )
    }

    pub fn with_events(mut self, events: EventWriter) -> Self {
        self.events = Some(events);
        self
    }

    pub async fn process(&self, file: &MediaFile, current_total_bytes: u64) -> Result<ValidationOutcome> {
        let screened = self.validator.validate(file, current_total_bytes).await?;
        let outcome = match screened.rejection() {
            Some(reason) if reason.is_compressible() => {
                debug!(file = %file.name, reason = reason.code(), "routing to compressor");
                self.compressor.compress(file, current_total_bytes).await?
            }
            _ => screened,
        };
        self.record(file, &outcome);
        Ok(outcome)
    }

    fn record(&self, file: &MediaFile, outcome: &ValidationOutcome) {
        let (kind, payload) = match outcome {
            ValidationOutcome::Accepted {
                replacement: Some(compressed),
                ..
            } => {
                info!(
                    file = %file.name,
                    before = file.size(),
                    after = compressed.size(),
                    "attachment compressed"
                );
                (
                    EventKind::AttachmentCompressed,
                    map_object(json!({
                        "file": file.name,
                        "original_bytes": file.size(),
                        "final_bytes": compressed.size(),
                        "mime_type": compressed.mime_type,
                    })),
                )
            }
            ValidationOutcome::Accepted { .. } => (
                EventKind::AttachmentAccepted,
                map_object(json!({
                    "file": file.name,
                    "bytes": file.size(),
                    "mime_type": file.mime_type,
                })),
            ),
            ValidationOutcome::Rejected(reason) => {
                info!(file = %file.name, reason = reason.code(), "attachment rejected");
                (EventKind::AttachmentRejected, rejection_payload(file, *reason))
            }
        };
        if let Some(events) = &self.events {
            if let Err(err) = events.emit(kind, payload) {
                warn!(file = %file.name, event = %kind, "failed to record event: {err:#}");
            }
        }
    }
}

fn rejection_payload(file: &MediaFile, reason: IntakeError) -> EventPayload {
    map_object(json!({
        "file": file.name,
        "bytes": file.size(),
        "reason": reason.code(),
    }))
}

pub(crate) fn map_object(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}
