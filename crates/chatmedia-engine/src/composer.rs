use chatmedia_contracts::config::MediaLimits;
use chatmedia_contracts::locale::{compression_notice, Locale};
use chatmedia_contracts::media::{
    Attachment, AttachmentId, IntakeError, MediaFile, PreviewHandle, PreviewRegistry,
    SubmittedAttachment, ValidationOutcome,
};
use indexmap::IndexMap;
use serde::Serialize;
use tracing::{debug, warn};

use crate::MediaPipeline;

#[derive(Debug)]
enum Slot {
    Pending {
        file_name: String,
        preview: PreviewHandle,
    },
    Ready(Attachment),
}

impl Slot {
    fn release(&mut self) {
        let preview_result = match self {
            Slot::Pending { preview, .. } => preview.release(),
            Slot::Ready(attachment) => attachment.release(),
        };
        if let Err(err) = preview_result {
            warn!("{err}");
        }
    }

    fn name(&self) -> &str {
        match self {
            Slot::Pending { file_name, .. } => file_name,
            Slot::Ready(attachment) => &attachment.file.name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Resolution {
    Accepted {
        was_compressed: bool,
        original_size: u64,
        final_size: u64,
    },
    Rejected {
        reason: IntakeError,
    },
    Discarded,
    Evicted,
    Failed {
        message: String,
    },
}

impl Resolution {
    pub fn notice(&self, file_name: &str, locale: Locale, limits: &MediaLimits) -> Option<String> {
        match self {
            Self::Accepted {
                was_compressed: true,
                original_size,
                final_size,
            } => Some(compression_notice(locale, file_name, *original_size, *final_size)),
            Self::Accepted { .. } | Self::Discarded => None,
            Self::Rejected { reason } => Some(format!("{file_name}: {}", reason.reason(locale, limits))),
            Self::Evicted => Some(match locale {
                Locale::En => format!(
                    "{file_name}: removed, only the last {} attachments are kept.",
                    limits.max_attachments.max(1)
                ),
                Locale::Zh => format!(
                    "{file_name}：已移除，最多保留最近 {} 个附件。",
                    limits.max_attachments.max(1)
                ),
            }),
            Self::Failed { .. } => Some(match locale {
                Locale::En => format!("{file_name}: could not be processed."),
                Locale::Zh => format!("{file_name}：处理失败。"),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IntakeReport {
    pub id: AttachmentId,
    pub file_name: String,
    pub resolution: Resolution,
}

/// Owns the ordered attachment list of one compose box and every preview
/// handle in it. Each removal path releases the slot's preview exactly once.
#[derive(Debug)]
pub struct AttachmentComposer {
    limits: MediaLimits,
    registry: PreviewRegistry,
    slots: IndexMap<AttachmentId, Slot>,
    next_id: u64,
}

impl AttachmentComposer {
    pub fn new(limits: MediaLimits) -> Self {
        let registry = PreviewRegistry::new(limits.inline_preview_max_bytes);
        Self::with_registry(limits, registry)
    }

    pub fn with_registry(limits: MediaLimits, registry: PreviewRegistry) -> Self {
        Self {
            limits,
            registry,
            slots: IndexMap::new(),
            next_id: 0,
        }
    }

    pub fn registry(&self) -> &PreviewRegistry {
        &self.registry
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn ids(&self) -> Vec<AttachmentId> {
        self.slots.keys().copied().collect()
    }

    pub fn is_pending(&self, id: AttachmentId) -> bool {
        matches!(self.slots.get(&id), Some(Slot::Pending { .. }))
    }

    pub fn attachments(&self) -> impl Iterator<Item = &Attachment> {
        self.slots.values().filter_map(|slot| match slot {
            Slot::Ready(attachment) => Some(attachment),
            Slot::Pending { .. } => None,
        })
    }

    pub fn get(&self, id: AttachmentId) -> Option<&Attachment> {
        match self.slots.get(&id) {
            Some(Slot::Ready(attachment)) => Some(attachment),
            _ => None,
        }
    }

    pub fn committed_bytes(&self) -> u64 {
        self.attachments().map(Attachment::size).sum()
    }

    /// Reserves a slot for `file` and shows its preview right away. The oldest
    /// slots are evicted when the list grows past `max_attachments`.
    pub fn stage(&mut self, file: &MediaFile) -> AttachmentId {
        self.next_id += 1;
        let id = AttachmentId(self.next_id);
        let preview = self.registry.acquire(file);
        self.slots.insert(
            id,
            Slot::Pending {
                file_name: file.name.clone(),
                preview,
            },
        );
        self.evict_overflow();
        id
    }

    fn evict_overflow(&mut self) {
        let max = self.limits.max_attachments.max(1);
        while self.slots.len() > max {
            if let Some((evicted, mut slot)) = self.slots.shift_remove_index(0) {
                debug!(attachment = %evicted, file = slot.name(), "evicting oldest attachment");
                slot.release();
            }
        }
    }

    /// Applies the outcome for a staged slot. Outcomes for slots that were
    /// removed meanwhile are dropped unapplied.
    pub fn resolve(
        &mut self,
        id: AttachmentId,
        original: &MediaFile,
        outcome: ValidationOutcome,
    ) -> Resolution {
        if !self.is_pending(id) {
            debug!(attachment = %id, "discarding outcome for removed attachment");
            return Resolution::Discarded;
        }
        let Some((index, _, slot)) = self.slots.shift_remove_full(&id) else {
            return Resolution::Discarded;
        };
        let Slot::Pending { mut preview, .. } = slot else {
            return Resolution::Discarded;
        };

        match outcome {
            ValidationOutcome::Accepted {
                replacement,
                was_compressed,
            } => {
                let (file, preview) = match replacement {
                    Some(compressed) => {
                        if let Err(err) = preview.release() {
                            warn!("{err}");
                        }
                        let preview = self.registry.acquire(&compressed);
                        (compressed, preview)
                    }
                    None => (original.clone(), preview),
                };
                let resolution = Resolution::Accepted {
                    was_compressed,
                    original_size: original.size(),
                    final_size: file.size(),
                };
                let attachment = Attachment::new(id, file, original.size(), was_compressed, preview);
                self.slots.shift_insert(index, id, Slot::Ready(attachment));
                resolution
            }
            ValidationOutcome::Rejected(reason) => {
                if let Err(err) = preview.release() {
                    warn!("{err}");
                }
                Resolution::Rejected { reason }
            }
        }
    }

    pub fn fail(&mut self, id: AttachmentId, error: &anyhow::Error) -> Resolution {
        if !self.remove(id) {
            return Resolution::Discarded;
        }
        warn!(attachment = %id, "attachment processing failed: {error:#}");
        Resolution::Failed {
            message: format!("{error:#}"),
        }
    }

    pub fn remove(&mut self, id: AttachmentId) -> bool {
        match self.slots.shift_remove(&id) {
            Some(mut slot) => {
                slot.release();
                true
            }
            None => false,
        }
    }

    pub fn submit(&mut self) -> Vec<SubmittedAttachment> {
        let mut submitted = Vec::new();
        for (id, slot) in self.slots.drain(..) {
            match slot {
                Slot::Ready(attachment) => match attachment.into_submission() {
                    Ok(item) => submitted.push(item),
                    Err(err) => warn!(attachment = %id, "{err}"),
                },
                Slot::Pending { mut preview, .. } => {
                    debug!(attachment = %id, "dropping in-flight attachment on submit");
                    if let Err(err) = preview.release() {
                        warn!("{err}");
                    }
                }
            }
        }
        submitted
    }

    pub fn teardown(&mut self) {
        for (_, mut slot) in self.slots.drain(..) {
            slot.release();
        }
    }

    /// Validates and attaches `files` in selection order. Files accepted
    /// earlier in the batch but evicted by later ones report `Evicted`.
    pub async fn add_files(&mut self, pipeline: &MediaPipeline, files: &[MediaFile]) -> Vec<IntakeReport> {
        let mut reports: Vec<IntakeReport> = Vec::with_capacity(files.len());
        for file in files {
            let id = self.stage(file);
            for report in reports.iter_mut() {
                let accepted = matches!(report.resolution, Resolution::Accepted { .. });
                if accepted && !self.slots.contains_key(&report.id) {
                    report.resolution = Resolution::Evicted;
                }
            }
            let total = self.committed_bytes();
            let resolution = match pipeline.process(file, total).await {
                Ok(outcome) => self.resolve(id, file, outcome),
                Err(err) => self.fail(id, &err),
            };
            reports.push(IntakeReport {
                id,
                file_name: file.name.clone(),
                resolution,
            });
        }
        reports
    }
}

impl Drop for AttachmentComposer {
    fn drop(&mut self) {
        self.teardown();
    }
}
