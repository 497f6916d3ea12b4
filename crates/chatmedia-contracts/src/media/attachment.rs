use bytes::Bytes;
use serde::Serialize;

use super::file::MediaFile;
use super::preview::{PreviewError, PreviewHandle};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct AttachmentId(pub u64);

impl std::fmt::Display for AttachmentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "att-{}", self.0)
    }
}

/// An accepted, not-yet-sent image. Owns its preview handle; whoever drops
/// the attachment is responsible for calling [`Attachment::release`].
#[derive(Debug)]
pub struct Attachment {
    pub id: AttachmentId,
    pub file: MediaFile,
    pub original_size: u64,
    pub was_compressed: bool,
    pub fingerprint: String,
    preview: PreviewHandle,
}

impl Attachment {
    pub fn new(
        id: AttachmentId,
        file: MediaFile,
        original_size: u64,
        was_compressed: bool,
        preview: PreviewHandle,
    ) -> Self {
        let fingerprint = file.fingerprint();
        Self {
            id,
            file,
            original_size,
            was_compressed,
            fingerprint,
            preview,
        }
    }

    pub fn size(&self) -> u64 {
        self.file.size()
    }

    pub fn preview(&self) -> &PreviewHandle {
        &self.preview
    }

    pub fn needs_release(&self) -> bool {
        self.preview.needs_release()
    }

    pub fn release(&mut self) -> Result<(), PreviewError> {
        self.preview.release()
    }

    /// Releases the preview and hands back the payload for sending.
    pub fn into_submission(mut self) -> Result<SubmittedAttachment, PreviewError> {
        self.preview.release()?;
        Ok(SubmittedAttachment {
            id: self.id,
            name: self.file.name.clone(),
            mime_type: self.file.mime_type.clone(),
            bytes: self.file.bytes.clone(),
            was_compressed: self.was_compressed,
            fingerprint: self.fingerprint.clone(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmittedAttachment {
    pub id: AttachmentId,
    pub name: String,
    pub mime_type: String,
    pub bytes: Bytes,
    pub was_compressed: bool,
    pub fingerprint: String,
}
