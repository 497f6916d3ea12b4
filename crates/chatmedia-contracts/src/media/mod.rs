mod attachment;
mod file;
mod outcome;
mod preview;

pub use attachment::{Attachment, AttachmentId, SubmittedAttachment};
pub use file::{mime_for_path, MediaFile};
pub use outcome::{IntakeError, ValidationOutcome};
pub use preview::{PreviewError, PreviewHandle, PreviewKind, PreviewRegistry};
