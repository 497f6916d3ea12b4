use std::path::Path;

use anyhow::Context;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

/// A file-like object handed over by the upload surface: payload plus the
/// MIME type it declared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaFile {
    pub name: String,
    pub mime_type: String,
    pub bytes: Bytes,
    pub last_modified: DateTime<Utc>,
}

impl MediaFile {
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            bytes: bytes.into(),
            last_modified: Utc::now(),
        }
    }

    pub fn from_path(path: &Path) -> anyhow::Result<Self> {
        let bytes = std::fs::read(path).with_context(|| format!("failed reading {}", path.display()))?;
        let last_modified = std::fs::metadata(path)
            .and_then(|meta| meta.modified())
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());
        let name = path
            .file_name()
            .and_then(|value| value.to_str())
            .unwrap_or("upload")
            .to_string();
        Ok(Self {
            name,
            mime_type: mime_for_path(path).to_string(),
            bytes: Bytes::from(bytes),
            last_modified,
        })
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn is_image(&self) -> bool {
        self.mime_type
            .trim()
            .to_ascii_lowercase()
            .starts_with("image/")
    }

    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(&self.bytes);
        hex::encode(hasher.finalize())
    }
}

/// MIME type a picker would declare for `path`, judged by extension only.
pub fn mime_for_path(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|value| value.to_str())
        .map(|value| value.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        "heic" | "heif" => "image/heic",
        "txt" | "md" => "text/plain",
        "pdf" => "application/pdf",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_path_declares_mime_by_extension() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let image_path = temp.path().join("Photo.JPG");
        std::fs::write(&image_path, b"not really a jpeg")?;
        let notes_path = temp.path().join("notes.txt");
        std::fs::write(&notes_path, b"hello")?;

        let image = MediaFile::from_path(&image_path)?;
        assert_eq!(image.name, "Photo.JPG");
        assert_eq!(image.mime_type, "image/jpeg");
        assert_eq!(image.size(), 17);
        assert!(image.is_image());

        let notes = MediaFile::from_path(&notes_path)?;
        assert!(!notes.is_image());
        Ok(())
    }

    #[test]
    fn fingerprint_is_content_addressed() {
        let a = MediaFile::new("a.png", "image/png", vec![1u8, 2, 3]);
        let b = MediaFile::new("b.png", "image/png", vec![1u8, 2, 3]);
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint().len(), 64);
    }
}
