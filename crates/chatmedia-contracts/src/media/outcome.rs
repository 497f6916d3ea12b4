use serde::Serialize;

use crate::config::{MediaLimits, MIB};
use crate::locale::Locale;

use super::file::MediaFile;

/// Closed set of reasons an image is refused at intake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, thiserror::Error)]
#[serde(rename_all = "snake_case")]
pub enum IntakeError {
    #[error("file is not an image")]
    NotImage,
    #[error("file exceeds the single-file size budget")]
    FileTooLarge,
    #[error("attachments exceed the session size budget")]
    TotalTooLarge,
    #[error("image dimensions could not be read")]
    InvalidDimensions,
    #[error("image edge exceeds the maximum length")]
    DimensionTooLarge,
    #[error("image exceeds the pixel budget")]
    PixelsTooLarge,
    #[error("image could not be re-encoded")]
    CompressionFailed,
}

impl IntakeError {
    pub fn code(self) -> &'static str {
        match self {
            Self::NotImage => "not_image",
            Self::FileTooLarge => "file_too_large",
            Self::TotalTooLarge => "total_too_large",
            Self::InvalidDimensions => "invalid_dimensions",
            Self::DimensionTooLarge => "dimension_too_large",
            Self::PixelsTooLarge => "pixels_too_large",
            Self::CompressionFailed => "compression_failed",
        }
    }

    /// Whether a re-encode pass could bring the file within budget.
    pub fn is_compressible(self) -> bool {
        matches!(
            self,
            Self::FileTooLarge | Self::TotalTooLarge | Self::DimensionTooLarge | Self::PixelsTooLarge
        )
    }

    /// Human-readable rejection reason shown next to the file.
    pub fn reason(self, locale: Locale, limits: &MediaLimits) -> String {
        let file_mb = limits.max_file_bytes / MIB;
        let total_mb = limits.max_total_bytes / MIB;
        let edge = limits.max_edge;
        let megapixels = limits.max_pixels as f64 / 1_000_000.0;
        match (locale, self) {
            (Locale::En, Self::NotImage) => "Only image files can be attached.".to_string(),
            (Locale::En, Self::FileTooLarge) => {
                format!("Image is larger than {file_mb} MB, even after compression.")
            }
            (Locale::En, Self::TotalTooLarge) => {
                format!("Attachments would exceed the {total_mb} MB total limit.")
            }
            (Locale::En, Self::InvalidDimensions) => {
                "The image could not be read or has invalid dimensions.".to_string()
            }
            (Locale::En, Self::DimensionTooLarge) => {
                format!("Image width or height exceeds {edge} px.")
            }
            (Locale::En, Self::PixelsTooLarge) => {
                format!("Image exceeds {megapixels:.0} megapixels.")
            }
            (Locale::En, Self::CompressionFailed) => {
                "The image could not be compressed. Try a different file.".to_string()
            }
            (Locale::Zh, Self::NotImage) => "只能添加图片文件。".to_string(),
            (Locale::Zh, Self::FileTooLarge) => format!("图片压缩后仍超过 {file_mb} MB。"),
            (Locale::Zh, Self::TotalTooLarge) => format!("附件总大小将超过 {total_mb} MB 上限。"),
            (Locale::Zh, Self::InvalidDimensions) => "无法读取图片或图片尺寸无效。".to_string(),
            (Locale::Zh, Self::DimensionTooLarge) => format!("图片宽度或高度超过 {edge} 像素。"),
            (Locale::Zh, Self::PixelsTooLarge) => format!("图片超过 {megapixels:.0} 百万像素。"),
            (Locale::Zh, Self::CompressionFailed) => "图片压缩失败，请尝试其他文件。".to_string(),
        }
    }
}

/// Result of screening (and possibly re-encoding) one candidate file.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationOutcome {
    Accepted {
        replacement: Option<MediaFile>,
        was_compressed: bool,
    },
    Rejected(IntakeError),
}

impl ValidationOutcome {
    pub fn accepted() -> Self {
        Self::Accepted {
            replacement: None,
            was_compressed: false,
        }
    }

    pub fn compressed(file: MediaFile) -> Self {
        Self::Accepted {
            replacement: Some(file),
            was_compressed: true,
        }
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted { .. })
    }

    pub fn was_compressed(&self) -> bool {
        matches!(
            self,
            Self::Accepted {
                was_compressed: true,
                ..
            }
        )
    }

    pub fn rejection(&self) -> Option<IntakeError> {
        match self {
            Self::Rejected(reason) => Some(*reason),
            Self::Accepted { .. } => None,
        }
    }

    /// The payload to attach: the replacement when one was produced,
    /// otherwise `original`. `None` when rejected.
    pub fn payload<'a>(&'a self, original: &'a MediaFile) -> Option<&'a MediaFile> {
        match self {
            Self::Accepted {
                replacement: Some(file),
                ..
            } => Some(file),
            Self::Accepted {
                replacement: None, ..
            } => Some(original),
            Self::Rejected(_) => None,
        }
    }
}

impl From<IntakeError> for ValidationOutcome {
    fn from(reason: IntakeError) -> Self {
        Self::Rejected(reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_kind_has_a_reason_in_each_locale() {
        let limits = MediaLimits::default();
        let kinds = [
            IntakeError::NotImage,
            IntakeError::FileTooLarge,
            IntakeError::TotalTooLarge,
            IntakeError::InvalidDimensions,
            IntakeError::DimensionTooLarge,
            IntakeError::PixelsTooLarge,
            IntakeError::CompressionFailed,
        ];
        for kind in kinds {
            for locale in [Locale::En, Locale::Zh] {
                assert!(!kind.reason(locale, &limits).is_empty(), "{kind:?} {locale}");
            }
        }
        assert_eq!(
            IntakeError::FileTooLarge.reason(Locale::En, &limits),
            "Image is larger than 25 MB, even after compression."
        );
        assert_eq!(
            IntakeError::PixelsTooLarge.reason(Locale::En, &limits),
            "Image exceeds 16 megapixels."
        );
    }

    #[test]
    fn payload_prefers_replacement() {
        let original = MediaFile::new("a.png", "image/png", vec![0u8; 8]);
        let smaller = MediaFile::new("a.png", "image/jpeg", vec![0u8; 2]);

        let passthrough = ValidationOutcome::accepted();
        assert_eq!(passthrough.payload(&original), Some(&original));
        assert!(!passthrough.was_compressed());

        let compressed = ValidationOutcome::compressed(smaller.clone());
        assert_eq!(compressed.payload(&original), Some(&smaller));
        assert!(compressed.was_compressed());

        let rejected = ValidationOutcome::from(IntakeError::NotImage);
        assert_eq!(rejected.payload(&original), None);
        assert_eq!(rejected.rejection(), Some(IntakeError::NotImage));
    }
}
