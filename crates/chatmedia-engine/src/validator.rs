use std::sync::Arc;

use chatmedia_contracts::config::MediaLimits;
use chatmedia_contracts::media::{IntakeError, MediaFile, ValidationOutcome};

use crate::probe::{probe_dimensions, Dimensions, ImageProbe};

/// Screens a candidate image against the byte, edge and pixel budgets.
/// Cheap checks run first; the payload is only probed once they pass.
#[derive(Clone)]
pub struct MediaIntakeValidator {
    limits: MediaLimits,
    probe: Arc<dyn ImageProbe>,
}

impl MediaIntakeValidator {
    pub fn new(limits: MediaLimits, probe: Arc<dyn ImageProbe>) -> Self {
        Self { limits, probe }
    }

    pub async fn validate(
        &self,
        file: &MediaFile,
        current_total_bytes: u64,
    ) -> anyhow::Result<ValidationOutcome> {
        if let Some(reason) = self.screen_budgets(file, current_total_bytes) {
            return Ok(ValidationOutcome::Rejected(reason));
        }
        let dims = probe_dimensions(self.probe.clone(), file.bytes.clone()).await?;
        Ok(match self.check_dimensions(dims) {
            Some(reason) => ValidationOutcome::Rejected(reason),
            None => ValidationOutcome::accepted(),
        })
    }

    pub fn screen_budgets(&self, file: &MediaFile, current_total_bytes: u64) -> Option<IntakeError> {
        if !file.is_image() {
            return Some(IntakeError::NotImage);
        }
        if file.size() > self.limits.max_file_bytes {
            return Some(IntakeError::FileTooLarge);
        }
        if current_total_bytes.saturating_add(file.size()) > self.limits.max_total_bytes {
            return Some(IntakeError::TotalTooLarge);
        }
        None
    }

    pub fn check_dimensions(&self, dims: Option<Dimensions>) -> Option<IntakeError> {
        let Some(dims) = dims.filter(|dims| !dims.is_empty()) else {
            return Some(IntakeError::InvalidDimensions);
        };
        if dims.longest_edge() > self.limits.max_edge {
            return Some(IntakeError::DimensionTooLarge);
        }
        if dims.pixels() > self.limits.max_pixels {
            return Some(IntakeError::PixelsTooLarge);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use chatmedia_contracts::config::MIB;

    use crate::test_support::{fake_image, BrokenProbe, FakeProbe};

    use super::*;

    fn validator() -> (MediaIntakeValidator, Arc<FakeProbe>) {
        let probe = Arc::new(FakeProbe::default());
        (
            MediaIntakeValidator::new(MediaLimits::default(), probe.clone()),
            probe,
        )
    }

    #[tokio::test]
    async fn compliant_image_is_accepted_without_replacement() -> anyhow::Result<()> {
        let (validator, probe) = validator();
        let outcome = validator
            .validate(&fake_image("ok.png", 4000, 3000, 2 * MIB as usize), 0)
            .await?;
        assert_eq!(outcome, ValidationOutcome::accepted());
        assert_eq!(probe.calls(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn non_image_is_rejected_before_decoding() -> anyhow::Result<()> {
        let (validator, probe) = validator();
        let file = MediaFile::new("notes.txt", "text/plain", vec![0u8; 10]);
        let outcome = validator.validate(&file, 0).await?;
        assert_eq!(outcome.rejection(), Some(IntakeError::NotImage));
        assert_eq!(probe.calls(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn oversized_file_is_rejected_regardless_of_session_total() -> anyhow::Result<()> {
        let (validator, probe) = validator();
        let file = fake_image("big.png", 100, 100, 25 * MIB as usize + 1);
        assert_eq!(
            validator.validate(&file, 0).await?.rejection(),
            Some(IntakeError::FileTooLarge)
        );
        assert_eq!(probe.calls(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn session_budget_counts_already_accepted_bytes() -> anyhow::Result<()> {
        let (validator, _) = validator();
        let file = fake_image("a.png", 100, 100, 10 * MIB as usize);
        for total in [91 * MIB, 95 * MIB, 100 * MIB, u64::MAX] {
            assert_eq!(
                validator.validate(&file, total).await?.rejection(),
                Some(IntakeError::TotalTooLarge),
                "total {total}"
            );
        }
        assert!(validator.validate(&file, 90 * MIB).await?.is_accepted());
        Ok(())
    }

    #[tokio::test]
    async fn geometry_rejections_follow_check_order() -> anyhow::Result<()> {
        let (validator, _) = validator();
        let cases = [
            (fake_image("zero.png", 0, 10, 1024), IntakeError::InvalidDimensions),
            (fake_image("wide.png", 8193, 10, 1024), IntakeError::DimensionTooLarge),
            (fake_image("both.png", 9000, 9000, 1024), IntakeError::DimensionTooLarge),
            (fake_image("dense.png", 5000, 4000, 1024), IntakeError::PixelsTooLarge),
        ];
        for (file, expected) in cases {
            assert_eq!(
                validator.validate(&file, 0).await?.rejection(),
                Some(expected),
                "{}",
                file.name
            );
        }

        let garbage = MediaFile::new("broken.png", "image/png", vec![1u8; 64]);
        assert_eq!(
            validator.validate(&garbage, 0).await?.rejection(),
            Some(IntakeError::InvalidDimensions)
        );

        let edge = fake_image("edge.png", 8192, 1953, 1024);
        assert!(validator.validate(&edge, 0).await?.is_accepted());
        Ok(())
    }

    #[tokio::test]
    async fn probe_failure_propagates_as_error() {
        let validator = MediaIntakeValidator::new(MediaLimits::default(), Arc::new(BrokenProbe));
        let err = validator
            .validate(&fake_image("a.png", 10, 10, 64), 0)
            .await
            .unwrap_err();
        assert!(format!("{err:#}").contains("image decoding is unavailable"));
    }
}
