use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PressureLevel {
    #[default]
    None,
    Warn,
    Critical,
}

impl PressureLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Warn => "warn",
            Self::Critical => "critical",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThresholdTierKind {
    Normal,
    Low,
}

/// Inputs to one pressure evaluation. Device memory and heap occupancy are
/// optional; when absent they are left out of the decision.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MemoryPressureSample {
    pub message_count: u64,
    pub stored_image_bytes: u64,
    pub pending_upload_bytes: u64,
    pub device_memory_gb: Option<f64>,
    pub heap_ratio: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MemoryPressureResult {
    pub level: PressureLevel,
    pub message_count: u64,
    pub image_mb: u64,
    pub device_memory_gb: Option<f64>,
    pub heap_ratio: Option<f64>,
    pub tier: ThresholdTierKind,
}

/// Last alert shown in this session. Starts at `{none, never}` and is only
/// written when an alert is actually displayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertHistory {
    pub last_level: PressureLevel,
    pub last_shown_at: Option<DateTime<Utc>>,
}

impl AlertHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, level: PressureLevel, at: DateTime<Utc>) {
        self.last_level = level;
        self.last_shown_at = Some(at);
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn history_starts_empty_and_survives_serde() -> anyhow::Result<()> {
        let mut history = AlertHistory::new();
        assert_eq!(history.last_level, PressureLevel::None);
        assert!(history.last_shown_at.is_none());

        let at = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).single().expect("valid time");
        history.record(PressureLevel::Critical, at);
        let raw = serde_json::to_string(&history)?;
        assert!(raw.contains("\"critical\""));
        let restored: AlertHistory = serde_json::from_str(&raw)?;
        assert_eq!(restored, history);

        let empty: AlertHistory = serde_json::from_str("{}")?;
        assert_eq!(empty, AlertHistory::new());
        Ok(())
    }

    #[test]
    fn levels_are_ordered_by_severity() {
        assert!(PressureLevel::None < PressureLevel::Warn);
        assert!(PressureLevel::Warn < PressureLevel::Critical);
        assert_eq!(PressureLevel::Critical.as_str(), "critical");
    }
}
