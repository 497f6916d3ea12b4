use chatmedia_contracts::config::{PressureSettings, ThresholdTier, Thresholds, MIB};
use chatmedia_contracts::locale::Locale;
use chatmedia_contracts::pressure::{
    AlertHistory, MemoryPressureResult, MemoryPressureSample, PressureLevel, ThresholdTierKind,
};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::debug;

/// `round((stored + pending) / 1 MiB)`.
pub fn image_megabytes(stored_bytes: u64, pending_bytes: u64) -> u64 {
    let total = stored_bytes.saturating_add(pending_bytes);
    (total as f64 / MIB as f64).round() as u64
}

/// Scores conversation size against the configured tiers and decides when an
/// alert is worth showing again. The history is owned per session and only
/// written when `should_alert` says yes.
#[derive(Debug, Clone)]
pub struct MemoryPressureMonitor {
    settings: PressureSettings,
    history: AlertHistory,
}

impl MemoryPressureMonitor {
    pub fn new(settings: PressureSettings, history: AlertHistory) -> Self {
        Self { settings, history }
    }

    pub fn history(&self) -> &AlertHistory {
        &self.history
    }

    pub fn evaluate(&self, sample: &MemoryPressureSample) -> MemoryPressureResult {
        let image_mb = image_megabytes(sample.stored_image_bytes, sample.pending_upload_bytes);
        let heap_ratio = sample.heap_ratio.filter(|ratio| ratio.is_finite());
        let device_memory_gb = sample.device_memory_gb.filter(|gb| gb.is_finite() && *gb > 0.0);
        let tier = select_tier(&self.settings, device_memory_gb);
        let thresholds = tier_thresholds(&self.settings, tier);

        let exceeds = |limits: &Thresholds, heap_limit: f64| {
            sample.message_count >= limits.messages
                || image_mb >= limits.image_mb
                || heap_ratio.is_some_and(|ratio| ratio >= heap_limit)
        };
        let level = if exceeds(&thresholds.critical, self.settings.heap_critical_ratio) {
            PressureLevel::Critical
        } else if exceeds(&thresholds.warn, self.settings.heap_warn_ratio) {
            PressureLevel::Warn
        } else {
            PressureLevel::None
        };

        MemoryPressureResult {
            level,
            message_count: sample.message_count,
            image_mb,
            device_memory_gb,
            heap_ratio,
            tier,
        }
    }

    pub fn should_alert(&mut self, result: &MemoryPressureResult) -> bool {
        self.should_alert_at(result, Utc::now())
    }

    /// Decides and records in one step. A shown `critical` mutes `warn` until
    /// the critical cooldown has passed; a repeated level is muted for its
    /// own cooldown.
    pub fn should_alert_at(&mut self, result: &MemoryPressureResult, now: DateTime<Utc>) -> bool {
        let level = result.level;
        if level == PressureLevel::None {
            return false;
        }
        if let Some(last_shown) = self.history.last_shown_at {
            let elapsed = now.signed_duration_since(last_shown);
            let last = self.history.last_level;
            if last == PressureLevel::Critical
                && level == PressureLevel::Warn
                && elapsed < self.cooldown(PressureLevel::Critical)
            {
                debug!("warn muted by recent critical alert");
                return false;
            }
            if last == level && elapsed < self.cooldown(level) {
                debug!(level = level.as_str(), "alert within cooldown");
                return false;
            }
        }
        self.history.record(level, now);
        true
    }

    fn cooldown(&self, level: PressureLevel) -> Duration {
        match level {
            PressureLevel::Critical => Duration::seconds(self.settings.critical_cooldown_secs),
            _ => Duration::seconds(self.settings.warn_cooldown_secs),
        }
    }
}

fn select_tier(settings: &PressureSettings, device_memory_gb: Option<f64>) -> ThresholdTierKind {
    match device_memory_gb {
        Some(gb) if gb <= settings.low_memory_gb => ThresholdTierKind::Low,
        _ => ThresholdTierKind::Normal,
    }
}

fn tier_thresholds(settings: &PressureSettings, tier: ThresholdTierKind) -> &ThresholdTier {
    match tier {
        ThresholdTierKind::Low => &settings.low,
        ThresholdTierKind::Normal => &settings.normal,
    }
}

/// Dialog text for an alert. `progress` is the share of the critical
/// threshold already reached, 0 to 100.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertCopy {
    pub title: String,
    pub message: String,
    pub progress: u8,
}

pub fn alert_copy(result: &MemoryPressureResult, settings: &PressureSettings, locale: Locale) -> AlertCopy {
    let critical = tier_thresholds(settings, result.tier).critical;
    let ratio = |value: f64, limit: f64| if limit > 0.0 { value / limit } else { 0.0 };
    let mut share = ratio(result.message_count as f64, critical.messages as f64)
        .max(ratio(result.image_mb as f64, critical.image_mb as f64));
    if let Some(heap) = result.heap_ratio {
        share = share.max(ratio(heap, settings.heap_critical_ratio));
    }
    let progress = (share * 100.0).clamp(0.0, 100.0).round() as u8;

    let heap = result
        .heap_ratio
        .map(|ratio| format!("{:.0}%", ratio * 100.0));
    let (title, mut message) = match (locale, result.level) {
        (Locale::En, PressureLevel::Critical) => (
            "Conversation is using too much memory".to_string(),
            format!(
                "This conversation has {} messages and {} MB of images. Start a new conversation to keep things responsive.",
                result.message_count, result.image_mb
            ),
        ),
        (Locale::En, _) => (
            "Conversation is getting large".to_string(),
            format!(
                "This conversation has {} messages and {} MB of images.",
                result.message_count, result.image_mb
            ),
        ),
        (Locale::Zh, PressureLevel::Critical) => (
            "对话占用内存过高".to_string(),
            format!(
                "当前对话包含 {} 条消息和 {} MB 图片，建议开启新对话。",
                result.message_count, result.image_mb
            ),
        ),
        (Locale::Zh, _) => (
            "对话内容较多".to_string(),
            format!(
                "当前对话包含 {} 条消息和 {} MB 图片。",
                result.message_count, result.image_mb
            ),
        ),
    };
    if let Some(heap) = heap {
        match locale {
            Locale::En => message.push_str(&format!(" Heap usage is at {heap}.")),
            Locale::Zh => message.push_str(&format!(" 内存占用 {heap}。")),
        }
    }

    AlertCopy {
        title,
        message,
        progress,
    }
}
