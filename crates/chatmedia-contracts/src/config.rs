use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const MIB: u64 = 1024 * 1024;

pub const CONFIG_ENV: &str = "CHATMEDIA_CONFIG";

/// Byte, pixel and count budgets applied to user-supplied images.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaLimits {
    pub max_file_bytes: u64,
    pub max_total_bytes: u64,
    pub max_edge: u32,
    pub max_pixels: u64,
    pub max_attachments: usize,
    /// Payloads at or below this size get an inline data-URI preview that
    /// needs no explicit release.
    pub inline_preview_max_bytes: u64,
}

impl Default for MediaLimits {
    fn default() -> Self {
        Self {
            max_file_bytes: 25 * MIB,
            max_total_bytes: 100 * MIB,
            max_edge: 8192,
            max_pixels: 16_000_000,
            max_attachments: 10,
            inline_preview_max_bytes: 256 * 1024,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressionSettings {
    pub max_iterations: u32,
    pub initial_quality: u8,
    pub min_quality: u8,
    pub quality_step: u8,
    pub scale_step: f64,
}

impl Default for CompressionSettings {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            initial_quality: 92,
            min_quality: 40,
            quality_step: 8,
            scale_step: 0.9,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thresholds {
    pub messages: u64,
    pub image_mb: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThresholdTier {
    pub warn: Thresholds,
    pub critical: Thresholds,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PressureSettings {
    /// Devices reporting this much memory or less use the `low` tier.
    pub low_memory_gb: f64,
    pub heap_warn_ratio: f64,
    pub heap_critical_ratio: f64,
    pub warn_cooldown_secs: i64,
    pub critical_cooldown_secs: i64,
    pub normal: ThresholdTier,
    pub low: ThresholdTier,
}

impl Default for PressureSettings {
    fn default() -> Self {
        Self {
            low_memory_gb: 4.0,
            heap_warn_ratio: 0.85,
            heap_critical_ratio: 0.92,
            warn_cooldown_secs: 120,
            critical_cooldown_secs: 300,
            normal: ThresholdTier {
                warn: Thresholds {
                    messages: 200,
                    image_mb: 200,
                },
                critical: Thresholds {
                    messages: 400,
                    image_mb: 500,
                },
            },
            low: ThresholdTier {
                warn: Thresholds {
                    messages: 100,
                    image_mb: 100,
                },
                critical: Thresholds {
                    messages: 200,
                    image_mb: 250,
                },
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub limits: MediaLimits,
    pub compression: CompressionSettings,
    pub pressure: PressureSettings,
}

impl PipelineConfig {
    /// Built-in defaults merged with the first override file found: `explicit`,
    /// then `$CHATMEDIA_CONFIG`, then `~/.chatmedia/config.json`. A missing or
    /// malformed override leaves the defaults untouched.
    pub fn load(explicit: Option<&Path>) -> anyhow::Result<Self> {
        let mut merged = serde_json::to_value(Self::default())?;
        if let Some(path) = explicit.map(Path::to_path_buf).or_else(config_override_path) {
            if let Ok(raw) = fs::read_to_string(&path) {
                merge_config_overrides(&mut merged, &raw);
            }
        }
        match serde_json::from_value(merged) {
            Ok(config) => Ok(config),
            Err(err) => {
                tracing::warn!("ignoring config overrides: {err}");
                Ok(Self::default())
            }
        }
    }
}

fn config_override_path() -> Option<PathBuf> {
    if let Some(path) = env::var_os(CONFIG_ENV).filter(|value| !value.is_empty()) {
        return Some(PathBuf::from(path));
    }
    env::var_os("HOME")
        .map(PathBuf::from)
        .map(|home| home.join(".chatmedia").join("config.json"))
}

fn merge_config_overrides(base: &mut Value, raw: &str) {
    let Ok(payload) = serde_json::from_str::<Value>(raw) else {
        return;
    };
    if payload.is_object() {
        merge_value(base, payload);
    }
}

fn merge_value(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(existing) => merge_value(existing, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_intake_budgets() {
        let config = PipelineConfig::default();
        assert_eq!(config.limits.max_file_bytes, 26_214_400);
        assert_eq!(config.limits.max_total_bytes, 104_857_600);
        assert_eq!(config.limits.max_edge, 8192);
        assert_eq!(config.limits.max_pixels, 16_000_000);
        assert_eq!(config.pressure.warn_cooldown_secs, 120);
        assert_eq!(config.pressure.critical_cooldown_secs, 300);
    }

    #[test]
    fn override_file_merges_nested_fields() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("config.json");
        fs::write(
            &path,
            r#"{"limits": {"max_attachments": 4}, "pressure": {"low": {"warn": {"messages": 50, "image_mb": 60}}}}"#,
        )?;

        let config = PipelineConfig::load(Some(path.as_path()))?;
        assert_eq!(config.limits.max_attachments, 4);
        assert_eq!(config.limits.max_edge, 8192);
        assert_eq!(config.pressure.low.warn.messages, 50);
        assert_eq!(config.pressure.low.critical.messages, 200);
        Ok(())
    }

    #[test]
    fn malformed_override_keeps_defaults() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("config.json");
        fs::write(&path, "{not json")?;
        assert_eq!(PipelineConfig::load(Some(path.as_path()))?, PipelineConfig::default());

        fs::write(&path, r#"{"limits": {"max_edge": "huge"}}"#)?;
        assert_eq!(PipelineConfig::load(Some(path.as_path()))?, PipelineConfig::default());
        Ok(())
    }
}
