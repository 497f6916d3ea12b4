use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::MIB;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    #[default]
    En,
    Zh,
}

impl Locale {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::En => "en",
            Self::Zh => "zh",
        }
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Locale {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let normalized = raw.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "en" | "en-us" | "en-gb" | "english" => Ok(Self::En),
            "zh" | "zh-cn" | "zh-hans" | "chinese" => Ok(Self::Zh),
            _ => Err(format!("unsupported locale '{raw}'")),
        }
    }
}

/// Byte count rendered in megabytes with one decimal, e.g. `4.8 MB`.
pub fn format_megabytes(bytes: u64) -> String {
    format!("{:.1} MB", bytes as f64 / MIB as f64)
}

pub fn compression_notice(locale: Locale, file_name: &str, before: u64, after: u64) -> String {
    let before = format_megabytes(before);
    let after = format_megabytes(after);
    match locale {
        Locale::En => format!("{file_name} was compressed from {before} to {after}."),
        Locale::Zh => format!("{file_name} 已从 {before} 压缩至 {after}。"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locale_parses_common_tags() {
        assert_eq!("EN".parse::<Locale>(), Ok(Locale::En));
        assert_eq!("zh-CN".parse::<Locale>(), Ok(Locale::Zh));
        assert!("fr".parse::<Locale>().is_err());
    }

    #[test]
    fn compression_notice_reports_both_sizes() {
        let notice = compression_notice(Locale::En, "cat.png", 30 * MIB, 5 * MIB - MIB / 5);
        assert_eq!(notice, "cat.png was compressed from 30.0 MB to 4.8 MB.");
        assert!(compression_notice(Locale::Zh, "cat.png", 2 * MIB, MIB).contains("2.0 MB"));
    }
}
