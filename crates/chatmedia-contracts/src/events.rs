use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub type EventPayload = Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    AttachmentAccepted,
    AttachmentCompressed,
    AttachmentRejected,
    PressureEvaluated,
}

impl EventKind {
    pub const ALL: [EventKind; 4] = [
        Self::AttachmentAccepted,
        Self::AttachmentCompressed,
        Self::AttachmentRejected,
        Self::PressureEvaluated,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::AttachmentAccepted => "attachment_accepted",
            Self::AttachmentCompressed => "attachment_compressed",
            Self::AttachmentRejected => "attachment_rejected",
            Self::PressureEvaluated => "pressure_evaluated",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == raw)
            .ok_or_else(|| format!("unknown event type '{raw}'"))
    }
}

/// Append-only JSONL log for one intake session.
///
/// Every line carries `type`, `session_id` and `ts`; payload keys are merged
/// around them and never replace them.
#[derive(Debug, Clone)]
pub struct EventWriter {
    inner: Arc<EventWriterInner>,
}

#[derive(Debug)]
struct EventWriterInner {
    path: PathBuf,
    session_id: String,
    lock: Mutex<()>,
}

impl EventWriter {
    pub fn new(path: impl Into<PathBuf>, session_id: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(EventWriterInner {
                path: path.into(),
                session_id: session_id.into(),
                lock: Mutex::new(()),
            }),
        }
    }

    pub fn emit(&self, kind: EventKind, payload: EventPayload) -> anyhow::Result<Value> {
        let mut event = payload;
        event.insert("type".to_string(), Value::String(kind.as_str().to_string()));
        event.insert(
            "session_id".to_string(),
            Value::String(self.inner.session_id.clone()),
        );
        event.insert("ts".to_string(), Value::String(now_utc_iso()));

        if let Some(parent) = self.inner.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let line = serde_json::to_string(&event)?;
        let _guard = self
            .inner
            .lock
            .lock()
            .map_err(|_| anyhow::anyhow!("event writer lock poisoned"))?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.inner.path)?;
        file.write_all(line.as_bytes())?;
        file.write_all(b"\n")?;

        Ok(Value::Object(event))
    }
}

pub(crate) fn now_utc_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false)
}

/// Event kinds in file order. Unparseable lines and unknown types are skipped.
pub fn read_event_kinds(path: &Path) -> anyhow::Result<Vec<EventKind>> {
    let raw = std::fs::read_to_string(path)?;
    Ok(raw
        .lines()
        .filter_map(|line| serde_json::from_str::<Value>(line).ok())
        .filter_map(|row| row.get("type").and_then(Value::as_str)?.parse().ok())
        .collect())
}

#[cfg(test)]
mod tests {
    use std::fs;

    use chrono::DateTime;

    use super::*;

    #[test]
    fn emit_writes_compact_jsonl_line() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("events.jsonl");
        let writer = EventWriter::new(&path, "session-123");

        let mut payload = EventPayload::new();
        payload.insert("file".to_string(), Value::String("cat.png".to_string()));
        let emitted = writer.emit(EventKind::AttachmentAccepted, payload)?;

        let content = fs::read_to_string(&path)?;
        let line = content.lines().next().unwrap_or("");
        let parsed: Value = serde_json::from_str(line)?;

        assert_eq!(parsed, emitted);
        assert_eq!(parsed["type"], "attachment_accepted");
        assert_eq!(parsed["session_id"], "session-123");
        assert_eq!(parsed["file"], "cat.png");

        let ts = parsed["ts"].as_str().unwrap_or("");
        DateTime::parse_from_rfc3339(ts)?;
        Ok(())
    }

    #[test]
    fn payload_cannot_replace_envelope_keys() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("events.jsonl");
        let writer = EventWriter::new(&path, "session-123");

        let mut payload = EventPayload::new();
        payload.insert("type".to_string(), Value::String("override".to_string()));
        payload.insert("session_id".to_string(), Value::String("other".to_string()));
        payload.insert("bytes".to_string(), Value::from(42));
        let emitted = writer.emit(EventKind::AttachmentRejected, payload)?;

        assert_eq!(emitted["type"], "attachment_rejected");
        assert_eq!(emitted["session_id"], "session-123");
        assert_eq!(emitted["bytes"], 42);
        Ok(())
    }

    #[test]
    fn kinds_read_back_in_order() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("nested").join("events.jsonl");
        let writer = EventWriter::new(&path, "session-123");

        writer.emit(EventKind::AttachmentCompressed, EventPayload::new())?;
        fs::OpenOptions::new()
            .append(true)
            .open(&path)?
            .write_all(b"{\"type\":\"legacy_event\"}\nnot json\n")?;
        writer.emit(EventKind::PressureEvaluated, EventPayload::new())?;

        assert_eq!(
            read_event_kinds(&path)?,
            vec![EventKind::AttachmentCompressed, EventKind::PressureEvaluated]
        );
        Ok(())
    }

    #[test]
    fn kind_names_match_serde() -> anyhow::Result<()> {
        for kind in EventKind::ALL {
            assert_eq!(serde_json::to_value(kind)?, kind.as_str());
            assert_eq!(kind.as_str().parse::<EventKind>(), Ok(kind));
        }
        assert!("attachment_lost".parse::<EventKind>().is_err());
        Ok(())
    }
}
