use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

use super::file::MediaFile;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PreviewError {
    #[error("preview handle {0} was already released")]
    AlreadyReleased(u64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreviewKind {
    /// Registry-backed `blob:` URI; must be released exactly once.
    ObjectUrl,
    /// Self-contained `data:` URI; nothing to release.
    DataUri,
}

#[derive(Debug, Default)]
struct RegistryCounters {
    issued: AtomicU64,
    live: AtomicU64,
    released: AtomicU64,
}

/// Issues renderable preview handles and keeps count of the ones that are
/// still holding a native resource.
#[derive(Debug, Clone)]
pub struct PreviewRegistry {
    counters: Arc<RegistryCounters>,
    inline_max_bytes: u64,
}

impl PreviewRegistry {
    pub fn new(inline_max_bytes: u64) -> Self {
        Self {
            counters: Arc::new(RegistryCounters::default()),
            inline_max_bytes,
        }
    }

    pub fn acquire(&self, file: &MediaFile) -> PreviewHandle {
        let id = self.counters.issued.fetch_add(1, Ordering::SeqCst) + 1;
        if file.size() <= self.inline_max_bytes {
            let uri = format!(
                "data:{};base64,{}",
                file.mime_type,
                BASE64.encode(&file.bytes)
            );
            return PreviewHandle {
                id,
                uri,
                kind: PreviewKind::DataUri,
                released: false,
                counters: None,
            };
        }

        self.counters.live.fetch_add(1, Ordering::SeqCst);
        PreviewHandle {
            id,
            uri: format!("blob:chatmedia/{}", uuid::Uuid::new_v4()),
            kind: PreviewKind::ObjectUrl,
            released: false,
            counters: Some(self.counters.clone()),
        }
    }

    /// Object-URL handles acquired and not yet released.
    pub fn live(&self) -> u64 {
        self.counters.live.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> u64 {
        self.counters.released.load(Ordering::SeqCst)
    }

    pub fn issued(&self) -> u64 {
        self.counters.issued.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
pub struct PreviewHandle {
    id: u64,
    uri: String,
    kind: PreviewKind,
    released: bool,
    counters: Option<Arc<RegistryCounters>>,
}

impl PreviewHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn kind(&self) -> PreviewKind {
        self.kind
    }

    pub fn needs_release(&self) -> bool {
        self.kind == PreviewKind::ObjectUrl
    }

    pub fn release(&mut self) -> Result<(), PreviewError> {
        if self.released {
            return Err(PreviewError::AlreadyReleased(self.id));
        }
        self.released = true;
        if let Some(counters) = &self.counters {
            counters.live.fetch_sub(1, Ordering::SeqCst);
            counters.released.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

impl Drop for PreviewHandle {
    fn drop(&mut self) {
        if self.needs_release() && !self.released {
            tracing::warn!(handle = self.id, "preview handle dropped without release");
        }
    }
}
