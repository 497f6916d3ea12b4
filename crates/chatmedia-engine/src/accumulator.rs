//! Folds streamed model fragments into message parts.
//!
//! Consecutive text fragments with the same `thought` flag concatenate into
//! one part and the latest signature in the run wins. Images always start a
//! new part. Fragments carrying nothing usable are dropped so one bad chunk
//! cannot abort a stream.

use chatmedia_contracts::messages::{fragments_from_chunk, Fragment, Message, Part, PartContent, Role};
use futures::{Stream, StreamExt};
use serde_json::Value;
use tracing::{debug, warn};

/// Applies `fragments` to `parts` in arrival order.
pub fn accumulate<I>(parts: &mut Vec<Part>, fragments: I)
where
    I: IntoIterator<Item = Fragment>,
{
    for fragment in fragments {
        apply_fragment(parts, fragment);
    }
}

pub fn build_from_fragments<I>(fragments: I) -> Vec<Part>
where
    I: IntoIterator<Item = Fragment>,
{
    let mut parts = Vec::new();
    accumulate(&mut parts, fragments);
    parts
}

fn apply_fragment(parts: &mut Vec<Part>, fragment: Fragment) {
    let Fragment {
        text,
        inline_data,
        thought,
        signature,
    } = fragment;

    // An empty text run only matters when it carries a signature to attach.
    let text = text.filter(|text| !text.is_empty() || (signature.is_some() && inline_data.is_none()));

    if text.is_none() && inline_data.is_none() {
        debug!("ignoring fragment without text or image");
        return;
    }

    if let Some(text) = text {
        let text_signature = if inline_data.is_some() {
            None
        } else {
            signature.clone()
        };
        append_text(parts, text, thought, text_signature);
    }

    if let Some(image) = inline_data {
        parts.push(Part::image(image, thought).with_signature(signature));
    }
}

fn append_text(parts: &mut Vec<Part>, text: String, thought: bool, signature: Option<String>) {
    if let Some(last) = parts.last_mut() {
        if last.thought == thought {
            if let PartContent::Text(existing) = &mut last.content {
                existing.push_str(&text);
                if signature.is_some() {
                    last.thought_signature = signature;
                }
                return;
            }
        }
    }
    parts.push(Part::text(text, thought).with_signature(signature));
}

/// Incremental builder for one model turn.
#[derive(Debug, Clone, Default)]
pub struct StreamPartAccumulator {
    parts: Vec<Part>,
    fragments_seen: usize,
}

impl StreamPartAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_parts(parts: Vec<Part>) -> Self {
        Self {
            parts,
            fragments_seen: 0,
        }
    }

    pub fn push(&mut self, fragment: Fragment) {
        self.fragments_seen += 1;
        apply_fragment(&mut self.parts, fragment);
    }

    /// Decodes a raw transport chunk and folds every fragment in it.
    pub fn push_chunk(&mut self, chunk: &Value) -> usize {
        let fragments = fragments_from_chunk(chunk);
        let count = fragments.len();
        self.extend(fragments);
        count
    }

    pub fn extend<I>(&mut self, fragments: I)
    where
        I: IntoIterator<Item = Fragment>,
    {
        for fragment in fragments {
            self.push(fragment);
        }
    }

    pub fn parts(&self) -> &[Part] {
        &self.parts
    }

    pub fn fragments_seen(&self) -> usize {
        self.fragments_seen
    }

    pub fn finish(self, role: Role) -> Message {
        Message::new(role, self.parts)
    }

    pub fn fail(self, role: Role, error: impl Into<String>) -> Message {
        let mut message = Message::new(role, self.parts);
        message.error = true;
        message.error_message = Some(error.into());
        message
    }
}

/// Drains a fragment stream into a finished message. A transport error ends
/// the turn with the parts received so far and the error flag set.
pub async fn collect_stream<S>(stream: S, role: Role) -> Message
where
    S: Stream<Item = anyhow::Result<Fragment>>,
{
    let mut accumulator = StreamPartAccumulator::new();
    futures::pin_mut!(stream);
    while let Some(item) = stream.next().await {
        match item {
            Ok(fragment) => accumulator.push(fragment),
            Err(err) => {
                warn!("response stream failed after {} fragments: {err:#}", accumulator.fragments_seen());
                return accumulator.fail(role, format!("{err:#}"));
            }
        }
    }
    accumulator.finish(role)
}
