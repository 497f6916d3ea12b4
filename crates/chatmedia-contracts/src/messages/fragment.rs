use serde_json::Value;

use super::part::InlineImage;

/// One raw piece of model output as it arrives from the transport.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Fragment {
    pub text: Option<String>,
    pub inline_data: Option<InlineImage>,
    pub thought: bool,
    pub signature: Option<String>,
}

impl Fragment {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }

    pub fn thought(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            thought: true,
            ..Self::default()
        }
    }

    pub fn image(mime_type: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            inline_data: Some(InlineImage {
                mime_type: mime_type.into(),
                data: data.into(),
            }),
            ..Self::default()
        }
    }

    pub fn signed(mut self, signature: impl Into<String>) -> Self {
        self.signature = Some(signature.into());
        self
    }

    /// Decodes a single part object (`text`, `thought`, `thoughtSignature`,
    /// `inlineData`). Both camelCase and snake_case keys are accepted. Objects
    /// with no text, image or signature decode to nothing, as does image data
    /// without a MIME type.
    pub fn from_part_value(part: &Value) -> Option<Self> {
        let object = part.as_object()?;
        let text = object
            .get("text")
            .and_then(Value::as_str)
            .map(str::to_string);
        let inline_data = object
            .get("inlineData")
            .or_else(|| object.get("inline_data"))
            .and_then(Value::as_object)
            .and_then(|inline| {
                let data = inline.get("data").and_then(Value::as_str)?;
                let mime_type = inline
                    .get("mimeType")
                    .or_else(|| inline.get("mime_type"))
                    .and_then(Value::as_str)
                    .filter(|mime| !mime.is_empty())?;
                Some(InlineImage {
                    mime_type: mime_type.to_string(),
                    data: data.to_string(),
                })
            });
        let thought = object
            .get("thought")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let signature = object
            .get("thoughtSignature")
            .or_else(|| object.get("thought_signature"))
            .and_then(Value::as_str)
            .filter(|value| !value.is_empty())
            .map(str::to_string);
        if text.is_none() && inline_data.is_none() && signature.is_none() {
            return None;
        }
        Some(Self {
            text,
            inline_data,
            thought,
            signature,
        })
    }
}

/// Extracts fragments from one response chunk, in order.
///
/// Accepts a `generateContent`-style payload (`candidates[].content.parts[]`),
/// a bare `parts` array, or a single part object. Anything else yields nothing.
/// Only the primary candidate (`index` 0, or unindexed) is read; alternates
/// never reach the message.
pub fn fragments_from_chunk(chunk: &Value) -> Vec<Fragment> {
    if let Some(candidates) = chunk.get("candidates").and_then(Value::as_array) {
        return candidates
            .iter()
            .find(|candidate| candidate_index(candidate) == 0)
            .and_then(|candidate| candidate.get("content"))
            .and_then(|content| content.get("parts"))
            .and_then(Value::as_array)
            .map(|parts| parts.iter().filter_map(Fragment::from_part_value).collect())
            .unwrap_or_default();
    }
    if let Some(parts) = chunk.get("parts").and_then(Value::as_array) {
        return parts.iter().filter_map(Fragment::from_part_value).collect();
    }
    if let Some(parts) = chunk.as_array() {
        return parts.iter().filter_map(Fragment::from_part_value).collect();
    }
    Fragment::from_part_value(chunk).into_iter().collect()
}

fn candidate_index(candidate: &Value) -> u64 {
    candidate.get("index").and_then(Value::as_u64).unwrap_or(0)
}
