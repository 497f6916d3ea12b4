use anyhow::Context;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    #[default]
    Model,
    System,
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "user" => Ok(Self::User),
            "model" | "assistant" => Ok(Self::Model),
            "system" => Ok(Self::System),
            other => Err(format!("unknown role '{other}'")),
        }
    }
}

/// Inline image payload as delivered by the provider: MIME type plus
/// base64 data, kept encoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineImage {
    #[serde(alias = "mime_type")]
    pub mime_type: String,
    pub data: String,
}

impl InlineImage {
    pub fn decode(&self) -> anyhow::Result<Vec<u8>> {
        BASE64
            .decode(self.data.as_bytes())
            .context("inline image base64 decode failed")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PartContent {
    Text(String),
    InlineData(InlineImage),
}

/// One segment of a message. The signature is opaque: stored and echoed back
/// verbatim, never inspected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    #[serde(flatten)]
    pub content: PartContent,
    #[serde(default)]
    pub thought: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thought_signature: Option<String>,
}

impl Part {
    pub fn text(text: impl Into<String>, thought: bool) -> Self {
        Self {
            content: PartContent::Text(text.into()),
            thought,
            thought_signature: None,
        }
    }

    pub fn image(image: InlineImage, thought: bool) -> Self {
        Self {
            content: PartContent::InlineData(image),
            thought,
            thought_signature: None,
        }
    }

    pub fn with_signature(mut self, signature: Option<String>) -> Self {
        self.thought_signature = signature;
        self
    }

    pub fn as_text(&self) -> Option<&str> {
        match &self.content {
            PartContent::Text(text) => Some(text.as_str()),
            PartContent::InlineData(_) => None,
        }
    }

    pub fn as_image(&self) -> Option<&InlineImage> {
        match &self.content {
            PartContent::InlineData(image) => Some(image),
            PartContent::Text(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub parts: Vec<Part>,
    #[serde(default)]
    pub error: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl Message {
    pub fn new(role: Role, parts: Vec<Part>) -> Self {
        Self {
            role,
            parts,
            error: false,
            error_message: None,
        }
    }

    /// Visible (non-thought) text, concatenated in part order.
    pub fn answer_text(&self) -> String {
        self.parts
            .iter()
            .filter(|part| !part.thought)
            .filter_map(Part::as_text)
            .collect()
    }

    pub fn thought_text(&self) -> String {
        self.parts
            .iter()
            .filter(|part| part.thought)
            .filter_map(Part::as_text)
            .collect()
    }

    pub fn images(&self) -> impl Iterator<Item = &InlineImage> {
        self.parts.iter().filter_map(Part::as_image)
    }
}
